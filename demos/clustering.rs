//! Hierarchical clustering, k-means and KGS on a small dataset with missing values.

use clade::{
    cut_tree, distance_matrix, kgs, Axis, Dataset, Hierarchical, Kmeans, Linkage, Metric, NodeRef,
};

fn show(r: NodeRef) -> String {
    match r {
        NodeRef::Item(i) => format!("{i}"),
        NodeRef::Node(k) => format!("node {k}"),
    }
}

fn main() -> clade::Result<()> {
    // Three rough groups: rows 0-5, 6-8 and 9-12.
    let data = vec![
        vec![0.1, 0.0, 9.6, 5.6],
        vec![1.4, 1.3, 0.0, 3.8],
        vec![1.2, 2.5, 0.0, 4.8],
        vec![2.3, 1.5, 9.2, 4.3],
        vec![1.7, 0.7, 9.6, 3.4],
        vec![0.0, 3.9, 9.8, 5.1],
        vec![6.7, 3.9, 5.5, 4.8],
        vec![0.0, 6.3, 5.7, 4.3],
        vec![5.7, 6.9, 5.6, 4.3],
        vec![0.0, 2.2, 5.4, 0.0],
        vec![3.8, 3.5, 5.5, 9.6],
        vec![0.0, 2.3, 3.6, 8.5],
        vec![4.1, 4.5, 5.8, 7.6],
    ];
    let mut mask = vec![vec![true; 4]; data.len()];
    for (i, j) in [(1, 2), (2, 2), (5, 0), (7, 0), (9, 3), (11, 0)] {
        mask[i][j] = false;
    }
    let ds = Dataset::new(&data, &mask)?;

    println!("=== Row summaries ===");
    for i in 0..ds.n_rows() {
        println!(
            "  row {:2}: mean {:6.3}  median {:6.3}",
            i,
            ds.mean(Axis::Rows, i)?,
            ds.median(Axis::Rows, i)?
        );
    }

    let matrix = distance_matrix(&ds, None, Metric::Euclidean, Axis::Rows)?;
    for linkage in [
        Linkage::Single,
        Linkage::Complete,
        Linkage::Average,
        Linkage::Centroid,
    ] {
        let tree = match linkage {
            Linkage::Centroid => Hierarchical::new(linkage).build_tree(&ds)?,
            _ => Hierarchical::new(linkage).build_tree_from_matrix(matrix.clone())?,
        };
        println!("\n=== {linkage:?} linkage ===");
        for (k, node) in tree.nodes().iter().enumerate() {
            println!(
                "  node {:2}: {:>8} + {:>8}  at {:7.3}",
                k,
                show(node.left),
                show(node.right),
                node.distance
            );
        }
        println!("  cut into 3: {:?}", cut_tree(&tree, 3)?);
    }

    let fit = Kmeans::new(3).with_passes(1000).with_seed(42).fit(&ds)?;
    println!("\n=== K-means (k=3, 1000 passes) ===");
    println!("  labels: {:?}", fit.labels);
    println!("  error {:.4}, found {} times", fit.error, fit.times_found);

    let tree = Hierarchical::new(Linkage::Average).build_tree_from_matrix(matrix.clone())?;
    let report = kgs(&tree, &matrix)?;
    println!("\n=== KGS penalty (average linkage) ===");
    for score in &report.scores {
        println!(
            "  k = {:2}: spread {:7.3}  penalty {:7.3}",
            score.n_clusters, score.average_spread, score.penalty
        );
    }
    println!("  best: {} clusters", report.best);

    Ok(())
}
