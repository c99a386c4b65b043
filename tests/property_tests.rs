use clade::cluster::{
    cluster_centroid, cut_tree, distance, distance_matrix, kgs, Aggregate, Axis, Clustering,
    Dataset, Hierarchical, Kmeans, Linkage, Metric,
};
use proptest::prelude::*;

fn points(max_items: usize, dim: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-10.0f64..10.0, dim), 1..max_items)
}

/// Data plus a mask that leaves every row and column with at least one observed value.
fn masked(max_items: usize, dim: usize) -> impl Strategy<Value = (Vec<Vec<f64>>, Vec<Vec<bool>>)> {
    points(max_items, dim).prop_flat_map(move |data| {
        let n = data.len();
        (
            Just(data),
            prop::collection::vec(prop::collection::vec(any::<bool>(), dim), n),
        )
            .prop_map(move |(data, mut mask)| {
                for i in 0..n {
                    mask[i][i % dim] = true;
                }
                for j in 0..dim {
                    mask[j % n][j] = true;
                }
                (data, mask)
            })
    })
}

const METRICS: [Metric; 8] = [
    Metric::Euclidean,
    Metric::CityBlock,
    Metric::Pearson,
    Metric::AbsPearson,
    Metric::Uncentered,
    Metric::AbsUncentered,
    Metric::Spearman,
    Metric::Kendall,
];

/// Mostly small integers, so ties are common.
fn tied_values(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(
        prop_oneof![3 => (-3i32..3).prop_map(f64::from), 1 => -10.0f64..10.0],
        len,
    )
}

proptest! {
    #[test]
    fn prop_every_metric_symmetric(
        a in tied_values(6),
        b in tied_values(6),
        mask_a in prop::collection::vec(any::<bool>(), 6),
        mask_b in prop::collection::vec(any::<bool>(), 6),
        w in prop::collection::vec(0.1f64..2.0, 6),
    ) {
        for metric in METRICS {
            let ab = distance(&a, &b, &mask_a, &mask_b, &w, metric);
            let ba = distance(&b, &a, &mask_b, &mask_a, &w, metric);
            match (ab, ba) {
                (Ok(x), Ok(y)) => {
                    prop_assert!((x - y).abs() <= 1e-9, "{:?}: {} vs {}", metric, x, y);
                    prop_assert!(x >= 0.0);
                }
                // No jointly observed feature, in either order.
                (Err(_), Err(_)) => {}
                (x, y) => prop_assert!(false, "{:?}: {:?} vs {:?}", metric, x, y),
            }
        }
    }

    #[test]
    fn prop_self_distance_is_zero(
        base in prop::collection::vec(-10.0f64..10.0, 6),
        mut mask in prop::collection::vec(any::<bool>(), 6),
        w in prop::collection::vec(0.1f64..2.0, 6),
    ) {
        mask[0] = true;
        mask[1] = true;
        // Spread apart so no two observed values tie.
        let a: Vec<f64> = base
            .iter()
            .enumerate()
            .map(|(i, v)| v + 100.0 * i as f64)
            .collect();
        for metric in [Metric::Euclidean, Metric::CityBlock, Metric::Spearman] {
            prop_assert_eq!(distance(&a, &a, &mask, &mask, &w, metric).unwrap(), 0.0);
        }
    }

    #[test]
    fn prop_tree_shape_and_cut_extremes(
        data in points(16, 3),
        code in prop::sample::select(vec!['s', 'm', 'a', 'c']),
    ) {
        let ds = Dataset::complete(&data).unwrap();
        let linkage = Linkage::try_from(code).unwrap();
        let tree = Hierarchical::new(linkage).build_tree(&ds).unwrap();
        let n = data.len();

        prop_assert_eq!(tree.len(), n - 1);
        prop_assert_eq!(cut_tree(&tree, 1).unwrap(), vec![0; n]);
        prop_assert_eq!(cut_tree(&tree, n).unwrap(), (0..n).collect::<Vec<_>>());

        // Same input, same tree.
        let again = Hierarchical::new(linkage).build_tree(&ds).unwrap();
        prop_assert_eq!(&tree, &again);
    }

    #[test]
    fn prop_cut_labels_are_dense(data in points(16, 2), k in 1usize..16) {
        let ds = Dataset::complete(&data).unwrap();
        let tree = Hierarchical::new(Linkage::Average).build_tree(&ds).unwrap();
        prop_assume!(k <= data.len());

        let labels = cut_tree(&tree, k).unwrap();
        let mut seen = vec![false; k];
        let mut next = 0;
        for &l in &labels {
            prop_assert!(l < k);
            // Ids appear in increasing order of first use.
            if !seen[l] {
                prop_assert_eq!(l, next);
                seen[l] = true;
                next += 1;
            }
        }
        prop_assert_eq!(next, k);
    }

    #[test]
    fn prop_merge_distances_monotone(
        data in points(16, 2),
        code in prop::sample::select(vec!['s', 'm', 'a']),
    ) {
        let ds = Dataset::complete(&data).unwrap();
        let tree = Hierarchical::new(Linkage::try_from(code).unwrap())
            .build_tree(&ds)
            .unwrap();
        let d = tree.distances();
        for pair in d.windows(2) {
            prop_assert!(pair[1] >= pair[0] - 1e-9 * pair[0].abs().max(1.0));
        }
    }

    #[test]
    fn prop_kmeans_all_assigned(data in points(20, 2), k in 1usize..5) {
        prop_assume!(k <= data.len());
        let ds = Dataset::complete(&data).unwrap();
        let labels = Kmeans::new(k).with_seed(42).fit_predict(&ds).unwrap();

        prop_assert_eq!(labels.len(), data.len());
        for c in 0..k {
            prop_assert!(labels.contains(&c));
        }
    }

    #[test]
    fn prop_kmeans_more_passes_not_worse(
        data in points(20, 2),
        k in 1usize..4,
        seed in any::<u64>(),
    ) {
        prop_assume!(k <= data.len());
        let ds = Dataset::complete(&data).unwrap();
        let few = Kmeans::new(k).with_passes(2).with_seed(seed).fit(&ds).unwrap();
        let many = Kmeans::new(k).with_passes(6).with_seed(seed).fit(&ds).unwrap();
        prop_assert!(many.error <= few.error * (1.0 + 1e-9) + 1e-12);
        prop_assert!(many.times_found >= 1 && many.times_found <= 6);
    }

    #[test]
    fn prop_kgs_selection_is_minimal(data in points(14, 2)) {
        prop_assume!(data.len() >= 3);
        let ds = Dataset::complete(&data).unwrap();
        let matrix = distance_matrix(&ds, None, Metric::Euclidean, Axis::Rows).unwrap();
        let tree = Hierarchical::new(Linkage::Average)
            .build_tree_from_matrix(matrix.clone())
            .unwrap();
        let report = kgs(&tree, &matrix).unwrap();

        prop_assert!(report.best >= 2 && report.best < data.len());
        prop_assert_eq!(report.scores.len(), data.len() - 2);
        let chosen = report
            .scores
            .iter()
            .find(|s| s.n_clusters == report.best)
            .unwrap();
        for s in &report.scores {
            prop_assert!(chosen.penalty <= s.penalty);
        }
    }

    #[test]
    fn prop_singleton_centroid_is_the_item((data, mask) in masked(10, 3)) {
        let ds = Dataset::new(&data, &mask).unwrap();
        // Masked items may share no feature, so build the tree on the full values.
        let full = Dataset::complete(&data).unwrap();
        let tree = Hierarchical::new(Linkage::Single).build_tree(&full).unwrap();
        let labels = cut_tree(&tree, data.len()).unwrap();

        for (item, &label) in labels.iter().enumerate() {
            prop_assert_eq!(label, item);
            let c = cluster_centroid(&[item], &ds, Axis::Rows, Aggregate::Mean).unwrap();
            prop_assert_eq!(&c.mask, &mask[item]);
            for f in 0..3 {
                if mask[item][f] {
                    prop_assert_eq!(c.values[f], data[item][f]);
                }
            }
        }
    }
}
