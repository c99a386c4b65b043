//! Flat partitions from a dendrogram, and summaries of clusters given as member lists.

use super::dataset::{Axis, Dataset};
use super::distance::Dissimilarity;
use super::hierarchical::{Dendrogram, Linkage, NodeRef};
use super::stats;
use super::util::{self, UnionFind};
use crate::error::{Error, Result};

/// How a centroid summarizes its members, feature by feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Aggregate {
    /// Arithmetic mean (k-means).
    #[default]
    Mean,
    /// Median (k-medians).
    Median,
}

/// A cluster representative; `mask[f]` is false when no member observed feature `f`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Centroid {
    /// Aggregated feature values (0.0 where masked).
    pub values: Vec<f64>,
    /// Which features had at least one observed member value.
    pub mask: Vec<bool>,
}

impl Centroid {
    /// Distance to another centroid over the features both observed.
    pub fn distance_to(
        &self,
        other: &Centroid,
        metric: impl Into<Dissimilarity>,
        weights: &[f64],
    ) -> Result<f64> {
        metric
            .into()
            .between(&self.values, &other.values, &self.mask, &other.mask, weights)
    }

    /// `None` when the item shares no observed feature with the centroid.
    pub(crate) fn distance_to_item(
        &self,
        dissimilarity: &Dissimilarity,
        dataset: &Dataset<'_>,
        axis: Axis,
        weights: &[f64],
        item: usize,
    ) -> Option<f64> {
        let pairs = (0..self.values.len())
            .filter(|&f| self.mask[f] && dataset.is_present(axis, item, f))
            .map(|f| (dataset.value(axis, item, f), self.values[f], weights[f]));
        dissimilarity.evaluate(pairs)
    }
}

/// Cut `tree` into `k` clusters.
///
/// The first `N - k` merges are applied; the last `k - 1` are the cluster boundaries. Cluster
/// ids are numbered by first appearance when scanning items in index order, so the same tree
/// and `k` always give the same labels.
pub fn cut_tree(tree: &Dendrogram, k: usize) -> Result<Vec<usize>> {
    let n = tree.n_items();
    if k == 0 || k > n {
        return Err(Error::InvalidClusterCount {
            requested: k,
            n_items: n,
        });
    }

    let joins = n - k;
    let mut uf = UnionFind::new(n)?;
    // Any item inside the cluster produced by each applied node.
    let mut node_item: Vec<usize> = util::try_with_capacity(joins)?;
    for node in &tree.nodes()[..joins] {
        let item_of = |r: NodeRef| match r {
            NodeRef::Item(i) => i,
            NodeRef::Node(j) => node_item[j],
        };
        let (left, right) = (item_of(node.left), item_of(node.right));
        uf.union(left, right);
        node_item.push(left);
    }

    let mut root_label = util::try_filled(n, usize::MAX)?;
    let mut labels = util::try_with_capacity(n)?;
    let mut next = 0;
    for i in 0..n {
        let root = uf.find(i);
        if root_label[root] == usize::MAX {
            root_label[root] = next;
            next += 1;
        }
        labels.push(root_label[root]);
    }
    Ok(labels)
}

/// Group item indices by cluster id; members stay in ascending order.
pub fn cluster_members(assignment: &[usize], k: usize) -> Result<Vec<Vec<usize>>> {
    let mut members = vec![Vec::new(); k];
    for (item, &label) in assignment.iter().enumerate() {
        if label >= k {
            return Err(Error::InvalidParameter {
                name: "assignment",
                message: "cluster id out of range",
            });
        }
        members[label].push(item);
    }
    Ok(members)
}

/// Mean or median of `members`, feature by feature, over observed values only.
pub fn cluster_centroid(
    members: &[usize],
    dataset: &Dataset<'_>,
    axis: Axis,
    aggregate: Aggregate,
) -> Result<Centroid> {
    if members.is_empty() {
        return Err(Error::EmptyInput);
    }
    for &m in members {
        dataset.check_item(axis, m)?;
    }
    Ok(summarize(members, dataset, axis, aggregate))
}

/// One centroid per cluster id. Clusters without members get an all-masked centroid.
pub fn cluster_centroids(
    assignment: &[usize],
    k: usize,
    dataset: &Dataset<'_>,
    axis: Axis,
    aggregate: Aggregate,
) -> Result<Vec<Centroid>> {
    let n = dataset.n_items(axis);
    if assignment.len() != n {
        return Err(Error::DimensionMismatch {
            expected: n,
            found: assignment.len(),
        });
    }
    let members = cluster_members(assignment, k)?;
    Ok(members
        .iter()
        .map(|m| summarize(m, dataset, axis, aggregate))
        .collect())
}

/// Members are assumed in range.
pub(crate) fn summarize(
    members: &[usize],
    dataset: &Dataset<'_>,
    axis: Axis,
    aggregate: Aggregate,
) -> Centroid {
    let nf = dataset.n_features(axis);
    let mut values = vec![0.0; nf];
    let mut mask = vec![false; nf];
    let mut column = Vec::with_capacity(members.len());
    for f in 0..nf {
        column.clear();
        column.extend(
            members
                .iter()
                .filter(|&&m| dataset.is_present(axis, m, f))
                .map(|&m| dataset.value(axis, m, f)),
        );
        let summary = match aggregate {
            Aggregate::Mean => stats::mean(&column),
            Aggregate::Median => stats::median(&mut column),
        };
        if let Some(v) = summary {
            values[f] = v;
            mask[f] = true;
        }
    }
    Centroid { values, mask }
}

/// Distance between two clusters given by their members.
///
/// Single, complete and average linkage take the minimum, maximum and mean over all
/// cross-cluster item pairs; centroid linkage measures between the two mean centroids.
pub fn cluster_distance(
    a: &[usize],
    b: &[usize],
    dataset: &Dataset<'_>,
    axis: Axis,
    weights: Option<&[f64]>,
    metric: impl Into<Dissimilarity>,
    linkage: Linkage,
) -> Result<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::EmptyInput);
    }
    for &m in a.iter().chain(b) {
        dataset.check_item(axis, m)?;
    }
    let dissimilarity = metric.into();
    let w = dataset.weights(axis, weights)?;

    if linkage == Linkage::Centroid {
        return between_centroids(a, b, dataset, axis, &w, dissimilarity, Aggregate::Mean);
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &i in a {
        for &j in b {
            let d = dissimilarity.item_pair(dataset, axis, &w, i, j)?;
            min = min.min(d);
            max = max.max(d);
            sum += d;
        }
    }
    Ok(match linkage {
        Linkage::Single => min,
        Linkage::Complete => max,
        _ => sum / (a.len() * b.len()) as f64,
    })
}

/// Distance between the mean or median centroids of two clusters.
///
/// With [`Aggregate::Mean`] this equals `cluster_distance` under centroid linkage.
pub fn centroid_distance(
    a: &[usize],
    b: &[usize],
    dataset: &Dataset<'_>,
    axis: Axis,
    weights: Option<&[f64]>,
    metric: impl Into<Dissimilarity>,
    aggregate: Aggregate,
) -> Result<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::EmptyInput);
    }
    for &m in a.iter().chain(b) {
        dataset.check_item(axis, m)?;
    }
    let w = dataset.weights(axis, weights)?;
    between_centroids(a, b, dataset, axis, &w, metric.into(), aggregate)
}

/// Members are assumed non-empty and in range.
fn between_centroids(
    a: &[usize],
    b: &[usize],
    dataset: &Dataset<'_>,
    axis: Axis,
    weights: &[f64],
    dissimilarity: Dissimilarity,
    aggregate: Aggregate,
) -> Result<f64> {
    let ca = summarize(a, dataset, axis, aggregate);
    let cb = summarize(b, dataset, axis, aggregate);
    ca.distance_to(&cb, dissimilarity, weights)
        .map_err(|e| match e {
            Error::NoOverlap { .. } => Error::NoOverlap {
                left: a[0],
                right: b[0],
            },
            other => other,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Hierarchical, Metric};

    fn line() -> Vec<Vec<f64>> {
        vec![vec![0.0], vec![1.0], vec![5.0], vec![6.0], vec![20.0]]
    }

    fn line_tree() -> Dendrogram {
        let data = line();
        let ds = Dataset::complete(&data).unwrap();
        Hierarchical::new(Linkage::Single).build_tree(&ds).unwrap()
    }

    #[test]
    fn cut_at_every_level() {
        let tree = line_tree();
        assert_eq!(cut_tree(&tree, 1).unwrap(), vec![0; 5]);
        assert_eq!(cut_tree(&tree, 2).unwrap(), vec![0, 0, 0, 0, 1]);
        assert_eq!(cut_tree(&tree, 3).unwrap(), vec![0, 0, 1, 1, 2]);
        assert_eq!(cut_tree(&tree, 4).unwrap(), vec![0, 0, 1, 2, 3]);
        assert_eq!(cut_tree(&tree, 5).unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cut_rejects_bad_counts() {
        let tree = line_tree();
        assert!(matches!(
            cut_tree(&tree, 0),
            Err(Error::InvalidClusterCount {
                requested: 0,
                n_items: 5,
            })
        ));
        assert!(cut_tree(&tree, 6).is_err());
    }

    #[test]
    fn members_by_cluster() {
        let members = cluster_members(&[1, 0, 1, 2], 3).unwrap();
        assert_eq!(members, vec![vec![1], vec![0, 2], vec![3]]);
        assert!(cluster_members(&[0, 3], 3).is_err());
    }

    #[test]
    fn centroid_over_observed_values() {
        let data = vec![
            vec![1.0, 10.0, 0.0],
            vec![3.0, 99.0, 0.0],
            vec![8.0, 20.0, 5.0],
        ];
        let mask = vec![
            vec![true, true, false],
            vec![true, false, false],
            vec![true, true, true],
        ];
        let ds = Dataset::new(&data, &mask).unwrap();

        let mean = cluster_centroid(&[0, 1], &ds, Axis::Rows, Aggregate::Mean).unwrap();
        assert_eq!(mean.values, vec![2.0, 10.0, 0.0]);
        assert_eq!(mean.mask, vec![true, true, false]);

        let median = cluster_centroid(&[0, 1, 2], &ds, Axis::Rows, Aggregate::Median).unwrap();
        assert_eq!(median.values, vec![3.0, 15.0, 5.0]);
        assert_eq!(median.mask, vec![true, true, true]);

        assert!(cluster_centroid(&[], &ds, Axis::Rows, Aggregate::Mean).is_err());
        assert!(cluster_centroid(&[7], &ds, Axis::Rows, Aggregate::Mean).is_err());
    }

    #[test]
    fn centroids_per_cluster() {
        let data = line();
        let ds = Dataset::complete(&data).unwrap();
        let cs =
            cluster_centroids(&[0, 0, 1, 1, 1], 3, &ds, Axis::Rows, Aggregate::Mean).unwrap();
        assert_eq!(cs[0].values, vec![0.5]);
        assert!((cs[1].values[0] - 31.0 / 3.0).abs() < 1e-12);
        assert_eq!(cs[2].mask, vec![false]);
    }

    #[test]
    fn distances_between_member_lists() {
        let data = line();
        let ds = Dataset::complete(&data).unwrap();
        let d = |l| {
            cluster_distance(&[0, 1], &[2, 3], &ds, Axis::Rows, None, Metric::Euclidean, l)
                .unwrap()
        };

        assert_eq!(d(Linkage::Single), 16.0);
        assert_eq!(d(Linkage::Complete), 36.0);
        assert_eq!(d(Linkage::Average), 25.5);
        assert_eq!(d(Linkage::Centroid), 25.0);
    }

    #[test]
    fn median_centroids() {
        let data = line();
        let ds = Dataset::complete(&data).unwrap();
        let euclidean = Metric::Euclidean;
        let d = |aggregate| {
            centroid_distance(&[0, 1, 2], &[3, 4], &ds, Axis::Rows, None, euclidean, aggregate)
                .unwrap()
        };
        // Means 2 and 13; medians 1 and 13.
        assert_eq!(d(Aggregate::Mean), 121.0);
        assert_eq!(d(Aggregate::Median), 144.0);
        let (a, b) = ([0, 1, 2], [3, 4]);
        let linked = cluster_distance(&a, &b, &ds, Axis::Rows, None, euclidean, Linkage::Centroid);
        assert_eq!(linked.unwrap(), 121.0);
        let median = Aggregate::Median;
        let empty = centroid_distance(&a, &[], &ds, Axis::Rows, None, euclidean, median);
        assert!(matches!(empty, Err(Error::EmptyInput)));
    }

    #[test]
    fn cluster_distance_rejects_empty() {
        let data = line();
        let ds = Dataset::complete(&data).unwrap();
        let r = cluster_distance(
            &[],
            &[1],
            &ds,
            Axis::Rows,
            None,
            Metric::Euclidean,
            Linkage::Single,
        );
        assert!(matches!(r, Err(Error::EmptyInput)));
    }
}
