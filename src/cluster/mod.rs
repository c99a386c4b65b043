//! Clustering algorithms for masked tabular data.
//!
//! Items are the rows (or, with [`Axis::Columns`], the columns) of a numeric matrix. A
//! parallel boolean mask marks missing entries; every distance and aggregate here skips
//! them, so two items are compared only over the features both observed.
//!
//! ## Dissimilarities
//!
//! [`Metric`] selects one of eight measures: Euclidean and city-block (optionally scaled by
//! the observed fraction of the weight), Pearson and uncentered correlation (signed or
//! absolute), Spearman rank correlation and Kendall's tau. Correlations become distances as
//! `1 - r` (or `1 - |r|`).
//!
//! ## Algorithms
//!
//! ### Hierarchical (agglomerative)
//!
//! Start with every item in its own cluster and repeatedly merge the closest two:
//!
//! ```text
//! single:   d(A ∪ B, C) = min(d(A, C), d(B, C))
//! complete: d(A ∪ B, C) = max(d(A, C), d(B, C))
//! average:  d(A ∪ B, C) = (|A| d(A, C) + |B| d(B, C)) / (|A| + |B|)
//! centroid: d(A ∪ B, C) = d(centroid(A ∪ B), centroid(C))
//! ```
//!
//! The result is a [`Dendrogram`] of `N - 1` merges. [`cut_tree`] turns it into a flat
//! partition, and [`kgs`] suggests where to cut.
//!
//! ### K-means / k-medians
//!
//! Assign each item to the nearest centroid, then move each centroid to the mean (or
//! median) of its members. Repeat until nothing moves. The result depends on the random
//! starting centroids, so [`Kmeans`] runs several passes and keeps the best.
//!
//! ## Usage
//!
//! ```rust
//! use clade::cluster::{Clustering, Dataset, Hierarchical, Kmeans, Linkage};
//!
//! let data = vec![
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.1],
//!     vec![10.0, 10.0],
//!     vec![10.1, 10.1],
//! ];
//! let ds = Dataset::complete(&data).unwrap();
//!
//! let labels = Kmeans::new(2).with_passes(5).with_seed(1).fit_predict(&ds).unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_ne!(labels[0], labels[2]);
//!
//! let tree = Hierarchical::new(Linkage::Average).build_tree(&ds).unwrap();
//! assert_eq!(tree.len(), 3);
//! assert_eq!(tree.cut(2).unwrap(), vec![0, 0, 1, 1]);
//! ```

mod dataset;
mod distance;
mod hierarchical;
mod kmeans;
pub mod stats;
mod traits;
mod tree;
mod util;
mod validity;

pub use dataset::{Axis, Dataset};
pub use distance::{distance, distance_matrix, Dissimilarity, DistanceMatrix, Metric};
pub use hierarchical::{Dendrogram, Hierarchical, HierarchicalFit, Linkage, Node, NodeRef};
pub use kmeans::{Kmeans, KmeansFit};
pub use traits::Clustering;
pub use tree::{
    centroid_distance, cluster_centroid, cluster_centroids, cluster_distance, cluster_members,
    cut_tree, Aggregate, Centroid,
};
pub use validity::{average_spread, distances_to_others, kgs, medoid, spread, KgsReport, KgsScore};
