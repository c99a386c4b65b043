//! Clustering for masked tabular data.
//!
//! `clade` clusters the rows (or columns) of a numeric matrix in which some entries are
//! missing. A parallel boolean mask marks which values were observed; every distance and
//! aggregate only looks at observed values.
//!
//! The primary public API is under [`cluster`], which provides:
//! - pairwise dissimilarities (Euclidean, city-block, Pearson family, Spearman, Kendall)
//! - agglomerative hierarchical clustering (single, complete, average, centroid linkage)
//! - k-means / k-medians relocation clustering with randomized restarts
//! - tree cutting, centroids and between-cluster distances
//! - KGS penalty selection of the number of clusters

#![forbid(unsafe_code)]

pub mod cluster;
pub mod error;

pub use cluster::{
    centroid_distance, cluster_centroid, cluster_centroids, cluster_distance, cluster_members,
    cut_tree, distance, distance_matrix, kgs, Aggregate, Axis, Centroid, Clustering, Dataset,
    Dendrogram, Dissimilarity, DistanceMatrix, Hierarchical, HierarchicalFit, KgsReport, KgsScore,
    Kmeans, KmeansFit, Linkage, Metric, Node, NodeRef,
};
pub use error::{Error, Result};
