use super::dataset::Dataset;
use crate::error::Result;

/// Common interface for hard clustering algorithms (one label per item).
pub trait Clustering {
    /// Fit the model and return one cluster label per item of `data`, along the model's axis.
    fn fit_predict(&self, data: &Dataset<'_>) -> Result<Vec<usize>>;

    /// The configured number of clusters.
    ///
    /// Hierarchical clustering without a fixed count picks it from the tree and returns 0 here.
    fn n_clusters(&self) -> usize;
}
