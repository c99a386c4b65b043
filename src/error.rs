use thiserror::Error;

use crate::cluster::Axis;

/// Errors returned by the clustering engines in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Input slice is empty.
    #[error("empty input")]
    EmptyInput,

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },

    /// Requested cluster count is incompatible with the dataset.
    #[error("invalid cluster count: requested {requested}, but dataset has {n_items} items")]
    InvalidClusterCount {
        /// Requested number of clusters.
        requested: usize,
        /// Number of items in the dataset.
        n_items: usize,
    },

    /// Data, mask, weights or centroid shapes disagree.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Found length.
        found: usize,
    },

    /// A row or column of the mask has no present value.
    #[error("{axis:?} item {index} has no observed values")]
    AllMissing {
        /// Axis along which the empty item was found.
        axis: Axis,
        /// Index of the offending row or column.
        index: usize,
    },

    /// Two vectors share no observed feature, so their distance is undefined.
    #[error("no overlapping observed features between items {left} and {right}")]
    NoOverlap {
        /// First item (or centroid) index.
        left: usize,
        /// Second item (or centroid) index.
        right: usize,
    },

    /// Scratch or result storage could not be reserved.
    #[error("allocation of {elements} elements failed")]
    AllocationFailed {
        /// Number of elements requested.
        elements: usize,
    },
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
