//! Validated views over a data matrix and its missing-value mask.

use crate::error::{Error, Result};

use super::stats;

/// Which dimension of the matrix holds the items being clustered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    /// Items are rows; features are columns.
    #[default]
    Rows,
    /// Items are columns; features are rows. No transposed copy is made.
    Columns,
}

/// A borrowed data matrix with an optional mask (`false` = missing).
///
/// Construction validates shapes once so the engines can index freely afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    data: &'a [Vec<f64>],
    mask: Option<&'a [Vec<bool>]>,
    n_cols: usize,
}

impl<'a> Dataset<'a> {
    /// Wrap `data` and `mask`, rejecting shape mismatches and fully-missing rows or columns.
    pub fn new(data: &'a [Vec<f64>], mask: &'a [Vec<bool>]) -> Result<Self> {
        Self::validated(data, Some(mask))
    }

    /// Wrap `data` with every value observed.
    pub fn complete(data: &'a [Vec<f64>]) -> Result<Self> {
        Self::validated(data, None)
    }

    fn validated(data: &'a [Vec<f64>], mask: Option<&'a [Vec<bool>]>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        let n_cols = data[0].len();
        if n_cols == 0 {
            return Err(Error::InvalidParameter {
                name: "dimension",
                message: "must be at least 1",
            });
        }
        for row in data.iter().skip(1) {
            if row.len() != n_cols {
                return Err(Error::DimensionMismatch {
                    expected: n_cols,
                    found: row.len(),
                });
            }
        }

        if let Some(mask) = mask {
            if mask.len() != data.len() {
                return Err(Error::DimensionMismatch {
                    expected: data.len(),
                    found: mask.len(),
                });
            }
            for row in mask {
                if row.len() != n_cols {
                    return Err(Error::DimensionMismatch {
                        expected: n_cols,
                        found: row.len(),
                    });
                }
            }
        }

        let dataset = Self { data, mask, n_cols };

        for i in 0..data.len() {
            let mut observed = false;
            for j in 0..n_cols {
                if dataset.is_present(Axis::Rows, i, j) {
                    if !data[i][j].is_finite() {
                        return Err(Error::InvalidParameter {
                            name: "data",
                            message: "observed values must be finite",
                        });
                    }
                    observed = true;
                }
            }
            if !observed {
                return Err(Error::AllMissing {
                    axis: Axis::Rows,
                    index: i,
                });
            }
        }
        for j in 0..n_cols {
            if !(0..data.len()).any(|i| dataset.is_present(Axis::Rows, i, j)) {
                return Err(Error::AllMissing {
                    axis: Axis::Columns,
                    index: j,
                });
            }
        }

        Ok(dataset)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.data.len()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of items along `axis`.
    pub fn n_items(&self, axis: Axis) -> usize {
        match axis {
            Axis::Rows => self.n_rows(),
            Axis::Columns => self.n_cols,
        }
    }

    /// Number of features describing each item along `axis`.
    pub fn n_features(&self, axis: Axis) -> usize {
        match axis {
            Axis::Rows => self.n_cols,
            Axis::Columns => self.n_rows(),
        }
    }

    /// Value of `feature` for `item`. Meaningless when the entry is masked out.
    #[inline]
    pub fn value(&self, axis: Axis, item: usize, feature: usize) -> f64 {
        match axis {
            Axis::Rows => self.data[item][feature],
            Axis::Columns => self.data[feature][item],
        }
    }

    /// Whether `feature` of `item` was observed.
    #[inline]
    pub fn is_present(&self, axis: Axis, item: usize, feature: usize) -> bool {
        let (i, j) = match axis {
            Axis::Rows => (item, feature),
            Axis::Columns => (feature, item),
        };
        self.mask.map_or(true, |m| m[i][j])
    }

    /// Observed values of `item`, in feature order.
    pub fn observed(&self, axis: Axis, item: usize) -> Vec<f64> {
        (0..self.n_features(axis))
            .filter(|&f| self.is_present(axis, item, f))
            .map(|f| self.value(axis, item, f))
            .collect()
    }

    /// Mean of the observed values of `item`.
    pub fn mean(&self, axis: Axis, item: usize) -> Result<f64> {
        self.check_item(axis, item)?;
        stats::mean(&self.observed(axis, item)).ok_or(Error::AllMissing { axis, index: item })
    }

    /// Median of the observed values of `item`.
    pub fn median(&self, axis: Axis, item: usize) -> Result<f64> {
        self.check_item(axis, item)?;
        let mut values = self.observed(axis, item);
        stats::median(&mut values).ok_or(Error::AllMissing { axis, index: item })
    }

    pub(crate) fn check_item(&self, axis: Axis, item: usize) -> Result<()> {
        if item >= self.n_items(axis) {
            return Err(Error::InvalidParameter {
                name: "item",
                message: "index out of range",
            });
        }
        Ok(())
    }

    /// Resolve optional feature weights for `axis` into an owned vector (`None` = all ones).
    pub(crate) fn weights(&self, axis: Axis, weights: Option<&[f64]>) -> Result<Vec<f64>> {
        let n = self.n_features(axis);
        match weights {
            None => Ok(vec![1.0; n]),
            Some(w) => {
                check_weights(w, n)?;
                Ok(w.to_vec())
            }
        }
    }
}

pub(crate) fn check_weights(weights: &[f64], expected: usize) -> Result<()> {
    if weights.len() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            found: weights.len(),
        });
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(Error::InvalidParameter {
            name: "weights",
            message: "must be finite and non-negative",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_axis_reads_transposed() {
        let data = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let ds = Dataset::complete(&data).unwrap();

        assert_eq!(ds.n_items(Axis::Columns), 3);
        assert_eq!(ds.n_features(Axis::Columns), 2);
        assert_eq!(ds.value(Axis::Columns, 2, 1), 6.0);
        assert_eq!(ds.observed(Axis::Columns, 0), vec![1.0, 4.0]);
    }

    #[test]
    fn masked_mean_and_median() {
        let data = vec![vec![1.0, 100.0, 3.0, 5.0]];
        let mask = vec![vec![true, false, true, true]];
        let ds = Dataset::new(&data, &mask).unwrap();

        assert_eq!(ds.mean(Axis::Rows, 0).unwrap(), 3.0);
        assert_eq!(ds.median(Axis::Rows, 0).unwrap(), 3.0);
    }

    #[test]
    fn rejects_all_missing_row() {
        let data = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let mask = vec![vec![true, true], vec![false, false]];
        let err = Dataset::new(&data, &mask).unwrap_err();
        assert!(matches!(
            err,
            Error::AllMissing {
                axis: Axis::Rows,
                index: 1
            }
        ));
    }

    #[test]
    fn rejects_all_missing_column() {
        let data = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let mask = vec![vec![true, false], vec![true, false]];
        let err = Dataset::new(&data, &mask).unwrap_err();
        assert!(matches!(
            err,
            Error::AllMissing {
                axis: Axis::Columns,
                index: 1
            }
        ));
    }

    #[test]
    fn rejects_shape_mismatch() {
        let data = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(Dataset::complete(&data).is_err());

        let data = vec![vec![1.0, 2.0]];
        let mask = vec![vec![true]];
        assert!(Dataset::new(&data, &mask).is_err());

        let empty: Vec<Vec<f64>> = vec![];
        assert!(matches!(Dataset::complete(&empty), Err(Error::EmptyInput)));
    }

    #[test]
    fn masked_nan_is_ignored() {
        let data = vec![vec![f64::NAN, 2.0], vec![1.0, 2.0]];
        let mask = vec![vec![false, true], vec![true, true]];
        assert!(Dataset::new(&data, &mask).is_ok());
        assert!(Dataset::complete(&data).is_err());
    }

    #[test]
    fn weights_are_validated() {
        let data = vec![vec![1.0, 2.0]];
        let ds = Dataset::complete(&data).unwrap();
        assert_eq!(ds.weights(Axis::Rows, None).unwrap(), vec![1.0, 1.0]);
        assert!(ds.weights(Axis::Rows, Some(&[1.0])).is_err());
        assert!(ds.weights(Axis::Rows, Some(&[1.0, -1.0])).is_err());
        assert_eq!(ds.weights(Axis::Columns, Some(&[2.0])).unwrap(), vec![2.0]);
    }
}
