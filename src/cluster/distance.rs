//! Pairwise dissimilarities over partially observed vectors.
//!
//! Every metric is evaluated over the features observed on *both* sides. A feature missing
//! from either vector is skipped entirely, so two rows with different missingness stay
//! comparable: the Euclidean and city-block sums are divided by the total weight actually
//! used (unless scaling is turned off).
//!
//! ## Metrics
//!
//! | Metric | Code | Distance |
//! |---|---|---|
//! | [`Metric::Euclidean`] | `e` | `Σ w (x - y)² / Σ w` |
//! | [`Metric::CityBlock`] | `b` | `Σ w abs(x - y) / Σ w` |
//! | [`Metric::Pearson`] | `c` | `1 - r` |
//! | [`Metric::AbsPearson`] | `a` | `1 - abs(r)` |
//! | [`Metric::Uncentered`] | `u` | `1 - r₀` (cosine) |
//! | [`Metric::AbsUncentered`] | `x` | `1 - abs(r₀)` |
//! | [`Metric::Spearman`] | `s` | `1 - ρ` of average ranks |
//! | [`Metric::Kendall`] | `k` | `1 - τ_b` |
//!
//! The correlation family reports `1` when either side has no variance. Rank metrics ignore
//! weights.

use std::cmp::Ordering::Equal;

use tracing::debug;

use super::dataset::{check_weights, Axis, Dataset};
use super::stats;
use super::util;
use crate::error::{Error, Result};

/// Dissimilarity function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Metric {
    /// Weighted mean squared difference.
    #[default]
    Euclidean,
    /// Weighted mean absolute difference.
    CityBlock,
    /// One minus the Pearson correlation.
    Pearson,
    /// One minus the absolute Pearson correlation.
    AbsPearson,
    /// One minus the uncentered correlation.
    Uncentered,
    /// One minus the absolute uncentered correlation.
    AbsUncentered,
    /// One minus the Spearman rank correlation.
    Spearman,
    /// One minus Kendall's tau.
    Kendall,
}

impl Metric {
    /// Single-character selector, as used by the classic clustering command-line tools.
    pub fn code(self) -> char {
        match self {
            Metric::Euclidean => 'e',
            Metric::CityBlock => 'b',
            Metric::Pearson => 'c',
            Metric::AbsPearson => 'a',
            Metric::Uncentered => 'u',
            Metric::AbsUncentered => 'x',
            Metric::Spearman => 's',
            Metric::Kendall => 'k',
        }
    }
}

impl TryFrom<char> for Metric {
    type Error = Error;

    fn try_from(code: char) -> Result<Self> {
        Ok(match code {
            'e' => Metric::Euclidean,
            'b' => Metric::CityBlock,
            'c' => Metric::Pearson,
            'a' => Metric::AbsPearson,
            'u' => Metric::Uncentered,
            'x' => Metric::AbsUncentered,
            's' => Metric::Spearman,
            'k' => Metric::Kendall,
            _ => {
                return Err(Error::InvalidParameter {
                    name: "metric",
                    message: "unknown metric code",
                })
            }
        })
    }
}

/// A metric plus its scaling rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dissimilarity {
    metric: Metric,
    scaled: bool,
}

impl Dissimilarity {
    /// Create a scaled dissimilarity for `metric`.
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            scaled: true,
        }
    }

    /// Divide Euclidean and city-block sums by the weight used (default `true`).
    ///
    /// Has no effect on the correlation metrics.
    pub fn with_scaled(mut self, scaled: bool) -> Self {
        self.scaled = scaled;
        self
    }

    /// The configured metric.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Whether additive metrics are normalized by the weight used.
    pub fn is_scaled(&self) -> bool {
        self.scaled
    }

    /// Distance between two explicit vectors.
    pub fn between(
        &self,
        a: &[f64],
        b: &[f64],
        mask_a: &[bool],
        mask_b: &[bool],
        weights: &[f64],
    ) -> Result<f64> {
        let n = a.len();
        for len in [b.len(), mask_a.len(), mask_b.len()] {
            if len != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    found: len,
                });
            }
        }
        check_weights(weights, n)?;

        let pairs = (0..n)
            .filter(|&k| mask_a[k] && mask_b[k])
            .map(|k| (a[k], b[k], weights[k]));
        self.evaluate(pairs)
            .ok_or(Error::NoOverlap { left: 0, right: 1 })
    }

    /// Distance between items `i` and `j` of `dataset` along `axis`.
    pub fn items(
        &self,
        dataset: &Dataset<'_>,
        axis: Axis,
        weights: Option<&[f64]>,
        i: usize,
        j: usize,
    ) -> Result<f64> {
        dataset.check_item(axis, i)?;
        dataset.check_item(axis, j)?;
        let w = dataset.weights(axis, weights)?;
        self.item_pair(dataset, axis, &w, i, j)
    }

    /// Lower-triangular distance matrix over all items along `axis`.
    pub fn matrix(
        &self,
        dataset: &Dataset<'_>,
        axis: Axis,
        weights: Option<&[f64]>,
    ) -> Result<DistanceMatrix> {
        let w = dataset.weights(axis, weights)?;
        let n = dataset.n_items(axis);
        let mut matrix = DistanceMatrix::zeros(n)?;
        for i in 1..n {
            for j in 0..i {
                let d = self.item_pair(dataset, axis, &w, i, j)?;
                matrix.set(i, j, d);
            }
        }
        debug!(n, metric = ?self.metric, ?axis, "distance matrix built");
        Ok(matrix)
    }

    /// `weights` must already match `dataset.n_features(axis)`.
    pub(crate) fn item_pair(
        &self,
        dataset: &Dataset<'_>,
        axis: Axis,
        weights: &[f64],
        i: usize,
        j: usize,
    ) -> Result<f64> {
        let pairs = (0..dataset.n_features(axis))
            .filter(|&f| dataset.is_present(axis, i, f) && dataset.is_present(axis, j, f))
            .map(|f| {
                (
                    dataset.value(axis, i, f),
                    dataset.value(axis, j, f),
                    weights[f],
                )
            });
        self.evaluate(pairs)
            .ok_or(Error::NoOverlap { left: i, right: j })
    }

    /// Evaluate the metric over `(x, y, weight)` triples of jointly observed features.
    ///
    /// `None` when nothing usable overlaps.
    pub(crate) fn evaluate<I>(&self, pairs: I) -> Option<f64>
    where
        I: IntoIterator<Item = (f64, f64, f64)>,
    {
        match self.metric {
            Metric::Euclidean => self.weighted_sum(pairs, |d| d * d),
            Metric::CityBlock => self.weighted_sum(pairs, f64::abs),
            Metric::Pearson => correlation(pairs, true).map(|r| 1.0 - r),
            Metric::AbsPearson => correlation(pairs, true).map(|r| 1.0 - r.abs()),
            Metric::Uncentered => correlation(pairs, false).map(|r| 1.0 - r),
            Metric::AbsUncentered => correlation(pairs, false).map(|r| 1.0 - r.abs()),
            Metric::Spearman => spearman(pairs),
            Metric::Kendall => kendall(pairs),
        }
    }

    fn weighted_sum<I>(&self, pairs: I, term: impl Fn(f64) -> f64) -> Option<f64>
    where
        I: IntoIterator<Item = (f64, f64, f64)>,
    {
        let mut sum = 0.0;
        let mut total_weight = 0.0;
        for (x, y, w) in pairs {
            sum += w * term(x - y);
            total_weight += w;
        }
        if total_weight <= 0.0 {
            return None;
        }
        Some(if self.scaled { sum / total_weight } else { sum })
    }
}

impl Default for Dissimilarity {
    fn default() -> Self {
        Self::new(Metric::default())
    }
}

impl From<Metric> for Dissimilarity {
    fn from(metric: Metric) -> Self {
        Self::new(metric)
    }
}

/// Weighted correlation coefficient, centered or not. `Some(0.0)` for zero variance.
fn correlation<I>(pairs: I, centered: bool) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64, f64)>,
{
    let (mut sw, mut sx, mut sy) = (0.0, 0.0, 0.0);
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y, w) in pairs {
        sw += w;
        sx += w * x;
        sy += w * y;
        sxy += w * (x * y);
        sxx += w * x * x;
        syy += w * y * y;
    }
    if sw <= 0.0 {
        return None;
    }
    if centered {
        sxy -= sx * sy / sw;
        sxx -= sx * sx / sw;
        syy -= sy * sy / sw;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return Some(0.0);
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

fn unzip_values<I>(pairs: I) -> (Vec<f64>, Vec<f64>)
where
    I: IntoIterator<Item = (f64, f64, f64)>,
{
    pairs.into_iter().map(|(x, y, _)| (x, y)).unzip()
}

fn spearman<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64, f64)>,
{
    let (xs, ys) = unzip_values(pairs);
    if xs.is_empty() {
        return None;
    }
    let rx = stats::ranks(&xs);
    let ry = stats::ranks(&ys);
    let rho = correlation(rx.into_iter().zip(ry).map(|(x, y)| (x, y, 1.0)), true)?;
    Some(1.0 - rho)
}

fn kendall<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64, f64)>,
{
    let (xs, ys) = unzip_values(pairs);
    let m = xs.len();
    if m == 0 {
        return None;
    }

    let (mut concordant, mut discordant) = (0u64, 0u64);
    let (mut tied_x, mut tied_y) = (0u64, 0u64);
    for i in 0..m {
        for j in 0..i {
            let dx = xs[i].total_cmp(&xs[j]);
            let dy = ys[i].total_cmp(&ys[j]);
            match (dx, dy) {
                (Equal, Equal) => {}
                (Equal, _) => tied_x += 1,
                (_, Equal) => tied_y += 1,
                _ if dx == dy => concordant += 1,
                _ => discordant += 1,
            }
        }
    }

    let denom_x = (concordant + discordant + tied_x) as f64;
    let denom_y = (concordant + discordant + tied_y) as f64;
    if denom_x == 0.0 || denom_y == 0.0 {
        return Some(1.0);
    }
    let tau = (concordant as f64 - discordant as f64) / (denom_x * denom_y).sqrt();
    Some(1.0 - tau)
}

/// Symmetric distances over `N` items, stored as the strict lower triangle.
///
/// `get(i, j) == get(j, i)` and `get(i, i) == 0.0`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "MatrixParts"))]
pub struct DistanceMatrix {
    n: usize,
    values: Vec<f64>,
}

/// Unchecked wire form of a [`DistanceMatrix`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct MatrixParts {
    n: usize,
    values: Vec<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<MatrixParts> for DistanceMatrix {
    type Error = Error;

    fn try_from(parts: MatrixParts) -> Result<Self> {
        Self::from_lower_triangle(parts.n, parts.values)
    }
}

impl DistanceMatrix {
    pub(crate) fn zeros(n: usize) -> Result<Self> {
        let len = triangle_len(n)?;
        Ok(Self {
            n,
            values: util::try_filled(len, 0.0)?,
        })
    }

    /// Wrap a caller-computed lower triangle, row-major: `d(1,0), d(2,0), d(2,1), d(3,0), ...`.
    pub fn from_lower_triangle(n: usize, values: Vec<f64>) -> Result<Self> {
        let len = triangle_len(n)?;
        if values.len() != len {
            return Err(Error::DimensionMismatch {
                expected: len,
                found: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "distance matrix",
                message: "entries must be finite",
            });
        }
        Ok(Self { n, values })
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.n
    }

    /// True if the matrix covers no items.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Distance between items `i` and `j`.
    ///
    /// # Panics
    ///
    /// If `i` or `j` is not below [`DistanceMatrix::len`] (unless `i == j`).
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            0.0
        } else {
            self.values[offset(i, j)]
        }
    }

    /// Distances from item `i` to items `0..i`.
    ///
    /// # Panics
    ///
    /// If `i` is not below [`DistanceMatrix::len`].
    pub fn row(&self, i: usize) -> &[f64] {
        let start = i * i.saturating_sub(1) / 2;
        &self.values[start..start + i]
    }

    /// The packed lower triangle.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub(crate) fn set(&mut self, i: usize, j: usize, value: f64) {
        debug_assert_ne!(i, j);
        self.values[offset(i, j)] = value;
    }
}

#[inline]
fn offset(i: usize, j: usize) -> usize {
    let (hi, lo) = if i > j { (i, j) } else { (j, i) };
    hi * (hi - 1) / 2 + lo
}

fn triangle_len(n: usize) -> Result<usize> {
    n.checked_mul(n.saturating_sub(1))
        .map(|x| x / 2)
        .ok_or(Error::AllocationFailed {
            elements: usize::MAX,
        })
}

/// Distance between two vectors with masks and weights.
///
/// Fails with [`Error::NoOverlap`] if no feature is observed in both.
pub fn distance(
    a: &[f64],
    b: &[f64],
    mask_a: &[bool],
    mask_b: &[bool],
    weights: &[f64],
    metric: impl Into<Dissimilarity>,
) -> Result<f64> {
    metric.into().between(a, b, mask_a, mask_b, weights)
}

/// All pairwise distances between the items of `dataset` along `axis`.
///
/// Either the whole matrix is returned or an error; there is no partial result.
pub fn distance_matrix(
    dataset: &Dataset<'_>,
    weights: Option<&[f64]>,
    metric: impl Into<Dissimilarity>,
    axis: Axis,
) -> Result<DistanceMatrix> {
    metric.into().matrix(dataset, axis, weights)
}
