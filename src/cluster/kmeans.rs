//! K-means relocation clustering over masked data, with randomized restarts.
//!
//! Each pass seeds `k` centroids from distinct random items, then alternates:
//!
//! 1. assign every item to its nearest centroid (lowest id on ties);
//! 2. refill any empty cluster with the item farthest from its centroid inside the largest
//!    cluster, so a pass always ends with exactly `k` non-empty clusters;
//! 3. recompute centroids as the per-feature mean (or median) of observed member values.
//!
//! A pass stops when no item moves, when an earlier assignment reappears (checked against
//! snapshots taken at doubling intervals), or after `max_iter` iterations. Its score is the
//! sum of each item's distance to its own centroid.
//!
//! Over `n_passes` passes the lowest score wins. `times_found` counts the passes that reached
//! that same score: a value close to `n_passes` suggests the optimum is not a one-off local
//! minimum. All passes draw from one RNG stream, so with a fixed seed adding passes never
//! worsens the result.

use std::cmp::Reverse;

use rand::prelude::*;
use rand::seq::index;
use tracing::{debug, trace};

use super::dataset::{Axis, Dataset};
use super::distance::{Dissimilarity, Metric};
use super::traits::Clustering;
use super::tree::{self, Aggregate, Centroid};
use crate::error::{Error, Result};

/// Scores within this relative distance count as the same solution.
const SCORE_TOLERANCE: f64 = 1e-10;

/// First snapshot interval for oscillation detection; doubles after each snapshot.
const SNAPSHOT_PERIOD: usize = 10;

/// K-means (or k-medians) clusterer configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Kmeans {
    k: usize,
    n_passes: usize,
    max_iter: usize,
    seed: Option<u64>,
    aggregate: Aggregate,
    dissimilarity: Dissimilarity,
    axis: Axis,
    weights: Option<Vec<f64>>,
    initial: Option<Vec<usize>>,
}

/// Best solution found by [`Kmeans::fit`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KmeansFit {
    /// Cluster id per item.
    pub labels: Vec<usize>,
    /// Centroid per cluster id.
    pub centroids: Vec<Centroid>,
    /// Sum over items of the distance to their own centroid.
    pub error: f64,
    /// Number of passes that reached `error`.
    pub times_found: usize,
    /// Whether the best pass reached a fixed point before `max_iter`.
    pub converged: bool,
}

struct Pass {
    labels: Vec<usize>,
    centroids: Vec<Centroid>,
    error: f64,
    converged: bool,
}

/// Per-fit state shared by all passes.
struct Context<'a, 'd> {
    dataset: &'a Dataset<'d>,
    axis: Axis,
    weights: Vec<f64>,
    n: usize,
}

impl Kmeans {
    /// Create a k-means clusterer with `k` clusters, one pass and Euclidean distances.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            n_passes: 1,
            max_iter: 100,
            seed: None,
            aggregate: Aggregate::Mean,
            dissimilarity: Dissimilarity::default(),
            axis: Axis::Rows,
            weights: None,
            initial: None,
        }
    }

    /// Number of independent passes (random restarts).
    pub fn with_passes(mut self, n_passes: usize) -> Self {
        self.n_passes = n_passes;
        self
    }

    /// Iteration bound per pass.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Seed the RNG for reproducible results.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Centroid aggregate: mean (k-means) or median (k-medians).
    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Set the distance metric (scaled).
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.dissimilarity = Dissimilarity::new(metric);
        self
    }

    /// Set the full dissimilarity (metric and scaling).
    pub fn with_dissimilarity(mut self, dissimilarity: Dissimilarity) -> Self {
        self.dissimilarity = dissimilarity;
        self
    }

    /// Cluster rows (default) or columns.
    pub fn with_axis(mut self, axis: Axis) -> Self {
        self.axis = axis;
        self
    }

    /// Per-feature weights; length must match the feature count of the chosen axis.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Start the first pass from this assignment instead of random seeds.
    pub fn with_initial_assignment(mut self, labels: Vec<usize>) -> Self {
        self.initial = Some(labels);
        self
    }

    /// Run all passes and return the best one.
    pub fn fit(&self, dataset: &Dataset<'_>) -> Result<KmeansFit> {
        let n = dataset.n_items(self.axis);
        if self.k == 0 || self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }
        if self.n_passes == 0 {
            return Err(Error::InvalidParameter {
                name: "n_passes",
                message: "must be at least 1",
            });
        }
        if self.max_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be at least 1",
            });
        }
        if let Some(initial) = &self.initial {
            if initial.len() != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    found: initial.len(),
                });
            }
            if initial.iter().any(|&l| l >= self.k) {
                return Err(Error::InvalidParameter {
                    name: "initial assignment",
                    message: "cluster id out of range",
                });
            }
        }

        let ctx = Context {
            dataset,
            axis: self.axis,
            weights: dataset.weights(self.axis, self.weights.as_deref())?,
            n,
        };
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        debug!(n, k = self.k, passes = self.n_passes, "k-means started");
        let mut best: Option<Pass> = None;
        let mut times_found = 0;
        for pass in 0..self.n_passes {
            let initial = if pass == 0 {
                self.initial.as_deref()
            } else {
                None
            };
            let result = self.run_pass(&ctx, &mut rng, initial)?;
            trace!(pass, error = result.error, converged = result.converged, "pass done");

            let improves = match &best {
                None => true,
                Some(b) if same_score(result.error, b.error) => {
                    times_found += 1;
                    false
                }
                Some(b) => result.error < b.error,
            };
            if improves {
                best = Some(result);
                times_found = 1;
            }
        }

        let best = best.ok_or(Error::EmptyInput)?;
        debug!(error = best.error, times_found, "k-means finished");
        Ok(KmeansFit {
            labels: best.labels,
            centroids: best.centroids,
            error: best.error,
            times_found,
            converged: best.converged,
        })
    }

    fn run_pass(
        &self,
        ctx: &Context<'_, '_>,
        rng: &mut StdRng,
        initial: Option<&[usize]>,
    ) -> Result<Pass> {
        let (mut labels, mut centroids) = match initial {
            Some(assignment) => {
                let mut labels = assignment.to_vec();
                let centroids = ctx.centroids(&labels, self.k, self.aggregate)?;
                self.refill_empty(ctx, &mut labels, &centroids)?;
                let centroids = ctx.centroids(&labels, self.k, self.aggregate)?;
                (labels, centroids)
            }
            None => {
                let seeds = index::sample(rng, ctx.n, self.k);
                let centroids = seeds.iter().map(|i| ctx.item_centroid(i)).collect();
                (vec![usize::MAX; ctx.n], centroids)
            }
        };

        let mut snapshot = labels.clone();
        let mut period = SNAPSHOT_PERIOD;
        let mut converged = false;
        for iteration in 0..self.max_iter {
            if iteration % period == 0 {
                snapshot.clone_from(&labels);
                period = period.saturating_mul(2);
            }

            let mut next = self.assign(ctx, &centroids, &labels);
            self.refill_empty(ctx, &mut next, &centroids)?;
            let moved = next.iter().zip(&labels).filter(|(a, b)| a != b).count();
            trace!(iteration, moved, "relocation step");
            if moved == 0 {
                converged = true;
                break;
            }

            let cycled = next == snapshot;
            labels = next;
            centroids = ctx.centroids(&labels, self.k, self.aggregate)?;
            if cycled {
                trace!(iteration, "assignment cycle detected");
                break;
            }
        }

        let mut error = 0.0;
        for (i, &label) in labels.iter().enumerate() {
            error += centroids[label]
                .distance_to_item(&self.dissimilarity, ctx.dataset, ctx.axis, &ctx.weights, i)
                .ok_or(Error::NoOverlap {
                    left: i,
                    right: label,
                })?;
        }

        Ok(Pass {
            labels,
            centroids,
            error,
            converged,
        })
    }

    /// Nearest centroid per item. Items sharing no feature with any centroid keep their
    /// current cluster (cluster 0 before the first assignment).
    fn assign(
        &self,
        ctx: &Context<'_, '_>,
        centroids: &[Centroid],
        current: &[usize],
    ) -> Vec<usize> {
        (0..ctx.n)
            .map(|i| {
                let mut best: Option<(usize, f64)> = None;
                for (j, c) in centroids.iter().enumerate() {
                    let d = c.distance_to_item(
                        &self.dissimilarity,
                        ctx.dataset,
                        ctx.axis,
                        &ctx.weights,
                        i,
                    );
                    if let Some(d) = d {
                        if best.map_or(true, |(_, bd)| d < bd) {
                            best = Some((j, d));
                        }
                    }
                }
                match best {
                    Some((j, _)) => j,
                    None if current[i] < self.k => current[i],
                    None => 0,
                }
            })
            .collect()
    }

    /// Move the worst-fitting item of the largest cluster into each empty cluster.
    ///
    /// `centroids` are the ones `labels` were assigned against.
    fn refill_empty(
        &self,
        ctx: &Context<'_, '_>,
        labels: &mut [usize],
        centroids: &[Centroid],
    ) -> Result<()> {
        let mut counts = vec![0usize; self.k];
        for &l in labels.iter() {
            counts[l] += 1;
        }

        for empty in 0..self.k {
            if counts[empty] > 0 {
                continue;
            }
            let largest = (0..self.k)
                .max_by_key(|&j| (counts[j], Reverse(j)))
                .ok_or(Error::EmptyInput)?;

            let mut farthest: Option<(usize, f64)> = None;
            for (i, _) in labels.iter().enumerate().filter(|(_, &l)| l == largest) {
                let d = centroids[largest]
                    .distance_to_item(&self.dissimilarity, ctx.dataset, ctx.axis, &ctx.weights, i)
                    .unwrap_or(f64::INFINITY);
                if farthest.map_or(true, |(_, fd)| d > fd) {
                    farthest = Some((i, d));
                }
            }
            let (item, _) = farthest.ok_or(Error::EmptyInput)?;

            trace!(cluster = empty, item, from = largest, "refilled empty cluster");
            labels[item] = empty;
            counts[largest] -= 1;
            counts[empty] = 1;
        }
        Ok(())
    }
}

impl Default for Kmeans {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Clustering for Kmeans {
    fn fit_predict(&self, data: &Dataset<'_>) -> Result<Vec<usize>> {
        Ok(self.fit(data)?.labels)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

impl Context<'_, '_> {
    fn centroids(
        &self,
        labels: &[usize],
        k: usize,
        aggregate: Aggregate,
    ) -> Result<Vec<Centroid>> {
        let members = tree::cluster_members(labels, k)?;
        Ok(members
            .iter()
            .map(|m| tree::summarize(m, self.dataset, self.axis, aggregate))
            .collect())
    }

    fn item_centroid(&self, item: usize) -> Centroid {
        let nf = self.dataset.n_features(self.axis);
        let mask: Vec<bool> = (0..nf)
            .map(|f| self.dataset.is_present(self.axis, item, f))
            .collect();
        let values = (0..nf)
            .map(|f| {
                if mask[f] {
                    self.dataset.value(self.axis, item, f)
                } else {
                    0.0
                }
            })
            .collect();
        Centroid { values, mask }
    }
}

fn same_score(a: f64, b: f64) -> bool {
    (a - b).abs() <= SCORE_TOLERANCE * a.abs().max(b.abs())
}

#[cfg(test)]
#[allow(clippy::needless_range_loop)]
mod tests {
    use super::*;

    fn two_groups() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![0.1, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.1],
            vec![5.1, 5.1],
        ]
    }

    fn line() -> Vec<Vec<f64>> {
        vec![vec![0.0], vec![1.0], vec![5.0], vec![6.0], vec![20.0]]
    }

    #[test]
    fn separates_two_groups() {
        let data = two_groups();
        let ds = Dataset::complete(&data).unwrap();
        let fit = Kmeans::new(2).with_passes(10).with_seed(7).fit(&ds).unwrap();

        assert_eq!(fit.labels.len(), 8);
        for i in 1..4 {
            assert_eq!(fit.labels[i], fit.labels[0]);
        }
        for i in 5..8 {
            assert_eq!(fit.labels[i], fit.labels[4]);
        }
        assert_ne!(fit.labels[0], fit.labels[4]);
        assert!(fit.converged);
        assert!(fit.times_found >= 1 && fit.times_found <= 10);
    }

    #[test]
    fn k_equals_n_is_found_every_pass() {
        let data = line();
        let ds = Dataset::complete(&data).unwrap();
        let fit = Kmeans::new(5).with_passes(25).with_seed(3).fit(&ds).unwrap();
        assert_eq!(fit.error, 0.0);
        assert_eq!(fit.times_found, 25);

        let mut labels = fit.labels.clone();
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn initial_assignment_relocates_to_fixed_point() {
        let data = line();
        let ds = Dataset::complete(&data).unwrap();
        let fit = Kmeans::new(2)
            .with_initial_assignment(vec![0, 0, 1, 1, 1])
            .fit(&ds)
            .unwrap();
        assert_eq!(fit.labels, vec![0, 0, 0, 0, 1]);
        // Centroids 3 and 20; squared distances 9 + 4 + 4 + 9 + 0.
        assert!((fit.error - 26.0).abs() < 1e-12);
        assert_eq!(fit.centroids[0].values, vec![3.0]);
    }

    #[test]
    fn empty_cluster_takes_farthest_item_of_largest() {
        let data = line();
        let ds = Dataset::complete(&data).unwrap();
        let km = Kmeans::new(2);
        let ctx = Context {
            dataset: &ds,
            axis: Axis::Rows,
            weights: vec![1.0],
            n: 5,
        };
        let mut labels = vec![0; 5];
        let centroids = ctx.centroids(&labels, 2, Aggregate::Mean).unwrap();
        km.refill_empty(&ctx, &mut labels, &centroids).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn more_passes_never_worse() {
        let data = vec![
            vec![0.0, 1.0],
            vec![0.5, 0.2],
            vec![3.0, 3.1],
            vec![2.9, 2.5],
            vec![9.0, 0.0],
            vec![8.5, 0.4],
            vec![4.0, 8.0],
            vec![4.2, 7.5],
        ];
        let ds = Dataset::complete(&data).unwrap();
        let mut previous = f64::INFINITY;
        for passes in 1..8 {
            let fit = Kmeans::new(3).with_passes(passes).with_seed(11).fit(&ds).unwrap();
            assert!(fit.error <= previous);
            previous = fit.error;
        }
    }

    #[test]
    fn medians_with_missing_values() {
        let data = vec![
            vec![0.0, 0.0, 0.0],
            vec![0.2, 99.0, 0.1],
            vec![0.1, 0.2, 0.0],
            vec![9.0, 9.0, 9.0],
            vec![9.2, 9.1, -50.0],
            vec![9.1, 9.0, 9.2],
        ];
        let mask = vec![
            vec![true, true, true],
            vec![true, false, true],
            vec![true, true, true],
            vec![true, true, true],
            vec![true, true, false],
            vec![true, true, true],
        ];
        let ds = Dataset::new(&data, &mask).unwrap();
        let fit = Kmeans::new(2)
            .with_aggregate(Aggregate::Median)
            .with_passes(5)
            .with_seed(1)
            .fit(&ds)
            .unwrap();
        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[0], fit.labels[2]);
        assert_eq!(fit.labels[3], fit.labels[4]);
        assert_eq!(fit.labels[3], fit.labels[5]);
        assert_ne!(fit.labels[0], fit.labels[3]);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let data = two_groups();
        let ds = Dataset::complete(&data).unwrap();
        let model = Kmeans::new(3).with_passes(20).with_seed(42);
        let a = model.fit(&ds).unwrap();
        let b = model.fit(&ds).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.error, b.error);
        assert_eq!(a.times_found, b.times_found);
    }

    #[test]
    fn invalid_params() {
        let data = line();
        let ds = Dataset::complete(&data).unwrap();
        assert!(matches!(
            Kmeans::new(0).fit(&ds),
            Err(Error::InvalidClusterCount { .. })
        ));
        assert!(Kmeans::new(6).fit(&ds).is_err());
        assert!(Kmeans::new(2).with_passes(0).fit(&ds).is_err());
        assert!(Kmeans::new(2).with_max_iter(0).fit(&ds).is_err());
        assert!(Kmeans::new(2)
            .with_initial_assignment(vec![0, 1])
            .fit(&ds)
            .is_err());
        assert!(Kmeans::new(2)
            .with_initial_assignment(vec![0, 1, 2, 0, 1])
            .fit(&ds)
            .is_err());
    }

    #[test]
    fn clusters_columns() {
        let data = vec![vec![0.0, 0.1, 7.0, 7.1], vec![1.0, 1.1, 3.0, 3.1]];
        let ds = Dataset::complete(&data).unwrap();
        let labels = Kmeans::new(2)
            .with_axis(Axis::Columns)
            .with_passes(5)
            .with_seed(5)
            .fit_predict(&ds)
            .unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }
}
