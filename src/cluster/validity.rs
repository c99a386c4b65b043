//! Choosing the number of clusters from a dendrogram.
//!
//! The Kelley-Gardner-Sutcliffe (KGS) penalty walks the tree from `N - 1` clusters down to 2.
//! At each level it measures how spread out the non-singleton clusters are, rescales the
//! average spread onto `[1, N - 1]`, and adds the cluster count. Tight clusters keep the first
//! term low while the second term charges for every extra cluster; the count with the lowest
//! penalty wins.

use tracing::debug;

use super::distance::DistanceMatrix;
use super::hierarchical::{Dendrogram, NodeRef};
use crate::error::{Error, Result};

/// Penalty for one candidate cluster count.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KgsScore {
    /// Candidate cluster count.
    pub n_clusters: usize,
    /// Mean spread of the clusters with at least two members.
    pub average_spread: f64,
    /// Rescaled spread plus `n_clusters`; lower is better.
    pub penalty: f64,
}

/// Outcome of [`kgs`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KgsReport {
    /// Cluster count with the lowest penalty.
    pub best: usize,
    /// One score per count, from `N - 1` down to 2.
    pub scores: Vec<KgsScore>,
    /// All levels had the same average spread; every penalty is then 1.0 and `best` is `N - 1`.
    pub degenerate: bool,
}

/// Score every cut of `tree` and pick the count with the lowest KGS penalty.
///
/// Ties keep the larger count. `matrix` must be the distance matrix the tree was built from
/// (or any matrix over the same items).
pub fn kgs(tree: &Dendrogram, matrix: &DistanceMatrix) -> Result<KgsReport> {
    let n = tree.n_items();
    if n != matrix.len() {
        return Err(Error::DimensionMismatch {
            expected: n,
            found: matrix.len(),
        });
    }
    if n < 3 {
        return Err(Error::InvalidClusterCount {
            requested: 2,
            n_items: n,
        });
    }

    // Replay the merges. After node t is applied there are N - 1 - t clusters; the
    // non-singleton ones are exactly the active nodes.
    let nodes = tree.nodes();
    let mut members: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
    let mut node_spread: Vec<f64> = Vec::with_capacity(nodes.len());
    let mut active = vec![false; nodes.len()];
    let mut levels = Vec::with_capacity(n - 2);

    for (t, node) in nodes[..n - 2].iter().enumerate() {
        let mut merged = Vec::new();
        for side in [node.left, node.right] {
            match side {
                NodeRef::Item(i) => merged.push(i),
                NodeRef::Node(j) => {
                    active[j] = false;
                    merged.append(&mut members[j]);
                }
            }
        }
        merged.sort_unstable();
        // A merged cluster always has at least two members.
        node_spread.push(spread(&merged, matrix).unwrap_or(0.0));
        members.push(merged);
        active[t] = true;

        let (sum, count) = (0..=t)
            .filter(|&j| active[j])
            .fold((0.0, 0usize), |(s, c), j| (s + node_spread[j], c + 1));
        levels.push((n - 1 - t, sum / count as f64));
    }

    let min_spread = levels.iter().map(|&(_, s)| s).fold(f64::INFINITY, f64::min);
    let max_spread = levels
        .iter()
        .map(|&(_, s)| s)
        .fold(f64::NEG_INFINITY, f64::max);
    let degenerate = max_spread == min_spread;

    let multiplier = (n - 2) as f64 / (max_spread - min_spread);
    let scores: Vec<KgsScore> = levels
        .into_iter()
        .map(|(k, s)| KgsScore {
            n_clusters: k,
            average_spread: s,
            penalty: if degenerate {
                1.0
            } else {
                multiplier * (s - min_spread) + 1.0 + k as f64
            },
        })
        .collect();

    let mut best = &scores[0];
    for score in &scores[1..] {
        if score.penalty < best.penalty {
            best = score;
        }
    }
    let best = best.n_clusters;

    debug!(n, best, degenerate, min_spread, max_spread, "kgs selection");
    Ok(KgsReport {
        best,
        scores,
        degenerate,
    })
}

/// Each member's mean distance to the other members. A singleton yields `[0.0]`.
pub fn distances_to_others(members: &[usize], matrix: &DistanceMatrix) -> Vec<f64> {
    if members.len() < 2 {
        return vec![0.0; members.len()];
    }
    let others = (members.len() - 1) as f64;
    members
        .iter()
        .map(|&i| {
            members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| matrix.get(i, j))
                .sum::<f64>()
                / others
        })
        .collect()
}

/// Mean over members of [`distances_to_others`]; `None` for fewer than two members.
pub fn spread(members: &[usize], matrix: &DistanceMatrix) -> Option<f64> {
    if members.len() < 2 {
        return None;
    }
    let d = distances_to_others(members, matrix);
    Some(d.iter().sum::<f64>() / d.len() as f64)
}

/// Mean [`spread`] over the clusters with at least two members.
pub fn average_spread(clusters: &[Vec<usize>], matrix: &DistanceMatrix) -> Option<f64> {
    let spreads: Vec<f64> = clusters.iter().filter_map(|c| spread(c, matrix)).collect();
    if spreads.is_empty() {
        return None;
    }
    Some(spreads.iter().sum::<f64>() / spreads.len() as f64)
}

/// Member with the lowest mean distance to the others (lowest index on ties).
pub fn medoid(members: &[usize], matrix: &DistanceMatrix) -> Option<usize> {
    let d = distances_to_others(members, matrix);
    let mut best: Option<(usize, f64)> = None;
    for (&m, &v) in members.iter().zip(&d) {
        let better = match best {
            None => true,
            Some((bm, bv)) => v < bv || (v == bv && m < bm),
        };
        if better {
            best = Some((m, v));
        }
    }
    best.map(|(m, _)| m)
}
