//! Agglomerative hierarchical clustering.
//!
//! Start with every item as its own cluster and repeatedly merge the closest pair until one
//! cluster remains. The merge history is a [`Dendrogram`] of `N - 1` nodes.
//!
//! ## Linkage
//!
//! When clusters `A` and `B` merge, the distance from the merged cluster to every other
//! cluster `C` is updated in place:
//!
//! - **single**: `min(d(A,C), d(B,C))`
//! - **complete**: `max(d(A,C), d(B,C))`
//! - **average**: `(|A| d(A,C) + |B| d(B,C)) / (|A| + |B|)`
//! - **centroid**: recomputed from the merged centroid. The centroid of a feature is the mean
//!   over members that observed it, so the update needs the raw data. Centroid merges are not
//!   guaranteed to be monotone.
//!
//! ## Closest pair
//!
//! Each active slot `a` caches its nearest active slot `b > a`. A merge of `a` and `b` keeps
//! the result in slot `a`, retires `b`, and refreshes only the cached rows that pointed at
//! either of them (or that `a` now beats). Ties resolve to the lexicographically smallest
//! `(a, b)`, so trees are reproducible.
//!
//! Complexity is O(N²) memory and, for typical data, O(N²) time.

use tracing::{debug, trace};

use super::dataset::{Axis, Dataset};
use super::distance::{Dissimilarity, DistanceMatrix, Metric};
use super::traits::Clustering;
use super::tree;
use super::util;
use super::validity::{self, KgsReport};
use crate::error::{Error, Result};

/// Policy for the distance between two clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Linkage {
    /// Closest pair of members.
    Single,
    /// Farthest pair of members.
    Complete,
    /// Mean over all member pairs.
    #[default]
    Average,
    /// Distance between cluster centroids.
    Centroid,
}

impl Linkage {
    /// Single-character selector (`s`, `m`, `a`, `c`).
    pub fn code(self) -> char {
        match self {
            Linkage::Single => 's',
            Linkage::Complete => 'm',
            Linkage::Average => 'a',
            Linkage::Centroid => 'c',
        }
    }

    fn update_rule(self) -> Option<Update> {
        match self {
            Linkage::Single => Some(Update::Min),
            Linkage::Complete => Some(Update::Max),
            Linkage::Average => Some(Update::SizeWeighted),
            Linkage::Centroid => None,
        }
    }
}

impl TryFrom<char> for Linkage {
    type Error = Error;

    fn try_from(code: char) -> Result<Self> {
        match code {
            's' => Ok(Linkage::Single),
            'm' => Ok(Linkage::Complete),
            'a' => Ok(Linkage::Average),
            'c' => Ok(Linkage::Centroid),
            _ => Err(Error::InvalidParameter {
                name: "linkage",
                message: "unknown linkage code",
            }),
        }
    }
}

/// Reference from a dendrogram node to one of its two children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeRef {
    /// An original item.
    Item(usize),
    /// The cluster produced by an earlier node (index into [`Dendrogram::nodes`]).
    Node(usize),
}

impl NodeRef {
    /// Signed encoding: items are `>= 0`, node `k` is `-(k + 1)`.
    pub fn to_signed(self) -> i64 {
        match self {
            NodeRef::Item(i) => i as i64,
            NodeRef::Node(k) => -(k as i64) - 1,
        }
    }

    /// Inverse of [`NodeRef::to_signed`].
    pub fn from_signed(value: i64) -> Self {
        if value >= 0 {
            NodeRef::Item(value as usize)
        } else {
            NodeRef::Node((-(value + 1)) as usize)
        }
    }
}

/// One merge: `left` and `right` fused at `distance`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// First merged cluster.
    pub left: NodeRef,
    /// Second merged cluster.
    pub right: NodeRef,
    /// Linkage distance at which the merge happened.
    pub distance: f64,
}

/// Merge tree over `n_items` items; node `i` is the `(i + 1)`-th merge.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "DendrogramParts"))]
pub struct Dendrogram {
    n_items: usize,
    nodes: Vec<Node>,
}

/// Unchecked wire form of a [`Dendrogram`]; deserialization goes through `from_nodes`.
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct DendrogramParts {
    n_items: usize,
    nodes: Vec<Node>,
}

#[cfg(feature = "serde")]
impl TryFrom<DendrogramParts> for Dendrogram {
    type Error = Error;

    fn try_from(parts: DendrogramParts) -> Result<Self> {
        Self::from_nodes(parts.n_items, parts.nodes)
    }
}

impl Dendrogram {
    /// Validate a merge list built elsewhere.
    ///
    /// Every item and every node except the last must be referenced exactly once, and a node
    /// may only reference earlier nodes.
    pub fn from_nodes(n_items: usize, nodes: Vec<Node>) -> Result<Self> {
        if n_items == 0 {
            return Err(Error::EmptyInput);
        }
        if nodes.len() != n_items - 1 {
            return Err(Error::DimensionMismatch {
                expected: n_items - 1,
                found: nodes.len(),
            });
        }

        let mut item_used = vec![false; n_items];
        let mut node_used = vec![false; nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            if !node.distance.is_finite() {
                return Err(Error::InvalidParameter {
                    name: "distance",
                    message: "merge distances must be finite",
                });
            }
            for child in [node.left, node.right] {
                let slot = match child {
                    NodeRef::Item(x) if x < n_items => &mut item_used[x],
                    NodeRef::Node(k) if k < i => &mut node_used[k],
                    _ => {
                        return Err(Error::InvalidParameter {
                            name: "nodes",
                            message: "reference out of range or to a later node",
                        })
                    }
                };
                if *slot {
                    return Err(Error::InvalidParameter {
                        name: "nodes",
                        message: "cluster merged twice",
                    });
                }
                *slot = true;
            }
        }

        Ok(Self { n_items, nodes })
    }

    /// Number of original items.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Merge nodes, in merge order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of merge nodes (`n_items - 1`).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for a single-item tree.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Merge distances, in merge order.
    pub fn distances(&self) -> Vec<f64> {
        self.nodes.iter().map(|n| n.distance).collect()
    }

    /// Number of items under each node.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let size_of = |r: NodeRef| match r {
                NodeRef::Item(_) => 1,
                NodeRef::Node(k) => sizes[k],
            };
            let s = size_of(node.left) + size_of(node.right);
            sizes.push(s);
        }
        sizes
    }

    /// Items in left-to-right dendrogram order.
    pub fn leaves(&self) -> Vec<usize> {
        let Some(root) = self.nodes.len().checked_sub(1) else {
            return vec![0];
        };
        let mut out = Vec::with_capacity(self.n_items);
        let mut stack = vec![NodeRef::Node(root)];
        while let Some(r) = stack.pop() {
            match r {
                NodeRef::Item(i) => out.push(i),
                NodeRef::Node(k) => {
                    stack.push(self.nodes[k].right);
                    stack.push(self.nodes[k].left);
                }
            }
        }
        out
    }

    /// Flat assignment into `k` clusters. See [`tree::cut_tree`].
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        tree::cut_tree(self, k)
    }
}

/// Agglomerative clusterer configuration.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hierarchical {
    linkage: Linkage,
    dissimilarity: Dissimilarity,
    axis: Axis,
    weights: Option<Vec<f64>>,
    n_clusters: Option<usize>,
}

/// Result of [`Hierarchical::fit`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HierarchicalFit {
    /// Full merge tree.
    pub tree: Dendrogram,
    /// One cluster id per item.
    pub labels: Vec<usize>,
    /// Number of clusters the tree was cut into.
    pub n_clusters: usize,
    /// KGS scores, when the cluster count was selected automatically.
    pub validity: Option<KgsReport>,
}

impl Hierarchical {
    /// Create a clusterer with the given linkage and default Euclidean distances over rows.
    pub fn new(linkage: Linkage) -> Self {
        Self {
            linkage,
            ..Self::default()
        }
    }

    /// Set the linkage policy.
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
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

    /// Cut [`Hierarchical::fit`] results into exactly `k` clusters instead of choosing by KGS.
    pub fn with_n_clusters(mut self, k: usize) -> Self {
        self.n_clusters = Some(k);
        self
    }

    /// The configured linkage.
    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Build the dendrogram from raw data.
    pub fn build_tree(&self, dataset: &Dataset<'_>) -> Result<Dendrogram> {
        let weights = dataset.weights(self.axis, self.weights.as_deref())?;
        let matrix = self
            .dissimilarity
            .matrix(dataset, self.axis, Some(&weights))?;
        self.grow(matrix, Some((dataset, &weights)))
    }

    /// Build the dendrogram from a precomputed matrix.
    ///
    /// The matrix is consumed: it is overwritten with cluster-to-cluster distances while the
    /// tree grows. Clone it first if it is needed afterwards. Centroid linkage is rejected
    /// here because centroids cannot be recomputed without the data.
    pub fn build_tree_from_matrix(&self, matrix: DistanceMatrix) -> Result<Dendrogram> {
        self.grow(matrix, None)
    }

    /// Build the tree and cut it, at the configured count or at the KGS optimum.
    pub fn fit(&self, dataset: &Dataset<'_>) -> Result<HierarchicalFit> {
        let weights = dataset.weights(self.axis, self.weights.as_deref())?;
        let matrix = self
            .dissimilarity
            .matrix(dataset, self.axis, Some(&weights))?;

        let (tree, n_clusters, validity) = match self.n_clusters {
            Some(k) => (self.grow(matrix, Some((dataset, &weights)))?, k, None),
            None => {
                let tree = self.grow(matrix.clone(), Some((dataset, &weights)))?;
                let report = validity::kgs(&tree, &matrix)?;
                (tree, report.best, Some(report))
            }
        };
        let labels = tree.cut(n_clusters)?;
        Ok(HierarchicalFit {
            tree,
            labels,
            n_clusters,
            validity,
        })
    }

    fn grow(
        &self,
        matrix: DistanceMatrix,
        data: Option<(&Dataset<'_>, &[f64])>,
    ) -> Result<Dendrogram> {
        let n = matrix.len();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        debug!(
            n,
            linkage = ?self.linkage,
            metric = ?self.dissimilarity.metric(),
            "building dendrogram"
        );

        let nodes = match (self.linkage.update_rule(), data) {
            (Some(rule), _) => {
                let mut merger = PairwiseMerge {
                    rule,
                    sizes: util::try_filled(n, 1)?,
                };
                agglomerate(matrix, &mut merger)?
            }
            (None, Some((dataset, weights))) => {
                let mut merger =
                    CentroidMerge::new(dataset, self.axis, weights, self.dissimilarity)?;
                agglomerate(matrix, &mut merger)?
            }
            (None, None) => {
                return Err(Error::InvalidParameter {
                    name: "linkage",
                    message: "centroid linkage needs the raw data, not only a distance matrix",
                })
            }
        };

        debug!(
            n,
            top = ?nodes.last().map(|node| node.distance),
            "dendrogram complete"
        );
        Ok(Dendrogram { n_items: n, nodes })
    }
}

impl Clustering for Hierarchical {
    fn fit_predict(&self, data: &Dataset<'_>) -> Result<Vec<usize>> {
        Ok(self.fit(data)?.labels)
    }

    /// Returns 0 when the count is chosen by KGS.
    fn n_clusters(&self) -> usize {
        self.n_clusters.unwrap_or(0)
    }
}

/// Rewrites row `a` of the working matrix after `b` was folded into `a`.
trait Merge {
    fn merge(&mut self, dist: &mut DistanceMatrix, active: &[bool], a: usize, b: usize)
        -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
enum Update {
    Min,
    Max,
    SizeWeighted,
}

struct PairwiseMerge {
    rule: Update,
    sizes: Vec<usize>,
}

impl Merge for PairwiseMerge {
    fn merge(
        &mut self,
        dist: &mut DistanceMatrix,
        active: &[bool],
        a: usize,
        b: usize,
    ) -> Result<()> {
        let (size_a, size_b) = (self.sizes[a] as f64, self.sizes[b] as f64);
        for c in 0..dist.len() {
            if c == a || !active[c] {
                continue;
            }
            let (da, db) = (dist.get(a, c), dist.get(b, c));
            let merged = match self.rule {
                Update::Min => da.min(db),
                Update::Max => da.max(db),
                Update::SizeWeighted => (size_a * da + size_b * db) / (size_a + size_b),
            };
            dist.set(a, c, merged);
        }
        self.sizes[a] += self.sizes[b];
        Ok(())
    }
}

/// Per-slot centroids with per-feature counts of members that observed the feature.
struct CentroidMerge<'a, 'd> {
    dataset: &'a Dataset<'d>,
    axis: Axis,
    weights: &'a [f64],
    dissimilarity: Dissimilarity,
    values: Vec<Vec<f64>>,
    counts: Vec<Vec<usize>>,
}

impl<'a, 'd> CentroidMerge<'a, 'd> {
    fn new(
        dataset: &'a Dataset<'d>,
        axis: Axis,
        weights: &'a [f64],
        dissimilarity: Dissimilarity,
    ) -> Result<Self> {
        let n = dataset.n_items(axis);
        let nf = dataset.n_features(axis);
        let mut values = util::try_with_capacity(n)?;
        let mut counts = util::try_with_capacity(n)?;
        for i in 0..n {
            let mut v = util::try_filled(nf, 0.0)?;
            let mut c = util::try_filled(nf, 0usize)?;
            for f in 0..nf {
                if dataset.is_present(axis, i, f) {
                    v[f] = dataset.value(axis, i, f);
                    c[f] = 1;
                }
            }
            values.push(v);
            counts.push(c);
        }
        Ok(Self {
            dataset,
            axis,
            weights,
            dissimilarity,
            values,
            counts,
        })
    }

    fn centroid_distance(&self, i: usize, j: usize) -> Result<f64> {
        let nf = self.dataset.n_features(self.axis);
        let pairs = (0..nf)
            .filter(|&f| self.counts[i][f] > 0 && self.counts[j][f] > 0)
            .map(|f| (self.values[i][f], self.values[j][f], self.weights[f]));
        self.dissimilarity
            .evaluate(pairs)
            .ok_or(Error::NoOverlap { left: i, right: j })
    }
}

impl Merge for CentroidMerge<'_, '_> {
    fn merge(
        &mut self,
        dist: &mut DistanceMatrix,
        active: &[bool],
        a: usize,
        b: usize,
    ) -> Result<()> {
        for f in 0..self.dataset.n_features(self.axis) {
            let (ca, cb) = (self.counts[a][f], self.counts[b][f]);
            let total = ca + cb;
            if total > 0 {
                let vb = self.values[b][f];
                let va = self.values[a][f];
                self.values[a][f] = (va * ca as f64 + vb * cb as f64) / total as f64;
            }
            self.counts[a][f] = total;
        }
        for c in 0..dist.len() {
            if c == a || !active[c] {
                continue;
            }
            let d = self.centroid_distance(a, c)?;
            dist.set(a, c, d);
        }
        Ok(())
    }
}

/// Nearest active slot above `a`, first index on ties.
fn nearest_above(dist: &DistanceMatrix, active: &[bool], a: usize) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for b in (a + 1)..dist.len() {
        if !active[b] {
            continue;
        }
        let d = dist.get(a, b);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((b, d));
        }
    }
    best
}

fn closest_pair(nearest: &[Option<(usize, f64)>], active: &[bool]) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (a, entry) in nearest.iter().enumerate() {
        if !active[a] {
            continue;
        }
        if let Some((b, d)) = *entry {
            if best.map_or(true, |(_, _, bd)| d < bd) {
                best = Some((a, b, d));
            }
        }
    }
    best
}

fn agglomerate(mut dist: DistanceMatrix, merger: &mut impl Merge) -> Result<Vec<Node>> {
    let n = dist.len();
    let steps = n.saturating_sub(1);

    let mut nodes: Vec<Node> = util::try_with_capacity(steps)?;
    let mut active = util::try_filled(n, true)?;
    let mut refs: Vec<NodeRef> = util::try_with_capacity(n)?;
    refs.extend((0..n).map(NodeRef::Item));
    let mut nearest: Vec<Option<(usize, f64)>> = util::try_filled(n, None)?;
    for a in 0..n {
        nearest[a] = nearest_above(&dist, &active, a);
    }

    for step in 0..steps {
        // At least two slots are active, so some row has a cached neighbour.
        let Some((a, b, d)) = closest_pair(&nearest, &active) else {
            break;
        };
        trace!(step, a, b, distance = d, "merge");
        nodes.push(Node {
            left: refs[a],
            right: refs[b],
            distance: d,
        });

        active[b] = false;
        nearest[b] = None;
        merger.merge(&mut dist, &active, a, b)?;
        refs[a] = NodeRef::Node(step);

        nearest[a] = nearest_above(&dist, &active, a);
        for c in 0..b {
            if c == a || !active[c] {
                continue;
            }
            match nearest[c] {
                Some((m, _)) if m == a || m == b => {
                    nearest[c] = nearest_above(&dist, &active, c);
                }
                Some((m, dm)) if c < a => {
                    let dca = dist.get(c, a);
                    if dca < dm || (dca == dm && a < m) {
                        nearest[c] = Some((a, dca));
                    }
                }
                _ => {}
            }
        }
    }

    Ok(nodes)
}
