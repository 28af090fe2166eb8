//! Partition-tree nodes: id-list leaves and hyperplane internals.
//!
//! A node is either a leaf holding up to `leaf_threshold` document ids, or
//! an internal node holding a partition `(normal, b)` plus, per subtree,
//! the largest distance any enclosed point has ever had to the partition
//! boundary (`l_radius` / `r_radius`).  Radii only ever grow; removals do
//! not shrink them, so they stay a conservative upper bound and the
//! admissibility of best-first pruning is never violated.
//!
//! Nodes hold ids only, never record data: vectors are resolved through the
//! owning collection's [`VectorSource`] when a split needs to partition a
//! leaf's members.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::distance::{norm, Metric, Side};
use crate::error::Result;

use super::VectorSource;

/// Two pivot vectors closer than this (L∞) cannot define a partition; the
/// split is skipped and retried on a later insert.
const PIVOT_EPSILON: f64 = 1e-9;

pub(crate) enum Node {
    Leaf(Vec<u64>),
    Internal(Internal),
}

pub(crate) struct Internal {
    pub normal: Vec<f64>,
    pub b: f64,
    pub l_radius: f64,
    pub r_radius: f64,
    pub left: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
}

// ── Insert ───────────────────────────────────────────────────────────────────

/// Insert `id` into the subtree rooted at `node`, splitting an overfull
/// leaf along a fresh random hyperplane.
pub(crate) fn insert<S: VectorSource + ?Sized>(
    node: &mut Option<Box<Node>>,
    id: u64,
    vector: &[f64],
    metric: Metric,
    leaf_threshold: usize,
    rng: &mut StdRng,
    source: &S,
) -> Result<()> {
    match node {
        None => {
            *node = Some(Box::new(Node::Leaf(vec![id])));
            Ok(())
        }
        Some(boxed) => match boxed.as_mut() {
            Node::Leaf(ids) => {
                ids.push(id);
                if ids.len() > leaf_threshold {
                    if let Some(split) = try_split(ids, metric, rng, source)? {
                        **boxed = Node::Internal(split);
                    }
                }
                Ok(())
            }
            Node::Internal(int) => {
                let (side, dist) = metric.hyperplane_side(vector, &int.normal, int.b);
                match side {
                    Side::Left => {
                        int.l_radius = int.l_radius.max(dist);
                        insert(&mut int.left, id, vector, metric, leaf_threshold, rng, source)
                    }
                    Side::Right => {
                        int.r_radius = int.r_radius.max(dist);
                        insert(&mut int.right, id, vector, metric, leaf_threshold, rng, source)
                    }
                }
            }
        },
    }
}

// ── Split ────────────────────────────────────────────────────────────────────

/// Attempt to split an overfull leaf.
///
/// Draws two distinct member ids uniformly as pivots.  Returns `Ok(None)`
/// without splitting when the pivots are indistinguishable (about-equal
/// vectors) or when the partition leaves one side empty; the leaf simply
/// stays oversized and the next insert retries with fresh pivots.
fn try_split<S: VectorSource + ?Sized>(
    ids: &[u64],
    metric: Metric,
    rng: &mut StdRng,
    source: &S,
) -> Result<Option<Internal>> {
    debug_assert!(ids.len() >= 2);

    let i = rng.gen_range(0..ids.len());
    let mut j = rng.gen_range(0..ids.len() - 1);
    if j >= i {
        j += 1;
    }
    let v1 = source.vector(ids[i])?;
    let v2 = source.vector(ids[j])?;

    if v1.iter().zip(&v2).all(|(a, b)| (a - b).abs() <= PIVOT_EPSILON) {
        return Ok(None);
    }

    let normal = random_unit_normal(rng, v1.len());
    let b = match metric {
        Metric::Euclidean => {
            let mid: Vec<f64> = v1.iter().zip(&v2).map(|(a, b)| (a + b) / 2.0).collect();
            norm(&mid)
        }
        Metric::Cosine => 0.0,
    };

    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut l_radius = 0.0f64;
    let mut r_radius = 0.0f64;
    for &id in ids {
        let v = source.vector(id)?;
        let (side, dist) = metric.hyperplane_side(&v, &normal, b);
        match side {
            Side::Left => {
                left.push(id);
                l_radius = l_radius.max(dist);
            }
            Side::Right => {
                right.push(id);
                r_radius = r_radius.max(dist);
            }
        }
    }

    if left.is_empty() || right.is_empty() {
        return Ok(None);
    }

    Ok(Some(Internal {
        normal,
        b,
        l_radius,
        r_radius,
        left: Some(Box::new(Node::Leaf(left))),
        right: Some(Box::new(Node::Leaf(right))),
    }))
}

/// Unit-norm vector with gaussian-distributed direction.
fn random_unit_normal(rng: &mut StdRng, dim: usize) -> Vec<f64> {
    loop {
        let v: Vec<f64> = (0..dim).map(|_| rng.sample(StandardNormal)).collect();
        let n = norm(&v);
        if n > 0.0 {
            return v.into_iter().map(|x| x / n).collect();
        }
    }
}

// ── Remove ───────────────────────────────────────────────────────────────────

/// Remove `id` from the subtree, descending along the side its vector
/// implies.  Emptied leaves become `None`; an internal node whose children
/// are both gone collapses to `None` as well.  Radii are left untouched.
pub(crate) fn remove(node: &mut Option<Box<Node>>, id: u64, vector: &[f64], metric: Metric) {
    let Some(boxed) = node else { return };
    match boxed.as_mut() {
        Node::Leaf(ids) => {
            ids.retain(|&x| x != id);
            if ids.is_empty() {
                *node = None;
            }
        }
        Node::Internal(int) => {
            let (side, _) = metric.hyperplane_side(vector, &int.normal, int.b);
            match side {
                Side::Left => remove(&mut int.left, id, vector, metric),
                Side::Right => remove(&mut int.right, id, vector, metric),
            }
            if int.left.is_none() && int.right.is_none() {
                *node = None;
            }
        }
    }
}

// ── Stats support ────────────────────────────────────────────────────────────

/// Append the size of every leaf under `node`.
pub(crate) fn leaf_sizes(node: &Option<Box<Node>>, out: &mut Vec<usize>) {
    match node.as_deref() {
        None => {}
        Some(Node::Leaf(ids)) => out.push(ids.len()),
        Some(Node::Internal(int)) => {
            leaf_sizes(&int.left, out);
            leaf_sizes(&int.right, out);
        }
    }
}
