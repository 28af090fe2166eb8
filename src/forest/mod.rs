//! LSH forest — randomized hyperplane-partition trees over the live points.
//!
//! # Structure
//!
//! `T` independent binary trees (default 50) share one point set.  Each
//! tree partitions space with its own random hyperplanes, so a near
//! neighbor missed by one tree's cuts is almost always found by another's.
//! Leaves hold at most `leaf_threshold` ids (default 100) and split along a
//! fresh gaussian hyperplane when they overflow.
//!
//! The forest stores ids only.  Vectors are resolved through the owner's
//! [`VectorSource`] when a split must partition a leaf, which keeps the
//! index free of references into the record store.
//!
//! # Parallel inserts
//!
//! Trees are independent, so one insert fans out across all of them
//! concurrently with Rayon when the `parallel` feature is enabled (the
//! default), and falls back to a sequential loop otherwise.  Each tree owns
//! its own RNG, sub-seeded from the forest seed, so results are identical
//! for a fixed seed whether or not the fan-out runs in parallel.
//!
//! # Rebuild
//!
//! The forest is memory-only.  Opening a collection replays every live id
//! through `insert`, which reproduces an equivalent (not bit-identical)
//! forest — tree shape depends on arrival order and RNG draws, neither of
//! which is persisted.

mod node;
mod search;

pub use search::SearchSignal;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::distance::Metric;
use crate::error::Result;

use node::Node;

// ── VectorSource ─────────────────────────────────────────────────────────────

/// Resolver from a document id to its vector, implemented by the owning
/// collection over the span store.  `Sync` because tree inserts fan out
/// across threads, each reading vectors concurrently.
pub trait VectorSource: Sync {
    fn vector(&self, id: u64) -> Result<Vec<f64>>;
}

// ── Config ───────────────────────────────────────────────────────────────────

/// Forest tuning knobs, fixed at collection open.
#[derive(Debug, Clone, Copy)]
pub struct ForestConfig {
    /// Number of independent trees.
    pub trees: usize,
    /// Maximum ids per leaf before it splits.
    pub leaf_threshold: usize,
    /// Consecutive non-improving candidates tolerated before a search gives
    /// up (counted only after the first accepted result).
    pub search_k: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self { trees: 50, leaf_threshold: 100, search_k: 200 }
    }
}

// ── LshForest ────────────────────────────────────────────────────────────────

struct Tree {
    root: Option<Box<Node>>,
    rng: StdRng,
}

pub struct LshForest {
    metric: Metric,
    config: ForestConfig,
    trees: Vec<Tree>,
}

impl LshForest {
    /// An empty forest.  `seed` fixes every future hyperplane draw; pass a
    /// random seed in production and a constant in tests.
    pub fn new(metric: Metric, config: ForestConfig, seed: u64) -> Self {
        let trees = (0..config.trees)
            .map(|i| Tree {
                root: None,
                rng: StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
            })
            .collect();
        Self { metric, config, trees }
    }

    #[inline]
    pub fn config(&self) -> ForestConfig {
        self.config
    }

    /// Insert one point into every tree.
    ///
    /// Fails only if a leaf split cannot resolve a member vector through
    /// `source`; the point is still present in every tree that finished
    /// before the failure surfaced, so callers treat an error here as fatal
    /// for the index and rebuild (reopen) rather than retry.
    pub fn insert<S: VectorSource>(&mut self, id: u64, vector: &[f64], source: &S) -> Result<()> {
        let metric = self.metric;
        let threshold = self.config.leaf_threshold;

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.trees.par_iter_mut().try_for_each(|tree| {
                node::insert(&mut tree.root, id, vector, metric, threshold, &mut tree.rng, source)
            })
        }

        #[cfg(not(feature = "parallel"))]
        {
            self.trees.iter_mut().try_for_each(|tree| {
                node::insert(&mut tree.root, id, vector, metric, threshold, &mut tree.rng, source)
            })
        }
    }

    /// Drop one point from every tree, routing by its vector.
    pub fn remove(&mut self, id: u64, vector: &[f64]) {
        for tree in &mut self.trees {
            node::remove(&mut tree.root, id, vector, self.metric);
        }
    }

    /// Best-first candidate traversal; see [`search::traverse`].
    pub fn search<F>(&self, query: &[f64], cb: &mut F)
    where
        F: FnMut(u64, f64) -> SearchSignal,
    {
        let roots: Vec<&Option<Box<Node>>> = self.trees.iter().map(|t| &t.root).collect();
        search::traverse(&roots, self.metric, self.config.search_k, query, cb);
    }

    /// Size of every leaf across every tree, for bucket statistics.
    pub fn leaf_sizes(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for tree in &self.trees {
            node::leaf_sizes(&tree.root, &mut out);
        }
        out
    }
}
