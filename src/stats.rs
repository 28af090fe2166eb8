//! Collection statistics.

use serde::Serialize;

/// Size statistics over the forest's leaf buckets.  Wide, even buckets mean
/// the trees are balanced; a huge max with a tiny mean means many duplicate
/// or near-duplicate points defeated splitting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BucketStats {
    pub count: usize,
    pub mean: f64,
    pub stdev: f64,
    pub min: usize,
    pub max: usize,
}

impl BucketStats {
    pub fn from_sizes(sizes: &[usize]) -> Self {
        if sizes.is_empty() {
            return Self::default();
        }
        let count = sizes.len();
        let mean = sizes.iter().sum::<usize>() as f64 / count as f64;
        let variance =
            sizes.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / count as f64;
        Self {
            count,
            mean,
            stdev: variance.sqrt(),
            min: *sizes.iter().min().unwrap(),
            max: *sizes.iter().max().unwrap(),
        }
    }
}

/// Snapshot produced by `Collection::compute_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    /// Live documents.
    pub document_count: usize,
    /// Retained deletion tombstones.
    pub tombstone_count: usize,
    /// Total file bytes, freelist included.
    pub file_size_bytes: u64,
    /// Reusable bytes inside the file.
    pub free_bytes: u64,
    /// Mean distance over a sample of 100 random document pairs; 0 when the
    /// collection holds fewer than two documents.
    pub average_distance: f64,
    /// Leaf bucket sizes across every tree of the forest.
    pub leaf_buckets: BucketStats,
}
