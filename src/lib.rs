//! # vexel — embeddable vector database over the .vex collection file
//!
//! A collection is one file on disk holding numeric vectors plus opaque
//! metadata, answering nearest-neighbor and radius queries under a
//! configurable distance metric.
//!
//! Format guarantees (frozen in v1):
//! - All numeric fields are big-endian; never negotiated
//! - Every span is self-describing: magic, length, sequence, origin node,
//!   timestamp, record id, streams
//! - Every span carries a mandatory SHA-256 over all preceding span bytes;
//!   corrupt spans abort reads, they are never silently repaired
//! - The header span at offset 0 pins the collection's `(dim, quantization,
//!   metric)` triple for life; none of the three can change after creation
//! - The id → offset index and the freelist are reconstructible by scanning
//!   forward from offset 0 without any side files
//! - Free space is reused first-fit; adjacent free ranges always coalesce
//!
//! Search is served by a forest of randomized hyperplane-partition trees
//! ([`forest::LshForest`]) with an explicit precision/exactness trade-off:
//! `medium` walks the forest best-first, `exact` falls back to a linear
//! scan over every live record.

pub mod codec;
pub mod collection;
pub mod distance;
pub mod error;
pub mod forest;
pub mod freelist;
pub mod header;
pub mod span;
pub mod spanfile;
pub mod stats;

// Flat re-exports for the most common types.
pub use codec::Quantization;
pub use collection::{
    Collection, CollectionOptions, CreateMode, Document, Precision, SearchArgs, SearchResponse,
    SearchResult,
};
pub use distance::Metric;
pub use error::{Error, Result};
pub use forest::{ForestConfig, LshForest, SearchSignal, VectorSource};
pub use header::CollectionHeader;
pub use span::{SpanMagic, SpanReader};
pub use spanfile::{ScanReport, SpanFile, Update, UpdateKind};
pub use stats::{BucketStats, CollectionStats};
