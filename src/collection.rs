//! High-level [`Collection`] API — the primary embedding surface.
//!
//! ```no_run
//! use vexel::collection::{Collection, CollectionOptions, SearchArgs};
//! use vexel::codec::Quantization;
//!
//! let mut opts = CollectionOptions::new("notes");
//! opts.dim = Some(3);
//! opts.quantization = Some(Quantization::F64);
//! let col = Collection::open(opts)?;
//!
//! col.add_document(1, &[0.1, 0.2, 0.3], b"first note")?;
//! let response = col.search(&SearchArgs::knn(vec![0.1, 0.2, 0.3], 1))?;
//! assert_eq!(response.results[0].id, 1);
//! # Ok::<(), vexel::Error>(())
//! ```
//!
//! A collection wires the three leaves together: the span store holds the
//! durable records, the codec packs and unpacks them, and the forest serves
//! candidate ids.  The forest never touches the file; the store never looks
//! inside payloads.  This type is the single mutation entry point, and one
//! `parking_lot::Mutex` serializes every operation, which is what makes an
//! `add_document` happen-before any later `get_document`/`search` and gives
//! each search a stable snapshot for its whole traversal.
//!
//! One live handle per file, enforced process-wide: opening a collection
//! that another handle owns fails with `AlreadyExists`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use log::warn;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::Quantization;
use crate::distance::Metric;
use crate::error::{Error, Result};
use crate::forest::{ForestConfig, LshForest, SearchSignal, VectorSource};
use crate::header::CollectionHeader;
use crate::spanfile::{ScanReport, SpanFile, Update};
use crate::stats::{BucketStats, CollectionStats};

/// Stream id carrying the codec payload inside a record span.
pub const STREAM_RECORD: u8 = 1;

/// Document pairs sampled for the average-distance statistic.
const STATS_SAMPLE_PAIRS: usize = 100;

// ── Open-handle registry ─────────────────────────────────────────────────────
//
// One active handle per file.  Keyed by absolute path; closing (or
// dropping) a collection releases its slot.

static OPEN_FILES: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        std::env::current_dir().map(|d| d.join(path)).unwrap_or_else(|_| path.to_owned())
    }
}

fn register(path: &PathBuf) -> Result<()> {
    if !OPEN_FILES.lock().insert(path.clone()) {
        return Err(Error::AlreadyExists(path.display().to_string()));
    }
    Ok(())
}

fn unregister(path: &PathBuf) {
    OPEN_FILES.lock().remove(path);
}

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Open the file if present, create it otherwise (the default).
    CreateIfNotExists,
    /// Always start fresh, truncating any existing file.
    CreateAndOverwrite,
    /// Fail with `NotFound` unless the file already exists.
    OpenExisting,
}

/// Configuration for [`Collection::open`].
///
/// `dim`, `quantization`, and `metric` are `Option` so that opening an
/// existing file can distinguish "take whatever the header says" (`None`)
/// from an explicit requirement: a `Some` value that disagrees with the
/// header is an `InvalidOption` error, never a silent migration.
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    pub name: String,
    pub path: PathBuf,
    pub dim: Option<u32>,
    pub quantization: Option<Quantization>,
    pub metric: Option<Metric>,
    pub create_mode: CreateMode,
    pub forest: ForestConfig,
    /// Replication origin id stamped on every local write.
    pub node_id: u64,
    /// Fixes the forest's hyperplane draws; random when `None`.
    pub seed: Option<u64>,
}

impl CollectionOptions {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(format!("{name}.vex")),
            name,
            dim: None,
            quantization: None,
            metric: None,
            create_mode: CreateMode::CreateIfNotExists,
            forest: ForestConfig::default(),
            node_id: 0,
            seed: None,
        }
    }
}

// ── Document / search types ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: u64,
    pub vector: Vec<f64>,
    pub metadata: Vec<u8>,
}

/// How much work a search is allowed to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// Linear scan over every live document.  Exact, O(n).
    Exact,
    /// Best-first forest traversal.  Approximate, usually sublinear.
    #[default]
    Medium,
}

impl Precision {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(Precision::Exact),
            "medium" => Some(Precision::Medium),
            _ => None,
        }
    }
}

/// One search request.
///
/// `k > 0` asks for the k nearest neighbors; `radius > 0` asks for every
/// document within the radius; together they bound each other.  With both
/// zero the call lists all documents ordered by id, paginated by
/// `offset`/`limit`, without distance ranking.
pub struct SearchArgs<'a> {
    pub vector: Vec<f64>,
    pub k: usize,
    pub radius: f64,
    pub precision: Precision,
    pub offset: usize,
    pub limit: usize,
    /// Metadata predicate; `false` skips the candidate before scoring.
    /// Opaque to the collection — how it was produced is the caller's
    /// business.
    pub filter: Option<&'a (dyn Fn(u64, &[u8]) -> bool + Sync)>,
}

impl<'a> SearchArgs<'a> {
    pub fn knn(vector: Vec<f64>, k: usize) -> Self {
        Self { vector, k, radius: 0.0, precision: Precision::default(), offset: 0, limit: usize::MAX, filter: None }
    }

    pub fn within_radius(vector: Vec<f64>, radius: f64) -> Self {
        Self { vector, k: 0, radius, precision: Precision::default(), offset: 0, limit: usize::MAX, filter: None }
    }

    /// The k=0, radius=0 listing mode.
    pub fn list_all(offset: usize, limit: usize) -> Self {
        Self { vector: Vec::new(), k: 0, radius: 0.0, precision: Precision::default(), offset, limit, filter: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: u64,
    pub distance: f64,
    pub metadata: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// Matches ordered by distance ascending, ties by id ascending.
    pub results: Vec<SearchResult>,
    /// `100 × points_scored / live_count` — a confidence proxy.  Candidates
    /// rejected by the filter or unreadable on disk are not "scored".
    pub percent_searched: f64,
}

// ── VectorSource over the span store ─────────────────────────────────────────

struct SpanSource<'a> {
    spans: &'a SpanFile,
    quantization: Quantization,
    dim: usize,
}

impl SpanSource<'_> {
    fn document(&self, id: u64) -> Result<(Vec<f64>, Vec<u8>)> {
        let reader = self.spans.read(&id.to_string())?;
        let payload = reader
            .stream(STREAM_RECORD)?
            .ok_or_else(|| Error::Corrupt(format!("record {id} has no payload stream")))?;
        self.quantization.decode(payload, self.dim)
    }
}

impl VectorSource for SpanSource<'_> {
    fn vector(&self, id: u64) -> Result<Vec<f64>> {
        Ok(self.document(id)?.0)
    }
}

// ── Collection ───────────────────────────────────────────────────────────────

struct Inner {
    /// `None` once closed; the mapping is released at that point.
    spans: Option<SpanFile>,
    forest: LshForest,
    /// Document id → span offset, mirroring the span store's string-keyed
    /// index on the u64 side.
    ids: HashMap<u64, u64>,
    node_id: u64,
}

pub struct Collection {
    name: String,
    path: PathBuf,
    header: CollectionHeader,
    inner: Mutex<Inner>,
}

impl Collection {
    // ── Open ─────────────────────────────────────────────────────────────────

    /// Open or create a collection according to `options.create_mode`.
    ///
    /// On open of an existing file the header's `(dim, quantization,
    /// metric)` are authoritative; explicitly requested values that
    /// disagree fail with `InvalidOption`.  Creation requires `dim` and
    /// defaults to `F64` quantization and the euclidean metric.
    pub fn open(options: CollectionOptions) -> Result<Self> {
        if options.forest.trees == 0 {
            return Err(Error::InvalidOption("forest needs at least one tree".into()));
        }
        if options.forest.leaf_threshold == 0 {
            return Err(Error::InvalidOption("leaf threshold must be at least 1".into()));
        }

        let path = absolute(&options.path);
        register(&path)?;
        match Self::open_registered(&options, &path) {
            Ok(col) => Ok(col),
            Err(e) => {
                unregister(&path);
                Err(e)
            }
        }
    }

    fn open_registered(options: &CollectionOptions, path: &Path) -> Result<Self> {
        let file_exists = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        let open_existing = match options.create_mode {
            CreateMode::OpenExisting if !file_exists => {
                return Err(Error::NotFound(path.display().to_string()));
            }
            CreateMode::OpenExisting => true,
            CreateMode::CreateAndOverwrite => false,
            CreateMode::CreateIfNotExists => file_exists,
        };

        let spans = if open_existing {
            let spans = SpanFile::open(path)?;
            let header = spans.header();
            if let Some(dim) = options.dim {
                if dim != header.dim {
                    return Err(Error::InvalidOption(format!(
                        "requested dim {dim} but the collection is {}-dimensional",
                        header.dim
                    )));
                }
            }
            if let Some(q) = options.quantization {
                if q != header.quantization {
                    return Err(Error::InvalidOption(format!(
                        "requested {}-bit quantization but the collection uses {} bits",
                        q.bits(),
                        header.quantization.bits()
                    )));
                }
            }
            if let Some(m) = options.metric {
                if m != header.metric {
                    return Err(Error::InvalidOption(format!(
                        "requested metric {} but the collection uses {}",
                        m.name(),
                        header.metric.name()
                    )));
                }
            }
            spans
        } else {
            let dim = options
                .dim
                .ok_or_else(|| Error::InvalidOption("dim is required to create a collection".into()))?;
            if dim == 0 {
                return Err(Error::InvalidOption("dim must be at least 1".into()));
            }
            let header = CollectionHeader::new(
                dim,
                options.quantization.unwrap_or(Quantization::F64),
                options.metric.unwrap_or(Metric::Euclidean),
            );
            SpanFile::create(path, header, Utc::now().timestamp_millis())?
        };

        let header = spans.header();
        let seed = options.seed.unwrap_or_else(|| rand::random());
        let mut forest = LshForest::new(header.metric, options.forest, seed);

        // Rebuild the memory-only forest by replaying live ids.
        let mut ids: HashMap<u64, u64> = HashMap::new();
        {
            let source =
                SpanSource { spans: &spans, quantization: header.quantization, dim: header.dim as usize };
            let mut pending: Vec<(u64, Vec<f64>)> = Vec::with_capacity(spans.len());
            spans.iterate(|record_id, reader| {
                let Ok(id) = record_id.parse::<u64>() else {
                    warn!("skipping record with non-numeric id {record_id:?}");
                    return Ok(());
                };
                let payload = reader
                    .stream(STREAM_RECORD)?
                    .ok_or_else(|| Error::Corrupt(format!("record {id} has no payload stream")))?;
                match header.quantization.decode(payload, header.dim as usize) {
                    Ok((vector, _)) => pending.push((id, vector)),
                    Err(e) => warn!("record {id} is unreadable and stays out of the index: {e}"),
                }
                Ok(())
            })?;
            for (id, vector) in pending {
                forest.insert(id, &vector, &source)?;
                if let Some(offset) = spans.offset_of(&id.to_string()) {
                    ids.insert(id, offset);
                }
            }
        }

        Ok(Self {
            name: options.name.clone(),
            path: path.to_owned(),
            header,
            inner: Mutex::new(Inner { spans: Some(spans), forest, ids, node_id: options.node_id }),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.header.dim as usize
    }

    #[inline]
    pub fn metric(&self) -> Metric {
        self.header.metric
    }

    #[inline]
    pub fn quantization(&self) -> Quantization {
        self.header.quantization
    }

    /// Live document count.
    pub fn len(&self) -> usize {
        self.inner.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Write operations ─────────────────────────────────────────────────────

    /// Insert or replace a document.
    ///
    /// The span write lands (and flushes) before the forest sees the id, so
    /// a crash mid-call loses the index update but never the record.  The
    /// forest is routed with the vector as it decodes from disk, not the
    /// caller's original, so that a later removal under lossy quantization
    /// descends the exact same path.
    pub fn add_document(&self, id: u64, vector: &[f64], metadata: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let spans = inner.spans.as_mut().ok_or(Error::Closed)?;

        if vector.len() != self.header.dim as usize {
            return Err(Error::DimensionMismatch { got: vector.len(), want: self.header.dim as usize });
        }

        let quantization = self.header.quantization;
        let dim = self.header.dim as usize;
        let record_id = id.to_string();

        // Vector the index will route by: the decoded image of what we are
        // about to persist.
        let payload = quantization.encode(vector, metadata);
        let (indexed_vector, _) = quantization.decode(&payload, dim)?;

        // If the id is live, capture its current indexed vector for removal
        // before the span is replaced.
        let old_vector = if inner.ids.contains_key(&id) {
            let source = SpanSource { spans: &*spans, quantization, dim };
            Some(source.vector(id)?)
        } else {
            None
        };

        let sequence = spans.next_sequence();
        spans.write(
            &record_id,
            &[(STREAM_RECORD, &payload)],
            inner.node_id,
            sequence,
            Utc::now().timestamp_millis(),
        )?;

        if let Some(old) = old_vector {
            inner.forest.remove(id, &old);
        }
        let source = SpanSource { spans: &*spans, quantization, dim };
        inner.forest.insert(id, &indexed_vector, &source)?;

        let offset = spans.offset_of(&record_id).expect("span was just written");
        inner.ids.insert(id, offset);
        Ok(())
    }

    /// Replace a document's metadata, leaving vector and index untouched.
    pub fn update_document_metadata(&self, id: u64, metadata: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let spans = inner.spans.as_mut().ok_or(Error::Closed)?;

        if !inner.ids.contains_key(&id) {
            return Err(Error::NotFound(id.to_string()));
        }
        let quantization = self.header.quantization;
        let dim = self.header.dim as usize;
        let (vector, _) = SpanSource { spans: &*spans, quantization, dim }.document(id)?;

        let record_id = id.to_string();
        let payload = quantization.encode(&vector, metadata);
        let sequence = spans.next_sequence();
        spans.write(
            &record_id,
            &[(STREAM_RECORD, &payload)],
            inner.node_id,
            sequence,
            Utc::now().timestamp_millis(),
        )?;
        let offset = spans.offset_of(&record_id).expect("span was just written");
        inner.ids.insert(id, offset);
        Ok(())
    }

    /// Remove a document: route the removal through every tree by its
    /// vector, then replace its span with a tombstone.
    pub fn remove_document(&self, id: u64) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let spans = inner.spans.as_mut().ok_or(Error::Closed)?;

        if !inner.ids.contains_key(&id) {
            return Err(Error::NotFound(id.to_string()));
        }
        let quantization = self.header.quantization;
        let dim = self.header.dim as usize;
        let vector = SpanSource { spans: &*spans, quantization, dim }.vector(id)?;

        inner.forest.remove(id, &vector);
        spans.remove(&id.to_string(), inner.node_id, Utc::now().timestamp_millis())?;
        inner.ids.remove(&id);
        Ok(())
    }

    // ── Read operations ──────────────────────────────────────────────────────

    pub fn get_document(&self, id: u64) -> Result<Document> {
        let guard = self.inner.lock();
        let spans = guard.spans.as_ref().ok_or(Error::Closed)?;
        let source = SpanSource {
            spans,
            quantization: self.header.quantization,
            dim: self.header.dim as usize,
        };
        let (vector, metadata) = source.document(id)?;
        Ok(Document { id, vector, metadata })
    }

    /// All live ids, ascending.
    pub fn get_all_ids(&self) -> Result<Vec<u64>> {
        let guard = self.inner.lock();
        if guard.spans.is_none() {
            return Err(Error::Closed);
        }
        let mut ids: Vec<u64> = guard.ids.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    // ── Search ───────────────────────────────────────────────────────────────

    pub fn search(&self, args: &SearchArgs<'_>) -> Result<SearchResponse> {
        let guard = self.inner.lock();
        let inner = &*guard;
        let spans = inner.spans.as_ref().ok_or(Error::Closed)?;

        // k=0, radius=0: plain id-ordered listing, no distance ranking.
        if args.k == 0 && args.radius == 0.0 {
            return self.list_documents(inner, spans, args);
        }

        if args.vector.len() != self.header.dim as usize {
            return Err(Error::DimensionMismatch {
                got: args.vector.len(),
                want: self.header.dim as usize,
            });
        }

        let live_count = inner.ids.len();
        let source = SpanSource {
            spans,
            quantization: self.header.quantization,
            dim: self.header.dim as usize,
        };
        let metric = self.header.metric;

        let mut scored = 0usize;
        let mut results: Vec<SearchResult> = Vec::new();

        match args.precision {
            Precision::Exact => {
                for &id in inner.ids.keys() {
                    let Ok((vector, metadata)) = source.document(id) else {
                        continue;
                    };
                    if let Some(filter) = args.filter {
                        if !filter(id, &metadata) {
                            continue;
                        }
                    }
                    let distance = metric.distance(&args.vector, &vector);
                    scored += 1;
                    if args.radius > 0.0 && distance > args.radius {
                        continue;
                    }
                    results.push(SearchResult { id, distance, metadata });
                }
            }
            Precision::Medium => {
                // Keep the k nearest in a max-heap so the current worst is
                // always on top; the envelope fed back to the forest is the
                // tightest bound the result set justifies so far.
                let mut heap: std::collections::BinaryHeap<(OrderedFloat<f64>, u64)> =
                    std::collections::BinaryHeap::new();
                let mut kept: HashMap<u64, SearchResult> = HashMap::new();
                let radius_bound = if args.radius > 0.0 { args.radius } else { f64::INFINITY };

                let mut cb = |id: u64, _envelope: f64| -> SearchSignal {
                    let Ok((vector, metadata)) = source.document(id) else {
                        // Unreadable candidate: a corrupted record must not
                        // break the query.
                        return SearchSignal::Checked;
                    };
                    if let Some(filter) = args.filter {
                        if !filter(id, &metadata) {
                            return SearchSignal::Ignored;
                        }
                    }
                    let distance = metric.distance(&args.vector, &vector);
                    scored += 1;
                    if distance > radius_bound {
                        return SearchSignal::Checked;
                    }

                    if args.k == 0 {
                        // Pure radius query: everything inside the bound is
                        // a result and the envelope is the fixed radius.
                        kept.insert(id, SearchResult { id, distance, metadata });
                        return SearchSignal::Accepted(radius_bound);
                    }

                    if heap.len() < args.k {
                        heap.push((OrderedFloat(distance), id));
                        kept.insert(id, SearchResult { id, distance, metadata });
                        let envelope = if heap.len() == args.k {
                            heap.peek().expect("just filled").0 .0
                        } else {
                            radius_bound
                        };
                        SearchSignal::Accepted(envelope.min(radius_bound))
                    } else if distance < heap.peek().expect("k > 0").0 .0 {
                        let (_, evicted) = heap.pop().expect("non-empty");
                        kept.remove(&evicted);
                        heap.push((OrderedFloat(distance), id));
                        kept.insert(id, SearchResult { id, distance, metadata });
                        let envelope = heap.peek().expect("non-empty").0 .0;
                        SearchSignal::Accepted(envelope.min(radius_bound))
                    } else {
                        SearchSignal::Checked
                    }
                };
                inner.forest.search(&args.vector, &mut cb);
                results = kept.into_values().collect();
            }
        }

        results.sort_by_key(|r| (OrderedFloat(r.distance), r.id));
        if args.k > 0 {
            results.truncate(args.k);
        }

        let percent_searched = if live_count == 0 {
            100.0
        } else {
            100.0 * scored as f64 / live_count as f64
        };
        Ok(SearchResponse { results, percent_searched })
    }

    fn list_documents(
        &self,
        inner: &Inner,
        spans: &SpanFile,
        args: &SearchArgs<'_>,
    ) -> Result<SearchResponse> {
        let mut ids: Vec<u64> = inner.ids.keys().copied().collect();
        ids.sort_unstable();

        let source = SpanSource {
            spans,
            quantization: self.header.quantization,
            dim: self.header.dim as usize,
        };
        let mut results = Vec::new();
        for &id in ids.iter().skip(args.offset).take(args.limit) {
            let (_, metadata) = source.document(id)?;
            if let Some(filter) = args.filter {
                if !filter(id, &metadata) {
                    continue;
                }
            }
            results.push(SearchResult { id, distance: 0.0, metadata });
        }

        let live = inner.ids.len();
        let percent_searched =
            if live == 0 { 100.0 } else { 100.0 * results.len() as f64 / live as f64 };
        Ok(SearchResponse { results, percent_searched })
    }

    // ── Stats ────────────────────────────────────────────────────────────────

    pub fn compute_stats(&self) -> Result<CollectionStats> {
        let guard = self.inner.lock();
        let inner = &*guard;
        let spans = inner.spans.as_ref().ok_or(Error::Closed)?;

        let ids: Vec<u64> = inner.ids.keys().copied().collect();
        let source = SpanSource {
            spans,
            quantization: self.header.quantization,
            dim: self.header.dim as usize,
        };

        let average_distance = if ids.len() < 2 {
            0.0
        } else {
            let mut rng = StdRng::from_entropy();
            let mut total = 0.0;
            let mut pairs = 0usize;
            for _ in 0..STATS_SAMPLE_PAIRS {
                let i = rng.gen_range(0..ids.len());
                let mut j = rng.gen_range(0..ids.len() - 1);
                if j >= i {
                    j += 1;
                }
                let (Ok(a), Ok(b)) = (source.vector(ids[i]), source.vector(ids[j])) else {
                    continue;
                };
                total += self.header.metric.distance(&a, &b);
                pairs += 1;
            }
            if pairs == 0 { 0.0 } else { total / pairs as f64 }
        };

        Ok(CollectionStats {
            document_count: ids.len(),
            tombstone_count: spans.tombstones(),
            file_size_bytes: spans.file_size(),
            free_bytes: spans.free_bytes(),
            average_distance,
            leaf_buckets: BucketStats::from_sizes(&inner.forest.leaf_sizes()),
        })
    }

    // ── Replication hooks ────────────────────────────────────────────────────

    /// Writes and deletions past the per-node cursor, ordered by
    /// `(node_id, sequence)` and capped at `max`.  See `SpanFile`.
    pub fn updates_since(&self, cursor: &HashMap<u64, u64>, max: usize) -> Result<Vec<Update>> {
        let guard = self.inner.lock();
        let spans = guard.spans.as_ref().ok_or(Error::Closed)?;
        spans.updates_since(cursor, max)
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Re-scan the file and report span health without touching live state.
    pub fn verify(&self) -> Result<ScanReport> {
        let guard = self.inner.lock();
        let spans = guard.spans.as_ref().ok_or(Error::Closed)?;
        spans.verify()
    }

    /// Flush, unmap, and release the file.  Every later call on this handle
    /// fails with `Closed`.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let mut spans = guard.spans.take().ok_or(Error::Closed)?;
        spans.flush()?;
        drop(spans);
        unregister(&self.path);
        Ok(())
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        let mut guard = self.inner.lock();
        if let Some(mut spans) = guard.spans.take() {
            let _ = spans.flush();
            unregister(&self.path);
        }
    }
}
