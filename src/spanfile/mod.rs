//! Memory-mapped span store — the durable half of a collection.
//!
//! # Write discipline
//!
//! A record update is an atomic span replacement:
//! 1. encode the new span (checksum included) off-map
//! 2. allocate space: first-fit from the freelist, else grow the file
//! 3. copy the span into the mapping and flush that range to storage
//! 4. flip the superseded span's magic to FREE and reclaim its range
//! 5. update the in-memory index
//!
//! A crash before step 3 completes leaves a span that fails its checksum on
//! the next scan; the previous generation, still ACTIVE elsewhere in the
//! file, wins by sequence.  A crash between steps 3 and 4 leaves two ACTIVE
//! spans for one record; the scanner keeps the higher sequence and reclaims
//! the loser.  Readers therefore only ever observe committed state.
//!
//! # Remapping
//!
//! Growing the file unmaps and remaps the region.  No reference into the
//! old mapping survives the call: every public API takes offsets and
//! re-derives slices per call.  Offsets stay valid because the file only
//! grows at the tail.
//!
//! # Removal
//!
//! `remove` writes a DELETED tombstone span (same record id, no streams)
//! and frees the record's ACTIVE span.  Tombstones keep `(node_id,
//! sequence, timestamp)` flowing to `updates_since` so replication peers
//! observe deletions; a later write to the same id frees the tombstone.

mod scan;

pub use scan::{ScanReport, SkippedSpan};

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use memmap2::MmapMut;

use crate::error::{Error, Result};
use crate::freelist::FreeList;
use crate::header::{CollectionHeader, HEADER_SPAN_SIZE};
use crate::span::{self, SpanMagic, SpanReader};

/// Minimum bytes added per file grow; amortizes remaps for small records.
pub const MIN_GROWTH: u64 = 64 * 1024;

// ── Update batch types ───────────────────────────────────────────────────────

/// One entry of an `updates_since` batch.
#[derive(Debug, Clone)]
pub struct Update {
    pub record_id: String,
    pub node_id: u64,
    pub sequence: u64,
    pub timestamp: i64,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone)]
pub enum UpdateKind {
    /// The record's current streams.
    Write(Vec<(u8, Vec<u8>)>),
    /// The record was removed; a tombstone is all that remains.
    Delete,
}

// ── SpanFile ─────────────────────────────────────────────────────────────────

pub struct SpanFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    header: CollectionHeader,
    /// record id → offset of its ACTIVE span.
    index: BTreeMap<String, u64>,
    /// record id → offset of its DELETED tombstone.
    deleted_index: BTreeMap<String, u64>,
    freelist: FreeList,
    max_sequence: u64,
}

impl SpanFile {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Create a fresh collection file holding only the header span,
    /// truncating anything already at `path`.  Callers that want to keep an
    /// existing file check for it and route to [`SpanFile::open`] instead.
    pub fn create(path: &Path, header: CollectionHeader, timestamp: i64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(HEADER_SPAN_SIZE as u64)?;

        // Safety: the file is open read-write and sized to cover the
        // mapping; no other mapping of it exists in this process (the open
        // registry in `collection` enforces one handle per file).
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let header_span = header.encode_span(timestamp);
        mmap[..header_span.len()].copy_from_slice(&header_span);
        mmap.flush()?;

        Ok(Self {
            path: path.to_owned(),
            file,
            mmap,
            header,
            index: BTreeMap::new(),
            deleted_index: BTreeMap::new(),
            freelist: FreeList::new(),
            max_sequence: 0,
        })
    }

    /// Open an existing collection file and rebuild index and freelist by
    /// scanning it.
    ///
    /// Fails with `Corrupt` if the header span is unreadable.  Damaged
    /// record spans do not fail the open: they are skipped with a warning
    /// and their bytes are preserved on disk (see the scanner).
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len < HEADER_SPAN_SIZE as u64 {
            return Err(Error::Corrupt(format!(
                "file is {len} bytes, smaller than the {HEADER_SPAN_SIZE}-byte header span"
            )));
        }

        // Safety: as in `create`.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let outcome = scan::scan(&mmap)?;
        debug!("opened {}: {}", path.display(), outcome.report.summary());

        Ok(Self {
            path: path.to_owned(),
            file,
            mmap,
            header: outcome.header,
            index: outcome.index,
            deleted_index: outcome.deleted_index,
            freelist: outcome.freelist,
            max_sequence: outcome.max_sequence,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn header(&self) -> CollectionHeader {
        self.header
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live records.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of retained tombstones.
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.deleted_index.len()
    }

    #[inline]
    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    #[inline]
    pub fn free_bytes(&self) -> u64 {
        self.freelist.free_bytes()
    }

    #[inline]
    pub fn contains(&self, record_id: &str) -> bool {
        self.index.contains_key(record_id)
    }

    /// Offset of the record's ACTIVE span, if live.
    #[inline]
    pub fn offset_of(&self, record_id: &str) -> Option<u64> {
        self.index.get(record_id).copied()
    }

    /// Live record ids in index order.
    pub fn record_ids(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// The sequence the next local write should carry: one past the highest
    /// sequence seen on any span so far.
    #[inline]
    pub fn next_sequence(&self) -> u64 {
        self.max_sequence + 1
    }

    // ── Record operations ────────────────────────────────────────────────────

    /// Atomically replace the record's span with a new ACTIVE span.
    ///
    /// `sequence` must exceed every sequence previously written for this
    /// record id (use [`SpanFile::next_sequence`] for local writes; replays
    /// of remote updates pass the originating sequence through).
    pub fn write(
        &mut self,
        record_id: &str,
        streams: &[(u8, &[u8])],
        node_id: u64,
        sequence: u64,
        timestamp: i64,
    ) -> Result<()> {
        let bytes = span::encode_span(
            SpanMagic::Active,
            sequence,
            node_id,
            timestamp,
            record_id,
            streams,
        );
        let offset = self.allocate(bytes.len() as u64)?;
        self.mmap[offset as usize..offset as usize + bytes.len()].copy_from_slice(&bytes);
        self.mmap.flush_range(offset as usize, bytes.len())?;

        // New span is durable; retire the old generation and any tombstone.
        if let Some(old) = self.index.insert(record_id.to_owned(), offset) {
            self.mark_free(old)?;
        }
        if let Some(tomb) = self.deleted_index.remove(record_id) {
            self.mark_free(tomb)?;
        }
        self.max_sequence = self.max_sequence.max(sequence);
        Ok(())
    }

    /// Locate, checksum-verify, and return a reader over the record's span.
    pub fn read(&self, record_id: &str) -> Result<SpanReader<'_>> {
        let &offset = self
            .index
            .get(record_id)
            .ok_or_else(|| Error::NotFound(record_id.to_owned()))?;
        let reader = SpanReader::parse(&self.mmap[offset as usize..])?;
        reader.verify_checksum()?;
        Ok(reader)
    }

    /// Replace the record's ACTIVE span with a DELETED tombstone.
    pub fn remove(&mut self, record_id: &str, node_id: u64, timestamp: i64) -> Result<()> {
        if !self.index.contains_key(record_id) {
            return Err(Error::NotFound(record_id.to_owned()));
        }

        let sequence = self.next_sequence();
        let bytes = span::encode_span(
            SpanMagic::Deleted,
            sequence,
            node_id,
            timestamp,
            record_id,
            &[],
        );
        let offset = self.allocate(bytes.len() as u64)?;
        self.mmap[offset as usize..offset as usize + bytes.len()].copy_from_slice(&bytes);
        self.mmap.flush_range(offset as usize, bytes.len())?;

        let old = self
            .index
            .remove(record_id)
            .expect("checked above; no remap invalidates the index");
        self.mark_free(old)?;
        if let Some(prev) = self.deleted_index.insert(record_id.to_owned(), offset) {
            self.mark_free(prev)?;
        }
        self.max_sequence = sequence;
        Ok(())
    }

    /// Visit every live record in index order.
    ///
    /// The reader handed to `f` has a parsed envelope but an unverified
    /// checksum: spans were verified when scanned in, and per-record paths
    /// (`read`) re-verify.  Callers that need the guarantee call
    /// `verify_checksum` on the reader themselves.
    pub fn iterate<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, SpanReader<'_>) -> Result<()>,
    {
        for (id, &offset) in &self.index {
            let reader = SpanReader::parse(&self.mmap[offset as usize..])?;
            f(id, reader)?;
        }
        Ok(())
    }

    /// Collect every write and deletion whose `(node_id, sequence)` strictly
    /// exceeds the cursor entry for its origin node, ordered by
    /// `(node_id, sequence)` ascending and capped at `max`.
    ///
    /// An empty cursor returns everything: every live record and every
    /// retained tombstone.
    pub fn updates_since(&self, cursor: &HashMap<u64, u64>, max: usize) -> Result<Vec<Update>> {
        let mut updates = Vec::new();

        for (offsets, deleted) in [(&self.index, false), (&self.deleted_index, true)] {
            for (id, &offset) in offsets {
                let reader = SpanReader::parse(&self.mmap[offset as usize..])?;
                let floor = cursor.get(&reader.node_id()).copied().unwrap_or(0);
                if reader.sequence() <= floor {
                    continue;
                }
                let kind = if deleted {
                    UpdateKind::Delete
                } else {
                    let streams = reader
                        .streams()?
                        .into_iter()
                        .map(|(sid, bytes)| (sid, bytes.to_vec()))
                        .collect();
                    UpdateKind::Write(streams)
                };
                updates.push(Update {
                    record_id: id.clone(),
                    node_id: reader.node_id(),
                    sequence: reader.sequence(),
                    timestamp: reader.timestamp(),
                    kind,
                });
            }
        }

        updates.sort_by_key(|u| (u.node_id, u.sequence));
        updates.truncate(max);
        Ok(updates)
    }

    /// Re-scan the whole file and report span health.  The live state of
    /// this handle is not touched.
    pub fn verify(&self) -> Result<ScanReport> {
        Ok(scan::scan(&self.mmap)?.report)
    }

    /// Flush the full mapping to storage.
    pub fn flush(&mut self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    // ── Allocation ───────────────────────────────────────────────────────────

    /// First-fit from the freelist, else grow the file and retry.
    fn allocate(&mut self, size: u64) -> Result<u64> {
        if let Some(offset) = self.freelist.allocate(size) {
            return Ok(offset);
        }
        self.grow(size)?;
        self.freelist
            .allocate(size)
            .ok_or_else(|| Error::Corrupt("grow did not produce a usable range".into()))
    }

    /// Extend the file by `max(needed, MIN_GROWTH)` and remap.
    ///
    /// The old mapping is flushed and dropped before the new one is used;
    /// nothing holds a reference into it across this call.
    fn grow(&mut self, needed: u64) -> Result<()> {
        let old_len = self.mmap.len() as u64;
        let add = needed.max(MIN_GROWTH);
        let new_len = old_len + add;

        self.mmap.flush()?;
        self.file.set_len(new_len)?;
        // Safety: as in `create`; the file covers [0, new_len).
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        self.freelist.release(old_len, add);

        debug!(
            "grew {} from {old_len} to {new_len} bytes",
            self.path.display()
        );
        Ok(())
    }

    /// Flip a superseded span's magic to FREE in place and reclaim its
    /// range.  Only the magic bytes change; `length` stays valid so scans
    /// can keep walking, and the stale checksum is never consulted for
    /// FREE spans.
    fn mark_free(&mut self, offset: u64) -> Result<()> {
        let off = offset as usize;
        let length = BigEndian::read_u64(&self.mmap[off + 4..off + 12]);
        BigEndian::write_u32(&mut self.mmap[off..off + 4], span::MAGIC_FREE);
        self.mmap.flush_range(off, 4)?;
        self.freelist.release(offset, length);
        Ok(())
    }
}
