//! Linear file scan — rebuild the index and freelist from spans alone.
//!
//! # How it works
//!
//! The scanner reads forward from the header span, inspecting each span
//! envelope independently.  It needs no side files and no prior state:
//! every span is self-describing, and `length` makes the next span
//! reachable even when the current one cannot be trusted.
//!
//! Classification per span:
//!
//! | Magic | Checksum | Outcome |
//! |-------|----------|---------|
//! | ACTIVE | valid | candidate for the live index; highest sequence per record id wins, losers join the freelist |
//! | DELETED | valid | candidate for the tombstone index, same sequence rule |
//! | ACTIVE/DELETED | invalid | skipped: `length` bytes are stepped over, logged, and deliberately NOT freed — the bytes stay on disk for inspection |
//! | FREE | not checked | range joins the freelist (freeing flips the magic in place, so the old checksum is stale by design) |
//! | zeroes | — | unwritten tail from a file grow; the remainder joins the freelist |
//! | anything else | — | skipped like a checksum failure when `length` is plausible; otherwise the scan stops and the remainder is left untouched |
//!
//! A torn write therefore invalidates exactly one span: its checksum fails,
//! it is skipped, and the previous generation of the same record (found
//! elsewhere in the file with a lower sequence) remains authoritative.

use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder};
use log::warn;
use serde::Serialize;

use crate::error::Result;
use crate::freelist::FreeList;
use crate::header::CollectionHeader;
use crate::span::{SpanMagic, SpanReader, MIN_SPAN_SIZE};

// ── Report types ─────────────────────────────────────────────────────────────

/// One region the scanner stepped over without trusting.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedSpan {
    /// Absolute byte offset of the span envelope.
    pub offset: u64,
    /// Bytes stepped over.
    pub length: u64,
    /// Why the region was not trusted.
    pub reason: String,
}

/// Outcome of one full-file scan, also produced by `SpanFile::verify`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Total file bytes covered.
    pub file_bytes: u64,
    /// Spans whose envelope parsed, any magic.
    pub spans_scanned: usize,
    /// Live records after sequence resolution.
    pub active: usize,
    /// Tombstones after sequence resolution.
    pub deleted: usize,
    /// FREE spans encountered.
    pub free: usize,
    /// ACTIVE/DELETED spans superseded by a higher sequence for the same
    /// record id; their ranges were reclaimed.
    pub superseded: usize,
    /// Unwritten tail bytes reclaimed.
    pub tail_bytes: u64,
    /// Total reusable bytes after coalescing.
    pub free_bytes: u64,
    /// Disjoint freelist ranges after coalescing.
    pub freelist_ranges: usize,
    /// Highest sequence seen on any trusted span.
    pub max_sequence: u64,
    /// Regions stepped over; empty on a healthy file.
    pub skipped: Vec<SkippedSpan>,
}

impl ScanReport {
    pub fn is_healthy(&self) -> bool {
        self.skipped.is_empty()
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        format!(
            "{} span(s): {} live, {} tombstone(s), {} free, {} superseded; \
             {} skipped region(s); {} B reusable in {} range(s)",
            self.spans_scanned,
            self.active,
            self.deleted,
            self.free,
            self.superseded,
            self.skipped.len(),
            self.free_bytes,
            self.freelist_ranges,
        )
    }
}

// ── Scan outcome ─────────────────────────────────────────────────────────────

/// Everything `SpanFile::open` needs, rebuilt from bytes alone.
pub(crate) struct ScanOutcome {
    pub header: CollectionHeader,
    pub index: BTreeMap<String, u64>,
    pub deleted_index: BTreeMap<String, u64>,
    pub freelist: FreeList,
    pub max_sequence: u64,
    pub report: ScanReport,
}

/// Best span seen so far for one record id.
struct BestSpan {
    sequence: u64,
    offset: u64,
    length: u64,
    deleted: bool,
}

// ── Scanner ──────────────────────────────────────────────────────────────────

/// Scan a complete file image.  Fails only when the header span itself is
/// unusable; all mid-file damage is encoded in the report instead.
pub(crate) fn scan(data: &[u8]) -> Result<ScanOutcome> {
    let header = CollectionHeader::parse_span(data)?;
    let header_len = SpanReader::parse(data)?.length();

    let mut best: BTreeMap<String, BestSpan> = BTreeMap::new();
    let mut freelist = FreeList::new();
    let mut report = ScanReport { file_bytes: data.len() as u64, ..ScanReport::default() };
    let mut max_sequence = 0u64;

    let mut pos = header_len as usize;
    while pos < data.len() {
        let remaining = data.len() - pos;
        if remaining < MIN_SPAN_SIZE {
            // Too small for any span; unwritten tail.
            freelist.release(pos as u64, remaining as u64);
            report.tail_bytes += remaining as u64;
            break;
        }

        let raw_magic = BigEndian::read_u32(&data[pos..pos + 4]);
        let length = BigEndian::read_u64(&data[pos + 4..pos + 12]);

        if raw_magic == 0 && length == 0 {
            // Zero-filled region from a file grow: everything from here to
            // the end of the file is unwritten.
            freelist.release(pos as u64, remaining as u64);
            report.tail_bytes += remaining as u64;
            break;
        }

        let length_plausible = length as usize >= MIN_SPAN_SIZE && length <= remaining as u64;

        let magic = SpanMagic::from_u32(raw_magic);
        let skip = |report: &mut ScanReport, len: u64, reason: String| {
            warn!("scan: skipping {len} B at offset {pos}: {reason}");
            report.skipped.push(SkippedSpan { offset: pos as u64, length: len, reason });
        };

        match magic {
            _ if !length_plausible => {
                // Length cannot be trusted, so nothing past this point can
                // be reached.  Leave the remainder untouched.
                skip(
                    &mut report,
                    remaining as u64,
                    format!("implausible span length {length}, abandoning scan"),
                );
                break;
            }
            Some(SpanMagic::Free) => {
                report.spans_scanned += 1;
                report.free += 1;
                freelist.release(pos as u64, length);
                pos += length as usize;
            }
            Some(m @ (SpanMagic::Active | SpanMagic::Deleted)) => {
                report.spans_scanned += 1;
                match SpanReader::parse(&data[pos..]).and_then(|r| r.verify_checksum().map(|()| r))
                {
                    Ok(reader) => {
                        max_sequence = max_sequence.max(reader.sequence());
                        let entry = BestSpan {
                            sequence: reader.sequence(),
                            offset: pos as u64,
                            length,
                            deleted: m == SpanMagic::Deleted,
                        };
                        let id = reader.record_id().to_owned();
                        match best.get_mut(&id) {
                            Some(prev) if prev.sequence >= entry.sequence => {
                                // Stale duplicate, e.g. a crash before the
                                // old span was freed.
                                report.superseded += 1;
                                freelist.release(entry.offset, entry.length);
                            }
                            Some(prev) => {
                                report.superseded += 1;
                                freelist.release(prev.offset, prev.length);
                                *prev = entry;
                            }
                            None => {
                                best.insert(id, entry);
                            }
                        }
                    }
                    Err(e) => {
                        // Unreadable span: step over it, keep the bytes.
                        skip(&mut report, length, e.to_string());
                    }
                }
                pos += length as usize;
            }
            Some(SpanMagic::Header) | None => {
                skip(
                    &mut report,
                    length,
                    format!("unexpected magic {raw_magic:#010x} mid-file"),
                );
                pos += length as usize;
            }
        }
    }

    let mut index = BTreeMap::new();
    let mut deleted_index = BTreeMap::new();
    for (id, span) in best {
        if span.deleted {
            deleted_index.insert(id, span.offset);
        } else {
            index.insert(id, span.offset);
        }
    }

    report.active = index.len();
    report.deleted = deleted_index.len();
    report.free_bytes = freelist.free_bytes();
    report.freelist_ranges = freelist.len();
    report.max_sequence = max_sequence;

    Ok(ScanOutcome { header, index, deleted_index, freelist, max_sequence, report })
}
