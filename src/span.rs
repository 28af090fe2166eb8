//! Span format v1 — fully self-describing, mandatory checksums.
//!
//! # On-disk layout (variable length, all fields big-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   magic         HEADER / ACTIVE / FREE / DELETED  (BE u32)
//!    4      8   length        total span bytes incl. checksum   (BE u64)
//!   12      8   sequence      per-record write counter          (BE u64)
//!   20      8   node_id       replication origin                (BE u64)
//!   28      8   timestamp     unix milliseconds                 (BE i64)
//!   36      1   record_id_len
//!   37      n   record_id     UTF-8 bytes
//!  37+n     1   num_streams
//!   ...    ...  { stream_id:u8  stream_len:varuint  stream_bytes }*
//!  tail    32   checksum      SHA-256 of all preceding span bytes
//! ```
//!
//! # Endianness
//! Every numeric field is big-endian.  This is non-negotiable and encoded
//! in the format version carried by the header span.
//!
//! # Checksums
//! The trailing SHA-256 covers every byte of the span before it, magic
//! included.  Readers of ACTIVE and DELETED spans verify it before trusting
//! any field; there is no opt-out.  FREE spans are the one exception: a
//! span is freed by flipping its magic in place, which deliberately breaks
//! the old checksum.  Only `magic` and `length` of a FREE span are
//! meaningful, and the scanner reads nothing else from them.
//!
//! # Index reconstruction
//! `length` makes every span walkable without an index: the open-time scan
//! reads the envelope, skips `length` bytes, and continues.  A span whose
//! checksum fails is skipped the same way, so one torn write cannot hide
//! the spans behind it.

use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

// ── Constants ────────────────────────────────────────────────────────────────

/// Magic of the header span at offset 0.  BE u32, ASCII "VEXH".
pub const MAGIC_HEADER: u32 = 0x5645_5848;
/// Magic of a live record span.  ASCII "SPAN".
pub const MAGIC_ACTIVE: u32 = 0x5350_414E;
/// Magic of a reclaimable span.  ASCII "FREE".
pub const MAGIC_FREE: u32 = 0x4652_4545;
/// Magic of a deletion tombstone, retained for replication.  ASCII "TOMB".
pub const MAGIC_DELETED: u32 = 0x544F_4D42;

/// Fixed envelope bytes before the record id: magic + length + sequence +
/// node_id + timestamp + record_id_len.
pub const SPAN_FIXED_HEAD: usize = 4 + 8 + 8 + 8 + 8 + 1;

/// SHA-256 output size.
pub const CHECKSUM_SIZE: usize = 32;

/// Smallest well-formed span: empty record id, zero streams.
pub const MIN_SPAN_SIZE: usize = SPAN_FIXED_HEAD + 1 /* num_streams */ + CHECKSUM_SIZE;

// ── Span magic ───────────────────────────────────────────────────────────────

/// Discriminates the role of a span within the collection file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanMagic {
    /// The header span pinning `(dim, quantization, metric)`.  Offset 0 only.
    Header,
    /// Live record span.
    Active,
    /// Superseded span; its range belongs to the freelist.
    Free,
    /// Deletion tombstone.  Carries the record id and no streams.
    Deleted,
}

impl SpanMagic {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            MAGIC_HEADER => Some(SpanMagic::Header),
            MAGIC_ACTIVE => Some(SpanMagic::Active),
            MAGIC_FREE => Some(SpanMagic::Free),
            MAGIC_DELETED => Some(SpanMagic::Deleted),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        match self {
            SpanMagic::Header => MAGIC_HEADER,
            SpanMagic::Active => MAGIC_ACTIVE,
            SpanMagic::Free => MAGIC_FREE,
            SpanMagic::Deleted => MAGIC_DELETED,
        }
    }
}

// ── Varuint ──────────────────────────────────────────────────────────────────

/// Append `v` as an unsigned LEB128 varuint.
pub fn write_varuint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decode an unsigned LEB128 varuint from the front of `buf`.
/// Returns `(value, bytes_consumed)`.
pub fn read_varuint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

// ── Checksum ─────────────────────────────────────────────────────────────────

/// SHA-256 of `bytes`, as written to the span tail.
pub fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut h = Sha256::new();
    h.update(bytes);
    h.finalize().into()
}

// ── encode_span ──────────────────────────────────────────────────────────────

/// Build a complete span: envelope, streams, trailing SHA-256.
///
/// `streams` are written in the order given; stream ids need not be sorted
/// but must be unique (the reader returns the first match).  The returned
/// buffer is exactly `length` bytes and can be written to disk verbatim.
///
/// Panics if `record_id` exceeds 255 bytes — callers derive record ids from
/// u64 document ids, which render to at most 20 decimal digits.
pub fn encode_span(
    magic: SpanMagic,
    sequence: u64,
    node_id: u64,
    timestamp: i64,
    record_id: &str,
    streams: &[(u8, &[u8])],
) -> Vec<u8> {
    assert!(record_id.len() <= u8::MAX as usize, "record id too long");
    assert!(streams.len() <= u8::MAX as usize, "too many streams");

    let mut body = Vec::with_capacity(
        MIN_SPAN_SIZE
            + record_id.len()
            + streams.iter().map(|(_, s)| s.len() + 11).sum::<usize>(),
    );

    body.extend_from_slice(&magic.as_u32().to_be_bytes());
    body.extend_from_slice(&[0u8; 8]); // length patched below
    body.extend_from_slice(&sequence.to_be_bytes());
    body.extend_from_slice(&node_id.to_be_bytes());
    body.extend_from_slice(&timestamp.to_be_bytes());
    body.push(record_id.len() as u8);
    body.extend_from_slice(record_id.as_bytes());
    body.push(streams.len() as u8);
    for (stream_id, bytes) in streams {
        body.push(*stream_id);
        write_varuint(&mut body, bytes.len() as u64);
        body.extend_from_slice(bytes);
    }

    // Patch the total length (checksum included) before hashing: the
    // checksum must cover the final byte image, length field and all.
    let total = (body.len() + CHECKSUM_SIZE) as u64;
    BigEndian::write_u64(&mut body[4..12], total);

    let sum = checksum(&body);
    body.extend_from_slice(&sum);
    body
}

// ── SpanReader ───────────────────────────────────────────────────────────────

/// Zero-copy view over one span inside a mapped region.
///
/// Parsing validates the envelope only; the SHA-256 is verified separately
/// via [`SpanReader::verify_checksum`] so the open-time scan can classify
/// FREE spans (whose checksum is intentionally stale) without paying for a
/// hash it would ignore.  Streams are parsed lazily, per lookup.
#[derive(Debug, Clone, Copy)]
pub struct SpanReader<'a> {
    magic: SpanMagic,
    sequence: u64,
    node_id: u64,
    timestamp: i64,
    /// The full span image, `length` bytes, checksum included.
    data: &'a [u8],
    record_id_end: usize,
    num_streams: u8,
}

impl<'a> SpanReader<'a> {
    /// Parse the span starting at `buf[0]`.  `buf` may extend past the span;
    /// the reader confines itself to the `length` declared in the envelope.
    ///
    /// Returns `Err(Corrupt)` on an unknown magic, a length that overruns
    /// `buf` or underruns the fixed envelope, or a record id that overruns
    /// the span.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < MIN_SPAN_SIZE {
            return Err(Error::Corrupt(format!(
                "span truncated: {} bytes left, envelope needs {MIN_SPAN_SIZE}",
                buf.len()
            )));
        }

        let raw_magic = BigEndian::read_u32(&buf[0..4]);
        let magic = SpanMagic::from_u32(raw_magic)
            .ok_or_else(|| Error::Corrupt(format!("unknown span magic {raw_magic:#010x}")))?;

        let length = BigEndian::read_u64(&buf[4..12]) as usize;
        if length < MIN_SPAN_SIZE || length > buf.len() {
            return Err(Error::Corrupt(format!(
                "span length {length} outside [{MIN_SPAN_SIZE}, {}]",
                buf.len()
            )));
        }

        let sequence = BigEndian::read_u64(&buf[12..20]);
        let node_id = BigEndian::read_u64(&buf[20..28]);
        let timestamp = BigEndian::read_i64(&buf[28..36]);

        let record_id_len = buf[36] as usize;
        let record_id_end = SPAN_FIXED_HEAD + record_id_len;
        if record_id_end + 1 + CHECKSUM_SIZE > length {
            return Err(Error::Corrupt(format!(
                "record id ({record_id_len} bytes) overruns span of {length} bytes"
            )));
        }
        let num_streams = buf[record_id_end];

        Ok(Self {
            magic,
            sequence,
            node_id,
            timestamp,
            data: &buf[..length],
            record_id_end,
            num_streams,
        })
    }

    #[inline]
    pub fn magic(&self) -> SpanMagic {
        self.magic
    }

    /// Total on-disk size of this span, checksum included.
    #[inline]
    pub fn length(&self) -> u64 {
        self.data.len() as u64
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The record id, or an empty string for the header span.
    pub fn record_id(&self) -> &'a str {
        // Non-UTF-8 ids cannot be written by this crate; a damaged id region
        // would have failed the checksum check on any verified path.
        std::str::from_utf8(&self.data[SPAN_FIXED_HEAD..self.record_id_end]).unwrap_or("")
    }

    #[inline]
    pub fn num_streams(&self) -> u8 {
        self.num_streams
    }

    /// Verify the trailing SHA-256 against the span body.
    pub fn verify_checksum(&self) -> Result<()> {
        let body_len = self.data.len() - CHECKSUM_SIZE;
        let stored = &self.data[body_len..];
        let computed = checksum(&self.data[..body_len]);
        if stored != computed {
            return Err(Error::Checksum {
                record_id: self.record_id().to_owned(),
                stored: hex::encode(stored),
                computed: hex::encode(computed),
            });
        }
        Ok(())
    }

    /// Look up one stream by id, walking the stream table lazily.
    ///
    /// Returns `None` for an absent id.  Returns `Err(Corrupt)` if the
    /// stream table itself is malformed, which on a checksum-verified span
    /// indicates a writer bug rather than disk damage.
    pub fn stream(&self, want: u8) -> Result<Option<&'a [u8]>> {
        let mut pos = self.record_id_end + 1;
        let end = self.data.len() - CHECKSUM_SIZE;
        for _ in 0..self.num_streams {
            if pos + 1 > end {
                return Err(Error::Corrupt("stream table overruns span".into()));
            }
            let id = self.data[pos];
            pos += 1;
            let (len, used) = read_varuint(&self.data[pos..end])
                .ok_or_else(|| Error::Corrupt("bad stream length varuint".into()))?;
            pos += used;
            let len = len as usize;
            if pos + len > end {
                return Err(Error::Corrupt(format!(
                    "stream {id} of {len} bytes overruns span"
                )));
            }
            if id == want {
                return Ok(Some(&self.data[pos..pos + len]));
            }
            pos += len;
        }
        Ok(None)
    }

    /// All streams in table order.
    pub fn streams(&self) -> Result<Vec<(u8, &'a [u8])>> {
        let mut out = Vec::with_capacity(self.num_streams as usize);
        let mut pos = self.record_id_end + 1;
        let end = self.data.len() - CHECKSUM_SIZE;
        for _ in 0..self.num_streams {
            if pos + 1 > end {
                return Err(Error::Corrupt("stream table overruns span".into()));
            }
            let id = self.data[pos];
            pos += 1;
            let (len, used) = read_varuint(&self.data[pos..end])
                .ok_or_else(|| Error::Corrupt("bad stream length varuint".into()))?;
            pos += used;
            let len = len as usize;
            if pos + len > end {
                return Err(Error::Corrupt(format!(
                    "stream {id} of {len} bytes overruns span"
                )));
            }
            out.push((id, &self.data[pos..pos + len]));
            pos += len;
        }
        Ok(out)
    }
}
