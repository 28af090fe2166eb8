//! Header span — format anchor at offset 0.
//!
//! # Payload layout (stream 0 of the header span, all fields big-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   version        = 1       (BE u32)
//!    4      4   header_length  = 86      (BE u32, full header span bytes)
//!    8      1   metric         0=euclidean, 1=cosine
//!    9      4   dim            vector dimensionality (BE u32)
//!   13      1   quantization   bits per component: 4, 8, 16, 32, 64
//! ```
//!
//! The payload rides inside an ordinary span envelope (magic `VEXH`,
//! sequence 0, empty record id, one stream), so the header is covered by
//! the same SHA-256 discipline as every record.  Record spans begin at
//! `header_length`.
//!
//! All three of `(dim, quantization, metric)` are frozen at creation.
//! Opening a file whose header disagrees with explicitly requested options
//! is an error; there is no renegotiation and no in-place migration.

use byteorder::{BigEndian, ByteOrder};

use crate::codec::Quantization;
use crate::distance::Metric;
use crate::error::{Error, Result};
use crate::span::{self, SpanMagic, SpanReader};

pub const FORMAT_VERSION: u32 = 1;

/// Byte size of the header payload (stream 0).
pub const HEADER_PAYLOAD_SIZE: usize = 4 + 4 + 1 + 4 + 1;

/// Full on-disk size of the header span: the minimal envelope plus one
/// stream entry (id byte, one-byte varuint length, payload).
pub const HEADER_SPAN_SIZE: usize = span::MIN_SPAN_SIZE + 2 + HEADER_PAYLOAD_SIZE;

/// Stream id carrying the header payload inside the header span.
pub const STREAM_HEADER: u8 = 0;

// ── CollectionHeader ─────────────────────────────────────────────────────────

/// The `(version, dim, quantization, metric)` tuple pinned at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionHeader {
    pub version: u32,
    pub metric: Metric,
    pub dim: u32,
    pub quantization: Quantization,
}

impl CollectionHeader {
    pub fn new(dim: u32, quantization: Quantization, metric: Metric) -> Self {
        Self { version: FORMAT_VERSION, metric, dim, quantization }
    }

    /// Encode the complete header span, envelope and checksum included.
    pub fn encode_span(&self, timestamp: i64) -> Vec<u8> {
        let mut payload = [0u8; HEADER_PAYLOAD_SIZE];
        BigEndian::write_u32(&mut payload[0..4], self.version);
        BigEndian::write_u32(&mut payload[4..8], HEADER_SPAN_SIZE as u32);
        payload[8] = self.metric.as_u8();
        BigEndian::write_u32(&mut payload[9..13], self.dim);
        payload[13] = self.quantization.bits();

        let bytes = span::encode_span(
            SpanMagic::Header,
            0,
            0,
            timestamp,
            "",
            &[(STREAM_HEADER, &payload)],
        );
        debug_assert_eq!(bytes.len(), HEADER_SPAN_SIZE);
        bytes
    }

    /// Parse and validate the header span found at offset 0.
    ///
    /// Validation order, cheapest first: magic, checksum, then field
    /// domains.  Any failure is `Corrupt` — a file without a valid header
    /// is not a collection.
    pub fn parse_span(buf: &[u8]) -> Result<Self> {
        let reader = SpanReader::parse(buf)
            .map_err(|e| Error::Corrupt(format!("header span unreadable: {e}")))?;
        if reader.magic() != SpanMagic::Header {
            return Err(Error::Corrupt(format!(
                "bad header magic {:#010x} — not a .vex collection",
                reader.magic().as_u32()
            )));
        }
        reader
            .verify_checksum()
            .map_err(|e| Error::Corrupt(format!("header span checksum failed: {e}")))?;

        let payload = reader
            .stream(STREAM_HEADER)?
            .ok_or_else(|| Error::Corrupt("header span has no header stream".into()))?;
        if payload.len() < HEADER_PAYLOAD_SIZE {
            return Err(Error::Corrupt(format!(
                "header payload is {} bytes, expected {HEADER_PAYLOAD_SIZE}",
                payload.len()
            )));
        }

        let version = BigEndian::read_u32(&payload[0..4]);
        if version != FORMAT_VERSION {
            return Err(Error::Corrupt(format!(
                "unsupported format version {version} (this build handles v{FORMAT_VERSION})"
            )));
        }
        let header_length = BigEndian::read_u32(&payload[4..8]);
        if header_length as u64 != reader.length() {
            return Err(Error::Corrupt(format!(
                "header_length {header_length} disagrees with span length {}",
                reader.length()
            )));
        }
        let metric = Metric::from_u8(payload[8])
            .ok_or_else(|| Error::Corrupt(format!("unknown metric {}", payload[8])))?;
        let dim = BigEndian::read_u32(&payload[9..13]);
        if dim == 0 {
            return Err(Error::Corrupt("dimensionality 0".into()));
        }
        let quantization = Quantization::from_bits(payload[13]).ok_or_else(|| {
            Error::Corrupt(format!("unknown quantization width {}", payload[13]))
        })?;

        Ok(Self { version, metric, dim, quantization })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let h = CollectionHeader::new(768, Quantization::Q16, Metric::Cosine);
        let bytes = h.encode_span(1_700_000_000_000);
        assert_eq!(bytes.len(), HEADER_SPAN_SIZE);
        let back = CollectionHeader::parse_span(&bytes).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn non_header_magic_rejected() {
        let h = CollectionHeader::new(3, Quantization::F64, Metric::Euclidean);
        let mut bytes = h.encode_span(0);
        bytes[0..4].copy_from_slice(&span::MAGIC_ACTIVE.to_be_bytes());
        assert!(matches!(
            CollectionHeader::parse_span(&bytes),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn damaged_header_rejected() {
        let h = CollectionHeader::new(3, Quantization::F64, Metric::Euclidean);
        let mut bytes = h.encode_span(0);
        bytes[40] ^= 0x01;
        assert!(matches!(
            CollectionHeader::parse_span(&bytes),
            Err(Error::Corrupt(_))
        ));
    }
}
