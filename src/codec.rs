//! Quantized vector payload codec.
//!
//! # Payload layout (all fields big-endian)
//!
//! ```text
//! Offset  Size            Field
//!    0    vector_size     packed vector components
//!   ...     4             metadata_len (BE u32)
//!   ...   metadata_len    metadata bytes (opaque)
//! ```
//!
//! # Quantization widths
//!
//! | Width | Encoding | Vector bytes |
//! |-------|----------|--------------|
//! | 4  | linear [0,1] → [0,15], two components per byte | ceil(dim/2) |
//! | 8  | linear [0,1] → [0,255]                         | dim         |
//! | 16 | linear [0,1] → [0,65535]                       | dim × 2     |
//! | 32 | IEEE-754 binary32 bit pattern (lossless)       | dim × 4     |
//! | 64 | IEEE-754 binary64 bit pattern (lossless)       | dim × 8     |
//!
//! Lossy widths clamp each component to [0,1], scale to the full integer
//! range, and round half-to-even; decode divides back out.  The worst-case
//! round-trip error per component is `1 / (2^q − 1)`.  For width 4 the
//! first component of each pair occupies the high nibble; an odd final
//! component leaves the low nibble zero.
//!
//! The codec is pure and stateless: it never touches the span layer and the
//! span layer never looks inside stream payloads.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

// ── Quantization ─────────────────────────────────────────────────────────────

/// Bits per vector component on disk.  Pinned by the header span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Quantization {
    Q4,
    Q8,
    Q16,
    F32,
    F64,
}

impl Quantization {
    /// On-disk encoding: the raw bit width.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            4 => Some(Quantization::Q4),
            8 => Some(Quantization::Q8),
            16 => Some(Quantization::Q16),
            32 => Some(Quantization::F32),
            64 => Some(Quantization::F64),
            _ => None,
        }
    }

    #[inline]
    pub fn bits(self) -> u8 {
        match self {
            Quantization::Q4 => 4,
            Quantization::Q8 => 8,
            Quantization::Q16 => 16,
            Quantization::F32 => 32,
            Quantization::F64 => 64,
        }
    }

    /// Packed byte size of one `dim`-component vector.
    pub fn vector_size(self, dim: usize) -> usize {
        match self {
            Quantization::Q4 => dim.div_ceil(2),
            Quantization::Q8 => dim,
            Quantization::Q16 => dim * 2,
            Quantization::F32 => dim * 4,
            Quantization::F64 => dim * 8,
        }
    }

    /// Encode `(vector, metadata)` into a span stream payload.
    pub fn encode(self, vector: &[f64], metadata: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.vector_size(vector.len()) + 4 + metadata.len());

        match self {
            Quantization::Q4 => {
                for pair in vector.chunks(2) {
                    let hi = quantize(pair[0], 15) as u8;
                    let lo = if pair.len() == 2 { quantize(pair[1], 15) as u8 } else { 0 };
                    out.push((hi << 4) | lo);
                }
            }
            Quantization::Q8 => {
                for &x in vector {
                    out.push(quantize(x, 255) as u8);
                }
            }
            Quantization::Q16 => {
                for &x in vector {
                    out.extend_from_slice(&(quantize(x, 65_535) as u16).to_be_bytes());
                }
            }
            Quantization::F32 => {
                for &x in vector {
                    out.extend_from_slice(&(x as f32).to_bits().to_be_bytes());
                }
            }
            Quantization::F64 => {
                for &x in vector {
                    out.extend_from_slice(&x.to_bits().to_be_bytes());
                }
            }
        }

        out.extend_from_slice(&(metadata.len() as u32).to_be_bytes());
        out.extend_from_slice(metadata);
        out
    }

    /// Decode a payload produced by [`Quantization::encode`] back into
    /// `(vector, metadata)`.
    ///
    /// Returns `Err(Corrupt)` when the payload is shorter than the packed
    /// vector plus the metadata length field, or when the declared metadata
    /// length overruns the payload.  On a checksum-verified span either
    /// indicates a writer bug, not disk damage.
    pub fn decode(self, payload: &[u8], dim: usize) -> Result<(Vec<f64>, Vec<u8>)> {
        let vec_size = self.vector_size(dim);
        if payload.len() < vec_size + 4 {
            return Err(Error::Corrupt(format!(
                "record payload of {} bytes is shorter than the {} bytes a {}-dimensional \
                 width-{} vector requires",
                payload.len(),
                vec_size + 4,
                dim,
                self.bits(),
            )));
        }

        let mut vector = Vec::with_capacity(dim);
        match self {
            Quantization::Q4 => {
                for i in 0..dim {
                    let byte = payload[i / 2];
                    let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                    vector.push(f64::from(nibble) / 15.0);
                }
            }
            Quantization::Q8 => {
                for &b in &payload[..dim] {
                    vector.push(f64::from(b) / 255.0);
                }
            }
            Quantization::Q16 => {
                for i in 0..dim {
                    let v = BigEndian::read_u16(&payload[i * 2..]);
                    vector.push(f64::from(v) / 65_535.0);
                }
            }
            Quantization::F32 => {
                for i in 0..dim {
                    let bits = BigEndian::read_u32(&payload[i * 4..]);
                    vector.push(f64::from(f32::from_bits(bits)));
                }
            }
            Quantization::F64 => {
                for i in 0..dim {
                    let bits = BigEndian::read_u64(&payload[i * 8..]);
                    vector.push(f64::from_bits(bits));
                }
            }
        }

        let meta_len = BigEndian::read_u32(&payload[vec_size..vec_size + 4]) as usize;
        let meta_start = vec_size + 4;
        if meta_start + meta_len > payload.len() {
            return Err(Error::Corrupt(format!(
                "metadata length {meta_len} overruns payload of {} bytes",
                payload.len()
            )));
        }
        let metadata = payload[meta_start..meta_start + meta_len].to_vec();

        Ok((vector, metadata))
    }
}

/// Clamp `x` to [0,1], scale to [0, max], round half-to-even.
fn quantize(x: f64, max: u32) -> u32 {
    let scaled = x.clamp(0.0, 1.0) * f64::from(max);
    let floor = scaled.floor();
    let frac = scaled - floor;
    let rounded = if frac > 0.5 {
        floor + 1.0
    } else if frac < 0.5 {
        floor
    } else if (floor as u64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    };
    rounded as u32
}
