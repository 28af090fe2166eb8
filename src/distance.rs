//! Distance metrics and hyperplane geometry.
//!
//! The metric is fixed at collection creation and used uniformly: for
//! scoring candidates against the query, and for routing points through the
//! partition trees.
//!
//! # Euclidean
//! `distance(a, b) = |a − b|₂`.  Hyperplane side is the sign of
//! `v·normal − b`; the distance to the plane is its magnitude.
//!
//! # Cosine
//! `distance(a, b) = acos(a·b / (|a||b|)) / π ∈ [0, 1]`.  Against a unit
//! `normal`, the angular position is `acos(v·normal / |v|) / π`; the right
//! side is `angular < 0.5` and the distance to the partition boundary is
//! `min(angular, 1 − angular)`.

use serde::{Deserialize, Serialize};

// ── Metric ───────────────────────────────────────────────────────────────────

/// Distance metric, pinned by the header span for the life of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Euclidean,
    Cosine,
}

/// Which side of a hyperplane a point falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Metric {
    /// On-disk encoding: 0 = euclidean, 1 = cosine.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Metric::Euclidean),
            1 => Some(Metric::Cosine),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            Metric::Euclidean => 0,
            Metric::Cosine => 1,
        }
    }

    /// Human-readable name (for diagnostics and the CLI — never parsed back
    /// from disk).
    pub fn name(self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Cosine => "cosine",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "euclidean" | "l2" => Some(Metric::Euclidean),
            "cosine" | "angular" => Some(Metric::Cosine),
            _ => None,
        }
    }

    /// Distance between two vectors of equal dimensionality.
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => {
                let mut sum = 0.0;
                for (x, y) in a.iter().zip(b) {
                    let d = x - y;
                    sum += d * d;
                }
                sum.sqrt()
            }
            Metric::Cosine => {
                let (na, nb) = (norm(a), norm(b));
                if na == 0.0 || nb == 0.0 {
                    // The angle to a zero vector is undefined; identical
                    // degenerate inputs score 0, anything else scores max.
                    return if na == nb { 0.0 } else { 1.0 };
                }
                let cos = (dot(a, b) / (na * nb)).clamp(-1.0, 1.0);
                cos.acos() / std::f64::consts::PI
            }
        }
    }

    /// Side of the partition `(normal, b)` that `v` falls on, and the
    /// distance from `v` to the partition boundary.
    ///
    /// `normal` is unit-norm by construction (see the forest's split).  For
    /// cosine, `b` is unused and the returned distance is angular in [0, 0.5].
    pub fn hyperplane_side(self, v: &[f64], normal: &[f64], b: f64) -> (Side, f64) {
        match self {
            Metric::Euclidean => {
                let signed = dot(v, normal) - b;
                if signed > 0.0 {
                    (Side::Right, signed)
                } else {
                    (Side::Left, -signed)
                }
            }
            Metric::Cosine => {
                let nv = norm(v);
                if nv == 0.0 {
                    // A zero vector sits on the boundary for routing purposes.
                    return (Side::Left, 0.0);
                }
                let angular = (dot(v, normal) / nv).clamp(-1.0, 1.0).acos()
                    / std::f64::consts::PI;
                let side = if angular < 0.5 { Side::Right } else { Side::Left };
                (side, angular.min(1.0 - angular))
            }
        }
    }
}

// ── Vector helpers ───────────────────────────────────────────────────────────

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}
