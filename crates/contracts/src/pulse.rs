//! PulseId - wrapping fiducial pulse identifier
//!
//! Pulse ids count fiducials modulo [`PULSE_ID_MODULUS`]. All arithmetic is
//! modulus-aware; an invalid id never produces a numeric result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the wrapping pulse-id space (0x1FFE0).
pub const PULSE_ID_MODULUS: u32 = 0x1FFE0;

/// Sentinel raw value for "no pulse id". Occupies all 17 low bits.
pub const PULSE_ID_INVALID: u32 = 0x1FFFF;

/// Bit mask selecting the pulse id from a time stamp's `nsec` field.
pub const PULSE_ID_MASK: u32 = 0x1FFFF;

/// Fixed fiducial rate (Hz) used to convert delays between seconds and pulses.
pub const FIDUCIAL_RATE_HZ: f64 = 360.0;

const HALF_MODULUS: i64 = (PULSE_ID_MODULUS / 2) as i64;

/// Fiducial pulse identifier in `[0, PULSE_ID_MODULUS)` or INVALID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct PulseId(u32);

impl PulseId {
    /// The invalid pulse id.
    pub const INVALID: PulseId = PulseId(PULSE_ID_INVALID);

    /// Create a pulse id; anything outside the modulus becomes INVALID.
    #[inline]
    pub fn new(raw: u32) -> Self {
        if raw < PULSE_ID_MODULUS {
            Self(raw)
        } else {
            Self::INVALID
        }
    }

    /// Raw value, including the sentinel.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 < PULSE_ID_MODULUS
    }

    /// Numeric value, `None` for INVALID.
    #[inline]
    pub fn value(self) -> Option<u32> {
        self.is_valid().then_some(self.0)
    }

    /// Move `delta` pulses along the wrapping space. INVALID stays INVALID.
    pub fn offset(self, delta: i64) -> Self {
        match self.value() {
            Some(v) => {
                let wrapped = (v as i64 + delta).rem_euclid(PULSE_ID_MODULUS as i64);
                Self(wrapped as u32)
            }
            None => Self::INVALID,
        }
    }

    /// Signed minimal distance from `other` to `self`.
    #[inline]
    pub fn diff(self, other: PulseId) -> Option<i32> {
        pulse_diff(self, other)
    }

    /// True when moving forward from `prior` to `self` crossed the wrap point.
    pub fn rolled_over(self, prior: PulseId) -> bool {
        match (self.value(), prior.value(), pulse_diff(self, prior)) {
            (Some(now), Some(before), Some(d)) => d > 0 && now < before,
            _ => false,
        }
    }
}

impl Default for PulseId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<u32> for PulseId {
    fn from(raw: u32) -> Self {
        Self::new(raw)
    }
}

impl From<PulseId> for u32 {
    fn from(id: PulseId) -> Self {
        id.0
    }
}

impl fmt::Debug for PulseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "PulseId(0x{:05X})", self.0)
        } else {
            write!(f, "PulseId(INVALID)")
        }
    }
}

impl fmt::Display for PulseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "0x{:05X}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}

/// Signed minimal distance from `b` to `a` in the wrapping pulse space.
///
/// The result lies in `[-M/2, M/2]` and `pulse_diff(a, b) == -pulse_diff(b, a)`.
/// Ids close to 0 and close to the modulus are treated as adjacent.
/// Returns `None` when either operand is INVALID.
pub fn pulse_diff(a: PulseId, b: PulseId) -> Option<i32> {
    let (a, b) = (a.value()? as i64, b.value()? as i64);
    let mut d = a - b;
    if d > HALF_MODULUS {
        d -= PULSE_ID_MODULUS as i64;
    } else if d < -HALF_MODULUS {
        d += PULSE_ID_MODULUS as i64;
    }
    Some(d as i32)
}

/// Convert a delay in seconds to whole fiducials at [`FIDUCIAL_RATE_HZ`].
#[inline]
pub fn seconds_to_pulses(seconds: f64) -> i64 {
    (seconds * FIDUCIAL_RATE_HZ).round() as i64
}

/// Convert a delay in fiducials to seconds.
#[inline]
pub fn pulses_to_seconds(pulses: f64) -> f64 {
    pulses / FIDUCIAL_RATE_HZ
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: u32 = PULSE_ID_MODULUS;

    #[test]
    fn test_diff_across_rollover() {
        let a = PulseId::new(5);
        let b = PulseId::new(M - 3);
        assert_eq!(pulse_diff(a, b), Some(8));
        assert_eq!(pulse_diff(b, a), Some(-8));
    }

    #[test]
    fn test_diff_is_antisymmetric_at_half_modulus() {
        let a = PulseId::new(M / 2);
        let b = PulseId::new(0);
        let forward = pulse_diff(a, b).unwrap();
        let backward = pulse_diff(b, a).unwrap();
        assert_eq!(forward, -backward);
        assert_eq!(forward.unsigned_abs(), M / 2);
    }

    #[test]
    fn test_diff_plain() {
        assert_eq!(pulse_diff(PulseId::new(100), PulseId::new(97)), Some(3));
        assert_eq!(pulse_diff(PulseId::new(97), PulseId::new(100)), Some(-3));
        assert_eq!(pulse_diff(PulseId::new(42), PulseId::new(42)), Some(0));
    }

    #[test]
    fn test_invalid_propagates() {
        assert_eq!(pulse_diff(PulseId::INVALID, PulseId::new(1)), None);
        assert_eq!(pulse_diff(PulseId::new(1), PulseId::INVALID), None);
        assert_eq!(PulseId::INVALID.offset(10), PulseId::INVALID);
        assert!(!PulseId::new(M).is_valid());
        assert!(!PulseId::new(PULSE_ID_INVALID).is_valid());
    }

    #[test]
    fn test_offset_wraps() {
        assert_eq!(PulseId::new(2).offset(-5), PulseId::new(M - 3));
        assert_eq!(PulseId::new(M - 1).offset(3), PulseId::new(2));
    }

    #[test]
    fn test_rollover_detection() {
        assert!(PulseId::new(1).rolled_over(PulseId::new(M - 2)));
        assert!(!PulseId::new(10).rolled_over(PulseId::new(7)));
        assert!(!PulseId::new(M - 2).rolled_over(PulseId::new(1)));
    }

    #[test]
    fn test_delay_conversion() {
        assert_eq!(seconds_to_pulses(1.0), 360);
        assert_eq!(seconds_to_pulses(0.0139), 5);
        assert!((pulses_to_seconds(36.0) - 0.1).abs() < 1e-12);
    }
}
