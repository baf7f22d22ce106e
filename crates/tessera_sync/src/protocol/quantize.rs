//! # Quantization
//!
//! Lossy, bounded-error mapping of floats onto 16-bit integers.
//!
//! ```text
//!   lo ─────────────── v ─────────────── hi
//!   0  ─────────────── q ─────────────── 65535
//! ```
//!
//! Inputs outside `[lo, hi]` saturate; nothing in this module can fail.

use tessera_core::{Quaternion, Vector3};

/// Range of quantized linear velocity components.
pub const VELOCITY_RANGE: (f32, f32) = (-128.0, 128.0);

/// Range of quantized acceleration components.
pub const ACCELERATION_RANGE: (f32, f32) = (-64.0, 64.0);

/// Range of quantized quaternion components.
pub const ROTATION_RANGE: (f32, f32) = (-1.0, 1.0);

/// Range of quantized angular velocity components.
pub const ANGULAR_VELOCITY_RANGE: (f32, f32) = (-64.0, 64.0);

/// Range of the region time dilation factor.
pub const TIME_DILATION_RANGE: (f32, f32) = (0.0, 1.0);

const STEPS: f32 = u16::MAX as f32;

/// Maps `value` from `[lo, hi]` onto `[0, 65535]`.
///
/// Values below `lo` (and NaN) map to 0, values above `hi` to 65535.
/// A degenerate range (`hi <= lo`) always yields 0.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize(value: f32, lo: f32, hi: f32) -> u16 {
    let range = hi - lo;
    if range <= 0.0 || value.is_nan() {
        return 0;
    }
    let normalized = ((value - lo) / range).clamp(0.0, 1.0);
    (normalized * STEPS).round() as u16
}

/// Maps a quantized value back onto `[lo, hi]`.
///
/// When the range straddles zero, the code that zero itself quantizes to
/// decodes as exactly zero, so a stationary object decodes as stationary.
#[inline]
#[must_use]
pub fn dequantize(value: u16, lo: f32, hi: f32) -> f32 {
    if lo < 0.0 && hi > 0.0 && value == quantize(0.0, lo, hi) {
        return 0.0;
    }
    f32::from(value) / STEPS * (hi - lo) + lo
}

/// Largest error a round trip through `[lo, hi]` can introduce.
#[inline]
#[must_use]
pub fn max_error(lo: f32, hi: f32) -> f32 {
    (hi - lo) / STEPS
}

/// Quantizes each component of a vector.
#[inline]
#[must_use]
pub fn quantize_vector3(v: Vector3, (lo, hi): (f32, f32)) -> [u16; 3] {
    [quantize(v.x, lo, hi), quantize(v.y, lo, hi), quantize(v.z, lo, hi)]
}

/// Inverse of [`quantize_vector3`].
#[inline]
#[must_use]
pub fn dequantize_vector3(q: [u16; 3], (lo, hi): (f32, f32)) -> Vector3 {
    Vector3::new(dequantize(q[0], lo, hi), dequantize(q[1], lo, hi), dequantize(q[2], lo, hi))
}

/// Quantizes all four components of a normalized rotation.
#[inline]
#[must_use]
pub fn quantize_rotation(q: Quaternion) -> [u16; 4] {
    let q = q.normalized();
    let (lo, hi) = ROTATION_RANGE;
    [
        quantize(q.x, lo, hi),
        quantize(q.y, lo, hi),
        quantize(q.z, lo, hi),
        quantize(q.w, lo, hi),
    ]
}

/// Inverse of [`quantize_rotation`].
#[inline]
#[must_use]
pub fn dequantize_rotation(q: [u16; 4]) -> Quaternion {
    let (lo, hi) = ROTATION_RANGE;
    Quaternion::new(
        dequantize(q[0], lo, hi),
        dequantize(q[1], lo, hi),
        dequantize(q[2], lo, hi),
        dequantize(q[3], lo, hi),
    )
}

/// Quantizes a time dilation factor for an update header.
#[inline]
#[must_use]
pub fn quantize_time_dilation(dilation: f32) -> u16 {
    quantize(dilation, TIME_DILATION_RANGE.0, TIME_DILATION_RANGE.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGES: [(f32, f32); 5] = [
        VELOCITY_RANGE,
        ACCELERATION_RANGE,
        ROTATION_RANGE,
        ANGULAR_VELOCITY_RANGE,
        TIME_DILATION_RANGE,
    ];

    #[test]
    fn test_round_trip_error_bounded() {
        for (lo, hi) in RANGES.into_iter().chain([(-3.5, 1000.0), (-0.5, 0.25)]) {
            let tolerance = max_error(lo, hi);
            for i in -40..=40 {
                let v = lo + (hi - lo) * (i as f32 / 32.0);
                let expected = v.clamp(lo, hi);
                let decoded = dequantize(quantize(v, lo, hi), lo, hi);
                assert!(
                    (decoded - expected).abs() <= tolerance,
                    "range [{lo}, {hi}] value {v}: decoded {decoded}, error {}",
                    (decoded - expected).abs()
                );
            }
        }
    }

    #[test]
    fn test_out_of_range_saturates() {
        for (lo, hi) in RANGES {
            assert_eq!(quantize(lo - 1000.0, lo, hi), 0);
            assert_eq!(quantize(hi + 1000.0, lo, hi), u16::MAX);
        }
    }

    #[test]
    fn test_endpoints_exact() {
        let (lo, hi) = VELOCITY_RANGE;
        assert_eq!(quantize(lo, lo, hi), 0);
        assert_eq!(quantize(hi, lo, hi), u16::MAX);
        assert!((dequantize(u16::MAX, lo, hi) - hi).abs() < f32::EPSILON);
    }

    #[test]
    fn test_zero_stays_zero() {
        for (lo, hi) in [VELOCITY_RANGE, ACCELERATION_RANGE, ANGULAR_VELOCITY_RANGE] {
            assert_eq!(dequantize(quantize(0.0, lo, hi), lo, hi), 0.0);
        }
    }

    #[test]
    fn test_nan_and_degenerate_range() {
        assert_eq!(quantize(f32::NAN, -1.0, 1.0), 0);
        assert_eq!(quantize(5.0, 2.0, 2.0), 0);
    }

    #[test]
    fn test_rotation_round_trip() {
        let q = Quaternion::new(0.2, -0.4, 0.1, 0.8);
        let decoded = dequantize_rotation(quantize_rotation(q));
        let n = q.normalized();
        let tolerance = max_error(ROTATION_RANGE.0, ROTATION_RANGE.1);
        assert!((decoded.x - n.x).abs() <= tolerance);
        assert!((decoded.y - n.y).abs() <= tolerance);
        assert!((decoded.z - n.z).abs() <= tolerance);
        assert!((decoded.w - n.w).abs() <= tolerance);
    }

    #[test]
    fn test_time_dilation_full_speed() {
        assert_eq!(quantize_time_dilation(1.0), u16::MAX);
        assert_eq!(quantize_time_dilation(2.0), u16::MAX);
        assert_eq!(quantize_time_dilation(0.0), 0);
    }
}
