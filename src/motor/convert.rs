//! Conversions between encoder counts, motor position units, and radians
//!
//! The encoder reports 32768 counts per revolution; the position commands use
//! 36000 units (0.01 degree) per revolution. The stitch operation picks the
//! multi-turn position congruent to a raw single-turn target that preserves
//! travel direction across wrap.

use std::f32::consts::TAU;

/// Encoder counts per revolution
pub const ENCODER_RESOLUTION: u32 = 32_768;

/// Motor position units (0.01 deg) per revolution
pub const MOTOR_POSITION_RESOLUTION: i64 = 36_000;

/// Encoder count to shaft angle in [0, 2*pi)
#[inline]
pub fn encoder_to_rad(encoder_pos: u16) -> f32 {
    encoder_pos as f32 * TAU / ENCODER_RESOLUTION as f32
}

/// Motor position (any number of turns) to shaft angle in [0, 2*pi)
#[inline]
pub fn motor_pos_to_rad(motor_pos: i64) -> f32 {
    motor_pos.rem_euclid(MOTOR_POSITION_RESOLUTION) as f32 * TAU
        / MOTOR_POSITION_RESOLUTION as f32
}

/// Shaft angle to single-turn motor position in [0, 36000)
///
/// The fractional revolution is scaled and rounded to the nearest unit so
/// that `rad_to_motor_pos(motor_pos_to_rad(p)) == p` holds exactly despite
/// f32 quantization of the angle.
#[inline]
pub fn rad_to_motor_pos(rad: f32) -> i64 {
    let revs = rad as f64 / std::f64::consts::TAU;
    let frac = revs - revs.floor();
    ((frac * MOTOR_POSITION_RESOLUTION as f64).round() as i64)
        .rem_euclid(MOTOR_POSITION_RESOLUTION)
}

/// Encoder count to single-turn motor position in [0, 36000)
#[inline]
pub fn encoder_to_motor_pos(encoder_pos: u16) -> i64 {
    encoder_pos as i64 * MOTOR_POSITION_RESOLUTION / ENCODER_RESOLUTION as i64
}

/// Choose the multi-turn position congruent to `this_pos` closest to `last_pos`
///
/// Returns `last_pos + d` where `d` is the signed residue of
/// `(this_pos - last_pos) mod 36000` in `[-18000, 18000)`, so commanded
/// positions stay continuous across single-turn wrap.
#[inline]
pub fn stitch_motor_pos(last_pos: i64, this_pos: i64) -> i64 {
    let mut diff = (this_pos - last_pos).rem_euclid(MOTOR_POSITION_RESOLUTION);
    if diff >= MOTOR_POSITION_RESOLUTION / 2 {
        diff -= MOTOR_POSITION_RESOLUTION;
    }
    last_pos + diff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stitch_across_wrap() {
        assert_eq!(stitch_motor_pos(35_999, 1), 36_001);
        assert_eq!(stitch_motor_pos(1, 35_999), -1);
    }

    #[test]
    fn test_stitch_identity_and_half_turn() {
        assert_eq!(stitch_motor_pos(100, 100), 100);
        // exactly half a turn resolves in the negative direction
        assert_eq!(stitch_motor_pos(0, 18_000), -18_000);
        assert_eq!(stitch_motor_pos(0, 17_999), 17_999);
    }

    #[test]
    fn test_stitch_congruence_and_bound() {
        let lasts = [-100_000i64, -18_001, -1, 0, 1, 17_999, 18_000, 36_000, 72_345];
        let thiss = [0i64, 1, 9_000, 17_999, 18_000, 18_001, 35_999];
        for &last in &lasts {
            for &this in &thiss {
                let stitched = stitch_motor_pos(last, this);
                assert_eq!(
                    stitched.rem_euclid(MOTOR_POSITION_RESOLUTION),
                    this.rem_euclid(MOTOR_POSITION_RESOLUTION),
                    "stitch({last}, {this}) not congruent"
                );
                assert!(
                    (stitched - last).abs() <= MOTOR_POSITION_RESOLUTION / 2,
                    "stitch({last}, {this}) = {stitched} strays too far"
                );
            }
        }
    }

    #[test]
    fn test_rad_motor_pos_round_trip() {
        for p in 0..MOTOR_POSITION_RESOLUTION {
            let rad = motor_pos_to_rad(p);
            assert!((0.0..TAU).contains(&rad));
            assert_eq!(rad_to_motor_pos(rad), p, "round trip failed at {p}");
        }
    }

    #[test]
    fn test_rad_to_motor_pos_negative_angle() {
        // -pi/2 is three quarters of a revolution
        let pos = rad_to_motor_pos(-std::f32::consts::FRAC_PI_2);
        assert_eq!(pos, 27_000);
    }

    #[test]
    fn test_encoder_to_rad_range_and_monotonic() {
        let mut prev = -1.0f32;
        for e in (0..ENCODER_RESOLUTION as u16).step_by(7) {
            let rad = encoder_to_rad(e);
            assert!((0.0..TAU).contains(&rad));
            assert!(rad > prev, "not monotonic at encoder {e}");
            prev = rad;
        }
    }

    #[test]
    fn test_encoder_to_motor_pos() {
        assert_eq!(encoder_to_motor_pos(0), 0);
        assert_eq!(encoder_to_motor_pos(16_384), 18_000);
        assert_eq!(encoder_to_motor_pos(32_767), 35_998);
        let mut prev = -1i64;
        for e in (0..32_768u32).step_by(11) {
            let p = encoder_to_motor_pos(e as u16);
            assert!((0..MOTOR_POSITION_RESOLUTION).contains(&p));
            assert!(p >= prev);
            prev = p;
        }
    }
}
