//! Forward kinematics of the rolling, precessing disk
//!
//! The disk rolls on a circle about a vertical axis through its (moving)
//! curvature center. The maps between wheel angular velocity, rolling radius,
//! and precession rate are empirical polynomial fits measured on the physical
//! robot; the constants below are part of the plant model, not tunables.

/// Rolling radius in meters for a wheel angular velocity in rad/s
#[inline]
pub fn rolling_radius(angv: f32) -> f32 {
    0.105_374 + 0.013_149 * angv * angv
}

/// Precession rate in rad/s for a wheel angular velocity in rad/s
#[inline]
pub fn precession_rate(angv: f32) -> f32 {
    angv / (0.123_342 * angv * angv - 0.166_428 * angv + 1.517_82)
}

/// Wheel angular velocity in rad/s that produces the given rolling radius
///
/// Inverse of [`rolling_radius`]; callers must pass a radius at or above the
/// zero-velocity rolling radius (0.105374 m).
#[inline]
pub fn wheel_velocity_for_radius(radius: f32) -> f32 {
    ((radius - 0.105_374) / 0.013_149).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_at_rest() {
        assert!((rolling_radius(0.0) - 0.105_374).abs() < 1e-6);
        assert_eq!(precession_rate(0.0), 0.0);
    }

    #[test]
    fn test_radius_velocity_round_trip() {
        for i in 1..=90 {
            let angv = i as f32 * 0.1;
            let radius = rolling_radius(angv);
            let back = wheel_velocity_for_radius(radius);
            assert!(
                (back - angv).abs() < 1e-3,
                "round trip failed at angv = {angv}: {back}"
            );
        }
    }

    #[test]
    fn test_radius_monotonic_in_velocity() {
        let mut prev = rolling_radius(0.0);
        for i in 1..=90 {
            let r = rolling_radius(i as f32 * 0.1);
            assert!(r > prev);
            prev = r;
        }
    }

    #[test]
    fn test_precession_rate_sign() {
        // precession follows the wheel direction
        assert!(precession_rate(3.0) > 0.0);
        assert!(precession_rate(-3.0) < 0.0);
    }
}
