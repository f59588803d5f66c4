//! PID over precession angle
//!
//! The controller's integrals and derivatives use the swept precession angle
//! dθ as the independent variable instead of wall time, which makes the loop
//! response invariant to how fast the disk happens to be precessing. The
//! derivative estimates are EMA-filtered with a gain proportional to dθ so
//! the filter, too, has a fixed angular time constant.

use std::f32::consts::PI;

/// Proportional gain on curvature-center position error
pub const KP_POSITION: f32 = 0.15;
/// Integral gain on curvature-center position error
pub const KI_POSITION: f32 = 0.005;
/// Derivative gain on curvature-center velocity
pub const KD_POSITION: f32 = 2.0;

/// Proportional gain on rolling-radius error
pub const KP_RADIUS: f32 = 0.10;
/// Integral gain on rolling-radius error
pub const KI_RADIUS: f32 = 0.003;
/// Derivative gain on rolling-radius rate
pub const KD_RADIUS: f32 = 2.0;

/// Derivative EMA gain per radian of precession (angular time constant 2*pi)
pub const DERIVATIVE_FILTER_CONST: f32 = 1.0 / (2.0 * PI);

/// Clamp on the position integrals, meters * radians
pub const I_POSITION_MAX: f32 = 60.0;
/// Clamp on the radius integral, meters * radians
pub const I_RADIUS_MAX: f32 = 60.0;

/// Clamp on the commanded radius change per radian of precession
pub const MAX_ACCELERATION: f32 = 0.15;

/// Fold an angle difference with period pi, the precession symmetry of the
/// rolling disk
#[inline]
pub fn wrap_angle(v: f32) -> f32 {
    v - (v / PI).round() * PI
}

/// dθ-domain PID state: EMA-filtered derivatives and clamped integrals
///
/// All fields reset on a phase-change clear so each waypoint approach starts
/// from clean history.
#[derive(Debug, Clone)]
pub struct DthetaPid {
    last_xc: f32,
    last_yc: f32,
    filt_vx: f32,
    filt_vy: f32,
    filt_vr: f32,
    ix: f32,
    iy: f32,
    ir: f32,
}

impl DthetaPid {
    pub fn new() -> Self {
        Self {
            last_xc: 0.0,
            last_yc: 0.0,
            filt_vx: 0.0,
            filt_vy: 0.0,
            filt_vr: 0.0,
            ix: 0.0,
            iy: 0.0,
            ir: 0.0,
        }
    }

    /// Zero history, seeding the previous curvature center with the current
    /// one so the first derivative after a clear is zero rather than a step
    pub fn reset(&mut self, xc: f32, yc: f32) {
        self.last_xc = xc;
        self.last_yc = yc;
        self.filt_vx = 0.0;
        self.filt_vy = 0.0;
        self.filt_vr = 0.0;
        self.ix = 0.0;
        self.iy = 0.0;
        self.ir = 0.0;
    }

    /// One control step over `dtheta` radians of precession
    ///
    /// Returns the commanded radius acceleration (meters of rolling radius
    /// per radian of precession), clamped to +-[`MAX_ACCELERATION`]. The
    /// position terms are projected onto the extrapolated heading because
    /// only the radial component of center error is controllable within a
    /// precession cycle.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        xc: f32,
        yc: f32,
        radius: f32,
        last_radius: f32,
        target_x: f32,
        target_y: f32,
        target_radius: f32,
        heading: f32,
        dtheta: f32,
    ) -> f32 {
        let vx = (xc - self.last_xc) / dtheta;
        let vy = (yc - self.last_yc) / dtheta;
        let vr = (radius - last_radius) / dtheta;

        let alpha = (DERIVATIVE_FILTER_CONST * dtheta).clamp(0.0, 1.0);
        self.filt_vx = (1.0 - alpha) * self.filt_vx + alpha * vx;
        self.filt_vy = (1.0 - alpha) * self.filt_vy + alpha * vy;
        self.filt_vr = (1.0 - alpha) * self.filt_vr + alpha * vr;

        self.ix = (self.ix + dtheta * (xc - target_x)).clamp(-I_POSITION_MAX, I_POSITION_MAX);
        self.iy = (self.iy + dtheta * (yc - target_y)).clamp(-I_POSITION_MAX, I_POSITION_MAX);
        self.ir = (self.ir + dtheta * (radius - target_radius)).clamp(-I_RADIUS_MAX, I_RADIUS_MAX);

        let position_accel = (KP_POSITION * (xc - target_x)
            + KI_POSITION * self.ix
            + KD_POSITION * self.filt_vx)
            * heading.cos()
            + (KP_POSITION * (yc - target_y) + KI_POSITION * self.iy + KD_POSITION * self.filt_vy)
                * heading.sin();
        let radius_accel =
            -(KP_RADIUS * (radius - target_radius) + KI_RADIUS * self.ir + KD_RADIUS * self.filt_vr);

        self.last_xc = xc;
        self.last_yc = yc;

        (position_accel + radius_accel).clamp(-MAX_ACCELERATION, MAX_ACCELERATION)
    }

    /// Current integrator values (ix, iy, ir), for the tick log
    pub fn integrals(&self) -> (f32, f32, f32) {
        (self.ix, self.iy, self.ir)
    }
}

impl Default for DthetaPid {
    fn default() -> Self {
        Self::new()
    }
}
