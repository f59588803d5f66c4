//! Fixed-period control loop
//!
//! Every 10 ms: read the latest pose, advance the waypoint machine, and -
//! unless tracking is invalid or the stop latch is set - extrapolate the
//! pose forward by the measured mocap latency, compute the disk's curvature
//! center, run the dθ-domain PID, and command a new wheel velocity.
//!
//! The extrapolation uses the *commanded* wheel velocity, not a measured
//! one: the mocap frame rate is too low to derive a usable precession rate
//! from sample differences inside one tick, and differentiating position
//! destabilizes the loop.

pub mod pid;
pub mod waypoint;

use crate::clock;
use crate::error::Result;
use crate::mocap::slot::{PoseSample, PoseSlot};
use crate::model;
use crate::motor::MotorDriver;
use crate::telemetry::CsvLog;
use crate::transport::Transport;
use pid::DthetaPid;
use std::f32::consts::PI;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use waypoint::{WaypointFsm, WaypointPlan};

/// Control tick period, microseconds
pub const TICK_PERIOD_US: u64 = 10_000;

/// Commanded rolling-radius target, meters
pub const TARGET_RADIUS: f32 = 0.25;

/// Rolling-radius command clamp, meters
pub const MIN_RADIUS: f32 = 0.2;
pub const MAX_RADIUS: f32 = 1.5;

/// Wheel angular velocity cap, rad/s
pub const MAX_WHEEL_VELOCITY: f32 = 9.0;

/// Samples taken by the startup clock-offset calibration
pub const CALIBRATION_SAMPLES: u32 = 10_000;

/// Spacing between calibration reads, microseconds
const CALIBRATION_INTERVAL_US: u64 = 100;

/// Floor on the per-tick precession step, radians
const MIN_DTHETA: f32 = 1e-4;

/// Rolling radius assumed for the rate term right after a state clear
const CLEARED_LAST_RADIUS: f32 = 0.15;

/// Heading of the disk's rolling direction from the pose quaternion
#[inline]
pub fn heading_from_quat(sample: &PoseSample) -> f32 {
    (-0.5 + sample.qx * sample.qx + sample.qy * sample.qy)
        .atan2(sample.qx * sample.qz + sample.qy * sample.qw)
}

/// Measure the fixed offset between the local clock and the server's
/// mid-exposure timestamps.
///
/// Samples the latest pose `samples` times at 100 us spacing and keeps the
/// minimum of `now_us - mid_exposure / 10` (the division converts the
/// server's 100 ns ticks to microseconds). The minimum is the network and
/// pipeline delay with the least queueing, and stays valid for the run.
pub fn calibrate_clock_offset(slot: &PoseSlot, samples: u32) -> i64 {
    let mut min_delay = i64::MAX;
    for _ in 0..samples {
        thread::sleep(Duration::from_micros(CALIBRATION_INTERVAL_US));
        let sample = slot.latest();
        let delay = clock::now_us() - (sample.mid_exposure_timestamp / 10) as i64;
        min_delay = min_delay.min(delay);
    }
    min_delay
}

/// Per-run scratch state of the control loop
///
/// Explicit rather than static so the loop is testable and resets on a
/// phase-change clear are a single code path.
#[derive(Debug)]
struct LoopState {
    /// Commanded wheel angular velocity, rad/s
    motor_vel: f32,
    /// Rolling radius at the previous tick
    last_radius: f32,
    /// Extrapolated heading at the previous tick
    last_angle: f32,
    /// Wall clock at the previous tick
    last_time_us: i64,
    pid: DthetaPid,
    /// Re-seed all history from the current tick before using it
    clear_pending: bool,
}

impl LoopState {
    fn new() -> Self {
        Self {
            motor_vel: 0.0,
            last_radius: CLEARED_LAST_RADIUS,
            last_angle: 0.0,
            last_time_us: 0,
            pid: DthetaPid::new(),
            clear_pending: true,
        }
    }
}

/// The closed-loop waypoint-following controller
pub struct Controller<T: Transport> {
    motor: MotorDriver<T>,
    slot: Arc<PoseSlot>,
    fsm: WaypointFsm,
    state: LoopState,
    /// Minimum observed local-clock-to-exposure delay, microseconds
    time_delay_us: i64,
    /// Extrapolated heading from the last PID pass, for the stop window
    last_heading: f32,
    log: CsvLog,
}

impl<T: Transport> Controller<T> {
    pub fn new(
        motor: MotorDriver<T>,
        slot: Arc<PoseSlot>,
        plan: WaypointPlan,
        time_delay_us: i64,
        mut log: CsvLog,
    ) -> Self {
        write_log_header(&mut log, time_delay_us);
        Self {
            motor,
            slot,
            fsm: WaypointFsm::new(plan),
            state: LoopState::new(),
            time_delay_us,
            last_heading: 0.0,
            log,
        }
    }

    /// Give the motor back for a best-effort pause after a fatal error
    pub fn motor_mut(&mut self) -> &mut MotorDriver<T> {
        &mut self.motor
    }

    /// Run until the waypoint plan is exhausted
    pub fn run(&mut self) -> Result<()> {
        log::info!("control loop started, tick period {} us", TICK_PERIOD_US);
        loop {
            thread::sleep(Duration::from_micros(TICK_PERIOD_US));

            let sample = self.slot.latest();
            let now_us = clock::now_us();

            let tick = self.fsm.tick(now_us, self.last_heading);
            if tick.stop_motor {
                self.motor.set_velocity(0)?;
            }
            if tick.clear {
                self.state.clear_pending = true;
            }
            if tick.finished {
                log::info!("waypoint plan complete, halting");
                return Ok(());
            }

            // a tick without usable tracking, or with the wheel latched
            // stopped, skips PID work entirely
            if !sample.tracking_valid || self.fsm.is_stopped() {
                continue;
            }

            self.step(&sample, now_us)?;
        }
    }

    /// One PID pass over a fresh pose sample
    fn step(&mut self, sample: &PoseSample, now_us: i64) -> Result<()> {
        let s = &mut self.state;

        if s.clear_pending {
            s.motor_vel = 0.0;
            s.last_radius = CLEARED_LAST_RADIUS;
        }

        let angv = s.motor_vel;
        let radius = model::rolling_radius(angv);
        let omega = model::precession_rate(angv);

        let heading = heading_from_quat(sample);
        // time from camera mid-exposure to this tick, with the calibrated
        // clock offset removed
        let latency_s = (now_us - self.time_delay_us - (sample.mid_exposure_timestamp / 10) as i64)
            as f32
            * 1e-6;
        let heading_ex = heading + omega * latency_s;

        if s.clear_pending {
            s.last_angle = heading_ex;
            s.last_time_us = now_us;
        }

        // advance the measured position along the arc swept during the
        // latency window, using the average heading over that window;
        // world X+ is mocap Z-, world Y+ is mocap X
        let mid_heading = 0.5 * (heading + heading_ex);
        let x_ex = sample.x - radius * omega * mid_heading.sin() * latency_s;
        let y_ex = -sample.z + radius * omega * mid_heading.cos() * latency_s;

        let xc = x_ex - radius * heading_ex.cos();
        let yc = y_ex - radius * heading_ex.sin();

        let dtheta = pid::wrap_angle(heading_ex - s.last_angle).abs().max(MIN_DTHETA);

        if s.clear_pending {
            s.pid.reset(xc, yc);
            s.clear_pending = false;
        }

        let (target_x, target_y) = self.fsm.target();
        let accel = s.pid.step(
            xc,
            yc,
            radius,
            s.last_radius,
            target_x,
            target_y,
            TARGET_RADIUS,
            heading_ex,
            dtheta,
        );

        let dt_s = (now_us - s.last_time_us) as f32 * 1e-6;
        let new_radius = (radius + accel * omega * dt_s).clamp(MIN_RADIUS, MAX_RADIUS);
        let wheel_vel = model::wheel_velocity_for_radius(new_radius).min(MAX_WHEEL_VELOCITY);

        s.motor_vel = wheel_vel;
        // negative command: the wheel spins opposite the precession sense
        self.motor
            .set_velocity((-wheel_vel / PI * 18_000.0) as i32)?;

        s.last_angle = heading_ex;
        s.last_time_us = now_us;
        s.last_radius = radius;
        self.last_heading = heading_ex;

        let (ix, iy, ir) = s.pid.integrals();
        self.log.line(format_args!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            now_us,
            sample.mid_exposure_timestamp,
            wheel_vel,
            sample.x,
            sample.y,
            sample.z,
            sample.qx,
            sample.qy,
            sample.qz,
            sample.qw,
            x_ex,
            y_ex,
            heading_ex,
            xc,
            yc,
            ix,
            iy,
            ir
        ));

        Ok(())
    }
}

fn write_log_header(log: &mut CsvLog, time_delay_us: i64) {
    log.line(format_args!(
        "delay,target_radius,kp_radius,kp_position,ki_radius,ki_position,kd_radius,kd_position,\
         deriv_filter,i_radius_max,i_position_max,min_radius,max_radius,max_acc,tick_period_us"
    ));
    log.line(format_args!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        time_delay_us,
        TARGET_RADIUS,
        pid::KP_RADIUS,
        pid::KP_POSITION,
        pid::KI_RADIUS,
        pid::KI_POSITION,
        pid::KD_RADIUS,
        pid::KD_POSITION,
        pid::DERIVATIVE_FILTER_CONST,
        pid::I_RADIUS_MAX,
        pid::I_POSITION_MAX,
        MIN_RADIUS,
        MAX_RADIUS,
        pid::MAX_ACCELERATION,
        TICK_PERIOD_US
    ));
    log.line(format_args!("world pos {{x,y}} = mocap pos {{x,-z}}"));
    log.line(format_args!(
        "local_time,exposure_time,set_motor_angv,pos_x,pos_y,pos_z,qx,qy,qz,qw,\
         x_extrapolated,y_extrapolated,angle_extrapolated,xc,yc,ix,iy,ir"
    ));
}
