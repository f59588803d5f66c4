//! Rollbot - closed-loop motion controller for a single-wheel rolling robot
//!
//! A rolling disk travels in a circular (precessing) path on the floor. An
//! OptiTrack motion-capture server streams rigid-body pose samples over UDP
//! multicast; this crate fuses those samples with a kinematic model of the
//! rolling disk, computes a commanded wheel angular velocity, and drives a
//! smart serial motor through a sequence of XY waypoints.
//!
//! ## Architecture
//!
//! Three tightly coupled subsystems:
//!
//! - [`mocap`]: NatNet wire decoding and a lock-free latest-pose slot shared
//!   between the network receive thread and the control loop
//! - [`control`]: fixed-period control loop with latency-compensated pose
//!   extrapolation and a PID that integrates over precession angle rather
//!   than wall time
//! - [`motor`]: checksummed request/response framing over a serial link

pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod mocap;
pub mod model;
pub mod motor;
pub mod telemetry;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
