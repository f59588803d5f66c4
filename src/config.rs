//! Configuration loading from TOML
//!
//! All settings default to the values the robot was tuned with, so running
//! without a config file reproduces the stock behavior. An optional
//! `rollbot.toml` in the working directory can override the serial port, the
//! waypoint schedule, and the calibration sanity bound:
//!
//! ```toml
//! [motor]
//! serial_port = "/dev/ttyS0"
//!
//! [plan]
//! waypoints = [[-0.90, 0.75], [-0.90, 2.00], [0.50, 0.75], [0.50, 2.00]]
//! stop_angles = [-1.5708, 1.5708, -1.5708, 1.5708]
//! move_time_s = 120.0
//! hold_time_s = 50.0
//! stop_time_s = 25.0
//!
//! [calibration]
//! # expected local-to-exposure clock offset; startup aborts if the
//! # measured offset strays more than 1 ms from it
//! clock_offset_sanity_us = 12000
//! ```
//!
//! Control gains and the plant model are compile-time constants, not
//! configuration.

use crate::control::waypoint::{Waypoint, WaypointPlan};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::f32::consts::FRAC_PI_2;
use std::fs;
use std::path::Path;

/// Motor transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MotorConfig {
    /// Serial port of the motor, 115200 baud 8-N-1
    #[serde(default = "default_serial_port")]
    pub serial_port: String,
}

fn default_serial_port() -> String {
    "/dev/ttyS0".to_string()
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
        }
    }
}

/// Waypoint schedule configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PlanConfig {
    /// Curvature-center targets, meters
    #[serde(default = "default_waypoints")]
    pub waypoints: Vec<[f32; 2]>,

    /// Heading at which to halt at each waypoint, radians
    #[serde(default = "default_stop_angles")]
    pub stop_angles: Vec<f32>,

    /// Duration of each move phase, seconds
    #[serde(default = "default_move_time")]
    pub move_time_s: f32,

    /// Duration of each hold phase, seconds
    #[serde(default = "default_hold_time")]
    pub hold_time_s: f32,

    /// Duration of each stop phase, seconds
    #[serde(default = "default_stop_time")]
    pub stop_time_s: f32,
}

fn default_waypoints() -> Vec<[f32; 2]> {
    vec![[-0.90, 0.75], [-0.90, 2.00], [0.50, 0.75], [0.50, 2.00]]
}

fn default_stop_angles() -> Vec<f32> {
    vec![-FRAC_PI_2, FRAC_PI_2, -FRAC_PI_2, FRAC_PI_2]
}

fn default_move_time() -> f32 {
    120.0
}

fn default_hold_time() -> f32 {
    50.0
}

fn default_stop_time() -> f32 {
    25.0
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            waypoints: default_waypoints(),
            stop_angles: default_stop_angles(),
            move_time_s: default_move_time(),
            hold_time_s: default_hold_time(),
            stop_time_s: default_stop_time(),
        }
    }
}

impl PlanConfig {
    /// Build the runtime waypoint plan
    pub fn to_plan(&self) -> WaypointPlan {
        WaypointPlan {
            waypoints: self
                .waypoints
                .iter()
                .zip(&self.stop_angles)
                .map(|(&[x, y], &stop_angle)| Waypoint { x, y, stop_angle })
                .collect(),
            move_time_us: (self.move_time_s * 1e6) as i64,
            hold_time_us: (self.hold_time_s * 1e6) as i64,
            stop_time_us: (self.stop_time_s * 1e6) as i64,
        }
    }
}

/// Clock-offset calibration configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalibrationConfig {
    /// Expected clock offset in microseconds; when set, startup aborts if
    /// the measured offset is more than 1 ms away
    #[serde(default)]
    pub clock_offset_sanity_us: Option<i64>,
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub motor: MotorConfig,
    #[serde(default)]
    pub plan: PlanConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = basic_toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.plan.waypoints.is_empty() {
            return Err(Error::Config("plan requires at least one waypoint".into()));
        }
        if self.plan.waypoints.len() != self.plan.stop_angles.len() {
            return Err(Error::Config(format!(
                "{} waypoints but {} stop angles",
                self.plan.waypoints.len(),
                self.plan.stop_angles.len()
            )));
        }
        for (name, value) in [
            ("move_time_s", self.plan.move_time_s),
            ("hold_time_s", self.plan.hold_time_s),
            ("stop_time_s", self.plan.stop_time_s),
        ] {
            if !(value > 0.0) {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_stock_plan() {
        let plan = Config::default().plan.to_plan();
        assert_eq!(plan.waypoints.len(), 4);
        assert_eq!(plan.move_time_us, 120_000_000);
        assert_eq!(plan.hold_time_us, 50_000_000);
        assert_eq!(plan.stop_time_us, 25_000_000);
        assert_eq!(plan.waypoints[0].x, -0.90);
        assert_eq!(plan.waypoints[3].y, 2.00);
        assert!((plan.waypoints[2].stop_angle + FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_overrides() {
        let toml = r#"
            [motor]
            serial_port = "/dev/ttyUSB1"

            [plan]
            waypoints = [[0.0, 1.0], [1.0, 1.0]]
            stop_angles = [0.0, 3.14]
            move_time_s = 5.0

            [calibration]
            clock_offset_sanity_us = 9000
        "#;
        let config: Config = basic_toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.motor.serial_port, "/dev/ttyUSB1");
        assert_eq!(config.plan.waypoints.len(), 2);
        assert_eq!(config.plan.move_time_s, 5.0);
        // unset fields keep their defaults
        assert_eq!(config.plan.hold_time_s, 50.0);
        assert_eq!(config.calibration.clock_offset_sanity_us, Some(9000));
    }

    #[test]
    fn test_mismatched_stop_angles_rejected() {
        let toml = r#"
            [plan]
            waypoints = [[0.0, 1.0]]
            stop_angles = [0.0, 1.0]
        "#;
        let config: Config = basic_toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nonpositive_dwell_rejected() {
        let toml = r#"
            [plan]
            move_time_s = 0.0
        "#;
        let config: Config = basic_toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
