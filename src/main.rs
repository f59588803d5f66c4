//! Rollbot - mocap-guided waypoint controller for a single-wheel robot

use rollbot::clock;
use rollbot::config::Config;
use rollbot::control::waypoint::WaypointPlan;
use rollbot::control::{calibrate_clock_offset, Controller, CALIBRATION_SAMPLES};
use rollbot::error::{Error, Result};
use rollbot::mocap::MocapSession;
use rollbot::motor::MotorDriver;
use rollbot::telemetry::CsvLog;
use rollbot::transport::SerialTransport;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Default config file looked for in the working directory
const CONFIG_PATH: &str = "rollbot.toml";

/// Motor baud rate; fixed by the motor firmware
const MOTOR_BAUD: u32 = 115_200;

/// Settle time after commanding the motor to its zero position
const MOTOR_SETTLE: Duration = Duration::from_secs(2);

/// Allowed deviation of the measured clock offset from the configured
/// sanity value
const CLOCK_OFFSET_TOLERANCE_US: i64 = 1_000;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    clock::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage:\n\n\trollbot <server-ip> <local-ip>\n");
        std::process::exit(1);
    }

    if let Err(e) = run(&args[1], &args[2]) {
        log::error!("fatal: {e}");
        std::process::exit(1);
    }
}

fn run(server_ip: &str, local_ip: &str) -> Result<()> {
    log::info!("rollbot v{} starting", env!("CARGO_PKG_VERSION"));

    let config = if Path::new(CONFIG_PATH).exists() {
        log::info!("loading configuration from {CONFIG_PATH}");
        Config::load(CONFIG_PATH)?
    } else {
        Config::default()
    };

    // bring the motor up first so the wheel is homed while the mocap
    // session settles
    let transport = SerialTransport::open(&config.motor.serial_port, MOTOR_BAUD)?;
    let mut motor = MotorDriver::new(transport);
    motor.initialize()?;
    thread::sleep(MOTOR_SETTLE);

    let session = MocapSession::start(server_ip, local_ip)?;

    log::info!(
        "calibrating clock offset over {} samples (~{} s)",
        CALIBRATION_SAMPLES,
        CALIBRATION_SAMPLES / 10_000
    );
    let slot = session.pose_slot();
    let time_delay_us = calibrate_clock_offset(&slot, CALIBRATION_SAMPLES);
    log::info!("minimum mocap latency: {time_delay_us} us");

    if let Some(expected) = config.calibration.clock_offset_sanity_us {
        if (time_delay_us - expected).abs() > CLOCK_OFFSET_TOLERANCE_US {
            return Err(Error::Config(format!(
                "measured clock offset {time_delay_us} us is more than \
                 {CLOCK_OFFSET_TOLERANCE_US} us from expected {expected} us; \
                 check the server's timestamp units"
            )));
        }
    }

    let plan: WaypointPlan = config.plan.to_plan();
    let tick_log = CsvLog::create("log.csv");
    let mut controller = Controller::new(motor, slot, plan, time_delay_us, tick_log);

    log::info!("setup complete, entering control loop");
    match controller.run() {
        Ok(()) => {
            log::info!("run complete");
            Ok(())
        }
        Err(e) => {
            // best-effort halt before propagating the fault
            let _ = controller.motor_mut().pause();
            Err(e)
        }
    }
}
