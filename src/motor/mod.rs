//! Serial motor driver
//!
//! Synchronous request/response layer over an 8-N-1 serial link at 115200
//! baud. Each command is a single checksummed frame; the motor answers with a
//! 5-byte acknowledgement (state-mutation commands) or a 13-byte telemetry
//! reply (motion commands). Telemetry is latched into [`MotorState`] together
//! with a monotonic timestamp on every motion reply.
//!
//! The driver is explicitly single-threaded: the control loop owns it and
//! nothing else touches the port. A motor that stops answering is a fault,
//! not a condition to ride out - reads carry a 50 ms deadline and any
//! transaction failure is fatal to the caller.

pub mod convert;
pub mod frame;

use crate::clock;
use crate::error::{Error, Result};
use crate::transport::Transport;
use frame::{Telemetry, TxFrame, ACK_REPLY_LEN, TELEMETRY_REPLY_LEN};
use std::f32::consts::TAU;
use std::thread;
use std::time::Duration;

/// Deadline for a complete reply to arrive
const REPLY_DEADLINE_US: i64 = 50_000;

/// Poll interval while waiting for reply bytes
const REPLY_POLL_US: u64 = 100;

/// Last-parsed motor telemetry
#[derive(Debug, Clone, Copy, Default)]
pub struct MotorState {
    /// Monotonic timestamp of the parse, microseconds
    pub timestamp_us: i64,
    /// Encoder position, 0..32767
    pub encoder_position: u16,
    /// Motor velocity in deg/s
    pub motor_velocity: i16,
}

/// Driver for the smart serial motor
pub struct MotorDriver<T: Transport> {
    transport: T,
    frame: TxFrame,
    state: MotorState,
}

impl<T: Transport> MotorDriver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            frame: TxFrame::new(),
            state: MotorState::default(),
        }
    }

    /// Resume the motor, zero the multi-turn counter, and command it to
    /// absolute zero at a 360 deg/s cap. The shaft settles asynchronously;
    /// callers should allow it a couple of seconds before closed-loop use.
    pub fn initialize(&mut self) -> Result<()> {
        self.resume()?;
        self.clear_loops()?;
        self.set_multi_loop_position_2(0, 36_000)?;
        log::info!("motor initialized, homing to zero");
        Ok(())
    }

    /// Halt and wipe motor state (0x80)
    pub fn stop(&mut self) -> Result<()> {
        self.frame.set_stop();
        self.transact_ack()
    }

    /// Halt, preserving motor state (0x81)
    pub fn pause(&mut self) -> Result<()> {
        self.frame.set_pause();
        self.transact_ack()
    }

    /// Re-enable from pause (0x88)
    pub fn resume(&mut self) -> Result<()> {
        self.frame.set_resume();
        self.transact_ack()
    }

    /// Zero the multi-turn counter (0x93)
    pub fn clear_loops(&mut self) -> Result<()> {
        self.frame.set_clear_loops();
        self.transact_ack()
    }

    /// Read telemetry without commanding motion (0x9C)
    pub fn read_state(&mut self) -> Result<MotorState> {
        self.frame.set_read_state();
        self.transact_telemetry()?;
        Ok(self.state)
    }

    /// Open-loop power control (0xA0), clamped to [-1000, 1000]
    pub fn set_power(&mut self, power: i16) -> Result<()> {
        self.frame.set_power(power.clamp(-1000, 1000));
        self.transact_telemetry()
    }

    /// Closed-loop velocity control (0xA2), units 0.01 deg/s
    pub fn set_velocity(&mut self, velocity: i32) -> Result<()> {
        self.frame.set_velocity(velocity);
        self.transact_telemetry()
    }

    /// Absolute multi-loop position control (0xA3), units 0.01 deg
    pub fn set_multi_loop_position_1(&mut self, position: i64) -> Result<()> {
        self.frame.set_multi_loop_position_1(position);
        self.transact_telemetry()
    }

    /// Absolute multi-loop position control with speed cap (0xA4)
    pub fn set_multi_loop_position_2(&mut self, position: i64, max_speed: u32) -> Result<()> {
        self.frame.set_multi_loop_position_2(position, max_speed);
        self.transact_telemetry()
    }

    /// Last latched telemetry
    pub fn state(&self) -> &MotorState {
        &self.state
    }

    /// Direct access to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Shaft angle in [0, 2*pi) extrapolated from the latched telemetry
    ///
    /// Dead-reckons forward from the last encoder reading using the latched
    /// velocity and the elapsed time since the parse.
    pub fn current_pos(&self, now_us: i64) -> f32 {
        let elapsed_s = (now_us - self.state.timestamp_us) as f32 * 1e-6;
        let rounds = self.state.encoder_position as f32 / convert::ENCODER_RESOLUTION as f32
            + elapsed_s * self.state.motor_velocity as f32 / 360.0;
        (rounds - rounds.floor()) * TAU
    }

    fn transact_ack(&mut self) -> Result<()> {
        let mut reply = [0u8; ACK_REPLY_LEN];
        self.transact(&mut reply)?;
        frame::parse_ack(&reply)
    }

    fn transact_telemetry(&mut self) -> Result<()> {
        let mut reply = [0u8; TELEMETRY_REPLY_LEN];
        self.transact(&mut reply)?;
        let Telemetry {
            encoder_position,
            motor_velocity,
        } = frame::parse_telemetry(&reply)?;
        self.state = MotorState {
            timestamp_us: clock::now_us(),
            encoder_position,
            motor_velocity,
        };
        Ok(())
    }

    /// Drain stale input, send the configured frame, and block (bounded by
    /// the reply deadline) until the full reply has arrived.
    fn transact(&mut self, reply: &mut [u8]) -> Result<()> {
        let mut scratch = [0u8; 64];
        while self.transport.available()? > 0 {
            self.transport.read(&mut scratch)?;
        }

        self.transport.write(self.frame.as_bytes())?;
        self.transport.flush()?;

        let deadline = clock::now_us() + REPLY_DEADLINE_US;
        let mut filled = 0;
        while filled < reply.len() {
            let n = self.transport.read(&mut reply[filled..])?;
            filled += n;
            if filled >= reply.len() {
                break;
            }
            if clock::now_us() > deadline {
                return Err(Error::ReplyDeadline {
                    got: filled,
                    want: reply.len(),
                });
            }
            if n == 0 {
                thread::sleep(Duration::from_micros(REPLY_POLL_US));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use super::frame::{checksum, opcode, FRAME_HEAD, MOTOR_ID};

    fn ack_reply(op: u8) -> [u8; ACK_REPLY_LEN] {
        let mut r = [FRAME_HEAD, op, MOTOR_ID, 0x00, 0x00];
        r[4] = checksum(&r[..4]);
        r
    }

    fn telemetry_reply(op: u8, velocity: i16, encoder: u16) -> [u8; TELEMETRY_REPLY_LEN] {
        let mut r = [0u8; TELEMETRY_REPLY_LEN];
        r[0] = FRAME_HEAD;
        r[1] = op;
        r[2] = MOTOR_ID;
        r[3] = 7;
        r[4] = checksum(&r[..4]);
        r[8..10].copy_from_slice(&velocity.to_le_bytes());
        r[10..12].copy_from_slice(&encoder.to_le_bytes());
        r[12] = checksum(&r[5..12]);
        r
    }

    #[test]
    fn test_set_velocity_wire_bytes() {
        let mut mock = MockTransport::new();
        mock.queue_reply(&telemetry_reply(opcode::SET_VELOCITY, 0, 0));
        let mut driver = MotorDriver::new(mock);

        driver.set_velocity(1500).unwrap();
        assert_eq!(
            driver.transport.written(),
            &[0x3E, 0xA2, 0x01, 0x04, 0xE5, 0xDC, 0x05, 0x00, 0x00, 0xE1]
        );
    }

    #[test]
    fn test_telemetry_latched() {
        let mut mock = MockTransport::new();
        mock.queue_reply(&telemetry_reply(opcode::READ_STATE, -180, 16_384));
        let mut driver = MotorDriver::new(mock);

        let state = driver.read_state().unwrap();
        assert_eq!(state.motor_velocity, -180);
        assert_eq!(state.encoder_position, 16_384);
        assert!(state.timestamp_us > 0);
    }

    #[test]
    fn test_stale_input_drained() {
        let mut mock = MockTransport::new();
        mock.queue_stale(&[0xAA, 0xBB, 0xCC]);
        mock.queue_reply(&ack_reply(opcode::RESUME));
        let mut driver = MotorDriver::new(mock);

        driver.resume().unwrap();
    }

    #[test]
    fn test_reply_deadline() {
        let mock = MockTransport::new(); // never answers
        let mut driver = MotorDriver::new(mock);

        let err = driver.pause().unwrap_err();
        assert!(matches!(err, Error::ReplyDeadline { got: 0, want: 5 }));
    }

    #[test]
    fn test_short_reply_is_fatal() {
        let mut mock = MockTransport::new();
        mock.queue_reply(&[FRAME_HEAD, opcode::PAUSE, MOTOR_ID]); // truncated
        let mut driver = MotorDriver::new(mock);

        let err = driver.pause().unwrap_err();
        assert!(matches!(err, Error::ReplyDeadline { got: 3, want: 5 }));
    }

    #[test]
    fn test_corrupt_reply_checksum() {
        let mut reply = telemetry_reply(opcode::SET_VELOCITY, 10, 20);
        reply[12] ^= 0x55;
        let mut mock = MockTransport::new();
        mock.queue_reply(&reply);
        let mut driver = MotorDriver::new(mock);

        let err = driver.set_velocity(100).unwrap_err();
        assert!(matches!(err, Error::ReplyChecksum { .. }));
    }

    #[test]
    fn test_initialize_sequence() {
        let mut mock = MockTransport::new();
        mock.queue_reply(&ack_reply(opcode::RESUME));
        mock.queue_reply(&ack_reply(opcode::CLEAR_LOOPS));
        mock.queue_reply(&telemetry_reply(opcode::SET_MULTI_LOOP_POS_2, 0, 0));
        let mut driver = MotorDriver::new(mock);

        driver.initialize().unwrap();
        let written = driver.transport.take_written();
        // resume (5) + clear loops (5) + position with speed cap (18)
        assert_eq!(written.len(), 28);
        assert_eq!(written[1], opcode::RESUME);
        assert_eq!(written[6], opcode::CLEAR_LOOPS);
        assert_eq!(written[11], opcode::SET_MULTI_LOOP_POS_2);
        // speed cap 36000 = 0x8CA0 little-endian in the trailing u32
        assert_eq!(&written[23..27], &[0xA0, 0x8C, 0x00, 0x00]);
    }

    #[test]
    fn test_current_pos_extrapolation() {
        let mut mock = MockTransport::new();
        mock.queue_reply(&telemetry_reply(opcode::READ_STATE, 360, 0));
        let mut driver = MotorDriver::new(mock);
        let state = driver.read_state().unwrap();

        // 360 deg/s = one revolution per second; a quarter second later the
        // shaft should sit a quarter turn past the latched encoder reading
        let quarter_later = state.timestamp_us + 250_000;
        let pos = driver.current_pos(quarter_later);
        assert!((pos - TAU / 4.0).abs() < 1e-3, "pos = {pos}");
    }
}
