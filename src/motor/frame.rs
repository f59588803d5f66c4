//! Zero-allocation frame structures for the serial motor protocol
//!
//! Command frame layout:
//!
//! ```text
//! [0x3E] [OPCODE] [MOTOR_ID] [PAYLOAD_LEN] [HDR_CKSUM] [PAYLOAD...] [PAYLOAD_CKSUM]
//! ```
//!
//! `HDR_CKSUM` is the 8-bit wrapping sum of bytes 0..4. `PAYLOAD_CKSUM` is the
//! 8-bit wrapping sum of the payload bytes; frames with no payload omit it.
//! Multi-byte payload values are little-endian.
//!
//! A single reusable [`TxFrame`] buffer handles every command, so the control
//! loop sends motor commands with zero heap allocation.

use crate::error::{Error, Result};

/// Frame head byte
pub const FRAME_HEAD: u8 = 0x3E;

/// Single-motor bus address
pub const MOTOR_ID: u8 = 0x01;

/// Largest frame: multi-loop position with speed limit (5 + 12 + 1 bytes)
const MAX_FRAME_SIZE: usize = 18;

/// Length of the acknowledgement reply to state-mutation commands
pub const ACK_REPLY_LEN: usize = 5;

/// Length of the telemetry reply to motion commands
pub const TELEMETRY_REPLY_LEN: usize = 13;

/// Command opcodes
pub mod opcode {
    /// Halt and wipe motor state
    pub const STOP: u8 = 0x80;
    /// Halt, preserve state
    pub const PAUSE: u8 = 0x81;
    /// Re-enable from pause
    pub const RESUME: u8 = 0x88;
    /// Zero the multi-turn counter
    pub const CLEAR_LOOPS: u8 = 0x93;
    /// Telemetry only
    pub const READ_STATE: u8 = 0x9C;
    /// Open-loop power, range [-1000, 1000]
    pub const SET_POWER: u8 = 0xA0;
    /// Closed-loop velocity target, units 0.01 deg/s
    pub const SET_VELOCITY: u8 = 0xA2;
    /// Absolute multi-loop position, units 0.01 deg
    pub const SET_MULTI_LOOP_POS_1: u8 = 0xA3;
    /// Absolute multi-loop position with velocity limit
    pub const SET_MULTI_LOOP_POS_2: u8 = 0xA4;
}

/// 8-bit additive checksum over a byte range
#[inline]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Reusable TX frame buffer for all motor commands
///
/// Create once, reconfigure per command. The buffer never allocates.
pub struct TxFrame {
    data: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl TxFrame {
    pub const fn new() -> Self {
        Self {
            data: [0u8; MAX_FRAME_SIZE],
            len: 0,
        }
    }

    /// Frame bytes ready for transmission
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Opcode of the currently configured command
    #[inline]
    pub fn op(&self) -> u8 {
        self.data[1]
    }

    /// Expected reply length for the currently configured command
    pub fn reply_len(&self) -> usize {
        match self.op() {
            opcode::STOP | opcode::PAUSE | opcode::RESUME | opcode::CLEAR_LOOPS => ACK_REPLY_LEN,
            _ => TELEMETRY_REPLY_LEN,
        }
    }

    /// Configure a halt-and-wipe command (0x80)
    pub fn set_stop(&mut self) {
        self.header_only(opcode::STOP);
    }

    /// Configure a halt-preserving-state command (0x81)
    pub fn set_pause(&mut self) {
        self.header_only(opcode::PAUSE);
    }

    /// Configure a resume-from-pause command (0x88)
    pub fn set_resume(&mut self) {
        self.header_only(opcode::RESUME);
    }

    /// Configure a clear-multi-turn-counter command (0x93)
    pub fn set_clear_loops(&mut self) {
        self.header_only(opcode::CLEAR_LOOPS);
    }

    /// Configure a telemetry read (0x9C)
    pub fn set_read_state(&mut self) {
        self.header_only(opcode::READ_STATE);
    }

    /// Configure an open-loop power command (0xA0), power in [-1000, 1000]
    pub fn set_power(&mut self, power: i16) {
        self.with_payload(opcode::SET_POWER, &power.to_le_bytes());
    }

    /// Configure a closed-loop velocity command (0xA2), units 0.01 deg/s
    pub fn set_velocity(&mut self, velocity: i32) {
        self.with_payload(opcode::SET_VELOCITY, &velocity.to_le_bytes());
    }

    /// Configure an absolute position command (0xA3), units 0.01 deg
    pub fn set_multi_loop_position_1(&mut self, position: i64) {
        self.with_payload(opcode::SET_MULTI_LOOP_POS_1, &position.to_le_bytes());
    }

    /// Configure an absolute position command with a speed cap (0xA4)
    ///
    /// Position in 0.01 deg, max speed in 0.01 deg/s.
    pub fn set_multi_loop_position_2(&mut self, position: i64, max_speed: u32) {
        let mut payload = [0u8; 12];
        payload[..8].copy_from_slice(&position.to_le_bytes());
        payload[8..].copy_from_slice(&max_speed.to_le_bytes());
        self.with_payload(opcode::SET_MULTI_LOOP_POS_2, &payload);
    }

    fn header_only(&mut self, op: u8) {
        self.begin(op, 0);
        self.len = 5;
    }

    fn with_payload(&mut self, op: u8, payload: &[u8]) {
        self.begin(op, payload.len() as u8);
        self.data[5..5 + payload.len()].copy_from_slice(payload);
        self.data[5 + payload.len()] = checksum(payload);
        self.len = 6 + payload.len();
    }

    fn begin(&mut self, op: u8, payload_len: u8) {
        self.data[0] = FRAME_HEAD;
        self.data[1] = op;
        self.data[2] = MOTOR_ID;
        self.data[3] = payload_len;
        self.data[4] = checksum(&self.data[..4]);
    }
}

impl Default for TxFrame {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Reply validation and telemetry parsing
// ============================================================================

/// Telemetry fields of a 13-byte motion reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    /// Encoder position, 0..32767
    pub encoder_position: u16,
    /// Motor velocity in deg/s
    pub motor_velocity: i16,
}

/// Validate the common 5-byte reply header: head byte and header checksum.
fn validate_header(reply: &[u8]) -> Result<()> {
    if reply[0] != FRAME_HEAD {
        return Err(Error::ReplyHeader(reply[0]));
    }
    let expected = checksum(&reply[..4]);
    if reply[4] != expected {
        return Err(Error::ReplyChecksum {
            expected,
            actual: reply[4],
        });
    }
    Ok(())
}

/// Validate a 5-byte acknowledgement reply
pub fn parse_ack(reply: &[u8; ACK_REPLY_LEN]) -> Result<()> {
    validate_header(reply)
}

/// Validate a 13-byte telemetry reply and extract its fields
///
/// Layout (little-endian): bytes 0..5 echo header, byte 5 temperature,
/// bytes 6..8 torque current, bytes 8..10 motor velocity (i16, deg/s),
/// bytes 10..12 encoder position (u16), byte 12 payload checksum.
pub fn parse_telemetry(reply: &[u8; TELEMETRY_REPLY_LEN]) -> Result<Telemetry> {
    validate_header(reply)?;
    let expected = checksum(&reply[5..12]);
    if reply[12] != expected {
        return Err(Error::ReplyChecksum {
            expected,
            actual: reply[12],
        });
    }
    Ok(Telemetry {
        motor_velocity: i16::from_le_bytes([reply[8], reply[9]]),
        encoder_position: u16::from_le_bytes([reply[10], reply[11]]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verify_checksums(frame: &[u8]) {
        assert_eq!(frame[4], checksum(&frame[..4]), "header checksum");
        let payload_len = frame[3] as usize;
        if payload_len > 0 {
            assert_eq!(
                frame[5 + payload_len],
                checksum(&frame[5..5 + payload_len]),
                "payload checksum"
            );
            assert_eq!(frame.len(), 6 + payload_len);
        } else {
            assert_eq!(frame.len(), 5);
        }
    }

    #[test]
    fn test_stop_frame() {
        let mut f = TxFrame::new();
        f.set_stop();
        // Stop: 3E 80 01 00 [CKSUM]
        assert_eq!(f.as_bytes(), &[0x3E, 0x80, 0x01, 0x00, 0xBF]);
        assert_eq!(f.reply_len(), ACK_REPLY_LEN);
    }

    #[test]
    fn test_set_velocity_1500() {
        let mut f = TxFrame::new();
        f.set_velocity(1500);
        // 1500 = 0x05DC little-endian in a 4-byte payload
        assert_eq!(
            f.as_bytes(),
            &[0x3E, 0xA2, 0x01, 0x04, 0xE5, 0xDC, 0x05, 0x00, 0x00, 0xE1]
        );
        assert_eq!(f.reply_len(), TELEMETRY_REPLY_LEN);
    }

    #[test]
    fn test_all_frames_checksum() {
        let mut f = TxFrame::new();

        f.set_stop();
        verify_checksums(f.as_bytes());
        f.set_pause();
        verify_checksums(f.as_bytes());
        f.set_resume();
        verify_checksums(f.as_bytes());
        f.set_clear_loops();
        verify_checksums(f.as_bytes());
        f.set_read_state();
        verify_checksums(f.as_bytes());
        f.set_power(-1000);
        verify_checksums(f.as_bytes());
        f.set_velocity(-123_456);
        verify_checksums(f.as_bytes());
        f.set_multi_loop_position_1(-36_000_000);
        verify_checksums(f.as_bytes());
        f.set_multi_loop_position_2(0, 36_000);
        verify_checksums(f.as_bytes());
    }

    #[test]
    fn test_frame_reuse() {
        let mut f = TxFrame::new();
        f.set_multi_loop_position_2(0, 36_000);
        assert_eq!(f.as_bytes().len(), 18);
        f.set_pause();
        assert_eq!(f.as_bytes().len(), 5);
        f.set_velocity(0);
        assert_eq!(f.as_bytes().len(), 10);
    }

    #[test]
    fn test_negative_velocity_payload() {
        let mut f = TxFrame::new();
        f.set_velocity(-51_566); // -9.0 rad/s in 0.01 deg/s
        let bytes = f.as_bytes();
        let payload = i32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        assert_eq!(payload, -51_566);
    }

    #[test]
    fn test_parse_telemetry() {
        let mut reply = [0u8; TELEMETRY_REPLY_LEN];
        reply[0] = FRAME_HEAD;
        reply[1] = opcode::SET_VELOCITY;
        reply[2] = MOTOR_ID;
        reply[3] = 7;
        reply[4] = checksum(&reply[..4]);
        reply[8..10].copy_from_slice(&(-250i16).to_le_bytes());
        reply[10..12].copy_from_slice(&12_345u16.to_le_bytes());
        reply[12] = checksum(&reply[5..12]);

        let t = parse_telemetry(&reply).unwrap();
        assert_eq!(t.motor_velocity, -250);
        assert_eq!(t.encoder_position, 12_345);
    }

    #[test]
    fn test_parse_telemetry_bad_checksum() {
        let mut reply = [0u8; TELEMETRY_REPLY_LEN];
        reply[0] = FRAME_HEAD;
        reply[4] = checksum(&reply[..4]);
        reply[12] = 0xFF; // corrupt
        reply[10] = 0x01;
        assert!(matches!(
            parse_telemetry(&reply),
            Err(Error::ReplyChecksum { .. })
        ));
    }

    #[test]
    fn test_parse_reply_bad_head() {
        let reply = [0x00u8; ACK_REPLY_LEN];
        assert!(matches!(parse_ack(&reply), Err(Error::ReplyHeader(0))));
    }
}
