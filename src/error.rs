//! Error types for rollbot
//!
//! # Error Classes
//!
//! Errors fall into three classes with different handling:
//!
//! ## Startup-Fatal
//!
//! - **`Config`**: Configuration file invalid or arguments unusable.
//! - **`Serial`**: Serial port could not be opened.
//! - **`MocapInit`**: Mocap session setup failed. Carries a distinct code
//!   (1 = IP parse, 2 = command socket, 3 = data socket options, 4 = bind,
//!   5 = multicast join, 6 = connect send) so the failing step is
//!   identifiable from the exit log.
//!
//! The process logs the error and exits with status 1.
//!
//! ## Runtime-Fatal
//!
//! - **`ReplyDeadline`**: The motor did not produce a full reply within the
//!   50 ms transaction deadline. A silent motor must not linger.
//! - **`ReplyHeader` / `ReplyChecksum`**: The motor reply frame failed
//!   validation.
//! - **`Io`**: The serial link failed mid-transaction.
//!
//! The controller attempts a best-effort `Pause` command and exits.
//!
//! ## Tolerated (not represented here)
//!
//! Decoder rejection of an invalid frame, transient `recvfrom` errors, a
//! stale pose in a single control tick, and CSV write failures are absorbed
//! where they occur; the loops continue.

use thiserror::Error;

/// Errors that can occur in rollbot
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Mocap init failed (code {}): {}", .0.code(), .0)]
    MocapInit(#[from] MocapInitError),

    #[error("motor reply deadline expired ({got}/{want} bytes)")]
    ReplyDeadline { got: usize, want: usize },

    #[error("unexpected motor reply header byte {0:#04x}")]
    ReplyHeader(u8),

    #[error("motor reply checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ReplyChecksum { expected: u8, actual: u8 },
}

/// Mocap session initialization failures, one variant per setup step.
#[derive(Error, Debug)]
pub enum MocapInitError {
    #[error("IP address parse failure")]
    IpParse,

    #[error("command socket creation failed: {0}")]
    CommandSocket(std::io::Error),

    #[error("data socket options failed: {0}")]
    DataSocketOptions(std::io::Error),

    #[error("data socket bind failed: {0}")]
    Bind(std::io::Error),

    #[error("multicast join failed: {0}")]
    MulticastJoin(std::io::Error),

    #[error("initial connect request failed")]
    ConnectSend,
}

impl MocapInitError {
    /// Numeric code identifying the failing setup step.
    pub fn code(&self) -> i32 {
        match self {
            MocapInitError::IpParse => 1,
            MocapInitError::CommandSocket(_) => 2,
            MocapInitError::DataSocketOptions(_) => 3,
            MocapInitError::Bind(_) => 4,
            MocapInitError::MulticastJoin(_) => 5,
            MocapInitError::ConnectSend => 6,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
