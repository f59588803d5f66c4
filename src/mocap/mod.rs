//! Mocap session: sockets, connect handshake, and receive threads
//!
//! Owns three network resources: a command UDP socket bound to the local
//! interface on an ephemeral port, a data UDP socket bound on all interfaces
//! to port 1511 and joined to the streaming multicast group, and the server's
//! command address on port 1510.
//!
//! The data channel runs in a dedicated thread at the platform's maximum
//! FIFO real-time priority: it blocks on receive, decodes each datagram, and
//! publishes valid samples to the [`PoseSlot`]. A second thread services the
//! command channel, which after startup only matters for the server-info
//! message that fixes the NatNet protocol version.
//!
//! Neither thread is cancellable; the process ends by returning from the
//! control loop and the OS reclaims the sockets.

pub mod protocol;
pub mod slot;

use crate::clock;
use crate::error::{MocapInitError, Result};
use crate::telemetry::CsvLog;
use protocol::ProtocolVersion;
use slot::PoseSlot;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

/// Streaming multicast group; must match the server's streaming settings
const MULTICAST_ADDRESS: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);

/// Server command channel port
const PORT_COMMAND: u16 = 1510;

/// Data channel port
const PORT_DATA: u16 = 1511;

/// Requested socket receive buffer size (1 MiB)
const RECV_BUFFER_BYTES: i32 = 0x10_0000;

/// Attempts for the initial connect request
const CONNECT_RETRIES: u32 = 5;

/// Largest datagram the data channel will accept
const MAX_DATAGRAM_SIZE: usize = 20_000;

/// Negotiated protocol version, written by the command thread and read by
/// the data thread. Major and minor are independent atomics; a mixed read
/// during the single startup update is harmless because every version the
/// server can advertise parses the frames we consume identically.
struct VersionCell {
    major: AtomicU8,
    minor: AtomicU8,
}

impl VersionCell {
    fn new(v: ProtocolVersion) -> Self {
        Self {
            major: AtomicU8::new(v.major),
            minor: AtomicU8::new(v.minor),
        }
    }

    fn get(&self) -> ProtocolVersion {
        ProtocolVersion {
            major: self.major.load(Ordering::Relaxed),
            minor: self.minor.load(Ordering::Relaxed),
        }
    }

    fn set(&self, v: ProtocolVersion) {
        self.major.store(v.major, Ordering::Relaxed);
        self.minor.store(v.minor, Ordering::Relaxed);
    }
}

/// Handle to a running mocap session
pub struct MocapSession {
    slot: Arc<PoseSlot>,
    version: Arc<VersionCell>,
}

impl MocapSession {
    /// Create sockets, send the connect request, and start both receive
    /// threads. Each setup step maps to a distinct [`MocapInitError`].
    pub fn start(server_ip: &str, local_ip: &str) -> Result<Self> {
        let server_addr: Ipv4Addr = server_ip.parse().map_err(|_| MocapInitError::IpParse)?;
        let local_addr: Ipv4Addr = local_ip.parse().map_err(|_| MocapInitError::IpParse)?;

        log::debug!(
            "mocap client {} -> server {}, multicast {}",
            local_addr,
            server_addr,
            MULTICAST_ADDRESS
        );

        // command socket: ephemeral local port, broadcast allowed
        let command_socket = UdpSocket::bind(SocketAddrV4::new(local_addr, 0))
            .map_err(MocapInitError::CommandSocket)?;
        command_socket
            .set_broadcast(true)
            .map_err(MocapInitError::CommandSocket)?;
        set_recv_buffer(&command_socket, RECV_BUFFER_BYTES);

        let slot = Arc::new(PoseSlot::new());
        let version = Arc::new(VersionCell::new(ProtocolVersion::DEFAULT));

        // command listener
        {
            let socket = command_socket
                .try_clone()
                .map_err(MocapInitError::CommandSocket)?;
            let version = Arc::clone(&version);
            thread::Builder::new()
                .name("mocap-command".to_string())
                .spawn(move || command_loop(socket, version))?;
        }

        // data socket: reusable, bound on all interfaces, joined to the group
        let data_socket = create_data_socket()?;
        data_socket
            .join_multicast_v4(&MULTICAST_ADDRESS, &local_addr)
            .map_err(MocapInitError::MulticastJoin)?;
        set_recv_buffer(&data_socket, RECV_BUFFER_BYTES);

        // data listener at realtime priority
        {
            let slot = Arc::clone(&slot);
            let version = Arc::clone(&version);
            thread::Builder::new()
                .name("mocap-data".to_string())
                .spawn(move || data_loop(data_socket, slot, version))?;
        }

        // initial connect request: bare header, empty payload
        let host_addr = SocketAddrV4::new(server_addr, PORT_COMMAND);
        let mut connect = [0u8; 4];
        connect[..2].copy_from_slice(&protocol::NAT_CONNECT.to_le_bytes());
        let mut sent = false;
        for _ in 0..CONNECT_RETRIES {
            if command_socket.send_to(&connect, host_addr).is_ok() {
                sent = true;
                break;
            }
        }
        if !sent {
            return Err(MocapInitError::ConnectSend.into());
        }

        log::info!("mocap session started, connect request sent to {host_addr}");

        Ok(Self { slot, version })
    }

    /// Shared latest-pose slot for the control loop
    pub fn pose_slot(&self) -> Arc<PoseSlot> {
        Arc::clone(&self.slot)
    }

    /// Currently negotiated protocol version
    pub fn version(&self) -> ProtocolVersion {
        self.version.get()
    }
}

/// Data channel loop: decode frames, publish valid samples
///
/// Transient receive errors are ignored; the loop never returns.
fn data_loop(socket: UdpSocket, slot: Arc<PoseSlot>, version: Arc<VersionCell>) {
    promote_to_realtime();

    let mut frame_log = CsvLog::create("timestamp.csv");
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        let n = match socket.recv_from(&mut buf) {
            Ok((n, _)) => n,
            Err(e) => {
                log::trace!("data recv error: {e}");
                continue;
            }
        };

        let Some((message_id, payload)) = protocol::split_packet(&buf[..n]) else {
            continue;
        };
        if message_id != protocol::NAT_FRAMEOFDATA {
            continue;
        }
        let Some(sample) = protocol::decode_frame_of_data(payload, version.get()) else {
            continue;
        };

        frame_log.line(format_args!("{},{}", sample.frame_number, clock::now_us()));

        if sample.is_valid() {
            slot.publish(sample);
        }
    }
}

/// Command channel loop: track the server's protocol version, log the rest
fn command_loop(socket: UdpSocket, version: Arc<VersionCell>) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        let n = match socket.recv_from(&mut buf) {
            Ok((n, _)) => n,
            Err(e) => {
                log::trace!("command recv error: {e}");
                continue;
            }
        };

        let Some((message_id, payload)) = protocol::split_packet(&buf[..n]) else {
            continue;
        };

        match message_id {
            protocol::NAT_SERVERINFO => {
                let Some(info) = protocol::decode_server_info(payload) else {
                    log::warn!("malformed server-info packet");
                    continue;
                };
                log::info!(
                    "mocap server: {} v{}.{}.{}.{}, NatNet {}.{}.{}.{}",
                    info.app_name,
                    info.app_version[0],
                    info.app_version[1],
                    info.app_version[2],
                    info.app_version[3],
                    info.natnet_version[0],
                    info.natnet_version[1],
                    info.natnet_version[2],
                    info.natnet_version[3],
                );
                version.set(ProtocolVersion {
                    major: info.natnet_version[0],
                    minor: info.natnet_version[1],
                });
            }
            protocol::NAT_RESPONSE => {
                log::debug!("command response ({} bytes)", payload.len());
            }
            protocol::NAT_MESSAGESTRING => {
                let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
                log::info!(
                    "server message: {}",
                    String::from_utf8_lossy(&payload[..end])
                );
            }
            protocol::NAT_UNRECOGNIZED_REQUEST => {
                log::warn!("server did not recognize our request");
            }
            protocol::NAT_MODELDEF => {
                log::debug!("ignoring model definitions ({} bytes)", payload.len());
            }
            other => {
                log::trace!("ignoring command message id {other}");
            }
        }
    }
}

/// Create the data socket: SO_REUSEADDR must be set before binding port
/// 1511, which `std` cannot express, so the socket is built through libc.
#[cfg(unix)]
fn create_data_socket() -> std::result::Result<UdpSocket, MocapInitError> {
    use std::os::fd::FromRawFd;

    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);
        if fd < 0 {
            return Err(MocapInitError::DataSocketOptions(
                std::io::Error::last_os_error(),
            ));
        }

        let one: libc::c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        ) != 0
        {
            let err = std::io::Error::last_os_error();
            libc::close(fd);
            return Err(MocapInitError::DataSocketOptions(err));
        }

        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_port = PORT_DATA.to_be();
        addr.sin_addr.s_addr = u32::from(Ipv4Addr::UNSPECIFIED).to_be();
        if libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        ) != 0
        {
            let err = std::io::Error::last_os_error();
            libc::close(fd);
            return Err(MocapInitError::Bind(err));
        }

        Ok(UdpSocket::from_raw_fd(fd))
    }
}

#[cfg(not(unix))]
fn create_data_socket() -> std::result::Result<UdpSocket, MocapInitError> {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, PORT_DATA)).map_err(MocapInitError::Bind)
}

/// Grow the socket receive buffer; best-effort
#[cfg(unix)]
fn set_recv_buffer(socket: &UdpSocket, bytes: i32) {
    use std::os::fd::AsRawFd;

    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &bytes as *const _ as *const libc::c_void,
            std::mem::size_of::<i32>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        log::debug!(
            "could not grow receive buffer to {bytes} bytes: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn set_recv_buffer(_socket: &UdpSocket, _bytes: i32) {}

/// Raise the calling thread to the maximum SCHED_FIFO priority; best-effort
#[cfg(unix)]
fn promote_to_realtime() {
    unsafe {
        let max = libc::sched_get_priority_max(libc::SCHED_FIFO);
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = max;
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc != 0 {
            log::warn!("could not raise data thread to SCHED_FIFO {max} (error {rc})");
        } else {
            log::debug!("data thread running at SCHED_FIFO {max}");
        }
    }
}

#[cfg(not(unix))]
fn promote_to_realtime() {}
