//! NatNet wire protocol decoding
//!
//! Parses the subset of the NatNet stream this controller needs: the
//! frame-of-data message (first rigid body + mid-exposure timestamp) on the
//! data channel, and the server-info message (protocol version) on the
//! command channel. Everything else in a frame is consumed positionally or
//! bulk-skipped so the suffix stays aligned.
//!
//! All wire integers and floats are little-endian. Reads go through a cursor
//! that copies bytes out of the datagram slice - the payload is never
//! reinterpreted in place, so alignment of the receive buffer is irrelevant.
//! A truncated or malformed datagram yields `None`, never a panic.

use super::slot::PoseSample;

// NatNet message ids
pub const NAT_CONNECT: u16 = 0;
pub const NAT_SERVERINFO: u16 = 1;
pub const NAT_RESPONSE: u16 = 3;
pub const NAT_MODELDEF: u16 = 5;
pub const NAT_FRAMEOFDATA: u16 = 7;
pub const NAT_MESSAGESTRING: u16 = 8;
pub const NAT_UNRECOGNIZED_REQUEST: u16 = 100;

/// Maximum length of the server application name
const MAX_NAME_LENGTH: usize = 256;

/// Negotiated NatNet protocol version (major, minor)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// Version assumed until the server advertises its own
    pub const DEFAULT: Self = Self { major: 4, minor: 0 };

    /// True when this version is `major.minor` or newer
    #[inline]
    pub fn at_least(self, major: u8, minor: u8) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }
}

/// Server descriptor carried by the server-info message
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Streaming application name (e.g., "Motive")
    pub app_name: String,
    /// Application version quad
    pub app_version: [u8; 4],
    /// NatNet protocol version quad
    pub natnet_version: [u8; 4],
    /// Server high-resolution clock frequency, ticks per second
    pub clock_frequency: u64,
    /// Data channel port
    pub data_port: u16,
    /// Whether the server streams to a multicast group
    pub multicast: bool,
    /// Multicast group address octets
    pub multicast_group: [u8; 4],
}

/// Split a datagram into message id and payload per the 4-byte packet header
pub fn split_packet(datagram: &[u8]) -> Option<(u16, &[u8])> {
    if datagram.len() < 4 {
        return None;
    }
    let message_id = u16::from_le_bytes([datagram[0], datagram[1]]);
    let length = u16::from_le_bytes([datagram[2], datagram[3]]) as usize;
    let payload = datagram.get(4..4 + length)?;
    Some((message_id, payload))
}

/// Byte-wise little-endian reader over a datagram payload
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let slice = self.buf.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(slice)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    fn read_i16(&mut self) -> Option<i16> {
        let b = self.take(2)?;
        Some(i16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u16(&mut self) -> Option<u16> {
        let b = self.take(2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_i32(&mut self) -> Option<i32> {
        let b = self.take(4)?;
        Some(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u32(&mut self) -> Option<u32> {
        let b = self.take(4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Option<u64> {
        let b = self.take(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(b);
        Some(u64::from_le_bytes(bytes))
    }

    fn read_f32(&mut self) -> Option<f32> {
        let b = self.take(4)?;
        Some(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip_f64(&mut self) -> Option<()> {
        self.skip(8)
    }
}

/// Consume a section's optional size word and, when present, the section body
///
/// NatNet 4.1 and later prefix each section with its byte size so readers can
/// bulk-skip content they do not care about. Earlier versions carry no size
/// word; their uninteresting sections are empty in the streams this
/// controller consumes.
fn skip_sized_section(c: &mut Cursor, version: ProtocolVersion) -> Option<()> {
    if version.at_least(4, 1) {
        let n_bytes = c.read_u32()? as usize;
        c.skip(n_bytes)?;
    }
    Some(())
}

/// Decode a frame-of-data payload into a pose sample proposal
///
/// Retains the first rigid body and the camera mid-exposure timestamp.
/// Returns `None` for frames with no rigid bodies and for any truncated or
/// structurally invalid payload. The caller applies the publication gate.
pub fn decode_frame_of_data(payload: &[u8], version: ProtocolVersion) -> Option<PoseSample> {
    let mut c = Cursor::new(payload);
    let mut sample = PoseSample::default();

    // prefix
    sample.frame_number = c.read_i32()?;

    // marker sets
    let _n_marker_sets = c.read_i32()?;
    skip_sized_section(&mut c, version)?;

    // legacy other markers
    let _n_other_markers = c.read_i32()?;
    skip_sized_section(&mut c, version)?;

    // rigid bodies: parsed field-by-field so later sections stay aligned
    let n_rigid_bodies = c.read_i32()?;
    if version.at_least(4, 1) {
        let _n_bytes = c.read_u32()?;
    }
    for body_index in 0..n_rigid_bodies.max(0) {
        let id = c.read_i32()?;
        let x = c.read_f32()?;
        let y = c.read_f32()?;
        let z = c.read_f32()?;
        let qx = c.read_f32()?;
        let qy = c.read_f32()?;
        let qz = c.read_f32()?;
        let qw = c.read_f32()?;

        if body_index == 0 {
            sample.body_id = id;
            sample.x = x;
            sample.y = y;
            sample.z = z;
            sample.qx = qx;
            sample.qy = qy;
            sample.qz = qz;
            sample.qw = qw;
        }

        if version.at_least(2, 0) {
            let mean_error = c.read_f32()?;
            if body_index == 0 {
                sample.mean_error = mean_error;
            }
        }

        if version.at_least(2, 6) {
            let params = c.read_i16()?;
            if body_index == 0 {
                // bit 0: rigid body was successfully tracked this frame
                sample.tracking_valid = params & 0x01 != 0;
            }
        }
    }

    // skeletons
    if version.at_least(2, 1) {
        let _n_skeletons = c.read_i32()?;
        skip_sized_section(&mut c, version)?;
    }

    // assets
    if version.at_least(4, 1) {
        let _n_assets = c.read_i32()?;
        skip_sized_section(&mut c, version)?;
    }

    // labeled markers
    if version.at_least(2, 3) {
        let _n_labeled = c.read_i32()?;
        skip_sized_section(&mut c, version)?;
    }

    // force plates
    if version.at_least(2, 9) {
        let _n_plates = c.read_i32()?;
        skip_sized_section(&mut c, version)?;
    }

    // devices
    if version.at_least(2, 11) {
        let _n_devices = c.read_i32()?;
        skip_sized_section(&mut c, version)?;
    }

    // suffix
    if !version.at_least(3, 0) {
        let _software_latency = c.read_f32()?;
    }
    let _timecode = c.read_u32()?;
    let _timecode_sub = c.read_u32()?;
    if version.at_least(2, 7) {
        c.skip_f64()?; // frame timestamp, seconds
    } else {
        let _timestamp = c.read_f32()?;
    }
    if version.at_least(3, 0) {
        sample.mid_exposure_timestamp = c.read_u64()?;
        let _data_received = c.read_u64()?;
        let _transmit = c.read_u64()?;
    }
    if version.at_least(4, 1) {
        let _precision_secs = c.read_u32()?;
        let _precision_frac = c.read_u32()?;
    }
    let _frame_params = c.read_i16()?;
    let _end_of_data = c.read_i32()?;

    if n_rigid_bodies <= 0 {
        return None;
    }
    Some(sample)
}

/// Decode a server-info payload into a server descriptor
pub fn decode_server_info(payload: &[u8]) -> Option<ServerInfo> {
    let mut c = Cursor::new(payload);

    let name_block = c.take(MAX_NAME_LENGTH)?;
    let name_len = name_block
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(MAX_NAME_LENGTH);
    let app_name = String::from_utf8_lossy(&name_block[..name_len]).into_owned();

    let mut app_version = [0u8; 4];
    app_version.copy_from_slice(c.take(4)?);
    let mut natnet_version = [0u8; 4];
    natnet_version.copy_from_slice(c.take(4)?);

    let clock_frequency = c.read_u64()?;
    let data_port = c.read_u16()?;
    let multicast = c.take(1)?[0] != 0;
    let mut multicast_group = [0u8; 4];
    multicast_group.copy_from_slice(c.take(4)?);

    Some(ServerInfo {
        app_name,
        app_version,
        natnet_version,
        clock_frequency,
        data_port,
        multicast,
        multicast_group,
    })
}
