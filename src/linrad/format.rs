//! Linrad network packet format
//!
//! Linrad's network input expects a fixed 1416-byte datagram: a 24-byte header
//! followed by 1392 bytes of interleaved 16-bit I/Q samples. The layout mirrors
//! the C struct Linrad reads, encoded here field by field in little-endian order
//! so it never depends on the host's struct layout.
//!
//! ```text
//! offset  size  field
//!      0     8  passband_center     f64, MHz
//!      8     4  time                i32, ms since epoch (truncated)
//!     12     4  userx_freq          f32
//!     16     4  ptr                 u32, end offset in the 4096-byte ring
//!     20     2  block_no            u16, wraps at 65536
//!     22     1  userx_no            i8
//!     23     1  passband_direction  i8
//!     24  1392  payload             348 I/Q frames
//! ```

use crate::types::Frame;
use crate::{BridgeError, Result};

/// Payload bytes per packet.
pub const PAYLOAD_SIZE: usize = 1392;
/// Sample frames per packet.
pub const FRAMES_PER_PACKET: usize = PAYLOAD_SIZE / Frame::SIZE;
/// Header bytes preceding the payload.
pub const HEADER_SIZE: usize = 24;
/// Total datagram size.
pub const PACKET_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE;
/// Size of Linrad's conceptual receive ring buffer.
pub const RING_BUFFER_SIZE: u32 = 4096;
/// Linrad's default network base port.
pub const DEFAULT_PORT: u16 = 50100;
/// `userx_no` sentinel meaning "not a secondary receiver".
pub const USERX_NO_NONE: i8 = -1;
/// `passband_direction` for a non-inverted passband.
pub const PASSBAND_DIRECTION_UPPER: i8 = 1;

// Header field offsets
const OFFSET_PASSBAND_CENTER: usize = 0;
const OFFSET_TIME: usize = 8;
const OFFSET_USERX_FREQ: usize = 12;
const OFFSET_PTR: usize = 16;
const OFFSET_BLOCK_NO: usize = 20;
const OFFSET_USERX_NO: usize = 22;
const OFFSET_PASSBAND_DIRECTION: usize = 23;

/// One Linrad packet: header fields plus the sample payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LinradPacket {
    /// Center of the received band in MHz
    pub passband_center: f64,
    /// Milliseconds since the Unix epoch, truncated to 32 bits
    pub time: i32,
    /// Secondary receiver frequency (unused, zero)
    pub userx_freq: f32,
    /// Byte offset in Linrad's ring buffer where this payload ends
    pub ptr: u32,
    /// Packet sequence number
    pub block_no: u16,
    /// Receiver index
    pub userx_no: i8,
    /// Passband direction (+1 upper)
    pub passband_direction: i8,
    /// Sample payload
    pub payload: [Frame; FRAMES_PER_PACKET],
}

impl LinradPacket {
    /// Create a packet in its session-start state.
    ///
    /// `ptr` starts at one payload length, not zero: Linrad reads it as the end
    /// of valid data in its ring buffer.
    pub fn new(passband_center: f64) -> Self {
        Self {
            passband_center,
            time: 0,
            userx_freq: 0.0,
            ptr: PAYLOAD_SIZE as u32,
            block_no: 0,
            userx_no: USERX_NO_NONE,
            passband_direction: PASSBAND_DIRECTION_UPPER,
            payload: [Frame::default(); FRAMES_PER_PACKET],
        }
    }

    /// Serialize into a caller-owned datagram buffer.
    pub fn encode_into(&self, buf: &mut [u8; PACKET_SIZE]) {
        buf[OFFSET_PASSBAND_CENTER..OFFSET_TIME]
            .copy_from_slice(&self.passband_center.to_le_bytes());
        buf[OFFSET_TIME..OFFSET_USERX_FREQ].copy_from_slice(&self.time.to_le_bytes());
        buf[OFFSET_USERX_FREQ..OFFSET_PTR].copy_from_slice(&self.userx_freq.to_le_bytes());
        buf[OFFSET_PTR..OFFSET_BLOCK_NO].copy_from_slice(&self.ptr.to_le_bytes());
        buf[OFFSET_BLOCK_NO..OFFSET_USERX_NO].copy_from_slice(&self.block_no.to_le_bytes());
        buf[OFFSET_USERX_NO] = self.userx_no as u8;
        buf[OFFSET_PASSBAND_DIRECTION] = self.passband_direction as u8;
        crate::types::encode_frames(&self.payload, &mut buf[HEADER_SIZE..]);
    }

    /// Parse a datagram as received by Linrad.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != PACKET_SIZE {
            return Err(BridgeError::parse(
                "Linrad packet",
                format!("expected {} bytes, got {}", PACKET_SIZE, data.len()),
            ));
        }

        let passband_center = f64::from_le_bytes(read_array(data, OFFSET_PASSBAND_CENTER)?);
        let time = i32::from_le_bytes(read_array(data, OFFSET_TIME)?);
        let userx_freq = f32::from_le_bytes(read_array(data, OFFSET_USERX_FREQ)?);
        let ptr = u32::from_le_bytes(read_array(data, OFFSET_PTR)?);
        let block_no = u16::from_le_bytes(read_array(data, OFFSET_BLOCK_NO)?);
        let userx_no = data[OFFSET_USERX_NO] as i8;
        let passband_direction = data[OFFSET_PASSBAND_DIRECTION] as i8;

        let mut payload = [Frame::default(); FRAMES_PER_PACKET];
        for (frame, chunk) in payload.iter_mut().zip(data[HEADER_SIZE..].chunks_exact(Frame::SIZE)) {
            *frame = Frame::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        Ok(Self {
            passband_center,
            time,
            userx_freq,
            ptr,
            block_no,
            userx_no,
            passband_direction,
            payload,
        })
    }
}

fn read_array<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    data.get(offset..offset + N).and_then(|s| s.try_into().ok()).ok_or_else(|| {
        BridgeError::parse(
            "Linrad header",
            format!("insufficient data for {} bytes at offset {}", N, offset),
        )
    })
}
