//! Linrad network protocol: packet layout, framing, sample transform and UDP
//! transport.

mod format;
mod framer;
mod transform;
mod transport;

pub use format::{
    DEFAULT_PORT, FRAMES_PER_PACKET, HEADER_SIZE, LinradPacket, PACKET_SIZE,
    PASSBAND_DIRECTION_UPPER, PAYLOAD_SIZE, RING_BUFFER_SIZE, USERX_NO_NONE,
};
pub use framer::{Clock, PacketFramer, SystemClock};
pub use transform::{DC_BIAS_BIT, DcBias};
pub use transport::{DatagramSink, UdpOptions, UdpTransport};
