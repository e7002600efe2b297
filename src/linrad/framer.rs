//! Packet framer: owns the session's single Linrad packet

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

use super::format::{LinradPacket, PACKET_SIZE, PAYLOAD_SIZE, RING_BUFFER_SIZE};
use crate::types::Frame;
use crate::{BridgeError, Result};

/// Wall-clock source for packet timestamps.
pub trait Clock: Send {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> Result<i64>;
}

/// [`Clock`] backed by the system real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Result<i64> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| BridgeError::clock(format!("system time is before the epoch: {}", e)))?;
        i64::try_from(since_epoch.as_millis())
            .map_err(|_| BridgeError::clock("system time does not fit in 64-bit milliseconds"))
    }
}

/// Builds and advances the Linrad packet header.
///
/// One packet lives for the whole session and is mutated in place every cycle:
/// the receive path fills [`PacketFramer::payload_mut`], then the framer stamps
/// the time, encodes into its reusable datagram buffer and advances the sequence.
pub struct PacketFramer {
    packet: LinradPacket,
    datagram: [u8; PACKET_SIZE],
    clock: Box<dyn Clock>,
}

impl PacketFramer {
    /// Create a framer for a passband centered at `center_mhz`.
    pub fn new(center_mhz: f64, clock: Box<dyn Clock>) -> Self {
        Self { packet: LinradPacket::new(center_mhz), datagram: [0u8; PACKET_SIZE], clock }
    }

    /// Reset every header field and the payload to the session-start state.
    pub fn initialize(&mut self, center_mhz: f64) {
        self.packet = LinradPacket::new(center_mhz);
        self.datagram.fill(0);
    }

    /// Advance `ptr` by one payload modulo the ring size and bump `block_no`.
    pub fn advance(&mut self) {
        let packet = &mut self.packet;
        packet.ptr = (packet.ptr + PAYLOAD_SIZE as u32) % RING_BUFFER_SIZE;
        packet.block_no = packet.block_no.wrapping_add(1);
        trace!(ptr = packet.ptr, block_no = packet.block_no, "Advanced Linrad header");
    }

    /// Fill `time` from the clock, truncated to 32 bits.
    pub fn stamp_time(&mut self) -> Result<()> {
        let millis = self.clock.now_millis()?;
        self.packet.time = millis as i32;
        Ok(())
    }

    /// Mutable access to the payload the receive path fills.
    pub fn payload_mut(&mut self) -> &mut [Frame] {
        &mut self.packet.payload
    }

    /// Current packet state.
    pub fn packet(&self) -> &LinradPacket {
        &self.packet
    }

    /// Encode the current packet and return the datagram bytes.
    pub fn encode(&mut self) -> &[u8] {
        self.packet.encode_into(&mut self.datagram);
        &self.datagram
    }

    /// Milliseconds since the epoch from the framer's clock.
    pub fn now_millis(&self) -> Result<i64> {
        self.clock.now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FixedClock;
    use proptest::prelude::*;

    fn framer() -> PacketFramer {
        PacketFramer::new(432.0, Box::new(FixedClock::new(0)))
    }

    #[test]
    fn sequence_follows_literal_values() {
        let mut framer = framer();
        let expected = [(1392, 0), (2784, 1), (80, 2), (1472, 3), (2864, 4), (160, 5)];
        for (ptr, block_no) in expected {
            assert_eq!(framer.packet().ptr, ptr);
            assert_eq!(framer.packet().block_no, block_no);
            framer.advance();
        }
    }

    #[test]
    fn block_no_wraps_silently() {
        let mut framer = framer();
        framer.packet.block_no = u16::MAX;
        framer.advance();
        assert_eq!(framer.packet().block_no, 0);
    }

    #[test]
    fn initialize_resets_state() {
        let mut framer = framer();
        framer.advance();
        framer.payload_mut()[0] = Frame::new(5, 5);
        framer.stamp_time().unwrap();

        framer.initialize(50.1);
        assert_eq!(framer.packet(), &LinradPacket::new(50.1));
    }

    #[test]
    fn stamp_time_truncates_to_32_bits() {
        let millis = 1_700_000_000_123i64;
        let mut framer = PacketFramer::new(0.0, Box::new(FixedClock::new(millis)));
        framer.stamp_time().unwrap();
        assert_eq!(framer.packet().time, millis as i32);
    }

    #[test]
    fn stamp_time_propagates_clock_failure() {
        let mut framer = PacketFramer::new(0.0, Box::new(FixedClock::failing()));
        let err = framer.stamp_time().unwrap_err();
        assert!(matches!(err, BridgeError::Clock { .. }));
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now_millis().unwrap() > 0);
    }

    proptest! {
        #[test]
        fn advance_follows_ring_arithmetic(steps in 1usize..600) {
            let mut framer = framer();
            for n in 0..steps {
                let (ptr, block_no) = (framer.packet().ptr, framer.packet().block_no);
                framer.advance();
                let after = framer.packet();
                prop_assert_eq!(after.ptr, (ptr + 1392) % 4096);
                prop_assert_eq!(after.block_no, block_no.wrapping_add(1));
                prop_assert_eq!(after.block_no as usize, (n + 1) % 65536);
            }
        }
    }
}
