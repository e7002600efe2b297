//! Receive path: assembles one full Linrad payload per cycle
//!
//! A single pull is not guaranteed to return every frame requested, so the
//! pipeline keeps pulling into the remaining part of the payload. The loop is
//! bounded by one timeout budget per packet: each pull waits at most the per-pull
//! timeout and never past the packet deadline, so a stalled radio cannot hang
//! the cycle.

use std::time::{Duration, Instant};
use tracing::trace;

use crate::endpoint::RxEndpoint;
use crate::linrad::{DcBias, PacketFramer};
use crate::types::{Direction, Frame, StreamOperation};
use crate::{BridgeError, Result};

/// Default bound on a single receive pull.
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(1);
/// Default budget for assembling one packet payload.
pub const DEFAULT_PACKET_BUDGET: Duration = Duration::from_secs(1);

/// Assembles and transforms receive payloads.
#[derive(Debug, Clone, Copy)]
pub struct RxPipeline {
    pull_timeout: Duration,
    packet_budget: Duration,
    dc_bias: DcBias,
}

impl Default for RxPipeline {
    fn default() -> Self {
        Self {
            pull_timeout: DEFAULT_PULL_TIMEOUT,
            packet_budget: DEFAULT_PACKET_BUDGET,
            dc_bias: DcBias::default(),
        }
    }
}

impl RxPipeline {
    /// Create a pipeline with explicit timeouts and transform strategy.
    pub fn new(pull_timeout: Duration, packet_budget: Duration, dc_bias: DcBias) -> Self {
        Self { pull_timeout, packet_budget, dc_bias }
    }

    /// Replace the transform strategy.
    pub fn with_dc_bias(mut self, dc_bias: DcBias) -> Self {
        self.dc_bias = dc_bias;
        self
    }

    pub fn dc_bias(&self) -> DcBias {
        self.dc_bias
    }

    /// Fill `payload` completely from `rx`.
    ///
    /// Returns the number of pulls it took. Any pull error aborts immediately;
    /// running out of budget before the payload is full is a
    /// [`BridgeError::PullTimeout`]. On error the payload contents are
    /// unspecified and must not be sent.
    pub fn assemble(&self, rx: &mut dyn RxEndpoint, payload: &mut [Frame]) -> Result<usize> {
        let started = Instant::now();
        let deadline = started + self.packet_budget;
        let expected = payload.len();
        let mut assembled = 0;
        let mut pulls = 0;

        while assembled < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BridgeError::PullTimeout {
                    assembled,
                    expected,
                    elapsed: started.elapsed(),
                });
            }

            let wanted = expected - assembled;
            let got = rx.pull(&mut payload[assembled..], self.pull_timeout.min(remaining))?;
            if got > wanted {
                return Err(BridgeError::stream(
                    Direction::Rx,
                    StreamOperation::Pull,
                    format!("driver returned {} frames for a request of {}", got, wanted),
                ));
            }

            assembled += got;
            pulls += 1;
            trace!(got, assembled, expected, "RX pull");
        }

        Ok(pulls)
    }

    /// Fill the framer's payload from `rx` and apply the DC bias adjustment.
    pub fn drain(&self, rx: &mut dyn RxEndpoint, framer: &mut PacketFramer) -> Result<usize> {
        let payload = framer.payload_mut();
        let pulls = self.assemble(rx, payload)?;
        self.dc_bias.apply(payload);
        Ok(pulls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linrad::FRAMES_PER_PACKET;
    use crate::test_utils::{FixedClock, ScriptedRx, counting_frames};

    fn pipeline() -> RxPipeline {
        RxPipeline::new(Duration::from_millis(50), Duration::from_millis(200), DcBias::PerWord)
    }

    #[test]
    fn assembles_across_partial_pulls() {
        let frames = counting_frames(FRAMES_PER_PACKET);
        let mut rx = ScriptedRx::new()
            .frames(frames[..100].to_vec())
            .frames(frames[100..101].to_vec())
            .frames(frames[101..].to_vec());
        let mut payload = [Frame::default(); FRAMES_PER_PACKET];

        let pulls = pipeline().assemble(&mut rx, &mut payload).unwrap();
        assert_eq!(pulls, 3);
        assert_eq!(payload.to_vec(), frames);
        assert_eq!(rx.requests(), vec![348, 248, 247]);
    }

    #[test]
    fn pull_error_aborts() {
        let frames = counting_frames(10);
        let mut rx = ScriptedRx::new().frames(frames).error("device gone");
        let mut payload = [Frame::default(); FRAMES_PER_PACKET];

        let err = pipeline().assemble(&mut rx, &mut payload).unwrap_err();
        assert!(matches!(err, BridgeError::Stream { direction: Direction::Rx, .. }));
    }

    #[test]
    fn stalled_endpoint_exhausts_budget() {
        let mut rx = ScriptedRx::new().frames(counting_frames(5));
        let mut payload = [Frame::default(); FRAMES_PER_PACKET];

        let err = pipeline().assemble(&mut rx, &mut payload).unwrap_err();
        match err {
            BridgeError::PullTimeout { assembled, expected, .. } => {
                assert_eq!(assembled, 5);
                assert_eq!(expected, FRAMES_PER_PACKET);
            }
            other => panic!("expected PullTimeout, got {other:?}"),
        }
    }

    #[test]
    fn overreporting_driver_is_rejected() {
        let mut rx = ScriptedRx::new().overreport(FRAMES_PER_PACKET + 1);
        let mut payload = [Frame::default(); FRAMES_PER_PACKET];

        let err = pipeline().assemble(&mut rx, &mut payload).unwrap_err();
        assert!(matches!(err, BridgeError::Stream { operation: StreamOperation::Pull, .. }));
    }

    #[test]
    fn drain_applies_dc_bias() {
        let frames = vec![Frame::new(16, -16); FRAMES_PER_PACKET];
        let mut rx = ScriptedRx::new().frames(frames);
        let mut framer = PacketFramer::new(0.0, Box::new(FixedClock::new(0)));

        pipeline().drain(&mut rx, &mut framer).unwrap();
        assert!(framer.packet().payload.iter().all(|f| *f == Frame::new(24, -8)));
    }
}
