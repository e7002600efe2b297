//! Transmit path feeder
//!
//! Moves whole sample frames from a non-blocking byte source into the transmit
//! endpoint without exceeding the endpoint's free capacity and without blocking
//! the cycle. An empty source or a full endpoint is steady state, not an error.

use std::io::{ErrorKind, Read};
use std::time::Duration;
use tracing::{debug, trace};

use crate::endpoint::TxEndpoint;
use crate::types::{Direction, Frame, StreamOperation, decode_frames};
use crate::{BridgeError, Result};

/// Default bound on the transmit push wait.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on frames read from the source in one feed, whatever capacity
/// the endpoint reports.
pub const MAX_FEED_FRAMES: usize = 1 << 16;

/// What one feed attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The transmit FIFO had no free space.
    NoCapacity,
    /// The byte source had nothing to read.
    NoData,
    /// Frames were read and accepted by the endpoint.
    Fed { frames: usize },
}

/// Feeds the transmit endpoint from a byte source.
pub struct TxFeeder<S> {
    source: S,
    bytes: Vec<u8>,
    frames: Vec<Frame>,
    push_timeout: Duration,
    frames_fed: u64,
}

impl<S: Read> TxFeeder<S> {
    /// Create a feeder reading from `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            bytes: Vec::new(),
            frames: Vec::new(),
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            frames_fed: 0,
        }
    }

    /// Set the bounded wait used when pushing to the endpoint.
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    /// Total frames accepted by the endpoint so far.
    pub fn frames_fed(&self) -> u64 {
        self.frames_fed
    }

    /// Run one feed attempt against `tx`.
    ///
    /// Fails on status or push errors, on source read failures other than
    /// would-block, on reads that are not a whole number of frames, and when the
    /// endpoint accepts fewer frames than were submitted. None of the bytes of a
    /// misaligned read reach the endpoint.
    pub fn feed(&mut self, tx: &mut dyn TxEndpoint) -> Result<FeedOutcome> {
        let status = tx.status()?;
        let available = status.available();
        if available == 0 {
            trace!(filled = status.filled, capacity = status.capacity, "TX FIFO full");
            return Ok(FeedOutcome::NoCapacity);
        }

        let wanted = available.min(MAX_FEED_FRAMES) * Frame::SIZE;
        if self.bytes.len() < wanted {
            self.bytes.resize(wanted, 0);
        }

        let read = match self.source.read(&mut self.bytes[..wanted]) {
            Ok(0) => return Ok(FeedOutcome::NoData),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                return Ok(FeedOutcome::NoData);
            }
            Err(e) => return Err(BridgeError::ByteSource { source: e }),
        };

        if read % Frame::SIZE != 0 {
            return Err(BridgeError::UnalignedRead { bytes: read, frame_size: Frame::SIZE });
        }

        self.frames.clear();
        decode_frames(&self.bytes[..read], &mut self.frames);
        let submitted = self.frames.len();

        let accepted = tx.push(&self.frames, self.push_timeout)?;
        if accepted > submitted {
            return Err(BridgeError::stream(
                Direction::Tx,
                StreamOperation::Push,
                format!("driver reported {} frames accepted of {} submitted", accepted, submitted),
            ));
        }
        if accepted != submitted {
            return Err(BridgeError::ShortWrite { submitted, accepted });
        }

        self.frames_fed += accepted as u64;
        debug!(frames = accepted, available, "Fed TX stream");
        Ok(FeedOutcome::Fed { frames: accepted })
    }
}
