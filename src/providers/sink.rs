//! Transmit sink endpoint

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::endpoint::{StreamEndpoint, TxEndpoint};
use crate::types::{Direction, Frame, StreamOperation, StreamStatus, encode_frames};
use crate::{BridgeError, Result};

/// Transmit endpoint modelling a radio FIFO that drains at the sample rate.
///
/// Accepted frames can be appended to a recording file in the same
/// interleaved little-endian format the byte source delivers. Unpaced, the FIFO
/// drains instantly and never fills.
pub struct SinkTx {
    capacity: usize,
    filled: usize,
    sample_rate: Option<f64>,
    last_drain: Instant,
    underrun: u32,
    /// Frames were queued since the FIFO last ran dry
    primed: bool,
    record: Option<BufWriter<File>>,
    bytes: Vec<u8>,
    accepted: u64,
}

impl SinkTx {
    /// Create an unpaced sink of `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            filled: 0,
            sample_rate: None,
            last_drain: Instant::now(),
            underrun: 0,
            primed: false,
            record: None,
            bytes: Vec::new(),
            accepted: 0,
        }
    }

    /// Drain the FIFO at `sample_rate` frames per second.
    pub fn paced(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self.last_drain = Instant::now();
        self
    }

    /// Append accepted frames to a newly created file at `path`.
    pub fn recording<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| BridgeError::open("transmit recording", path, e))?;
        info!(path = %path.display(), "Recording transmit stream");
        self.record = Some(BufWriter::new(file));
        Ok(self)
    }

    /// Total frames accepted.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    fn drain(&mut self) {
        let Some(rate) = self.sample_rate else {
            self.filled = 0;
            return;
        };

        let drained = (self.last_drain.elapsed().as_secs_f64() * rate) as usize;
        if drained == 0 {
            return;
        }
        // Keep the fractional remainder for the next drain
        self.last_drain += Duration::from_secs_f64(drained as f64 / rate);

        if drained > self.filled && self.primed {
            self.underrun = self.underrun.saturating_add(1);
            self.primed = false;
            debug!(demand = drained, queued = self.filled, "Transmit FIFO ran dry");
        }
        self.filled = self.filled.saturating_sub(drained);
    }
}

impl StreamEndpoint for SinkTx {
    fn status(&mut self) -> Result<StreamStatus> {
        self.drain();
        Ok(StreamStatus {
            filled: self.filled,
            capacity: self.capacity,
            underrun: self.underrun,
            ..Default::default()
        })
    }

    fn teardown(&mut self) -> Result<()> {
        if let Some(mut record) = self.record.take() {
            record.flush().map_err(|e| {
                BridgeError::stream_with_source(
                    Direction::Tx,
                    StreamOperation::Teardown,
                    "flushing transmit recording",
                    Box::new(e),
                )
            })?;
        }
        info!(frames = self.accepted, underruns = self.underrun, "Transmit sink stopped");
        Ok(())
    }
}

impl TxEndpoint for SinkTx {
    fn push(&mut self, frames: &[Frame], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        self.drain();
        while self.filled >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return Ok(0);
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(1)));
            self.drain();
        }

        let accepted = frames.len().min(self.capacity - self.filled);
        if let Some(record) = self.record.as_mut() {
            let len = accepted * Frame::SIZE;
            if self.bytes.len() < len {
                self.bytes.resize(len, 0);
            }
            encode_frames(&frames[..accepted], &mut self.bytes[..len]);
            record.write_all(&self.bytes[..len]).map_err(|e| {
                BridgeError::stream_with_source(
                    Direction::Tx,
                    StreamOperation::Push,
                    "writing transmit recording",
                    Box::new(e),
                )
            })?;
        }

        if self.sample_rate.is_some() {
            self.filled += accepted;
        }
        if accepted > 0 {
            self.primed = true;
        }
        self.accepted += accepted as u64;
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::counting_frames;

    #[test]
    fn unpaced_sink_always_has_room() {
        let mut tx = SinkTx::new(8);
        for _ in 0..3 {
            assert_eq!(tx.push(&counting_frames(8), Duration::ZERO).unwrap(), 8);
            assert_eq!(tx.status().unwrap().available(), 8);
        }
        assert_eq!(tx.accepted(), 24);
    }

    #[test]
    fn paced_sink_fills_and_caps_acceptance() {
        let mut tx = SinkTx::new(8).paced(1.0);
        assert_eq!(tx.push(&counting_frames(5), Duration::ZERO).unwrap(), 5);
        assert_eq!(tx.status().unwrap().filled, 5);
        assert_eq!(tx.push(&counting_frames(5), Duration::ZERO).unwrap(), 3);
        assert_eq!(tx.push(&counting_frames(1), Duration::ZERO).unwrap(), 0);
    }

    #[test]
    fn running_dry_counts_an_underrun() {
        let mut tx = SinkTx::new(100).paced(10_000.0);
        tx.push(&counting_frames(2), Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let status = tx.status().unwrap();
        assert_eq!(status.filled, 0);
        assert_eq!(status.underrun, 1);

        // Still dry, but nothing was queued since
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(tx.status().unwrap().underrun, 1);
    }

    #[test]
    fn recording_captures_accepted_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.iq");
        let frames = counting_frames(6);

        let mut tx = SinkTx::new(4).paced(1.0).recording(&path).unwrap();
        assert_eq!(tx.push(&frames, Duration::ZERO).unwrap(), 4);
        tx.teardown().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let expected: Vec<u8> = frames[..4].iter().flat_map(|f| f.to_le_bytes()).collect();
        assert_eq!(bytes, expected);
    }
}
