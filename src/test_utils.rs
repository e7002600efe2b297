//! Scripted endpoints, byte sources and clocks for tests and benchmarks
//!
//! Every helper is driven by a script built up front with chained builder calls,
//! so a test reads as the sequence of driver responses it exercises. Handles
//! that outlive a boxed endpoint ([`TeardownCounter`], [`PushLog`],
//! [`RecordingSink`]) share state through `Arc`.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::endpoint::{RxEndpoint, StreamEndpoint, TxEndpoint};
use crate::linrad::{Clock, DatagramSink};
use crate::types::{Direction, Frame, StreamOperation, StreamStatus};
use crate::{BridgeError, Result};

/// Capacity reported by scripted endpoints unless overridden.
pub const SCRIPTED_CAPACITY: usize = 3480;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `n` distinct frames: frame `k` is `(k, -k)`.
pub fn counting_frames(n: usize) -> Vec<Frame> {
    (0..n).map(|k| Frame::new(k as i16, -(k as i16))).collect()
}

/// [`Clock`] pinned to a fixed instant, or failing on every read.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    millis: Option<i64>,
}

impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self { millis: Some(millis) }
    }

    /// A clock whose every read fails.
    pub fn failing() -> Self {
        Self { millis: None }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> Result<i64> {
        self.millis.ok_or_else(|| BridgeError::clock("scripted clock failure"))
    }
}

/// Shared count of teardown calls on a scripted endpoint.
#[derive(Debug, Clone, Default)]
pub struct TeardownCounter(Arc<AtomicUsize>);

impl TeardownCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
enum RxStep {
    Frames(Vec<Frame>),
    Error(String),
    Overreport(usize),
}

/// Receive endpoint replaying a script of pull responses.
///
/// A `frames` step larger than the caller's buffer is split across pulls. Once
/// the script is exhausted every pull sleeps for its timeout and returns zero
/// frames, like a radio that stopped delivering.
#[derive(Debug)]
pub struct ScriptedRx {
    script: VecDeque<RxStep>,
    status: StreamStatus,
    status_fails: bool,
    requests: Vec<usize>,
    teardowns: TeardownCounter,
}

impl Default for ScriptedRx {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRx {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            status: StreamStatus { capacity: SCRIPTED_CAPACITY, ..Default::default() },
            status_fails: false,
            requests: Vec::new(),
            teardowns: TeardownCounter::default(),
        }
    }

    /// Deliver `frames`, over as many pulls as the caller's buffers need.
    pub fn frames(mut self, frames: Vec<Frame>) -> Self {
        self.script.push_back(RxStep::Frames(frames));
        self
    }

    /// Fail the next pull.
    pub fn error(mut self, reason: &str) -> Self {
        self.script.push_back(RxStep::Error(reason.to_string()));
        self
    }

    /// Claim `count` frames on the next pull regardless of the buffer size.
    pub fn overreport(mut self, count: usize) -> Self {
        self.script.push_back(RxStep::Overreport(count));
        self
    }

    pub fn with_status(mut self, status: StreamStatus) -> Self {
        self.status = status;
        self
    }

    pub fn failing_status(mut self) -> Self {
        self.status_fails = true;
        self
    }

    /// Requested frame counts, one per pull.
    pub fn requests(&self) -> Vec<usize> {
        self.requests.clone()
    }

    pub fn teardowns(&self) -> TeardownCounter {
        self.teardowns.clone()
    }
}

impl StreamEndpoint for ScriptedRx {
    fn status(&mut self) -> Result<StreamStatus> {
        if self.status_fails {
            return Err(BridgeError::stream(Direction::Rx, StreamOperation::Status, "scripted failure"));
        }
        Ok(self.status)
    }

    fn teardown(&mut self) -> Result<()> {
        self.teardowns.bump();
        Ok(())
    }
}

impl RxEndpoint for ScriptedRx {
    fn pull(&mut self, buf: &mut [Frame], timeout: Duration) -> Result<usize> {
        self.requests.push(buf.len());
        match self.script.pop_front() {
            Some(RxStep::Frames(mut frames)) => {
                if frames.len() > buf.len() {
                    let rest = frames.split_off(buf.len());
                    self.script.push_front(RxStep::Frames(rest));
                }
                buf[..frames.len()].copy_from_slice(&frames);
                Ok(frames.len())
            }
            Some(RxStep::Error(reason)) => {
                Err(BridgeError::stream(Direction::Rx, StreamOperation::Pull, reason))
            }
            Some(RxStep::Overreport(count)) => Ok(count),
            None => {
                std::thread::sleep(timeout);
                Ok(0)
            }
        }
    }
}

/// Shared record of frames a [`ScriptedTx`] accepted.
#[derive(Debug, Clone, Default)]
pub struct PushLog(Arc<Mutex<Vec<Frame>>>);

impl PushLog {
    pub fn frames(&self) -> Vec<Frame> {
        lock(&self.0).clone()
    }
}

/// Transmit endpoint with a fixed reported fill level.
///
/// The FIFO is modelled as draining as fast as it is fed, so `filled` stays at
/// whatever the test configured.
#[derive(Debug)]
pub struct ScriptedTx {
    capacity: usize,
    filled: usize,
    underrun: u32,
    accept_limit: Option<usize>,
    status_fails: bool,
    pushed: PushLog,
    teardowns: TeardownCounter,
}

impl ScriptedTx {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            filled: 0,
            underrun: 0,
            accept_limit: None,
            status_fails: false,
            pushed: PushLog::default(),
            teardowns: TeardownCounter::default(),
        }
    }

    pub fn with_filled(mut self, filled: usize) -> Self {
        self.filled = filled;
        self
    }

    pub fn with_underrun(mut self, underrun: u32) -> Self {
        self.underrun = underrun;
        self
    }

    /// Accept at most `limit` frames per push.
    pub fn accepting_at_most(mut self, limit: usize) -> Self {
        self.accept_limit = Some(limit);
        self
    }

    pub fn failing_status(mut self) -> Self {
        self.status_fails = true;
        self
    }

    /// Every frame accepted so far.
    pub fn pushed(&self) -> Vec<Frame> {
        self.pushed.frames()
    }

    pub fn push_log(&self) -> PushLog {
        self.pushed.clone()
    }

    pub fn teardowns(&self) -> TeardownCounter {
        self.teardowns.clone()
    }
}

impl StreamEndpoint for ScriptedTx {
    fn status(&mut self) -> Result<StreamStatus> {
        if self.status_fails {
            return Err(BridgeError::stream(Direction::Tx, StreamOperation::Status, "scripted failure"));
        }
        Ok(StreamStatus {
            filled: self.filled,
            capacity: self.capacity,
            underrun: self.underrun,
            ..Default::default()
        })
    }

    fn teardown(&mut self) -> Result<()> {
        self.teardowns.bump();
        Ok(())
    }
}

impl TxEndpoint for ScriptedTx {
    fn push(&mut self, frames: &[Frame], _timeout: Duration) -> Result<usize> {
        let accepted = self.accept_limit.map_or(frames.len(), |limit| frames.len().min(limit));
        lock(&self.pushed.0).extend_from_slice(&frames[..accepted]);
        Ok(accepted)
    }
}

#[derive(Debug)]
enum SourceStep {
    Data(Vec<u8>),
    WouldBlock,
    Eof,
    Interrupted,
    Error(ErrorKind),
}

/// Byte source replaying a script of read results.
///
/// Data larger than the caller's buffer is returned as a prefix and the rest
/// stays queued. An exhausted script reads as would-block.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<SourceStep>,
    largest_request: usize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(mut self, bytes: Vec<u8>) -> Self {
        self.script.push_back(SourceStep::Data(bytes));
        self
    }

    pub fn would_block(mut self) -> Self {
        self.script.push_back(SourceStep::WouldBlock);
        self
    }

    pub fn eof(mut self) -> Self {
        self.script.push_back(SourceStep::Eof);
        self
    }

    pub fn interrupted(mut self) -> Self {
        self.script.push_back(SourceStep::Interrupted);
        self
    }

    pub fn error(mut self, kind: ErrorKind) -> Self {
        self.script.push_back(SourceStep::Error(kind));
        self
    }

    /// Script entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    /// Largest buffer any read was offered.
    pub fn largest_request(&self) -> usize {
        self.largest_request
    }
}

impl Read for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.largest_request = self.largest_request.max(buf.len());
        match self.script.pop_front() {
            Some(SourceStep::Data(mut bytes)) => {
                if bytes.len() > buf.len() {
                    let rest = bytes.split_off(buf.len());
                    self.script.push_front(SourceStep::Data(rest));
                }
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(SourceStep::Eof) => Ok(0),
            Some(SourceStep::Interrupted) => Err(ErrorKind::Interrupted.into()),
            Some(SourceStep::Error(kind)) => Err(kind.into()),
            Some(SourceStep::WouldBlock) | None => Err(ErrorKind::WouldBlock.into()),
        }
    }
}

/// [`DatagramSink`] keeping every datagram in memory.
///
/// Clones share the same record, so keep one clone before boxing the sink.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    datagrams: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datagrams(&self) -> Vec<Vec<u8>> {
        lock(&self.datagrams).clone()
    }
}

impl DatagramSink for RecordingSink {
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<()> {
        lock(&self.datagrams).push(datagram.to_vec());
        Ok(())
    }
}
