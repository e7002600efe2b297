//! Replay receive endpoint for capture files

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::endpoint::{RxEndpoint, StreamEndpoint};
use crate::types::{Direction, Frame, StreamOperation, StreamStatus};
use crate::{BridgeError, Result};

/// FIFO depth the replay endpoint reports, in frames.
pub const REPLAY_FIFO_FRAMES: usize = 3480;

/// Receive endpoint that plays back a capture of interleaved little-endian
/// 16-bit I/Q frames.
///
/// Unpaced, every pull is answered immediately. Paced at a sample rate, frames
/// become available as real time passes, the way a radio FIFO fills; falling
/// more than a FIFO's worth behind counts as an overrun and the backlog is
/// dropped.
pub struct ReplayRx {
    /// Capture reader
    reader: BufReader<File>,

    /// Where the capture came from
    path: PathBuf,

    /// Restart from the beginning at end of file
    looping: bool,

    /// Frames per second, or `None` for unpaced
    sample_rate: Option<f64>,

    /// Pacing origin, set on the first pull
    started: Option<Instant>,

    /// Frames handed out since `started`, including dropped backlog
    delivered: u64,

    overrun: u32,
    bytes: Vec<u8>,
    torn_down: bool,
}

impl ReplayRx {
    /// Open a capture file for unpaced, looping playback.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| BridgeError::open("capture file", path, e))?;
        let len = file.metadata().map_err(|e| BridgeError::open("capture file", path, e))?.len();
        if len < Frame::SIZE as u64 {
            return Err(BridgeError::configuration(format!(
                "capture file {} holds no complete frame",
                path.display()
            )));
        }

        info!(path = %path.display(), frames = len / Frame::SIZE as u64, "Opened capture for replay");
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            looping: true,
            sample_rate: None,
            started: None,
            delivered: 0,
            overrun: 0,
            bytes: Vec::new(),
            torn_down: false,
        })
    }

    /// Release frames at `sample_rate` frames per second.
    pub fn paced(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Whether playback restarts at end of file.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames due but not yet delivered. `None` when unpaced.
    fn backlog(&self) -> Option<u64> {
        let rate = self.sample_rate?;
        let due = match self.started {
            Some(started) => (started.elapsed().as_secs_f64() * rate) as u64,
            None => 0,
        };
        Some(due.saturating_sub(self.delivered))
    }

    /// Read up to `buf.len()` whole frames, wrapping at end of file when looping.
    fn read_frames(&mut self, buf: &mut [Frame]) -> Result<usize> {
        let wanted = buf.len() * Frame::SIZE;
        if self.bytes.len() < wanted {
            self.bytes.resize(wanted, 0);
        }

        let mut filled = 0;
        let mut wrapped = false;
        while filled < wanted {
            match self.reader.read(&mut self.bytes[filled..wanted]) {
                Ok(0) if self.looping && !wrapped => {
                    // Drop a trailing partial frame so the next lap stays aligned
                    filled -= filled % Frame::SIZE;
                    self.reader.seek(SeekFrom::Start(0)).map_err(|e| {
                        BridgeError::stream_with_source(
                            Direction::Rx,
                            StreamOperation::Pull,
                            "capture rewind failed",
                            Box::new(e),
                        )
                    })?;
                    wrapped = true;
                    debug!(path = %self.path.display(), "Capture looped");
                }
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    wrapped = false;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(BridgeError::stream_with_source(
                        Direction::Rx,
                        StreamOperation::Pull,
                        "capture read failed",
                        Box::new(e),
                    ));
                }
            }
        }

        let frames = filled / Frame::SIZE;
        for (frame, chunk) in buf.iter_mut().zip(self.bytes[..frames * Frame::SIZE].chunks_exact(4)) {
            *frame = Frame::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(frames)
    }
}

impl StreamEndpoint for ReplayRx {
    fn status(&mut self) -> Result<StreamStatus> {
        let filled = self.backlog().map_or(0, |b| b.min(REPLAY_FIFO_FRAMES as u64) as usize);
        Ok(StreamStatus {
            filled,
            capacity: REPLAY_FIFO_FRAMES,
            overrun: self.overrun,
            ..Default::default()
        })
    }

    fn teardown(&mut self) -> Result<()> {
        if !self.torn_down {
            self.torn_down = true;
            info!(path = %self.path.display(), "Replay stopped");
        }
        Ok(())
    }
}

impl RxEndpoint for ReplayRx {
    fn pull(&mut self, buf: &mut [Frame], timeout: Duration) -> Result<usize> {
        if self.torn_down {
            return Err(BridgeError::stream(Direction::Rx, StreamOperation::Pull, "stream stopped"));
        }

        let mut available = buf.len();
        if let Some(rate) = self.sample_rate {
            self.started.get_or_insert_with(Instant::now);
            let deadline = Instant::now() + timeout;

            let mut backlog = self.backlog().unwrap_or(0);
            while backlog == 0 {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(0);
                }
                let frame_time = Duration::from_secs_f64(1.0 / rate);
                std::thread::sleep(frame_time.max(Duration::from_millis(1)).min(deadline - now));
                backlog = self.backlog().unwrap_or(0);
            }

            if backlog > REPLAY_FIFO_FRAMES as u64 {
                self.overrun = self.overrun.saturating_add(1);
                self.delivered += backlog - REPLAY_FIFO_FRAMES as u64;
                warn!(dropped = backlog - REPLAY_FIFO_FRAMES as u64, "Replay fell behind real time");
                backlog = REPLAY_FIFO_FRAMES as u64;
            }
            available = available.min(backlog as usize);
        }

        let got = self.read_frames(&mut buf[..available])?;
        if got == 0 && available > 0 {
            return Err(BridgeError::stream(
                Direction::Rx,
                StreamOperation::Pull,
                format!("end of capture {}", self.path.display()),
            ));
        }
        self.delivered += got as u64;
        Ok(got)
    }
}
