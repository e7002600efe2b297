//! Non-blocking transmit byte source

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{BridgeError, Result};

/// Default path of the transmit FIFO.
pub const DEFAULT_FIFO_PATH: &str = "/tmp/txfifo";

/// Named pipe opened for non-blocking reads.
///
/// Reads return [`std::io::ErrorKind::WouldBlock`] when the pipe is empty and
/// `Ok(0)` when no writer is attached; the transmit feeder treats both as "no
/// data this cycle". Regular files can be opened too, which is handy for
/// replaying a prepared transmit signal.
#[derive(Debug)]
pub struct FifoSource {
    file: File,
    path: PathBuf,
}

impl FifoSource {
    /// Open an existing FIFO (or file) read-only and non-blocking.
    ///
    /// A missing or unreadable path is a configuration error: the bridge does
    /// not create the FIFO itself.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.read(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NONBLOCK);
        }

        let file = options.open(path).map_err(|e| BridgeError::open("transmit FIFO", path, e))?;
        info!(path = %path.display(), "Opened transmit byte source");
        Ok(Self { file, path: path.to_path_buf() })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for FifoSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}
