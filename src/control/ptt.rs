//! PTT line and transmit watchdog

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{BridgeError, Result};

/// Default watchdog timeout.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(15 * 60);
/// How often the watchdog samples the line.
pub const WATCHDOG_POLL: Duration = Duration::from_secs(1);

/// The transmitter keying line.
pub trait PttLine: Send + Sync {
    /// Key (`true`) or unkey the transmitter.
    fn set(&self, keyed: bool) -> Result<()>;

    /// Current line state.
    fn is_keyed(&self) -> Result<bool>;
}

/// PTT driven through a sysfs GPIO value file.
///
/// The GPIO must already be exported and configured as an output.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    path: PathBuf,
}

impl SysfsGpio {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, source: std::io::Error) -> BridgeError {
        BridgeError::Ptt { path: self.path.clone(), source }
    }
}

impl PttLine for SysfsGpio {
    fn set(&self, keyed: bool) -> Result<()> {
        std::fs::write(&self.path, if keyed { "1\n" } else { "0\n" })
            .map_err(|e| self.error(e))?;
        info!(keyed, gpio = %self.path.display(), "PTT set");
        Ok(())
    }

    fn is_keyed(&self) -> Result<bool> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| self.error(e))?;
        let value: i64 = text.trim().parse().map_err(|_| {
            self.error(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unexpected GPIO value {:?}", text.trim()),
            ))
        })?;
        Ok(value != 0)
    }
}

/// In-memory PTT line.
#[derive(Debug, Default)]
pub struct MemoryPtt {
    keyed: AtomicBool,
}

impl MemoryPtt {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PttLine for MemoryPtt {
    fn set(&self, keyed: bool) -> Result<()> {
        self.keyed.store(keyed, Ordering::SeqCst);
        Ok(())
    }

    fn is_keyed(&self) -> Result<bool> {
        Ok(self.keyed.load(Ordering::SeqCst))
    }
}

/// Tracks how long the line has been keyed.
#[derive(Debug, Clone, Copy)]
struct KeyedSince {
    timeout: Duration,
    since: Option<Instant>,
}

impl KeyedSince {
    /// Record one sample; returns true when the line must be forced off.
    fn observe(&mut self, keyed: bool, now: Instant) -> bool {
        match (keyed, self.since) {
            (false, _) => {
                self.since = None;
                false
            }
            (true, None) => {
                self.since = Some(now);
                false
            }
            (true, Some(since)) => {
                if now.duration_since(since) > self.timeout {
                    self.since = None;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Forces the PTT line off once it has been keyed longer than a timeout.
pub struct Watchdog {
    line: Arc<dyn PttLine>,
    timeout: Duration,
    poll: Duration,
}

impl Watchdog {
    pub fn new(line: Arc<dyn PttLine>, timeout: Duration) -> Self {
        Self { line, timeout, poll: WATCHDOG_POLL }
    }

    /// Sample the line every `poll` instead of every second.
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Run until cancelled. A line read or write failure ends the watchdog.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(timeout_secs = self.timeout.as_secs(), "Transmit watchdog started");
        let mut ticker = interval(self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut keyed_since = KeyedSince { timeout: self.timeout, since: None };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Transmit watchdog cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let keyed = self.line.is_keyed()?;
            if keyed_since.observe(keyed, Instant::now()) {
                warn!(timeout_secs = self.timeout.as_secs(), "Watchdog timeout, forcing PTT off");
                self.line.set(false)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysfs_gpio_writes_and_reads_value_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        let gpio = SysfsGpio::new(&path);

        gpio.set(true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n");
        assert!(gpio.is_keyed().unwrap());

        gpio.set(false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\n");
        assert!(!gpio.is_keyed().unwrap());
    }

    #[test]
    fn sysfs_gpio_reports_missing_line() {
        let gpio = SysfsGpio::new("/nonexistent/gpio116/value");
        assert!(matches!(gpio.is_keyed().unwrap_err(), BridgeError::Ptt { .. }));
    }

    #[test]
    fn keyed_since_trips_only_after_timeout() {
        let start = Instant::now();
        let mut state = KeyedSince { timeout: Duration::from_secs(3), since: None };

        assert!(!state.observe(true, start));
        assert!(!state.observe(true, start + Duration::from_secs(3)));
        assert!(state.observe(true, start + Duration::from_secs(4)));
        // Re-keying starts a fresh interval
        assert!(!state.observe(true, start + Duration::from_secs(5)));
        assert!(!state.observe(false, start + Duration::from_secs(6)));
        assert!(!state.observe(true, start + Duration::from_secs(7)));
        assert!(!state.observe(true, start + Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_drops_ptt_after_timeout() {
        let line = Arc::new(MemoryPtt::new());
        line.set(true).unwrap();
        let cancel = CancellationToken::new();

        let watchdog = Watchdog::new(line.clone(), Duration::from_secs(3));
        let task = tokio::spawn(watchdog.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(line.is_keyed().unwrap());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!line.is_keyed().unwrap());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
