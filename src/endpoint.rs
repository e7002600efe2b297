//! Stream endpoint traits
//!
//! The device configuration layer (opening the radio, tuning, gain, calibration)
//! sits outside the bridge. Once configured it hands the bridge two endpoints:
//! one readable ([`RxEndpoint`]) and one writable ([`TxEndpoint`]). The traits
//! are deliberately small: whole-frame transfers with an explicit timeout, a
//! status query, and a teardown hook the bridge calls exactly once.

use std::time::Duration;

use crate::Result;
use crate::types::{Frame, StreamStatus};

/// Operations common to both stream directions.
pub trait StreamEndpoint: Send {
    /// Read the endpoint's FIFO level and error counters.
    fn status(&mut self) -> Result<StreamStatus>;

    /// Stop the stream and release driver resources.
    ///
    /// The bridge calls this once when the loop terminates, whatever the reason.
    fn teardown(&mut self) -> Result<()>;
}

/// Receive stream endpoint.
pub trait RxEndpoint: StreamEndpoint {
    /// Read up to `buf.len()` frames, waiting at most `timeout`.
    ///
    /// Returns the number of frames written to the front of `buf`, which may be
    /// fewer than requested (including zero on timeout).
    fn pull(&mut self, buf: &mut [Frame], timeout: Duration) -> Result<usize>;
}

/// Transmit stream endpoint.
pub trait TxEndpoint: StreamEndpoint {
    /// Queue `frames` for transmission, waiting at most `timeout` for space.
    ///
    /// Returns the number of frames accepted.
    fn push(&mut self, frames: &[Frame], timeout: Duration) -> Result<usize>;
}
