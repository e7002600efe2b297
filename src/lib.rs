//! Streams a radio's receive path to Linrad over UDP and feeds its transmit
//! path from a named pipe.
//!
//! # Features
//!
//! - **Linrad framing**: fixed 1416-byte datagrams with ring-buffer `ptr` and
//!   wrapping `block_no` sequencing
//! - **Backpressure-aware transmit**: whole frames from a non-blocking FIFO,
//!   sized to the transmit endpoint's free capacity
//! - **Status monitoring**: cadence-based FIFO and error counter reports under
//!   an explicit accumulation policy
//! - **Control services**: Linrad parameter server, rigctld PTT responder and
//!   transmit watchdog
//!
//! The radio itself sits behind the [`RxEndpoint`] and [`TxEndpoint`] traits.
//! Software endpoints in [`providers`] replay a capture and model a transmit
//! FIFO, so the whole pipeline runs without hardware.
//!
//! ## Example (receive-only replay)
//!
//! ```rust,no_run
//! use linrad_bridge::{BridgeConfig, BridgeMode, LinradBridge};
//! use tokio_util::sync::CancellationToken;
//!
//! fn main() -> linrad_bridge::Result<()> {
//!     let mut config = BridgeConfig::default();
//!     config.mode = BridgeMode::ReceiveOnly;
//!     config.radio.rx.frequency_hz = 1296.1e6;
//!     config.linrad.destination = Some(std::net::Ipv4Addr::LOCALHOST);
//!     config.endpoints.replay = Some("capture.iq".into());
//!
//!     let bridge = LinradBridge::from_config(&config, CancellationToken::new())?;
//!     let summary = bridge.run();
//!     println!("sent {} packets", summary.packets_sent);
//!     Ok(())
//! }
//! ```

use std::io::Read;

use tokio_util::sync::CancellationToken;
use tracing::info;

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Streaming pipeline
pub mod bridge;
pub mod endpoint;
pub mod feeder;
pub mod linrad;
pub mod monitor;
pub mod pipeline;
pub mod source;

// Collaborators and services
pub mod config;
pub mod control;
pub mod providers;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use bridge::{Bridge, BridgeBuilder, BridgeMode, BridgeState, BridgeSummary, TerminationReason};
pub use config::BridgeConfig;
pub use endpoint::{RxEndpoint, StreamEndpoint, TxEndpoint};
pub use feeder::{FeedOutcome, TxFeeder};
pub use linrad::{DatagramSink, LinradPacket, PacketFramer, UdpTransport};
pub use monitor::{ReportStyle, StatusReport, StreamStatusMonitor};
pub use pipeline::RxPipeline;
pub use source::FifoSource;

/// Entry point assembling a [`Bridge`] from a [`BridgeConfig`].
pub struct LinradBridge;

impl LinradBridge {
    /// Build a bridge over the software endpoints named in `config`.
    ///
    /// The receive side replays `endpoints.replay` paced at the configured
    /// sample rate. In duplex mode the transmit FIFO is opened and feeds a
    /// [`providers::SinkTx`]. Datagrams go to the resolved Linrad destination.
    ///
    /// # Errors
    ///
    /// Returns a configuration-class error if the configuration is invalid, no
    /// capture is configured, or the capture, FIFO or socket cannot be opened.
    pub fn from_config(config: &BridgeConfig, cancel: CancellationToken) -> Result<Bridge> {
        config.validate()?;

        let capture = config.endpoints.replay.as_ref().ok_or_else(|| {
            BridgeError::configuration("no receive endpoint: set endpoints.replay to a capture file")
        })?;
        let rx = providers::ReplayRx::open(capture)?
            .paced(config.radio.sample_rate)
            .looping(config.endpoints.replay_loop);

        let tx: Option<(Box<dyn TxEndpoint>, Box<dyn Read + Send>)> = match config.mode {
            BridgeMode::Duplex => {
                let source = FifoSource::open(&config.transmit.fifo)?;
                let mut sink =
                    providers::SinkTx::new(config.endpoints.sink_capacity).paced(config.radio.sample_rate);
                if let Some(path) = &config.endpoints.sink_record {
                    sink = sink.recording(path)?;
                }
                Some((Box::new(sink), Box::new(source)))
            }
            BridgeMode::ReceiveOnly => None,
        };

        let destination = config.linrad.destination_for(config.mode)?;
        let transport = UdpTransport::open(destination, config.linrad.udp_options())?;

        Self::with_endpoints(config, Box::new(rx), tx, Box::new(transport), cancel)
    }

    /// Build a bridge over caller-supplied endpoints, such as a hardware binding.
    ///
    /// A transmit path must be supplied in duplex mode and must not be in
    /// receive-only mode.
    pub fn with_endpoints(
        config: &BridgeConfig,
        rx: Box<dyn RxEndpoint>,
        tx: Option<(Box<dyn TxEndpoint>, Box<dyn Read + Send>)>,
        sink: Box<dyn DatagramSink>,
        cancel: CancellationToken,
    ) -> Result<Bridge> {
        let mut builder = Bridge::builder(rx, sink)
            .center_mhz(config.center_mhz())
            .pipeline(config.receive.pipeline(config.mode))
            .status_period(config.status_period())
            .accumulation(config.status.policy)
            .report_style(config.report_style())
            .push_timeout(config.transmit.push_timeout())
            .cancellation(cancel);

        match (config.mode, tx) {
            (BridgeMode::Duplex, Some((tx, source))) => builder = builder.transmit(tx, source),
            (BridgeMode::Duplex, None) => {
                return Err(BridgeError::configuration("duplex mode needs a transmit endpoint"));
            }
            (BridgeMode::ReceiveOnly, Some(_)) => {
                return Err(BridgeError::configuration(
                    "receive-only mode does not take a transmit endpoint",
                ));
            }
            (BridgeMode::ReceiveOnly, None) => {}
        }
        if let Some(limit) = config.cycle_limit {
            builder = builder.cycle_limit(limit);
        }

        let bridge = builder.build();
        info!(
            mode = ?bridge.mode(),
            center_mhz = config.center_mhz(),
            sample_rate = config.radio.sample_rate,
            "Bridge assembled"
        );
        Ok(bridge)
    }
}
