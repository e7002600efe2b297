//! Bridge loop: composes the receive and transmit paths into one fixed cycle
//!
//! Each cycle runs, in order: cancellation check, status poll (on cadence),
//! transmit feed (duplex only), receive drain with DC bias, time stamp, send,
//! header advance. The first fatal error ends the loop. Endpoints are torn down
//! exactly once on the way out, including when the bridge is dropped without
//! running to completion.

use std::io::Read;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::endpoint::{RxEndpoint, TxEndpoint};
use crate::feeder::{DEFAULT_PUSH_TIMEOUT, TxFeeder};
use crate::linrad::{Clock, DatagramSink, DcBias, PacketFramer, SystemClock};
use crate::monitor::{
    DUPLEX_STATUS_PERIOD, RECEIVE_ONLY_STATUS_PERIOD, ReportStyle, StreamStatusMonitor,
};
use crate::pipeline::RxPipeline;
use crate::types::{AccumulationPolicy, ErrorCounters};
use crate::{BridgeError, Result};

/// Which stream paths the bridge drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeMode {
    /// Receive to Linrad and transmit from the byte source.
    #[default]
    Duplex,
    /// Receive to Linrad only.
    ReceiveOnly,
}

impl BridgeMode {
    /// Status poll period the mode uses unless configured otherwise.
    pub fn default_status_period(self) -> u64 {
        match self {
            BridgeMode::Duplex => DUPLEX_STATUS_PERIOD,
            BridgeMode::ReceiveOnly => RECEIVE_ONLY_STATUS_PERIOD,
        }
    }

    pub fn default_report_style(self) -> ReportStyle {
        match self {
            BridgeMode::Duplex => ReportStyle::Full,
            BridgeMode::ReceiveOnly => ReportStyle::ErrorsOnly,
        }
    }

    pub fn default_dc_bias(self) -> DcBias {
        match self {
            BridgeMode::Duplex => DcBias::PerWord,
            BridgeMode::ReceiveOnly => DcBias::PerFrame,
        }
    }
}

/// Lifecycle state of a [`Bridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Running,
    Terminated,
}

/// Why the loop stopped.
#[derive(Debug)]
pub enum TerminationReason {
    /// The cancellation token fired.
    Cancelled,
    /// The configured cycle limit was reached.
    CycleLimit,
    /// A fatal error ended the loop.
    Failed(BridgeError),
}

/// Outcome of [`Bridge::run`].
#[derive(Debug)]
pub struct BridgeSummary {
    /// Cycles completed without error
    pub cycles: u64,
    /// Linrad datagrams sent
    pub packets_sent: u64,
    /// Frames accepted by the transmit endpoint
    pub frames_fed: u64,
    pub reason: TerminationReason,
    /// Receive error totals at termination
    pub rx_totals: ErrorCounters,
    /// Transmit error totals at termination, duplex only
    pub tx_totals: Option<ErrorCounters>,
}

impl BridgeSummary {
    /// The fatal error, if the loop failed.
    pub fn error(&self) -> Option<&BridgeError> {
        match &self.reason {
            TerminationReason::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the loop stopped without a fatal error.
    pub fn is_clean(&self) -> bool {
        self.error().is_none()
    }
}

struct TxPath {
    endpoint: Box<dyn TxEndpoint>,
    feeder: TxFeeder<Box<dyn Read + Send>>,
}

/// Builder for [`Bridge`].
pub struct BridgeBuilder {
    rx: Box<dyn RxEndpoint>,
    sink: Box<dyn DatagramSink>,
    tx: Option<(Box<dyn TxEndpoint>, Box<dyn Read + Send>)>,
    center_mhz: f64,
    clock: Box<dyn Clock>,
    pipeline: Option<RxPipeline>,
    status_period: Option<u64>,
    policy: AccumulationPolicy,
    style: Option<ReportStyle>,
    push_timeout: Duration,
    cancel: CancellationToken,
    cycle_limit: Option<u64>,
}

impl BridgeBuilder {
    /// Add a transmit path fed from `source`, making the bridge duplex.
    pub fn transmit(mut self, tx: Box<dyn TxEndpoint>, source: Box<dyn Read + Send>) -> Self {
        self.tx = Some((tx, source));
        self
    }

    /// Passband center written into every packet, in MHz.
    pub fn center_mhz(mut self, center_mhz: f64) -> Self {
        self.center_mhz = center_mhz;
        self
    }

    pub fn clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pipeline(mut self, pipeline: RxPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Poll status every `period` cycles; zero disables polling.
    pub fn status_period(mut self, period: u64) -> Self {
        self.status_period = Some(period);
        self
    }

    pub fn accumulation(mut self, policy: AccumulationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn report_style(mut self, style: ReportStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stop after `cycles` successful cycles.
    pub fn cycle_limit(mut self, cycles: u64) -> Self {
        self.cycle_limit = Some(cycles);
        self
    }

    /// Finish the bridge. Unset options follow the mode implied by whether a
    /// transmit path was added.
    pub fn build(self) -> Bridge {
        let mode = if self.tx.is_some() { BridgeMode::Duplex } else { BridgeMode::ReceiveOnly };
        let pipeline = self
            .pipeline
            .unwrap_or_else(|| RxPipeline::default().with_dc_bias(mode.default_dc_bias()));
        let monitor = StreamStatusMonitor::new(
            self.status_period.unwrap_or(mode.default_status_period()),
            self.policy,
            self.style.unwrap_or(mode.default_report_style()),
        );
        let push_timeout = self.push_timeout;
        let tx = self.tx.map(|(endpoint, source)| TxPath {
            endpoint,
            feeder: TxFeeder::new(source).with_push_timeout(push_timeout),
        });

        Bridge {
            mode,
            rx: self.rx,
            tx,
            framer: PacketFramer::new(self.center_mhz, self.clock),
            pipeline,
            monitor,
            sink: self.sink,
            cancel: self.cancel,
            cycle_limit: self.cycle_limit,
            cycle: 0,
            packets_sent: 0,
            torn_down: false,
        }
    }
}

/// The streaming bridge between the radio endpoints and Linrad.
pub struct Bridge {
    mode: BridgeMode,
    rx: Box<dyn RxEndpoint>,
    tx: Option<TxPath>,
    framer: PacketFramer,
    pipeline: RxPipeline,
    monitor: StreamStatusMonitor,
    sink: Box<dyn DatagramSink>,
    cancel: CancellationToken,
    cycle_limit: Option<u64>,
    cycle: u64,
    packets_sent: u64,
    torn_down: bool,
}

impl Bridge {
    /// Start building a bridge that drains `rx` into `sink`.
    pub fn builder(rx: Box<dyn RxEndpoint>, sink: Box<dyn DatagramSink>) -> BridgeBuilder {
        BridgeBuilder {
            rx,
            sink,
            tx: None,
            center_mhz: 0.0,
            clock: Box::new(SystemClock),
            pipeline: None,
            status_period: None,
            policy: AccumulationPolicy::default(),
            style: None,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            cancel: CancellationToken::new(),
            cycle_limit: None,
        }
    }

    pub fn mode(&self) -> BridgeMode {
        self.mode
    }

    pub fn state(&self) -> BridgeState {
        if self.torn_down { BridgeState::Terminated } else { BridgeState::Running }
    }

    /// Cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// The framer, for inspecting the header state between cycles.
    pub fn framer(&self) -> &PacketFramer {
        &self.framer
    }

    /// Run one cycle.
    ///
    /// Any error is fatal: the endpoints are torn down before it is returned
    /// and every later call fails.
    pub fn step(&mut self) -> Result<()> {
        if self.torn_down {
            return Err(BridgeError::configuration("bridge has already terminated"));
        }

        let result = self.cycle_once();
        if result.is_err() {
            self.teardown();
        }
        result
    }

    fn cycle_once(&mut self) -> Result<()> {
        if self.monitor.is_due(self.cycle) {
            let at_millis = self.framer.now_millis()?;
            let tx = self.tx.as_mut().map(|path| path.endpoint.as_mut() as &mut dyn TxEndpoint);
            self.monitor.poll(self.cycle, at_millis, self.rx.as_mut(), tx)?;
        }

        if let Some(path) = self.tx.as_mut() {
            let outcome = path.feeder.feed(path.endpoint.as_mut())?;
            debug!(cycle = self.cycle, ?outcome, "TX feed");
        }

        self.pipeline.drain(self.rx.as_mut(), &mut self.framer)?;
        self.framer.stamp_time()?;
        self.sink.send_datagram(self.framer.encode())?;
        self.packets_sent += 1;
        self.framer.advance();
        self.cycle += 1;
        Ok(())
    }

    /// Run until cancelled, the cycle limit is reached, or a fatal error.
    ///
    /// Endpoints are torn down before this returns.
    pub fn run(mut self) -> BridgeSummary {
        info!(
            mode = ?self.mode,
            center_mhz = self.framer.packet().passband_center,
            cycle_limit = ?self.cycle_limit,
            "Bridge loop started"
        );

        let reason = loop {
            if self.cancel.is_cancelled() {
                info!(cycles = self.cycle, "Bridge loop cancelled");
                break TerminationReason::Cancelled;
            }
            if self.cycle_limit.is_some_and(|limit| self.cycle >= limit) {
                info!(cycles = self.cycle, "Bridge cycle limit reached");
                break TerminationReason::CycleLimit;
            }
            if let Err(e) = self.step() {
                error!(
                    cycle = self.cycle,
                    class = ?e.class(),
                    error = %e,
                    "Bridge loop terminated"
                );
                break TerminationReason::Failed(e);
            }
        };

        self.teardown();

        BridgeSummary {
            cycles: self.cycle,
            packets_sent: self.packets_sent,
            frames_fed: self.tx.as_ref().map_or(0, |path| path.feeder.frames_fed()),
            reason,
            rx_totals: self.monitor.rx_totals(),
            tx_totals: self.tx.as_ref().map(|_| self.monitor.tx_totals()),
        }
    }

    /// Stop both endpoints. Only the first call has any effect.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.rx.teardown() {
            warn!(error = %e, "RX teardown failed");
        }
        if let Some(path) = self.tx.as_mut() {
            if let Err(e) = path.endpoint.teardown() {
                warn!(error = %e, "TX teardown failed");
            }
        }
        info!(cycles = self.cycle, packets = self.packets_sent, "Stream endpoints torn down");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.teardown();
    }
}
