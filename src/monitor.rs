//! Periodic stream status monitoring
//!
//! The monitor runs on a cycle-count cadence, not wall-clock time: every
//! `period` cycles it polls the endpoints, folds their error counters into
//! running totals and logs a report. A failed status query is fatal, because it
//! travels over the same driver channel as the sample data.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::endpoint::{RxEndpoint, TxEndpoint};
use crate::types::{AccumulationPolicy, ErrorAccumulator, ErrorCounters, StreamStatus};
use crate::Result;

/// Default poll period for the duplex bridge, in cycles.
pub const DUPLEX_STATUS_PERIOD: u64 = 0x512;
/// Default poll period for the receive-only bridge, in cycles.
pub const RECEIVE_ONLY_STATUS_PERIOD: u64 = 1024;

/// How status reports are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStyle {
    /// Log both endpoints' fill level and totals on every poll.
    #[default]
    Full,
    /// Log only when the receive snapshot shows errors.
    ErrorsOnly,
}

/// One poll's raw snapshots and accumulated totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Cycle index the poll ran on
    pub cycle: u64,
    /// Wall-clock time of the poll, ms since the epoch
    pub at_millis: i64,
    /// Raw receive snapshot
    pub rx: StreamStatus,
    /// Accumulated receive totals
    pub rx_totals: ErrorCounters,
    /// Raw transmit snapshot, when a transmit path exists
    pub tx: Option<StreamStatus>,
    /// Accumulated transmit totals, when a transmit path exists
    pub tx_totals: Option<ErrorCounters>,
}

/// Polls endpoint status on a fixed cycle cadence.
#[derive(Debug, Clone)]
pub struct StreamStatusMonitor {
    period: u64,
    style: ReportStyle,
    rx: ErrorAccumulator,
    tx: ErrorAccumulator,
    last: Option<StatusReport>,
}

impl StreamStatusMonitor {
    /// Create a monitor polling every `period` cycles. A period of zero
    /// disables polling.
    pub fn new(period: u64, policy: AccumulationPolicy, style: ReportStyle) -> Self {
        Self {
            period,
            style,
            rx: ErrorAccumulator::new(policy),
            tx: ErrorAccumulator::new(policy),
            last: None,
        }
    }

    /// Whether `cycle` is a polling cycle. Cycle zero always is.
    pub fn is_due(&self, cycle: u64) -> bool {
        self.period != 0 && cycle % self.period == 0
    }

    /// Poll the endpoints, update totals and log the report.
    ///
    /// The transmit endpoint is polled first.
    pub fn poll(
        &mut self,
        cycle: u64,
        at_millis: i64,
        rx: &mut dyn RxEndpoint,
        tx: Option<&mut dyn TxEndpoint>,
    ) -> Result<StatusReport> {
        let tx_status = match tx {
            Some(tx) => Some(tx.status()?),
            None => None,
        };
        let rx_status = rx.status()?;

        let report = StatusReport {
            cycle,
            at_millis,
            rx: rx_status,
            rx_totals: self.rx.observe(&rx_status),
            tx: tx_status,
            tx_totals: tx_status.map(|s| self.tx.observe(&s)),
        };

        self.log(&report);
        self.last = Some(report);
        Ok(report)
    }

    /// The most recent report.
    pub fn last_report(&self) -> Option<&StatusReport> {
        self.last.as_ref()
    }

    /// Current receive totals.
    pub fn rx_totals(&self) -> ErrorCounters {
        self.rx.totals()
    }

    /// Current transmit totals.
    pub fn tx_totals(&self) -> ErrorCounters {
        self.tx.totals()
    }

    fn log(&self, report: &StatusReport) {
        match self.style {
            ReportStyle::Full => {
                if let (Some(tx), Some(tx_totals)) = (report.tx, report.tx_totals) {
                    info!(
                        filled = tx.filled,
                        capacity = tx.capacity,
                        underrun = tx_totals.underrun,
                        overrun = tx_totals.overrun,
                        dropped = tx_totals.dropped,
                        "TX stream status"
                    );
                }
                // Raw receive snapshot, as the driver reports it
                info!(
                    filled = report.rx.filled,
                    capacity = report.rx.capacity,
                    underrun = report.rx.underrun,
                    overrun = report.rx.overrun,
                    dropped = report.rx.dropped,
                    "RX stream status"
                );
            }
            ReportStyle::ErrorsOnly => {
                if report.rx.has_errors() {
                    warn!(
                        at_ms = report.at_millis,
                        underrun = report.rx.underrun,
                        overrun = report.rx.overrun,
                        dropped = report.rx.dropped,
                        "RX stream errors"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;
    use crate::test_utils::{ScriptedRx, ScriptedTx};

    #[test]
    fn cadence_is_cycle_count_modulo_period() {
        let monitor = StreamStatusMonitor::new(4, AccumulationPolicy::default(), ReportStyle::Full);
        let due: Vec<u64> = (0..10).filter(|&c| monitor.is_due(c)).collect();
        assert_eq!(due, vec![0, 4, 8]);

        let disabled = StreamStatusMonitor::new(0, AccumulationPolicy::default(), ReportStyle::Full);
        assert!(!(0..10).any(|c| disabled.is_due(c)));
    }

    #[test]
    fn poll_reports_raw_snapshots_and_totals() {
        let mut monitor = StreamStatusMonitor::new(
            1,
            AccumulationPolicy::SumEveryPoll,
            ReportStyle::Full,
        );
        let mut rx = ScriptedRx::new().with_status(StreamStatus {
            filled: 12,
            capacity: 3480,
            overrun: 2,
            ..Default::default()
        });
        let mut tx = ScriptedTx::new(3480).with_filled(100).with_underrun(1);

        monitor.poll(0, 0, &mut rx, Some(&mut tx as &mut dyn TxEndpoint)).unwrap();
        let report = monitor.poll(1, 0, &mut rx, Some(&mut tx as &mut dyn TxEndpoint)).unwrap();

        assert_eq!(report.rx.overrun, 2);
        assert_eq!(report.rx_totals.overrun, 4);
        assert_eq!(report.tx.unwrap().filled, 100);
        assert_eq!(report.tx_totals.unwrap().underrun, 2);
        assert_eq!(monitor.last_report(), Some(&report));
    }

    #[test]
    fn receive_only_poll_skips_tx() {
        let mut monitor = StreamStatusMonitor::new(
            1024,
            AccumulationPolicy::DriverCumulative,
            ReportStyle::ErrorsOnly,
        );
        let mut rx = ScriptedRx::new();

        let report = monitor.poll(0, 42, &mut rx, None).unwrap();
        assert!(report.tx.is_none());
        assert!(report.tx_totals.is_none());
        assert_eq!(report.at_millis, 42);
    }

    #[test]
    fn status_failure_is_fatal() {
        let mut monitor = StreamStatusMonitor::new(1, AccumulationPolicy::default(), ReportStyle::Full);
        let mut rx = ScriptedRx::new().failing_status();

        let err = monitor.poll(0, 0, &mut rx, None).unwrap_err();
        assert!(matches!(err, BridgeError::Stream { .. }));
        assert!(monitor.last_report().is_none());
    }
}
