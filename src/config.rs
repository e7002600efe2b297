//! Bridge configuration
//!
//! Everything is resolved before the loop starts: defaults, then an optional
//! YAML file, then command-line overrides. [`BridgeConfig::validate`] rejects
//! combinations the bridge cannot run with.
//!
//! ```yaml
//! mode: receive-only
//! radio:
//!   rx:
//!     frequency_hz: 1296100000
//!   sample_rate: 2000000
//! linrad:
//!   destination: 192.168.1.20
//! status:
//!   policy: delta
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::BridgeMode;
use crate::linrad::{DEFAULT_PORT, DcBias, UdpOptions};
use crate::monitor::ReportStyle;
use crate::pipeline::RxPipeline;
use crate::source::DEFAULT_FIFO_PATH;
use crate::types::AccumulationPolicy;
use crate::{BridgeError, Result};

/// Multicast group used when the duplex bridge has no explicit destination.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 0);

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub mode: BridgeMode,
    pub radio: RadioConfig,
    pub linrad: LinradConfig,
    pub transmit: TransmitConfig,
    pub receive: ReceiveConfig,
    pub status: StatusConfig,
    pub endpoints: EndpointConfig,
    pub services: ServicesConfig,
    /// Stop after this many cycles
    pub cycle_limit: Option<u64>,
}

/// Tuning for one radio channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelTuning {
    pub frequency_hz: f64,
    pub if_frequency_hz: f64,
    /// External converter LO, subtracted from the frequency before tuning
    pub lo_frequency_hz: f64,
    pub lpf_bandwidth_hz: Option<f64>,
    /// Normalized gain, 0.0 to 1.0
    pub gain: f64,
    pub channel: u32,
}

impl Default for ChannelTuning {
    fn default() -> Self {
        Self {
            frequency_hz: 0.0,
            if_frequency_hz: 0.0,
            lo_frequency_hz: 0.0,
            lpf_bandwidth_hz: None,
            gain: 1.0,
            channel: 0,
        }
    }
}

impl ChannelTuning {
    /// Frequency the radio's own LO is set to.
    pub fn radio_frequency_hz(&self) -> f64 {
        self.frequency_hz - self.lo_frequency_hz
    }
}

/// Parameters handed to the device configuration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RadioConfig {
    pub rx: ChannelTuning,
    pub tx: ChannelTuning,
    pub sample_rate: f64,
    pub calibration_bandwidth_hz: f64,
    pub device_index: u32,
    pub reference_clock_hz: Option<f64>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            rx: ChannelTuning::default(),
            tx: ChannelTuning::default(),
            sample_rate: 2e6,
            calibration_bandwidth_hz: 8e6,
            device_index: 0,
            reference_clock_hz: None,
        }
    }
}

impl RadioConfig {
    /// Passband center announced to Linrad, in MHz.
    pub fn center_mhz(&self) -> f64 {
        self.rx.frequency_hz * 1e-6
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinradConfig {
    /// Unicast or multicast IPv4 destination
    pub destination: Option<Ipv4Addr>,
    pub port: u16,
    pub multicast_ttl: u32,
    pub multicast_loop: bool,
}

impl Default for LinradConfig {
    fn default() -> Self {
        Self { destination: None, port: DEFAULT_PORT, multicast_ttl: 1, multicast_loop: true }
    }
}

impl LinradConfig {
    /// Resolve the datagram destination for `mode`.
    ///
    /// The duplex bridge falls back to [`DEFAULT_MULTICAST_GROUP`]; the
    /// receive-only bridge requires an explicit address.
    pub fn destination_for(&self, mode: BridgeMode) -> Result<SocketAddrV4> {
        let ip = match (self.destination, mode) {
            (Some(ip), _) => ip,
            (None, BridgeMode::Duplex) => DEFAULT_MULTICAST_GROUP,
            (None, BridgeMode::ReceiveOnly) => {
                return Err(BridgeError::configuration(
                    "receive-only mode requires a Linrad destination address",
                ));
            }
        };
        Ok(SocketAddrV4::new(ip, self.port))
    }

    pub fn udp_options(&self) -> UdpOptions {
        UdpOptions { multicast_ttl: self.multicast_ttl, multicast_loop: self.multicast_loop }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransmitConfig {
    /// Named pipe the transmit signal is read from
    pub fifo: PathBuf,
    pub push_timeout_ms: u64,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self { fifo: PathBuf::from(DEFAULT_FIFO_PATH), push_timeout_ms: 1000 }
    }
}

impl TransmitConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiveConfig {
    pub pull_timeout_ms: u64,
    /// Budget for assembling one packet across pulls
    pub packet_budget_ms: u64,
    /// Defaults to the mode's strategy
    pub dc_bias: Option<DcBias>,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self { pull_timeout_ms: 1000, packet_budget_ms: 1000, dc_bias: None }
    }
}

impl ReceiveConfig {
    pub fn pipeline(&self, mode: BridgeMode) -> RxPipeline {
        RxPipeline::new(
            Duration::from_millis(self.pull_timeout_ms),
            Duration::from_millis(self.packet_budget_ms),
            self.dc_bias.unwrap_or(mode.default_dc_bias()),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusConfig {
    /// Poll period in cycles; defaults to the mode's period
    pub period: Option<u64>,
    pub policy: AccumulationPolicy,
    /// Defaults to the mode's style
    pub style: Option<ReportStyle>,
}

/// Software endpoints used in place of a radio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointConfig {
    /// Capture file of interleaved little-endian i16 I/Q frames
    pub replay: Option<PathBuf>,
    pub replay_loop: bool,
    /// Transmit sink FIFO capacity in frames
    pub sink_capacity: usize,
    /// File receiving every frame the transmit sink accepts
    pub sink_record: Option<PathBuf>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self { replay: None, replay_loop: true, sink_capacity: 3480, sink_record: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServicesConfig {
    pub params: ParamServerConfig,
    pub rigctl: RigctlConfig,
}

/// Linrad network parameter server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamServerConfig {
    pub enabled: bool,
    pub listen: SocketAddr,
}

impl Default for ParamServerConfig {
    fn default() -> Self {
        Self { enabled: false, listen: SocketAddr::from(([0, 0, 0, 0], 49812)) }
    }
}

/// rigctld-compatible PTT responder and transmit watchdog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RigctlConfig {
    pub enabled: bool,
    pub listen: SocketAddr,
    /// GPIO value file keyed for PTT
    pub gpio: PathBuf,
    pub watchdog: bool,
    pub watchdog_timeout_secs: u64,
}

impl Default for RigctlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: SocketAddr::from(([0, 0, 0, 0], 4532)),
            gpio: PathBuf::from("/sys/class/gpio/gpio116/value"),
            watchdog: true,
            watchdog_timeout_secs: 15 * 60,
        }
    }
}

impl RigctlConfig {
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }
}

impl BridgeConfig {
    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::open("configuration file", path, e))?;
        Self::from_yaml(&text, path)
    }

    /// Parse YAML text; `origin` is only used in error messages.
    pub fn from_yaml(text: &str, origin: &Path) -> Result<Self> {
        serde_yaml_ng::from_str(text)
            .map_err(|e| BridgeError::ConfigFile { path: origin.to_path_buf(), source: e })
    }

    /// Passband center announced to Linrad, in MHz.
    pub fn center_mhz(&self) -> f64 {
        self.radio.center_mhz()
    }

    pub fn status_period(&self) -> u64 {
        self.status.period.unwrap_or(self.mode.default_status_period())
    }

    pub fn report_style(&self) -> ReportStyle {
        self.status.style.unwrap_or(self.mode.default_report_style())
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        let radio = &self.radio;
        if !(radio.rx.frequency_hz.is_finite() && radio.rx.frequency_hz > 0.0) {
            return Err(BridgeError::configuration("invalid RX frequency"));
        }
        if self.mode == BridgeMode::Duplex
            && !(radio.tx.frequency_hz.is_finite() && radio.tx.frequency_hz > 0.0)
        {
            return Err(BridgeError::configuration("invalid TX frequency"));
        }
        if !(radio.sample_rate.is_finite() && radio.sample_rate > 0.0) {
            return Err(BridgeError::configuration(format!(
                "sample rate must be positive, got {}",
                radio.sample_rate
            )));
        }
        for (name, gain) in [("RX", radio.rx.gain), ("TX", radio.tx.gain)] {
            if !(0.0..=1.0).contains(&gain) {
                return Err(BridgeError::configuration(format!(
                    "{} gain {} is outside 0.0..=1.0",
                    name, gain
                )));
            }
        }

        self.linrad.destination_for(self.mode)?;

        if self.receive.pull_timeout_ms == 0 || self.receive.packet_budget_ms == 0 {
            return Err(BridgeError::configuration("receive timeouts must be non-zero"));
        }
        if self.endpoints.sink_capacity == 0 {
            return Err(BridgeError::configuration("transmit sink capacity must be non-zero"));
        }
        if self.services.rigctl.watchdog && self.services.rigctl.watchdog_timeout_secs == 0 {
            return Err(BridgeError::configuration("watchdog timeout must be non-zero"));
        }
        Ok(())
    }
}
