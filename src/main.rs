use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use linrad_bridge::control::ControlServices;
use linrad_bridge::{AccumulationPolicy, BridgeConfig, BridgeMode, LinradBridge, ReportStyle};

#[derive(Parser, Debug)]
#[command(version, about = "Stream an SDR receive path to Linrad over UDP and transmit from a FIFO")]
struct Args {
    /// YAML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// RX frequency in Hz
    #[arg(long = "rx-freq")]
    rx_freq: Option<f64>,

    /// RX IF frequency in Hz (default: 0)
    #[arg(long = "rx-if")]
    rx_if: Option<f64>,

    /// RX external converter LO in Hz (default: 0)
    #[arg(long = "rx-lo")]
    rx_lo: Option<f64>,

    /// RX low-pass filter bandwidth in Hz (default: none)
    #[arg(long = "rx-lpf")]
    rx_lpf: Option<f64>,

    /// TX frequency in Hz
    #[arg(long = "tx-freq")]
    tx_freq: Option<f64>,

    #[arg(long = "tx-if")]
    tx_if: Option<f64>,

    #[arg(long = "tx-lo")]
    tx_lo: Option<f64>,

    #[arg(long = "tx-lpf")]
    tx_lpf: Option<f64>,

    /// Calibration bandwidth in Hz (default: 8e6)
    #[arg(long = "calibration-bw")]
    calibration_bw: Option<f64>,

    /// Sample rate in Hz (default: 2e6)
    #[arg(long = "sample-rate")]
    sample_rate: Option<f64>,

    /// Normalized RX gain, 0 to 1 (default: 1)
    #[arg(long = "rx-gain")]
    rx_gain: Option<f64>,

    /// Normalized TX gain, 0 to 1 (default: 1)
    #[arg(long = "tx-gain")]
    tx_gain: Option<f64>,

    #[arg(long)]
    device: Option<u32>,

    #[arg(long = "rx-channel")]
    rx_channel: Option<u32>,

    #[arg(long = "tx-channel")]
    tx_channel: Option<u32>,

    /// Reference clock in Hz
    #[arg(long = "reference-clock")]
    reference_clock: Option<f64>,

    /// Linrad destination address (required in receive-only mode)
    #[arg(long)]
    ip: Option<Ipv4Addr>,

    /// Linrad UDP port (default: 50100)
    #[arg(long)]
    port: Option<u16>,

    /// Transmit FIFO path (default: /tmp/txfifo)
    #[arg(long)]
    fifo: Option<PathBuf>,

    /// Capture file replayed as the receive stream
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Write every transmitted frame to this file
    #[arg(long)]
    record: Option<PathBuf>,

    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Log only receive errors instead of full status
    #[arg(long)]
    errors_only: bool,

    /// Serve Linrad network parameters on TCP 49812
    #[arg(long)]
    params: bool,

    /// Serve rigctld PTT on TCP 4532
    #[arg(long)]
    rigctl: bool,

    /// GPIO value file used for PTT
    #[arg(long)]
    gpio: Option<PathBuf>,

    /// Stop after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Duplex,
    ReceiveOnly,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    SumEveryPoll,
    DriverCumulative,
    Delta,
}

impl Args {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(mode) = self.mode {
            config.mode = match mode {
                ModeArg::Duplex => BridgeMode::Duplex,
                ModeArg::ReceiveOnly => BridgeMode::ReceiveOnly,
            };
        }

        let radio = &mut config.radio;
        set(&mut radio.rx.frequency_hz, self.rx_freq);
        set(&mut radio.rx.if_frequency_hz, self.rx_if);
        set(&mut radio.rx.lo_frequency_hz, self.rx_lo);
        set(&mut radio.rx.gain, self.rx_gain);
        set(&mut radio.rx.channel, self.rx_channel);
        set(&mut radio.tx.frequency_hz, self.tx_freq);
        set(&mut radio.tx.if_frequency_hz, self.tx_if);
        set(&mut radio.tx.lo_frequency_hz, self.tx_lo);
        set(&mut radio.tx.gain, self.tx_gain);
        set(&mut radio.tx.channel, self.tx_channel);
        set(&mut radio.calibration_bandwidth_hz, self.calibration_bw);
        set(&mut radio.sample_rate, self.sample_rate);
        set(&mut radio.device_index, self.device);
        if self.rx_lpf.is_some() {
            radio.rx.lpf_bandwidth_hz = self.rx_lpf;
        }
        if self.tx_lpf.is_some() {
            radio.tx.lpf_bandwidth_hz = self.tx_lpf;
        }
        if self.reference_clock.is_some() {
            radio.reference_clock_hz = self.reference_clock;
        }

        if self.ip.is_some() {
            config.linrad.destination = self.ip;
        }
        set(&mut config.linrad.port, self.port);
        set(&mut config.transmit.fifo, self.fifo.clone());
        if self.replay.is_some() {
            config.endpoints.replay = self.replay.clone();
        }
        if self.record.is_some() {
            config.endpoints.sink_record = self.record.clone();
        }

        if let Some(policy) = self.policy {
            config.status.policy = match policy {
                PolicyArg::SumEveryPoll => AccumulationPolicy::SumEveryPoll,
                PolicyArg::DriverCumulative => AccumulationPolicy::DriverCumulative,
                PolicyArg::Delta => AccumulationPolicy::Delta,
            };
        }
        if self.errors_only {
            config.status.style = Some(ReportStyle::ErrorsOnly);
        }

        config.services.params.enabled |= self.params;
        config.services.rigctl.enabled |= self.rigctl;
        set(&mut config.services.rigctl.gpio, self.gpio.clone());
        if self.cycles.is_some() {
            config.cycle_limit = self.cycles;
        }
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::try_new(default_level).unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Wait for the bridge thread, cancelling it when `shutdown` resolves.
///
/// The token is cancelled whether the shutdown signal fired or failed, so the
/// blocking thread always winds down before this returns.
async fn supervise<T, F>(
    mut bridge_task: JoinHandle<T>,
    shutdown: F,
    cancel: &CancellationToken,
) -> anyhow::Result<T>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        joined = &mut bridge_task => joined.context("bridge loop panicked"),
        signal = shutdown => {
            cancel.cancel();
            match signal {
                Ok(()) => info!("Ctrl-C received, stopping bridge"),
                Err(e) => error!(error = %e, "Ctrl-C handler failed, stopping bridge"),
            }
            bridge_task.await.context("bridge loop panicked")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    args.apply(&mut config);

    let cancel = CancellationToken::new();
    let bridge = match LinradBridge::from_config(&config, cancel.clone()) {
        Ok(bridge) => bridge,
        Err(e) => {
            for suggestion in e.recovery_suggestions() {
                warn!("  - {}", suggestion);
            }
            return Err(e).context("starting bridge");
        }
    };

    let services = ControlServices::start(&config.services, config.radio.sample_rate, cancel.clone())
        .await
        .context("starting control services")?;
    if !services.is_empty() {
        info!(count = services.len(), "Control services running");
    }

    let bridge_task = tokio::task::spawn_blocking(move || bridge.run());
    let summary = supervise(bridge_task, tokio::signal::ctrl_c(), &cancel).await?;

    cancel.cancel();
    services.join().await;

    info!(
        cycles = summary.cycles,
        packets = summary.packets_sent,
        frames_fed = summary.frames_fed,
        rx_totals = ?summary.rx_totals,
        tx_totals = ?summary.tx_totals,
        "Bridge stopped"
    );

    if let Some(e) = summary.error() {
        for suggestion in e.recovery_suggestions() {
            error!("  - {}", suggestion);
        }
        anyhow::bail!("bridge loop failed: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_for_cancel(cancel: &CancellationToken) -> JoinHandle<u64> {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut spins = 0;
            while !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
                spins += 1;
            }
            spins
        })
    }

    #[tokio::test]
    async fn failed_signal_handler_still_stops_the_bridge() {
        let cancel = CancellationToken::new();
        let task = wait_for_cancel(&cancel);
        let shutdown = async { Err(std::io::Error::other("signal handler unavailable")) };

        let result = tokio::time::timeout(Duration::from_secs(5), supervise(task, shutdown, &cancel))
            .await
            .expect("bridge thread was left running");
        assert!(result.is_ok());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn finished_bridge_returns_without_cancelling() {
        let cancel = CancellationToken::new();
        let task = tokio::task::spawn_blocking(|| 42u64);

        let value = supervise(task, std::future::pending(), &cancel).await.unwrap();
        assert_eq!(value, 42);
        assert!(!cancel.is_cancelled());
    }
}
