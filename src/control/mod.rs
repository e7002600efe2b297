//! Auxiliary control services
//!
//! These run on the async runtime next to the bridge loop and never touch it:
//! the Linrad parameter server, the rigctld PTT responder and the transmit
//! watchdog. A service failure is logged and ends that service only.

mod params;
mod ptt;
mod rigctl;

pub use params::{
    DEFAULT_PARAM_PORT, INPUT_MODE_IQ_DATA, LinradParams, ParamServer, REQUEST_ACKNOWLEDGED,
    REQUEST_PARAMETERS,
};
pub use ptt::{DEFAULT_WATCHDOG_TIMEOUT, MemoryPtt, PttLine, SysfsGpio, WATCHDOG_POLL, Watchdog};
pub use rigctl::{DEFAULT_RIGCTL_PORT, DUMP_STATE, RigctlServer, respond};

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::Result;
use crate::config::ServicesConfig;

/// Handles to the running control services.
pub struct ControlServices {
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl ControlServices {
    /// Bind and spawn every enabled service.
    ///
    /// `sample_rate` is reported to Linrad. The PTT line is only touched when
    /// the rigctl service is enabled.
    pub async fn start(
        config: &ServicesConfig,
        sample_rate: f64,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let mut tasks = Vec::new();

        if config.params.enabled {
            let server = ParamServer::bind(config.params.listen, LinradParams::iq(sample_rate)).await?;
            tasks.push(("parameter server", spawn_logged("parameter server", server.run(cancel.clone()))));
        }

        if config.rigctl.enabled {
            let line: Arc<dyn PttLine> = Arc::new(SysfsGpio::new(&config.rigctl.gpio));
            let server = RigctlServer::bind(config.rigctl.listen, Arc::clone(&line)).await?;
            tasks.push(("rigctl server", spawn_logged("rigctl server", server.run(cancel.clone()))));

            if config.rigctl.watchdog {
                let watchdog = Watchdog::new(line, config.rigctl.watchdog_timeout());
                tasks.push(("watchdog", spawn_logged("watchdog", watchdog.run(cancel.clone()))));
            }
        }

        Ok(Self { tasks })
    }

    /// Number of running services.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every service to finish; call after cancelling their token.
    pub async fn join(self) {
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!(service = name, error = %e, "Control service panicked");
            }
        }
    }
}

fn spawn_logged<F>(name: &'static str, service: F) -> JoinHandle<Result<()>>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = service.await;
        if let Err(e) = &result {
            error!(service = name, error = %e, "Control service stopped");
        }
        result
    })
}
