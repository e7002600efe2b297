//! rigctld-compatible PTT responder
//!
//! Answers the handful of hamlib `rigctld` commands a transmit chain issues
//! (`\dump_state`, `v`, `t`, `f`, `m`, `T n`) with fixed values, except for PTT,
//! which drives a real [`PttLine`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ptt::PttLine;
use crate::{BridgeError, Result};

/// Port `rigctld` listens on by default.
pub const DEFAULT_RIGCTL_PORT: u16 = 4532;

/// Capability block returned for `\dump_state`.
pub const DUMP_STATE: &str = "0
1
2
150000.000000 1500000000.000000 0x1ff -1 -1 0x10000003 0x3
0 0 0 0 0 0 0
0 0 0 0 0 0 0
0x1ff 1
0x1ff 0
0 0
0x1e 2400
0x2 500
0x1 8000
0x1 2400
0x20 15000
0x20 8000
0x40 230000
0 0
9990
9990
10000
0
10
10 20 30
0xffffffff
0xffffffff
0xf7ffffff
0x83ffffff
0xffffffff
0xffffffbf
";

const REPORT_OK: &str = "RPRT 0\n";
const REPORT_INVALID: &str = "RPRT -1\n";

/// Reply to one command line (without its terminator).
pub fn respond(command: &str, ptt: &dyn PttLine) -> String {
    match command {
        "\\dump_state" => DUMP_STATE.to_string(),
        "v" => "VFOA\n".to_string(),
        "t" => match ptt.is_keyed() {
            Ok(keyed) => format!("{}\n", u8::from(keyed)),
            Err(e) => {
                error!(error = %e, "Reading PTT failed");
                REPORT_INVALID.to_string()
            }
        },
        "f" => "145000000\n".to_string(),
        "m" => "USB\n15000\n".to_string(),
        _ => match command.strip_prefix("T ") {
            Some(arg) => set_ptt(arg.trim(), ptt),
            None => "\n".to_string(),
        },
    }
}

fn set_ptt(arg: &str, ptt: &dyn PttLine) -> String {
    let Ok(value) = arg.parse::<i64>() else {
        warn!(arg, "Malformed PTT command");
        return REPORT_INVALID.to_string();
    };
    match ptt.set(value != 0) {
        Ok(()) => REPORT_OK.to_string(),
        Err(e) => {
            error!(error = %e, "Setting PTT failed");
            REPORT_INVALID.to_string()
        }
    }
}

/// TCP server speaking the `rigctld` subset.
pub struct RigctlServer {
    listener: TcpListener,
    ptt: Arc<dyn PttLine>,
}

impl RigctlServer {
    /// Bind the listener and force the PTT line off.
    pub async fn bind(addr: SocketAddr, ptt: Arc<dyn PttLine>) -> Result<Self> {
        ptt.set(false)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::service(format!("bind rigctl server on {}", addr), e))?;
        Ok(Self { listener, ptt })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(|e| BridgeError::service("rigctl server address", e))
    }

    /// Accept connections until cancelled.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "rigctl server listening");
        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("rigctl server cancelled");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    accepted.map_err(|e| BridgeError::service("accept rigctl client", e))?
                }
            };

            info!(%peer, "rigctl client connected");
            let ptt = Arc::clone(&self.ptt);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = serve_client(stream, ptt) => {
                        if let Err(e) = result {
                            warn!(%peer, error = %e, "rigctl client failed");
                        }
                    }
                }
            });
        }
    }
}

async fn serve_client(stream: TcpStream, ptt: Arc<dyn PttLine>) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        if lines.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end_matches(['\r', '\n']);
        let reply = respond(command, ptt.as_ref());
        writer.write_all(reply.as_bytes()).await?;
    }
}
