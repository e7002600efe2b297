//! Linrad network parameter server
//!
//! Before accepting the UDP stream, Linrad's network input asks a TCP server for
//! the stream parameters. A `0xB8` request is answered with eight little-endian
//! `i32` words; `0xB5` and `0xB6` are acknowledged with a single zero byte;
//! anything else is ignored.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{BridgeError, Result};

/// Port Linrad queries by default.
pub const DEFAULT_PARAM_PORT: u16 = 49812;

/// Request for the parameter block.
pub const REQUEST_PARAMETERS: u8 = 0xB8;
/// Requests acknowledged with a single zero byte.
pub const REQUEST_ACKNOWLEDGED: [u8; 2] = [0xB5, 0xB6];

/// Linrad input mode flag for complex I/Q samples.
pub const INPUT_MODE_IQ_DATA: i32 = 4;

const RECV_BUFFER: usize = 1024;

/// Stream parameters reported to Linrad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinradParams {
    pub sample_rate: i32,
    pub ad_channels: i32,
    pub rf_channels: i32,
    pub input_mode: i32,
    pub bufsize: i32,
}

impl LinradParams {
    /// Parameters for a single-channel I/Q stream at `sample_rate` Hz.
    pub fn iq(sample_rate: f64) -> Self {
        Self {
            sample_rate: sample_rate as i32,
            ad_channels: 2,
            rf_channels: 1,
            input_mode: INPUT_MODE_IQ_DATA,
            bufsize: 4096,
        }
    }

    /// The 32-byte reply to a parameter request.
    pub fn encode(&self) -> [u8; 32] {
        let words = [
            self.sample_rate,
            self.ad_channels,
            self.rf_channels,
            self.input_mode,
            self.bufsize,
            0,
            0,
            0,
        ];
        let mut out = [0u8; 32];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Reply to one received chunk, keyed on its first byte.
    pub fn reply(&self, request: &[u8]) -> Option<Vec<u8>> {
        match request.first() {
            Some(&REQUEST_PARAMETERS) => Some(self.encode().to_vec()),
            Some(byte) if REQUEST_ACKNOWLEDGED.contains(byte) => Some(vec![0]),
            _ => None,
        }
    }
}

/// TCP server answering Linrad parameter queries.
pub struct ParamServer {
    listener: TcpListener,
    params: LinradParams,
}

impl ParamServer {
    pub async fn bind(addr: SocketAddr, params: LinradParams) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::service(format!("bind parameter server on {}", addr), e))?;
        Ok(Self { listener, params })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| BridgeError::service("parameter server address", e))
    }

    /// Accept connections until cancelled. Each client is served on its own task.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), params = ?self.params, "Parameter server listening");
        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Parameter server cancelled");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    accepted.map_err(|e| BridgeError::service("accept parameter client", e))?
                }
            };

            debug!(%peer, "Parameter client connected");
            let params = self.params;
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = serve_client(stream, params) => {
                        if let Err(e) = result {
                            warn!(%peer, error = %e, "Parameter client failed");
                        }
                    }
                }
            });
        }
    }
}

async fn serve_client(mut stream: TcpStream, params: LinradParams) -> std::io::Result<()> {
    let mut buf = [0u8; RECV_BUFFER];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if let Some(reply) = params.reply(&buf[..n]) {
            stream.write_all(&reply).await?;
        }
    }
}
