//! UDP transport for Linrad datagrams

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use tracing::{debug, info};

use crate::{BridgeError, Result};

/// Destination for finished Linrad datagrams.
///
/// Sends are fire-and-forget: there is no acknowledgment or retransmission.
pub trait DatagramSink: Send {
    /// Send one complete datagram.
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<()>;
}

/// Socket options for [`UdpTransport`].
#[derive(Debug, Clone, Copy)]
pub struct UdpOptions {
    /// Multicast time-to-live
    pub multicast_ttl: u32,
    /// Deliver multicast datagrams to listeners on this host
    pub multicast_loop: bool,
}

impl Default for UdpOptions {
    fn default() -> Self {
        Self { multicast_ttl: 1, multicast_loop: true }
    }
}

/// Connectionless UDP sender to a fixed unicast or multicast destination.
pub struct UdpTransport {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpTransport {
    /// Open an unbound-port socket targeting `destination`.
    pub fn open(destination: SocketAddrV4, options: UdpOptions) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|e| BridgeError::Transport { context: "bind".to_string(), source: e })?;

        if destination.ip().is_multicast() {
            socket.set_multicast_ttl_v4(options.multicast_ttl).map_err(|e| {
                BridgeError::Transport { context: "set multicast TTL".to_string(), source: e }
            })?;
            socket.set_multicast_loop_v4(options.multicast_loop).map_err(|e| {
                BridgeError::Transport { context: "set multicast loop".to_string(), source: e }
            })?;
            debug!(ttl = options.multicast_ttl, "Configured multicast destination");
        }

        info!(%destination, "Linrad UDP transport ready");
        Ok(Self { socket, destination: SocketAddr::V4(destination) })
    }

    /// The configured destination.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl DatagramSink for UdpTransport {
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<()> {
        let sent = self
            .socket
            .send_to(datagram, self.destination)
            .map_err(|e| BridgeError::Send { destination: self.destination, source: e })?;
        if sent != datagram.len() {
            return Err(BridgeError::ShortSend {
                destination: self.destination,
                sent,
                expected: datagram.len(),
            });
        }
        Ok(())
    }
}
