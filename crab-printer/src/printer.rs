//! Network printer connection (raw TCP, port 9100)
//!
//! Unlike a fire-and-forget socket per job, `NetworkPrinter` keeps one
//! connection open between jobs so the caller can ask for its status,
//! connect ahead of time and send with separate deadlines.

use crate::error::{PrintError, PrintResult};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Raw printing port
const DEFAULT_PORT: u16 = 9100;

/// Bare IP, IPv6 optionally in brackets
fn parse_ip(host: &str) -> Option<IpAddr> {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.parse().ok()
}

/// Connection status of a printer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No open socket
    Disconnected,
    /// Socket open and not closed by the peer
    Connected,
}

/// Network printer (TCP port 9100)
///
/// Most thermal printers support raw TCP printing on port 9100.
#[derive(Debug)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    stream: Mutex<Option<TcpStream>>,
}

impl NetworkPrinter {
    /// Create a new network printer
    pub fn new(host: &str, port: u16) -> PrintResult<Self> {
        let ip = parse_ip(host)
            .ok_or_else(|| PrintError::InvalidConfig(format!("Invalid address: {}", host)))?;
        Ok(Self::with_socket_addr(SocketAddr::new(ip, port)))
    }

    /// Create from a socket address string (e.g., "192.168.1.100:9100",
    /// "[fe80::1]:9100")
    ///
    /// The port defaults to 9100 when omitted, including for bare IPv6.
    pub fn from_addr(addr: &str) -> PrintResult<Self> {
        let addr = addr.trim();
        if let Some(ip) = parse_ip(addr) {
            return Ok(Self::with_socket_addr(SocketAddr::new(ip, DEFAULT_PORT)));
        }
        let parsed: SocketAddr = addr
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr)))?;
        Ok(Self::with_socket_addr(parsed))
    }

    fn with_socket_addr(addr: SocketAddr) -> Self {
        Self {
            addr,
            stream: Mutex::new(None),
        }
    }

    /// Get the printer address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current connection status
    ///
    /// A socket the printer has closed is dropped and reported as disconnected.
    pub async fn status(&self) -> ConnectionStatus {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_ref() else {
            return ConnectionStatus::Disconnected;
        };

        let mut probe = [0u8; 16];
        match stream.try_read(&mut probe) {
            // Peer closed the connection
            Ok(0) => {
                debug!(addr = %self.addr, "Printer closed the connection");
                *guard = None;
                ConnectionStatus::Disconnected
            }
            // Status bytes from the printer, still alive
            Ok(_) => ConnectionStatus::Connected,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => ConnectionStatus::Connected,
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "Printer socket error");
                *guard = None;
                ConnectionStatus::Disconnected
            }
        }
    }

    /// Open the connection if it is not already open
    #[instrument(skip(self), fields(addr = %self.addr))]
    pub async fn connect(&self, timeout: Duration) -> PrintResult<()> {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        info!("Connecting to printer");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.addr, e)))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        *guard = Some(stream);
        info!("Printer connected");
        Ok(())
    }

    /// Send raw ESC/POS data over the open connection
    ///
    /// Any failure closes the connection so the next job reconnects.
    #[instrument(skip(self, data), fields(addr = %self.addr, data_len = data.len()))]
    pub async fn send(&self, data: &[u8], timeout: Duration) -> PrintResult<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| PrintError::Offline(format!("Not connected: {}", self.addr)))?;

        let write = async {
            stream.write_all(data).await?;
            stream.flush().await
        };

        let result = tokio::time::timeout(timeout, write).await;
        match result {
            Ok(Ok(())) => {
                info!("Print job sent successfully");
                Ok(())
            }
            Ok(Err(e)) => {
                *guard = None;
                Err(PrintError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Write failed: {}", e),
                )))
            }
            Err(_) => {
                *guard = None;
                Err(PrintError::Timeout(format!("Send timeout: {}", self.addr)))
            }
        }
    }

    /// Close the connection
    pub async fn disconnect(&self) {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            let _ = stream.shutdown().await;
            debug!(addr = %self.addr, "Printer disconnected");
        }
    }
}
