//! Printer link - connect / status / send against a physical printer

use async_trait::async_trait;
use crab_printer::{ConnectionStatus, NetworkPrinter, PrintError, PrintResult};
use shared::{PrinterConfig, PrinterConnectionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Capability to talk to a receipt printer
///
/// Only the [`PrintDispatcher`](super::PrintDispatcher) calls into a link,
/// one order at a time.
#[async_trait]
pub trait PrinterLink: Send + Sync {
    async fn status(&self, config: &PrinterConfig) -> PrinterConnectionState;

    async fn connect(&self, config: &PrinterConfig, timeout: Duration) -> PrintResult<()>;

    async fn send(&self, payload: &[u8], config: &PrinterConfig, timeout: Duration)
    -> PrintResult<()>;
}

/// [`PrinterLink`] over a persistent raw TCP connection
///
/// The underlying [`NetworkPrinter`] is rebuilt when the configured address
/// changes.
#[derive(Default)]
pub struct NetworkPrinterLink {
    current: Mutex<Option<(String, Arc<NetworkPrinter>)>>,
}

impl NetworkPrinterLink {
    pub fn new() -> Self {
        Self::default()
    }

    async fn printer_for(&self, config: &PrinterConfig) -> PrintResult<Arc<NetworkPrinter>> {
        let mut current = self.current.lock().await;

        if let Some((address, printer)) = current.as_ref()
            && *address == config.address
        {
            return Ok(printer.clone());
        }

        if let Some((old, printer)) = current.take() {
            tracing::info!(from = %old, to = %config.address, "Printer address changed");
            printer.disconnect().await;
        }

        let printer = Arc::new(NetworkPrinter::from_addr(&config.address)?);
        *current = Some((config.address.clone(), printer.clone()));
        Ok(printer)
    }
}

#[async_trait]
impl PrinterLink for NetworkPrinterLink {
    async fn status(&self, config: &PrinterConfig) -> PrinterConnectionState {
        match self.printer_for(config).await {
            Ok(printer) => match printer.status().await {
                ConnectionStatus::Connected => PrinterConnectionState::Connected,
                ConnectionStatus::Disconnected => PrinterConnectionState::Disconnected,
            },
            Err(e) => {
                tracing::warn!(printer = %config.name, error = %e, "Invalid printer config");
                PrinterConnectionState::Error
            }
        }
    }

    async fn connect(&self, config: &PrinterConfig, timeout: Duration) -> PrintResult<()> {
        let printer = self.printer_for(config).await?;
        printer.connect(timeout).await
    }

    async fn send(
        &self,
        payload: &[u8],
        config: &PrinterConfig,
        timeout: Duration,
    ) -> PrintResult<()> {
        let printer = self.printer_for(config).await?;
        if printer.status().await != ConnectionStatus::Connected {
            return Err(PrintError::Offline(config.address.clone()));
        }
        printer.send(payload, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn config(address: String) -> PrinterConfig {
        PrinterConfig {
            name: "receipt".into(),
            address,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = config(listener.local_addr().unwrap().to_string());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let link = NetworkPrinterLink::new();
        assert_eq!(
            link.status(&config).await,
            PrinterConnectionState::Disconnected
        );
        link.connect(&config, Duration::from_secs(2)).await.unwrap();
        assert_eq!(link.status(&config).await, PrinterConnectionState::Connected);
        link.send(b"hello", &config, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_send_without_connection_is_offline() {
        let link = NetworkPrinterLink::new();
        let config = config("127.0.0.1:9".into());
        let err = link
            .send(b"x", &config, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PrintError::Offline(_)));
    }

    #[tokio::test]
    async fn test_invalid_address_reports_error_state() {
        let link = NetworkPrinterLink::new();
        let config = config("not an address".into());
        assert_eq!(link.status(&config).await, PrinterConnectionState::Error);
    }
}
