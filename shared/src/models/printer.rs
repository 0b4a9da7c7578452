//! Printer Model

use serde::{Deserialize, Serialize};

/// Receipt printer configuration (owned by the host, read-only to the relay)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrinterConfig {
    /// Printer identity (display name)
    pub name: String,
    /// Network address "host:port" (port defaults to 9100)
    pub address: String,
    /// Characters per line: 58mm paper = 32, 80mm paper = 48
    #[serde(default = "default_paper_width")]
    pub paper_width: usize,
    /// Text encoding: "utf8" | "gbk" | "latin1"
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Per-printer auto-print switch
    #[serde(default = "default_true")]
    pub auto_print_enabled: bool,
}

fn default_paper_width() -> usize {
    48
}

fn default_encoding() -> String {
    "utf8".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            paper_width: default_paper_width(),
            encoding: default_encoding(),
            auto_print_enabled: true,
        }
    }
}

/// Connection state of the printer handle held by the dispatcher
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrinterConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for PrinterConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrinterConnectionState::Disconnected => write!(f, "disconnected"),
            PrinterConnectionState::Connecting => write!(f, "connecting"),
            PrinterConnectionState::Connected => write!(f, "connected"),
            PrinterConnectionState::Error => write!(f, "error"),
        }
    }
}
