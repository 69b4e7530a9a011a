//! Engine configuration.
//!
//! # Design
//! The wire target is fixed at plain HTTP on port 80; `port` exists so a
//! host (or a test harness) can point the engine at a local server without
//! changing any other behavior. Every field has a serde default so the
//! struct can be embedded in a larger configuration file.

use serde::{Deserialize, Serialize};

/// Port used for every request unless overridden.
pub const DEFAULT_PORT: u16 = 80;

/// Size of the stack buffer used for a single receive call.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1024;

/// Largest receive buffer the engine will allocate.
pub const MAX_RECV_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

impl HttpConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.clamp(1, MAX_RECV_BUFFER_SIZE);
        self
    }

    /// `recv_buffer_size` within `1..=MAX_RECV_BUFFER_SIZE`. Deserialized
    /// configs skip `with_recv_buffer_size`, so the engine applies this.
    pub fn clamped_recv_buffer_size(&self) -> usize {
        self.recv_buffer_size.clamp(1, MAX_RECV_BUFFER_SIZE)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_recv_buffer_size() -> usize {
    DEFAULT_RECV_BUFFER_SIZE
}
