//! Server configuration.

use itemdb_sync_protocol::MAX_FRAME_LEN;
use std::net::SocketAddr;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7345;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// Password a session must present with `Open`.
    pub password: String,
    /// Largest accepted request payload.
    pub max_frame_len: usize,
    /// Capacity of the queue feeding the dispatcher.
    pub worker_queue: usize,
}

impl ServerConfig {
    /// Creates a configuration for `bind_addr` with an empty password.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            password: String::new(),
            max_frame_len: MAX_FRAME_LEN,
            worker_queue: 256,
        }
    }

    /// Sets the database password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Sets the payload limit, capped at the protocol maximum.
    #[must_use]
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len.min(MAX_FRAME_LEN);
        self
    }

    /// Sets the dispatcher queue capacity.
    #[must_use]
    pub fn with_worker_queue(mut self, capacity: usize) -> Self {
        self.worker_queue = capacity.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
    }
}
