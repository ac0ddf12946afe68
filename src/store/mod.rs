//! Store Transport Traits and Core Types
//!
//! This module defines the abstractions the lookup core needs from a keyed
//! data store: open a connection, select a database, read a key, and quit.
//!
//! # Transports
//! - [`redis::RespConnector`] speaks RESP2 over TCP or TLS to a Redis-compatible server
//! - [`memory::MemoryConnector`] keeps keys in process memory (tests, dry runs)
//!
//! The lookup core is generic over [`StoreConnector`] and never depends on a
//! concrete transport.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::Result;

pub mod memory;
pub mod redis;
pub mod resp;

/// Default port of a Redis-compatible server
pub const DEFAULT_PORT: u16 = 6379;

/// Connection configuration for the store
///
/// Two configurations are equal when every field is equal, password included.
/// The connection manager relies on this to decide whether to reconnect.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Hostname or IP address of the store
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Wrap the TCP stream in TLS
    #[serde(default)]
    pub use_tls: bool,

    /// Logical database index passed to `SELECT`
    #[serde(default)]
    pub database: u32,

    /// Password for `AUTH` as the default user
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectionConfig {
    /// Create a plaintext, unauthenticated config for database 0
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, use_tls: false, database: 0, password: None }
    }

    /// Select a different logical database
    #[must_use]
    pub const fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    /// Authenticate with a password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enable or disable TLS
    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// `host:port` address string
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("database", &self.database)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An open channel to the store
///
/// Methods take `&self` so a single connection can be shared by every
/// concurrent lookup of a batch. Implementations serialize request/reply
/// pairs internally.
pub trait StoreConnection: Send + Sync + 'static {
    /// Switch the connection to a logical database
    fn select(&self, database: u32) -> impl Future<Output = Result<()>> + Send;

    /// Read a key. `Ok(None)` is a miss, not an error.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Close the connection gracefully
    fn quit(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the connection is still usable
    fn is_open(&self) -> bool;
}

/// Factory for store connections
pub trait StoreConnector: Send + Sync {
    /// Connection type produced by this connector
    type Connection: StoreConnection;

    /// Open a new connection
    ///
    /// Implementations authenticate with `config.password` when set and may
    /// select `config.database` as part of the handshake. Callers still issue
    /// an explicit [`StoreConnection::select`] afterwards.
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}
