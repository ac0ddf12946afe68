//! Connection Lifecycle
//!
//! [`ConnectionManager`] owns the single live store connection together with
//! the configuration it was opened with. A connection is reused for as long as
//! the incoming configuration is structurally equal to the applied one; any
//! difference (password included) tears the old connection down before a new
//! one is opened, so at most one connection is ever live.
//!
//! `ensure_ready` takes `&mut self`. A manager is driven by one batch at a
//! time and carries no internal lock.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{LookupError, Result};
use crate::store::{ConnectionConfig, StoreConnection, StoreConnector};

/// Lifecycle state of the managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Open,
    Closing,
}

/// Owner of the single live store connection
pub struct ConnectionManager<C: StoreConnector> {
    connector: C,
    state: ConnectionState,
    applied: Option<ConnectionConfig>,
    connection: Option<Arc<C::Connection>>,
}

impl<C: StoreConnector> ConnectionManager<C> {
    /// Create an unconnected manager; nothing is opened until `ensure_ready`
    pub const fn new(connector: C) -> Self {
        Self { connector, state: ConnectionState::Unconnected, applied: None, connection: None }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Configuration of the currently open connection
    #[must_use]
    pub const fn applied_config(&self) -> Option<&ConnectionConfig> {
        self.applied.as_ref()
    }

    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Return a connection opened with `config`, reconnecting if needed
    ///
    /// When `config` equals the applied configuration and the connection is
    /// still open, the existing connection is returned without any I/O.
    /// Otherwise the current connection is closed (close failures are logged
    /// and ignored), a new one is opened and the database is selected
    /// explicitly.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if connecting, authenticating or selecting
    /// fails. The manager is left unconnected in that case.
    pub async fn ensure_ready(&mut self, config: &ConnectionConfig) -> Result<Arc<C::Connection>> {
        if let (Some(applied), Some(connection)) = (&self.applied, &self.connection) {
            if applied == config && connection.is_open() {
                return Ok(Arc::clone(connection));
            }
        }

        debug!(
            client_options = ?config,
            is_open = self.connection.as_ref().is_some_and(|c| c.is_open()),
            "Client options changed or no client yet"
        );

        self.close().await;

        self.state = ConnectionState::Connecting;
        match self.open(config).await {
            Ok(connection) => {
                let connection = Arc::new(connection);
                self.connection = Some(Arc::clone(&connection));
                self.applied = Some(config.clone());
                self.state = ConnectionState::Open;
                info!(address = %config.address(), database = config.database, "Store connection ready");
                Ok(connection)
            }
            Err(e) => {
                error!(error = %e, address = %config.address(), "Failed to initialize store connection");
                self.state = ConnectionState::Unconnected;
                Err(e)
            }
        }
    }

    /// Connect and select; on select failure the half-open connection is dropped.
    async fn open(&self, config: &ConnectionConfig) -> Result<C::Connection> {
        let connection = self.connector.connect(config).await.map_err(into_connection_error)?;

        // Selected explicitly even when the connect handshake already did.
        if let Err(e) = connection.select(config.database).await {
            if let Err(quit_err) = connection.quit().await {
                debug!(error = %quit_err, "Ignoring close failure of half-open connection");
            }
            return Err(into_connection_error(e));
        }

        Ok(connection)
    }

    /// Close the live connection, if any, and forget the applied config
    pub async fn close(&mut self) {
        self.applied = None;
        let Some(connection) = self.connection.take() else {
            self.state = ConnectionState::Unconnected;
            return;
        };

        if connection.is_open() {
            self.state = ConnectionState::Closing;
            info!("Disconnecting existing store connection");
            match connection.quit().await {
                Ok(()) => info!("Finished disconnecting"),
                Err(e) => warn!(error = %e, "Failed to close store connection, continuing"),
            }
        }
        self.state = ConnectionState::Unconnected;
    }
}

fn into_connection_error(err: LookupError) -> LookupError {
    match err {
        LookupError::ConnectionFailed(_) => err,
        other => LookupError::connection_failed(other.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryConnector;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("memory", 6379)
    }

    #[tokio::test]
    async fn test_starts_unconnected() {
        let manager = ConnectionManager::new(MemoryConnector::new());
        assert_eq!(manager.state(), ConnectionState::Unconnected);
        assert!(manager.applied_config().is_none());
        assert_eq!(manager.connector().stats().connects, 0);
    }

    #[tokio::test]
    async fn test_same_config_reuses_connection() {
        let mut manager = ConnectionManager::new(MemoryConnector::new());

        let first = manager.ensure_ready(&config()).await.unwrap();
        let second = manager.ensure_ready(&config()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = manager.connector().stats();
        assert_eq!(stats.connects, 1);
        assert_eq!(stats.selects, 1);
        assert_eq!(stats.quits, 0);
        assert_eq!(manager.state(), ConnectionState::Open);
        assert_eq!(manager.applied_config(), Some(&config()));
    }

    #[tokio::test]
    async fn test_password_change_reconnects() {
        let mut manager = ConnectionManager::new(MemoryConnector::new());

        let first = manager.ensure_ready(&config()).await.unwrap();
        let second = manager.ensure_ready(&config().with_password("changed")).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!first.is_open());
        let stats = manager.connector().stats();
        assert_eq!(stats.connects, 2);
        assert_eq!(stats.quits, 1);
        assert_eq!(stats.max_live, 1);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_block_reconnect() {
        let connector = MemoryConnector::new();
        let mut manager = ConnectionManager::new(connector.clone());

        manager.ensure_ready(&config()).await.unwrap();
        connector.set_fail_quit(true);
        let result = manager.ensure_ready(&config().with_database(1)).await;

        assert!(result.is_ok());
        assert_eq!(connector.stats().connects, 2);
        assert_eq!(manager.applied_config().map(|c| c.database), Some(1));
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_manager_unconnected() {
        let connector = MemoryConnector::new();
        let mut manager = ConnectionManager::new(connector.clone());

        manager.ensure_ready(&config()).await.unwrap();
        connector.set_fail_connect(true);
        let err = manager.ensure_ready(&config().with_database(2)).await.unwrap_err();

        assert_eq!(err.error_code(), "CONNECTION_FAILED");
        assert_eq!(manager.state(), ConnectionState::Unconnected);
        assert!(manager.applied_config().is_none());
        // The previous connection was torn down before the failed attempt.
        assert_eq!(connector.stats().live, 0);
    }

    #[tokio::test]
    async fn test_select_failure_discards_connection() {
        let connector = MemoryConnector::new();
        connector.set_fail_select(true);
        let mut manager = ConnectionManager::new(connector.clone());

        let err = manager.ensure_ready(&config().with_database(99)).await.unwrap_err();
        assert!(err.message().contains("SELECT 99"));
        assert_eq!(manager.state(), ConnectionState::Unconnected);
        assert_eq!(connector.stats().live, 0);

        // Retrying with a healthy store connects afresh.
        connector.set_fail_select(false);
        manager.ensure_ready(&config()).await.unwrap();
        assert_eq!(connector.stats().connects, 2);
    }

    #[tokio::test]
    async fn test_dropped_connection_is_replaced() {
        let connector = MemoryConnector::new();
        let mut manager = ConnectionManager::new(connector.clone());

        manager.ensure_ready(&config()).await.unwrap();
        connector.drop_connections();
        let conn = manager.ensure_ready(&config()).await.unwrap();

        assert!(conn.is_open());
        assert_eq!(connector.stats().connects, 2);
        // The dead connection needs no QUIT.
        assert_eq!(connector.stats().quits, 0);
    }

    #[tokio::test]
    async fn test_close_resets_state() {
        let connector = MemoryConnector::new();
        let mut manager = ConnectionManager::new(connector.clone());

        manager.ensure_ready(&config()).await.unwrap();
        manager.close().await;

        assert_eq!(manager.state(), ConnectionState::Unconnected);
        assert!(manager.applied_config().is_none());
        assert_eq!(connector.stats().quits, 1);
        assert_eq!(connector.stats().live, 0);
    }
}
