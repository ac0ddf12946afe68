//! In-Memory Store Transport
//!
//! A [`StoreConnector`] backed by a process-local map of databases. Used by
//! tests and for exercising the lookup pipeline without a server.
//!
//! The connector records how many connects, selects, quits and gets it served
//! and can be told to fail connects, closes or individual keys.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{LookupError, Result};
use crate::store::{ConnectionConfig, StoreConnection, StoreConnector};

#[derive(Debug, Default)]
struct Shared {
    databases: RwLock<HashMap<u32, HashMap<String, String>>>,
    failing_keys: RwLock<HashSet<String>>,
    password: RwLock<Option<String>>,
    fail_connect: AtomicBool,
    fail_select: AtomicBool,
    fail_quit: AtomicBool,
    generation: AtomicUsize,
    connects: AtomicUsize,
    selects: AtomicUsize,
    quits: AtomicUsize,
    gets: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

// Lock poisoning only happens if a test panicked while holding the lock.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Counters describing the traffic a [`MemoryConnector`] has served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connects: usize,
    pub selects: usize,
    pub quits: usize,
    pub gets: usize,
    /// Connections currently open
    pub live: usize,
    /// Highest number of simultaneously open connections observed
    pub max_live: usize,
}

/// In-memory connector; clones share the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key` in `database`
    pub fn insert(&self, database: u32, key: impl Into<String>, value: impl Into<String>) {
        write(&self.shared.databases).entry(database).or_default().insert(key.into(), value.into());
    }

    /// Require `AUTH` with this password
    pub fn require_password(&self, password: impl Into<String>) {
        *write(&self.shared.password) = Some(password.into());
    }

    /// Make every subsequent connect fail
    pub fn set_fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `SELECT` fail
    pub fn set_fail_select(&self, fail: bool) {
        self.shared.fail_select.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `QUIT` fail (the connection still closes)
    pub fn set_fail_quit(&self, fail: bool) {
        self.shared.fail_quit.store(fail, Ordering::SeqCst);
    }

    /// Make `GET key` fail with a transport error
    pub fn fail_key(&self, key: impl Into<String>) {
        write(&self.shared.failing_keys).insert(key.into());
    }

    /// Simulate the server dropping every open connection
    pub fn drop_connections(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.live.store(0, Ordering::SeqCst);
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            connects: self.shared.connects.load(Ordering::SeqCst),
            selects: self.shared.selects.load(Ordering::SeqCst),
            quits: self.shared.quits.load(Ordering::SeqCst),
            gets: self.shared.gets.load(Ordering::SeqCst),
            live: self.shared.live.load(Ordering::SeqCst),
            max_live: self.shared.max_live.load(Ordering::SeqCst),
        }
    }
}

impl StoreConnector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<MemoryConnection> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);

        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(LookupError::connection_failed(format!(
                "Failed to connect to {}: connection refused",
                config.address()
            )));
        }

        let required = read(&self.shared.password).clone();
        if required.is_some() && required != config.password {
            return Err(LookupError::connection_failed(
                "Authentication rejected: WRONGPASS invalid username-password pair",
            ));
        }

        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
            database: AtomicU32::new(config.database),
            generation: self.shared.generation.load(Ordering::SeqCst),
            open: AtomicBool::new(true),
        })
    }
}

/// Connection handed out by [`MemoryConnector`]
#[derive(Debug)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
    database: AtomicU32,
    generation: usize,
    open: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(LookupError::connection_failed("Connection is closed"))
        }
    }
}

impl StoreConnection for MemoryConnection {
    async fn select(&self, database: u32) -> Result<()> {
        self.ensure_open()?;
        self.shared.selects.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_select.load(Ordering::SeqCst) {
            return Err(LookupError::connection_failed(format!(
                "SELECT {database} rejected: ERR DB index is out of range"
            )));
        }
        self.database.store(database, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.shared.gets.fetch_add(1, Ordering::SeqCst);
        if !self.is_open() {
            return Err(LookupError::lookup_failed(key, "connection is closed"));
        }
        if read(&self.shared.failing_keys).contains(key) {
            return Err(LookupError::lookup_failed(key, "connection reset by peer"));
        }
        let database = self.database.load(Ordering::SeqCst);
        Ok(read(&self.shared.databases).get(&database).and_then(|keys| keys.get(key)).cloned())
    }

    async fn quit(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.quits.fetch_add(1, Ordering::SeqCst);
        if self.generation == self.shared.generation.load(Ordering::SeqCst) {
            self.shared.live.fetch_sub(1, Ordering::SeqCst);
        }
        if self.shared.fail_quit.load(Ordering::SeqCst) {
            return Err(LookupError::connection_failed("Failed to close connection: broken pipe"));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
            && self.generation == self.shared.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_respects_selected_database() {
        let connector = MemoryConnector::new();
        connector.insert(0, "k", "zero");
        connector.insert(3, "k", "three");

        let conn = connector.connect(&ConnectionConfig::new("memory", 0)).await.unwrap();
        assert_eq!(conn.get("k").await.unwrap().as_deref(), Some("zero"));

        conn.select(3).await.unwrap();
        assert_eq!(conn.get("k").await.unwrap().as_deref(), Some("three"));
        assert_eq!(conn.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_password_required() {
        let connector = MemoryConnector::new();
        connector.require_password("secret");

        let config = ConnectionConfig::new("memory", 0);
        assert!(connector.connect(&config).await.is_err());
        assert!(connector.connect(&config.with_password("secret")).await.is_ok());
    }

    #[tokio::test]
    async fn test_live_tracking() {
        let connector = MemoryConnector::new();
        let config = ConnectionConfig::new("memory", 0);

        let first = connector.connect(&config).await.unwrap();
        first.quit().await.unwrap();
        let second = connector.connect(&config).await.unwrap();

        let stats = connector.stats();
        assert_eq!(stats.connects, 2);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.max_live, 1);
        assert!(!first.is_open());
        assert!(second.is_open());

        connector.drop_connections();
        assert!(!second.is_open());
    }
}
