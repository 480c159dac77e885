//! Bookkeeping for open client connections.
//!
//! The registry is keyed by peer address and records whether each
//! connection is idle or owned by a handler unit. The event loop and the
//! handler units share it through a single async mutex.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::http::connection::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no connection registered for {0}")]
    Unknown(SocketAddr),
    #[error("connection {0} is already being handled")]
    AlreadyHandling(SocketAddr),
}

/// Per-connection record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub state: ConnectionState,
    pub accepted_at: Instant,
    pub last_activity: Instant,
    /// Requests completed on this connection.
    pub served: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Arc<Mutex<HashMap<SocketAddr, Entry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly accepted connection as idle. A stale entry for the
    /// same address is replaced.
    pub async fn register(&self, peer: SocketAddr) {
        let now = Instant::now();
        self.entries.lock().await.insert(
            peer,
            Entry {
                state: ConnectionState::Listening,
                accepted_at: now,
                last_activity: now,
                served: 0,
            },
        );
    }

    /// Claims `peer` for a handler unit.
    ///
    /// The check and the state change happen under one lock, so a second
    /// claim before [`finish_handling`](Self::finish_handling) fails with
    /// [`RegistryError::AlreadyHandling`].
    pub async fn begin_handling(&self, peer: SocketAddr) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&peer).ok_or(RegistryError::Unknown(peer))?;

        if entry.state == ConnectionState::Handling {
            return Err(RegistryError::AlreadyHandling(peer));
        }

        entry.state = ConnectionState::Handling;
        Ok(())
    }

    /// Returns `peer` to the idle set after a keep-alive response.
    pub async fn finish_handling(&self, peer: SocketAddr) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&peer).ok_or(RegistryError::Unknown(peer))?;

        entry.state = ConnectionState::Listening;
        entry.last_activity = Instant::now();
        entry.served += 1;
        Ok(())
    }

    /// Refreshes the activity timestamp without changing state.
    pub async fn touch(&self, peer: SocketAddr) {
        if let Some(entry) = self.entries.lock().await.get_mut(&peer) {
            entry.last_activity = Instant::now();
        }
    }

    /// Forgets `peer`, returning its last record.
    pub async fn remove(&self, peer: SocketAddr) -> Option<Entry> {
        self.entries.lock().await.remove(&peer)
    }

    /// Unknown peers report [`ConnectionState::Closed`].
    pub async fn state(&self, peer: SocketAddr) -> ConnectionState {
        self.entries
            .lock()
            .await
            .get(&peer)
            .map(|entry| entry.state)
            .unwrap_or(ConnectionState::Closed)
    }

    pub async fn get(&self, peer: SocketAddr) -> Option<Entry> {
        self.entries.lock().await.get(&peer).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn idle_count(&self) -> usize {
        self.count(ConnectionState::Listening).await
    }

    pub async fn handling_count(&self) -> usize {
        self.count(ConnectionState::Handling).await
    }

    pub async fn peers(&self) -> Vec<SocketAddr> {
        self.entries.lock().await.keys().copied().collect()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    async fn count(&self, state: ConnectionState) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.state == state)
            .count()
    }
}
