//! In-memory session store.
//!
//! A sharded concurrent map, nothing more. The default store for tests and
//! for embeddings that treat sessions as ephemeral.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::config;

use super::{SessionRecord, SessionStore, StoreError};

/// Session store backed by a concurrent in-memory map.
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
    /// When set, `validate_and_refresh` slides the expiry window by this
    /// much on every hit.
    refresh_ttl: Option<Duration>,
}

impl MemorySessionStore {
    /// A store that slides session windows by the default TTL.
    pub fn new() -> Self {
        Self::with_refresh(Some(config::DEFAULT_SESSION_TTL))
    }

    /// A store with explicit sliding behavior. `None` means fixed windows:
    /// `validate_and_refresh` degrades to a plain `get`.
    pub fn with_refresh(refresh_ttl: Option<Duration>) -> Self {
        Self {
            sessions: DashMap::new(),
            refresh_ttl,
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.sessions.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<SessionRecord> {
        // Expired entries are removed on sight so the map does not
        // accumulate corpses between sweeps.
        let expired = match self.sessions.get(id) {
            Some(entry) if !entry.is_expired() => return Some(entry.value().clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.sessions.remove(id);
        }
        None
    }

    async fn validate_and_refresh(&self, id: &str) -> Option<SessionRecord> {
        let ttl = match self.refresh_ttl {
            Some(ttl) => ttl,
            None => return self.get(id).await,
        };
        let mut entry = self.sessions.get_mut(id)?;
        if entry.is_expired() {
            drop(entry);
            self.sessions.remove(id);
            return None;
        }
        entry.refresh(ttl);
        Some(entry.value().clone())
    }

    async fn delete(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    async fn all(&self) -> HashMap<String, SessionRecord> {
        self.sessions
            .iter()
            .filter(|entry| !entry.is_expired())
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    async fn clean_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, record| !record.is_expired());
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!(removed, "swept expired sessions");
        }
        removed
    }

    async fn clear(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(origin: &str, ttl: Duration) -> SessionRecord {
        SessionRecord::new(origin, ttl)
    }

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemorySessionStore::new();
        let session = record("https://app.example", Duration::from_secs(60));
        let id = session.session_id.clone();

        store.set(session).await.unwrap();
        assert!(store.get(&id).await.is_some());
        assert!(store.delete(&id).await);
        assert!(store.get(&id).await.is_none());
        assert!(!store.delete(&id).await);
    }

    #[tokio::test]
    async fn expired_records_read_as_absent() {
        let store = MemorySessionStore::new();
        let session = record("https://app.example", Duration::ZERO);
        let id = session.session_id.clone();

        store.set(session).await.unwrap();
        assert!(store.get(&id).await.is_none());
        assert!(store.validate_and_refresh(&id).await.is_none());

        // Until set is called again.
        let fresh = record("https://app.example", Duration::from_secs(60));
        let fresh_id = fresh.session_id.clone();
        store.set(fresh).await.unwrap();
        assert!(store.get(&fresh_id).await.is_some());
    }

    #[tokio::test]
    async fn refresh_extends_the_deadline() {
        let store = MemorySessionStore::with_refresh(Some(Duration::from_secs(7200)));
        let session = record("https://app.example", Duration::from_secs(60));
        let id = session.session_id.clone();
        let original_deadline = session.expires_at;

        store.set(session).await.unwrap();
        let refreshed = store.validate_and_refresh(&id).await.unwrap();
        assert!(refreshed.expires_at > original_deadline);
    }

    #[tokio::test]
    async fn non_sliding_store_leaves_the_deadline_alone() {
        let store = MemorySessionStore::with_refresh(None);
        let session = record("https://app.example", Duration::from_secs(60));
        let id = session.session_id.clone();
        let deadline = session.expires_at;

        store.set(session).await.unwrap();
        let read = store.validate_and_refresh(&id).await.unwrap();
        assert_eq!(read.expires_at, deadline);
    }

    #[tokio::test]
    async fn all_excludes_expired() {
        let store = MemorySessionStore::new();
        store
            .set(record("https://a.example", Duration::from_secs(60)))
            .await
            .unwrap();
        store
            .set(record("https://b.example", Duration::ZERO))
            .await
            .unwrap();

        let all = store.all().await;
        assert_eq!(all.len(), 1);
        assert!(all.values().all(|s| s.origin == "https://a.example"));
    }

    #[tokio::test]
    async fn sweep_counts_what_it_removes() {
        let store = MemorySessionStore::new();
        for _ in 0..3 {
            store
                .set(record("https://dead.example", Duration::ZERO))
                .await
                .unwrap();
        }
        store
            .set(record("https://live.example", Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(store.clean_expired().await, 3);
        assert_eq!(store.clean_expired().await, 0);
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let store = MemorySessionStore::new();
        store
            .set(record("https://app.example", Duration::from_secs(60)))
            .await
            .unwrap();
        store.clear().await;
        assert!(store.all().await.is_empty());
    }
}
