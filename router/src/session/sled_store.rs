//! Persistent session store on sled.
//!
//! One key per session under a configurable prefix (default
//! `walletmesh:session:`), JSON-encoded values, plus an index key listing
//! live ids so enumeration does not scan the whole keyspace. The layout is
//! an external contract: another process (or another implementation) can
//! read the store with nothing but the prefix.
//!
//! Storage corruption is recoverable by construction. A malformed record
//! reads as absent and is overwritten by the next `set`; a malformed index
//! is rebuilt from a prefix scan.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config;

use super::{SessionRecord, SessionStore, StoreError};

/// Session store persisted in a sled tree.
pub struct SledSessionStore {
    tree: sled::Tree,
    prefix: String,
    index_key: String,
    /// Serializes index read-modify-write cycles. Record reads and writes
    /// are atomic per key and need no help.
    index_lock: Mutex<()>,
    refresh_ttl: Option<Duration>,
}

impl SledSessionStore {
    /// Open or create a store at `path` with the default prefix and
    /// sliding windows.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::from_db(
            db,
            config::DEFAULT_STORE_PREFIX,
            Some(config::DEFAULT_SESSION_TTL),
        )
    }

    /// Open with an explicit key prefix and sliding behavior.
    pub fn open_with_prefix<P: AsRef<Path>>(
        path: P,
        prefix: &str,
        refresh_ttl: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::from_db(db, prefix, refresh_ttl)
    }

    /// A temporary store that vanishes on drop. For tests.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::from_db(
            db,
            config::DEFAULT_STORE_PREFIX,
            Some(config::DEFAULT_SESSION_TTL),
        )
    }

    fn from_db(db: sled::Db, prefix: &str, refresh_ttl: Option<Duration>) -> Result<Self, StoreError> {
        let tree = db
            .open_tree("sessions")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            tree,
            prefix: prefix.to_string(),
            index_key: format!("{prefix}__index"),
            index_lock: Mutex::new(()),
            refresh_ttl,
        })
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Read a record straight off disk, tolerating every failure mode:
    /// backend errors and malformed JSON both read as absent.
    fn read_record(&self, id: &str) -> Option<SessionRecord> {
        let bytes = match self.tree.get(self.record_key(id)) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, id, "session read failed; treating as absent");
                return None;
            }
        };
        match serde_json::from_slice::<SessionRecord>(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, id, "malformed session record; treating as absent");
                None
            }
        }
    }

    fn write_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.tree
            .insert(self.record_key(&record.session_id), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    /// The live-id index. A missing or malformed index falls back to a
    /// prefix scan and is rewritten from what the scan finds.
    fn read_index(&self) -> Vec<String> {
        let raw = self.tree.get(&self.index_key).ok().flatten();
        if let Some(bytes) = raw {
            if let Ok(ids) = serde_json::from_slice::<Vec<String>>(&bytes) {
                return ids;
            }
            debug!("session index is malformed; rebuilding from a scan");
        }
        let ids = self.scan_ids();
        self.write_index(&ids);
        ids
    }

    fn write_index(&self, ids: &[String]) {
        match serde_json::to_vec(ids) {
            Ok(bytes) => {
                if let Err(e) = self.tree.insert(&*self.index_key, bytes) {
                    warn!(error = %e, "failed to persist session index");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode session index"),
        }
    }

    fn scan_ids(&self) -> Vec<String> {
        self.tree
            .scan_prefix(&self.prefix)
            .filter_map(|entry| entry.ok())
            .filter_map(|(key, _)| String::from_utf8(key.to_vec()).ok())
            .filter(|key| *key != self.index_key)
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect()
    }

    fn index_insert(&self, id: &str) {
        let _guard = self.index_lock.lock();
        let mut ids = self.read_index();
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
            self.write_index(&ids);
        }
    }

    fn index_remove(&self, id: &str) {
        let _guard = self.index_lock.lock();
        let mut ids = self.read_index();
        let before = ids.len();
        ids.retain(|existing| existing != id);
        if ids.len() != before {
            self.write_index(&ids);
        }
    }

    fn remove_entry(&self, id: &str) {
        if let Err(e) = self.tree.remove(self.record_key(id)) {
            warn!(error = %e, id, "failed to remove session record");
        }
        self.index_remove(id);
    }

    fn flush(&self) {
        if let Err(e) = self.tree.flush() {
            warn!(error = %e, "sled flush failed");
        }
    }
}

#[async_trait]
impl SessionStore for SledSessionStore {
    async fn set(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.write_record(&record)?;
        self.index_insert(&record.session_id);
        self.flush();
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<SessionRecord> {
        match self.read_record(id) {
            Some(record) if !record.is_expired() => Some(record),
            Some(_) => {
                self.remove_entry(id);
                None
            }
            None => None,
        }
    }

    async fn validate_and_refresh(&self, id: &str) -> Option<SessionRecord> {
        let mut record = self.get(id).await?;
        if let Some(ttl) = self.refresh_ttl {
            record.refresh(ttl);
            if let Err(e) = self.write_record(&record) {
                // The refresh is best-effort; the read already succeeded.
                warn!(error = %e, id, "failed to persist refreshed session");
            }
        }
        Some(record)
    }

    async fn delete(&self, id: &str) -> bool {
        let existed = matches!(self.tree.get(self.record_key(id)), Ok(Some(_)));
        self.remove_entry(id);
        self.flush();
        existed
    }

    async fn all(&self) -> HashMap<String, SessionRecord> {
        let ids = {
            let _guard = self.index_lock.lock();
            self.read_index()
        };
        let mut live = HashMap::new();
        for id in ids {
            if let Some(record) = self.read_record(&id) {
                if !record.is_expired() {
                    live.insert(id, record);
                }
            }
        }
        live
    }

    async fn clean_expired(&self) -> usize {
        let ids = {
            let _guard = self.index_lock.lock();
            self.read_index()
        };
        let mut removed = 0;
        for id in ids {
            match self.read_record(&id) {
                Some(record) if record.is_expired() => {
                    self.remove_entry(&id);
                    removed += 1;
                }
                Some(_) => {}
                // A dangling index entry is as dead as an expired one.
                None => self.index_remove(&id),
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired sessions");
            self.flush();
        }
        removed
    }

    async fn clear(&self) {
        let ids = {
            let _guard = self.index_lock.lock();
            self.read_index()
        };
        for id in ids {
            if let Err(e) = self.tree.remove(self.record_key(&id)) {
                warn!(error = %e, id, "failed to remove session record");
            }
        }
        let _guard = self.index_lock.lock();
        self.write_index(&[]);
        self.flush();
    }
}
