//! # Sessions
//!
//! A session is the server-side record authorizing one origin to invoke a
//! set of methods on a set of chains. Sessions are created by `wm_connect`,
//! validated and slid forward on use, and destroyed by disconnect,
//! revocation, or expiry.
//!
//! The stores are pluggable behind [`SessionStore`]. Two ship with the
//! crate: an in-memory map ([`MemorySessionStore`]) and a sled-backed
//! persistent store ([`SledSessionStore`]). Storage failures never reach
//! the protocol as storage failures — a read that cannot be trusted
//! degrades to "session not found".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::chain::ChainId;
use crate::config;
use crate::permissions::PermissionState;

mod memory;
mod sled_store;

pub use memory::MemorySessionStore;
pub use sled_store::SledSessionStore;

// ---------------------------------------------------------------------------
// Permission Maps
// ---------------------------------------------------------------------------

/// Per-chain method permissions: method name to its three-way state.
pub type MethodPermissions = HashMap<String, PermissionState>;

/// A session's full permission table: chain to its method map.
pub type PermissionMap = HashMap<ChainId, MethodPermissions>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures inside a session store. These stop at the router boundary:
/// reads degrade to absent, writes surface as `UnknownError`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage refused the operation.
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A record could not be encoded for storage.
    #[error("serialization failure: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// Session Record
// ---------------------------------------------------------------------------

/// One authorized session. The origin is immutable after creation;
/// permissions change only through the permission-update path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque id: either `session_`-prefixed or UUID-like.
    pub session_id: String,
    /// The authenticated origin this session belongs to.
    pub origin: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last validated use.
    pub last_active_at: DateTime<Utc>,
    /// Hard deadline; a session past this point is treated as absent.
    pub expires_at: DateTime<Utc>,
    /// The granted permission table.
    #[serde(default)]
    pub permissions: PermissionMap,
    /// Opaque key/value metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl SessionRecord {
    /// Create a fresh session for `origin` with a UUID id and the given
    /// lifetime.
    pub fn new(origin: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            origin: origin.into(),
            created_at: now,
            last_active_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            permissions: PermissionMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// True once the session has passed its deadline.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Slide the window: stamp the last use and push the deadline out by
    /// `ttl` from now.
    pub fn refresh(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.last_active_at = now;
        self.expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
    }

    /// The stored state for one (chain, method), if any was ever granted
    /// or denied.
    pub fn permission_for(&self, chain: &ChainId, method: &str) -> Option<PermissionState> {
        self.permissions.get(chain).and_then(|m| m.get(method)).copied()
    }

    /// True if the session holds any non-`Deny` permission on `chain`.
    /// This is the event-routing authorization check.
    pub fn has_chain_access(&self, chain: &ChainId) -> bool {
        self.permissions
            .get(chain)
            .map(|methods| methods.values().any(|s| *s != PermissionState::Deny))
            .unwrap_or(false)
    }

    /// Structural check for externally-supplied session ids.
    pub fn is_valid_session_id(id: &str) -> bool {
        id.starts_with(config::SESSION_ID_PREFIX) || id.contains('-')
    }
}

// ---------------------------------------------------------------------------
// Store Contract
// ---------------------------------------------------------------------------

/// The pluggable session store.
///
/// All reads treat expired records as absent. `validate_and_refresh` is the
/// hot-path read: it additionally slides the expiry window when the store
/// is configured to do so.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a record, keyed by its `session_id`.
    async fn set(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Fetch a record. Absent and expired are indistinguishable.
    async fn get(&self, id: &str) -> Option<SessionRecord>;

    /// Fetch a record and, if the store slides windows, refresh it.
    async fn validate_and_refresh(&self, id: &str) -> Option<SessionRecord>;

    /// Remove a record. Returns true if something was removed.
    async fn delete(&self, id: &str) -> bool;

    /// All live (non-expired) records, keyed by id.
    async fn all(&self) -> HashMap<String, SessionRecord>;

    /// Sweep expired records out of the store. Returns how many went.
    async fn clean_expired(&self) -> usize;

    /// Drop everything.
    async fn clear(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sessions_get_uuid_ids() {
        let record = SessionRecord::new("https://app.example", Duration::from_secs(60));
        assert!(SessionRecord::is_valid_session_id(&record.session_id));
        assert!(record.session_id.contains('-'));
        assert!(!record.is_expired());
        assert!(record.expires_at > record.created_at);
    }

    #[test]
    fn session_id_shape_check() {
        assert!(SessionRecord::is_valid_session_id("session_abc123"));
        assert!(SessionRecord::is_valid_session_id(
            "3b241101-e2bb-4255-8caf-4136c566a962"
        ));
        assert!(!SessionRecord::is_valid_session_id("justanid"));
    }

    #[test]
    fn refresh_slides_the_window() {
        let mut record = SessionRecord::new("https://app.example", Duration::from_secs(1));
        let old_deadline = record.expires_at;
        record.refresh(Duration::from_secs(3600));
        assert!(record.expires_at > old_deadline);
        assert!(record.last_active_at >= record.created_at);
    }

    #[test]
    fn zero_ttl_is_immediately_expired() {
        let record = SessionRecord::new("https://app.example", Duration::ZERO);
        assert!(record.is_expired());
    }

    #[test]
    fn chain_access_requires_a_non_deny_entry() {
        let chain = ChainId::parse("eip155:1").unwrap();
        let other = ChainId::parse("eip155:10").unwrap();
        let mut record = SessionRecord::new("https://app.example", Duration::from_secs(60));

        assert!(!record.has_chain_access(&chain));

        let mut methods = MethodPermissions::new();
        methods.insert("eth_accounts".into(), PermissionState::Deny);
        record.permissions.insert(chain.clone(), methods);
        assert!(!record.has_chain_access(&chain), "all-deny is not access");

        record
            .permissions
            .get_mut(&chain)
            .unwrap()
            .insert("eth_chainId".into(), PermissionState::Allow);
        assert!(record.has_chain_access(&chain));
        assert!(!record.has_chain_access(&other));
    }

    #[test]
    fn record_json_roundtrip() {
        let chain = ChainId::parse("eip155:1").unwrap();
        let mut record = SessionRecord::new("https://app.example", Duration::from_secs(60));
        let mut methods = MethodPermissions::new();
        methods.insert("eth_accounts".into(), PermissionState::Allow);
        methods.insert("eth_sendTransaction".into(), PermissionState::Ask);
        record.permissions.insert(chain, methods);

        let json = serde_json::to_string(&record).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
