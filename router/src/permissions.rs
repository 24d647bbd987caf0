//! # Permissions
//!
//! The three-way permission model: every (chain, method) a session can
//! touch is `Allow`, `Ask`, or `Deny`. `Allow` and `Deny` are durable and
//! live in the session record; `Ask` means "a human decides, every time" —
//! the answer is deliberately not remembered.
//!
//! [`PermissionManager`] is the pluggable seam. The reference
//! implementation, [`PolicyPermissionManager`], layers three sources when
//! deciding: the session's own granted table, then any origin-specific
//! policy, then the chain-wide policy, and finally a deny-by-default
//! floor. Grant flows (connect and permission updates) prompt the user
//! through a supplied callback for everything not already allowed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::approval::ApprovalContext;
use crate::chain::ChainId;
use crate::error::RouterError;
use crate::session::{MethodPermissions, PermissionMap, SessionRecord};

// ---------------------------------------------------------------------------
// States and Decisions
// ---------------------------------------------------------------------------

/// The stored three-way state for one (chain, method).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The call proceeds without ceremony.
    Allow,
    /// The call parks until the user decides. The decision is not stored.
    Ask,
    /// The call is refused.
    Deny,
}

/// The outcome of a call-time permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Forward the call.
    Allowed,
    /// Refuse the call.
    Denied,
    /// Park the call in the approval queue.
    AskUser,
}

// ---------------------------------------------------------------------------
// Requests and Grants
// ---------------------------------------------------------------------------

/// What a dApp asks for: per chain, the methods it wants.
pub type PermissionRequest = HashMap<ChainId, Vec<String>>;

/// One method's outcome in a grant flow, human-readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodGrant {
    /// The method that was requested.
    pub method: String,
    /// What granting it means, for display.
    pub description: String,
    /// Whether it was granted.
    pub granted: bool,
}

/// The authoritative result of a grant flow: per chain, what happened to
/// each requested method. This is what the router persists into the
/// session and returns to the dApp.
pub type GrantRecord = HashMap<ChainId, Vec<MethodGrant>>;

/// Collapse a grant record into the session's permission table: granted
/// methods become `Allow`, refused ones become `Deny`.
pub fn granted_permission_map(grants: &GrantRecord) -> PermissionMap {
    grants
        .iter()
        .map(|(chain, methods)| {
            let table: MethodPermissions = methods
                .iter()
                .map(|grant| {
                    let state = if grant.granted {
                        PermissionState::Allow
                    } else {
                        PermissionState::Deny
                    };
                    (grant.method.clone(), state)
                })
                .collect();
            (chain.clone(), table)
        })
        .collect()
}

/// A batched grant prompt: one chain, the methods awaiting a verdict.
#[derive(Debug, Clone)]
pub struct GrantPrompt {
    /// The origin asking for the permissions.
    pub origin: String,
    /// The chain they apply to.
    pub chain_id: ChainId,
    /// The methods that are not already allowed.
    pub methods: Vec<String>,
}

// ---------------------------------------------------------------------------
// Manager Contract
// ---------------------------------------------------------------------------

/// The pluggable permission decision point.
#[async_trait]
pub trait PermissionManager: Send + Sync {
    /// Decide what happens to one call, right now. Must not suspend: the
    /// session record read here and the forwarded call observe the same
    /// permission state.
    fn check_permission(
        &self,
        session: &SessionRecord,
        chain: &ChainId,
        method: &str,
    ) -> PermissionDecision;

    /// Obtain a live user decision for an `Ask` outcome, via whatever UI
    /// the embedder wired in.
    async fn resolve_ask(&self, ctx: &ApprovalContext) -> bool;

    /// Run a grant flow over `requested`, prompting the user for anything
    /// not already allowed. `session` is `None` during `wm_connect`. The
    /// returned record is authoritative: the router persists it verbatim.
    async fn update_permissions(
        &self,
        session: Option<&SessionRecord>,
        origin: &str,
        requested: &PermissionRequest,
    ) -> Result<GrantRecord, RouterError>;
}

// ---------------------------------------------------------------------------
// Reference Implementation
// ---------------------------------------------------------------------------

/// Callback asked for a live verdict on a single parked call.
pub type AskCallback = Arc<dyn Fn(ApprovalContext) -> BoxFuture<'static, bool> + Send + Sync>;

/// Callback asked for a verdict on a batch of requested grants.
pub type GrantCallback = Arc<dyn Fn(GrantPrompt) -> BoxFuture<'static, bool> + Send + Sync>;

/// The reference Allow/Ask/Deny manager.
///
/// Decision layering, highest priority first: a durable `Deny` in the
/// session (an explicit user refusal), then the manager's own policy
/// (origin-specific before chain-wide), then the session's grants, then a
/// deny floor. Policy outranking grants is what keeps an `Ask` method
/// prompting on every call even after the session was granted access to
/// it at connect time. Both callbacks default to refusal, so a manager
/// nobody wired a UI into grants nothing.
pub struct PolicyPermissionManager {
    /// Chain-wide defaults: chain -> method -> state.
    policies: RwLock<HashMap<ChainId, HashMap<String, PermissionState>>>,
    /// Origin-specific overrides: (origin, chain, method) -> state.
    origin_policies: RwLock<HashMap<(String, ChainId, String), PermissionState>>,
    /// Display strings for grant prompts, by method.
    descriptions: RwLock<HashMap<String, String>>,
    ask: AskCallback,
    grant: GrantCallback,
}

impl PolicyPermissionManager {
    /// A manager with no policies and refuse-everything callbacks.
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            origin_policies: RwLock::new(HashMap::new()),
            descriptions: RwLock::new(HashMap::new()),
            ask: Arc::new(|ctx| {
                Box::pin(async move {
                    debug!(method = %ctx.method, "no ask callback wired; denying");
                    false
                })
            }),
            grant: Arc::new(|prompt| {
                Box::pin(async move {
                    debug!(origin = %prompt.origin, "no grant callback wired; refusing");
                    false
                })
            }),
        }
    }

    /// Wire the call-time ask callback.
    pub fn with_ask_callback<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ApprovalContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        self.ask = Arc::new(move |ctx| Box::pin(callback(ctx)));
        self
    }

    /// Wire the grant-flow callback.
    pub fn with_grant_callback<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(GrantPrompt) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        self.grant = Arc::new(move |prompt| Box::pin(callback(prompt)));
        self
    }

    /// Seed a chain-wide policy during construction.
    pub fn with_policy(self, chain: ChainId, method: &str, state: PermissionState) -> Self {
        self.set_policy(chain, method, state);
        self
    }

    /// Set a chain-wide policy for one method.
    pub fn set_policy(&self, chain: ChainId, method: &str, state: PermissionState) {
        self.policies
            .write()
            .entry(chain)
            .or_default()
            .insert(method.to_string(), state);
    }

    /// Set an origin-specific policy for one (chain, method).
    pub fn set_origin_policy(
        &self,
        origin: &str,
        chain: ChainId,
        method: &str,
        state: PermissionState,
    ) {
        self.origin_policies
            .write()
            .insert((origin.to_string(), chain, method.to_string()), state);
    }

    /// Register a display description for a method.
    pub fn describe_method(&self, method: &str, description: &str) {
        self.descriptions
            .write()
            .insert(method.to_string(), description.to_string());
    }

    /// Layered state lookup. `session` may be absent during connect.
    fn stored_state(
        &self,
        session: Option<&SessionRecord>,
        origin: &str,
        chain: &ChainId,
        method: &str,
    ) -> Option<PermissionState> {
        let session_state = session.and_then(|s| s.permission_for(chain, method));
        if session_state == Some(PermissionState::Deny) {
            return session_state;
        }
        self.origin_policies
            .read()
            .get(&(origin.to_string(), chain.clone(), method.to_string()))
            .copied()
            .or_else(|| {
                self.policies
                    .read()
                    .get(chain)
                    .and_then(|methods| methods.get(method))
                    .copied()
            })
            .or(session_state)
    }

    fn description_for(&self, chain: &ChainId, method: &str) -> String {
        self.descriptions
            .read()
            .get(method)
            .cloned()
            .unwrap_or_else(|| format!("Invoke {method} on {chain}"))
    }
}

impl Default for PolicyPermissionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionManager for PolicyPermissionManager {
    fn check_permission(
        &self,
        session: &SessionRecord,
        chain: &ChainId,
        method: &str,
    ) -> PermissionDecision {
        let state = self
            .stored_state(Some(session), &session.origin, chain, method)
            .unwrap_or(PermissionState::Deny);
        match state {
            PermissionState::Allow => PermissionDecision::Allowed,
            PermissionState::Deny => PermissionDecision::Denied,
            PermissionState::Ask => PermissionDecision::AskUser,
        }
    }

    async fn resolve_ask(&self, ctx: &ApprovalContext) -> bool {
        (self.ask)(ctx.clone()).await
    }

    async fn update_permissions(
        &self,
        session: Option<&SessionRecord>,
        origin: &str,
        requested: &PermissionRequest,
    ) -> Result<GrantRecord, RouterError> {
        let mut record = GrantRecord::new();
        for (chain, methods) in requested {
            // Anything not already Allow goes to the user as one batch.
            // Unknown methods default to asking rather than silent denial.
            let mut verdicts: HashMap<String, bool> = HashMap::new();
            let mut prompt_methods = Vec::new();
            for method in methods {
                let state = self
                    .stored_state(session, origin, chain, method)
                    .unwrap_or(PermissionState::Ask);
                if state == PermissionState::Allow {
                    verdicts.insert(method.clone(), true);
                } else {
                    prompt_methods.push(method.clone());
                }
            }

            if !prompt_methods.is_empty() {
                let prompt = GrantPrompt {
                    origin: origin.to_string(),
                    chain_id: chain.clone(),
                    methods: prompt_methods.clone(),
                };
                let approved = (self.grant)(prompt).await;
                for method in prompt_methods {
                    verdicts.insert(method, approved);
                }
            }

            let grants = methods
                .iter()
                .map(|method| MethodGrant {
                    method: method.clone(),
                    description: self.description_for(chain, method),
                    granted: verdicts.get(method).copied().unwrap_or(false),
                })
                .collect();
            record.insert(chain.clone(), grants);
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
