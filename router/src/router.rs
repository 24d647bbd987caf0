//! # Wallet Router
//!
//! The composition point. A [`WalletRouter`] owns one client-facing node
//! (the dApp side), a proxy per registered chain (the wallet side), a
//! session store, a permission manager, and an approval queue, and wires
//! the `wm_*` method surface across them.
//!
//! The pipeline for a forwarded call:
//!
//! ```text
//! wm_call --> session check --> permission check --> [approval queue] --> proxy
//! ```
//!
//! Everything before the proxy hop is the router's job; everything after
//! is the wallet's. The router never interprets the forwarded method.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::approval::{ApprovalContext, ApprovalError, ApprovalQueue};
use crate::chain::ChainId;
use crate::config;
use crate::error::{BulkEntry, RouterError};
use crate::jsonrpc::{CallError, ErrorObject, RequestContext, RequestId, RpcNode};
use crate::permissions::{granted_permission_map, PermissionDecision, PermissionManager};
use crate::proxy::Proxy;
use crate::session::{SessionRecord, SessionStore};
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// Method Calls
// ---------------------------------------------------------------------------

/// One wallet method invocation, as carried inside `wm_call` and
/// `wm_bulkCall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// The wallet method name.
    pub method: String,
    /// Its params, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl MethodCall {
    /// A call with no params.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// A call with params.
    pub fn with_params(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Router-wide knobs. The defaults come from [`crate::config`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Lifetime of a freshly created session.
    pub session_ttl: Duration,
    /// How long an `Ask` call waits for the user.
    pub approval_timeout: Duration,
    /// How long a forwarded call waits for the wallet.
    pub call_timeout: Duration,
    /// Upper bound on `wm_bulkCall` sub-calls.
    pub max_bulk_calls: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            session_ttl: config::DEFAULT_SESSION_TTL,
            approval_timeout: config::DEFAULT_APPROVAL_TIMEOUT,
            call_timeout: config::DEFAULT_CALL_TIMEOUT,
            max_bulk_calls: config::MAX_BULK_CALLS,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire Shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConnectParams {
    permissions: HashMap<ChainId, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct GetPermissionsParams {
    session_id: String,
    #[serde(default)]
    chain_ids: Option<Vec<ChainId>>,
}

#[derive(Debug, Deserialize)]
struct UpdatePermissionsParams {
    session_id: String,
    permissions: HashMap<ChainId, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    session_id: String,
    chain_id: ChainId,
    call: MethodCall,
}

#[derive(Debug, Deserialize)]
struct BulkCallParams {
    session_id: String,
    chain_id: ChainId,
    calls: Vec<MethodCall>,
}

#[derive(Debug, Default, Deserialize)]
struct SupportedMethodsParams {
    #[serde(default)]
    chain_ids: Option<Vec<ChainId>>,
}

fn required_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RouterError> {
    let value = params.ok_or_else(|| RouterError::InvalidRequest("missing params".into()))?;
    serde_json::from_value(value).map_err(|e| RouterError::InvalidRequest(e.to_string()))
}

fn optional_params<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T, RouterError> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| RouterError::InvalidRequest(e.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// The multi-chain wallet router.
pub struct WalletRouter {
    node: Arc<RpcNode>,
    wallets: RwLock<HashMap<ChainId, Arc<Proxy>>>,
    sessions: Arc<dyn SessionStore>,
    permissions: Arc<dyn PermissionManager>,
    approvals: Arc<ApprovalQueue>,
    config: RouterConfig,
}

impl WalletRouter {
    /// Build a router on `transport` with default configuration.
    pub fn new(
        transport: Arc<dyn Transport>,
        sessions: Arc<dyn SessionStore>,
        permissions: Arc<dyn PermissionManager>,
    ) -> Arc<Self> {
        Self::with_config(transport, sessions, permissions, RouterConfig::default())
    }

    /// Build a router with explicit configuration.
    pub fn with_config(
        transport: Arc<dyn Transport>,
        sessions: Arc<dyn SessionStore>,
        permissions: Arc<dyn PermissionManager>,
        config: RouterConfig,
    ) -> Arc<Self> {
        let node = RpcNode::with_timeout(transport, config.call_timeout);
        let approvals = Arc::new(ApprovalQueue::with_timeout(config.approval_timeout));
        let router = Arc::new(Self {
            node,
            wallets: RwLock::new(HashMap::new()),
            sessions,
            permissions,
            approvals,
            config,
        });
        router.register_methods();
        router
    }

    fn register_methods(self: &Arc<Self>) {
        self.register(config::METHOD_CONNECT, Self::handle_connect);
        self.register(config::METHOD_RECONNECT, Self::handle_reconnect);
        self.register(config::METHOD_DISCONNECT, Self::handle_disconnect);
        self.register(config::METHOD_GET_PERMISSIONS, Self::handle_get_permissions);
        self.register(
            config::METHOD_UPDATE_PERMISSIONS,
            Self::handle_update_permissions,
        );
        self.register(config::METHOD_CALL, Self::handle_call);
        self.register(config::METHOD_BULK_CALL, Self::handle_bulk_call);
        self.register(
            config::METHOD_GET_SUPPORTED_METHODS,
            Self::handle_get_supported_methods,
        );
    }

    /// Register one `wm_*` handler, holding the router weakly so the node
    /// never keeps a closed router alive.
    fn register<H, Fut>(self: &Arc<Self>, name: &'static str, handler: H)
    where
        H: Fn(Arc<WalletRouter>, RequestContext, Option<Value>) -> Fut
            + Send
            + Sync
            + Copy
            + 'static,
        Fut: Future<Output = Result<Value, RouterError>> + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        self.node
            .register_reserved_method(name, move |ctx, params| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(router) => handler(router, ctx, params)
                            .await
                            .map_err(|e| e.to_error_object()),
                        None => Err(ErrorObject::internal_error("router is shutting down")),
                    }
                }
            })
            .expect("router method names are unique");
    }

    // -- Wallet registry ----------------------------------------------------

    /// Attach a wallet backend for `chain_id`. Fails if the chain already
    /// has one. Subscribes to the wallet's router events so they can be
    /// relayed to authorized sessions.
    pub fn add_wallet(
        self: &Arc<Self>,
        chain_id: ChainId,
        transport: Arc<dyn Transport>,
    ) -> Result<(), RouterError> {
        let proxy = Arc::new(Proxy::new(RpcNode::with_timeout(
            transport,
            self.config.call_timeout,
        )));
        {
            let mut wallets = self.wallets.write();
            if wallets.contains_key(&chain_id) {
                return Err(RouterError::InvalidRequest(format!(
                    "wallet already registered for {chain_id}"
                )));
            }
            wallets.insert(chain_id.clone(), Arc::clone(&proxy));
        }

        for event in config::ROUTER_EVENTS {
            let weak = Arc::downgrade(self);
            let chain = chain_id.clone();
            proxy.node().on(event, move |payload| {
                if let Some(router) = weak.upgrade() {
                    router.relay_wallet_event(chain.clone(), event, payload);
                }
            });
        }

        info!(%chain_id, "wallet registered");
        self.spawn_event(
            config::EVENT_WALLET_AVAILABILITY_CHANGED,
            json!({ "chain_id": chain_id, "available": true }),
        );
        Ok(())
    }

    /// Detach the wallet for `chain_id`. Sessions are left untouched;
    /// subsequent calls on the chain fail with `UnknownChain`.
    pub fn remove_wallet(self: &Arc<Self>, chain_id: &ChainId) -> Result<(), RouterError> {
        let proxy = self
            .wallets
            .write()
            .remove(chain_id)
            .ok_or_else(|| RouterError::UnknownChain(chain_id.to_string()))?;
        proxy.close();
        info!(%chain_id, "wallet removed");
        self.spawn_event(
            config::EVENT_WALLET_AVAILABILITY_CHANGED,
            json!({ "chain_id": chain_id, "available": false }),
        );
        Ok(())
    }

    /// The chains that currently have a wallet attached.
    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.wallets.read().keys().cloned().collect();
        chains.sort();
        chains
    }

    // -- Wallet UI surface --------------------------------------------------

    /// Approvals currently waiting on the user.
    pub fn pending_approvals(&self) -> Vec<ApprovalContext> {
        self.approvals.pending()
    }

    /// Deliver a user verdict for a parked call. `false` if nothing was
    /// pending under that id.
    pub fn resolve_approval(&self, request_id: &RequestId, approved: bool) -> bool {
        self.approvals.resolve(request_id, approved)
    }

    /// Revoke one session and notify the client. `false` if it was not in
    /// the store.
    pub async fn revoke_session(&self, session_id: &str) -> bool {
        if self.sessions.delete(session_id).await {
            info!(session_id, "session revoked");
            let _ = self
                .node
                .emit(
                    config::EVENT_SESSION_TERMINATED,
                    json!({ "session_id": session_id, "reason": "revoked" }),
                )
                .await;
            true
        } else {
            false
        }
    }

    /// Revoke every live session. Returns how many went.
    pub async fn revoke_all_sessions(&self) -> usize {
        let all = self.sessions.all().await;
        let mut revoked = 0;
        for id in all.keys() {
            if self.revoke_session(id).await {
                revoked += 1;
            }
        }
        revoked
    }

    /// Sweep expired sessions out of the store.
    pub async fn clean_expired_sessions(&self) -> usize {
        self.sessions.clean_expired().await
    }

    // -- Method Handlers ----------------------------------------------------

    async fn handle_connect(
        self: Arc<Self>,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> Result<Value, RouterError> {
        let origin = ctx
            .trusted_origin()
            .map(str::to_string)
            .ok_or_else(|| {
                RouterError::InvalidRequest(
                    "wm_connect requires a transport-authenticated origin".into(),
                )
            })?;
        let p: ConnectParams = required_params(params)?;
        if p.permissions.is_empty() {
            return Err(RouterError::InvalidRequest(
                "permission request must not be empty".into(),
            ));
        }
        for chain in p.permissions.keys() {
            self.proxy_for(chain)?;
        }

        let grants = self
            .permissions
            .update_permissions(None, &origin, &p.permissions)
            .await?;

        let mut session = SessionRecord::new(&origin, self.config.session_ttl);
        session.permissions = granted_permission_map(&grants);
        session
            .metadata
            .insert("protocol_version".into(), json!(config::PROTOCOL_VERSION));
        let session_id = session.session_id.clone();
        self.sessions.set(session).await.map_err(|e| RouterError::Unknown {
            message: e.to_string(),
            cause: None,
        })?;

        info!(%origin, %session_id, "session created");
        Ok(json!({ "session_id": session_id, "permissions": grants }))
    }

    async fn handle_reconnect(
        self: Arc<Self>,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> Result<Value, RouterError> {
        let p: SessionParams = required_params(params)?;
        // Reconnect re-derives session identity, so it demands the same
        // trust as connect. No trusted origin, no oracle.
        let origin = ctx.trusted_origin().ok_or_else(|| {
            RouterError::InvalidSession("reconnect requires a transport-authenticated origin".into())
        })?;
        let session = self
            .sessions
            .validate_and_refresh(&p.session_id)
            .await
            .ok_or_else(|| RouterError::InvalidSession("unknown or expired session".into()))?;
        if session.origin != origin {
            warn!(session_id = %p.session_id, origin, "reconnect origin mismatch");
            return Err(RouterError::InvalidSession("origin mismatch".into()));
        }

        debug!(session_id = %p.session_id, "session reconnected");
        Ok(json!({ "status": true, "permissions": session.permissions }))
    }

    async fn handle_disconnect(
        self: Arc<Self>,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> Result<Value, RouterError> {
        let p: SessionParams = required_params(params)?;
        let session = self.authorize_session(&ctx, &p.session_id).await?;
        self.sessions.delete(&session.session_id).await;
        info!(session_id = %session.session_id, "session disconnected");
        let _ = self
            .node
            .emit(
                config::EVENT_SESSION_TERMINATED,
                json!({ "session_id": session.session_id, "reason": "disconnected" }),
            )
            .await;
        Ok(json!(true))
    }

    async fn handle_get_permissions(
        self: Arc<Self>,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> Result<Value, RouterError> {
        let p: GetPermissionsParams = required_params(params)?;
        let session = self.authorize_session(&ctx, &p.session_id).await?;
        let permissions = match p.chain_ids {
            Some(chains) => session
                .permissions
                .into_iter()
                .filter(|(chain, _)| chains.contains(chain))
                .collect(),
            None => session.permissions,
        };
        Ok(json!(permissions))
    }

    async fn handle_update_permissions(
        self: Arc<Self>,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> Result<Value, RouterError> {
        let p: UpdatePermissionsParams = required_params(params)?;
        let mut session = self.authorize_session(&ctx, &p.session_id).await?;
        if p.permissions.is_empty() {
            return Err(RouterError::InvalidRequest(
                "permission request must not be empty".into(),
            ));
        }
        for chain in p.permissions.keys() {
            self.proxy_for(chain)?;
        }

        let grants = self
            .permissions
            .update_permissions(Some(&session), &session.origin, &p.permissions)
            .await?;

        // Merge the new grants over the stored table, then persist. The
        // write is the atomicity point: in-flight calls see the old record
        // or the new one, never a mix.
        for (chain, methods) in granted_permission_map(&grants) {
            session.permissions.entry(chain).or_default().extend(methods);
        }
        self.sessions
            .set(session.clone())
            .await
            .map_err(|e| RouterError::Unknown {
                message: e.to_string(),
                cause: None,
            })?;

        info!(session_id = %session.session_id, "permissions updated");
        let _ = self
            .node
            .emit(
                config::EVENT_PERMISSIONS_CHANGED,
                json!({ "session_id": session.session_id, "permissions": grants }),
            )
            .await;
        Ok(json!(grants))
    }

    async fn handle_call(
        self: Arc<Self>,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> Result<Value, RouterError> {
        let p: CallParams = required_params(params)?;
        let request_id = ctx
            .id
            .clone()
            .ok_or_else(|| RouterError::InvalidRequest("wm_call requires a request id".into()))?;
        let session = self.authorize_session(&ctx, &p.session_id).await?;
        let proxy = self.proxy_for(&p.chain_id)?;
        self.execute_call(&session, &p.chain_id, &proxy, &p.call, &request_id)
            .await
    }

    async fn handle_bulk_call(
        self: Arc<Self>,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> Result<Value, RouterError> {
        let p: BulkCallParams = required_params(params)?;
        let request_id = ctx.id.clone().ok_or_else(|| {
            RouterError::InvalidRequest("wm_bulkCall requires a request id".into())
        })?;
        if p.calls.is_empty() {
            return Err(RouterError::InvalidRequest(
                "wm_bulkCall requires at least one call".into(),
            ));
        }
        if p.calls.len() > self.config.max_bulk_calls {
            return Err(RouterError::InvalidRequest(format!(
                "wm_bulkCall accepts at most {} calls, got {}",
                self.config.max_bulk_calls,
                p.calls.len()
            )));
        }
        // Fail the whole request early if the chain is unknown; that is a
        // routing error, not a per-call outcome.
        let proxy = self.proxy_for(&p.chain_id)?;

        let mut entries: Vec<BulkEntry> = Vec::with_capacity(p.calls.len());
        let mut failures = 0;
        for call in &p.calls {
            // The session is re-read per sub-call: a permission update
            // between sub-calls is observed by the next one, never inside
            // one.
            let outcome = match self.authorize_session(&ctx, &p.session_id).await {
                Ok(session) => {
                    self.execute_call(&session, &p.chain_id, &proxy, call, &request_id)
                        .await
                }
                Err(e) => Err(e),
            };
            match outcome {
                Ok(value) => entries.push(BulkEntry::Success(value)),
                Err(e) => {
                    debug!(method = %call.method, error = %e, "bulk sub-call failed");
                    failures += 1;
                    entries.push(BulkEntry::Failure {
                        error: e.to_bulk_error(),
                    });
                }
            }
        }

        if failures == 0 {
            let values: Vec<Value> = entries
                .into_iter()
                .map(|entry| match entry {
                    BulkEntry::Success(value) => value,
                    BulkEntry::Failure { .. } => Value::Null,
                })
                .collect();
            Ok(Value::Array(values))
        } else {
            Err(RouterError::PartialFailure { results: entries })
        }
    }

    async fn handle_get_supported_methods(
        self: Arc<Self>,
        _ctx: RequestContext,
        params: Option<Value>,
    ) -> Result<Value, RouterError> {
        let p: SupportedMethodsParams = optional_params(params)?;
        match p.chain_ids {
            None => Ok(json!(self.node.registered_methods())),
            Some(chains) => {
                let mut map = serde_json::Map::new();
                for chain in chains {
                    let proxy = self.proxy_for(&chain)?;
                    let methods = proxy
                        .supported_methods()
                        .await
                        .map_err(|e| self.classify_call_error(config::CAPABILITY_METHOD, e))?;
                    map.insert(chain.to_string(), json!(methods));
                }
                Ok(Value::Object(map))
            }
        }
    }

    // -- Pipeline internals -------------------------------------------------

    /// Load and authorize the session named by a request. A trusted
    /// transport origin, when present, must match the session's origin;
    /// an untrusted one is never used to grant anything.
    async fn authorize_session(
        &self,
        ctx: &RequestContext,
        session_id: &str,
    ) -> Result<SessionRecord, RouterError> {
        let session = self
            .sessions
            .validate_and_refresh(session_id)
            .await
            .ok_or_else(|| RouterError::InvalidSession("unknown or expired session".into()))?;
        if let Some(origin) = ctx.trusted_origin() {
            if origin != session.origin {
                warn!(session_id, origin, "session origin mismatch");
                return Err(RouterError::InvalidSession("origin mismatch".into()));
            }
        }
        Ok(session)
    }

    /// Permission-check one call, park it if policy says `Ask`, then
    /// forward it through the chain's proxy.
    async fn execute_call(
        &self,
        session: &SessionRecord,
        chain: &ChainId,
        proxy: &Arc<Proxy>,
        call: &MethodCall,
        request_id: &RequestId,
    ) -> Result<Value, RouterError> {
        match self
            .permissions
            .check_permission(session, chain, &call.method)
        {
            PermissionDecision::Allowed => {}
            PermissionDecision::Denied => {
                return Err(RouterError::InsufficientPermissions {
                    reason: "policy_denied".into(),
                })
            }
            PermissionDecision::AskUser => {
                let approval = ApprovalContext::new(
                    request_id.clone(),
                    chain.clone(),
                    &call.method,
                    call.params.clone(),
                    &session.origin,
                );
                match self.approvals.queue(approval, None).await {
                    Ok(true) => {}
                    Ok(false) => {
                        return Err(RouterError::InsufficientPermissions {
                            reason: "user_denied".into(),
                        })
                    }
                    Err(ApprovalError::Timeout(budget)) => {
                        return Err(RouterError::RequestTimeout(format!(
                            "approval timed out after {budget:?}"
                        )))
                    }
                    Err(ApprovalError::Conflict(id)) => {
                        return Err(RouterError::InvalidRequest(format!(
                            "an approval for request {id} is already pending"
                        )))
                    }
                    Err(ApprovalError::Cancelled) => {
                        return Err(RouterError::Unknown {
                            message: "router shut down while awaiting approval".into(),
                            cause: None,
                        })
                    }
                }
            }
        }

        proxy
            .call(&call.method, call.params.clone())
            .await
            .map_err(|e| self.classify_call_error(&call.method, e))
    }

    /// Map a proxy-call failure onto the router taxonomy.
    fn classify_call_error(&self, method: &str, err: CallError) -> RouterError {
        match err {
            CallError::Timeout(budget) => {
                RouterError::RequestTimeout(format!("wallet call timed out after {budget:?}"))
            }
            CallError::Cancelled => RouterError::WalletNotAvailable("wallet connection closed".into()),
            CallError::Transport(e) => RouterError::WalletNotAvailable(e.to_string()),
            CallError::Remote(obj) => RouterError::from_wallet_error(method, obj),
            CallError::Codec(e) => RouterError::Unknown {
                message: e.to_string(),
                cause: None,
            },
        }
    }

    fn proxy_for(&self, chain: &ChainId) -> Result<Arc<Proxy>, RouterError> {
        self.wallets
            .read()
            .get(chain)
            .cloned()
            .ok_or_else(|| RouterError::UnknownChain(chain.to_string()))
    }

    // -- Events -------------------------------------------------------------

    /// Relay a wallet-originated event to the client, tagged with its
    /// chain, if and only if some live session is authorized on it.
    fn relay_wallet_event(self: Arc<Self>, chain: ChainId, event: &'static str, payload: Value) {
        tokio::spawn(async move {
            let sessions = self.sessions.all().await;
            let authorized = sessions.values().any(|s| s.has_chain_access(&chain));
            if !authorized {
                debug!(%chain, event, "dropping wallet event: no authorized session");
                return;
            }
            let envelope = json!({ "chain_id": chain, "data": payload });
            if let Err(e) = self.node.emit(event, envelope).await {
                warn!(error = %e, event, "failed to relay wallet event");
            }
        });
    }

    fn spawn_event(self: &Arc<Self>, event: &'static str, payload: Value) {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = router.node.emit(event, payload).await {
                debug!(error = %e, event, "event emit failed");
            }
        });
    }

    // -- Teardown -----------------------------------------------------------

    /// Shut the router down: cancel every pending approval, cancel every
    /// outstanding outbound call, then release the wallet proxies.
    pub fn close(&self) {
        self.approvals.cleanup_all();
        self.node.close();
        let proxies: Vec<(ChainId, Arc<Proxy>)> = self.wallets.write().drain().collect();
        for (chain, proxy) in proxies {
            debug!(%chain, "releasing wallet proxy");
            proxy.close();
        }
        info!("router closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PolicyPermissionManager;
    use crate::session::MemorySessionStore;
    use crate::transport::LocalTransport;

    fn chain() -> ChainId {
        ChainId::parse("eip155:1").unwrap()
    }

    fn router_with_default_manager() -> (Arc<WalletRouter>, Arc<LocalTransport>) {
        let (dapp_end, router_end) = LocalTransport::pair_with_trusted_origin("https://app.example");
        let router = WalletRouter::new(
            router_end,
            Arc::new(MemorySessionStore::new()),
            Arc::new(PolicyPermissionManager::new()),
        );
        (router, dapp_end)
    }

    #[tokio::test]
    async fn add_wallet_twice_fails() {
        let (router, _dapp) = router_with_default_manager();
        let (near, _far) = LocalTransport::pair();
        router.add_wallet(chain(), near).unwrap();

        let (near2, _far2) = LocalTransport::pair();
        let err = router.add_wallet(chain(), near2).unwrap_err();
        assert!(matches!(err, RouterError::InvalidRequest(_)));
        assert_eq!(router.chains(), vec![chain()]);
    }

    #[tokio::test]
    async fn remove_wallet_requires_presence() {
        let (router, _dapp) = router_with_default_manager();
        let err = router.remove_wallet(&chain()).unwrap_err();
        assert!(matches!(err, RouterError::UnknownChain(_)));

        let (near, _far) = LocalTransport::pair();
        router.add_wallet(chain(), near).unwrap();
        router.remove_wallet(&chain()).unwrap();
        assert!(router.chains().is_empty());
    }

    #[tokio::test]
    async fn revoke_session_deletes_and_reports() {
        let (router, _dapp) = router_with_default_manager();
        let session = SessionRecord::new("https://app.example", Duration::from_secs(60));
        let id = session.session_id.clone();
        router.sessions.set(session).await.unwrap();

        assert!(router.revoke_session(&id).await);
        assert!(!router.revoke_session(&id).await);
    }

    #[tokio::test]
    async fn revoke_all_sessions_counts() {
        let (router, _dapp) = router_with_default_manager();
        for _ in 0..3 {
            router
                .sessions
                .set(SessionRecord::new("https://app.example", Duration::from_secs(60)))
                .await
                .unwrap();
        }
        assert_eq!(router.revoke_all_sessions().await, 3);
        assert_eq!(router.revoke_all_sessions().await, 0);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_clears_wallets() {
        let (router, _dapp) = router_with_default_manager();
        let (near, _far) = LocalTransport::pair();
        router.add_wallet(chain(), near).unwrap();

        router.close();
        router.close();
        assert!(router.chains().is_empty());
        assert_eq!(router.pending_approvals().len(), 0);
    }
}
