// Copyright (c) 2026 WalletMesh Contributors. MIT License.
// See LICENSE for details.

//! # WalletMesh Provider
//!
//! The dApp-side counterpart of the wallet router. One JSON-RPC node on the
//! same transport the router listens to, wrapped in a typed surface:
//! `connect`, `call`, `bulk_call`, the permission operations, and the
//! `chain(...).call(...).execute()` builder for composing multi-call
//! operations.
//!
//! The provider also owns the client half of the error contract: wire
//! errors come back as [`RouterError`] values with stable kinds, so dApp
//! code can match on `InsufficientPermissions` instead of grepping message
//! strings.
//!
//! ## Typed wallet methods
//!
//! [`RouterProvider::register_method_serializer`] attaches a codec to a
//! wallet method name. The codec is applied to the *inner* call params and
//! result of `wm_call` / `wm_bulkCall` entries for that method — the router
//! in the middle never needs to know the type exists.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use walletmesh_router::config;
use walletmesh_router::jsonrpc::{CallError, CodecError, MethodSerializer, RpcNode};
use walletmesh_router::session::PermissionMap;
use walletmesh_router::{ChainId, GrantRecord, PermissionRequest, RouterError, Transport};

mod builder;

pub use builder::OperationBuilder;
pub use walletmesh_router::router::MethodCall;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything a provider call can fail with.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No session yet; `connect` (or `with_session`) first.
    #[error("not connected: no active session")]
    NotConnected,

    /// The router answered with a typed error.
    #[error(transparent)]
    Router(RouterError),

    /// The call never produced a router answer (transport loss, timeout,
    /// local shutdown).
    #[error("call failed: {0}")]
    Call(CallError),

    /// A registered method serializer rejected a value.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The router answered with a shape this client does not understand.
    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),

    /// `execute()` on a builder with no calls.
    #[error("operation has no calls")]
    EmptyOperation,
}

impl ProviderError {
    fn from_call_error(err: CallError) -> Self {
        match err {
            CallError::Remote(obj) => ProviderError::Router(RouterError::from_error_object(&obj)),
            other => ProviderError::Call(other),
        }
    }

    /// The router error inside, if this is one. The branch-on-kind helper
    /// for dApp code.
    pub fn as_router_error(&self) -> Option<&RouterError> {
        match self {
            ProviderError::Router(err) => Some(err),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Response Shapes
// ---------------------------------------------------------------------------

/// What `connect` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResult {
    /// The new session's id. The provider stores it and injects it into
    /// subsequent calls.
    pub session_id: String,
    /// What was granted, human-readable.
    pub permissions: GrantRecord,
}

/// What `reconnect` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectResult {
    /// Whether the session was accepted.
    pub status: bool,
    /// The stored permission table.
    pub permissions: PermissionMap,
}

/// What `get_supported_methods` returns: the router's own surface, or a
/// per-chain map.
#[derive(Debug, Clone, PartialEq)]
pub enum SupportedMethods {
    /// The router's registered method names.
    Router(Vec<String>),
    /// Methods per queried chain.
    Chains(HashMap<ChainId, Vec<String>>),
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// The client-side handle to a wallet router.
pub struct RouterProvider {
    node: Arc<RpcNode>,
    session_id: RwLock<Option<String>>,
    serializers: RwLock<HashMap<String, MethodSerializer>>,
    default_timeout: Duration,
}

impl RouterProvider {
    /// A provider on `transport` with no session yet.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            node: RpcNode::new(transport),
            session_id: RwLock::new(None),
            serializers: RwLock::new(HashMap::new()),
            default_timeout: config::DEFAULT_CALL_TIMEOUT,
        }
    }

    /// A provider resuming a persisted session. Pair with `reconnect` to
    /// verify the session is still live.
    pub fn with_session(transport: Arc<dyn Transport>, session_id: impl Into<String>) -> Self {
        let provider = Self::new(transport);
        *provider.session_id.write() = Some(session_id.into());
        provider
    }

    /// The active session id, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Subscribe to one of the router events (`wm_*`).
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.node.on(event, handler);
    }

    /// Attach a codec to a wallet method. Applied to the inner call params
    /// and result of `wm_call` / `wm_bulkCall` entries for that method.
    pub fn register_method_serializer(&self, method: &str, serializer: MethodSerializer) {
        self.serializers.write().insert(method.to_string(), serializer);
    }

    /// Start building a (possibly multi-call) operation on `chain_id`.
    pub fn chain(&self, chain_id: ChainId) -> OperationBuilder<'_> {
        OperationBuilder::new(self, chain_id)
    }

    // -- Session lifecycle --------------------------------------------------

    /// Request a session with the given permissions. On success the
    /// session id is stored for subsequent calls.
    pub async fn connect(
        &self,
        permissions: PermissionRequest,
        timeout: Option<Duration>,
    ) -> Result<ConnectResult, ProviderError> {
        let result = self
            .request(
                config::METHOD_CONNECT,
                json!({ "permissions": permissions }),
                timeout,
            )
            .await?;
        let parsed: ConnectResult = serde_json::from_value(result)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        debug!(session_id = %parsed.session_id, "connected");
        *self.session_id.write() = Some(parsed.session_id.clone());
        Ok(parsed)
    }

    /// Resume a persisted session. On success the id becomes the active
    /// session.
    pub async fn reconnect(
        &self,
        session_id: &str,
        timeout: Option<Duration>,
    ) -> Result<ReconnectResult, ProviderError> {
        let result = self
            .request(
                config::METHOD_RECONNECT,
                json!({ "session_id": session_id }),
                timeout,
            )
            .await?;
        let parsed: ReconnectResult = serde_json::from_value(result)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        *self.session_id.write() = Some(session_id.to_string());
        Ok(parsed)
    }

    /// Tear down the active session.
    pub async fn disconnect(&self, timeout: Option<Duration>) -> Result<(), ProviderError> {
        let session_id = self.require_session()?;
        self.request(
            config::METHOD_DISCONNECT,
            json!({ "session_id": session_id }),
            timeout,
        )
        .await?;
        *self.session_id.write() = None;
        Ok(())
    }

    // -- Permissions --------------------------------------------------------

    /// The stored permissions of the active session, optionally filtered
    /// by chain.
    pub async fn get_permissions(
        &self,
        chain_ids: Option<Vec<ChainId>>,
        timeout: Option<Duration>,
    ) -> Result<PermissionMap, ProviderError> {
        let session_id = self.require_session()?;
        let mut params = json!({ "session_id": session_id });
        if let Some(chains) = chain_ids {
            params["chain_ids"] = json!(chains);
        }
        let result = self
            .request(config::METHOD_GET_PERMISSIONS, params, timeout)
            .await?;
        serde_json::from_value(result).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    /// Request additional permissions for the active session.
    pub async fn update_permissions(
        &self,
        permissions: PermissionRequest,
        timeout: Option<Duration>,
    ) -> Result<GrantRecord, ProviderError> {
        let session_id = self.require_session()?;
        let result = self
            .request(
                config::METHOD_UPDATE_PERMISSIONS,
                json!({ "session_id": session_id, "permissions": permissions }),
                timeout,
            )
            .await?;
        serde_json::from_value(result).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    // -- Calls --------------------------------------------------------------

    /// Invoke one wallet method on `chain_id` through the router.
    pub async fn call(
        &self,
        chain_id: &ChainId,
        call: MethodCall,
        timeout: Option<Duration>,
    ) -> Result<Value, ProviderError> {
        let session_id = self.require_session()?;
        let method = call.method.clone();
        let call = self.encode_call(call)?;
        let result = self
            .request(
                config::METHOD_CALL,
                json!({ "session_id": session_id, "chain_id": chain_id, "call": call }),
                timeout,
            )
            .await?;
        self.decode_result(&method, result)
    }

    /// Invoke a sequence of wallet methods on `chain_id`. The router runs
    /// them in order; a partial failure surfaces as
    /// [`RouterError::PartialFailure`] with slot-aligned results.
    pub async fn bulk_call(
        &self,
        chain_id: &ChainId,
        calls: Vec<MethodCall>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Value>, ProviderError> {
        let session_id = self.require_session()?;
        let methods: Vec<String> = calls.iter().map(|c| c.method.clone()).collect();
        let calls: Vec<MethodCall> = calls
            .into_iter()
            .map(|call| self.encode_call(call))
            .collect::<Result<_, _>>()?;
        let result = self
            .request(
                config::METHOD_BULK_CALL,
                json!({ "session_id": session_id, "chain_id": chain_id, "calls": calls }),
                timeout,
            )
            .await?;
        let values: Vec<Value> = serde_json::from_value(result)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        if values.len() != methods.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "bulk result has {} slots for {} calls",
                values.len(),
                methods.len()
            )));
        }
        methods
            .iter()
            .zip(values)
            .map(|(method, value)| self.decode_result(method, value))
            .collect()
    }

    /// The router's method surface, or per-chain wallet capabilities.
    pub async fn get_supported_methods(
        &self,
        chain_ids: Option<Vec<ChainId>>,
        timeout: Option<Duration>,
    ) -> Result<SupportedMethods, ProviderError> {
        match chain_ids {
            None => {
                let result = self
                    .request(config::METHOD_GET_SUPPORTED_METHODS, json!({}), timeout)
                    .await?;
                let methods: Vec<String> = serde_json::from_value(result)
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
                Ok(SupportedMethods::Router(methods))
            }
            Some(chains) => {
                let result = self
                    .request(
                        config::METHOD_GET_SUPPORTED_METHODS,
                        json!({ "chain_ids": chains }),
                        timeout,
                    )
                    .await?;
                let map: HashMap<ChainId, Vec<String>> = serde_json::from_value(result)
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
                Ok(SupportedMethods::Chains(map))
            }
        }
    }

    /// Close the provider, cancelling in-flight calls.
    pub fn close(&self) {
        self.node.close();
    }

    // -- Internals ----------------------------------------------------------

    fn require_session(&self) -> Result<String, ProviderError> {
        self.session_id.read().clone().ok_or(ProviderError::NotConnected)
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ProviderError> {
        self.node
            .call_method(method, Some(params), timeout.or(Some(self.default_timeout)))
            .await
            .map_err(ProviderError::from_call_error)
    }

    fn encode_call(&self, mut call: MethodCall) -> Result<MethodCall, ProviderError> {
        if let Some(serializer) = self.serializers.read().get(&call.method).cloned() {
            call.params = serializer.encode_params(call.params)?;
        }
        Ok(call)
    }

    fn decode_result(&self, method: &str, result: Value) -> Result<Value, ProviderError> {
        match self.serializers.read().get(method).cloned() {
            Some(serializer) => Ok(serializer.decode_result(result)?),
            None => Ok(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletmesh_router::LocalTransport;

    #[tokio::test]
    async fn calls_without_a_session_fail_fast() {
        let (dapp_end, _router_end) = LocalTransport::pair();
        let provider = RouterProvider::new(dapp_end);
        let chain = ChainId::parse("eip155:1").unwrap();

        let err = provider
            .call(&chain, MethodCall::new("eth_accounts"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConnected));

        let err = provider.disconnect(None).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConnected));
    }

    #[tokio::test]
    async fn with_session_seeds_the_id() {
        let (dapp_end, _router_end) = LocalTransport::pair();
        let provider = RouterProvider::with_session(dapp_end, "session_persisted");
        assert_eq!(provider.session_id().as_deref(), Some("session_persisted"));
    }
}
