//! # Proxy
//!
//! A node seen from the caller side. The router holds one proxy per chain
//! and forwards validated calls through it; all it needs is
//! `call(method, params) -> result`, with serializer awareness handled by
//! the node underneath. Keeping the wallet-facing surface this thin is
//! what keeps the router protocol-agnostic.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config;
use crate::jsonrpc::{CallError, MethodSerializer, RpcNode};
use crate::transport::Transport;

/// Caller-side view of a JSON-RPC node.
pub struct Proxy {
    node: Arc<RpcNode>,
}

impl Proxy {
    /// Wrap an existing node.
    pub fn new(node: Arc<RpcNode>) -> Self {
        Self { node }
    }

    /// Create a node on `transport` and wrap it. The usual way the router
    /// attaches a wallet backend.
    pub fn connect(transport: Arc<dyn Transport>) -> Self {
        Self::new(RpcNode::new(transport))
    }

    /// Call a method on the far side with the node's default timeout.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CallError> {
        self.node.call_method(method, params, None).await
    }

    /// Call with an explicit timeout.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        self.node.call_method(method, params, Some(timeout)).await
    }

    /// Ask the far side which methods it implements, via the capability
    /// endpoint every node answers from its registry.
    pub async fn supported_methods(&self) -> Result<Vec<String>, CallError> {
        let value = self.call(config::CAPABILITY_METHOD, None).await?;
        serde_json::from_value(value).map_err(|e| {
            CallError::Remote(crate::jsonrpc::ErrorObject::internal_error(format!(
                "capability endpoint returned a non-list: {e}"
            )))
        })
    }

    /// Register a serializer for a method called through this proxy.
    pub fn register_serializer(&self, method: &str, serializer: MethodSerializer) {
        self.node.register_serializer(method, serializer);
    }

    /// The node underneath, for event subscription.
    pub fn node(&self) -> &Arc<RpcNode> {
        &self.node
    }

    /// Close the underlying node, cancelling in-flight calls.
    pub fn close(&self) {
        self.node.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;
    use serde_json::json;

    #[tokio::test]
    async fn proxy_calls_cross_the_transport() {
        let (near, far) = LocalTransport::pair();
        let wallet = RpcNode::new(far);
        wallet
            .register_method("eth_accounts", |_ctx, _p| async { Ok(json!(["0xabc"])) })
            .unwrap();

        let proxy = Proxy::connect(near);
        let result = proxy.call("eth_accounts", None).await.unwrap();
        assert_eq!(result, json!(["0xabc"]));
    }

    #[tokio::test]
    async fn supported_methods_queries_the_capability_endpoint() {
        let (near, far) = LocalTransport::pair();
        let wallet = RpcNode::new(far);
        wallet
            .register_method("eth_accounts", |_ctx, _p| async { Ok(json!([])) })
            .unwrap();
        wallet
            .register_method("eth_sendTransaction", |_ctx, _p| async { Ok(json!("0x0")) })
            .unwrap();

        let proxy = Proxy::connect(near);
        let methods = proxy.supported_methods().await.unwrap();
        assert_eq!(methods, vec!["eth_accounts", "eth_sendTransaction"]);
    }

    #[tokio::test]
    async fn closed_proxy_cancels_calls() {
        let (near, _far) = LocalTransport::pair();
        let proxy = Proxy::connect(near);
        proxy.close();
        let err = proxy.call("anything", None).await.unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
    }
}
