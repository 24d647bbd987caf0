//! Operation builder.
//!
//! A small immutable builder for composing calls against one chain. Each
//! `call` returns a *new* builder with the call appended; the original is
//! untouched, so a partially-built operation can be forked freely.
//! `execute` picks the wire method: `wm_call` for a single call (and the
//! bare result), `wm_bulkCall` for more (and the result array).

use std::time::Duration;

use serde_json::Value;

use walletmesh_router::router::MethodCall;
use walletmesh_router::ChainId;

use crate::{ProviderError, RouterProvider};

/// A chain-scoped sequence of calls, built immutably.
#[derive(Clone)]
pub struct OperationBuilder<'a> {
    provider: &'a RouterProvider,
    chain_id: ChainId,
    calls: Vec<MethodCall>,
}

impl<'a> OperationBuilder<'a> {
    pub(crate) fn new(provider: &'a RouterProvider, chain_id: ChainId) -> Self {
        Self {
            provider,
            chain_id,
            calls: Vec::new(),
        }
    }

    /// A new builder with `method` appended.
    pub fn call(&self, method: &str, params: Option<Value>) -> OperationBuilder<'a> {
        let mut calls = self.calls.clone();
        calls.push(match params {
            Some(params) => MethodCall::with_params(method, params),
            None => MethodCall::new(method),
        });
        OperationBuilder {
            provider: self.provider,
            chain_id: self.chain_id.clone(),
            calls,
        }
    }

    /// How many calls have been appended.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// True if nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Run the operation. One call goes out as `wm_call` and returns its
    /// bare result; several go out as `wm_bulkCall` and return the result
    /// array.
    pub async fn execute(&self, timeout: Option<Duration>) -> Result<Value, ProviderError> {
        match self.calls.as_slice() {
            [] => Err(ProviderError::EmptyOperation),
            [single] => {
                self.provider
                    .call(&self.chain_id, single.clone(), timeout)
                    .await
            }
            _ => self
                .provider
                .bulk_call(&self.chain_id, self.calls.clone(), timeout)
                .await
                .map(Value::Array),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletmesh_router::LocalTransport;

    #[tokio::test]
    async fn builders_are_immutable_values() {
        let (dapp_end, _router_end) = LocalTransport::pair();
        let provider = RouterProvider::new(dapp_end);
        let chain = ChainId::parse("eip155:1").unwrap();

        let base = provider.chain(chain);
        assert!(base.is_empty());

        let one = base.call("eth_chainId", None);
        let two = one.call("eth_blockNumber", None);

        // Appending forked new builders; the originals are unchanged.
        assert_eq!(base.len(), 0);
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);

        // Forking from the same base is independent.
        let other = one.call("eth_accounts", None);
        assert_eq!(one.len(), 1);
        assert_eq!(other.len(), 2);
    }

    #[tokio::test]
    async fn empty_builder_refuses_to_execute() {
        let (dapp_end, _router_end) = LocalTransport::pair();
        let provider = RouterProvider::new(dapp_end);
        let chain = ChainId::parse("eip155:1").unwrap();

        let err = provider.chain(chain).execute(None).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyOperation));
    }
}
