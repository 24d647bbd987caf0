//! # Request Middleware
//!
//! Middleware wraps request dispatch in an onion: each layer receives the
//! request and a [`Next`] continuation, and may short-circuit with its own
//! response, mutate the request before passing it on, or inspect the
//! response on the way back out.
//!
//! A node runs two chains. Pre-deserialization middleware sees raw params —
//! the place for origin checks and rate limiting that must not depend on
//! decoding attacker-controlled data. Post-deserialization middleware runs
//! after the method's params serializer and sees the decoded shape.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::message::{RpcRequest, RpcResponse};

/// The function at the center of the onion: actual dispatch.
pub(crate) type Terminal = dyn Fn(RpcRequest) -> BoxFuture<'static, RpcResponse> + Send + Sync;

/// One layer of the request-processing onion.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process `request`. Call `next.run(request)` to continue down the
    /// chain, or return a response directly to short-circuit.
    async fn handle(&self, request: RpcRequest, next: Next<'_>) -> RpcResponse;
}

/// The remainder of the chain, ending at dispatch.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    terminal: &'a Terminal,
}

impl<'a> Next<'a> {
    pub(crate) fn new(rest: &'a [Arc<dyn Middleware>], terminal: &'a Terminal) -> Self {
        Self { rest, terminal }
    }

    /// Run the rest of the chain with `request`.
    pub async fn run(self, request: RpcRequest) -> RpcResponse {
        match self.rest.split_first() {
            Some((layer, rest)) => {
                let next = Next {
                    rest,
                    terminal: self.terminal,
                };
                layer.handle(request, next).await
            }
            None => (self.terminal)(request).await,
        }
    }
}
