//! In-process transport pair.
//!
//! Two [`LocalTransport`]s wired back-to-back form a lossless channel
//! between two nodes in the same process: what one end sends, the other
//! end's handler receives, with no serialization beyond the JSON the nodes
//! already produce. Useful as the test harness for everything above it,
//! and as the real channel when router and wallet share a process.
//!
//! Context handling follows the forwarding rule: an endpoint configured to
//! forward context embeds its last *inbound* context into outbound request
//! frames under the `_context` key, downgraded to `trusted_source = false`.
//! A trusted context is only ever produced by the endpoint configured with
//! one at construction time.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use super::{MessageHandler, Transport, TransportContext, TransportError};

/// One endpoint of an in-process transport pair.
pub struct LocalTransport {
    /// The other endpoint. Weak so that dropping one side tears down the
    /// channel instead of leaking a cycle.
    peer: Mutex<Option<Weak<LocalTransport>>>,
    handler: RwLock<Option<MessageHandler>>,
    /// Context stamped on every message delivered *into* this endpoint.
    inbound_context: Option<TransportContext>,
    /// Whether outbound requests embed this endpoint's last inbound
    /// context (downgraded) under `_context`.
    forward_context: bool,
    /// Guarded together: `last_context` is set immediately before the
    /// handler runs, and the delivery lock keeps the two from tearing
    /// under concurrent sends.
    last_context: Mutex<Option<TransportContext>>,
    delivery: Mutex<()>,
}

impl LocalTransport {
    /// A plain pair: no origin authentication, no context forwarding.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        Self::build(None, false)
    }

    /// A pair where the *second* endpoint authenticates every inbound
    /// message as coming from `origin`. This models a server-side channel
    /// whose far end is a verified dApp: the first endpoint belongs to the
    /// dApp, the second to the router.
    pub fn pair_with_trusted_origin(origin: impl Into<String>) -> (Arc<Self>, Arc<Self>) {
        Self::build(Some(TransportContext::trusted(origin)), false)
    }

    /// A pair whose endpoints forward their last inbound context into
    /// outbound requests, downgraded. This is the bridge configuration:
    /// trust never survives the hop.
    pub fn forwarding_pair() -> (Arc<Self>, Arc<Self>) {
        Self::build(None, true)
    }

    fn build(
        second_inbound: Option<TransportContext>,
        forward_context: bool,
    ) -> (Arc<Self>, Arc<Self>) {
        let a = Arc::new(Self::endpoint(None, forward_context));
        let b = Arc::new(Self::endpoint(second_inbound, forward_context));
        *a.peer.lock() = Some(Arc::downgrade(&b));
        *b.peer.lock() = Some(Arc::downgrade(&a));
        (a, b)
    }

    fn endpoint(inbound_context: Option<TransportContext>, forward_context: bool) -> Self {
        Self {
            peer: Mutex::new(None),
            handler: RwLock::new(None),
            inbound_context,
            forward_context,
            last_context: Mutex::new(None),
            delivery: Mutex::new(()),
        }
    }

    /// Deliver a message into this endpoint: stamp the context, then hand
    /// the bytes to the registered handler.
    fn deliver(&self, message: Bytes, embedded: Option<TransportContext>) {
        let _guard = self.delivery.lock();
        // The transport-established context wins over anything embedded in
        // the frame; embedded context is already downgraded by the sender.
        *self.last_context.lock() = self.inbound_context.clone().or(embedded);
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler(message),
            None => warn!("local transport dropped a message: no handler registered"),
        }
    }

    /// Embed `ctx` (downgraded) into a request frame. Frames that are not
    /// JSON objects pass through untouched.
    fn embed_context(message: &Bytes, ctx: &TransportContext) -> Bytes {
        match serde_json::from_slice::<Value>(message) {
            Ok(Value::Object(mut obj)) => {
                obj.insert(
                    "_context".to_string(),
                    serde_json::to_value(ctx.downgraded()).unwrap_or(Value::Null),
                );
                match serde_json::to_vec(&Value::Object(obj)) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(_) => message.clone(),
                }
            }
            _ => message.clone(),
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, message: Bytes) -> Result<(), TransportError> {
        let peer = self
            .peer
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(TransportError::Closed)?;

        let (message, embedded) = if self.forward_context {
            match self.last_context.lock().clone() {
                Some(ctx) => {
                    debug!(origin = %ctx.origin, "forwarding downgraded context");
                    (Self::embed_context(&message, &ctx), Some(ctx.downgraded()))
                }
                None => (message, None),
            }
        } else {
            (message, None)
        };

        peer.deliver(message, embedded);
        Ok(())
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.handler.write() = Some(handler);
    }

    fn last_message_context(&self) -> Option<TransportContext> {
        self.last_context.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collect_into(transport: &Arc<LocalTransport>) -> Arc<Mutex<Vec<Bytes>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        transport.on_message(Arc::new(move |bytes| sink.lock().push(bytes)));
        seen
    }

    #[tokio::test]
    async fn messages_cross_the_pair() {
        let (a, b) = LocalTransport::pair();
        let seen_b = collect_into(&b);

        a.send(Bytes::from_static(b"{\"x\":1}")).await.unwrap();

        let seen = seen_b.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(&seen[0][..], b"{\"x\":1}");
    }

    #[tokio::test]
    async fn trusted_origin_is_stamped_on_the_router_side() {
        let (dapp, router) = LocalTransport::pair_with_trusted_origin("https://app.example");
        let _seen = collect_into(&router);

        dapp.send(Bytes::from_static(b"{}")).await.unwrap();

        let ctx = router.last_message_context().expect("context");
        assert_eq!(ctx.origin, "https://app.example");
        assert!(ctx.trusted_source);

        // The dApp side saw nothing; it never authenticated anyone.
        assert!(dapp.last_message_context().is_none());
    }

    #[tokio::test]
    async fn forwarded_context_is_downgraded() {
        let (a, b) = LocalTransport::forwarding_pair();
        let _seen = collect_into(&b);
        let _seen_a = collect_into(&a);

        // Seed endpoint `a` with a trusted inbound context, as if an
        // upstream transport had authenticated the sender.
        *a.last_context.lock() = Some(TransportContext::trusted("https://app.example"));

        a.send(Bytes::from_static(b"{\"jsonrpc\":\"2.0\",\"method\":\"m\",\"id\":1}"))
            .await
            .unwrap();

        let ctx = b.last_message_context().expect("context");
        assert_eq!(ctx.origin, "https://app.example");
        assert!(!ctx.trusted_source, "forwarded trust must not survive");
    }

    #[tokio::test]
    async fn forwarding_embeds_context_into_the_frame() {
        let (a, b) = LocalTransport::forwarding_pair();
        let seen_b = collect_into(&b);
        *a.last_context.lock() = Some(TransportContext::trusted("https://app.example"));

        a.send(Bytes::from_static(b"{\"jsonrpc\":\"2.0\",\"method\":\"m\",\"id\":1}"))
            .await
            .unwrap();

        let frame: Value = serde_json::from_slice(&seen_b.lock()[0]).unwrap();
        assert_eq!(frame["_context"]["origin"], "https://app.example");
        assert_eq!(frame["_context"]["trusted_source"], false);
    }

    #[tokio::test]
    async fn send_after_peer_dropped_fails_closed() {
        let (a, b) = LocalTransport::pair();
        drop(b);
        let err = a.send(Bytes::from_static(b"{}")).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn missing_handler_drops_without_panicking() {
        let (a, _b) = LocalTransport::pair();
        // `_b` has no handler; the message is dropped with a warning.
        a.send(Bytes::from_static(b"{}")).await.unwrap();
    }

    #[tokio::test]
    async fn replacing_the_handler_takes_effect() {
        let (a, b) = LocalTransport::pair();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let n = Arc::clone(&first);
        b.on_message(Arc::new(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        }));
        a.send(Bytes::from_static(b"{}")).await.unwrap();

        let n = Arc::clone(&second);
        b.on_message(Arc::new(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        }));
        a.send(Bytes::from_static(b"{}")).await.unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
