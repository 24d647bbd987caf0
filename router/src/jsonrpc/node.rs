//! # JSON-RPC Node
//!
//! One endpoint of a JSON-RPC 2.0 conversation. A node owns a transport and
//! does everything between raw bytes and registered handlers:
//!
//! - **Framing** — parse and validate inbound frames, reject bad versions.
//! - **Dispatch** — route requests through the middleware onion, the params
//!   serializer, and into the registered handler (or the fallback).
//! - **Correlation** — match inbound responses to outstanding calls by id.
//! - **Events** — deliver inbound notifications to subscribers, emit
//!   outbound ones.
//! - **Timeouts** — every outbound call carries a deadline; a late response
//!   for a timed-out id is discarded.
//!
//! Each inbound request is handled on its own task, so a handler that parks
//! itself (say, waiting for a user approval) never blocks the rest of the
//! conversation. Responses are matched by id, not by order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::config;
use crate::transport::{Transport, TransportError};

use super::message::{ErrorObject, RequestId, RpcMessage, RpcRequest, RpcResponse};
use super::middleware::{Middleware, Next, Terminal};
use super::serializer::{CodecError, MethodSerializer};

// ---------------------------------------------------------------------------
// Handler Types
// ---------------------------------------------------------------------------

/// Context handed to every method handler.
///
/// The origin and trust flag are resolved from the transport before the
/// handler runs: a transport-established context wins outright, and a
/// context embedded in the frame arrives with trust already stripped.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The sender's origin, if any context reached us.
    pub origin: Option<String>,
    /// True only if the transport itself authenticated the origin.
    pub trusted: bool,
    /// The request id, absent for notifications.
    pub id: Option<RequestId>,
}

impl RequestContext {
    fn from_request(request: &RpcRequest) -> Self {
        Self {
            origin: request.context.as_ref().map(|c| c.origin.clone()),
            trusted: request
                .context
                .as_ref()
                .map(|c| c.trusted_source)
                .unwrap_or(false),
            id: request.id.clone(),
        }
    }

    /// The origin, but only when the transport vouched for it. This is the
    /// only accessor security decisions may use.
    pub fn trusted_origin(&self) -> Option<&str> {
        if self.trusted {
            self.origin.as_deref()
        } else {
            None
        }
    }
}

/// A registered method handler.
pub type MethodHandler = Arc<
    dyn Fn(RequestContext, Option<Value>) -> BoxFuture<'static, Result<Value, ErrorObject>>
        + Send
        + Sync,
>;

/// The catch-all handler, invoked with the method name when nothing in the
/// registry matches.
pub type FallbackHandler = Arc<
    dyn Fn(RequestContext, String, Option<Value>) -> BoxFuture<'static, Result<Value, ErrorObject>>
        + Send
        + Sync,
>;

/// Subscriber for inbound notifications.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Registration-time errors. Both are programmer errors, surfaced as
/// results so the caller decides how loudly to fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The method name is already taken on this node.
    #[error("method already registered: {0}")]
    DuplicateMethod(String),

    /// The method name lives in the reserved `wm_` namespace.
    #[error("method name is reserved: {0}")]
    ReservedNamespace(String),
}

/// Failures of an outbound [`RpcNode::call_method`].
#[derive(Debug, Error)]
pub enum CallError {
    /// No response arrived within the deadline.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The node was closed while the call was in flight.
    #[error("call cancelled")]
    Cancelled,

    /// The transport refused the outbound frame.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer answered with an error.
    #[error("remote error: {0}")]
    Remote(ErrorObject),

    /// A registered serializer rejected the value.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

struct PendingCall {
    tx: oneshot::Sender<Result<Value, ErrorObject>>,
    method: String,
}

/// A JSON-RPC node bound to one transport.
pub struct RpcNode {
    transport: Arc<dyn Transport>,
    methods: RwLock<HashMap<String, MethodHandler>>,
    fallback: RwLock<Option<FallbackHandler>>,
    serializers: RwLock<HashMap<String, MethodSerializer>>,
    pre_middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    post_middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    event_handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    default_timeout: Duration,
}

impl RpcNode {
    /// Create a node on `transport` with the default call timeout.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::with_timeout(transport, config::DEFAULT_CALL_TIMEOUT)
    }

    /// Create a node with an explicit default call timeout.
    pub fn with_timeout(transport: Arc<dyn Transport>, default_timeout: Duration) -> Arc<Self> {
        let node = Arc::new(Self {
            transport,
            methods: RwLock::new(HashMap::new()),
            fallback: RwLock::new(None),
            serializers: RwLock::new(HashMap::new()),
            pre_middleware: RwLock::new(Vec::new()),
            post_middleware: RwLock::new(Vec::new()),
            event_handlers: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            default_timeout,
        });
        let weak = Arc::downgrade(&node);
        node.transport.on_message(Arc::new(move |bytes: Bytes| {
            if let Some(node) = weak.upgrade() {
                node.receive_message(&bytes);
            }
        }));
        node
    }

    // -- Registration -------------------------------------------------------

    /// Register a handler for `name`. Fails on duplicates and on names in
    /// the reserved `wm_` namespace, which only the router itself may claim.
    pub fn register_method<F, Fut>(&self, name: &str, handler: F) -> Result<(), NodeError>
    where
        F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorObject>> + Send + 'static,
    {
        if config::is_reserved_method(name) {
            return Err(NodeError::ReservedNamespace(name.to_string()));
        }
        self.insert_method(name, Arc::new(move |ctx, params| Box::pin(handler(ctx, params))))
    }

    /// Router-internal registration that may claim reserved names.
    pub(crate) fn register_reserved_method<F, Fut>(
        &self,
        name: &str,
        handler: F,
    ) -> Result<(), NodeError>
    where
        F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorObject>> + Send + 'static,
    {
        self.insert_method(name, Arc::new(move |ctx, params| Box::pin(handler(ctx, params))))
    }

    fn insert_method(&self, name: &str, handler: MethodHandler) -> Result<(), NodeError> {
        let mut methods = self.methods.write();
        if methods.contains_key(name) {
            return Err(NodeError::DuplicateMethod(name.to_string()));
        }
        methods.insert(name.to_string(), handler);
        Ok(())
    }

    /// Install the handler used when no registered method matches. It
    /// receives the method name alongside the params.
    pub fn set_fallback_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(RequestContext, String, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorObject>> + Send + 'static,
    {
        *self.fallback.write() = Some(Arc::new(move |ctx, method, params| {
            Box::pin(handler(ctx, method, params))
        }));
    }

    /// Register a serializer for `method`. Replaces any existing one.
    pub fn register_serializer(&self, method: &str, serializer: MethodSerializer) {
        self.serializers.write().insert(method.to_string(), serializer);
    }

    /// Append a pre-deserialization middleware layer. Runs on raw params.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.pre_middleware.write().push(middleware);
    }

    /// Append a post-deserialization middleware layer. Runs after the
    /// params serializer has decoded the request.
    pub fn add_post_deserialization_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.post_middleware.write().push(middleware);
    }

    /// Subscribe to inbound notifications named `event`.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.event_handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// The names of all registered methods, sorted.
    pub fn registered_methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.read().keys().cloned().collect();
        names.sort();
        names
    }

    // -- Outbound -----------------------------------------------------------

    /// Call a method on the peer and await its response.
    ///
    /// Assigns a fresh id, applies any registered params serializer, sends,
    /// and suspends until the response, the timeout, or [`RpcNode::close`].
    /// A response that arrives after the timeout is silently discarded.
    pub async fn call_method(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, CallError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CallError::Cancelled);
        }

        let serializer = self.serializers.read().get(method).cloned();
        let params = match &serializer {
            Some(ser) => ser.encode_params(params)?,
            None => params,
        };

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id.clone(),
            PendingCall {
                tx,
                method: method.to_string(),
            },
        );

        let request = RpcRequest::new(id.clone(), method, params);
        let frame = match serde_json::to_vec(&request) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                self.pending.lock().remove(&id);
                return Err(CallError::Transport(TransportError::SendFailed(e.to_string())));
            }
        };
        if let Err(e) = self.transport.send(frame).await {
            self.pending.lock().remove(&id);
            return Err(e.into());
        }

        let budget = timeout.unwrap_or(self.default_timeout);
        match tokio::time::timeout(budget, rx).await {
            Ok(Ok(outcome)) => outcome.map_err(CallError::Remote),
            Ok(Err(_)) => Err(CallError::Cancelled),
            Err(_) => {
                self.pending.lock().remove(&id);
                trace!(%id, method, "call timed out; late responses will be dropped");
                Err(CallError::Timeout(budget))
            }
        }
    }

    /// Emit a notification to the peer. Fire-and-forget.
    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        let note = RpcRequest::notification(event, Some(payload));
        let frame =
            serde_json::to_vec(&note).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.transport.send(Bytes::from(frame)).await
    }

    // -- Inbound ------------------------------------------------------------

    /// Entry point for the transport: parse one inbound frame and route it.
    ///
    /// Requests are dispatched on their own task; responses resolve the
    /// matching pending call; notifications go to event subscribers,
    /// synchronously and in arrival order.
    pub fn receive_message(self: &Arc<Self>, raw: &[u8]) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match RpcMessage::parse(raw) {
            Ok(RpcMessage::Request(mut request)) => {
                self.resolve_context(&mut request);
                if request.is_notification() {
                    self.dispatch_event(request);
                } else {
                    let node = Arc::clone(self);
                    tokio::spawn(async move {
                        let response = Arc::clone(&node).process_request(request).await;
                        node.send_response(response).await;
                    });
                }
            }
            Ok(RpcMessage::Response(response)) => self.resolve_pending(response),
            Err(error) => self.reject_frame(raw, error),
        }
    }

    /// Overwrite the frame's context field with the resolved one: the
    /// transport's own context wins; an embedded context survives only with
    /// its trust stripped.
    fn resolve_context(&self, request: &mut RpcRequest) {
        request.context = match self.transport.last_message_context() {
            Some(ctx) => Some(ctx),
            None => request.context.take().map(|c| c.downgraded()),
        };
    }

    async fn process_request(self: Arc<Self>, request: RpcRequest) -> RpcResponse {
        let pre = self.pre_middleware.read().clone();
        let node = Arc::clone(&self);
        let terminal: Box<Terminal> = Box::new(move |request| {
            let node = Arc::clone(&node);
            Box::pin(async move { node.deserialize_then_dispatch(request).await })
        });
        Next::new(&pre, &*terminal).run(request).await
    }

    /// The pre-chain terminal: decode params, then run the post chain.
    async fn deserialize_then_dispatch(self: Arc<Self>, mut request: RpcRequest) -> RpcResponse {
        let id = request.id.clone().unwrap_or(RequestId::Number(0));
        if let Some(serializer) = self.serializers.read().get(&request.method).cloned() {
            match serializer.decode_params(request.params.take()) {
                Ok(params) => request.params = params,
                Err(e) => {
                    return RpcResponse::failure(id, ErrorObject::invalid_params(e.to_string()))
                }
            }
        }

        let post = self.post_middleware.read().clone();
        let node = Arc::clone(&self);
        let terminal: Box<Terminal> = Box::new(move |request| {
            let node = Arc::clone(&node);
            Box::pin(async move { node.dispatch(request).await })
        });
        Next::new(&post, &*terminal).run(request).await
    }

    async fn dispatch(self: Arc<Self>, request: RpcRequest) -> RpcResponse {
        let id = request.id.clone().unwrap_or(RequestId::Number(0));
        let ctx = RequestContext::from_request(&request);
        let method = request.method.clone();

        let handler = self.methods.read().get(&method).cloned();
        let outcome = match handler {
            Some(handler) => handler(ctx, request.params).await,
            // Built-in capability listing, unless the embedder registered
            // an explicit handler for it.
            None if method == config::CAPABILITY_METHOD => Ok(json!(self.registered_methods())),
            None => {
                let fallback = self.fallback.read().clone();
                match fallback {
                    Some(fallback) => fallback(ctx, method.clone(), request.params).await,
                    None => Err(ErrorObject::method_not_found(&method)),
                }
            }
        };

        match outcome {
            Ok(result) => {
                let serializer = self.serializers.read().get(&method).cloned();
                let encoded = match serializer {
                    Some(ser) => ser.encode_result(result),
                    None => Ok(result),
                };
                match encoded {
                    Ok(value) => RpcResponse::success(id, value),
                    Err(e) => RpcResponse::failure(id, ErrorObject::internal_error(e.to_string())),
                }
            }
            Err(error) => RpcResponse::failure(id, error),
        }
    }

    async fn send_response(&self, response: RpcResponse) {
        // In-flight handlers may finish after close; their responses are
        // discarded rather than sent on a dead conversation.
        if self.closed.load(Ordering::SeqCst) {
            trace!(id = %response.id, "discarding response after close");
            return;
        }
        let frame = match serde_json::to_vec(&response) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(error = %e, "failed to serialize response");
                return;
            }
        };
        if let Err(e) = self.transport.send(frame).await {
            // The response is lost; in-flight handler work is not rolled
            // back. The peer's timeout covers this case.
            warn!(error = %e, "failed to send response");
        }
    }

    fn resolve_pending(&self, response: RpcResponse) {
        let entry = self.pending.lock().remove(&response.id);
        let Some(entry) = entry else {
            trace!(id = %response.id, "discarding response with no pending call");
            return;
        };
        let outcome = match response.into_result() {
            Ok(value) => match self.serializers.read().get(&entry.method).cloned() {
                Some(ser) => ser
                    .decode_result(value)
                    .map_err(|e| ErrorObject::internal_error(e.to_string())),
                None => Ok(value),
            },
            Err(error) => Err(error),
        };
        // The caller may have timed out and dropped its receiver.
        let _ = entry.tx.send(outcome);
    }

    fn dispatch_event(&self, request: RpcRequest) {
        let handlers = self.event_handlers.read().get(&request.method).cloned();
        match handlers {
            Some(handlers) if !handlers.is_empty() => {
                let payload = request.params.unwrap_or(Value::Null);
                for handler in handlers {
                    handler(payload.clone());
                }
            }
            _ => debug!(event = %request.method, "dropping notification with no subscribers"),
        }
    }

    /// Best-effort error reply for an unparseable frame: answer only if an
    /// id can still be dug out of the bytes.
    fn reject_frame(self: &Arc<Self>, raw: &[u8], error: ErrorObject) {
        warn!(%error, "rejecting malformed frame");
        let id = serde_json::from_slice::<Value>(raw)
            .ok()
            .and_then(|v| v.get("id").cloned())
            .and_then(|id| serde_json::from_value::<RequestId>(id).ok());
        if let Some(id) = id {
            let node = Arc::clone(self);
            tokio::spawn(async move {
                node.send_response(RpcResponse::failure(id, error)).await;
            });
        }
    }

    // -- Teardown -----------------------------------------------------------

    /// Close the node: reject every pending call with a cancellation and
    /// drop all handler tables. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<(RequestId, PendingCall)> = self.pending.lock().drain().collect();
        for (id, _entry) in &drained {
            trace!(%id, "cancelling pending call on close");
        }
        drop(drained); // dropping the senders wakes the callers with Cancelled
        self.methods.write().clear();
        self.fallback.write().take();
        self.pre_middleware.write().clear();
        self.post_middleware.write().clear();
        self.event_handlers.write().clear();
        debug!("node closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
