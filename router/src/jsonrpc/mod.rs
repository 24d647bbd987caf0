//! # JSON-RPC Substrate
//!
//! The node layer everything else is built on: wire types, the node itself,
//! per-method serializers, and the middleware onion. The router and the
//! provider are both "just" nodes with particular methods registered.

pub mod message;
pub mod middleware;
pub mod node;
pub mod serializer;

pub use message::{ErrorObject, RequestId, RpcMessage, RpcRequest, RpcResponse};
pub use middleware::{Middleware, Next};
pub use node::{CallError, NodeError, RequestContext, RpcNode};
pub use serializer::{CodecError, FnCodec, MethodSerializer, ValueCodec};
