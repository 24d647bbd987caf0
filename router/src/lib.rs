// Copyright (c) 2026 WalletMesh Contributors. MIT License.
// See LICENSE for details.

//! # WalletMesh Router — Core Library
//!
//! A multi-chain wallet router: a JSON-RPC intermediary that sits between a
//! decentralized application and one or more per-chain wallet backends. The
//! dApp sees a single wrapped JSON-RPC surface (`wm_*` methods); the router
//! authenticates the session, checks per-method permissions, blocks on user
//! approval where policy demands it, and only then forwards the call to the
//! wallet that owns the chain.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the layers a request passes
//! through on its way from dApp to wallet:
//!
//! - **transport** — The byte-oriented message channel contract, plus an
//!   in-process pair for tests and same-process embedding.
//! - **jsonrpc** — The node substrate: framing, dispatch, correlation,
//!   serializers, middleware, events, timeouts.
//! - **proxy** — A caller-side view of a node: `call(method, params)`.
//! - **chain** — CAIP-2 chain identifiers with per-namespace validation.
//! - **session** — Session records and the pluggable stores (in-memory
//!   and sled-backed) that hold them.
//! - **permissions** — The three-state Allow/Ask/Deny permission model.
//! - **approval** — The rendezvous queue that parks a call until the user
//!   decides.
//! - **router** — Composes all of the above into the `wm_*` method surface.
//! - **error** — The stable error taxonomy dApps branch on.
//! - **config** — Protocol constants and default budgets.
//!
//! ## Design Philosophy
//!
//! 1. The router is protocol-agnostic past chain-id dispatch. It never
//!    interprets wallet method semantics.
//! 2. No wallet keys, ever. Custody lives behind the per-chain backends.
//! 3. Trust flows one way: only a transport-established origin may create
//!    or resume a session. Forwarded context is a hint, not an identity.
//! 4. Every suspension point is cancellable, and shutdown drains them all.

pub mod approval;
pub mod chain;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod permissions;
pub mod proxy;
pub mod router;
pub mod session;
pub mod transport;

pub use approval::{ApprovalContext, ApprovalError, ApprovalQueue, ApprovalState};
pub use chain::{ChainId, ChainIdError};
pub use error::{BulkEntry, BulkError, RouterError};
pub use jsonrpc::{ErrorObject, MethodSerializer, RequestContext, RequestId, RpcNode, ValueCodec};
pub use permissions::{
    GrantRecord, MethodGrant, PermissionManager, PermissionRequest, PermissionState,
    PolicyPermissionManager,
};
pub use proxy::Proxy;
pub use router::{MethodCall, RouterConfig, WalletRouter};
pub use session::{MemorySessionStore, SessionRecord, SessionStore, SledSessionStore};
pub use transport::{LocalTransport, Transport, TransportContext, TransportError};
