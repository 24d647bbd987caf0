//! # Transport Contract
//!
//! A transport is a bidirectional, byte-oriented message channel. The router
//! core never touches a socket, a popup window, or an extension port — it
//! talks to this trait, and the embedding decides what carries the bytes.
//!
//! Two operations and one accessor:
//!
//! - [`Transport::send`] — best-effort delivery of one outbound message.
//! - [`Transport::on_message`] — register the single handler the transport
//!   invokes per inbound message.
//! - [`Transport::last_message_context`] — the [`TransportContext`] of the
//!   most recently delivered inbound message, if the transport established
//!   one.
//!
//! ## Trust
//!
//! `trusted_source = true` means the transport itself authenticated the
//! origin (e.g. a verified browser `postMessage` origin). A forwarded
//! context must always be downgraded to `trusted_source = false`; anything
//! downstream of a forwarding hop may use the origin as a hint but never as
//! an identity. Session creation requires a trusted origin, full stop.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod local;

pub use local::LocalTransport;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-message provenance attached by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportContext {
    /// The identity of the sending party, e.g. `https://app.example`.
    pub origin: String,
    /// Whether this transport itself established the origin. Forwarded
    /// contexts carry `false` and must never satisfy a trust requirement.
    pub trusted_source: bool,
}

impl TransportContext {
    /// A context established by the transport itself.
    pub fn trusted(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            trusted_source: true,
        }
    }

    /// A context that was forwarded or otherwise cannot be verified.
    pub fn untrusted(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            trusted_source: false,
        }
    }

    /// The same origin with trust stripped. Every forwarding hop must apply
    /// this before re-emitting a context.
    pub fn downgraded(&self) -> Self {
        Self {
            origin: self.origin.clone(),
            trusted_source: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel is gone; no further messages can be delivered.
    #[error("transport closed")]
    Closed,

    /// Delivery failed for a transport-specific reason.
    #[error("send failed: {0}")]
    SendFailed(String),
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Handler invoked by the transport for every inbound message.
pub type MessageHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// The abstract message channel the router and its nodes are built on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one message to the peer. Best effort: a returned `Ok` means
    /// the message was handed to the channel, not that the peer saw it.
    async fn send(&self, message: Bytes) -> Result<(), TransportError>;

    /// Register the handler invoked once per inbound message. A transport
    /// carries exactly one handler; registering again replaces it.
    fn on_message(&self, handler: MessageHandler);

    /// The context of the most recently delivered inbound message, if any.
    fn last_message_context(&self) -> Option<TransportContext>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downgrade_strips_trust_and_keeps_origin() {
        let ctx = TransportContext::trusted("https://app.example");
        let down = ctx.downgraded();
        assert_eq!(down.origin, "https://app.example");
        assert!(!down.trusted_source);
        // Downgrading twice is a no-op.
        assert_eq!(down.downgraded(), down);
    }

    #[test]
    fn context_serde_shape() {
        let ctx = TransportContext::untrusted("https://dapp.example");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["origin"], "https://dapp.example");
        assert_eq!(json["trusted_source"], false);
    }
}
