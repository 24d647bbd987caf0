//! # Router Configuration & Constants
//!
//! Every protocol constant lives here: reserved method and event names, the
//! default time budgets, and the bulk-call cap. If you find one of these
//! hardcoded anywhere else in the crate, that is a bug.
//!
//! The numeric error codes are deliberately *not* here — they live next to
//! the error taxonomy in [`crate::error`], because they are part of its
//! stability contract.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Wire Protocol
// ---------------------------------------------------------------------------

/// The only JSON-RPC version the router speaks. Frames claiming anything
/// else are rejected before dispatch.
pub const JSONRPC_VERSION: &str = "2.0";

/// Router protocol version, negotiated nowhere yet but stamped on session
/// metadata so a future incompatible revision can tell old sessions apart.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Namespace prefix reserved for router methods and events. Wallet backends
/// may not register methods in this namespace.
pub const RESERVED_PREFIX: &str = "wm_";

// ---------------------------------------------------------------------------
// Reserved Methods
// ---------------------------------------------------------------------------

pub const METHOD_CONNECT: &str = "wm_connect";
pub const METHOD_RECONNECT: &str = "wm_reconnect";
pub const METHOD_DISCONNECT: &str = "wm_disconnect";
pub const METHOD_GET_PERMISSIONS: &str = "wm_getPermissions";
pub const METHOD_UPDATE_PERMISSIONS: &str = "wm_updatePermissions";
pub const METHOD_CALL: &str = "wm_call";
pub const METHOD_BULK_CALL: &str = "wm_bulkCall";
pub const METHOD_GET_SUPPORTED_METHODS: &str = "wm_getSupportedMethods";

/// Capability endpoint every node answers from its own method registry.
/// Used by `wm_getSupportedMethods` to interrogate per-chain wallets.
pub const CAPABILITY_METHOD: &str = "rpc_methods";

// ---------------------------------------------------------------------------
// Reserved Events
// ---------------------------------------------------------------------------

pub const EVENT_WALLET_STATE_CHANGED: &str = "wm_walletStateChanged";
pub const EVENT_PERMISSIONS_CHANGED: &str = "wm_permissionsChanged";
pub const EVENT_SESSION_TERMINATED: &str = "wm_sessionTerminated";
pub const EVENT_WALLET_AVAILABILITY_CHANGED: &str = "wm_walletAvailabilityChanged";

/// The four server-emitted events, in the order they are documented.
pub const ROUTER_EVENTS: [&str; 4] = [
    EVENT_WALLET_STATE_CHANGED,
    EVENT_PERMISSIONS_CHANGED,
    EVENT_SESSION_TERMINATED,
    EVENT_WALLET_AVAILABILITY_CHANGED,
];

// ---------------------------------------------------------------------------
// Time Budgets
// ---------------------------------------------------------------------------

/// Default outbound call timeout. Wallet backends that take longer than this
/// to answer a forwarded call are treated as unavailable for that request.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user-approval timeout. A human is on the other end of this one,
/// so it is twice the call budget.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default session lifetime. Stores configured to slide the window extend
/// a session by this much on every validated use.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum number of sub-calls accepted by a single `wm_bulkCall`.
pub const MAX_BULK_CALLS: usize = 50;

// ---------------------------------------------------------------------------
// Session Identifiers
// ---------------------------------------------------------------------------

/// Prefix for non-UUID session ids. A valid session id either carries this
/// prefix or contains a `-` (UUID-like).
pub const SESSION_ID_PREFIX: &str = "session_";

/// Default key prefix for the persistent session store.
pub const DEFAULT_STORE_PREFIX: &str = "walletmesh:session:";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns true if `method` lives in the reserved router namespace.
pub fn is_reserved_method(method: &str) -> bool {
    method.starts_with(RESERVED_PREFIX)
}

/// Returns true if `event` is one of the four router-emitted events.
pub fn is_router_event(event: &str) -> bool {
    ROUTER_EVENTS.contains(&event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_methods_share_the_prefix() {
        for method in [
            METHOD_CONNECT,
            METHOD_RECONNECT,
            METHOD_DISCONNECT,
            METHOD_GET_PERMISSIONS,
            METHOD_UPDATE_PERMISSIONS,
            METHOD_CALL,
            METHOD_BULK_CALL,
            METHOD_GET_SUPPORTED_METHODS,
        ] {
            assert!(is_reserved_method(method), "{method} should be reserved");
        }
    }

    #[test]
    fn capability_method_is_not_reserved() {
        // Wallet backends must be able to answer it themselves.
        assert!(!is_reserved_method(CAPABILITY_METHOD));
    }

    #[test]
    fn router_events_are_recognized() {
        for event in ROUTER_EVENTS {
            assert!(is_router_event(event));
        }
        assert!(!is_router_event("accountsChanged"));
    }

    #[test]
    fn time_budgets_sanity() {
        // Approvals wait on a human; calls wait on software.
        assert!(DEFAULT_APPROVAL_TIMEOUT > DEFAULT_CALL_TIMEOUT);
        assert!(DEFAULT_SESSION_TTL > DEFAULT_APPROVAL_TIMEOUT);
    }
}
