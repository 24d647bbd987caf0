//! # Approval Queue
//!
//! The rendezvous between a method call and a human. When policy says
//! `Ask`, the router parks the call here; the wallet UI lists pending
//! approvals, the user clicks, and [`ApprovalQueue::resolve`] wakes the
//! parked call with the verdict.
//!
//! Invariants:
//!
//! - At most one pending approval per request id. A second enqueue for a
//!   live id fails with [`ApprovalError::Conflict`].
//! - Every approval eventually resolves: user decision, timeout, or
//!   shutdown (which denies by cancellation).
//! - A `resolve` that loses the race against the timeout is a no-op and
//!   reports `false`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::chain::ChainId;
use crate::config;
use crate::jsonrpc::RequestId;

// ---------------------------------------------------------------------------
// Approval Context
// ---------------------------------------------------------------------------

/// Where a pending approval stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// Waiting on the user.
    Pending,
    /// The user said yes.
    Approved,
    /// The user said no.
    Denied,
    /// Nobody answered in time.
    TimedOut,
}

/// Everything the wallet UI needs to render one approval prompt. Lives
/// only while the request is pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalContext {
    /// The JSON-RPC id of the request awaiting approval.
    pub request_id: RequestId,
    /// The chain the call targets.
    pub chain_id: ChainId,
    /// The method awaiting approval.
    pub method: String,
    /// The call's params, for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// The origin asking.
    pub origin: String,
    /// Current state.
    pub state: ApprovalState,
    /// When the approval was enqueued.
    pub queued_at: DateTime<Utc>,
}

impl ApprovalContext {
    /// A fresh pending approval.
    pub fn new(
        request_id: RequestId,
        chain_id: ChainId,
        method: impl Into<String>,
        params: Option<Value>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            chain_id,
            method: method.into(),
            params,
            origin: origin.into(),
            state: ApprovalState::Pending,
            queued_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the approval rendezvous.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// An approval for this request id is already pending.
    #[error("an approval for request {0} is already pending")]
    Conflict(RequestId),

    /// The user did not answer within the budget.
    #[error("approval timed out after {0:?}")]
    Timeout(Duration),

    /// The queue was torn down while this approval waited.
    #[error("approval cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Hook invoked when an approval times out, before the waiter is woken.
pub type TimeoutHook = Arc<dyn Fn(&ApprovalContext) + Send + Sync>;

struct PendingApproval {
    ctx: ApprovalContext,
    tx: oneshot::Sender<bool>,
}

/// The per-request blocking primitive behind `Ask` permissions.
pub struct ApprovalQueue {
    pending: Mutex<HashMap<RequestId, PendingApproval>>,
    default_timeout: Duration,
    on_timeout: RwLock<Option<TimeoutHook>>,
}

impl ApprovalQueue {
    /// A queue with the default approval timeout.
    pub fn new() -> Self {
        Self::with_timeout(config::DEFAULT_APPROVAL_TIMEOUT)
    }

    /// A queue with an explicit default timeout.
    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            default_timeout,
            on_timeout: RwLock::new(None),
        }
    }

    /// Install a hook that fires when an approval times out.
    pub fn set_timeout_hook(&self, hook: TimeoutHook) {
        *self.on_timeout.write() = Some(hook);
    }

    /// Park `ctx` and wait for the verdict.
    ///
    /// Resolves `Ok(true)` on approval, `Ok(false)` on denial,
    /// `Err(Timeout)` when the budget runs out, and `Err(Cancelled)` if
    /// the queue is torn down first.
    pub async fn queue(
        &self,
        ctx: ApprovalContext,
        timeout: Option<Duration>,
    ) -> Result<bool, ApprovalError> {
        let request_id = ctx.request_id.clone();
        let (tx, mut rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.contains_key(&request_id) {
                return Err(ApprovalError::Conflict(request_id));
            }
            trace!(id = %request_id, method = %ctx.method, "approval queued");
            pending.insert(request_id.clone(), PendingApproval { ctx, tx });
        }

        let budget = timeout.unwrap_or(self.default_timeout);
        match tokio::time::timeout(budget, &mut rx).await {
            Ok(Ok(approved)) => Ok(approved),
            Ok(Err(_)) => Err(ApprovalError::Cancelled),
            Err(_) => {
                // Atomic with resolve: whoever removes the entry owns the
                // outcome. If resolve got there first, take its verdict.
                let timed_out = self.pending.lock().remove(&request_id);
                match timed_out {
                    Some(mut entry) => {
                        entry.ctx.state = ApprovalState::TimedOut;
                        if let Some(hook) = self.on_timeout.read().clone() {
                            hook(&entry.ctx);
                        }
                        debug!(id = %request_id, "approval timed out");
                        Err(ApprovalError::Timeout(budget))
                    }
                    None => match rx.try_recv() {
                        Ok(approved) => Ok(approved),
                        Err(_) => Err(ApprovalError::Cancelled),
                    },
                }
            }
        }
    }

    /// Deliver the user's verdict for a pending approval. Returns `false`
    /// if nothing is pending under that id (already resolved, timed out,
    /// or never queued).
    pub fn resolve(&self, request_id: &RequestId, approved: bool) -> bool {
        let entry = self.pending.lock().remove(request_id);
        match entry {
            Some(mut entry) => {
                entry.ctx.state = if approved {
                    ApprovalState::Approved
                } else {
                    ApprovalState::Denied
                };
                trace!(id = %request_id, approved, "approval resolved");
                // The waiter may have been cancelled already.
                let _ = entry.tx.send(approved);
                true
            }
            None => false,
        }
    }

    /// Snapshot of every pending approval, for the wallet UI.
    pub fn pending(&self) -> Vec<ApprovalContext> {
        self.pending.lock().values().map(|p| p.ctx.clone()).collect()
    }

    /// How many approvals are waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// True if `request_id` has a pending approval.
    pub fn has_pending(&self, request_id: &RequestId) -> bool {
        self.pending.lock().contains_key(request_id)
    }

    /// Drop one pending approval without a verdict; its waiter sees
    /// `Cancelled`. Returns `false` if nothing was pending.
    pub fn cleanup(&self, request_id: &RequestId) -> bool {
        self.pending.lock().remove(request_id).is_some()
    }

    /// Drop every pending approval; all waiters see `Cancelled`.
    pub fn cleanup_all(&self) {
        let drained = {
            let mut pending = self.pending.lock();
            pending.drain().count()
        };
        if drained > 0 {
            debug!(drained, "cancelled pending approvals");
        }
    }
}

impl Default for ApprovalQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(id: u64) -> ApprovalContext {
        ApprovalContext::new(
            RequestId::Number(id),
            ChainId::parse("eip155:1").unwrap(),
            "eth_sendTransaction",
            None,
            "https://app.example",
        )
    }

    #[tokio::test]
    async fn approval_wakes_the_waiter_with_true() {
        let queue = Arc::new(ApprovalQueue::new());
        let waiter = Arc::clone(&queue);
        let task = tokio::spawn(async move { waiter.queue(ctx(42), None).await });

        // Wait until the approval is visible, then resolve it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.pending_count(), 1);
        assert!(queue.has_pending(&RequestId::Number(42)));
        assert!(queue.resolve(&RequestId::Number(42), true));

        assert_eq!(task.await.unwrap().unwrap(), true);
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn denial_wakes_the_waiter_with_false() {
        let queue = Arc::new(ApprovalQueue::new());
        let waiter = Arc::clone(&queue);
        let task = tokio::spawn(async move { waiter.queue(ctx(7), None).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(queue.resolve(&RequestId::Number(7), false));
        assert_eq!(task.await.unwrap().unwrap(), false);
    }

    #[tokio::test]
    async fn duplicate_request_id_conflicts() {
        let queue = Arc::new(ApprovalQueue::new());
        let waiter = Arc::clone(&queue);
        let _task = tokio::spawn(async move { waiter.queue(ctx(1), None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = queue.queue(ctx(1), None).await.unwrap_err();
        assert!(matches!(err, ApprovalError::Conflict(RequestId::Number(1))));

        // The original is still pending and resolvable.
        assert!(queue.resolve(&RequestId::Number(1), true));
    }

    #[tokio::test]
    async fn timeout_fires_hook_and_late_resolve_is_noop() {
        let queue = Arc::new(ApprovalQueue::new());
        let hook_fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hook_fired);
        queue.set_timeout_hook(Arc::new(move |ctx| {
            assert_eq!(ctx.state, ApprovalState::TimedOut);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let err = queue
            .queue(ctx(9), Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::Timeout(_)));
        assert_eq!(hook_fired.load(Ordering::SeqCst), 1);

        // The entry is gone; a late verdict has no effect.
        assert!(!queue.resolve(&RequestId::Number(9), true));
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn cleanup_all_cancels_waiters() {
        let queue = Arc::new(ApprovalQueue::new());
        let waiter = Arc::clone(&queue);
        let task = tokio::spawn(async move { waiter.queue(ctx(3), None).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.cleanup_all();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ApprovalError::Cancelled));
    }

    #[tokio::test]
    async fn cleanup_single_entry() {
        let queue = Arc::new(ApprovalQueue::new());
        let waiter = Arc::clone(&queue);
        let task = tokio::spawn(async move { waiter.queue(ctx(5), None).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(queue.cleanup(&RequestId::Number(5)));
        assert!(!queue.cleanup(&RequestId::Number(5)));

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ApprovalError::Cancelled));
    }

    #[tokio::test]
    async fn pending_snapshot_reflects_the_queue() {
        let queue = Arc::new(ApprovalQueue::new());
        for id in [10, 11] {
            let waiter = Arc::clone(&queue);
            tokio::spawn(async move { waiter.queue(ctx(id), None).await });
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut methods: Vec<String> = queue.pending().iter().map(|c| c.method.clone()).collect();
        methods.sort();
        assert_eq!(queue.pending_count(), 2);
        assert!(queue.pending().iter().all(|c| c.state == ApprovalState::Pending));
        assert_eq!(methods.len(), 2);

        queue.cleanup_all();
    }

    #[tokio::test]
    async fn string_request_ids_work() {
        let queue = Arc::new(ApprovalQueue::new());
        let mut approval = ctx(0);
        approval.request_id = RequestId::String("req-abc".into());

        let waiter = Arc::clone(&queue);
        let task = tokio::spawn(async move { waiter.queue(approval, None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(queue.resolve(&RequestId::String("req-abc".into()), true));
        assert!(task.await.unwrap().unwrap());
    }
}
