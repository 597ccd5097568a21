//! Approval Gate: blocks a step until a human grants or denies it.
//!
//! A grant or denial can arrive before the step has started waiting — the
//! CLI's `approve`/`deny` subcommands and the step that calls
//! `wait_for_approval` run concurrently, and there is no ordering
//! guarantee between them. Rather than drop an early signal, one slot per
//! `(run_id, step_id)` key buffers it until the matching wait arrives.
//! A second signal for the same key while the first is still buffered
//! overwrites it — only one decision can be outstanding for a step.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

use crate::protocol::RunId;

type Key = (RunId, String);

enum Slot {
    Waiting(oneshot::Sender<bool>),
    Buffered(bool),
}

/// Grant/deny gate keyed by `(run_id, step_id)`.
#[derive(Clone, Default)]
pub struct ApprovalGate {
    slots: Arc<Mutex<HashMap<Key, Slot>>>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until a grant or denial is recorded for this step. If one
    /// was already buffered, returns immediately.
    pub async fn wait_for_approval(&self, run_id: RunId, step_id: &str) -> bool {
        let key = (run_id, step_id.to_string());
        let rx = {
            let mut slots = self.slots.lock().await;
            match slots.remove(&key) {
                Some(Slot::Buffered(decision)) => return decision,
                Some(Slot::Waiting(_)) | None => {
                    let (tx, rx) = oneshot::channel();
                    slots.insert(key, Slot::Waiting(tx));
                    rx
                }
            }
        };
        rx.await.unwrap_or(false)
    }

    /// Records a decision for `(run_id, step_id)`. If a waiter is already
    /// registered, wakes it directly; otherwise buffers the decision for
    /// the next `wait_for_approval` call on this key.
    pub async fn record(&self, run_id: RunId, step_id: &str, decision: bool) {
        let key = (run_id, step_id.to_string());
        let mut slots = self.slots.lock().await;
        match slots.remove(&key) {
            Some(Slot::Waiting(tx)) => {
                let _ = tx.send(decision);
            }
            _ => {
                slots.insert(key, Slot::Buffered(decision));
            }
        }
    }

    pub async fn grant(&self, run_id: RunId, step_id: &str) {
        self.record(run_id, step_id, true).await;
    }

    pub async fn deny(&self, run_id: RunId, step_id: &str) {
        self.record(run_id, step_id, false).await;
    }

    /// Cleans up a pending wait for `(run_id, step_id)`, e.g. after the run
    /// was cancelled while the step was waiting on it. A dropped
    /// `wait_for_approval` future leaves its `Slot::Waiting` sender behind
    /// with no receiver left to wake; without this the entry sits in the
    /// map until some later `grant`/`deny` call happens to land on the same
    /// key. No-op if a decision is already buffered for this key.
    pub async fn abandon(&self, run_id: RunId, step_id: &str) {
        let key = (run_id, step_id.to_string());
        let mut slots = self.slots.lock().await;
        if matches!(slots.get(&key), Some(Slot::Waiting(_))) {
            slots.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::new_run_id;

    #[tokio::test]
    async fn grant_before_wait_is_buffered() {
        let gate = ApprovalGate::new();
        let run_id = new_run_id();
        gate.grant(run_id, "s1").await;
        assert!(gate.wait_for_approval(run_id, "s1").await);
    }

    #[tokio::test]
    async fn deny_before_wait_is_buffered() {
        let gate = ApprovalGate::new();
        let run_id = new_run_id();
        gate.deny(run_id, "s1").await;
        assert!(!gate.wait_for_approval(run_id, "s1").await);
    }

    #[tokio::test]
    async fn wait_then_grant_wakes_the_waiter() {
        let gate = ApprovalGate::new();
        let run_id = new_run_id();
        let gate2 = gate.clone();

        let waiter = tokio::spawn(async move { gate2.wait_for_approval(run_id, "s1").await });

        // Give the waiter a chance to register before granting.
        tokio::task::yield_now().await;
        gate.grant(run_id, "s1").await;

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn different_steps_do_not_interfere() {
        let gate = ApprovalGate::new();
        let run_id = new_run_id();
        gate.grant(run_id, "s1").await;
        gate.deny(run_id, "s2").await;
        assert!(gate.wait_for_approval(run_id, "s1").await);
        assert!(!gate.wait_for_approval(run_id, "s2").await);
    }

    #[tokio::test]
    async fn abandon_removes_a_pending_wait() {
        let gate = ApprovalGate::new();
        let run_id = new_run_id();
        let gate2 = gate.clone();

        let waiter = tokio::spawn(async move { gate2.wait_for_approval(run_id, "s1").await });
        tokio::task::yield_now().await;

        gate.abandon(run_id, "s1").await;
        drop(waiter);

        // The old waiter's slot is gone, so a fresh wait with a late grant
        // sees only the new registration, not a stale sender.
        gate.grant(run_id, "s1").await;
        assert!(gate.wait_for_approval(run_id, "s1").await);
    }

    #[tokio::test]
    async fn abandon_does_not_clobber_a_buffered_decision() {
        let gate = ApprovalGate::new();
        let run_id = new_run_id();
        gate.grant(run_id, "s1").await;
        gate.abandon(run_id, "s1").await;
        assert!(gate.wait_for_approval(run_id, "s1").await);
    }
}
