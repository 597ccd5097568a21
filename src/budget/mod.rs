//! Budget Manager: enforces a per-run token ceiling and tracks how many
//! steps are currently in flight.
//!
//! The token counter is a simple atomic add-then-check, grounded on the
//! teacher's `RetryCounter` pattern (`limits::RetryCounter`): fetch_add
//! first, compare after, so concurrent spenders never both believe they
//! are under the limit when the combined spend isn't.
//!
//! The in-flight gauge uses a `Scope` guard returned by `enter_step()`:
//! it increments on creation and decrements on `Drop`, so the gauge is
//! correct even if a step's future is cancelled or panics mid-flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::errors::ExecutorError;

pub const DEFAULT_TOKEN_BUDGET: u64 = 100_000;
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 90;

struct Inner {
    limit: u64,
    spent: AtomicU64,
    in_flight: AtomicU64,
}

/// Per-run token budget and in-flight step gauge. Cheap to clone; shares
/// state via `Arc`.
#[derive(Clone)]
pub struct BudgetManager {
    inner: Arc<Inner>,
}

impl BudgetManager {
    pub fn new(limit: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit,
                spent: AtomicU64::new(0),
                in_flight: AtomicU64::new(0),
            }),
        }
    }

    /// Reads `AGENT_TOKEN_BUDGET`, defaulting to `DEFAULT_TOKEN_BUDGET`.
    pub fn from_env() -> Self {
        let limit = std::env::var("AGENT_TOKEN_BUDGET")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_BUDGET);
        Self::new(limit)
    }

    /// Adds `amount` to the running total and fails if that pushed the
    /// run over its limit. The spend is not rolled back on failure —
    /// once tokens are spent, a rejected step still spent them.
    pub fn try_spend(&self, amount: u64) -> Result<(), ExecutorError> {
        let spent = self.inner.spent.fetch_add(amount, Ordering::SeqCst) + amount;
        if spent > self.inner.limit {
            return Err(ExecutorError::BudgetExhausted { spent, limit: self.inner.limit });
        }
        Ok(())
    }

    pub fn spent(&self) -> u64 {
        self.inner.spent.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> u64 {
        self.inner.limit
    }

    pub fn remaining(&self) -> u64 {
        self.inner.limit.saturating_sub(self.spent())
    }

    pub fn in_flight(&self) -> u64 {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Marks one step as in flight for the lifetime of the returned guard.
    pub fn enter_step(&self) -> Scope {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Scope { inner: self.inner.clone() }
    }
}

/// RAII guard released by `BudgetManager::enter_step`. Decrements the
/// in-flight gauge on drop, regardless of how the step's future ends.
pub struct Scope {
    inner: Arc<Inner>,
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spend_within_limit_succeeds() {
        let budget = BudgetManager::new(100);
        assert!(budget.try_spend(40).is_ok());
        assert!(budget.try_spend(40).is_ok());
        assert_eq!(budget.remaining(), 20);
    }

    #[test]
    fn spend_over_limit_fails() {
        let budget = BudgetManager::new(100);
        assert!(budget.try_spend(90).is_ok());
        let err = budget.try_spend(20).unwrap_err();
        assert!(matches!(err, ExecutorError::BudgetExhausted { spent: 110, limit: 100 }));
    }

    #[test]
    fn scope_guard_decrements_on_drop() {
        let budget = BudgetManager::new(100);
        {
            let _scope = budget.enter_step();
            assert_eq!(budget.in_flight(), 1);
        }
        assert_eq!(budget.in_flight(), 0);
    }

    #[test]
    fn scope_guard_decrements_even_on_panic_unwind() {
        let budget = BudgetManager::new(100);
        let budget_clone = budget.clone();
        let result = std::panic::catch_unwind(move || {
            let _scope = budget_clone.enter_step();
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(budget.in_flight(), 0);
    }
}
