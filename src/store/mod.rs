//! Run Store: in-memory record of every run's lifecycle and per-step state.
//!
//! Persisted state is a deliberately small slice of what flows through the
//! Event Bus — enough to answer "what happened to run X" after the fact,
//! not a full event log. The full history lives wherever the Event Bus's
//! subscribers choose to write it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::protocol::{RunId, StepState};

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub goal: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub succeeded: Option<bool>,
    pub steps: HashMap<String, StepState>,
}

impl RunRecord {
    fn new(goal: String) -> Self {
        Self {
            goal,
            started_at: Utc::now(),
            ended_at: None,
            succeeded: None,
            steps: HashMap::new(),
        }
    }
}

/// Thread-safe map of `RunId -> RunRecord`.
#[derive(Clone, Default)]
pub struct RunStore {
    runs: Arc<RwLock<HashMap<RunId, RunRecord>>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start_run(&self, run_id: RunId, goal: String) {
        self.runs.write().await.insert(run_id, RunRecord::new(goal));
    }

    pub async fn set_step_state(&self, run_id: RunId, step_id: &str, state: StepState) {
        if let Some(record) = self.runs.write().await.get_mut(&run_id) {
            record.steps.insert(step_id.to_string(), state);
        }
    }

    pub async fn finish_run(&self, run_id: RunId, succeeded: bool) {
        if let Some(record) = self.runs.write().await.get_mut(&run_id) {
            record.ended_at = Some(Utc::now());
            record.succeeded = Some(succeeded);
        }
    }

    pub async fn get(&self, run_id: RunId) -> Option<RunRecord> {
        self.runs.read().await.get(&run_id).cloned()
    }

    pub async fn list_runs(&self) -> Vec<RunId> {
        self.runs.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::new_run_id;

    #[tokio::test]
    async fn start_and_finish_a_run() {
        let store = RunStore::new();
        let run_id = new_run_id();
        store.start_run(run_id, "do the thing".into()).await;

        store.set_step_state(run_id, "s1", StepState::Succeeded).await;
        store.finish_run(run_id, true).await;

        let record = store.get(run_id).await.unwrap();
        assert_eq!(record.goal, "do the thing");
        assert_eq!(record.steps.get("s1"), Some(&StepState::Succeeded));
        assert_eq!(record.succeeded, Some(true));
        assert!(record.ended_at.is_some());
    }

    #[tokio::test]
    async fn unknown_run_is_none() {
        let store = RunStore::new();
        assert!(store.get(new_run_id()).await.is_none());
    }
}
