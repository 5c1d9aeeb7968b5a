//! Per-operator ownership of upload workflows
//!
//! Each operator gets exactly one [`Workflow`], created lazily in the idle
//! state and kept behind its own async mutex:
//! - every transition for one operator is serialized by that mutex
//! - different operators never contend with each other
//!
//! The manager itself only maps operator ids to workflow handles; it holds
//! no global state beyond that map and is passed explicitly to whoever needs it.

use crate::workflow::{Phase, Workflow};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type WorkflowHandle = Arc<Mutex<Workflow>>;

#[derive(Debug, Default)]
pub struct SessionManager {
    workflows: HashMap<u64, WorkflowHandle>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            workflows: HashMap::new(),
        }
    }

    /// Returns the operator's workflow, creating an idle one on first use.
    pub fn workflow(&mut self, operator_id: u64) -> WorkflowHandle {
        Arc::clone(self.workflows.entry(operator_id).or_insert_with(|| {
            debug!("Created workflow for operator {}", operator_id);
            Arc::new(Mutex::new(Workflow::new(operator_id)))
        }))
    }

    pub fn get(&self, operator_id: u64) -> Option<WorkflowHandle> {
        self.workflows.get(&operator_id).cloned()
    }

    /// Current phase, or `Idle` for operators that never started anything.
    pub async fn phase(&self, operator_id: u64) -> Phase {
        match self.get(operator_id) {
            Some(handle) => handle.lock().await.phase(),
            None => Phase::Idle,
        }
    }

    /// Drops idle workflows that nobody is currently using. Returns how many were dropped.
    ///
    /// A handle cloned out of the map may be about to lock its workflow, so
    /// any workflow with an outstanding handle is kept even if it is unlocked.
    pub fn prune_idle(&mut self) -> usize {
        let before = self.workflows.len();
        self.workflows.retain(|_, handle| {
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            match handle.try_lock() {
                Ok(workflow) => workflow.phase() != Phase::Idle,
                Err(_) => true,
            }
        });
        let pruned = before - self.workflows.len();
        if pruned > 0 {
            info!("Pruned {} idle workflows", pruned);
        }
        pruned
    }

    pub fn operators(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.workflows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
