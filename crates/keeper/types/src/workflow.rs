//! Workflow records
//!
//! A Workflow is never deleted. Its destination and payload are fixed at
//! registration; activation, runs, and cancellation only touch the
//! ceiling, the clock, and the activity flag.

use crate::{ActorId, Destination, ResourceUnits, TaskRef, WorkflowId};
use serde::{Deserialize, Serialize};

/// A registered deferred action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    pub id: WorkflowId,
    /// Actor that registered the workflow
    pub owner: ActorId,
    /// Endpoint the payload is submitted to
    pub destination: Destination,
    /// Opaque bytes submitted to the destination
    pub payload: Vec<u8>,
    /// Ceiling on resource units a single run may consume
    pub max_resource_limit: ResourceUnits,
    /// Unix seconds of the last activation or successful run
    pub last_run_at: u64,
    /// Whether the workflow may currently run
    pub active: bool,
    /// Mirror entry in the external task index, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<TaskRef>,
    /// Unix seconds of registration
    pub registered_at: u64,
    /// Number of successful runs
    pub run_count: u64,
}

impl Workflow {
    pub fn new(
        id: WorkflowId,
        owner: ActorId,
        destination: Destination,
        payload: Vec<u8>,
        registered_at: u64,
    ) -> Self {
        Self {
            id,
            owner,
            destination,
            payload,
            max_resource_limit: ResourceUnits::zero(),
            last_run_at: 0,
            active: false,
            task_ref: None,
            registered_at,
            run_count: 0,
        }
    }

    pub fn with_task_ref(mut self, task_ref: TaskRef) -> Self {
        self.task_ref = Some(task_ref);
        self
    }

    /// Earliest time the next run may start
    pub fn next_run_at(&self, cooldown_secs: u64) -> u64 {
        self.last_run_at.saturating_add(cooldown_secs)
    }

    /// Phase of the lifecycle at `now`
    pub fn phase(&self, now: u64, cooldown_secs: u64) -> WorkflowPhase {
        if !self.active {
            WorkflowPhase::Inactive
        } else if now < self.next_run_at(cooldown_secs) {
            WorkflowPhase::Cooling
        } else {
            WorkflowPhase::Runnable
        }
    }

    pub fn is_owned_by(&self, actor: &ActorId) -> bool {
        self.owner == *actor
    }
}

/// Lifecycle phase of a workflow
///
/// A freshly activated workflow is `Cooling`: activation stamps the clock,
/// so the first run waits a full cooldown like every later one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowPhase {
    /// Registered or cancelled; runs are refused
    Inactive,
    /// Active, but the cooldown since the last run has not elapsed
    Cooling,
    /// Active and due
    Runnable,
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Inactive => "inactive",
            Self::Cooling => "cooling",
            Self::Runnable => "runnable",
        };
        f.write_str(s)
    }
}
