//! Observations: the append-only record of what Keeper did
//!
//! Events are appended only by operations that succeed; a failed
//! operation leaves the log exactly as it found it.

use crate::{ActorId, Amount, ResourceUnits, WorkflowId};
use serde::{Deserialize, Serialize};

/// A single observation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KeeperEvent {
    WorkflowRegistered {
        id: WorkflowId,
        owner: ActorId,
    },
    WorkflowActivated {
        id: WorkflowId,
        max_resource_limit: ResourceUnits,
    },
    WorkflowCancelled {
        id: WorkflowId,
    },
    Prefunded {
        id: WorkflowId,
        funder: ActorId,
        amount: Amount,
    },
    WorkflowExecuted {
        id: WorkflowId,
        timestamp: u64,
        caller: ActorId,
        cost: Amount,
    },
    PrefundWithdrawn {
        id: WorkflowId,
        funder: ActorId,
        amount: Amount,
    },
    FundsReceived {
        from: ActorId,
        amount: Amount,
    },
    Swept {
        to: ActorId,
        amount: Amount,
    },
    TaskDelegateChanged {
        attached: bool,
    },
    FeeOracleChanged {
        attached: bool,
    },
}

impl KeeperEvent {
    /// The workflow this event concerns, if any
    pub fn workflow_id(&self) -> Option<WorkflowId> {
        match self {
            Self::WorkflowRegistered { id, .. }
            | Self::WorkflowActivated { id, .. }
            | Self::WorkflowCancelled { id }
            | Self::Prefunded { id, .. }
            | Self::WorkflowExecuted { id, .. }
            | Self::PrefundWithdrawn { id, .. } => Some(*id),
            Self::FundsReceived { .. }
            | Self::Swept { .. }
            | Self::TaskDelegateChanged { .. }
            | Self::FeeOracleChanged { .. } => None,
        }
    }
}

/// Append-only event log
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<KeeperEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: KeeperEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[KeeperEvent] {
        &self.events
    }

    /// All events concerning one workflow, in emission order
    pub fn for_workflow(&self, id: WorkflowId) -> Vec<&KeeperEvent> {
        self.events
            .iter()
            .filter(|e| e.workflow_id() == Some(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop every event after the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}
