//! Error types for Keeper operations

use crate::{ActorId, Amount, ResourceUnits, WorkflowId};

/// Errors that can occur in Keeper operations
///
/// Every error aborts the enclosing operation as a whole; no partial
/// mutation survives a returned error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeeperError {
    #[error("Permission denied: {actor} may not {action}")]
    PermissionDenied { actor: ActorId, action: &'static str },

    #[error("Workflow already registered: {0}")]
    DuplicateWorkflow(WorkflowId),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error("Workflow not active: {0}")]
    WorkflowInactive(WorkflowId),

    #[error("Workflow {id} run too soon: now {now}, next run at {next_run_at}")]
    TooSoon {
        id: WorkflowId,
        now: u64,
        next_run_at: u64,
    },

    #[error("Insufficient prefund: required {required}, provided {provided}")]
    InsufficientPrefund { required: Amount, provided: Amount },

    #[error("Insufficient escrow for {id}: required {required}, available {available}")]
    InsufficientEscrow {
        id: WorkflowId,
        required: Amount,
        available: Amount,
    },

    #[error("Execution of {id} failed: {reason}")]
    ExecutionFailed { id: WorkflowId, reason: String },

    #[error("Run cost for {id} exceeds escrow: cost {cost} ({units} consumed), available {available}")]
    CostExceedsEscrow {
        id: WorkflowId,
        cost: Amount,
        units: ResourceUnits,
        available: Amount,
    },

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("Zero amount rejected: {0}")]
    ZeroAmount(&'static str),

    #[error("Reentrant call rejected")]
    ReentrantCall,

    #[error("Task delegate failed: {0}")]
    DelegateFailed(String),

    #[error("Value transfer to {to} failed: {reason}")]
    TransferFailed { to: ActorId, reason: String },

    #[error("Arithmetic overflow computing {0}")]
    ArithmeticOverflow(&'static str),
}

impl KeeperError {
    pub fn permission_denied(actor: &ActorId, action: &'static str) -> Self {
        Self::PermissionDenied {
            actor: actor.clone(),
            action,
        }
    }
}

/// Result type alias for Keeper operations
pub type KeeperResult<T> = Result<T, KeeperError>;
