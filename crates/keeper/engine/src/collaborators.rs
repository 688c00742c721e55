//! External collaborators consumed by the Keeper.
//!
//! The task delegate and the fee oracle are optional and replaceable by the
//! owner; when absent, registration is simply not mirrored and the fee
//! quote is zero. Value transfer is always required.

use keeper_types::{ActorId, Amount, Destination, FeeQuote, TaskRef};
use std::sync::Arc;

/// Why a collaborator call did not go through
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorFailure {
    /// The collaborator refused the request
    #[error("rejected: {0}")]
    Rejected(String),

    /// The collaborator could not be reached
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Mirrors workflow existence to an external scheduling index
pub trait TaskDelegate: Send + Sync {
    fn register_task(
        &self,
        destination: &Destination,
        payload: &[u8],
    ) -> Result<TaskRef, CollaboratorFailure>;

    fn cancel_task(&self, task_ref: &TaskRef) -> Result<(), CollaboratorFailure>;
}

/// Supplies the protocol surcharge and fixed overhead
pub trait FeeOracle: Send + Sync {
    fn quote(&self) -> FeeQuote;
}

/// Moves native value out of the Keeper's custody
///
/// Recipients may run code on receipt, including calls back into the
/// Keeper.
pub trait ValueTransfer: Send + Sync {
    fn transfer(&self, to: &ActorId, amount: Amount) -> Result<(), CollaboratorFailure>;
}

/// The replaceable collaborator references
#[derive(Clone, Default)]
pub struct Collaborators {
    pub task_delegate: Option<Arc<dyn TaskDelegate>>,
    pub fee_oracle: Option<Arc<dyn FeeOracle>>,
}

impl Collaborators {
    /// Current fee quote; zero without an oracle
    pub fn fee_quote(&self) -> FeeQuote {
        self.fee_oracle
            .as_ref()
            .map(|oracle| oracle.quote())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("task_delegate", &self.task_delegate.is_some())
            .field("fee_oracle", &self.fee_oracle.is_some())
            .finish()
    }
}
