//! The destination call seam.
//!
//! A run hands the destination its payload and a resource ceiling. The
//! engine observes only success or failure; consumption is measured
//! separately through the [`ResourceMeter`](crate::ResourceMeter).

use keeper_types::{ActorId, Destination, ResourceUnits, WorkflowId};

/// One call to a workflow's destination
#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    pub workflow_id: WorkflowId,
    pub caller: &'a ActorId,
    pub destination: &'a Destination,
    pub payload: &'a [u8],
    /// Units the call may consume before the host aborts it
    pub resource_ceiling: ResourceUnits,
}

/// Why a destination call failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationFailure {
    #[error("destination reverted: {0}")]
    Reverted(String),

    #[error("destination exhausted its resource ceiling of {0}")]
    CeilingExhausted(ResourceUnits),

    #[error("destination unreachable: {0}")]
    Unreachable(String),
}

/// Performs destination calls
///
/// Implementations may call back into the [`Keeper`](crate::Keeper) that
/// invoked them; the engine is built to survive that.
pub trait Invoker: Send + Sync {
    fn invoke(&self, invocation: &Invocation<'_>) -> Result<(), InvocationFailure>;
}
