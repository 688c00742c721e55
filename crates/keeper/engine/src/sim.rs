//! Simulated collaborators
//!
//! Deterministic stand-ins for the destination host, the value transfer
//! rail, the task index and the fee oracle. Used by the tests and by the
//! `keeper simulate` command. Hooks let a destination or a payment
//! recipient call back into the Keeper mid-operation.

use crate::collaborators::{CollaboratorFailure, FeeOracle, TaskDelegate, ValueTransfer};
use crate::invoke::{Invocation, InvocationFailure, Invoker};
use crate::meter::SharedMeter;
use keeper_types::{ActorId, Amount, Destination, FeeQuote, ResourceUnits, TaskRef, WorkflowId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a scripted destination does on one invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptStep {
    /// Succeed after consuming this many units
    Consume(ResourceUnits),
    /// Revert with this reason
    Fail(String),
}

/// An invocation as the destination saw it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub workflow_id: WorkflowId,
    pub caller: ActorId,
    pub destination: Destination,
    pub payload: Vec<u8>,
    pub resource_ceiling: ResourceUnits,
}

pub type InvocationHook = Arc<dyn Fn(&Invocation<'_>) + Send + Sync>;

/// Destination host that plays back queued steps
pub struct ScriptedInvoker {
    meter: SharedMeter,
    steps: Mutex<VecDeque<ScriptStep>>,
    default_step: ScriptStep,
    calls: Mutex<Vec<RecordedCall>>,
    hook: Mutex<Option<InvocationHook>>,
}

impl ScriptedInvoker {
    /// Invoker that consumes nothing and succeeds once its queue is empty
    pub fn new(meter: SharedMeter) -> Self {
        Self {
            meter,
            steps: Mutex::new(VecDeque::new()),
            default_step: ScriptStep::Consume(ResourceUnits::zero()),
            calls: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        }
    }

    /// Step played when the queue is empty
    pub fn with_default_step(mut self, step: ScriptStep) -> Self {
        self.default_step = step;
        self
    }

    pub fn push(&self, step: ScriptStep) {
        self.steps.lock().push_back(step);
    }

    /// Discard any steps not yet played
    pub fn clear_queue(&self) {
        self.steps.lock().clear();
    }

    /// Run `hook` at the start of every invocation
    pub fn set_hook(&self, hook: InvocationHook) {
        *self.hook.lock() = Some(hook);
    }

    pub fn clear_hook(&self) {
        *self.hook.lock() = None;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

impl Invoker for ScriptedInvoker {
    fn invoke(&self, invocation: &Invocation<'_>) -> Result<(), InvocationFailure> {
        self.calls.lock().push(RecordedCall {
            workflow_id: invocation.workflow_id,
            caller: invocation.caller.clone(),
            destination: invocation.destination.clone(),
            payload: invocation.payload.to_vec(),
            resource_ceiling: invocation.resource_ceiling,
        });

        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(invocation);
        }

        let step = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_step.clone());
        match step {
            ScriptStep::Consume(units) => {
                self.meter.consume(units);
                Ok(())
            }
            ScriptStep::Fail(reason) => Err(InvocationFailure::Reverted(reason)),
        }
    }
}

pub type TransferHook = Arc<dyn Fn(&ActorId, Amount) + Send + Sync>;

/// Value transfer rail that records every payment
#[derive(Default)]
pub struct RecordingTransfer {
    transfers: Mutex<Vec<(ActorId, Amount)>>,
    failing: AtomicBool,
    hook: Mutex<Option<TransferHook>>,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent transfer fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Run `hook` when a recipient receives value
    pub fn set_hook(&self, hook: TransferHook) {
        *self.hook.lock() = Some(hook);
    }

    pub fn clear_hook(&self) {
        *self.hook.lock() = None;
    }

    pub fn transfers(&self) -> Vec<(ActorId, Amount)> {
        self.transfers.lock().clone()
    }

    /// Total paid to `to`
    pub fn paid_to(&self, to: &ActorId) -> Amount {
        self.transfers
            .lock()
            .iter()
            .filter(|(recipient, _)| recipient == to)
            .fold(Amount::zero(), |sum, (_, amount)| sum.saturating_add(*amount))
    }
}

impl ValueTransfer for RecordingTransfer {
    fn transfer(&self, to: &ActorId, amount: Amount) -> Result<(), CollaboratorFailure> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorFailure::Rejected(format!(
                "recipient {to} refused {amount}"
            )));
        }
        self.transfers.lock().push((to.clone(), amount));

        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(to, amount);
        }
        Ok(())
    }
}

/// Task index kept in memory
#[derive(Debug, Default)]
pub struct InMemoryTaskDelegate {
    tasks: Mutex<HashMap<TaskRef, Destination>>,
    failing: AtomicBool,
}

impl InMemoryTaskDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn contains(&self, task_ref: &TaskRef) -> bool {
        self.tasks.lock().contains_key(task_ref)
    }
}

impl TaskDelegate for InMemoryTaskDelegate {
    fn register_task(
        &self,
        destination: &Destination,
        _payload: &[u8],
    ) -> Result<TaskRef, CollaboratorFailure> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorFailure::Unavailable(format!(
                "task index down, cannot mirror {destination}"
            )));
        }
        let task_ref = TaskRef::generate();
        self.tasks.lock().insert(task_ref.clone(), destination.clone());
        Ok(task_ref)
    }

    fn cancel_task(&self, task_ref: &TaskRef) -> Result<(), CollaboratorFailure> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorFailure::Unavailable(format!(
                "task index down, cannot cancel {task_ref}"
            )));
        }
        self.tasks.lock().remove(task_ref);
        Ok(())
    }
}

/// Oracle that always quotes the same fees
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedFeeOracle(pub FeeQuote);

impl FixedFeeOracle {
    pub fn new(quote: FeeQuote) -> Self {
        Self(quote)
    }
}

impl FeeOracle for FixedFeeOracle {
    fn quote(&self) -> FeeQuote {
        self.0
    }
}
