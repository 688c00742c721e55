//! Keeper: the entry surface
//!
//! Holds the settings context, the collaborator references, and the
//! mutable state (registry, ledger, custody, event log). Every
//! state-mutating operation runs as one all-or-nothing unit: a checkpoint
//! is taken on entry and restored if the operation returns an error,
//! discarding effects of any nested reentrant calls along with it.
//!
//! The state mutex is never held across an external call. Operations from
//! different threads are serialized end to end by a thread-reentrant
//! mutex, so a collaborator calling back on the same thread gets in while
//! another thread waits. Queries wait on the same mutex.

use crate::access::AccessControl;
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{Collaborators, FeeOracle, TaskDelegate, ValueTransfer};
use crate::invoke::Invoker;
use crate::meter::ResourceMeter;
use crate::reentrancy::ReentrancyLock;
use crate::settings::KeeperSettings;
use keeper_ledger::{EscrowLedger, FunderBalance};
use keeper_registry::WorkflowRegistry;
use keeper_types::{
    ActorId, Amount, Destination, EventLog, FeeQuote, KeeperError, KeeperEvent, KeeperResult,
    ResourceUnits, TaskRef, Workflow, WorkflowId, WorkflowPhase,
};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a failed operation must leave untouched
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeeperState {
    pub registry: WorkflowRegistry,
    pub ledger: EscrowLedger,
    /// Native value in the Keeper's custody
    pub holdings: Amount,
    pub events: EventLog,
    #[serde(skip)]
    pub(crate) collaborators: Collaborators,
}

impl KeeperState {
    /// Custody not earmarked for any workflow
    pub fn sweepable(&self) -> Amount {
        self.holdings.saturating_sub(self.ledger.total_escrowed())
    }

    pub(crate) fn credit_holdings(&mut self, amount: Amount) -> KeeperResult<()> {
        self.holdings = self
            .holdings
            .checked_add(amount)
            .ok_or(KeeperError::ArithmeticOverflow("holdings"))?;
        Ok(())
    }

    pub(crate) fn debit_holdings(&mut self, amount: Amount) -> KeeperResult<()> {
        self.holdings =
            self.holdings
                .checked_sub(amount)
                .ok_or(KeeperError::InsufficientBalance {
                    requested: amount,
                    available: self.holdings,
                })?;
        Ok(())
    }
}

/// What `transact` needs to undo an operation.
///
/// The event log is append-only, so it is rolled back by length rather
/// than copied.
struct Checkpoint {
    registry: WorkflowRegistry,
    ledger: EscrowLedger,
    holdings: Amount,
    events_len: usize,
    collaborators: Collaborators,
}

impl Checkpoint {
    fn take(state: &KeeperState) -> Self {
        Self {
            registry: state.registry.clone(),
            ledger: state.ledger.clone(),
            holdings: state.holdings,
            events_len: state.events.len(),
            collaborators: state.collaborators.clone(),
        }
    }

    fn restore(self, state: &mut KeeperState) {
        state.registry = self.registry;
        state.ledger = self.ledger;
        state.holdings = self.holdings;
        state.events.truncate(self.events_len);
        state.collaborators = self.collaborators;
    }
}

/// The Keeper service
pub struct Keeper {
    pub(crate) settings: KeeperSettings,
    pub(crate) state: Mutex<KeeperState>,
    pub(crate) serial: ReentrantMutex<()>,
    pub(crate) reentrancy: ReentrancyLock,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) meter: Arc<dyn ResourceMeter>,
    pub(crate) invoker: Arc<dyn Invoker>,
    pub(crate) transfer: Arc<dyn ValueTransfer>,
}

impl Keeper {
    /// Create a Keeper on the system clock with no delegate or oracle.
    pub fn new(
        settings: KeeperSettings,
        invoker: Arc<dyn Invoker>,
        meter: Arc<dyn ResourceMeter>,
        transfer: Arc<dyn ValueTransfer>,
    ) -> Self {
        info!(
            owner = %settings.owner,
            unit_price = settings.unit_price.0,
            cooldown_secs = settings.cooldown_secs,
            run_policy = ?settings.run_policy,
            "Keeper created"
        );
        Self {
            settings,
            state: Mutex::new(KeeperState::default()),
            serial: ReentrantMutex::new(()),
            reentrancy: ReentrancyLock::new(),
            clock: Arc::new(SystemClock),
            meter,
            invoker,
            transfer,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wire the initial task delegate
    pub fn with_task_delegate(mut self, delegate: Arc<dyn TaskDelegate>) -> Self {
        self.state.get_mut().collaborators.task_delegate = Some(delegate);
        self
    }

    /// Wire the initial fee oracle
    pub fn with_fee_oracle(mut self, oracle: Arc<dyn FeeOracle>) -> Self {
        self.state.get_mut().collaborators.fee_oracle = Some(oracle);
        self
    }

    /// Resume from a previously captured state.
    ///
    /// Collaborators are not part of a snapshot; the current wiring is kept.
    pub fn with_state(mut self, state: KeeperState) -> Self {
        let current = self.state.get_mut();
        let collaborators = std::mem::take(&mut current.collaborators);
        *current = KeeperState {
            collaborators,
            ..state
        };
        self
    }

    pub fn settings(&self) -> &KeeperSettings {
        &self.settings
    }

    // --- Atomicity ---

    /// Run `op` as one unit, restoring the entry checkpoint on error
    pub(crate) fn transact<T>(&self, op: impl FnOnce() -> KeeperResult<T>) -> KeeperResult<T> {
        let checkpoint = Checkpoint::take(&self.state.lock());
        let result = op();
        if let Err(err) = &result {
            checkpoint.restore(&mut self.state.lock());
            debug!(error = %err, "Operation rolled back");
        }
        result
    }

    pub(crate) fn collaborators(&self) -> Collaborators {
        self.state.lock().collaborators.clone()
    }

    pub(crate) fn fee_quote(&self) -> FeeQuote {
        self.collaborators().fee_quote()
    }

    fn mirror_task(&self, destination: &Destination, payload: &[u8]) -> KeeperResult<Option<TaskRef>> {
        match self.collaborators().task_delegate {
            Some(delegate) => delegate
                .register_task(destination, payload)
                .map(Some)
                .map_err(|failure| KeeperError::DelegateFailed(failure.to_string())),
            None => Ok(None),
        }
    }

    // --- Registration ---

    /// Register a workflow under a system-assigned id. Any actor may.
    pub fn register(
        &self,
        caller: &ActorId,
        destination: Destination,
        payload: Vec<u8>,
    ) -> KeeperResult<WorkflowId> {
        let _serial = self.serial.lock();
        self.transact(|| {
            let task_ref = self.mirror_task(&destination, &payload)?;
            let now = self.clock.now();

            let mut state = self.state.lock();
            let id = state
                .registry
                .register(caller.clone(), destination, payload, now);
            if let Some(task_ref) = task_ref {
                state.registry.attach_task(id, task_ref)?;
            }
            state.events.emit(KeeperEvent::WorkflowRegistered {
                id,
                owner: caller.clone(),
            });
            Ok(id)
        })
    }

    /// Register a workflow under a caller-chosen id.
    ///
    /// Fails with `DuplicateWorkflow` if the id is taken.
    pub fn register_with_id(
        &self,
        caller: &ActorId,
        id: WorkflowId,
        destination: Destination,
        payload: Vec<u8>,
    ) -> KeeperResult<WorkflowId> {
        let _serial = self.serial.lock();
        self.transact(|| {
            self.state.lock().registry.ensure_vacant(id)?;
            let task_ref = self.mirror_task(&destination, &payload)?;
            let now = self.clock.now();

            let mut state = self.state.lock();
            let inserted =
                state
                    .registry
                    .register_with_id(id, caller.clone(), destination, payload, now);
            if let Err(err) = inserted {
                drop(state);
                // The id was taken while the delegate had control
                if let Some(task_ref) = task_ref {
                    self.release_task(&task_ref);
                }
                return Err(err);
            }
            if let Some(task_ref) = task_ref {
                state.registry.attach_task(id, task_ref)?;
            }
            state.events.emit(KeeperEvent::WorkflowRegistered {
                id,
                owner: caller.clone(),
            });
            Ok(id)
        })
    }

    fn release_task(&self, task_ref: &TaskRef) {
        if let Some(delegate) = self.collaborators().task_delegate {
            if let Err(failure) = delegate.cancel_task(task_ref) {
                warn!(task_ref = %task_ref, error = %failure, "Orphaned task could not be released");
            }
        }
    }

    // --- Lifecycle ---

    /// Activate a workflow with a resource ceiling. Owner only.
    ///
    /// Resets the workflow's clock, so the first run waits a full cooldown.
    /// A workflow whose task mirror was detached by cancellation is
    /// mirrored again.
    pub fn activate(
        &self,
        caller: &ActorId,
        id: WorkflowId,
        max_resource_limit: ResourceUnits,
    ) -> KeeperResult<()> {
        let _serial = self.serial.lock();
        self.transact(|| {
            AccessControl::only_owner(&self.settings, caller, "activate workflows")?;
            let workflow = self.state.lock().registry.get(id)?.clone();

            let task_ref = match workflow.task_ref {
                Some(_) => None,
                None => self.mirror_task(&workflow.destination, &workflow.payload)?,
            };
            let now = self.clock.now();

            let mut state = self.state.lock();
            state.registry.activate(id, max_resource_limit, now)?;
            if let Some(task_ref) = task_ref {
                state.registry.attach_task(id, task_ref)?;
            }
            state.events.emit(KeeperEvent::WorkflowActivated {
                id,
                max_resource_limit,
            });
            Ok(())
        })
    }

    /// Cancel a workflow. Owner only; idempotent.
    pub fn cancel(&self, caller: &ActorId, id: WorkflowId) -> KeeperResult<()> {
        let _serial = self.serial.lock();
        self.transact(|| {
            AccessControl::only_owner(&self.settings, caller, "cancel workflows")?;
            let detached = {
                let mut state = self.state.lock();
                let detached = state.registry.cancel(id)?;
                state.events.emit(KeeperEvent::WorkflowCancelled { id });
                detached
            };

            if let (Some(task_ref), Some(delegate)) =
                (detached, self.collaborators().task_delegate)
            {
                delegate
                    .cancel_task(&task_ref)
                    .map_err(|failure| KeeperError::DelegateFailed(failure.to_string()))?;
            }
            Ok(())
        })
    }

    // --- Funding ---

    /// Minimum deposit for `id`: one run at its full ceiling under the
    /// current fee quote
    pub fn required_prefund(&self, id: WorkflowId) -> KeeperResult<Amount> {
        let _serial = self.serial.lock();
        let ceiling = self.state.lock().registry.get(id)?.max_resource_limit;
        self.fee_quote()
            .prefund_for(ceiling, self.settings.unit_price)
    }

    /// Escrow `amount` for `id` on behalf of `funder`.
    ///
    /// Fails with `InsufficientPrefund` if `amount` is below
    /// [`required_prefund`](Self::required_prefund).
    pub fn deposit(&self, funder: &ActorId, id: WorkflowId, amount: Amount) -> KeeperResult<Amount> {
        let _serial = self.serial.lock();
        self.transact(|| {
            let required = self.required_prefund(id)?;
            if amount < required {
                warn!(
                    workflow_id = %id,
                    funder = %funder,
                    required = required.0,
                    provided = amount.0,
                    "Prefund rejected"
                );
                return Err(KeeperError::InsufficientPrefund {
                    required,
                    provided: amount,
                });
            }

            let mut state = self.state.lock();
            let total = state.ledger.deposit(id, funder, amount)?;
            state.credit_holdings(amount)?;
            state.events.emit(KeeperEvent::Prefunded {
                id,
                funder: funder.clone(),
                amount,
            });
            Ok(total)
        })
    }

    /// Withdraw `amount` of `requester`'s own escrow for `id` and pay it out.
    pub fn withdraw(&self, requester: &ActorId, id: WorkflowId, amount: Amount) -> KeeperResult<()> {
        let _serial = self.serial.lock();
        let _guard = self.reentrancy.acquire()?;
        self.transact(|| {
            {
                let mut state = self.state.lock();
                state.ledger.withdraw(id, requester, amount)?;
                state.debit_holdings(amount)?;
                state.events.emit(KeeperEvent::PrefundWithdrawn {
                    id,
                    funder: requester.clone(),
                    amount,
                });
            }
            self.pay(requester, amount)
        })
    }

    /// Accept value not earmarked for any workflow.
    pub fn receive(&self, from: &ActorId, amount: Amount) -> KeeperResult<()> {
        let _serial = self.serial.lock();
        self.transact(|| {
            let mut state = self.state.lock();
            state.credit_holdings(amount)?;
            state.events.emit(KeeperEvent::FundsReceived {
                from: from.clone(),
                amount,
            });
            info!(from = %from, amount = amount.0, "Funds received");
            Ok(())
        })
    }

    /// Pay undistributed custody out to the owner. Owner only.
    ///
    /// Escrowed value is never sweepable.
    pub fn sweep(&self, caller: &ActorId, amount: Amount) -> KeeperResult<()> {
        let _serial = self.serial.lock();
        AccessControl::only_owner(&self.settings, caller, "sweep funds")?;
        let _guard = self.reentrancy.acquire()?;
        self.transact(|| {
            {
                let mut state = self.state.lock();
                let available = state.sweepable();
                if amount > available {
                    return Err(KeeperError::InsufficientBalance {
                        requested: amount,
                        available,
                    });
                }
                state.debit_holdings(amount)?;
                state.events.emit(KeeperEvent::Swept {
                    to: caller.clone(),
                    amount,
                });
            }
            self.pay(caller, amount)?;
            info!(to = %caller, amount = amount.0, "Funds swept");
            Ok(())
        })
    }

    pub(crate) fn pay(&self, to: &ActorId, amount: Amount) -> KeeperResult<()> {
        self.transfer.transfer(to, amount).map_err(|failure| {
            warn!(to = %to, amount = amount.0, error = %failure, "Value transfer failed");
            KeeperError::TransferFailed {
                to: to.clone(),
                reason: failure.to_string(),
            }
        })
    }

    // --- Collaborator wiring ---

    /// Replace (or detach, with `None`) the task delegate. Owner only.
    pub fn set_task_delegate(
        &self,
        caller: &ActorId,
        delegate: Option<Arc<dyn TaskDelegate>>,
    ) -> KeeperResult<()> {
        let _serial = self.serial.lock();
        self.transact(|| {
            AccessControl::only_owner(&self.settings, caller, "set the task delegate")?;
            let mut state = self.state.lock();
            let attached = delegate.is_some();
            state.collaborators.task_delegate = delegate;
            state
                .events
                .emit(KeeperEvent::TaskDelegateChanged { attached });
            info!(attached, "Task delegate changed");
            Ok(())
        })
    }

    /// Replace (or detach, with `None`) the fee oracle. Owner only.
    pub fn set_fee_oracle(
        &self,
        caller: &ActorId,
        oracle: Option<Arc<dyn FeeOracle>>,
    ) -> KeeperResult<()> {
        let _serial = self.serial.lock();
        self.transact(|| {
            AccessControl::only_owner(&self.settings, caller, "set the fee oracle")?;
            let mut state = self.state.lock();
            let attached = oracle.is_some();
            state.collaborators.fee_oracle = oracle;
            state.events.emit(KeeperEvent::FeeOracleChanged { attached });
            info!(attached, "Fee oracle changed");
            Ok(())
        })
    }

    // --- Queries ---
    //
    // Queries wait on the serializer too, so another thread never sees an
    // operation half done. Same-thread callbacks still get in.

    pub fn workflow(&self, id: WorkflowId) -> Option<Workflow> {
        let _serial = self.serial.lock();
        self.state.lock().registry.get(id).ok().cloned()
    }

    pub fn is_active(&self, id: WorkflowId) -> bool {
        let _serial = self.serial.lock();
        self.state.lock().registry.is_active(id)
    }

    pub fn owner_of(&self, id: WorkflowId) -> Option<ActorId> {
        let _serial = self.serial.lock();
        self.state.lock().registry.owner_of(id).cloned()
    }

    pub fn phase(&self, id: WorkflowId) -> KeeperResult<WorkflowPhase> {
        let _serial = self.serial.lock();
        let now = self.clock.now();
        let state = self.state.lock();
        Ok(state.registry.get(id)?.phase(now, self.settings.cooldown_secs))
    }

    pub fn next_run_at(&self, id: WorkflowId) -> KeeperResult<u64> {
        let _serial = self.serial.lock();
        let state = self.state.lock();
        Ok(state.registry.get(id)?.next_run_at(self.settings.cooldown_secs))
    }

    pub fn escrow_balance(&self, id: WorkflowId) -> Amount {
        let _serial = self.serial.lock();
        self.state.lock().ledger.balance(id)
    }

    pub fn funder_balance(&self, id: WorkflowId, funder: &ActorId) -> Amount {
        let _serial = self.serial.lock();
        self.state.lock().ledger.funder_balance(id, funder)
    }

    pub fn funders(&self, id: WorkflowId) -> Vec<FunderBalance> {
        let _serial = self.serial.lock();
        self.state.lock().ledger.funders(id).to_vec()
    }

    pub fn holdings(&self) -> Amount {
        let _serial = self.serial.lock();
        self.state.lock().holdings
    }

    pub fn sweepable(&self) -> Amount {
        let _serial = self.serial.lock();
        self.state.lock().sweepable()
    }

    pub fn events(&self) -> Vec<KeeperEvent> {
        let _serial = self.serial.lock();
        self.state.lock().events.events().to_vec()
    }

    /// A copy of the full state, suitable for serialization
    pub fn snapshot(&self) -> KeeperState {
        let _serial = self.serial.lock();
        self.state.lock().clone()
    }
}
