//! Execution: gated runs, metered settlement, caller reimbursement
//!
//! A run stamps the workflow's clock before calling out, measures what the
//! destination consumed, prices it under the settlement-time fee quote, and
//! pays the triggering caller exactly that cost out of the workflow's
//! escrow. Any failure rolls the whole run back.

use crate::access::AccessControl;
use crate::invoke::Invocation;
use crate::keeper::Keeper;
use crate::meter::consumed_between;
use keeper_ledger::FunderBalance;
use keeper_types::{
    ActorId, Amount, KeeperError, KeeperEvent, KeeperResult, ResourceUnits, WorkflowId,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of a successful run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReceipt {
    pub id: WorkflowId,
    pub caller: ActorId,
    pub timestamp: u64,
    pub units_consumed: ResourceUnits,
    pub overhead_units: ResourceUnits,
    pub surcharge: Amount,
    /// Amount debited from escrow and paid to the caller
    pub cost: Amount,
    pub escrow_remaining: Amount,
    /// What was drawn from each funder, in draw order
    pub debits: Vec<FunderBalance>,
}

impl Keeper {
    /// Trigger a due workflow on behalf of `caller`.
    pub fn run(&self, caller: &ActorId, id: WorkflowId) -> KeeperResult<RunReceipt> {
        let _serial = self.serial.lock();
        let _guard = self.reentrancy.acquire()?;
        let result = self.transact(|| self.execute(caller, id));

        match &result {
            Ok(receipt) => info!(
                workflow_id = %id,
                caller = %caller,
                units = receipt.units_consumed.0,
                cost = receipt.cost.0,
                escrow_remaining = receipt.escrow_remaining.0,
                "Workflow executed"
            ),
            Err(err) => warn!(
                workflow_id = %id,
                caller = %caller,
                error = %err,
                "Workflow run failed"
            ),
        }
        result
    }

    fn execute(&self, caller: &ActorId, id: WorkflowId) -> KeeperResult<RunReceipt> {
        let now = self.clock.now();

        // Gate, then stamp the clock before anything external sees control
        let workflow = {
            let mut state = self.state.lock();
            let workflow = state.registry.get(id)?.clone();
            AccessControl::may_run(self.settings.run_policy, &workflow, caller)?;
            AccessControl::only_active_workflow(&workflow)?;

            let next_run_at = workflow.next_run_at(self.settings.cooldown_secs);
            if now < next_run_at {
                return Err(KeeperError::TooSoon {
                    id,
                    now,
                    next_run_at,
                });
            }

            let available = state.ledger.balance(id);
            if available.is_zero() {
                return Err(KeeperError::InsufficientEscrow {
                    id,
                    required: Amount::new(1),
                    available,
                });
            }

            state.registry.record_run(id, now)?;
            workflow
        };

        let invocation = Invocation {
            workflow_id: id,
            caller,
            destination: &workflow.destination,
            payload: &workflow.payload,
            resource_ceiling: workflow.max_resource_limit,
        };
        let before = self.meter.sample();
        let outcome = self.invoker.invoke(&invocation);
        let after = self.meter.sample();
        let units_consumed = consumed_between(before, after);

        outcome.map_err(|failure| KeeperError::ExecutionFailed {
            id,
            reason: failure.to_string(),
        })?;
        if units_consumed > workflow.max_resource_limit {
            return Err(KeeperError::ExecutionFailed {
                id,
                reason: format!(
                    "consumed {} over ceiling {}",
                    units_consumed, workflow.max_resource_limit
                ),
            });
        }

        let quote = self.fee_quote();
        let cost = quote.charge(units_consumed, self.settings.unit_price)?;

        let (debits, escrow_remaining) = {
            let mut state = self.state.lock();
            let available = state.ledger.balance(id);
            if cost > available {
                return Err(KeeperError::CostExceedsEscrow {
                    id,
                    cost,
                    units: units_consumed,
                    available,
                });
            }
            let debits = state.ledger.debit(id, cost)?;
            state.debit_holdings(cost)?;
            state.events.emit(KeeperEvent::WorkflowExecuted {
                id,
                timestamp: now,
                caller: caller.clone(),
                cost,
            });
            (debits, state.ledger.balance(id))
        };

        self.pay(caller, cost)?;

        Ok(RunReceipt {
            id,
            caller: caller.clone(),
            timestamp: now,
            units_consumed,
            overhead_units: quote.overhead_units,
            surcharge: quote.surcharge,
            cost,
            escrow_remaining,
            debits,
        })
    }
}
