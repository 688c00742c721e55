//! End-to-end scenarios: register, activate, fund, run, settle, withdraw.

use keeper_engine::sim::{
    FixedFeeOracle, InMemoryTaskDelegate, RecordingTransfer, ScriptStep, ScriptedInvoker,
};
use keeper_engine::{Keeper, KeeperSettings, ManualClock, SharedMeter};
use keeper_types::{
    ActorId, Amount, Destination, FeeQuote, KeeperError, KeeperEvent, ResourceUnits, WorkflowId,
    WorkflowPhase,
};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const DAY: u64 = 86_400;
const PRICE: u64 = 3;
const LIMIT: u64 = 100_000;

struct World {
    keeper: Keeper,
    clock: Arc<ManualClock>,
    invoker: Arc<ScriptedInvoker>,
    transfer: Arc<RecordingTransfer>,
    delegate: Arc<InMemoryTaskDelegate>,
}

fn owner() -> ActorId {
    ActorId::new("owner")
}

fn alice() -> ActorId {
    ActorId::new("alice")
}

fn bob() -> ActorId {
    ActorId::new("bob")
}

fn bot() -> ActorId {
    ActorId::new("bot")
}

fn world() -> World {
    let meter = SharedMeter::new();
    let clock = Arc::new(ManualClock::new(0));
    let invoker = Arc::new(ScriptedInvoker::new(meter.clone()));
    let transfer = Arc::new(RecordingTransfer::new());
    let delegate = Arc::new(InMemoryTaskDelegate::new());

    let keeper = Keeper::new(
        KeeperSettings::new(owner()).with_unit_price(Amount::new(PRICE)),
        invoker.clone(),
        Arc::new(meter),
        transfer.clone(),
    )
    .with_clock(clock.clone())
    .with_task_delegate(delegate.clone());

    World {
        keeper,
        clock,
        invoker,
        transfer,
        delegate,
    }
}

/// Register id 1, activate at t=0 and fund exactly one full-ceiling run
fn funded_world() -> World {
    let w = world();
    let id = WorkflowId::new(1);
    w.keeper
        .register_with_id(&alice(), id, Destination::new("D"), b"P".to_vec())
        .unwrap();
    w.keeper
        .activate(&owner(), id, ResourceUnits::new(LIMIT))
        .unwrap();
    w.keeper
        .deposit(&alice(), id, Amount::new(LIMIT * PRICE))
        .unwrap();
    w
}

// ---------------------------------------------------------------------------
// Tests: Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_run_before_cooldown_is_too_soon() {
    let w = funded_world();
    let id = WorkflowId::new(1);

    let result = w.keeper.run(&bot(), id);
    assert_eq!(
        result,
        Err(KeeperError::TooSoon {
            id,
            now: 0,
            next_run_at: DAY,
        })
    );
    assert_eq!(w.keeper.escrow_balance(id), Amount::new(LIMIT * PRICE));
    assert!(w.invoker.calls().is_empty());
}

#[test]
fn scenario_b_run_after_cooldown_settles_measured_cost() {
    let w = funded_world();
    let id = WorkflowId::new(1);
    w.clock.set(DAY);
    w.invoker.push(ScriptStep::Consume(ResourceUnits::new(40_000)));

    let receipt = w.keeper.run(&bot(), id).unwrap();

    let cost = Amount::new(40_000 * PRICE);
    assert_eq!(receipt.cost, cost);
    assert_eq!(
        w.keeper.escrow_balance(id),
        Amount::new((LIMIT - 40_000) * PRICE)
    );
    assert_eq!(w.transfer.paid_to(&bot()), cost);
    assert_eq!(w.keeper.workflow(id).unwrap().last_run_at, DAY);
    assert_eq!(w.keeper.phase(id).unwrap(), WorkflowPhase::Cooling);
    assert_eq!(
        w.keeper.events().last(),
        Some(&KeeperEvent::WorkflowExecuted {
            id,
            timestamp: DAY,
            caller: bot(),
            cost,
        })
    );
}

#[test]
fn scenario_c_overhead_pushes_cost_past_escrow() {
    let w = funded_world();
    let id = WorkflowId::new(1);
    w.keeper
        .set_fee_oracle(
            &owner(),
            Some(Arc::new(FixedFeeOracle::new(FeeQuote::new(
                Amount::zero(),
                ResourceUnits::new(21_000),
            )))),
        )
        .unwrap();
    let events_before = w.keeper.events();

    w.clock.set(DAY);
    w.invoker.push(ScriptStep::Consume(ResourceUnits::new(LIMIT)));

    let result = w.keeper.run(&bot(), id);
    assert_eq!(
        result,
        Err(KeeperError::CostExceedsEscrow {
            id,
            cost: Amount::new((LIMIT + 21_000) * PRICE),
            units: ResourceUnits::new(LIMIT),
            available: Amount::new(LIMIT * PRICE),
        })
    );
    assert_eq!(w.keeper.escrow_balance(id), Amount::new(LIMIT * PRICE));
    assert_eq!(w.keeper.workflow(id).unwrap().last_run_at, 0);
    assert_eq!(w.keeper.events(), events_before);
    assert!(w.transfer.transfers().is_empty());
}

#[test]
fn scenario_d_non_owner_cannot_activate() {
    let w = world();
    let id = w
        .keeper
        .register(&alice(), Destination::new("D"), vec![])
        .unwrap();

    let result = w.keeper.activate(&alice(), id, ResourceUnits::new(LIMIT));
    assert!(matches!(result, Err(KeeperError::PermissionDenied { .. })));
    assert!(!w.keeper.is_active(id));
    assert_eq!(w.keeper.phase(id).unwrap(), WorkflowPhase::Inactive);
}

// ---------------------------------------------------------------------------
// Tests: Registration
// ---------------------------------------------------------------------------

#[test]
fn duplicate_id_leaves_existing_record_intact() {
    let w = world();
    let id = WorkflowId::new(7);
    w.keeper
        .register_with_id(&alice(), id, Destination::new("D"), b"first".to_vec())
        .unwrap();

    let result = w
        .keeper
        .register_with_id(&bob(), id, Destination::new("E"), b"second".to_vec());
    assert_eq!(result, Err(KeeperError::DuplicateWorkflow(id)));

    let wf = w.keeper.workflow(id).unwrap();
    assert_eq!(wf.owner, alice());
    assert_eq!(wf.payload, b"first".to_vec());
    assert_eq!(w.delegate.task_count(), 1);
}

#[test]
fn system_ids_skip_caller_chosen_ones() {
    let w = world();
    w.keeper
        .register_with_id(&alice(), WorkflowId::new(1), Destination::new("D"), vec![])
        .unwrap();

    let id = w
        .keeper
        .register(&bob(), Destination::new("D"), vec![])
        .unwrap();
    assert_eq!(id, WorkflowId::new(2));
    assert_eq!(w.keeper.owner_of(id), Some(bob()));
}

// ---------------------------------------------------------------------------
// Tests: Lifecycle over several periods
// ---------------------------------------------------------------------------

#[test]
fn runs_once_per_cooldown_until_escrow_is_drained() {
    let w = funded_world();
    let id = WorkflowId::new(1);
    let per_run = ResourceUnits::new(LIMIT / 2);

    for day in 1..=2 {
        w.clock.set(day * DAY);
        w.invoker.push(ScriptStep::Consume(per_run));
        w.keeper.run(&bot(), id).unwrap();

        // Second attempt in the same period is gated
        assert!(matches!(
            w.keeper.run(&bot(), id),
            Err(KeeperError::TooSoon { .. })
        ));
    }

    assert_eq!(w.keeper.escrow_balance(id), Amount::zero());
    w.clock.set(3 * DAY);
    assert!(matches!(
        w.keeper.run(&bot(), id),
        Err(KeeperError::InsufficientEscrow { .. })
    ));
    assert_eq!(w.keeper.workflow(id).unwrap().run_count, 2);
}

#[test]
fn cancelled_workflow_cannot_run_until_reactivated() {
    let w = funded_world();
    let id = WorkflowId::new(1);
    w.keeper.cancel(&owner(), id).unwrap();
    w.clock.set(DAY);

    assert_eq!(
        w.keeper.run(&bot(), id),
        Err(KeeperError::WorkflowInactive(id))
    );

    // Reactivation restarts the cooldown
    w.keeper
        .activate(&owner(), id, ResourceUnits::new(LIMIT))
        .unwrap();
    assert!(matches!(
        w.keeper.run(&bot(), id),
        Err(KeeperError::TooSoon { .. })
    ));
    w.clock.advance(DAY);
    assert!(w.keeper.run(&bot(), id).is_ok());
}

// ---------------------------------------------------------------------------
// Tests: Funding
// ---------------------------------------------------------------------------

#[test]
fn settlement_draws_from_earliest_funder_first() {
    let w = funded_world();
    let id = WorkflowId::new(1);
    w.keeper
        .deposit(&bob(), id, Amount::new(LIMIT * PRICE))
        .unwrap();

    w.clock.set(DAY);
    w.invoker.push(ScriptStep::Consume(ResourceUnits::new(LIMIT)));
    let receipt = w.keeper.run(&bot(), id).unwrap();

    assert_eq!(receipt.debits.len(), 1);
    assert_eq!(receipt.debits[0].funder, alice());
    assert_eq!(w.keeper.funder_balance(id, &alice()), Amount::zero());
    assert_eq!(
        w.keeper.funder_balance(id, &bob()),
        Amount::new(LIMIT * PRICE)
    );
}

#[test]
fn withdrawals_are_exact_and_bounded_by_own_share() {
    let w = funded_world();
    let id = WorkflowId::new(1);
    let share = Amount::new(LIMIT * PRICE);

    // Bob never funded this workflow
    assert!(matches!(
        w.keeper.withdraw(&bob(), id, Amount::new(1)),
        Err(KeeperError::PermissionDenied { .. })
    ));

    w.keeper.withdraw(&alice(), id, Amount::new(1_000)).unwrap();
    assert_eq!(
        w.keeper.funder_balance(id, &alice()),
        Amount::new(share.0 - 1_000)
    );
    assert_eq!(w.transfer.paid_to(&alice()), Amount::new(1_000));

    assert!(matches!(
        w.keeper.withdraw(&alice(), id, share),
        Err(KeeperError::InsufficientBalance { .. })
    ));
    w.keeper
        .withdraw(&alice(), id, Amount::new(share.0 - 1_000))
        .unwrap();
    assert_eq!(w.keeper.escrow_balance(id), Amount::zero());
    assert_eq!(w.keeper.holdings(), Amount::zero());
}

#[test]
fn empty_withdrawals_leave_no_trace() {
    let w = funded_world();
    let id = WorkflowId::new(1);
    let events_before = w.keeper.events();

    let stranger = ActorId::new("stranger");
    assert_eq!(
        w.keeper.withdraw(&stranger, id, Amount::zero()),
        Err(KeeperError::permission_denied(
            &stranger,
            "withdraw escrow it did not fund"
        ))
    );
    assert_eq!(
        w.keeper.withdraw(&alice(), id, Amount::zero()),
        Err(KeeperError::ZeroAmount("escrow withdrawal"))
    );

    assert_eq!(w.keeper.events(), events_before);
    assert!(w.transfer.transfers().is_empty());
    assert_eq!(w.keeper.holdings(), Amount::new(LIMIT * PRICE));
}

#[test]
fn state_snapshot_serializes() {
    let w = funded_world();
    let json = serde_json::to_value(w.keeper.snapshot()).unwrap();
    assert_eq!(json["holdings"], serde_json::json!(LIMIT * PRICE));
    assert_eq!(json["events"]["events"][0]["event"], "workflow_registered");
}
