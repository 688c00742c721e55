//! Scripted simulation: one workflow driven through several cooldown
//! periods against simulated collaborators.

use anyhow::{Context, Result};
use clap::Args;
use keeper_engine::sim::{
    FixedFeeOracle, InMemoryTaskDelegate, RecordingTransfer, ScriptStep, ScriptedInvoker,
};
use keeper_engine::{Clock, Keeper, KeeperSettings, ManualClock, RunReceipt, SharedMeter, SystemClock};
use keeper_types::{ActorId, Amount, Destination, FeeQuote, KeeperEvent, ResourceUnits};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Simulation parameters
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of cooldown periods to run through
    #[arg(long, default_value_t = 3)]
    pub runs: u32,

    /// Resource units the destination consumes per run
    #[arg(long, default_value_t = 40_000)]
    pub units: u64,

    /// Resource ceiling the workflow is activated with
    #[arg(long, default_value_t = 100_000)]
    pub limit: u64,

    /// Escrow deposit; defaults to the prefund requirement times `runs`
    #[arg(long)]
    pub deposit: Option<u64>,

    /// Fee oracle surcharge per run
    #[arg(long, default_value_t = 0)]
    pub surcharge: u64,

    /// Fee oracle overhead units per run
    #[arg(long, default_value_t = 0)]
    pub overhead: u64,

    /// Destination endpoint
    #[arg(long, default_value = "sim://destination")]
    pub destination: String,
}

/// A failed run attempt
#[derive(Debug, Serialize)]
pub struct RunFailure {
    pub period: u32,
    pub error: String,
}

/// Everything the simulation observed
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub receipts: Vec<RunReceipt>,
    pub failures: Vec<RunFailure>,
    pub escrow_remaining: Amount,
    pub holdings: Amount,
    pub paid_to_caller: Amount,
    pub events: Vec<KeeperEvent>,
}

pub fn run(settings: KeeperSettings, args: &SimulateArgs) -> Result<SimulationReport> {
    let meter = SharedMeter::new();
    let invoker = Arc::new(
        ScriptedInvoker::new(meter.clone())
            .with_default_step(ScriptStep::Consume(ResourceUnits::new(args.units))),
    );
    let transfer = Arc::new(RecordingTransfer::new());
    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let owner = settings.owner.clone();
    let cooldown_secs = settings.cooldown_secs;

    let mut keeper = Keeper::new(settings, invoker, Arc::new(meter), transfer.clone())
        .with_clock(clock.clone())
        .with_task_delegate(Arc::new(InMemoryTaskDelegate::new()));
    if args.surcharge > 0 || args.overhead > 0 {
        keeper = keeper.with_fee_oracle(Arc::new(FixedFeeOracle::new(FeeQuote::new(
            Amount::new(args.surcharge),
            ResourceUnits::new(args.overhead),
        ))));
    }

    let funder = ActorId::new("funder");
    let caller = ActorId::new("caller");

    let id = keeper
        .register(&funder, Destination::new(args.destination.clone()), Vec::new())
        .context("failed to register workflow")?;
    keeper
        .activate(&owner, id, ResourceUnits::new(args.limit))
        .context("failed to activate workflow")?;

    let deposit = match args.deposit {
        Some(amount) => Amount::new(amount),
        None => {
            let prefund = keeper.required_prefund(id)?;
            prefund
                .0
                .checked_mul(u64::from(args.runs.max(1)))
                .map(Amount::new)
                .context("deposit overflows")?
        }
    };
    keeper
        .deposit(&funder, id, deposit)
        .context("failed to fund workflow")?;
    info!(workflow_id = %id, deposit = deposit.0, runs = args.runs, "Simulation funded");

    let mut receipts = Vec::new();
    let mut failures = Vec::new();
    for period in 1..=args.runs {
        clock.advance(cooldown_secs);
        match keeper.run(&caller, id) {
            Ok(receipt) => receipts.push(receipt),
            Err(err) => failures.push(RunFailure {
                period,
                error: err.to_string(),
            }),
        }
    }

    Ok(SimulationReport {
        receipts,
        failures,
        escrow_remaining: keeper.escrow_balance(id),
        holdings: keeper.holdings(),
        paid_to_caller: transfer.paid_to(&caller),
        events: keeper.events(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SimulateArgs {
        SimulateArgs {
            runs: 3,
            units: 40_000,
            limit: 100_000,
            deposit: None,
            surcharge: 0,
            overhead: 0,
            destination: "sim://destination".into(),
        }
    }

    #[test]
    fn test_default_simulation_runs_every_period() {
        let settings = KeeperSettings::new(ActorId::new("owner"));
        let report = run(settings, &args()).unwrap();

        assert_eq!(report.receipts.len(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.paid_to_caller, Amount::new(120_000));
        assert_eq!(report.escrow_remaining, Amount::new(180_000));
        assert_eq!(report.holdings, report.escrow_remaining);
    }

    #[test]
    fn test_underfunded_simulation_reports_failures() {
        let settings = KeeperSettings::new(ActorId::new("owner"));
        let args = SimulateArgs {
            deposit: Some(100_000),
            units: 60_000,
            ..args()
        };
        let report = run(settings, &args).unwrap();

        assert_eq!(report.receipts.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.escrow_remaining, Amount::new(40_000));
    }

    #[test]
    fn test_fee_oracle_raises_cost() {
        let settings = KeeperSettings::new(ActorId::new("owner"));
        let args = SimulateArgs {
            runs: 1,
            surcharge: 10,
            overhead: 1_000,
            ..args()
        };
        let report = run(settings, &args).unwrap();
        assert_eq!(report.receipts[0].cost, Amount::new(41_010));
    }

    #[test]
    fn test_undersized_deposit_is_rejected() {
        let settings = KeeperSettings::new(ActorId::new("owner"));
        let args = SimulateArgs {
            deposit: Some(10),
            ..args()
        };
        assert!(run(settings, &args).is_err());
    }
}
