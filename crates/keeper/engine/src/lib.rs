//! Keeper Engine
//!
//! The Keeper service: workflow registration and lifecycle, escrowed
//! prefunding, timed permissionless execution with metered settlement,
//! and caller reimbursement.
//!
//! # Architecture
//!
//! ```text
//! caller ──► Keeper ──► AccessControl ──► WorkflowRegistry
//!              │                              │
//!              ├──► Invoker + ResourceMeter   ├──► EscrowLedger
//!              │                              │
//!              └──► ValueTransfer ◄── settle ─┘
//! ```
//!
//! Every mutating operation is all-or-nothing: on error the state captured
//! at entry is restored. Operations are serialized across threads, while
//! collaborators may call back into the Keeper on the same thread; `run`,
//! `withdraw` and `sweep` reject such nested calls with `ReentrantCall`.
//!
//! # Example
//!
//! ```
//! use keeper_engine::sim::{RecordingTransfer, ScriptStep, ScriptedInvoker};
//! use keeper_engine::{Keeper, KeeperSettings, ManualClock, SharedMeter};
//! use keeper_types::{ActorId, Amount, Destination, ResourceUnits};
//! use std::sync::Arc;
//!
//! let meter = SharedMeter::new();
//! let invoker = Arc::new(ScriptedInvoker::new(meter.clone()));
//! let clock = Arc::new(ManualClock::new(0));
//! let owner = ActorId::new("owner");
//!
//! let keeper = Keeper::new(
//!     KeeperSettings::new(owner.clone()),
//!     invoker.clone(),
//!     Arc::new(meter),
//!     Arc::new(RecordingTransfer::new()),
//! )
//! .with_clock(clock.clone());
//!
//! let id = keeper.register(&owner, Destination::new("D"), vec![]).unwrap();
//! keeper.activate(&owner, id, ResourceUnits::new(100)).unwrap();
//! keeper.deposit(&owner, id, Amount::new(100)).unwrap();
//!
//! clock.advance(86_400);
//! invoker.push(ScriptStep::Consume(ResourceUnits::new(40)));
//! let receipt = keeper.run(&ActorId::new("bot"), id).unwrap();
//! assert_eq!(receipt.cost, Amount::new(40));
//! ```

#![deny(unsafe_code)]

pub mod access;
pub mod clock;
pub mod collaborators;
pub mod execution;
pub mod invoke;
pub mod keeper;
pub mod meter;
pub mod reentrancy;
pub mod settings;
pub mod sim;

pub use access::AccessControl;
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    CollaboratorFailure, Collaborators, FeeOracle, TaskDelegate, ValueTransfer,
};
pub use execution::RunReceipt;
pub use invoke::{Invocation, InvocationFailure, Invoker};
pub use keeper::{Keeper, KeeperState};
pub use meter::{consumed_between, ResourceMeter, SharedMeter};
pub use reentrancy::{ReentrancyGuard, ReentrancyLock};
pub use settings::{KeeperSettings, RunPolicy, DEFAULT_COOLDOWN_SECS};
