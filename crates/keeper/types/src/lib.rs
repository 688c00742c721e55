//! Keeper Domain Types
//!
//! This crate defines the shared vocabulary of Keeper, a scheduler for
//! deferred workflows whose execution is paid for out of escrow and can be
//! triggered by anyone once a cooldown has elapsed.
//!
//! # Key Concepts
//!
//! - **Workflow**: a registered (destination, payload, resource ceiling)
//!   triple with activity and timing state.
//! - **Escrow**: value earmarked to pay for a workflow's future runs.
//! - **Resource units**: host-metered work consumed by a destination call,
//!   priced per unit.
//! - **Fee quote**: the fixed surcharge and fixed overhead a protocol fee
//!   oracle adds on top of metered consumption.
//! - **Observations**: the append-only event log describing what happened.
//!
//! # Architecture
//!
//! This is a pure types crate with no runtime dependencies. IDs use the
//! newtype pattern and implement `Display`. Amounts use checked arithmetic
//! so that settlement can refuse rather than wrap.

#![deny(unsafe_code)]

mod errors;
mod events;
mod fees;
mod ids;
mod units;
mod workflow;

pub use errors::*;
pub use events::*;
pub use fees::*;
pub use ids::*;
pub use units::*;
pub use workflow::*;
