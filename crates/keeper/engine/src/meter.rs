//! Resource metering.
//!
//! The engine never trusts a destination's own account of what it used.
//! It samples a monotonic counter immediately before and after the call
//! and charges the difference.

use keeper_types::ResourceUnits;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A monotonic counter of resource units consumed by the host.
pub trait ResourceMeter: Send + Sync {
    /// Units consumed so far
    fn sample(&self) -> ResourceUnits;
}

/// Counter shared between a host and the engine.
///
/// The host side calls [`SharedMeter::consume`] as work happens; the engine
/// side samples it. Clones observe the same counter.
#[derive(Clone, Debug, Default)]
pub struct SharedMeter {
    consumed: Arc<AtomicU64>,
}

impl SharedMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `units` of work. Saturates rather than wrapping.
    pub fn consume(&self, units: ResourceUnits) {
        let _ = self
            .consumed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(units.0))
            });
    }
}

impl ResourceMeter for SharedMeter {
    fn sample(&self) -> ResourceUnits {
        ResourceUnits::new(self.consumed.load(Ordering::SeqCst))
    }
}

/// Units consumed between two samples
pub fn consumed_between(before: ResourceUnits, after: ResourceUnits) -> ResourceUnits {
    after.saturating_sub(before)
}
