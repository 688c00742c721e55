//! Fee quotes and cost formulas
//!
//! Prefund sizing and settlement share one formula:
//! `(units + overhead_units) * unit_price + surcharge`. Prefunding prices
//! the workflow's resource ceiling; settlement prices what was measured.
//! With no fee oracle the quote is zero and both reduce to
//! `units * unit_price`.

use crate::{Amount, KeeperError, KeeperResult, ResourceUnits};
use serde::{Deserialize, Serialize};

/// Protocol surcharge and fixed overhead supplied by a fee oracle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FeeQuote {
    /// Flat value added to every charge
    pub surcharge: Amount,
    /// Units charged on top of measured consumption
    pub overhead_units: ResourceUnits,
}

impl FeeQuote {
    pub fn new(surcharge: Amount, overhead_units: ResourceUnits) -> Self {
        Self {
            surcharge,
            overhead_units,
        }
    }

    /// The quote used when no oracle is attached
    pub fn zero() -> Self {
        Self::default()
    }

    /// Price `units` under this quote.
    pub fn charge(&self, units: ResourceUnits, unit_price: Amount) -> KeeperResult<Amount> {
        let billable = units
            .checked_add(self.overhead_units)
            .ok_or(KeeperError::ArithmeticOverflow("billable units"))?;
        billable
            .priced_at(unit_price)
            .and_then(|base| base.checked_add(self.surcharge))
            .ok_or(KeeperError::ArithmeticOverflow("charge"))
    }

    /// Minimum deposit that covers one run at the full resource ceiling.
    pub fn prefund_for(
        &self,
        max_resource_limit: ResourceUnits,
        unit_price: Amount,
    ) -> KeeperResult<Amount> {
        self.charge(max_resource_limit, unit_price)
    }
}
