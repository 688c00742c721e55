//! Service settings: the owner identity and economic constants
//!
//! These are fixed for the lifetime of a [`Keeper`](crate::Keeper). There
//! is no owner rotation. Default settings name no owner: until one is
//! configured, no actor passes the owner check.

use keeper_types::{ActorId, Amount};
use serde::{Deserialize, Serialize};

/// One day, in seconds
pub const DEFAULT_COOLDOWN_SECS: u64 = 86_400;

/// Who may trigger a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    /// Any actor may run a funded, active workflow and is reimbursed
    #[default]
    AnyCaller,
    /// Only the workflow's owner may run it
    OwnerOnly,
}

/// Keeper service settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeeperSettings {
    /// Privileged actor for administrative operations
    pub owner: ActorId,

    /// Price of one resource unit
    #[serde(default = "default_unit_price")]
    pub unit_price: Amount,

    /// Minimum seconds between runs of one workflow
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Who may trigger runs
    #[serde(default)]
    pub run_policy: RunPolicy,
}

impl KeeperSettings {
    pub fn new(owner: ActorId) -> Self {
        Self {
            owner,
            unit_price: default_unit_price(),
            cooldown_secs: default_cooldown_secs(),
            run_policy: RunPolicy::default(),
        }
    }

    pub fn with_unit_price(mut self, unit_price: Amount) -> Self {
        self.unit_price = unit_price;
        self
    }

    pub fn with_cooldown_secs(mut self, cooldown_secs: u64) -> Self {
        self.cooldown_secs = cooldown_secs;
        self
    }

    pub fn with_run_policy(mut self, run_policy: RunPolicy) -> Self {
        self.run_policy = run_policy;
        self
    }

    /// Whether an owner has been configured
    pub fn has_owner(&self) -> bool {
        !self.owner.as_str().trim().is_empty()
    }
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self::new(ActorId::new(""))
    }
}

fn default_unit_price() -> Amount {
    Amount::new(1)
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}
