//! Escrow ledger: funded balances keyed by workflow and funder
//!
//! Each workflow has one `EscrowAccount` holding a sub-balance per funder
//! plus an aggregate total. The aggregate always equals the sum of the
//! sub-balances, and no balance can go negative: every decrease is checked
//! and rejected as a whole before anything is mutated.
//!
//! Settlement debits are drawn from funders in FIFO order of their first
//! deposit. Withdrawals only ever touch the requesting funder's own
//! sub-balance.

#![deny(unsafe_code)]

use keeper_types::{ActorId, Amount, KeeperError, KeeperResult, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// One funder's share of a workflow's escrow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunderBalance {
    pub funder: ActorId,
    pub amount: Amount,
}

/// Escrow held for a single workflow
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccount {
    /// Aggregate of all funder balances
    total: Amount,
    /// Funder balances, in order of first deposit
    funders: Vec<FunderBalance>,
}

impl EscrowAccount {
    pub fn total(&self) -> Amount {
        self.total
    }

    pub fn funders(&self) -> &[FunderBalance] {
        &self.funders
    }

    pub fn balance_of(&self, funder: &ActorId) -> Amount {
        self.funders
            .iter()
            .find(|f| f.funder == *funder)
            .map(|f| f.amount)
            .unwrap_or_default()
    }

    fn credit(&mut self, funder: &ActorId, amount: Amount) -> KeeperResult<Amount> {
        let total = self
            .total
            .checked_add(amount)
            .ok_or(KeeperError::ArithmeticOverflow("escrow total"))?;

        match self.funders.iter_mut().find(|f| f.funder == *funder) {
            Some(entry) => {
                entry.amount = entry
                    .amount
                    .checked_add(amount)
                    .ok_or(KeeperError::ArithmeticOverflow("funder balance"))?;
            }
            None => self.funders.push(FunderBalance {
                funder: funder.clone(),
                amount,
            }),
        }
        self.total = total;
        Ok(total)
    }

    fn draw_fifo(&mut self, amount: Amount) -> Vec<FunderBalance> {
        let mut remaining = amount;
        let mut drawn = Vec::new();
        for entry in self.funders.iter_mut() {
            if remaining.is_zero() {
                break;
            }
            let take = remaining.min(entry.amount);
            if take.is_zero() {
                continue;
            }
            entry.amount = entry.amount.saturating_sub(take);
            remaining = remaining.saturating_sub(take);
            drawn.push(FunderBalance {
                funder: entry.funder.clone(),
                amount: take,
            });
        }
        self.total = self.total.saturating_sub(amount);
        drawn
    }
}

/// The escrow ledger
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EscrowLedger {
    accounts: BTreeMap<WorkflowId, EscrowAccount>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `funder`'s share of `id`'s escrow.
    ///
    /// Prefund sizing is the caller's concern; the ledger accepts any
    /// amount. Returns the workflow's new aggregate balance.
    pub fn deposit(
        &mut self,
        id: WorkflowId,
        funder: &ActorId,
        amount: Amount,
    ) -> KeeperResult<Amount> {
        let total = self.accounts.entry(id).or_default().credit(funder, amount)?;

        info!(
            workflow_id = %id,
            funder = %funder,
            amount = amount.0,
            total = total.0,
            "Escrow deposited"
        );
        Ok(total)
    }

    /// Debit `amount` from `id`'s escrow for settlement.
    ///
    /// Fails with `InsufficientEscrow` if `amount` exceeds the aggregate,
    /// leaving every balance unchanged. Returns what was drawn from each
    /// funder.
    pub fn debit(&mut self, id: WorkflowId, amount: Amount) -> KeeperResult<Vec<FunderBalance>> {
        let available = self.balance(id);
        if amount > available {
            warn!(
                workflow_id = %id,
                required = amount.0,
                available = available.0,
                "Escrow debit rejected"
            );
            return Err(KeeperError::InsufficientEscrow {
                id,
                required: amount,
                available,
            });
        }
        if amount.is_zero() {
            return Ok(Vec::new());
        }

        let account = self
            .accounts
            .get_mut(&id)
            .ok_or(KeeperError::InsufficientEscrow {
                id,
                required: amount,
                available,
            })?;
        let drawn = account.draw_fifo(amount);

        debug!(
            workflow_id = %id,
            amount = amount.0,
            remaining = account.total.0,
            "Escrow debited"
        );
        Ok(drawn)
    }

    /// Withdraw `amount` from `funder`'s own share of `id`'s escrow.
    ///
    /// Only a funder of record may withdraw, and only a non-zero amount no
    /// larger than its share. Fails with `PermissionDenied`, `ZeroAmount`
    /// or `InsufficientBalance` respectively, leaving every balance
    /// unchanged.
    pub fn withdraw(&mut self, id: WorkflowId, funder: &ActorId, amount: Amount) -> KeeperResult<()> {
        let Some(account) = self
            .accounts
            .get_mut(&id)
            .filter(|a| a.funders.iter().any(|f| f.funder == *funder))
        else {
            warn!(workflow_id = %id, funder = %funder, "Withdrawal by non-funder rejected");
            return Err(KeeperError::permission_denied(funder, "withdraw escrow it did not fund"));
        };
        if amount.is_zero() {
            return Err(KeeperError::ZeroAmount("escrow withdrawal"));
        }
        let available = account.balance_of(funder);
        if amount > available {
            warn!(
                workflow_id = %id,
                funder = %funder,
                requested = amount.0,
                available = available.0,
                "Escrow withdrawal rejected"
            );
            return Err(KeeperError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        if let Some(entry) = account.funders.iter_mut().find(|f| f.funder == *funder) {
            entry.amount = entry.amount.saturating_sub(amount);
        }
        account.total = account.total.saturating_sub(amount);

        info!(
            workflow_id = %id,
            funder = %funder,
            amount = amount.0,
            "Escrow withdrawn"
        );
        Ok(())
    }

    /// Whether `funder` has ever funded `id`
    pub fn is_funder(&self, id: WorkflowId, funder: &ActorId) -> bool {
        self.funders(id).iter().any(|f| f.funder == *funder)
    }

    /// Aggregate escrow for a workflow (zero if never funded)
    pub fn balance(&self, id: WorkflowId) -> Amount {
        self.accounts
            .get(&id)
            .map(EscrowAccount::total)
            .unwrap_or_default()
    }

    /// One funder's share of a workflow's escrow
    pub fn funder_balance(&self, id: WorkflowId, funder: &ActorId) -> Amount {
        self.accounts
            .get(&id)
            .map(|a| a.balance_of(funder))
            .unwrap_or_default()
    }

    pub fn account(&self, id: WorkflowId) -> Option<&EscrowAccount> {
        self.accounts.get(&id)
    }

    pub fn funders(&self, id: WorkflowId) -> &[FunderBalance] {
        self.accounts
            .get(&id)
            .map(EscrowAccount::funders)
            .unwrap_or(&[])
    }

    /// Total escrow held across all workflows
    pub fn total_escrowed(&self) -> Amount {
        self.accounts
            .values()
            .fold(Amount::zero(), |acc, a| acc.saturating_add(a.total))
    }

    /// Whether every account's aggregate equals the sum of its funder shares
    pub fn is_consistent(&self) -> bool {
        self.accounts.values().all(|a| {
            a.funders
                .iter()
                .try_fold(Amount::zero(), |acc, f| acc.checked_add(f.amount))
                == Some(a.total)
        })
    }
}
