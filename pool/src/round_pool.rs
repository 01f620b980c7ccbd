//! Per-round collateral escrow and transfer planning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use parlaypool_common::{Amount, PoolError, Result, RoundIndex};
use parlaypool_ledger::{CollateralLedger, JournalBatch, LedgerAccount, Transfer};

use crate::normalization::{to_internal_units, to_native_units, to_native_units_exact};

/// Collateral escrow belonging to one round.
///
/// The balance lives on the ledger; the pool itself only tracks the payout
/// liability of the tickets it funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPool {
    round: RoundIndex,
    account: LedgerAccount,
    outstanding_exposure: Amount,
    created_at: DateTime<Utc>,
}

impl RoundPool {
    /// Create the pool for `round`.
    pub fn new(round: RoundIndex, created_at: DateTime<Utc>) -> Self {
        Self {
            round,
            account: LedgerAccount::RoundPool(round),
            outstanding_exposure: Amount::ZERO,
            created_at,
        }
    }

    pub fn round(&self) -> RoundIndex {
        self.round
    }

    /// Ledger account holding the pool's collateral.
    pub fn account(&self) -> &LedgerAccount {
        &self.account
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Sum of reserved payouts of the pool's unexercised tickets.
    pub fn outstanding_exposure(&self) -> Amount {
        self.outstanding_exposure
    }

    /// Collateral currently held, in internal units.
    pub fn balance(&self, ledger: &dyn CollateralLedger) -> Result<Amount> {
        to_internal_units(
            ledger.balance_of(&self.account),
            ledger.collateral().decimals(),
        )
    }

    /// Balance not backing reserved payouts.
    pub fn free_liquidity(&self, ledger: &dyn CollateralLedger) -> Result<Amount> {
        Ok(self.balance(ledger)?.saturating_sub(self.outstanding_exposure))
    }

    /// Reserve `payout` as a contingent liability.
    pub fn reserve(&mut self, payout: Amount) -> Result<()> {
        self.outstanding_exposure = self.outstanding_exposure.try_add(payout)?;
        debug!(round = %self.round, payout = %payout, exposure = %self.outstanding_exposure, "Payout reserved");
        Ok(())
    }

    /// Release a previously reserved payout.
    pub fn release(&mut self, payout: Amount) -> Result<()> {
        self.outstanding_exposure = self.outstanding_exposure.try_sub(payout).map_err(|_| {
            PoolError::InvalidAmount(format!(
                "release of {} exceeds exposure {} in round {}",
                payout, self.outstanding_exposure, self.round
            ))
        })?;
        Ok(())
    }
}

/// Builder for a ledger batch expressed in internal units.
///
/// Each transfer is converted to native units when planned and reports the
/// internal amount that will actually move.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    batch: JournalBatch,
    decimals: u32,
}

impl TransferPlan {
    /// Create an empty plan for a collateral with `decimals` precision.
    pub fn new(reference: impl Into<String>, decimals: u32) -> Self {
        Self {
            batch: JournalBatch::new(reference),
            decimals,
        }
    }

    /// Plan against the ledger's collateral.
    pub fn for_ledger(reference: impl Into<String>, ledger: &dyn CollateralLedger) -> Self {
        Self::new(reference, ledger.collateral().decimals())
    }

    /// Add a transfer of `amount` rounded down to native precision.
    /// Returns the internal amount that will move.
    pub fn transfer(
        &mut self,
        from: LedgerAccount,
        to: LedgerAccount,
        amount: Amount,
        memo: &str,
    ) -> Result<Amount> {
        let native = to_native_units(amount, self.decimals)?;
        let moved = to_internal_units(native, self.decimals)?;
        self.batch.add_transfer(Transfer::new(from, to, native, memo));
        Ok(moved)
    }

    /// Add a transfer that must be exactly representable in native units.
    pub fn transfer_exact(
        &mut self,
        from: LedgerAccount,
        to: LedgerAccount,
        amount: Amount,
        memo: &str,
    ) -> Result<Amount> {
        let native = to_native_units_exact(amount, self.decimals)?;
        self.batch.add_transfer(Transfer::new(from, to, native, memo));
        Ok(amount)
    }

    /// Whether the plan moves nothing.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Commit the plan to `ledger` in one atomic batch.
    pub fn commit(self, ledger: &dyn CollateralLedger) -> Result<()> {
        ledger.commit(self.batch).map(|_| ())
    }

    pub fn into_batch(self) -> JournalBatch {
        self.batch
    }
}
