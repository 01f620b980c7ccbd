//! Core ledger implementation.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use parlaypool_common::{Collateral, NativeAmount, PoolError, Result};

use crate::account::LedgerAccount;
use crate::balance::AccountBalance;
use crate::journal::{is_balanced, JournalBatch, JournalEntry};

/// A store of collateral balances that moves funds only through journaled
/// batches.
pub trait CollateralLedger: Send + Sync {
    /// Collateral token held by the ledger.
    fn collateral(&self) -> &Collateral;

    /// Current balance of an account. Unknown accounts hold zero.
    fn balance_of(&self, account: &LedgerAccount) -> NativeAmount;

    /// Apply every transfer in the batch, or none of them.
    fn commit(&self, batch: JournalBatch) -> Result<Vec<JournalEntry>>;
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: BTreeMap<LedgerAccount, AccountBalance>,
    journal: Vec<JournalEntry>,
    minted: u128,
}

/// In-process ledger keeping balances and the journal in memory.
pub struct InMemoryLedger {
    collateral: Collateral,
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    /// Create a new empty ledger for `collateral`.
    pub fn new(collateral: Collateral) -> Self {
        Self {
            collateral,
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Credit an account with fresh collateral from outside the system.
    #[instrument(skip(self))]
    pub fn mint(&self, account: &LedgerAccount, amount: NativeAmount) -> Result<NativeAmount> {
        let mut state = self.state.write();
        let minted = state
            .minted
            .checked_add(amount.raw())
            .ok_or_else(|| PoolError::ArithmeticOverflow("mint".to_string()))?;

        let entry = state
            .balances
            .entry(account.clone())
            .or_insert_with(|| AccountBalance::zero(account.clone()));
        let balance = entry
            .balance
            .checked_add(amount)
            .ok_or_else(|| PoolError::ArithmeticOverflow("mint".to_string()))?;
        entry.balance = balance;
        entry.updated_at = chrono::Utc::now();
        state.minted = minted;

        debug!(account = %account, amount = %amount, "Minted collateral");
        Ok(balance)
    }

    /// All journal entries in commit order.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.state.read().journal.clone()
    }

    /// Journal entries committed under `reference`.
    pub fn entries_for(&self, reference: &str) -> Vec<JournalEntry> {
        self.state
            .read()
            .journal
            .iter()
            .filter(|e| e.batch_reference == reference)
            .cloned()
            .collect()
    }

    /// Balances of every account the ledger has seen.
    pub fn snapshot(&self) -> Vec<AccountBalance> {
        self.state.read().balances.values().cloned().collect()
    }

    /// Total collateral ever minted into the ledger.
    pub fn total_supply(&self) -> NativeAmount {
        NativeAmount::new(self.state.read().minted)
    }

    /// Verify ledger integrity: the journal is balanced and account
    /// balances add up to the minted supply.
    pub fn verify_integrity(&self) -> bool {
        let state = self.state.read();
        let held: Option<u128> = state
            .balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(b.balance.raw()));

        let ok = is_balanced(&state.journal) && held == Some(state.minted);
        if !ok {
            warn!(minted = state.minted, held = ?held, "Ledger integrity check failed");
        }
        ok
    }
}

impl CollateralLedger for InMemoryLedger {
    fn collateral(&self) -> &Collateral {
        &self.collateral
    }

    fn balance_of(&self, account: &LedgerAccount) -> NativeAmount {
        self.state
            .read()
            .balances
            .get(account)
            .map(|b| b.balance)
            .unwrap_or(NativeAmount::ZERO)
    }

    #[instrument(skip(self, batch), fields(reference = %batch.reference()))]
    fn commit(&self, batch: JournalBatch) -> Result<Vec<JournalEntry>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.write();

        // Validate against projected balances before touching state.
        let mut projected: BTreeMap<LedgerAccount, NativeAmount> = BTreeMap::new();
        let mut entries = Vec::with_capacity(batch.transfers().len() * 2);

        for transfer in batch.transfers() {
            if transfer.from == transfer.to {
                return Err(PoolError::InvalidAmount(format!(
                    "self-transfer on {}",
                    transfer.from
                )));
            }

            let from_balance = *projected.entry(transfer.from.clone()).or_insert_with(|| {
                state
                    .balances
                    .get(&transfer.from)
                    .map(|b| b.balance)
                    .unwrap_or(NativeAmount::ZERO)
            });
            let from_after = from_balance.checked_sub(transfer.amount).ok_or_else(|| {
                PoolError::InsufficientFunds {
                    account: transfer.from.canonical(),
                    required: transfer.amount.to_string(),
                    available: from_balance.to_string(),
                }
            })?;
            projected.insert(transfer.from.clone(), from_after);

            let to_balance = *projected.entry(transfer.to.clone()).or_insert_with(|| {
                state
                    .balances
                    .get(&transfer.to)
                    .map(|b| b.balance)
                    .unwrap_or(NativeAmount::ZERO)
            });
            let to_after = to_balance
                .checked_add(transfer.amount)
                .ok_or_else(|| PoolError::ArithmeticOverflow(transfer.to.canonical()))?;
            projected.insert(transfer.to.clone(), to_after);

            entries.push(JournalEntry::debit(transfer, batch.reference(), from_after));
            entries.push(JournalEntry::credit(transfer, batch.reference(), to_after));
        }

        let now = chrono::Utc::now();
        for (account, balance) in projected {
            let slot = state
                .balances
                .entry(account.clone())
                .or_insert_with(|| AccountBalance::zero(account));
            slot.balance = balance;
            slot.updated_at = now;
        }
        state.journal.extend(entries.iter().cloned());

        info!(
            transfers = batch.transfers().len(),
            entries = entries.len(),
            "Batch committed"
        );

        Ok(entries)
    }
}
