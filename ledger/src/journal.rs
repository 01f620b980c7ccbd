//! Journal entry types for double-entry bookkeeping of collateral transfers.

use chrono::{DateTime, Utc};
use parlaypool_common::NativeAmount;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::LedgerAccount;

/// Type of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Collateral leaving an account.
    Debit,
    /// Collateral arriving in an account.
    Credit,
}

/// A single movement of collateral between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Unique transfer ID shared by its debit and credit entries.
    pub id: Uuid,
    /// Source account.
    pub from: LedgerAccount,
    /// Destination account.
    pub to: LedgerAccount,
    /// Amount in native units.
    pub amount: NativeAmount,
    /// What the transfer is for.
    pub memo: String,
}

impl Transfer {
    /// Create a new transfer.
    pub fn new(
        from: LedgerAccount,
        to: LedgerAccount,
        amount: NativeAmount,
        memo: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            from,
            to,
            amount,
            memo: memo.into(),
        }
    }
}

/// A single journal entry in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// Transfer this entry belongs to.
    pub transfer_id: Uuid,
    /// Batch this entry was committed in.
    pub batch_reference: String,
    /// Account affected.
    pub account: LedgerAccount,
    /// Entry type (debit or credit).
    pub entry_type: EntryType,
    /// Amount.
    pub amount: NativeAmount,
    /// Balance after this entry.
    pub balance_after: NativeAmount,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Create a debit entry.
    pub fn debit(
        transfer: &Transfer,
        batch_reference: &str,
        balance_after: NativeAmount,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transfer_id: transfer.id,
            batch_reference: batch_reference.to_string(),
            account: transfer.from.clone(),
            entry_type: EntryType::Debit,
            amount: transfer.amount,
            balance_after,
            created_at: Utc::now(),
        }
    }

    /// Create a credit entry.
    pub fn credit(
        transfer: &Transfer,
        batch_reference: &str,
        balance_after: NativeAmount,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transfer_id: transfer.id,
            batch_reference: batch_reference.to_string(),
            account: transfer.to.clone(),
            entry_type: EntryType::Credit,
            amount: transfer.amount,
            balance_after,
            created_at: Utc::now(),
        }
    }

    /// Get signed amount (negative for debits).
    pub fn signed_amount(&self) -> i128 {
        let amount = self.amount.raw() as i128;
        match self.entry_type {
            EntryType::Debit => -amount,
            EntryType::Credit => amount,
        }
    }
}

/// Verify that a set of entries is balanced (debits == credits).
pub fn is_balanced(entries: &[JournalEntry]) -> bool {
    entries.iter().map(JournalEntry::signed_amount).sum::<i128>() == 0
}

/// A batch of transfers that must be committed together or not at all.
#[derive(Debug, Clone)]
pub struct JournalBatch {
    /// Transfers in the batch.
    transfers: Vec<Transfer>,
    /// Reference for the batch (operation name, ticket ID, etc.).
    reference: String,
}

impl JournalBatch {
    /// Create a new batch.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            transfers: Vec::new(),
            reference: reference.into(),
        }
    }

    /// Add a transfer to the batch. Zero-amount transfers are dropped.
    pub fn add_transfer(&mut self, transfer: Transfer) {
        if !transfer.amount.is_zero() {
            self.transfers.push(transfer);
        }
    }

    /// Transfers in commit order.
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    /// Batch reference.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Check if the batch moves nothing.
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Net native-unit change the batch applies to `account`.
    pub fn net_change(&self, account: &LedgerAccount) -> i128 {
        self.transfers
            .iter()
            .map(|t| {
                let amount = t.amount.raw() as i128;
                match (&t.from == account, &t.to == account) {
                    (true, false) => -amount,
                    (false, true) => amount,
                    _ => 0,
                }
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlaypool_common::RoundIndex;

    #[test]
    fn test_batch_drops_zero_transfers() {
        let mut batch = JournalBatch::new("test");
        batch.add_transfer(Transfer::new(
            LedgerAccount::user("alice"),
            LedgerAccount::RoundPool(RoundIndex::new(2)),
            NativeAmount::ZERO,
            "deposit",
        ));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_net_change() {
        let pool = LedgerAccount::RoundPool(RoundIndex::new(2));
        let mut batch = JournalBatch::new("test");
        batch.add_transfer(Transfer::new(
            LedgerAccount::user("alice"),
            pool.clone(),
            NativeAmount::new(1000),
            "stake",
        ));
        batch.add_transfer(Transfer::new(
            pool.clone(),
            LedgerAccount::user("bob"),
            NativeAmount::new(300),
            "payout",
        ));

        assert_eq!(batch.net_change(&pool), 700);
        assert_eq!(batch.net_change(&LedgerAccount::user("alice")), -1000);
    }

    #[test]
    fn test_entry_pair_is_balanced() {
        let transfer = Transfer::new(
            LedgerAccount::user("alice"),
            LedgerAccount::SafeBox,
            NativeAmount::new(1000),
            "profit share",
        );
        let entries = vec![
            JournalEntry::debit(&transfer, "test", NativeAmount::ZERO),
            JournalEntry::credit(&transfer, "test", NativeAmount::new(1000)),
        ];
        assert!(is_balanced(&entries));
        assert!(!is_balanced(&entries[..1]));
    }
}
