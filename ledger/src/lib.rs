//! ParlayPool Collateral Ledger
//!
//! Double-entry ledger for collateral held by users, round pools and the
//! protocol accounts. Batches commit atomically.

pub mod account;
pub mod balance;
pub mod journal;
pub mod ledger;

pub use account::LedgerAccount;
pub use balance::AccountBalance;
pub use journal::{is_balanced, EntryType, JournalBatch, JournalEntry, Transfer};
pub use ledger::{CollateralLedger, InMemoryLedger};
