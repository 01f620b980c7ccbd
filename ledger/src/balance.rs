//! Account balance tracking.

use chrono::{DateTime, Utc};
use parlaypool_common::NativeAmount;
use serde::{Deserialize, Serialize};

use crate::account::LedgerAccount;

/// Account balance at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account identifier.
    pub account: LedgerAccount,
    /// Balance in native collateral units.
    pub balance: NativeAmount,
    /// When this balance was last updated.
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    /// Create a new zero balance.
    pub fn zero(account: LedgerAccount) -> Self {
        Self {
            account,
            balance: NativeAmount::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// Check if account has sufficient funds for a transfer.
    pub fn has_sufficient_funds(&self, amount: NativeAmount) -> bool {
        self.balance >= amount
    }
}
