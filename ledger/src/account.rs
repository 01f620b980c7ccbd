//! Account definitions for the collateral ledger.

use parlaypool_common::{RoundIndex, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A holder of collateral on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LedgerAccount {
    /// A depositor's or trader's wallet.
    User(UserId),
    /// Escrow of one round. Round 1 is the default liquidity provider's pool.
    RoundPool(RoundIndex),
    /// Wallet of the default liquidity provider.
    DefaultLiquidityProvider,
    /// Protocol treasury receiving its share of round profit.
    SafeBox,
    /// Recipient of trading fees.
    FeeCollector,
}

impl LedgerAccount {
    /// Wallet of a user.
    pub fn user(id: impl Into<UserId>) -> Self {
        LedgerAccount::User(id.into())
    }

    /// Check if this account is a round escrow.
    pub fn is_round_pool(&self) -> bool {
        matches!(self, LedgerAccount::RoundPool(_))
    }

    /// Create a canonical string representation.
    pub fn canonical(&self) -> String {
        match self {
            LedgerAccount::User(id) => format!("user:{}", id),
            LedgerAccount::RoundPool(round) => format!("round-pool:{}", round),
            LedgerAccount::DefaultLiquidityProvider => "default-lp".to_string(),
            LedgerAccount::SafeBox => "safe-box".to_string(),
            LedgerAccount::FeeCollector => "fee-collector".to_string(),
        }
    }
}

impl fmt::Display for LedgerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_canonical() {
        assert_eq!(LedgerAccount::user("alice").canonical(), "user:alice");
        assert_eq!(
            LedgerAccount::RoundPool(RoundIndex::new(3)).canonical(),
            "round-pool:3"
        );
        assert!(LedgerAccount::RoundPool(RoundIndex::DEFAULT).is_round_pool());
        assert!(!LedgerAccount::SafeBox.is_round_pool());
    }
}
