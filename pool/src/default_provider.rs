//! Default liquidity provider backing round 1.
//!
//! Tickets whose settlement round cannot be known at trade time are funded
//! from round 1's pool. The provider's result is tracked apart from round
//! PnL.

use serde::{Deserialize, Serialize};
use tracing::info;

use parlaypool_common::{Amount, Result, RoundIndex};
use parlaypool_ledger::LedgerAccount;

/// Net result of the default liquidity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfitAndLoss {
    Profit(Amount),
    Loss(Amount),
}

impl ProfitAndLoss {
    /// Net result from what came in and went out.
    pub fn from_flows(received: Amount, paid: Amount) -> Self {
        if received >= paid {
            ProfitAndLoss::Profit(received.saturating_sub(paid))
        } else {
            ProfitAndLoss::Loss(paid.saturating_sub(received))
        }
    }

    pub fn is_loss(&self) -> bool {
        matches!(self, ProfitAndLoss::Loss(a) if !a.is_zero())
    }
}

/// Standing capital source for round 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultLiquidityProvider {
    /// Collateral moved from the provider's wallet into round 1.
    pub funded: Amount,
    /// Collateral returned to the provider's wallet.
    pub withdrawn: Amount,
    /// Net stakes received from round-1 tickets.
    pub stakes_received: Amount,
    /// Net stakes of round-1 tickets that have been exercised.
    pub stakes_settled: Amount,
    /// Amounts paid out to round-1 ticket holders.
    pub payouts_paid: Amount,
    /// Tickets bound to round 1.
    pub tickets_funded: u64,
    /// Round-1 tickets exercised.
    pub tickets_exercised: u64,
}

impl DefaultLiquidityProvider {
    /// Create a provider with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Round whose pool the provider backs.
    pub fn round(&self) -> RoundIndex {
        RoundIndex::DEFAULT
    }

    /// Wallet the provider funds from.
    pub fn wallet(&self) -> LedgerAccount {
        LedgerAccount::DefaultLiquidityProvider
    }

    /// Pool account the provider's liquidity sits in.
    pub fn pool_account(&self) -> LedgerAccount {
        LedgerAccount::RoundPool(RoundIndex::DEFAULT)
    }

    pub fn record_funding(&mut self, amount: Amount) -> Result<()> {
        self.funded = self.funded.try_add(amount)?;
        info!(amount = %amount, total = %self.funded, "Default liquidity funded");
        Ok(())
    }

    pub fn record_withdrawal(&mut self, amount: Amount) -> Result<()> {
        self.withdrawn = self.withdrawn.try_add(amount)?;
        info!(amount = %amount, total = %self.withdrawn, "Default liquidity withdrawn");
        Ok(())
    }

    /// Record a trade bound to round 1.
    pub fn record_trade(&mut self, net_stake: Amount) -> Result<()> {
        self.stakes_received = self.stakes_received.try_add(net_stake)?;
        self.tickets_funded += 1;
        Ok(())
    }

    /// Record the exercise of a round-1 ticket with net stake `net_stake`.
    pub fn record_exercise(&mut self, net_stake: Amount, paid: Amount) -> Result<()> {
        self.stakes_settled = self.stakes_settled.try_add(net_stake)?;
        self.payouts_paid = self.payouts_paid.try_add(paid)?;
        self.tickets_exercised += 1;
        Ok(())
    }

    /// Tickets still open against round 1.
    pub fn open_tickets(&self) -> u64 {
        self.tickets_funded.saturating_sub(self.tickets_exercised)
    }

    /// Stakes still backing open round-1 tickets.
    pub fn open_stakes(&self) -> Amount {
        self.stakes_received.saturating_sub(self.stakes_settled)
    }

    /// Realized result: stakes of exercised tickets minus payouts paid.
    pub fn profit(&self) -> ProfitAndLoss {
        ProfitAndLoss::from_flows(self.stakes_settled, self.payouts_paid)
    }
}
