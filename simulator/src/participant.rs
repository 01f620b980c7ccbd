//! Simulated pool participants.

use parlaypool_common::{Amount, NativeAmount, UserId};
use parlaypool_ledger::{CollateralLedger, InMemoryLedger, LedgerAccount};
use parlaypool_pool::{to_internal_units, to_native_units};

/// What a participant does in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Depositor,
    Trader,
}

/// A simulated wallet holder.
#[derive(Debug, Clone)]
pub struct SimulatedParticipant {
    /// Participant identifier.
    pub id: UserId,
    pub role: Role,
    /// Collateral minted into the wallet at creation.
    pub initial_funding: Amount,
}

impl SimulatedParticipant {
    /// Create a new participant.
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            initial_funding: Amount::ZERO,
        }
    }

    /// Mint `amount` into the participant's wallet.
    pub fn fund(&mut self, ledger: &InMemoryLedger, amount: Amount) -> anyhow::Result<()> {
        let native = to_native_units(amount, ledger.collateral().decimals())?;
        ledger.mint(&self.account(), native)?;
        self.initial_funding = self.initial_funding.try_add(amount)?;
        Ok(())
    }

    /// Ledger account of the wallet.
    pub fn account(&self) -> LedgerAccount {
        LedgerAccount::User(self.id.clone())
    }

    /// Current wallet balance in internal units.
    pub fn wallet_balance(&self, ledger: &dyn CollateralLedger) -> anyhow::Result<Amount> {
        let native: NativeAmount = ledger.balance_of(&self.account());
        Ok(to_internal_units(native, ledger.collateral().decimals())?)
    }
}

/// Participant factory for creating test wallets.
pub struct ParticipantFactory;

impl ParticipantFactory {
    /// Create `count` depositors.
    pub fn create_depositors(count: usize) -> Vec<SimulatedParticipant> {
        let names = [
            "alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi", "ivan", "judy",
        ];

        (0..count)
            .map(|i| match names.get(i) {
                Some(name) => SimulatedParticipant::new(*name, Role::Depositor),
                None => SimulatedParticipant::new(format!("depositor-{}", i + 1), Role::Depositor),
            })
            .collect()
    }

    /// Create `count` traders.
    pub fn create_traders(count: usize) -> Vec<SimulatedParticipant> {
        (0..count)
            .map(|i| SimulatedParticipant::new(format!("trader-{}", i + 1), Role::Trader))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlaypool_common::Collateral;

    #[test]
    fn test_factory_names() {
        let depositors = ParticipantFactory::create_depositors(12);
        assert_eq!(depositors.len(), 12);
        assert_eq!(depositors[0].id.as_str(), "alice");
        assert_eq!(depositors[11].id.as_str(), "depositor-12");
        assert!(depositors.iter().all(|d| d.role == Role::Depositor));
    }

    #[test]
    fn test_fund_mints_native_units() {
        let ledger = InMemoryLedger::new(Collateral::wbtc());
        let mut trader = ParticipantFactory::create_traders(1).remove(0);
        trader.fund(&ledger, Amount::from_units(3)).unwrap();

        assert_eq!(ledger.balance_of(&trader.account()), NativeAmount::new(300_000_000));
        assert_eq!(trader.wallet_balance(&ledger).unwrap(), Amount::from_units(3));
        assert_eq!(trader.initial_funding, Amount::from_units(3));
    }
}
