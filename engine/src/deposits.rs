//! Deposits, withdrawal requests and default liquidity.

use tracing::{info, instrument};

use parlaypool_common::{Amount, PoolError, Ratio, Result, RoundIndex, UserId};
use parlaypool_ledger::LedgerAccount;
use parlaypool_pool::TransferPlan;

use crate::engine::RoundAccountingEngine;
use crate::events::PoolEvent;
use crate::state::WithdrawalRequest;

impl RoundAccountingEngine {
    /// Deposit into the pool. The deposit is staged for the next round and
    /// starts earning from that round's start. Returns the staging round.
    #[instrument(skip(self), fields(user = %user, amount = %amount))]
    pub fn deposit(&mut self, user: &UserId, amount: Amount) -> Result<RoundIndex> {
        if amount.is_zero() {
            return Err(PoolError::InvalidAmount("deposit must be positive".to_string()));
        }
        if self.state.closing_prepared() {
            return Err(PoolError::RoundClosingPrepared(self.state.round));
        }
        if self.state.withdrawal_requests.contains_key(user) {
            return Err(PoolError::WithdrawalAlreadyRequested(user.clone()));
        }
        if amount < self.limits.min_deposit_amount {
            return Err(PoolError::DepositBelowMinimum {
                amount: amount.to_string(),
                minimum: self.limits.min_deposit_amount.to_string(),
            });
        }

        let current = self.state.round;
        let staging = self.state.staging_round();

        let held = self
            .state
            .book
            .balance(current, user)
            .try_add(self.state.book.balance(staging, user))?;
        if held.try_add(amount)? > self.limits.max_allowed_deposit {
            return Err(PoolError::DepositLimitExceeded {
                user: user.clone(),
                maximum: self.limits.max_allowed_deposit.to_string(),
            });
        }

        let users = self.state.active_users();
        if !users.contains(user) && users.len() >= self.limits.max_allowed_users {
            return Err(PoolError::MaxUsersReached(self.limits.max_allowed_users));
        }

        let staged_after = self.state.book.balance(staging, user).try_add(amount)?;

        self.ensure_round(staging)?;
        let mut plan = TransferPlan::for_ledger(format!("deposit:{}:{}", staging, user), &*self.ledger);
        plan.transfer_exact(
            LedgerAccount::User(user.clone()),
            LedgerAccount::RoundPool(staging),
            amount,
            "deposit",
        )?;
        plan.commit(&*self.ledger)?;

        self.state.book.credit(staging, user, amount)?;
        self.metrics.deposit_accepted();

        info!(round = %staging, staged = %staged_after, "Deposit staged");
        self.emit(PoolEvent::Deposited {
            user: user.clone(),
            round: staging,
            amount,
        });

        Ok(staging)
    }

    /// Request to withdraw the whole balance at the end of the current round.
    #[instrument(skip(self), fields(user = %user))]
    pub fn withdrawal_request(&mut self, user: &UserId) -> Result<()> {
        self.request_withdrawal(user, None)
    }

    /// Request to withdraw `share` of the balance at the end of the current
    /// round. The rest is rolled forward.
    #[instrument(skip(self), fields(user = %user, share = %share))]
    pub fn partial_withdrawal_request(&mut self, user: &UserId, share: Ratio) -> Result<()> {
        if share == Ratio::ZERO || share >= Ratio::ONE {
            return Err(PoolError::InvalidWithdrawalShare(share.to_string()));
        }
        self.request_withdrawal(user, Some(share))
    }

    fn request_withdrawal(&mut self, user: &UserId, share: Option<Ratio>) -> Result<()> {
        if !self.state.started {
            return Err(PoolError::PoolNotStarted);
        }
        let round = self.state.round;
        if self.state.closing_prepared() {
            return Err(PoolError::RoundClosingPrepared(round));
        }
        if self.state.withdrawal_requests.contains_key(user) {
            return Err(PoolError::WithdrawalAlreadyRequested(user.clone()));
        }
        if !self.state.book.holds(round, user) {
            return Err(PoolError::NothingToWithdraw(user.clone()));
        }

        let request = WithdrawalRequest {
            round,
            share,
            requested_at: self.now(),
        };
        self.state.withdrawal_requests.insert(user.clone(), request);

        info!(round = %round, full = share.is_none(), "Withdrawal requested");
        self.emit(PoolEvent::WithdrawalRequested {
            user: user.clone(),
            round,
            share,
        });
        Ok(())
    }

    /// Move collateral from the default liquidity provider's wallet into
    /// round 1.
    #[instrument(skip(self), fields(amount = %amount))]
    pub fn fund_default_liquidity(&mut self, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(PoolError::InvalidAmount("funding must be positive".to_string()));
        }
        let provider = &self.state.default_provider;
        provider.funded.try_add(amount)?;

        let mut plan = TransferPlan::for_ledger("default-lp:fund", &*self.ledger);
        plan.transfer_exact(provider.wallet(), provider.pool_account(), amount, "default liquidity")?;
        plan.commit(&*self.ledger)?;

        self.state.default_provider.record_funding(amount)?;
        self.emit(PoolEvent::DefaultLiquidityFunded { amount });
        Ok(())
    }

    /// Return round-1 collateral not backing open round-1 tickets to the
    /// provider's wallet.
    #[instrument(skip(self), fields(amount = %amount))]
    pub fn withdraw_default_liquidity(&mut self, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(PoolError::InvalidAmount("withdrawal must be positive".to_string()));
        }
        let round = RoundIndex::DEFAULT;
        let pool = self
            .state
            .pools
            .get(round)
            .ok_or(PoolError::UnknownRound(round))?;
        let free = pool.free_liquidity(&*self.ledger)?;
        if amount > free {
            return Err(PoolError::InsufficientLiquidity {
                round,
                required: amount.to_string(),
                available: free.to_string(),
            });
        }

        let provider = &self.state.default_provider;
        let mut plan = TransferPlan::for_ledger("default-lp:withdraw", &*self.ledger);
        plan.transfer_exact(provider.pool_account(), provider.wallet(), amount, "default liquidity")?;
        plan.commit(&*self.ledger)?;

        self.state.default_provider.record_withdrawal(amount)?;
        self.emit(PoolEvent::DefaultLiquidityWithdrawn { amount });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::PoolConfig;
    use crate::oracle::InMemoryOracle;
    use parlaypool_common::{Collateral, ManualClock, NativeAmount};
    use parlaypool_ledger::{CollateralLedger, InMemoryLedger};
    use rust_decimal_macros::dec;

    fn setup(config: PoolConfig) -> (RoundAccountingEngine, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new(Collateral::usdc()));
        for name in ["alice", "bob", "carol"] {
            ledger
                .mint(&LedgerAccount::user(name), NativeAmount::new(1_000_000_000_000))
                .unwrap();
        }
        ledger
            .mint(&LedgerAccount::DefaultLiquidityProvider, NativeAmount::new(50_000_000_000))
            .unwrap();
        let engine = RoundAccountingEngine::new(
            config,
            ledger.clone(),
            Arc::new(InMemoryOracle::new()),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        (engine, ledger)
    }

    #[test]
    fn test_deposit_before_start_stages_round_two() {
        let (mut engine, ledger) = setup(PoolConfig::default());
        let alice = UserId::new("alice");

        let round = engine.deposit(&alice, Amount::from_units(500)).unwrap();
        assert_eq!(round, RoundIndex::new(2));
        assert_eq!(engine.depositor_balance(round, &alice), Amount::from_units(500));
        assert_eq!(
            ledger.balance_of(&LedgerAccount::RoundPool(round)),
            NativeAmount::new(500_000_000)
        );
    }

    #[test]
    fn test_deposit_limits() {
        let mut config = PoolConfig::default();
        config.max_allowed_users = 2;
        config.max_allowed_deposit = dec!(1000);
        let (mut engine, _) = setup(config);

        assert!(matches!(
            engine.deposit(&UserId::new("alice"), Amount::from_units(5)),
            Err(PoolError::DepositBelowMinimum { .. })
        ));

        engine.deposit(&UserId::new("alice"), Amount::from_units(600)).unwrap();
        assert!(matches!(
            engine.deposit(&UserId::new("alice"), Amount::from_units(500)),
            Err(PoolError::DepositLimitExceeded { .. })
        ));

        engine.deposit(&UserId::new("bob"), Amount::from_units(100)).unwrap();
        assert!(matches!(
            engine.deposit(&UserId::new("carol"), Amount::from_units(100)),
            Err(PoolError::MaxUsersReached(2))
        ));
    }

    #[test]
    fn test_deposit_must_be_representable() {
        let (mut engine, _) = setup(PoolConfig::default());
        let amount = Amount::from_decimal(dec!(100.0000001)).unwrap();
        assert!(matches!(
            engine.deposit(&UserId::new("alice"), amount),
            Err(PoolError::PrecisionLoss { .. })
        ));
        assert_eq!(
            engine.depositor_balance(RoundIndex::new(2), &UserId::new("alice")),
            Amount::ZERO
        );
    }

    #[test]
    fn test_withdrawal_requests() {
        let (mut engine, _) = setup(PoolConfig::default());
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        engine.deposit(&alice, Amount::from_units(1_000)).unwrap();
        assert!(matches!(
            engine.withdrawal_request(&alice),
            Err(PoolError::PoolNotStarted)
        ));

        engine.start().unwrap();
        assert!(matches!(
            engine.withdrawal_request(&bob),
            Err(PoolError::NothingToWithdraw(_))
        ));
        assert!(matches!(
            engine.partial_withdrawal_request(&alice, Ratio::ONE),
            Err(PoolError::InvalidWithdrawalShare(_))
        ));

        let half = Ratio::from_decimal(dec!(0.5)).unwrap();
        engine.partial_withdrawal_request(&alice, half).unwrap();
        assert_eq!(engine.pending_withdrawal(&alice).unwrap().share, Some(half));
        assert!(matches!(
            engine.withdrawal_request(&alice),
            Err(PoolError::WithdrawalAlreadyRequested(_))
        ));
        assert!(matches!(
            engine.deposit(&alice, Amount::from_units(100)),
            Err(PoolError::WithdrawalAlreadyRequested(_))
        ));
    }

    #[test]
    fn test_default_liquidity_funding() {
        let (mut engine, ledger) = setup(PoolConfig::default());

        engine.fund_default_liquidity(Amount::from_units(10_000)).unwrap();
        assert_eq!(
            engine.pool_balance(RoundIndex::DEFAULT).unwrap(),
            Amount::from_units(10_000)
        );

        engine.withdraw_default_liquidity(Amount::from_units(4_000)).unwrap();
        assert_eq!(
            ledger.balance_of(&LedgerAccount::DefaultLiquidityProvider),
            NativeAmount::new(44_000_000_000)
        );
        assert!(matches!(
            engine.withdraw_default_liquidity(Amount::from_units(7_000)),
            Err(PoolError::InsufficientLiquidity { .. })
        ));
        assert_eq!(engine.default_provider().funded, Amount::from_units(10_000));
    }
}
