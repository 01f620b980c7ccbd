//! Round closing: prepare, batched depositor processing, close.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use parlaypool_common::{Amount, PoolError, Ratio, Result, UserId};
use parlaypool_ledger::LedgerAccount;
use parlaypool_pool::{representable_floor, TransferPlan};

use crate::engine::RoundAccountingEngine;
use crate::events::PoolEvent;
use crate::state::{ClosingSnapshot, RoundPhase, RoundRecord, RoundSettlement};

/// Result of one closing batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingBatchOutcome {
    /// Depositors processed by this call.
    pub processed: usize,
    /// Depositors left for a follow-up call.
    pub remaining: usize,
}

/// What closing does to one depositor.
enum Rollover {
    Stage(Amount),
    Withdraw { paid: Amount, staged: Amount },
}

impl RoundAccountingEngine {
    /// Snapshot the current round's balance and depositor roster, and fix
    /// its PnL multiplier.
    #[instrument(skip(self))]
    pub fn prepare_round_closing(&mut self) -> Result<()> {
        if !self.state.started {
            return Err(PoolError::PoolNotStarted);
        }
        let round = self.state.round;
        if self.state.closing_prepared() {
            return Err(PoolError::RoundClosingAlreadyPrepared(round));
        }

        let now = self.now();
        let record = self.record(round)?;
        let end_time = record.end_time.ok_or(PoolError::RoundNotStarted(round))?;
        if now < end_time {
            return Err(PoolError::RoundNotEnded { round, end_time });
        }
        if !record.all_tickets_exercised() {
            return Err(PoolError::RoundNotReadyToClose {
                round,
                reason: format!("{} tickets not exercised", record.pending_tickets.len()),
            });
        }
        let allocation = record.allocation;

        let closing_balance = self.pool_balance(round)?;
        let profit = closing_balance.saturating_sub(allocation);
        let safe_box_cut = if profit.is_zero() {
            Amount::ZERO
        } else {
            representable_floor(
                profit.try_mul_ratio(self.limits.safe_box_impact)?,
                self.ledger.collateral().decimals(),
            )?
        };
        let pnl = if allocation.is_zero() {
            Ratio::ONE
        } else {
            Ratio::from_fraction(closing_balance.try_sub(safe_box_cut)?, allocation)?
        };
        let depositors = self.state.book.depositors(round);

        self.record_mut(round)?.transition(RoundPhase::ClosingPrepared);
        info!(
            round = %round,
            allocation = %allocation,
            closing_balance = %closing_balance,
            safe_box_cut = %safe_box_cut,
            pnl = %pnl,
            depositors = depositors.len(),
            "Round closing prepared"
        );
        self.emit(PoolEvent::RoundClosingPrepared {
            round,
            closing_balance,
            depositors: depositors.len(),
        });

        self.state.closing = Some(ClosingSnapshot {
            round,
            allocation,
            closing_balance,
            profit,
            safe_box_cut,
            pnl,
            depositors,
            cursor: 0,
            processed: BTreeSet::new(),
            withdrawals_paid: Amount::ZERO,
            prepared_at: now,
        });
        Ok(())
    }

    fn rollover_for(
        &self,
        snapshot: &ClosingSnapshot,
        user: &UserId,
        plan: &mut TransferPlan,
    ) -> Result<Rollover> {
        let round = snapshot.round;
        let balance_after = self
            .state
            .book
            .balance(round, user)
            .try_mul_ratio(snapshot.pnl)?;

        let request = self
            .state
            .withdrawal_requests
            .get(user)
            .filter(|r| r.round == round);

        let Some(request) = request else {
            return Ok(Rollover::Stage(balance_after));
        };

        let wanted = match request.share {
            None => balance_after,
            Some(share) => balance_after.try_mul_ratio(share)?,
        };
        let paid = plan.transfer(
            LedgerAccount::RoundPool(round),
            LedgerAccount::User(user.clone()),
            wanted,
            "withdrawal",
        )?;
        let staged = if request.is_full() {
            Amount::ZERO
        } else {
            balance_after.try_sub(paid)?
        };
        Ok(Rollover::Withdraw { paid, staged })
    }

    /// Roll up to `batch_size` depositors of the closing round into the next
    /// round, paying out withdrawal requests. Safe to repeat.
    #[instrument(skip(self))]
    pub fn process_round_closing_batch(&mut self, batch_size: usize) -> Result<ClosingBatchOutcome> {
        if batch_size == 0 {
            return Err(PoolError::InvalidBatchSize);
        }
        let snapshot = self
            .state
            .closing
            .as_ref()
            .ok_or(PoolError::RoundClosingNotPrepared(self.state.round))?;
        let round = snapshot.round;
        let next = round.next();

        let mut plan = TransferPlan::for_ledger(
            format!("closing-batch:{}:{}", round, snapshot.cursor),
            &*self.ledger,
        );
        let mut cursor = snapshot.cursor;
        let mut results: Vec<(UserId, Rollover)> = Vec::new();

        while cursor < snapshot.depositors.len() && results.len() < batch_size {
            let user = &snapshot.depositors[cursor];
            cursor += 1;
            if snapshot.processed.contains(user) {
                continue;
            }
            let rollover = self.rollover_for(snapshot, user, &mut plan)?;
            results.push((user.clone(), rollover));
        }

        // Book credits must not overflow once the ledger has moved.
        let mut withdrawals_paid = snapshot.withdrawals_paid;
        for (user, rollover) in &results {
            let staged = match rollover {
                Rollover::Stage(amount) => *amount,
                Rollover::Withdraw { paid, staged } => {
                    withdrawals_paid = withdrawals_paid.try_add(*paid)?;
                    *staged
                }
            };
            self.state.book.balance(next, user).try_add(staged)?;
        }

        plan.commit(&*self.ledger)?;

        let processed = results.len();
        for (user, rollover) in results {
            match rollover {
                Rollover::Stage(amount) => {
                    self.state.book.credit(next, &user, amount)?;
                }
                Rollover::Withdraw { paid, staged } => {
                    self.state.book.credit(next, &user, staged)?;
                    self.state.withdrawal_requests.remove(&user);
                    self.metrics.withdrawal_paid();
                    self.emit(PoolEvent::Claimed {
                        user: user.clone(),
                        round,
                        amount: paid,
                    });
                }
            }
            if let Some(snapshot) = self.state.closing.as_mut() {
                snapshot.processed.insert(user);
            }
        }

        let remaining = match self.state.closing.as_mut() {
            Some(snapshot) => {
                snapshot.cursor = cursor;
                snapshot.withdrawals_paid = withdrawals_paid;
                snapshot.remaining()
            }
            None => 0,
        };
        self.record_mut(round)?.transition(RoundPhase::Processing);
        self.metrics.add_depositors_processed(processed as u64);

        info!(round = %round, processed, remaining, "Closing batch processed");
        self.emit(PoolEvent::RoundClosingBatchProcessed {
            round,
            processed,
            remaining,
        });

        Ok(ClosingBatchOutcome {
            processed,
            remaining,
        })
    }

    /// Finalize the round: pay the safe box, roll the remaining balance into
    /// the next round's pool, record PnL and open the next round.
    #[instrument(skip(self))]
    pub fn close_round(&mut self) -> Result<RoundSettlement> {
        let snapshot = self
            .state
            .closing
            .as_ref()
            .ok_or(PoolError::RoundClosingNotPrepared(self.state.round))?;
        if !snapshot.is_complete() {
            return Err(PoolError::RoundNotReadyToClose {
                round: snapshot.round,
                reason: format!("{} depositors not processed", snapshot.remaining()),
            });
        }

        let round = snapshot.round;
        let next = round.next();
        let now = self.now();

        let previous = round
            .previous()
            .and_then(|p| self.state.cumulative_pnl_at(p))
            .ok_or(PoolError::UnknownRound(round))?;
        let cumulative_pnl = previous.try_mul(snapshot.pnl)?;

        let balance = self.pool_balance(round)?;
        let carried_forward = balance.try_sub(snapshot.safe_box_cut)?;

        let pool_account = LedgerAccount::RoundPool(round);
        let mut plan = TransferPlan::for_ledger(format!("close:{}", round), &*self.ledger);
        plan.transfer_exact(
            pool_account.clone(),
            LedgerAccount::SafeBox,
            snapshot.safe_box_cut,
            "safe box",
        )?;
        plan.transfer_exact(
            pool_account,
            LedgerAccount::RoundPool(next),
            carried_forward,
            "rollover",
        )?;

        let end_time = self.record(round)?.end_time.ok_or(PoolError::RoundNotStarted(round))?;
        self.ensure_round(next)?;
        plan.commit(&*self.ledger)?;

        let snapshot = self
            .state
            .closing
            .take()
            .ok_or(PoolError::RoundClosingNotPrepared(round))?;
        let next_allocation = self.pool_balance(next)?;

        let settlement = RoundSettlement {
            allocation: snapshot.allocation,
            closing_balance: snapshot.closing_balance,
            safe_box_cut: snapshot.safe_box_cut,
            withdrawals_paid: snapshot.withdrawals_paid,
            carried_forward,
            pnl: snapshot.pnl,
            cumulative_pnl,
            closed_at: now,
        };

        let record = self.record_mut(round)?;
        record.transition(RoundPhase::Closed);
        record.settlement = Some(settlement);

        let round_length = self.limits.round_length;
        let next_record = self
            .state
            .rounds
            .entry(next)
            .or_insert_with(|| RoundRecord::pending(next));
        next_record.transition(RoundPhase::Active);
        next_record.allocation = next_allocation;
        next_record.start_time = Some(end_time);
        next_record.end_time = Some(end_time + round_length);

        self.state.pnl_per_round.insert(round, snapshot.pnl);
        self.state.cumulative_pnl.insert(round, cumulative_pnl);
        self.state.round = next;
        self.metrics.round_closed();

        info!(
            round = %round,
            pnl = %snapshot.pnl,
            cumulative_pnl = %cumulative_pnl,
            safe_box_cut = %snapshot.safe_box_cut,
            carried_forward = %carried_forward,
            next_allocation = %next_allocation,
            "Round closed"
        );
        self.emit(PoolEvent::RoundClosed {
            round,
            pnl: snapshot.pnl,
            cumulative_pnl,
            safe_box_cut: snapshot.safe_box_cut,
            next_allocation,
        });

        Ok(settlement)
    }

    /// Run the whole closing sequence with the configured batch size.
    pub fn close_current_round(&mut self) -> Result<RoundSettlement> {
        self.prepare_round_closing()?;
        let batch = self.config.default_closing_batch;
        while self.process_round_closing_batch(batch)?.remaining > 0 {}
        self.close_round()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use parlaypool_common::{
        Clock, Collateral, ManualClock, NativeAmount, Outcome, RoundIndex, TicketMarket,
    };
    use parlaypool_ledger::{CollateralLedger, InMemoryLedger};
    use rust_decimal_macros::dec;

    use crate::config::PoolConfig;
    use crate::oracle::InMemoryOracle;
    use crate::risk::Unlimited;
    use crate::trading::TradeRequest;

    struct Fixture {
        engine: RoundAccountingEngine,
        ledger: Arc<InMemoryLedger>,
        oracle: Arc<InMemoryOracle>,
        clock: Arc<ManualClock>,
    }

    fn setup() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new(Collateral::usdc()));
        for name in ["alice", "bob", "carol", "trader"] {
            ledger
                .mint(&LedgerAccount::user(name), NativeAmount::new(10_000_000_000))
                .unwrap();
        }
        let oracle = Arc::new(InMemoryOracle::new());
        let clock = Arc::new(ManualClock::default());
        let mut engine = RoundAccountingEngine::new(
            PoolConfig::default(),
            ledger.clone(),
            oracle.clone(),
            clock.clone(),
        )
        .unwrap();
        engine.deposit(&UserId::new("alice"), Amount::from_units(600)).unwrap();
        engine.deposit(&UserId::new("bob"), Amount::from_units(400)).unwrap();
        engine.start().unwrap();
        Fixture {
            engine,
            ledger,
            oracle,
            clock,
        }
    }

    fn losing_trade(f: &mut Fixture) {
        let request = TradeRequest::new(
            "trader",
            vec![TicketMarket::new(
                "m1",
                f.clock.now() + Duration::days(1),
                Ratio::from_decimal(dec!(0.5)).unwrap(),
            )],
            Amount::from_units(100),
            Amount::ZERO,
            Amount::from_units(200),
        );
        f.engine.commit_trade(request, &Unlimited).unwrap();
        f.oracle.resolve("m1", Outcome::Lost);
        f.engine.exercise_tickets_ready_to_be_exercised_batch(10).unwrap();
    }

    #[test]
    fn test_prepare_before_end_rejected() {
        let mut f = setup();
        assert!(matches!(
            f.engine.prepare_round_closing(),
            Err(PoolError::RoundNotEnded { .. })
        ));
        assert!(matches!(
            f.engine.close_round(),
            Err(PoolError::RoundClosingNotPrepared(_))
        ));
    }

    #[test]
    fn test_prepare_requires_exercised_tickets() {
        let mut f = setup();
        let request = TradeRequest::new(
            "trader",
            vec![TicketMarket::new(
                "m9",
                f.clock.now() + Duration::days(1),
                Ratio::ONE,
            )],
            Amount::from_units(10),
            Amount::ZERO,
            Amount::from_units(10),
        );
        f.engine.commit_trade(request, &Unlimited).unwrap();
        f.clock.advance(Duration::days(7));

        assert!(!f.engine.can_close_current_round());
        assert!(matches!(
            f.engine.prepare_round_closing(),
            Err(PoolError::RoundNotReadyToClose { .. })
        ));
    }

    #[test]
    fn test_profitable_round_closes_with_safe_box_cut() {
        let mut f = setup();
        losing_trade(&mut f);
        f.clock.advance(Duration::days(7));
        assert!(f.engine.can_close_current_round());

        f.engine.prepare_round_closing().unwrap();
        assert!(matches!(
            f.engine.prepare_round_closing(),
            Err(PoolError::RoundClosingAlreadyPrepared(_))
        ));

        let first = f.engine.process_round_closing_batch(1).unwrap();
        assert_eq!(first, ClosingBatchOutcome { processed: 1, remaining: 1 });
        assert!(matches!(
            f.engine.close_round(),
            Err(PoolError::RoundNotReadyToClose { .. })
        ));
        let second = f.engine.process_round_closing_batch(5).unwrap();
        assert_eq!(second.remaining, 0);
        assert_eq!(f.engine.users_processed_in_round(), 2);

        let settlement = f.engine.close_round().unwrap();
        // profit 100, safe box 10%
        assert_eq!(settlement.safe_box_cut, Amount::from_units(10));
        assert_eq!(settlement.pnl, Ratio::from_decimal(dec!(1.09)).unwrap());
        assert_eq!(settlement.carried_forward, Amount::from_units(1_090));
        assert_eq!(
            f.ledger.balance_of(&LedgerAccount::SafeBox),
            NativeAmount::new(10_000_000)
        );

        let next = RoundIndex::new(3);
        assert_eq!(f.engine.round(), next);
        assert_eq!(f.engine.allocation_per_round(next), Some(Amount::from_units(1_090)));
        assert_eq!(
            f.engine.depositor_balance(next, &UserId::new("alice")),
            Amount::from_decimal(dec!(654)).unwrap()
        );
        assert_eq!(
            f.engine.round_start_time(next),
            f.engine.round_end_time(RoundIndex::new(2))
        );
    }

    #[test]
    fn test_repeated_batches_do_not_double_credit() {
        let mut f = setup();
        f.clock.advance(Duration::days(7));
        f.engine.prepare_round_closing().unwrap();

        f.engine.process_round_closing_batch(10).unwrap();
        let again = f.engine.process_round_closing_batch(10).unwrap();
        assert_eq!(again, ClosingBatchOutcome { processed: 0, remaining: 0 });
        assert_eq!(
            f.engine.depositor_balance(RoundIndex::new(3), &UserId::new("bob")),
            Amount::from_units(400)
        );
        assert!(matches!(
            f.engine.process_round_closing_batch(0),
            Err(PoolError::InvalidBatchSize)
        ));
    }

    #[test]
    fn test_withdrawals_paid_at_close() {
        let mut f = setup();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        f.engine.withdrawal_request(&alice).unwrap();
        f.engine
            .partial_withdrawal_request(&bob, Ratio::from_decimal(dec!(0.25)).unwrap())
            .unwrap();
        f.clock.advance(Duration::days(7));

        let settlement = f.engine.close_current_round().unwrap();
        assert_eq!(settlement.withdrawals_paid, Amount::from_units(700));
        assert_eq!(settlement.carried_forward, Amount::from_units(300));
        assert_eq!(
            f.ledger.balance_of(&LedgerAccount::User(alice.clone())),
            NativeAmount::new(10_000_000_000)
        );
        assert_eq!(f.engine.depositor_balance(RoundIndex::new(3), &alice), Amount::ZERO);
        assert_eq!(
            f.engine.depositor_balance(RoundIndex::new(3), &bob),
            Amount::from_units(300)
        );
        assert!(f.engine.pending_withdrawal(&bob).is_none());
    }

    #[test]
    fn test_trading_blocked_while_closing() {
        let mut f = setup();
        f.clock.advance(Duration::days(7));
        f.engine.prepare_round_closing().unwrap();

        let request = TradeRequest::new(
            "trader",
            vec![TicketMarket::new("m2", f.clock.now() - Duration::hours(1), Ratio::ONE)],
            Amount::from_units(10),
            Amount::ZERO,
            Amount::from_units(10),
        );
        assert!(matches!(
            f.engine.record_trade(RoundIndex::new(2), request),
            Err(PoolError::RoundClosingPrepared(_))
        ));
        assert!(matches!(
            f.engine.deposit(&UserId::new("carol"), Amount::from_units(100)),
            Err(PoolError::RoundClosingPrepared(_))
        ));
    }
}
