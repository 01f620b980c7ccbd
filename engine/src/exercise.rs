//! Ticket exercise against bound round pools.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use parlaypool_common::{Amount, PoolError, Result, RoundIndex, TicketId, TicketSettlement};
use parlaypool_ledger::LedgerAccount;
use parlaypool_pool::TransferPlan;

use crate::engine::RoundAccountingEngine;
use crate::events::PoolEvent;
use crate::oracle::ticket_outcomes;

/// Result of one batched exercise call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseBatchOutcome {
    /// Tickets exercised by this call.
    pub exercised: usize,
    /// Ready tickets left for a follow-up call.
    pub remaining_ready: usize,
}

/// An exercise computed but not yet applied.
#[derive(Debug, Clone)]
struct PlannedExercise {
    ticket_id: TicketId,
    round: RoundIndex,
    net_stake: Amount,
    payout: Amount,
    settlement: TicketSettlement,
}

impl RoundAccountingEngine {
    fn is_ready(&self, id: TicketId) -> bool {
        self.state
            .tickets
            .get(&id)
            .map(|t| !t.is_exercised() && ticket_outcomes(&*self.oracle, t).is_some())
            .unwrap_or(false)
    }

    /// Unexercised tickets whose markets are all resolved: the current
    /// round first, then every other round in index order.
    fn ready_tickets(&self) -> Vec<TicketId> {
        let current = self.state.round;
        let mut rounds = vec![current];
        rounds.extend(
            self.state
                .rounds
                .iter()
                .filter(|(index, record)| **index != current && !record.pending_tickets.is_empty())
                .map(|(index, _)| *index),
        );

        rounds
            .into_iter()
            .filter_map(|round| self.state.rounds.get(&round))
            .flat_map(|record| record.pending_tickets.iter().copied())
            .filter(|id| self.is_ready(*id))
            .collect()
    }

    /// Whether any bound ticket is ready to be exercised.
    pub fn has_tickets_ready_to_be_exercised(&self) -> bool {
        !self.ready_tickets().is_empty()
    }

    /// Settle `id` and add its payout to `plan`. `None` if already exercised.
    fn plan_exercise(&self, id: TicketId, plan: &mut TransferPlan) -> Result<Option<PlannedExercise>> {
        let ticket = self
            .state
            .tickets
            .get(&id)
            .ok_or(PoolError::TicketNotFound(id))?;
        if ticket.is_exercised() {
            return Ok(None);
        }
        let outcomes =
            ticket_outcomes(&*self.oracle, ticket).ok_or(PoolError::TicketNotReady(id))?;

        let mut settlement = ticket.settle(&outcomes)?;
        settlement.amount_to_trader = plan.transfer(
            LedgerAccount::RoundPool(ticket.round),
            LedgerAccount::User(ticket.trader.clone()),
            settlement.amount_to_trader,
            "payout",
        )?;

        Ok(Some(PlannedExercise {
            ticket_id: id,
            round: ticket.round,
            net_stake: ticket.net_stake(),
            payout: ticket.payout,
            settlement,
        }))
    }

    fn apply_exercise(&mut self, planned: PlannedExercise) -> Result<()> {
        let now = self.now();
        let ticket = self
            .state
            .tickets
            .get_mut(&planned.ticket_id)
            .ok_or(PoolError::TicketNotFound(planned.ticket_id))?;
        ticket
            .mark_exercised(&planned.settlement, now)
            .map_err(|e| PoolError::InvalidTicket {
                ticket_id: planned.ticket_id,
                reason: e.to_string(),
            })?;

        self.state.pools.get_mut(planned.round)?.release(planned.payout)?;

        let record = self.record_mut(planned.round)?;
        record.pending_tickets.retain(|id| *id != planned.ticket_id);
        record.exercised_tickets.insert(planned.ticket_id);

        if planned.round.is_default() {
            self.state
                .default_provider
                .record_exercise(planned.net_stake, planned.settlement.amount_to_trader)?;
        }

        debug!(
            ticket_id = %planned.ticket_id,
            round = %planned.round,
            status = ?planned.settlement.status,
            paid = %planned.settlement.amount_to_trader,
            "Ticket exercised"
        );
        self.emit(PoolEvent::TicketExercised {
            ticket_id: planned.ticket_id,
            round: planned.round,
            status: planned.settlement.status,
            amount_paid: planned.settlement.amount_to_trader,
        });
        Ok(())
    }

    /// Exercise one ticket. Returns `None` if it was already exercised.
    #[instrument(skip(self))]
    pub fn exercise_ticket(&mut self, id: TicketId) -> Result<Option<TicketSettlement>> {
        let mut plan = TransferPlan::for_ledger(format!("exercise:{}", id), &*self.ledger);
        let Some(planned) = self.plan_exercise(id, &mut plan)? else {
            return Ok(None);
        };
        plan.commit(&*self.ledger)?;

        let settlement = planned.settlement;
        self.apply_exercise(planned)?;
        self.metrics.add_tickets_exercised(1);
        Ok(Some(settlement))
    }

    /// Exercise up to `batch_size` ready tickets in one atomic step.
    #[instrument(skip(self))]
    pub fn exercise_tickets_ready_to_be_exercised_batch(
        &mut self,
        batch_size: usize,
    ) -> Result<ExerciseBatchOutcome> {
        if batch_size == 0 {
            return Err(PoolError::InvalidBatchSize);
        }

        let ready = self.ready_tickets();
        let mut plan = TransferPlan::for_ledger(
            format!("exercise-batch:{}", self.state.round),
            &*self.ledger,
        );
        let mut planned = Vec::new();
        for id in ready.iter().take(batch_size) {
            if let Some(p) = self.plan_exercise(*id, &mut plan)? {
                planned.push(p);
            }
        }
        plan.commit(&*self.ledger)?;

        let exercised = planned.len();
        for p in planned {
            self.apply_exercise(p)?;
        }
        self.metrics.add_tickets_exercised(exercised as u64);

        let remaining_ready = ready.len().saturating_sub(exercised);
        if exercised > 0 {
            info!(exercised, remaining_ready, "Exercised ready tickets");
        }
        Ok(ExerciseBatchOutcome {
            exercised,
            remaining_ready,
        })
    }

    /// Exercise every ready ticket, in batches of the configured size.
    pub fn exercise_tickets_ready_to_be_exercised(&mut self) -> Result<usize> {
        let batch = self.config.default_exercise_batch;
        let mut total = 0;
        loop {
            let outcome = self.exercise_tickets_ready_to_be_exercised_batch(batch)?;
            total += outcome.exercised;
            if outcome.remaining_ready == 0 || outcome.exercised == 0 {
                return Ok(total);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use parlaypool_common::{
        Clock, Collateral, ManualClock, NativeAmount, Outcome, Ratio, TicketMarket, TicketStatus,
        UserId,
    };
    use parlaypool_ledger::{CollateralLedger, InMemoryLedger};

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
        ledger
            .mint(&LedgerAccount::user("lp"), NativeAmount::new(10_000_000_000))
            .unwrap();
        ledger
            .mint(&LedgerAccount::user("trader"), NativeAmount::new(10_000_000_000))
            .unwrap();
        let oracle = Arc::new(InMemoryOracle::new());
        let clock = Arc::new(ManualClock::default());
        let mut engine = RoundAccountingEngine::new(
            PoolConfig::default(),
            ledger.clone(),
            oracle.clone(),
            clock.clone(),
        )
        .unwrap();
        engine.deposit(&UserId::new("lp"), Amount::from_units(1_000)).unwrap();
        engine.start().unwrap();
        Fixture {
            engine,
            ledger,
            oracle,
            clock,
        }
    }

    fn trade(f: &mut Fixture, market: &str) -> TicketId {
        let request = TradeRequest::new(
            "trader",
            vec![TicketMarket::new(
                market,
                f.clock.now() + Duration::days(1),
                Ratio::from_raw(500_000_000_000_000_000),
            )],
            Amount::from_units(10),
            Amount::ZERO,
            Amount::from_units(20),
        );
        f.engine.commit_trade(request, &Unlimited).unwrap().id
    }

    #[test]
    fn test_unresolved_ticket_not_ready() {
        let mut f = setup();
        let id = trade(&mut f, "m1");
        assert!(!f.engine.has_tickets_ready_to_be_exercised());
        assert!(matches!(
            f.engine.exercise_ticket(id),
            Err(PoolError::TicketNotReady(_))
        ));
    }

    #[test]
    fn test_winning_ticket_paid_once() {
        let mut f = setup();
        let id = trade(&mut f, "m1");
        f.oracle.resolve("m1", Outcome::Won);
        assert!(f.engine.has_tickets_ready_to_be_exercised());

        let settlement = f.engine.exercise_ticket(id).unwrap().unwrap();
        assert_eq!(settlement.status, TicketStatus::Won);
        assert_eq!(settlement.amount_to_trader, Amount::from_units(20));
        assert_eq!(
            f.engine.pool_balance(RoundIndex::new(2)).unwrap(),
            Amount::from_units(990)
        );
        assert!(f.engine.ticket_already_exercised_in_round(RoundIndex::new(2), id));

        assert!(f.engine.exercise_ticket(id).unwrap().is_none());
        assert_eq!(
            f.ledger.balance_of(&LedgerAccount::user("trader")),
            NativeAmount::new(10_010_000_000)
        );
    }

    #[test]
    fn test_batch_exercise_is_bounded_and_idempotent() {
        let mut f = setup();
        for market in ["m1", "m2", "m3"] {
            trade(&mut f, market);
            f.oracle.resolve(market, Outcome::Lost);
        }

        let first = f.engine.exercise_tickets_ready_to_be_exercised_batch(2).unwrap();
        assert_eq!(first, ExerciseBatchOutcome { exercised: 2, remaining_ready: 1 });

        let second = f.engine.exercise_tickets_ready_to_be_exercised_batch(2).unwrap();
        assert_eq!(second.exercised, 1);
        assert_eq!(second.remaining_ready, 0);

        let balance = f.engine.pool_balance(RoundIndex::new(2)).unwrap();
        let third = f.engine.exercise_tickets_ready_to_be_exercised_batch(2).unwrap();
        assert_eq!(third.exercised, 0);
        assert_eq!(f.engine.pool_balance(RoundIndex::new(2)).unwrap(), balance);
        assert_eq!(balance, Amount::from_units(1_030));
        assert_eq!(
            f.engine.round_pool(RoundIndex::new(2)).unwrap().outstanding_exposure(),
            Amount::ZERO
        );
    }

    #[test]
    fn test_zero_batch_rejected() {
        let mut f = setup();
        assert!(matches!(
            f.engine.exercise_tickets_ready_to_be_exercised_batch(0),
            Err(PoolError::InvalidBatchSize)
        ));
    }
}
