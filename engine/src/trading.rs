//! Trade binding and recording.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use parlaypool_common::{
    Amount, PoolError, Result, RoundIndex, Ticket, TicketId, TicketMarket, UserId,
};
use parlaypool_ledger::LedgerAccount;
use parlaypool_pool::TransferPlan;

use crate::engine::RoundAccountingEngine;
use crate::events::PoolEvent;
use crate::risk::RiskLayer;
use crate::state::RoundPhase;

/// A quoted trade ready to be recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub ticket_id: TicketId,
    pub trader: UserId,
    pub markets: Vec<TicketMarket>,
    /// Buy-in including fees.
    pub stake: Amount,
    pub fees: Amount,
    /// Payout the pool must reserve.
    pub payout: Amount,
}

impl TradeRequest {
    /// Create a request with a fresh ticket id.
    pub fn new(
        trader: impl Into<UserId>,
        markets: Vec<TicketMarket>,
        stake: Amount,
        fees: Amount,
        payout: Amount,
    ) -> Self {
        Self {
            ticket_id: TicketId::new(),
            trader: trader.into(),
            markets,
            stake,
            fees,
            payout,
        }
    }
}

impl RoundAccountingEngine {
    /// Round that funds a ticket with the given legs.
    ///
    /// The current round when every leg starts before it ends; round 1
    /// otherwise, and always before the pool starts.
    pub fn bind_ticket_to_round(&self, markets: &[TicketMarket]) -> RoundIndex {
        if !self.state.started {
            return RoundIndex::DEFAULT;
        }
        let latest = markets.iter().map(|m| m.maturity).max();
        let end = self.round_end_time(self.state.round);

        match (latest, end) {
            (Some(latest), Some(end)) if latest < end => self.state.round,
            _ => RoundIndex::DEFAULT,
        }
    }

    /// Check that `round` accepts trades right now.
    fn check_round_accepts_trades(&self, round: RoundIndex) -> Result<()> {
        if round.is_default() {
            return Ok(());
        }
        let current = self.state.round;
        if round < current {
            return Err(PoolError::RoundClosed(round));
        }
        if round > current {
            return Err(PoolError::RoundNotStarted(round));
        }
        match self.record(round)?.phase {
            RoundPhase::Active => Ok(()),
            RoundPhase::Pending => Err(PoolError::RoundNotStarted(round)),
            RoundPhase::ClosingPrepared | RoundPhase::Processing => {
                Err(PoolError::RoundClosingPrepared(round))
            }
            RoundPhase::Closed => Err(PoolError::RoundClosed(round)),
        }
    }

    /// Record a trade against `round`: the net stake moves into the round
    /// pool, fees to the fee collector, and the payout is reserved.
    ///
    /// `round` must be the round [`Self::bind_ticket_to_round`] picks for
    /// the ticket's legs, otherwise `WrongRoundBinding`.
    #[instrument(skip(self, request), fields(round = %round, ticket_id = %request.ticket_id))]
    pub fn record_trade(&mut self, round: RoundIndex, request: TradeRequest) -> Result<Ticket> {
        match self.try_record_trade(round, request) {
            Ok(ticket) => Ok(ticket),
            Err(e) => {
                self.metrics.trade_rejected();
                warn!(error = %e, code = e.error_code(), "Trade rejected");
                Err(e)
            }
        }
    }

    fn try_record_trade(&mut self, round: RoundIndex, request: TradeRequest) -> Result<Ticket> {
        if self.state.tickets.contains_key(&request.ticket_id) {
            return Err(PoolError::TicketAlreadyBound(request.ticket_id));
        }
        self.check_round_accepts_trades(round)?;
        let bound = self.bind_ticket_to_round(&request.markets);
        if bound != round {
            return Err(PoolError::WrongRoundBinding {
                ticket_id: request.ticket_id,
                requested: round,
                bound,
            });
        }

        let ticket = Ticket::new(
            request.ticket_id,
            request.trader,
            request.markets,
            request.stake,
            request.fees,
            request.payout,
            round,
            self.now(),
        )?;
        let net_stake = ticket.net_stake();

        let pool = self
            .state
            .pools
            .get(round)
            .ok_or(PoolError::UnknownRound(round))?;
        let available = pool.balance(&*self.ledger)?.try_add(net_stake)?;
        let required = pool.outstanding_exposure().try_add(ticket.payout)?;
        if available < required {
            return Err(PoolError::InsufficientLiquidity {
                round,
                required: required.to_string(),
                available: available.to_string(),
            });
        }

        let mut plan = TransferPlan::for_ledger(format!("trade:{}", ticket.id), &*self.ledger);
        plan.transfer_exact(
            LedgerAccount::User(ticket.trader.clone()),
            pool.account().clone(),
            net_stake,
            "stake",
        )?;
        plan.transfer_exact(
            LedgerAccount::User(ticket.trader.clone()),
            LedgerAccount::FeeCollector,
            ticket.fees,
            "fees",
        )?;
        plan.commit(&*self.ledger)?;

        self.state.pools.get_mut(round)?.reserve(ticket.payout)?;
        let record = self.record_mut(round)?;
        record.trading_tickets.push(ticket.id);
        record.pending_tickets.push(ticket.id);
        if round.is_default() {
            self.state.default_provider.record_trade(net_stake)?;
        }
        self.state.tickets.insert(ticket.id, ticket.clone());
        self.metrics.trade_recorded(round.is_default());

        info!(
            stake = %ticket.stake,
            payout = %ticket.payout,
            legs = ticket.markets.len(),
            "Trade recorded"
        );
        self.emit(PoolEvent::TradeRecorded {
            ticket_id: ticket.id,
            round,
            stake: ticket.stake,
            payout: ticket.payout,
        });

        Ok(ticket)
    }

    /// Bind, consult the risk layer, then record. A reservation whose trade
    /// is not recorded is released again.
    #[instrument(skip(self, request, risk), fields(ticket_id = %request.ticket_id))]
    pub fn commit_trade(&mut self, request: TradeRequest, risk: &dyn RiskLayer) -> Result<Ticket> {
        let round = self.bind_ticket_to_round(&request.markets);
        let payout = request.payout;
        if !risk.reserve_payout(round, payout) {
            self.metrics.trade_rejected();
            return Err(PoolError::TradeRejected(format!(
                "risk layer refused payout {} in round {}",
                payout, round
            )));
        }
        self.record_trade(round, request).map_err(|e| {
            risk.release_payout(round, payout);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use parlaypool_common::{Clock, Collateral, ManualClock, NativeAmount, Ratio};
    use parlaypool_ledger::{CollateralLedger, InMemoryLedger};
    use rust_decimal_macros::dec;

    use crate::config::PoolConfig;
    use crate::oracle::InMemoryOracle;
    use crate::risk::{ExposureLimit, Unlimited};

    fn setup() -> (RoundAccountingEngine, Arc<InMemoryLedger>, Arc<ManualClock>) {
        let ledger = Arc::new(InMemoryLedger::new(Collateral::usdc()));
        ledger
            .mint(&LedgerAccount::user("lp"), NativeAmount::new(10_000_000_000))
            .unwrap();
        ledger
            .mint(&LedgerAccount::user("trader"), NativeAmount::new(10_000_000_000))
            .unwrap();
        let clock = Arc::new(ManualClock::default());
        let mut engine = RoundAccountingEngine::new(
            PoolConfig::default(),
            ledger.clone(),
            Arc::new(InMemoryOracle::new()),
            clock.clone(),
        )
        .unwrap();
        engine.deposit(&UserId::new("lp"), Amount::from_units(1_000)).unwrap();
        (engine, ledger, clock)
    }

    fn request(clock: &ManualClock, kickoff_in: Duration) -> TradeRequest {
        TradeRequest::new(
            "trader",
            vec![TicketMarket::new(
                "nba-lal-bos",
                clock.now() + kickoff_in,
                Ratio::from_decimal(dec!(0.5)).unwrap(),
            )],
            Amount::from_units(10),
            Amount::from_decimal(dec!(0.2)).unwrap(),
            Amount::from_units(20),
        )
    }

    #[test]
    fn test_binding_before_start_uses_default_round() {
        let (engine, _, clock) = setup();
        let req = request(&clock, Duration::hours(2));
        assert_eq!(engine.bind_ticket_to_round(&req.markets), RoundIndex::DEFAULT);
    }

    #[test]
    fn test_binding_after_start() {
        let (mut engine, _, clock) = setup();
        engine.start().unwrap();

        let inside = request(&clock, Duration::days(2));
        assert_eq!(engine.bind_ticket_to_round(&inside.markets), RoundIndex::new(2));

        let beyond = request(&clock, Duration::days(8));
        assert_eq!(engine.bind_ticket_to_round(&beyond.markets), RoundIndex::DEFAULT);
    }

    #[test]
    fn test_record_trade_moves_stake_and_fees() {
        let (mut engine, ledger, clock) = setup();
        engine.start().unwrap();

        let ticket = engine
            .commit_trade(request(&clock, Duration::days(1)), &Unlimited)
            .unwrap();
        assert_eq!(ticket.round, RoundIndex::new(2));
        assert_eq!(
            engine.pool_balance(RoundIndex::new(2)).unwrap(),
            Amount::from_decimal(dec!(1009.8)).unwrap()
        );
        assert_eq!(
            ledger.balance_of(&LedgerAccount::FeeCollector),
            NativeAmount::new(200_000)
        );
        assert_eq!(
            engine.round_pool(RoundIndex::new(2)).unwrap().outstanding_exposure(),
            Amount::from_units(20)
        );
        assert_eq!(engine.ticket_round(ticket.id), Some(RoundIndex::new(2)));
    }

    #[test]
    fn test_ticket_cannot_bind_twice() {
        let (mut engine, _, clock) = setup();
        engine.start().unwrap();

        let req = request(&clock, Duration::days(1));
        engine.record_trade(RoundIndex::new(2), req.clone()).unwrap();
        assert!(matches!(
            engine.record_trade(RoundIndex::new(2), req),
            Err(PoolError::TicketAlreadyBound(_))
        ));
        assert_eq!(engine.metrics().snapshot().trades_rejected, 1);
    }

    #[test]
    fn test_trade_against_future_round_rejected() {
        let (mut engine, _, clock) = setup();
        engine.start().unwrap();
        assert!(matches!(
            engine.record_trade(RoundIndex::new(3), request(&clock, Duration::days(1))),
            Err(PoolError::RoundNotStarted(_))
        ));
    }

    #[test]
    fn test_default_round_needs_liquidity() {
        let (mut engine, _, clock) = setup();
        let result = engine.commit_trade(request(&clock, Duration::days(1)), &Unlimited);
        assert!(matches!(result, Err(PoolError::InsufficientLiquidity { .. })));
    }

    #[test]
    fn test_risk_layer_refusal() {
        let (mut engine, _, clock) = setup();
        engine.start().unwrap();
        let risk = ExposureLimit::new(Amount::from_units(5));
        assert!(matches!(
            engine.commit_trade(request(&clock, Duration::days(1)), &risk),
            Err(PoolError::TradeRejected(_))
        ));
        assert_eq!(engine.metrics().snapshot().trades_recorded, 0);
    }
}
