//! Ticket-to-round binding and risk-layer reservations.

use std::sync::Arc;

use chrono::Duration;
use rust_decimal_macros::dec;

use parlaypool_common::{
    Amount, Clock, Collateral, ManualClock, Outcome, PoolError, Ratio, RoundIndex, TicketId,
    TicketMarket, UserId,
};
use parlaypool_engine::{
    ExposureLimit, InMemoryOracle, PoolConfig, RoundAccountingEngine, TradeRequest, Unlimited,
};
use parlaypool_ledger::{InMemoryLedger, LedgerAccount};
use parlaypool_pool::to_native_units;

fn setup() -> (RoundAccountingEngine, Arc<InMemoryOracle>, Arc<ManualClock>) {
    let ledger = Arc::new(InMemoryLedger::new(Collateral::usdc()));
    let funding = to_native_units(Amount::from_units(100_000), 6).unwrap();
    for name in ["alice", "trader"] {
        ledger.mint(&LedgerAccount::user(name), funding).unwrap();
    }
    ledger
        .mint(&LedgerAccount::DefaultLiquidityProvider, funding)
        .unwrap();

    let oracle = Arc::new(InMemoryOracle::new());
    let clock = Arc::new(ManualClock::default());
    let engine = RoundAccountingEngine::new(
        PoolConfig::default(),
        ledger,
        oracle.clone(),
        clock.clone(),
    )
    .unwrap();
    (engine, oracle, clock)
}

fn request(
    clock: &ManualClock,
    market: &str,
    kickoff_in: Duration,
    stake: u64,
    payout: u64,
) -> TradeRequest {
    TradeRequest::new(
        "trader",
        vec![TicketMarket::new(
            market,
            clock.now() + kickoff_in,
            Ratio::from_decimal(dec!(0.5)).unwrap(),
        )],
        Amount::from_units(stake),
        Amount::ZERO,
        Amount::from_units(payout),
    )
}

fn rounds_holding(engine: &RoundAccountingEngine, ticket: TicketId) -> Vec<RoundIndex> {
    engine
        .state()
        .rounds
        .values()
        .filter(|r| r.trading_tickets.contains(&ticket))
        .map(|r| r.index)
        .collect()
}

#[test]
fn test_record_trade_rejects_round_other_than_binding() {
    let (mut engine, _, clock) = setup();
    engine.deposit(&UserId::new("alice"), Amount::from_units(1_000)).unwrap();
    engine.fund_default_liquidity(Amount::from_units(500)).unwrap();
    engine.start().unwrap();

    let late = request(&clock, "wc-final", Duration::days(30), 10, 20);
    assert_eq!(engine.bind_ticket_to_round(&late.markets), RoundIndex::DEFAULT);

    let result = engine.record_trade(RoundIndex::new(2), late.clone());
    assert_eq!(
        result.unwrap_err(),
        PoolError::WrongRoundBinding {
            ticket_id: late.ticket_id,
            requested: RoundIndex::new(2),
            bound: RoundIndex::DEFAULT,
        }
    );
    assert!(engine.ticket(late.ticket_id).is_none());
    assert_eq!(
        engine.round_pool(RoundIndex::new(2)).unwrap().outstanding_exposure(),
        Amount::ZERO
    );

    let ticket = engine.record_trade(RoundIndex::DEFAULT, late).unwrap();
    assert_eq!(ticket.round, RoundIndex::DEFAULT);

    // The long-dated ticket does not hold up round 2.
    clock.advance(Duration::days(7));
    assert!(engine.can_close_current_round());
}

#[test]
fn test_every_ticket_binds_to_exactly_one_round() {
    let (mut engine, oracle, clock) = setup();
    engine.deposit(&UserId::new("alice"), Amount::from_units(2_000)).unwrap();
    engine.fund_default_liquidity(Amount::from_units(1_000)).unwrap();

    let mut tickets = vec![engine
        .commit_trade(request(&clock, "pre-start", Duration::hours(6), 10, 20), &Unlimited)
        .unwrap()];
    engine.start().unwrap();

    for (i, days) in [1, 3, 10, 30].into_iter().enumerate() {
        let market = format!("round-2-{}", i);
        let req = request(&clock, &market, Duration::days(days), 10, 20);
        tickets.push(engine.commit_trade(req, &Unlimited).unwrap());
    }

    oracle.resolve("round-2-0", Outcome::Lost);
    oracle.resolve("round-2-1", Outcome::Won);
    clock.advance(Duration::days(7));
    assert_eq!(engine.exercise_tickets_ready_to_be_exercised().unwrap(), 2);
    engine.close_current_round().unwrap();
    tickets.push(
        engine
            .commit_trade(request(&clock, "round-3", Duration::days(2), 10, 20), &Unlimited)
            .unwrap(),
    );

    let expected = [1, 2, 2, 1, 1, 3].map(RoundIndex::new);
    for (ticket, round) in tickets.iter().zip(expected) {
        assert_eq!(ticket.round, round);
        assert_eq!(engine.ticket_round(ticket.id), Some(round));
        assert_eq!(rounds_holding(&engine, ticket.id), vec![round]);
    }
}

#[test]
fn test_failed_trade_returns_risk_capacity() {
    let (mut engine, _, clock) = setup();
    let risk = ExposureLimit::new(Amount::from_units(100));

    for i in 0..3 {
        let req = request(&clock, &format!("m{}", i), Duration::hours(2), 40, 80);
        assert!(matches!(
            engine.commit_trade(req, &risk),
            Err(PoolError::InsufficientLiquidity { .. })
        ));
    }
    assert_eq!(risk.reserved(RoundIndex::DEFAULT), Amount::ZERO);

    engine.fund_default_liquidity(Amount::from_units(1_000)).unwrap();
    let req = request(&clock, "m3", Duration::hours(2), 40, 80);
    engine.commit_trade(req, &risk).unwrap();
    assert_eq!(risk.reserved(RoundIndex::DEFAULT), Amount::from_units(80));
    assert_eq!(engine.metrics().snapshot().trades_rejected, 3);
}
