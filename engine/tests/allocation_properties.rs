//! Property tests for round closing conservation.

use std::sync::Arc;

use chrono::Duration;
use proptest::prelude::*;

use parlaypool_common::{
    Amount, Clock, Collateral, ManualClock, NativeAmount, Outcome, Ratio, RoundIndex, TicketMarket,
    UserId,
};
use parlaypool_engine::{InMemoryOracle, PoolConfig, RoundAccountingEngine, TradeRequest, Unlimited};
use parlaypool_ledger::{InMemoryLedger, LedgerAccount};

fn outcome(code: u8) -> Outcome {
    match code {
        0 => Outcome::Won,
        1 => Outcome::Lost,
        _ => Outcome::Cancelled,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn closing_conserves_allocation(
        first in 1_000u64..20_000,
        others in prop::collection::vec(10u64..20_000, 0..5),
        trades in prop::collection::vec((1u64..100, 0u8..3), 0..8),
    ) {
        let ledger = Arc::new(InMemoryLedger::new(Collateral::usdc()));
        let oracle = Arc::new(InMemoryOracle::new());
        let clock = Arc::new(ManualClock::default());
        let mut engine = RoundAccountingEngine::new(
            PoolConfig::default(),
            ledger.clone(),
            oracle.clone(),
            clock.clone(),
        )
        .unwrap();

        let wallet = NativeAmount::new(100_000_000_000);
        ledger.mint(&LedgerAccount::user("trader"), wallet).unwrap();
        let mut users = Vec::new();
        for (i, units) in std::iter::once(first).chain(others).enumerate() {
            let user = UserId::new(format!("lp-{}", i));
            ledger.mint(&LedgerAccount::User(user.clone()), wallet).unwrap();
            engine.deposit(&user, Amount::from_units(units)).unwrap();
            users.push(user);
        }
        engine.start().unwrap();

        for (i, (stake, code)) in trades.iter().enumerate() {
            let market = format!("m{}", i);
            let request = TradeRequest::new(
                "trader",
                vec![TicketMarket::new(
                    market.as_str(),
                    clock.now() + Duration::days(1),
                    Ratio::from_fraction(Amount::from_units(1), Amount::from_units(2)).unwrap(),
                )],
                Amount::from_units(*stake),
                Amount::ZERO,
                Amount::from_units(stake * 2),
            );
            if engine.commit_trade(request, &Unlimited).is_ok() {
                oracle.resolve(market.as_str(), outcome(*code));
            }
        }

        clock.advance(Duration::days(7));
        engine.exercise_tickets_ready_to_be_exercised().unwrap();
        let settlement = engine.close_current_round().unwrap();

        let next = RoundIndex::new(3);
        let allocation = engine.allocation_per_round(next).unwrap();
        prop_assert_eq!(allocation, settlement.carried_forward);
        prop_assert_eq!(
            allocation,
            settlement.closing_balance.try_sub(settlement.safe_box_cut).unwrap()
        );

        let shares: Amount = users.iter().map(|u| engine.depositor_balance(next, u)).sum();
        prop_assert!(shares <= allocation);
        prop_assert!(allocation.try_sub(shares).unwrap() < Amount::from_raw(1_000_000));

        prop_assert_eq!(
            settlement.pnl >= Ratio::ONE,
            settlement.closing_balance >= settlement.allocation
        );
        prop_assert!(ledger.verify_integrity());
    }
}
