//! Shared engine handle for concurrent callers.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use parlaypool_common::{Amount, Result, RoundIndex, Ticket, TicketId, UserId};

use crate::closing::ClosingBatchOutcome;
use crate::engine::RoundAccountingEngine;
use crate::events::PoolEvent;
use crate::exercise::ExerciseBatchOutcome;
use crate::risk::RiskLayer;
use crate::state::RoundSettlement;
use crate::trading::TradeRequest;

/// Cloneable handle to one engine. Each call holds the lock for its whole
/// duration, so calls from different actors never interleave mid-way.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Mutex<RoundAccountingEngine>>,
}

impl EngineHandle {
    pub fn new(engine: RoundAccountingEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Lock the engine for a sequence of calls.
    pub fn lock(&self) -> MutexGuard<'_, RoundAccountingEngine> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut RoundAccountingEngine) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn round(&self) -> RoundIndex {
        self.inner.lock().round()
    }

    pub fn deposit(&self, user: &UserId, amount: Amount) -> Result<RoundIndex> {
        self.inner.lock().deposit(user, amount)
    }

    pub fn commit_trade(&self, request: TradeRequest, risk: &dyn RiskLayer) -> Result<Ticket> {
        self.inner.lock().commit_trade(request, risk)
    }

    pub fn exercise_ticket(&self, id: TicketId) -> Result<bool> {
        self.inner.lock().exercise_ticket(id).map(|s| s.is_some())
    }

    pub fn exercise_batch(&self, batch_size: usize) -> Result<ExerciseBatchOutcome> {
        self.inner
            .lock()
            .exercise_tickets_ready_to_be_exercised_batch(batch_size)
    }

    pub fn prepare_round_closing(&self) -> Result<()> {
        self.inner.lock().prepare_round_closing()
    }

    pub fn process_round_closing_batch(&self, batch_size: usize) -> Result<ClosingBatchOutcome> {
        self.inner.lock().process_round_closing_batch(batch_size)
    }

    pub fn close_round(&self) -> Result<RoundSettlement> {
        self.inner.lock().close_round()
    }

    pub fn drain_events(&self) -> Vec<PoolEvent> {
        self.inner.lock().drain_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use chrono::Duration;
    use parlaypool_common::{Clock, Collateral, ManualClock, NativeAmount, Outcome, Ratio, TicketMarket};
    use parlaypool_ledger::{InMemoryLedger, LedgerAccount};

    use crate::config::PoolConfig;
    use crate::oracle::InMemoryOracle;
    use crate::risk::Unlimited;

    #[test]
    fn test_concurrent_exercise_never_double_pays() {
        let ledger = Arc::new(InMemoryLedger::new(Collateral::usdc()));
        ledger
            .mint(&LedgerAccount::user("lp"), NativeAmount::new(10_000_000_000))
            .unwrap();
        ledger
            .mint(&LedgerAccount::user("trader"), NativeAmount::new(10_000_000_000))
            .unwrap();
        let oracle = Arc::new(InMemoryOracle::new());
        let clock = Arc::new(ManualClock::default());
        let engine = RoundAccountingEngine::new(
            PoolConfig::default(),
            ledger.clone(),
            oracle.clone(),
            clock.clone(),
        )
        .unwrap();
        let handle = EngineHandle::new(engine);

        handle.deposit(&UserId::new("lp"), Amount::from_units(1_000)).unwrap();
        handle.with(|e| e.start()).unwrap();

        for i in 0..20 {
            let market = format!("m{}", i);
            let request = TradeRequest::new(
                "trader",
                vec![TicketMarket::new(
                    market.as_str(),
                    clock.now() + Duration::days(1),
                    Ratio::ONE,
                )],
                Amount::from_units(5),
                Amount::ZERO,
                Amount::from_units(10),
            );
            handle.commit_trade(request, &Unlimited).unwrap();
            oracle.resolve(market.as_str(), Outcome::Won);
        }

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || {
                    let mut exercised = 0;
                    loop {
                        let outcome = handle.exercise_batch(3).unwrap();
                        exercised += outcome.exercised;
                        if outcome.exercised == 0 {
                            return exercised;
                        }
                    }
                })
            })
            .collect();
        let total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

        assert_eq!(total, 20);
        assert_eq!(
            handle.lock().pool_balance(RoundIndex::new(2)).unwrap(),
            Amount::from_units(900)
        );
        assert!(ledger.verify_integrity());
    }
}
