//! Core round accounting engine.

use std::sync::Arc;

use tracing::{info, instrument};

use parlaypool_common::{
    Amount, Clock, PoolError, Ratio, Result, RoundIndex, Ticket, TicketId, Timestamp, UserId,
};
use parlaypool_ledger::CollateralLedger;
use parlaypool_pool::{DefaultLiquidityProvider, RoundPool};

use crate::config::{PoolConfig, PoolLimits};
use crate::events::PoolEvent;
use crate::metrics::{Metrics, SharedMetrics};
use crate::oracle::ResultOracle;
use crate::state::{
    ClosingSnapshot, RoundAccountingState, RoundPhase, RoundRecord, WithdrawalRequest,
};

/// The round accounting engine.
///
/// Owns round progression, exposure bookkeeping and PnL settlement. Every
/// operation either applies all of its effects or none of them.
pub struct RoundAccountingEngine {
    pub(crate) config: PoolConfig,
    pub(crate) limits: PoolLimits,
    pub(crate) state: RoundAccountingState,
    pub(crate) ledger: Arc<dyn CollateralLedger>,
    pub(crate) oracle: Arc<dyn ResultOracle>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: SharedMetrics,
    pub(crate) events: Vec<PoolEvent>,
}

impl RoundAccountingEngine {
    /// Create an engine for a pool that has not started.
    pub fn new(
        config: PoolConfig,
        ledger: Arc<dyn CollateralLedger>,
        oracle: Arc<dyn ResultOracle>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let limits = config.limits()?;
        let mut state = RoundAccountingState::new();
        state.pools.get_or_create(RoundIndex::DEFAULT, clock.now())?;

        info!(
            collateral = %ledger.collateral(),
            round_length_secs = limits.round_length.num_seconds(),
            "Round accounting engine created"
        );

        Ok(Self {
            config,
            limits,
            state,
            ledger,
            oracle,
            clock,
            metrics: Arc::new(Metrics::new()),
            events: Vec::new(),
        })
    }

    /// Start trading: round 2 becomes active with everything deposited
    /// into it as its allocation.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.state.started {
            return Err(PoolError::PoolAlreadyStarted);
        }

        let round = RoundIndex::FIRST_TRADING;
        let now = self.now();
        let staged = self.state.pools.get_or_create(round, now)?.balance(&*self.ledger)?;

        if staged < self.limits.min_total_deposit {
            return Err(PoolError::NotEnoughDeposits {
                required: self.limits.min_total_deposit.to_string(),
                staged: staged.to_string(),
            });
        }

        let end = now + self.limits.round_length;
        let record = self
            .state
            .rounds
            .entry(round)
            .or_insert_with(|| RoundRecord::pending(round));
        record.transition(RoundPhase::Active);
        record.allocation = staged;
        record.start_time = Some(now);
        record.end_time = Some(end);

        self.state.round = round;
        self.state.started = true;
        self.state.first_round_start = Some(now);

        info!(
            allocation = %staged,
            start = %now,
            end = %end,
            "Pool started"
        );
        self.emit(PoolEvent::PoolStarted {
            allocation: staged,
            start_time: now,
            end_time: end,
        });

        Ok(())
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn emit(&mut self, event: PoolEvent) {
        self.events.push(event);
    }

    pub(crate) fn record(&self, round: RoundIndex) -> Result<&RoundRecord> {
        self.state
            .rounds
            .get(&round)
            .ok_or(PoolError::UnknownRound(round))
    }

    pub(crate) fn record_mut(&mut self, round: RoundIndex) -> Result<&mut RoundRecord> {
        self.state
            .rounds
            .get_mut(&round)
            .ok_or(PoolError::UnknownRound(round))
    }

    /// Ensure a pending record and a pool exist for `round`.
    pub(crate) fn ensure_round(&mut self, round: RoundIndex) -> Result<()> {
        let now = self.now();
        self.state.pools.get_or_create(round, now)?;
        self.state
            .rounds
            .entry(round)
            .or_insert_with(|| RoundRecord::pending(round));
        Ok(())
    }

    /// Take every event emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }

    // Read-only getters.

    /// Current round. Round 1 until the pool starts.
    pub fn round(&self) -> RoundIndex {
        self.state.round
    }

    pub fn is_started(&self) -> bool {
        self.state.started
    }

    pub fn first_round_start(&self) -> Option<Timestamp> {
        self.state.first_round_start
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn limits(&self) -> &PoolLimits {
        &self.limits
    }

    pub fn ledger(&self) -> &Arc<dyn CollateralLedger> {
        &self.ledger
    }

    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// Pool of `round`, if it has been created.
    pub fn round_pool(&self, round: RoundIndex) -> Option<&RoundPool> {
        self.state.pools.get(round)
    }

    /// Collateral held by the pool of `round`.
    pub fn pool_balance(&self, round: RoundIndex) -> Result<Amount> {
        self.state
            .pools
            .get(round)
            .ok_or(PoolError::UnknownRound(round))?
            .balance(&*self.ledger)
    }

    pub fn round_record(&self, round: RoundIndex) -> Option<&RoundRecord> {
        self.state.rounds.get(&round)
    }

    pub fn allocation_per_round(&self, round: RoundIndex) -> Option<Amount> {
        self.state
            .rounds
            .get(&round)
            .filter(|r| r.phase != RoundPhase::Pending)
            .map(|r| r.allocation)
    }

    pub fn profit_and_loss_per_round(&self, round: RoundIndex) -> Option<Ratio> {
        self.state.pnl_per_round.get(&round).copied()
    }

    /// Running product of per-round PnL up to `round`. 1.0 before round 2.
    pub fn cumulative_profit_and_loss(&self, round: RoundIndex) -> Option<Ratio> {
        self.state.cumulative_pnl_at(round)
    }

    pub fn round_start_time(&self, round: RoundIndex) -> Option<Timestamp> {
        self.state.rounds.get(&round).and_then(|r| r.start_time)
    }

    pub fn round_end_time(&self, round: RoundIndex) -> Option<Timestamp> {
        self.state.rounds.get(&round).and_then(|r| r.end_time)
    }

    pub fn ticket(&self, id: TicketId) -> Option<&Ticket> {
        self.state.tickets.get(&id)
    }

    /// Round a ticket is bound to.
    pub fn ticket_round(&self, id: TicketId) -> Option<RoundIndex> {
        self.state.tickets.get(&id).map(|t| t.round)
    }

    pub fn ticket_already_exercised_in_round(&self, round: RoundIndex, id: TicketId) -> bool {
        self.state
            .rounds
            .get(&round)
            .map(|r| r.exercised_tickets.contains(&id))
            .unwrap_or(false)
    }

    /// Balance of `user` in `round`, in internal units.
    pub fn depositor_balance(&self, round: RoundIndex, user: &UserId) -> Amount {
        self.state.book.balance(round, user)
    }

    pub fn pending_withdrawal(&self, user: &UserId) -> Option<&WithdrawalRequest> {
        self.state.withdrawal_requests.get(user)
    }

    pub fn users_processed_in_round(&self) -> usize {
        self.state
            .closing
            .as_ref()
            .map(|c| c.processed.len())
            .unwrap_or(0)
    }

    pub fn closing_snapshot(&self) -> Option<&ClosingSnapshot> {
        self.state.closing.as_ref()
    }

    pub fn default_provider(&self) -> &DefaultLiquidityProvider {
        &self.state.default_provider
    }

    pub fn state(&self) -> &RoundAccountingState {
        &self.state
    }

    /// Whether the current round may be prepared for closing now.
    pub fn can_close_current_round(&self) -> bool {
        if !self.state.started || self.state.closing_prepared() {
            return false;
        }
        let now = self.now();
        self.state
            .rounds
            .get(&self.state.round)
            .map(|r| {
                r.phase == RoundPhase::Active
                    && r.end_time.map(|end| now >= end).unwrap_or(false)
                    && r.all_tickets_exercised()
            })
            .unwrap_or(false)
    }
}
