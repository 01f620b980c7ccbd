//! Round accounting state definitions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use parlaypool_common::{Amount, Ratio, Result, RoundIndex, Ticket, TicketId, Timestamp, UserId};
use parlaypool_pool::{DefaultLiquidityProvider, RoundPoolTable};

/// Lifecycle phase of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    /// Accepting deposits, not yet trading.
    Pending,
    /// Trading.
    Active,
    /// Balance and depositor roster snapshotted.
    ClosingPrepared,
    /// Depositors being rolled forward in batches.
    Processing,
    /// PnL final, allocation rolled into the next round.
    Closed,
}

impl RoundPhase {
    /// Get valid next phases.
    pub fn valid_transitions(&self) -> &[RoundPhase] {
        match self {
            RoundPhase::Pending => &[RoundPhase::Active],
            RoundPhase::Active => &[RoundPhase::ClosingPrepared],
            RoundPhase::ClosingPrepared => &[RoundPhase::Processing, RoundPhase::Closed],
            RoundPhase::Processing => &[RoundPhase::Closed],
            RoundPhase::Closed => &[],
        }
    }

    /// Check if transition to given phase is valid.
    pub fn can_transition_to(&self, next: RoundPhase) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Check if closing has been prepared.
    pub fn is_closing(&self) -> bool {
        matches!(self, RoundPhase::ClosingPrepared | RoundPhase::Processing)
    }
}

/// Per-round record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub index: RoundIndex,
    pub phase: RoundPhase,
    /// Collateral the round started with. Fixed once the round is active.
    pub allocation: Amount,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    /// Every ticket ever bound to the round, in trade order.
    pub trading_tickets: Vec<TicketId>,
    /// Bound tickets not yet exercised, in trade order.
    pub pending_tickets: Vec<TicketId>,
    pub exercised_tickets: BTreeSet<TicketId>,
    pub settlement: Option<RoundSettlement>,
}

impl RoundRecord {
    /// Create a round waiting to start.
    pub fn pending(index: RoundIndex) -> Self {
        Self {
            index,
            phase: RoundPhase::Pending,
            allocation: Amount::ZERO,
            start_time: None,
            end_time: None,
            trading_tickets: Vec::new(),
            pending_tickets: Vec::new(),
            exercised_tickets: BTreeSet::new(),
            settlement: None,
        }
    }

    /// Round 1: active from the beginning, without a schedule.
    pub fn default_round() -> Self {
        Self {
            phase: RoundPhase::Active,
            ..Self::pending(RoundIndex::DEFAULT)
        }
    }

    /// Move to `next`, if allowed. Returns whether the phase changed.
    pub fn transition(&mut self, next: RoundPhase) -> bool {
        if self.phase.can_transition_to(next) {
            self.phase = next;
            true
        } else {
            false
        }
    }

    /// Whether every bound ticket has been exercised.
    pub fn all_tickets_exercised(&self) -> bool {
        self.pending_tickets.is_empty()
    }
}

/// Figures frozen by `prepare_round_closing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosingSnapshot {
    pub round: RoundIndex,
    pub allocation: Amount,
    /// Pool balance when closing was prepared.
    pub closing_balance: Amount,
    /// Positive part of `closing_balance - allocation`.
    pub profit: Amount,
    /// Share of profit owed to the safe box.
    pub safe_box_cut: Amount,
    /// Per-round multiplier applied to every depositor.
    pub pnl: Ratio,
    /// Depositors to roll forward, in processing order.
    pub depositors: Vec<UserId>,
    /// Position of the next depositor to process.
    pub cursor: usize,
    pub processed: BTreeSet<UserId>,
    /// Collateral paid out to withdrawing depositors so far.
    pub withdrawals_paid: Amount,
    pub prepared_at: Timestamp,
}

impl ClosingSnapshot {
    /// Depositors still to process.
    pub fn remaining(&self) -> usize {
        self.depositors.len().saturating_sub(self.processed.len())
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

/// Final accounting of a closed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSettlement {
    pub allocation: Amount,
    pub closing_balance: Amount,
    pub safe_box_cut: Amount,
    pub withdrawals_paid: Amount,
    /// Collateral moved into the next round's pool.
    pub carried_forward: Amount,
    pub pnl: Ratio,
    pub cumulative_pnl: Ratio,
    pub closed_at: Timestamp,
}

/// Outstanding withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Round the request will be honoured at the close of.
    pub round: RoundIndex,
    /// Share of the balance to withdraw. `None` withdraws everything.
    pub share: Option<Ratio>,
    pub requested_at: Timestamp,
}

impl WithdrawalRequest {
    pub fn is_full(&self) -> bool {
        self.share.is_none()
    }
}

/// Depositor balances per round, in internal units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepositorBook {
    balances: BTreeMap<RoundIndex, BTreeMap<UserId, Amount>>,
}

impl DepositorBook {
    pub fn balance(&self, round: RoundIndex, user: &UserId) -> Amount {
        self.balances
            .get(&round)
            .and_then(|r| r.get(user))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Add `amount` to a user's balance in `round`. Returns the new balance.
    pub fn credit(&mut self, round: RoundIndex, user: &UserId, amount: Amount) -> Result<Amount> {
        let slot = self
            .balances
            .entry(round)
            .or_default()
            .entry(user.clone())
            .or_insert(Amount::ZERO);
        *slot = slot.try_add(amount)?;
        Ok(*slot)
    }

    /// Users holding a balance in `round`.
    pub fn depositors(&self, round: RoundIndex) -> Vec<UserId> {
        self.balances
            .get(&round)
            .map(|r| {
                r.iter()
                    .filter(|(_, amount)| !amount.is_zero())
                    .map(|(user, _)| user.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sum of balances in `round`.
    pub fn total(&self, round: RoundIndex) -> Amount {
        self.balances
            .get(&round)
            .map(|r| r.values().copied().sum())
            .unwrap_or(Amount::ZERO)
    }

    /// Whether `user` holds a balance in `round`.
    pub fn holds(&self, round: RoundIndex, user: &UserId) -> bool {
        !self.balance(round, user).is_zero()
    }
}

/// All mutable accounting state of the engine.
#[derive(Debug, Clone)]
pub struct RoundAccountingState {
    /// Current round. Round 1 until the pool starts.
    pub round: RoundIndex,
    pub started: bool,
    pub first_round_start: Option<Timestamp>,
    pub rounds: BTreeMap<RoundIndex, RoundRecord>,
    pub pools: RoundPoolTable,
    pub pnl_per_round: BTreeMap<RoundIndex, Ratio>,
    pub cumulative_pnl: BTreeMap<RoundIndex, Ratio>,
    pub tickets: HashMap<TicketId, Ticket>,
    pub book: DepositorBook,
    pub withdrawal_requests: BTreeMap<UserId, WithdrawalRequest>,
    pub closing: Option<ClosingSnapshot>,
    pub default_provider: DefaultLiquidityProvider,
}

impl RoundAccountingState {
    /// State of a pool that has not started.
    pub fn new() -> Self {
        let mut rounds = BTreeMap::new();
        rounds.insert(RoundIndex::DEFAULT, RoundRecord::default_round());

        Self {
            round: RoundIndex::DEFAULT,
            started: false,
            first_round_start: None,
            rounds,
            pools: RoundPoolTable::new(),
            pnl_per_round: BTreeMap::new(),
            cumulative_pnl: BTreeMap::new(),
            tickets: HashMap::new(),
            book: DepositorBook::default(),
            withdrawal_requests: BTreeMap::new(),
            closing: None,
            default_provider: DefaultLiquidityProvider::new(),
        }
    }

    /// Round deposits are currently staged into.
    pub fn staging_round(&self) -> RoundIndex {
        self.round.next()
    }

    /// Cumulative PnL up to and including `round`. 1.0 before round 2.
    pub fn cumulative_pnl_at(&self, round: RoundIndex) -> Option<Ratio> {
        if round < RoundIndex::FIRST_TRADING {
            return Some(Ratio::ONE);
        }
        self.cumulative_pnl.get(&round).copied()
    }

    /// Whether the current round has closing prepared.
    pub fn closing_prepared(&self) -> bool {
        self.closing.is_some()
    }

    /// Distinct users holding a balance in the current or staging round.
    pub fn active_users(&self) -> BTreeSet<UserId> {
        let mut users: BTreeSet<UserId> = self.book.depositors(self.round).into_iter().collect();
        users.extend(self.book.depositors(self.staging_round()));
        users
    }
}

impl Default for RoundAccountingState {
    fn default() -> Self {
        Self::new()
    }
}
