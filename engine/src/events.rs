//! Events emitted by engine state changes.

use serde::{Deserialize, Serialize};

use parlaypool_common::{Amount, Ratio, RoundIndex, TicketId, TicketStatus, Timestamp, UserId};

/// A state change observers can react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    PoolStarted {
        allocation: Amount,
        start_time: Timestamp,
        end_time: Timestamp,
    },
    Deposited {
        user: UserId,
        round: RoundIndex,
        amount: Amount,
    },
    WithdrawalRequested {
        user: UserId,
        round: RoundIndex,
        share: Option<Ratio>,
    },
    TradeRecorded {
        ticket_id: TicketId,
        round: RoundIndex,
        stake: Amount,
        payout: Amount,
    },
    TicketExercised {
        ticket_id: TicketId,
        round: RoundIndex,
        status: TicketStatus,
        amount_paid: Amount,
    },
    RoundClosingPrepared {
        round: RoundIndex,
        closing_balance: Amount,
        depositors: usize,
    },
    RoundClosingBatchProcessed {
        round: RoundIndex,
        processed: usize,
        remaining: usize,
    },
    Claimed {
        user: UserId,
        round: RoundIndex,
        amount: Amount,
    },
    RoundClosed {
        round: RoundIndex,
        pnl: Ratio,
        cumulative_pnl: Ratio,
        safe_box_cut: Amount,
        next_allocation: Amount,
    },
    DefaultLiquidityFunded {
        amount: Amount,
    },
    DefaultLiquidityWithdrawn {
        amount: Amount,
    },
}

impl PoolEvent {
    /// Round the event concerns, if any.
    pub fn round(&self) -> Option<RoundIndex> {
        match self {
            PoolEvent::PoolStarted { .. } => Some(RoundIndex::FIRST_TRADING),
            PoolEvent::Deposited { round, .. }
            | PoolEvent::WithdrawalRequested { round, .. }
            | PoolEvent::TradeRecorded { round, .. }
            | PoolEvent::TicketExercised { round, .. }
            | PoolEvent::RoundClosingPrepared { round, .. }
            | PoolEvent::RoundClosingBatchProcessed { round, .. }
            | PoolEvent::Claimed { round, .. }
            | PoolEvent::RoundClosed { round, .. } => Some(*round),
            PoolEvent::DefaultLiquidityFunded { .. }
            | PoolEvent::DefaultLiquidityWithdrawn { .. } => Some(RoundIndex::DEFAULT),
        }
    }
}
