//! Metrics collection for engine monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Engine metrics.
pub struct Metrics {
    /// Deposits accepted.
    pub deposits: AtomicU64,
    /// Trades recorded against any round.
    pub trades_recorded: AtomicU64,
    /// Trades refused by the engine or the risk layer.
    pub trades_rejected: AtomicU64,
    /// Trades bound to the default round.
    pub default_round_trades: AtomicU64,
    /// Tickets exercised.
    pub tickets_exercised: AtomicU64,
    /// Depositors rolled forward by closing batches.
    pub depositors_processed: AtomicU64,
    /// Rounds closed.
    pub rounds_closed: AtomicU64,
    /// Withdrawals paid at round close.
    pub withdrawals_paid: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            deposits: AtomicU64::new(0),
            trades_recorded: AtomicU64::new(0),
            trades_rejected: AtomicU64::new(0),
            default_round_trades: AtomicU64::new(0),
            tickets_exercised: AtomicU64::new(0),
            depositors_processed: AtomicU64::new(0),
            rounds_closed: AtomicU64::new(0),
            withdrawals_paid: AtomicU64::new(0),
        }
    }

    pub fn deposit_accepted(&self) {
        self.deposits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a trade and whether it landed in the default round.
    pub fn trade_recorded(&self, default_round: bool) {
        self.trades_recorded.fetch_add(1, Ordering::Relaxed);
        if default_round {
            self.default_round_trades.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn trade_rejected(&self) {
        self.trades_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tickets_exercised(&self, count: u64) {
        self.tickets_exercised.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_depositors_processed(&self, count: u64) {
        self.depositors_processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn withdrawal_paid(&self) {
        self.withdrawals_paid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn round_closed(&self) {
        self.rounds_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            deposits: self.deposits.load(Ordering::Relaxed),
            trades_recorded: self.trades_recorded.load(Ordering::Relaxed),
            trades_rejected: self.trades_rejected.load(Ordering::Relaxed),
            default_round_trades: self.default_round_trades.load(Ordering::Relaxed),
            tickets_exercised: self.tickets_exercised.load(Ordering::Relaxed),
            depositors_processed: self.depositors_processed.load(Ordering::Relaxed),
            rounds_closed: self.rounds_closed.load(Ordering::Relaxed),
            withdrawals_paid: self.withdrawals_paid.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub deposits: u64,
    pub trades_recorded: u64,
    pub trades_rejected: u64,
    pub default_round_trades: u64,
    pub tickets_exercised: u64,
    pub depositors_processed: u64,
    pub rounds_closed: u64,
    pub withdrawals_paid: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
