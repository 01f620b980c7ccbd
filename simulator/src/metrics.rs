//! Simulation metrics.

use serde::Serialize;

use parlaypool_common::{Amount, RoundIndex};
use parlaypool_engine::{MetricsSnapshot, RoundSettlement};

/// Outcome of one closed round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round: u64,
    pub allocation: String,
    pub closing_balance: String,
    pub safe_box_cut: String,
    pub withdrawals_paid: String,
    pub pnl: String,
    pub cumulative_pnl: String,
}

impl RoundReport {
    pub fn new(round: RoundIndex, settlement: &RoundSettlement) -> Self {
        Self {
            round: round.get(),
            allocation: settlement.allocation.to_string(),
            closing_balance: settlement.closing_balance.to_string(),
            safe_box_cut: settlement.safe_box_cut.to_string(),
            withdrawals_paid: settlement.withdrawals_paid.to_string(),
            pnl: settlement.pnl.to_string(),
            cumulative_pnl: settlement.cumulative_pnl.to_string(),
        }
    }
}

/// Simulation metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationMetrics {
    /// Trades submitted to the engine.
    pub trades_attempted: u64,
    /// Trades the engine accepted.
    pub trades_accepted: u64,
    /// Trades the engine refused.
    pub trades_rejected: u64,
    /// Accepted trades bound to round 1.
    pub default_round_trades: u64,
    /// Deposits or withdrawal requests the engine refused.
    pub requests_rejected: u64,
    pub tickets_exercised: u64,
    pub withdrawals_requested: u64,
    /// Post-close invariant checks that passed.
    pub invariant_checks: u64,
    /// Total collateral moved to the safe box.
    pub safe_box_total: Amount,
    /// One entry per closed round.
    pub rounds: Vec<RoundReport>,
    /// Engine counters at the end of the run.
    pub engine: Option<MetricsSnapshot>,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted trade.
    pub fn record_trade(&mut self, default_round: bool) {
        self.trades_attempted += 1;
        self.trades_accepted += 1;
        if default_round {
            self.default_round_trades += 1;
        }
    }

    /// Record a refused trade.
    pub fn record_rejection(&mut self) {
        self.trades_attempted += 1;
        self.trades_rejected += 1;
    }

    /// Record a closed round that passed the invariant checks.
    pub fn record_close(&mut self, round: RoundIndex, settlement: &RoundSettlement) -> anyhow::Result<()> {
        self.invariant_checks += 1;
        self.safe_box_total = self.safe_box_total.try_add(settlement.safe_box_cut)?;
        self.rounds.push(RoundReport::new(round, settlement));
        Ok(())
    }

    pub fn rounds_closed(&self) -> usize {
        self.rounds.len()
    }

    /// Share of attempted trades the engine accepted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.trades_attempted == 0 {
            return 0.0;
        }

        self.trades_accepted as f64 / self.trades_attempted as f64
    }

    /// Share of accepted trades routed to round 1.
    pub fn default_round_share(&self) -> f64 {
        if self.trades_accepted == 0 {
            return 0.0;
        }

        self.default_round_trades as f64 / self.trades_accepted as f64
    }
}
