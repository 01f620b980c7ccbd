//! Simulation scenarios.

use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario. Amounts are whole collateral units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Deposit into the staging round.
    Deposit { user: String, amount: u64 },
    /// Fund round 1 from the default liquidity provider.
    FundDefaultLiquidity { amount: u64 },
    /// Open round 2.
    Start,
    /// Buy a single-leg ticket. `odds` is the leg's implied probability.
    Trade {
        market: String,
        kickoff_hours: i64,
        odds: String,
        stake: u64,
        payout: u64,
    },
    /// Publish a market result.
    Resolve { market: String, outcome: MarketResult },
    /// Move the clock forward.
    AdvanceDays { days: i64 },
    /// Exercise every ready ticket.
    ExerciseReady,
    /// Request a withdrawal at the end of the current round. `percent`
    /// below 100 asks for a partial withdrawal.
    RequestWithdrawal { user: String, percent: u64 },
    /// Prepare, process and close the current round.
    CloseRound,
    /// Assert a condition.
    Assert { condition: AssertCondition },
}

/// Market results a scenario can publish.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum MarketResult {
    Won,
    Lost,
    Cancelled,
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssertCondition {
    /// The pool is in this round.
    CurrentRound { round: u64 },
    /// The round closed with a PnL above one.
    RoundProfitable { round: u64 },
    /// The round closed with a PnL of exactly one.
    RoundBreakEven { round: u64 },
    /// The safe box holds collateral.
    SafeBoxFunded,
    /// Round 1 funded and exercised these many tickets.
    DefaultRoundTickets { funded: u64, exercised: u64 },
    /// The engine paid out these many withdrawals.
    WithdrawalsPaid { count: u64 },
    /// Whether the user holds shares in the round.
    HoldsShares { user: String, round: u64, holds: bool },
}

impl Scenario {
    /// Names accepted by [`Scenario::load`].
    pub const NAMES: [&'static str; 4] = [
        "profitable-round",
        "default-lp-routing",
        "idle-round",
        "withdrawals",
    ];

    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "profitable-round" => Ok(Self::profitable_round()),
            "default-lp-routing" => Ok(Self::default_lp_routing()),
            "idle-round" => Ok(Self::idle_round()),
            "withdrawals" => Ok(Self::withdrawals()),
            _ => Err(anyhow::anyhow!(
                "Unknown scenario: {} (expected one of: {})",
                name,
                Self::NAMES.join(", ")
            )),
        }
    }

    fn deposit(user: &str, amount: u64) -> ScenarioStep {
        ScenarioStep::Deposit {
            user: user.to_string(),
            amount,
        }
    }

    fn trade(market: &str, kickoff_hours: i64, odds: &str, stake: u64, payout: u64) -> ScenarioStep {
        ScenarioStep::Trade {
            market: market.to_string(),
            kickoff_hours,
            odds: odds.to_string(),
            stake,
            payout,
        }
    }

    fn resolve(market: &str, outcome: MarketResult) -> ScenarioStep {
        ScenarioStep::Resolve {
            market: market.to_string(),
            outcome,
        }
    }

    fn check(condition: AssertCondition) -> ScenarioStep {
        ScenarioStep::Assert { condition }
    }

    /// Losing tickets leave the round in profit and fund the safe box.
    fn profitable_round() -> Self {
        Self {
            name: "profitable-round".to_string(),
            description: "Two losing tickets make round 2 profitable".to_string(),
            steps: vec![
                Self::deposit("alice", 6_000),
                Self::deposit("bob", 4_000),
                ScenarioStep::Start,
                Self::trade("nba-lal-bos", 24, "0.4", 100, 250),
                Self::trade("nfl-kc-buf", 48, "0.5", 50, 100),
                Self::resolve("nba-lal-bos", MarketResult::Lost),
                Self::resolve("nfl-kc-buf", MarketResult::Lost),
                ScenarioStep::AdvanceDays { days: 7 },
                ScenarioStep::ExerciseReady,
                ScenarioStep::CloseRound,
                Self::check(AssertCondition::RoundProfitable { round: 2 }),
                Self::check(AssertCondition::SafeBoxFunded),
                Self::check(AssertCondition::CurrentRound { round: 3 }),
            ],
        }
    }

    /// A ticket whose game starts after the round ends rides on round 1
    /// while later rounds close untouched.
    fn default_lp_routing() -> Self {
        Self {
            name: "default-lp-routing".to_string(),
            description: "Cross-round ticket is funded by the default liquidity provider"
                .to_string(),
            steps: vec![
                ScenarioStep::FundDefaultLiquidity { amount: 20_000 },
                Self::deposit("alice", 5_000),
                ScenarioStep::Start,
                Self::trade("ucl-final", 24 * 10, "0.25", 100, 400),
                Self::check(AssertCondition::DefaultRoundTickets {
                    funded: 1,
                    exercised: 0,
                }),
                ScenarioStep::AdvanceDays { days: 7 },
                ScenarioStep::ExerciseReady,
                ScenarioStep::CloseRound,
                ScenarioStep::AdvanceDays { days: 4 },
                Self::resolve("ucl-final", MarketResult::Won),
                ScenarioStep::ExerciseReady,
                Self::check(AssertCondition::RoundBreakEven { round: 2 }),
                Self::check(AssertCondition::DefaultRoundTickets {
                    funded: 1,
                    exercised: 1,
                }),
            ],
        }
    }

    /// Rounds without trades roll their allocation forward unchanged.
    fn idle_round() -> Self {
        Self {
            name: "idle-round".to_string(),
            description: "Rounds with no trades close at break-even".to_string(),
            steps: vec![
                Self::deposit("alice", 2_000),
                Self::deposit("bob", 1_000),
                ScenarioStep::Start,
                ScenarioStep::AdvanceDays { days: 7 },
                ScenarioStep::CloseRound,
                ScenarioStep::AdvanceDays { days: 7 },
                ScenarioStep::CloseRound,
                Self::check(AssertCondition::RoundBreakEven { round: 2 }),
                Self::check(AssertCondition::RoundBreakEven { round: 3 }),
                Self::check(AssertCondition::CurrentRound { round: 4 }),
                Self::check(AssertCondition::HoldsShares {
                    user: "alice".to_string(),
                    round: 4,
                    holds: true,
                }),
            ],
        }
    }

    /// Full and partial withdrawals are honoured at the round's close.
    fn withdrawals() -> Self {
        Self {
            name: "withdrawals".to_string(),
            description: "Full and partial withdrawals paid at close".to_string(),
            steps: vec![
                Self::deposit("alice", 3_000),
                Self::deposit("bob", 2_000),
                Self::deposit("carol", 1_000),
                ScenarioStep::Start,
                ScenarioStep::RequestWithdrawal {
                    user: "alice".to_string(),
                    percent: 100,
                },
                ScenarioStep::RequestWithdrawal {
                    user: "bob".to_string(),
                    percent: 50,
                },
                Self::trade("nhl-tor-mtl", 24, "0.5", 40, 80),
                Self::resolve("nhl-tor-mtl", MarketResult::Lost),
                ScenarioStep::AdvanceDays { days: 7 },
                ScenarioStep::ExerciseReady,
                ScenarioStep::CloseRound,
                Self::check(AssertCondition::WithdrawalsPaid { count: 2 }),
                Self::check(AssertCondition::HoldsShares {
                    user: "alice".to_string(),
                    round: 3,
                    holds: false,
                }),
                Self::check(AssertCondition::HoldsShares {
                    user: "bob".to_string(),
                    round: 3,
                    holds: true,
                }),
                Self::check(AssertCondition::HoldsShares {
                    user: "carol".to_string(),
                    round: 3,
                    holds: true,
                }),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_named_scenario_loads() {
        for name in Scenario::NAMES {
            let scenario = Scenario::load(name).unwrap();
            assert_eq!(scenario.name, name);
            assert!(!scenario.steps.is_empty());
        }
    }

    #[test]
    fn test_unknown_scenario_rejected() {
        let err = Scenario::load("high-volume").unwrap_err();
        assert!(err.to_string().contains("idle-round"));
    }
}
