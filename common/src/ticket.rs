//! Ticket types and settlement state machine.

use crate::{Amount, MarketId, PoolError, Ratio, Result, RoundIndex, TicketId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Resolved result of a single market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The trader's position on this market won.
    Won,
    /// The trader's position on this market lost.
    Lost,
    /// The market was voided.
    Cancelled,
}

/// Ticket status representing the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Recorded against its round, waiting for market results.
    Open,
    /// Exercised, trader was paid.
    Won,
    /// Exercised, stake forfeited to the pool.
    Lost,
    /// Exercised, every leg voided and the stake refunded.
    Cancelled,
}

impl TicketStatus {
    /// Check if this is a final state.
    pub fn is_final(&self) -> bool {
        !matches!(self, TicketStatus::Open)
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[TicketStatus] {
        match self {
            TicketStatus::Open => &[TicketStatus::Won, TicketStatus::Lost, TicketStatus::Cancelled],
            TicketStatus::Won | TicketStatus::Lost | TicketStatus::Cancelled => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// One leg of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMarket {
    /// Market the leg is placed on.
    pub market_id: MarketId,
    /// When the market's game starts.
    pub maturity: Timestamp,
    /// Quoted implied probability of the leg.
    pub odds: Ratio,
}

impl TicketMarket {
    /// Create a ticket leg.
    pub fn new(market_id: impl Into<MarketId>, maturity: Timestamp, odds: Ratio) -> Self {
        Self {
            market_id: market_id.into(),
            maturity,
            odds,
        }
    }
}

/// Result of evaluating a ticket against its markets' outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSettlement {
    /// Final status.
    pub status: TicketStatus,
    /// What the round pool owes the trader.
    pub amount_to_trader: Amount,
}

/// An immutable record of one trader's wagers and the round funding them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier.
    pub id: TicketId,
    /// Trader who bought the ticket.
    pub trader: UserId,
    /// Ticket legs.
    pub markets: Vec<TicketMarket>,
    /// Buy-in paid by the trader, fees included.
    pub stake: Amount,
    /// Part of the stake credited outside the pool.
    pub fees: Amount,
    /// Payout reserved for a winning ticket.
    pub payout: Amount,
    /// Round whose pool funds this ticket.
    pub round: RoundIndex,
    /// Current status.
    pub status: TicketStatus,
    /// When the trade was recorded.
    pub created_at: Timestamp,
    /// When the ticket was exercised.
    pub exercised_at: Option<Timestamp>,
    /// Amount paid to the trader on exercise.
    pub amount_paid: Option<Amount>,
}

impl Ticket {
    /// Create an open ticket bound to `round`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TicketId,
        trader: UserId,
        markets: Vec<TicketMarket>,
        stake: Amount,
        fees: Amount,
        payout: Amount,
        round: RoundIndex,
        created_at: Timestamp,
    ) -> Result<Self> {
        let ticket = Self {
            id,
            trader,
            markets,
            stake,
            fees,
            payout,
            round,
            status: TicketStatus::Open,
            created_at,
            exercised_at: None,
            amount_paid: None,
        };
        ticket.validate()?;
        Ok(ticket)
    }

    fn invalid(&self, reason: &str) -> PoolError {
        PoolError::InvalidTicket {
            ticket_id: self.id,
            reason: reason.to_string(),
        }
    }

    /// Check the ticket's internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.markets.is_empty() {
            return Err(self.invalid("ticket has no markets"));
        }
        if self.stake.is_zero() {
            return Err(self.invalid("stake must be positive"));
        }
        if self.fees >= self.stake {
            return Err(self.invalid("fees must be below the stake"));
        }
        if self.payout < self.net_stake() {
            return Err(self.invalid("payout below net stake"));
        }
        if self
            .markets
            .iter()
            .any(|m| m.odds == Ratio::ZERO || !m.odds.is_fraction())
        {
            return Err(self.invalid("leg odds must be in (0, 1]"));
        }
        Ok(())
    }

    /// Stake that actually flows into the round pool.
    pub fn net_stake(&self) -> Amount {
        self.stake.saturating_sub(self.fees)
    }

    /// Earliest market start on the ticket.
    pub fn earliest_maturity(&self) -> Option<Timestamp> {
        self.markets.iter().map(|m| m.maturity).min()
    }

    /// Latest market start on the ticket.
    pub fn latest_maturity(&self) -> Option<Timestamp> {
        self.markets.iter().map(|m| m.maturity).max()
    }

    /// Whether the ticket has been exercised.
    pub fn is_exercised(&self) -> bool {
        self.status.is_final()
    }

    /// Evaluate the ticket against its markets' outcomes, in leg order.
    pub fn settle(&self, outcomes: &[Outcome]) -> Result<TicketSettlement> {
        if outcomes.len() != self.markets.len() {
            return Err(self.invalid("outcome count does not match legs"));
        }

        if outcomes.contains(&Outcome::Lost) {
            return Ok(TicketSettlement {
                status: TicketStatus::Lost,
                amount_to_trader: Amount::ZERO,
            });
        }

        if outcomes.iter().all(|o| *o == Outcome::Cancelled) {
            return Ok(TicketSettlement {
                status: TicketStatus::Cancelled,
                amount_to_trader: self.net_stake(),
            });
        }

        // A voided leg drops out of the parlay: the payout shrinks by that
        // leg's implied probability.
        let mut payout = self.payout;
        for (market, outcome) in self.markets.iter().zip(outcomes) {
            if *outcome == Outcome::Cancelled {
                payout = payout.try_mul_ratio(market.odds)?;
            }
        }

        Ok(TicketSettlement {
            status: TicketStatus::Won,
            amount_to_trader: payout.max(self.net_stake()).min(self.payout),
        })
    }

    /// Record the exercise result.
    pub fn mark_exercised(
        &mut self,
        settlement: &TicketSettlement,
        at: Timestamp,
    ) -> std::result::Result<(), InvalidTransition> {
        if !self.status.can_transition_to(settlement.status) {
            return Err(InvalidTransition {
                from: self.status,
                to: settlement.status,
            });
        }
        self.status = settlement.status;
        self.exercised_at = Some(at);
        self.amount_paid = Some(settlement.amount_to_trader);
        Ok(())
    }
}

/// Error when attempting invalid state transition.
#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub from: TicketStatus,
    pub to: TicketStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid ticket transition from {:?} to {:?}",
            self.from, self.to
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn odds(value: rust_decimal::Decimal) -> Ratio {
        Ratio::from_decimal(value).unwrap()
    }

    fn create_test_ticket() -> Ticket {
        let kickoff = crate::now() + Duration::days(1);
        Ticket::new(
            TicketId::new(),
            UserId::new("trader_1"),
            vec![
                TicketMarket::new("nba-lal-bos", kickoff, odds(dec!(0.5))),
                TicketMarket::new("epl-ars-che", kickoff + Duration::hours(3), odds(dec!(0.4))),
            ],
            Amount::from_units(10),
            Amount::from_decimal(dec!(0.2)).unwrap(),
            Amount::from_units(49),
            RoundIndex::FIRST_TRADING,
            crate::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_ticket_creation() {
        let ticket = create_test_ticket();
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.net_stake(), Amount::from_decimal(dec!(9.8)).unwrap());
        assert!(ticket.earliest_maturity() < ticket.latest_maturity());
    }

    #[test]
    fn test_invalid_ticket_rejected() {
        let mut ticket = create_test_ticket();
        ticket.payout = Amount::from_units(1);
        assert!(matches!(ticket.validate(), Err(PoolError::InvalidTicket { .. })));

        ticket = create_test_ticket();
        ticket.markets.clear();
        assert!(ticket.validate().is_err());
    }

    #[test]
    fn test_settle_outcomes() {
        let ticket = create_test_ticket();

        let won = ticket.settle(&[Outcome::Won, Outcome::Won]).unwrap();
        assert_eq!(won.status, TicketStatus::Won);
        assert_eq!(won.amount_to_trader, Amount::from_units(49));

        let lost = ticket.settle(&[Outcome::Won, Outcome::Lost]).unwrap();
        assert_eq!(lost.status, TicketStatus::Lost);
        assert_eq!(lost.amount_to_trader, Amount::ZERO);

        let voided = ticket
            .settle(&[Outcome::Cancelled, Outcome::Cancelled])
            .unwrap();
        assert_eq!(voided.status, TicketStatus::Cancelled);
        assert_eq!(voided.amount_to_trader, ticket.net_stake());
    }

    #[test]
    fn test_partially_cancelled_parlay_pays_remaining_legs() {
        let ticket = create_test_ticket();
        let settlement = ticket.settle(&[Outcome::Cancelled, Outcome::Won]).unwrap();
        assert_eq!(settlement.status, TicketStatus::Won);
        assert_eq!(
            settlement.amount_to_trader,
            Amount::from_decimal(dec!(24.5)).unwrap()
        );
    }

    #[test]
    fn test_exercise_is_one_way() {
        let mut ticket = create_test_ticket();
        let lost = ticket.settle(&[Outcome::Lost, Outcome::Won]).unwrap();
        assert!(ticket.mark_exercised(&lost, crate::now()).is_ok());
        assert!(ticket.is_exercised());
        assert!(ticket.mark_exercised(&lost, crate::now()).is_err());
    }

    #[test]
    fn test_final_states() {
        assert!(TicketStatus::Won.is_final());
        assert!(TicketStatus::Lost.is_final());
        assert!(TicketStatus::Cancelled.is_final());
        assert!(!TicketStatus::Open.is_final());
    }
}
