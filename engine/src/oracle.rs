//! Market result resolution.

use dashmap::DashMap;

use parlaypool_common::{MarketId, Outcome, Ticket};

/// Source of market results.
pub trait ResultOracle: Send + Sync {
    /// Whether the market has a final result.
    fn is_market_resolved(&self, market: &MarketId) -> bool;

    /// Final result of the market, if resolved.
    fn outcome(&self, market: &MarketId) -> Option<Outcome>;
}

/// Outcomes of every leg of `ticket`, or `None` while any leg is unresolved.
pub fn ticket_outcomes(oracle: &dyn ResultOracle, ticket: &Ticket) -> Option<Vec<Outcome>> {
    ticket
        .markets
        .iter()
        .map(|m| {
            if oracle.is_market_resolved(&m.market_id) {
                oracle.outcome(&m.market_id)
            } else {
                None
            }
        })
        .collect()
}

/// Oracle fed by explicit resolutions.
#[derive(Debug, Default)]
pub struct InMemoryOracle {
    results: DashMap<MarketId, Outcome>,
}

impl InMemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of a market. Later calls overwrite earlier ones.
    pub fn resolve(&self, market: impl Into<MarketId>, outcome: Outcome) {
        self.results.insert(market.into(), outcome);
    }

    /// Number of resolved markets.
    pub fn resolved_count(&self) -> usize {
        self.results.len()
    }
}

impl ResultOracle for InMemoryOracle {
    fn is_market_resolved(&self, market: &MarketId) -> bool {
        self.results.contains_key(market)
    }

    fn outcome(&self, market: &MarketId) -> Option<Outcome> {
        self.results.get(market).map(|r| *r.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlaypool_common::{Amount, Ratio, RoundIndex, TicketId, TicketMarket, UserId};

    #[test]
    fn test_outcomes_require_every_leg() {
        let oracle = InMemoryOracle::new();
        let now = parlaypool_common::now();
        let ticket = Ticket::new(
            TicketId::new(),
            UserId::new("trader"),
            vec![
                TicketMarket::new("m1", now, Ratio::ONE),
                TicketMarket::new("m2", now, Ratio::ONE),
            ],
            Amount::from_units(10),
            Amount::ZERO,
            Amount::from_units(10),
            RoundIndex::DEFAULT,
            now,
        )
        .unwrap();

        oracle.resolve("m1", Outcome::Won);
        assert!(ticket_outcomes(&oracle, &ticket).is_none());

        oracle.resolve("m2", Outcome::Cancelled);
        assert_eq!(
            ticket_outcomes(&oracle, &ticket),
            Some(vec![Outcome::Won, Outcome::Cancelled])
        );
        assert_eq!(oracle.resolved_count(), 2);
    }
}
