//! Risk layer interface consulted before a trade is accepted.

use dashmap::DashMap;
use tracing::debug;

use parlaypool_common::{Amount, RoundIndex};

/// Capacity check run before a trade reaches the engine.
pub trait RiskLayer: Send + Sync {
    /// Reserve `amount` of payout capacity in `round`. Returns `false` to
    /// refuse the trade.
    fn reserve_payout(&self, round: RoundIndex, amount: Amount) -> bool;

    /// Give back a reservation whose trade the engine did not record.
    fn release_payout(&self, round: RoundIndex, amount: Amount);
}

/// Accepts every trade.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RiskLayer for Unlimited {
    fn reserve_payout(&self, _round: RoundIndex, _amount: Amount) -> bool {
        true
    }

    fn release_payout(&self, _round: RoundIndex, _amount: Amount) {}
}

/// Caps the total payout reserved per round.
#[derive(Debug)]
pub struct ExposureLimit {
    max_per_round: Amount,
    reserved: DashMap<RoundIndex, Amount>,
}

impl ExposureLimit {
    pub fn new(max_per_round: Amount) -> Self {
        Self {
            max_per_round,
            reserved: DashMap::new(),
        }
    }

    /// Payout reserved so far in `round`.
    pub fn reserved(&self, round: RoundIndex) -> Amount {
        self.reserved
            .get(&round)
            .map(|r| *r.value())
            .unwrap_or(Amount::ZERO)
    }
}

impl RiskLayer for ExposureLimit {
    fn reserve_payout(&self, round: RoundIndex, amount: Amount) -> bool {
        let mut slot = self.reserved.entry(round).or_insert(Amount::ZERO);
        match slot.try_add(amount) {
            Ok(total) if total <= self.max_per_round => {
                *slot = total;
                true
            }
            _ => {
                debug!(round = %round, amount = %amount, "Payout reservation refused");
                false
            }
        }
    }

    fn release_payout(&self, round: RoundIndex, amount: Amount) {
        if let Some(mut slot) = self.reserved.get_mut(&round) {
            *slot = slot.saturating_sub(amount);
            debug!(round = %round, amount = %amount, "Payout reservation released");
        }
    }
}
