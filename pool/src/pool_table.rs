//! Index-addressed table of round pools.

use chrono::{DateTime, Utc};
use tracing::info;

use parlaypool_common::{PoolError, Result, RoundIndex};

use crate::round_pool::RoundPool;

/// Arena of round pools addressed by round index. Pools are created on
/// demand and never removed.
#[derive(Debug, Clone, Default)]
pub struct RoundPoolTable {
    pools: Vec<RoundPool>,
}

impl RoundPoolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(round: RoundIndex) -> Result<usize> {
        if round.get() == 0 {
            return Err(PoolError::UnknownRound(round));
        }
        usize::try_from(round.get() - 1).map_err(|_| PoolError::UnknownRound(round))
    }

    /// Get the pool of `round`, creating it (and any missing earlier pools)
    /// if needed.
    pub fn get_or_create(&mut self, round: RoundIndex, now: DateTime<Utc>) -> Result<&mut RoundPool> {
        let slot = Self::slot(round)?;
        while self.pools.len() <= slot {
            let index = RoundIndex::new(self.pools.len() as u64 + 1);
            info!(round = %index, "Round pool created");
            self.pools.push(RoundPool::new(index, now));
        }
        Ok(&mut self.pools[slot])
    }

    /// Get the pool of `round`, if it exists.
    pub fn get(&self, round: RoundIndex) -> Option<&RoundPool> {
        Self::slot(round).ok().and_then(|slot| self.pools.get(slot))
    }

    /// Get the pool of `round` mutably.
    pub fn get_mut(&mut self, round: RoundIndex) -> Result<&mut RoundPool> {
        let slot = Self::slot(round)?;
        self.pools.get_mut(slot).ok_or(PoolError::UnknownRound(round))
    }

    /// Whether a pool exists for `round`.
    pub fn contains(&self, round: RoundIndex) -> bool {
        self.get(round).is_some()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoundPool> {
        self.pools.iter()
    }
}
