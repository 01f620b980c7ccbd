//! Engine configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use parlaypool_common::{Amount, PoolError, Ratio, Result};

/// Liquidity pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Length of every trading round.
    pub round_length: Duration,
    /// Deposits staged for round 2 required to start the pool.
    pub min_total_deposit: Decimal,
    /// Smallest accepted deposit.
    pub min_deposit_amount: Decimal,
    /// Largest balance one user may hold across the current and next round.
    pub max_allowed_deposit: Decimal,
    /// Maximum number of distinct depositors.
    pub max_allowed_users: usize,
    /// Share of positive round profit sent to the safe box.
    pub safe_box_impact: Decimal,
    /// Tickets exercised per automation call.
    pub default_exercise_batch: usize,
    /// Depositors processed per closing batch.
    pub default_closing_batch: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            round_length: Duration::from_secs(7 * 24 * 60 * 60),
            min_total_deposit: Decimal::from(1_000),
            min_deposit_amount: Decimal::from(10),
            max_allowed_deposit: Decimal::from(100_000),
            max_allowed_users: 1_000,
            safe_box_impact: Decimal::new(1, 1),
            default_exercise_batch: 100,
            default_closing_batch: 100,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl PoolConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("POOL_ROUND_LENGTH_SECS") {
            config.round_length = Duration::from_secs(secs);
        }

        if let Some(amount) = env_parse("POOL_MIN_TOTAL_DEPOSIT") {
            config.min_total_deposit = amount;
        }

        if let Some(amount) = env_parse("POOL_MIN_DEPOSIT") {
            config.min_deposit_amount = amount;
        }

        if let Some(amount) = env_parse("POOL_MAX_DEPOSIT") {
            config.max_allowed_deposit = amount;
        }

        if let Some(users) = env_parse("POOL_MAX_USERS") {
            config.max_allowed_users = users;
        }

        if let Some(impact) = env_parse("POOL_SAFE_BOX_IMPACT") {
            config.safe_box_impact = impact;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.round_length.is_zero() {
            return Err("Round length cannot be 0".to_string());
        }

        if self.safe_box_impact.is_sign_negative() || self.safe_box_impact > Decimal::ONE {
            return Err("Safe box impact must be between 0 and 1".to_string());
        }

        if self.min_total_deposit.is_sign_negative()
            || self.min_deposit_amount.is_sign_negative()
            || self.max_allowed_deposit.is_sign_negative()
        {
            return Err("Deposit limits cannot be negative".to_string());
        }

        if self.min_deposit_amount > self.max_allowed_deposit {
            return Err("Minimum deposit cannot exceed maximum deposit".to_string());
        }

        if self.max_allowed_users == 0 {
            return Err("Max allowed users cannot be 0".to_string());
        }

        if self.default_exercise_batch == 0 || self.default_closing_batch == 0 {
            return Err("Batch sizes cannot be 0".to_string());
        }

        Ok(())
    }

    /// Validate and convert to internal units.
    pub fn limits(&self) -> Result<PoolLimits> {
        self.validate().map_err(PoolError::ConfigurationError)?;

        let round_length = chrono::Duration::from_std(self.round_length)
            .map_err(|e| PoolError::ConfigurationError(e.to_string()))?;

        Ok(PoolLimits {
            round_length,
            min_total_deposit: Amount::from_decimal(self.min_total_deposit)?,
            min_deposit_amount: Amount::from_decimal(self.min_deposit_amount)?,
            max_allowed_deposit: Amount::from_decimal(self.max_allowed_deposit)?,
            max_allowed_users: self.max_allowed_users,
            safe_box_impact: Ratio::from_decimal(self.safe_box_impact)?,
        })
    }
}

/// Configuration limits in the engine's internal units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub round_length: chrono::Duration,
    pub min_total_deposit: Amount,
    pub min_deposit_amount: Amount,
    pub max_allowed_deposit: Amount,
    pub max_allowed_users: usize,
    pub safe_box_impact: Ratio,
}
