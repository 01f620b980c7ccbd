//! ParlayPool Round Pools
//!
//! Per-round collateral escrows, the arena that creates them, collateral
//! decimal normalization and the default liquidity provider.

pub mod default_provider;
pub mod normalization;
pub mod pool_table;
pub mod round_pool;

pub use default_provider::{DefaultLiquidityProvider, ProfitAndLoss};
pub use normalization::{
    representable_floor, to_internal_units, to_native_units, to_native_units_exact,
};
pub use pool_table::RoundPoolTable;
pub use round_pool::{RoundPool, TransferPlan};
