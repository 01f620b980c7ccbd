//! ParlayPool Round Accounting Engine
//!
//! Backs every ticket with pooled capital, settles winners and losers
//! against the round that funds them, and rolls each round's result into
//! the next through batched closing.

pub mod closing;
pub mod config;
pub mod deposits;
pub mod engine;
pub mod events;
pub mod exercise;
pub mod handle;
pub mod metrics;
pub mod oracle;
pub mod risk;
pub mod state;
pub mod trading;

pub use closing::ClosingBatchOutcome;
pub use config::{PoolConfig, PoolLimits};
pub use engine::RoundAccountingEngine;
pub use events::PoolEvent;
pub use exercise::ExerciseBatchOutcome;
pub use handle::EngineHandle;
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use oracle::{InMemoryOracle, ResultOracle};
pub use risk::{ExposureLimit, RiskLayer, Unlimited};
pub use state::{
    ClosingSnapshot, RoundAccountingState, RoundPhase, RoundRecord, RoundSettlement,
    WithdrawalRequest,
};
pub use trading::TradeRequest;
