//! Error types for ParlayPool.

use crate::{RoundIndex, TicketId, Timestamp, UserId};
use thiserror::Error;

/// Main error type for ParlayPool operations.
///
/// Every variant is fatal to the call that produced it: no state is
/// persisted when an operation returns an error. Duplicate work (exercising
/// an exercised ticket, re-processing a depositor) is not an error and is
/// reported as a no-op instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Not enough collateral staged to open the first round.
    #[error("Not enough deposits to start: required {required}, staged {staged}")]
    NotEnoughDeposits { required: String, staged: String },

    /// `start` was called twice.
    #[error("Pool already started")]
    PoolAlreadyStarted,

    /// Operation needs a started pool.
    #[error("Pool not started")]
    PoolNotStarted,

    /// Round does not exist.
    #[error("Unknown round: {0}")]
    UnknownRound(RoundIndex),

    /// Trading or exercising against a round that has already closed.
    #[error("Round {0} is closed")]
    RoundClosed(RoundIndex),

    /// Trading against a round that has not started yet.
    #[error("Round {0} has not started")]
    RoundNotStarted(RoundIndex),

    /// The round is being closed and no longer accepts trades or deposits.
    #[error("Round {0} closing is prepared")]
    RoundClosingPrepared(RoundIndex),

    /// `prepare_round_closing` was called twice.
    #[error("Round {0} closing already prepared")]
    RoundClosingAlreadyPrepared(RoundIndex),

    /// Closing step called before `prepare_round_closing`.
    #[error("Round {0} closing not prepared")]
    RoundClosingNotPrepared(RoundIndex),

    /// Closing prepared before the round's end time.
    #[error("Round {round} ends at {end_time}")]
    RoundNotEnded { round: RoundIndex, end_time: Timestamp },

    /// Closing preconditions unmet.
    #[error("Round {round} not ready to close: {reason}")]
    RoundNotReadyToClose { round: RoundIndex, reason: String },

    /// A ticket with this ID was already recorded.
    #[error("Ticket {0} already bound to a round")]
    TicketAlreadyBound(TicketId),

    /// Ticket recorded against a round other than the one its legs bind to.
    #[error("Ticket {ticket_id} binds to round {bound}, not {requested}")]
    WrongRoundBinding {
        ticket_id: TicketId,
        requested: RoundIndex,
        bound: RoundIndex,
    },

    /// Ticket not found.
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// Ticket has unresolved markets.
    #[error("Ticket {0} has unresolved markets")]
    TicketNotReady(TicketId),

    /// Ticket fields are inconsistent.
    #[error("Invalid ticket {ticket_id}: {reason}")]
    InvalidTicket { ticket_id: TicketId, reason: String },

    /// Round pool cannot cover the payout it would be liable for.
    #[error("Insufficient liquidity in round {round}: required {required}, available {available}")]
    InsufficientLiquidity {
        round: RoundIndex,
        required: String,
        available: String,
    },

    /// Ledger account balance too low for a transfer.
    #[error("Insufficient funds in {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: String,
        required: String,
        available: String,
    },

    /// A conversion would silently drop precision.
    #[error("Precision loss converting {value} at {decimals} decimals")]
    PrecisionLoss { value: String, decimals: u32 },

    /// Fixed-point arithmetic overflowed.
    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(String),

    /// Collateral precision outside the supported range.
    #[error("Unsupported collateral decimals: {0}")]
    UnsupportedDecimals(u32),

    /// Amount is zero, negative or otherwise unusable.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Deposit below the configured minimum.
    #[error("Deposit {amount} below minimum {minimum}")]
    DepositBelowMinimum { amount: String, minimum: String },

    /// Deposit would push the user above the configured maximum.
    #[error("Deposit would exceed maximum {maximum} for {user}")]
    DepositLimitExceeded { user: UserId, maximum: String },

    /// Pool already holds the maximum number of depositors.
    #[error("Maximum number of depositors ({0}) reached")]
    MaxUsersReached(usize),

    /// User already has an outstanding withdrawal request.
    #[error("Withdrawal already requested by {0}")]
    WithdrawalAlreadyRequested(UserId),

    /// User has nothing in the current round to withdraw.
    #[error("Nothing to withdraw for {0}")]
    NothingToWithdraw(UserId),

    /// Partial withdrawal share outside `(0, 1)`.
    #[error("Invalid withdrawal share: {0}")]
    InvalidWithdrawalShare(String),

    /// The risk layer refused to reserve the payout.
    #[error("Trade rejected: {0}")]
    TradeRejected(String),

    /// Batch operations need a positive batch size.
    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl PoolError {
    /// Check if this error is retryable.
    ///
    /// Every error is a caller mistake or a detected corruption; retrying
    /// the same call without changing its input cannot succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            PoolError::NotEnoughDeposits { .. } => "NOT_ENOUGH_DEPOSITS",
            PoolError::PoolAlreadyStarted => "POOL_ALREADY_STARTED",
            PoolError::PoolNotStarted => "POOL_NOT_STARTED",
            PoolError::UnknownRound(_) => "UNKNOWN_ROUND",
            PoolError::RoundClosed(_) => "ROUND_CLOSED",
            PoolError::RoundNotStarted(_) => "ROUND_NOT_STARTED",
            PoolError::RoundClosingPrepared(_) => "ROUND_CLOSING_PREPARED",
            PoolError::RoundClosingAlreadyPrepared(_) => "ROUND_CLOSING_ALREADY_PREPARED",
            PoolError::RoundClosingNotPrepared(_) => "ROUND_CLOSING_NOT_PREPARED",
            PoolError::RoundNotEnded { .. } => "ROUND_NOT_ENDED",
            PoolError::RoundNotReadyToClose { .. } => "ROUND_NOT_READY_TO_CLOSE",
            PoolError::TicketAlreadyBound(_) => "TICKET_ALREADY_BOUND",
            PoolError::WrongRoundBinding { .. } => "WRONG_ROUND_BINDING",
            PoolError::TicketNotFound(_) => "TICKET_NOT_FOUND",
            PoolError::TicketNotReady(_) => "TICKET_NOT_READY",
            PoolError::InvalidTicket { .. } => "INVALID_TICKET",
            PoolError::InsufficientLiquidity { .. } => "INSUFFICIENT_LIQUIDITY",
            PoolError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            PoolError::PrecisionLoss { .. } => "PRECISION_LOSS",
            PoolError::ArithmeticOverflow(_) => "ARITHMETIC_OVERFLOW",
            PoolError::UnsupportedDecimals(_) => "UNSUPPORTED_DECIMALS",
            PoolError::InvalidAmount(_) => "INVALID_AMOUNT",
            PoolError::DepositBelowMinimum { .. } => "DEPOSIT_BELOW_MINIMUM",
            PoolError::DepositLimitExceeded { .. } => "DEPOSIT_LIMIT_EXCEEDED",
            PoolError::MaxUsersReached(_) => "MAX_USERS_REACHED",
            PoolError::WithdrawalAlreadyRequested(_) => "WITHDRAWAL_ALREADY_REQUESTED",
            PoolError::NothingToWithdraw(_) => "NOTHING_TO_WITHDRAW",
            PoolError::InvalidWithdrawalShare(_) => "INVALID_WITHDRAWAL_SHARE",
            PoolError::TradeRejected(_) => "TRADE_REJECTED",
            PoolError::InvalidBatchSize => "INVALID_BATCH_SIZE",
            PoolError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether the error signals corrupted or lossy arithmetic rather than
    /// a caller mistake.
    pub fn is_precision_error(&self) -> bool {
        matches!(
            self,
            PoolError::PrecisionLoss { .. } | PoolError::ArithmeticOverflow(_)
        )
    }
}

/// Result type alias for ParlayPool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
