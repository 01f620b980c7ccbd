//! ParlayPool Common Types
//!
//! This crate contains shared types used across the ParlayPool liquidity
//! engine, including identifiers, fixed-point units, tickets and the error
//! taxonomy.

pub mod identifiers;
pub mod units;
pub mod ticket;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use units::*;
pub use ticket::*;
pub use error::*;
pub use time::*;
