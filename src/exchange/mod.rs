//! Broker integration for the hedge trimmer.
//!
//! The trim engine talks to its host only through the [`Broker`] trait:
//! - Position snapshots for the monitored instrument
//! - Current reference price
//! - Full and partial closes
//!
//! [`PaperBroker`] is an in-memory implementation used for paper trading.

mod paper;
mod traits;
mod types;

pub use paper::PaperBroker;
pub use traits::Broker;
#[cfg(test)]
pub use traits::MockBroker;
pub use types::*;
