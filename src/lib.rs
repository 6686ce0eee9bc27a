//! # Hedge Trimmer
//!
//! Realizes profit on hedged long/short position books: when the winning
//! side's profit covers a configured share of the losing side's loss, the
//! winners are closed and the losers are trimmed in priority order.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `error`: Error taxonomy (fatal configuration vs. per-cycle failures)
//! - `exchange`: Broker interface, shared position types and a paper broker
//! - `strategy`: Hedging analysis, trim decisions, prioritization, sizing and close execution
//! - `monitor`: Single-flight monitoring cycle, run loop and diagnostics
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod error;
pub mod exchange;
pub mod monitor;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::{Result, TrimError};
pub use monitor::{CycleOutcome, HedgeMonitor};
