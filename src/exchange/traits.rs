//! Broker interface consumed by the trim engine.
//!
//! The broker is the source of truth for positions and prices and the only
//! place positions are mutated. Implementations may be a live platform
//! bridge or the in-memory [`PaperBroker`](super::PaperBroker).

use super::types::{CloseResponse, Position};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Host collaborator exposing positions, prices and close operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Current open positions for `symbol`.
    async fn get_positions(&self, symbol: &str) -> anyhow::Result<Vec<Position>>;

    /// Current reference (bid) price for `symbol`.
    async fn get_current_price(&self, symbol: &str) -> anyhow::Result<Decimal>;

    /// Close a position entirely (`volume = None`) or partially.
    ///
    /// `Ok` with `success = false` is an explicit rejection; `Err` is a
    /// transport fault. Both are retried by the executor.
    async fn close_position(
        &self,
        position_id: u64,
        volume: Option<u64>,
    ) -> anyhow::Result<CloseResponse>;
}
