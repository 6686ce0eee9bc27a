//! Paper trading broker for dry runs and tests.

use super::traits::Broker;
use super::types::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Price increment of one pip.
const PIP_SIZE: Decimal = dec!(0.0001);

/// Simulated book state.
#[derive(Debug, Default)]
struct PaperBookState {
    positions: Vec<Position>,
    prices: HashMap<String, Decimal>,
    realized_profit: Decimal,
    close_count: u64,
}

/// In-memory broker that marks positions to a settable price.
pub struct PaperBroker {
    state: RwLock<PaperBookState>,
    position_id_counter: AtomicU64,
    /// Remaining close calls to reject
    scripted_failures: AtomicU32,
    /// Simulated round trip per close call
    latency: Option<Duration>,
    events: broadcast::Sender<PositionEvent>,
}

impl PaperBroker {
    /// Create an empty paper book.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(PaperBookState::default()),
            position_id_counter: AtomicU64::new(1),
            scripted_failures: AtomicU32::new(0),
            latency: None,
            events,
        }
    }

    /// Delay every close call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Subscribe to open/close notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PositionEvent> {
        self.events.subscribe()
    }

    /// Reject the next `count` close calls with a requote.
    pub fn fail_next_closes(&self, count: u32) {
        self.scripted_failures.store(count, Ordering::SeqCst);
    }

    /// Set the bid price for `symbol` and re-mark its open positions.
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        let mut state = self.state.write().await;
        state.prices.insert(symbol.to_string(), price);
        for position in state.positions.iter_mut().filter(|p| p.symbol == symbol) {
            mark_to_price(position, price);
        }
        debug!(%symbol, %price, "Paper price updated");
    }

    /// Open a position at `entry_price`, marked against the current price if known.
    pub async fn open_position(
        &self,
        symbol: &str,
        direction: Direction,
        volume: u64,
        entry_price: Decimal,
    ) -> Position {
        let mut position = Position {
            id: self.position_id_counter.fetch_add(1, Ordering::SeqCst),
            symbol: symbol.to_string(),
            direction,
            volume,
            entry_price,
            net_profit: Decimal::ZERO,
            pips: Decimal::ZERO,
        };

        let mut state = self.state.write().await;
        if let Some(&price) = state.prices.get(symbol) {
            mark_to_price(&mut position, price);
        }
        state.positions.push(position.clone());
        drop(state);

        info!(
            id = position.id,
            %symbol,
            direction = %direction,
            volume,
            entry = %entry_price,
            "Paper position opened"
        );
        let _ = self.events.send(PositionEvent::Opened(position.clone()));
        position
    }

    /// Insert a position snapshot as-is, bypassing price marking.
    pub async fn insert_position(&self, position: Position) {
        self.position_id_counter
            .fetch_max(position.id + 1, Ordering::SeqCst);
        self.state.write().await.positions.push(position);
    }

    /// Open the demo hedged book around `price`.
    ///
    /// The long side starts 40 ahead against 70 of short losses, below the
    /// default trim threshold; a rise of ~10 pips triggers a trim.
    pub async fn seed_demo_book(&self, symbol: &str, price: Decimal) {
        self.set_price(symbol, price).await;
        self.open_position(symbol, Direction::Long, 100_000, price - dec!(0.0004))
            .await;
        self.open_position(symbol, Direction::Short, 60_000, price - dec!(0.0010))
            .await;
        self.open_position(symbol, Direction::Short, 50_000, price - dec!(0.0002))
            .await;
    }

    /// Look up an open position.
    pub async fn position(&self, position_id: u64) -> Option<Position> {
        self.state
            .read()
            .await
            .positions
            .iter()
            .find(|p| p.id == position_id)
            .cloned()
    }

    /// Total profit realized by closes so far.
    pub async fn realized_profit(&self) -> Decimal {
        self.state.read().await.realized_profit
    }

    /// Number of successful close calls.
    pub async fn close_count(&self) -> u64 {
        self.state.read().await.close_count
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Recompute net profit and pips from the current price.
fn mark_to_price(position: &mut Position, price: Decimal) {
    let move_in_favour = match position.direction {
        Direction::Long => price - position.entry_price,
        Direction::Short => position.entry_price - price,
    };
    position.net_profit = move_in_favour * Decimal::from(position.volume);
    position.pips = move_in_favour / PIP_SIZE;
}

#[async_trait]
impl Broker for PaperBroker {
    async fn get_positions(&self, symbol: &str) -> Result<Vec<Position>> {
        Ok(self
            .state
            .read()
            .await
            .positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal> {
        self.state
            .read()
            .await
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow!("No price available for {}", symbol))
    }

    async fn close_position(&self, position_id: u64, volume: Option<u64>) -> Result<CloseResponse> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let rejected = self
            .scripted_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Ok(CloseResponse::rejected("Requote"));
        }

        let mut state = self.state.write().await;
        let Some(index) = state.positions.iter().position(|p| p.id == position_id) else {
            return Ok(CloseResponse::rejected(format!(
                "Position {} not found",
                position_id
            )));
        };

        if volume == Some(0) {
            return Ok(CloseResponse::rejected("Invalid volume 0"));
        }

        let current = state.positions[index].volume;
        let event = match volume {
            Some(partial) if partial < current => {
                let position = &mut state.positions[index];
                let realized =
                    position.net_profit * Decimal::from(partial) / Decimal::from(current);
                position.net_profit -= realized;
                position.volume = current - partial;
                let event = PositionEvent::Reduced {
                    id: position.id,
                    symbol: position.symbol.clone(),
                    closed_volume: partial,
                    remaining_volume: position.volume,
                    realized_profit: realized,
                };
                state.realized_profit += realized;
                event
            }
            _ => {
                let position = state.positions.remove(index);
                state.realized_profit += position.net_profit;
                PositionEvent::Closed {
                    id: position.id,
                    symbol: position.symbol,
                    volume: position.volume,
                    realized_profit: position.net_profit,
                }
            }
        };
        state.close_count += 1;
        drop(state);

        debug!(position_id, ?volume, "Paper close filled");
        let _ = self.events.send(event);
        Ok(CloseResponse::ok())
    }
}
