//! Hedging detection over a single-symbol position snapshot.

use crate::exchange::{Direction, Position};
use rust_decimal::Decimal;
use serde::Serialize;

/// Long/short partition of a position snapshot.
///
/// Recomputed every cycle and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HedgingInfo {
    pub long_positions: Vec<Position>,
    pub short_positions: Vec<Position>,
    pub total_long_volume: u64,
    pub total_short_volume: u64,
    /// Long volume minus short volume
    pub net_exposure: i128,
    pub total_profit: Decimal,
    /// Both a long and a short position are open
    pub is_hedged: bool,
}

impl HedgingInfo {
    /// Positions held in `direction`.
    pub fn positions(&self, direction: Direction) -> &[Position] {
        match direction {
            Direction::Long => &self.long_positions,
            Direction::Short => &self.short_positions,
        }
    }

    pub fn position_count(&self) -> usize {
        self.long_positions.len() + self.short_positions.len()
    }
}

/// Partition `positions` by direction and aggregate volume and profit.
///
/// Input is expected to be already filtered to one symbol.
pub fn analyze_hedging(positions: &[Position]) -> HedgingInfo {
    let mut info = HedgingInfo::default();

    for position in positions {
        info.total_profit += position.net_profit;
        match position.direction {
            Direction::Long => {
                info.total_long_volume += position.volume;
                info.long_positions.push(position.clone());
            }
            Direction::Short => {
                info.total_short_volume += position.volume;
                info.short_positions.push(position.clone());
            }
        }
    }

    info.net_exposure = info.total_long_volume as i128 - info.total_short_volume as i128;
    info.is_hedged = !info.long_positions.is_empty() && !info.short_positions.is_empty();
    info
}
