//! Trim ordering for losing positions.
//!
//! The score blends absolute price distance with absolute loss:
//! `0.6 * |entry - price| + 0.4 * |net_profit|`. The two terms are in
//! different units (price vs. account currency), so on most FX symbols the
//! loss term dominates. Comparisons across instruments with different pip
//! values are not meaningful.

use crate::exchange::Position;
use crate::utils::decimal::percentage_of;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

const DISTANCE_WEIGHT: Decimal = dec!(0.6);
const LOSS_WEIGHT: Decimal = dec!(0.4);

/// Derived metrics for a losing position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionMetric {
    pub position_id: u64,
    /// `|entry_price - current_price|`
    pub distance: Decimal,
    /// Loss as a percentage of notional; zero for non-negative profit
    pub loss_percentage: Decimal,
    pub priority: Decimal,
}

/// Compute the trim metrics for one position against `current_price`.
pub fn score_position(position: &Position, current_price: Decimal) -> PositionMetric {
    let distance = (position.entry_price - current_price).abs();
    let loss = position.net_profit.abs();

    let loss_percentage = if position.net_profit >= Decimal::ZERO {
        Decimal::ZERO
    } else {
        percentage_of(loss, Decimal::from(position.volume) * position.entry_price)
    };

    PositionMetric {
        position_id: position.id,
        distance,
        loss_percentage,
        priority: DISTANCE_WEIGHT * distance + LOSS_WEIGHT * loss,
    }
}

/// Order losing positions by descending priority, ties by ascending id.
pub fn prioritize_losing_positions(
    positions: &[Position],
    current_price: Decimal,
) -> Vec<(Position, PositionMetric)> {
    let mut scored: Vec<(Position, PositionMetric)> = positions
        .iter()
        .map(|p| (p.clone(), score_position(p, current_price)))
        .collect();

    scored.sort_by(|(a, ma), (b, mb)| {
        mb.priority
            .cmp(&ma.priority)
            .then_with(|| a.id.cmp(&b.id))
    });

    scored
}
