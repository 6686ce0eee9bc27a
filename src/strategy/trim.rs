//! Trim decision: when winning profit covers enough of the opposing loss,
//! realize the winners and cut the losers.

use super::hedging::HedgingInfo;
use super::priority::{prioritize_losing_positions, PositionMetric};
use super::volume::{trim_volume, TrimVolume};
use crate::exchange::{CloseRequest, Direction, Position};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

/// Threshold evaluation for one winning direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrimEvaluation {
    pub winning_direction: Direction,
    /// Profitable positions in the winning direction
    pub winning: Vec<Position>,
    /// Non-profitable positions in the opposite direction
    pub losing: Vec<Position>,
    pub total_winning_profit: Decimal,
    /// Absolute value of the summed losing profit
    pub total_losing_loss: Decimal,
    pub required_profit: Decimal,
    pub triggered: bool,
}

/// A losing position scheduled for trimming.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedTrim {
    pub position: Position,
    pub metric: PositionMetric,
    pub volume: TrimVolume,
}

/// Ordered close requests for a triggered trim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrimPlan {
    pub winning_direction: Direction,
    /// Full closes, in snapshot order
    pub winner_closes: Vec<CloseRequest>,
    /// Losing trims, highest priority first
    pub loser_trims: Vec<PlannedTrim>,
}

impl TrimPlan {
    /// All requests in execution order: winners, then losers by priority.
    pub fn requests(&self) -> Vec<CloseRequest> {
        self.winner_closes
            .iter()
            .cloned()
            .chain(self.loser_trims.iter().map(PlannedTrim::request))
            .collect()
    }
}

impl PlannedTrim {
    pub fn request(&self) -> CloseRequest {
        let direction = self.position.direction;
        match self.volume {
            TrimVolume::Full(volume) => CloseRequest::full(
                self.position.id,
                format!("Full close of losing {} #{} ({} units)", direction, self.position.id, volume),
            ),
            TrimVolume::Partial(volume) => CloseRequest::partial(
                self.position.id,
                volume,
                format!(
                    "Trim losing {} #{}: {} of {} units",
                    direction, self.position.id, volume, self.position.volume
                ),
            ),
        }
    }
}

/// Whether winning profit covers `trim_fraction` of the losing loss.
///
/// Equality triggers.
pub fn should_trim(total_winning_profit: Decimal, total_losing_loss: Decimal, trim_fraction: Decimal) -> bool {
    total_winning_profit >= total_losing_loss * trim_fraction
}

/// Evaluate the scenario where `winning_direction` holds the profit.
///
/// Returns `None` when the snapshot is not hedged or either side of the
/// scenario is empty.
pub fn evaluate_scenario(
    info: &HedgingInfo,
    winning_direction: Direction,
    trim_fraction: Decimal,
) -> Option<TrimEvaluation> {
    if !info.is_hedged {
        return None;
    }

    let winning: Vec<Position> = info
        .positions(winning_direction)
        .iter()
        .filter(|p| p.is_profitable())
        .cloned()
        .collect();
    let losing: Vec<Position> = info
        .positions(winning_direction.opposite())
        .iter()
        .filter(|p| !p.is_profitable())
        .cloned()
        .collect();

    if winning.is_empty() || losing.is_empty() {
        return None;
    }

    let total_winning_profit: Decimal = winning.iter().map(|p| p.net_profit).sum();
    let total_losing_loss = losing.iter().map(|p| p.net_profit).sum::<Decimal>().abs();
    let required_profit = total_losing_loss * trim_fraction;
    let triggered = should_trim(total_winning_profit, total_losing_loss, trim_fraction);

    debug!(
        winning_direction = %winning_direction,
        winners = winning.len(),
        losers = losing.len(),
        total_winning_profit = %total_winning_profit,
        total_losing_loss = %total_losing_loss,
        required_profit = %required_profit,
        triggered,
        "Trim scenario evaluated"
    );

    Some(TrimEvaluation {
        winning_direction,
        winning,
        losing,
        total_winning_profit,
        total_losing_loss,
        required_profit,
        triggered,
    })
}

/// Evaluate both directions: long winning first, then short winning.
pub fn evaluate_all(info: &HedgingInfo, trim_fraction: Decimal) -> Vec<TrimEvaluation> {
    [Direction::Long, Direction::Short]
        .into_iter()
        .filter_map(|direction| evaluate_scenario(info, direction, trim_fraction))
        .collect()
}

/// Build the close plan for a triggered evaluation.
pub fn plan_trim(evaluation: &TrimEvaluation, current_price: Decimal, trim_fraction: Decimal) -> TrimPlan {
    let winner_closes = evaluation
        .winning
        .iter()
        .map(|p| {
            CloseRequest::full(
                p.id,
                format!(
                    "Realize winning {} #{} (profit {})",
                    p.direction, p.id, p.net_profit
                ),
            )
        })
        .collect();

    let loser_trims = prioritize_losing_positions(&evaluation.losing, current_price)
        .into_iter()
        .map(|(position, metric)| {
            let volume = trim_volume(&position, trim_fraction);
            PlannedTrim {
                position,
                metric,
                volume,
            }
        })
        .collect();

    TrimPlan {
        winning_direction: evaluation.winning_direction,
        winner_closes,
        loser_trims,
    }
}
