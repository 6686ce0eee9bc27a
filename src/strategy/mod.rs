//! Trim strategy implementation.
//!
//! Contains the core logic for:
//! - Hedging detection over a position snapshot
//! - Trim threshold evaluation per winning direction
//! - Losing-position prioritization and partial-close sizing
//! - Close execution with bounded retries

mod executor;
mod hedging;
mod priority;
mod trim;
mod volume;

pub use executor::CloseExecutor;
pub use hedging::{analyze_hedging, HedgingInfo};
pub use priority::{prioritize_losing_positions, score_position, PositionMetric};
pub use trim::{
    evaluate_all, evaluate_scenario, plan_trim, should_trim, PlannedTrim, TrimEvaluation, TrimPlan,
};
pub use volume::{trim_volume, TrimVolume};
