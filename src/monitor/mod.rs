//! Periodic hedge monitoring.
//!
//! [`HedgeMonitor::run_cycle`] is the single entry point the host calls on
//! every tick. Cycles are single-flight: an invocation that overlaps a
//! running cycle is skipped instead of queued. [`HedgeMonitor::shutdown`]
//! cancels any pending retry backoff so the running cycle unwinds and
//! releases the guard.

mod observer;
mod status;

pub use observer::spawn_event_logger;
pub use status::{CycleStats, StatsSnapshot, StatusLogGate};

use crate::config::Config;
use crate::error::{Result, TrimError};
use crate::exchange::{Broker, CloseOutcome, CloseRequest, Direction, Position};
use crate::strategy::{analyze_hedging, evaluate_all, plan_trim, CloseExecutor, HedgingInfo, TrimPlan};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one `run_cycle` invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CycleOutcome {
    /// Another cycle was still running
    Skipped,
    /// Shutdown has been requested
    ShuttingDown,
    /// Long and short exposure do not coexist
    NotHedged { position_count: usize },
    /// Both scenarios were evaluated; `trims` lists the ones acted on
    Evaluated(CycleReport),
}

/// Summary of an evaluated cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub current_price: Decimal,
    pub net_exposure: i128,
    pub total_profit: Decimal,
    pub trims: Vec<TrimReport>,
}

/// Closes performed for one triggered scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrimReport {
    pub winning_direction: Direction,
    pub total_winning_profit: Decimal,
    pub required_profit: Decimal,
    /// In execution order
    pub closes: Vec<ExecutedClose>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedClose {
    pub request: CloseRequest,
    pub outcome: CloseOutcome,
}

/// Drives trim evaluation and execution for one symbol.
pub struct HedgeMonitor {
    symbol: String,
    trim_fraction: Decimal,
    check_interval: Duration,
    detailed_logging: bool,
    broker: Arc<dyn Broker>,
    executor: CloseExecutor,
    shutdown: CancellationToken,
    cycle_guard: tokio::sync::Mutex<()>,
    status_gate: Mutex<StatusLogGate>,
    stats: CycleStats,
}

impl HedgeMonitor {
    /// Create a monitor. Fails if the configuration is invalid.
    pub fn new(config: &Config, broker: Arc<dyn Broker>) -> Result<Self> {
        config.validate()?;

        let shutdown = CancellationToken::new();
        Ok(Self {
            symbol: config.monitor.symbol.clone(),
            trim_fraction: config.trim.trim_fraction,
            check_interval: Duration::from_secs(config.monitor.check_interval_secs),
            detailed_logging: config.logging.detailed,
            broker,
            executor: CloseExecutor::from_config(&config.trim, shutdown.clone()),
            shutdown,
            cycle_guard: tokio::sync::Mutex::new(()),
            status_gate: Mutex::new(StatusLogGate::new(config.monitor.status_log_interval_secs)),
            stats: CycleStats::default(),
        })
    }

    /// Token cancelled by [`shutdown`](Self::shutdown); share it with helper tasks.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Request shutdown: abort retry waits and stop scheduling cycles.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(symbol = %self.symbol, "🛑 Hedge monitor shutting down");
        }
        self.shutdown.cancel();
    }

    /// Wait until no cycle holds the guard.
    pub async fn wait_idle(&self) {
        let _guard = self.cycle_guard.lock().await;
    }

    /// Run the periodic loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            symbol = %self.symbol,
            interval_secs = self.check_interval.as_secs(),
            trim_fraction = %self.trim_fraction,
            max_retries = self.executor.max_retries(),
            "🚀 Hedge monitor started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    // Cycle errors are logged inside run_cycle and never stop the loop
                    if let Err(e) = self.run_cycle().await {
                        if e.is_fatal() {
                            return Err(e);
                        }
                    }
                }
            }
        }

        info!(stats = ?self.stats.snapshot(), "Hedge monitor stopped");
        Ok(())
    }

    /// Run one monitoring cycle unless one is already in flight.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        if self.shutdown.is_cancelled() {
            return Ok(CycleOutcome::ShuttingDown);
        }

        let Ok(_guard) = self.cycle_guard.try_lock() else {
            self.stats.record_skipped();
            debug!(symbol = %self.symbol, "Previous cycle still running, skipping tick");
            return Ok(CycleOutcome::Skipped);
        };

        let result = self.execute_cycle().await;
        if let Err(e) = &result {
            self.stats.record_error();
            error!(symbol = %self.symbol, error = %e, "❌ [CYCLE] Aborted");
        }
        result
    }

    async fn execute_cycle(&self) -> Result<CycleOutcome> {
        let positions = self.broker.get_positions(&self.symbol).await?;
        validate_snapshot(&self.symbol, &positions)?;

        let info = analyze_hedging(&positions);
        self.stats.record_cycle();
        self.log_status(&info);

        if !info.is_hedged {
            return Ok(CycleOutcome::NotHedged {
                position_count: info.position_count(),
            });
        }

        let current_price = self.broker.get_current_price(&self.symbol).await?;
        if current_price <= Decimal::ZERO {
            return Err(TrimError::MalformedSnapshot(format!(
                "non-positive price {} for {}",
                current_price, self.symbol
            )));
        }

        let mut trims = Vec::new();
        for evaluation in evaluate_all(&info, self.trim_fraction) {
            if !evaluation.triggered {
                continue;
            }
            if self.shutdown.is_cancelled() {
                break;
            }

            info!(
                winning = %evaluation.winning_direction,
                winning_profit = %evaluation.total_winning_profit,
                losing_loss = %evaluation.total_losing_loss,
                required_profit = %evaluation.required_profit,
                "✂️  [TRIM] Winning profit covers required share of loss"
            );
            self.stats.record_trim();

            let plan = plan_trim(&evaluation, current_price, self.trim_fraction);
            if self.detailed_logging {
                log_plan(&plan);
            }

            let closes = self.execute_plan(&plan).await;
            trims.push(TrimReport {
                winning_direction: evaluation.winning_direction,
                total_winning_profit: evaluation.total_winning_profit,
                required_profit: evaluation.required_profit,
                closes,
            });
        }

        Ok(CycleOutcome::Evaluated(CycleReport {
            current_price,
            net_exposure: info.net_exposure,
            total_profit: info.total_profit,
            trims,
        }))
    }

    /// Execute plan requests strictly in order, one at a time.
    async fn execute_plan(&self, plan: &TrimPlan) -> Vec<ExecutedClose> {
        let mut closes = Vec::new();

        for request in plan.requests() {
            if self.shutdown.is_cancelled() {
                warn!(
                    position_id = request.position_id,
                    "Shutdown requested, remaining closes not attempted"
                );
                break;
            }

            let outcome = self.executor.execute(self.broker.as_ref(), &request).await;
            self.stats.record_close(outcome.state);
            closes.push(ExecutedClose { request, outcome });
        }

        closes
    }

    fn log_status(&self, info: &HedgingInfo) {
        let due = match self.status_gate.lock() {
            Ok(mut gate) => gate.should_log(Utc::now()),
            Err(_) => false,
        };
        if !due {
            return;
        }

        let stats = self.stats.snapshot();
        info!(
            symbol = %self.symbol,
            longs = info.long_positions.len(),
            shorts = info.short_positions.len(),
            long_volume = info.total_long_volume,
            short_volume = info.total_short_volume,
            net_exposure = %info.net_exposure,
            total_profit = %info.total_profit,
            hedged = info.is_hedged,
            cycles = stats.cycles_run,
            trims = stats.trims_triggered,
            closes_ok = stats.closes_succeeded,
            closes_failed = stats.closes_exhausted,
            "📊 [STATUS] Hedge snapshot"
        );
    }
}

/// Reject snapshots the trim logic cannot reason about.
fn validate_snapshot(symbol: &str, positions: &[Position]) -> Result<()> {
    let mut seen = HashSet::with_capacity(positions.len());

    for position in positions {
        if position.symbol != symbol {
            return Err(TrimError::MalformedSnapshot(format!(
                "position {} has symbol {}, expected {}",
                position.id, position.symbol, symbol
            )));
        }
        if position.volume == 0 {
            return Err(TrimError::MalformedSnapshot(format!(
                "position {} has zero volume",
                position.id
            )));
        }
        if position.entry_price <= Decimal::ZERO {
            return Err(TrimError::MalformedSnapshot(format!(
                "position {} has non-positive entry price {}",
                position.id, position.entry_price
            )));
        }
        if !seen.insert(position.id) {
            return Err(TrimError::MalformedSnapshot(format!(
                "duplicate position id {}",
                position.id
            )));
        }
    }

    Ok(())
}

fn log_plan(plan: &TrimPlan) {
    for request in &plan.winner_closes {
        info!(position_id = request.position_id, "   Close winner: {}", request.description);
    }
    for (rank, trim) in plan.loser_trims.iter().enumerate() {
        info!(
            rank = rank + 1,
            position_id = trim.position.id,
            distance = %trim.metric.distance,
            loss_pct = %trim.metric.loss_percentage.round_dp(4),
            priority = %trim.metric.priority,
            volume = ?trim.volume,
            "   Trim loser"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{CloseState, MockBroker, PaperBroker};
    use anyhow::anyhow;
    use rust_decimal_macros::dec;

    const SYMBOL: &str = "EURUSD";

    fn position(id: u64, direction: Direction, volume: u64, entry: Decimal, profit: Decimal) -> Position {
        Position {
            id,
            symbol: SYMBOL.into(),
            direction,
            volume,
            entry_price: entry,
            net_profit: profit,
            pips: Decimal::ZERO,
        }
    }

    async fn paper_broker(positions: Vec<Position>) -> Arc<PaperBroker> {
        let broker = PaperBroker::new();
        broker.set_price(SYMBOL, dec!(1.1150)).await;
        for p in positions {
            broker.insert_position(p).await;
        }
        Arc::new(broker)
    }

    fn monitor(broker: Arc<PaperBroker>, max_retries: u32) -> HedgeMonitor {
        let mut config = Config::default();
        config.monitor.symbol = SYMBOL.into();
        config.trim.trim_fraction = dec!(0.75);
        config.trim.max_retries = max_retries;
        config.trim.retry_backoff_ms = 1000;
        HedgeMonitor::new(&config, broker).unwrap()
    }

    fn evaluated(outcome: CycleOutcome) -> CycleReport {
        match outcome {
            CycleOutcome::Evaluated(report) => report,
            other => panic!("expected evaluated cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = Config::default();
        config.trim.trim_fraction = dec!(0.05);
        let broker: Arc<dyn Broker> = Arc::new(PaperBroker::new());
        let err = HedgeMonitor::new(&config, broker).err().unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_single_pair_trim() {
        let broker = paper_broker(vec![
            position(1, Direction::Long, 100_000, dec!(1.1145), dec!(50)),
            position(2, Direction::Short, 100_000, dec!(1.1144), dec!(-60)),
        ])
        .await;
        let monitor = monitor(broker.clone(), 3);

        let report = evaluated(monitor.run_cycle().await.unwrap());

        assert_eq!(report.trims.len(), 1);
        let trim = &report.trims[0];
        assert_eq!(trim.winning_direction, Direction::Long);
        assert_eq!(trim.required_profit, dec!(45));
        assert!(trim.closes.iter().all(|c| c.outcome.success));

        assert!(broker.position(1).await.is_none());
        assert_eq!(broker.position(2).await.unwrap().volume, 25_000);
        assert_eq!(monitor.stats().closes_succeeded, 2);
    }

    #[tokio::test]
    async fn test_losers_trimmed_in_priority_order() {
        let broker = paper_broker(vec![
            position(1, Direction::Long, 100_000, dec!(1.1140), dec!(100)),
            position(2, Direction::Short, 50_000, dec!(1.1200), dec!(-40)),
            position(3, Direction::Short, 50_000, dec!(1.1250), dec!(-60)),
        ])
        .await;
        let monitor = monitor(broker.clone(), 3);

        let report = evaluated(monitor.run_cycle().await.unwrap());
        let order: Vec<u64> = report.trims[0]
            .closes
            .iter()
            .map(|c| c.request.position_id)
            .collect();

        assert_eq!(order, vec![1, 3, 2]);
        // 0.5 lots * 0.75 = 0.375 -> 0.38 lots
        assert_eq!(report.trims[0].closes[1].request.volume, Some(38_000));
        assert_eq!(broker.position(3).await.unwrap().volume, 12_000);
    }

    #[tokio::test]
    async fn test_threshold_not_met_leaves_book_untouched() {
        let broker = paper_broker(vec![
            position(1, Direction::Long, 100_000, dec!(1.1145), dec!(44)),
            position(2, Direction::Short, 100_000, dec!(1.1144), dec!(-60)),
        ])
        .await;
        let monitor = monitor(broker.clone(), 3);

        let report = evaluated(monitor.run_cycle().await.unwrap());

        assert!(report.trims.is_empty());
        assert_eq!(broker.close_count().await, 0);
    }

    #[tokio::test]
    async fn test_demo_book_trims_after_rally() {
        let broker = Arc::new(PaperBroker::new());
        broker.seed_demo_book(SYMBOL, dec!(1.1150)).await;
        let monitor = monitor(broker.clone(), 3);

        // Long +40 against 70 of short losses: 40 < 52.5
        let report = evaluated(monitor.run_cycle().await.unwrap());
        assert!(report.trims.is_empty());

        // Long +140 against 180: 140 >= 135
        broker.set_price(SYMBOL, dec!(1.1160)).await;
        let report = evaluated(monitor.run_cycle().await.unwrap());
        assert_eq!(report.trims.len(), 1);
        assert_eq!(report.trims[0].winning_direction, Direction::Long);
        assert_eq!(report.trims[0].total_winning_profit, dec!(140));
        assert_eq!(report.trims[0].closes.len(), 3);
    }

    #[tokio::test]
    async fn test_unhedged_book_never_trims() {
        let broker = paper_broker(vec![
            position(1, Direction::Long, 100_000, dec!(1.1000), dec!(500)),
            position(2, Direction::Long, 100_000, dec!(1.1200), dec!(-200)),
        ])
        .await;
        let monitor = monitor(broker.clone(), 3);

        let outcome = monitor.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::NotHedged { position_count: 2 });
        assert_eq!(broker.close_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_snapshot_aborts_cycle() {
        let broker = paper_broker(vec![
            position(1, Direction::Long, 0, dec!(1.1000), dec!(5)),
            position(2, Direction::Short, 10_000, dec!(1.1000), dec!(-5)),
        ])
        .await;
        let monitor = monitor(broker.clone(), 3);

        let err = monitor.run_cycle().await.unwrap_err();

        assert!(matches!(err, TrimError::MalformedSnapshot(_)));
        assert!(!err.is_fatal());
        assert_eq!(monitor.stats().cycle_errors, 1);
        assert_eq!(broker.close_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_winner_does_not_stop_loser_trims() {
        let broker = paper_broker(vec![
            position(1, Direction::Long, 100_000, dec!(1.1145), dec!(50)),
            position(2, Direction::Short, 100_000, dec!(1.1144), dec!(-60)),
        ])
        .await;
        broker.fail_next_closes(3);
        let monitor = monitor(broker.clone(), 3);

        let report = evaluated(monitor.run_cycle().await.unwrap());
        let closes = &report.trims[0].closes;

        assert_eq!(closes[0].outcome.state, CloseState::Exhausted);
        assert_eq!(closes[0].outcome.attempts, 3);
        assert_eq!(closes[1].outcome.state, CloseState::Success);
        // No rollback: winner still open, loser trimmed
        assert!(broker.position(1).await.is_some());
        assert_eq!(broker.position(2).await.unwrap().volume, 25_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycle_is_skipped() {
        let broker = PaperBroker::new().with_latency(Duration::from_secs(2));
        broker.set_price(SYMBOL, dec!(1.1150)).await;
        broker
            .insert_position(position(1, Direction::Long, 100_000, dec!(1.1145), dec!(50)))
            .await;
        broker
            .insert_position(position(2, Direction::Short, 100_000, dec!(1.1144), dec!(-60)))
            .await;
        let monitor = Arc::new(monitor(Arc::new(broker), 3));

        let running = monitor.clone();
        let handle = tokio::spawn(async move { running.run_cycle().await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(monitor.run_cycle().await.unwrap(), CycleOutcome::Skipped);
        assert_eq!(monitor.stats().cycles_skipped, 1);

        let first = evaluated(handle.await.unwrap().unwrap());
        assert_eq!(first.trims[0].closes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_retry_and_releases_guard() {
        let broker = paper_broker(vec![
            position(1, Direction::Long, 100_000, dec!(1.1145), dec!(50)),
            position(2, Direction::Short, 100_000, dec!(1.1144), dec!(-60)),
        ])
        .await;
        broker.fail_next_closes(10);
        let monitor = Arc::new(monitor(broker.clone(), 5));

        let running = monitor.clone();
        let handle = tokio::spawn(async move { running.run_cycle().await });
        tokio::time::sleep(Duration::from_millis(500)).await;

        monitor.shutdown();
        monitor.wait_idle().await;

        let report = evaluated(handle.await.unwrap().unwrap());
        let closes = &report.trims[0].closes;
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].outcome.state, CloseState::Cancelled);
        assert_eq!(closes[0].outcome.attempts, 1);

        assert_eq!(monitor.run_cycle().await.unwrap(), CycleOutcome::ShuttingDown);
        assert_eq!(broker.position(2).await.unwrap().volume, 100_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_stops_on_shutdown() {
        let broker = paper_broker(vec![]).await;
        let monitor = Arc::new(monitor(broker, 3));

        let running = monitor.clone();
        let handle = tokio::spawn(async move { running.run().await });
        tokio::time::sleep(Duration::from_secs(12)).await;
        monitor.shutdown();

        assert!(handle.await.unwrap().is_ok());
        // Ticks at 0s, 5s and 10s
        assert_eq!(monitor.stats().cycles_run, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_continues_after_failed_cycle() {
        let mut broker = MockBroker::new();
        let mut calls = 0;
        broker.expect_get_positions().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(anyhow!("broker timeout"))
            } else {
                Ok(vec![])
            }
        });
        broker.expect_get_current_price().never();
        broker.expect_close_position().never();

        let mut config = Config::default();
        config.monitor.symbol = SYMBOL.into();
        let monitor = Arc::new(HedgeMonitor::new(&config, Arc::new(broker)).unwrap());

        let running = monitor.clone();
        let handle = tokio::spawn(async move { running.run().await });
        tokio::time::sleep(Duration::from_secs(12)).await;
        monitor.shutdown();

        assert!(handle.await.unwrap().is_ok());
        let stats = monitor.stats();
        // Tick at 0s fails, ticks at 5s and 10s still run
        assert_eq!(stats.cycle_errors, 1);
        assert_eq!(stats.cycles_run, 2);
    }
}
