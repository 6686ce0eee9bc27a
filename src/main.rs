//! Hedge Trimmer - Main Entry Point
//!
//! Runs the trim monitor against the paper broker.

use anyhow::Result;
use clap::{Parser, Subcommand};
use hedge_trimmer::config::Config;
use hedge_trimmer::exchange::{Broker, PaperBroker};
use hedge_trimmer::monitor::{spawn_event_logger, CycleOutcome, HedgeMonitor};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Hedge Trimmer CLI
#[derive(Parser)]
#[command(name = "hedge-trimmer")]
#[command(version, about = "Profit-realizing trim engine for hedged position books")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor against the paper broker (default)
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Load and validate configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;

    if let Err(e) = config.validate() {
        error!("❌ Invalid configuration: {}", e);
        return Err(e.into());
    }

    match cli.command {
        Some(Commands::CheckConfig) => {
            log_config(&config);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Commands::Run { once }) => run(config, once).await,
        None => run(config, false).await,
    }
}

async fn run(config: Config, once: bool) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║        Hedge Trimmer v{} - Paper Trading              ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(&config);

    let symbol = config.monitor.symbol.clone();
    let paper = Arc::new(PaperBroker::new());
    paper.set_price(&symbol, config.paper.initial_price).await;

    let monitor = Arc::new(HedgeMonitor::new(&config, paper.clone() as Arc<dyn Broker>)?);
    let shutdown = monitor.shutdown_token();

    let event_logger = config
        .logging
        .log_position_events
        .then(|| spawn_event_logger(paper.subscribe(), shutdown.clone()));

    if config.paper.seed_demo_book {
        paper.seed_demo_book(&symbol, config.paper.initial_price).await;
        info!("📂 [PAPER] Demo hedged book opened on {}", symbol);
    }

    if once {
        let outcome = monitor.run_cycle().await?;
        log_outcome(&outcome);
        monitor.shutdown();
    } else {
        let signal_monitor = monitor.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("🛑 Shutdown signal received");
            signal_monitor.shutdown();
        });

        if config.paper.price_step != Decimal::ZERO {
            tokio::spawn(drift_price(
                paper.clone(),
                symbol.clone(),
                config.paper.initial_price,
                config.paper.price_step,
                Duration::from_secs(config.monitor.check_interval_secs),
                shutdown.clone(),
            ));
        }

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        monitor.run().await?;
        monitor.wait_idle().await;
    }

    if let Some(handle) = event_logger {
        handle.await.ok();
    }

    let stats = monitor.stats();
    info!("📈 Session summary:");
    info!("   Cycles: {} ({} skipped, {} errors)", stats.cycles_run, stats.cycles_skipped, stats.cycle_errors);
    info!("   Trims triggered: {}", stats.trims_triggered);
    info!(
        "   Closes: {} ok, {} exhausted, {} cancelled",
        stats.closes_succeeded, stats.closes_exhausted, stats.closes_cancelled
    );
    info!("   Realized P&L: {:.2}", paper.realized_profit().await);

    Ok(())
}

/// Walk the paper price up and down so the book alternates winners.
async fn drift_price(
    paper: Arc<PaperBroker>,
    symbol: String,
    start: Decimal,
    step: Decimal,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut price = start;
    let mut direction = Decimal::ONE;
    let mut steps: u32 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(every) => {
                steps += 1;
                if steps % 10 == 0 {
                    direction = -direction;
                }
                price = (price + step * direction).max(dec!(0.0001));
                paper.set_price(&symbol, price).await;
            }
        }
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Evaluated(report) => {
            info!(
                "🔎 [CYCLE] Price {} | Net exposure {} | P&L {:.2} | {} trim(s)",
                report.current_price,
                report.net_exposure,
                report.total_profit,
                report.trims.len()
            );
            for trim in &report.trims {
                for close in &trim.closes {
                    info!(
                        "   #{} {:?} after {} attempt(s): {}",
                        close.request.position_id,
                        close.outcome.state,
                        close.outcome.attempts,
                        close.request.description
                    );
                }
            }
        }
        other => info!("🔎 [CYCLE] {:?}", other),
    }
}

/// Initialize logging with file and console output.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "hedge-trimmer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hedge_trimmer=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Symbol: {}", config.monitor.symbol);
    info!("   Check Interval: {}s", config.monitor.check_interval_secs);
    info!(
        "   Trim Fraction: {:.0}%",
        config.trim.trim_fraction * dec!(100)
    );
    info!(
        "   Max Retries: {} (backoff {}ms x attempt)",
        config.trim.max_retries, config.trim.retry_backoff_ms
    );
    info!(
        "   Logging: detailed={} events={}",
        config.logging.detailed, config.logging.log_position_events
    );
}
