use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, ValueEnum};
use forexbot::execution::{run_workers, HttpPricingStream, TickStream, Worker};
use forexbot::gateway::PaperGateway;
use forexbot::indicators::CandleHistory;
use forexbot::simulation::{MarketScenario, PriceWalk, SyntheticTickStream};
use forexbot::{InstrumentConfig, Settings};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Stream prices from the broker
    Live,
    /// Replay a seeded synthetic price path
    Replay,
}

#[derive(Parser)]
#[command(
    name = "forexbot",
    version,
    about = "Streams FX ticks into minute candles and trades them with a Q-learning agent"
)]
struct Cli {
    /// Settings file (TOML); defaults to config/default.toml when present
    #[arg(long)]
    config: Option<String>,

    #[arg(long, value_enum, default_value_t = Mode::Replay)]
    mode: Mode,

    /// Instrument to trade; repeat for several. Defaults to every configured instrument
    #[arg(long = "instrument")]
    instruments: Vec<String>,

    /// RNG seed for exploration and the replay feed
    #[arg(long)]
    seed: Option<u64>,

    /// Replay price path: uptrend, downtrend, sideways or volatile
    #[arg(long, default_value = "sideways")]
    scenario: MarketScenario,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if cli.seed.is_some() {
        settings.agent.seed = cli.seed;
    }

    let instruments = settings.select_instruments(&cli.instruments)?;
    anyhow::ensure!(!instruments.is_empty(), "no instruments configured");
    if cli.mode == Mode::Live {
        anyhow::ensure!(
            !settings.stream.account_id.is_empty(),
            "live mode needs an account id (FOREXBOT__STREAM__ACCOUNT_ID or OANDA_ACCOUNT_ID)"
        );
    }

    tracing::info!(mode = ?cli.mode, "🚀 forexbot starting");
    for instrument in &instruments {
        tracing::info!(
            instrument = %instrument.name,
            precision = instrument.precision,
            window_secs = instrument.aggregation_window_secs,
            max_duration_secs = instrument.max_duration_secs,
            multiplier = instrument.support_resistance_multiplier,
            "Configured instrument"
        );
    }

    let gateway = Arc::new(PaperGateway::new());
    let mut workers = Vec::with_capacity(instruments.len());
    let mut displays = Vec::with_capacity(instruments.len());

    for (index, instrument) in instruments.iter().enumerate() {
        let mut agent_config = settings.agent.clone();
        agent_config.seed = agent_config.seed.map(|s| s.wrapping_add(index as u64));

        let (stream, warmup): (Box<dyn TickStream>, _) = match cli.mode {
            Mode::Live => (
                Box::new(HttpPricingStream::new(&settings.stream, &instrument.name)),
                Vec::new(),
            ),
            Mode::Replay => {
                let seed = settings.agent.seed.unwrap_or(42).wrapping_add(index as u64);
                replay_feed(&settings, instrument, cli.scenario, seed)
            }
        };

        let mut worker = Worker::new(instrument.clone(), agent_config, stream, gateway.clone());
        if warmup.is_empty() {
            tracing::info!(
                instrument = %instrument.name,
                "No warm-up history, agent starts untrained"
            );
        } else {
            worker
                .warm_up(&warmup)
                .with_context(|| format!("warm-up failed for {}", instrument.name))?;
        }

        displays.push(spawn_display(worker.instrument(), worker.subscribe()));
        workers.push(worker);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("⚠️  Received Ctrl+C, stopping workers...");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!(workers = workers.len(), "Workers spawned, press Ctrl+C to stop");
    let outcomes = run_workers(workers, shutdown_rx).await;

    interrupt.abort();
    for display in displays {
        display.abort();
    }

    for outcome in &outcomes {
        tracing::info!(
            instrument = %outcome.instrument,
            reason = %outcome.stop_reason,
            candles = outcome.history.len(),
            windows = outcome.windows,
            instructions = outcome.instructions_sent,
            "Session summary"
        );
    }
    tracing::info!(
        realized_pnl = gateway.total_pnl(),
        orders = gateway.ledger().len(),
        "👋 forexbot stopped"
    );
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("forexbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Synthetic stream plus warm-up candles drawn from the same price path
fn replay_feed(
    settings: &Settings,
    instrument: &InstrumentConfig,
    scenario: MarketScenario,
    seed: u64,
) -> (Box<dyn TickStream>, Vec<forexbot::Candle>) {
    let base_price = if instrument.name.ends_with("JPY") { 150.0 } else { 1.1 };
    let mut walk = PriceWalk::new(seed, scenario, base_price);

    let tick_interval = Duration::from_millis(settings.stream.tick_interval_ms.max(1));
    let steps_per_candle = (instrument.aggregation_window().as_millis()
        / tick_interval.as_millis().max(1))
    .max(1) as usize;
    let candle_interval = ChronoDuration::seconds(instrument.aggregation_window_secs as i64);

    let warmup = walk.candles(
        settings.stream.warmup_candles,
        candle_interval,
        Utc::now(),
        steps_per_candle,
    );
    let stream = SyntheticTickStream::new(
        &instrument.name,
        walk,
        tick_interval,
        settings.stream.heartbeat_every,
    );
    (Box::new(stream), warmup)
}

/// Log the newest indicator row whenever a worker publishes its history
fn spawn_display(
    instrument: &str,
    mut updates: watch::Receiver<Arc<CandleHistory>>,
) -> JoinHandle<()> {
    let instrument = instrument.to_string();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let history = updates.borrow_and_update().clone();
            let Some((candle, row)) = history.latest() else {
                continue;
            };
            tracing::info!(
                instrument = %instrument,
                candles = history.len(),
                close = candle.close,
                sma = ?row.sma,
                rsi = ?row.rsi,
                macd = ?row.macd,
                stoch_k = ?row.stoch_k,
                stoch_d = ?row.stoch_d,
                resistance = ?row.resistance,
                support = ?row.support,
                "📊 Latest row"
            );
        }
    })
}
