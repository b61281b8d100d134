use super::decision::DecisionPolicy;
use super::price_feed::TickStream;
use super::tick_aggregator::TickAggregator;
use crate::agent::{QLearningAgent, TrainingReport};
use crate::error::{Result, StreamError};
use crate::gateway::OrderGateway;
use crate::indicators::{CandleHistory, IndicatorEngine, IndicatorParams};
use crate::models::{Action, Candle, StreamMessage, Tick};
use crate::settings::{AgentConfig, InstrumentConfig};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};

/// Lifecycle of one instrument worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Connecting,
    Streaming,
    Aggregating,
    Deciding,
    Closing,
    Terminated,
}

/// Why a worker stopped
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    MaxDuration,
    Interrupted,
    ProtocolError(String),
    StreamEnded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MaxDuration => write!(f, "max duration reached"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            StopReason::StreamEnded => write!(f, "stream ended"),
        }
    }
}

/// What a worker hands back when it terminates
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub instrument: String,
    pub history: CandleHistory,
    pub stop_reason: StopReason,
    pub windows: usize,
    pub instructions_sent: usize,
}

enum Event {
    Shutdown,
    ShutdownClosed,
    Deadline,
    Message(std::result::Result<Option<StreamMessage>, StreamError>),
}

/// Drives a single instrument: ticks in, at most one instruction out per
/// aggregation window.
///
/// Owns its aggregator, indicator history and Q table outright. The stream's
/// `next_message` is raced against shutdown and the max-duration deadline, so
/// it must be safe to drop mid-await.
pub struct Worker<S, G> {
    config: InstrumentConfig,
    state: WorkerState,
    stream: S,
    gateway: G,
    aggregator: TickAggregator,
    engine: IndicatorEngine,
    agent: QLearningAgent,
    policy: DecisionPolicy,
    publisher: watch::Sender<Arc<CandleHistory>>,
    windows: usize,
    instructions_sent: usize,
}

impl<S: TickStream, G: OrderGateway> Worker<S, G> {
    pub fn new(config: InstrumentConfig, agent_config: AgentConfig, stream: S, gateway: G) -> Self {
        let engine = IndicatorEngine::new(
            &config.name,
            IndicatorParams::new(config.support_resistance_multiplier),
        );
        let (publisher, _) = watch::channel(Arc::new(engine.history().clone()));

        Self {
            aggregator: TickAggregator::new(config.aggregation_window()),
            agent: QLearningAgent::new(agent_config),
            policy: DecisionPolicy::new(config.clone()),
            state: WorkerState::Connecting,
            engine,
            config,
            stream,
            gateway,
            publisher,
            windows: 0,
            instructions_sent: 0,
        }
    }

    /// Seed the indicator history with past candles and warm the Q table on it
    pub fn warm_up(&mut self, candles: &[Candle]) -> Result<TrainingReport> {
        self.engine.update(candles)?;
        let report = self.agent.train(self.engine.history());
        self.publish();
        Ok(report)
    }

    /// Live view of the candle history, refreshed after every window
    pub fn subscribe(&self) -> watch::Receiver<Arc<CandleHistory>> {
        self.publisher.subscribe()
    }

    pub fn instrument(&self) -> &str {
        &self.config.name
    }

    pub fn history(&self) -> &CandleHistory {
        self.engine.history()
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            tracing::debug!(
                instrument = %self.config.name,
                from = ?self.state,
                to = ?next,
                "Worker state change"
            );
            self.state = next;
        }
    }

    fn publish(&self) {
        self.publisher
            .send_replace(Arc::new(self.engine.history().clone()));
    }

    /// Stream until max duration, interrupt, protocol failure or end of stream.
    ///
    /// Only the max-duration path closes open trades before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> WorkerOutcome {
        let deadline = Instant::now() + self.config.max_duration();
        self.transition(WorkerState::Connecting);

        if let Err(e) = self.stream.connect().await {
            tracing::error!(
                instrument = %self.config.name,
                error = %e,
                "Failed to connect to pricing stream"
            );
            return self.finish(StopReason::ProtocolError(e.to_string()));
        }

        self.aggregator = TickAggregator::new(self.config.aggregation_window());
        self.transition(WorkerState::Streaming);
        tracing::info!(
            instrument = %self.config.name,
            window_secs = self.config.aggregation_window_secs,
            max_duration_secs = self.config.max_duration_secs,
            "Streaming started"
        );

        let mut shutdown_open = true;
        loop {
            if Instant::now() >= deadline {
                return self.close_out().await;
            }
            if *shutdown.borrow() {
                return self.finish(StopReason::Interrupted);
            }

            let event = tokio::select! {
                biased;
                changed = shutdown.changed(), if shutdown_open => match changed {
                    Ok(()) => Event::Shutdown,
                    Err(_) => Event::ShutdownClosed,
                },
                _ = sleep_until(deadline) => Event::Deadline,
                message = self.stream.next_message() => Event::Message(message),
            };

            match event {
                // the flag itself is checked at the top of the loop
                Event::Shutdown | Event::Deadline => continue,
                Event::ShutdownClosed => shutdown_open = false,
                Event::Message(Ok(Some(StreamMessage::Heartbeat { timestamp }))) => {
                    tracing::debug!(instrument = %self.config.name, %timestamp, "Heartbeat");
                }
                Event::Message(Ok(Some(StreamMessage::Tick(tick)))) => self.on_tick(tick).await,
                Event::Message(Ok(None)) => {
                    tracing::warn!(instrument = %self.config.name, "Pricing stream closed by peer");
                    return self.finish(StopReason::StreamEnded);
                }
                Event::Message(Err(StreamError::Transient(msg))) => {
                    tracing::warn!(
                        instrument = %self.config.name,
                        error = %msg,
                        "Skipping stream message"
                    );
                }
                Event::Message(Err(StreamError::Protocol(msg))) => {
                    tracing::error!(
                        instrument = %self.config.name,
                        error = %msg,
                        "Pricing stream failed"
                    );
                    return self.finish(StopReason::ProtocolError(msg));
                }
            }
        }
    }

    async fn on_tick(&mut self, tick: Tick) {
        if tick.instrument != self.config.name {
            tracing::warn!(
                instrument = %self.config.name,
                received = %tick.instrument,
                "Ignoring tick for another instrument"
            );
            return;
        }

        let mid = tick.mid();
        if let Err(e) = self.aggregator.accumulate(mid) {
            tracing::warn!(instrument = %self.config.name, error = %e, "Skipping tick");
            return;
        }
        tracing::debug!(
            instrument = %self.config.name,
            bid = tick.closeout_bid,
            ask = tick.closeout_ask,
            mid,
            buffered = self.aggregator.len(),
            "Tick"
        );

        if let Some(candle) = self.aggregator.poll(Instant::now(), tick.timestamp) {
            self.on_window(candle).await;
        }
        self.transition(WorkerState::Streaming);
    }

    /// Indicator, agent and policy pass for one completed window
    async fn on_window(&mut self, candle: Candle) {
        self.transition(WorkerState::Aggregating);
        self.windows += 1;

        tracing::info!(
            instrument = %self.config.name,
            timestamp = %candle.timestamp,
            open = candle.open,
            high = candle.high,
            low = candle.low,
            close = candle.close,
            "Candle closed"
        );

        if !self.engine.history().accepts(&candle) {
            tracing::warn!(
                instrument = %self.config.name,
                timestamp = %candle.timestamp,
                "Candle is not after the last one in history, skipping window"
            );
            return;
        }

        // the agent learns from the move into the new candle before it is appended
        let action = self.choose_action(&candle);

        if let Err(e) = self.engine.update(&[candle]) {
            tracing::error!(instrument = %self.config.name, error = %e, "Indicator update failed");
            return;
        }
        self.publish();

        if let Some(action) = action {
            self.decide(action, candle.close).await;
        }
    }

    fn choose_action(&mut self, candle: &Candle) -> Option<Action> {
        if self.engine.history().latest_state().is_none() {
            tracing::info!(
                instrument = %self.config.name,
                candles = self.engine.history().len(),
                "Indicators still warming up, no decision this window"
            );
            return None;
        }

        match self.agent.update(self.engine.history(), std::slice::from_ref(candle)) {
            Ok(action) => Some(action),
            Err(e) => {
                tracing::error!(
                    instrument = %self.config.name,
                    error = %e,
                    "Agent update rejected"
                );
                None
            }
        }
    }

    async fn decide(&mut self, action: Action, last_price: f64) {
        self.transition(WorkerState::Deciding);

        let Some((_, levels)) = self.engine.history().latest() else {
            return;
        };
        let levels = *levels;

        let positions = match self.gateway.open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                tracing::error!(
                    instrument = %self.config.name,
                    error = %e,
                    "Could not fetch open positions, skipping decision"
                );
                return;
            }
        };

        let decision = match self.policy.resolve(action, last_price, &levels, &positions) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(instrument = %self.config.name, error = %e, "Decision rejected");
                return;
            }
        };

        let Some(instruction) = decision.instruction else {
            tracing::info!(
                instrument = %self.config.name,
                ?action,
                reason = %decision.reason,
                "No trade this window"
            );
            return;
        };

        tracing::info!(
            instrument = %self.config.name,
            kind = ?instruction.kind,
            units = instruction.units,
            price = instruction.fill_price(),
            reason = %decision.reason,
            "Dispatching instruction"
        );

        match self.gateway.execute(&instruction).await {
            Ok(()) => self.instructions_sent += 1,
            Err(e) => {
                tracing::error!(
                    instrument = %self.config.name,
                    id = %instruction.id,
                    error = %e,
                    "Order placement failed"
                );
            }
        }
    }

    /// Max-duration exit: one best-effort close of every open trade
    async fn close_out(mut self) -> WorkerOutcome {
        self.transition(WorkerState::Closing);
        tracing::info!(instrument = %self.config.name, "Max duration reached, closing all trades");

        match self.gateway.close_all_trades(&self.config.name).await {
            Ok(closed) => {
                tracing::info!(instrument = %self.config.name, closed, "Closed open trades");
            }
            Err(e) => {
                tracing::error!(
                    instrument = %self.config.name,
                    error = %e,
                    "Failed to close trades, shutting down anyway"
                );
            }
        }
        self.finish(StopReason::MaxDuration)
    }

    fn finish(mut self, stop_reason: StopReason) -> WorkerOutcome {
        self.transition(WorkerState::Terminated);
        tracing::info!(
            instrument = %self.config.name,
            reason = %stop_reason,
            windows = self.windows,
            instructions = self.instructions_sent,
            candles = self.engine.history().len(),
            "Worker stopped"
        );

        WorkerOutcome {
            instrument: self.config.name.clone(),
            history: self.engine.history().clone(),
            stop_reason,
            windows: self.windows,
            instructions_sent: self.instructions_sent,
        }
    }
}

/// Run every worker on its own task until all of them stop.
///
/// Outcomes come back sorted by instrument.
pub async fn run_workers<S, G>(
    workers: Vec<Worker<S, G>>,
    shutdown: watch::Receiver<bool>,
) -> Vec<WorkerOutcome>
where
    S: TickStream + 'static,
    G: OrderGateway + 'static,
{
    let mut tasks = JoinSet::new();
    for worker in workers {
        tasks.spawn(worker.run(shutdown.clone()));
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
        }
    }
    outcomes.sort_by(|a, b| a.instrument.cmp(&b.instrument));
    outcomes
}
