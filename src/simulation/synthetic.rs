use crate::error::{Error, StreamError};
use crate::execution::TickStream;
use crate::models::{Candle, StreamMessage, Tick};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;
use tokio::time::{sleep, Duration};

/// Shape of the synthetic price path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Upward drift with light noise
    Uptrend,
    /// Downward drift with light noise
    Downtrend,
    /// Mean-reverting chop around the starting price
    Sideways,
    /// Large swings, floored at half the starting price
    Volatile,
}

impl FromStr for MarketScenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uptrend" => Ok(MarketScenario::Uptrend),
            "downtrend" => Ok(MarketScenario::Downtrend),
            "sideways" => Ok(MarketScenario::Sideways),
            "volatile" => Ok(MarketScenario::Volatile),
            other => Err(Error::Config(format!("unknown market scenario: {}", other))),
        }
    }
}

/// Seeded random walk shared by warm-up candles and replay ticks
pub struct PriceWalk {
    rng: StdRng,
    scenario: MarketScenario,
    anchor: f64,
    price: f64,
}

impl PriceWalk {
    pub fn new(seed: u64, scenario: MarketScenario, base_price: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            scenario,
            anchor: base_price,
            price: base_price,
        }
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    /// Advance one step and return the new price
    pub fn step(&mut self) -> f64 {
        let price = self.price;
        let change = match self.scenario {
            MarketScenario::Uptrend => price * (0.00002 + self.rng.gen_range(-0.0001..0.0001)),
            MarketScenario::Downtrend => price * (-0.00002 + self.rng.gen_range(-0.0001..0.0001)),
            MarketScenario::Sideways => {
                (self.anchor - price) * 0.1 + price * self.rng.gen_range(-0.0002..0.0002)
            }
            MarketScenario::Volatile => price * self.rng.gen_range(-0.001..0.001),
        };
        self.price = (price + change).max(self.anchor * 0.5);
        self.price
    }

    /// `count` candles spaced `interval` apart, the last one ending before `end`.
    /// Each candle spans `steps_per_candle` walk steps.
    pub fn candles(
        &mut self,
        count: usize,
        interval: ChronoDuration,
        end: DateTime<Utc>,
        steps_per_candle: usize,
    ) -> Vec<Candle> {
        let steps = steps_per_candle.max(1);
        let start = end - interval * count as i32;

        (0..count)
            .map(|i| {
                let open = self.price;
                let (mut high, mut low) = (open, open);
                for _ in 0..steps {
                    let p = self.step();
                    high = high.max(p);
                    low = low.min(p);
                }
                Candle {
                    timestamp: start + interval * i as i32,
                    open,
                    high,
                    low,
                    close: self.price,
                }
            })
            .collect()
    }
}

/// Replays a [`PriceWalk`] as a pricing stream, one tick per interval with a
/// heartbeat every `heartbeat_every` ticks
pub struct SyntheticTickStream {
    instrument: String,
    walk: PriceWalk,
    interval: Duration,
    heartbeat_every: u32,
    half_spread: f64,
    clock: DateTime<Utc>,
    ticks_since_heartbeat: u32,
    remaining: Option<u64>,
}

impl SyntheticTickStream {
    pub fn new(
        instrument: &str,
        walk: PriceWalk,
        interval: Duration,
        heartbeat_every: u32,
    ) -> Self {
        let half_spread = walk.price() * 0.00001;
        Self {
            instrument: instrument.to_string(),
            walk,
            interval,
            heartbeat_every,
            half_spread,
            clock: Utc::now(),
            ticks_since_heartbeat: 0,
            remaining: None,
        }
    }

    /// Close the stream after `messages` messages
    pub fn with_limit(mut self, messages: u64) -> Self {
        self.remaining = Some(messages);
        self
    }
}

#[async_trait]
impl TickStream for SyntheticTickStream {
    async fn connect(&mut self) -> Result<(), StreamError> {
        tracing::info!(
            instrument = %self.instrument,
            start_price = self.walk.price(),
            "Synthetic stream connected"
        );
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        if self.remaining == Some(0) {
            return Ok(None);
        }

        // nothing is consumed before the sleep finishes
        sleep(self.interval).await;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        self.clock +=
            ChronoDuration::from_std(self.interval).unwrap_or_else(|_| ChronoDuration::zero());

        if self.heartbeat_every > 0 && self.ticks_since_heartbeat >= self.heartbeat_every {
            self.ticks_since_heartbeat = 0;
            return Ok(Some(StreamMessage::Heartbeat {
                timestamp: self.clock,
            }));
        }

        self.ticks_since_heartbeat += 1;
        let mid = self.walk.step();
        Ok(Some(StreamMessage::Tick(Tick {
            instrument: self.instrument.clone(),
            timestamp: self.clock,
            closeout_bid: mid - self.half_spread,
            closeout_ask: mid + self.half_spread,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_is_reproducible() {
        let mut a = PriceWalk::new(42, MarketScenario::Volatile, 1.1);
        let mut b = PriceWalk::new(42, MarketScenario::Volatile, 1.1);
        for _ in 0..100 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn test_uptrend_ends_higher() {
        let mut walk = PriceWalk::new(42, MarketScenario::Uptrend, 1.1);
        for _ in 0..5000 {
            walk.step();
        }
        assert!(walk.price() > 1.1, "uptrend should end higher: {}", walk.price());
    }

    #[test]
    fn test_sideways_stays_near_anchor() {
        let mut walk = PriceWalk::new(7, MarketScenario::Sideways, 150.0);
        for _ in 0..2000 {
            let p = walk.step();
            assert!(p > 150.0 * 0.99 && p < 150.0 * 1.01, "drifted to {}", p);
        }
    }

    #[test]
    fn test_candles_are_ordered_and_consistent() {
        let mut walk = PriceWalk::new(1, MarketScenario::Volatile, 1.1);
        let end = Utc::now();
        let candles = walk.candles(50, ChronoDuration::minutes(1), end, 10);

        assert_eq!(candles.len(), 50);
        for pair in candles.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
            assert_eq!(pair[1].open, pair[0].close);
        }
        for c in &candles {
            assert!(c.high >= c.open && c.high >= c.close);
            assert!(c.low <= c.open && c.low <= c.close);
            assert!(c.timestamp < end);
        }
    }

    #[test]
    fn test_scenario_from_str() {
        assert_eq!("Sideways".parse::<MarketScenario>().unwrap(), MarketScenario::Sideways);
        assert!("sideways-ish".parse::<MarketScenario>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_interleaves_heartbeats_and_ends_at_limit() {
        let walk = PriceWalk::new(3, MarketScenario::Sideways, 1.1);
        let mut stream =
            SyntheticTickStream::new("EUR_USD", walk, Duration::from_millis(500), 2).with_limit(6);
        stream.connect().await.unwrap();

        let mut kinds = Vec::new();
        let mut last_ts = None;
        while let Some(message) = stream.next_message().await.unwrap() {
            match message {
                StreamMessage::Tick(tick) => {
                    assert!(tick.closeout_ask > tick.closeout_bid);
                    if let Some(prev) = last_ts {
                        assert!(tick.timestamp > prev);
                    }
                    last_ts = Some(tick.timestamp);
                    kinds.push('t');
                }
                StreamMessage::Heartbeat { .. } => kinds.push('h'),
            }
        }
        assert_eq!(kinds, vec!['t', 't', 'h', 't', 't', 'h']);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_read_keeps_the_message_budget() {
        let walk = PriceWalk::new(3, MarketScenario::Sideways, 1.1);
        let mut stream =
            SyntheticTickStream::new("EUR_USD", walk, Duration::from_millis(500), 0).with_limit(3);

        let first = tokio::select! {
            message = stream.next_message() => Some(message),
            _ = sleep(Duration::from_millis(100)) => None,
        };
        assert!(first.is_none());

        let mut delivered = 0;
        while let Some(message) = stream.next_message().await.unwrap() {
            assert!(matches!(message, StreamMessage::Tick(_)));
            delivered += 1;
        }
        assert_eq!(delivered, 3);
    }
}
