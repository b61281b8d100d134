use crate::error::{Error, Result};
use crate::models::Candle;
use chrono::{DateTime, Utc};
use tokio::time::{Duration, Instant};

/// Buffers mid prices for one aggregation window and emits an OHLC candle
/// once the window has elapsed.
///
/// The boundary is measured from the last flush, not aligned to the clock:
/// a late flush pushes every following boundary back by the same amount.
#[derive(Debug)]
pub struct TickAggregator {
    buffer: Vec<f64>,
    window: Duration,
    last_flush: Instant,
}

impl TickAggregator {
    /// Create an aggregator whose first window starts now
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, start: Instant) -> Self {
        Self {
            buffer: Vec::new(),
            window,
            last_flush: start,
        }
    }

    /// Append a mid price to the current window
    pub fn accumulate(&mut self, mid_price: f64) -> Result<()> {
        if !mid_price.is_finite() || mid_price <= 0.0 {
            return Err(Error::Validation(format!(
                "mid price must be a positive finite number, got {}",
                mid_price
            )));
        }
        self.buffer.push(mid_price);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether `now` is at or past the window boundary
    pub fn is_boundary(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) >= self.window
    }

    /// Build a candle from the buffer and clear it.
    ///
    /// Returns `None` when nothing was buffered.
    pub fn flush(&mut self, timestamp: DateTime<Utc>) -> Option<Candle> {
        let open = *self.buffer.first()?;
        let close = *self.buffer.last()?;
        let (high, low) = self
            .buffer
            .iter()
            .fold((f64::MIN, f64::MAX), |(hi, lo), &p| (hi.max(p), lo.min(p)));

        self.buffer.clear();

        Some(Candle {
            timestamp,
            open,
            high,
            low,
            close,
        })
    }

    /// Flush if the window has elapsed at `now`.
    ///
    /// The boundary resets on every elapsed window, even when the buffer was
    /// empty and no candle comes out.
    pub fn poll(&mut self, now: Instant, timestamp: DateTime<Utc>) -> Option<Candle> {
        if !self.is_boundary(now) {
            return None;
        }
        self.last_flush = now;
        self.flush(timestamp)
    }
}
