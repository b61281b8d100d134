use super::history::{CandleHistory, IndicatorRow};
use super::moving_average::{ewm_mean_series, rolling_std_series, sma_series};
use super::rolling::{EwmMean, RingBuf, RollingStats};
use super::rsi::{rsi_from_averages, rsi_series};
use super::stochastic::{percent_k, stochastic_series};
use crate::error::{Error, Result};
use crate::models::Candle;

/// Indicator windows and spans
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub sma_window: usize,
    pub rsi_span: usize,
    pub macd_fast_span: usize,
    pub macd_slow_span: usize,
    pub stoch_window: usize,
    pub stoch_d_window: usize,
    pub band_window: usize,
    pub band_multiplier: f64,
}

impl IndicatorParams {
    /// Standard windows (5 / 5 / 5-13 / 5-3 / 5) with the given band multiplier
    pub fn new(band_multiplier: f64) -> Self {
        Self {
            sma_window: 5,
            rsi_span: 5,
            macd_fast_span: 5,
            macd_slow_span: 13,
            stoch_window: 5,
            stoch_d_window: 3,
            band_window: 5,
            band_multiplier,
        }
    }
}

/// Maintains indicator columns over a growing candle history.
///
/// Each appended candle costs O(1) amortized: rolling windows live in ring
/// buffers and exponential means carry their state forward.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: IndicatorParams,
    history: CandleHistory,
    sma: RollingStats,
    bands: RollingStats,
    prev_close: Option<f64>,
    avg_gain: EwmMean,
    avg_loss: EwmMean,
    ema_fast: EwmMean,
    ema_slow: EwmMean,
    highs: RingBuf,
    lows: RingBuf,
    stoch_k: RingBuf,
}

impl IndicatorEngine {
    pub fn new(instrument: &str, params: IndicatorParams) -> Self {
        Self {
            history: CandleHistory::new(instrument),
            sma: RollingStats::new(params.sma_window),
            bands: RollingStats::new(params.band_window),
            prev_close: None,
            avg_gain: EwmMean::new(params.rsi_span),
            avg_loss: EwmMean::new(params.rsi_span),
            ema_fast: EwmMean::new(params.macd_fast_span),
            ema_slow: EwmMean::new(params.macd_slow_span),
            highs: RingBuf::new(params.stoch_window),
            lows: RingBuf::new(params.stoch_window),
            stoch_k: RingBuf::new(params.stoch_d_window),
            params,
        }
    }

    /// Engine pre-loaded with historical candles
    pub fn with_history(
        instrument: &str,
        params: IndicatorParams,
        candles: &[Candle],
    ) -> Result<Self> {
        let mut engine = Self::new(instrument, params);
        engine.update(candles)?;
        Ok(engine)
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    pub fn history(&self) -> &CandleHistory {
        &self.history
    }

    /// Append candles and extend every indicator column.
    ///
    /// The whole batch is validated before anything is appended; an empty
    /// batch leaves the history untouched. Returns the number of rows added.
    pub fn update(&mut self, candles: &[Candle]) -> Result<usize> {
        let mut last = self.history.candles().last().map(|c| c.timestamp);
        for candle in candles {
            validate_candle(candle)?;
            if last.is_some_and(|ts| candle.timestamp <= ts) {
                return Err(Error::Validation(format!(
                    "candle at {} is not after the previous candle",
                    candle.timestamp
                )));
            }
            last = Some(candle.timestamp);
        }

        for candle in candles {
            let row = self.advance(candle);
            self.history.push(*candle, row);
        }

        if let Some((candle, row)) = self.history.latest().filter(|_| !candles.is_empty()) {
            tracing::debug!(
                instrument = %self.history.instrument(),
                close = candle.close,
                sma = ?row.sma,
                rsi = ?row.rsi,
                macd = ?row.macd,
                resistance = ?row.resistance,
                support = ?row.support,
                "Indicators updated"
            );
        }

        Ok(candles.len())
    }

    fn advance(&mut self, candle: &Candle) -> IndicatorRow {
        let close = candle.close;

        self.sma.push(close);
        self.bands.push(close);

        let change = self.prev_close.map_or(0.0, |prev| close - prev);
        let avg_gain = self.avg_gain.update(change.max(0.0));
        let avg_loss = self.avg_loss.update((-change).max(0.0));
        let rsi = self
            .prev_close
            .map(|_| rsi_from_averages(avg_gain, avg_loss));
        self.prev_close = Some(close);

        let macd = self.ema_fast.update(close) - self.ema_slow.update(close);

        self.highs.push(candle.high);
        self.lows.push(candle.low);
        let stoch_k = self
            .highs
            .full()
            .then(|| percent_k(close, self.lows.min(), self.highs.max()));
        let stoch_d = stoch_k.and_then(|k| {
            self.stoch_k.push(k);
            self.stoch_k
                .full()
                .then(|| self.stoch_k.iter().sum::<f64>() / self.stoch_k.len() as f64)
        });

        let (resistance, support) = match (self.bands.mean(), self.bands.sample_std()) {
            (Some(mean), Some(std)) => {
                let offset = self.params.band_multiplier * std;
                (Some(mean + offset), Some(mean - offset))
            }
            _ => (None, None),
        };

        IndicatorRow {
            sma: self.sma.mean(),
            rsi,
            macd: Some(macd),
            stoch_k,
            stoch_d,
            resistance,
            support,
        }
    }
}

fn validate_candle(candle: &Candle) -> Result<()> {
    let prices = [candle.open, candle.high, candle.low, candle.close];
    if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err(Error::Validation(format!(
            "candle at {} has non-positive or non-finite prices",
            candle.timestamp
        )));
    }
    if candle.low > candle.high
        || candle.open > candle.high
        || candle.close > candle.high
        || candle.open < candle.low
        || candle.close < candle.low
    {
        return Err(Error::Validation(format!(
            "candle at {} has inconsistent OHLC values",
            candle.timestamp
        )));
    }
    Ok(())
}

/// Recompute every indicator column from scratch over the full series.
///
/// Reference formulation for [`IndicatorEngine`]; quadratic in the series
/// length because of the direct exponential-weight sums.
pub fn compute_rows(candles: &[Candle], params: &IndicatorParams) -> Vec<IndicatorRow> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

    let sma = sma_series(&closes, params.sma_window);
    let rsi = rsi_series(&closes, params.rsi_span);
    let fast = ewm_mean_series(&closes, params.macd_fast_span);
    let slow = ewm_mean_series(&closes, params.macd_slow_span);
    let (stoch_k, stoch_d) = stochastic_series(
        &highs,
        &lows,
        &closes,
        params.stoch_window,
        params.stoch_d_window,
    );
    let band_mean = sma_series(&closes, params.band_window);
    let band_std = rolling_std_series(&closes, params.band_window);

    (0..candles.len())
        .map(|i| {
            let bands = band_mean[i].zip(band_std[i]);
            IndicatorRow {
                sma: sma[i],
                rsi: rsi[i],
                macd: Some(fast[i] - slow[i]),
                stoch_k: stoch_k[i],
                stoch_d: stoch_d[i],
                resistance: bands.map(|(m, s)| m + params.band_multiplier * s),
                support: bands.map(|(m, s)| m - params.band_multiplier * s),
            }
        })
        .collect()
}
