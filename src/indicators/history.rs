use crate::models::Candle;
use serde::Serialize;

/// Number of features in a [`StateVector`]
pub const STATE_WIDTH: usize = 11;

/// Indicator columns aligned with one candle. `None` marks a value whose
/// lookback is not yet satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndicatorRow {
    pub sma: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub resistance: Option<f64>,
    pub support: Option<f64>,
}

impl IndicatorRow {
    pub fn is_complete(&self) -> bool {
        self.indicators().iter().all(Option::is_some)
    }

    fn indicators(&self) -> [Option<f64>; 7] {
        [
            self.sma,
            self.rsi,
            self.macd,
            self.stoch_k,
            self.stoch_d,
            self.resistance,
            self.support,
        ]
    }
}

/// Fixed-width feature vector: open, high, low, close followed by the
/// seven indicator columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateVector([f64; STATE_WIDTH]);

impl StateVector {
    /// Build from a candle row; `None` if any indicator is undefined
    pub fn from_row(candle: &Candle, row: &IndicatorRow) -> Option<Self> {
        let [sma, rsi, macd, k, d, resistance, support] = row.indicators();
        Some(Self([
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            sma?,
            rsi?,
            macd?,
            k?,
            d?,
            resistance?,
            support?,
        ]))
    }

    pub fn new(features: [f64; STATE_WIDTH]) -> Self {
        Self(features)
    }

    pub fn close(&self) -> f64 {
        self.0[3]
    }

    /// Index of the largest feature; ties go to the lowest index
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &value) in self.0.iter().enumerate().skip(1) {
            if value > self.0[best] {
                best = i;
            }
        }
        best
    }
}

/// Ordered candle series for one instrument with its indicator columns.
///
/// Timestamps are strictly increasing and every candle has exactly one
/// indicator row.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CandleHistory {
    instrument: String,
    candles: Vec<Candle>,
    rows: Vec<IndicatorRow>,
}

impl CandleHistory {
    pub fn new(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            candles: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.candles.iter().map(|c| c.close)
    }

    pub fn latest(&self) -> Option<(&Candle, &IndicatorRow)> {
        Some((self.candles.last()?, self.rows.last()?))
    }

    pub fn state_at(&self, index: usize) -> Option<StateVector> {
        StateVector::from_row(self.candles.get(index)?, self.rows.get(index)?)
    }

    /// State of the most recent row, if all of its indicators are defined
    pub fn latest_state(&self) -> Option<StateVector> {
        let (candle, row) = self.latest()?;
        StateVector::from_row(candle, row)
    }

    /// Whether `candle` would keep timestamps strictly increasing
    pub fn accepts(&self, candle: &Candle) -> bool {
        self.candles
            .last()
            .map_or(true, |last| candle.timestamp > last.timestamp)
    }

    pub(super) fn push(&mut self, candle: Candle, row: IndicatorRow) {
        debug_assert!(self.accepts(&candle));
        self.candles.push(candle);
        self.rows.push(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn complete_row() -> IndicatorRow {
        IndicatorRow {
            sma: Some(1.0),
            rsi: Some(55.0),
            macd: Some(0.001),
            stoch_k: Some(60.0),
            stoch_d: Some(40.0),
            resistance: Some(1.2),
            support: Some(0.9),
        }
    }

    fn candle(close: f64) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
        }
    }

    #[test]
    fn test_state_requires_every_indicator() {
        let mut row = complete_row();
        assert!(StateVector::from_row(&candle(1.0), &row).is_some());

        row.stoch_d = None;
        assert!(!row.is_complete());
        assert!(StateVector::from_row(&candle(1.0), &row).is_none());
    }

    #[test]
    fn test_state_layout_and_argmax() {
        let state = StateVector::from_row(&candle(1.1), &complete_row()).unwrap();
        assert_eq!(state.close(), 1.1);
        // %K (60) is the largest feature
        assert_eq!(state.argmax(), 7);
    }

    #[test]
    fn test_argmax_tie_prefers_first() {
        let state = StateVector::new([1.0; STATE_WIDTH]);
        assert_eq!(state.argmax(), 0);
    }

    #[test]
    fn test_accepts_only_later_timestamps() {
        let mut history = CandleHistory::new("EUR_USD");
        let first = candle(1.0);
        history.push(first, IndicatorRow::default());

        let mut earlier = candle(1.0);
        earlier.timestamp = first.timestamp - Duration::seconds(1);
        let mut same = candle(1.0);
        same.timestamp = first.timestamp;
        let mut later = candle(1.0);
        later.timestamp = first.timestamp + Duration::seconds(1);

        assert!(!history.accepts(&earlier));
        assert!(!history.accepts(&same));
        assert!(history.accepts(&later));
    }
}
