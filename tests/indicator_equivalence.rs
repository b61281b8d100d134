use approx::assert_abs_diff_eq;
use chrono::{Duration, TimeZone, Utc};
use forexbot::execution::TickAggregator;
use forexbot::indicators::{compute_rows, IndicatorEngine, IndicatorParams, IndicatorRow};
use forexbot::Candle;
use proptest::prelude::*;

fn build_candles(bars: &[(f64, f64, f64)]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    bars.iter()
        .enumerate()
        .map(|(i, &(close, up, down))| Candle {
            timestamp: start + Duration::minutes(i as i64),
            open: close,
            high: close + up,
            low: close - down,
            close,
        })
        .collect()
}

fn columns(row: &IndicatorRow) -> [Option<f64>; 7] {
    [
        row.sma,
        row.rsi,
        row.macd,
        row.stoch_k,
        row.stoch_d,
        row.resistance,
        row.support,
    ]
}

fn bars() -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
    prop::collection::vec((0.5f64..2.0, 0.0f64..0.01, 0.0f64..0.01), 1..120)
}

proptest! {
    #[test]
    fn incremental_matches_full_recompute(bars in bars(), multiplier in 0.0f64..2.0) {
        let candles = build_candles(&bars);
        let params = IndicatorParams::new(multiplier);

        let engine = IndicatorEngine::with_history("EUR_USD", params.clone(), &candles).unwrap();
        let expected = compute_rows(&candles, &params);
        prop_assert_eq!(engine.history().len(), expected.len());

        for (got, want) in engine.history().rows().iter().zip(&expected) {
            for (g, w) in columns(got).into_iter().zip(columns(want)) {
                prop_assert_eq!(g.is_some(), w.is_some());
                if let (Some(g), Some(w)) = (g, w) {
                    assert_abs_diff_eq!(g, w, epsilon = 1e-7);
                }
            }
        }
    }

    #[test]
    fn batch_boundaries_do_not_matter(bars in bars(), split in 0usize..120) {
        let candles = build_candles(&bars);
        let split = split.min(candles.len());
        let params = IndicatorParams::new(0.5);

        let whole = IndicatorEngine::with_history("EUR_USD", params.clone(), &candles).unwrap();
        let mut pieces = IndicatorEngine::new("EUR_USD", params);
        pieces.update(&candles[..split]).unwrap();
        pieces.update(&[]).unwrap();
        pieces.update(&candles[split..]).unwrap();

        prop_assert_eq!(whole.history().rows(), pieces.history().rows());
    }

    #[test]
    fn rising_closes_pin_rsi_at_100(
        start in 0.5f64..2.0,
        steps in prop::collection::vec(0.0001f64..0.01, 1..60),
    ) {
        let mut close = start;
        let mut bars = vec![(close, 0.0, 0.0)];
        for step in steps {
            close += step;
            bars.push((close, 0.0, 0.0));
        }
        let engine = IndicatorEngine::with_history(
            "EUR_USD",
            IndicatorParams::new(0.5),
            &build_candles(&bars),
        )
        .unwrap();

        for row in engine.history().rows().iter().skip(1) {
            prop_assert_eq!(row.rsi, Some(100.0));
        }
    }

    #[test]
    fn flush_summarizes_buffer(prices in prop::collection::vec(0.5f64..2.0, 1..200)) {
        let mut aggregator = TickAggregator::new(tokio::time::Duration::from_secs(60));
        for &p in &prices {
            aggregator.accumulate(p).unwrap();
        }
        let candle = aggregator.flush(Utc::now()).unwrap();

        prop_assert_eq!(candle.open, prices[0]);
        prop_assert_eq!(candle.close, prices[prices.len() - 1]);
        prop_assert_eq!(candle.high, prices.iter().cloned().fold(f64::MIN, f64::max));
        prop_assert_eq!(candle.low, prices.iter().cloned().fold(f64::MAX, f64::min));
        prop_assert!(aggregator.is_empty());
    }
}
