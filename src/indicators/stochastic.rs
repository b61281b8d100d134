use super::moving_average::sma_series;

/// %K for a close against the window's high/low range.
///
/// A flat range yields 0 rather than a division by zero.
pub fn percent_k(close: f64, lowest_low: f64, highest_high: f64) -> f64 {
    let range = highest_high - lowest_low;
    if range == 0.0 {
        return 0.0;
    }
    100.0 * (close - lowest_low) / range
}

/// Stochastic oscillator: (%K over `window`, %D = SMA of %K over `d_window`)
pub fn stochastic_series(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    window: usize,
    d_window: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let k: Vec<Option<f64>> = (0..closes.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let range = i + 1 - window..=i;
            let lowest = lows[range.clone()].iter().fold(f64::INFINITY, |a, &b| a.min(b));
            let highest = highs[range].iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            Some(percent_k(closes[i], lowest, highest))
        })
        .collect();

    // %D averages only the defined tail of %K
    let offset = window.saturating_sub(1).min(k.len());
    let defined: Vec<f64> = k[offset..].iter().flatten().copied().collect();
    let mut d = vec![None; offset];
    d.extend(sma_series(&defined, d_window));

    (k, d)
}
