use super::moving_average::ewm_mean_series;

/// RSI value from smoothed gain and loss.
///
/// A zero loss pins RSI to 100 instead of dividing by zero.
pub fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Relative Strength Index over a close series, using exponentially
/// weighted gain/loss means with the given span.
///
/// The first row has no price change and is `None`. Its delta still enters
/// the weighted means as a zero gain and zero loss.
pub fn rsi_series(closes: &[f64], span: usize) -> Vec<Option<f64>> {
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());

    for i in 0..closes.len() {
        let change = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let avg_gains = ewm_mean_series(&gains, span);
    let avg_losses = ewm_mean_series(&losses, span);

    (0..closes.len())
        .map(|i| {
            if i == 0 {
                None
            } else {
                Some(rsi_from_averages(avg_gains[i], avg_losses[i]))
            }
        })
        .collect()
}
