/// Simple moving average over each trailing window.
///
/// `None` until `window` values are available.
pub fn sma_series(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            Some(slice.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Sample standard deviation (ddof = 1) over each trailing window
pub fn rolling_std_series(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i + 1 < window || window < 2 {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let mean = slice.iter().sum::<f64>() / window as f64;
            let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (window as f64 - 1.0);
            Some(var.sqrt())
        })
        .collect()
}

/// Exponentially weighted mean with adjusted weights, evaluated directly
/// from its definition at every point: Σ w^i x_{t-i} / Σ w^i.
///
/// Quadratic in the series length; used as the reference formulation.
pub fn ewm_mean_series(values: &[f64], span: usize) -> Vec<f64> {
    let decay = 1.0 - 2.0 / (span as f64 + 1.0);
    (0..values.len())
        .map(|t| {
            let mut weight = 1.0;
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for x in values[..=t].iter().rev() {
                numerator += weight * x;
                denominator += weight;
                weight *= decay;
            }
            numerator / denominator
        })
        .collect()
}
