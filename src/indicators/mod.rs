// Technical indicators module
// Incremental engine plus the full-series reference formulas it is checked against

pub mod engine;
pub mod history;
pub mod moving_average;
pub mod rolling;
pub mod rsi;
pub mod stochastic;

pub use engine::{compute_rows, IndicatorEngine, IndicatorParams};
pub use history::{CandleHistory, IndicatorRow, StateVector, STATE_WIDTH};
pub use moving_average::{ewm_mean_series, rolling_std_series, sma_series};
pub use rsi::rsi_series;
pub use stochastic::stochastic_series;
