use crate::error::{Error, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

const ENV_PREFIX: &str = "FOREXBOT";

/// Top-level runtime settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

/// Pricing stream connection and replay parameters
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Spacing between synthetic ticks in replay mode
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Synthetic heartbeat cadence, in ticks
    #[serde(default = "default_heartbeat_every")]
    pub heartbeat_every: u32,
    /// Warm-up candles generated for replay training
    #[serde(default = "default_warmup_candles")]
    pub warmup_candles: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            account_id: String::new(),
            access_token: None,
            tick_interval_ms: default_tick_interval_ms(),
            heartbeat_every: default_heartbeat_every(),
            warmup_candles: default_warmup_candles(),
        }
    }
}

/// Q-learning hyperparameters
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_discount_factor")]
    pub discount_factor: f64,
    #[serde(default = "default_exploration_prob")]
    pub exploration_prob: f64,
    /// Fixed RNG seed for reproducible exploration
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            discount_factor: default_discount_factor(),
            exploration_prob: default_exploration_prob(),
            seed: None,
        }
    }
}

/// Per-instrument trading parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InstrumentConfig {
    pub name: String,
    /// Number of quoted decimals; tick size is 10^-precision
    pub precision: u32,
    pub stop_loss_pips: f64,
    pub take_profit_pips: f64,
    #[serde(default = "default_aggregation_window_secs")]
    pub aggregation_window_secs: u64,
    pub max_duration_secs: u64,
    pub support_resistance_multiplier: f64,
    #[serde(default = "default_order_units")]
    pub order_units: i64,
}

impl InstrumentConfig {
    pub fn aggregation_window(&self) -> Duration {
        Duration::from_secs(self.aggregation_window_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    /// Minimum price increment
    pub fn tick_size(&self) -> f64 {
        10f64.powi(-(self.precision as i32))
    }

    pub fn round_price(&self, price: f64) -> f64 {
        let scale = 10f64.powi(self.precision as i32);
        (price * scale).round() / scale
    }

    /// Take-profit level for a fill at `entry`; below entry for short units
    pub fn take_profit_price(&self, entry: f64, units: i64) -> f64 {
        if units > 0 {
            self.round_price(entry + self.take_profit_pips)
        } else {
            self.round_price(entry - self.take_profit_pips)
        }
    }

    /// Stop-loss level for a fill at `entry`; above entry for short units
    pub fn stop_loss_price(&self, entry: f64, units: i64) -> f64 {
        if units > 0 {
            self.round_price(entry - self.stop_loss_pips)
        } else {
            self.round_price(entry + self.stop_loss_pips)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("instrument name must not be empty".into()));
        }
        if self.aggregation_window_secs == 0 {
            return Err(Error::Config(format!(
                "{}: aggregation_window_secs must be positive",
                self.name
            )));
        }
        if self.max_duration_secs == 0 {
            return Err(Error::Config(format!(
                "{}: max_duration_secs must be positive",
                self.name
            )));
        }
        if !(self.support_resistance_multiplier >= 0.0) {
            return Err(Error::Config(format!(
                "{}: support_resistance_multiplier must be >= 0",
                self.name
            )));
        }
        if self.stop_loss_pips < 0.0 || self.take_profit_pips < 0.0 {
            return Err(Error::Config(format!(
                "{}: stop/take-profit distances must be >= 0",
                self.name
            )));
        }
        if self.order_units <= 0 {
            return Err(Error::Config(format!(
                "{}: order_units must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

impl Settings {
    /// Load settings from an optional TOML file layered under `FOREXBOT__*`
    /// environment variables.
    ///
    /// Broker credentials fall back to `OANDA_ACCOUNT_ID` / `OANDA_ACCESS_TOKEN`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config/default").required(false)),
        };
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if settings.stream.account_id.is_empty() {
            if let Ok(account_id) = std::env::var("OANDA_ACCOUNT_ID") {
                settings.stream.account_id = account_id;
            }
        }
        if settings.stream.access_token.is_none() {
            settings.stream.access_token = std::env::var("OANDA_ACCESS_TOKEN").ok();
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from an in-memory TOML document
    pub fn from_toml(document: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let agent = &self.agent;
        if !(0.0..=1.0).contains(&agent.exploration_prob) {
            return Err(Error::Config("exploration_prob must be within [0, 1]".into()));
        }
        if !(agent.learning_rate > 0.0 && agent.learning_rate <= 1.0) {
            return Err(Error::Config("learning_rate must be within (0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&agent.discount_factor) {
            return Err(Error::Config("discount_factor must be within [0, 1]".into()));
        }

        let mut seen = HashSet::new();
        for instrument in &self.instruments {
            instrument.validate()?;
            if !seen.insert(instrument.name.as_str()) {
                return Err(Error::Config(format!(
                    "instrument {} configured twice",
                    instrument.name
                )));
            }
        }
        Ok(())
    }

    /// Pick the instruments to trade. An empty selection means all configured.
    pub fn select_instruments(&self, names: &[String]) -> Result<Vec<InstrumentConfig>> {
        if names.is_empty() {
            return Ok(self.instruments.clone());
        }

        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate pairs are not allowed: {}",
                    name
                )));
            }
            let instrument = self
                .instruments
                .iter()
                .find(|i| &i.name == name)
                .ok_or_else(|| Error::Config(format!("no configuration for instrument {}", name)))?;
            selected.push(instrument.clone());
        }
        Ok(selected)
    }
}

fn default_stream_url() -> String {
    "https://stream-fxpractice.oanda.com".to_string()
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_heartbeat_every() -> u32 {
    10
}

fn default_warmup_candles() -> usize {
    500
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_discount_factor() -> f64 {
    0.9
}

fn default_exploration_prob() -> f64 {
    0.1
}

fn default_aggregation_window_secs() -> u64 {
    60
}

fn default_order_units() -> i64 {
    100_000
}
