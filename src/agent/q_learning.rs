use super::q_table::QTable;
use crate::error::{Error, Result};
use crate::indicators::{CandleHistory, StateVector};
use crate::models::{Action, Candle};
use crate::settings::AgentConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Summary of an offline training pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub steps: usize,
    pub cumulative_reward: f64,
}

/// Tabular Q-learning agent choosing between Buy, Sell and Hold.
///
/// The state vector is collapsed to a single table column: the index of its
/// largest feature.
pub struct QLearningAgent {
    config: AgentConfig,
    q_table: QTable,
    rng: StdRng,
    prev_action: Option<Action>,
    cumulative_reward: f64,
    latest_q_value: Option<f64>,
}

impl QLearningAgent {
    pub fn new(config: AgentConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            q_table: QTable::new(),
            rng,
            prev_action: None,
            cumulative_reward: 0.0,
            latest_q_value: None,
        }
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    pub fn previous_action(&self) -> Option<Action> {
        self.prev_action
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    pub fn latest_q_value(&self) -> Option<f64> {
        self.latest_q_value
    }

    /// Epsilon-greedy selection over the state's dominant feature column
    pub fn choose_action(&mut self, state: &StateVector) -> Action {
        if self.rng.gen::<f64>() < self.config.exploration_prob {
            let index = self.rng.gen_range(0..Action::COUNT);
            return Action::ALL[index];
        }
        self.q_table.best_action(state.argmax())
    }

    /// Reward for `action` given the relative move from `current_close` to
    /// `next_close`. Hold is rewarded for movement in either direction.
    pub fn reward(action: Action, current_close: f64, next_close: f64) -> f64 {
        let price_change = (next_close - current_close) / current_close;
        match action {
            Action::Buy => price_change,
            Action::Sell => -price_change,
            Action::Hold => price_change.abs(),
        }
    }

    /// TD update of the previous action's value in the current state's
    /// column, then remember `action` for the next step.
    fn take_action(&mut self, state: &StateVector, action: Action, reward: f64) {
        if let Some(prev) = self.prev_action {
            let feature = state.argmax();
            let alpha = self.config.learning_rate;
            let current = self.q_table.get(prev, feature);
            let target = reward + self.config.discount_factor * self.q_table.max_value(feature);
            let updated = (1.0 - alpha) * current + alpha * target;

            self.q_table.set(prev, feature, updated);
            self.latest_q_value = Some(updated);
        }
        self.prev_action = Some(action);
    }

    /// Offline pass over adjacent close pairs to warm the table.
    ///
    /// Rows whose indicators are still undefined are skipped.
    pub fn train(&mut self, history: &CandleHistory) -> TrainingReport {
        tracing::info!(
            instrument = %history.instrument(),
            candles = history.len(),
            "Training the Q-learning model"
        );

        let candles = history.candles();
        let mut steps = 0;

        for i in 0..candles.len().saturating_sub(1) {
            let Some(state) = history.state_at(i) else {
                continue;
            };
            let current_close = candles[i].close;
            let next_close = candles[i + 1].close;

            let action = self.choose_action(&state);
            let reward = Self::reward(action, current_close, next_close);
            self.cumulative_reward += reward;
            self.take_action(&state, action, reward);
            steps += 1;

            tracing::trace!(
                close = current_close,
                ?action,
                reward,
                q_value = ?self.latest_q_value,
                cumulative_reward = self.cumulative_reward,
                "Training step"
            );
        }

        let report = TrainingReport {
            steps,
            cumulative_reward: self.cumulative_reward,
        };
        tracing::info!(
            instrument = %history.instrument(),
            steps = report.steps,
            cumulative_reward = report.cumulative_reward,
            q_table = ?self.q_table.rows(),
            "Training complete"
        );
        report
    }

    /// Online step: decide on the latest history row and learn from the
    /// move into the single new candle.
    ///
    /// `history` is the series right before `new_rows`. Anything other than
    /// exactly one new row is rejected before any state changes.
    pub fn update(&mut self, history: &CandleHistory, new_rows: &[Candle]) -> Result<Action> {
        if new_rows.len() != 1 {
            return Err(Error::Validation(format!(
                "new data must contain exactly one candle row, got {}",
                new_rows.len()
            )));
        }
        let state = history.latest_state().ok_or_else(|| {
            Error::Validation("latest history row has undefined indicators".to_string())
        })?;
        let next_close = new_rows[0].close;
        if !next_close.is_finite() || next_close <= 0.0 {
            return Err(Error::Validation(format!(
                "new candle close must be positive, got {}",
                next_close
            )));
        }

        self.cumulative_reward = 0.0;
        let action = self.choose_action(&state);
        let reward = Self::reward(action, state.close(), next_close);
        self.cumulative_reward += reward;
        self.take_action(&state, action, reward);

        tracing::info!(
            instrument = %history.instrument(),
            ?action,
            reward,
            q_value = ?self.latest_q_value,
            "Agent step"
        );

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{IndicatorEngine, IndicatorParams, STATE_WIDTH};
    use chrono::{Duration, TimeZone, Utc};

    fn config(exploration_prob: f64, seed: u64) -> AgentConfig {
        AgentConfig {
            learning_rate: 0.5,
            discount_factor: 0.9,
            exploration_prob,
            seed: Some(seed),
        }
    }

    fn history(closes: &[f64]) -> CandleHistory {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close + 0.001,
                low: close - 0.001,
                close,
            })
            .collect();
        IndicatorEngine::with_history("EUR_USD", IndicatorParams::new(0.5), &candles)
            .unwrap()
            .history()
            .clone()
    }

    fn next_candle(history: &CandleHistory, close: f64) -> Candle {
        let last = history.candles().last().unwrap();
        Candle {
            timestamp: last.timestamp + Duration::minutes(1),
            open: close,
            high: close,
            low: close,
            close,
        }
    }

    const CLOSES: [f64; 10] = [1.10, 1.11, 1.09, 1.12, 1.13, 1.12, 1.14, 1.15, 1.13, 1.16];

    #[test]
    fn test_reward_asymmetry() {
        let up = QLearningAgent::reward(Action::Buy, 1.0, 1.1);
        assert!((up - 0.1).abs() < 1e-12);
        assert!((QLearningAgent::reward(Action::Sell, 1.0, 1.1) + 0.1).abs() < 1e-12);
        assert!((QLearningAgent::reward(Action::Hold, 1.0, 1.1) - 0.1).abs() < 1e-12);
        assert!((QLearningAgent::reward(Action::Hold, 1.0, 0.9) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_greedy_choice_is_deterministic() {
        let state = StateVector::new([1.0, 1.0, 1.0, 1.0, 1.0, 70.0, 0.0, 30.0, 20.0, 1.2, 0.9]);

        let mut a = QLearningAgent::new(config(0.0, 1));
        let mut b = QLearningAgent::new(config(0.0, 99));
        a.q_table.set(Action::Sell, 5, 0.3);
        b.q_table.set(Action::Sell, 5, 0.3);

        for _ in 0..20 {
            assert_eq!(a.choose_action(&state), Action::Sell);
            assert_eq!(b.choose_action(&state), Action::Sell);
        }
    }

    #[test]
    fn test_full_exploration_visits_every_action() {
        let state = StateVector::new([1.0; STATE_WIDTH]);
        let mut agent = QLearningAgent::new(config(1.0, 42));

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(agent.choose_action(&state));
        }
        assert_eq!(seen.len(), Action::COUNT);
    }

    #[test]
    fn test_first_update_only_seeds() {
        let history = history(&CLOSES);
        let mut agent = QLearningAgent::new(config(0.0, 1));

        let action = agent.update(&history, &[next_candle(&history, 1.17)]).unwrap();

        assert_eq!(agent.previous_action(), Some(action));
        assert_eq!(agent.q_table(), &QTable::new());
        assert!(agent.latest_q_value().is_none());
    }

    #[test]
    fn test_second_update_applies_td_rule() {
        let history = history(&CLOSES);
        let state = history.latest_state().unwrap();
        let feature = state.argmax();
        let mut agent = QLearningAgent::new(config(0.0, 1));

        // zero table => greedy Buy both times
        agent.update(&history, &[next_candle(&history, 1.17)]).unwrap();
        let action = agent.update(&history, &[next_candle(&history, 1.2)]).unwrap();
        assert_eq!(action, Action::Buy);

        let reward = (1.2 - state.close()) / state.close();
        let expected = 0.5 * 0.0 + 0.5 * (reward + 0.9 * 0.0);
        let got = agent.q_table().get(Action::Buy, feature);
        assert!((got - expected).abs() < 1e-12);
        assert!((agent.cumulative_reward() - reward).abs() < 1e-12);
    }

    #[test]
    fn test_update_rejects_multiple_rows_without_mutation() {
        let history = history(&CLOSES);
        let mut agent = QLearningAgent::new(config(0.0, 1));
        agent.update(&history, &[next_candle(&history, 1.17)]).unwrap();
        let table_before = agent.q_table().clone();
        let prev_before = agent.previous_action();

        let rows = [next_candle(&history, 1.17), next_candle(&history, 1.18)];
        let result = agent.update(&history, &rows);

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(agent.q_table(), &table_before);
        assert_eq!(agent.previous_action(), prev_before);

        assert!(matches!(agent.update(&history, &[]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_update_requires_complete_state() {
        let short = history(&CLOSES[..4]);
        let mut agent = QLearningAgent::new(config(0.0, 1));

        let result = agent.update(&short, &[next_candle(&short, 1.2)]);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(agent.previous_action().is_none());
    }

    #[test]
    fn test_train_walks_complete_rows() {
        let history = history(&CLOSES);
        let mut agent = QLearningAgent::new(config(0.0, 3));

        let report = agent.train(&history);

        // rows 6..=8 are complete and have a successor
        assert_eq!(report.steps, 3);
        assert!(agent.previous_action().is_some());
        assert_ne!(agent.q_table(), &QTable::new());
    }

    #[test]
    fn test_train_on_empty_history() {
        let mut agent = QLearningAgent::new(config(0.1, 3));
        let report = agent.train(&CandleHistory::new("EUR_USD"));
        assert_eq!(report.steps, 0);
        assert_eq!(report.cumulative_reward, 0.0);
    }
}
