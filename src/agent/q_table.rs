use crate::indicators::STATE_WIDTH;
use crate::models::Action;
use serde::Serialize;

/// Value estimates indexed by (action, dominant feature)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QTable {
    values: [[f64; STATE_WIDTH]; Action::COUNT],
}

impl QTable {
    pub fn new() -> Self {
        Self {
            values: [[0.0; STATE_WIDTH]; Action::COUNT],
        }
    }

    pub fn get(&self, action: Action, feature: usize) -> f64 {
        self.values[action.index()][feature]
    }

    pub fn set(&mut self, action: Action, feature: usize, value: f64) {
        self.values[action.index()][feature] = value;
    }

    /// Highest-valued action for a feature column; ties go to the first action
    pub fn best_action(&self, feature: usize) -> Action {
        let mut best = Action::ALL[0];
        for action in Action::ALL.into_iter().skip(1) {
            if self.get(action, feature) > self.get(best, feature) {
                best = action;
            }
        }
        best
    }

    pub fn max_value(&self, feature: usize) -> f64 {
        Action::ALL
            .into_iter()
            .map(|a| self.get(a, feature))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn rows(&self) -> &[[f64; STATE_WIDTH]; Action::COUNT] {
        &self.values
    }
}

impl Default for QTable {
    fn default() -> Self {
        Self::new()
    }
}
