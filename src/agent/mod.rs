// Reinforcement-learning action selection
pub mod q_learning;
pub mod q_table;

pub use q_learning::{QLearningAgent, TrainingReport};
pub use q_table::QTable;
