// Core modules
pub mod agent;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod indicators;
pub mod models;
pub mod settings;
pub mod simulation;

// Re-export commonly used types
pub use error::{Error, GatewayError, Result, StreamError};
pub use models::*;
pub use settings::{AgentConfig, InstrumentConfig, Settings, StreamSettings};
