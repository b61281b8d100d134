// Order execution boundary
pub mod paper;

use crate::error::GatewayError;
use crate::models::{Position, TradeInstruction};
use async_trait::async_trait;
use std::sync::Arc;

pub use paper::{ExitReason, PaperGateway, PaperPosition, PositionStatus};

/// Broker-side order execution and position reporting.
///
/// Calls are awaited in sequence by a single worker; implementations make no
/// exactly-once promise across retries.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit one instruction
    async fn execute(&self, instruction: &TradeInstruction) -> Result<(), GatewayError>;

    /// Currently open positions across the account
    async fn open_positions(&self) -> Result<Vec<Position>, GatewayError>;

    /// Close every open trade on `instrument`, returning how many were closed
    async fn close_all_trades(&self, instrument: &str) -> Result<usize, GatewayError>;
}

#[async_trait]
impl<G: OrderGateway + ?Sized> OrderGateway for Arc<G> {
    async fn execute(&self, instruction: &TradeInstruction) -> Result<(), GatewayError> {
        (**self).execute(instruction).await
    }

    async fn open_positions(&self) -> Result<Vec<Position>, GatewayError> {
        (**self).open_positions().await
    }

    async fn close_all_trades(&self, instrument: &str) -> Result<usize, GatewayError> {
        (**self).close_all_trades(instrument).await
    }
}
