use super::OrderGateway;
use crate::error::GatewayError;
use crate::models::{InstructionKind, Position, TradeInstruction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    StrategySell,
    TakeProfit,
    StopLoss,
    SessionEnd,
}

impl ExitReason {
    fn from_kind(kind: InstructionKind) -> Self {
        match kind {
            InstructionKind::TakeProfit => ExitReason::TakeProfit,
            InstructionKind::StopLoss => ExitReason::StopLoss,
            InstructionKind::MarketBuy | InstructionKind::MarketSell => ExitReason::StrategySell,
        }
    }
}

/// Long position held by the paper book
#[derive(Debug, Clone)]
pub struct PaperPosition {
    pub id: Uuid,
    pub instrument: String,
    pub entry_price: f64, // Average entry for accumulated buys
    pub units: i64,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
    pub realized_pnl: f64,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
}

#[derive(Default)]
struct PaperBook {
    positions: Vec<PaperPosition>,
    ledger: Vec<TradeInstruction>,
    marks: HashMap<String, f64>,
    total_pnl: f64,
}

impl PaperBook {
    fn open_position_mut(&mut self, instrument: &str) -> Option<&mut PaperPosition> {
        self.positions
            .iter_mut()
            .find(|p| p.instrument == instrument && p.status == PositionStatus::Open)
    }

    fn buy(&mut self, instrument: &str, units: i64, price: f64) {
        if let Some(position) = self.open_position_mut(instrument) {
            let cost = position.entry_price * position.units as f64 + price * units as f64;
            position.units += units;
            position.entry_price = cost / position.units as f64;

            tracing::info!(
                instrument,
                units = position.units,
                avg_entry = position.entry_price,
                "Paper: accumulated position"
            );
            return;
        }

        self.positions.push(PaperPosition {
            id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            entry_price: price,
            units,
            entry_time: Utc::now(),
            status: PositionStatus::Open,
            realized_pnl: 0.0,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        });
        tracing::info!(instrument, units, price, "Paper: opened position");
    }

    fn sell(
        &mut self,
        instrument: &str,
        units: i64,
        price: f64,
        reason: ExitReason,
    ) -> Result<f64, GatewayError> {
        let position = self.open_position_mut(instrument).ok_or_else(|| {
            GatewayError::Rejected(format!("no open position on {} to sell", instrument))
        })?;

        let closed = units.min(position.units);
        let pnl = (price - position.entry_price) * closed as f64;
        position.units -= closed;
        position.realized_pnl += pnl;

        if position.units == 0 {
            position.status = PositionStatus::Closed;
            position.exit_price = Some(price);
            position.exit_time = Some(Utc::now());
            position.exit_reason = Some(reason);
        }

        self.total_pnl += pnl;
        tracing::info!(instrument, units = closed, price, pnl, "Paper: closed units");
        Ok(pnl)
    }
}

/// In-memory broker: fills every instruction immediately at its price.
///
/// Only long positions are modelled; sells beyond the held units are capped
/// and sells without a position are rejected.
#[derive(Default)]
pub struct PaperGateway {
    book: Mutex<PaperBook>,
    offline: AtomicBool,
    close_all_calls: AtomicUsize,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broker outage: every call fails while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Seed an open long position
    pub fn seed_position(&self, instrument: &str, entry_price: f64, units: i64) {
        let mut book = self.lock();
        book.buy(instrument, units, entry_price);
        book.marks.insert(instrument.to_string(), entry_price);
    }

    /// Executed instructions, oldest first
    pub fn ledger(&self) -> Vec<TradeInstruction> {
        self.lock().ledger.clone()
    }

    pub fn positions(&self) -> Vec<PaperPosition> {
        self.lock().positions.clone()
    }

    pub fn total_pnl(&self) -> f64 {
        self.lock().total_pnl
    }

    pub fn close_all_calls(&self) -> usize {
        self.close_all_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperBook> {
        // a poisoned book is still consistent: every mutation completes before unlocking
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<(), GatewayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("paper broker offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn execute(&self, instruction: &TradeInstruction) -> Result<(), GatewayError> {
        self.check_online()?;

        let price = instruction.fill_price();
        if !price.is_finite() || price <= 0.0 {
            return Err(GatewayError::Rejected(format!(
                "instruction {} has no usable price",
                instruction.id
            )));
        }
        if instruction.units == 0 {
            return Err(GatewayError::Rejected("zero units".to_string()));
        }

        let mut book = self.lock();
        if instruction.units > 0 {
            book.buy(&instruction.instrument, instruction.units, price);
        } else {
            book.sell(
                &instruction.instrument,
                -instruction.units,
                price,
                ExitReason::from_kind(instruction.kind),
            )?;
        }
        book.marks.insert(instruction.instrument.clone(), price);
        book.ledger.push(instruction.clone());
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<Position>, GatewayError> {
        self.check_online()?;

        Ok(self
            .lock()
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| Position {
                instrument: p.instrument.clone(),
                entry_price: p.entry_price,
                units: p.units,
            })
            .collect())
    }

    async fn close_all_trades(&self, instrument: &str) -> Result<usize, GatewayError> {
        self.close_all_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let mut book = self.lock();
        let Some((units, entry)) = book
            .open_position_mut(instrument)
            .map(|p| (p.units, p.entry_price))
        else {
            tracing::info!(instrument, "Paper: no open trades to close");
            return Ok(0);
        };

        let price = book.marks.get(instrument).copied().unwrap_or(entry);
        book.sell(instrument, units, price, ExitReason::SessionEnd)?;
        Ok(1)
    }
}
