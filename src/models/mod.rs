use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OHLC candle for one aggregation window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// One streaming bid/ask update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub closeout_bid: f64,
    pub closeout_ask: f64,
}

impl Tick {
    /// Mid price between closeout bid and ask
    pub fn mid(&self) -> f64 {
        (self.closeout_bid + self.closeout_ask) / 2.0
    }
}

/// Anything that can arrive on the pricing stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Tick(Tick),
    Heartbeat { timestamp: DateTime<Utc> },
}

/// Discrete action chosen by the agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub const COUNT: usize = 3;
    pub const ALL: [Action; Action::COUNT] = [Action::Buy, Action::Sell, Action::Hold];

    /// Row index in the Q table
    pub fn index(self) -> usize {
        match self {
            Action::Buy => 0,
            Action::Sell => 1,
            Action::Hold => 2,
        }
    }
}

/// Open position as reported by the order gateway.
///
/// Read-only snapshot, valid for a single decision cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub instrument: String,
    pub entry_price: f64,
    pub units: i64,
}

/// Why an instruction was produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstructionKind {
    MarketBuy,
    MarketSell,
    TakeProfit,
    StopLoss,
}

/// Wire form of an instruction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit {
        price: f64,
        take_profit_price: f64,
        stop_loss_price: f64,
    },
}

/// Trade instruction handed to the order gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeInstruction {
    pub id: Uuid,
    pub kind: InstructionKind,
    pub instrument: String,
    /// Signed: positive buys, negative sells
    pub units: i64,
    pub order: OrderType,
    /// Last observed price when the instruction was decided
    #[serde(skip)]
    pub reference_price: f64,
}

impl TradeInstruction {
    pub fn market(
        kind: InstructionKind,
        instrument: &str,
        units: i64,
        reference_price: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            instrument: instrument.to_string(),
            units,
            order: OrderType::Market,
            reference_price,
        }
    }

    pub fn limit(
        kind: InstructionKind,
        instrument: &str,
        units: i64,
        price: f64,
        take_profit_price: f64,
        stop_loss_price: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            instrument: instrument.to_string(),
            units,
            order: OrderType::Limit {
                price,
                take_profit_price,
                stop_loss_price,
            },
            reference_price: price,
        }
    }

    /// Price the instruction is expected to fill at
    pub fn fill_price(&self) -> f64 {
        match self.order {
            OrderType::Market => self.reference_price,
            OrderType::Limit { price, .. } => price,
        }
    }
}
