use crate::error::{Error, Result};
use crate::indicators::IndicatorRow;
use crate::models::{Action, InstructionKind, Position, TradeInstruction};
use crate::settings::InstrumentConfig;

/// Outcome of one policy evaluation
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub instruction: Option<TradeInstruction>,
    pub reason: String,
}

impl PolicyDecision {
    fn hold(reason: impl Into<String>) -> Self {
        Self {
            instruction: None,
            reason: reason.into(),
        }
    }

    fn emit(instruction: TradeInstruction, reason: impl Into<String>) -> Self {
        Self {
            instruction: Some(instruction),
            reason: reason.into(),
        }
    }
}

/// Turns the agent's action and the instrument's open position into at most
/// one trade instruction.
///
/// Rules are checked in a fixed order and the first match wins:
/// 1. Buy with no open position: market buy
/// 2. Sell with an open position: market close
/// 3. Price within one tick of resistance, position entered below it: take profit
/// 4. Price at or below support, position entered above it: stop loss
/// 5. Otherwise hold
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    config: InstrumentConfig,
}

impl DecisionPolicy {
    pub fn new(config: InstrumentConfig) -> Self {
        Self { config }
    }

    pub fn instrument(&self) -> &str {
        &self.config.name
    }

    /// Evaluate the rule chain for the current window
    pub fn resolve(
        &self,
        action: Action,
        last_price: f64,
        levels: &IndicatorRow,
        positions: &[Position],
    ) -> Result<PolicyDecision> {
        if !last_price.is_finite() || last_price <= 0.0 {
            return Err(Error::Validation(format!(
                "current price for {} is missing or invalid: {}",
                self.config.name, last_price
            )));
        }

        let instrument = self.config.name.as_str();
        let position = positions
            .iter()
            .find(|p| p.instrument == instrument && p.units != 0);

        let Some(position) = position else {
            if action == Action::Buy {
                let instruction = TradeInstruction::market(
                    InstructionKind::MarketBuy,
                    instrument,
                    self.config.order_units,
                    last_price,
                );
                return Ok(PolicyDecision::emit(
                    instruction,
                    "No open position and agent recommends buying",
                ));
            }
            return Ok(PolicyDecision::hold("No open position"));
        };

        if action == Action::Sell {
            let instruction = TradeInstruction::market(
                InstructionKind::MarketSell,
                instrument,
                -position.units,
                last_price,
            );
            return Ok(PolicyDecision::emit(
                instruction,
                "Agent recommends selling the open position",
            ));
        }

        if let Some(resistance) = levels.resistance {
            // one-tick band, with slack for float noise right at the edge
            let near = (last_price - resistance).abs() <= self.config.tick_size() * (1.0 + 1e-9);
            if near && position.entry_price < resistance {
                return Ok(PolicyDecision::emit(
                    self.protective_close(InstructionKind::TakeProfit, position, last_price),
                    format!("Price at resistance level {:.6}, taking profit", resistance),
                ));
            }
        }

        if let Some(support) = levels.support {
            if last_price <= support && position.entry_price > support {
                return Ok(PolicyDecision::emit(
                    self.protective_close(InstructionKind::StopLoss, position, last_price),
                    format!("Price at support level {:.6}, stopping loss", support),
                ));
            }
        }

        Ok(PolicyDecision::hold("Holding position"))
    }

    /// Limit-form close of `position` at the current price
    fn protective_close(
        &self,
        kind: InstructionKind,
        position: &Position,
        last_price: f64,
    ) -> TradeInstruction {
        let units = -position.units;
        let price = self.config.round_price(last_price);
        TradeInstruction::limit(
            kind,
            &self.config.name,
            units,
            price,
            self.config.take_profit_price(price, units),
            self.config.stop_loss_price(price, units),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderType;

    fn config() -> InstrumentConfig {
        InstrumentConfig {
            name: "EUR_USD".to_string(),
            precision: 4,
            stop_loss_pips: 0.0005,
            take_profit_pips: 0.0010,
            aggregation_window_secs: 60,
            max_duration_secs: 600,
            support_resistance_multiplier: 0.5,
            order_units: 1000,
        }
    }

    fn levels(resistance: f64, support: f64) -> IndicatorRow {
        IndicatorRow {
            resistance: Some(resistance),
            support: Some(support),
            ..Default::default()
        }
    }

    fn long(entry_price: f64) -> Vec<Position> {
        vec![Position {
            instrument: "EUR_USD".to_string(),
            entry_price,
            units: 1000,
        }]
    }

    #[test]
    fn test_buy_without_position() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Buy, 1.1, &levels(1.2, 1.0), &[])
            .unwrap();

        let instruction = decision.instruction.unwrap();
        assert_eq!(instruction.kind, InstructionKind::MarketBuy);
        assert_eq!(instruction.units, 1000);
        assert_eq!(instruction.order, OrderType::Market);
        assert_eq!(instruction.reference_price, 1.1);
    }

    #[test]
    fn test_sell_without_position_holds() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Sell, 1.1, &levels(1.2, 1.0), &[])
            .unwrap();
        assert!(decision.instruction.is_none());
    }

    #[test]
    fn test_sell_closes_open_position() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Sell, 1.1, &levels(1.2, 1.0), &long(1.05))
            .unwrap();

        let instruction = decision.instruction.unwrap();
        assert_eq!(instruction.kind, InstructionKind::MarketSell);
        assert_eq!(instruction.units, -1000);
    }

    #[test]
    fn test_sell_wins_over_take_profit() {
        let policy = DecisionPolicy::new(config());
        // price sits on resistance and entry is below it, but Sell comes first
        let decision = policy
            .resolve(Action::Sell, 1.2, &levels(1.2, 1.0), &long(1.1))
            .unwrap();

        assert_eq!(
            decision.instruction.map(|i| i.kind),
            Some(InstructionKind::MarketSell)
        );
    }

    #[test]
    fn test_take_profit_near_resistance() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Hold, 1.19997, &levels(1.2, 1.0), &long(1.1))
            .unwrap();

        let instruction = decision.instruction.unwrap();
        assert_eq!(instruction.kind, InstructionKind::TakeProfit);
        assert_eq!(instruction.units, -1000);
        match instruction.order {
            OrderType::Limit {
                price,
                take_profit_price,
                stop_loss_price,
            } => {
                assert_eq!(price, 1.2);
                assert_eq!(take_profit_price, 1.199);
                assert_eq!(stop_loss_price, 1.2005);
            }
            OrderType::Market => panic!("expected limit order"),
        }
    }

    #[test]
    fn test_no_take_profit_when_entered_above_resistance() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Hold, 1.2, &levels(1.2, 1.0), &long(1.25))
            .unwrap();
        assert!(decision.instruction.is_none());
    }

    #[test]
    fn test_price_two_ticks_from_resistance_holds() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Hold, 1.1998, &levels(1.2, 1.0), &long(1.1))
            .unwrap();
        assert!(decision.instruction.is_none());
    }

    #[test]
    fn test_buy_with_position_falls_through_to_take_profit() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Buy, 1.2001, &levels(1.2, 1.0), &long(1.1))
            .unwrap();
        assert_eq!(
            decision.instruction.map(|i| i.kind),
            Some(InstructionKind::TakeProfit)
        );
    }

    #[test]
    fn test_stop_loss_at_support() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Hold, 0.999, &levels(1.2, 1.0), &long(1.1))
            .unwrap();

        let instruction = decision.instruction.unwrap();
        assert_eq!(instruction.kind, InstructionKind::StopLoss);
        assert_eq!(instruction.fill_price(), 0.999);
    }

    #[test]
    fn test_no_stop_loss_when_entered_below_support() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Hold, 0.95, &levels(1.2, 1.0), &long(0.9))
            .unwrap();
        assert!(decision.instruction.is_none());
    }

    #[test]
    fn test_undefined_levels_hold() {
        let policy = DecisionPolicy::new(config());
        let decision = policy
            .resolve(Action::Hold, 0.5, &IndicatorRow::default(), &long(1.1))
            .unwrap();
        assert!(decision.instruction.is_none());
        assert!(decision.reason.contains("Holding"));
    }

    #[test]
    fn test_other_instrument_positions_are_ignored() {
        let policy = DecisionPolicy::new(config());
        let positions = vec![Position {
            instrument: "USD_JPY".to_string(),
            entry_price: 150.0,
            units: 1000,
        }];

        let decision = policy
            .resolve(Action::Buy, 1.1, &levels(1.2, 1.0), &positions)
            .unwrap();
        assert_eq!(
            decision.instruction.map(|i| i.kind),
            Some(InstructionKind::MarketBuy)
        );
    }

    #[test]
    fn test_missing_price_is_rejected() {
        let policy = DecisionPolicy::new(config());
        let result = policy.resolve(Action::Buy, f64::NAN, &levels(1.2, 1.0), &[]);
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
