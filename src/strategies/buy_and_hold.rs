use crate::models::*;
use std::collections::HashMap;

pub struct BuyAndHoldStrategy {
    template_id: String,
}

impl BuyAndHoldStrategy {
    pub fn new(_parameters: HashMap<String, f64>) -> Self {
        Self {
            template_id: "buy_and_hold".to_string(),
        }
    }
}

impl super::Strategy for BuyAndHoldStrategy {
    fn get_template_id(&self) -> &str {
        &self.template_id
    }

    fn buying_strategy(&self, _price_history: &[f64]) -> SignalAction {
        // Buys every step; the engine turns it into a hold when cash runs out.
        SignalAction::Buy
    }

    fn selling_strategy(
        &self,
        _price_history: &[f64],
        _open_lots: &[f64],
        _side: Side,
    ) -> ExitRuns {
        ExitRuns::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;

    #[test]
    fn test_always_buys_and_never_exits() {
        let strategy = BuyAndHoldStrategy::new(HashMap::new());
        assert_eq!(strategy.buying_strategy(&[]), SignalAction::Buy);
        assert_eq!(strategy.buying_strategy(&[1.0, 50.0]), SignalAction::Buy);
        for side in Side::ALL {
            let runs = strategy.selling_strategy(&[1_000.0], &[1.0, 2.0], side);
            assert!(runs.is_empty());
        }
    }
}
