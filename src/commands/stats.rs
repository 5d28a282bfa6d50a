use crate::context::AppContext;
use crate::models::{Side, TradeRecord};
use crate::performance::{CloseKind, PerformanceCalculator, TradeStats};
use crate::store::Store;
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct StoredRunStats {
    pub run_id: String,
    pub open_longs: usize,
    pub open_shorts: usize,
    pub sell: TradeStats,
    pub cover: TradeStats,
}

impl StoredRunStats {
    pub fn from_trades(run_id: String, trades: &[TradeRecord]) -> Self {
        let open = |side: Side| {
            trades
                .iter()
                .filter(|trade| trade.is_open() && trade.side == side)
                .count()
        };
        Self {
            run_id,
            open_longs: open(Side::Long),
            open_shorts: open(Side::Short),
            sell: PerformanceCalculator::trade_stats(trades, CloseKind::Sell),
            cover: PerformanceCalculator::trade_stats(trades, CloseKind::Cover),
        }
    }
}

/// Summarize the trades a persisted run left in the database.
pub async fn run(app: &AppContext, run_id: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id.trim())
        .with_context(|| format!("invalid run id: {}", run_id))?;
    let store = app.postgres_store(run_id).await?;
    let trades = store.load_trades().await?;
    let stats = StoredRunStats::from_trades(run_id.to_string(), &trades);

    for (kind, trade_stats) in [(CloseKind::Sell, &stats.sell), (CloseKind::Cover, &stats.cover)] {
        info!(
            "{} trades: {}, total P/L {:.2}, best {:.2}, worst {:.2}",
            kind.label(),
            trade_stats.total_trades,
            trade_stats.total_profit_loss,
            trade_stats.best_trade,
            trade_stats.worst_trade
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("failed to encode trade stats")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeAction;

    #[test]
    fn test_stats_split_open_and_closed() {
        let trades = vec![
            TradeRecord {
                id: 1,
                entry_price: 10.0,
                side: Side::Long,
                opened_at_step: 1,
                action: TradeAction::ClosedByExit,
                closed_at_step: Some(3),
                closing_price: Some(14.0),
                realized_pnl: Some(4.0),
            },
            TradeRecord {
                id: 2,
                entry_price: 12.0,
                side: Side::Short,
                opened_at_step: 2,
                action: TradeAction::Open,
                closed_at_step: None,
                closing_price: None,
                realized_pnl: None,
            },
        ];
        let stats = StoredRunStats::from_trades("run".to_string(), &trades);
        assert_eq!(stats.open_longs, 0);
        assert_eq!(stats.open_shorts, 1);
        assert_eq!(stats.sell.total_trades, 1);
        assert_eq!(stats.sell.best_trade, 4.0);
        assert_eq!(stats.cover, TradeStats::default());
    }
}
