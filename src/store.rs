use crate::models::*;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

/// Persisted holdings for one side of the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingsRecord {
    pub side: Side,
    pub prices: Vec<f64>,
    pub count: usize,
    pub total_value: f64,
}

impl HoldingsRecord {
    pub fn empty(side: Side) -> Self {
        Self {
            side,
            prices: Vec::new(),
            count: 0,
            total_value: 0.0,
        }
    }
}

/// Durable home for the positions and trades of a single run.
///
/// Implementations isolate runs from each other; `reset` clears whatever the
/// current run wrote before.
#[allow(async_fn_in_trait)]
pub trait Store {
    async fn reset(&mut self) -> Result<()>;
    async fn load_positions(&self, side: Side) -> Result<Vec<f64>>;
    async fn save_positions(
        &mut self,
        side: Side,
        prices: &[f64],
        count: usize,
        value: f64,
    ) -> Result<()>;
    async fn append_trade(&mut self, record: &TradeRecord) -> Result<()>;
    /// Fill the closing fields of the trade identified by `trade_id`.
    async fn update_trade(&mut self, trade_id: u64, close: &TradeClose) -> Result<()>;
    async fn load_trades(&self) -> Result<Vec<TradeRecord>>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    holdings: HashMap<Side, HoldingsRecord>,
    trades: Vec<TradeRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holdings(&self, side: Side) -> Option<&HoldingsRecord> {
        self.holdings.get(&side)
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }
}

impl Store for MemoryStore {
    async fn reset(&mut self) -> Result<()> {
        self.trades.clear();
        self.holdings = Side::ALL
            .iter()
            .map(|&side| (side, HoldingsRecord::empty(side)))
            .collect();
        Ok(())
    }

    async fn load_positions(&self, side: Side) -> Result<Vec<f64>> {
        Ok(self
            .holdings
            .get(&side)
            .map(|holding| holding.prices.clone())
            .unwrap_or_default())
    }

    async fn save_positions(
        &mut self,
        side: Side,
        prices: &[f64],
        count: usize,
        value: f64,
    ) -> Result<()> {
        self.holdings.insert(
            side,
            HoldingsRecord {
                side,
                prices: prices.to_vec(),
                count,
                total_value: value,
            },
        );
        Ok(())
    }

    async fn append_trade(&mut self, record: &TradeRecord) -> Result<()> {
        self.trades.push(record.clone());
        Ok(())
    }

    async fn update_trade(&mut self, trade_id: u64, close: &TradeClose) -> Result<()> {
        let trade = self
            .trades
            .iter_mut()
            .find(|trade| trade.id == trade_id)
            .ok_or_else(|| anyhow!("Trade {} is not in the store", trade_id))?;
        trade.action = TradeAction::ClosedByExit;
        trade.closed_at_step = Some(close.closed_at_step);
        trade.closing_price = Some(close.closing_price);
        trade.realized_pnl = Some(close.realized_pnl);
        Ok(())
    }

    async fn load_trades(&self) -> Result<Vec<TradeRecord>> {
        Ok(self.trades.clone())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS holdings (
    run_id TEXT NOT NULL,
    side TEXT NOT NULL,
    prices DOUBLE PRECISION[] NOT NULL,
    count BIGINT NOT NULL,
    total_value DOUBLE PRECISION NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (run_id, side)
);
CREATE TABLE IF NOT EXISTS trades (
    run_id TEXT NOT NULL,
    trade_id BIGINT NOT NULL,
    entry_price DOUBLE PRECISION NOT NULL,
    side TEXT NOT NULL,
    opened_at_step BIGINT NOT NULL,
    action TEXT NOT NULL,
    closed_at_step BIGINT,
    closing_price DOUBLE PRECISION,
    realized_pnl DOUBLE PRECISION,
    PRIMARY KEY (run_id, trade_id)
);
";

/// PostgreSQL store; every row is keyed by the run id so concurrent runs
/// sharing a database never see each other's data.
pub struct PostgresStore {
    client: Client,
    run_id: String,
}

impl PostgresStore {
    pub async fn connect<S: AsRef<str>>(database_url: S, run_id: Uuid) -> Result<Self> {
        let database_url = database_url.as_ref().to_string();
        let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to PostgreSQL at {}", database_url))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("PostgreSQL connection error: {}", err);
            }
        });

        let store = Self {
            client,
            run_id: run_id.to_string(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client
            .batch_execute(SCHEMA)
            .await
            .context("failed to create holdings/trades tables")
    }

    fn trade_from_row(row: &Row) -> Result<TradeRecord> {
        let side: String = row.get("side");
        let action: String = row.get("action");
        let trade_id: i64 = row.get("trade_id");
        let opened_at_step: i64 = row.get("opened_at_step");
        let closed_at_step: Option<i64> = row.get("closed_at_step");
        Ok(TradeRecord {
            id: u64::try_from(trade_id).context("negative trade id")?,
            entry_price: row.get("entry_price"),
            side: Side::from_str(&side)?,
            opened_at_step: usize::try_from(opened_at_step).context("negative open step")?,
            action: TradeAction::from_str(&action)?,
            closed_at_step: closed_at_step
                .map(usize::try_from)
                .transpose()
                .context("negative close step")?,
            closing_price: row.get("closing_price"),
            realized_pnl: row.get("realized_pnl"),
        })
    }
}

impl Store for PostgresStore {
    async fn reset(&mut self) -> Result<()> {
        let transaction = self.client.transaction().await?;
        transaction
            .execute("DELETE FROM trades WHERE run_id = $1", &[&self.run_id])
            .await?;
        transaction
            .execute("DELETE FROM holdings WHERE run_id = $1", &[&self.run_id])
            .await?;
        let now = Utc::now();
        let empty: Vec<f64> = Vec::new();
        for side in Side::ALL {
            transaction
                .execute(
                    "INSERT INTO holdings (run_id, side, prices, count, total_value, updated_at)
                     VALUES ($1, $2, $3, 0, 0, $4)",
                    &[&self.run_id, &side.as_str(), &empty, &now],
                )
                .await?;
        }
        transaction
            .commit()
            .await
            .with_context(|| format!("failed to reset store for run {}", self.run_id))
    }

    async fn load_positions(&self, side: Side) -> Result<Vec<f64>> {
        let row = self
            .client
            .query_opt(
                "SELECT prices FROM holdings WHERE run_id = $1 AND side = $2",
                &[&self.run_id, &side.as_str()],
            )
            .await?;
        Ok(row
            .map(|row| row.get::<_, Vec<f64>>(0))
            .unwrap_or_default())
    }

    async fn save_positions(
        &mut self,
        side: Side,
        prices: &[f64],
        count: usize,
        value: f64,
    ) -> Result<()> {
        let prices = prices.to_vec();
        let count = i64::try_from(count).context("position count overflow")?;
        self.client
            .execute(
                "INSERT INTO holdings (run_id, side, prices, count, total_value, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (run_id, side) DO UPDATE
                 SET prices = EXCLUDED.prices,
                     count = EXCLUDED.count,
                     total_value = EXCLUDED.total_value,
                     updated_at = EXCLUDED.updated_at",
                &[
                    &self.run_id,
                    &side.as_str(),
                    &prices,
                    &count,
                    &value,
                    &Utc::now(),
                ],
            )
            .await
            .with_context(|| format!("failed to save {} holdings", side))?;
        Ok(())
    }

    async fn append_trade(&mut self, record: &TradeRecord) -> Result<()> {
        let trade_id = i64::try_from(record.id).context("trade id overflow")?;
        let opened_at_step = i64::try_from(record.opened_at_step).context("step overflow")?;
        let closed_at_step = record
            .closed_at_step
            .map(i64::try_from)
            .transpose()
            .context("step overflow")?;
        self.client
            .execute(
                "INSERT INTO trades (run_id, trade_id, entry_price, side, opened_at_step, action,
                                     closed_at_step, closing_price, realized_pnl)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &self.run_id,
                    &trade_id,
                    &record.entry_price,
                    &record.side.as_str(),
                    &opened_at_step,
                    &record.action.as_str(),
                    &closed_at_step,
                    &record.closing_price,
                    &record.realized_pnl,
                ],
            )
            .await
            .with_context(|| format!("failed to append trade {}", record.id))?;
        Ok(())
    }

    async fn update_trade(&mut self, trade_id: u64, close: &TradeClose) -> Result<()> {
        let key = i64::try_from(trade_id).context("trade id overflow")?;
        let closed_at_step = i64::try_from(close.closed_at_step).context("step overflow")?;
        let updated = self
            .client
            .execute(
                "UPDATE trades
                 SET action = $3, closed_at_step = $4, closing_price = $5, realized_pnl = $6
                 WHERE run_id = $1 AND trade_id = $2",
                &[
                    &self.run_id,
                    &key,
                    &TradeAction::ClosedByExit.as_str(),
                    &closed_at_step,
                    &close.closing_price,
                    &close.realized_pnl,
                ],
            )
            .await
            .with_context(|| format!("failed to update trade {}", trade_id))?;
        if updated != 1 {
            return Err(anyhow!(
                "Expected to update one trade for id {}, updated {}",
                trade_id,
                updated
            ));
        }
        Ok(())
    }

    async fn load_trades(&self) -> Result<Vec<TradeRecord>> {
        let rows = self
            .client
            .query(
                "SELECT trade_id, entry_price, side, opened_at_step, action,
                        closed_at_step, closing_price, realized_pnl
                 FROM trades
                 WHERE run_id = $1
                 ORDER BY trade_id",
                &[&self.run_id],
            )
            .await?;
        rows.iter().map(Self::trade_from_row).collect()
    }
}
