use crate::models::{Lot, Side, TradeAction, TradeRecord};
use log::warn;
use std::collections::{HashMap, VecDeque};

/// Append-only record of lot opens and closes.
///
/// Every close pairs with exactly one open record of the same
/// `(entry_price, side)`; ties go to the earliest-opened lot.
#[derive(Debug, Clone, Default)]
pub struct TradeLedger {
    records: Vec<TradeRecord>,
    open_index: HashMap<(Side, u64), VecDeque<usize>>,
    unmatched_closes: usize,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_open(&mut self, lot: Lot) -> &TradeRecord {
        let index = self.records.len();
        self.records.push(TradeRecord {
            id: index as u64 + 1,
            entry_price: lot.entry_price,
            side: lot.side,
            opened_at_step: lot.opened_at_step,
            action: TradeAction::Open,
            closed_at_step: None,
            closing_price: None,
            realized_pnl: None,
        });
        self.open_index
            .entry(Self::key(lot.side, lot.entry_price))
            .or_default()
            .push_back(index);
        &self.records[index]
    }

    /// Fill the closing fields of the oldest open record at `entry_price`.
    /// Returns `None`, and logs, when nothing is open at that price.
    pub fn record_close(
        &mut self,
        entry_price: f64,
        side: Side,
        step: usize,
        closing_price: f64,
        pnl: f64,
    ) -> Option<&TradeRecord> {
        let key = Self::key(side, entry_price);
        let index = match self.open_index.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(index) => index,
            None => {
                self.unmatched_closes += 1;
                warn!(
                    "No open {} lot at {:.4} to close at step {}; ignoring close",
                    side, entry_price, step
                );
                return None;
            }
        };
        if self
            .open_index
            .get(&key)
            .map(VecDeque::is_empty)
            .unwrap_or(false)
        {
            self.open_index.remove(&key);
        }

        let record = &mut self.records[index];
        record.action = TradeAction::ClosedByExit;
        record.closed_at_step = Some(step);
        record.closing_price = Some(closing_price);
        record.realized_pnl = Some(pnl);
        Some(&*record)
    }

    pub fn all_records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn records_by_action(&self, kind: TradeAction) -> Vec<&TradeRecord> {
        self.records
            .iter()
            .filter(|record| record.action == kind)
            .collect()
    }

    pub fn open_count(&self, side: Side) -> usize {
        self.open_index
            .iter()
            .filter(|((entry_side, _), _)| *entry_side == side)
            .map(|(_, queue)| queue.len())
            .sum()
    }

    pub fn unmatched_closes(&self) -> usize {
        self.unmatched_closes
    }

    pub fn into_records(self) -> Vec<TradeRecord> {
        self.records
    }

    fn key(side: Side, entry_price: f64) -> (Side, u64) {
        (side, entry_price.to_bits())
    }
}
