use log::warn;

/// Entry prices of the open lots on one side, kept sorted ascending.
/// Duplicates are distinct lots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionBook {
    prices: Vec<f64>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self { prices: Vec::new() }
    }

    /// Build a book from persisted prices. Unsorted input is sorted; non-finite
    /// entries are dropped since they can never have been valid fills.
    pub fn from_prices(mut prices: Vec<f64>) -> Self {
        let before = prices.len();
        prices.retain(|price| price.is_finite());
        if prices.len() != before {
            warn!(
                "Dropped {} non-finite entry price(s) while restoring a position book",
                before - prices.len()
            );
        }
        prices.sort_by(f64::total_cmp);
        Self { prices }
    }

    /// Insert after any equal entries so earlier lots stay ahead of later ones.
    pub fn insert(&mut self, price: f64) {
        let index = self.prices.partition_point(|&existing| existing <= price);
        self.prices.insert(index, price);
    }

    /// Remove and return the `k` smallest entries, ascending.
    pub fn remove_prefix(&mut self, k: usize) -> Vec<f64> {
        debug_assert!(k <= self.prices.len(), "prefix longer than book");
        let k = k.min(self.prices.len());
        self.prices.drain(..k).collect()
    }

    /// Remove and return the `k` largest entries, ascending.
    pub fn remove_suffix(&mut self, k: usize) -> Vec<f64> {
        debug_assert!(k <= self.prices.len(), "suffix longer than book");
        let k = k.min(self.prices.len());
        let split_at = self.prices.len() - k;
        self.prices.split_off(split_at)
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.prices.clone()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn total_entry_value(&self) -> f64 {
        self.prices.iter().sum()
    }

    pub fn mean_entry_price(&self) -> Option<f64> {
        if self.prices.is_empty() {
            None
        } else {
            Some(self.total_entry_value() / self.prices.len() as f64)
        }
    }
}
