pub mod commands;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;
pub mod param_utils;
pub mod performance;
pub mod position_book;
pub mod price_source;
pub mod retry;
pub mod session;
pub mod store;
pub mod strategy;
pub mod strategy_utils;

pub use error::BacktestError;
