// crates/stockrx-ops/src/lib.rs
// StockRx maintenance toolkit - counter cache reconciliation and batch data patches

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod db;
pub mod error;
pub mod patch;
pub mod reconcile;
pub mod utils;
pub use error::{Result, StockrxError};
