// crates/stockrx-ops/src/patch/builtin/mod.rs
// Built-in patch catalogue

pub mod batch_expiry;
pub mod counter_repair;
pub mod price_adjustment;

use super::{PatchFactory, PatchMetadata};

/// Every built-in patch with its factory, in registration order
pub fn catalogue() -> Vec<(PatchFactory, PatchMetadata)> {
    vec![
        (price_adjustment::create, price_adjustment::metadata()),
        (batch_expiry::create, batch_expiry::metadata()),
        (counter_repair::create, counter_repair::metadata()),
    ]
}
