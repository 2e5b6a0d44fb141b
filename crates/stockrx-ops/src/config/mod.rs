// crates/stockrx-ops/src/config/mod.rs
// Configuration: environment variables plus ~/.stockrx/config.toml

pub mod env;
pub mod file;

pub use env::{ConfigValidation, EnvConfig};
pub use file::{DatabaseConfig, PatchesConfig, StockrxConfig};
