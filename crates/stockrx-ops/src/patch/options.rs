// crates/stockrx-ops/src/patch/options.rs
// KEY=VALUE option parsing and typed accessors

use crate::config::file::PatchesConfig;
use crate::error::{Result, StockrxError};
use crate::utils::parse_bool;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::time::Duration;

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Environment-style options for a patch run. Keys are stored upper-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOptions {
    values: BTreeMap<String, String>,
}

impl PatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `KEY=VALUE` pairs. Later duplicates override earlier ones.
    pub fn parse_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let Some((key, value)) = pair.split_once('=') else {
                return Err(StockrxError::MalformedOption(pair.to_string()));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(StockrxError::MalformedOption(pair.to_string()));
            }
            options.set(key, value.trim());
        }
        Ok(options)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_ascii_uppercase(), value.into());
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StockrxError::MissingOption(key.to_ascii_lowercase()))
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| invalid(key, format!("must be an integer, got '{v}'")))
            })
            .transpose()
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.get(key)
            .map(|v| match v.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(n),
                _ => Err(invalid(key, format!("must be a number, got '{v}'"))),
            })
            .transpose()
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|v| {
                parse_bool(v)
                    .ok_or_else(|| invalid(key, format!("must be true or false, got '{v}'")))
            })
            .transpose()
    }

    pub fn get_date(&self, key: &str) -> Result<Option<NaiveDate>> {
        self.get(key)
            .map(|v| {
                NaiveDate::parse_from_str(v, "%Y-%m-%d")
                    .map_err(|_| invalid(key, format!("must be a YYYY-MM-DD date, got '{v}'")))
            })
            .transpose()
    }

    pub fn dry_run(&self) -> Result<bool> {
        Ok(self.get_bool("DRY_RUN")?.unwrap_or(false))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Snapshot stored with the execution audit row
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.values).unwrap_or_else(|_| "{}".to_string())
    }
}

fn invalid(key: &str, expected: String) -> StockrxError {
    StockrxError::invalid_option(key.to_ascii_lowercase(), expected)
}

/// Driver settings taken from the execution keys, falling back to config.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    pub batch_size: usize,
    pub timeout: Option<Duration>,
    /// Advisory only; reported, never enforced
    pub memory_limit_mb: Option<u64>,
    pub dry_run: bool,
    /// Age after which another run's lock may be taken over
    pub lock_stale_after: Duration,
}

impl ExecutionOptions {
    pub fn resolve(options: &PatchOptions, defaults: &PatchesConfig) -> Result<Self> {
        let batch_size = match options.get_i64("BATCH_SIZE")? {
            Some(n) => n,
            None => defaults.batch_size as i64,
        };
        if !(MIN_BATCH_SIZE as i64..=MAX_BATCH_SIZE as i64).contains(&batch_size) {
            return Err(invalid(
                "BATCH_SIZE",
                format!("must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}, got {batch_size}"),
            ));
        }

        let timeout_secs = match options.get_i64("TIMEOUT")? {
            Some(n) if n <= 0 => {
                return Err(invalid(
                    "TIMEOUT",
                    format!("must be a positive number of seconds, got {n}"),
                ));
            }
            Some(n) => Some(n as u64),
            None => defaults.timeout_secs,
        };

        let memory_limit_mb = match options.get_i64("MEMORY_LIMIT")? {
            Some(n) if n <= 0 => {
                return Err(invalid(
                    "MEMORY_LIMIT",
                    format!("must be a positive number of megabytes, got {n}"),
                ));
            }
            Some(n) => Some(n as u64),
            None => defaults.memory_limit_mb,
        };

        Ok(Self {
            batch_size: batch_size as usize,
            timeout: timeout_secs.map(Duration::from_secs),
            memory_limit_mb,
            dry_run: options.dry_run()?,
            lock_stale_after: Duration::from_secs(defaults.lock_stale_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs_normalizes_keys() {
        let pairs = ["adjustment_type=percentage", "Adjustment_Value=10"];
        let opts = PatchOptions::parse_pairs(pairs).unwrap();
        assert_eq!(opts.get("ADJUSTMENT_TYPE"), Some("percentage"));
        assert_eq!(opts.get("adjustment_value"), Some("10"));
        assert_eq!(opts.get_f64("ADJUSTMENT_VALUE").unwrap(), Some(10.0));
    }

    #[test]
    fn test_parse_pairs_rejects_missing_equals() {
        let err = PatchOptions::parse_pairs(["DRY_RUN"]).unwrap_err();
        assert!(matches!(err, StockrxError::MalformedOption(_)));
        assert!(PatchOptions::parse_pairs(["=5"]).is_err());
    }

    #[test]
    fn test_value_may_contain_equals() {
        let opts = PatchOptions::parse_pairs(["CATEGORY=a=b"]).unwrap();
        assert_eq!(opts.get("CATEGORY"), Some("a=b"));
    }

    #[test]
    fn test_typed_getters_report_option_name() {
        let opts = PatchOptions::new()
            .with("GRACE_PERIOD", "soon")
            .with("DRY_RUN", "maybe")
            .with("EXPIRY_DATE", "2024-13-01");

        let err = opts.get_i64("GRACE_PERIOD").unwrap_err();
        assert!(err.to_string().contains("grace_period"));
        assert!(opts.get_bool("DRY_RUN").is_err());
        assert!(opts.get_date("EXPIRY_DATE").is_err());
        assert_eq!(opts.get_i64("WARNING_DAYS").unwrap(), None);
    }

    #[test]
    fn test_require_missing() {
        let err = PatchOptions::new().require("ADJUSTMENT_TYPE").unwrap_err();
        assert!(matches!(err, StockrxError::MissingOption(ref k) if k == "adjustment_type"));
    }

    #[test]
    fn test_execution_defaults() {
        let defaults = PatchesConfig::default();
        let exec = ExecutionOptions::resolve(&PatchOptions::new(), &defaults).unwrap();
        assert_eq!(exec.batch_size, DEFAULT_BATCH_SIZE);
        assert!(exec.timeout.is_none());
        assert!(!exec.dry_run);
    }

    #[test]
    fn test_execution_overrides() {
        let opts = PatchOptions::parse_pairs([
            "BATCH_SIZE=250",
            "TIMEOUT=30",
            "MEMORY_LIMIT=512",
            "DRY_RUN=true",
        ])
        .unwrap();
        let exec = ExecutionOptions::resolve(&opts, &PatchesConfig::default()).unwrap();
        assert_eq!(exec.batch_size, 250);
        assert_eq!(exec.timeout, Some(Duration::from_secs(30)));
        assert_eq!(exec.memory_limit_mb, Some(512));
        assert!(exec.dry_run);
    }

    #[test]
    fn test_batch_size_bounds() {
        let defaults = PatchesConfig::default();
        for bad in ["0", "10001", "-5"] {
            let opts = PatchOptions::new().with("BATCH_SIZE", bad);
            let err = ExecutionOptions::resolve(&opts, &defaults).unwrap_err();
            assert!(err.is_validation(), "BATCH_SIZE={bad} should be rejected");
        }
        let opts = PatchOptions::new().with("BATCH_SIZE", "10000");
        assert!(ExecutionOptions::resolve(&opts, &defaults).is_ok());
    }

    #[test]
    fn test_options_json_snapshot() {
        let opts = PatchOptions::new().with("b", "2").with("a", "1");
        assert_eq!(opts.to_json(), r#"{"A":"1","B":"2"}"#);
    }
}
