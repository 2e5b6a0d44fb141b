// crates/stockrx-ops/src/config/file.rs
// File-based configuration from ~/.stockrx/config.toml

use crate::error::{Result, StockrxError};
use crate::patch::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, MIN_BATCH_SIZE, builtin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::ConfigValidation;

/// Top-level config structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StockrxConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub patches: PatchesConfig,
}

/// Database section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file; overridden by --db / STOCKRX_DB
    pub path: Option<PathBuf>,
}

/// Patch execution defaults, overridable per run with KEY=VALUE options
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PatchesConfig {
    pub batch_size: usize,
    pub timeout_secs: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    /// Locks older than this are considered abandoned
    pub lock_stale_secs: u64,
    /// Per-patch switch; patches not listed are enabled
    pub enabled: BTreeMap<String, bool>,
}

impl Default for PatchesConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: None,
            memory_limit_mb: None,
            lock_stale_secs: 3600,
            enabled: BTreeMap::new(),
        }
    }
}

impl StockrxConfig {
    /// Load config from `path`, falling back to defaults on any problem
    pub fn load(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse config file");
                Self::default()
            }
        }
    }

    /// Like [`load`](Self::load) but parse errors are returned. A missing
    /// file still yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents)
                    .map_err(|e| StockrxError::Config(format!("{}: {e}", path.display())))?;
                debug!(path = %path.display(), "Loaded config from file");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();
        let p = &self.patches;

        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&p.batch_size) {
            validation.add_error(format!(
                "[patches] batch_size must be between {} and {}, got {}",
                MIN_BATCH_SIZE, MAX_BATCH_SIZE, p.batch_size
            ));
        }
        if p.timeout_secs == Some(0) {
            validation.add_error("[patches] timeout_secs must be positive");
        }
        if p.memory_limit_mb == Some(0) {
            validation.add_error("[patches] memory_limit_mb must be positive");
        }

        let known: Vec<&str> = builtin::catalogue().iter().map(|(_, m)| m.name).collect();
        for name in p.enabled.keys() {
            if !known.contains(&name.as_str()) {
                validation.add_warning(format!("[patches.enabled] unknown patch '{}'", name));
            }
        }

        validation
    }

    /// Starter config listing every built-in patch
    pub fn starter_toml() -> String {
        let defaults = PatchesConfig::default();
        let mut out = String::from(
            "# StockRx maintenance configuration\n\
             \n\
             [database]\n\
             # path = \"/var/lib/stockrx/stockrx.db\"\n\
             \n\
             [patches]\n",
        );
        out.push_str(&format!("batch_size = {}\n", defaults.batch_size));
        out.push_str("# timeout_secs = 3600\n");
        out.push_str("# memory_limit_mb = 512\n");
        out.push_str(&format!("lock_stale_secs = {}\n", defaults.lock_stale_secs));
        out.push_str("\n[patches.enabled]\n");
        for (_, meta) in builtin::catalogue() {
            out.push_str(&format!("{} = true\n", meta.name));
        }
        out
    }

    /// Write the starter config. Refuses to overwrite unless `force`.
    pub fn write_starter(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(StockrxError::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::starter_toml())?;
        Ok(())
    }
}
