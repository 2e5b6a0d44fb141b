// crates/stockrx-ops/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use crate::utils::parse_bool;
use std::path::PathBuf;
use tracing::{Level, debug, info, warn};

/// Configuration validation result
#[derive(Debug)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for ConfigValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Fold another validation's findings into this one
    pub fn merge(&mut self, other: ConfigValidation) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Environment configuration - all env vars in one place
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// Data directory override (STOCKRX_HOME); defaults to ~/.stockrx
    pub home: Option<PathBuf>,
    /// Log level (STOCKRX_LOG_LEVEL): error, warn, info, debug, trace
    pub log_level: Option<String>,
    /// Skip confirmation prompts (STOCKRX_ASSUME_YES)
    pub assume_yes: bool,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup)
    pub fn load() -> Self {
        let config = Self {
            home: read_var("STOCKRX_HOME").map(PathBuf::from),
            log_level: read_var("STOCKRX_LOG_LEVEL"),
            assume_yes: parse_bool_env("STOCKRX_ASSUME_YES").unwrap_or(false),
        };
        debug!(?config, "Loaded environment configuration");
        config
    }

    /// Directory holding the database and config file
    pub fn data_dir(&self) -> PathBuf {
        match &self.home {
            Some(home) => home.clone(),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".stockrx"),
        }
    }

    /// Parsed STOCKRX_LOG_LEVEL, if set and recognized
    pub fn level(&self) -> Option<Level> {
        let raw = self.log_level.as_deref()?;
        match raw.parse::<Level>() {
            Ok(level) => Some(level),
            Err(_) => {
                warn!(value = raw, "Unknown STOCKRX_LOG_LEVEL, using default");
                None
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if let Some(ref level) = self.log_level
            && level.parse::<Level>().is_err()
        {
            validation.add_warning(format!(
                "Unknown STOCKRX_LOG_LEVEL '{}'. Valid options: error, warn, info, debug, trace",
                level
            ));
        }

        if let Some(ref home) = self.home
            && !home.exists()
        {
            validation.add_warning(format!(
                "STOCKRX_HOME {} does not exist yet; it will be created on first use",
                home.display()
            ));
        }

        if self.assume_yes {
            info!("STOCKRX_ASSUME_YES is set - confirmation prompts disabled");
        }

        validation
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool_env(name: &str) -> Option<bool> {
    parse_bool(&std::env::var(name).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_override() {
        let config = EnvConfig {
            home: Some(PathBuf::from("/srv/stockrx")),
            ..Default::default()
        };
        assert_eq!(config.data_dir(), PathBuf::from("/srv/stockrx"));
    }

    #[test]
    fn test_default_data_dir_is_dot_stockrx() {
        let config = EnvConfig::default();
        assert!(config.data_dir().ends_with(".stockrx"));
    }

    #[test]
    fn test_level_parsing() {
        let config = EnvConfig {
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        assert_eq!(config.level(), Some(Level::DEBUG));

        let config = EnvConfig {
            log_level: Some("chatty".to_string()),
            ..Default::default()
        };
        assert_eq!(config.level(), None);
        assert!(!config.validate().warnings.is_empty());
    }

    #[test]
    fn test_validation_default_is_clean() {
        let validation = EnvConfig::default().validate();
        assert!(validation.is_valid());
        assert_eq!(validation.report(), "Configuration OK");
    }
}
