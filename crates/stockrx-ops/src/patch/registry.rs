// crates/stockrx-ops/src/patch/registry.rs
// Patch registry: identifier -> factory + metadata

use super::{DataPatch, PatchOptions};
use crate::config::file::StockrxConfig;
use crate::error::{Result, StockrxError};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Builds a validated patch from options. Fails before any data access.
pub type PatchFactory = fn(&PatchOptions) -> Result<Box<dyn DataPatch>>;

static PATCH_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // SAFETY: This is a static literal regex pattern; compilation cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z][a-z0-9]*(_[a-z0-9]+)*$").expect("patch name regex")
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::EnumString, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatchCategory {
    Inventory,
    Store,
    Maintenance,
}

impl PatchCategory {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// An option key a patch accepts
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OptionSpec {
    pub key: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub category: PatchCategory,
    pub target_tables: &'static [&'static str],
    pub version: &'static str,
    pub options: &'static [OptionSpec],
}

impl PatchMetadata {
    fn validate(&self, registered_as: &str) -> Result<()> {
        let fail = |reason: &str| {
            Err(StockrxError::InvalidMetadata {
                name: registered_as.to_string(),
                reason: reason.to_string(),
            })
        };

        if !PATCH_NAME_RE.is_match(registered_as) {
            return fail("identifier must be snake_case");
        }
        if self.name != registered_as {
            return fail(&format!("metadata name '{}' does not match", self.name));
        }
        if self.description.trim().is_empty() {
            return fail("description is empty");
        }
        if self.target_tables.is_empty() {
            return fail("no target tables");
        }
        if self.version.trim().is_empty() {
            return fail("version is empty");
        }
        Ok(())
    }
}

#[derive(Clone)]
struct RegisteredPatch {
    factory: PatchFactory,
    metadata: PatchMetadata,
}

/// Registry-level counts for `patch stats`
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub by_category: BTreeMap<&'static str, usize>,
    pub disabled: Vec<String>,
}

/// Maps patch identifiers to factories.
///
/// Constructed explicitly and handed to whoever needs it; holds no state
/// about any execution. `sources` keeps every registered patch so `reload`
/// can rebuild the active set when the config's `enabled` flags change.
#[derive(Default)]
pub struct PatchRegistry {
    sources: BTreeMap<String, RegisteredPatch>,
    active: BTreeMap<String, RegisteredPatch>,
    disabled: Vec<String>,
    config_path: Option<PathBuf>,
}

impl PatchRegistry {
    /// Empty registry with every patch enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in catalogue, all enabled
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        for (factory, metadata) in super::builtin::catalogue() {
            registry.register_patch(metadata.name, factory, metadata)?;
        }
        Ok(registry)
    }

    /// Built-in catalogue filtered by the `[patches.enabled]` table of the
    /// config file at `path`. `reload` re-reads the same file.
    pub fn from_config(path: PathBuf) -> Result<Self> {
        let mut registry = Self::with_builtins()?;
        registry.config_path = Some(path);
        registry.reload()?;
        Ok(registry)
    }

    pub fn register_patch(
        &mut self,
        name: &str,
        factory: PatchFactory,
        metadata: PatchMetadata,
    ) -> Result<()> {
        metadata.validate(name)?;
        if self.sources.contains_key(name) {
            return Err(StockrxError::DuplicatePatch(name.to_string()));
        }

        let entry = RegisteredPatch { factory, metadata };
        if self.disabled.iter().any(|d| d == name) {
            debug!(patch = name, "Registered patch is disabled by config");
        } else {
            self.active.insert(name.to_string(), entry.clone());
        }
        self.sources.insert(name.to_string(), entry);
        Ok(())
    }

    pub fn patch_exists(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    pub fn patch_metadata(&self, name: &str) -> Option<&PatchMetadata> {
        self.active.get(name).map(|p| &p.metadata)
    }

    /// All enabled patches, ascending by name
    pub fn list_patches(&self) -> Vec<(&str, &PatchMetadata)> {
        self.active
            .iter()
            .map(|(name, p)| (name.as_str(), &p.metadata))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Construct a patch. Option validation happens inside the factory.
    pub fn create_patch(&self, name: &str, options: &PatchOptions) -> Result<Box<dyn DataPatch>> {
        let entry = self
            .active
            .get(name)
            .ok_or_else(|| StockrxError::UnknownPatch {
                name: name.to_string(),
                available: self.names(),
            })?;
        (entry.factory)(options)
    }

    /// Rebuild the active set from every registered source, applying the
    /// config file's current `enabled` flags. Returns the active count.
    pub fn reload(&mut self) -> Result<usize> {
        let enabled = match &self.config_path {
            Some(path) => StockrxConfig::load_from(path)?.patches.enabled,
            None => BTreeMap::new(),
        };

        self.active.clear();
        self.disabled.clear();
        for (name, entry) in &self.sources {
            if enabled.get(name).copied().unwrap_or(true) {
                self.active.insert(name.clone(), entry.clone());
            } else {
                self.disabled.push(name.clone());
            }
        }

        info!(
            active = self.active.len(),
            disabled = self.disabled.len(),
            "Patch registry reloaded"
        );
        Ok(self.active.len())
    }

    pub fn stats(&self) -> RegistryStats {
        let mut by_category = BTreeMap::new();
        for entry in self.active.values() {
            let category = entry.metadata.category.as_str();
            *by_category.entry(category).or_insert(0) += 1;
        }
        RegistryStats {
            total: self.active.len(),
            by_category,
            disabled: self.disabled.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::BatchResult;
    use rusqlite::Connection;
    use std::io::Write;

    struct NoopPatch;

    impl DataPatch for NoopPatch {
        fn estimate_target_count(&self, _conn: &Connection) -> Result<u64> {
            Ok(0)
        }
        fn execute_batch(
            &self,
            _conn: &Connection,
            _size: usize,
            _offset: usize,
        ) -> Result<BatchResult> {
            Ok(BatchResult::exhausted())
        }
        fn dry_run(&self) -> bool {
            true
        }
    }

    fn noop_factory(_options: &PatchOptions) -> Result<Box<dyn DataPatch>> {
        Ok(Box::new(NoopPatch))
    }

    fn noop_metadata(name: &'static str) -> PatchMetadata {
        PatchMetadata {
            name,
            description: "Does nothing",
            category: PatchCategory::Maintenance,
            target_tables: &["inventories"],
            version: "1.0.0",
            options: &[],
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PatchRegistry::new();
        registry
            .register_patch("noop", noop_factory, noop_metadata("noop"))
            .unwrap();

        assert!(registry.patch_exists("noop"));
        assert!(!registry.patch_exists("other"));
        assert_eq!(registry.patch_metadata("noop").unwrap().version, "1.0.0");
        assert!(registry.create_patch("noop", &PatchOptions::new()).is_ok());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = PatchRegistry::new();
        registry
            .register_patch("noop", noop_factory, noop_metadata("noop"))
            .unwrap();
        let err = registry
            .register_patch("noop", noop_factory, noop_metadata("noop"))
            .unwrap_err();
        assert!(matches!(err, StockrxError::DuplicatePatch(_)));
    }

    #[test]
    fn test_invalid_metadata_rejected() {
        let mut registry = PatchRegistry::new();

        let err = registry
            .register_patch("NoOp", noop_factory, noop_metadata("NoOp"))
            .unwrap_err();
        assert!(err.to_string().contains("snake_case"));

        let err = registry
            .register_patch("noop", noop_factory, noop_metadata("other"))
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));

        let mut meta = noop_metadata("noop");
        meta.target_tables = &[];
        assert!(registry.register_patch("noop", noop_factory, meta).is_err());

        let mut meta = noop_metadata("noop");
        meta.description = " ";
        assert!(registry.register_patch("noop", noop_factory, meta).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_is_sorted() {
        let mut registry = PatchRegistry::new();
        registry
            .register_patch("zeta", noop_factory, noop_metadata("zeta"))
            .unwrap();
        registry
            .register_patch("alpha", noop_factory, noop_metadata("alpha"))
            .unwrap();
        let names: Vec<&str> = registry.list_patches().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_unknown_patch_lists_registered_names() {
        let registry = PatchRegistry::with_builtins().unwrap();
        let err = registry
            .create_patch("nope", &PatchOptions::new())
            .err()
            .unwrap();
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        for (name, _) in registry.list_patches() {
            assert!(msg.contains(name), "{msg} should list {name}");
        }
    }

    #[test]
    fn test_builtins_stats() {
        let registry = PatchRegistry::with_builtins().unwrap();
        let stats = registry.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_category.get("inventory"), Some(&1));
        assert_eq!(stats.by_category.get("maintenance"), Some(&2));
        assert!(stats.disabled.is_empty());
    }

    #[test]
    fn test_reload_applies_enabled_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[patches.enabled]\nbatch_expiry_update = false").unwrap();

        let mut registry = PatchRegistry::from_config(file.path().to_path_buf()).unwrap();
        assert!(!registry.patch_exists("batch_expiry_update"));
        assert_eq!(
            registry.stats().disabled,
            vec!["batch_expiry_update".to_string()]
        );

        std::fs::write(
            file.path(),
            "[patches.enabled]\nbatch_expiry_update = true\n",
        )
        .unwrap();
        assert_eq!(registry.reload().unwrap(), 3);
        assert!(registry.patch_exists("batch_expiry_update"));
    }

    #[test]
    fn test_reload_keeps_custom_sources() {
        let mut registry = PatchRegistry::with_builtins().unwrap();
        registry
            .register_patch("noop", noop_factory, noop_metadata("noop"))
            .unwrap();
        assert_eq!(registry.reload().unwrap(), 4);
        assert!(registry.patch_exists("noop"));
    }
}
