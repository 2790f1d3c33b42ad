//! Capability registry: a typed, concurrent name → factory store.
//!
//! One registry instance exists per capability kind (generators, probes,
//! detectors, buffs, harnesses). Capabilities self-register through the
//! per-kind `register_builtin` functions, which the binary invokes once at
//! startup via [`crate::register_builtins`].
//!
//! Registration is idempotent: re-registering a name replaces the factory
//! without changing the count. Listing is case-sensitive ascending and
//! stable between mutations.

pub mod config;

pub use config::{Config, ConfigValue};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::RegistryError;

/// A capability factory: dynamic config bag in, instance out.
pub type Factory<T> = Arc<dyn Fn(&Config) -> Result<T, anyhow::Error> + Send + Sync>;

/// Cached metadata about a registered capability.
#[derive(Debug, Clone)]
pub struct PluginMeta {
    /// Fully qualified capability name, e.g. `"dan.Dan1"`.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Whether the capability is selectable.
    pub active: bool,
    /// Content hash of the plugin source, when known.
    pub file_hash: Option<String>,
    /// Time spent loading the plugin.
    pub load_time: Duration,
    /// When this metadata entry was recorded.
    pub cached_at: DateTime<Utc>,
}

impl PluginMeta {
    /// Creates metadata for a capability registered just now.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            active: true,
            file_hash: None,
            load_time: Duration::ZERO,
            cached_at: Utc::now(),
        }
    }
}

struct Entry<T> {
    factory: Factory<T>,
    meta: PluginMeta,
}

/// A concurrent name → factory store for one capability kind.
///
/// Reads vastly outnumber writes after process init, so a single
/// reader-writer lock over the map is sufficient.
pub struct Registry<T> {
    kind: &'static str,
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T> Registry<T> {
    /// Creates an empty registry for the given capability kind.
    ///
    /// `kind` appears in error messages ("probe", "generator", ...).
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The capability kind this registry holds.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Registers a factory under `name`.
    ///
    /// Idempotent: a later registration replaces the earlier factory
    /// without changing the registered count.
    pub fn register(&self, name: impl Into<String>, factory: Factory<T>) {
        let name = name.into();
        let meta = PluginMeta::new(name.clone(), "");
        self.register_with_meta(name, factory, meta);
    }

    /// Registers a factory together with its metadata.
    pub fn register_with_meta(
        &self,
        name: impl Into<String>,
        factory: Factory<T>,
        meta: PluginMeta,
    ) {
        let name = name.into();
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.insert(name, Entry { factory, meta });
    }

    /// Looks up the factory registered under `name`.
    pub fn get(&self, name: &str) -> Option<Factory<T>> {
        let entries = self.entries.read().expect("registry lock poisoned");
        entries.get(name).map(|e| Arc::clone(&e.factory))
    }

    /// Looks up the cached metadata for `name`.
    pub fn meta(&self, name: &str) -> Option<PluginMeta> {
        let entries = self.entries.read().expect("registry lock poisoned");
        entries.get(name).map(|e| e.meta.clone())
    }

    /// Constructs an instance of the capability registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the name is absent, and
    /// [`RegistryError::Factory`] carrying the factory's own error
    /// otherwise.
    pub fn create(&self, name: &str, config: &Config) -> Result<T, RegistryError> {
        let factory = self.get(name).ok_or_else(|| RegistryError::NotFound {
            kind: self.kind,
            name: name.to_string(),
        })?;
        factory(config).map_err(|source| RegistryError::Factory {
            kind: self.kind,
            name: name.to_string(),
            source,
        })
    }

    /// All registered names, sorted case-sensitively ascending.
    pub fn list(&self) -> Vec<String> {
        let entries = self.entries.read().expect("registry lock poisoned");
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` is registered.
    pub fn has(&self, name: &str) -> bool {
        let entries = self.entries.read().expect("registry lock poisoned");
        entries.contains_key(name)
    }

    /// Number of registered names.
    pub fn count(&self) -> usize {
        let entries = self.entries.read().expect("registry lock poisoned");
        entries.len()
    }
}

/// Wraps a typed factory and a config parser into a dynamic [`Factory`].
///
/// This keeps file-loaded (YAML/JSON) and programmatic construction unified:
/// the registry always stores the dynamic form, while capabilities define a
/// typed config with a `Default` impl and `with_*` options.
pub fn from_map<T, C, P, F>(parser: P, typed: F) -> Factory<T>
where
    P: Fn(&Config) -> Result<C, anyhow::Error> + Send + Sync + 'static,
    F: Fn(C) -> Result<T, anyhow::Error> + Send + Sync + 'static,
{
    Arc::new(move |bag: &Config| {
        let cfg = parser(bag)?;
        typed(cfg)
    })
}
