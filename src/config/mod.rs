//! Layered configuration for the scanner front-end.
//!
//! Precedence, highest first: CLI flags (applied by the caller) >
//! `AUGUSTUS_*` environment variables > YAML config file > built-in
//! defaults. A named profile from the file's `profiles` section is merged
//! over the base document before env and flags take effect.
//!
//! Environment encoding: `AUGUSTUS_A__B` addresses `a.b` — a double
//! underscore separates path segments, a single underscore is a literal
//! part of the key. `${NAME}` inside any string value is replaced with the
//! value of the `NAME` environment variable; an unset variable fails the
//! load with a diagnostic naming it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

use crate::registry::Config as CapabilityConfig;

/// Formats accepted by `output.format`.
const OUTPUT_FORMATS: &[&str] = &["json", "jsonl", "csv", "txt", "table"];

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "AUGUSTUS";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unresolved environment variable '${{{0}}}' in configuration")]
    UnresolvedVar(String),

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// The `run` section: execution knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Cap on attempts per scan; 0 means unlimited.
    pub max_attempts: i64,
    /// In-flight generator call bound; 0 means "use the default".
    pub concurrency: i64,
    /// Per-probe deadline, e.g. `"5m"`.
    pub probe_timeout: Option<String>,
    /// Overall scan deadline, e.g. `"30m"`.
    pub timeout: Option<String>,
    /// Retries per generator call.
    pub retry_count: i64,
    /// First retry delay, e.g. `"1s"`.
    pub retry_backoff: Option<String>,
    /// Harness name.
    pub harness: Option<String>,
    /// Settings bag forwarded to the harness factory (e.g. agent
    /// capability flags for the agentwise harness).
    pub harness_settings: HashMap<String, serde_json::Value>,
}

/// A capability section: per-name settings bags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionConfig {
    /// Settings keyed by capability name, forwarded verbatim to the
    /// factory.
    pub settings: HashMap<String, HashMap<String, serde_json::Value>>,
}

impl SectionConfig {
    /// The settings bag for one capability.
    pub fn bag(&self, name: &str) -> CapabilityConfig {
        self.settings
            .get(name)
            .cloned()
            .map(CapabilityConfig::from_map)
            .unwrap_or_default()
    }

    /// All settings bags, keyed by capability name.
    pub fn bags(&self) -> HashMap<String, CapabilityConfig> {
        self.settings
            .iter()
            .map(|(name, bag)| (name.clone(), CapabilityConfig::from_map(bag.clone())))
            .collect()
    }
}

/// The `output` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// One of `json`, `jsonl`, `csv`, `txt`, `table`.
    pub format: Option<String>,
    /// JSONL output file path.
    pub file: Option<String>,
    /// HTML report file path.
    pub html: Option<String>,
}

/// The full configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AugustusConfig {
    pub run: RunConfig,
    /// Per-generator settings bags, keyed by generator name.
    pub generators: HashMap<String, HashMap<String, serde_json::Value>>,
    pub probes: SectionConfig,
    pub detectors: SectionConfig,
    pub buffs: SectionConfig,
    pub output: OutputConfig,
    /// Named partial configurations merged over the base on request.
    pub profiles: HashMap<String, Value>,
}

impl AugustusConfig {
    /// The settings bag for one generator.
    pub fn generator_bag(&self, name: &str) -> CapabilityConfig {
        self.generators
            .get(name)
            .cloned()
            .map(CapabilityConfig::from_map)
            .unwrap_or_default()
    }

    /// Validates the document.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.max_attempts < 0 {
            return Err(ConfigError::ValidationFailed(
                "run.max_attempts must be >= 0".to_string(),
            ));
        }
        if self.run.concurrency < 0 {
            return Err(ConfigError::ValidationFailed(
                "run.concurrency must be >= 0".to_string(),
            ));
        }
        if self.run.retry_count < 0 {
            return Err(ConfigError::ValidationFailed(
                "run.retry_count must be >= 0".to_string(),
            ));
        }
        for key in ["probe_timeout", "timeout", "retry_backoff"] {
            let value = match key {
                "probe_timeout" => &self.run.probe_timeout,
                "timeout" => &self.run.timeout,
                _ => &self.run.retry_backoff,
            };
            if let Some(text) = value {
                parse_duration(text).map_err(|_| ConfigError::InvalidValue {
                    key: format!("run.{key}"),
                    message: format!("'{text}' is not a valid duration"),
                })?;
            }
        }

        for (name, bag) in &self.generators {
            if let Some(temperature) = bag.get("temperature").and_then(|v| v.as_f64()) {
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(ConfigError::ValidationFailed(format!(
                        "generators.{name}.temperature must be between 0 and 2"
                    )));
                }
            }
        }

        if let Some(format) = &self.output.format {
            if !OUTPUT_FORMATS.contains(&format.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "output.format '{}' must be one of {}",
                    format,
                    OUTPUT_FORMATS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Parses a human duration (`"30m"`, `"1500ms"`); a bare number is seconds.
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(text).map_err(|e| ConfigError::InvalidValue {
        key: "duration".to_string(),
        message: e.to_string(),
    })
}

/// Builder assembling a configuration from file, profile and environment.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    inline: Option<String>,
    profile: Option<String>,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            env_prefix: ENV_PREFIX.to_string(),
            ..Self::default()
        }
    }

    /// Reads the base document from a YAML file.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Reads the base document from an inline YAML/JSON string.
    pub fn with_inline(mut self, document: impl Into<String>) -> Self {
        self.inline = Some(document.into());
        self
    }

    /// Merges the named profile over the base document.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Overrides the environment prefix (tests use unique prefixes).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Loads, layers and validates the configuration.
    pub fn load(&self) -> Result<AugustusConfig, ConfigError> {
        let mut document = self.base_document()?;

        if let Some(profile) = &self.profile {
            let overlay = lookup_profile(&document, profile)
                .ok_or_else(|| ConfigError::UnknownProfile(profile.clone()))?;
            merge_value(&mut document, overlay);
        }

        self.apply_env_overrides(&mut document)?;
        interpolate_env(&mut document)?;

        let config: AugustusConfig = serde_yaml::from_value(document)?;
        config.validate()?;
        Ok(config)
    }

    fn base_document(&self) -> Result<Value, ConfigError> {
        let text = if let Some(path) = &self.file {
            std::fs::read_to_string(path)?
        } else if let Some(inline) = &self.inline {
            inline.clone()
        } else {
            return Ok(Value::Mapping(Default::default()));
        };
        let value: Value = serde_yaml::from_str(&text)?;
        Ok(value)
    }

    fn apply_env_overrides(&self, document: &mut Value) -> Result<(), ConfigError> {
        let prefix = format!("{}_", self.env_prefix);
        for (key, raw) in std::env::vars() {
            let Some(path) = key.strip_prefix(&prefix) else {
                continue;
            };
            // `__` separates path segments; single underscores stay literal.
            let segments: Vec<String> = path
                .split("__")
                .map(|segment| segment.to_lowercase())
                .collect();
            if segments.iter().any(String::is_empty) {
                continue;
            }
            // Scalars keep their YAML type (numbers, booleans); anything
            // unparseable stays a string.
            let value: Value =
                serde_yaml::from_str(&raw).unwrap_or(Value::String(raw.clone()));
            set_path(document, &segments, value);
        }
        Ok(())
    }
}

fn lookup_profile(document: &Value, profile: &str) -> Option<Value> {
    document
        .get("profiles")
        .and_then(|profiles| profiles.get(profile))
        .cloned()
}

/// Deep-merges `overlay` into `base`; mappings merge key-wise, everything
/// else replaces.
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay) => *base_slot = overlay,
    }
}

/// Sets a dotted path inside a YAML mapping tree, creating intermediate
/// mappings as needed.
fn set_path(document: &mut Value, segments: &[String], value: Value) {
    if segments.is_empty() {
        return;
    }
    if !matches!(document, Value::Mapping(_)) {
        *document = Value::Mapping(Default::default());
    }
    let Value::Mapping(map) = document else {
        unreachable!();
    };
    let key = Value::String(segments[0].clone());
    if segments.len() == 1 {
        map.insert(key, value);
        return;
    }
    let child = map
        .entry(key)
        .or_insert_with(|| Value::Mapping(Default::default()));
    set_path(child, &segments[1..], value);
}

/// Replaces `${NAME}` in every string scalar with `env(NAME)`.
fn interpolate_env(document: &mut Value) -> Result<(), ConfigError> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern");
    interpolate_value(document, &pattern)
}

fn interpolate_value(value: &mut Value, pattern: &Regex) -> Result<(), ConfigError> {
    match value {
        Value::String(text) => {
            let mut resolved = text.clone();
            for capture in pattern.captures_iter(text) {
                let name = &capture[1];
                let replacement = std::env::var(name)
                    .map_err(|_| ConfigError::UnresolvedVar(name.to_string()))?;
                resolved = resolved.replace(&capture[0], &replacement);
            }
            *text = resolved;
            Ok(())
        }
        Value::Sequence(items) => {
            for item in items {
                interpolate_value(item, pattern)?;
            }
            Ok(())
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_value(item, pattern)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_when_nothing_configured() {
        let config = ConfigLoader::new()
            .with_env_prefix("AUGTEST_DEFAULTS")
            .load()
            .unwrap();
        assert_eq!(config.run.concurrency, 0);
        assert_eq!(config.run.max_attempts, 0);
        assert!(config.output.format.is_none());
        assert!(config.generators.is_empty());
    }

    #[test]
    fn test_file_values_loaded() {
        let file = write_config(
            "run:\n  concurrency: 4\n  probe_timeout: 2m\noutput:\n  format: jsonl\n",
        );
        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_env_prefix("AUGTEST_FILE")
            .load()
            .unwrap();
        assert_eq!(config.run.concurrency, 4);
        assert_eq!(config.run.probe_timeout.as_deref(), Some("2m"));
        assert_eq!(config.output.format.as_deref(), Some("jsonl"));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config("run:\n  concurrency: 4\n");
        std::env::set_var("AUGTEST_ENVPREC_RUN__CONCURRENCY", "7");
        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_env_prefix("AUGTEST_ENVPREC")
            .load()
            .unwrap();
        std::env::remove_var("AUGTEST_ENVPREC_RUN__CONCURRENCY");
        assert_eq!(config.run.concurrency, 7);
    }

    #[test]
    fn test_env_single_underscore_is_literal() {
        std::env::set_var("AUGTEST_LITERAL_RUN__MAX_ATTEMPTS", "9");
        let config = ConfigLoader::new()
            .with_env_prefix("AUGTEST_LITERAL")
            .load()
            .unwrap();
        std::env::remove_var("AUGTEST_LITERAL_RUN__MAX_ATTEMPTS");
        assert_eq!(config.run.max_attempts, 9);
    }

    #[test]
    fn test_profile_merges_over_base() {
        let file = write_config(
            "run:\n  concurrency: 4\n  retry_count: 1\nprofiles:\n  fast:\n    run:\n      concurrency: 20\n",
        );
        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_profile("fast")
            .with_env_prefix("AUGTEST_PROFILE")
            .load()
            .unwrap();
        assert_eq!(config.run.concurrency, 20);
        // Keys the profile does not set survive from the base.
        assert_eq!(config.run.retry_count, 1);
    }

    #[test]
    fn test_unknown_profile_is_error() {
        let file = write_config("run:\n  concurrency: 4\n");
        let err = ConfigLoader::new()
            .with_file(file.path())
            .with_profile("absent")
            .with_env_prefix("AUGTEST_NOPROFILE")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn test_interpolation_resolves() {
        std::env::set_var("AUGTEST_INTERP_MODEL", "gpt-test");
        let file = write_config(
            "generators:\n  openai.OpenAI:\n    model: \"${AUGTEST_INTERP_MODEL}\"\n",
        );
        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_env_prefix("AUGTEST_INTERP")
            .load()
            .unwrap();
        std::env::remove_var("AUGTEST_INTERP_MODEL");
        let bag = config.generator_bag("openai.OpenAI");
        assert_eq!(bag.get_string("model", ""), "gpt-test");
    }

    #[test]
    fn test_interpolation_unset_var_fails_with_name() {
        let file = write_config(
            "generators:\n  openai.OpenAI:\n    api_key: \"${AUGTEST_NO_SUCH_VAR_XYZ}\"\n",
        );
        let err = ConfigLoader::new()
            .with_file(file.path())
            .with_env_prefix("AUGTEST_UNSET")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("AUGTEST_NO_SUCH_VAR_XYZ"));
    }

    #[test]
    fn test_validation_temperature_range() {
        let file = write_config("generators:\n  openai.OpenAI:\n    temperature: 3.5\n");
        let err = ConfigLoader::new()
            .with_file(file.path())
            .with_env_prefix("AUGTEST_TEMP")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_validation_output_format() {
        let file = write_config("output:\n  format: yaml\n");
        let err = ConfigLoader::new()
            .with_file(file.path())
            .with_env_prefix("AUGTEST_FMT")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("output.format"));
    }

    #[test]
    fn test_validation_bad_duration() {
        let file = write_config("run:\n  probe_timeout: not-a-duration\n");
        let err = ConfigLoader::new()
            .with_file(file.path())
            .with_env_prefix("AUGTEST_DUR")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("probe_timeout"));
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        // A bare number is seconds.
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("nope").is_err());
    }

    #[test]
    fn test_section_bags() {
        let file = write_config(
            "buffs:\n  settings:\n    paraphrase.Paraphrase:\n      rate_limit: 5\n      variants: 2\n",
        );
        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_env_prefix("AUGTEST_BAGS")
            .load()
            .unwrap();
        let bag = config.buffs.bag("paraphrase.Paraphrase");
        assert_eq!(bag.get_i64("variants", 0), 2);
        assert!((bag.get_f64("rate_limit", 0.0) - 5.0).abs() < f64::EPSILON);
        assert!(config.buffs.bag("missing.Buff").is_empty());
    }

    #[test]
    fn test_harness_settings_bag() {
        let file = write_config(
            "run:\n  harness: agentwise.Agentwise\n  harness_settings:\n    has_tools: true\n",
        );
        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_env_prefix("AUGTEST_HARNESS")
            .load()
            .unwrap();
        assert_eq!(config.run.harness.as_deref(), Some("agentwise.Agentwise"));
        assert_eq!(
            config.run.harness_settings.get("has_tools"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[test]
    fn test_inline_json_document() {
        // JSON is a YAML subset; the --config path feeds through here.
        let config = ConfigLoader::new()
            .with_inline(r#"{"run": {"concurrency": 2}}"#)
            .with_env_prefix("AUGTEST_INLINE")
            .load()
            .unwrap();
        assert_eq!(config.run.concurrency, 2);
    }
}
