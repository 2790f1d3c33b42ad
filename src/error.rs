//! Error types for augustus operations.
//!
//! One error enum per subsystem:
//! - Capability registry lookup and construction
//! - Generator backends (transient vs permanent failures)
//! - Probe execution
//! - Detector scoring
//! - Buff chains
//! - The scan core
//! - Evaluator sinks

use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The requested capability name is not registered.
    #[error("{kind} '{name}' not found in registry")]
    NotFound { kind: &'static str, name: String },

    /// The factory for a registered capability failed.
    #[error("failed to construct {kind} '{name}': {source}")]
    Factory {
        kind: &'static str,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A config key was missing or had the wrong type.
    #[error("missing or invalid config key '{0}'")]
    MissingKey(String),
}

/// Errors that can occur when calling a generator backend.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("missing API key: {0} environment variable not set")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("failed to parse generator response: {0}")]
    ParseError(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("generation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeneratorError {
    /// Whether the failure is worth retrying.
    ///
    /// Rate limits, 5xx responses and network-level faults are transient;
    /// authentication failures, bad requests and cancellation are not.
    pub fn is_transient(&self) -> bool {
        match self {
            GeneratorError::RateLimited(_) => true,
            GeneratorError::Api { code, .. } => *code >= 500 || *code == 429,
            GeneratorError::RequestFailed(msg) => {
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("Connection refused")
            }
            _ => false,
        }
    }
}

/// Errors that can occur while a probe runs against a generator.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("buff error: {0}")]
    Buff(#[from] BuffError),

    #[error("probe cancelled")]
    Cancelled,
}

/// Errors that can occur while a detector scores an attempt.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Attempt metadata did not have the shape the detector requires.
    #[error("invalid attempt metadata: {0}")]
    InvalidMetadata(String),

    /// A judge-model roundtrip failed.
    #[error("judge generator error: {0}")]
    Judge(#[from] GeneratorError),

    #[error("detection cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Errors that can occur inside a buff chain.
#[derive(Debug, Error)]
pub enum BuffError {
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("buff produced no variants")]
    NoVariants,

    #[error("buff cancelled")]
    Cancelled,
}

/// Errors that can occur in the scan core.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("at least one --probe, --probes-glob, or --all required")]
    NoProbeSelector,

    #[error("no {kind} match pattern: {pattern}")]
    EmptySelection { kind: &'static str, pattern: String },

    #[error("no probes applicable to the configured agent capabilities")]
    NoProbes,

    #[error("probe '{probe}' failed: {source}")]
    Probe {
        probe: String,
        #[source]
        source: ProbeError,
    },

    #[error("detector '{detector}' failed: {source}")]
    Detector {
        detector: String,
        #[source]
        source: DetectorError,
    },

    #[error("scan cancelled")]
    Cancelled,

    #[error("evaluator failed: {0}")]
    Evaluator(#[from] EvalError),

    #[error("invalid scan request: {0}")]
    Validation(String),
}

/// Errors that can occur in an evaluator sink.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GeneratorError::RateLimited("slow down".to_string()).is_transient());
        assert!(GeneratorError::Api {
            code: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(GeneratorError::Api {
            code: 429,
            message: "rate".to_string()
        }
        .is_transient());
        assert!(GeneratorError::RequestFailed("connection reset".to_string()).is_transient());

        assert!(!GeneratorError::Auth("bad key".to_string()).is_transient());
        assert!(!GeneratorError::Api {
            code: 400,
            message: "bad request".to_string()
        }
        .is_transient());
        assert!(!GeneratorError::Cancelled.is_transient());
    }

    #[test]
    fn test_scan_error_messages() {
        let err = ScanError::NoProbeSelector;
        assert!(err
            .to_string()
            .contains("at least one --probe, --probes-glob, or --all required"));

        let err = ScanError::EmptySelection {
            kind: "probes",
            pattern: "nomatch.*".to_string(),
        };
        assert_eq!(err.to_string(), "no probes match pattern: nomatch.*");

        let err = ScanError::Detector {
            detector: "judge.HarmJudge".to_string(),
            source: DetectorError::Other("boom".to_string()),
        };
        assert!(err.to_string().contains("judge.HarmJudge"));
    }

    #[test]
    fn test_registry_not_found_message() {
        let err = RegistryError::NotFound {
            kind: "probe",
            name: "dan.Dan99".to_string(),
        };
        assert!(err.to_string().contains("dan.Dan99"));
        assert!(err.to_string().contains("not found"));
    }
}
