//! The attempt model: the unit of evidence produced by one probe invocation.
//!
//! An [`Attempt`] carries the prompts actually sent to the target model, the
//! completions that came back, every detector's per-output scores, and the
//! primary detector chosen from them. Attempts move through a small state
//! machine (`New → Running → {Complete, Error, Skipped}`) and are frozen
//! once terminal.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle status of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Created, no prompt attached yet.
    New,
    /// First prompt attached; generation/detection underway.
    Running,
    /// Probe and all detectors finished without error.
    Complete,
    /// A generator or detector call failed, or the deadline passed.
    Error,
    /// Dropped by a pre-filter before execution.
    Skipped,
}

impl AttemptStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptStatus::Complete | AttemptStatus::Error | AttemptStatus::Skipped
        )
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttemptStatus::New => "new",
            AttemptStatus::Running => "running",
            AttemptStatus::Complete => "complete",
            AttemptStatus::Error => "error",
            AttemptStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A tool invocation recorded by an agent probe, carried through attempt
/// metadata under the `"tool_calls"` key for agent detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name, e.g. `"execute_shell"`.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub args: HashMap<String, Value>,
}

/// One probe invocation's evidence record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// Unique id, assigned on creation.
    pub id: Uuid,
    /// Fully qualified probe name, e.g. `"dan.Dan1"`.
    pub probe: String,
    /// Fully qualified generator name; stamped by the harness if the probe
    /// left it empty.
    pub generator: String,
    /// Ordered user-facing prompts actually sent to the model.
    pub prompts: Vec<String>,
    /// Ordered model completions.
    pub outputs: Vec<String>,
    /// Per-detector score vectors; each has one score per output.
    pub detector_results: BTreeMap<String, Vec<f64>>,
    /// Name of the primary detector.
    pub detector: Option<String>,
    /// The primary detector's score vector.
    pub scores: Vec<f64>,
    /// Free-form metadata handed from probe to detector.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Lifecycle status.
    pub status: AttemptStatus,
    /// Failure description; present iff status is `Error`.
    pub error: Option<String>,
    /// When the first prompt was attached.
    pub started_at: Option<DateTime<Utc>>,
    /// When the attempt reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Attempt {
    /// Creates a fresh attempt for the named probe.
    pub fn new(probe: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            probe: probe.into(),
            generator: String::new(),
            prompts: Vec::new(),
            outputs: Vec::new(),
            detector_results: BTreeMap::new(),
            detector: None,
            scores: Vec::new(),
            metadata: HashMap::new(),
            status: AttemptStatus::New,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Attaches a prompt. The first prompt moves the attempt to `Running`.
    ///
    /// Ignored once the attempt is terminal.
    pub fn add_prompt(&mut self, prompt: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.prompts.push(prompt.into());
        if self.status == AttemptStatus::New {
            self.status = AttemptStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Appends a model completion. Ignored once terminal.
    pub fn add_output(&mut self, output: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.outputs.push(output.into());
    }

    /// Records one detector's score vector. Ignored once terminal.
    pub fn record_detector(&mut self, detector: impl Into<String>, scores: Vec<f64>) {
        if self.status.is_terminal() {
            return;
        }
        self.detector_results.insert(detector.into(), scores);
    }

    /// Sets a metadata entry. Ignored once terminal.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        if self.status.is_terminal() {
            return;
        }
        self.metadata.insert(key.into(), value);
    }

    /// Marks the attempt complete. No-op if already terminal.
    pub fn mark_complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = AttemptStatus::Complete;
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    /// Marks the attempt failed with the given error text.
    pub fn mark_error(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = AttemptStatus::Error;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Marks the attempt skipped by a pre-filter.
    pub fn mark_skipped(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = AttemptStatus::Skipped;
        self.finished_at = Some(Utc::now());
    }

    /// The highest score the primary detector produced, or 0.0.
    pub fn peak_score(&self) -> f64 {
        self.scores.iter().copied().fold(0.0, f64::max)
    }

    /// Extracts [`ToolCall`] records from `metadata["tool_calls"]`.
    ///
    /// Returns an empty list when the key is absent or malformed.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.metadata
            .get("tool_calls")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Stamps the primary detector from the recorded results.
    ///
    /// `detector_order` is the detector registration order. The primary is
    /// the first detector whose vector contains the maximal observed score
    /// (strict greater-than comparisons, so ties favour the earlier
    /// detector). If every maximum is zero, the first detector that
    /// produced any score is kept.
    pub fn stamp_primary(&mut self, detector_order: &[String]) {
        if self.status.is_terminal() {
            return;
        }
        let mut max_score = 0.0_f64;
        let mut primary: Option<&String> = None;
        for name in detector_order {
            let Some(scores) = self.detector_results.get(name) else {
                continue;
            };
            let peak = scores.iter().copied().fold(0.0, f64::max);
            if peak > max_score {
                max_score = peak;
                primary = Some(name);
            }
        }
        let primary = primary.or_else(|| {
            detector_order
                .iter()
                .find(|name| self.detector_results.contains_key(*name))
        });
        if let Some(name) = primary {
            self.detector = Some(name.clone());
            self.scores = self.detector_results[name].clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_attempt_defaults() {
        let attempt = Attempt::new("test.Test");
        assert_eq!(attempt.status, AttemptStatus::New);
        assert_eq!(attempt.probe, "test.Test");
        assert!(attempt.generator.is_empty());
        assert!(attempt.error.is_none());
        assert!(attempt.started_at.is_none());
    }

    #[test]
    fn test_first_prompt_starts_running() {
        let mut attempt = Attempt::new("test.Test");
        attempt.add_prompt("hello");
        assert_eq!(attempt.status, AttemptStatus::Running);
        assert!(attempt.started_at.is_some());

        attempt.add_prompt("again");
        assert_eq!(attempt.prompts.len(), 2);
        assert_eq!(attempt.status, AttemptStatus::Running);
    }

    #[test]
    fn test_terminal_states_freeze() {
        let mut attempt = Attempt::new("test.Test");
        attempt.add_prompt("p");
        attempt.add_output("o");
        attempt.record_detector("always.Pass", vec![1.0]);
        attempt.mark_complete();
        assert_eq!(attempt.status, AttemptStatus::Complete);
        assert!(attempt.finished_at.is_some());

        // Frozen: mutations after a terminal status are ignored.
        attempt.add_prompt("late");
        attempt.add_output("late");
        attempt.record_detector("always.Fail", vec![0.0]);
        attempt.mark_error("late failure");

        assert_eq!(attempt.prompts, vec!["p"]);
        assert_eq!(attempt.outputs, vec!["o"]);
        assert_eq!(attempt.detector_results.len(), 1);
        assert_eq!(attempt.status, AttemptStatus::Complete);
        assert!(attempt.error.is_none());
    }

    #[test]
    fn test_error_state_carries_message() {
        let mut attempt = Attempt::new("test.Test");
        attempt.add_prompt("p");
        attempt.mark_error("backend exploded");
        assert_eq!(attempt.status, AttemptStatus::Error);
        assert_eq!(attempt.error.as_deref(), Some("backend exploded"));
    }

    #[test]
    fn test_skip() {
        let mut attempt = Attempt::new("test.Test");
        attempt.mark_skipped();
        assert_eq!(attempt.status, AttemptStatus::Skipped);
        assert!(attempt.status.is_terminal());
    }

    #[test]
    fn test_stamp_primary_picks_highest() {
        let mut attempt = Attempt::new("test.Test");
        attempt.add_prompt("p");
        attempt.add_output("o1");
        attempt.add_output("o2");
        attempt.record_detector("a.Low", vec![0.2, 0.1]);
        attempt.record_detector("b.High", vec![0.0, 0.9]);

        let order = vec!["a.Low".to_string(), "b.High".to_string()];
        attempt.stamp_primary(&order);

        assert_eq!(attempt.detector.as_deref(), Some("b.High"));
        assert_eq!(attempt.scores, vec![0.0, 0.9]);
    }

    #[test]
    fn test_stamp_primary_tie_prefers_earlier() {
        let mut attempt = Attempt::new("test.Test");
        attempt.add_prompt("p");
        attempt.add_output("o");
        attempt.record_detector("b.Second", vec![0.7]);
        attempt.record_detector("a.First", vec![0.7]);

        // Registration order, not map order, breaks the tie.
        let order = vec!["b.Second".to_string(), "a.First".to_string()];
        attempt.stamp_primary(&order);
        assert_eq!(attempt.detector.as_deref(), Some("b.Second"));
    }

    #[test]
    fn test_stamp_primary_all_zero_keeps_first() {
        let mut attempt = Attempt::new("test.Test");
        attempt.add_prompt("p");
        attempt.add_output("o");
        attempt.record_detector("a.First", vec![0.0]);
        attempt.record_detector("b.Second", vec![0.0]);

        let order = vec!["a.First".to_string(), "b.Second".to_string()];
        attempt.stamp_primary(&order);
        assert_eq!(attempt.detector.as_deref(), Some("a.First"));
        assert_eq!(attempt.scores, vec![0.0]);
    }

    #[test]
    fn test_tool_calls_extraction() {
        let mut attempt = Attempt::new("tool.ShellEscalation");
        attempt.set_metadata(
            "tool_calls",
            json!([
                {"name": "read_file", "args": {"path": "/etc/passwd"}},
                {"name": "execute_shell"},
            ]),
        );

        let calls = attempt.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[1].name, "execute_shell");
        assert!(calls[1].args.is_empty());
    }

    #[test]
    fn test_tool_calls_absent_or_malformed() {
        let attempt = Attempt::new("test.Test");
        assert!(attempt.tool_calls().is_empty());

        let mut attempt = Attempt::new("test.Test");
        attempt.set_metadata("tool_calls", json!("not a list"));
        assert!(attempt.tool_calls().is_empty());
    }

    #[test]
    fn test_peak_score() {
        let mut attempt = Attempt::new("test.Test");
        assert!((attempt.peak_score() - 0.0).abs() < f64::EPSILON);
        attempt.scores = vec![0.1, 0.8, 0.3];
        assert!((attempt.peak_score() - 0.8).abs() < f64::EPSILON);
    }
}
