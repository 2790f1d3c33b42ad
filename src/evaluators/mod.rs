//! Evaluator sinks for completed attempts.
//!
//! All sinks share the single [`Evaluator`] contract. The
//! [`CollectingEvaluator`] composes an inner sink with optional JSONL and
//! HTML file outputs; composition is by containment, every sink keeps the
//! same contract.

pub mod report;

pub use report::{render_html, render_json, render_jsonl, AttemptRecord};

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::attempt::Attempt;
use crate::context::ScanContext;
use crate::error::EvalError;

/// Peak score at or above which an attempt counts as a hit.
const HIT_THRESHOLD: f64 = 0.5;

/// A terminal sink for completed attempts.
///
/// Attempts are read-only at this point and may be shared with several
/// sinks concurrently.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, ctx: &ScanContext, attempts: &[Attempt]) -> Result<(), EvalError>;
}

/// Per-probe aggregation used by the table sink.
#[derive(Debug, Default, Clone)]
struct ProbeSummary {
    attempts: usize,
    hits: usize,
    score_sum: f64,
    score_count: usize,
    errors: usize,
}

/// Prints a per-probe summary table to stdout.
#[derive(Debug, Default)]
pub struct TableEvaluator {
    verbose: bool,
}

impl TableEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also prints one line per attempt.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builds the summary table as a string.
    pub fn summarize(attempts: &[Attempt]) -> String {
        let mut probes: BTreeMap<String, ProbeSummary> = BTreeMap::new();
        for attempt in attempts {
            let summary = probes.entry(attempt.probe.clone()).or_default();
            summary.attempts += 1;
            if attempt.status == crate::attempt::AttemptStatus::Error {
                summary.errors += 1;
            }
            let peak = attempt.peak_score();
            if peak >= HIT_THRESHOLD {
                summary.hits += 1;
            }
            summary.score_sum += peak;
            summary.score_count += 1;
        }

        let mut out = String::new();
        out.push_str(&format!(
            "{:<28} {:>8} {:>6} {:>7} {:>10}\n",
            "probe", "attempts", "hits", "errors", "mean score"
        ));
        for (probe, summary) in &probes {
            let mean = if summary.score_count > 0 {
                summary.score_sum / summary.score_count as f64
            } else {
                0.0
            };
            out.push_str(&format!(
                "{:<28} {:>8} {:>6} {:>7} {:>10.2}\n",
                probe, summary.attempts, summary.hits, summary.errors, mean
            ));
        }
        out.push_str(&format!("total attempts: {}\n", attempts.len()));
        out
    }
}

#[async_trait]
impl Evaluator for TableEvaluator {
    async fn evaluate(&self, _ctx: &ScanContext, attempts: &[Attempt]) -> Result<(), EvalError> {
        if self.verbose {
            for attempt in attempts {
                println!(
                    "{} {} {} peak={:.2} {}",
                    attempt.id,
                    attempt.probe,
                    attempt.detector.as_deref().unwrap_or("-"),
                    attempt.peak_score(),
                    attempt.status,
                );
            }
        }
        println!("{}", Self::summarize(attempts));
        Ok(())
    }
}

/// Prints the attempt records as a pretty JSON array to stdout.
#[derive(Debug, Default)]
pub struct JsonEvaluator;

#[async_trait]
impl Evaluator for JsonEvaluator {
    async fn evaluate(&self, _ctx: &ScanContext, attempts: &[Attempt]) -> Result<(), EvalError> {
        println!("{}", render_json(attempts)?);
        Ok(())
    }
}

/// Prints one JSON object per attempt to stdout.
#[derive(Debug, Default)]
pub struct JsonlEvaluator;

#[async_trait]
impl Evaluator for JsonlEvaluator {
    async fn evaluate(&self, _ctx: &ScanContext, attempts: &[Attempt]) -> Result<(), EvalError> {
        print!("{}", render_jsonl(attempts)?);
        Ok(())
    }
}

/// Writes the JSONL records to a file.
pub struct JsonlFileEvaluator {
    path: PathBuf,
}

impl JsonlFileEvaluator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Evaluator for JsonlFileEvaluator {
    async fn evaluate(&self, _ctx: &ScanContext, attempts: &[Attempt]) -> Result<(), EvalError> {
        std::fs::write(&self.path, render_jsonl(attempts)?)?;
        info!(path = %self.path.display(), "wrote JSONL report");
        Ok(())
    }
}

/// Writes the self-contained HTML report to a file.
pub struct HtmlFileEvaluator {
    path: PathBuf,
}

impl HtmlFileEvaluator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Evaluator for HtmlFileEvaluator {
    async fn evaluate(&self, _ctx: &ScanContext, attempts: &[Attempt]) -> Result<(), EvalError> {
        std::fs::write(&self.path, render_html(attempts))?;
        info!(path = %self.path.display(), "wrote HTML report");
        Ok(())
    }
}

/// Fans attempts out to an inner evaluator plus optional file sinks.
pub struct CollectingEvaluator {
    inner: Box<dyn Evaluator>,
    jsonl: Option<JsonlFileEvaluator>,
    html: Option<HtmlFileEvaluator>,
}

impl CollectingEvaluator {
    pub fn new(inner: Box<dyn Evaluator>) -> Self {
        Self {
            inner,
            jsonl: None,
            html: None,
        }
    }

    /// Additionally writes a JSONL file.
    pub fn with_jsonl_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.jsonl = Some(JsonlFileEvaluator::new(path));
        self
    }

    /// Additionally writes an HTML report.
    pub fn with_html_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.html = Some(HtmlFileEvaluator::new(path));
        self
    }
}

#[async_trait]
impl Evaluator for CollectingEvaluator {
    async fn evaluate(&self, ctx: &ScanContext, attempts: &[Attempt]) -> Result<(), EvalError> {
        self.inner.evaluate(ctx, attempts).await?;
        if let Some(jsonl) = &self.jsonl {
            jsonl.evaluate(ctx, attempts).await?;
        }
        if let Some(html) = &self.html {
            html.evaluate(ctx, attempts).await?;
        }
        Ok(())
    }
}
