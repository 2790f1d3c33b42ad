//! The default harness: probes run one at a time in submission order.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::attempt::Attempt;
use crate::context::ScanContext;
use crate::detectors::Detector;
use crate::error::ScanError;
use crate::evaluators::Evaluator;
use crate::generators::Generator;
use crate::probes::Probe;
use crate::scanner::ScannerOptions;

use super::{finalize_abandoned, score_attempt, Harness};

/// Sequential harness. Concurrency within a probe comes from the probe's
/// own prompt dispatch, bounded by the scan-wide generator semaphore.
pub struct ProbewiseHarness {
    continue_on_detector_error: bool,
}

impl ProbewiseHarness {
    pub fn new(continue_on_detector_error: bool) -> Self {
        Self {
            continue_on_detector_error,
        }
    }

    /// Core loop shared with the agentwise harness.
    pub(crate) async fn run_probes(
        &self,
        ctx: &ScanContext,
        generator: Arc<dyn Generator>,
        probes: &[Arc<dyn Probe>],
        detectors: &[Arc<dyn Detector>],
        evaluator: &dyn Evaluator,
        options: &ScannerOptions,
    ) -> Result<(), ScanError> {
        let mut all_attempts: Vec<Attempt> = Vec::new();
        let mut failure: Option<ScanError> = None;

        'probes: for probe in probes {
            if ctx.is_cancelled() {
                break;
            }
            if options.max_attempts > 0 && all_attempts.len() >= options.max_attempts {
                debug!(
                    cap = options.max_attempts,
                    "attempt cap reached, skipping remaining probes"
                );
                break;
            }

            let probe_ctx = ctx.with_timeout(options.probe_timeout);
            let _guard = probe_ctx.drop_guard();
            info!(probe = probe.name(), "running probe");

            let mut attempts = match probe.probe(&probe_ctx, generator.as_ref()).await {
                Ok(attempts) => attempts,
                Err(e) => {
                    failure = Some(ScanError::Probe {
                        probe: probe.name().to_string(),
                        source: e,
                    });
                    break;
                }
            };
            if attempts.is_empty() {
                debug!(probe = probe.name(), "probe emitted zero attempts");
            }

            for attempt in &mut attempts {
                if let Err(e) = score_attempt(
                    ctx,
                    attempt,
                    detectors,
                    generator.name(),
                    self.continue_on_detector_error,
                )
                .await
                {
                    finalize_abandoned(&mut attempts, "scan aborted by detector failure");
                    all_attempts.extend(attempts);
                    failure = Some(e);
                    break 'probes;
                }
            }
            all_attempts.extend(attempts);
            generator.clear_history();
        }

        finalize_abandoned(&mut all_attempts, "scan cancelled");

        // The evaluator always sees the completed evidence, even when the
        // scan was cut short; it runs under a fresh context so cancellation
        // of the scan does not swallow the report.
        let eval_ctx = ScanContext::new();
        evaluator.evaluate(&eval_ctx, &all_attempts).await?;

        if let Some(e) = failure {
            return Err(e);
        }
        if ctx.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
impl Harness for ProbewiseHarness {
    fn name(&self) -> &str {
        "probewise.Probewise"
    }

    async fn run(
        &self,
        ctx: &ScanContext,
        generator: Arc<dyn Generator>,
        probes: &[Arc<dyn Probe>],
        detectors: &[Arc<dyn Detector>],
        evaluator: &dyn Evaluator,
        options: &ScannerOptions,
    ) -> Result<(), ScanError> {
        self.run_probes(ctx, generator, probes, detectors, evaluator, options)
            .await
    }
}
