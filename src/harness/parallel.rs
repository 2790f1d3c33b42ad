//! Concurrent harness: probes run in parallel.
//!
//! The in-flight generator-call bound still comes from the scan-wide
//! semaphore, so running probes concurrently never exceeds the configured
//! concurrency. Attempt order within each probe is preserved; attempts from
//! different probes interleave.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
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

/// Harness that runs every probe concurrently.
pub struct ParallelHarness {
    continue_on_detector_error: bool,
}

impl ParallelHarness {
    pub fn new(continue_on_detector_error: bool) -> Self {
        Self {
            continue_on_detector_error,
        }
    }

    async fn run_one(
        &self,
        ctx: &ScanContext,
        generator: &Arc<dyn Generator>,
        probe: &Arc<dyn Probe>,
        detectors: &[Arc<dyn Detector>],
        options: &ScannerOptions,
    ) -> (Vec<Attempt>, Option<ScanError>) {
        if ctx.is_cancelled() {
            return (Vec::new(), None);
        }

        let probe_ctx = ctx.with_timeout(options.probe_timeout);
        let _guard = probe_ctx.drop_guard();
        info!(probe = probe.name(), "running probe");

        let mut attempts = match probe.probe(&probe_ctx, generator.as_ref()).await {
            Ok(attempts) => attempts,
            Err(e) => {
                return (
                    Vec::new(),
                    Some(ScanError::Probe {
                        probe: probe.name().to_string(),
                        source: e,
                    }),
                )
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
                return (attempts, Some(e));
            }
        }
        generator.clear_history();
        (attempts, None)
    }
}

#[async_trait]
impl Harness for ParallelHarness {
    fn name(&self) -> &str {
        "parallel.Probes"
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
        let results = join_all(probes.iter().map(|probe| {
            let generator = Arc::clone(&generator);
            async move {
                self.run_one(ctx, &generator, probe, detectors, options)
                    .await
            }
        }))
        .await;

        let mut all_attempts = Vec::new();
        let mut failure = None;
        for (attempts, error) in results {
            all_attempts.extend(attempts);
            if failure.is_none() {
                failure = error;
            }
        }
        finalize_abandoned(&mut all_attempts, "scan cancelled");

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
