//! Harness contract and the probe→generate→detect sequencing shared by the
//! built-in harnesses.
//!
//! A harness owns the outer scan loop: it runs each probe against the
//! generator, scores the resulting attempts with every detector, stamps the
//! primary detector, and hands the terminal attempts to the evaluator.

pub mod agentwise;
pub mod parallel;
pub mod probewise;

pub use agentwise::{AgentCapabilities, AgentwiseHarness};
pub use parallel::ParallelHarness;
pub use probewise::ProbewiseHarness;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::warn;

use crate::attempt::Attempt;
use crate::context::ScanContext;
use crate::detectors::Detector;
use crate::error::ScanError;
use crate::evaluators::Evaluator;
use crate::generators::Generator;
use crate::probes::Probe;
use crate::registry::{from_map, Config, PluginMeta, Registry};
use crate::scanner::ScannerOptions;

/// Orchestrates probes, detectors and the evaluator for one scan.
#[async_trait]
pub trait Harness: Send + Sync {
    /// Fully qualified harness name, e.g. `"probewise.Probewise"`.
    fn name(&self) -> &str;

    /// Runs the scan loop.
    ///
    /// On cancellation the harness stops launching work, and the evaluator
    /// is still called with the attempts that reached a terminal status.
    async fn run(
        &self,
        ctx: &ScanContext,
        generator: Arc<dyn Generator>,
        probes: &[Arc<dyn Probe>],
        detectors: &[Arc<dyn Detector>],
        evaluator: &dyn Evaluator,
        options: &ScannerOptions,
    ) -> Result<(), ScanError>;
}

/// Runs every detector over one attempt, stamps the primary detector and
/// completes the attempt.
///
/// Attempts that are already terminal (generator faults) only get the
/// generator name stamped. A detector error fails the attempt; it aborts
/// the scan unless `continue_on_detector_error` is set, in which case the
/// fault is recorded on the attempt and scanning continues.
pub(crate) async fn score_attempt(
    ctx: &ScanContext,
    attempt: &mut Attempt,
    detectors: &[Arc<dyn Detector>],
    generator_name: &str,
    continue_on_detector_error: bool,
) -> Result<(), ScanError> {
    if attempt.generator.is_empty() {
        attempt.generator = generator_name.to_string();
    }
    if attempt.status.is_terminal() {
        return Ok(());
    }
    if ctx.is_cancelled() {
        attempt.mark_error("scan cancelled before detection");
        return Ok(());
    }

    for detector in detectors {
        match detector.detect(ctx, attempt).await {
            Ok(scores) => attempt.record_detector(detector.name(), scores),
            Err(e) => {
                let message = format!("detector '{}' failed: {}", detector.name(), e);
                if continue_on_detector_error {
                    warn!(detector = detector.name(), error = %e, "detector failed, continuing");
                    attempt.mark_error(message);
                    return Ok(());
                }
                attempt.mark_error(message);
                return Err(ScanError::Detector {
                    detector: detector.name().to_string(),
                    source: e,
                });
            }
        }
    }

    let order: Vec<String> = detectors.iter().map(|d| d.name().to_string()).collect();
    attempt.stamp_primary(&order);
    attempt.mark_complete();
    Ok(())
}

/// Forces any attempt the scan abandoned into a terminal status, so the
/// evaluator never sees a running attempt.
pub(crate) fn finalize_abandoned(attempts: &mut [Attempt], reason: &str) {
    for attempt in attempts.iter_mut() {
        if !attempt.status.is_terminal() {
            attempt.mark_error(reason);
        }
    }
}

static REGISTRY: OnceLock<Registry<Arc<dyn Harness>>> = OnceLock::new();

/// The process-wide harness registry.
pub fn registry() -> &'static Registry<Arc<dyn Harness>> {
    REGISTRY.get_or_init(|| Registry::new("harness"))
}

/// Registers the built-in harnesses.
pub fn register_builtin() {
    let reg = registry();

    reg.register_with_meta(
        "probewise.Probewise",
        from_map(
            |bag: &Config| Ok(bag.get_bool("continue_on_detector_error", false)),
            |continue_on_detector_error| {
                Ok(Arc::new(ProbewiseHarness::new(continue_on_detector_error))
                    as Arc<dyn Harness>)
            },
        ),
        PluginMeta::new("probewise.Probewise", "sequential probes, default harness"),
    );

    reg.register_with_meta(
        "parallel.Probes",
        from_map(
            |bag: &Config| Ok(bag.get_bool("continue_on_detector_error", false)),
            |continue_on_detector_error| {
                Ok(Arc::new(ParallelHarness::new(continue_on_detector_error))
                    as Arc<dyn Harness>)
            },
        ),
        PluginMeta::new("parallel.Probes", "probes run concurrently"),
    );

    reg.register_with_meta(
        "agentwise.Agentwise",
        from_map(
            |bag: &Config| {
                Ok((
                    AgentCapabilities::from_bag(bag),
                    bag.get_bool("continue_on_detector_error", false),
                ))
            },
            |(capabilities, continue_on_detector_error)| {
                Ok(Arc::new(AgentwiseHarness::new(
                    capabilities,
                    continue_on_detector_error,
                )) as Arc<dyn Harness>)
            },
        ),
        PluginMeta::new(
            "agentwise.Agentwise",
            "filters probes by declared agent capabilities",
        ),
    );
}
