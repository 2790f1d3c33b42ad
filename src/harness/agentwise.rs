//! Agent-aware harness: filters probes by declared agent capabilities.
//!
//! Probes are gated by their name prefix: `multiagent.` needs multi-agent
//! support, `browsing.` needs browsing, `memory.` needs memory, `tool.`
//! needs tools. Probes with any other prefix always apply. After filtering
//! the harness behaves like the probewise harness.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::ScanContext;
use crate::detectors::Detector;
use crate::error::ScanError;
use crate::evaluators::Evaluator;
use crate::generators::Generator;
use crate::probes::Probe;
use crate::registry::Config;
use crate::scanner::ScannerOptions;

use super::{Harness, ProbewiseHarness};

/// What the target agent deployment can do.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentCapabilities {
    pub has_tools: bool,
    pub has_browsing: bool,
    pub has_memory: bool,
    pub has_multi_agent: bool,
}

impl AgentCapabilities {
    /// Reads capability flags from a config bag.
    pub fn from_bag(bag: &Config) -> Self {
        Self {
            has_tools: bag.get_bool("has_tools", false),
            has_browsing: bag.get_bool("has_browsing", false),
            has_memory: bag.get_bool("has_memory", false),
            has_multi_agent: bag.get_bool("has_multi_agent", false),
        }
    }

    /// Whether a probe with this name applies to the deployment.
    pub fn allows(&self, probe_name: &str) -> bool {
        if probe_name.starts_with("multiagent.") {
            self.has_multi_agent
        } else if probe_name.starts_with("browsing.") {
            self.has_browsing
        } else if probe_name.starts_with("memory.") {
            self.has_memory
        } else if probe_name.starts_with("tool.") {
            self.has_tools
        } else {
            true
        }
    }
}

/// Probewise execution over the capability-filtered probe set.
pub struct AgentwiseHarness {
    capabilities: AgentCapabilities,
    inner: ProbewiseHarness,
}

impl AgentwiseHarness {
    pub fn new(capabilities: AgentCapabilities, continue_on_detector_error: bool) -> Self {
        Self {
            capabilities,
            inner: ProbewiseHarness::new(continue_on_detector_error),
        }
    }
}

#[async_trait]
impl Harness for AgentwiseHarness {
    fn name(&self) -> &str {
        "agentwise.Agentwise"
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
        let applicable: Vec<Arc<dyn Probe>> = probes
            .iter()
            .filter(|probe| {
                let keep = self.capabilities.allows(probe.name());
                if !keep {
                    debug!(
                        probe = probe.name(),
                        "probe filtered out: capability not declared"
                    );
                }
                keep
            })
            .cloned()
            .collect();

        if applicable.is_empty() {
            return Err(ScanError::NoProbes);
        }

        self.inner
            .run_probes(ctx, generator, &applicable, detectors, evaluator, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::always::AlwaysPass;
    use crate::generators::RepeatGenerator;
    use crate::harness::probewise::tests::CapturingEvaluator;
    use crate::probes::SimpleProbe;

    fn probe(name: &str) -> Arc<dyn Probe> {
        Arc::new(SimpleProbe::new(name, vec!["p".to_string()]))
    }

    #[test]
    fn test_capability_gating() {
        let caps = AgentCapabilities {
            has_tools: true,
            ..AgentCapabilities::default()
        };
        assert!(caps.allows("tool.ShellEscalation"));
        assert!(!caps.allows("browsing.Exfil"));
        assert!(!caps.allows("memory.Poison"));
        assert!(!caps.allows("multiagent.Collusion"));
        // Non-agent prefixes always apply.
        assert!(caps.allows("dan.Dan1"));
    }

    #[test]
    fn test_capabilities_from_bag() {
        let mut bag = Config::new();
        bag.set("has_browsing", true);
        bag.set("has_multi_agent", true);

        let caps = AgentCapabilities::from_bag(&bag);
        assert!(caps.has_browsing);
        assert!(caps.has_multi_agent);
        assert!(!caps.has_tools);
        assert!(!caps.has_memory);
    }

    #[tokio::test]
    async fn test_filtered_probes_skipped() {
        let harness = AgentwiseHarness::new(AgentCapabilities::default(), false);
        let probes = vec![probe("dan.Dan1"), probe("tool.ShellEscalation")];
        let detectors: Vec<Arc<dyn Detector>> = vec![Arc::new(AlwaysPass)];
        let evaluator = CapturingEvaluator::new();

        harness
            .run(
                &ScanContext::new(),
                Arc::new(RepeatGenerator::new()),
                &probes,
                &detectors,
                &evaluator,
                &ScannerOptions::default(),
            )
            .await
            .unwrap();

        let seen = evaluator.attempts.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].probe, "dan.Dan1");
    }

    #[tokio::test]
    async fn test_empty_filtered_set_is_distinguished_error() {
        let harness = AgentwiseHarness::new(AgentCapabilities::default(), false);
        let probes = vec![probe("tool.ShellEscalation"), probe("browsing.Exfil")];
        let detectors: Vec<Arc<dyn Detector>> = vec![Arc::new(AlwaysPass)];
        let evaluator = CapturingEvaluator::new();

        let err = harness
            .run(
                &ScanContext::new(),
                Arc::new(RepeatGenerator::new()),
                &probes,
                &detectors,
                &evaluator,
                &ScannerOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::NoProbes));
    }
}
