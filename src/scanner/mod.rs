//! The scan core: request resolution, execution knobs, and the concurrency
//! and retry wrappers around the target generator.
//!
//! The scanner resolves capability names against the registries, wraps the
//! generator so that at most `concurrency` generator calls are in flight
//! across the whole scan, derives the overall-deadline context, and hands
//! control to the selected harness.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::buffs::{BuffChain, BuffedProber};
use crate::context::ScanContext;
use crate::conversation::{Conversation, Message};
use crate::detectors::Detector;
use crate::error::{GeneratorError, ScanError};
use crate::evaluators::{
    CollectingEvaluator, Evaluator, JsonEvaluator, JsonlEvaluator, TableEvaluator,
};
use crate::generators::Generator;
use crate::probes::Probe;
use crate::registry::Config;
use crate::selector::expand_selectors;

/// Default in-flight generator call bound.
const DEFAULT_CONCURRENCY: usize = 10;

/// Default per-probe timeout.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default overall scan timeout.
const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default first retry backoff.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Output formats the scan front-end accepts.
pub const SCAN_FORMATS: &[&str] = &["table", "json", "jsonl"];

/// Execution knobs for the scan core.
#[derive(Debug, Clone)]
pub struct ScannerOptions {
    /// Maximum in-flight generator calls across the whole scan.
    pub concurrency: usize,
    /// Deadline for a single probe.
    pub probe_timeout: Duration,
    /// Deadline for the whole scan.
    pub timeout: Duration,
    /// Retries per generator call for transient failures.
    pub retry_count: u32,
    /// First retry delay; doubles per retry.
    pub retry_backoff: Duration,
    /// Cap on attempts per scan; 0 means unlimited. Honored by the
    /// sequential harnesses, which stop launching probes once reached.
    pub max_attempts: usize,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            timeout: DEFAULT_OVERALL_TIMEOUT,
            retry_count: 0,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_attempts: 0,
        }
    }
}

impl ScannerOptions {
    /// Sets the concurrency bound (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the per-probe timeout.
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Sets the overall timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets retry count and initial backoff.
    pub fn with_retries(mut self, retry_count: u32, retry_backoff: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_backoff = retry_backoff;
        self
    }

    /// Sets the attempt cap (0 means unlimited).
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// How the probe set is selected.
#[derive(Debug, Clone, Default)]
pub enum ProbeSelection {
    /// Explicit fully qualified names.
    Names(Vec<String>),
    /// A glob pattern expanded against the registry.
    Glob(String),
    /// Every registered probe.
    All,
    /// Nothing selected; scanning is a validation error.
    #[default]
    None,
}

/// The configuration packet the scanner consumes.
#[derive(Default)]
pub struct ScanRequest {
    /// Target generator name.
    pub generator: String,
    /// Config bag for the generator factory.
    pub generator_config: Config,
    /// Probe selection.
    pub probes: ProbeSelection,
    /// Explicit detector names; empty means "each probe's primary".
    pub detectors: Vec<String>,
    /// Detector glob, expanded in addition to `detectors`.
    pub detectors_glob: Option<String>,
    /// Buff names applied in order.
    pub buffs: Vec<String>,
    /// Buff glob, expanded in addition to `buffs`.
    pub buffs_glob: Option<String>,
    /// Harness name; empty means the default harness.
    pub harness: String,
    /// Config bag for the harness factory.
    pub harness_config: Config,
    /// Per-capability settings bags, keyed by capability name.
    pub probe_settings: HashMap<String, Config>,
    pub detector_settings: HashMap<String, Config>,
    pub buff_settings: HashMap<String, Config>,
    /// Execution knobs.
    pub options: ScannerOptions,
    /// Output format: one of `table`, `json`, `jsonl`.
    pub format: String,
    /// JSONL output file.
    pub output_file: Option<PathBuf>,
    /// HTML report file.
    pub html_file: Option<PathBuf>,
    /// Verbose evaluation output.
    pub verbose: bool,
}

/// Default harness when the request names none.
pub const DEFAULT_HARNESS: &str = "probewise.Probewise";

/// Semaphore wrapper bounding in-flight generator calls scan-wide.
///
/// The permit is held for the whole logical call, including any retries of
/// the wrapped generator, so retries cannot push the number of in-flight
/// calls above the bound.
pub struct ThrottledGenerator {
    inner: Arc<dyn Generator>,
    semaphore: Arc<Semaphore>,
}

impl ThrottledGenerator {
    pub fn new(inner: Arc<dyn Generator>, concurrency: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }
}

#[async_trait]
impl Generator for ThrottledGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    async fn generate(
        &self,
        ctx: &ScanContext,
        conversation: &Conversation,
        n: usize,
    ) -> Result<Vec<Message>, GeneratorError> {
        let permit = match ctx.run(self.semaphore.acquire()).await {
            Some(Ok(permit)) => permit,
            Some(Err(_)) | None => return Err(GeneratorError::Cancelled),
        };
        let result = self.inner.generate(ctx, conversation, n).await;
        drop(permit);
        result
    }

    fn clear_history(&self) {
        self.inner.clear_history();
    }
}

/// Retry wrapper: transient failures retry with doubling backoff.
///
/// Cancellation is never retried; permanent failures surface immediately.
pub struct RetryingGenerator {
    inner: Arc<dyn Generator>,
    retry_count: u32,
    backoff: Duration,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn Generator>, retry_count: u32, backoff: Duration) -> Self {
        Self {
            inner,
            retry_count,
            backoff,
        }
    }
}

#[async_trait]
impl Generator for RetryingGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    async fn generate(
        &self,
        ctx: &ScanContext,
        conversation: &Conversation,
        n: usize,
    ) -> Result<Vec<Message>, GeneratorError> {
        let mut delay = self.backoff;
        let mut last_error = None;

        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying generator call after transient failure"
                );
                if ctx.run(tokio::time::sleep(delay)).await.is_none() {
                    return Err(GeneratorError::Cancelled);
                }
                delay *= 2;
            }

            match self.inner.generate(ctx, conversation, n).await {
                Ok(messages) => return Ok(messages),
                Err(GeneratorError::Cancelled) => return Err(GeneratorError::Cancelled),
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "transient generator failure");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GeneratorError::RequestFailed("retries exhausted with no error captured".to_string())
        }))
    }

    fn clear_history(&self) {
        self.inner.clear_history();
    }
}

/// Resolves capability names and drives one scan.
pub struct Scanner;

impl Scanner {
    pub fn new() -> Self {
        Self
    }

    /// Runs a scan to completion under the given root context.
    pub async fn run(&self, root: &ScanContext, request: &ScanRequest) -> Result<(), ScanError> {
        let probes = self.resolve_probes(request)?;
        let detectors = self.resolve_detectors(request, &probes)?;
        let probes = self.apply_buffs(request, probes)?;

        let generator = crate::generators::registry()
            .create(&request.generator, &request.generator_config)?;
        let generator: Arc<dyn Generator> = if request.options.retry_count > 0 {
            Arc::new(RetryingGenerator::new(
                generator,
                request.options.retry_count,
                request.options.retry_backoff,
            ))
        } else {
            generator
        };
        let generator: Arc<dyn Generator> = Arc::new(ThrottledGenerator::new(
            generator,
            request.options.concurrency,
        ));

        let harness_name = if request.harness.is_empty() {
            DEFAULT_HARNESS
        } else {
            &request.harness
        };
        let harness =
            crate::harness::registry().create(harness_name, &request.harness_config)?;

        let evaluator = self.build_evaluator(request)?;

        info!(
            generator = generator.name(),
            harness = harness_name,
            probes = probes.len(),
            detectors = detectors.len(),
            concurrency = request.options.concurrency,
            "starting scan"
        );

        let scan_ctx = root.with_timeout(request.options.timeout);
        let _guard = scan_ctx.drop_guard();

        harness
            .run(
                &scan_ctx,
                generator,
                &probes,
                &detectors,
                evaluator.as_ref(),
                &request.options,
            )
            .await
    }

    fn settings(map: &HashMap<String, Config>, name: &str) -> Config {
        map.get(name).cloned().unwrap_or_default()
    }

    fn resolve_probes(&self, request: &ScanRequest) -> Result<Vec<Arc<dyn Probe>>, ScanError> {
        let registry = crate::probes::registry();
        let names: Vec<String> = match &request.probes {
            ProbeSelection::All => registry.list(),
            ProbeSelection::Glob(pattern) => {
                let universe = registry.list();
                let matched = expand_selectors(pattern, &universe)
                    .map_err(|e| ScanError::Validation(e.to_string()))?;
                if matched.is_empty() {
                    return Err(ScanError::EmptySelection {
                        kind: "probes",
                        pattern: pattern.clone(),
                    });
                }
                matched
            }
            ProbeSelection::Names(names) if !names.is_empty() => names.clone(),
            _ => return Err(ScanError::NoProbeSelector),
        };

        names
            .iter()
            .map(|name| {
                registry
                    .create(name, &Self::settings(&request.probe_settings, name))
                    .map_err(ScanError::from)
            })
            .collect()
    }

    fn resolve_detectors(
        &self,
        request: &ScanRequest,
        probes: &[Arc<dyn Probe>],
    ) -> Result<Vec<Arc<dyn Detector>>, ScanError> {
        let registry = crate::detectors::registry();
        let mut names: Vec<String> = request.detectors.clone();

        if let Some(pattern) = &request.detectors_glob {
            let universe = registry.list();
            let matched = expand_selectors(pattern, &universe)
                .map_err(|e| ScanError::Validation(e.to_string()))?;
            if matched.is_empty() {
                return Err(ScanError::EmptySelection {
                    kind: "detectors",
                    pattern: pattern.clone(),
                });
            }
            names.extend(matched);
        }

        if names.is_empty() {
            // Default: the union of each probe's primary detector, in probe
            // order.
            for probe in probes {
                let primary = probe.primary_detector().to_string();
                if !primary.is_empty() && !names.contains(&primary) {
                    names.push(primary);
                }
            }
        } else {
            let mut seen = std::collections::HashSet::new();
            names.retain(|name| seen.insert(name.clone()));
        }

        names
            .iter()
            .map(|name| {
                registry
                    .create(name, &Self::settings(&request.detector_settings, name))
                    .map_err(ScanError::from)
            })
            .collect()
    }

    fn apply_buffs(
        &self,
        request: &ScanRequest,
        probes: Vec<Arc<dyn Probe>>,
    ) -> Result<Vec<Arc<dyn Probe>>, ScanError> {
        let registry = crate::buffs::registry();
        let mut names: Vec<String> = request.buffs.clone();

        if let Some(pattern) = &request.buffs_glob {
            let universe = registry.list();
            let matched = expand_selectors(pattern, &universe)
                .map_err(|e| ScanError::Validation(e.to_string()))?;
            if matched.is_empty() {
                return Err(ScanError::EmptySelection {
                    kind: "buffs",
                    pattern: pattern.clone(),
                });
            }
            names.extend(matched);
        }
        let mut seen = std::collections::HashSet::new();
        names.retain(|name| seen.insert(name.clone()));

        if names.is_empty() {
            return Ok(probes);
        }

        let buffs = names
            .iter()
            .map(|name| {
                registry
                    .create(name, &Self::settings(&request.buff_settings, name))
                    .map_err(ScanError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let chain = BuffChain::new(buffs);

        Ok(probes
            .into_iter()
            .map(|probe| Arc::new(BuffedProber::new(probe, chain.clone())) as Arc<dyn Probe>)
            .collect())
    }

    fn build_evaluator(&self, request: &ScanRequest) -> Result<Box<dyn Evaluator>, ScanError> {
        let format = if request.format.is_empty() {
            "table"
        } else {
            &request.format
        };
        let inner: Box<dyn Evaluator> = match format {
            "table" => Box::new(TableEvaluator::new().with_verbose(request.verbose)),
            "json" => Box::new(JsonEvaluator),
            "jsonl" => Box::new(JsonlEvaluator),
            other => {
                return Err(ScanError::Validation(format!(
                    "invalid format '{other}': must be one of {}",
                    SCAN_FORMATS.join(", ")
                )))
            }
        };

        let mut collecting = CollectingEvaluator::new(inner);
        if let Some(path) = &request.output_file {
            collecting = collecting.with_jsonl_file(path);
        }
        if let Some(path) = &request.html_file {
            collecting = collecting.with_html_file(path);
        }
        Ok(Box::new(collecting))
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a root context cancelled by SIGINT or SIGTERM.
pub fn signal_context() -> ScanContext {
    let ctx = ScanContext::new();
    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        let terminate = async {
            #[cfg(unix)]
            {
                let mut sig =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                        .expect("failed to install SIGTERM handler");
                sig.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, cancelling scan");
            }
            _ = terminate => {
                info!("terminate received, cancelling scan");
            }
            _ = signal_ctx.cancelled() => return,
        }
        signal_ctx.cancel();
    });
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_options() {
        let options = ScannerOptions::default();
        assert_eq!(options.concurrency, 10);
        assert_eq!(options.probe_timeout, Duration::from_secs(300));
        assert_eq!(options.timeout, Duration::from_secs(1800));
        assert_eq!(options.retry_count, 0);
        assert_eq!(options.retry_backoff, Duration::from_secs(1));
        assert_eq!(options.max_attempts, 0);
    }

    #[test]
    fn test_options_builder_clamps_concurrency() {
        let options = ScannerOptions::default().with_concurrency(0);
        assert_eq!(options.concurrency, 1);
    }

    /// Generator failing a fixed number of times before succeeding.
    struct FlakyGenerator {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
        transient: bool,
    }

    impl FlakyGenerator {
        fn new(failures: usize, transient: bool) -> Self {
            Self {
                failures_left: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                transient,
            }
        }
    }

    #[async_trait]
    impl Generator for FlakyGenerator {
        fn name(&self) -> &str {
            "test.Flaky"
        }

        async fn generate(
            &self,
            _ctx: &ScanContext,
            conversation: &Conversation,
            n: usize,
        ) -> Result<Vec<Message>, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return if self.transient {
                    Err(GeneratorError::RateLimited("slow down".to_string()))
                } else {
                    Err(GeneratorError::Auth("bad key".to_string()))
                };
            }
            let prompt = conversation.last_user_prompt().unwrap_or_default();
            Ok((0..n).map(|_| Message::assistant(prompt)).collect())
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient() {
        let flaky = Arc::new(FlakyGenerator::new(2, true));
        let retrying = RetryingGenerator::new(
            flaky.clone() as Arc<dyn Generator>,
            3,
            Duration::from_millis(1),
        );
        let conv = Conversation::from_prompt("hello");

        let out = retrying
            .generate(&ScanContext::new(), &conv, 1)
            .await
            .unwrap();
        assert_eq!(out[0].content, "hello");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_last_error() {
        let flaky = Arc::new(FlakyGenerator::new(10, true));
        let retrying = RetryingGenerator::new(
            flaky.clone() as Arc<dyn Generator>,
            2,
            Duration::from_millis(1),
        );
        let conv = Conversation::from_prompt("hello");

        let err = retrying
            .generate(&ScanContext::new(), &conv, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::RateLimited(_)));
        // Initial call plus two retries.
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let flaky = Arc::new(FlakyGenerator::new(10, false));
        let retrying = RetryingGenerator::new(
            flaky.clone() as Arc<dyn Generator>,
            5,
            Duration::from_millis(1),
        );
        let conv = Conversation::from_prompt("hello");

        let err = retrying
            .generate(&ScanContext::new(), &conv, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Auth(_)));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_not_retried() {
        struct CancelledGenerator;

        #[async_trait]
        impl Generator for CancelledGenerator {
            fn name(&self) -> &str {
                "test.Cancelled"
            }

            async fn generate(
                &self,
                _ctx: &ScanContext,
                _conversation: &Conversation,
                _n: usize,
            ) -> Result<Vec<Message>, GeneratorError> {
                Err(GeneratorError::Cancelled)
            }
        }

        let retrying = RetryingGenerator::new(
            Arc::new(CancelledGenerator),
            5,
            Duration::from_millis(1),
        );
        let conv = Conversation::from_prompt("hello");
        let err = retrying
            .generate(&ScanContext::new(), &conv, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Cancelled));
    }

    #[tokio::test]
    async fn test_throttled_generator_cancel_while_queued() {
        let inner = Arc::new(crate::generators::SleepGenerator::new(Duration::from_secs(
            60,
        )));
        let throttled = Arc::new(ThrottledGenerator::new(inner, 1));
        let ctx = ScanContext::new();
        let conv = Conversation::from_prompt("p");

        // Occupy the single permit.
        let busy = {
            let throttled = Arc::clone(&throttled);
            let ctx = ctx.clone();
            let conv = conv.clone();
            tokio::spawn(async move { throttled.generate(&ctx, &conv, 1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Cancel; both the queued call and the in-flight call unblock.
        ctx.cancel();
        let err = throttled.generate(&ctx, &conv, 1).await.unwrap_err();
        assert!(matches!(err, GeneratorError::Cancelled));
        let busy_result = busy.await.unwrap();
        assert!(matches!(busy_result, Err(GeneratorError::Cancelled)));
    }
}
