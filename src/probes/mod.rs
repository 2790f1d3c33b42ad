//! Probe contract and built-in adversarial probes.
//!
//! A probe is an adversarial prompt strategy: given a generator, it produces
//! one or more [`Attempt`]s. The default [`SimpleProbe`] is a data carrier
//! that iterates its own prompt list; specialised probes compose it rather
//! than inherit from it.

pub mod avspam;
pub mod dan;
pub mod tool;

pub use test::test_probe;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use crate::attempt::Attempt;
use crate::context::ScanContext;
use crate::conversation::Conversation;
use crate::error::{GeneratorError, ProbeError};
use crate::generators::Generator;
use crate::registry::{from_map, Config, PluginMeta, Registry};

/// An adversarial prompt strategy run against a generator.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Fully qualified probe name, e.g. `"dan.Dan1"`.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// What a successful attack demonstrates.
    fn goal(&self) -> &str;

    /// The detector best suited to score this probe's attempts.
    fn primary_detector(&self) -> &str;

    /// The ordered prompts this probe sends.
    fn prompts(&self) -> &[String];

    /// Runs the probe against the generator, producing attempts.
    ///
    /// Each returned attempt carries this probe's name and primary
    /// detector; the harness may re-stamp both.
    async fn probe(
        &self,
        ctx: &ScanContext,
        generator: &dyn Generator,
    ) -> Result<Vec<Attempt>, ProbeError>;
}

/// Runs one conversation through the generator and records the exchange
/// as an attempt.
///
/// Generator faults terminate the attempt with `Error` status rather than
/// failing the whole probe; the attempt is left `Running` on success so the
/// harness can complete it after detection.
pub async fn execute_conversation(
    probe_name: &str,
    primary_detector: &str,
    ctx: &ScanContext,
    generator: &dyn Generator,
    conversation: &Conversation,
    generations: usize,
) -> Attempt {
    let mut attempt = Attempt::new(probe_name);
    attempt.detector = Some(primary_detector.to_string());
    attempt.add_prompt(conversation.prompt_text());

    if ctx.is_cancelled() {
        attempt.mark_error("attempt cancelled before generation");
        return attempt;
    }

    match generator.generate(ctx, conversation, generations).await {
        Ok(messages) => {
            for message in messages {
                attempt.add_output(message.content);
            }
        }
        Err(GeneratorError::Cancelled) => {
            attempt.mark_error("generation cancelled: deadline exceeded");
        }
        Err(e) => {
            attempt.mark_error(e.to_string());
        }
    }
    attempt
}

/// A probe defined entirely by its data: name, goal, prompt list and
/// primary detector.
#[derive(Debug, Clone)]
pub struct SimpleProbe {
    name: String,
    description: String,
    goal: String,
    primary_detector: String,
    prompts: Vec<String>,
    system: Option<String>,
    generations: usize,
}

impl SimpleProbe {
    /// Creates a probe with the given name and prompts.
    pub fn new(name: impl Into<String>, prompts: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            goal: String::new(),
            primary_detector: "always.Pass".to_string(),
            prompts,
            system: None,
            generations: 1,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the goal text.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    /// Sets the primary detector name.
    pub fn with_primary_detector(mut self, detector: impl Into<String>) -> Self {
        self.primary_detector = detector.into();
        self
    }

    /// Sets a system message sent with every prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Sets the completions requested per prompt (minimum 1).
    pub fn with_generations(mut self, generations: usize) -> Self {
        self.generations = generations.max(1);
        self
    }

    /// Builds the conversation for one prompt.
    fn conversation(&self, prompt: &str) -> Conversation {
        let mut conv = Conversation::from_prompt(prompt);
        if let Some(system) = &self.system {
            conv = conv.with_system(system.clone());
        }
        conv
    }
}

#[async_trait]
impl Probe for SimpleProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn goal(&self) -> &str {
        &self.goal
    }

    fn primary_detector(&self) -> &str {
        &self.primary_detector
    }

    fn prompts(&self) -> &[String] {
        &self.prompts
    }

    async fn probe(
        &self,
        ctx: &ScanContext,
        generator: &dyn Generator,
    ) -> Result<Vec<Attempt>, ProbeError> {
        // All prompts dispatch concurrently; the scan-wide semaphore bounds
        // actual in-flight generator calls. join_all preserves prompt order.
        let attempts = join_all(self.prompts.iter().map(|prompt| {
            let conv = self.conversation(prompt);
            async move {
                execute_conversation(
                    &self.name,
                    &self.primary_detector,
                    ctx,
                    generator,
                    &conv,
                    self.generations,
                )
                .await
            }
        }))
        .await;

        if attempts.is_empty() {
            debug!(probe = %self.name, "probe produced no attempts");
        }
        Ok(attempts)
    }
}

static REGISTRY: OnceLock<Registry<Arc<dyn Probe>>> = OnceLock::new();

/// The process-wide probe registry.
pub fn registry() -> &'static Registry<Arc<dyn Probe>> {
    REGISTRY.get_or_init(|| Registry::new("probe"))
}

/// Registers the built-in probes.
pub fn register_builtin() {
    let reg = registry();

    reg.register_with_meta(
        "test.Test",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(test::test_probe()) as Arc<dyn Probe>),
        ),
        PluginMeta::new("test.Test", "single harmless prompt for smoke tests"),
    );

    reg.register_with_meta(
        "dan.Dan1",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(dan::dan1()) as Arc<dyn Probe>),
        ),
        PluginMeta::new("dan.Dan1", "classic DAN 1.0 jailbreak"),
    );

    reg.register_with_meta(
        "dan.AntiDan",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(dan::anti_dan()) as Arc<dyn Probe>),
        ),
        PluginMeta::new("dan.AntiDan", "ANTI-DAN over-refusal jailbreak"),
    );

    reg.register_with_meta(
        "avspamscanning.EICAR",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(avspam::eicar()) as Arc<dyn Probe>),
        ),
        PluginMeta::new(
            "avspamscanning.EICAR",
            "asks the model to reproduce the EICAR test signature",
        ),
    );

    reg.register_with_meta(
        "tool.ShellEscalation",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(tool::ShellEscalationProbe::new()) as Arc<dyn Probe>),
        ),
        PluginMeta::new(
            "tool.ShellEscalation",
            "tempts an agent into forbidden shell tool calls",
        ),
    );
}
