//! Buff contract, chain composition, and the buffed-probe wrapper.
//!
//! A buff mutates prompts before they reach the target model: each buff
//! turns one conversation into one or more variants, and a [`BuffChain`]
//! threads variants through successive buffs left to right. Buffs never
//! touch outputs, and never add turns beyond additional prompt variants.

pub mod charswap;
pub mod encoding;
pub mod lowercase;
pub mod paraphrase;

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::attempt::Attempt;
use crate::context::ScanContext;
use crate::conversation::Conversation;
use crate::error::{BuffError, ProbeError};
use crate::generators::Generator;
use crate::probes::{execute_conversation, Probe};
use crate::registry::{from_map, Config, PluginMeta, Registry};

/// Upper bound on the variants one chain application may produce.
const MAX_CHAIN_VARIANTS: usize = 32;

/// A prompt mutator.
#[async_trait]
pub trait Buff: Send + Sync {
    /// Fully qualified buff name, e.g. `"encoding.Base64"`.
    fn name(&self) -> &str;

    /// Produces one or more mutated variants of the conversation.
    ///
    /// The generator handle supports rephrasing buffs that themselves query
    /// an LLM; purely textual buffs ignore it.
    async fn transform(
        &self,
        ctx: &ScanContext,
        conversation: &Conversation,
        generator: &dyn Generator,
    ) -> Result<Vec<Conversation>, BuffError>;
}

/// An ordered list of buffs applied left to right.
#[derive(Clone, Default)]
pub struct BuffChain {
    buffs: Vec<Arc<dyn Buff>>,
}

impl BuffChain {
    /// Creates a chain from an ordered buff list.
    pub fn new(buffs: Vec<Arc<dyn Buff>>) -> Self {
        Self { buffs }
    }

    /// True iff zero buffs are registered.
    pub fn is_empty(&self) -> bool {
        self.buffs.is_empty()
    }

    /// Number of buffs in the chain.
    pub fn len(&self) -> usize {
        self.buffs.len()
    }

    /// Threads the conversation through every buff in order.
    ///
    /// Each buff maps every variant produced so far to one or more new
    /// variants; the total is capped at a fixed bound, with the overflow
    /// logged and dropped.
    pub async fn apply(
        &self,
        ctx: &ScanContext,
        conversation: &Conversation,
        generator: &dyn Generator,
    ) -> Result<Vec<Conversation>, BuffError> {
        let mut variants = vec![conversation.clone()];
        for buff in &self.buffs {
            let mut next = Vec::with_capacity(variants.len());
            for variant in &variants {
                let mutated = buff.transform(ctx, variant, generator).await?;
                if mutated.is_empty() {
                    return Err(BuffError::NoVariants);
                }
                next.extend(mutated);
                if next.len() >= MAX_CHAIN_VARIANTS {
                    debug!(
                        buff = buff.name(),
                        cap = MAX_CHAIN_VARIANTS,
                        "buff chain variant cap reached, dropping excess"
                    );
                    next.truncate(MAX_CHAIN_VARIANTS);
                    break;
                }
            }
            variants = next;
        }
        Ok(variants)
    }
}

/// Wraps a probe so every prompt passes through a buff chain before being
/// sent to the generator.
pub struct BuffedProber {
    inner: Arc<dyn Probe>,
    chain: BuffChain,
}

impl BuffedProber {
    pub fn new(inner: Arc<dyn Probe>, chain: BuffChain) -> Self {
        Self { inner, chain }
    }
}

#[async_trait]
impl Probe for BuffedProber {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn goal(&self) -> &str {
        self.inner.goal()
    }

    fn primary_detector(&self) -> &str {
        self.inner.primary_detector()
    }

    fn prompts(&self) -> &[String] {
        self.inner.prompts()
    }

    async fn probe(
        &self,
        ctx: &ScanContext,
        generator: &dyn Generator,
    ) -> Result<Vec<Attempt>, ProbeError> {
        let mut attempts = Vec::new();
        for prompt in self.inner.prompts() {
            let conv = Conversation::from_prompt(prompt.clone());
            let variants = self.chain.apply(ctx, &conv, generator).await?;
            for variant in variants {
                attempts.push(
                    execute_conversation(
                        self.inner.name(),
                        self.inner.primary_detector(),
                        ctx,
                        generator,
                        &variant,
                        1,
                    )
                    .await,
                );
            }
        }
        Ok(attempts)
    }
}

/// A token bucket governing a buff's own request rate.
///
/// One bucket per buff instance; it lives for the buff's lifetime, i.e. one
/// scan. The scanner's concurrency bound still applies on top.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    rate_per_sec: f64,
    burst: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a bucket issuing `rate_per_sec` tokens per second with the
    /// given burst capacity.
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            rate_per_sec: rate_per_sec.max(0.001),
            burst,
        }
    }

    /// Takes one token, sleeping until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.burst);
                state.last_refill = Instant::now();
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

static REGISTRY: OnceLock<Registry<Arc<dyn Buff>>> = OnceLock::new();

/// The process-wide buff registry.
pub fn registry() -> &'static Registry<Arc<dyn Buff>> {
    REGISTRY.get_or_init(|| Registry::new("buff"))
}

/// Registers the built-in buffs.
pub fn register_builtin() {
    let reg = registry();

    reg.register_with_meta(
        "lowercase.Lowercase",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(lowercase::LowercaseBuff) as Arc<dyn Buff>),
        ),
        PluginMeta::new("lowercase.Lowercase", "lowercases every prompt"),
    );

    reg.register_with_meta(
        "encoding.Base64",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(encoding::Base64Buff) as Arc<dyn Buff>),
        ),
        PluginMeta::new("encoding.Base64", "wraps prompts in base64"),
    );

    reg.register_with_meta(
        "charswap.CharSwap",
        from_map(charswap::CharSwapConfig::from_bag, |cfg| {
            Ok(Arc::new(charswap::CharSwapBuff::new(cfg)) as Arc<dyn Buff>)
        }),
        PluginMeta::new("charswap.CharSwap", "swaps adjacent characters"),
    );

    reg.register_with_meta(
        "paraphrase.Paraphrase",
        from_map(paraphrase::ParaphraseConfig::from_bag, |cfg| {
            Ok(Arc::new(paraphrase::ParaphraseBuff::new(cfg)) as Arc<dyn Buff>)
        }),
        PluginMeta::new("paraphrase.Paraphrase", "LLM-rephrased prompt variants"),
    );
}
