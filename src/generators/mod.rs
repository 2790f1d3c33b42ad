//! Generator contract and built-in adapters.
//!
//! A generator is an adapter around a text-generation backend: given a
//! conversation, it returns `n` completions. Generators are stateless
//! across calls unless documented otherwise, and safe for concurrent use.

pub mod openai;

pub use openai::{OpenAiConfig, OpenAiGenerator};
pub use test::{BlankGenerator, RepeatGenerator, SleepGenerator};

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::context::ScanContext;
use crate::conversation::{Conversation, Message};
use crate::error::GeneratorError;
use crate::registry::{from_map, Config, PluginMeta, Registry};

/// An adapter around a text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Fully qualified generator name, e.g. `"openai.OpenAI"`.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Returns `n` completions for the conversation.
    ///
    /// Must return an empty sequence without error when `n == 0`. The call
    /// must unblock promptly when `ctx` is cancelled.
    async fn generate(
        &self,
        ctx: &ScanContext,
        conversation: &Conversation,
        n: usize,
    ) -> Result<Vec<Message>, GeneratorError>;

    /// Resets any internal session state.
    fn clear_history(&self) {}
}

static REGISTRY: OnceLock<Registry<Arc<dyn Generator>>> = OnceLock::new();

/// The process-wide generator registry.
pub fn registry() -> &'static Registry<Arc<dyn Generator>> {
    REGISTRY.get_or_init(|| Registry::new("generator"))
}

/// Registers the built-in generators.
pub fn register_builtin() {
    let reg = registry();

    reg.register_with_meta(
        "openai.OpenAI",
        from_map(OpenAiConfig::from_bag, |cfg| {
            Ok(Arc::new(OpenAiGenerator::new(cfg)) as Arc<dyn Generator>)
        }),
        PluginMeta::new("openai.OpenAI", "OpenAI-compatible chat completions API"),
    );

    reg.register_with_meta(
        "test.Repeat",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(RepeatGenerator::new()) as Arc<dyn Generator>),
        ),
        PluginMeta::new("test.Repeat", "echoes the last user prompt"),
    );

    reg.register_with_meta(
        "test.Blank",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(BlankGenerator::new()) as Arc<dyn Generator>),
        ),
        PluginMeta::new("test.Blank", "returns empty completions"),
    );

    reg.register_with_meta(
        "test.Sleep",
        from_map(
            |bag: &Config| Ok(bag.get_i64("delay_ms", 1000).max(0) as u64),
            |delay_ms| {
                Ok(Arc::new(SleepGenerator::new(std::time::Duration::from_millis(delay_ms)))
                    as Arc<dyn Generator>)
            },
        ),
        PluginMeta::new("test.Sleep", "sleeps before echoing, for timeout tests"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        register_builtin();
        let reg = registry();
        assert!(reg.has("openai.OpenAI"));
        assert!(reg.has("test.Repeat"));
        assert!(reg.has("test.Blank"));
        assert!(reg.has("test.Sleep"));
    }

    #[test]
    fn test_registration_idempotent() {
        register_builtin();
        let before = registry().count();
        register_builtin();
        assert_eq!(registry().count(), before);
    }

    #[tokio::test]
    async fn test_create_from_registry() {
        register_builtin();
        let generator = registry().create("test.Repeat", &Config::new()).unwrap();
        assert_eq!(generator.name(), "test.Repeat");

        let conv = Conversation::from_prompt("echo me");
        let ctx = ScanContext::new();
        let out = generator.generate(&ctx, &conv, 1).await.unwrap();
        assert_eq!(out[0].content, "echo me");
    }
}
