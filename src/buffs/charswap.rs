//! Character-perturbation buff.

use async_trait::async_trait;
use rand::RngExt;

use crate::context::ScanContext;
use crate::conversation::Conversation;
use crate::error::BuffError;
use crate::generators::Generator;
use crate::registry::Config;

use super::Buff;

/// Typed configuration for [`CharSwapBuff`].
#[derive(Debug, Clone)]
pub struct CharSwapConfig {
    /// Fraction of character positions perturbed, in (0, 1].
    pub swap_rate: f64,
}

impl Default for CharSwapConfig {
    fn default() -> Self {
        Self { swap_rate: 0.05 }
    }
}

impl CharSwapConfig {
    /// Sets the perturbation rate.
    pub fn with_swap_rate(mut self, swap_rate: f64) -> Self {
        self.swap_rate = swap_rate.clamp(0.001, 1.0);
        self
    }

    /// Parses a config bag.
    pub fn from_bag(bag: &Config) -> Result<Self, anyhow::Error> {
        let defaults = Self::default();
        Ok(Self::default().with_swap_rate(bag.get_f64("swap_rate", defaults.swap_rate)))
    }
}

/// Swaps adjacent characters at random positions in the last user turn.
///
/// Typo-level noise defeats exact-match safety triggers while leaving the
/// prompt legible to the model.
pub struct CharSwapBuff {
    config: CharSwapConfig,
}

impl CharSwapBuff {
    pub fn new(config: CharSwapConfig) -> Self {
        Self { config }
    }

    fn perturb(&self, text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        if chars.len() < 2 {
            return text.to_string();
        }
        let mut rng = rand::rng();
        let swaps = ((chars.len() as f64 * self.config.swap_rate).ceil() as usize).max(1);
        for _ in 0..swaps {
            let i = rng.random_range(0..chars.len() - 1);
            chars.swap(i, i + 1);
        }
        chars.into_iter().collect()
    }
}

#[async_trait]
impl Buff for CharSwapBuff {
    fn name(&self) -> &str {
        "charswap.CharSwap"
    }

    async fn transform(
        &self,
        _ctx: &ScanContext,
        conversation: &Conversation,
        _generator: &dyn Generator,
    ) -> Result<Vec<Conversation>, BuffError> {
        let mut variant = conversation.clone();
        if let Some(turn) = variant.turns.iter_mut().rev().find(|t| t.role == "user") {
            turn.content = self.perturb(&turn.content);
        }
        Ok(vec![variant])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::RepeatGenerator;

    #[test]
    fn test_perturb_preserves_characters() {
        let buff = CharSwapBuff::new(CharSwapConfig::default());
        let original = "the quick brown fox";
        let mutated = buff.perturb(original);

        assert_eq!(mutated.len(), original.len());
        let mut a: Vec<char> = original.chars().collect();
        let mut b: Vec<char> = mutated.chars().collect();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_text_unchanged() {
        let buff = CharSwapBuff::new(CharSwapConfig::default());
        assert_eq!(buff.perturb("a"), "a");
        assert_eq!(buff.perturb(""), "");
    }

    #[tokio::test]
    async fn test_transform_emits_one_variant() {
        let buff = CharSwapBuff::new(CharSwapConfig::default().with_swap_rate(0.5));
        let conv = Conversation::from_prompt("perturb this prompt text");

        let variants = buff
            .transform(&ScanContext::new(), &conv, &RepeatGenerator::new())
            .await
            .unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(
            variants[0].prompt_text().len(),
            "perturb this prompt text".len()
        );
    }

    #[test]
    fn test_config_from_bag_clamps() {
        let mut bag = Config::new();
        bag.set("swap_rate", 9.0);
        let cfg = CharSwapConfig::from_bag(&bag).unwrap();
        assert!((cfg.swap_rate - 1.0).abs() < f64::EPSILON);
    }
}
