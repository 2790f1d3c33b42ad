//! Case-normalization buff.

use async_trait::async_trait;

use crate::context::ScanContext;
use crate::conversation::Conversation;
use crate::error::BuffError;
use crate::generators::Generator;

use super::Buff;

/// Lowercases every user turn.
///
/// Useful against filters keyed on cased trigger words.
pub struct LowercaseBuff;

#[async_trait]
impl Buff for LowercaseBuff {
    fn name(&self) -> &str {
        "lowercase.Lowercase"
    }

    async fn transform(
        &self,
        _ctx: &ScanContext,
        conversation: &Conversation,
        _generator: &dyn Generator,
    ) -> Result<Vec<Conversation>, BuffError> {
        let mut variant = conversation.clone();
        for turn in &mut variant.turns {
            if turn.role == "user" {
                turn.content = turn.content.to_lowercase();
            }
        }
        Ok(vec![variant])
    }
}
