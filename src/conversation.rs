//! Conversation value types shared by generators, probes and buffs.

use serde::{Deserialize, Serialize};

/// A message in a conversation with a target model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// An ordered exchange to send to a generator: an optional system message
/// plus the turns so far. Generators serialize this to whatever wire format
/// their backend expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Optional system message prepended to the exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Ordered conversation turns.
    pub turns: Vec<Message>,
}

impl Conversation {
    /// Creates a conversation holding a single user prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            turns: vec![Message::user(prompt)],
        }
    }

    /// Sets the system message.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Appends a turn.
    pub fn push(&mut self, message: Message) {
        self.turns.push(message);
    }

    /// The content of the last user turn, if any.
    pub fn last_user_prompt(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }

    /// The user-facing prompt text of this conversation.
    ///
    /// Attempts record this as the prompt actually sent to the model.
    pub fn prompt_text(&self) -> String {
        self.last_user_prompt().unwrap_or_default().to_string()
    }
}
