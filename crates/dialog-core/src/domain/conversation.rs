// ============================================================================
// Dialog Core - Conversation Aggregate
// File: crates/dialog-core/src/domain/conversation.rs
// Description: Per-turn message window and prompt assembly
// ============================================================================

use super::message::Message;

pub const DEFAULT_MESSAGE_TEMPLATE: &str = "<s>{role}\n{content}</s>\n";
pub const DEFAULT_RESPONSE_TEMPLATE: &str = "<s>bot\n";

/// Templates used to render a conversation into a model prompt.
///
/// `message_template` is applied to every message with `{role}` and
/// `{content}` substituted; `response_template` is appended once to prime
/// the bot's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFormat {
    pub message_template: String,
    pub response_template: String,
}

impl PromptFormat {
    pub fn render_message(&self, message: &Message) -> String {
        // Substitute content last so braces inside user text stay untouched.
        self.message_template
            .replace("{role}", message.role().as_str())
            .replace("{content}", message.content())
    }
}

impl Default for PromptFormat {
    fn default() -> Self {
        Self {
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
            response_template: DEFAULT_RESPONSE_TEMPLATE.to_string(),
        }
    }
}

/// In-memory view of one chat, rebuilt for every user turn.
///
/// Index 0 always holds the system message and is never evicted, so the
/// conversation is never empty.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    format: PromptFormat,
}

impl Conversation {
    pub fn new(system: Message) -> Self {
        Self::with_format(system, PromptFormat::default())
    }

    pub fn with_format(system: Message, format: PromptFormat) -> Self {
        Self {
            messages: vec![system],
            format,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend<I: IntoIterator<Item = Message>>(&mut self, messages: I) {
        self.messages.extend(messages);
    }

    /// Remove the oldest message after the system message.
    /// Returns `None` once only the system message is left.
    pub fn evict_oldest(&mut self) -> Option<Message> {
        if self.messages.len() < 2 {
            return None;
        }
        Some(self.messages.remove(1))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_message(&self) -> &Message {
        &self.messages[0]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total character count over all messages.
    pub fn size(&self) -> usize {
        self.messages.iter().map(Message::size).sum()
    }

    pub fn prompt(&self) -> String {
        let mut text = String::with_capacity(self.size() + self.messages.len() * 16);
        for message in &self.messages {
            text.push_str(&self.format.render_message(message));
        }
        text.push_str(&self.format.response_template);
        text.trim().to_string()
    }
}
