//! User-facing reply texts

use dialog_core::Mode;

pub const HELP_TEXT: &str = "I am a chat bot backed by a LLaMA language model.\n\
Just write to me to start talking.\n\
/start - start a conversation with me.\n\
/reset_context - forget our conversation history.\n\
/window - when memory runs out, forget the oldest messages and keep going.\n\
/inline - keep the whole history and report when memory runs out.\n\
/current_mode - show the current conversation mode.\n\
/help - show this message.";

pub const CONFUSED_TEXT: &str = "Sorry, I could not process your message.";

pub const RESET_CHAT_TEXT: &str =
    "I forgot everything we talked about before. Let's start with a clean slate.";

pub const EXIST_CHAT_TEXT: &str =
    "We already have a conversation history. To start over, use /reset_context";

pub const NO_EXIST_CHAT_TEXT: &str =
    "Looks like we have not started a conversation yet. Send /start to begin.";

pub const NO_MODE_TEXT: &str =
    "Pick a conversation mode first: /window or /inline";

pub const OUT_OF_MEMORY_TEXT: &str = "I ran out of memory for this conversation. \
Switch the mode with /window or clear the history with /reset_context";

pub const WINDOW_MODE_TEXT: &str = "Window mode is on. When the conversation no longer fits \
in memory, I will forget the oldest messages.";

pub const INLINE_MODE_TEXT: &str = "Inline mode is on. I keep the whole conversation and \
will tell you when it no longer fits in memory.";

pub fn hello(name: &str) -> String {
    format!(
        "Greetings, {}!\nThis is a chat bot for talking with a LLaMA language model.",
        name
    )
}

pub fn mode_selected(mode: Mode) -> &'static str {
    match mode {
        Mode::Window => WINDOW_MODE_TEXT,
        Mode::Inline => INLINE_MODE_TEXT,
    }
}

pub fn current_mode(mode: Option<Mode>) -> String {
    match mode {
        Some(mode) => format!("Current conversation mode: {}", mode),
        None => "Conversation mode is not selected. Use /window or /inline".to_string(),
    }
}
