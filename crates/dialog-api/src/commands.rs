//! Chat command recognition

/// Commands understood by the bot. Anything else is a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    ResetContext,
    Help,
    Window,
    Inline,
    CurrentMode,
}

impl Command {
    /// Parse the leading `/command` of a message.
    ///
    /// A `@botname` suffix and trailing arguments are ignored; unknown
    /// commands yield `None` so they are answered as free text.
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.trim_start().split_whitespace().next()?;
        let name = token.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);

        match name {
            "start" => Some(Command::Start),
            "reset_context" => Some(Command::ResetContext),
            "help" => Some(Command::Help),
            "window" => Some(Command::Window),
            "inline" => Some(Command::Inline),
            "current_mode" => Some(Command::CurrentMode),
            _ => None,
        }
    }
}
