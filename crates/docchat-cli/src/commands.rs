//! Slash commands for line mode

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pause the pending answer
    Pause,
    /// Ask the paused question again
    Resume,
    /// Discard the pending or paused answer
    Stop,
    Help,
    Quit,
    /// Anything else starting with `/`
    Unknown(String),
}

/// Parse a slash command. Returns `None` for ordinary questions.
pub fn parse_command(input: &str) -> Option<Command> {
    let input = input.trim();
    let name = input.strip_prefix('/')?;
    let name = name.split_whitespace().next().unwrap_or("").to_lowercase();

    Some(match name.as_str() {
        "pause" | "p" => Command::Pause,
        "resume" | "r" => Command::Resume,
        "stop" | "s" => Command::Stop,
        "help" | "h" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(name),
    })
}

pub fn help_message() -> &'static str {
    r#"Type a question and press Enter to ask it.

Available commands:
  /pause, /p           Pause the pending answer
  /resume, /r          Ask the paused question again
  /stop, /s            Discard the pending or paused answer
  /help, /h, /?        Show this help message
  /quit, /exit, /q     Exit docchat

Ctrl+C stops a pending answer, or exits when nothing is pending."#
}
