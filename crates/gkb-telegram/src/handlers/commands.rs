use teloxide::types::Message;

use gkb_core::domain::ChatId;

use crate::router::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
}

/// Recognize a bot command, tolerating the `@botname` suffix Telegram adds in
/// groups. Unknown commands return None and fall through to text routing.
pub fn parse_command(text: &str) -> Option<Command> {
    let head = text.trim().split_whitespace().next()?;
    let name = head.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    match name {
        "start" => Some(Command::Start),
        _ => None,
    }
}

pub async fn handle_command(
    msg: &Message,
    state: &AppState,
    cmd: Command,
) -> gkb_core::Result<()> {
    match cmd {
        Command::Start => state.engine.handle_start(ChatId(msg.chat.id.0)).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_command_parses_with_and_without_bot_name() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/start@gatekeeper_bot"), Some(Command::Start));
        assert_eq!(parse_command("  /start extra"), Some(Command::Start));
    }

    #[test]
    fn non_commands_fall_through() {
        assert_eq!(parse_command("start"), None);
        assert_eq!(parse_command("/unknown"), None);
        assert_eq!(parse_command("guide1 2323"), None);
    }
}
