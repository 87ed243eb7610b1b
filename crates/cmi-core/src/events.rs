use crate::domain::{ChatId, EditTarget, UserId};

/// Transport-agnostic incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug)]
pub enum IncomingEvent {
    Message(TextMessage),
    ButtonPress(ButtonPress),
    InlineQuery(InlineQuery),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub from: Sender,
    /// `None` for stickers, photos and other non-text messages.
    pub text: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ButtonPress {
    pub press_id: String,
    pub from: Sender,
    pub data: Option<String>,
    /// Where the pressed poll lives; absent when the message is no longer reachable.
    pub target: Option<EditTarget>,
}

#[derive(Clone, Debug)]
pub struct InlineQuery {
    pub query_id: String,
    pub from: Sender,
    pub query: String,
}

/// A slash command, normalised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub name: String,
}

impl Command {
    /// Telegram may send `/cmd@botname arg1 ...`; arguments are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let first = text.split_whitespace().next().unwrap_or("");
        let name = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();

        Some(Self { name })
    }
}
