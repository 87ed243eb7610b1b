use crate::domain::PollId;

/// Core error type for the poll bot.
///
/// Adapter crates should map their specific errors into this type so the bot
/// core can handle failures consistently (user-facing status vs logged only).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("poll {0} not found")]
    PollNotFound(PollId),

    #[error("poll {poll_id} has no option at index {index}")]
    InvalidOption { poll_id: PollId, index: i64 },

    #[error("malformed callback data: {0:?}")]
    MalformedCallback(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("outbox error: {0}")]
    Outbox(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Short status shown to a voter when their press could not be applied.
    ///
    /// Only the vote failures a user can cause (stale or deleted polls) have one.
    pub fn status_text(&self) -> Option<&'static str> {
        match self {
            Error::PollNotFound(_) => Some("Sorry, this poll has been deleted"),
            Error::InvalidOption { .. } => Some("Sorry, that's an invalid option"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_vote_failures_have_status_text() {
        assert_eq!(
            Error::PollNotFound(PollId(7)).status_text(),
            Some("Sorry, this poll has been deleted")
        );
        assert_eq!(
            Error::InvalidOption {
                poll_id: PollId(7),
                index: -1
            }
            .status_text(),
            Some("Sorry, that's an invalid option")
        );
        assert_eq!(Error::Storage("disk".into()).status_text(), None);
        assert_eq!(Error::MalformedCallback("x".into()).status_text(), None);
    }
}
