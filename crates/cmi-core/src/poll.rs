//! Poll aggregate: options, voters, rendering and button layout.
//!
//! Options are referenced by position in every button that has ever been sent,
//! so the option list is append-only while the poll is being created and is
//! never reordered or shrunk afterwards.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{PollId, UserId},
    errors::Error,
    keyboard::{InlineButton, InlineKeyboard},
    Result,
};

const RESPONDENTS_ICON: &str = "\u{1f465}";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: Option<String>,
}

/// A single answer choice and the users currently holding it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub title: String,
    /// Insertion-ordered; membership is the whole vote state.
    #[serde(default)]
    pub voters: Vec<Voter>,
}

impl PollOption {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            voters: Vec::new(),
        }
    }

    pub fn has_voter(&self, user_id: UserId) -> bool {
        self.voters.iter().any(|v| v.user_id == user_id)
    }

    /// Flip `user_id`'s vote on this option and describe what happened.
    pub fn toggle(&mut self, user_id: UserId, first_name: &str, last_name: Option<&str>) -> String {
        if let Some(pos) = self.voters.iter().position(|v| v.user_id == user_id) {
            self.voters.remove(pos);
            return format!("Your name was removed from {}!", self.title);
        }

        self.voters.push(Voter {
            user_id,
            first_name: first_name.to_string(),
            last_name: last_name.map(str::to_string),
        });
        format!("Your name was added to {}!", self.title)
    }

    pub fn render_voter_names(&self) -> String {
        self.voters
            .iter()
            .map(|v| v.first_name.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub admin_id: UserId,
    pub title: String,
    /// Stored only; nothing transitions it yet.
    pub active: bool,
    /// Stored only; toggling one option never clears the others.
    pub multi: bool,
    pub options: Vec<PollOption>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Poll {
    pub fn new(id: PollId, admin_id: UserId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            admin_id,
            title: title.into(),
            active: true,
            multi: true,
            options: Vec::new(),
            created: now,
            updated: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }

    pub fn append_option(&mut self, title: impl Into<String>) {
        self.options.push(PollOption::new(title));
        self.touch();
    }

    /// Apply a vote toggle to the option at `index`.
    ///
    /// Negative or out-of-range indices come from stale or forged buttons and
    /// leave the poll untouched.
    pub fn toggle_vote(
        &mut self,
        index: i64,
        user_id: UserId,
        first_name: &str,
        last_name: Option<&str>,
    ) -> Result<String> {
        let poll_id = self.id;
        let invalid = move || Error::InvalidOption { poll_id, index };
        let idx = usize::try_from(index).map_err(|_| invalid())?;
        let Some(option) = self.options.get_mut(idx) else {
            return Err(invalid());
        };

        let status = option.toggle(user_id, first_name, last_name);
        self.touch();
        Ok(status)
    }

    /// Distinct users with at least one vote anywhere in the poll.
    pub fn respondent_count(&self) -> usize {
        self.options
            .iter()
            .flat_map(|o| o.voters.iter().map(|v| v.user_id))
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn options_summary(&self) -> String {
        self.options
            .iter()
            .map(|o| o.title.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }

    pub fn render_text(&self) -> String {
        let mut out = format!("{}\n\n", self.title);
        for option in &self.options {
            out.push_str(&option.title);
            out.push('\n');
            out.push_str(&option.render_voter_names());
            out.push_str("\n\n");
        }
        out.push_str(RESPONDENTS_ICON);
        out.push(' ');
        out.push_str(&respondents_summary(self.respondent_count()));
        out
    }

    pub fn build_vote_buttons(&self) -> InlineKeyboard {
        InlineKeyboard::one_per_row(self.options.iter().enumerate().map(|(idx, o)| {
            InlineButton {
                label: o.title.clone(),
                callback_data: CallbackToken {
                    poll_id: self.id,
                    option_index: idx as i64,
                }
                .encode(),
            }
        }))
    }

    /// Buttons for the poll creator's own copy.
    ///
    /// Same layout as the vote buttons until admin-only actions exist.
    pub fn build_admin_buttons(&self) -> InlineKeyboard {
        self.build_vote_buttons()
    }
}

fn respondents_summary(count: usize) -> String {
    match count {
        0 => "Nobody has responded".to_string(),
        1 => "1 person responded".to_string(),
        n => format!("{n} people responded"),
    }
}

/// Self-describing button payload: `"{poll_id} {option_index}"`.
///
/// Carrying both numbers means a press can be handled from any published copy
/// of the poll without server-side session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackToken {
    pub poll_id: PollId,
    pub option_index: i64,
}

impl CallbackToken {
    pub fn encode(&self) -> String {
        format!("{} {}", self.poll_id.0, self.option_index)
    }

    pub fn parse(data: &str) -> Result<Self> {
        let malformed = || Error::MalformedCallback(data.to_string());
        let mut parts = data.split_whitespace();
        let poll_id = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(malformed)?;
        let option_index = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(Self {
            poll_id: PollId(poll_id),
            option_index,
        })
    }
}
