//! Poll creation dialogue.
//!
//! | state            | input                    | next state              |
//! |------------------|--------------------------|-------------------------|
//! | any              | `/start`                 | awaiting title          |
//! | awaiting title   | text                     | awaiting options (new)  |
//! | awaiting options | text, below the cap      | awaiting options        |
//! | awaiting options | text, cap reached        | none (published)        |
//! | awaiting options | `/done`, has options     | none (published)        |
//! | awaiting options | `/done`, no options      | unchanged               |
//! | awaiting title   | `/done`                  | unchanged (help)        |
//! | none             | text                     | none (help)             |
//! | mid-dialogue     | any other command        | none (help)             |

use std::time::Duration;

use tracing::{info, warn};

use crate::{
    app::{PollView, Services},
    conversation::ConversationState,
    domain::{ChatId, PollId, UserId},
    errors::Error,
    events::{Command, TextMessage},
    poll::Poll,
    texts, Result,
};

pub struct DialogueController {
    svc: Services,
}

impl DialogueController {
    pub fn new(svc: Services) -> Self {
        Self { svc }
    }

    pub async fn handle_message(&self, msg: TextMessage) -> Result<()> {
        let from = &msg.from;
        if let Err(e) = self
            .svc
            .users
            .upsert(
                from.id,
                &from.first_name,
                from.last_name.as_deref(),
                from.username.as_deref(),
            )
            .await
        {
            warn!(user = %from.id, error = %e, "failed to refresh user profile");
        }

        let Some(text) = msg.text.as_deref() else {
            return Ok(());
        };

        let user_id = from.id;
        let state = match self.svc.conversations.get(user_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(user = %user_id, error = %e, "conversation state unavailable");
                None
            }
        };

        match Command::parse(text) {
            Some(cmd) => self.on_command(msg.chat_id, user_id, &cmd, state).await,
            None => self.on_text(msg.chat_id, user_id, text, state).await,
        }
    }

    async fn on_command(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        cmd: &Command,
        state: Option<ConversationState>,
    ) -> Result<()> {
        match (cmd.name.as_str(), state) {
            ("start", _) => {
                self.svc.send_text(chat_id, texts::NEW_POLL).await?;
                self.set_state(user_id, ConversationState::AwaitingTitle)
                    .await
            }
            ("done", Some(ConversationState::AwaitingOptions { poll_id })) => {
                self.finish(chat_id, user_id, poll_id).await
            }
            // Nothing to finish yet; the next text is still the title.
            ("done", Some(ConversationState::AwaitingTitle)) => {
                self.svc.send_text(chat_id, texts::HELP).await
            }
            ("polls", _) => self.list_polls(chat_id, user_id).await,
            (_, Some(_)) => self.help_and_reset(chat_id, user_id).await,
            (_, None) => self.svc.send_text(chat_id, texts::HELP).await,
        }
    }

    async fn on_text(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        text: &str,
        state: Option<ConversationState>,
    ) -> Result<()> {
        match state {
            None => self.svc.send_text(chat_id, texts::HELP).await,
            Some(ConversationState::AwaitingTitle) => {
                let poll_id = self.svc.polls.create(user_id, text).await?;
                info!(user = %user_id, poll = %poll_id, "poll created");
                self.svc
                    .send_text(chat_id, texts::first_option(text))
                    .await?;
                self.set_state(user_id, ConversationState::AwaitingOptions { poll_id })
                    .await
            }
            Some(ConversationState::AwaitingOptions { poll_id }) => {
                let poll = match self.svc.polls.append_option(poll_id, text).await {
                    Ok(p) => p,
                    Err(Error::PollNotFound(_)) => {
                        return self.help_and_reset(chat_id, user_id).await;
                    }
                    Err(e) => return Err(e),
                };

                if poll.options.len() < self.svc.cfg.max_poll_options {
                    self.svc.send_text(chat_id, texts::NEXT_OPTION).await?;
                    self.set_state(user_id, ConversationState::AwaitingOptions { poll_id })
                        .await
                } else {
                    self.publish(chat_id, user_id, &poll).await
                }
            }
        }
    }

    async fn finish(&self, chat_id: ChatId, user_id: UserId, poll_id: PollId) -> Result<()> {
        let Some(poll) = self.svc.polls.get(poll_id).await? else {
            return self.help_and_reset(chat_id, user_id).await;
        };

        if poll.options.is_empty() {
            return self.svc.send_text(chat_id, texts::PREMATURE_DONE).await;
        }
        self.publish(chat_id, user_id, &poll).await
    }

    /// Confirm, then deliver the interactive poll shortly after so it lands
    /// below the confirmation in the chat.
    async fn publish(&self, chat_id: ChatId, user_id: UserId, poll: &Poll) -> Result<()> {
        self.svc
            .send_text(chat_id, texts::done(&self.svc.cfg.bot_username))
            .await?;
        self.svc
            .send_poll(chat_id, poll, PollView::Vote, self.svc.cfg.publish_delay)
            .await?;
        info!(user = %user_id, poll = %poll.id, options = poll.options.len(), "poll published");
        self.svc.conversations.clear(user_id).await
    }

    async fn list_polls(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        let polls = self
            .svc
            .polls
            .query_by_admin(user_id, self.svc.cfg.polls_list_limit)
            .await?;
        if polls.is_empty() {
            return self.svc.send_text(chat_id, texts::HELP).await;
        }

        for poll in &polls {
            self.svc
                .send_poll(chat_id, poll, PollView::Admin, Duration::ZERO)
                .await?;
        }
        Ok(())
    }

    async fn help_and_reset(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.svc.send_text(chat_id, texts::HELP).await?;
        self.svc.conversations.clear(user_id).await
    }

    async fn set_state(&self, user_id: UserId, state: ConversationState) -> Result<()> {
        self.svc
            .conversations
            .set(user_id, state, self.svc.cfg.conversation_ttl)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        conversation::{ConversationStore, MemoryConversationStore},
        events::Sender,
        outbox::{OutboundRequest, RecordingOutbox},
        store::{MemoryPollRepository, MemoryUserStore, PollRepository, UserStore},
    };
    use std::sync::Arc;

    const ADMIN: UserId = UserId(77);
    const CHAT: ChatId = ChatId(77);

    struct Harness {
        dialogue: DialogueController,
        polls: Arc<MemoryPollRepository>,
        conversations: Arc<MemoryConversationStore>,
        users: Arc<MemoryUserStore>,
        outbox: Arc<RecordingOutbox>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(Config::default())
        }

        fn with_config(cfg: Config) -> Self {
            let polls = Arc::new(MemoryPollRepository::new());
            let conversations = Arc::new(MemoryConversationStore::new());
            let users = Arc::new(MemoryUserStore::new());
            let outbox = Arc::new(RecordingOutbox::new());
            let dialogue = DialogueController::new(Services {
                cfg: Arc::new(cfg),
                polls: polls.clone(),
                conversations: conversations.clone(),
                users: users.clone(),
                outbox: outbox.clone(),
            });
            Self {
                dialogue,
                polls,
                conversations,
                users,
                outbox,
            }
        }

        async fn say(&self, text: &str) {
            self.send(Some(text)).await;
        }

        async fn send(&self, text: Option<&str>) {
            self.dialogue
                .handle_message(TextMessage {
                    chat_id: CHAT,
                    from: Sender {
                        id: ADMIN,
                        first_name: "Ada".into(),
                        last_name: Some("King".into()),
                        username: Some("ada".into()),
                    },
                    text: text.map(str::to_string),
                })
                .await
                .unwrap();
        }

        async fn state(&self) -> Option<ConversationState> {
            self.conversations.get(ADMIN).await.unwrap()
        }

        /// Texts of plain messages sent so far (drains the outbox).
        fn texts(&self) -> Vec<String> {
            self.outbox
                .take()
                .into_iter()
                .filter_map(|r| match r {
                    OutboundRequest::SendMessage {
                        text,
                        keyboard: None,
                        ..
                    } => Some(text),
                    _ => None,
                })
                .collect()
        }

        /// Polls sent with buttons, with their delays.
        fn published(&self) -> Vec<(String, usize, Duration)> {
            self.outbox
                .queued()
                .into_iter()
                .filter_map(|(r, delay)| match r {
                    OutboundRequest::SendMessage {
                        text,
                        keyboard: Some(kb),
                        ..
                    } => Some((text, kb.rows.len(), delay)),
                    _ => None,
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn nine_options_then_done_publishes_once() {
        let h = Harness::new();
        h.say("/start").await;
        assert_eq!(h.state().await, Some(ConversationState::AwaitingTitle));
        h.say("Lunch?").await;
        for i in 1..=9 {
            h.say(&format!("option {i}")).await;
        }
        assert!(matches!(
            h.state().await,
            Some(ConversationState::AwaitingOptions { .. })
        ));
        assert!(h.published().is_empty());

        h.say("/done").await;
        let published = h.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, 9);
        assert_eq!(published[0].2, Duration::from_millis(500));
        assert!(published[0].0.starts_with("Lunch?\n\noption 1\n"));
        assert_eq!(h.state().await, None);

        let polls = h.polls.query_by_admin(ADMIN, 50).await.unwrap();
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0].options.len(), 9);
    }

    #[tokio::test]
    async fn tenth_option_auto_publishes() {
        let h = Harness::new();
        h.say("/start").await;
        h.say("Lunch?").await;
        for i in 1..=10 {
            h.say(&format!("option {i}")).await;
        }

        let published = h.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, 10);
        assert_eq!(h.state().await, None);

        let texts = h.texts();
        assert_eq!(texts[0], texts::NEW_POLL);
        assert_eq!(texts[1], texts::first_option("Lunch?"));
        assert_eq!(
            texts.iter().filter(|t| *t == texts::NEXT_OPTION).count(),
            9
        );
        assert_eq!(texts.last().unwrap(), &texts::done("countmeinbot"));

        // Further text is outside any dialogue.
        h.say("option 11").await;
        assert_eq!(h.texts(), vec![texts::HELP.to_string()]);
        let polls = h.polls.query_by_admin(ADMIN, 50).await.unwrap();
        assert_eq!(polls[0].options.len(), 10);
    }

    #[tokio::test]
    async fn done_without_options_reminds_and_keeps_state() {
        let h = Harness::new();
        h.say("/start").await;
        h.say("Lunch?").await;
        let before = h.state().await;
        h.texts();

        h.say("/done").await;
        assert_eq!(h.texts(), vec![texts::PREMATURE_DONE.to_string()]);
        assert!(h.published().is_empty());
        assert_eq!(h.state().await, before);
        assert!(matches!(
            before,
            Some(ConversationState::AwaitingOptions { .. })
        ));
    }

    #[tokio::test]
    async fn text_without_context_gets_help() {
        let h = Harness::new();
        h.say("hello").await;
        h.say("/done").await;
        h.say("/whatever").await;
        assert_eq!(h.texts(), vec![texts::HELP.to_string(); 3]);
        assert_eq!(h.state().await, None);
        assert!(h.polls.query_by_admin(ADMIN, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_command_mid_dialogue_resets() {
        let h = Harness::new();
        h.say("/start").await;
        h.say("/help").await;
        assert_eq!(h.state().await, None);

        h.say("/start").await;
        h.say("Title").await;
        h.say("/settings").await;
        assert_eq!(h.state().await, None);

        let texts = h.texts();
        assert_eq!(texts.iter().filter(|t| *t == texts::HELP).count(), 2);
    }

    #[tokio::test]
    async fn done_before_title_keeps_waiting_for_title() {
        let h = Harness::new();
        h.say("/start").await;
        h.say("/done").await;
        assert_eq!(h.state().await, Some(ConversationState::AwaitingTitle));
        assert_eq!(h.texts().last().map(String::as_str), Some(texts::HELP));

        h.say("Lunch?").await;
        let polls = h.polls.query_by_admin(ADMIN, 50).await.unwrap();
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0].title, "Lunch?");
        assert!(matches!(
            h.state().await,
            Some(ConversationState::AwaitingOptions { poll_id }) if poll_id == polls[0].id
        ));
    }

    #[tokio::test]
    async fn start_restarts_from_any_state() {
        let h = Harness::new();
        h.say("/start").await;
        h.say("First").await;
        h.say("a").await;
        h.say("/start@countmeinbot").await;
        assert_eq!(h.state().await, Some(ConversationState::AwaitingTitle));
    }

    #[tokio::test]
    async fn expired_state_is_no_context() {
        let h = Harness::with_config(Config {
            conversation_ttl: Duration::ZERO,
            ..Config::default()
        });
        h.say("/start").await;
        h.say("Lunch?").await;
        assert!(h.polls.query_by_admin(ADMIN, 50).await.unwrap().is_empty());
        assert_eq!(h.texts().last().unwrap(), texts::HELP);
    }

    #[tokio::test]
    async fn deleted_poll_mid_dialogue_resets() {
        let h = Harness::new();
        h.say("/start").await;
        h.say("Lunch?").await;
        let Some(ConversationState::AwaitingOptions { poll_id }) = h.state().await else {
            panic!("expected awaiting options");
        };
        h.polls.delete(poll_id).await;
        h.texts();

        h.say("Pizza").await;
        assert_eq!(h.texts(), vec![texts::HELP.to_string()]);
        assert_eq!(h.state().await, None);
    }

    #[tokio::test]
    async fn non_text_messages_only_refresh_profile() {
        let h = Harness::new();
        h.send(None).await;
        assert!(h.outbox.requests().is_empty());

        let profile = h.users.get(ADMIN).await.unwrap().unwrap();
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.last_name.as_deref(), Some("King"));
        assert_eq!(profile.username.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn polls_command_resends_with_admin_buttons() {
        let h = Harness::with_config(Config {
            polls_list_limit: 2,
            ..Config::default()
        });
        h.say("/polls").await;
        assert_eq!(h.texts(), vec![texts::HELP.to_string()]);

        for title in ["one", "two", "three"] {
            let id = h.polls.create(ADMIN, title).await.unwrap();
            h.polls.append_option(id, "x").await.unwrap();
        }
        h.say("/start").await;
        h.texts();

        h.say("/polls").await;
        let published = h.published();
        assert_eq!(published.len(), 2);
        assert!(published[0].0.starts_with("three\n\n"));
        assert!(published[1].0.starts_with("two\n\n"));
        assert_eq!(published[0].2, Duration::ZERO);
        assert_eq!(h.state().await, Some(ConversationState::AwaitingTitle));
    }
}
