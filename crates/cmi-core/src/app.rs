//! Event routing and the collaborator handles every controller shares.

use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
    config::Config,
    conversation::ConversationStore,
    dialogue::DialogueController,
    domain::ChatId,
    events::IncomingEvent,
    outbox::{OutboundRequest, Outbox},
    poll::Poll,
    store::{PollRepository, UserStore},
    vote::VoteController,
    Result,
};

/// Collaborators injected into the controllers.
///
/// Constructed once at process start; cloning only clones the handles.
#[derive(Clone)]
pub struct Services {
    pub cfg: Arc<Config>,
    pub polls: Arc<dyn PollRepository>,
    pub conversations: Arc<dyn ConversationStore>,
    pub users: Arc<dyn UserStore>,
    pub outbox: Arc<dyn Outbox>,
}

/// How a poll is rendered when it is sent as a new message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollView {
    Vote,
    Admin,
}

impl Services {
    pub async fn send_text(&self, chat_id: ChatId, text: impl Into<String>) -> Result<()> {
        self.outbox
            .enqueue(
                OutboundRequest::SendMessage {
                    chat_id,
                    text: text.into(),
                    keyboard: None,
                },
                Duration::ZERO,
            )
            .await
    }

    /// Send the rendered poll with its buttons, after `delay`.
    pub async fn send_poll(
        &self,
        chat_id: ChatId,
        poll: &Poll,
        view: PollView,
        delay: Duration,
    ) -> Result<()> {
        let keyboard = match view {
            PollView::Vote => poll.build_vote_buttons(),
            PollView::Admin => poll.build_admin_buttons(),
        };
        self.outbox
            .enqueue(
                OutboundRequest::SendMessage {
                    chat_id,
                    text: poll.render_text(),
                    keyboard: Some(keyboard),
                },
                delay,
            )
            .await
    }
}

/// Entry point for inbound events. Stateless; safe to call concurrently.
pub struct PollBot {
    dialogue: DialogueController,
    votes: VoteController,
}

impl PollBot {
    pub fn new(services: Services) -> Self {
        Self {
            dialogue: DialogueController::new(services.clone()),
            votes: VoteController::new(services),
        }
    }

    pub async fn handle(&self, event: IncomingEvent) -> Result<()> {
        match event {
            IncomingEvent::Message(msg) => {
                info!(user = %msg.from.id, "processing incoming message");
                self.dialogue.handle_message(msg).await
            }
            IncomingEvent::ButtonPress(press) => {
                info!(user = %press.from.id, "processing incoming button press");
                self.votes.handle_press(press).await
            }
            IncomingEvent::InlineQuery(query) => {
                info!(user = %query.from.id, "processing incoming inline query");
                self.votes.handle_inline_query(query).await
            }
        }
    }

    /// Like [`PollBot::handle`] but never fails; errors are logged.
    pub async fn handle_logged(&self, event: IncomingEvent) {
        if let Err(e) = self.handle(event).await {
            warn!(error = %e, "event handling failed");
        }
    }
}
