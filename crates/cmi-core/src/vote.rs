//! Button presses and inline queries.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::{
    app::Services,
    events::{ButtonPress, InlineQuery},
    outbox::{InlineResult, OutboundRequest},
    poll::{CallbackToken, Poll},
    texts, Result,
};

/// Parameter of the "create new poll" switch button in inline answers.
const SWITCH_PM_PARAMETER: &str = "new";

pub struct VoteController {
    svc: Services,
}

impl VoteController {
    pub fn new(svc: Services) -> Self {
        Self { svc }
    }

    /// Toggle the presser's vote and refresh every copy reachable from the press.
    ///
    /// The press is always acknowledged so the client stops its spinner. Data
    /// that is not a vote token (foreign or stale buttons) gets an empty
    /// acknowledgement and nothing else.
    pub async fn handle_press(&self, press: ButtonPress) -> Result<()> {
        let data = press.data.as_deref().unwrap_or_default();
        let token = match CallbackToken::parse(data) {
            Ok(t) => t,
            Err(e) => {
                info!(error = %e, "ignoring invalid callback query data");
                return self.acknowledge(&press.press_id, None).await;
            }
        };

        let from = &press.from;
        let result = self
            .svc
            .polls
            .toggle_vote(
                token.poll_id,
                token.option_index,
                from.id,
                &from.first_name,
                from.last_name.as_deref(),
            )
            .await;

        let status = match result {
            Ok((poll, status)) => {
                if let Some(target) = press.target.clone() {
                    let edit = OutboundRequest::EditMessageText {
                        target,
                        text: poll.render_text(),
                        keyboard: Some(poll.build_vote_buttons()),
                    };
                    // Vote already committed; the press is acknowledged regardless.
                    if let Err(e) = self.svc.outbox.enqueue(edit, Duration::ZERO).await {
                        warn!(poll = %poll.id, error = %e, "failed to queue poll re-render");
                    }
                }
                status
            }
            Err(e) => match e.status_text() {
                Some(text) => {
                    info!(poll = %token.poll_id, error = %e, "vote rejected");
                    text.to_string()
                }
                None => {
                    error!(poll = %token.poll_id, error = %e, "vote toggle failed");
                    texts::PRESS_FAILED.to_string()
                }
            },
        };

        self.acknowledge(&press.press_id, Some(status)).await
    }

    /// Offer the requester's own polls as ready-to-send interactive messages.
    pub async fn handle_inline_query(&self, query: InlineQuery) -> Result<()> {
        let polls = self
            .svc
            .polls
            .query_votable_by_admin(query.from.id, self.svc.cfg.inline_results_limit)
            .await?;

        let results: Vec<InlineResult> = polls.iter().map(inline_result).collect();
        info!(user = %query.from.id, results = results.len(), "answering inline query");

        self.svc
            .outbox
            .enqueue(
                OutboundRequest::AnswerInlineQuery {
                    inline_query_id: query.query_id,
                    results,
                    switch_pm_text: Some(texts::CREATE_NEW_POLL.to_string()),
                    switch_pm_parameter: Some(SWITCH_PM_PARAMETER.to_string()),
                    cache_time: 0,
                },
                Duration::ZERO,
            )
            .await
    }

    async fn acknowledge(&self, press_id: &str, text: Option<String>) -> Result<()> {
        self.svc
            .outbox
            .enqueue(
                OutboundRequest::AnswerCallbackQuery {
                    callback_query_id: press_id.to_string(),
                    text,
                },
                Duration::ZERO,
            )
            .await
    }
}

fn inline_result(poll: &Poll) -> InlineResult {
    InlineResult {
        id: poll.id.to_string(),
        title: poll.title.clone(),
        description: poll.options_summary(),
        message_text: poll.render_text(),
        keyboard: poll.build_vote_buttons(),
    }
}
