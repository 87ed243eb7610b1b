//! Outbound dispatch.
//!
//! The core never talks to the chat transport directly. It describes each call
//! as an [`OutboundRequest`] and hands it to an [`Outbox`], which is
//! fire-and-forget from the caller's point of view. A [`DeliveryPort`]
//! implementation performs the actual call later.

pub mod queue;
pub mod recording;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, EditTarget},
    keyboard::InlineKeyboard,
    Result,
};

pub use queue::{outbox_channel, OutboxWorker, QueueOutbox, RetryPolicy};
pub use recording::RecordingOutbox;

/// One outbound transport call, fully typed.
///
/// Serialised form is what travels through the queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OutboundRequest {
    SendMessage {
        chat_id: ChatId,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    EditMessageText {
        target: EditTarget,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    AnswerCallbackQuery {
        callback_query_id: String,
        text: Option<String>,
    },
    AnswerInlineQuery {
        inline_query_id: String,
        results: Vec<InlineResult>,
        switch_pm_text: Option<String>,
        switch_pm_parameter: Option<String>,
        cache_time: u32,
    },
}

impl OutboundRequest {
    pub fn method(&self) -> &'static str {
        match self {
            OutboundRequest::SendMessage { .. } => "send_message",
            OutboundRequest::EditMessageText { .. } => "edit_message_text",
            OutboundRequest::AnswerCallbackQuery { .. } => "answer_callback_query",
            OutboundRequest::AnswerInlineQuery { .. } => "answer_inline_query",
        }
    }
}

/// A selectable article in an inline query answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineResult {
    pub id: String,
    pub title: String,
    pub description: String,
    pub message_text: String,
    pub keyboard: InlineKeyboard,
}

#[async_trait]
pub trait Outbox: Send + Sync {
    /// Queue `request` for delivery after `delay`. Does not wait for delivery.
    async fn enqueue(&self, request: OutboundRequest, delay: Duration) -> Result<()>;
}

/// Why a delivery attempt did not go through.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// A known-harmless transport complaint (e.g. "message is not modified").
    #[error("benign delivery error: {0}")]
    Benign(String),

    /// Anything else; worth another attempt.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// The transport side of the outbox.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn deliver(&self, request: OutboundRequest) -> std::result::Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, MessageRef};

    #[test]
    fn requests_serialise_with_method_tag() {
        let req = OutboundRequest::EditMessageText {
            target: EditTarget::Chat(MessageRef {
                chat_id: ChatId(10),
                message_id: MessageId(20),
            }),
            text: "t".into(),
            keyboard: None,
        };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["method"], "edit_message_text");
        assert_eq!(json["target"]["kind"], "chat");
        assert_eq!(json["target"]["chat_id"], 10);
        assert_eq!(json["target"]["message_id"], 20);
        assert_eq!(req.method(), "edit_message_text");

        let inline = EditTarget::Inline {
            inline_message_id: "abc".into(),
        };
        let json = serde_json::to_value(&inline).unwrap();
        assert_eq!(json["kind"], "inline");
        assert_eq!(json["inline_message_id"], "abc");
    }
}
