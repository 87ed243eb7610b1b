//! Telegram adapter (teloxide).
//!
//! This crate implements the `cmi-core` delivery port over the Telegram Bot API
//! and turns Telegram updates into core events.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        InlineKeyboardButton, InlineKeyboardMarkup, InlineQueryResult, InlineQueryResultArticle,
        InputMessageContent, InputMessageContentText,
    },
    ApiError, RequestError,
};

pub mod router;
pub mod updates;

pub use teloxide::Bot;

use cmi_core::{
    domain::{ChatId, EditTarget, MessageId},
    keyboard::InlineKeyboard,
    outbox::{DeliveryError, DeliveryPort, InlineResult, OutboundRequest},
};

#[derive(Clone)]
pub struct TelegramDelivery {
    bot: Bot,
}

impl TelegramDelivery {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    async fn call(&self, request: OutboundRequest) -> Result<(), RequestError> {
        match request {
            OutboundRequest::SendMessage {
                chat_id,
                text,
                keyboard,
            } => {
                let mut req = self.bot.send_message(Self::tg_chat(chat_id), text);
                if let Some(kb) = keyboard {
                    req = req.reply_markup(to_markup(&kb));
                }
                req.await?;
            }
            OutboundRequest::EditMessageText {
                target: EditTarget::Chat(msg),
                text,
                keyboard,
            } => {
                let mut req = self.bot.edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    text,
                );
                if let Some(kb) = keyboard {
                    req = req.reply_markup(to_markup(&kb));
                }
                req.await?;
            }
            OutboundRequest::EditMessageText {
                target: EditTarget::Inline { inline_message_id },
                text,
                keyboard,
            } => {
                let mut req = self.bot.edit_message_text_inline(inline_message_id, text);
                if let Some(kb) = keyboard {
                    req = req.reply_markup(to_markup(&kb));
                }
                req.await?;
            }
            OutboundRequest::AnswerCallbackQuery {
                callback_query_id,
                text,
            } => {
                let mut req = self.bot.answer_callback_query(callback_query_id);
                if let Some(t) = text {
                    req = req.text(t);
                }
                req.await?;
            }
            OutboundRequest::AnswerInlineQuery {
                inline_query_id,
                results,
                switch_pm_text,
                switch_pm_parameter,
                cache_time,
            } => {
                let results: Vec<InlineQueryResult> = results.iter().map(to_article).collect();
                let mut req = self
                    .bot
                    .answer_inline_query(inline_query_id, results)
                    .cache_time(cache_time)
                    .is_personal(true);
                if let Some(t) = switch_pm_text {
                    req = req.switch_pm_text(t);
                }
                if let Some(p) = switch_pm_parameter {
                    req = req.switch_pm_parameter(p);
                }
                req.await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryPort for TelegramDelivery {
    async fn deliver(&self, request: OutboundRequest) -> Result<(), DeliveryError> {
        self.call(request).await.map_err(classify)
    }
}

/// Split Telegram failures into the harmless ones and the ones worth retrying.
pub fn classify(err: RequestError) -> DeliveryError {
    match &err {
        // Re-rendering a poll whose tally did not change.
        RequestError::Api(ApiError::MessageNotModified) => DeliveryError::Benign(err.to_string()),
        _ => DeliveryError::Failed(err.to_string()),
    }
}

pub fn to_markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn to_article(result: &InlineResult) -> InlineQueryResult {
    let content =
        InputMessageContent::Text(InputMessageContentText::new(result.message_text.clone()));
    InlineQueryResult::Article(
        InlineQueryResultArticle::new(result.id.clone(), result.title.clone(), content)
            .description(result.description.clone())
            .reply_markup(to_markup(&result.keyboard)),
    )
}
