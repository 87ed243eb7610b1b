//! Telegram updates to core events.

use teloxide::types::{CallbackQuery, InlineQuery, Message, User};

use cmi_core::{
    domain::{ChatId, EditTarget, MessageId, MessageRef, UserId},
    events::{self, ButtonPress, IncomingEvent, Sender, TextMessage},
};

pub fn sender(user: &User) -> Sender {
    Sender {
        id: UserId(user.id.0 as i64),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
    }
}

/// Channel posts carry no sender and are skipped.
pub fn message_event(msg: &Message) -> Option<IncomingEvent> {
    let from = msg.from()?;
    Some(IncomingEvent::Message(TextMessage {
        chat_id: ChatId(msg.chat.id.0),
        from: sender(from),
        text: msg.text().map(str::to_string),
    }))
}

pub fn callback_event(q: &CallbackQuery) -> IncomingEvent {
    // Inline copies have no chat message; the inline id wins when both are present.
    let target = match (&q.inline_message_id, &q.message) {
        (Some(id), _) => Some(EditTarget::Inline {
            inline_message_id: id.clone(),
        }),
        (None, Some(m)) => Some(EditTarget::Chat(MessageRef {
            chat_id: ChatId(m.chat.id.0),
            message_id: MessageId(m.id.0),
        })),
        (None, None) => None,
    };
    IncomingEvent::ButtonPress(ButtonPress {
        press_id: q.id.clone(),
        from: sender(&q.from),
        data: q.data.clone(),
        target,
    })
}

pub fn inline_event(q: &InlineQuery) -> IncomingEvent {
    IncomingEvent::InlineQuery(events::InlineQuery {
        query_id: q.id.clone(),
        from: sender(&q.from),
        query: q.query.clone(),
    })
}
