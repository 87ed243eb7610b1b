use std::sync::Arc;

use teloxide::{
    dispatching::Dispatcher,
    dptree,
    prelude::*,
    update_listeners::webhooks,
};
use tracing::{info, warn};

use cmi_core::{app::PollBot, config::Config};

use crate::updates;

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<PollBot>,
}

/// Receive updates until Ctrl-C: long polling, or a webhook when `WEBHOOK_URL` is set.
pub async fn run(cfg: Arc<Config>, tg: Bot, poll_bot: Arc<PollBot>) -> anyhow::Result<()> {
    match tg.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "getMe failed"),
    }

    let state = Arc::new(AppState { bot: poll_bot });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_inline_query().endpoint(handle_inline_query))
        .branch(Update::filter_message().endpoint(handle_message));

    let mut dispatcher = Dispatcher::builder(tg.clone(), handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build();

    match cfg.webhook_url.as_deref() {
        Some(raw) => {
            let url: url::Url = raw.parse()?;
            info!(%url, addr = %cfg.webhook_listen_addr, "receiving updates via webhook");
            let listener =
                webhooks::axum(tg, webhooks::Options::new(cfg.webhook_listen_addr, url)).await?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("update listener error"),
                )
                .await;
        }
        None => {
            info!("receiving updates via long polling");
            dispatcher.dispatch().await;
        }
    }

    Ok(())
}

async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(event) = updates::message_event(&msg) {
        state.bot.handle_logged(event).await;
    }
    Ok(())
}

async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    state.bot.handle_logged(updates::callback_event(&q)).await;
    Ok(())
}

async fn handle_inline_query(q: InlineQuery, state: Arc<AppState>) -> ResponseResult<()> {
    state.bot.handle_logged(updates::inline_event(&q)).await;
    Ok(())
}
