use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use cmi_core::{
    app::{PollBot, Services},
    config::Config,
    conversation::MemoryConversationStore,
    outbox::{outbox_channel, OutboxWorker},
    store::{MemoryPollRepository, MemoryUserStore, PollRepository, UserStore},
};
use cmi_sqlite::SqliteStore;
use cmi_telegram::{Bot, TelegramDelivery};

/// `DATABASE_URL` value selecting the non-durable in-memory stores.
const MEMORY_DATABASE: &str = "memory";

#[tokio::main]
async fn main() -> Result<(), cmi_core::Error> {
    cmi_core::logging::init("cmi")?;

    let cfg = Arc::new(Config::load()?);

    let (polls, users): (Arc<dyn PollRepository>, Arc<dyn UserStore>) =
        if cfg.database_url == MEMORY_DATABASE {
            info!("using in-memory storage; polls are lost on restart");
            (
                Arc::new(MemoryPollRepository::new()),
                Arc::new(MemoryUserStore::new()),
            )
        } else {
            let store =
                Arc::new(SqliteStore::connect(&cfg.database_url, cfg.database_max_connections).await?);
            (store.clone(), store)
        };

    let conversations = Arc::new(MemoryConversationStore::new());
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let shutdown = CancellationToken::new();
    let (outbox, rx) = outbox_channel();
    let worker = OutboxWorker::new(
        rx,
        Arc::new(TelegramDelivery::new(bot.clone())),
        cfg.retry_policy(),
    );
    let worker = tokio::spawn(worker.run(shutdown.clone()));
    let sweeper = tokio::spawn(sweep_conversations(
        conversations.clone(),
        cfg.conversation_ttl,
        shutdown.clone(),
    ));

    let poll_bot = Arc::new(PollBot::new(Services {
        cfg: cfg.clone(),
        polls,
        conversations,
        users,
        outbox: Arc::new(outbox),
    }));

    let result = cmi_telegram::router::run(cfg, bot, poll_bot)
        .await
        .map_err(|e| cmi_core::Error::External(format!("telegram bot failed: {e}")));

    info!("shutting down; flushing outbound queue");
    shutdown.cancel();
    if let Err(e) = worker.await {
        error!(error = %e, "outbox worker panicked");
    }
    if let Err(e) = sweeper.await {
        error!(error = %e, "conversation sweeper panicked");
    }

    result
}

/// Drop expired dialogue state so abandoned conversations do not accumulate.
async fn sweep_conversations(
    store: Arc<MemoryConversationStore>,
    ttl: Duration,
    shutdown: CancellationToken,
) {
    let mut tick = tokio::time::interval(ttl.max(Duration::from_secs(60)));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick.tick() => {
                let purged = store.purge_expired().await;
                if purged > 0 {
                    debug!(purged, "expired conversations removed");
                }
            }
        }
    }
}
