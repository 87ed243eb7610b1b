use std::{env, fs, net::SocketAddr, path::Path, time::Duration};

use crate::{errors::Error, outbox::RetryPolicy, Result};

/// Typed configuration for the poll bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Transport
    pub telegram_bot_token: String,
    pub bot_username: String,
    pub webhook_url: Option<String>,
    pub webhook_listen_addr: SocketAddr,

    // Storage
    pub database_url: String,
    pub database_max_connections: u32,

    // Dialogue
    pub conversation_ttl: Duration,
    pub max_poll_options: usize,
    pub publish_delay: Duration,

    // Listings
    pub inline_results_limit: usize,
    pub polls_list_limit: usize,

    // Outbox
    pub outbox_max_attempts: u32,
    pub outbox_retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            bot_username: "countmeinbot".to_string(),
            webhook_url: None,
            webhook_listen_addr: SocketAddr::from(([0, 0, 0, 0], 8443)),
            database_url: "sqlite:countmein.db".to_string(),
            database_max_connections: 5,
            conversation_ttl: Duration::from_secs(3600),
            max_poll_options: 10,
            publish_delay: Duration::from_millis(500),
            inline_results_limit: 50,
            polls_list_limit: 5,
            outbox_max_attempts: 5,
            outbox_retry_delay: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Load from `.env` (if present) plus the process environment.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let bot_username = get("BOT_USERNAME")
            .map(|s| s.trim().trim_start_matches('@').to_string())
            .unwrap_or(d.bot_username);
        let webhook_url = get("WEBHOOK_URL");
        let webhook_listen_addr = parse(get("WEBHOOK_LISTEN_ADDR")).unwrap_or(d.webhook_listen_addr);

        let database_url = get("DATABASE_URL").unwrap_or(d.database_url);
        let database_max_connections =
            parse::<u32>(get("DATABASE_MAX_CONNECTIONS")).unwrap_or(d.database_max_connections);

        let conversation_ttl = parse::<u64>(get("CONVERSATION_TTL_SECS"))
            .map(Duration::from_secs)
            .unwrap_or(d.conversation_ttl);
        let max_poll_options = parse::<usize>(get("MAX_POLL_OPTIONS"))
            .filter(|n| *n > 0)
            .unwrap_or(d.max_poll_options);
        let publish_delay = parse::<u64>(get("PUBLISH_DELAY_MS"))
            .map(Duration::from_millis)
            .unwrap_or(d.publish_delay);

        let inline_results_limit =
            parse::<usize>(get("INLINE_RESULTS_LIMIT")).unwrap_or(d.inline_results_limit);
        let polls_list_limit = parse::<usize>(get("POLLS_LIST_LIMIT")).unwrap_or(d.polls_list_limit);

        let outbox_max_attempts = parse::<u32>(get("OUTBOX_MAX_ATTEMPTS"))
            .filter(|n| *n > 0)
            .unwrap_or(d.outbox_max_attempts);
        let outbox_retry_delay = parse::<u64>(get("OUTBOX_RETRY_DELAY_MS"))
            .map(Duration::from_millis)
            .unwrap_or(d.outbox_retry_delay);

        Ok(Self {
            telegram_bot_token,
            bot_username,
            webhook_url,
            webhook_listen_addr,
            database_url,
            database_max_connections,
            conversation_ttl,
            max_poll_options,
            publish_delay,
            inline_results_limit,
            polls_list_limit,
            outbox_max_attempts,
            outbox_retry_delay,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.outbox_max_attempts,
            base_delay: self.outbox_retry_delay,
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
    v.and_then(|s| s.trim().parse::<T>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
