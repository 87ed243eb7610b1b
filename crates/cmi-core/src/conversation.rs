//! Per-user progress through the poll creation dialogue.
//!
//! State is ephemeral and best-effort: losing it early only means the user is
//! shown the help text again. Poll data never lives here.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{PollId, UserId},
    Result,
};

/// Where a user is in the dialogue. No entry at all means "no context".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    AwaitingTitle,
    AwaitingOptions { poll_id: PollId },
}

/// Volatile key-value cache keyed by user id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<ConversationState>>;

    /// Overwrite the state and restart its idle timer.
    async fn set(&self, user_id: UserId, state: ConversationState, ttl: Duration) -> Result<()>;

    async fn clear(&self, user_id: UserId) -> Result<()>;
}

#[derive(Debug)]
struct Entry {
    state: ConversationState,
    expires_at: Instant,
}

/// In-process store with lazy expiry.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    entries: Mutex<HashMap<UserId, Entry>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.lock().await;
        let before = map.len();
        map.retain(|_, e| e.expires_at > now);
        before - map.len()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get(&self, user_id: UserId) -> Result<Option<ConversationState>> {
        let mut map = self.entries.lock().await;
        match map.get(&user_id) {
            Some(e) if e.expires_at > Instant::now() => Ok(Some(e.state)),
            Some(_) => {
                map.remove(&user_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, user_id: UserId, state: ConversationState, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .insert(user_id, Entry { state, expires_at });
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> Result<()> {
        self.entries.lock().await.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn set_get_clear() {
        let store = MemoryConversationStore::new();
        let u = UserId(1);
        assert_eq!(store.get(u).await.unwrap(), None);

        store
            .set(u, ConversationState::AwaitingTitle, HOUR)
            .await
            .unwrap();
        assert_eq!(
            store.get(u).await.unwrap(),
            Some(ConversationState::AwaitingTitle)
        );

        let next = ConversationState::AwaitingOptions { poll_id: PollId(3) };
        store.set(u, next, HOUR).await.unwrap();
        assert_eq!(store.get(u).await.unwrap(), Some(next));
        assert_eq!(store.get(UserId(2)).await.unwrap(), None);

        store.clear(u).await.unwrap();
        assert_eq!(store.get(u).await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_state_reads_as_no_context() {
        let store = MemoryConversationStore::new();
        store
            .set(UserId(1), ConversationState::AwaitingTitle, Duration::ZERO)
            .await
            .unwrap();
        store
            .set(UserId(2), ConversationState::AwaitingTitle, HOUR)
            .await
            .unwrap();

        assert_eq!(store.get(UserId(1)).await.unwrap(), None);
        store
            .set(UserId(3), ConversationState::AwaitingTitle, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.get(UserId(2)).await.unwrap().is_some());
    }
}
