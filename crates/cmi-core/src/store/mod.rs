//! Persistence ports: poll aggregates and cached user profiles.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{PollId, UserId},
    poll::Poll,
    Result,
};

pub use memory::{MemoryPollRepository, MemoryUserStore};

/// Transactional load/mutate/save of [`Poll`] aggregates.
///
/// Every mutation re-reads the poll inside the store's transaction, so two
/// writers on the same poll never lose each other's update. Writers on
/// different polls must not block each other.
#[async_trait]
pub trait PollRepository: Send + Sync {
    /// Insert a fresh poll with no options and return its id.
    async fn create(&self, admin_id: UserId, title: &str) -> Result<PollId>;

    /// Append an option and return the updated poll.
    async fn append_option(&self, poll_id: PollId, title: &str) -> Result<Poll>;

    /// Toggle one voter on one option.
    ///
    /// Fails with `PollNotFound` (nothing written) when the poll is gone and
    /// with `InvalidOption` when `option_index` is negative or out of range.
    async fn toggle_vote(
        &self,
        poll_id: PollId,
        option_index: i64,
        voter_id: UserId,
        first_name: &str,
        last_name: Option<&str>,
    ) -> Result<(Poll, String)>;

    async fn get(&self, poll_id: PollId) -> Result<Option<Poll>>;

    /// The admin's polls, newest first, at most `limit`.
    async fn query_by_admin(&self, admin_id: UserId, limit: usize) -> Result<Vec<Poll>>;

    /// Like [`PollRepository::query_by_admin`] but skips polls without options,
    /// before the limit is applied.
    async fn query_votable_by_admin(&self, admin_id: UserId, limit: usize) -> Result<Vec<Poll>>;
}

/// Cached profile of someone who has talked to the bot. Not authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert or refresh the name fields; `created` is kept on refresh.
    async fn upsert(
        &self,
        id: UserId,
        first_name: &str,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<()>;

    async fn get(&self, id: UserId) -> Result<Option<UserProfile>>;
}
