use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::{
    domain::{PollId, UserId},
    errors::Error,
    poll::Poll,
    store::{PollRepository, UserProfile, UserStore},
    Result,
};

/// In-process poll store.
///
/// Each poll sits behind its own lock: the map lock is held only long enough
/// to find the poll, so toggles on different polls run in parallel while
/// toggles on one poll serialise.
#[derive(Debug)]
pub struct MemoryPollRepository {
    next_id: AtomicI64,
    polls: RwLock<HashMap<PollId, Arc<Mutex<Poll>>>>,
}

impl Default for MemoryPollRepository {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            polls: RwLock::new(HashMap::new()),
        }
    }
}

impl MemoryPollRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a poll entirely. Outstanding buttons then report it as deleted.
    pub async fn delete(&self, poll_id: PollId) -> bool {
        self.polls.write().await.remove(&poll_id).is_some()
    }

    async fn slot(&self, poll_id: PollId) -> Result<Arc<Mutex<Poll>>> {
        self.polls
            .read()
            .await
            .get(&poll_id)
            .cloned()
            .ok_or(Error::PollNotFound(poll_id))
    }
}

#[async_trait]
impl PollRepository for MemoryPollRepository {
    async fn create(&self, admin_id: UserId, title: &str) -> Result<PollId> {
        let id = PollId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let poll = Poll::new(id, admin_id, title);
        self.polls
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(poll)));
        Ok(id)
    }

    async fn append_option(&self, poll_id: PollId, title: &str) -> Result<Poll> {
        let slot = self.slot(poll_id).await?;
        let mut poll = slot.lock().await;
        poll.append_option(title);
        Ok(poll.clone())
    }

    async fn toggle_vote(
        &self,
        poll_id: PollId,
        option_index: i64,
        voter_id: UserId,
        first_name: &str,
        last_name: Option<&str>,
    ) -> Result<(Poll, String)> {
        let slot = self.slot(poll_id).await?;
        let mut poll = slot.lock().await;
        let status = poll.toggle_vote(option_index, voter_id, first_name, last_name)?;
        Ok((poll.clone(), status))
    }

    async fn get(&self, poll_id: PollId) -> Result<Option<Poll>> {
        let Ok(slot) = self.slot(poll_id).await else {
            return Ok(None);
        };
        let poll = slot.lock().await;
        Ok(Some(poll.clone()))
    }

    async fn query_by_admin(&self, admin_id: UserId, limit: usize) -> Result<Vec<Poll>> {
        Ok(self.collect_by_admin(admin_id, limit, |_| true).await)
    }

    async fn query_votable_by_admin(&self, admin_id: UserId, limit: usize) -> Result<Vec<Poll>> {
        Ok(self
            .collect_by_admin(admin_id, limit, |p| !p.options.is_empty())
            .await)
    }
}

impl MemoryPollRepository {
    async fn collect_by_admin(
        &self,
        admin_id: UserId,
        limit: usize,
        keep: impl Fn(&Poll) -> bool,
    ) -> Vec<Poll> {
        let slots: Vec<Arc<Mutex<Poll>>> = self.polls.read().await.values().cloned().collect();

        let mut out = Vec::new();
        for slot in slots {
            let poll = slot.lock().await;
            if poll.admin_id == admin_id && keep(&*poll) {
                out.push(poll.clone());
            }
        }
        out.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        out.truncate(limit);
        out
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<UserId, UserProfile>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn upsert(
        &self,
        id: UserId,
        first_name: &str,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut users = self.users.lock().await;
        let entry = users.entry(id).or_insert_with(|| UserProfile {
            id,
            first_name: String::new(),
            last_name: None,
            username: None,
            created: now,
            updated: now,
        });
        entry.first_name = first_name.to_string();
        entry.last_name = last_name.map(str::to_string);
        entry.username = username.map(str::to_string);
        entry.updated = now;
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.users.lock().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_append_get() {
        let repo = MemoryPollRepository::new();
        let id = repo.create(UserId(1), "Lunch?").await.unwrap();
        let p = repo.append_option(id, "Pizza").await.unwrap();
        assert_eq!(p.options.len(), 1);
        assert!(p.updated >= p.created);

        let p = repo.get(id).await.unwrap().unwrap();
        assert_eq!(p.title, "Lunch?");
        assert_eq!(p.admin_id, UserId(1));
        assert!(p.active && p.multi);
        assert_eq!(repo.get(PollId(999)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn toggle_vote_errors() {
        let repo = MemoryPollRepository::new();
        let id = repo.create(UserId(1), "Q").await.unwrap();
        repo.append_option(id, "a").await.unwrap();
        repo.append_option(id, "b").await.unwrap();

        for idx in [2, 5, -1] {
            let err = repo
                .toggle_vote(id, idx, UserId(2), "B", None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidOption { .. }));
        }

        let missing = PollId(12345);
        let err = repo
            .toggle_vote(missing, 0, UserId(2), "B", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PollNotFound(p) if p == missing));
        assert_eq!(repo.get(missing).await.unwrap(), None);

        assert!(repo.delete(id).await);
        let err = repo
            .toggle_vote(id, 0, UserId(2), "B", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PollNotFound(_)));
        assert_eq!(repo.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn toggle_vote_returns_updated_poll_and_status() {
        let repo = MemoryPollRepository::new();
        let id = repo.create(UserId(1), "Q").await.unwrap();
        repo.append_option(id, "a").await.unwrap();

        let (poll, status) = repo
            .toggle_vote(id, 0, UserId(2), "Bea", Some("Ray"))
            .await
            .unwrap();
        assert_eq!(status, "Your name was added to a!");
        assert!(poll.options[0].has_voter(UserId(2)));

        let (poll, status) = repo
            .toggle_vote(id, 0, UserId(2), "Bea", Some("Ray"))
            .await
            .unwrap();
        assert_eq!(status, "Your name was removed from a!");
        assert!(poll.options[0].voters.is_empty());
    }

    #[tokio::test]
    async fn query_by_admin_newest_first_and_capped() {
        let repo = MemoryPollRepository::new();
        let mut mine = Vec::new();
        for i in 0..5 {
            mine.push(repo.create(UserId(1), &format!("p{i}")).await.unwrap());
            repo.create(UserId(2), "other").await.unwrap();
        }

        let got = repo.query_by_admin(UserId(1), 3).await.unwrap();
        let ids: Vec<PollId> = got.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![mine[4], mine[3], mine[2]]);

        assert!(repo.query_by_admin(UserId(3), 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn votable_query_skips_drafts_before_the_cap() {
        let repo = MemoryPollRepository::new();
        let ready = repo.create(UserId(1), "ready").await.unwrap();
        repo.append_option(ready, "a").await.unwrap();
        for i in 0..3 {
            repo.create(UserId(1), &format!("draft{i}")).await.unwrap();
        }

        let got = repo.query_votable_by_admin(UserId(1), 2).await.unwrap();
        let ids: Vec<PollId> = got.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ready]);
        assert_eq!(repo.query_by_admin(UserId(1), 2).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_toggles_never_lose_votes() {
        let repo = Arc::new(MemoryPollRepository::new());
        let id = repo.create(UserId(1), "Q").await.unwrap();
        repo.append_option(id, "a").await.unwrap();

        let mut handles = Vec::new();
        for voter in 0..50 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.toggle_vote(id, 0, UserId(100 + voter), "V", None)
                    .await
                    .map(|_| ())
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let poll = repo.get(id).await.unwrap().unwrap();
        assert_eq!(poll.options[0].voters.len(), 50);
        assert_eq!(poll.respondent_count(), 50);
    }

    #[tokio::test]
    async fn user_upsert_keeps_created() {
        let users = MemoryUserStore::new();
        users.upsert(UserId(1), "Ann", None, Some("ann")).await.unwrap();
        let first = users.get(UserId(1)).await.unwrap().unwrap();

        users.upsert(UserId(1), "Anne", Some("Lee"), None).await.unwrap();
        let second = users.get(UserId(1)).await.unwrap().unwrap();
        assert_eq!(second.first_name, "Anne");
        assert_eq!(second.last_name.as_deref(), Some("Lee"));
        assert_eq!(second.username, None);
        assert_eq!(second.created, first.created);
        assert!(second.updated >= first.updated);
    }
}
