//! SQLite adapter (sqlx).
//!
//! Implements the `cmi-core` poll repository and user store. A poll is stored
//! as one row with its options as a JSON document, so every mutation is a
//! single-row read-modify-write inside one transaction.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use tracing::info;

use cmi_core::{
    domain::{PollId, UserId},
    errors::Error,
    poll::{Poll, PollOption},
    store::{PollRepository, UserProfile, UserStore},
    Result,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SELECT_POLL: &str = r#"
    SELECT id, admin_id, title, active, multi, options, created, updated
    FROM polls
"#;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(db_err)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(db_err)?;

        Self::init_schema(&pool).await?;
        info!(url = database_url, "sqlite store ready");

        Ok(Self { pool })
    }

    /// Underlying pool, for ad-hoc queries outside the repository traits.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                admin_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                multi BOOLEAN NOT NULL DEFAULT TRUE,
                options TEXT NOT NULL DEFAULT '[]',
                created TEXT NOT NULL,
                updated TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS polls_admin_created ON polls (admin_id, created DESC);",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT,
                username TEXT,
                created TEXT NOT NULL,
                updated TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Read-modify-write one poll inside a transaction.
    ///
    /// The first statement claims the row's write lock, so concurrent writers
    /// on the same poll wait for each other (busy timeout) and each re-reads
    /// the committed state. Any error rolls the transaction back.
    async fn mutate<T, F>(&self, poll_id: PollId, apply: F) -> Result<(Poll, T)>
    where
        F: FnOnce(&mut Poll) -> Result<T> + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let claimed = sqlx::query("UPDATE polls SET updated = updated WHERE id = ?")
            .bind(poll_id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        if claimed == 0 {
            return Err(Error::PollNotFound(poll_id));
        }

        let row = sqlx::query(&format!("{SELECT_POLL} WHERE id = ?"))
            .bind(poll_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let mut poll = row_to_poll(&row)?;

        let out = apply(&mut poll)?;

        sqlx::query("UPDATE polls SET options = ?, updated = ? WHERE id = ?")
            .bind(serde_json::to_string(&poll.options)?)
            .bind(encode_time(poll.updated))
            .bind(poll_id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok((poll, out))
    }
}

#[async_trait]
impl PollRepository for SqliteStore {
    async fn create(&self, admin_id: UserId, title: &str) -> Result<PollId> {
        let now = encode_time(Utc::now());
        let id = sqlx::query(
            r#"
            INSERT INTO polls (admin_id, title, active, multi, options, created, updated)
            VALUES (?, ?, TRUE, TRUE, '[]', ?, ?)
            "#,
        )
        .bind(admin_id.0)
        .bind(title)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        Ok(PollId(id))
    }

    async fn append_option(&self, poll_id: PollId, title: &str) -> Result<Poll> {
        let (poll, ()) = self
            .mutate(poll_id, |poll| {
                poll.append_option(title);
                Ok(())
            })
            .await?;
        Ok(poll)
    }

    async fn toggle_vote(
        &self,
        poll_id: PollId,
        option_index: i64,
        voter_id: UserId,
        first_name: &str,
        last_name: Option<&str>,
    ) -> Result<(Poll, String)> {
        self.mutate(poll_id, |poll| {
            poll.toggle_vote(option_index, voter_id, first_name, last_name)
        })
        .await
    }

    async fn get(&self, poll_id: PollId) -> Result<Option<Poll>> {
        let row = sqlx::query(&format!("{SELECT_POLL} WHERE id = ?"))
            .bind(poll_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(row_to_poll).transpose()
    }

    async fn query_by_admin(&self, admin_id: UserId, limit: usize) -> Result<Vec<Poll>> {
        self.select_by_admin(admin_id, limit, "").await
    }

    async fn query_votable_by_admin(&self, admin_id: UserId, limit: usize) -> Result<Vec<Poll>> {
        self.select_by_admin(admin_id, limit, "AND options <> '[]'")
            .await
    }
}

impl SqliteStore {
    async fn select_by_admin(
        &self,
        admin_id: UserId,
        limit: usize,
        extra: &str,
    ) -> Result<Vec<Poll>> {
        let rows = sqlx::query(&format!(
            "{SELECT_POLL} WHERE admin_id = ? {extra} ORDER BY created DESC, id DESC LIMIT ?"
        ))
        .bind(admin_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_poll).collect()
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn upsert(
        &self,
        id: UserId,
        first_name: &str,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<()> {
        let now = encode_time(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, username, created, updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET first_name = excluded.first_name,
                          last_name = excluded.last_name,
                          username = excluded.username,
                          updated = excluded.updated
            "#,
        )
        .bind(id.0)
        .bind(first_name)
        .bind(last_name)
        .bind(username)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, username, created, updated FROM users WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(UserProfile {
            id: UserId(row.try_get("id").map_err(db_err)?),
            first_name: row.try_get("first_name").map_err(db_err)?,
            last_name: row.try_get("last_name").map_err(db_err)?,
            username: row.try_get("username").map_err(db_err)?,
            created: decode_time(row.try_get("created").map_err(db_err)?)?,
            updated: decode_time(row.try_get("updated").map_err(db_err)?)?,
        }))
    }
}

fn row_to_poll(row: &SqliteRow) -> Result<Poll> {
    let options_json: String = row.try_get("options").map_err(db_err)?;
    let options: Vec<PollOption> = serde_json::from_str(&options_json)?;

    Ok(Poll {
        id: PollId(row.try_get("id").map_err(db_err)?),
        admin_id: UserId(row.try_get("admin_id").map_err(db_err)?),
        title: row.try_get("title").map_err(db_err)?,
        active: row.try_get("active").map_err(db_err)?,
        multi: row.try_get("multi").map_err(db_err)?,
        options,
        created: decode_time(row.try_get("created").map_err(db_err)?)?,
        updated: decode_time(row.try_get("updated").map_err(db_err)?)?,
    })
}

// Fixed-width so that text order is time order.
fn encode_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(s: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp {s:?}: {e}")))
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}
