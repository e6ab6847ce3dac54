use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::domain::entities::{Party, PartyStatus};
use crate::domain::repositories::{
    Mutation, PartyStore, PartySubscription, PartyTransform, StoreError,
};
use crate::infrastructure::database::SnapshotHub;

/// Default number of attempts per update while the database is locked
pub const DEFAULT_UPDATE_ATTEMPTS: u32 = 5;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS parties (
    code TEXT PRIMARY KEY NOT NULL,
    status TEXT NOT NULL,
    document TEXT NOT NULL,
    version INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_parties_status_updated ON parties (status, updated_at);
"#;

/// SQLite implementation of PartyStore.
///
/// Each party is one JSON document keyed by its code. Updates run the whole
/// read-modify-write inside one `BEGIN IMMEDIATE` transaction, so SQLite
/// hands out the write lock before the document is read and concurrent
/// transactions queue instead of conflicting. The `version` column orders
/// published snapshots.
pub struct SqlitePartyStore {
    pool: SqlitePool,
    hub: Arc<SnapshotHub>,
    max_update_attempts: u32,
}

/// Why one update attempt did not go through
enum UpdateFailure {
    /// The database stayed locked past the busy timeout
    Busy,
    Store(StoreError),
}

impl From<StoreError> for UpdateFailure {
    fn from(e: StoreError) -> Self {
        UpdateFailure::Store(e)
    }
}

impl From<sqlx::Error> for UpdateFailure {
    fn from(e: sqlx::Error) -> Self {
        if is_busy(&e) {
            UpdateFailure::Busy
        } else {
            UpdateFailure::Store(db_error(e))
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED and their extended codes, or no free connection
fn is_busy(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("5" | "6" | "261" | "262" | "517")
        ),
        _ => false,
    }
}

/// Jittered, linearly growing pause between locked attempts
fn busy_backoff(attempt: u32) -> Duration {
    let jitter: u64 = rand::thread_rng().gen_range(5..=25);
    Duration::from_millis(jitter * u64::from(attempt))
}

impl SqlitePartyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            hub: Arc::new(SnapshotHub::new()),
            max_update_attempts: DEFAULT_UPDATE_ATTEMPTS,
        }
    }

    /// Open (or create) the database at `url` and ensure the schema exists
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // Every in-memory connection is its own database
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn with_max_update_attempts(mut self, attempts: u32) -> Self {
        self.max_update_attempts = attempts.max(1);
        self
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn load(&self, code: &str) -> Result<Option<(Party, u64)>, StoreError> {
        let row = sqlx::query("SELECT document, version FROM parties WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(Self::row_to_party).transpose()
    }

    fn row_to_party(row: &sqlx::sqlite::SqliteRow) -> Result<(Party, u64), StoreError> {
        let document: String = row.get("document");
        let version: i64 = row.get("version");
        Ok((decode(&document)?, version as u64))
    }

    /// One locked read-modify-write. Snapshots are published after commit.
    async fn update_once(
        &self,
        code: &str,
        transform: &mut PartyTransform<'_>,
    ) -> Result<Mutation, UpdateFailure> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let row = sqlx::query("SELECT document, version FROM parties WHERE code = ?")
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?;
        let (mut party, version) = row
            .as_ref()
            .map(Self::row_to_party)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;

        let mutation = transform(&mut party);
        match mutation {
            // Dropping the transaction rolls it back
            Mutation::Abort => {}
            Mutation::Write => {
                party.updated_at = Utc::now();
                let document = encode(&party)?;
                sqlx::query(
                    r#"
                    UPDATE parties
                    SET status = ?, document = ?, version = version + 1, updated_at = ?
                    WHERE code = ?
                    "#,
                )
                .bind(party.status.as_str())
                .bind(&document)
                .bind(party.updated_at.timestamp())
                .bind(code)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                self.hub.publish(code, version + 1, &party);
            }
            Mutation::Delete => {
                sqlx::query("DELETE FROM parties WHERE code = ?")
                    .bind(code)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;

                self.hub.remove(code, version);
            }
        }
        Ok(mutation)
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn encode(party: &Party) -> Result<String, StoreError> {
    serde_json::to_string(party).map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode(document: &str) -> Result<Party, StoreError> {
    serde_json::from_str(document).map_err(|e| StoreError::Codec(e.to_string()))
}

#[async_trait]
impl PartyStore for SqlitePartyStore {
    async fn create(&self, party: &Party) -> Result<(), StoreError> {
        let document = encode(party)?;
        let first_version = self.hub.next_version(&party.code) as i64;

        // Upsert only over a finished party; an unfinished one keeps the code
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO parties (code, status, document, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(code) DO UPDATE SET
                status = excluded.status,
                document = excluded.document,
                version = MAX(parties.version + 1, excluded.version),
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            WHERE parties.status = 'finished'
            RETURNING version
            "#,
        )
        .bind(&party.code)
        .bind(party.status.as_str())
        .bind(&document)
        .bind(first_version)
        .bind(party.created_at.timestamp())
        .bind(party.updated_at.timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(version) = version else {
            return Err(StoreError::AlreadyExists(party.code.clone()));
        };
        let version = version as u64;

        // Subscribers of a replaced finished party see it go away
        self.hub.remove(&party.code, version - 1);
        self.hub.publish(&party.code, version, party);
        Ok(())
    }

    async fn find(&self, code: &str) -> Result<Option<Party>, StoreError> {
        Ok(self.load(code).await?.map(|(party, _)| party))
    }

    async fn is_code_in_use(&self, code: &str) -> Result<bool, StoreError> {
        let in_use: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM parties WHERE code = ? AND status != 'finished'")
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(in_use.is_some())
    }

    async fn update(
        &self,
        code: &str,
        transform: &mut PartyTransform<'_>,
    ) -> Result<Mutation, StoreError> {
        for attempt in 1..=self.max_update_attempts {
            match self.update_once(code, transform).await {
                Ok(mutation) => return Ok(mutation),
                Err(UpdateFailure::Store(e)) => return Err(e),
                Err(UpdateFailure::Busy) => {
                    tracing::debug!(
                        "Party {} is locked (attempt {}/{}), retrying",
                        code,
                        attempt,
                        self.max_update_attempts
                    );
                    tokio::time::sleep(busy_backoff(attempt)).await;
                }
            }
        }

        tracing::warn!("Giving up on party {} after {} locked attempts", code, self.max_update_attempts);
        Err(StoreError::Contention {
            code: code.to_string(),
            attempts: self.max_update_attempts,
        })
    }

    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        let version: Option<i64> = sqlx::query_scalar("DELETE FROM parties WHERE code = ? RETURNING version")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        self.hub.remove(code, version.unwrap_or(0) as u64);
        Ok(version.is_some())
    }

    async fn subscribe(&self, code: &str) -> Result<PartySubscription, StoreError> {
        let (party, version) = self
            .load(code)
            .await?
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;
        Ok(self.hub.subscribe(code, version, party))
    }

    async fn purge_expired(
        &self,
        finished_before: DateTime<Utc>,
        abandoned_before: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            DELETE FROM parties
            WHERE (status = ? AND updated_at < ?)
               OR (status != ? AND updated_at < ?)
            RETURNING code, version
            "#,
        )
        .bind(PartyStatus::Finished.as_str())
        .bind(finished_before.timestamp())
        .bind(PartyStatus::Finished.as_str())
        .bind(abandoned_before.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut codes = Vec::with_capacity(rows.len());
        for row in &rows {
            let code: String = row.get("code");
            let version: i64 = row.get("version");
            self.hub.remove(&code, version as u64);
            codes.push(code);
        }
        Ok(codes)
    }
}
