use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::domain::entities::Party;

/// Error type for store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Too much contention on party {code} after {attempts} attempts")]
    Contention { code: String, attempts: u32 },
    #[error("Corrupt party document: {0}")]
    Codec(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Transient infrastructure failure that the caller may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Contention { .. } | StoreError::Database(_))
    }
}

/// What a transaction transform wants done with the party it was handed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Persist the mutated party
    Write,
    /// Delete the party document
    Delete,
    /// Leave the stored party untouched
    Abort,
}

/// Live view of one party document. `None` once the party is deleted.
pub type PartySubscription = watch::Receiver<Option<Party>>;

/// Transform run inside a transaction. Called again with a fresh copy on conflict.
pub type PartyTransform<'a> = dyn FnMut(&mut Party) -> Mutation + Send + 'a;

/// Party store trait - a document store with transactional updates and
/// change subscriptions
#[async_trait]
pub trait PartyStore: Send + Sync {
    /// Create a party. Fails with `AlreadyExists` if a non-finished party holds
    /// the code; a finished party with that code is replaced.
    async fn create(&self, party: &Party) -> Result<(), StoreError>;

    /// Find party by code
    async fn find(&self, code: &str) -> Result<Option<Party>, StoreError>;

    /// Check whether a non-finished party holds the code
    async fn is_code_in_use(&self, code: &str) -> Result<bool, StoreError>;

    /// Atomic read-modify-write. Returns the mutation that was applied.
    async fn update(
        &self,
        code: &str,
        transform: &mut PartyTransform<'_>,
    ) -> Result<Mutation, StoreError>;

    /// Delete party. Returns false if it did not exist.
    async fn delete(&self, code: &str) -> Result<bool, StoreError>;

    /// Subscribe to full snapshots of the party, starting with its current state
    async fn subscribe(&self, code: &str) -> Result<PartySubscription, StoreError>;

    /// Delete finished parties last updated before `finished_before` and
    /// unfinished parties last updated before `abandoned_before`.
    /// Returns the deleted codes.
    async fn purge_expired(
        &self,
        finished_before: DateTime<Utc>,
        abandoned_before: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError>;
}

/// Failure of a typed transaction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError<E> {
    #[error("{0}")]
    Rejected(E),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run a typed transaction against `code`.
///
/// The closure decides what to do with the party and produces a value, or
/// rejects the party with a domain error. A rejection aborts without writing.
pub async fn run_transaction<S, T, E, F>(
    store: &S,
    code: &str,
    mut f: F,
) -> Result<(Mutation, T), TransactionError<E>>
where
    S: PartyStore + ?Sized,
    F: FnMut(&mut Party) -> Result<(Mutation, T), E> + Send,
    T: Send,
    E: Send,
{
    let mut outcome: Option<Result<T, E>> = None;
    let mut transform = |party: &mut Party| match f(party) {
        Ok((mutation, value)) => {
            outcome = Some(Ok(value));
            mutation
        }
        Err(e) => {
            outcome = Some(Err(e));
            Mutation::Abort
        }
    };

    let applied = store.update(code, &mut transform).await?;

    match outcome {
        Some(Ok(value)) => Ok((applied, value)),
        Some(Err(e)) => Err(TransactionError::Rejected(e)),
        // update() always runs the transform before returning Ok
        None => Err(TransactionError::Store(StoreError::NotFound(code.to_string()))),
    }
}
