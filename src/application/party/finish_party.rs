use std::sync::Arc;

use chrono::Utc;

use crate::domain::entities::Party;
use crate::domain::repositories::{run_transaction, Mutation, PartyStore, StoreError, TransactionError};
use crate::domain::services::finish_if_complete;

/// Finish party output
pub struct FinishPartyOutput {
    /// True only for the caller whose write performed the transition
    pub finished_now: bool,
    pub party: Party,
}

/// Completion check use case.
///
/// Every subscriber may run this on every update it observes. The condition
/// is re-evaluated inside the transaction, so concurrent callers agree and
/// only one of them writes.
pub struct FinishParty<P: PartyStore + ?Sized> {
    party_store: Arc<P>,
}

impl<P: PartyStore + ?Sized> FinishParty<P> {
    pub fn new(party_store: Arc<P>) -> Self {
        Self { party_store }
    }

    pub async fn execute(&self, code: &str) -> Result<FinishPartyOutput, FinishPartyError> {
        let (_, (finished_now, party)) = run_transaction(self.party_store.as_ref(), code, |party: &mut Party| {
            let finished_now = finish_if_complete(party, Utc::now());
            let mutation = if finished_now { Mutation::Write } else { Mutation::Abort };
            Ok::<_, FinishPartyError>((mutation, (finished_now, party.clone())))
        })
        .await
        .map_err(|e| match e {
            TransactionError::Rejected(e) => e,
            TransactionError::Store(StoreError::NotFound(_)) => FinishPartyError::PartyNotFound,
            TransactionError::Store(e) => FinishPartyError::Store(e),
        })?;

        if finished_now {
            let winner = party.leader().map(|p| p.name.as_str()).unwrap_or("Unknown");
            tracing::info!("Party {} completed! Winner: {}", party.code, winner);
        }

        Ok(FinishPartyOutput { finished_now, party })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FinishPartyError {
    #[error("Party not found")]
    PartyNotFound,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Avatar, GameMode, PartyPlayer, PartyStatus};
    use crate::domain::services::start_party;
    use crate::infrastructure::database::repositories::InMemoryPartyStore;

    async fn active_party(store: &InMemoryPartyStore, xp: u32) {
        let mut host = PartyPlayer::new("host".into(), "Ana".into(), Avatar::default());
        host.xp = xp;
        let mut party = Party::new("4242".into(), host, GameMode::ScoreRace, 100, None);
        start_party(&mut party, "host", Utc::now()).unwrap();
        store.create(&party).await.unwrap();
    }

    #[tokio::test]
    async fn test_only_first_caller_finishes() {
        let store = Arc::new(InMemoryPartyStore::new());
        active_party(&store, 100).await;
        let finish = FinishParty::new(store.clone());

        let first = finish.execute("4242").await.unwrap();
        assert!(first.finished_now);
        assert_eq!(first.party.status, PartyStatus::Finished);

        let second = finish.execute("4242").await.unwrap();
        assert!(!second.finished_now);
        assert_eq!(second.party.end_time, first.party.end_time);
    }

    #[tokio::test]
    async fn test_incomplete_party_is_untouched() {
        let store = Arc::new(InMemoryPartyStore::new());
        active_party(&store, 40).await;

        let output = FinishParty::new(store).execute("4242").await.unwrap();
        assert!(!output.finished_now);
        assert_eq!(output.party.status, PartyStatus::Active);
    }

    #[tokio::test]
    async fn test_missing_party() {
        let store = Arc::new(InMemoryPartyStore::new());
        let result = FinishParty::new(store).execute("4242").await;
        assert!(matches!(result, Err(FinishPartyError::PartyNotFound)));
    }
}
