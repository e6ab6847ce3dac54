use std::sync::Arc;

use chrono::Utc;

use crate::domain::entities::Party;
use crate::domain::repositories::{run_transaction, Mutation, PartyStore, StoreError, TransactionError};
use crate::domain::services::{start_party, LifecycleError};

/// Start party input
pub struct StartPartyInput {
    pub user_id: String,
    pub code: String,
}

/// Start party output
pub struct StartPartyOutput {
    pub party: Party,
}

/// Start party use case
pub struct StartParty<P: PartyStore + ?Sized> {
    party_store: Arc<P>,
}

impl<P: PartyStore + ?Sized> StartParty<P> {
    pub fn new(party_store: Arc<P>) -> Self {
        Self { party_store }
    }

    pub async fn execute(&self, input: StartPartyInput) -> Result<StartPartyOutput, StartPartyError> {
        let (_, party) = run_transaction(self.party_store.as_ref(), &input.code, |party: &mut Party| {
            start_party(party, &input.user_id, Utc::now())?;
            Ok::<_, StartPartyError>((Mutation::Write, party.clone()))
        })
        .await
        .map_err(|e| match e {
            TransactionError::Rejected(e) => e,
            TransactionError::Store(StoreError::NotFound(_)) => StartPartyError::PartyNotFound,
            TransactionError::Store(e) => StartPartyError::Store(e),
        })?;

        tracing::info!("Party {} started by {}", party.code, input.user_id);
        Ok(StartPartyOutput { party })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartPartyError {
    #[error("Party not found")]
    PartyNotFound,
    #[error("Not the party host")]
    NotHost,
    #[error("{0}")]
    InvalidTransition(LifecycleError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<LifecycleError> for StartPartyError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotHost => StartPartyError::NotHost,
            other => StartPartyError::InvalidTransition(other),
        }
    }
}
