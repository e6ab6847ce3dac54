use std::sync::Arc;

use crate::domain::entities::Party;
use crate::domain::repositories::{PartyStore, StoreError};
use crate::domain::value_objects::{InvalidJoinCode, JoinCode};

/// Get party input
pub struct GetPartyInput {
    pub code: String,
}

/// Get party use case
pub struct GetParty<P: PartyStore + ?Sized> {
    party_store: Arc<P>,
}

impl<P: PartyStore + ?Sized> GetParty<P> {
    pub fn new(party_store: Arc<P>) -> Self {
        Self { party_store }
    }

    pub async fn execute(&self, input: GetPartyInput) -> Result<Party, GetPartyError> {
        let code = JoinCode::parse(&input.code)?;
        self.party_store
            .find(code.as_str())
            .await?
            .ok_or(GetPartyError::PartyNotFound)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GetPartyError {
    #[error(transparent)]
    InvalidCode(#[from] InvalidJoinCode),
    #[error("Party not found")]
    PartyNotFound,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
