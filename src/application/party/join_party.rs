use std::sync::Arc;

use crate::domain::entities::{Party, PlayerProfile};
use crate::domain::repositories::{run_transaction, Mutation, PartyStore, StoreError, TransactionError};
use crate::domain::value_objects::{InvalidJoinCode, JoinCode};

/// Join party input
pub struct JoinPartyInput {
    pub player: PlayerProfile,
    /// Raw code as typed by the user
    pub code: String,
}

/// Join party output
pub struct JoinPartyOutput {
    pub party: Party,
    /// False when the player was already a member
    pub newly_joined: bool,
}

/// Join party use case
pub struct JoinParty<P: PartyStore + ?Sized> {
    party_store: Arc<P>,
}

impl<P: PartyStore + ?Sized> JoinParty<P> {
    pub fn new(party_store: Arc<P>) -> Self {
        Self { party_store }
    }

    pub async fn execute(&self, input: JoinPartyInput) -> Result<JoinPartyOutput, JoinPartyError> {
        // Reject malformed codes before touching the store
        let code = JoinCode::parse(&input.code)?;
        let player = input.player.to_player();

        let (_, (party, newly_joined)) =
            run_transaction(self.party_store.as_ref(), code.as_str(), |party: &mut Party| {
                if party.is_finished() {
                    return Err(JoinPartyError::PartyAlreadyFinished);
                }
                if party.contains_player(&player.id) {
                    return Ok((Mutation::Abort, (party.clone(), false)));
                }
                party.add_player(player.clone());
                Ok((Mutation::Write, (party.clone(), true)))
            })
            .await
            .map_err(|e| match e {
                TransactionError::Rejected(e) => e,
                TransactionError::Store(StoreError::NotFound(_)) => JoinPartyError::PartyNotFound,
                TransactionError::Store(e) => JoinPartyError::Store(e),
            })?;

        if newly_joined {
            tracing::info!("Player {} joined party {}", player.id, code);
        } else {
            tracing::debug!("Player {} re-joined party {}", player.id, code);
        }

        Ok(JoinPartyOutput {
            party,
            newly_joined,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JoinPartyError {
    #[error(transparent)]
    InvalidCode(#[from] InvalidJoinCode),
    #[error("Party not found")]
    PartyNotFound,
    #[error("Party has already finished")]
    PartyAlreadyFinished,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
