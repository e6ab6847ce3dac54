use std::sync::Arc;

use crate::domain::entities::{Party, PlayerRemoval};
use crate::domain::repositories::{run_transaction, Mutation, PartyStore, StoreError, TransactionError};

/// Leave party input
pub struct LeavePartyInput {
    pub user_id: String,
    pub code: String,
}

/// Leave party output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeavePartyOutput {
    pub new_host_id: Option<String>,
    pub party_deleted: bool,
}

/// Leave party use case
pub struct LeaveParty<P: PartyStore + ?Sized> {
    party_store: Arc<P>,
}

impl<P: PartyStore + ?Sized> LeaveParty<P> {
    pub fn new(party_store: Arc<P>) -> Self {
        Self { party_store }
    }

    pub async fn execute(&self, input: LeavePartyInput) -> Result<LeavePartyOutput, LeavePartyError> {
        let user_id = input.user_id.as_str();

        let (_, output) = run_transaction(self.party_store.as_ref(), &input.code, |party: &mut Party| {
            // A finished party is a read-only result; leaving it only drops the subscription
            if party.is_finished() {
                return if party.contains_player(user_id) {
                    Ok((Mutation::Abort, LeavePartyOutput {
                        new_host_id: None,
                        party_deleted: false,
                    }))
                } else {
                    Err(LeavePartyError::NotInParty)
                };
            }

            match party.remove_player(user_id) {
                PlayerRemoval::NotPresent => Err(LeavePartyError::NotInParty),
                PlayerRemoval::LastPlayerLeft => Ok((Mutation::Delete, LeavePartyOutput {
                    new_host_id: None,
                    party_deleted: true,
                })),
                PlayerRemoval::Removed { new_host_id } => Ok((Mutation::Write, LeavePartyOutput {
                    new_host_id,
                    party_deleted: false,
                })),
            }
        })
        .await
        .map_err(|e| match e {
            TransactionError::Rejected(e) => e,
            TransactionError::Store(StoreError::NotFound(_)) => LeavePartyError::PartyNotFound,
            TransactionError::Store(e) => LeavePartyError::Store(e),
        })?;

        if output.party_deleted {
            tracing::info!("Last player {} left party {}, party deleted", user_id, input.code);
        } else if let Some(new_host) = &output.new_host_id {
            tracing::info!("Host {} left party {}, {} is the new host", user_id, input.code, new_host);
        } else {
            tracing::info!("Player {} left party {}", user_id, input.code);
        }

        Ok(output)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LeavePartyError {
    #[error("Party not found")]
    PartyNotFound,
    #[error("Not in party")]
    NotInParty,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
