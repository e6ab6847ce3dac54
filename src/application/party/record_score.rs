use std::sync::Arc;

use crate::domain::entities::Party;
use crate::domain::repositories::{run_transaction, Mutation, PartyStore, StoreError, TransactionError};
use crate::domain::services::{apply_score_event, ScoringError};
use crate::domain::value_objects::ScoreEvent;

/// Record score input
pub struct RecordScoreInput {
    pub user_id: String,
    pub code: String,
    pub event: ScoreEvent,
}

/// Record score output
pub struct RecordScoreOutput {
    pub xp_awarded: u32,
    /// Party as committed by this transaction
    pub party: Party,
}

/// Record score use case: the atomic scoring transaction.
///
/// Win detection is not done here; callers hand the result to `FinishParty`.
pub struct RecordScore<P: PartyStore + ?Sized> {
    party_store: Arc<P>,
}

impl<P: PartyStore + ?Sized> RecordScore<P> {
    pub fn new(party_store: Arc<P>) -> Self {
        Self { party_store }
    }

    pub async fn execute(&self, input: RecordScoreInput) -> Result<RecordScoreOutput, RecordScoreError> {
        let (_, (xp_awarded, party)) =
            run_transaction(self.party_store.as_ref(), &input.code, |party: &mut Party| {
                let xp = apply_score_event(party, &input.user_id, &input.event)?;
                Ok::<_, RecordScoreError>((Mutation::Write, (xp, party.clone())))
            })
            .await
            .map_err(|e| match e {
                TransactionError::Rejected(e) => e,
                TransactionError::Store(StoreError::NotFound(_)) => RecordScoreError::PartyNotFound,
                TransactionError::Store(e) => RecordScoreError::Store(e),
            })?;

        match &input.event {
            ScoreEvent::CatchCreature { creature_id } => tracing::info!(
                "Player {} caught {} in party {}: +{} XP",
                input.user_id,
                creature_id,
                input.code,
                xp_awarded
            ),
            ScoreEvent::QuizBonus { .. } => tracing::info!(
                "Player {} earned quiz bonus in party {}: +{} XP",
                input.user_id,
                input.code,
                xp_awarded
            ),
        }

        Ok(RecordScoreOutput { xp_awarded, party })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordScoreError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Party not found")]
    PartyNotFound,
    #[error("Player not in party")]
    PlayerNotInParty,
    #[error("Party has already finished")]
    PartyAlreadyFinished,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ScoringError> for RecordScoreError {
    fn from(e: ScoringError) -> Self {
        match e {
            ScoringError::PlayerNotInParty => RecordScoreError::PlayerNotInParty,
            ScoringError::PartyFinished => RecordScoreError::PartyAlreadyFinished,
            ScoringError::MissingCreatureId => RecordScoreError::Validation(e.to_string()),
        }
    }
}
