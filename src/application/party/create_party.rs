use std::sync::Arc;

use crate::application::party::{AllocationError, CodeAllocator, DEFAULT_ALLOCATION_ATTEMPTS};
use crate::domain::entities::{Party, PartyLocation, PlayerProfile};
use crate::domain::repositories::{PartyStore, StoreError};
use crate::domain::value_objects::RaceSettings;

/// How often allocation + create is retried when another party grabs the code first
const CREATE_ATTEMPTS: u32 = 3;

/// Create party input
pub struct CreatePartyInput {
    pub host: PlayerProfile,
    pub settings: RaceSettings,
    pub location: Option<PartyLocation>,
}

/// Create party output
pub struct CreatePartyOutput {
    pub party: Party,
}

/// Create party use case
pub struct CreateParty<P: PartyStore + ?Sized> {
    party_store: Arc<P>,
    allocation_attempts: u32,
}

impl<P: PartyStore + ?Sized> CreateParty<P> {
    pub fn new(party_store: Arc<P>) -> Self {
        Self {
            party_store,
            allocation_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
        }
    }

    pub fn with_allocation_attempts(mut self, attempts: u32) -> Self {
        self.allocation_attempts = attempts;
        self
    }

    pub async fn execute(
        &self,
        input: CreatePartyInput,
    ) -> Result<CreatePartyOutput, CreatePartyError> {
        // Validate settings
        input
            .settings
            .validate()
            .map_err(|msg| CreatePartyError::Validation(msg.into()))?;

        if input.host.user_id.trim().is_empty() {
            return Err(CreatePartyError::Validation("User id is required".into()));
        }

        if let Some(location) = &input.location {
            if location.id.trim().is_empty() {
                return Err(CreatePartyError::Validation("Location id is required".into()));
            }
        }

        let allocator = CodeAllocator::new(self.party_store.clone())
            .with_max_attempts(self.allocation_attempts);

        for attempt in 1..=CREATE_ATTEMPTS {
            let code = allocator.allocate().await?;

            let party = Party::new(
                code.to_string(),
                input.host.to_player(),
                input.settings.game_mode,
                input.settings.target_value,
                input.location.clone(),
            );

            match self.party_store.create(&party).await {
                Ok(()) => {
                    tracing::info!(
                        "Created {} party {} for host {}",
                        party.game_mode.as_str(),
                        party.code,
                        party.host_id
                    );
                    return Ok(CreatePartyOutput { party });
                }
                Err(StoreError::AlreadyExists(code)) => {
                    tracing::warn!(
                        "Join code {} was claimed concurrently (attempt {}/{})",
                        code,
                        attempt,
                        CREATE_ATTEMPTS
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CreatePartyError::CodeCollision)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreatePartyError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Failed to generate unique code")]
    CodeAllocation(#[from] AllocationError),
    #[error("Join code was repeatedly claimed by another party")]
    CodeCollision,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::domain::entities::{Avatar, GameMode, PartyStatus};
    use crate::domain::repositories::{Mutation, PartySubscription, PartyTransform};
    use crate::infrastructure::database::repositories::InMemoryPartyStore;

    /// Loses the create race a fixed number of times
    struct ContestedStore {
        inner: InMemoryPartyStore,
        losses: AtomicU32,
    }

    #[async_trait]
    impl PartyStore for ContestedStore {
        async fn create(&self, party: &Party) -> Result<(), StoreError> {
            let left = self.losses.load(Ordering::SeqCst);
            if left > 0 {
                self.losses.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::AlreadyExists(party.code.clone()));
            }
            self.inner.create(party).await
        }

        async fn find(&self, code: &str) -> Result<Option<Party>, StoreError> {
            self.inner.find(code).await
        }

        async fn is_code_in_use(&self, code: &str) -> Result<bool, StoreError> {
            self.inner.is_code_in_use(code).await
        }

        async fn update(&self, code: &str, transform: &mut PartyTransform<'_>) -> Result<Mutation, StoreError> {
            self.inner.update(code, transform).await
        }

        async fn delete(&self, code: &str) -> Result<bool, StoreError> {
            self.inner.delete(code).await
        }

        async fn subscribe(&self, code: &str) -> Result<PartySubscription, StoreError> {
            self.inner.subscribe(code).await
        }

        async fn purge_expired(
            &self,
            finished_before: DateTime<Utc>,
            abandoned_before: DateTime<Utc>,
        ) -> Result<Vec<String>, StoreError> {
            self.inner.purge_expired(finished_before, abandoned_before).await
        }
    }

    fn contested(losses: u32) -> Arc<ContestedStore> {
        Arc::new(ContestedStore {
            inner: InMemoryPartyStore::new(),
            losses: AtomicU32::new(losses),
        })
    }

    fn input() -> CreatePartyInput {
        CreatePartyInput {
            host: PlayerProfile::new("host", "Ana", Avatar::default()),
            settings: RaceSettings::new(GameMode::ScoreRace, 500),
            location: None,
        }
    }

    #[tokio::test]
    async fn test_creates_waiting_party_with_host() {
        let store = contested(0);
        let output = CreateParty::new(store.clone()).execute(input()).await.unwrap();

        assert_eq!(output.party.status, PartyStatus::Waiting);
        assert_eq!(output.party.host_id, "host");
        assert_eq!(output.party.players.len(), 1);
        assert!(store.is_code_in_use(&output.party.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_retries_after_losing_the_code() {
        let store = contested(CREATE_ATTEMPTS - 1);
        assert!(CreateParty::new(store).execute(input()).await.is_ok());
    }

    #[tokio::test]
    async fn test_gives_up_after_repeated_collisions() {
        let store = contested(CREATE_ATTEMPTS);
        let result = CreateParty::new(store).execute(input()).await;
        assert!(matches!(result, Err(CreatePartyError::CodeCollision)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_settings() {
        let mut bad = input();
        bad.settings = RaceSettings::new(GameMode::ScoreRace, 0);
        let result = CreateParty::new(contested(0)).execute(bad).await;
        assert!(matches!(result, Err(CreatePartyError::Validation(_))));
    }
}
