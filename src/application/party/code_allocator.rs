use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::repositories::{PartyStore, StoreError};
use crate::domain::value_objects::JoinCode;

/// Default number of random draws before giving up
pub const DEFAULT_ALLOCATION_ATTEMPTS: u32 = 10;

/// Picks join codes not held by any unfinished party.
///
/// The check is advisory: two allocators may pick the same free code at the
/// same moment. The store's create-if-absent write settles that race.
pub struct CodeAllocator<P: PartyStore + ?Sized> {
    party_store: Arc<P>,
    max_attempts: u32,
}

impl<P: PartyStore + ?Sized> CodeAllocator<P> {
    pub fn new(party_store: Arc<P>) -> Self {
        Self {
            party_store,
            max_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn allocate(&self) -> Result<JoinCode, AllocationError> {
        let mut rng = StdRng::from_entropy();
        self.allocate_with(&mut rng).await
    }

    pub async fn allocate_with<R: Rng + Send>(&self, rng: &mut R) -> Result<JoinCode, AllocationError> {
        for attempt in 1..=self.max_attempts {
            let code = JoinCode::random(rng);
            if !self.party_store.is_code_in_use(code.as_str()).await? {
                return Ok(code);
            }
            tracing::debug!("Join code {} taken (attempt {}/{})", code, attempt, self.max_attempts);
        }

        tracing::error!("No free join code after {} attempts", self.max_attempts);
        Err(AllocationError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("Failed to generate unique code after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
