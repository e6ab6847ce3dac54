mod memory_repo;
mod party_repo;

pub use memory_repo::InMemoryPartyStore;
pub use party_repo::{SqlitePartyStore, DEFAULT_UPDATE_ATTEMPTS};
