use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::Party;
use crate::domain::repositories::{
    Mutation, PartyStore, PartySubscription, PartyTransform, StoreError,
};
use crate::infrastructure::database::SnapshotHub;

struct StoredParty {
    party: Party,
    version: u64,
}

/// In-memory implementation of PartyStore.
///
/// The whole map sits behind one mutex and transforms run while it is held,
/// so updates are trivially serializable. Used for tests and single-node
/// deployments that do not need durability.
#[derive(Default)]
pub struct InMemoryPartyStore {
    parties: Mutex<HashMap<String, StoredParty>>,
    hub: Arc<SnapshotHub>,
}

impl InMemoryPartyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredParty>> {
        self.parties.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PartyStore for InMemoryPartyStore {
    async fn create(&self, party: &Party) -> Result<(), StoreError> {
        let mut parties = self.lock();
        let version = match parties.get(&party.code) {
            Some(existing) if !existing.party.is_finished() => {
                return Err(StoreError::AlreadyExists(party.code.clone()));
            }
            Some(existing) => {
                self.hub.remove(&party.code, existing.version);
                existing.version + 1
            }
            None => self.hub.next_version(&party.code),
        };

        parties.insert(
            party.code.clone(),
            StoredParty {
                party: party.clone(),
                version,
            },
        );
        self.hub.publish(&party.code, version, party);
        Ok(())
    }

    async fn find(&self, code: &str) -> Result<Option<Party>, StoreError> {
        Ok(self.lock().get(code).map(|stored| stored.party.clone()))
    }

    async fn is_code_in_use(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .get(code)
            .is_some_and(|stored| !stored.party.is_finished()))
    }

    async fn update(
        &self,
        code: &str,
        transform: &mut PartyTransform<'_>,
    ) -> Result<Mutation, StoreError> {
        let mut parties = self.lock();
        let stored = parties
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;

        let mut party = stored.party.clone();
        let mutation = transform(&mut party);
        match mutation {
            Mutation::Abort => {}
            Mutation::Write => {
                party.updated_at = Utc::now();
                stored.version += 1;
                stored.party = party;
                self.hub.publish(code, stored.version, &stored.party);
            }
            Mutation::Delete => {
                let version = stored.version;
                parties.remove(code);
                self.hub.remove(code, version);
            }
        }
        Ok(mutation)
    }

    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        let mut parties = self.lock();
        let removed = parties.remove(code);
        self.hub.remove(code, removed.as_ref().map_or(0, |stored| stored.version));
        Ok(removed.is_some())
    }

    async fn subscribe(&self, code: &str) -> Result<PartySubscription, StoreError> {
        let parties = self.lock();
        let stored = parties
            .get(code)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;
        Ok(self.hub.subscribe(code, stored.version, stored.party.clone()))
    }

    async fn purge_expired(
        &self,
        finished_before: DateTime<Utc>,
        abandoned_before: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let mut parties = self.lock();
        let expired: Vec<String> = parties
            .values()
            .filter(|stored| {
                let cutoff = if stored.party.is_finished() {
                    finished_before
                } else {
                    abandoned_before
                };
                stored.party.updated_at < cutoff
            })
            .map(|stored| stored.party.code.clone())
            .collect();

        for code in &expired {
            if let Some(stored) = parties.remove(code) {
                self.hub.remove(code, stored.version);
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Avatar, GameMode, PartyPlayer, PartyStatus};

    fn party(code: &str) -> Party {
        let host = PartyPlayer::new("host".into(), "Host".into(), Avatar::Badge(1));
        Party::new(code.into(), host, GameMode::TimeTrial, 600, None)
    }

    #[tokio::test]
    async fn test_code_reuse_only_after_finish() {
        let store = InMemoryPartyStore::new();
        store.create(&party("7777")).await.unwrap();
        assert!(matches!(
            store.create(&party("7777")).await,
            Err(StoreError::AlreadyExists(_))
        ));

        store
            .update("7777", &mut |p: &mut Party| {
                p.status = PartyStatus::Finished;
                Mutation::Write
            })
            .await
            .unwrap();
        assert!(!store.is_code_in_use("7777").await.unwrap());
        store.create(&party("7777")).await.unwrap();
        assert!(store.is_code_in_use("7777").await.unwrap());
    }

    #[tokio::test]
    async fn test_abort_keeps_document() {
        let store = InMemoryPartyStore::new();
        store.create(&party("7777")).await.unwrap();
        let applied = store
            .update("7777", &mut |p: &mut Party| {
                p.players.clear();
                Mutation::Abort
            })
            .await
            .unwrap();
        assert_eq!(applied, Mutation::Abort);
        assert_eq!(store.find("7777").await.unwrap().unwrap().players.len(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_deletion() {
        let store = InMemoryPartyStore::new();
        store.create(&party("7777")).await.unwrap();
        let mut rx = store.subscribe("7777").await.unwrap();
        assert!(rx.borrow_and_update().is_some());

        assert!(store.delete("7777").await.unwrap());
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_recreated_code_publishes_to_new_subscribers() {
        let store = InMemoryPartyStore::new();
        store.create(&party("7777")).await.unwrap();
        for _ in 0..3 {
            store
                .update("7777", &mut |p: &mut Party| {
                    p.players[0].xp += 10;
                    Mutation::Write
                })
                .await
                .unwrap();
        }
        assert!(store.delete("7777").await.unwrap());

        store.create(&party("7777")).await.unwrap();
        let rx = store.subscribe("7777").await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().players[0].xp, 0);

        store
            .update("7777", &mut |p: &mut Party| {
                p.players[0].xp = 5;
                Mutation::Write
            })
            .await
            .unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().players[0].xp, 5);
    }

    #[tokio::test]
    async fn test_purge_keeps_fresh_parties() {
        let store = InMemoryPartyStore::new();
        store.create(&party("0001")).await.unwrap();
        let now = Utc::now();
        let purged = store
            .purge_expired(now - chrono::Duration::hours(1), now - chrono::Duration::hours(6))
            .await
            .unwrap();
        assert!(purged.is_empty());
        assert_eq!(store.len(), 1);
    }
}
