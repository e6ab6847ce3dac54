use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

use crate::domain::entities::Party;
use crate::domain::repositories::PartySubscription;

struct Channel {
    sender: watch::Sender<Option<Party>>,
    version: u64,
}

#[derive(Default)]
struct Channels {
    live: HashMap<String, Channel>,
    /// Highest version each code reached before its document was removed
    retired: HashMap<String, u64>,
}

impl Channels {
    fn retired(&self, code: &str) -> u64 {
        self.retired.get(code).copied().unwrap_or(0)
    }
}

/// Fan-out of party snapshots to subscribers.
///
/// One watch channel per party code. Receivers always see the latest
/// published snapshot; intermediate snapshots may be skipped. Snapshots
/// carry the store version so an out-of-order publish never rolls a
/// subscriber back to an older state.
///
/// Versions keep growing across deletions of a code: a removed code leaves
/// a tombstone, late publishes at or below it are dropped, and a party
/// created later under the same code starts above it (see `next_version`).
#[derive(Default)]
pub struct SnapshotHub {
    channels: Mutex<Channels>,
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First version for a fresh document under `code`
    pub fn next_version(&self, code: &str) -> u64 {
        let channels = self.lock();
        let live = channels.live.get(code).map(|c| c.version).unwrap_or(0);
        channels.retired(code).max(live) + 1
    }

    /// Publish a committed snapshot
    pub fn publish(&self, code: &str, version: u64, party: &Party) {
        let mut channels = self.lock();
        if version <= channels.retired(code) {
            tracing::trace!("Dropping snapshot v{} of removed party {}", version, code);
            return;
        }
        match channels.live.get_mut(code) {
            Some(channel) if channel.version >= version => {
                tracing::trace!("Dropping stale snapshot v{} for party {}", version, code);
            }
            Some(channel) => {
                channel.version = version;
                channel.sender.send_replace(Some(party.clone()));
            }
            None => {
                let (sender, _receiver) = watch::channel(Some(party.clone()));
                channels.live.insert(code.to_string(), Channel { sender, version });
            }
        }
    }

    /// Subscribe, seeding the channel with `current` if nobody published yet.
    ///
    /// A `current` loaded before the code was removed yields a receiver that
    /// already reads `None` and is closed.
    pub fn subscribe(&self, code: &str, version: u64, current: Party) -> PartySubscription {
        let mut channels = self.lock();
        if version <= channels.retired(code) {
            let (_sender, receiver) = watch::channel(None);
            return receiver;
        }
        match channels.live.get_mut(code) {
            Some(channel) => {
                // A committed write whose publish has not landed yet
                if channel.version < version {
                    channel.version = version;
                    channel.sender.send_replace(Some(current));
                }
                channel.sender.subscribe()
            }
            None => {
                let (sender, receiver) = watch::channel(Some(current));
                channels.live.insert(code.to_string(), Channel { sender, version });
                receiver
            }
        }
    }

    /// Tell subscribers the party is gone and drop its channel.
    /// `version` is the last committed version of the removed document.
    pub fn remove(&self, code: &str, version: u64) {
        let mut channels = self.lock();
        let removed = channels.live.remove(code);
        let live = removed.as_ref().map(|c| c.version).unwrap_or(0);
        let floor = channels.retired(code).max(live).max(version);
        channels.retired.insert(code.to_string(), floor);
        drop(channels);

        if let Some(channel) = removed {
            channel.sender.send_replace(None);
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, code: &str) -> usize {
        self.lock()
            .live
            .get(code)
            .map(|channel| channel.sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Avatar, GameMode, PartyPlayer};

    fn party_with_xp(xp: u32) -> Party {
        let mut host = PartyPlayer::new("a".into(), "A".into(), Avatar::Badge(0));
        host.xp = xp;
        Party::new("1111".into(), host, GameMode::ScoreRace, 500, None)
    }

    #[test]
    fn test_stale_publish_is_ignored() {
        let hub = SnapshotHub::new();
        let rx = hub.subscribe("1111", 1, party_with_xp(0));

        hub.publish("1111", 3, &party_with_xp(120));
        hub.publish("1111", 2, &party_with_xp(100));

        let seen = rx.borrow().clone().unwrap();
        assert_eq!(seen.players[0].xp, 120);
    }

    #[test]
    fn test_subscribe_after_publish_sees_latest() {
        let hub = SnapshotHub::new();
        hub.publish("1111", 5, &party_with_xp(40));
        let rx = hub.subscribe("1111", 4, party_with_xp(20));
        assert_eq!(rx.borrow().as_ref().unwrap().players[0].xp, 40);
        assert_eq!(hub.subscriber_count("1111"), 1);
    }

    #[tokio::test]
    async fn test_remove_delivers_none_then_closes() {
        let hub = SnapshotHub::new();
        let mut rx = hub.subscribe("1111", 1, party_with_xp(0));
        hub.remove("1111", 1);

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
        assert!(rx.changed().await.is_err());
    }

    #[test]
    fn test_late_publish_after_remove_does_not_revive_party() {
        let hub = SnapshotHub::new();
        hub.publish("1111", 4, &party_with_xp(10));

        // v5 committed, then the party is deleted before v5 is published
        hub.remove("1111", 5);
        hub.publish("1111", 5, &party_with_xp(60));
        assert_eq!(hub.subscriber_count("1111"), 0);

        // The code is reused: its first version sits above the tombstone
        let version = hub.next_version("1111");
        assert_eq!(version, 6);
        hub.publish("1111", version, &party_with_xp(0));
        let rx = hub.subscribe("1111", version, party_with_xp(0));
        assert_eq!(rx.borrow().as_ref().unwrap().players[0].xp, 0);

        hub.publish("1111", version + 1, &party_with_xp(100));
        assert_eq!(rx.borrow().as_ref().unwrap().players[0].xp, 100);
    }

    #[tokio::test]
    async fn test_subscribe_with_snapshot_older_than_removal() {
        let hub = SnapshotHub::new();
        hub.remove("1111", 3);

        let mut rx = hub.subscribe("1111", 3, party_with_xp(50));
        assert!(rx.borrow_and_update().is_none());
        assert!(rx.changed().await.is_err());
        assert_eq!(hub.subscriber_count("1111"), 0);
    }
}
