use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::repositories::{PartyStore, StoreError};

/// Deletes parties nobody will look at again.
///
/// Finished parties are kept for `finished_ttl` so late subscribers can still
/// read the results; unfinished parties with no update for `abandoned_ttl` are
/// treated as abandoned.
pub struct PartyReaper {
    party_store: Arc<dyn PartyStore>,
    finished_ttl: Duration,
    abandoned_ttl: Duration,
}

impl PartyReaper {
    pub fn new(party_store: Arc<dyn PartyStore>, finished_ttl: Duration, abandoned_ttl: Duration) -> Self {
        Self {
            party_store,
            finished_ttl,
            abandoned_ttl,
        }
    }

    /// One sweep. Returns the codes that were deleted.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let reaped = self
            .party_store
            .purge_expired(cutoff(now, self.finished_ttl), cutoff(now, self.abandoned_ttl))
            .await?;

        if !reaped.is_empty() {
            tracing::info!("Reaped {} expired parties: {:?}", reaped.len(), reaped);
        }
        Ok(reaped)
    }

    /// Sweep every `interval` until the task is aborted
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once(Utc::now()).await {
                    tracing::warn!("Party reaper sweep failed: {}", e);
                }
            }
        })
    }
}

fn cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
