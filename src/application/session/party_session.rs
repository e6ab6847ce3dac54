use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::application::party::{
    CreateParty, CreatePartyInput, FinishParty, JoinParty, JoinPartyInput, LeaveParty,
    LeavePartyInput, LeavePartyOutput, RecordScore, RecordScoreInput, StartParty, StartPartyInput,
    DEFAULT_ALLOCATION_ATTEMPTS,
};
use crate::application::session::SessionError;
use crate::domain::entities::{Party, PartyLocation, PartyPlayer, PlayerProfile};
use crate::domain::repositories::{PartyStore, PartySubscription};
use crate::domain::services::{needs_finish, preview_catch_xp};
use crate::domain::value_objects::{JoinCode, RaceSettings, ScoreEvent, FIRST_CATCH_XP};

/// How long an XP gain stays visible after a catch
pub const XP_FEEDBACK_DURATION: Duration = Duration::from_secs(2);
/// How often a session re-checks time-based completion without new snapshots
pub const COMPLETION_TICK: Duration = Duration::from_secs(1);

type ErrorSlot = Arc<Mutex<Option<SessionError>>>;

#[derive(Debug, Clone, Copy)]
struct XpGain {
    amount: u32,
    expires_at: Instant,
}

struct ActiveSubscription {
    code: String,
    snapshots: PartySubscription,
    watcher: JoinHandle<()>,
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// Per-player controller over one party subscription.
///
/// Reads always reflect the latest snapshot the store published. Commands
/// report failure both through their return value and through the
/// observable error slot. Dropping the session (or calling `close`) stops
/// the subscription.
pub struct PartySession<P: PartyStore + ?Sized + 'static> {
    party_store: Arc<P>,
    profile: PlayerProfile,
    allocation_attempts: u32,
    completion_tick: Duration,
    subscription: Option<ActiveSubscription>,
    error: ErrorSlot,
    last_xp_gain: Option<XpGain>,
}

impl<P: PartyStore + ?Sized + 'static> PartySession<P> {
    pub fn new(party_store: Arc<P>, profile: PlayerProfile) -> Self {
        Self {
            party_store,
            profile,
            allocation_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
            completion_tick: COMPLETION_TICK,
            subscription: None,
            error: Arc::new(Mutex::new(None)),
            last_xp_gain: None,
        }
    }

    pub fn with_allocation_attempts(mut self, attempts: u32) -> Self {
        self.allocation_attempts = attempts;
        self
    }

    pub fn with_completion_tick(mut self, tick: Duration) -> Self {
        self.completion_tick = tick;
        self
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.profile
    }

    pub fn user_id(&self) -> &str {
        &self.profile.user_id
    }

    // ========== Commands ==========

    /// Create a party with the caller as host and start listening to it
    pub async fn create_party(
        &mut self,
        settings: RaceSettings,
        location: Option<PartyLocation>,
    ) -> Result<String, SessionError> {
        self.clear_error();

        let use_case = CreateParty::new(self.party_store.clone())
            .with_allocation_attempts(self.allocation_attempts);
        let result = use_case
            .execute(CreatePartyInput {
                host: self.profile.clone(),
                settings,
                location,
            })
            .await
            .map_err(SessionError::from);

        let party = self.record(result)?.party;
        self.start_listening(&party.code).await?;
        Ok(party.code)
    }

    /// 10-minute time trial
    pub async fn create_quick_time_trial(&mut self) -> Result<String, SessionError> {
        self.create_party(RaceSettings::quick_time_trial(), None).await
    }

    /// First to 500 XP
    pub async fn create_quick_score_race(&mut self) -> Result<String, SessionError> {
        self.create_party(RaceSettings::quick_score_race(), None).await
    }

    /// Join by code. Joining a party the caller is already in succeeds.
    pub async fn join_party(&mut self, code: &str) -> Result<(), SessionError> {
        self.clear_error();

        // Fail fast without a store round trip
        let code = self.record(JoinCode::parse(code).map_err(SessionError::from))?;

        let result = JoinParty::new(self.party_store.clone())
            .execute(JoinPartyInput {
                player: self.profile.clone(),
                code: code.to_string(),
            })
            .await
            .map_err(SessionError::from);
        self.record(result)?;

        self.start_listening(code.as_str()).await
    }

    /// Leave the current party and stop listening to it.
    ///
    /// A party that is already gone counts as left.
    pub async fn leave_party(&mut self) -> Result<LeavePartyOutput, SessionError> {
        self.clear_error();
        let code = self.record(self.require_code())?;

        // Our own departure may delete the party; that is not a PartyClosed
        self.pause_watcher().await;

        let result = LeaveParty::new(self.party_store.clone())
            .execute(LeavePartyInput {
                user_id: self.profile.user_id.clone(),
                code: code.clone(),
            })
            .await
            .map_err(SessionError::from);

        let output = match result {
            Ok(output) => output,
            Err(SessionError::PartyNotFound) => {
                tracing::debug!("Party {} was already gone when {} left", code, self.profile.user_id);
                LeavePartyOutput {
                    new_host_id: None,
                    party_deleted: true,
                }
            }
            Err(e) => {
                self.resume_watcher();
                return self.record(Err(e));
            }
        };

        self.stop_listening();
        Ok(output)
    }

    /// Leave after the results screen has been seen
    pub async fn dismiss_results(&mut self) -> Result<LeavePartyOutput, SessionError> {
        self.leave_party().await
    }

    /// Start the race. Host only.
    pub async fn start_party(&mut self) -> Result<(), SessionError> {
        self.clear_error();
        let code = self.record(self.require_code())?;

        let result = StartParty::new(self.party_store.clone())
            .execute(StartPartyInput {
                user_id: self.profile.user_id.clone(),
                code,
            })
            .await
            .map(|_| ())
            .map_err(SessionError::from);
        self.record(result)
    }

    /// Credit a catch and return the XP awarded
    pub async fn record_catch(&mut self, creature_id: &str) -> Result<u32, SessionError> {
        self.record_score(ScoreEvent::catch_creature(creature_id)).await
    }

    /// Credit a correctly answered quiz question
    pub async fn add_quiz_bonus(&mut self) -> Result<u32, SessionError> {
        self.record_score(ScoreEvent::quiz_bonus()).await
    }

    async fn record_score(&mut self, event: ScoreEvent) -> Result<u32, SessionError> {
        self.clear_error();
        let code = self.record(self.require_code())?;

        let result = RecordScore::new(self.party_store.clone())
            .execute(RecordScoreInput {
                user_id: self.profile.user_id.clone(),
                code: code.clone(),
                event,
            })
            .await
            .map_err(SessionError::from);
        let output = self.record(result)?;

        self.last_xp_gain = Some(XpGain {
            amount: output.xp_awarded,
            expires_at: Instant::now() + XP_FEEDBACK_DURATION,
        });

        if needs_finish(&output.party, Utc::now()) {
            // The watcher would notice too; the transition is idempotent
            if let Err(e) = FinishParty::new(self.party_store.clone()).execute(&code).await {
                self.set_error(e.into());
            }
        }

        Ok(output.xp_awarded)
    }

    /// Evaluate completion now. Returns true if the party is finished.
    pub async fn check_completion(&mut self) -> Result<bool, SessionError> {
        self.clear_error();
        let code = self.record(self.require_code())?;
        let result = FinishParty::new(self.party_store.clone())
            .execute(&code)
            .await
            .map(|output| output.party.is_finished())
            .map_err(SessionError::from);
        self.record(result)
    }

    // ========== Subscription ==========

    async fn start_listening(&mut self, code: &str) -> Result<(), SessionError> {
        // Exactly one live subscription per session
        self.stop_listening();

        let result = self
            .party_store
            .subscribe(code)
            .await
            .map_err(SessionError::from);
        let snapshots = self.record(result)?;
        let watcher = self.spawn_watcher(code, &snapshots);

        tracing::debug!("Session for {} listening to party {}", self.profile.user_id, code);
        self.subscription = Some(ActiveSubscription {
            code: code.to_string(),
            snapshots,
            watcher,
        });
        Ok(())
    }

    fn spawn_watcher(&self, code: &str, snapshots: &PartySubscription) -> JoinHandle<()> {
        tokio::spawn(watch_party(
            self.party_store.clone(),
            code.to_string(),
            snapshots.clone(),
            self.error.clone(),
            self.completion_tick,
        ))
    }

    /// Stop the background watcher but keep reading snapshots
    async fn pause_watcher(&mut self) {
        if let Some(subscription) = self.subscription.as_mut() {
            subscription.watcher.abort();
            // Returns once the task is really gone
            let _ = (&mut subscription.watcher).await;
        }
    }

    fn resume_watcher(&mut self) {
        if let Some(subscription) = &self.subscription {
            let watcher = self.spawn_watcher(&subscription.code, &subscription.snapshots);
            if let Some(subscription) = self.subscription.as_mut() {
                subscription.watcher = watcher;
            }
        }
    }

    /// Stop listening and forget the current party
    pub fn stop_listening(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            tracing::debug!(
                "Session for {} stopped listening to party {}",
                self.profile.user_id,
                subscription.code
            );
        }
        self.last_xp_gain = None;
    }

    pub fn is_listening(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|s| !s.watcher.is_finished())
    }

    /// Explicit teardown
    pub fn close(mut self) {
        self.stop_listening();
    }

    // ========== Derived state ==========

    /// Latest snapshot of the current party
    pub fn party(&self) -> Option<Party> {
        self.subscription
            .as_ref()
            .and_then(|s| s.snapshots.borrow().clone())
    }

    fn with_party<T>(&self, f: impl FnOnce(&Party) -> T) -> Option<T> {
        let subscription = self.subscription.as_ref()?;
        let snapshot = subscription.snapshots.borrow();
        snapshot.as_ref().map(f)
    }

    pub fn code(&self) -> Option<String> {
        self.subscription.as_ref().map(|s| s.code.clone())
    }

    pub fn is_in_party(&self) -> bool {
        self.with_party(|_| ()).is_some()
    }

    pub fn is_host(&self) -> bool {
        self.with_party(|p| p.is_host(&self.profile.user_id))
            .unwrap_or(false)
    }

    pub fn current_player(&self) -> Option<PartyPlayer> {
        self.with_party(|p| p.get_player(&self.profile.user_id).cloned())
            .flatten()
    }

    /// 1-based rank of any player
    pub fn rank(&self, player_id: &str) -> Option<usize> {
        self.with_party(|p| p.rank(player_id)).flatten()
    }

    pub fn current_rank(&self) -> Option<usize> {
        self.rank(&self.profile.user_id)
    }

    pub fn progress(&self, player_id: &str) -> f64 {
        self.with_party(|p| p.progress(player_id)).unwrap_or(0.0)
    }

    pub fn leader(&self) -> Option<PartyPlayer> {
        self.with_party(|p| p.leader().cloned()).flatten()
    }

    pub fn sorted_players(&self) -> Vec<PartyPlayer> {
        self.with_party(|p| p.sorted_players().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Time left in an active time trial
    pub fn time_remaining(&self) -> Option<chrono::Duration> {
        self.with_party(|p| p.time_remaining(Utc::now())).flatten()
    }

    pub fn time_remaining_formatted(&self) -> Option<String> {
        self.with_party(|p| p.time_remaining_formatted(Utc::now()))
            .flatten()
    }

    /// XP the caller's next catch of `creature_id` would award
    pub fn xp_preview(&self, creature_id: &str) -> u32 {
        self.with_party(|p| preview_catch_xp(p, &self.profile.user_id, creature_id))
            .unwrap_or(FIRST_CATCH_XP)
    }

    pub fn is_race_over(&self) -> bool {
        self.with_party(|p| p.is_finished()).unwrap_or(false)
    }

    /// Top three once the race is over, empty before
    pub fn race_results(&self) -> Vec<PartyPlayer> {
        self.with_party(|p| if p.is_finished() { p.podium() } else { Vec::new() })
            .unwrap_or_default()
    }

    /// XP from the most recent score event, until it expires
    pub fn last_xp_gain(&self) -> Option<u32> {
        self.last_xp_gain
            .filter(|gain| Instant::now() < gain.expires_at)
            .map(|gain| gain.amount)
    }

    // ========== Error slot ==========

    pub fn error(&self) -> Option<SessionError> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_error(&self) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn set_error(&self, error: SessionError) {
        set_error(&self.error, error);
    }

    fn record<T>(&self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(e) = &result {
            self.set_error(e.clone());
        }
        result
    }

    fn require_code(&self) -> Result<String, SessionError> {
        self.code().ok_or(SessionError::NoActiveParty)
    }
}

fn set_error(slot: &ErrorSlot, error: SessionError) {
    if error.is_retryable() {
        tracing::warn!("Party session error (retryable): {}", error);
    } else {
        tracing::debug!("Party session error: {}", error);
    }
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
}

/// Background half of a session: evaluates completion on every snapshot and
/// on a periodic tick, so time trials end without anyone scoring.
async fn watch_party<P: PartyStore + ?Sized + 'static>(
    party_store: Arc<P>,
    code: String,
    mut snapshots: PartySubscription,
    error: ErrorSlot,
    tick: Duration,
) {
    let finisher = FinishParty::new(party_store);
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    tracing::debug!("Snapshot channel for party {} closed", code);
                    break;
                }
            }
            _ = ticker.tick() => {}
        }

        let should_finish = match snapshots.borrow_and_update().as_ref() {
            Some(party) => needs_finish(party, Utc::now()),
            None => {
                set_error(&error, SessionError::PartyClosed);
                break;
            }
        };

        if should_finish {
            if let Err(e) = finisher.execute(&code).await {
                set_error(&error, e.into());
            }
        }
    }
}
