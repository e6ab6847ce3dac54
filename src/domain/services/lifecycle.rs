use chrono::{DateTime, Utc};

use crate::domain::entities::{Party, PartyStatus};

/// Lifecycle error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Only the host can start the party")]
    NotHost,
    #[error("Cannot move party from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// waiting -> active, host only
pub fn start_party(party: &mut Party, caller_id: &str, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    if !party.is_host(caller_id) {
        return Err(LifecycleError::NotHost);
    }
    if party.status != PartyStatus::Waiting {
        return Err(LifecycleError::InvalidTransition {
            from: party.status.as_str(),
            to: PartyStatus::Active.as_str(),
        });
    }

    party.status = PartyStatus::Active;
    party.start_time = Some(now);
    Ok(())
}

/// active -> finished when the mode's win condition holds.
///
/// Returns true only when this call performed the transition; a party that is
/// already finished is left as is.
pub fn finish_if_complete(party: &mut Party, now: DateTime<Utc>) -> bool {
    if party.status != PartyStatus::Active || !party.is_complete(now) {
        return false;
    }

    party.status = PartyStatus::Finished;
    party.end_time = Some(now);
    true
}

/// Whether a subscriber observing `party` at `now` should attempt the
/// terminal transition
pub fn needs_finish(party: &Party, now: DateTime<Utc>) -> bool {
    party.status == PartyStatus::Active && party.is_complete(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Avatar, GameMode, PartyPlayer};
    use chrono::Duration;

    fn party(mode: GameMode, target: u32) -> Party {
        let host = PartyPlayer::new("host".into(), "Host".into(), Avatar::Badge(1));
        let mut party = Party::new("0420".into(), host, mode, target, None);
        party.add_player(PartyPlayer::new("guest".into(), "Guest".into(), Avatar::Badge(2)));
        party
    }

    #[test]
    fn test_only_host_starts() {
        let mut p = party(GameMode::ScoreRace, 500);
        let now = Utc::now();
        assert_eq!(start_party(&mut p, "guest", now), Err(LifecycleError::NotHost));
        assert_eq!(p.status, PartyStatus::Waiting);

        assert_eq!(start_party(&mut p, "host", now), Ok(()));
        assert_eq!(p.status, PartyStatus::Active);
        assert_eq!(p.start_time, Some(now));
    }

    #[test]
    fn test_start_never_regresses() {
        let mut p = party(GameMode::ScoreRace, 500);
        start_party(&mut p, "host", Utc::now()).unwrap();
        assert!(matches!(
            start_party(&mut p, "host", Utc::now()),
            Err(LifecycleError::InvalidTransition { from: "active", .. })
        ));

        p.status = PartyStatus::Finished;
        assert!(start_party(&mut p, "host", Utc::now()).is_err());
        assert_eq!(p.status, PartyStatus::Finished);
    }

    #[test]
    fn test_score_race_finishes_once() {
        let mut p = party(GameMode::ScoreRace, 500);
        let now = Utc::now();
        start_party(&mut p, "host", now).unwrap();
        assert!(!finish_if_complete(&mut p, now));

        p.get_player_mut("guest").unwrap().xp = 520;
        assert!(needs_finish(&p, now));
        assert!(finish_if_complete(&mut p, now));
        assert_eq!(p.end_time, Some(now));

        let later = now + Duration::seconds(5);
        assert!(!finish_if_complete(&mut p, later));
        assert_eq!(p.end_time, Some(now));
        assert!(!needs_finish(&p, later));
    }

    #[test]
    fn test_waiting_party_never_finishes() {
        let mut p = party(GameMode::ScoreRace, 100);
        p.get_player_mut("host").unwrap().xp = 100;
        assert!(!finish_if_complete(&mut p, Utc::now()));
        assert_eq!(p.status, PartyStatus::Waiting);
    }

    #[test]
    fn test_time_trial_finishes_after_target() {
        let mut p = party(GameMode::TimeTrial, 60);
        let start = Utc::now();
        start_party(&mut p, "host", start).unwrap();
        assert!(!finish_if_complete(&mut p, start + Duration::seconds(59)));
        assert!(finish_if_complete(&mut p, start + Duration::seconds(60)));
        assert_eq!(p.status, PartyStatus::Finished);
    }
}
