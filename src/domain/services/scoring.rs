use crate::domain::entities::Party;
use crate::domain::value_objects::{xp_for_catch, ScoreEvent};

/// Scoring error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("Player not in party")]
    PlayerNotInParty,
    #[error("Party has already finished")]
    PartyFinished,
    #[error("Creature id is required")]
    MissingCreatureId,
}

/// Credit a score event to one player and return the XP awarded.
///
/// Pure over the party value: it is the transform run inside a store
/// transaction, so it may be applied several times against fresh copies
/// when a write conflicts.
pub fn apply_score_event(
    party: &mut Party,
    player_id: &str,
    event: &ScoreEvent,
) -> Result<u32, ScoringError> {
    if party.is_finished() {
        return Err(ScoringError::PartyFinished);
    }

    let player = party
        .get_player_mut(player_id)
        .ok_or(ScoringError::PlayerNotInParty)?;

    let awarded = match event {
        ScoreEvent::CatchCreature { creature_id } => {
            let creature_id = creature_id.trim();
            if creature_id.is_empty() {
                return Err(ScoringError::MissingCreatureId);
            }
            let count = player.catches.entry(creature_id.to_string()).or_insert(0);
            let awarded = xp_for_catch(*count);
            *count += 1;
            awarded
        }
        ScoreEvent::QuizBonus { amount } => *amount,
    };

    player.xp = player.xp.saturating_add(awarded);
    Ok(awarded)
}

/// XP the given player would receive for catching `creature_id` next
pub fn preview_catch_xp(party: &Party, player_id: &str, creature_id: &str) -> u32 {
    let previous = party
        .get_player(player_id)
        .map(|p| p.catch_count(creature_id))
        .unwrap_or(0);
    xp_for_catch(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Avatar, GameMode, PartyPlayer, PartyStatus};

    fn party_with(ids: &[&str]) -> Party {
        let mut players = ids
            .iter()
            .map(|id| PartyPlayer::new(id.to_string(), id.to_string(), Avatar::Badge(0)));
        let host = players.next().unwrap();
        let mut party = Party::new("5423".into(), host, GameMode::ScoreRace, 500, None);
        for p in players {
            party.add_player(p);
        }
        party
    }

    #[test]
    fn test_first_catch_then_repeats() {
        let mut party = party_with(&["a"]);
        let crab = ScoreEvent::catch_creature("Crab");

        assert_eq!(apply_score_event(&mut party, "a", &crab), Ok(100));
        assert_eq!(apply_score_event(&mut party, "a", &crab), Ok(20));
        assert_eq!(apply_score_event(&mut party, "a", &crab), Ok(20));

        let a = party.get_player("a").unwrap();
        assert_eq!(a.xp, 140);
        assert_eq!(a.catch_count("Crab"), 3);
    }

    #[test]
    fn test_catches_are_per_player() {
        let mut party = party_with(&["a", "b"]);
        let star = ScoreEvent::catch_creature("Starfish");
        assert_eq!(apply_score_event(&mut party, "a", &star), Ok(100));
        assert_eq!(apply_score_event(&mut party, "b", &star), Ok(100));
        assert_eq!(preview_catch_xp(&party, "a", "Starfish"), 20);
        assert_eq!(preview_catch_xp(&party, "a", "Anemone"), 100);
    }

    #[test]
    fn test_quiz_bonus_ignores_catches() {
        let mut party = party_with(&["a"]);
        assert_eq!(apply_score_event(&mut party, "a", &ScoreEvent::quiz_bonus()), Ok(20));
        let a = party.get_player("a").unwrap();
        assert_eq!(a.xp, 20);
        assert!(a.catches.is_empty());
    }

    #[test]
    fn test_rejections_leave_party_untouched() {
        let mut party = party_with(&["a"]);
        let before = party.clone();

        assert_eq!(
            apply_score_event(&mut party, "ghost", &ScoreEvent::catch_creature("Crab")),
            Err(ScoringError::PlayerNotInParty)
        );
        assert_eq!(
            apply_score_event(&mut party, "a", &ScoreEvent::catch_creature("  ")),
            Err(ScoringError::MissingCreatureId)
        );
        assert_eq!(party, before);

        party.status = PartyStatus::Finished;
        assert_eq!(
            apply_score_event(&mut party, "a", &ScoreEvent::quiz_bonus()),
            Err(ScoringError::PartyFinished)
        );
    }
}
