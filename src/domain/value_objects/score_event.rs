use serde::{Deserialize, Serialize};

/// XP for the first catch of a creature within a party
pub const FIRST_CATCH_XP: u32 = 100;
/// XP for every later catch of the same creature
pub const REPEAT_CATCH_XP: u32 = 20;
/// XP for a correctly answered quiz question
pub const QUIZ_BONUS_XP: u32 = 20;

/// A scoring event credited to one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScoreEvent {
    #[serde(rename_all = "camelCase")]
    CatchCreature { creature_id: String },
    QuizBonus { amount: u32 },
}

impl ScoreEvent {
    pub fn catch_creature(creature_id: impl Into<String>) -> Self {
        ScoreEvent::CatchCreature {
            creature_id: creature_id.into(),
        }
    }

    pub fn quiz_bonus() -> Self {
        ScoreEvent::QuizBonus {
            amount: QUIZ_BONUS_XP,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScoreEvent::CatchCreature { .. } => "catch",
            ScoreEvent::QuizBonus { .. } => "quiz",
        }
    }
}

/// XP awarded for a catch given how many times the creature was already caught
pub fn xp_for_catch(previous_count: u32) -> u32 {
    if previous_count == 0 {
        FIRST_CATCH_XP
    } else {
        REPEAT_CATCH_XP
    }
}
