use serde::{Deserialize, Serialize};

use crate::domain::entities::GameMode;

/// Quick-start time trial length (10 minutes)
pub const QUICK_TIME_TRIAL_SECONDS: u32 = 600;
/// Quick-start score race goal
pub const QUICK_SCORE_RACE_XP: u32 = 500;

/// Longest time trial a host may configure (24 hours)
const MAX_TIME_TRIAL_SECONDS: u32 = 24 * 60 * 60;

/// Race configuration chosen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSettings {
    pub game_mode: GameMode,
    /// Seconds for a time trial, XP for a score race
    pub target_value: u32,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self::quick_score_race()
    }
}

impl RaceSettings {
    pub fn new(game_mode: GameMode, target_value: u32) -> Self {
        Self {
            game_mode,
            target_value,
        }
    }

    pub fn quick_time_trial() -> Self {
        Self::new(GameMode::TimeTrial, QUICK_TIME_TRIAL_SECONDS)
    }

    pub fn quick_score_race() -> Self {
        Self::new(GameMode::ScoreRace, QUICK_SCORE_RACE_XP)
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.target_value == 0 {
            return Err("Target value must be greater than zero");
        }
        if self.game_mode == GameMode::TimeTrial && self.target_value > MAX_TIME_TRIAL_SECONDS {
            return Err("Time trials cannot last longer than 24 hours");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_presets() {
        assert_eq!(RaceSettings::quick_time_trial().target_value, 600);
        assert_eq!(RaceSettings::quick_score_race().game_mode, GameMode::ScoreRace);
        assert!(RaceSettings::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_targets() {
        assert!(RaceSettings::new(GameMode::ScoreRace, 0).validate().is_err());
        assert!(RaceSettings::new(GameMode::TimeTrial, 90_000).validate().is_err());
        assert!(RaceSettings::new(GameMode::ScoreRace, 90_000).validate().is_ok());
    }
}
