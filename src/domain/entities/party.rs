use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::PartyPlayer;

/// Number of players shown on the results podium
pub const PODIUM_SIZE: usize = 3;

/// Party status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Waiting,
    Active,
    Finished,
}

impl PartyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyStatus::Waiting => "waiting",
            PartyStatus::Active => "active",
            PartyStatus::Finished => "finished",
        }
    }
}

/// Game mode, decides what `target_value` means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Maximize XP before `target_value` seconds have elapsed
    TimeTrial,
    /// First player to reach `target_value` XP wins
    ScoreRace,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::TimeTrial => "time_trial",
            GameMode::ScoreRace => "score_race",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "time_trial" => Some(GameMode::TimeTrial),
            "score_race" => Some(GameMode::ScoreRace),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            GameMode::TimeTrial => "Time Trial",
            GameMode::ScoreRace => "Score Race",
        }
    }
}

/// Optional physical site a party is played at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyLocation {
    pub id: String,
    pub name: String,
}

/// Party entity, one document per join code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub code: String,
    pub host_id: String,
    pub location_id: Option<String>,
    pub location_name: Option<String>,
    pub status: PartyStatus,
    pub game_mode: GameMode,
    pub target_value: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub players: Vec<PartyPlayer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Party {
    /// Create a new waiting party with the host as its only player
    pub fn new(
        code: String,
        host: PartyPlayer,
        game_mode: GameMode,
        target_value: u32,
        location: Option<PartyLocation>,
    ) -> Self {
        let now = Utc::now();
        let (location_id, location_name) = match location {
            Some(location) => (Some(location.id), Some(location.name)),
            None => (None, None),
        };
        Self {
            code,
            host_id: host.id.clone(),
            location_id,
            location_name,
            status: PartyStatus::Waiting,
            game_mode,
            target_value,
            start_time: None,
            end_time: None,
            players: vec![host],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == PartyStatus::Finished
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    pub fn get_player(&self, user_id: &str) -> Option<&PartyPlayer> {
        self.players.iter().find(|p| p.id == user_id)
    }

    pub fn get_player_mut(&mut self, user_id: &str) -> Option<&mut PartyPlayer> {
        self.players.iter_mut().find(|p| p.id == user_id)
    }

    pub fn contains_player(&self, user_id: &str) -> bool {
        self.get_player(user_id).is_some()
    }

    /// Add a player. Returns false if a player with the same id is already present.
    pub fn add_player(&mut self, player: PartyPlayer) -> bool {
        if self.contains_player(&player.id) {
            return false;
        }
        self.players.push(player);
        true
    }

    /// Remove a player, handing the host role to the first remaining player
    /// when the host leaves.
    pub fn remove_player(&mut self, user_id: &str) -> PlayerRemoval {
        let before = self.players.len();
        self.players.retain(|p| p.id != user_id);
        if self.players.len() == before {
            return PlayerRemoval::NotPresent;
        }

        let Some(first) = self.players.first() else {
            return PlayerRemoval::LastPlayerLeft;
        };

        if self.host_id == user_id {
            self.host_id = first.id.clone();
            PlayerRemoval::Removed {
                new_host_id: Some(self.host_id.clone()),
            }
        } else {
            PlayerRemoval::Removed { new_host_id: None }
        }
    }

    /// Players sorted by XP, descending. Ties keep their stored order.
    pub fn sorted_players(&self) -> Vec<&PartyPlayer> {
        let mut sorted: Vec<&PartyPlayer> = self.players.iter().collect();
        sorted.sort_by(|a, b| b.xp.cmp(&a.xp));
        sorted
    }

    /// 1-based leaderboard position
    pub fn rank(&self, user_id: &str) -> Option<usize> {
        self.sorted_players()
            .iter()
            .position(|p| p.id == user_id)
            .map(|index| index + 1)
    }

    pub fn leader(&self) -> Option<&PartyPlayer> {
        self.sorted_players().into_iter().next()
    }

    /// Progress toward the goal, always within 0.0..=1.0
    pub fn progress(&self, user_id: &str) -> f64 {
        let Some(player) = self.get_player(user_id) else {
            return 0.0;
        };

        match self.game_mode {
            GameMode::ScoreRace => {
                if self.target_value == 0 {
                    return 1.0;
                }
                (f64::from(player.xp) / f64::from(self.target_value)).min(1.0)
            }
            GameMode::TimeTrial => {
                let max_xp = self.players.iter().map(|p| p.xp).max().unwrap_or(0);
                if max_xp == 0 {
                    return 0.0;
                }
                f64::from(player.xp) / f64::from(max_xp)
            }
        }
    }

    /// Whether the mode's win condition holds at `now`
    pub fn is_complete(&self, now: DateTime<Utc>) -> bool {
        match self.game_mode {
            GameMode::ScoreRace => self.players.iter().any(|p| p.xp >= self.target_value),
            GameMode::TimeTrial => match self.start_time {
                Some(start) => now - start >= Duration::seconds(i64::from(self.target_value)),
                None => false,
            },
        }
    }

    /// Remaining time of an active time trial
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.game_mode != GameMode::TimeTrial || self.status != PartyStatus::Active {
            return None;
        }
        let start = self.start_time?;
        let remaining = Duration::seconds(i64::from(self.target_value)) - (now - start);
        Some(remaining.max(Duration::zero()))
    }

    /// Remaining time formatted as `m:ss`
    pub fn time_remaining_formatted(&self, now: DateTime<Utc>) -> Option<String> {
        self.time_remaining(now).map(|remaining| {
            let total = remaining.num_seconds();
            format!("{}:{:02}", total / 60, total % 60)
        })
    }

    /// Top of the leaderboard, frozen once the party is finished
    pub fn podium(&self) -> Vec<PartyPlayer> {
        self.sorted_players()
            .into_iter()
            .take(PODIUM_SIZE)
            .cloned()
            .collect()
    }

    pub fn total_xp(&self) -> u64 {
        self.players.iter().map(|p| u64::from(p.xp)).sum()
    }
}

/// Result of removing a player from a party
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerRemoval {
    NotPresent,
    Removed { new_host_id: Option<String> },
    LastPlayerLeft,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, xp: u32) -> PartyPlayer {
        let mut player = PartyPlayer::new(id.to_string(), id.to_uppercase(), Default::default());
        player.xp = xp;
        player
    }

    fn race(target: u32, players: Vec<PartyPlayer>) -> Party {
        let mut iter = players.into_iter();
        let host = iter.next().expect("at least one player");
        let mut party = Party::new("5423".into(), host, GameMode::ScoreRace, target, None);
        for p in iter {
            party.add_player(p);
        }
        party
    }

    #[test]
    fn test_game_mode_wire_names() {
        assert_eq!(serde_json::to_string(&GameMode::TimeTrial).unwrap(), "\"time_trial\"");
        assert_eq!(serde_json::to_string(&GameMode::ScoreRace).unwrap(), "\"score_race\"");
        assert_eq!(GameMode::from_str("score_race"), Some(GameMode::ScoreRace));
        assert_eq!(GameMode::from_str("relay"), None);
    }

    #[test]
    fn test_party_document_shape() {
        let party = race(500, vec![player("a", 0)]);
        let json = serde_json::to_value(&party).unwrap();
        assert_eq!(json["code"], "5423");
        assert_eq!(json["hostId"], "a");
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["gameMode"], "score_race");
        assert_eq!(json["targetValue"], 500);
        assert!(json["startTime"].is_null());
        assert!(json["locationId"].is_null());
        assert_eq!(json["players"][0]["xp"], 0);
    }

    #[test]
    fn test_add_player_is_unique() {
        let mut party = race(500, vec![player("a", 0)]);
        assert!(party.add_player(player("b", 0)));
        assert!(!party.add_player(player("b", 40)));
        assert_eq!(party.players.len(), 2);
    }

    #[test]
    fn test_rank_ties_keep_stored_order() {
        let party = race(500, vec![player("a", 100), player("b", 180), player("c", 100)]);
        assert_eq!(party.rank("b"), Some(1));
        assert_eq!(party.rank("a"), Some(2));
        assert_eq!(party.rank("c"), Some(3));
        assert_eq!(party.rank("zed"), None);
        assert_eq!(party.leader().map(|p| p.id.as_str()), Some("b"));
    }

    #[test]
    fn test_score_race_progress_is_clamped() {
        let party = race(500, vec![player("a", 750), player("b", 250)]);
        assert_eq!(party.progress("a"), 1.0);
        assert_eq!(party.progress("b"), 0.5);
        assert_eq!(party.progress("missing"), 0.0);
    }

    #[test]
    fn test_time_trial_progress_relative_to_leader() {
        let mut party = race(600, vec![player("a", 0), player("b", 0)]);
        party.game_mode = GameMode::TimeTrial;
        assert_eq!(party.progress("a"), 0.0);

        party.get_player_mut("a").unwrap().xp = 200;
        party.get_player_mut("b").unwrap().xp = 50;
        assert_eq!(party.progress("a"), 1.0);
        assert_eq!(party.progress("b"), 0.25);
    }

    #[test]
    fn test_score_race_completion() {
        let mut party = race(500, vec![player("a", 499)]);
        assert!(!party.is_complete(Utc::now()));
        party.get_player_mut("a").unwrap().xp = 500;
        assert!(party.is_complete(Utc::now()));
    }

    #[test]
    fn test_time_trial_completion_and_remaining() {
        let mut party = race(600, vec![player("a", 0)]);
        party.game_mode = GameMode::TimeTrial;
        let start = Utc::now();
        assert!(!party.is_complete(start));
        assert_eq!(party.time_remaining(start), None);

        party.status = PartyStatus::Active;
        party.start_time = Some(start);

        let later = start + Duration::seconds(95);
        assert!(!party.is_complete(later));
        assert_eq!(party.time_remaining_formatted(later).as_deref(), Some("8:25"));

        let done = start + Duration::seconds(600);
        assert!(party.is_complete(done));
        assert_eq!(party.time_remaining_formatted(done + Duration::seconds(30)).as_deref(), Some("0:00"));
    }

    #[test]
    fn test_remove_host_transfers_to_first_remaining() {
        let mut party = race(500, vec![player("a", 0), player("b", 0), player("c", 0)]);
        assert_eq!(
            party.remove_player("a"),
            PlayerRemoval::Removed {
                new_host_id: Some("b".into())
            }
        );
        assert_eq!(party.host_id, "b");
        assert_eq!(party.remove_player("c"), PlayerRemoval::Removed { new_host_id: None });
        assert_eq!(party.remove_player("c"), PlayerRemoval::NotPresent);
        assert_eq!(party.remove_player("b"), PlayerRemoval::LastPlayerLeft);
        assert!(party.players.is_empty());
    }

    #[test]
    fn test_podium_takes_top_three() {
        let party = race(
            500,
            vec![player("a", 140), player("b", 180), player("c", 20), player("d", 60)],
        );
        let podium: Vec<_> = party.podium().into_iter().map(|p| p.id).collect();
        assert_eq!(podium, vec!["b", "a", "d"]);
        assert_eq!(party.total_xp(), 400);
    }
}
