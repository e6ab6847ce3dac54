use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Avatar shown next to a player: a badge id from the profile, or a literal emoji
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Avatar {
    Badge(i64),
    Emoji(String),
}

impl Default for Avatar {
    fn default() -> Self {
        Avatar::Emoji("🦦".to_string())
    }
}

/// PartyPlayer entity - a player embedded in a party document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyPlayer {
    pub id: String,
    pub name: String,
    pub avatar: Avatar,
    pub xp: u32,
    /// creature id -> times caught in this party
    #[serde(default)]
    pub catches: BTreeMap<String, u32>,
}

impl PartyPlayer {
    /// Create a new party player with no score
    pub fn new(id: String, name: String, avatar: Avatar) -> Self {
        Self {
            id,
            name,
            avatar,
            xp: 0,
            catches: BTreeMap::new(),
        }
    }

    pub fn catch_count(&self, creature_id: &str) -> u32 {
        self.catches.get(creature_id).copied().unwrap_or(0)
    }

    pub fn is_first_catch(&self, creature_id: &str) -> bool {
        self.catch_count(creature_id) == 0
    }

    pub fn unique_creatures(&self) -> usize {
        self.catches.len()
    }
}

/// Profile data used to build a player entry when creating or joining
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub user_id: String,
    pub display_name: String,
    pub avatar: Avatar,
}

impl PlayerProfile {
    pub const DEFAULT_NAME: &'static str = "Player";

    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, avatar: Avatar) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar,
        }
    }

    /// Fresh player entry, falling back to a generic name when none was chosen
    pub fn to_player(&self) -> PartyPlayer {
        let name = self.display_name.trim();
        let name = if name.is_empty() { Self::DEFAULT_NAME } else { name };
        PartyPlayer::new(self.user_id.clone(), name.to_string(), self.avatar.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_accepts_badge_or_emoji() {
        let badge: Avatar = serde_json::from_str("3").unwrap();
        assert_eq!(badge, Avatar::Badge(3));
        let emoji: Avatar = serde_json::from_str("\"🦀\"").unwrap();
        assert_eq!(emoji, Avatar::Emoji("🦀".into()));
    }

    #[test]
    fn test_profile_without_name_uses_default() {
        let profile = PlayerProfile::new("u1", "   ", Avatar::Badge(2));
        let player = profile.to_player();
        assert_eq!(player.name, "Player");
        assert_eq!(player.xp, 0);
        assert!(player.catches.is_empty());
    }

    #[test]
    fn test_missing_catches_decode_as_empty() {
        let player: PartyPlayer =
            serde_json::from_str(r#"{"id":"a","name":"A","avatar":0,"xp":20}"#).unwrap();
        assert!(player.is_first_catch("Crab"));
        assert_eq!(player.unique_creatures(), 0);
    }
}
