use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{Avatar, PlayerProfile};

/// JWT claims: the identity and display profile of one player
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Avatar,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn profile(&self) -> PlayerProfile {
        PlayerProfile::new(self.user_id.clone(), self.name.clone(), self.avatar.clone())
    }
}

/// JWT service for token management
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in_seconds: usize,
}

impl JwtService {
    pub fn new(secret: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expires_in_seconds: 7 * 24 * 60 * 60, // 7 days
        }
    }

    /// Sign a new JWT token for a player profile
    pub fn sign(&self, profile: &PlayerProfile) -> Result<String, JwtError> {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            user_id: profile.user_id.clone(),
            name: profile.display_name.clone(),
            avatar: profile.avatar.clone(),
            exp: now + self.expires_in_seconds,
            iat: now,
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| JwtError::Sign(e.to_string()))
    }

    /// Verify and decode a JWT token
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                _ => JwtError::Verify(e.to_string()),
            })
    }
}

/// JWT error types
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to sign token: {0}")]
    Sign(String),
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Failed to verify token: {0}")]
    Verify(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_round_trip_profile() {
        let service = JwtService::new("secret".into());
        let profile = PlayerProfile::new("u1", "Marina", Avatar::Emoji("🐙".into()));

        let token = service.sign(&profile).unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.profile(), profile);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = JwtService::new("a".into())
            .sign(&PlayerProfile::new("u1", "Marina", Avatar::default()))
            .unwrap();
        assert!(JwtService::new("b".into()).verify(&token).is_err());
    }
}
