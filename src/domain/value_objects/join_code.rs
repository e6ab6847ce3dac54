use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of digits in a join code
pub const JOIN_CODE_LENGTH: usize = 4;
/// Number of distinct join codes (0000-9999)
pub const JOIN_CODE_SPACE: u16 = 10_000;

/// Four-digit numeric join code, also the party's primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JoinCode(String);

impl JoinCode {
    /// Validate user input. Surrounding whitespace is tolerated.
    pub fn parse(input: &str) -> Result<Self, InvalidJoinCode> {
        let code = input.trim();
        if code.len() != JOIN_CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidJoinCode(input.to_string()));
        }
        Ok(Self(code.to_string()))
    }

    /// Draw a uniformly random code
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(format!("{:04}", rng.gen_range(0..JOIN_CODE_SPACE)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JoinCode {
    type Error = InvalidJoinCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JoinCode> for String {
    fn from(code: JoinCode) -> Self {
        code.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Please enter a 4-digit code")]
pub struct InvalidJoinCode(pub String);
