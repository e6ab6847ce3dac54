use crate::application::party::{
    AllocationError, CreatePartyError, FinishPartyError, GetPartyError, JoinPartyError, LeavePartyError,
    RecordScoreError, StartPartyError,
};
use crate::domain::repositories::StoreError;
use crate::domain::value_objects::InvalidJoinCode;

/// Observable failure of a session command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    InvalidCode(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Party not found")]
    PartyNotFound,
    #[error("Party has already finished")]
    PartyAlreadyFinished,
    #[error("Only the host can start the party")]
    NotHost,
    #[error("Player not in party")]
    PlayerNotInParty,
    #[error("{0}")]
    InvalidTransition(String),
    #[error("Not in a party")]
    NoActiveParty,
    #[error("Party was closed")]
    PartyClosed,
    #[error("Failed to generate unique code")]
    CodeAllocation,
    #[error("Party data is corrupt: {0}")]
    Corrupt(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl SessionError {
    /// Whether repeating the same command may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Unavailable(_))
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            e if e.is_transient() => SessionError::Unavailable(e.to_string()),
            StoreError::NotFound(_) => SessionError::PartyNotFound,
            StoreError::AlreadyExists(_) => SessionError::CodeAllocation,
            StoreError::Codec(msg) => SessionError::Corrupt(msg),
            e => SessionError::Unavailable(e.to_string()),
        }
    }
}

impl From<InvalidJoinCode> for SessionError {
    fn from(e: InvalidJoinCode) -> Self {
        SessionError::InvalidCode(e.to_string())
    }
}

impl From<AllocationError> for SessionError {
    fn from(e: AllocationError) -> Self {
        match e {
            AllocationError::Exhausted { .. } => SessionError::CodeAllocation,
            AllocationError::Store(e) => e.into(),
        }
    }
}

impl From<CreatePartyError> for SessionError {
    fn from(e: CreatePartyError) -> Self {
        match e {
            CreatePartyError::Validation(msg) => SessionError::Validation(msg),
            CreatePartyError::CodeAllocation(e) => e.into(),
            CreatePartyError::CodeCollision => SessionError::CodeAllocation,
            CreatePartyError::Store(e) => e.into(),
        }
    }
}

impl From<JoinPartyError> for SessionError {
    fn from(e: JoinPartyError) -> Self {
        match e {
            JoinPartyError::InvalidCode(e) => e.into(),
            JoinPartyError::PartyNotFound => SessionError::PartyNotFound,
            JoinPartyError::PartyAlreadyFinished => SessionError::PartyAlreadyFinished,
            JoinPartyError::Store(e) => e.into(),
        }
    }
}

impl From<LeavePartyError> for SessionError {
    fn from(e: LeavePartyError) -> Self {
        match e {
            LeavePartyError::PartyNotFound => SessionError::PartyNotFound,
            LeavePartyError::NotInParty => SessionError::PlayerNotInParty,
            LeavePartyError::Store(e) => e.into(),
        }
    }
}

impl From<StartPartyError> for SessionError {
    fn from(e: StartPartyError) -> Self {
        match e {
            StartPartyError::PartyNotFound => SessionError::PartyNotFound,
            StartPartyError::NotHost => SessionError::NotHost,
            StartPartyError::InvalidTransition(e) => SessionError::InvalidTransition(e.to_string()),
            StartPartyError::Store(e) => e.into(),
        }
    }
}

impl From<RecordScoreError> for SessionError {
    fn from(e: RecordScoreError) -> Self {
        match e {
            RecordScoreError::Validation(msg) => SessionError::Validation(msg),
            RecordScoreError::PartyNotFound => SessionError::PartyNotFound,
            RecordScoreError::PlayerNotInParty => SessionError::PlayerNotInParty,
            RecordScoreError::PartyAlreadyFinished => SessionError::PartyAlreadyFinished,
            RecordScoreError::Store(e) => e.into(),
        }
    }
}

impl From<FinishPartyError> for SessionError {
    fn from(e: FinishPartyError) -> Self {
        match e {
            FinishPartyError::PartyNotFound => SessionError::PartyNotFound,
            FinishPartyError::Store(e) => e.into(),
        }
    }
}

impl From<GetPartyError> for SessionError {
    fn from(e: GetPartyError) -> Self {
        match e {
            GetPartyError::InvalidCode(e) => e.into(),
            GetPartyError::PartyNotFound => SessionError::PartyNotFound,
            GetPartyError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_outages_are_retryable() {
        let contention: SessionError = StoreError::Contention {
            code: "1234".into(),
            attempts: 5,
        }
        .into();
        assert!(contention.is_retryable());
        assert!(SessionError::from(StoreError::Database("locked".into())).is_retryable());

        assert!(!SessionError::PartyNotFound.is_retryable());
        assert!(!SessionError::from(StoreError::Codec("bad".into())).is_retryable());
        assert!(!SessionError::from(CreatePartyError::CodeCollision).is_retryable());
    }

    #[test]
    fn test_retryable_follows_transient_store_errors() {
        let errors = [
            StoreError::NotFound("1234".into()),
            StoreError::AlreadyExists("1234".into()),
            StoreError::Contention {
                code: "1234".into(),
                attempts: 5,
            },
            StoreError::Codec("bad".into()),
            StoreError::Database("disk I/O error".into()),
        ];
        for error in errors {
            assert_eq!(
                error.is_transient(),
                SessionError::from(error.clone()).is_retryable(),
                "{error}"
            );
        }
    }

    #[test]
    fn test_invalid_code_message() {
        let err: SessionError = InvalidJoinCode("12".into()).into();
        assert_eq!(err.to_string(), "Please enter a 4-digit code");
    }
}
