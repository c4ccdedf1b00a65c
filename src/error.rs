//! Rejections a caller can get back from the challenge state machine.
//! Collaborator and I/O failures travel as `anyhow::Error` instead.

use crate::models::ChallengePhase;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("nickname must not be empty")]
    InvalidNickname,

    #[error("expected session in {expected} phase, but it is {actual}")]
    WrongPhase {
        expected: ChallengePhase,
        actual: ChallengePhase,
    },
}
