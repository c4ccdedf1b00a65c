use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChallengePhase {
    Identity,
    Armed,
    Active,
    FinalizingSuccess,
    FinalizingFailure,
    Done,
}

impl Default for ChallengePhase {
    fn default() -> Self {
        ChallengePhase::Identity
    }
}

impl ChallengePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengePhase::Identity => "Identity",
            ChallengePhase::Armed => "Armed",
            ChallengePhase::Active => "Active",
            ChallengePhase::FinalizingSuccess => "FinalizingSuccess",
            ChallengePhase::FinalizingFailure => "FinalizingFailure",
            ChallengePhase::Done => "Done",
        }
    }

    pub fn is_finalizing(&self) -> bool {
        matches!(
            self,
            ChallengePhase::FinalizingSuccess | ChallengePhase::FinalizingFailure
        )
    }
}

impl fmt::Display for ChallengePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which terminal branch a session took.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChallengeOutcome {
    /// The countdown ran out with lives left.
    Success,
    /// Every life was spent before the countdown ran out.
    Failure,
}

impl ChallengeOutcome {
    pub fn finalizing_phase(&self) -> ChallengePhase {
        match self {
            ChallengeOutcome::Success => ChallengePhase::FinalizingSuccess,
            ChallengeOutcome::Failure => ChallengePhase::FinalizingFailure,
        }
    }
}

/// Formats seconds as `mm:ss`, switching to `h:mm:ss` past one hour.
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock_minutes() {
        assert_eq!(format_clock(180), "03:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(0), "00:00");
    }

    #[test]
    fn test_format_clock_hours() {
        assert_eq!(format_clock(3725), "1:02:05");
    }

    #[test]
    fn test_outcome_maps_to_finalizing_phase() {
        assert_eq!(
            ChallengeOutcome::Success.finalizing_phase(),
            ChallengePhase::FinalizingSuccess
        );
        assert_eq!(
            ChallengeOutcome::Failure.finalizing_phase(),
            ChallengePhase::FinalizingFailure
        );
        assert!(ChallengePhase::FinalizingFailure.is_finalizing());
        assert!(!ChallengePhase::Done.is_finalizing());
    }
}
