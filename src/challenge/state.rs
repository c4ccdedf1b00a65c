use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    error::ChallengeError,
    models::{ChallengeOutcome, ChallengePhase, DetectionEvent},
    settings::ChallengeConfig,
};

use super::{
    capture::{CaptureBuffer, CapturedFrame},
    cooldown::CooldownGate,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSnapshot {
    pub session_id: String,
    pub nickname: Option<String>,
    pub phase: ChallengePhase,
    pub lives: u32,
    pub initial_lives: u32,
    pub remaining_secs: u32,
    pub captured: usize,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotActive,
    CoolingDown,
}

/// Effects of one recorded laugh. The caller posts `event` and, when
/// `finished` is set, hands the session to the finalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub event: DetectionEvent,
    pub lives_left: u32,
    pub captured: bool,
    pub finished: Option<ChallengeOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    Ignored(IgnoreReason),
    Recorded(Detection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ignored,
    Counting { remaining_secs: u32 },
    Expired,
}

/// Everything one challenge session owns, mutated only through methods that
/// complete in a single call. Callers hold the lock for exactly one method,
/// so a detection and a countdown tick can never interleave halfway.
#[derive(Debug, Clone)]
pub struct ChallengeState {
    session_id: String,
    nickname: Option<String>,
    phase: ChallengePhase,
    initial_lives: u32,
    lives: u32,
    remaining_secs: u32,
    captures: CaptureBuffer,
    cooldown: CooldownGate,
    started_at: Option<DateTime<Utc>>,
    start_anchor: Option<Instant>,
    sample_in_flight: bool,
    video_cue_fired: bool,
}

impl ChallengeState {
    pub fn new(session_id: String, config: &ChallengeConfig) -> Self {
        Self {
            session_id,
            nickname: None,
            phase: ChallengePhase::Identity,
            initial_lives: config.initial_lives,
            lives: config.initial_lives,
            remaining_secs: config.countdown_secs,
            captures: CaptureBuffer::with_limit(config.capture_limit),
            cooldown: CooldownGate::new(config.cooldown()),
            started_at: None,
            start_anchor: None,
            sample_in_flight: false,
            video_cue_fired: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn phase(&self) -> ChallengePhase {
        self.phase
    }

    pub fn lives(&self) -> u32 {
        self.lives
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn captures(&self) -> &CaptureBuffer {
        &self.captures
    }

    pub fn snapshot(&self) -> ChallengeSnapshot {
        ChallengeSnapshot {
            session_id: self.session_id.clone(),
            nickname: self.nickname.clone(),
            phase: self.phase,
            lives: self.lives,
            initial_lives: self.initial_lives,
            remaining_secs: self.remaining_secs,
            captured: self.captures.len(),
            started_at: self.started_at,
        }
    }

    fn expect_phase(&self, expected: ChallengePhase) -> Result<(), ChallengeError> {
        if self.phase != expected {
            return Err(ChallengeError::WrongPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// Identity -> Armed. Blank names leave the state untouched.
    pub fn submit_nickname(&mut self, raw: &str) -> Result<(), ChallengeError> {
        self.expect_phase(ChallengePhase::Identity)?;
        let nickname = raw.trim();
        if nickname.is_empty() {
            return Err(ChallengeError::InvalidNickname);
        }
        self.nickname = Some(nickname.to_string());
        self.phase = ChallengePhase::Armed;
        Ok(())
    }

    /// Armed -> Active. Records both the wall-clock start and the monotonic
    /// anchor detection times are measured from.
    pub fn start(&mut self, at: DateTime<Utc>, now: Instant) -> Result<(), ChallengeError> {
        self.expect_phase(ChallengePhase::Armed)?;
        self.started_at = Some(at);
        self.start_anchor = Some(now);
        self.phase = ChallengePhase::Active;
        Ok(())
    }

    pub fn elapsed_secs(&self, now: Instant) -> u64 {
        self.start_anchor
            .map(|anchor| now.saturating_duration_since(anchor).as_secs())
            .unwrap_or(0)
    }

    /// The only way out of Active. Accepts the first request and rejects every
    /// later one, whichever branch it asks for.
    pub fn request_finish(&mut self, outcome: ChallengeOutcome) -> bool {
        if self.phase != ChallengePhase::Active {
            return false;
        }
        self.phase = outcome.finalizing_phase();
        self.sample_in_flight = false;
        true
    }

    /// Finalizing -> Done.
    pub fn complete(&mut self) -> bool {
        if !self.phase.is_finalizing() {
            return false;
        }
        self.phase = ChallengePhase::Done;
        true
    }

    /// Teardown from outside. A session that has not reached a finalizing
    /// phase goes straight to Done without an outcome; late detections and
    /// ticks are ignored from then on.
    pub fn abort(&mut self) -> bool {
        match self.phase {
            ChallengePhase::Identity | ChallengePhase::Armed | ChallengePhase::Active => {
                self.phase = ChallengePhase::Done;
                self.sample_in_flight = false;
                true
            }
            ChallengePhase::FinalizingSuccess
            | ChallengePhase::FinalizingFailure
            | ChallengePhase::Done => false,
        }
    }

    /// Capture, life decrement and the out-of-lives check in one step.
    pub fn register_laugh(&mut self, frame: CapturedFrame, now: Instant) -> DetectionOutcome {
        if self.phase != ChallengePhase::Active || self.lives == 0 {
            return DetectionOutcome::Ignored(IgnoreReason::NotActive);
        }
        if !self.cooldown.try_close(now) {
            return DetectionOutcome::Ignored(IgnoreReason::CoolingDown);
        }

        let captured = self.captures.append(frame);
        self.lives -= 1;

        let event = DetectionEvent::new(
            self.session_id.clone(),
            self.nickname.clone().unwrap_or_default(),
            self.initial_lives - self.lives,
            self.elapsed_secs(now),
        );

        let finished = if self.lives == 0 && self.request_finish(ChallengeOutcome::Failure) {
            Some(ChallengeOutcome::Failure)
        } else {
            None
        };

        DetectionOutcome::Recorded(Detection {
            event,
            lives_left: self.lives,
            captured,
            finished,
        })
    }

    /// One countdown second. Reaching zero asks for the success branch.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != ChallengePhase::Active {
            return TickOutcome::Ignored;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs > 0 {
            return TickOutcome::Counting {
                remaining_secs: self.remaining_secs,
            };
        }
        if self.request_finish(ChallengeOutcome::Success) {
            TickOutcome::Expired
        } else {
            TickOutcome::Ignored
        }
    }

    /// Single-flight guard for classifier round trips.
    pub fn try_begin_sample(&mut self) -> bool {
        if self.phase != ChallengePhase::Active || self.sample_in_flight {
            return false;
        }
        self.sample_in_flight = true;
        true
    }

    pub fn end_sample(&mut self) {
        self.sample_in_flight = false;
    }

    /// One-shot guard for the delayed video cue.
    pub fn claim_video_cue(&mut self) -> bool {
        if self.phase != ChallengePhase::Active || self.video_cue_fired {
            return false;
        }
        self.video_cue_fired = true;
        true
    }
}
