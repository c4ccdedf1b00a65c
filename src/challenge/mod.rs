pub mod capture;
pub mod controller;
pub mod cooldown;
pub mod state;

pub use capture::{CaptureBuffer, CapturedFrame};
pub use controller::{
    handle_detection, ChallengeController, ChallengeEvent, FinishedSession, SessionShared,
};
pub use cooldown::CooldownGate;
pub use state::{
    ChallengeSnapshot, ChallengeState, Detection, DetectionOutcome, IgnoreReason, TickOutcome,
};
