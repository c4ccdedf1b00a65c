pub mod detection;
pub mod recommendation;
pub mod session;

pub use detection::{DetectionEvent, LaughEventRecord};
pub use recommendation::{Recommendation, RecommendationResponse, VideoItem};
pub use session::{format_clock, ChallengeOutcome, ChallengePhase};
