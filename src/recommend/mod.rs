pub mod clock;
pub mod poller;

pub use clock::{Clock, TokioClock};
pub use poller::{
    Observation, PollMachine, PollStep, RecommendationPoller, RecommendationStatus,
    UnavailableReason,
};
