pub mod controller;
pub mod frame;
pub mod loop_worker;

pub use controller::SamplingController;
pub use frame::{encode_frame, EncodedFrame};
