pub mod detect;
pub mod dialogue_builder;
pub mod framing;
pub mod process;
pub mod repository;

pub use detect::{VoiceActivityDetector, WebRtcVad};
pub use process::process_chunk;
