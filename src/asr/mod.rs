pub mod audio_assembler;
pub mod audio_fetcher;
pub mod heuristics;
pub mod process;
pub mod repository;
pub mod transcribe;

pub use process::process_dialogue;
pub use transcribe::{AsrEngine, AsrPass, WhisperAsrEngine};
