pub mod auth;
pub mod handlers;
pub mod repository;

pub use handlers::{AppState, SharedState};
