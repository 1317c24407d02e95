pub mod config;
pub mod error;
pub mod llm;
pub mod platform;
pub mod prompt;
pub mod reconcile;
pub mod retry;
pub mod router;
pub mod state;
pub mod vcs;
pub mod workflow;
