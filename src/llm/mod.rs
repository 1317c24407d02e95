pub mod audit;
pub mod client;
pub mod tokens;

pub use client::{LlmClient, RawResponse, Session};
