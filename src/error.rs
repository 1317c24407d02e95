use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM backend unreachable: {0}. Check that the backend is running and the configured base URL is correct.")]
    Connectivity(String),

    #[error("LLM backend rejected credentials: {0}. Re-authenticate and try again.")]
    Auth(String),

    #[error("LLM request timed out after {attempts} attempts ({elapsed_secs}s total)")]
    Timeout { attempts: u32, elapsed_secs: u64 },

    #[error("Prompt exceeds model context window: {count} tokens against a limit of {limit} ({overage_percent}% over)")]
    TokenLimit {
        count: u64,
        limit: u64,
        overage_percent: u64,
    },

    #[error("LLM backend error: {0}")]
    LlmApi(String),

    #[error("Issue tracker error: {0}")]
    Tracker(String),

    #[error("Code host error: {0}")]
    CodeHost(String),

    #[error("Git operation failed: {0}")]
    Git(String),

    #[error("Workflow state error: {0}")]
    State(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        AppError::Tracker(e.to_string())
    }
}

impl From<git2::Error> for AppError {
    fn from(e: git2::Error) -> Self {
        AppError::Git(e.message().to_string())
    }
}

impl AppError {
    /// Build the token pre-flight error with the overage percentage computed.
    pub fn token_limit(count: u64, limit: u64) -> Self {
        let overage_percent = if limit == 0 {
            100
        } else {
            count.saturating_sub(limit) * 100 / limit
        };
        AppError::TokenLimit {
            count,
            limit,
            overage_percent,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_limit_computes_overage_percent() {
        match AppError::token_limit(150_000, 100_000) {
            AppError::TokenLimit {
                count,
                limit,
                overage_percent,
            } => {
                assert_eq!(count, 150_000);
                assert_eq!(limit, 100_000);
                assert_eq!(overage_percent, 50);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn token_limit_handles_zero_limit() {
        match AppError::token_limit(10, 0) {
            AppError::TokenLimit {
                overage_percent, ..
            } => assert_eq!(overage_percent, 100),
            other => panic!("unexpected error: {other}"),
        }
    }
}
