pub mod github;
pub mod jira;
pub mod types;

use std::path::Path;

use async_trait::async_trait;

use crate::config::{TrackerConfig, TrackerProvider};
use crate::error::{AppError, Result};
use types::*;

/// One-way notification and work-item channel to the human-facing tracker.
/// The orchestration core never parses tracker comments back.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch a work item.
    async fn fetch_issue(&self, id: &str) -> Result<IssueRecord>;

    /// Post a progress comment on an issue.
    async fn post_comment(&self, id: &str, text: &str) -> Result<()>;

    /// Attach a file (e.g. a plan artifact) to an issue.
    async fn post_attachment(&self, id: &str, file_path: &Path) -> Result<()>;

    /// Verify the tracker is reachable with the configured credentials.
    async fn check_connectivity(&self) -> Result<()>;
}

/// Pull-request operations on the code host.
#[async_trait]
pub trait CodeHost: Send + Sync {
    async fn find_open_pull_request(&self, branch: &str) -> Result<Option<PrInfo>>;

    async fn create_pull_request(
        &self,
        branch: &str,
        title: &str,
        description: &str,
    ) -> Result<String>;

    async fn update_pull_request(
        &self,
        branch: &str,
        title: &str,
        description: &str,
    ) -> Result<String>;
}

/// Select the tracker implementation once at startup.
pub fn tracker_from_config(config: &TrackerConfig) -> Result<Box<dyn IssueTracker>> {
    match config.provider {
        TrackerProvider::GitHub => {
            let gh = config.github.as_ref().ok_or_else(|| {
                AppError::Config("tracker.provider is 'github' but [tracker.github] is missing".to_string())
            })?;
            Ok(Box::new(github::GitHubTracker::new(gh)?))
        }
        TrackerProvider::Jira => {
            let jira = config.jira.as_ref().ok_or_else(|| {
                AppError::Config("tracker.provider is 'jira' but [tracker.jira] is missing".to_string())
            })?;
            Ok(Box::new(jira::JiraTracker::new(jira)))
        }
    }
}

/// The code host is always GitHub; Jira installations pair it with a GitHub
/// repository for the code side.
pub fn code_host_from_config(config: &TrackerConfig) -> Result<Box<dyn CodeHost>> {
    let gh = config.github.as_ref().ok_or_else(|| {
        AppError::Config("[tracker.github] is required for pull-request operations".to_string())
    })?;
    Ok(Box::new(github::GitHubHost::new(gh)?))
}
