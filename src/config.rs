use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub vcs: VcsConfig,
    #[serde(default)]
    pub test: TestConfig,
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_light_model")]
    pub light_model: String,
    #[serde(default = "default_heavy_model")]
    pub heavy_model: String,
    #[serde(default = "default_light_timeout_secs")]
    pub light_timeout_secs: u64,
    #[serde(default = "default_heavy_timeout_secs")]
    pub heavy_timeout_secs: u64,
    #[serde(default = "default_light_context_tokens")]
    pub light_context_tokens: u64,
    #[serde(default = "default_heavy_context_tokens")]
    pub heavy_context_tokens: u64,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("light_model", &self.light_model)
            .field("heavy_model", &self.heavy_model)
            .field("light_timeout_secs", &self.light_timeout_secs)
            .field("heavy_timeout_secs", &self.heavy_timeout_secs)
            .finish()
    }
}

/// Which issue tracker backs the workflow. Selected once at startup.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackerProvider {
    GitHub,
    Jira,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    pub provider: TrackerProvider,
    #[serde(default)]
    pub github: Option<GitHubConfig>,
    #[serde(default)]
    pub jira: Option<JiraConfig>,
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    /// "owner/repo"
    pub repo: String,
    pub token: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("repo", &self.repo)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub user: String,
    pub api_token: String,
}

impl std::fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraConfig")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            dir: default_audit_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VcsConfig {
    /// Working tree the stages operate on.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TestConfig {
    /// End-to-end scenario names, executed sequentially and fail-fast.
    #[serde(default)]
    pub scenarios: Vec<String>,
}

fn default_light_model() -> String {
    "claude-haiku-4-5".to_string()
}

fn default_heavy_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_light_timeout_secs() -> u64 {
    45
}

fn default_heavy_timeout_secs() -> u64 {
    600
}

fn default_light_context_tokens() -> u64 {
    100_000
}

fn default_heavy_context_tokens() -> u64 {
    200_000
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".foreman/state")
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from(".foreman/audit")
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_branch_prefix() -> String {
    "foreman".to_string()
}

fn default_base_branch() -> String {
    "main".to_string()
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("foreman").required(false));
        }

        // Environment variable overrides with FOREMAN_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("FOREMAN")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let config: AppConfig = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations whose provider section is missing.
    fn validate(&self) -> Result<()> {
        match self.tracker.provider {
            TrackerProvider::GitHub if self.tracker.github.is_none() => Err(AppError::Config(
                "tracker.provider is 'github' but [tracker.github] is missing".to_string(),
            )),
            TrackerProvider::Jira if self.tracker.jira.is_none() => Err(AppError::Config(
                "tracker.provider is 'jira' but [tracker.jira] is missing".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
