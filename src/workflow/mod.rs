pub mod build;
pub mod plan;
pub mod progress;
pub mod review;
pub mod test;
pub mod types;

use crate::config::AppConfig;
use crate::llm::audit::AuditLog;
use crate::llm::LlmClient;
use crate::platform::{CodeHost, IssueTracker};
use crate::router::ModelRouter;
use crate::state::StateStore;
use crate::vcs::Vcs;

/// Everything a stage invocation needs, built once in `main` from the
/// loaded configuration and passed by reference. No stage caches any of it
/// across invocations; the next stage may run in a fresh process.
pub struct StageContext {
    pub config: AppConfig,
    pub run_id: String,
    pub store: StateStore,
    pub router: ModelRouter,
    pub tracker: Box<dyn IssueTracker>,
    /// Present when a GitHub repository is configured; the build stage
    /// requires it for pull-request operations.
    pub host: Option<Box<dyn CodeHost>>,
    pub vcs: Vcs,
}

impl StageContext {
    pub fn new(config: AppConfig, run_id: &str) -> crate::error::Result<Self> {
        let store = StateStore::new(&config.state.dir);
        let router = ModelRouter::new(&config.llm);
        let tracker = crate::platform::tracker_from_config(&config.tracker)?;
        let host = if config.tracker.github.is_some() {
            Some(crate::platform::code_host_from_config(&config.tracker)?)
        } else {
            None
        };
        let vcs = Vcs::new(&config.vcs.workdir);

        Ok(Self {
            config,
            run_id: run_id.to_string(),
            store,
            router,
            tracker,
            host,
            vcs,
        })
    }

    /// Fail fast when the tracker is unreachable or the credentials are
    /// rejected, before any stage work starts.
    pub async fn verify_tracker(&self) -> crate::error::Result<()> {
        self.tracker.check_connectivity().await?;
        tracing::debug!("Tracker connectivity verified");
        Ok(())
    }

    /// Build an LLM client whose audit artifacts are scoped to this run and
    /// the given agent role.
    pub fn llm(&self, agent_role: &str) -> LlmClient {
        let audit = AuditLog::new(&self.config.audit.dir, &self.run_id, agent_role);
        LlmClient::new(&self.config.llm.base_url, &self.config.llm.api_key, audit)
    }
}

/// Clip long LLM output for comments and commit bodies.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    format!("{clipped}…")
}
