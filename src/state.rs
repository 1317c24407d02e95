//! Durable, resumable per-run workflow state.
//!
//! One JSON document per run id, the single source of truth consulted by
//! every stage invocation. Saves are read-merge-write: a stage that never
//! touched a field cannot erase it, because the on-disk document is
//! re-read and unioned with the in-memory view before writing. Writes are
//! atomic (temp file + rename).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Well-known field names shared between stages.
pub mod fields {
    pub const ISSUE_ID: &str = "issue_id";
    pub const BRANCH: &str = "branch";
    pub const PLAN_REF: &str = "plan_ref";
    pub const CLASSIFICATION: &str = "classification";
    pub const PR_URL: &str = "pr_url";
    pub const BUILD_RESULT: &str = "build_result";
    pub const TEST_RESULT: &str = "test_result";
    pub const REVIEW_RESULT: &str = "review_result";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowState {
    run_id: String,
    fields: BTreeMap<String, String>,
    pub last_stage: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            fields: BTreeMap::new(),
            last_stage: None,
            updated_at: Utc::now(),
        }
    }

    /// The run id is immutable once created; only a getter is exposed.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|s| s.as_str())
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// A field another stage must have written; missing means the stages
    /// were invoked out of order.
    pub fn require(&self, field: &str) -> Result<&str> {
        self.get(field).ok_or_else(|| {
            AppError::State(format!(
                "run {}: required field '{field}' is missing (was the earlier stage run?)",
                self.run_id
            ))
        })
    }
}

/// Owns the persisted record for each run id.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Load the state for a run id. Absence is a normal answer, not an
    /// error, so callers can decide create-vs-resume.
    pub fn load(&self, run_id: &str) -> Result<Option<WorkflowState>> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let state: WorkflowState = serde_json::from_str(&contents)
            .map_err(|e| AppError::State(format!("corrupt state file {}: {e}", path.display())))?;
        Ok(Some(state))
    }

    pub fn create(&self, run_id: &str) -> Result<WorkflowState> {
        if self.load(run_id)?.is_some() {
            return Err(AppError::State(format!(
                "state for run {run_id} already exists"
            )));
        }
        let state = WorkflowState::new(run_id);
        self.write(&state)?;
        Ok(state)
    }

    /// Load the state or create it on first stage invocation.
    pub fn load_or_create(&self, run_id: &str) -> Result<WorkflowState> {
        match self.load(run_id)? {
            Some(state) => Ok(state),
            None => self.create(run_id),
        }
    }

    /// Persist the state, merging with whatever is on disk.
    ///
    /// Fields present on disk but absent in memory survive; fields present
    /// in both take the in-memory value. Safe to call from stages that only
    /// read.
    pub fn save(&self, state: &mut WorkflowState, stage_name: &str) -> Result<()> {
        if let Some(on_disk) = self.load(state.run_id())? {
            if on_disk.run_id != state.run_id {
                return Err(AppError::State(format!(
                    "state file for run {} holds run id {}",
                    state.run_id, on_disk.run_id
                )));
            }
            for (key, value) in on_disk.fields {
                state.fields.entry(key).or_insert(value);
            }
        }
        state.last_stage = Some(stage_name.to_string());
        state.updated_at = Utc::now();
        self.write(state)?;
        tracing::debug!(run_id = %state.run_id, stage = stage_name, "State saved");
        Ok(())
    }

    fn write(&self, state: &WorkflowState) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(state.run_id());
        let tmp = path.with_extension("json.tmp");
        let mut body = serde_json::to_string_pretty(state)?;
        body.push('\n');
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
