//! Task-category to model routing.
//!
//! Every LLM request names a task category; the router maps it to a concrete
//! model, a timeout budget, and a context-window limit. The category set is
//! closed: anything outside it is a configuration error, never a silent
//! default, because routing a heavy task to a lightweight model wastes the
//! retry budget downstream.

use std::str::FromStr;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{AppError, Result};

/// The closed set of task categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    Classification,
    Extraction,
    Planning,
    BranchNaming,
    CommitMessage,
    PrDescription,
    Implementation,
    TestRepair,
    Review,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 9] = [
        TaskCategory::Classification,
        TaskCategory::Extraction,
        TaskCategory::Planning,
        TaskCategory::BranchNaming,
        TaskCategory::CommitMessage,
        TaskCategory::PrDescription,
        TaskCategory::Implementation,
        TaskCategory::TestRepair,
        TaskCategory::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Classification => "classification",
            TaskCategory::Extraction => "extraction",
            TaskCategory::Planning => "planning",
            TaskCategory::BranchNaming => "branch-naming",
            TaskCategory::CommitMessage => "commit-message",
            TaskCategory::PrDescription => "pr-description",
            TaskCategory::Implementation => "implementation",
            TaskCategory::TestRepair => "test-repair",
            TaskCategory::Review => "review",
        }
    }

    /// Heavy categories get the large model and the long timeout.
    pub fn is_heavy(&self) -> bool {
        matches!(
            self,
            TaskCategory::Planning
                | TaskCategory::Implementation
                | TaskCategory::TestRepair
                | TaskCategory::Review
        )
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        TaskCategory::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let valid = TaskCategory::ALL
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                AppError::Config(format!(
                    "Unknown task category '{s}' (valid categories: {valid})"
                ))
            })
    }
}

/// Concrete routing decision for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBinding {
    pub model: String,
    pub heavy: bool,
    pub timeout: Duration,
    pub max_context_tokens: u64,
}

/// Pure lookup table from category to binding, built once from config.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    light: ModelBinding,
    heavy: ModelBinding,
}

impl ModelRouter {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            light: ModelBinding {
                model: config.light_model.clone(),
                heavy: false,
                timeout: Duration::from_secs(config.light_timeout_secs),
                max_context_tokens: config.light_context_tokens,
            },
            heavy: ModelBinding {
                model: config.heavy_model.clone(),
                heavy: true,
                timeout: Duration::from_secs(config.heavy_timeout_secs),
                max_context_tokens: config.heavy_context_tokens,
            },
        }
    }

    /// Deterministic, total over the closed category set. No side effects.
    pub fn resolve(&self, category: TaskCategory) -> &ModelBinding {
        if category.is_heavy() {
            &self.heavy
        } else {
            &self.light
        }
    }

    pub fn is_heavy(&self, category: TaskCategory) -> bool {
        category.is_heavy()
    }
}
