//! Append-only audit artifacts for LLM round trips.
//!
//! One JSON file per round trip under `<audit_dir>/<run_id>/<agent_role>/`,
//! written for successes and failures alike, before any error propagates to
//! the caller. Filenames carry a per-log monotonic sequence number in
//! addition to the timestamp, so rapid successive calls within the same
//! second cannot collide.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;

use crate::error::Result;

/// What a single audit record describes.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    Request,
    Response,
    Error,
    Preflight,
}

impl ExchangeKind {
    fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Request => "request",
            ExchangeKind::Response => "response",
            ExchangeKind::Error => "error",
            ExchangeKind::Preflight => "preflight",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExchangeRecord<'a> {
    pub kind: ExchangeKind,
    pub model: &'a str,
    pub category: &'a str,
    pub attempt: u32,
    pub prompt_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_context: Option<&'a str>,
    pub recorded_at: String,
}

/// Audit log scoped to one run id and one agent role.
pub struct AuditLog {
    dir: PathBuf,
    seq: AtomicU64,
}

impl AuditLog {
    pub fn new(base_dir: &std::path::Path, run_id: &str, agent_role: &str) -> Self {
        Self {
            dir: base_dir.join(run_id).join(agent_role),
            seq: AtomicU64::new(0),
        }
    }

    /// Append one record as its own file. Returns the path written.
    pub fn append(&self, record: &ExchangeRecord<'_>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let path = self
            .dir
            .join(format!("{stamp}-{seq:04}-{}.json", record.kind.as_str()));
        let mut body = serde_json::to_string_pretty(record)?;
        body.push('\n');
        std::fs::write(&path, body)?;
        Ok(path)
    }

    /// Best-effort append: audit failures must never mask the underlying
    /// LLM error, so they are downgraded to a warning.
    pub fn append_best_effort(&self, record: &ExchangeRecord<'_>) {
        if let Err(e) = self.append(record) {
            tracing::warn!(error = %e, "Failed to write audit record");
        }
    }
}

impl<'a> ExchangeRecord<'a> {
    pub fn new(kind: ExchangeKind, model: &'a str, category: &'a str) -> Self {
        Self {
            kind,
            model,
            category,
            attempt: 1,
            prompt_tokens: 0,
            response_body: None,
            error_context: None,
            recorded_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn prompt_tokens(mut self, tokens: u64) -> Self {
        self.prompt_tokens = tokens;
        self
    }

    pub fn response_body(mut self, body: &'a str) -> Self {
        self.response_body = Some(body);
        self
    }

    pub fn error_context(mut self, context: &'a str) -> Self {
        self.error_context = Some(context);
        self
    }
}
