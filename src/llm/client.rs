use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::llm::audit::{AuditLog, ExchangeKind, ExchangeRecord};
use crate::llm::tokens;
use crate::router::{ModelBinding, TaskCategory};

/// Transient-timeout retry ceiling inside `send`.
const SEND_ATTEMPTS: u32 = 3;

/// A validated logical conversation against the LLM backend.
pub struct Session {
    id: String,
    open: bool,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RawResponse {
    pub text: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Client for one run id / agent role pair.
///
/// Every round trip (and every failure) is written to the audit log before
/// any error reaches the caller.
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    audit: AuditLog,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: &str, audit: AuditLog) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            audit,
        }
    }

    /// Validate reachability and credentials, returning a session.
    ///
    /// Connection failures and credential rejections are distinct errors:
    /// the caller aborts on the former and tells the user to re-authenticate
    /// on the latter.
    pub async fn open(&self) -> Result<Session> {
        let url = format!("{}/v1/session", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    AppError::Connectivity(e.to_string())
                } else {
                    AppError::from(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AppError::Auth(format!("backend returned {status}")));
        }
        if !status.is_success() {
            return Err(AppError::Connectivity(format!(
                "session validation returned {status}"
            )));
        }

        #[derive(Deserialize)]
        struct SessionResponse {
            id: String,
        }
        let body: SessionResponse = response.json().await?;

        tracing::debug!(session = %body.id, "LLM session opened");
        Ok(Session {
            id: body.id,
            open: true,
        })
    }

    /// Exchange one prompt for a response using the binding's timeout.
    ///
    /// Pre-flight: the prompt is measured against the model's context window
    /// and rejected before any network call if it would overflow. Transient
    /// timeouts are retried with exponential backoff up to the ceiling.
    pub async fn send(
        &self,
        session: &Session,
        prompt: &str,
        binding: &ModelBinding,
        category: TaskCategory,
    ) -> Result<RawResponse> {
        if !session.open {
            return Err(AppError::Internal("send on a closed session".to_string()));
        }

        let prompt_tokens = match tokens::preflight(prompt, binding.max_context_tokens) {
            Ok(count) => count,
            Err(e) => {
                let context = e.to_string();
                self.audit.append_best_effort(
                    &ExchangeRecord::new(ExchangeKind::Preflight, &binding.model, category.as_str())
                        .prompt_tokens(tokens::estimate(prompt))
                        .error_context(&context),
                );
                return Err(e);
            }
        };

        let url = format!("{}/v1/completions", self.base_url);
        let request = CompletionRequest {
            model: &binding.model,
            prompt,
        };

        let started = Instant::now();
        for attempt in 1..=SEND_ATTEMPTS {
            self.audit.append_best_effort(
                &ExchangeRecord::new(ExchangeKind::Request, &binding.model, category.as_str())
                    .attempt(attempt)
                    .prompt_tokens(prompt_tokens),
            );

            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .header("x-session-id", &session.id)
                .timeout(binding.timeout)
                .json(&request)
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    let context = format!("attempt {attempt}/{SEND_ATTEMPTS} timed out: {e}");
                    tracing::warn!(attempt, model = %binding.model, "LLM request timed out");
                    self.audit.append_best_effort(
                        &ExchangeRecord::new(
                            ExchangeKind::Error,
                            &binding.model,
                            category.as_str(),
                        )
                        .attempt(attempt)
                        .prompt_tokens(prompt_tokens)
                        .error_context(&context),
                    );
                    if attempt == SEND_ATTEMPTS {
                        return Err(AppError::Timeout {
                            attempts: SEND_ATTEMPTS,
                            elapsed_secs: started.elapsed().as_secs(),
                        });
                    }
                    tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
                    continue;
                }
                Err(e) => {
                    let kind = if e.is_connect() {
                        AppError::Connectivity(e.to_string())
                    } else {
                        AppError::from(e)
                    };
                    let context = kind.to_string();
                    self.audit.append_best_effort(
                        &ExchangeRecord::new(
                            ExchangeKind::Error,
                            &binding.model,
                            category.as_str(),
                        )
                        .attempt(attempt)
                        .prompt_tokens(prompt_tokens)
                        .error_context(&context),
                    );
                    return Err(kind);
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                let err = AppError::Auth(format!("backend returned {status}"));
                let context = err.to_string();
                self.audit.append_best_effort(
                    &ExchangeRecord::new(ExchangeKind::Error, &binding.model, category.as_str())
                        .attempt(attempt)
                        .error_context(&context),
                );
                return Err(err);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let err = AppError::LlmApi(format!("API returned {status}: {body}"));
                let context = err.to_string();
                self.audit.append_best_effort(
                    &ExchangeRecord::new(ExchangeKind::Error, &binding.model, category.as_str())
                        .attempt(attempt)
                        .error_context(&context),
                );
                return Err(err);
            }

            let body: RawResponse = match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    let err = AppError::from(e);
                    let context = format!("malformed response body: {err}");
                    self.audit.append_best_effort(
                        &ExchangeRecord::new(
                            ExchangeKind::Error,
                            &binding.model,
                            category.as_str(),
                        )
                        .attempt(attempt)
                        .prompt_tokens(prompt_tokens)
                        .error_context(&context),
                    );
                    return Err(err);
                }
            };
            self.audit.append_best_effort(
                &ExchangeRecord::new(ExchangeKind::Response, &binding.model, category.as_str())
                    .attempt(attempt)
                    .prompt_tokens(prompt_tokens)
                    .response_body(&body.text),
            );
            tracing::debug!(
                model = %binding.model,
                category = %category,
                input_tokens = body.input_tokens,
                output_tokens = body.output_tokens,
                "LLM response"
            );
            return Ok(body);
        }

        unreachable!("send loop exits via return")
    }

    /// Release the session. Safe to call twice.
    pub fn close(&self, session: &mut Session) {
        if session.open {
            tracing::debug!(session = %session.id, "LLM session closed");
            session.open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(limit: u64) -> ModelBinding {
        ModelBinding {
            model: "test-model".to_string(),
            heavy: false,
            timeout: Duration::from_secs(1),
            max_context_tokens: limit,
        }
    }

    fn client(tmp: &std::path::Path) -> LlmClient {
        // Port 9 (discard) is never listening; any network call would fail
        // with a connect error, not a token-limit error.
        let audit = AuditLog::new(tmp, "run-1", "tester");
        LlmClient::new("http://127.0.0.1:9", "key", audit)
    }

    #[tokio::test]
    async fn oversized_prompt_fails_before_any_network_call() {
        let tmp = tempfile::tempdir().unwrap();
        let client = client(tmp.path());
        let session = Session {
            id: "s".to_string(),
            open: true,
        };

        let prompt = "x".repeat(4_000); // ~1000 tokens
        let err = client
            .send(&session, &prompt, &binding(100), TaskCategory::Classification)
            .await
            .unwrap_err();

        match err {
            AppError::TokenLimit { count, limit, .. } => {
                assert_eq!(count, 1_000);
                assert_eq!(limit, 100);
            }
            other => panic!("expected TokenLimit, got {other}"),
        }

        // The rejection itself is still audited.
        let dir = tmp.path().join("run-1").join("tester");
        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        assert!(name.to_string_lossy().contains("preflight"));
    }

    #[tokio::test]
    async fn malformed_success_body_is_audited_before_the_error_propagates() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let tmp = tempfile::tempdir().unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Minimal backend that answers 200 with a body that is not JSON.
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 8192];
                    let _ = socket.read(&mut buf).await;
                    let body = "not json";
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        let audit = AuditLog::new(tmp.path(), "run-1", "tester");
        let client = LlmClient::new(&format!("http://{addr}"), "key", audit);
        let session = Session {
            id: "s".to_string(),
            open: true,
        };

        let err = client
            .send(&session, "hi", &binding(1_000), TaskCategory::Classification)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Http(_)));

        let dir = tmp.path().join("run-1").join("tester");
        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.contains("request")));
        assert!(names.iter().any(|n| n.contains("error")));
    }

    #[tokio::test]
    async fn send_on_closed_session_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let client = client(tmp.path());
        let mut session = Session {
            id: "s".to_string(),
            open: true,
        };
        client.close(&mut session);
        client.close(&mut session); // idempotent

        let err = client
            .send(&session, "hi", &binding(1_000), TaskCategory::Classification)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
