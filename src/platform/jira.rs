use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::JiraConfig;
use crate::error::{AppError, Result};
use crate::platform::types::IssueRecord;
use crate::platform::IssueTracker;

/// Jira Cloud REST v2 tracker.
pub struct JiraTracker {
    client: Client,
    base_url: String,
    user: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    key: String,
    fields: JiraFields,
}

#[derive(Debug, Deserialize)]
struct JiraFields {
    summary: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    status: JiraStatus,
}

#[derive(Debug, Deserialize)]
struct JiraStatus {
    name: String,
}

impl JiraTracker {
    pub fn new(config: &JiraConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            api_token: config.api_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/2/{path}", self.base_url)
    }

    fn classify_status(status: reqwest::StatusCode, context: &str) -> AppError {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            AppError::Auth(format!("Jira returned {status} for {context}"))
        } else {
            AppError::Tracker(format!("Jira returned {status} for {context}"))
        }
    }
}

#[async_trait]
impl IssueTracker for JiraTracker {
    async fn fetch_issue(&self, id: &str) -> Result<IssueRecord> {
        let response = self
            .client
            .get(self.url(&format!("issue/{id}")))
            .basic_auth(&self.user, Some(&self.api_token))
            .send()
            .await
            .map_err(|e| AppError::Connectivity(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(response.status(), &format!("issue {id}")));
        }

        let issue: JiraIssue = response.json().await?;
        Ok(IssueRecord {
            id: issue.key,
            title: issue.fields.summary,
            body: issue.fields.description.unwrap_or_default(),
            labels: issue.fields.labels,
            state: issue.fields.status.name.to_lowercase(),
        })
    }

    async fn post_comment(&self, id: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("issue/{id}/comment")))
            .basic_auth(&self.user, Some(&self.api_token))
            .json(&json!({ "body": text }))
            .send()
            .await
            .map_err(|e| AppError::Connectivity(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(
                response.status(),
                &format!("comment on {id}"),
            ));
        }
        Ok(())
    }

    async fn post_attachment(&self, id: &str, file_path: &Path) -> Result<()> {
        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let bytes = tokio::fs::read(file_path).await?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(&format!("issue/{id}/attachments")))
            .basic_auth(&self.user, Some(&self.api_token))
            .header("X-Atlassian-Token", "no-check")
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Connectivity(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(
                response.status(),
                &format!("attachment on {id}"),
            ));
        }
        Ok(())
    }

    async fn check_connectivity(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("myself"))
            .basic_auth(&self.user, Some(&self.api_token))
            .send()
            .await
            .map_err(|e| AppError::Connectivity(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(response.status(), "connectivity check"));
        }
        Ok(())
    }
}
