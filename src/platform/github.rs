use std::path::Path;

use async_trait::async_trait;
use octocrab::Octocrab;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::{CodeHost, IssueTracker};

fn parse_repo(repo_full_name: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = repo_full_name.splitn(2, '/').collect();
    if parts.len() != 2 {
        return Err(AppError::Config(format!(
            "Invalid repo name: {repo_full_name}"
        )));
    }
    Ok((parts[0], parts[1]))
}

fn build_client(token: &str) -> Result<Octocrab> {
    Octocrab::builder()
        .personal_token(token.to_string())
        .build()
        .map_err(|e| AppError::Tracker(format!("Failed to build octocrab client: {e}")))
}

/// GitHub Issues as the work-item tracker.
pub struct GitHubTracker {
    client: Octocrab,
    owner: String,
    repo: String,
}

impl GitHubTracker {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let (owner, repo) = parse_repo(&config.repo)?;
        Ok(Self {
            client: build_client(&config.token)?,
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    fn issue_number(id: &str) -> Result<u64> {
        id.trim_start_matches('#')
            .parse::<u64>()
            .map_err(|_| AppError::Tracker(format!("Invalid GitHub issue id: {id}")))
    }
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    async fn fetch_issue(&self, id: &str) -> Result<IssueRecord> {
        let number = Self::issue_number(id)?;
        let issue = self.client.issues(&self.owner, &self.repo).get(number).await?;

        Ok(IssueRecord {
            id: number.to_string(),
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
            state: format!("{:?}", issue.state).to_lowercase(),
        })
    }

    async fn post_comment(&self, id: &str, text: &str) -> Result<()> {
        let number = Self::issue_number(id)?;
        self.client
            .issues(&self.owner, &self.repo)
            .create_comment(number, text)
            .await?;
        Ok(())
    }

    /// GitHub has no first-class issue attachments; the file content is
    /// posted inline as a fenced comment instead.
    async fn post_attachment(&self, id: &str, file_path: &Path) -> Result<()> {
        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let contents = tokio::fs::read_to_string(file_path).await?;
        let body = format!("**{name}**\n\n```\n{contents}\n```");
        self.post_comment(id, &body).await
    }

    async fn check_connectivity(&self) -> Result<()> {
        self.client
            .current()
            .user()
            .await
            .map_err(|e| AppError::Connectivity(format!("GitHub API: {e}")))?;
        Ok(())
    }
}

/// GitHub pull requests as the code host.
pub struct GitHubHost {
    client: Octocrab,
    owner: String,
    repo: String,
    base_branch: String,
}

impl GitHubHost {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let (owner, repo) = parse_repo(&config.repo)?;
        Ok(Self {
            client: build_client(&config.token)?,
            owner: owner.to_string(),
            repo: repo.to_string(),
            base_branch: config.base_branch.clone(),
        })
    }
}

#[async_trait]
impl CodeHost for GitHubHost {
    async fn find_open_pull_request(&self, branch: &str) -> Result<Option<PrInfo>> {
        let page = self
            .client
            .pulls(&self.owner, &self.repo)
            .list()
            .state(octocrab::params::State::Open)
            .head(format!("{}:{branch}", self.owner))
            .per_page(1)
            .send()
            .await
            .map_err(|e| AppError::CodeHost(e.to_string()))?;

        Ok(page.items.into_iter().next().map(|pr| PrInfo {
            number: pr.number,
            url: pr
                .html_url
                .map(|u| u.to_string())
                .unwrap_or_default(),
            title: pr.title.unwrap_or_default(),
        }))
    }

    async fn create_pull_request(
        &self,
        branch: &str,
        title: &str,
        description: &str,
    ) -> Result<String> {
        let created = self
            .client
            .pulls(&self.owner, &self.repo)
            .create(title, branch, &self.base_branch)
            .body(description)
            .send()
            .await
            .map_err(|e| AppError::CodeHost(e.to_string()))?;

        Ok(created
            .html_url
            .map(|u| u.to_string())
            .unwrap_or_default())
    }

    async fn update_pull_request(
        &self,
        branch: &str,
        title: &str,
        description: &str,
    ) -> Result<String> {
        let existing = self.find_open_pull_request(branch).await?.ok_or_else(|| {
            AppError::CodeHost(format!("no open pull request for branch {branch}"))
        })?;

        let updated = self
            .client
            .pulls(&self.owner, &self.repo)
            .update(existing.number)
            .title(title)
            .body(description)
            .send()
            .await
            .map_err(|e| AppError::CodeHost(e.to_string()))?;

        Ok(updated
            .html_url
            .map(|u| u.to_string())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repo_splits_owner_and_name() {
        assert_eq!(parse_repo("octo/widgets").unwrap(), ("octo", "widgets"));
        assert!(parse_repo("not-a-repo").is_err());
    }

    #[test]
    fn issue_number_accepts_hash_prefix() {
        assert_eq!(GitHubTracker::issue_number("#42").unwrap(), 42);
        assert_eq!(GitHubTracker::issue_number("42").unwrap(), 42);
        assert!(GitHubTracker::issue_number("PROJ-42").is_err());
    }
}
