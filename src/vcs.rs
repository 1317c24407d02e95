//! Version-control collaborator.
//!
//! Branch and diff operations go through libgit2 on a blocking thread.
//! Commits go through the `git` CLI instead, so user-installed hooks run and
//! their output can be inspected for hook failures.

use std::path::{Path, PathBuf};

use git2::{Repository, Status};

use crate::error::{AppError, Result};

/// Working-tree summary used as ground truth by the output reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub files_modified: u64,
    pub files_added: u64,
    pub files_deleted: u64,
    pub total_additions: u64,
    pub total_deletions: u64,
}

impl DiffSummary {
    pub fn total_files(&self) -> u64 {
        self.files_modified + self.files_added + self.files_deleted
    }
}

/// Result of stage-and-commit, including hook diagnostics.
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub success: bool,
    pub hook_failure_detected: bool,
    pub raw_output: String,
}

/// Reject empty names and names starting with `-` so a branch name can
/// never be parsed as a git argument.
fn validate_branch_name(name: &str) -> Result<()> {
    if name.starts_with('-') || name.is_empty() {
        return Err(AppError::Git(format!("Invalid branch name: {name:?}")));
    }
    Ok(())
}

pub struct Vcs {
    workdir: PathBuf,
}

impl Vcs {
    pub fn new(workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    pub async fn current_branch(&self) -> Result<String> {
        let dir = self.workdir.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&dir)?;
            let head = repo.head()?;
            head.shorthand()
                .map(|s| s.to_string())
                .ok_or_else(|| AppError::Git("detached HEAD".to_string()))
        })
        .await
        .map_err(|e| AppError::Git(format!("Current-branch task panicked: {e}")))?
    }

    /// Checkout the branch, creating it at HEAD if it does not exist.
    pub async fn create_or_checkout_branch(&self, branch_name: &str) -> Result<()> {
        validate_branch_name(branch_name)?;

        let dir = self.workdir.clone();
        let branch_name = branch_name.to_string();

        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&dir)?;
            if repo
                .find_branch(&branch_name, git2::BranchType::Local)
                .is_err()
            {
                let head = repo.head()?;
                let commit = head.peel_to_commit()?;
                repo.branch(&branch_name, &commit, false)?;
            }
            let obj = repo.revparse_single(&format!("refs/heads/{branch_name}"))?;
            repo.checkout_tree(&obj, None)?;
            repo.set_head(&format!("refs/heads/{branch_name}"))?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Git(format!("Checkout task panicked: {e}")))?
    }

    /// Stage everything and commit through the `git` CLI.
    ///
    /// A failed commit is not an error at this level: the caller gets the
    /// raw output plus a flag saying whether a hook rejected the commit.
    pub async fn stage_and_commit(&self, message: &str) -> Result<CommitResult> {
        {
            let dir = self.workdir.clone();
            tokio::task::spawn_blocking(move || -> Result<()> {
                let repo = Repository::open(&dir)?;
                let mut index = repo.index()?;
                index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
                index.write()?;
                Ok(())
            })
            .await
            .map_err(|e| AppError::Git(format!("Stage task panicked: {e}")))??;
        }

        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(&self.workdir)
            .args(["commit", "-m", message])
            .output()
            .await
            .map_err(|e| AppError::Git(format!("Failed to spawn git commit: {e}")))?;

        let raw_output = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let success = output.status.success();
        let hook_failure_detected = !success && looks_like_hook_failure(&raw_output);

        if !success {
            tracing::warn!(hook_failure = hook_failure_detected, "git commit failed");
        }

        Ok(CommitResult {
            success,
            hook_failure_detected,
            raw_output,
        })
    }

    /// Summarize the working tree against HEAD.
    ///
    /// File counts come from a status walk (including untracked files, which
    /// the agent may have created); line counts come from the index/workdir
    /// diff stats.
    pub async fn diff_summary(&self) -> Result<DiffSummary> {
        let dir = self.workdir.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&dir)?;
            let mut summary = DiffSummary::default();

            let mut opts = git2::StatusOptions::new();
            opts.include_untracked(true).recurse_untracked_dirs(true);
            let statuses = repo.statuses(Some(&mut opts))?;
            for entry in statuses.iter() {
                let s = entry.status();
                if s.intersects(Status::WT_NEW | Status::INDEX_NEW) {
                    summary.files_added += 1;
                } else if s.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
                    summary.files_deleted += 1;
                } else if s.intersects(
                    Status::WT_MODIFIED
                        | Status::INDEX_MODIFIED
                        | Status::WT_RENAMED
                        | Status::INDEX_RENAMED,
                ) {
                    summary.files_modified += 1;
                }
            }

            if let Ok(head) = repo.head().and_then(|h| h.peel_to_tree()) {
                let diff = repo.diff_tree_to_workdir_with_index(Some(&head), None)?;
                let stats = diff.stats()?;
                summary.total_additions = stats.insertions() as u64;
                summary.total_deletions = stats.deletions() as u64;
            }

            Ok(summary)
        })
        .await
        .map_err(|e| AppError::Git(format!("Diff-summary task panicked: {e}")))?
    }
}

fn looks_like_hook_failure(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("hook") && (lower.contains("fail") || lower.contains("error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }
        fs::write(dir.join("README.md"), "hello\n").unwrap();
        {
            let mut index = repo.index().unwrap();
            index
                .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
                .unwrap();
            index.write().unwrap();
            let tree_oid = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_oid).unwrap();
            let sig = git2::Signature::now("Test", "test@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn validate_branch_name_rejects_dash_prefix() {
        assert!(validate_branch_name("-evil").is_err());
        assert!(validate_branch_name("--upload-pack").is_err());
        assert!(validate_branch_name("").is_err());
    }

    #[test]
    fn validate_branch_name_accepts_normal() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("foreman/run-42").is_ok());
    }

    #[test]
    fn hook_failure_detection() {
        assert!(looks_like_hook_failure("pre-commit hook failed"));
        assert!(looks_like_hook_failure("error: commit-msg hook rejected"));
        assert!(!looks_like_hook_failure("nothing to commit"));
    }

    #[tokio::test]
    async fn diff_summary_counts_new_and_modified_files() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());

        fs::write(tmp.path().join("README.md"), "changed\n").unwrap();
        fs::write(tmp.path().join("new.rs"), "fn main() {}\n").unwrap();

        let vcs = Vcs::new(tmp.path());
        let summary = vcs.diff_summary().await.unwrap();
        assert_eq!(summary.files_modified, 1);
        assert_eq!(summary.files_added, 1);
        assert_eq!(summary.total_files(), 2);
    }

    #[tokio::test]
    async fn diff_summary_outside_a_repo_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Vcs::new(tmp.path());
        assert!(vcs.diff_summary().await.is_err());
    }

    #[tokio::test]
    async fn create_or_checkout_branch_is_reentrant() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());

        let vcs = Vcs::new(tmp.path());
        vcs.create_or_checkout_branch("foreman/run-1").await.unwrap();
        assert_eq!(vcs.current_branch().await.unwrap(), "foreman/run-1");

        // Second call checks out the existing branch instead of failing.
        vcs.create_or_checkout_branch("foreman/run-1").await.unwrap();
        assert_eq!(vcs.current_branch().await.unwrap(), "foreman/run-1");
    }
}
