//! Plan stage: classify the issue, create the work branch, and produce the
//! plan artifact later stages build against.

use crate::error::Result;
use crate::prompt;
use crate::router::TaskCategory;
use crate::state::fields;
use crate::workflow::types::StageOutcome;
use crate::workflow::{truncate, StageContext};

pub async fn run(ctx: &StageContext, issue_id: &str) -> Result<StageOutcome> {
    let mut state = ctx.store.load_or_create(&ctx.run_id)?;
    state.set(fields::ISSUE_ID, issue_id);

    let issue = ctx.tracker.fetch_issue(issue_id).await?;
    tracing::info!(run_id = %ctx.run_id, issue = %issue.id, title = %issue.title, "Planning");

    let llm = ctx.llm("planner");
    let mut session = llm.open().await?;

    // Classify the work item with the light model.
    let binding = ctx.router.resolve(TaskCategory::Classification);
    let classification = llm
        .send(
            &session,
            &prompt::classification(&issue),
            binding,
            TaskCategory::Classification,
        )
        .await?
        .text
        .trim()
        .to_lowercase();
    tracing::info!(classification = %classification, "Issue classified");

    // Name and check out the branch.
    let binding = ctx.router.resolve(TaskCategory::BranchNaming);
    let suggested = llm
        .send(
            &session,
            &prompt::branch_name(&issue, &ctx.config.vcs.branch_prefix, &ctx.run_id),
            binding,
            TaskCategory::BranchNaming,
        )
        .await?
        .text;
    let branch = sanitize_branch(&suggested, &ctx.config.vcs.branch_prefix, &ctx.run_id);
    ctx.vcs.create_or_checkout_branch(&branch).await?;
    tracing::info!(branch = %branch, "Branch ready");

    // Generate the plan with the heavy model and persist it as an artifact.
    let binding = ctx.router.resolve(TaskCategory::Planning);
    let plan_text = llm
        .send(
            &session,
            &prompt::plan(&issue, &classification),
            binding,
            TaskCategory::Planning,
        )
        .await?
        .text;

    let plan_dir = ctx.config.state.dir.join("plans");
    tokio::fs::create_dir_all(&plan_dir).await?;
    let plan_path = plan_dir.join(format!("{}.md", ctx.run_id));
    tokio::fs::write(&plan_path, &plan_text).await?;

    // The plan is attached for human review; a tracker hiccup here is not
    // worth failing the stage over.
    if let Err(e) = ctx.tracker.post_attachment(issue_id, &plan_path).await {
        tracing::warn!(error = %e, "Failed to attach plan to issue");
    }
    let comment = format!(
        "📋 Plan ready for `{branch}` (classification: {classification}).\n\n{}",
        truncate(&plan_text, 2_000)
    );
    if let Err(e) = ctx.tracker.post_comment(issue_id, &comment).await {
        tracing::warn!(error = %e, "Failed to post plan comment");
    }

    state.set(fields::CLASSIFICATION, &classification);
    state.set(fields::BRANCH, &branch);
    state.set(fields::PLAN_REF, plan_path.to_string_lossy());
    ctx.store.save(&mut state, "plan")?;

    llm.close(&mut session);
    Ok(StageOutcome::Completed)
}

/// Normalize an LLM-proposed branch name and force the run's prefix.
fn sanitize_branch(suggested: &str, prefix: &str, run_id: &str) -> String {
    let required = format!("{prefix}/{run_id}-");

    let cleaned: String = suggested
        .trim()
        .lines()
        .last()
        .unwrap_or_default()
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '/' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('-');

    let slug = cleaned
        .strip_prefix(&required)
        .unwrap_or(cleaned)
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_matches('-')
        .to_string();

    if slug.is_empty() {
        format!("{prefix}/{run_id}")
    } else {
        format!("{required}{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_a_well_formed_suggestion() {
        assert_eq!(
            sanitize_branch("foreman/run-1-fix-login", "foreman", "run-1"),
            "foreman/run-1-fix-login"
        );
    }

    #[test]
    fn sanitize_forces_prefix_on_freeform_output() {
        assert_eq!(
            sanitize_branch("Fix Login Bug!", "foreman", "run-1"),
            "foreman/run-1-fix-login-bug"
        );
    }

    #[test]
    fn sanitize_takes_last_line_of_chatty_output() {
        let chatty = "Sure! Here is a branch name:\nfix-the-parser";
        assert_eq!(
            sanitize_branch(chatty, "foreman", "run-1"),
            "foreman/run-1-fix-the-parser"
        );
    }

    #[test]
    fn sanitize_falls_back_on_garbage() {
        assert_eq!(sanitize_branch("!!!", "foreman", "run-1"), "foreman/run-1");
        assert_eq!(sanitize_branch("", "foreman", "run-1"), "foreman/run-1");
    }
}
