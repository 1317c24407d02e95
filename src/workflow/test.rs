//! Test stage: run the configured end-to-end scenarios sequentially and
//! fail-fast, entering the test-repair loop for the first scenario that
//! stays red.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::llm::{LlmClient, Session};
use crate::prompt;
use crate::reconcile::{self, ActionOutcome};
use crate::retry::{run_resolution_loop, ResolutionStage, RetryPolicy};
use crate::router::TaskCategory;
use crate::state::fields;
use crate::vcs::DiffSummary;
use crate::workflow::progress::TrackerSink;
use crate::workflow::types::StageOutcome;
use crate::workflow::{truncate, StageContext};

/// Run one scenario command, returning pass/fail plus its output with a
/// machine-readable verdict line appended.
async fn run_scenario(ctx: &StageContext, command: &str) -> Result<(bool, String)> {
    tracing::info!(scenario = command, "Running scenario");
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(&ctx.config.vcs.workdir)
        .output()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to spawn scenario '{command}': {e}")))?;

    let mut text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let passed = output.status.success();
    if passed {
        text.push_str("\nall tests pass\n");
    } else {
        let code = output.status.code().unwrap_or(-1);
        text.push_str(&format!("\nerror: scenario exited with code {code}\n"));
    }
    Ok((passed, text))
}

/// Run a scenario with the bounded re-run budget, tolerating one flake.
async fn run_with_rerun(ctx: &StageContext, command: &str) -> Result<(bool, String)> {
    let budget = RetryPolicy::SCENARIO_RERUN.max_attempts;
    let mut last = (false, String::new());
    for attempt in 1..=budget {
        last = run_scenario(ctx, command).await?;
        if last.0 {
            return Ok(last);
        }
        tracing::warn!(scenario = command, attempt, budget, "Scenario failed");
    }
    Ok(last)
}

struct TestRepair<'a> {
    ctx: &'a StageContext,
    llm: &'a LlmClient,
    session: &'a Session,
    scenario: String,
    last_failure: String,
}

#[async_trait]
impl ResolutionStage for TestRepair<'_> {
    async fn execute(&mut self, _attempt: u32) -> Result<String> {
        let (_passed, output) = run_scenario(self.ctx, &self.scenario).await?;
        self.last_failure = output.clone();
        Ok(output)
    }

    /// Scenario runs do not change the working tree, so the text verdict is
    /// judged on its own (an empty diff summary carries no evidence either
    /// way).
    async fn evaluate(&mut self, raw: &str) -> Result<ActionOutcome> {
        Ok(reconcile::reconcile(raw, Ok(DiffSummary::default())))
    }

    async fn remediate(&mut self, _failed: &ActionOutcome) -> Result<ActionOutcome> {
        let binding = self.ctx.router.resolve(TaskCategory::TestRepair);
        let prompt = prompt::test_repair(&self.scenario, &truncate(&self.last_failure, 4_000));
        let response = self
            .llm
            .send(self.session, &prompt, binding, TaskCategory::TestRepair)
            .await?;
        let diff = self.ctx.vcs.diff_summary().await;
        Ok(reconcile::reconcile(&response.text, diff))
    }

    fn describe(&self) -> String {
        format!("test-repair ({})", self.scenario)
    }
}

pub async fn run(ctx: &StageContext) -> Result<StageOutcome> {
    let mut state = ctx.store.load(&ctx.run_id)?.ok_or_else(|| {
        AppError::State(format!(
            "no state for run {} (run the plan stage first)",
            ctx.run_id
        ))
    })?;
    let issue_id = state.require(fields::ISSUE_ID)?.to_string();
    let branch = state.require(fields::BRANCH)?.to_string();
    ctx.vcs.create_or_checkout_branch(&branch).await?;

    let scenarios = ctx.config.test.scenarios.clone();
    if scenarios.is_empty() {
        tracing::info!("No test scenarios configured");
        state.set(fields::TEST_RESULT, "skipped");
        ctx.store.save(&mut state, "test")?;
        return Ok(StageOutcome::Completed);
    }

    let llm = ctx.llm("test-fixer");
    let mut session = llm.open().await?;
    let sink = TrackerSink::new(ctx.tracker.as_ref(), &issue_id);

    for (index, scenario) in scenarios.iter().enumerate() {
        let (passed, output) = run_with_rerun(ctx, scenario).await?;
        if passed {
            tracing::info!(scenario = %scenario, "Scenario passed");
            continue;
        }

        let mut stage = TestRepair {
            ctx,
            llm: &llm,
            session: &session,
            scenario: scenario.clone(),
            last_failure: output,
        };
        let result = run_resolution_loop(&mut stage, RetryPolicy::TEST_REPAIR, &sink).await;

        if result.succeeded() {
            tracing::info!(scenario = %scenario, attempts = result.attempts_used, "Scenario repaired");
            continue;
        }

        // Fail-fast: remaining scenarios are not run.
        let remaining = scenarios.len() - index - 1;
        tracing::warn!(
            scenario = %scenario,
            remaining,
            "Scenario still failing, stopping the test stage"
        );
        let verdict = if result.stalled { "stalled" } else { "exhausted" };
        state.set(fields::TEST_RESULT, format!("{verdict}: {scenario}"));
        ctx.store.save(&mut state, "test")?;
        llm.close(&mut session);
        return Ok(if result.stalled {
            StageOutcome::Stalled {
                stage: "test-repair".to_string(),
            }
        } else {
            StageOutcome::LoopExhausted {
                stage: "test-repair".to_string(),
            }
        });
    }

    let _ = ctx
        .tracker
        .post_comment(
            &issue_id,
            &format!("✅ All {} test scenario(s) pass on `{branch}`.", scenarios.len()),
        )
        .await;
    state.set(fields::TEST_RESULT, "passed");
    ctx.store.save(&mut state, "test")?;
    llm.close(&mut session);
    Ok(StageOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verdict-line classification: the appended lines must land on the
    // right side of the reconciler's catalogs.
    #[test]
    fn pass_marker_classifies_as_passed() {
        let outcome = reconcile::reconcile(
            "running 3 tests\nall tests pass\n",
            Ok(DiffSummary::default()),
        );
        assert!(outcome.succeeded);
    }

    #[test]
    fn failure_marker_classifies_as_failed_even_with_pass_noise() {
        let outcome = reconcile::reconcile(
            "2 passed, 1 failed\nerror: scenario exited with code 1\n",
            Ok(DiffSummary::default()),
        );
        assert!(!outcome.succeeded);
        assert!(outcome.errors[0].contains("exited with code 1"));
    }
}
