//! Bounded attempt/evaluate/remediate loop shared by the build-verification,
//! test-repair, and review-repair stages.
//!
//! Infrastructure errors from the attempt or remediation functions are
//! wrapped into failed outcomes rather than propagated: "remediation
//! crashed" and "remediation reported failure" are the same thing to the
//! loop. Remediation that makes no measurable progress ends the loop early,
//! a terminal condition distinct from exhausting the attempt ceiling.

use async_trait::async_trait;

use crate::error::Result;
use crate::reconcile::ActionOutcome;

/// Stage-specific attempt ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const BUILD_VERIFICATION: RetryPolicy = RetryPolicy { max_attempts: 3 };
    pub const TEST_REPAIR: RetryPolicy = RetryPolicy { max_attempts: 4 };
    pub const SCENARIO_RERUN: RetryPolicy = RetryPolicy { max_attempts: 2 };
    pub const REVIEW_REPAIR: RetryPolicy = RetryPolicy { max_attempts: 3 };
}

/// One stage's hookup into the loop: perform an attempt, judge it, and ask
/// the LLM to fix what the judgement found.
#[async_trait]
pub trait ResolutionStage: Send {
    /// Perform one attempt, returning its raw output.
    async fn execute(&mut self, attempt: u32) -> Result<String>;

    /// Judge the raw output (normally via the output reconciler).
    async fn evaluate(&mut self, raw: &str) -> Result<ActionOutcome>;

    /// Ask the LLM to fix the problems the evaluation found. The returned
    /// outcome measures the remediation itself.
    async fn remediate(&mut self, failed: &ActionOutcome) -> Result<ActionOutcome>;

    /// Human-readable stage name for notifications and logs.
    fn describe(&self) -> String;
}

/// Events published to the issue tracker so a human can observe the loop
/// without reading logs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    AttemptStarted {
        stage: String,
        attempt: u32,
        max_attempts: u32,
    },
    AttemptFailed {
        stage: String,
        attempt: u32,
        errors: Vec<String>,
    },
    RemediationApplied {
        stage: String,
        attempt: u32,
        files_changed: u64,
        succeeded: bool,
    },
    Finished {
        stage: String,
        attempts_used: u32,
        succeeded: bool,
        exhausted: bool,
        stalled: bool,
    },
}

#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, event: ProgressEvent);
}

/// Sink for contexts with nothing to notify (and for tests).
pub struct NullSink;

#[async_trait]
impl ProgressSink for NullSink {
    async fn publish(&self, _event: ProgressEvent) {}
}

/// Final result of one loop invocation. Never persisted directly; stages
/// summarize it into workflow state.
#[derive(Debug, Clone)]
pub struct RetryLoopResult {
    pub final_outcome: ActionOutcome,
    pub attempts_used: u32,
    pub resolved_count: u32,
    /// The attempt ceiling was reached without success.
    pub exhausted: bool,
    /// Remediation made zero measurable progress, so the loop stopped
    /// before the ceiling.
    pub stalled: bool,
}

impl RetryLoopResult {
    pub fn succeeded(&self) -> bool {
        self.final_outcome.succeeded
    }
}

/// Run the loop: `Attempt(n) -> Evaluate -> {stop | Remediate -> Attempt(n+1)}`.
pub async fn run_resolution_loop<S: ResolutionStage>(
    stage: &mut S,
    policy: RetryPolicy,
    sink: &dyn ProgressSink,
) -> RetryLoopResult {
    let name = stage.describe();
    let mut resolved_count = 0u32;
    let mut attempt = 1u32;

    loop {
        sink.publish(ProgressEvent::AttemptStarted {
            stage: name.clone(),
            attempt,
            max_attempts: policy.max_attempts,
        })
        .await;
        tracing::info!(stage = %name, attempt, max = policy.max_attempts, "Attempt");

        let outcome = match stage.execute(attempt).await {
            Ok(raw) => match stage.evaluate(&raw).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(stage = %name, error = %e, "Evaluation failed");
                    ActionOutcome::from_error(&e)
                }
            },
            Err(e) => {
                tracing::warn!(stage = %name, error = %e, "Attempt crashed");
                ActionOutcome::from_error(&e)
            }
        };

        if outcome.succeeded {
            sink.publish(ProgressEvent::Finished {
                stage: name.clone(),
                attempts_used: attempt,
                succeeded: true,
                exhausted: false,
                stalled: false,
            })
            .await;
            return RetryLoopResult {
                final_outcome: outcome,
                attempts_used: attempt,
                resolved_count,
                exhausted: false,
                stalled: false,
            };
        }

        sink.publish(ProgressEvent::AttemptFailed {
            stage: name.clone(),
            attempt,
            errors: outcome.errors.clone(),
        })
        .await;

        if attempt >= policy.max_attempts {
            sink.publish(ProgressEvent::Finished {
                stage: name.clone(),
                attempts_used: attempt,
                succeeded: false,
                exhausted: true,
                stalled: false,
            })
            .await;
            return RetryLoopResult {
                final_outcome: outcome,
                attempts_used: attempt,
                resolved_count,
                exhausted: true,
                stalled: false,
            };
        }

        // Remediation failure is not fatal; it only means no improvement
        // happened this cycle.
        let remediation = match stage.remediate(&outcome).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(stage = %name, error = %e, "Remediation crashed");
                ActionOutcome::from_error(&e)
            }
        };

        if remediation.succeeded {
            resolved_count += 1;
        }

        sink.publish(ProgressEvent::RemediationApplied {
            stage: name.clone(),
            attempt,
            files_changed: remediation.metrics.files_changed,
            succeeded: remediation.succeeded,
        })
        .await;

        let made_progress = remediation.succeeded || remediation.metrics.files_changed > 0;
        if !made_progress {
            tracing::info!(stage = %name, attempt, "Remediation made no progress, stopping early");
            sink.publish(ProgressEvent::Finished {
                stage: name.clone(),
                attempts_used: attempt,
                succeeded: false,
                exhausted: false,
                stalled: true,
            })
            .await;
            return RetryLoopResult {
                final_outcome: outcome,
                attempts_used: attempt,
                resolved_count,
                exhausted: false,
                stalled: true,
            };
        }

        attempt += 1;
    }
}
