/// Terminal result of one stage invocation.
///
/// Business-logic failures (a retry loop that exhausted its budget or
/// stalled) are outcomes, not errors: the process terminates cleanly and
/// the condition is visible in the exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// A resolution loop reached its attempt ceiling without success.
    LoopExhausted { stage: String },
    /// A resolution loop stopped early because remediation made no
    /// measurable progress.
    Stalled { stage: String },
}

impl StageOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            StageOutcome::Completed => 0,
            StageOutcome::LoopExhausted { .. } | StageOutcome::Stalled { .. } => 2,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StageOutcome::Completed => "completed".to_string(),
            StageOutcome::LoopExhausted { stage } => {
                format!("{stage}: retry budget exhausted")
            }
            StageOutcome::Stalled { stage } => {
                format!("{stage}: stopped early, remediation made no progress")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_failures_map_to_exit_code_two() {
        assert_eq!(StageOutcome::Completed.exit_code(), 0);
        assert_eq!(
            StageOutcome::LoopExhausted {
                stage: "build".to_string()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            StageOutcome::Stalled {
                stage: "test".to_string()
            }
            .exit_code(),
            2
        );
    }
}
