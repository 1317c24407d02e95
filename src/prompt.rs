//! Prompt builders, one per task category.

use crate::platform::types::IssueRecord;

pub fn classification(issue: &IssueRecord) -> String {
    format!(
        r#"Classify the following issue into exactly one of: bug, feature, refactor, chore, docs.
Respond with the single classification word and nothing else.

**Title:** {title}

**Description:**
{body}"#,
        title = issue.title,
        body = issue.body,
    )
}

pub fn branch_name(issue: &IssueRecord, prefix: &str, run_id: &str) -> String {
    format!(
        r#"Propose a short git branch name for this work, using only lowercase letters, digits and hyphens.
It must start with the prefix `{prefix}/{run_id}-`. Respond with the branch name only.

**Issue:** {title}"#,
        title = issue.title,
    )
}

pub fn plan(issue: &IssueRecord, classification: &str) -> String {
    format!(
        r#"You are an expert software engineer. Write an implementation plan for the issue below.

## Issue ({classification})
**Title:** {title}

**Description:**
{body}

## Instructions
1. Identify the files and components that need to change.
2. Break the work into ordered, verifiable steps.
3. Call out risks and the tests that should prove the change.

Respond with the plan in markdown."#,
        title = issue.title,
        body = issue.body,
    )
}

pub fn implementation(issue_title: &str, plan: &str) -> String {
    format!(
        r#"You are an expert software engineer working in the current repository checkout.

Your task: implement the plan below for "{issue_title}".

## Plan
{plan}

## Guidelines
- Make minimal, focused changes that follow the plan.
- Follow the existing code style and patterns in the repository.
- When you are done, state clearly what you changed and whether the implementation is complete."#,
    )
}

pub fn verify_implementation(issue_title: &str) -> String {
    format!(
        r#"Earlier attempts at "{issue_title}" left the repository checkout in a partially
finished state. Review the working tree against the task, complete anything
unfinished, and state clearly whether the implementation is complete."#,
    )
}

pub fn remediation(stage: &str, errors: &[String]) -> String {
    let error_list = if errors.is_empty() {
        "(no error details were captured; inspect the working tree)".to_string()
    } else {
        errors
            .iter()
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        r#"The {stage} step failed. Fix the problems listed below in the current repository checkout.

## Detected problems
{error_list}

## Guidelines
- Fix only the listed problems; do not refactor unrelated code.
- State what you changed when you are done."#,
    )
}

pub fn test_repair(scenario: &str, failure_output: &str) -> String {
    format!(
        r#"The test scenario `{scenario}` is failing. Diagnose and fix the failure in the current repository checkout.

## Failure output
```
{failure_output}
```

## Guidelines
- Prefer fixing the code under test; only change the test if it is demonstrably wrong.
- State what you changed when you are done."#,
    )
}

pub fn review(diff_description: &str) -> String {
    format!(
        r#"Review the change described below. Report each finding on its own line in the form:
severity: description (severity is one of blocker, major, minor, info)

If there are no findings, respond with "no findings".

## Change
{diff_description}"#,
    )
}

pub fn review_fix(findings: &[String]) -> String {
    let list = findings
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Resolve the blocking review findings below in the current repository checkout.

## Blocking findings
{list}

## Guidelines
- Address each finding specifically.
- State what you changed when you are done."#,
    )
}

pub fn commit_message(issue_title: &str, summary: &str) -> String {
    format!(
        r#"Write a conventional git commit message (subject line plus optional body) for this change.
Respond with the message only.

**Task:** {issue_title}

**Summary of changes:**
{summary}"#,
    )
}

pub fn pr_description(issue: &IssueRecord, summary: &str) -> String {
    format!(
        r#"Write a pull request description for this change. Respond with markdown only.

**Issue:** {title}

**Issue description:**
{body}

**Summary of changes:**
{summary}"#,
        title = issue.title,
        body = issue.body,
    )
}
