use serde::{Deserialize, Serialize};

/// A work item fetched from the issue tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub state: String,
}

/// An open pull request on the code host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrInfo {
    pub number: u64,
    pub url: String,
    pub title: String,
}

/// Severity of a review finding. Only blockers trigger remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Blocker,
    Major,
    Minor,
    Info,
}

impl Severity {
    pub fn parse(s: &str) -> Severity {
        match s.trim().to_lowercase().as_str() {
            "blocker" | "critical" => Severity::Blocker,
            "major" | "high" => Severity::Major,
            "minor" | "low" => Severity::Minor,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Blocker => "blocker",
            Severity::Major => "major",
            Severity::Minor => "minor",
            Severity::Info => "info",
        }
    }
}

/// One issue raised during automated review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFinding {
    pub severity: Severity,
    pub description: String,
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parsing_accepts_synonyms() {
        assert_eq!(Severity::parse("BLOCKER"), Severity::Blocker);
        assert_eq!(Severity::parse("critical"), Severity::Blocker);
        assert_eq!(Severity::parse("high"), Severity::Major);
        assert_eq!(Severity::parse("nit"), Severity::Info);
    }
}
