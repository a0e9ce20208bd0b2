//! Report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::outcome::{RuleOutcome, Severity};
use crate::score::Score;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One rule outcome in an item report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEntry {
    /// Qualified rule id
    pub rule: String,

    /// Effective severity
    pub severity: Severity,

    #[serde(flatten)]
    pub outcome: RuleOutcome,
}

/// Score and outcomes of one evaluated entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    pub unique_id: String,
    pub name: String,

    /// Resource kind (model, source, ...)
    pub kind: String,

    pub score: Score,

    /// False when no rule applied to the item
    pub rated: bool,

    pub outcomes: Vec<OutcomeEntry>,
}

impl ItemReport {
    pub fn failures(&self) -> impl Iterator<Item = &OutcomeEntry> {
        self.outcomes.iter().filter(|entry| entry.outcome.is_failure())
    }
}

/// Project-level summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    pub score: Score,

    /// Number of evaluated items
    pub items: usize,

    /// Number of items counted in the project score
    pub rated_items: usize,

    /// Number of failing outcomes across all items
    pub failures: usize,
}

/// Score report (report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    pub project: ProjectSummary,

    pub items: Vec<ItemReport>,
}

impl Report {
    /// Create a report stamped with the current time
    pub fn new(project: ProjectSummary, items: Vec<ItemReport>) -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            project,
            items,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::BadgeConfig;
    use pretty_assertions::assert_eq;

    fn sample_report() -> Report {
        let badges = BadgeConfig::default();
        let item = ItemReport {
            unique_id: "model.package.model1".to_string(),
            name: "model1".to_string(),
            kind: "model".to_string(),
            score: badges.score(5.0),
            rated: true,
            outcomes: vec![
                OutcomeEntry {
                    rule: "generic::has_description".to_string(),
                    severity: Severity::Medium,
                    outcome: RuleOutcome::violation("Model lacks a description."),
                },
                OutcomeEntry {
                    rule: "generic::has_owner".to_string(),
                    severity: Severity::Medium,
                    outcome: RuleOutcome::Pass,
                },
            ],
        };

        Report::new(
            ProjectSummary {
                name: "package".to_string(),
                score: badges.score(5.0),
                items: 1,
                rated_items: 1,
                failures: 1,
            },
            vec![item],
        )
    }

    #[test]
    fn report_serialization() {
        let report = sample_report();
        assert_eq!(report.version, ReportVersion::CURRENT);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"status\": \"violation\""));
        assert!(json.contains("\"label\": \"wip\""));

        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn item_failures() {
        let report = sample_report();
        let failures: Vec<_> = report.items[0].failures().map(|e| e.rule.as_str()).collect();
        assert_eq!(failures, vec!["generic::has_description"]);
    }

    #[test]
    fn version_display() {
        assert_eq!(ReportVersion::CURRENT.to_string(), "1.0");
    }
}
