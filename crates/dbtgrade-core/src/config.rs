//! Configuration schema (dbtgrade.toml)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::outcome::Severity;
use crate::score::BadgeConfig;

/// How evaluation errors are scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Count an evaluation error as a violation at the rule's severity
    #[default]
    AsViolation,

    /// Leave evaluation errors out of the score
    Ignore,
}

/// Per-rule configuration
///
/// Any key other than `severity` and `rule_filter_names` is passed to the
/// rule as a parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Severity override
    #[serde(default)]
    pub severity: Option<Severity>,

    /// Names of rule filters restricting where the rule runs
    #[serde(default)]
    pub rule_filter_names: Vec<String>,

    /// Rule parameters
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Rule namespaces to keep (empty keeps every namespace)
    #[serde(default)]
    pub rule_namespaces: Vec<String>,

    /// Rules to remove from the registry
    #[serde(default)]
    pub disabled_rules: Vec<String>,

    /// Only run these rules
    #[serde(default)]
    pub selected_rules: Vec<String>,

    /// Per-rule configuration, keyed by qualified id or bare rule name
    #[serde(default)]
    pub rules: BTreeMap<String, RuleConfig>,

    /// Badge table
    #[serde(default)]
    pub badges: BadgeConfig,

    /// Fail when the project score is below this value
    #[serde(default)]
    pub fail_project_under: Option<f64>,

    /// Fail when any rated item is below this value
    #[serde(default)]
    pub fail_any_item_under: Option<f64>,

    /// Scoring of evaluation errors
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Evaluate rules on a thread pool
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Abort on the first rule error instead of recording it
    #[serde(default)]
    pub debug: bool,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rule_namespaces: Vec::new(),
            disabled_rules: Vec::new(),
            selected_rules: Vec::new(),
            rules: BTreeMap::new(),
            badges: BadgeConfig::default(),
            fail_project_under: None,
            fail_any_item_under: None,
            error_policy: ErrorPolicy::default(),
            parallel: true,
            debug: false,
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject contradictory settings before any work starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.selected_rules.is_empty() && !self.disabled_rules.is_empty() {
            return Err(ConfigError::ConflictingRuleSelection);
        }

        self.badges.validate().map_err(ConfigError::InvalidBadges)?;

        for (name, threshold) in [
            ("fail_project_under", self.fail_project_under),
            ("fail_any_item_under", self.fail_any_item_under),
        ] {
            if let Some(value) = threshold {
                if !(crate::SCORE_MIN..=crate::SCORE_MAX).contains(&value) {
                    return Err(ConfigError::InvalidThreshold(name, value));
                }
            }
        }

        Ok(())
    }

    /// Configuration for a rule, looked up by qualified id then bare name
    pub fn rule_config(&self, qualified_id: &str, name: &str) -> Option<&RuleConfig> {
        self.rules.get(qualified_id).or_else(|| self.rules.get(name))
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("selected rules and disabled rules cannot be used together")]
    ConflictingRuleSelection,

    #[error("Invalid badge table: {0}")]
    InvalidBadges(String),

    #[error("{0} must be between 0 and 10, got {1}")]
    InvalidThreshold(&'static str, f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.parallel);
        assert!(!config.debug);
        assert_eq!(config.error_policy, ErrorPolicy::AsViolation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_config() {
        let config = Config::from_toml(
            r#"
            rule_namespaces = ["dbtgrade_engine::rules::generic"]
            disabled_rules = ["has_example_sql"]
            fail_project_under = 7.5
            error_policy = "ignore"
            parallel = false

            [rules.sql_has_reasonable_number_of_lines]
            severity = "high"
            max_lines = 300

            [rules.has_owner]
            rule_filter_names = ["skip_ephemeral_models"]

            [[badges.tiers]]
            label = "top"
            threshold = 9.0

            [[badges.tiers]]
            label = "rest"
            threshold = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(config.disabled_rules, vec!["has_example_sql"]);
        assert_eq!(config.fail_project_under, Some(7.5));
        assert_eq!(config.error_policy, ErrorPolicy::Ignore);
        assert!(!config.parallel);

        let lines = config
            .rule_config("x::sql_has_reasonable_number_of_lines", "sql_has_reasonable_number_of_lines")
            .unwrap();
        assert_eq!(lines.severity, Some(Severity::High));
        assert_eq!(lines.params.get("max_lines"), Some(&serde_json::json!(300)));

        let owner = config.rule_config("has_owner", "has_owner").unwrap();
        assert_eq!(owner.rule_filter_names, vec!["skip_ephemeral_models"]);
        assert!(owner.params.is_empty());

        assert_eq!(config.badges.badge_for(9.5).label, "top");
    }

    #[test]
    fn selected_and_disabled_rules_conflict() {
        let result = Config::from_toml(
            r#"
            selected_rules = ["has_owner"]
            disabled_rules = ["has_description"]
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ConflictingRuleSelection)));
    }

    #[test]
    fn invalid_threshold_rejected() {
        let result = Config::from_toml("fail_any_item_under = 42.0");
        assert!(matches!(result, Err(ConfigError::InvalidThreshold("fail_any_item_under", _))));
    }

    #[test]
    fn invalid_badges_rejected() {
        let result = Config::from_toml(
            r#"
            [[badges.tiers]]
            label = "only"
            threshold = 5.0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidBadges(_))));
    }

    #[test]
    fn load_from_file_sets_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbtgrade.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "selected_rules = [\"has_description\"]").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.selected_rules, vec!["has_description"]);
        assert_eq!(config.project_root, dir.path());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Config::from_file(std::path::Path::new("/nonexistent/dbtgrade.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn sparse_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbtgrade.toml");
        std::fs::write(&path, "disabled_rules = [\"has_owner\"]\n").unwrap();

        let parsed = Config::from_file(&path).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.disabled_rules, vec!["has_owner"]);
        assert_eq!(parsed.badges, defaults.badges);
        assert_eq!(parsed.error_policy, defaults.error_policy);
        assert!(parsed.parallel);
        assert!(parsed.rules.is_empty());
    }
}
