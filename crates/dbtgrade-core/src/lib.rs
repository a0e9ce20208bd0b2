//! dbtgrade Core
//!
//! Core domain types shared by the loader, the rule engine and the CLI.
//! Severity names and the report schema are part of the public API.

pub mod outcome;
pub mod score;
pub mod report;
pub mod config;

pub use outcome::{RuleOutcome, Severity};
pub use score::{Badge, BadgeConfig, BadgeTier, Score, SCORE_MAX, SCORE_MIN};
pub use report::{ItemReport, OutcomeEntry, ProjectSummary, Report, ReportVersion};
pub use config::{Config, ConfigError, ErrorPolicy, RuleConfig};
