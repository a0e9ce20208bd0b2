//! Rule severities and evaluation outcomes
//!
//! IMPORTANT: Severity names are serialized in reports and config files.
//! Never rename them.

use serde::{Deserialize, Serialize};

/// Rule severity level
///
/// Ordered from the informational no-op level up to critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - reported but never penalized
    Info,

    /// Low impact on the score
    Low,

    /// Default severity for most rules
    #[default]
    Medium,

    /// High impact on the score
    High,

    /// A violation zeroes the item score
    Critical,
}

impl Severity {
    /// Weight used by the scorer
    ///
    /// `Info` weighs nothing and is left out of the denominator.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Info => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 4,
            Self::Critical => 8,
        }
    }

    /// Whether outcomes at this severity take part in scoring
    pub fn is_scored(&self) -> bool {
        self.weight() > 0
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of evaluating one rule against one entity
///
/// Outcomes are terminal: they are created once by the evaluator and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleOutcome {
    /// The entity satisfies the rule
    Pass,

    /// The entity violates the rule
    Violation { message: String },

    /// The rule did not apply to this entity
    Skipped { reason: String },

    /// The rule failed while evaluating this entity
    EvaluationError { cause: String },
}

impl RuleOutcome {
    pub fn violation(message: impl Into<String>) -> Self {
        Self::Violation { message: message.into() }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped { reason: reason.into() }
    }

    pub fn error(cause: impl Into<String>) -> Self {
        Self::EvaluationError { cause: cause.into() }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Violations and evaluation errors
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Violation { .. } | Self::EvaluationError { .. })
    }

    /// Short status label used by renderers
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass => "OK",
            Self::Violation { .. } => "WARN",
            Self::Skipped { .. } => "SKIP",
            Self::EvaluationError { .. } => "ERR",
        }
    }

    /// Message, reason or cause, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Violation { message } => Some(message),
            Self::Skipped { reason } => Some(reason),
            Self::EvaluationError { cause } => Some(cause),
        }
    }
}
