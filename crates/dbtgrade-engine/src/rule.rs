//! Rule and rule filter definitions
//!
//! A rule is a check function plus metadata. Rules and filters are
//! grouped in [`RulePack`]s and registered explicitly.

use dbtgrade_core::Severity;
use dbtgrade_dbt::{Evaluable, JsonMap, ProjectGraph, ResourceKind};
use std::fmt;
use std::sync::Arc;

/// Result of a rule check on one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Violation(String),

    /// The rule does not make sense for this entity
    NotApplicable(String),
}

impl Verdict {
    pub fn violation(message: impl Into<String>) -> Self {
        Self::Violation(message.into())
    }

    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Self::NotApplicable(reason.into())
    }

    /// `Pass` when `ok`, otherwise a violation with `message`
    pub fn check(ok: bool, message: impl Into<String>) -> Self {
        if ok {
            Self::Pass
        } else {
            Self::violation(message)
        }
    }
}

/// A rule could not be evaluated
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("{0}")]
    Failed(String),
}

/// Read-only context passed to every check
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// The whole graph, for neighbor lookups
    pub graph: &'a ProjectGraph,

    /// Rule parameters from configuration
    pub params: &'a JsonMap,
}

impl<'a> RuleContext<'a> {
    pub fn new(graph: &'a ProjectGraph, params: &'a JsonMap) -> Self {
        Self { graph, params }
    }

    /// Unsigned integer parameter, or `default` when unset
    pub fn param_u64(&self, name: &str, default: u64) -> Result<u64, RuleError> {
        match self.params.get(name) {
            None => Ok(default),
            Some(value) => value.as_u64().ok_or_else(|| RuleError::InvalidParameter {
                name: name.to_string(),
                message: format!("expected a non-negative integer, got {}", value),
            }),
        }
    }

    /// List-of-strings parameter, or `default` when unset
    pub fn param_str_list(&self, name: &str, default: &[&str]) -> Result<Vec<String>, RuleError> {
        let Some(value) = self.params.get(name) else {
            return Ok(default.iter().map(|s| s.to_string()).collect());
        };

        let invalid = || RuleError::InvalidParameter {
            name: name.to_string(),
            message: format!("expected a list of strings, got {}", value),
        };

        value
            .as_array()
            .ok_or_else(invalid)?
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect()
    }
}

type CheckFn = dyn Fn(&Evaluable, &RuleContext<'_>) -> Result<Verdict, RuleError> + Send + Sync;
type PredicateFn = dyn Fn(&Evaluable) -> bool + Send + Sync;

/// A quality rule: metadata plus its check
#[derive(Clone)]
pub struct RuleDescriptor {
    pub name: String,

    /// `None` until the rule is added to a pack, unless set explicitly
    pub namespace: Option<String>,

    pub description: String,
    pub severity: Severity,

    /// Kinds the rule applies to
    pub kinds: Vec<ResourceKind>,

    check: Arc<CheckFn>,
}

impl RuleDescriptor {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        kinds: &[ResourceKind],
        check: F,
    ) -> Self
    where
        F: Fn(&Evaluable, &RuleContext<'_>) -> Result<Verdict, RuleError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            namespace: None,
            description: description.into(),
            severity,
            kinds: kinds.to_vec(),
            check: Arc::new(check),
        }
    }

    /// Override the namespace assigned by the pack
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    /// `<namespace>::<name>`
    pub fn qualified_id(&self) -> String {
        qualify(self.namespace(), &self.name)
    }

    pub fn applies_to(&self, kind: ResourceKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn check(&self, evaluable: &Evaluable, ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        (self.check)(evaluable, ctx)
    }
}

impl fmt::Debug for RuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDescriptor")
            .field("id", &self.qualified_id())
            .field("severity", &self.severity)
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

/// A named predicate restricting where a rule runs
#[derive(Clone)]
pub struct RuleFilter {
    pub name: String,
    pub namespace: Option<String>,
    pub description: String,

    /// Kinds the filter judges; other kinds pass through
    pub kinds: Vec<ResourceKind>,

    predicate: Arc<PredicateFn>,
}

impl RuleFilter {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        kinds: &[ResourceKind],
        predicate: F,
    ) -> Self
    where
        F: Fn(&Evaluable) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            namespace: None,
            description: description.into(),
            kinds: kinds.to_vec(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    pub fn qualified_id(&self) -> String {
        qualify(self.namespace(), &self.name)
    }

    pub fn applies_to(&self, kind: ResourceKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Whether the entity should be evaluated
    ///
    /// Entities of a kind the filter does not judge are accepted.
    pub fn accepts(&self, evaluable: &Evaluable) -> bool {
        !self.applies_to(evaluable.resource_kind()) || (self.predicate)(evaluable)
    }
}

impl fmt::Debug for RuleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleFilter")
            .field("id", &self.qualified_id())
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", namespace, name)
    }
}

/// Rules and filters registered together under one namespace
#[derive(Debug, Clone)]
pub struct RulePack {
    pub namespace: String,
    pub rules: Vec<RuleDescriptor>,
    pub filters: Vec<RuleFilter>,
}

impl RulePack {
    /// Create an empty pack; pass `module_path!()` for the usual namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            rules: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn rule(mut self, mut rule: RuleDescriptor) -> Self {
        if rule.namespace.is_none() {
            rule.namespace = Some(self.namespace.clone());
        }
        self.rules.push(rule);
        self
    }

    pub fn filter(mut self, mut filter: RuleFilter) -> Self {
        if filter.namespace.is_none() {
            filter.namespace = Some(self.namespace.clone());
        }
        self.filters.push(filter);
        self
    }
}
