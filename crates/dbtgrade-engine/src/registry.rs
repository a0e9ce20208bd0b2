//! Rule registry
//!
//! Packs are added to a [`RuleRegistryBuilder`], which rejects duplicate
//! ids. Building against a [`Config`] applies namespace and rule
//! selection, then per-rule configuration.

use dbtgrade_core::{Config, Severity};
use dbtgrade_dbt::{Evaluable, JsonMap, ResourceKind};
use indexmap::IndexMap;

use crate::rule::{RuleDescriptor, RuleFilter, RulePack};

/// Registry error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate rule '{0}'")]
    DuplicateRule(String),

    #[error("Duplicate rule filter '{0}'")]
    DuplicateFilter(String),

    #[error("Rule '{rule}' uses unknown rule filter '{filter}'")]
    UnknownFilter { rule: String, filter: String },
}

/// A rule with its configuration applied
#[derive(Debug, Clone)]
pub struct ConfiguredRule {
    pub descriptor: RuleDescriptor,

    /// Effective severity
    pub severity: Severity,

    pub params: JsonMap,
    pub filters: Vec<RuleFilter>,
}

impl ConfiguredRule {
    pub fn qualified_id(&self) -> String {
        self.descriptor.qualified_id()
    }

    pub fn applies_to(&self, kind: ResourceKind) -> bool {
        self.descriptor.applies_to(kind)
    }

    /// First filter rejecting the entity, if any
    pub fn rejecting_filter(&self, evaluable: &Evaluable) -> Option<&RuleFilter> {
        self.filters.iter().find(|filter| !filter.accepts(evaluable))
    }
}

/// Collects rule packs before configuration
#[derive(Debug, Default)]
pub struct RuleRegistryBuilder {
    rules: IndexMap<String, RuleDescriptor>,
    filters: IndexMap<String, RuleFilter>,
}

impl RuleRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every rule and filter of a pack
    pub fn add_pack(mut self, pack: RulePack) -> Result<Self, RegistryError> {
        for rule in pack.rules {
            let id = rule.qualified_id();
            if self.rules.contains_key(&id) {
                return Err(RegistryError::DuplicateRule(id));
            }
            self.rules.insert(id, rule);
        }

        for filter in pack.filters {
            let id = filter.qualified_id();
            if self.filters.contains_key(&id) {
                return Err(RegistryError::DuplicateFilter(id));
            }
            self.filters.insert(id, filter);
        }

        Ok(self)
    }

    /// Apply namespace, selection and per-rule configuration
    pub fn build(self, config: &Config) -> Result<RuleRegistry, RegistryError> {
        warn_unmatched(&config.selected_rules, "Selected", &self.rules);
        warn_unmatched(&config.disabled_rules, "Disabled", &self.rules);

        let mut rules = IndexMap::new();

        for (id, descriptor) in self.rules {
            if !in_namespaces(descriptor.namespace(), &config.rule_namespaces) {
                continue;
            }

            let keep = if !config.selected_rules.is_empty() {
                matches_any(&config.selected_rules, &id, &descriptor.name)
            } else {
                !matches_any(&config.disabled_rules, &id, &descriptor.name)
            };
            if !keep {
                tracing::debug!("Rule '{}' is not enabled", id);
                continue;
            }

            let rule_config = config.rule_config(&id, &descriptor.name).cloned().unwrap_or_default();

            let mut filters = Vec::new();
            for filter_name in &rule_config.rule_filter_names {
                let filter = self
                    .filters
                    .iter()
                    .find(|(filter_id, filter)| *filter_id == filter_name || filter.name == *filter_name)
                    .map(|(_, filter)| filter.clone())
                    .ok_or_else(|| RegistryError::UnknownFilter {
                        rule: id.clone(),
                        filter: filter_name.clone(),
                    })?;
                filters.push(filter);
            }

            let configured = ConfiguredRule {
                severity: rule_config.severity.unwrap_or(descriptor.severity),
                params: rule_config.params,
                filters,
                descriptor,
            };
            rules.insert(id, configured);
        }

        tracing::debug!("{} rule(s) enabled", rules.len());

        Ok(RuleRegistry {
            rules,
            filters: self.filters,
        })
    }
}

fn matches_any(entries: &[String], qualified_id: &str, name: &str) -> bool {
    entries.iter().any(|entry| entry == qualified_id || entry == name)
}

fn in_namespaces(namespace: &str, requested: &[String]) -> bool {
    requested.is_empty()
        || requested.iter().any(|ns| {
            namespace == ns
                || namespace
                    .strip_prefix(ns.as_str())
                    .is_some_and(|rest| rest.starts_with("::"))
        })
}

fn warn_unmatched(entries: &[String], label: &str, rules: &IndexMap<String, RuleDescriptor>) {
    for entry in entries {
        if !rules.iter().any(|(id, rule)| id == entry || rule.name == *entry) {
            tracing::warn!("{} rule '{}' does not exist", label, entry);
        }
    }
}

/// Enabled, configured rules in registration order
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: IndexMap<String, ConfiguredRule>,
    filters: IndexMap<String, RuleFilter>,
}

impl RuleRegistry {
    pub fn builder() -> RuleRegistryBuilder {
        RuleRegistryBuilder::new()
    }

    /// Registry of the built-in rules, configured by `config`
    pub fn with_builtin_rules(config: &Config) -> Result<Self, RegistryError> {
        crate::rules::builtin_packs()
            .into_iter()
            .try_fold(Self::builder(), RuleRegistryBuilder::add_pack)?
            .build(config)
    }

    pub fn rules(&self) -> impl Iterator<Item = &ConfiguredRule> {
        self.rules.values()
    }

    pub fn get(&self, qualified_id: &str) -> Option<&ConfiguredRule> {
        self.rules.get(qualified_id)
    }

    /// Every registered filter, used or not
    pub fn filters(&self) -> impl Iterator<Item = &RuleFilter> {
        self.filters.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
