//! Rule evaluation
//!
//! Runs every enabled rule against every selected entity of a matching
//! kind. Each (entity, rule) pair is isolated: a rule error or a panic
//! becomes an `EvaluationError` outcome and the other pairs carry on.

use dbtgrade_core::{Config, RuleOutcome, Severity};
use dbtgrade_dbt::{Evaluable, ProjectGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use indexmap::IndexMap;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info};

use crate::registry::{ConfiguredRule, RuleRegistry};
use crate::rule::{RuleContext, RuleError, Verdict};

/// Outcome of one rule on one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub unique_id: String,

    /// Qualified rule id
    pub rule: String,

    /// Effective severity
    pub severity: Severity,

    pub outcome: RuleOutcome,
}

/// Debug-mode evaluation stopped on a rule error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Rule '{rule}' failed on '{unique_id}': {cause}")]
pub struct EvaluationAbort {
    pub rule: String,
    pub unique_id: String,

    #[source]
    pub cause: RuleError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationOptions {
    /// Evaluate pairs on the rayon thread pool
    pub parallel: bool,

    /// Sequential, panics propagate, first rule error aborts
    pub debug: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            debug: false,
        }
    }
}

impl From<&Config> for EvaluationOptions {
    fn from(config: &Config) -> Self {
        Self {
            parallel: config.parallel,
            debug: config.debug,
        }
    }
}

/// All records of a run, in entity-then-rule order
///
/// The records of one entity are contiguous, so each entity maps to a
/// range of `records`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    records: Vec<EvaluationRecord>,
    by_item: IndexMap<String, Range<usize>>,
}

impl Evaluation {
    fn new(records: Vec<EvaluationRecord>) -> Self {
        let mut by_item: IndexMap<String, Range<usize>> = IndexMap::new();
        for (index, record) in records.iter().enumerate() {
            match by_item.get_mut(&record.unique_id) {
                Some(range) if range.end == index => range.end += 1,
                _ => {
                    by_item.insert(record.unique_id.clone(), index..index + 1);
                }
            }
        }
        Self { records, by_item }
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    /// Records of one entity
    pub fn for_item(&self, unique_id: &str) -> std::slice::Iter<'_, EvaluationRecord> {
        self.by_item
            .get(unique_id)
            .map_or(&[][..], |range| &self.records[range.clone()])
            .iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct Evaluator<'a> {
    registry: &'a RuleRegistry,
    options: EvaluationOptions,
}

impl<'a> Evaluator<'a> {
    pub fn new(registry: &'a RuleRegistry, options: EvaluationOptions) -> Self {
        Self { registry, options }
    }

    /// Evaluate the selected entities of `graph`
    pub fn evaluate(&self, graph: &ProjectGraph) -> Result<Evaluation, EvaluationAbort> {
        let pairs: Vec<(&Evaluable, &ConfiguredRule)> = graph
            .evaluables()
            .flat_map(|evaluable| {
                self.registry
                    .rules()
                    .filter(move |rule| rule.applies_to(evaluable.resource_kind()))
                    .map(move |rule| (evaluable, rule))
            })
            .collect();

        info!(
            "Evaluating {} rule(s) on {} entities ({} pairs)",
            self.registry.len(),
            graph.len(),
            pairs.len()
        );

        let records = if self.options.debug {
            pairs
                .iter()
                .map(|(evaluable, rule)| evaluate_strict(graph, evaluable, rule))
                .collect::<Result<Vec<_>, _>>()?
        } else if self.options.parallel {
            pairs
                .par_iter()
                .map(|(evaluable, rule)| evaluate_isolated(graph, evaluable, rule))
                .collect()
        } else {
            pairs
                .iter()
                .map(|(evaluable, rule)| evaluate_isolated(graph, evaluable, rule))
                .collect()
        };

        Ok(Evaluation::new(records))
    }
}

fn record(evaluable: &Evaluable, rule: &ConfiguredRule, outcome: RuleOutcome) -> EvaluationRecord {
    EvaluationRecord {
        unique_id: evaluable.unique_id.clone(),
        rule: rule.qualified_id(),
        severity: rule.severity,
        outcome,
    }
}

fn from_verdict(verdict: Verdict) -> RuleOutcome {
    match verdict {
        Verdict::Pass => RuleOutcome::Pass,
        Verdict::Violation(message) => RuleOutcome::violation(message),
        Verdict::NotApplicable(reason) => RuleOutcome::skipped(reason),
    }
}

fn filtered_out(evaluable: &Evaluable, rule: &ConfiguredRule) -> Option<RuleOutcome> {
    rule.rejecting_filter(evaluable)
        .map(|filter| RuleOutcome::skipped(format!("excluded by rule filter '{}'", filter.name)))
}

fn evaluate_isolated(graph: &ProjectGraph, evaluable: &Evaluable, rule: &ConfiguredRule) -> EvaluationRecord {
    if let Some(outcome) = filtered_out(evaluable, rule) {
        return record(evaluable, rule, outcome);
    }

    let ctx = RuleContext::new(graph, &rule.params);
    let result = catch_unwind(AssertUnwindSafe(|| rule.descriptor.check(evaluable, &ctx)));

    let outcome = match result {
        Ok(Ok(verdict)) => from_verdict(verdict),
        Ok(Err(e)) => {
            error!("Rule {} failed on {}: {}", rule.qualified_id(), evaluable.unique_id, e);
            RuleOutcome::error(e.to_string())
        }
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!("Rule {} panicked on {}: {}", rule.qualified_id(), evaluable.unique_id, panic_msg);
            RuleOutcome::error(format!("Panic: {}", panic_msg))
        }
    };

    record(evaluable, rule, outcome)
}

fn evaluate_strict(
    graph: &ProjectGraph,
    evaluable: &Evaluable,
    rule: &ConfiguredRule,
) -> Result<EvaluationRecord, EvaluationAbort> {
    if let Some(outcome) = filtered_out(evaluable, rule) {
        return Ok(record(evaluable, rule, outcome));
    }

    debug!("Evaluating {} on {}", rule.qualified_id(), evaluable.unique_id);
    let ctx = RuleContext::new(graph, &rule.params);
    let verdict = rule
        .descriptor
        .check(evaluable, &ctx)
        .map_err(|cause| EvaluationAbort {
            rule: rule.qualified_id(),
            unique_id: evaluable.unique_id.clone(),
            cause,
        })?;

    Ok(record(evaluable, rule, from_verdict(verdict)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleDescriptor, RuleFilter, RulePack};
    use dbtgrade_dbt::{Manifest, ResourceKind};
    use serde_json::json;

    fn graph() -> ProjectGraph {
        let model = |name: &str, materialized: &str| {
            json!({
                "unique_id": format!("model.p.{}", name),
                "name": name,
                "resource_type": "model",
                "package_name": "p",
                "config": {"materialized": materialized}
            })
        };
        let manifest = Manifest::from_str(
            &json!({
                "metadata": {"project_name": "p"},
                "nodes": {
                    "model.p.a": model("a", "table"),
                    "model.p.b": model("b", "ephemeral")
                },
                "sources": {
                    "source.p.raw.s": {
                        "unique_id": "source.p.raw.s",
                        "name": "s",
                        "resource_type": "source",
                        "package_name": "p",
                        "source_name": "raw"
                    }
                }
            })
            .to_string(),
        )
        .unwrap();
        ProjectGraph::from_manifest(manifest)
    }

    fn registry(config: &Config) -> RuleRegistry {
        let pack = RulePack::new("t")
            .rule(RuleDescriptor::new("passes", "", Severity::Low, &ResourceKind::ALL, |_, _| {
                Ok(Verdict::Pass)
            }))
            .rule(RuleDescriptor::new("fails_on_a", "", Severity::Medium, &[ResourceKind::Model], |e, _| {
                Ok(Verdict::check(e.name != "a", "a is bad"))
            }))
            .rule(RuleDescriptor::new("errors", "", Severity::High, &[ResourceKind::Model], |_, _| {
                Err(RuleError::Failed("boom".to_string()))
            }))
            .rule(RuleDescriptor::new("panics", "", Severity::High, &[ResourceKind::Source], |_, _| {
                panic!("rule bug")
            }))
            .filter(RuleFilter::new("no_ephemeral", "", &[ResourceKind::Model], |e| {
                e.materialized() != Some("ephemeral")
            }));

        RuleRegistry::builder().add_pack(pack).unwrap().build(config).unwrap()
    }

    fn outcomes(evaluation: &Evaluation) -> Vec<(String, String, &'static str)> {
        evaluation
            .records()
            .iter()
            .map(|r| (r.unique_id.clone(), r.rule.clone(), r.outcome.label()))
            .collect()
    }

    #[test]
    fn failures_are_isolated() {
        let graph = graph();
        let registry = registry(&Config::default());
        let options = EvaluationOptions { parallel: false, debug: false };

        let evaluation = Evaluator::new(&registry, options).evaluate(&graph).unwrap();

        let expected: Vec<(String, String, &str)> = [
            ("model.p.a", "t::passes", "OK"),
            ("model.p.a", "t::fails_on_a", "WARN"),
            ("model.p.a", "t::errors", "ERR"),
            ("model.p.b", "t::passes", "OK"),
            ("model.p.b", "t::fails_on_a", "OK"),
            ("model.p.b", "t::errors", "ERR"),
            ("source.p.raw.s", "t::passes", "OK"),
            ("source.p.raw.s", "t::panics", "ERR"),
        ]
        .into_iter()
        .map(|(id, rule, label)| (id.to_string(), rule.to_string(), label))
        .collect();
        assert_eq!(outcomes(&evaluation), expected);

        let panic = evaluation.for_item("source.p.raw.s").last().unwrap();
        assert_eq!(panic.outcome, RuleOutcome::error("Panic: rule bug"));
        assert_eq!(panic.severity, Severity::High);
    }

    #[test]
    fn parallel_order_matches_sequential() {
        let graph = graph();
        let registry = registry(&Config::default());

        let sequential = Evaluator::new(&registry, EvaluationOptions { parallel: false, debug: false })
            .evaluate(&graph)
            .unwrap();
        let parallel = Evaluator::new(&registry, EvaluationOptions::default())
            .evaluate(&graph)
            .unwrap();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn filters_record_skips() {
        let graph = graph();
        let mut config = Config::default();
        config.rules.insert(
            "fails_on_a".to_string(),
            dbtgrade_core::RuleConfig {
                rule_filter_names: vec!["no_ephemeral".to_string()],
                ..Default::default()
            },
        );
        let registry = registry(&config);

        let evaluation = Evaluator::new(&registry, EvaluationOptions::default())
            .evaluate(&graph)
            .unwrap();

        let b_outcome = evaluation
            .for_item("model.p.b")
            .find(|r| r.rule == "t::fails_on_a")
            .unwrap();
        assert_eq!(
            b_outcome.outcome,
            RuleOutcome::skipped("excluded by rule filter 'no_ephemeral'")
        );
    }

    #[test]
    fn debug_mode_aborts_on_first_error() {
        let graph = graph();
        let mut config = Config::default();
        config.disabled_rules = vec!["panics".to_string()];
        let registry = registry(&config);

        let result = Evaluator::new(&registry, EvaluationOptions { parallel: true, debug: true }).evaluate(&graph);

        assert_eq!(
            result,
            Err(EvaluationAbort {
                rule: "t::errors".to_string(),
                unique_id: "model.p.a".to_string(),
                cause: RuleError::Failed("boom".to_string()),
            })
        );
    }

    #[test]
    fn item_records_match_a_full_scan() {
        let graph = graph();
        let registry = registry(&Config::default());
        let evaluation = Evaluator::new(&registry, EvaluationOptions::default())
            .evaluate(&graph)
            .unwrap();

        for unique_id in ["model.p.a", "model.p.b", "source.p.raw.s", "model.p.missing"] {
            let grouped: Vec<_> = evaluation.for_item(unique_id).collect();
            let scanned: Vec<_> = evaluation
                .records()
                .iter()
                .filter(|r| r.unique_id == unique_id)
                .collect();
            assert_eq!(grouped, scanned);
        }
        assert_eq!(evaluation.for_item("model.p.a").count(), 3);
        assert_eq!(evaluation.for_item("model.p.missing").count(), 0);
    }

    #[test]
    fn empty_graph_has_no_records() {
        let graph = ProjectGraph::default();
        let registry = registry(&Config::default());
        let evaluation = Evaluator::new(&registry, EvaluationOptions::default())
            .evaluate(&graph)
            .unwrap();
        assert!(evaluation.is_empty());
    }
}
