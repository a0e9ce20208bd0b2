//! dbtgrade engine - rule registry, evaluation and scoring
//!
//! This crate implements:
//! - Rule and rule filter definitions, grouped in packs
//! - The rule registry (namespaces, selection, per-rule config)
//! - Parallel, fault-isolated rule evaluation
//! - Item and project scoring
//! - The built-in rules

pub mod rule;
pub mod registry;
pub mod evaluator;
pub mod scoring;
pub mod rules;

pub use rule::{RuleContext, RuleDescriptor, RuleError, RuleFilter, RulePack, Verdict};
pub use registry::{ConfiguredRule, RegistryError, RuleRegistry, RuleRegistryBuilder};
pub use evaluator::{Evaluation, EvaluationAbort, EvaluationOptions, EvaluationRecord, Evaluator};
pub use scoring::{score_outcomes, ItemScore, ScoreCard};
