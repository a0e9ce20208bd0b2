//! Scoring
//!
//! Item score = 10 × (1 − failed weight / considered weight), where the
//! weight of an outcome is the weight of its effective severity.
//! Skipped and info outcomes are left out of both sums. A failed
//! critical rule zeroes the item. Items with no applicable outcome are
//! unrated and do not count toward the project score.

use dbtgrade_core::{
    BadgeConfig, Config, ErrorPolicy, ItemReport, OutcomeEntry, ProjectSummary, Report, RuleOutcome, Score,
    Severity, SCORE_MAX,
};
use dbtgrade_dbt::ProjectGraph;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::evaluator::Evaluation;

/// Score of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemScore {
    pub score: Score,

    /// Outcomes that took part in scoring, info severity included
    pub applicable: usize,
}

impl ItemScore {
    /// Whether the item counts toward the project score
    pub fn is_rated(&self) -> bool {
        self.applicable > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contribution {
    Excluded,
    Passed,
    Failed,
}

fn contribution(outcome: &RuleOutcome, policy: ErrorPolicy) -> Contribution {
    match outcome {
        RuleOutcome::Pass => Contribution::Passed,
        RuleOutcome::Violation { .. } => Contribution::Failed,
        RuleOutcome::Skipped { .. } => Contribution::Excluded,
        RuleOutcome::EvaluationError { .. } => match policy {
            ErrorPolicy::AsViolation => Contribution::Failed,
            ErrorPolicy::Ignore => Contribution::Excluded,
        },
    }
}

/// Raw score of a set of outcomes, `None` when none is applicable
pub fn score_outcomes<'a, I>(outcomes: I, policy: ErrorPolicy) -> (Option<f64>, usize)
where
    I: IntoIterator<Item = (Severity, &'a RuleOutcome)>,
{
    let mut applicable = 0;
    let mut considered: u32 = 0;
    let mut failed: u32 = 0;
    let mut critical_failure = false;

    for (severity, outcome) in outcomes {
        let contribution = contribution(outcome, policy);
        if contribution == Contribution::Excluded {
            continue;
        }

        applicable += 1;
        considered += severity.weight();
        if contribution == Contribution::Failed {
            failed += severity.weight();
            critical_failure |= severity == Severity::Critical;
        }
    }

    let value = if applicable == 0 {
        None
    } else if critical_failure {
        Some(0.0)
    } else if considered == 0 {
        Some(SCORE_MAX)
    } else {
        Some(SCORE_MAX * (1.0 - f64::from(failed) / f64::from(considered)))
    };

    (value, applicable)
}

/// Scores of every selected entity plus the project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// Item scores by unique id, in evaluation order
    pub items: IndexMap<String, ItemScore>,

    pub project: Score,
}

impl ScoreCard {
    pub fn compute(
        graph: &ProjectGraph,
        evaluation: &Evaluation,
        badges: &BadgeConfig,
        policy: ErrorPolicy,
    ) -> Self {
        let mut items = IndexMap::new();

        for evaluable in graph.evaluables() {
            let outcomes = evaluation
                .for_item(&evaluable.unique_id)
                .map(|record| (record.severity, &record.outcome));
            let (value, applicable) = score_outcomes(outcomes, policy);

            items.insert(
                evaluable.unique_id.clone(),
                ItemScore {
                    score: badges.score(value.unwrap_or(SCORE_MAX)),
                    applicable,
                },
            );
        }

        let rated: Vec<f64> = items
            .values()
            .filter(|item| item.is_rated())
            .map(|item| item.score.value)
            .collect();
        let project_value = if rated.is_empty() {
            SCORE_MAX
        } else {
            rated.iter().sum::<f64>() / rated.len() as f64
        };

        Self {
            items,
            project: badges.score(project_value),
        }
    }

    /// Compute with the badge table and error policy of `config`
    pub fn from_config(graph: &ProjectGraph, evaluation: &Evaluation, config: &Config) -> Self {
        Self::compute(graph, evaluation, &config.badges, config.error_policy)
    }

    pub fn get(&self, unique_id: &str) -> Option<&ItemScore> {
        self.items.get(unique_id)
    }

    pub fn rated_items(&self) -> usize {
        self.items.values().filter(|item| item.is_rated()).count()
    }

    /// Whether the project score is below `threshold`
    pub fn project_fails(&self, threshold: Option<f64>) -> bool {
        threshold.is_some_and(|threshold| self.project.value < threshold)
    }

    /// Rated items scoring below `threshold`
    pub fn failing_items(&self, threshold: Option<f64>) -> impl Iterator<Item = (&String, &ItemScore)> {
        self.items.iter().filter(move |(_, item)| {
            item.is_rated() && threshold.is_some_and(|threshold| item.score.value < threshold)
        })
    }

    /// Whether either failure threshold is crossed
    pub fn fails(&self, fail_project_under: Option<f64>, fail_any_item_under: Option<f64>) -> bool {
        self.project_fails(fail_project_under) || self.failing_items(fail_any_item_under).next().is_some()
    }

    /// Build the JSON report
    pub fn to_report(&self, graph: &ProjectGraph, evaluation: &Evaluation) -> Report {
        let items: Vec<ItemReport> = self
            .items
            .iter()
            .filter_map(|(unique_id, item)| {
                let evaluable = graph.get(unique_id)?;
                let outcomes = evaluation
                    .for_item(unique_id)
                    .map(|record| OutcomeEntry {
                        rule: record.rule.clone(),
                        severity: record.severity,
                        outcome: record.outcome.clone(),
                    })
                    .collect();

                Some(ItemReport {
                    unique_id: unique_id.clone(),
                    name: evaluable.selector_name(),
                    kind: evaluable.resource_kind().to_string(),
                    score: item.score.clone(),
                    rated: item.is_rated(),
                    outcomes,
                })
            })
            .collect();

        let failures = items.iter().map(|item| item.failures().count()).sum();

        Report::new(
            ProjectSummary {
                name: graph.project_name().to_string(),
                score: self.project.clone(),
                items: items.len(),
                rated_items: self.rated_items(),
                failures,
            },
            items,
        )
    }
}
