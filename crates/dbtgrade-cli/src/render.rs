//! Terminal and markdown output

use colored::Colorize;
use dbtgrade_core::{RuleOutcome, Score};
use dbtgrade_dbt::ProjectGraph;
use dbtgrade_engine::{Evaluation, EvaluationRecord, ItemScore, RuleRegistry, ScoreCard};

/// What the plain format shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Show {
    /// Every item and every rule
    All,

    /// Failing rules of failing items
    FailingItems,

    /// Failing rules of every item
    FailingRules,
}

/// Format of the rule catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CatalogFormat {
    Terminal,
    Markdown,
}

const INDENT: &str = "    ";

fn badge(score: &Score) -> String {
    if score.badge.icon.is_empty() {
        format!("[{}]", score.badge.label)
    } else {
        score.badge.icon.clone()
    }
}

/// An item fails when it is rated and either below the item threshold,
/// or, without a threshold, has any failing rule.
fn item_fails(item: &ItemScore, records: &[&EvaluationRecord], threshold: Option<f64>) -> bool {
    item.is_rated()
        && match threshold {
            Some(threshold) => item.score.value < threshold,
            None => records.iter().any(|record| record.outcome.is_failure()),
        }
}

fn outcome_line(record: &EvaluationRecord) -> String {
    match &record.outcome {
        RuleOutcome::Pass => format!("{}{} {}", INDENT, "OK  ".green(), record.rule),
        RuleOutcome::Violation { message } => format!(
            "{}{} ({}) {}: {}",
            INDENT,
            "WARN".yellow(),
            record.severity,
            record.rule,
            message
        ),
        RuleOutcome::Skipped { reason } => {
            format!("{}{} {}: {}", INDENT, "SKIP".dimmed(), record.rule, reason)
        }
        RuleOutcome::EvaluationError { cause } => format!(
            "{}{} ({}) {}: {}",
            INDENT,
            "ERR ".red(),
            record.severity,
            record.rule,
            cause
        ),
    }
}

/// One `\n`-terminated line per entry
fn join_lines(lines: Vec<String>) -> String {
    lines.into_iter().map(|line| line + "\n").collect()
}

/// Plain report: one block per item, then the project score
pub fn render_plain(
    graph: &ProjectGraph,
    evaluation: &Evaluation,
    card: &ScoreCard,
    show: Show,
    fail_any_item_under: Option<f64>,
) -> String {
    let mut lines = Vec::new();

    for (unique_id, item) in &card.items {
        let Some(evaluable) = graph.get(unique_id) else {
            continue;
        };
        let records: Vec<&EvaluationRecord> = evaluation.for_item(unique_id).collect();

        if show == Show::FailingItems && !item_fails(item, &records, fail_any_item_under) {
            continue;
        }

        let rating = if item.is_rated() {
            format!("score: {}", item.score)
        } else {
            "unrated".to_string()
        };
        lines.push(format!(
            "{} {} {} ({})",
            badge(&item.score),
            evaluable.resource_kind(),
            evaluable.selector_name().bold(),
            rating
        ));

        lines.extend(
            records
                .into_iter()
                .filter(|record| show == Show::All || record.outcome.is_failure())
                .map(outcome_line),
        );
        lines.push(String::new());
    }

    lines.push(format!(
        "{} {} {}",
        "Project score:".bold(),
        badge(&card.project),
        card.project.to_string().bold()
    ));

    join_lines(lines)
}

/// Messages for crossed failure thresholds, empty when the run passes
pub fn render_failures(
    graph: &ProjectGraph,
    card: &ScoreCard,
    fail_project_under: Option<f64>,
    fail_any_item_under: Option<f64>,
) -> String {
    let mut lines = Vec::new();

    if let Some(threshold) = fail_project_under.filter(|_| card.project_fails(fail_project_under)) {
        lines.push(format!(
            "{} project score too low: {} < {}",
            "Error:".red().bold(),
            card.project,
            threshold
        ));
    }

    let failing: Vec<_> = card.failing_items(fail_any_item_under).collect();
    if let (Some(threshold), false) = (fail_any_item_under, failing.is_empty()) {
        lines.push(format!(
            "{} item score too low, fail_any_item_under: {}",
            "Error:".red().bold(),
            threshold
        ));
        for (unique_id, item) in failing {
            let name = graph
                .get(unique_id)
                .map(|evaluable| format!("{} {}", evaluable.resource_kind(), evaluable.selector_name()))
                .unwrap_or_else(|| unique_id.clone());
            lines.push(format!("{}{}: {}", INDENT, name, item.score));
        }
    }

    join_lines(lines)
}

/// Rule catalog, in registration order
pub fn render_catalog(registry: &RuleRegistry, format: CatalogFormat, title: Option<&str>) -> String {
    let mut lines = Vec::new();

    if format == CatalogFormat::Markdown {
        lines.push(format!("# {}", title.unwrap_or("dbtgrade rules")));
        lines.push(String::new());
    }

    for rule in registry.rules() {
        let kinds = rule
            .descriptor
            .kinds
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        match format {
            CatalogFormat::Terminal => lines.extend([
                format!("{} ({}) [{}]", rule.qualified_id().bold(), rule.severity, kinds),
                format!("{}{}", INDENT, rule.descriptor.description),
                String::new(),
            ]),
            CatalogFormat::Markdown => lines.extend([
                format!("## `{}`", rule.qualified_id()),
                String::new(),
                rule.descriptor.description.clone(),
                String::new(),
                format!("- Severity: {}", rule.severity),
                format!("- Applies to: {}", kinds),
                String::new(),
            ]),
        }
    }

    join_lines(lines)
}
