//! Documentation, ownership and testing rules

use dbtgrade_core::Severity;
use dbtgrade_dbt::{normalize_identifier, Evaluable, EvaluableKind, ResourceKind};

use super::{kind_label, COLUMN_KINDS};
use crate::rule::{RuleContext, RuleDescriptor, RuleError, RuleFilter, RulePack, Verdict};

/// Default `max_lines` of `sql_has_reasonable_number_of_lines`
pub const DEFAULT_MAX_LINES: u64 = 200;

/// Default `accepted_uniqueness_tests` of `has_uniqueness_test`
pub const DEFAULT_UNIQUENESS_TESTS: [&str; 3] = [
    "expect_compound_columns_to_be_unique",
    "dbt_utils.unique_combination_of_columns",
    "unique",
];

pub fn pack() -> RulePack {
    RulePack::new(module_path!())
        .rule(RuleDescriptor::new(
            "has_description",
            "An entity should have a description.",
            Severity::Medium,
            &ResourceKind::ALL,
            has_description,
        ))
        .rule(RuleDescriptor::new(
            "columns_have_description",
            "All columns of an entity should have a description.",
            Severity::Medium,
            &COLUMN_KINDS,
            columns_have_description,
        ))
        .rule(RuleDescriptor::new(
            "has_owner",
            "A model should have an owner defined in `meta.owner`.",
            Severity::Medium,
            &[ResourceKind::Model],
            has_owner,
        ))
        .rule(RuleDescriptor::new(
            "sql_has_reasonable_number_of_lines",
            "The SQL query of a model should not be too long.",
            Severity::Medium,
            &[ResourceKind::Model],
            sql_has_reasonable_number_of_lines,
        ))
        .rule(RuleDescriptor::new(
            "has_example_sql",
            "The documentation of a model should have an example query.",
            Severity::Low,
            &[ResourceKind::Model],
            has_example_sql,
        ))
        .rule(RuleDescriptor::new(
            "single_column_uniqueness_at_column_level",
            "Single-column uniqueness tests should be defined at the column level.",
            Severity::Low,
            &[ResourceKind::Model],
            single_column_uniqueness_at_column_level,
        ))
        .rule(RuleDescriptor::new(
            "has_uniqueness_test",
            "A non-ephemeral model should have a uniqueness test.",
            Severity::Low,
            &[ResourceKind::Model],
            has_uniqueness_test,
        ))
        .rule(RuleDescriptor::new(
            "has_tests",
            "An entity should have at least one data test.",
            Severity::Low,
            &COLUMN_KINDS,
            has_tests,
        ))
        .rule(RuleDescriptor::new(
            "has_tags",
            "An entity should be tagged.",
            Severity::Info,
            &ResourceKind::ALL,
            has_tags,
        ))
        .filter(RuleFilter::new(
            "skip_ephemeral_models",
            "Skip models materialized as ephemeral.",
            &[ResourceKind::Model],
            |evaluable| evaluable.materialized() != Some("ephemeral"),
        ))
}

fn has_description(evaluable: &Evaluable, _ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    Ok(Verdict::check(
        !evaluable.description.trim().is_empty(),
        format!("{} lacks a description.", kind_label(evaluable)),
    ))
}

fn columns_have_description(evaluable: &Evaluable, _ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    let columns = evaluable.columns();
    if columns.is_empty() {
        return Ok(Verdict::not_applicable("no columns are documented"));
    }

    let undocumented: Vec<&str> = columns
        .iter()
        .filter(|column| column.description.trim().is_empty())
        .map(|column| column.name.as_str())
        .collect();

    Ok(Verdict::check(
        undocumented.is_empty(),
        format!("Columns lack a description: {}.", undocumented.join(", ")),
    ))
}

fn has_owner(evaluable: &Evaluable, _ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    Ok(Verdict::check(
        evaluable.meta_str("owner").is_some(),
        "Model lacks an owner.",
    ))
}

fn sql_has_reasonable_number_of_lines(evaluable: &Evaluable, ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    let max_lines = ctx.param_u64("max_lines", DEFAULT_MAX_LINES)?;
    let EvaluableKind::Model(details) = &evaluable.kind else {
        return Ok(Verdict::not_applicable("not a model"));
    };

    let lines = details.raw_code.lines().count() as u64;
    Ok(Verdict::check(
        lines <= max_lines,
        format!("SQL query too long: {} lines (> {}).", lines, max_lines),
    ))
}

fn has_example_sql(evaluable: &Evaluable, _ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    Ok(Verdict::check(
        evaluable.description.contains("```sql"),
        "The model description does not include an example SQL query.",
    ))
}

fn single_column_uniqueness_at_column_level(
    evaluable: &Evaluable,
    _ctx: &RuleContext<'_>,
) -> Result<Verdict, RuleError> {
    let misplaced = evaluable.tests.iter().find(|test| {
        test.test_type == "unique"
            && test
                .kwargs
                .get("column_name")
                .and_then(|value| value.as_str())
                .map(normalize_identifier)
                .is_some_and(|column| !column.is_empty() && column.chars().all(|c| c.is_alphanumeric() || c == '_'))
    });

    Ok(match misplaced {
        Some(test) => Verdict::violation(format!(
            "Uniqueness test '{}' covers a single column but is defined at the model level.",
            test.name
        )),
        None => Verdict::Pass,
    })
}

fn has_uniqueness_test(evaluable: &Evaluable, ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    let accepted = ctx.param_str_list("accepted_uniqueness_tests", &DEFAULT_UNIQUENESS_TESTS)?;

    if evaluable.materialized() == Some("ephemeral") {
        return Ok(Verdict::not_applicable("ephemeral models are not materialized"));
    }

    let found = evaluable.all_tests().any(|test| {
        accepted.iter().any(|name| {
            name == &test.test_type
                || name
                    .rsplit_once('.')
                    .is_some_and(|(_, bare)| bare == test.test_type)
        })
    });

    Ok(Verdict::check(found, "There is no uniqueness test defined and documented."))
}

fn has_tests(evaluable: &Evaluable, _ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    Ok(Verdict::check(
        evaluable.all_tests().next().is_some(),
        format!("{} has no tests.", kind_label(evaluable)),
    ))
}

fn has_tags(evaluable: &Evaluable, _ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    Ok(Verdict::check(
        !evaluable.tags.is_empty(),
        format!("{} has no tags.", kind_label(evaluable)),
    ))
}
