//! Rules for sources, snapshots and exposures

use dbtgrade_core::Severity;
use dbtgrade_dbt::{Evaluable, EvaluableKind, ResourceKind};

use crate::rule::{RuleContext, RuleDescriptor, RuleError, RulePack, Verdict};

pub fn pack() -> RulePack {
    RulePack::new(module_path!())
        .rule(RuleDescriptor::new(
            "source_has_freshness",
            "A source should define a freshness threshold.",
            Severity::Low,
            &[ResourceKind::Source],
            source_has_freshness,
        ))
        .rule(RuleDescriptor::new(
            "snapshot_has_unique_key",
            "A snapshot should define a unique key.",
            Severity::High,
            &[ResourceKind::Snapshot],
            snapshot_has_unique_key,
        ))
        .rule(RuleDescriptor::new(
            "exposure_has_owner",
            "An exposure should have an owner with a name or an email.",
            Severity::Medium,
            &[ResourceKind::Exposure],
            exposure_has_owner,
        ))
        .rule(RuleDescriptor::new(
            "exposure_parents_have_description",
            "Everything an exposure depends on should be described.",
            Severity::Low,
            &[ResourceKind::Exposure],
            exposure_parents_have_description,
        ))
}

fn source_has_freshness(evaluable: &Evaluable, _ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    let EvaluableKind::Source(details) = &evaluable.kind else {
        return Ok(Verdict::not_applicable("not a source"));
    };

    let configured = details
        .freshness
        .as_ref()
        .is_some_and(|freshness| freshness.is_configured());
    Ok(Verdict::check(configured, "Source has no freshness threshold."))
}

fn snapshot_has_unique_key(evaluable: &Evaluable, _ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    let EvaluableKind::Snapshot(details) = &evaluable.kind else {
        return Ok(Verdict::not_applicable("not a snapshot"));
    };

    let has_key = details
        .unique_key
        .as_ref()
        .is_some_and(|keys| keys.iter().any(|key| !key.trim().is_empty()));
    Ok(Verdict::check(has_key, "Snapshot has no unique key."))
}

fn exposure_has_owner(evaluable: &Evaluable, _ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    let EvaluableKind::Exposure(details) = &evaluable.kind else {
        return Ok(Verdict::not_applicable("not an exposure"));
    };

    let named = [&details.owner.name, &details.owner.email]
        .into_iter()
        .flatten()
        .any(|value| !value.trim().is_empty());
    Ok(Verdict::check(named, "Exposure lacks an owner."))
}

fn exposure_parents_have_description(evaluable: &Evaluable, ctx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
    if evaluable.parents.is_empty() {
        return Ok(Verdict::not_applicable("exposure has no project dependencies"));
    }

    let undocumented: Vec<&str> = ctx
        .graph
        .parents_of(evaluable)
        .filter(|parent| parent.description.trim().is_empty())
        .map(|parent| parent.name.as_str())
        .collect();

    Ok(Verdict::check(
        undocumented.is_empty(),
        format!("Exposure depends on undocumented entities: {}.", undocumented.join(", ")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::*;
    use dbtgrade_dbt::{Manifest, ProjectGraph};
    use serde_json::json;

    fn rule(name: &str) -> RuleDescriptor {
        pack().rules.into_iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn freshness() {
        let rule = rule("source_has_freshness");
        let fresh = source(json!({"freshness": {"warn_after": {"count": 1, "period": "day"}}}));
        let unset = source(json!({"freshness": {"warn_after": {"count": null, "period": null}}}));

        assert_eq!(run(&rule, &fresh), Ok(Verdict::Pass));
        assert!(matches!(run(&rule, &unset), Ok(Verdict::Violation(_))));
        assert!(matches!(run(&rule, &source(json!({"freshness": null}))), Ok(Verdict::Violation(_))));
    }

    #[test]
    fn unique_key() {
        let rule = rule("snapshot_has_unique_key");
        assert_eq!(run(&rule, &snapshot(json!({"config": {"unique_key": "id"}}))), Ok(Verdict::Pass));
        assert_eq!(
            run(&rule, &snapshot(json!({"config": {}}))),
            Ok(Verdict::violation("Snapshot has no unique key."))
        );
    }

    #[test]
    fn exposure_owner() {
        let rule = rule("exposure_has_owner");
        assert_eq!(run(&rule, &exposure(json!({"owner": {"email": "bi@example.com"}}))), Ok(Verdict::Pass));
        assert!(matches!(run(&rule, &exposure(json!({"owner": {"name": ""}}))), Ok(Verdict::Violation(_))));
        assert!(matches!(run(&rule, &exposure(json!({}))), Ok(Verdict::Violation(_))));
    }

    #[test]
    fn exposure_parents_resolve_through_graph() {
        let manifest = Manifest::from_str(
            &json!({
                "metadata": {"project_name": "p"},
                "nodes": {
                    "model.p.documented": {
                        "unique_id": "model.p.documented",
                        "name": "documented",
                        "resource_type": "model",
                        "package_name": "p",
                        "description": "Documented."
                    },
                    "model.p.bare": {
                        "unique_id": "model.p.bare",
                        "name": "bare",
                        "resource_type": "model",
                        "package_name": "p"
                    }
                },
                "exposures": {
                    "exposure.p.kpis": {
                        "unique_id": "exposure.p.kpis",
                        "name": "kpis",
                        "resource_type": "exposure",
                        "package_name": "p",
                        "depends_on": {"nodes": ["model.p.documented", "model.p.bare"]}
                    }
                }
            })
            .to_string(),
        )
        .unwrap();
        let graph = ProjectGraph::load(manifest, &["kpis".to_string()], None).unwrap();
        let exposure = graph.get("exposure.p.kpis").unwrap();
        let params = dbtgrade_dbt::JsonMap::new();

        let verdict = rule("exposure_parents_have_description")
            .check(exposure, &RuleContext::new(&graph, &params));
        assert_eq!(
            verdict,
            Ok(Verdict::violation("Exposure depends on undocumented entities: bare."))
        );
    }
}
