//! Project graph construction
//!
//! The graph owns every entity of the project in per-kind arenas keyed
//! by `unique_id`. Edges are id lists resolved through the arena, and
//! selection only narrows which entities are iterated, so edges to
//! unselected neighbors still resolve.

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::manifest::{LoadError, Manifest};
use crate::model::{Evaluable, ResourceKind, Test};
use crate::selection::{resolve_selection, SelectionResolver};

/// Notice for a run with no selected entity
pub const NOTHING_TO_EVALUATE: &str = "Nothing to evaluate!";

/// Typed, cross-referenced entities of one dbt project
#[derive(Debug, Clone, Default)]
pub struct ProjectGraph {
    project_name: String,
    models: IndexMap<String, Evaluable>,
    sources: IndexMap<String, Evaluable>,
    snapshots: IndexMap<String, Evaluable>,
    seeds: IndexMap<String, Evaluable>,
    exposures: IndexMap<String, Evaluable>,

    /// Selected unique ids; `None` selects everything
    selected: Option<HashSet<String>>,
}

impl ProjectGraph {
    /// Build the graph of the manifest's own project, without selection
    pub fn from_manifest(manifest: Manifest) -> Self {
        let project_name = manifest.project_name().to_string();
        let mut graph = Self {
            project_name,
            ..Self::default()
        };

        let mut tests = index_tests(&manifest, &graph.project_name);

        for (unique_id, node) in manifest.nodes {
            if node.package_name != graph.project_name {
                continue;
            }

            let node_tests = tests.shift_remove(&unique_id).unwrap_or_default();
            match node.resource_type.as_str() {
                "model" => graph.insert(Evaluable::model(node, node_tests)),
                "snapshot" => graph.insert(Evaluable::snapshot(node, node_tests)),
                "seed" => graph.insert(Evaluable::seed(node, node_tests)),
                _ => {}
            }
        }

        for (unique_id, source) in manifest.sources {
            if source.package_name != graph.project_name || source.resource_type != "source" {
                continue;
            }
            let source_tests = tests.shift_remove(&unique_id).unwrap_or_default();
            graph.insert(Evaluable::source(source, source_tests));
        }

        for exposure in manifest.exposures.into_values() {
            if exposure.package_name != graph.project_name || exposure.resource_type != "exposure" {
                continue;
            }
            graph.insert(Evaluable::exposure(exposure));
        }

        for (target, orphaned) in &tests {
            tracing::debug!(
                "Dropping {} test(s) attached to '{}', which is not a project entity",
                orphaned.len(),
                target
            );
        }

        graph.resolve_edges();

        tracing::info!(
            "Loaded project '{}': {} models, {} sources, {} snapshots, {} seeds, {} exposures",
            graph.project_name,
            graph.models.len(),
            graph.sources.len(),
            graph.snapshots.len(),
            graph.seeds.len(),
            graph.exposures.len()
        );

        graph
    }

    /// Build the graph and apply a node selection
    ///
    /// An empty `select` keeps every entity.
    pub fn load(
        manifest: Manifest,
        select: &[String],
        resolver: Option<&dyn SelectionResolver>,
    ) -> Result<Self, LoadError> {
        let mut graph = Self::from_manifest(manifest);

        if !select.is_empty() {
            let names = resolve_selection(select, resolver)?;
            graph.retain_selected(&names);
        }

        if let Some(notice) = graph.empty_notice() {
            tracing::info!("{}", notice);
        }

        Ok(graph)
    }

    fn insert(&mut self, evaluable: Evaluable) {
        let kind = evaluable.resource_kind();
        if let Some(existing) = self.get(&evaluable.unique_id) {
            tracing::warn!(
                "Duplicate unique_id '{}' ({} and {}); lookups prefer {}",
                evaluable.unique_id,
                existing.resource_kind(),
                kind,
                existing.resource_kind()
            );
        }

        let unique_id = evaluable.unique_id.clone();
        self.collection_mut(kind).insert(unique_id, evaluable);
    }

    /// Connect every entity to the resolvable entries of its `depends_on`
    fn resolve_edges(&mut self) {
        let mut edges: Vec<(ResourceKind, String, ResourceKind, String)> = Vec::new();

        for kind in ResourceKind::ALL {
            for (child_id, evaluable) in self.collection(kind) {
                for parent_id in &evaluable.depends_on {
                    match self.edge_target_kind(parent_id) {
                        Some(parent_kind) => {
                            edges.push((kind, child_id.clone(), parent_kind, parent_id.clone()))
                        }
                        None => tracing::debug!(
                            "Ignoring dependency '{}' of '{}': not a project entity",
                            parent_id,
                            child_id
                        ),
                    }
                }
            }
        }

        for (child_kind, child_id, parent_kind, parent_id) in edges {
            if let Some(child) = self.collection_mut(child_kind).get_mut(&child_id) {
                if !child.parents.contains(&parent_id) {
                    child.parents.push(parent_id.clone());
                }
            }
            if let Some(parent) = self.collection_mut(parent_kind).get_mut(&parent_id) {
                if !parent.children.contains(&child_id) {
                    parent.children.push(child_id);
                }
            }
        }
    }

    /// Kind holding `unique_id`, searching edge targets in precedence order
    fn edge_target_kind(&self, unique_id: &str) -> Option<ResourceKind> {
        ResourceKind::EDGE_TARGETS
            .into_iter()
            .find(|kind| self.collection(*kind).contains_key(unique_id))
    }

    /// Keep only entities whose selector name is in `names`
    pub fn retain_selected(&mut self, names: &HashSet<String>) {
        let selected: HashSet<String> = ResourceKind::ALL
            .into_iter()
            .flat_map(|kind| self.collection(kind).values())
            .filter(|evaluable| names.contains(&evaluable.selector_name()))
            .map(|evaluable| evaluable.unique_id.clone())
            .collect();

        tracing::debug!("Selected {} of {} entities", selected.len(), self.arena_len());
        self.selected = Some(selected);
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Whether an entity takes part in evaluation
    pub fn is_selected(&self, unique_id: &str) -> bool {
        match &self.selected {
            Some(selected) => selected.contains(unique_id),
            None => self.get(unique_id).is_some(),
        }
    }

    /// Look up any loaded entity, selected or not
    pub fn get(&self, unique_id: &str) -> Option<&Evaluable> {
        ResourceKind::ALL
            .into_iter()
            .find_map(|kind| self.collection(kind).get(unique_id))
    }

    /// Every loaded entity of a kind, selected or not
    pub fn collection(&self, kind: ResourceKind) -> &IndexMap<String, Evaluable> {
        match kind {
            ResourceKind::Model => &self.models,
            ResourceKind::Source => &self.sources,
            ResourceKind::Snapshot => &self.snapshots,
            ResourceKind::Seed => &self.seeds,
            ResourceKind::Exposure => &self.exposures,
        }
    }

    fn collection_mut(&mut self, kind: ResourceKind) -> &mut IndexMap<String, Evaluable> {
        match kind {
            ResourceKind::Model => &mut self.models,
            ResourceKind::Source => &mut self.sources,
            ResourceKind::Snapshot => &mut self.snapshots,
            ResourceKind::Seed => &mut self.seeds,
            ResourceKind::Exposure => &mut self.exposures,
        }
    }

    /// Selected entities of a kind, in manifest order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Evaluable> + '_ {
        self.collection(kind)
            .values()
            .filter(move |evaluable| self.is_selected(&evaluable.unique_id))
    }

    pub fn models(&self) -> impl Iterator<Item = &Evaluable> + '_ {
        self.of_kind(ResourceKind::Model)
    }

    pub fn sources(&self) -> impl Iterator<Item = &Evaluable> + '_ {
        self.of_kind(ResourceKind::Source)
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Evaluable> + '_ {
        self.of_kind(ResourceKind::Snapshot)
    }

    pub fn seeds(&self) -> impl Iterator<Item = &Evaluable> + '_ {
        self.of_kind(ResourceKind::Seed)
    }

    pub fn exposures(&self) -> impl Iterator<Item = &Evaluable> + '_ {
        self.of_kind(ResourceKind::Exposure)
    }

    /// All selected entities: models, sources, snapshots, seeds, exposures
    pub fn evaluables(&self) -> impl Iterator<Item = &Evaluable> + '_ {
        ResourceKind::ALL
            .into_iter()
            .flat_map(move |kind| self.of_kind(kind))
    }

    /// Number of selected entities
    pub fn len(&self) -> usize {
        self.evaluables().count()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluables().next().is_none()
    }

    /// `Some` notice when nothing is selected for evaluation
    pub fn empty_notice(&self) -> Option<&'static str> {
        self.is_empty().then_some(NOTHING_TO_EVALUATE)
    }

    fn arena_len(&self) -> usize {
        ResourceKind::ALL
            .into_iter()
            .map(|kind| self.collection(kind).len())
            .sum()
    }

    /// Direct upstream entities
    pub fn parents_of<'a>(&'a self, evaluable: &'a Evaluable) -> impl Iterator<Item = &'a Evaluable> + 'a {
        evaluable.parents.iter().filter_map(move |id| self.get(id))
    }

    /// Direct downstream entities
    pub fn children_of<'a>(&'a self, evaluable: &'a Evaluable) -> impl Iterator<Item = &'a Evaluable> + 'a {
        evaluable.children.iter().filter_map(move |id| self.get(id))
    }
}

/// Group the project's test records by the entity they belong to
fn index_tests(manifest: &Manifest, project_name: &str) -> IndexMap<String, Vec<Test>> {
    let mut index: IndexMap<String, Vec<Test>> = IndexMap::new();

    for node in manifest.nodes_of_type("test") {
        if node.package_name != project_name {
            continue;
        }

        let target = match (&node.attached_node, node.depends_on.nodes.as_slice()) {
            (Some(attached), _) => attached.clone(),
            (None, [single]) => single.clone(),
            (None, deps) => {
                tracing::debug!(
                    "Dropping test '{}': cannot attach it ({} dependencies)",
                    node.unique_id,
                    deps.len()
                );
                continue;
            }
        };

        index.entry(target).or_default().push(Test::from_node(node));
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: serde_json::Value) -> Manifest {
        Manifest::from_str(&value.to_string()).unwrap()
    }

    fn model(id: &str, package: &str, deps: &[&str]) -> serde_json::Value {
        let name = id.rsplit('.').next().unwrap();
        json!({
            "unique_id": id,
            "name": name,
            "resource_type": "model",
            "package_name": package,
            "depends_on": {"nodes": deps}
        })
    }

    fn ids<'a>(items: impl Iterator<Item = &'a Evaluable>) -> Vec<&'a str> {
        items.map(|e| e.unique_id.as_str()).collect()
    }

    #[test]
    fn other_packages_are_filtered_out() {
        let graph = ProjectGraph::from_manifest(manifest(json!({
            "metadata": {"project_name": "p"},
            "nodes": {
                "model.p.a": model("model.p.a", "p", &["model.dep.x"]),
                "model.dep.x": model("model.dep.x", "dep", &[])
            }
        })));

        assert_eq!(ids(graph.models()), vec!["model.p.a"]);
        assert!(graph.get("model.p.a").unwrap().parents.is_empty());
    }

    #[test]
    fn edges_are_symmetric() {
        let graph = ProjectGraph::from_manifest(manifest(json!({
            "metadata": {"project_name": "p"},
            "nodes": {
                "model.p.a": model("model.p.a", "p", &[]),
                "model.p.b": model("model.p.b", "p", &["model.p.a", "macro.p.m"]),
                "model.p.c": model("model.p.c", "p", &["model.p.a", "model.p.b"])
            }
        })));

        for evaluable in graph.evaluables() {
            for parent in graph.parents_of(evaluable) {
                assert!(parent.children.contains(&evaluable.unique_id));
            }
            for child in graph.children_of(evaluable) {
                assert!(child.parents.contains(&evaluable.unique_id));
            }
        }

        let a = graph.get("model.p.a").unwrap();
        assert_eq!(a.children, vec!["model.p.b", "model.p.c"]);
        assert_eq!(graph.get("model.p.b").unwrap().depends_on.len(), 2);
        assert_eq!(graph.get("model.p.b").unwrap().parents, vec!["model.p.a"]);
    }

    #[test]
    fn exposures_are_never_parents() {
        let graph = ProjectGraph::from_manifest(manifest(json!({
            "metadata": {"project_name": "p"},
            "nodes": {
                "model.p.a": model("model.p.a", "p", &["exposure.p.e"])
            },
            "exposures": {
                "exposure.p.e": {
                    "unique_id": "exposure.p.e",
                    "name": "e",
                    "resource_type": "exposure",
                    "package_name": "p",
                    "depends_on": {"nodes": ["model.p.a"]}
                }
            }
        })));

        assert!(graph.get("model.p.a").unwrap().parents.is_empty());
        assert_eq!(graph.get("model.p.a").unwrap().children, vec!["exposure.p.e"]);
        assert_eq!(graph.get("exposure.p.e").unwrap().parents, vec!["model.p.a"]);
    }

    #[test]
    fn edges_stay_on_the_declaring_kind_when_ids_collide() {
        let graph = ProjectGraph::from_manifest(manifest(json!({
            "metadata": {"project_name": "p"},
            "nodes": {
                "model.p.a": model("model.p.a", "p", &[]),
                "snapshot.p.dup": {
                    "unique_id": "p.dup",
                    "name": "dup",
                    "resource_type": "snapshot",
                    "package_name": "p",
                    "depends_on": {"nodes": ["model.p.a"]}
                }
            },
            "sources": {
                "source.p.raw.dup": {
                    "unique_id": "p.dup",
                    "name": "dup",
                    "resource_type": "source",
                    "package_name": "p",
                    "source_name": "raw"
                }
            }
        })));

        let snapshot = &graph.collection(ResourceKind::Snapshot)["p.dup"];
        let source = &graph.collection(ResourceKind::Source)["p.dup"];
        assert_eq!(snapshot.parents, vec!["model.p.a"]);
        assert!(source.parents.is_empty());
        assert_eq!(graph.get("model.p.a").unwrap().children, vec!["p.dup"]);
    }

    #[test]
    fn tests_without_single_dependency_are_dropped() {
        let graph = ProjectGraph::from_manifest(manifest(json!({
            "metadata": {"project_name": "p"},
            "nodes": {
                "model.p.a": model("model.p.a", "p", &[]),
                "model.p.b": model("model.p.b", "p", &[]),
                "test.p.single": {
                    "unique_id": "test.p.single",
                    "name": "single",
                    "resource_type": "test",
                    "package_name": "p",
                    "depends_on": {"nodes": ["model.p.a"]}
                },
                "test.p.relationship": {
                    "unique_id": "test.p.relationship",
                    "name": "relationship",
                    "resource_type": "test",
                    "package_name": "p",
                    "depends_on": {"nodes": ["model.p.a", "model.p.b"]}
                },
                "test.p.attached": {
                    "unique_id": "test.p.attached",
                    "name": "attached",
                    "resource_type": "test",
                    "package_name": "p",
                    "attached_node": "model.p.b",
                    "depends_on": {"nodes": ["model.p.a", "model.p.b"]}
                }
            }
        })));

        let a = graph.get("model.p.a").unwrap();
        let b = graph.get("model.p.b").unwrap();
        assert_eq!(a.tests.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["single"]);
        assert_eq!(b.tests.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["attached"]);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn selection_keeps_edges_to_pruned_entities() {
        let graph = ProjectGraph::load(
            manifest(json!({
                "metadata": {"project_name": "p"},
                "nodes": {
                    "model.p.a": model("model.p.a", "p", &[]),
                    "model.p.b": model("model.p.b", "p", &["model.p.a"])
                }
            })),
            &["b".to_string()],
            None,
        )
        .unwrap();

        assert_eq!(ids(graph.evaluables()), vec!["model.p.b"]);
        assert!(!graph.is_selected("model.p.a"));

        let b = graph.get("model.p.b").unwrap();
        let parents: Vec<_> = graph.parents_of(b).collect();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].children, vec!["model.p.b"]);
    }

    #[test]
    fn unresolvable_selection_without_resolver_fails() {
        let result = ProjectGraph::load(
            manifest(json!({"metadata": {"project_name": "p"}})),
            &["+b".to_string()],
            None,
        );
        assert!(matches!(result, Err(LoadError::Selection(_))));
    }

    #[test]
    fn records_of_other_types_are_ignored() {
        let graph = ProjectGraph::from_manifest(manifest(json!({
            "metadata": {"project_name": "p"},
            "nodes": {
                "analysis.p.x": {
                    "unique_id": "analysis.p.x",
                    "name": "x",
                    "resource_type": "analysis",
                    "package_name": "p"
                }
            }
        })));
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert_eq!(graph.empty_notice(), Some(NOTHING_TO_EVALUATE));
    }
}
