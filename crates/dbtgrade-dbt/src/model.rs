//! Typed evaluables built from manifest records
//!
//! An [`Evaluable`] is a shared header (id, name, tags, meta, tests,
//! edges) plus a kind-specific payload in [`EvaluableKind`]. Identity is
//! the `unique_id`: two evaluables are equal when their ids are equal.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::manifest::{
    ColumnDefinition, ConstraintDefinition, JsonMap, ManifestExposure, ManifestNode, ManifestSource,
};

/// Kind of evaluable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Model,
    Source,
    Snapshot,
    Seed,
    Exposure,
}

impl ResourceKind {
    /// Every kind, in evaluation order
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Model,
        ResourceKind::Source,
        ResourceKind::Snapshot,
        ResourceKind::Seed,
        ResourceKind::Exposure,
    ];

    /// Kinds that can be the target of a dependency edge, in lookup order
    pub const EDGE_TARGETS: [ResourceKind; 4] = [
        ResourceKind::Model,
        ResourceKind::Snapshot,
        ResourceKind::Source,
        ResourceKind::Seed,
    ];

    /// The manifest `resource_type` value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Source => "source",
            Self::Snapshot => "snapshot",
            Self::Seed => "seed",
            Self::Exposure => "exposure",
        }
    }

    /// Whether resources of this kind carry columns
    pub fn has_columns(&self) -> bool {
        !matches!(self, Self::Exposure)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind '{}'", s))
    }
}

/// Constraint on a model or a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint type (e.g., "foreign_key")
    pub constraint_type: String,

    pub name: Option<String>,

    /// Expression (e.g., "schema.other_table (id)")
    pub expression: Option<String>,

    /// Constrained columns; `None` for column-level constraints
    pub columns: Option<Vec<String>>,

    pub extra: JsonMap,
}

impl From<ConstraintDefinition> for Constraint {
    fn from(def: ConstraintDefinition) -> Self {
        Self {
            constraint_type: def.constraint_type,
            name: def.name,
            expression: def.expression,
            columns: def.columns,
            extra: def.extra,
        }
    }
}

/// Strip the quoting some adapters keep around identifiers
/// (e.g. BigQuery with `quote: true` produces "`id`").
pub fn normalize_identifier(identifier: &str) -> &str {
    identifier.trim().trim_matches(|c| c == '`' || c == '"')
}

/// Data test attached to an evaluable or one of its columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub name: String,

    /// Test type (e.g., "unique"); "generic" for singular tests
    pub test_type: String,

    /// Test keyword arguments
    pub kwargs: JsonMap,

    pub tags: Vec<String>,

    pub extra: JsonMap,
}

impl Test {
    /// Create a test from a test node in the manifest
    pub fn from_node(node: &ManifestNode) -> Self {
        let metadata = node.test_metadata.clone().unwrap_or_default();

        Self {
            name: node.name.clone(),
            test_type: metadata.name.unwrap_or_else(|| "generic".to_string()),
            kwargs: metadata.kwargs,
            tags: node.tags.clone(),
            extra: node.extra.clone(),
        }
    }

    /// Normalized `column_name` argument, if set and non-empty
    pub fn column_name(&self) -> Option<&str> {
        self.kwargs
            .get("column_name")
            .and_then(|value| value.as_str())
            .map(normalize_identifier)
            .filter(|name| !name.is_empty())
    }
}

/// A column of a model, source, snapshot or seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub description: String,
    pub data_type: Option<String>,
    pub meta: JsonMap,
    pub constraints: Vec<Constraint>,
    pub tags: Vec<String>,

    /// Tests scoped to this column
    pub tests: Vec<Test>,

    pub extra: JsonMap,
}

impl Column {
    fn from_definition(key: &str, def: &ColumnDefinition) -> Self {
        let name = if def.name.is_empty() { key } else { def.name.as_str() };

        Self {
            name: name.to_string(),
            description: def.description.clone(),
            data_type: def.data_type.clone(),
            meta: def.meta.clone(),
            constraints: def.constraints.iter().cloned().map(Constraint::from).collect(),
            tags: def.tags.clone(),
            tests: Vec::new(),
            extra: def.extra.clone(),
        }
    }
}

/// Build columns and distribute tests between them and their owner
///
/// A test whose normalized `column_name` matches a column is attached to
/// that column. Every other test is returned for the owning evaluable.
pub(crate) fn build_columns(
    definitions: &IndexMap<String, ColumnDefinition>,
    tests: Vec<Test>,
) -> (Vec<Column>, Vec<Test>) {
    let mut columns: Vec<Column> = definitions
        .iter()
        .map(|(key, def)| Column::from_definition(key, def))
        .collect();

    let mut entity_tests = Vec::new();
    for test in tests {
        let target = test
            .column_name()
            .and_then(|name| columns.iter().position(|column| column.name == name));

        match target {
            Some(index) => columns[index].tests.push(test),
            None => entity_tests.push(test),
        }
    }

    (columns, entity_tests)
}

/// Shared behavior of payloads carrying columns
pub trait HasColumns {
    fn columns(&self) -> &[Column];

    /// Get a column by name
    fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns().iter().find(|column| column.name == name)
    }
}

/// Freshness period unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessPeriod {
    Minute,
    Hour,
    Day,
}

/// Duration used by freshness thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FreshnessDuration {
    #[serde(default)]
    pub count: Option<u32>,

    #[serde(default)]
    pub period: Option<FreshnessPeriod>,
}

impl FreshnessDuration {
    /// Both count and period are set
    pub fn is_set(&self) -> bool {
        self.count.is_some() && self.period.is_some()
    }
}

/// Source freshness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFreshness {
    #[serde(default)]
    pub warn_after: Option<FreshnessDuration>,

    #[serde(default)]
    pub error_after: Option<FreshnessDuration>,

    /// Filter applied before the freshness query
    #[serde(default)]
    pub filter: Option<String>,
}

impl SourceFreshness {
    /// At least one threshold is fully configured
    pub fn is_configured(&self) -> bool {
        [&self.warn_after, &self.error_after]
            .into_iter()
            .flatten()
            .any(FreshnessDuration::is_set)
    }
}

/// Owner of an exposure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureOwner {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    /// Relation name (e.g., "db.schema.model")
    pub relation_name: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub alias: Option<String>,
    pub raw_code: String,
    pub language: Option<String>,
    pub access: Option<String>,
    pub group: Option<String>,
    pub patch_path: Option<String>,
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDetails {
    /// Source namespace
    pub source_name: String,
    pub source_description: String,
    pub source_meta: JsonMap,
    pub database: Option<String>,
    pub schema: Option<String>,

    /// Actual table name (the source name may be an alias)
    pub identifier: Option<String>,
    pub loader: String,
    pub freshness: Option<SourceFreshness>,
    pub patch_path: Option<String>,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDetails {
    pub relation_name: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub alias: Option<String>,
    pub raw_code: String,
    pub language: Option<String>,
    pub patch_path: Option<String>,

    /// Snapshot strategy (timestamp, check)
    pub strategy: Option<String>,
    pub unique_key: Option<Vec<String>>,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedDetails {
    pub relation_name: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub alias: Option<String>,
    pub patch_path: Option<String>,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureDetails {
    pub label: Option<String>,
    pub url: Option<String>,
    pub maturity: Option<String>,
    pub exposure_type: Option<String>,
    pub owner: ExposureOwner,
}

impl HasColumns for ModelDetails {
    fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl HasColumns for SourceDetails {
    fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl HasColumns for SnapshotDetails {
    fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl HasColumns for SeedDetails {
    fn columns(&self) -> &[Column] {
        &self.columns
    }
}

/// Kind-specific payload of an evaluable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource_type", rename_all = "lowercase")]
pub enum EvaluableKind {
    Model(ModelDetails),
    Source(SourceDetails),
    Snapshot(SnapshotDetails),
    Seed(SeedDetails),
    Exposure(ExposureDetails),
}

/// A model, source, snapshot, seed or exposure
///
/// `parents` and `children` hold the unique ids of one-hop neighbors;
/// resolve them through [`crate::ProjectGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluable {
    pub unique_id: String,
    pub name: String,
    pub description: String,
    pub package_name: String,
    pub original_file_path: String,
    pub config: JsonMap,
    pub meta: JsonMap,
    pub tags: Vec<String>,

    /// Tests attached to the evaluable itself (not to a column)
    pub tests: Vec<Test>,

    /// Declared upstream node ids, including unresolved ones
    pub depends_on: Vec<String>,

    /// Resolved upstream evaluables
    pub parents: Vec<String>,

    /// Resolved downstream evaluables
    pub children: Vec<String>,

    pub kind: EvaluableKind,

    /// Record fields not modeled above
    pub extra: JsonMap,
}

impl PartialEq for Evaluable {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id == other.unique_id
    }
}

impl Eq for Evaluable {}

impl Hash for Evaluable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_id.hash(state);
    }
}

impl Evaluable {
    /// Create a model from a node and its tests
    pub fn model(node: ManifestNode, tests: Vec<Test>) -> Self {
        let (columns, tests) = build_columns(&node.columns, tests);
        let details = ModelDetails {
            relation_name: node.relation_name,
            database: node.database,
            schema: node.schema,
            alias: node.alias,
            raw_code: node.raw_code,
            language: node.language,
            access: node.access,
            group: node.group,
            patch_path: node.patch_path,
            columns,
            constraints: node.constraints.into_iter().map(Constraint::from).collect(),
        };

        Self::with_header(
            node.unique_id,
            node.name,
            node.description,
            node.package_name,
            node.original_file_path,
            node.config,
            node.meta,
            node.tags,
            tests,
            node.depends_on.nodes,
            EvaluableKind::Model(details),
            node.extra,
        )
    }

    /// Create a snapshot from a node and its tests
    pub fn snapshot(node: ManifestNode, tests: Vec<Test>) -> Self {
        let (columns, tests) = build_columns(&node.columns, tests);
        let strategy = node
            .strategy
            .or_else(|| node.config.get("strategy").and_then(|v| v.as_str()).map(str::to_string));
        let unique_key = node
            .unique_key
            .as_ref()
            .or_else(|| node.config.get("unique_key"))
            .and_then(string_list);

        let details = SnapshotDetails {
            relation_name: node.relation_name,
            database: node.database,
            schema: node.schema,
            alias: node.alias,
            raw_code: node.raw_code,
            language: node.language,
            patch_path: node.patch_path,
            strategy,
            unique_key,
            columns,
        };

        Self::with_header(
            node.unique_id,
            node.name,
            node.description,
            node.package_name,
            node.original_file_path,
            node.config,
            node.meta,
            node.tags,
            tests,
            node.depends_on.nodes,
            EvaluableKind::Snapshot(details),
            node.extra,
        )
    }

    /// Create a seed from a node and its tests
    pub fn seed(node: ManifestNode, tests: Vec<Test>) -> Self {
        let (columns, tests) = build_columns(&node.columns, tests);
        let details = SeedDetails {
            relation_name: node.relation_name,
            database: node.database,
            schema: node.schema,
            alias: node.alias,
            patch_path: node.patch_path,
            columns,
        };

        Self::with_header(
            node.unique_id,
            node.name,
            node.description,
            node.package_name,
            node.original_file_path,
            node.config,
            node.meta,
            node.tags,
            tests,
            node.depends_on.nodes,
            EvaluableKind::Seed(details),
            node.extra,
        )
    }

    /// Create a source table from its definition and tests
    pub fn source(source: ManifestSource, tests: Vec<Test>) -> Self {
        let (columns, tests) = build_columns(&source.columns, tests);
        let details = SourceDetails {
            source_name: source.source_name,
            source_description: source.source_description,
            source_meta: source.source_meta,
            database: source.database,
            schema: source.schema,
            identifier: source.identifier,
            loader: source.loader,
            freshness: source.freshness,
            patch_path: source.patch_path,
            columns,
        };

        Self::with_header(
            source.unique_id,
            source.name,
            source.description,
            source.package_name,
            source.original_file_path,
            source.config,
            source.meta,
            source.tags,
            tests,
            Vec::new(),
            EvaluableKind::Source(details),
            source.extra,
        )
    }

    /// Create an exposure from its definition
    pub fn exposure(exposure: ManifestExposure) -> Self {
        let details = ExposureDetails {
            label: exposure.label,
            url: exposure.url,
            maturity: exposure.maturity,
            exposure_type: exposure.exposure_type,
            owner: exposure.owner,
        };

        Self::with_header(
            exposure.unique_id,
            exposure.name,
            exposure.description,
            exposure.package_name,
            exposure.original_file_path,
            exposure.config,
            exposure.meta,
            exposure.tags,
            Vec::new(),
            exposure.depends_on.nodes,
            EvaluableKind::Exposure(details),
            exposure.extra,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn with_header(
        unique_id: String,
        name: String,
        description: String,
        package_name: String,
        original_file_path: String,
        config: JsonMap,
        meta: JsonMap,
        tags: Vec<String>,
        tests: Vec<Test>,
        depends_on: Vec<String>,
        kind: EvaluableKind,
        extra: JsonMap,
    ) -> Self {
        Self {
            unique_id,
            name,
            description,
            package_name,
            original_file_path,
            config,
            meta,
            tags,
            tests,
            depends_on,
            parents: Vec::new(),
            children: Vec::new(),
            kind,
            extra,
        }
    }

    pub fn resource_kind(&self) -> ResourceKind {
        match self.kind {
            EvaluableKind::Model(_) => ResourceKind::Model,
            EvaluableKind::Source(_) => ResourceKind::Source,
            EvaluableKind::Snapshot(_) => ResourceKind::Snapshot,
            EvaluableKind::Seed(_) => ResourceKind::Seed,
            EvaluableKind::Exposure(_) => ResourceKind::Exposure,
        }
    }

    /// Payload as a column-bearing resource; `None` for exposures
    pub fn as_has_columns(&self) -> Option<&dyn HasColumns> {
        match &self.kind {
            EvaluableKind::Model(details) => Some(details),
            EvaluableKind::Source(details) => Some(details),
            EvaluableKind::Snapshot(details) => Some(details),
            EvaluableKind::Seed(details) => Some(details),
            EvaluableKind::Exposure(_) => None,
        }
    }

    /// Columns of the evaluable (empty for exposures)
    pub fn columns(&self) -> &[Column] {
        match self.as_has_columns() {
            Some(item) => item.columns(),
            None => &[],
        }
    }

    /// Get a column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.as_has_columns().and_then(|item| item.get_column(name))
    }

    /// Entity-level tests followed by every column's tests
    pub fn all_tests(&self) -> impl Iterator<Item = &Test> {
        self.tests
            .iter()
            .chain(self.columns().iter().flat_map(|column| column.tests.iter()))
    }

    /// Name matched by node selection
    ///
    /// Sources are selected as `source_name.table_name`, the format
    /// `dbt ls --output name` prints for them.
    pub fn selector_name(&self) -> String {
        match &self.kind {
            EvaluableKind::Source(details) => format!("{}.{}", details.source_name, self.name),
            _ => self.name.clone(),
        }
    }

    /// String value of a `meta` key, if present and non-empty
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta
            .get(key)
            .and_then(|value| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    /// Materialization from config (e.g., "table", "ephemeral")
    pub fn materialized(&self) -> Option<&str> {
        self.config.get("materialized").and_then(|value| value.as_str())
    }
}

/// A string or a list of strings
fn string_list(value: &serde_json::Value) -> Option<Vec<String>> {
    match value {
        serde_json::Value::String(s) => Some(vec![s.clone()]),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    }
}
