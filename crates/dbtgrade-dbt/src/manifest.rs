//! dbt manifest.json parsing
//!
//! Parses dbt-generated manifest.json into loosely-typed records. Every
//! record keeps the fields it does not model in `extra`.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::model::{ExposureOwner, SourceFreshness};

/// JSON object used for free-form fields (`meta`, `config`, `kwargs`, ...)
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// dbt manifest.json structure (subset of fields we care about)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Metadata about the manifest
    pub metadata: ManifestMetadata,

    /// Model, snapshot, seed and test nodes
    pub nodes: IndexMap<String, ManifestNode>,

    /// Source definitions
    pub sources: IndexMap<String, ManifestSource>,

    /// Exposure definitions
    pub exposures: IndexMap<String, ManifestExposure>,
}

/// First pass over the document: records stay untyped so that a bad
/// record can be reported by id.
#[derive(Deserialize)]
struct RawManifest {
    metadata: ManifestMetadata,

    #[serde(default, deserialize_with = "null_default")]
    nodes: IndexMap<String, serde_json::Value>,

    #[serde(default, deserialize_with = "null_default")]
    sources: IndexMap<String, serde_json::Value>,

    #[serde(default, deserialize_with = "null_default")]
    exposures: IndexMap<String, serde_json::Value>,
}

impl Manifest {
    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LoadError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_str(&contents)
    }

    /// Parse manifest from JSON string
    pub fn from_str(json: &str) -> Result<Self, LoadError> {
        let raw: RawManifest = serde_json::from_str(json)
            .map_err(|e| LoadError::ParseError(e.to_string()))?;

        Ok(Self {
            metadata: raw.metadata,
            nodes: parse_bucket("nodes", raw.nodes)?,
            sources: parse_bucket("sources", raw.sources)?,
            exposures: parse_bucket("exposures", raw.exposures)?,
        })
    }

    /// Name of the project owning the manifest
    pub fn project_name(&self) -> &str {
        &self.metadata.project_name
    }

    /// Nodes of a given resource type, in manifest order
    pub fn nodes_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a ManifestNode> + 'a {
        self.nodes
            .values()
            .filter(move |node| node.resource_type == resource_type)
    }
}

fn parse_bucket<T: DeserializeOwned>(
    bucket: &'static str,
    records: IndexMap<String, serde_json::Value>,
) -> Result<IndexMap<String, T>, LoadError> {
    records
        .into_iter()
        .map(|(id, value)| match serde_json::from_value(value) {
            Ok(record) => Ok((id, record)),
            Err(e) => Err(LoadError::InvalidRecord {
                bucket,
                id,
                message: e.to_string(),
            }),
        })
        .collect()
}

/// Deserialize `null` as the type's default
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Manifest metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Name of the dbt project that produced the manifest
    pub project_name: String,

    #[serde(default)]
    pub dbt_schema_version: Option<String>,

    #[serde(default)]
    pub dbt_version: Option<String>,

    #[serde(default)]
    pub generated_at: Option<String>,

    #[serde(default)]
    pub invocation_id: Option<String>,
}

/// A node in the manifest (model, test, snapshot, seed, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    /// Unique identifier (e.g., "model.my_project.users")
    pub unique_id: String,

    /// Node name (e.g., "users")
    pub name: String,

    /// Resource type (model, test, snapshot, seed, ...)
    pub resource_type: String,

    /// Package name
    pub package_name: String,

    #[serde(default, deserialize_with = "null_default")]
    pub description: String,

    /// Original file path
    #[serde(default, deserialize_with = "null_default")]
    pub original_file_path: String,

    /// YAML file declaring the node's properties
    #[serde(default)]
    pub patch_path: Option<String>,

    /// Fully qualified relation (e.g., "db.schema.users")
    #[serde(default)]
    pub relation_name: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub schema: Option<String>,

    /// Alias (output table name)
    #[serde(default)]
    pub alias: Option<String>,

    /// Raw SQL (or Python) code
    #[serde(default, deserialize_with = "null_default")]
    pub raw_code: String,

    #[serde(default)]
    pub language: Option<String>,

    /// Access level (private, protected, public)
    #[serde(default)]
    pub access: Option<String>,

    #[serde(default)]
    pub group: Option<String>,

    /// Node configuration
    #[serde(default, deserialize_with = "null_default")]
    pub config: JsonMap,

    #[serde(default, deserialize_with = "null_default")]
    pub meta: JsonMap,

    #[serde(default, deserialize_with = "null_default")]
    pub tags: Vec<String>,

    /// Column definitions
    #[serde(default, deserialize_with = "null_default")]
    pub columns: IndexMap<String, ColumnDefinition>,

    /// Model-level constraints
    #[serde(default, deserialize_with = "null_default")]
    pub constraints: Vec<ConstraintDefinition>,

    /// Dependencies
    #[serde(default, deserialize_with = "null_default")]
    pub depends_on: DependsOn,

    /// Snapshot strategy (older manifests; newer ones keep it in config)
    #[serde(default)]
    pub strategy: Option<String>,

    /// Snapshot unique key, a string or a list of strings
    #[serde(default)]
    pub unique_key: Option<serde_json::Value>,

    /// Generic test metadata (tests only)
    #[serde(default)]
    pub test_metadata: Option<TestMetadata>,

    /// Node a test is attached to (tests only)
    #[serde(default)]
    pub attached_node: Option<String>,

    /// Fields not modeled above
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Column definition from manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name (falls back to the mapping key when absent)
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_default")]
    pub description: String,

    /// Declared data type
    #[serde(default)]
    pub data_type: Option<String>,

    #[serde(default, deserialize_with = "null_default")]
    pub meta: JsonMap,

    #[serde(default, deserialize_with = "null_default")]
    pub constraints: Vec<ConstraintDefinition>,

    #[serde(default, deserialize_with = "null_default")]
    pub tags: Vec<String>,

    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Constraint definition (model- or column-level)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDefinition {
    /// Constraint type (e.g., "primary_key", "foreign_key")
    #[serde(rename = "type")]
    pub constraint_type: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub expression: Option<String>,

    /// Constrained columns (model-level constraints only)
    #[serde(default)]
    pub columns: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Generic test metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetadata {
    /// Test type (e.g., "unique", "not_null")
    #[serde(default)]
    pub name: Option<String>,

    /// Package providing the test (e.g., "dbt_utils")
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default, deserialize_with = "null_default")]
    pub kwargs: JsonMap,
}

/// Dependencies structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    /// List of node unique_ids this node depends on
    #[serde(default, deserialize_with = "null_default")]
    pub nodes: Vec<String>,

    /// Macros used by the node
    #[serde(default, deserialize_with = "null_default")]
    pub macros: Vec<String>,
}

/// A source table in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSource {
    /// Unique identifier (e.g., "source.my_project.raw.users")
    pub unique_id: String,

    /// Table name (e.g., "users")
    pub name: String,

    pub resource_type: String,

    pub package_name: String,

    /// Source namespace (e.g., "raw")
    pub source_name: String,

    #[serde(default, deserialize_with = "null_default")]
    pub source_description: String,

    #[serde(default, deserialize_with = "null_default")]
    pub description: String,

    #[serde(default, deserialize_with = "null_default")]
    pub original_file_path: String,

    #[serde(default)]
    pub patch_path: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub schema: Option<String>,

    /// Identifier (actual table name)
    #[serde(default)]
    pub identifier: Option<String>,

    /// Tool loading the table
    #[serde(default, deserialize_with = "null_default")]
    pub loader: String,

    #[serde(default)]
    pub freshness: Option<SourceFreshness>,

    #[serde(default, deserialize_with = "null_default")]
    pub config: JsonMap,

    #[serde(default, deserialize_with = "null_default")]
    pub meta: JsonMap,

    /// Meta of the source namespace
    #[serde(default, deserialize_with = "null_default")]
    pub source_meta: JsonMap,

    #[serde(default, deserialize_with = "null_default")]
    pub tags: Vec<String>,

    /// Column definitions
    #[serde(default, deserialize_with = "null_default")]
    pub columns: IndexMap<String, ColumnDefinition>,

    #[serde(flatten)]
    pub extra: JsonMap,
}

/// An exposure in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestExposure {
    /// Unique identifier (e.g., "exposure.my_project.weekly_kpis")
    pub unique_id: String,

    pub name: String,

    pub resource_type: String,

    pub package_name: String,

    #[serde(default, deserialize_with = "null_default")]
    pub description: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    /// Maturity (low, medium, high)
    #[serde(default)]
    pub maturity: Option<String>,

    /// Exposure type (dashboard, notebook, analysis, ml, application)
    #[serde(rename = "type", default)]
    pub exposure_type: Option<String>,

    #[serde(default, deserialize_with = "null_default")]
    pub owner: ExposureOwner,

    #[serde(default, deserialize_with = "null_default")]
    pub original_file_path: String,

    #[serde(default, deserialize_with = "null_default")]
    pub config: JsonMap,

    #[serde(default, deserialize_with = "null_default")]
    pub meta: JsonMap,

    #[serde(default, deserialize_with = "null_default")]
    pub tags: Vec<String>,

    #[serde(default, deserialize_with = "null_default")]
    pub depends_on: DependsOn,

    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Manifest loading errors
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read manifest file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse manifest JSON: {0}")]
    ParseError(String),

    #[error("Invalid record '{id}' in manifest {bucket}: {message}")]
    InvalidRecord {
        bucket: &'static str,
        id: String,
        message: String,
    },

    #[error(transparent)]
    Selection(#[from] crate::selection::SelectionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_minimal_manifest() {
        let manifest = Manifest::from_str(
            &json!({
                "metadata": {"project_name": "package"},
                "nodes": {
                    "model.package.users": {
                        "unique_id": "model.package.users",
                        "name": "users",
                        "resource_type": "model",
                        "package_name": "package",
                        "description": null,
                        "meta": null,
                        "columns": {"id": {"name": "id", "data_type": null}},
                        "compiled_code": "select 1"
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(manifest.project_name(), "package");
        assert!(manifest.sources.is_empty());
        assert!(manifest.exposures.is_empty());

        let users = &manifest.nodes["model.package.users"];
        assert_eq!(users.description, "");
        assert!(users.meta.is_empty());
        assert_eq!(users.columns["id"].data_type, None);
        assert_eq!(users.extra.get("compiled_code"), Some(&json!("select 1")));
    }

    #[test]
    fn missing_project_name_is_parse_error() {
        let result = Manifest::from_str(r#"{"metadata": {}, "nodes": {}}"#);
        assert!(matches!(result, Err(LoadError::ParseError(_))));
    }

    #[test]
    fn invalid_record_names_the_record() {
        let result = Manifest::from_str(
            &json!({
                "metadata": {"project_name": "package"},
                "sources": {
                    "source.package.raw.users": {
                        "unique_id": "source.package.raw.users",
                        "name": "users",
                        "resource_type": "source",
                        "package_name": "package"
                    }
                }
            })
            .to_string(),
        );

        match result {
            Err(LoadError::InvalidRecord { bucket, id, message }) => {
                assert_eq!(bucket, "sources");
                assert_eq!(id, "source.package.raw.users");
                assert!(message.contains("source_name"));
            }
            other => panic!("expected InvalidRecord, got {:?}", other),
        }
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(Manifest::from_str("{not json"), Err(LoadError::ParseError(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Manifest::from_file(Path::new("/nonexistent/manifest.json"));
        assert!(matches!(result, Err(LoadError::IoError(_, _))));
    }

    #[test]
    fn buckets_preserve_manifest_order() {
        let manifest = Manifest::from_str(
            r#"{
                "metadata": {"project_name": "p"},
                "nodes": {
                    "seed.p.zeta": {"unique_id": "seed.p.zeta", "name": "zeta", "resource_type": "seed", "package_name": "p"},
                    "seed.p.alpha": {"unique_id": "seed.p.alpha", "name": "alpha", "resource_type": "seed", "package_name": "p"}
                }
            }"#,
        )
        .unwrap();

        let names: Vec<_> = manifest.nodes_of_type("seed").map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }
}
