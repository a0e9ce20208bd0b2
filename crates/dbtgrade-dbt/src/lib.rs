//! dbt manifest loading and project graph
//!
//! This crate handles:
//! - Parsing manifest.json (dbt-generated artifacts)
//! - Building typed entities with their columns and tests
//! - Resolving parent/child edges between project entities
//! - Node selection, directly or through an external resolver

pub mod manifest;
pub mod model;
pub mod graph;
pub mod selection;

pub use manifest::{JsonMap, LoadError, Manifest, ManifestExposure, ManifestMetadata, ManifestNode, ManifestSource};
pub use model::{
    normalize_identifier, Column, Constraint, Evaluable, EvaluableKind, ExposureDetails, ExposureOwner,
    FreshnessDuration, FreshnessPeriod, HasColumns, ModelDetails, ResourceKind, SeedDetails, SnapshotDetails,
    SourceDetails, SourceFreshness, Test,
};
pub use graph::{ProjectGraph, NOTHING_TO_EVALUATE};
pub use selection::{is_literal, resolve_selection, SelectionError, SelectionResolver};
