//! Built-in rules
//!
//! - `generic`: documentation, ownership and testing rules shared by
//!   most kinds, plus the `skip_ephemeral_models` filter
//! - `resources`: rules specific to sources, snapshots and exposures

pub mod generic;
pub mod resources;

use dbtgrade_dbt::{Evaluable, ResourceKind};

use crate::rule::RulePack;

/// Every built-in pack, in registration order
pub fn builtin_packs() -> Vec<RulePack> {
    vec![generic::pack(), resources::pack()]
}

/// Kinds carrying columns
pub(crate) const COLUMN_KINDS: [ResourceKind; 4] = [
    ResourceKind::Model,
    ResourceKind::Source,
    ResourceKind::Snapshot,
    ResourceKind::Seed,
];

/// Capitalized kind name for messages
pub(crate) fn kind_label(evaluable: &Evaluable) -> &'static str {
    match evaluable.resource_kind() {
        ResourceKind::Model => "Model",
        ResourceKind::Source => "Source",
        ResourceKind::Snapshot => "Snapshot",
        ResourceKind::Seed => "Seed",
        ResourceKind::Exposure => "Exposure",
    }
}
