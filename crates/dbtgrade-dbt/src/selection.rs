//! Node selection
//!
//! Plain names select themselves. Anything else (graph operators, tags,
//! paths, set operators) is handed to a [`SelectionResolver`].

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Resolves selection expressions to entity names
///
/// Implementations return names for models, snapshots, seeds and
/// exposures, and `source_name.table_name` for sources.
pub trait SelectionResolver {
    fn resolve(&self, expressions: &[String]) -> Result<Vec<String>, SelectionError>;
}

/// Selection error types
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Failed to run selection command '{command}': {message}")]
    CommandFailed { command: String, message: String },

    #[error("Selection command exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },

    #[error("Selection requires a resolver for '{0}'")]
    ResolverUnavailable(String),
}

fn literal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("valid regex"))
}

/// Whether an expression is a plain entity name
pub fn is_literal(expression: &str) -> bool {
    literal_pattern().is_match(expression)
}

/// Resolve expressions to the set of selected names
///
/// The resolver is called at most once, and only when some expression
/// is not a plain name.
pub fn resolve_selection(
    expressions: &[String],
    resolver: Option<&dyn SelectionResolver>,
) -> Result<HashSet<String>, SelectionError> {
    if expressions.iter().all(|expression| is_literal(expression)) {
        return Ok(expressions.iter().cloned().collect());
    }

    let Some(resolver) = resolver else {
        let expression = expressions
            .iter()
            .find(|expression| !is_literal(expression))
            .cloned()
            .unwrap_or_default();
        return Err(SelectionError::ResolverUnavailable(expression));
    };

    tracing::debug!("Resolving selection {:?} externally", expressions);
    let names = resolver.resolve(expressions)?;
    Ok(names.into_iter().collect())
}
