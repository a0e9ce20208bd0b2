//! Node selection through `dbt ls`

use dbtgrade_dbt::{SelectionError, SelectionResolver};
use std::path::PathBuf;
use std::process::Command;

const RESOURCE_TYPES: [&str; 5] = ["model", "source", "snapshot", "seed", "exposure"];

/// Resolves selection expressions by running `dbt ls`
#[derive(Debug, Clone)]
pub struct DbtLsResolver {
    /// dbt executable
    pub program: String,

    /// Directory holding `dbt_project.yml`; the working directory if unset
    pub project_dir: Option<PathBuf>,
}

impl Default for DbtLsResolver {
    fn default() -> Self {
        Self {
            program: "dbt".to_string(),
            project_dir: None,
        }
    }
}

impl DbtLsResolver {
    pub fn new(project_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            ..Self::default()
        }
    }

    fn arguments(&self, expressions: &[String]) -> Vec<String> {
        let mut args = vec!["ls".to_string(), "--resource-types".to_string()];
        args.extend(RESOURCE_TYPES.iter().map(|t| t.to_string()));
        args.extend(["--output", "name", "--quiet", "--select"].map(String::from));
        args.extend(expressions.iter().cloned());
        args
    }
}

impl SelectionResolver for DbtLsResolver {
    fn resolve(&self, expressions: &[String]) -> Result<Vec<String>, SelectionError> {
        let args = self.arguments(expressions);
        let mut command = Command::new(&self.program);
        command.args(&args);
        if let Some(dir) = &self.project_dir {
            command.current_dir(dir);
        }

        tracing::debug!("Running {} {}", self.program, args.join(" "));

        let output = command.output().map_err(|e| SelectionError::CommandFailed {
            command: format!("{} {}", self.program, args.join(" ")),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(SelectionError::NonZeroExit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_names(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// One name per non-empty line
fn parse_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
