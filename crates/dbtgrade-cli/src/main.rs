mod render;
mod resolver;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dbtgrade_core::Config;
use dbtgrade_dbt::{Manifest, ProjectGraph};
use dbtgrade_engine::{EvaluationOptions, Evaluator, RuleRegistry, ScoreCard};

use render::{CatalogFormat, Show};
use resolver::DbtLsResolver;

const DEFAULT_CONFIG: &str = "dbtgrade.toml";

/// dbtgrade - Lint and score dbt project metadata
#[derive(Parser)]
#[command(name = "dbtgrade")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: dbtgrade.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Rule selection flags shared by `lint` and `list`
#[derive(Args)]
struct RuleArgs {
    /// Namespace to take rules from
    #[arg(short, long)]
    namespace: Vec<String>,

    /// Rule to disable
    #[arg(long, conflicts_with = "selected_rule")]
    disabled_rule: Vec<String>,

    /// Rule to select
    #[arg(long)]
    selected_rule: Vec<String>,
}

impl RuleArgs {
    fn apply(&self, config: &mut Config) {
        if !self.namespace.is_empty() {
            config.rule_namespaces = self.namespace.clone();
        }
        if !self.disabled_rule.is_empty() {
            config.disabled_rules = self.disabled_rule.clone();
            config.selected_rules.clear();
        }
        if !self.selected_rule.is_empty() {
            config.selected_rules = self.selected_rule.clone();
            config.disabled_rules.clear();
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint dbt metadata and score every selected entity
    Lint {
        /// Path to dbt manifest.json
        #[arg(short, long, default_value = "target/manifest.json")]
        manifest: PathBuf,

        /// Nodes to evaluate (dbt selection syntax)
        #[arg(short, long)]
        select: Vec<String>,

        #[command(flatten)]
        rules: RuleArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "plain")]
        format: OutputFormat,

        /// What the plain format shows
        #[arg(long, value_enum, default_value = "failing-rules")]
        show: Show,

        /// Fail if the project score is under this value
        #[arg(long)]
        fail_project_under: Option<f64>,

        /// Fail if any rated item is under this value
        #[arg(long)]
        fail_any_item_under: Option<f64>,

        /// Abort on the first rule error
        #[arg(short, long)]
        debug: bool,

        /// Evaluate rules on a single thread
        #[arg(long)]
        no_parallel: bool,
    },

    /// Display the rule catalog
    List {
        #[command(flatten)]
        rules: RuleArgs,

        /// Catalog format
        #[arg(short, long, value_enum, default_value = "terminal")]
        format: CatalogFormat,

        /// Page title (markdown only)
        #[arg(long)]
        title: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Lint {
            manifest,
            select,
            rules,
            format,
            show,
            fail_project_under,
            fail_any_item_under,
            debug,
            no_parallel,
        } => {
            rules.apply(&mut config);
            if fail_project_under.is_some() {
                config.fail_project_under = fail_project_under;
            }
            if fail_any_item_under.is_some() {
                config.fail_any_item_under = fail_any_item_under;
            }
            config.debug |= debug;
            config.parallel &= !no_parallel;
            config.validate().context("Invalid configuration")?;

            lint_command(&config, &manifest, &select, format, show)
        }
        Commands::List { rules, format, title } => {
            rules.apply(&mut config);
            config.validate().context("Invalid configuration")?;

            list_command(&config, format, title.as_deref())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path).with_context(|| format!("Failed to load config {}", path.display()));
    }

    let default_path = Path::new(DEFAULT_CONFIG);
    if default_path.exists() {
        tracing::debug!("Using config file {}", DEFAULT_CONFIG);
        Config::from_file(default_path).with_context(|| format!("Failed to load config {}", DEFAULT_CONFIG))
    } else {
        tracing::debug!("No config file found, using defaults");
        Ok(Config::default())
    }
}

/// Lint command - evaluate rules and print scores
fn lint_command(
    config: &Config,
    manifest_path: &Path,
    select: &[String],
    format: OutputFormat,
    show: Show,
) -> Result<ExitCode> {
    tracing::info!("Loading manifest from {}", manifest_path.display());

    let manifest = Manifest::from_file(manifest_path).with_context(|| {
        format!(
            "dbt's manifest.json could not be loaded from {}. Run 'dbt parse' first or pass --manifest",
            manifest_path.display()
        )
    })?;

    let resolver = DbtLsResolver::new(Some(config.project_root.clone()));
    let graph = ProjectGraph::load(manifest, select, Some(&resolver))?;
    if let Some(notice) = graph.empty_notice() {
        eprintln!("{}", notice.yellow());
    }

    let registry = RuleRegistry::with_builtin_rules(config)?;
    let evaluation = Evaluator::new(&registry, EvaluationOptions::from(config)).evaluate(&graph)?;
    let card = ScoreCard::from_config(&graph, &evaluation, config);

    match format {
        OutputFormat::Plain => {
            print!(
                "{}",
                render::render_plain(&graph, &evaluation, &card, show, config.fail_any_item_under)
            );
        }
        OutputFormat::Json => {
            let report = card.to_report(&graph, &evaluation);
            println!("{}", report.to_json()?);
        }
    }

    if card.fails(config.fail_project_under, config.fail_any_item_under) {
        eprint!(
            "{}",
            render::render_failures(&graph, &card, config.fail_project_under, config.fail_any_item_under)
        );
        return Ok(ExitCode::from(1));
    }

    Ok(ExitCode::SUCCESS)
}

/// List command - print the enabled rules
fn list_command(config: &Config, format: CatalogFormat, title: Option<&str>) -> Result<ExitCode> {
    let registry = RuleRegistry::with_builtin_rules(config)?;
    print!("{}", render::render_catalog(&registry, format, title));
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn lint_flags_override_config() {
        let cli = Cli::parse_from([
            "dbtgrade",
            "lint",
            "--selected-rule",
            "has_owner",
            "--fail-project-under",
            "7.5",
            "--no-parallel",
            "-s",
            "+orders",
            "-s",
            "customers",
        ]);

        let Commands::Lint { rules, select, fail_project_under, no_parallel, show, .. } = cli.command else {
            panic!("expected lint");
        };

        let mut config = Config {
            disabled_rules: vec!["has_tags".to_string()],
            ..Config::default()
        };
        rules.apply(&mut config);

        assert_eq!(config.selected_rules, vec!["has_owner"]);
        assert!(config.disabled_rules.is_empty());
        assert_eq!(select, vec!["+orders", "customers"]);
        assert_eq!(fail_project_under, Some(7.5));
        assert!(no_parallel);
        assert_eq!(show, Show::FailingRules);
    }

    #[test]
    fn disabled_and_selected_flags_conflict() {
        let result = Cli::try_parse_from([
            "dbtgrade",
            "list",
            "--disabled-rule",
            "a",
            "--selected-rule",
            "b",
        ]);
        assert!(result.is_err());
    }
}
