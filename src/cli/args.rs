//! CLI argument definitions.
//!
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Gantry - declarative step orchestration for infrastructure and deployments.
#[derive(Debug, Parser)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config file (overrides .gantry/config.yml discovery)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to project root (overrides current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Show captured output of every step
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors and the final result
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run steps and their dependencies
    Run(RunArgs),

    /// Show what a run would do without running anything
    Plan(PlanArgs),

    /// Show step results of a run
    Status(StatusArgs),

    /// Show recent runs
    History(HistoryArgs),

    /// List steps and workflows
    List(ListArgs),

    /// Validate configuration
    Lint(LintArgs),

    /// Print the JSON Schema of the configuration file
    Schema,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Target selection shared by `run` and `plan`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct TargetArgs {
    /// Steps or workflows to run (default: the `default` workflow)
    pub targets: Vec<String>,

    /// Workflow to run, in addition to any targets
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Environment value passed to steps (repeatable)
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,
}

impl TargetArgs {
    /// Targets with the workflow appended.
    pub fn all_targets(&self) -> Vec<String> {
        let mut targets = self.targets.clone();
        if let Some(workflow) = &self.workflow {
            targets.push(workflow.clone());
        }
        targets
    }
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    /// Re-run these steps even if already satisfied (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub force: Vec<String>,

    /// Re-run every step
    #[arg(long, conflicts_with = "force")]
    pub force_all: bool,

    /// Resume a failed or cancelled run
    #[arg(long, value_name = "RUN_ID")]
    pub resume: Option<String>,

    /// Maximum number of steps running at once
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub max_parallel: Option<u16>,

    /// Include a step output in the report, as step.output (repeatable)
    #[arg(long = "output", value_name = "STEP.OUTPUT")]
    pub outputs: Vec<String>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `plan` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    /// Plan as if these steps were forced (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub force: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `status` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct StatusArgs {
    /// Run to show (default: the latest run)
    #[arg(long, value_name = "RUN_ID")]
    pub run: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `history` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct HistoryArgs {
    /// Number of runs to show
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `list` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `lint` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct LintArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Parse `KEY=VALUE`.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_arguments() {
        let cli = Cli::try_parse_from([
            "gantry",
            "run",
            "deploy",
            "-e",
            "IMAGE_TAG=v1",
            "--env",
            "URL=https://x?a=b",
            "--force",
            "build,push",
            "--max-parallel",
            "2",
            "--output",
            "provision.login_server",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.targets.targets, ["deploy"]);
        assert_eq!(
            args.targets.env,
            [
                ("IMAGE_TAG".to_string(), "v1".to_string()),
                ("URL".to_string(), "https://x?a=b".to_string())
            ]
        );
        assert_eq!(args.force, ["build", "push"]);
        assert_eq!(args.max_parallel, Some(2));
        assert_eq!(args.outputs, ["provision.login_server"]);
    }

    #[test]
    fn workflow_is_appended_to_targets() {
        let cli = Cli::try_parse_from(["gantry", "plan", "lint", "--workflow", "release"]).unwrap();
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.targets.all_targets(), ["lint", "release"]);
    }

    #[test]
    fn rejects_malformed_env() {
        assert!(Cli::try_parse_from(["gantry", "run", "-e", "NOVALUE"]).is_err());
        assert!(Cli::try_parse_from(["gantry", "run", "-e", "=x"]).is_err());
    }

    #[test]
    fn rejects_zero_parallelism() {
        assert!(Cli::try_parse_from(["gantry", "run", "--max-parallel", "0"]).is_err());
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from(["gantry", "status", "--debug", "-q"]).unwrap();
        assert!(cli.debug);
        assert!(cli.quiet);
    }
}
