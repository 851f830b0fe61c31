//! Gantry CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use gantry::cli::{install_interrupt_handler, Cli, CommandDispatcher, Workspace};
use gantry::runner::{EXIT_CONFIGURATION, EXIT_FAILED};
use gantry::ui::{create_ui, OutputMode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. Default is WARN
///
/// Logs go to stderr so `--json` output stays parseable.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("gantry=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gantry=warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    tracing::debug!("gantry starting with args: {:?}", cli);

    let output_mode = OutputMode::from_flags(cli.verbose, cli.quiet);
    let mut ui = create_ui(output_mode, cli.no_color);

    let project_root = match cli.project.clone() {
        Some(root) => root,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                ui.error(&format!("Error: cannot determine current directory: {}", e));
                return ExitCode::from(EXIT_FAILED as u8);
            }
        },
    };

    let mut workspace = Workspace::new(project_root);
    workspace.config = cli.config.clone();
    workspace.env = std::env::vars().collect();
    install_interrupt_handler(workspace.cancel.clone());

    let dispatcher = CommandDispatcher::new(workspace);

    match dispatcher.dispatch(&cli.command, ui.as_mut()) {
        Ok(result) => ExitCode::from(result.exit_code as u8),
        Err(e) => {
            ui.error(&format!("Error: {}", e));
            let code = if e.is_configuration() {
                EXIT_CONFIGURATION
            } else {
                EXIT_FAILED
            };
            ExitCode::from(code as u8)
        }
    }
}
