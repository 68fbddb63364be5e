//! k8smon - main entry point
//!
//! Collects the monitoring configuration, shows it for confirmation and
//! installs the grafana/k8s-monitoring chart with helm.

use std::io::{IsTerminal, Write};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use k8smon::cli::Cli;
use k8smon::installer::{Installer, RunOutcome};
use k8smon::process_guard;
use k8smon::prompt::{HeadlessPrompter, Prompter, TtyPrompter};
use k8smon::resolver::{ProcessEnv, RunMode};
use k8smon::sanity;
use k8smon::tool_runner::SystemToolRunner;

/// Initialize the logger; `RUST_LOG` overrides the level chosen here.
fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .compact()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    info!("k8smon {} starting", env!("CARGO_PKG_VERSION"));

    // Removes the values file and stops helm on SIGINT/SIGTERM/SIGHUP
    if let Err(e) = process_guard::install_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    match run(&cli) {
        Ok(RunOutcome::Installed { retained }) => {
            if let Some(path) = retained {
                info!("Values file retained at {}", path.display());
            }
            // stdout may already be closed (e.g. piped into `head`)
            let _ = writeln!(std::io::stdout(), "✓ Installation completed successfully");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Declined) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("{:#}", e);
            eprintln!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<RunOutcome> {
    sanity::run_preflight_checks()?;

    let mut prompter: Box<dyn Prompter> = match cli.mode() {
        RunMode::Interactive => Box::new(TtyPrompter::open()?),
        RunMode::NonInteractive => Box::new(HeadlessPrompter),
    };
    let mut runner = SystemToolRunner;

    let outcome = Installer::new(cli.install_options(), &mut runner, prompter.as_mut())
        .run(&cli.field_values(), &ProcessEnv)?;
    Ok(outcome)
}
