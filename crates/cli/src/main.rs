//! ForkGuard CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `.forkguard/config.toml`, apply flag
//!    overrides and validate the result before any routine runs.
//! 2. **Wire observability**: `tracing-subscriber` with a text or JSON layer on
//!    stderr and, when configured, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: one `GithubClient` authenticated as the
//!    configured identity, shared by every routine.
//! 4. **Dispatch**: run one routine once (`sync`, `tags`, `scan`), or all of
//!    them on intervals (`watch`).
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Run completed |
//! | 1 | Run failed (configuration, credentials, platform error) |
//! | 3 | An upstream tag was mutated and `[tags].fail_on_mutation` is set |
//! | 4 | The scan summary found blocking findings |

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use model::PullRequestNumber;
use tracing::{error, warn};

mod commands;
mod config;
mod observability;
mod output;

use commands::App;
use config::{BaselineKind, ForkGuardConfig, RepoArgs};
use observability::LogFormat;
use output::OutputFormat;

const EXIT_FAILURE: u8 = 1;
const EXIT_TAG_MUTATION: u8 = 3;
const EXIT_BLOCKING_FINDINGS: u8 = 4;

/// Keeps a fork in step with its upstream and watches upstream for tampering.
#[derive(Debug, Parser)]
#[command(name = "forkguard", version, about)]
struct Cli {
    /// Configuration file [default: .forkguard/config.toml, optional].
    #[arg(long, global = true, env = "FORKGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Report format on stdout.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bring the tracking branch up to upstream and propose it as a pull request.
    Sync {
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Compare upstream tags against the baseline and report changes.
    Tags {
        #[command(flatten)]
        repo: RepoArgs,

        /// Baseline to compare against [default: from config, else fork].
        #[arg(long, value_enum)]
        baseline: Option<BaselineKind>,
    },
    /// Security scan gate for sync pull requests.
    Scan {
        #[command(subcommand)]
        action: ScanAction,
    },
    /// Run every routine on its configured interval until interrupted.
    Watch {
        #[command(flatten)]
        repo: RepoArgs,
    },
}

#[derive(Debug, Subcommand)]
enum ScanAction {
    /// Make sure the scan runs for a pull request.
    Trigger {
        #[command(flatten)]
        repo: RepoArgs,

        /// Pull request number.
        #[arg(long)]
        pr: u64,
    },
    /// Post or refresh the risk summary comment on a pull request.
    Summarize {
        #[command(flatten)]
        repo: RepoArgs,

        /// Pull request number.
        #[arg(long)]
        pr: u64,
    },
}

impl Command {
    fn repo_args(&self) -> &RepoArgs {
        match self {
            Self::Sync { repo } | Self::Tags { repo, .. } | Self::Watch { repo } => repo,
            Self::Scan { action } => match action {
                ScanAction::Trigger { repo, .. } | ScanAction::Summarize { repo, .. } => repo,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _telemetry = match observability::init(cli.log_format, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: cannot initialise logging: {e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "ForkGuard failed");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = ForkGuardConfig::load(cli.config.as_deref())?;
    config.apply(cli.command.repo_args());
    if let Command::Tags {
        baseline: Some(kind),
        ..
    } = &cli.command
    {
        config.tags.baseline = *kind;
    }

    let env = |name: &str| std::env::var(name).ok();
    let settings = config.resolve(env)?;
    let credentials = config.credentials(env, &settings.fork)?;
    let app = App::connect(settings, credentials).context("cannot set up the GitHub client")?;

    match cli.command {
        Command::Sync { .. } => {
            let report = app.sync().await?;
            output::emit(cli.output, &report, output::describe_sync)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Tags { .. } => {
            let report = app.tags().await?;
            output::emit(cli.output, &report, output::describe_tags)?;
            if report.has_mutations() && app.settings().fail_on_mutation {
                warn!(mutated = report.report.mutated.len(), "Failing run: upstream tags were mutated");
                return Ok(ExitCode::from(EXIT_TAG_MUTATION));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Scan {
            action: ScanAction::Trigger { pr, .. },
        } => {
            let trigger = app.trigger_scan(PullRequestNumber::new(pr)).await?;
            output::emit(cli.output, &trigger, output::describe_trigger)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Scan {
            action: ScanAction::Summarize { pr, .. },
        } => {
            let report = app.summarize_scan(PullRequestNumber::new(pr)).await?;
            output::emit(cli.output, &report, output::describe_summary)?;
            if report.assessment.blocking {
                return Ok(ExitCode::from(EXIT_BLOCKING_FINDINGS));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch { .. } => {
            commands::watch(Arc::new(app)).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
