//! devtool-provision CLI entry point.

use clap::Parser;
use devtool_provision::{ManagerPreference, SetupConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install Chocolatey, Git, Node.js and the Claude and Gemini CLIs, and make
/// them runnable without logging off.
#[derive(Debug, Parser)]
#[command(name = "devtool-provision", version, about)]
struct Cli {
    /// JSON file overriding timeouts, retry counts and search directories.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only report what is installed and runnable; change nothing.
    #[arg(long)]
    verify_only: bool,

    /// Put installed tools that fell off PATH back on it; install nothing.
    #[arg(long, conflicts_with = "verify_only")]
    repair_path: bool,

    /// Package managers installs may use (auto, chocolatey, winget).
    #[arg(long, value_name = "MANAGER")]
    manager: Option<ManagerPreference>,

    /// Skip the PowerShell PATH update and write the registry directly.
    #[arg(long)]
    no_powershell: bool,

    /// Log at debug level.
    #[arg(long)]
    debug: bool,
}

/// Initialize the tracing subscriber.
///
/// `--debug` wins, then `RUST_LOG`, then warnings only so the progress bar
/// stays readable.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("devtool_provision=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devtool_provision=warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<SetupConfig, devtool_provision::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => SetupConfig::from_json_file(path)?,
        None => SetupConfig::default(),
    };
    if let Some(manager) = cli.manager {
        config.manager_preference = manager;
    }
    if cli.no_powershell {
        config.powershell_fast_path = false;
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    tracing::debug!("starting with args: {:?}", cli);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    run(&cli, config)
}

#[cfg(not(windows))]
fn run(_cli: &Cli, _config: SetupConfig) -> ExitCode {
    eprintln!("devtool-provision only provisions Windows hosts");
    ExitCode::from(1)
}

#[cfg(windows)]
fn run(cli: &Cli, config: SetupConfig) -> ExitCode {
    use devtool_provision::SetupContext;

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: cannot start the async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let ctx = SetupContext::windows(config);
    if cli.verify_only {
        runtime.block_on(verify_only(&ctx))
    } else if cli.repair_path {
        runtime.block_on(repair_path(&ctx))
    } else {
        runtime.block_on(provision(ctx))
    }
}

#[cfg(windows)]
async fn verify_only(ctx: &devtool_provision::SetupContext) -> ExitCode {
    let summary = ctx.verifier().verify_all().await;
    for result in &summary.results {
        println!(
            "{:<12} {:<10} {:<24} {}",
            result.tool,
            result.execution_status.label(),
            result.version.as_deref().unwrap_or("-"),
            result.reconciliation().description()
        );
    }
    println!(
        "{}/{} runnable, {} registered, {} discrepancies",
        summary.runnable, summary.total, summary.registry_found, summary.discrepancies
    );
    if summary.runnable == summary.total {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[cfg(windows)]
async fn repair_path(ctx: &devtool_provision::SetupContext) -> ExitCode {
    use devtool_provision::RepairStatus;

    let summary = ctx.repairer().repair_all().await;
    for line in &summary.tools {
        let status = match &line.status {
            RepairStatus::Healthy => "ok".to_string(),
            RepairStatus::Repaired {
                added,
                restart_required: false,
            } => format!("repaired ({added} added)"),
            RepairStatus::Repaired { added, .. } => {
                format!("repaired ({added} added), restart the terminal")
            }
            RepairStatus::Failed { message } => format!("failed: {message}"),
            RepairStatus::NotInstalled => "not installed".to_string(),
        };
        println!("{:<12} {}", line.tool, status);
    }
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[cfg(windows)]
async fn provision(ctx: devtool_provision::SetupContext) -> ExitCode {
    use devtool_provision::{AutoInstaller, PipelineOutcome, SessionEvent};
    use indicatif::{ProgressBar, ProgressStyle};

    let poll_interval = ctx.config.poll_interval;
    let error_log = ctx.error_log.clone();
    let mut installer = AutoInstaller::new(ctx);
    let session = match installer.start() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e}\nFix: {}", e.fix_suggestion());
            return ExitCode::from(1);
        }
    };

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut ticker = tokio::time::interval(poll_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    while session.is_running() {
        tokio::select! {
            _ = ticker.tick() => {
                for event in session.drain() {
                    match event {
                        SessionEvent::Progress { percent, message } => {
                            bar.set_position(u64::from(percent));
                            bar.set_message(message);
                        }
                        SessionEvent::Log(line) => bar.println(line),
                        SessionEvent::Finished(_) => {}
                    }
                }
            }
            _ = &mut ctrl_c, if !stopping => {
                stopping = true;
                bar.println("Stopping after the current operation...");
                session.request_stop();
            }
        }
    }
    bar.finish_and_clear();

    let code = match session.outcome() {
        Some(PipelineOutcome::Completed) => {
            println!("All tools installed. Open a new terminal to use them.");
            ExitCode::SUCCESS
        }
        Some(PipelineOutcome::Cancelled { at_step }) => {
            println!("Installation cancelled at: {at_step}");
            ExitCode::from(130)
        }
        Some(PipelineOutcome::Failed { step, message }) => {
            eprintln!("{step} failed: {message}");
            ExitCode::from(1)
        }
        None => ExitCode::from(1),
    };

    if let Some(path) = error_log.saved_log_path() {
        println!("Error log saved to {}", path.display());
    }
    code
}
