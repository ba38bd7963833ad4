//! The standard six-step provisioning pipeline.
//!
//! | # | Step                   | Band     |
//! |---|------------------------|----------|
//! | 1 | Install Chocolatey     | 0–20     |
//! | 2 | Detect package manager | 20–40    |
//! | 3 | Install Git            | 40–60    |
//! | 4 | Install Node.js        | 60–80    |
//! | 5 | Install Claude CLI     | 80–90    |
//! | 6 | Install Gemini CLI     | 90–100   |

use super::step::{InstallationStep, ProgressBand, StepContext};
use crate::config::ManagerPreference;
use crate::context::SetupContext;
use crate::detection::Detection;
use crate::error::SetupError;
use crate::error_log::FailureRecord;
use crate::install::{InstallOutcome, InstallProgress, InstallReport};
use crate::process::CommandSpec;
use crate::tool_kind::{PackageManager, ToolKind};
use std::future::Future;
use tracing::{info, warn};

fn step<F, Fut>(
    ctx: &SetupContext,
    ordinal: usize,
    name: &str,
    band: ProgressBand,
    action: F,
) -> InstallationStep
where
    F: Fn(SetupContext, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SetupError>> + Send + 'static,
{
    let ctx = ctx.clone();
    InstallationStep::new(ordinal, name, band, move |step: StepContext| {
        action(ctx.clone(), step)
    })
}

/// The six standard steps, in order.
pub fn standard_steps(ctx: &SetupContext) -> Vec<InstallationStep> {
    vec![
        step(ctx, 1, "Install Chocolatey", ProgressBand::new(0, 20), bootstrap_chocolatey),
        step(ctx, 2, "Detect package manager", ProgressBand::new(20, 40), detect_package_manager),
        step(ctx, 3, "Install Git", ProgressBand::new(40, 60), |ctx, step| async move {
            install_tool(&ctx, &step, ToolKind::Git).await.map(drop)
        }),
        step(ctx, 4, "Install Node.js", ProgressBand::new(60, 80), install_node),
        step(ctx, 5, "Install Claude CLI", ProgressBand::new(80, 90), |ctx, step| async move {
            install_tool(&ctx, &step, ToolKind::ClaudeCli).await.map(drop)
        }),
        step(ctx, 6, "Install Gemini CLI", ProgressBand::new(90, 100), install_gemini_and_verify),
    ]
}

/// Up to `detection_attempts` checks for `manager`, with a backoff and a
/// PATH reload between attempts.
///
/// Checks the stop flag before every attempt and after every backoff.
/// Returns the last detection, usable or not.
pub async fn detect_with_retry(
    ctx: &SetupContext,
    step: &StepContext,
    manager: PackageManager,
) -> Result<Detection, SetupError> {
    let detector = ctx.detector();
    let store = ctx.store();
    let attempts = ctx.config.detection_attempts.max(1);

    let mut attempt = 1;
    loop {
        step.check_stop()?;
        step.advance(
            attempt as f32 / (attempts + 1) as f32,
            format!("Checking {manager} (attempt {attempt}/{attempts})"),
        )
        .await;

        let detection = detector.check(manager).await;
        if detection.is_usable() || attempt >= attempts {
            return Ok(detection);
        }
        step.log(format!("{manager} not found yet; retrying")).await;

        tokio::time::sleep(ctx.config.detection_backoff).await;
        step.check_stop()?;
        if let Err(e) = store.refresh_process_path() {
            warn!(error = %e, "could not reload PATH between detection attempts");
        }
        attempt += 1;
    }
}

fn winget_allowed(ctx: &SetupContext) -> bool {
    !matches!(ctx.config.manager_preference, ManagerPreference::Chocolatey)
}

async fn bootstrap_chocolatey(ctx: SetupContext, step: StepContext) -> Result<(), SetupError> {
    if matches!(ctx.config.manager_preference, ManagerPreference::Winget) {
        step.log("Chocolatey skipped; winget was requested").await;
        return Ok(());
    }

    step.advance(0.1, "Checking for Chocolatey").await;
    if ctx.detector().check(PackageManager::Chocolatey).await.is_usable() {
        step.log("Chocolatey is already installed").await;
        return Ok(());
    }

    step.check_stop()?;
    step.advance(0.3, "Installing Chocolatey").await;
    let bootstrap = &ctx.config.bootstrap;
    let spec = CommandSpec::new(&bootstrap.program, ctx.config.bootstrap_timeout)
        .args(bootstrap.args.iter().cloned())
        .direct();
    let failure = match ctx.runner.run(&spec).await {
        Ok(out) if out.succeeded() => None,
        Ok(out) => {
            let diagnostic = out.diagnostic();
            Some(if diagnostic.is_empty() {
                format!("bootstrap exited with code {:?}", out.code)
            } else {
                diagnostic
            })
        }
        Err(e) => Some(e.to_string()),
    };

    if let Err(e) = ctx.store().refresh_process_path() {
        warn!(error = %e, "could not reload PATH after the Chocolatey bootstrap");
    }

    let Some(reason) = failure else {
        step.log("Chocolatey installed").await;
        return Ok(());
    };

    if winget_allowed(&ctx) && ctx.detector().detect(PackageManager::Winget).await.is_usable() {
        warn!(reason = %reason, "Chocolatey bootstrap failed; continuing with winget");
        step.log(format!("Chocolatey could not be installed ({reason}); continuing with winget"))
            .await;
        return Ok(());
    }

    Err(SetupError::InstallerFailed {
        tool: "Chocolatey".to_string(),
        message: reason,
        exit_code: None,
        stdout: None,
        stderr: None,
        fix: "Run the installer from an elevated (Administrator) terminal with internet access"
            .to_string(),
    })
}

async fn detect_package_manager(ctx: SetupContext, step: StepContext) -> Result<(), SetupError> {
    let primary = match ctx.config.manager_preference {
        ManagerPreference::Winget => PackageManager::Winget,
        ManagerPreference::Auto | ManagerPreference::Chocolatey => PackageManager::Chocolatey,
    };

    let detection = detect_with_retry(&ctx, &step, primary).await?;
    if detection.is_usable() {
        if detection.is_off_path() {
            step.log(format!(
                "{primary} found but not on PATH; using {}",
                detection.program().unwrap_or_default()
            ))
            .await;
        } else {
            step.log(format!("{primary} is ready")).await;
        }
        return Ok(());
    }

    let mut tried = vec![primary];
    if primary == PackageManager::Chocolatey && winget_allowed(&ctx) {
        step.check_stop()?;
        step.advance(0.9, "Checking winget").await;
        tried.push(PackageManager::Winget);
        if ctx.detector().detect(PackageManager::Winget).await.is_usable() {
            warn!("Chocolatey unavailable; falling back to winget");
            step.log("Chocolatey unavailable; using winget").await;
            return Ok(());
        }
    }

    Err(SetupError::no_package_manager(tried))
}

fn describe(progress: &InstallProgress) -> (f32, String) {
    match progress {
        InstallProgress::Started { tool } => (0.05, format!("{tool}: {}", progress.description())),
        InstallProgress::Verifying { tool } => (0.1, format!("{tool}: {}", progress.description())),
        InstallProgress::CheckingPrerequisites { tool } => {
            (0.2, format!("{tool}: {}", progress.description()))
        }
        InstallProgress::Installing { tool, method } => (0.3, format!("Installing {tool} via {method}")),
        InstallProgress::FallingBack { from, reason } => {
            (0.3, format!("{from} failed ({reason}); trying the next package manager"))
        }
        InstallProgress::Propagating { tool, .. } => (0.7, format!("{tool}: {}", progress.description())),
        InstallProgress::Completed { tool } => (0.95, format!("{tool}: {}", progress.description())),
    }
}

async fn install_tool(
    ctx: &SetupContext,
    step: &StepContext,
    kind: ToolKind,
) -> Result<InstallReport, SetupError> {
    step.check_stop()?;
    let reporter = step.clone();
    let report = ctx
        .installer()
        .install(&kind.descriptor(), move |progress| {
            let (fraction, message) = describe(&progress);
            reporter.advance_now(fraction, message);
        })
        .await?;

    let summary = match &report.outcome {
        InstallOutcome::AlreadyPresent => format!("{} is already installed", report.tool),
        InstallOutcome::Repaired => format!("{} was installed; PATH repaired", report.tool),
        InstallOutcome::Installed { method } => format!("{} installed via {method}", report.tool),
    };
    info!(tool = %report.tool, version = ?report.verification.version, "{summary}");
    step.log(summary).await;
    for warning in &report.warnings {
        step.log(format!("Warning: {warning}")).await;
    }
    Ok(report)
}

async fn install_node(ctx: SetupContext, step: StepContext) -> Result<(), SetupError> {
    install_tool(&ctx, &step, ToolKind::NodeJs).await?;

    step.check_stop()?;
    step.advance(0.97, "Adding the npm global directory to the user PATH").await;
    let npm = ToolKind::Npm.descriptor();
    match ctx.propagator().ensure_in_path(&npm, &npm.install_dirs).await {
        Ok(report) if report.restart_required => {
            step.log("npm global directory added; a terminal restart may be required")
                .await;
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "could not add the npm global directory to PATH");
            ctx.error_log.record(FailureRecord::new(
                npm.display_name.clone(),
                e.to_string(),
                e.fix_suggestion(),
            ));
            step.log(format!("Warning: {e}")).await;
        }
    }
    Ok(())
}

async fn install_gemini_and_verify(ctx: SetupContext, step: StepContext) -> Result<(), SetupError> {
    install_tool(&ctx, &step, ToolKind::GeminiCli).await?;

    step.check_stop()?;
    step.advance(0.97, "Verifying all tools").await;
    let summary = ctx.verifier().verify_all().await;
    step.log(format!(
        "{}/{} tools runnable, {} registered, {} discrepancies",
        summary.runnable, summary.total, summary.registry_found, summary.discrepancies
    ))
    .await;
    for result in summary.not_runnable() {
        warn!(tool = %result.tool, status = result.execution_status.label(), "tool not runnable");
        step.log(format!(
            "Warning: {} is not runnable yet ({}); restart the terminal or IDE",
            result.tool,
            result.execution_status.label()
        ))
        .await;
    }

    if let Err(e) = ctx.store().refresh_process_path() {
        warn!(error = %e, "final PATH reload failed");
    }
    Ok(())
}
