use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use edgeflow_core::EdgeflowConfig;
use edgeflow_rollout::{ConfirmationPolicy, Mode, Orchestrator, Outcome, RolloutOptions, RolloutPhase};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Args)]
pub struct RolloutArgs {
    /// Intent JSON file.
    pub intent: PathBuf,

    /// Sites to roll out to, in order (default: the intent's targetSite).
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub targets: Vec<String>,

    /// `safe` asks before each checkpoint, `headless` never asks.
    #[arg(long, default_value_t = Mode::Safe)]
    pub mode: Mode,

    /// Render and record what would happen without committing, gating or
    /// resetting anything.
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: RolloutArgs, config: EdgeflowConfig) -> anyhow::Result<ExitCode> {
    let options = RolloutOptions::from_config(&config)?
        .with_mode(args.mode)
        .with_dry_run(args.dry_run);
    let orchestrator = Orchestrator::from_config(config, options)?.with_confirmation(Arc::new(TerminalConfirm));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, stopping rollout");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "failed to listen for interrupt"),
        }
    });

    let run = orchestrator.run(args.intent, &args.targets, shutdown_rx).await?;
    if let Some(dir) = &run.report_dir {
        info!(path = %dir.display(), "execution report written");
    }

    let report = run.report_dir.as_ref().map(|d| d.display().to_string()).unwrap_or_default();
    match run.outcome {
        Outcome::Succeeded => println!("✓ Rollout succeeded. Report: {report}"),
        Outcome::Failed => eprintln!("✗ Rollout failed. Report: {report}"),
        Outcome::Declined if run.report.is_none() => eprintln!("Rollout declined; nothing was changed."),
        Outcome::Declined => eprintln!("Rollout declined and rolled back. Report: {report}"),
        Outcome::Cancelled => eprintln!("Rollout interrupted. Report: {report}"),
    }

    Ok(ExitCode::from(u8::try_from(run.outcome.exit_code()).unwrap_or(1)))
}

/// Asks on the terminal before each checkpoint. The orchestrator calls it
/// on the blocking pool, so the read does not hold up the runtime.
struct TerminalConfirm;

impl ConfirmationPolicy for TerminalConfirm {
    fn confirm(&self, phase: &RolloutPhase) -> bool {
        eprint!("Proceed with {phase}? (y/n): ");
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
