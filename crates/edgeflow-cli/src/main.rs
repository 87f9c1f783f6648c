use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use edgeflow_core::EdgeflowConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

/// Configuration file picked up from the working directory when `--config`
/// is not given.
const DEFAULT_CONFIG_FILE: &str = "edgeflow.toml";

const DEFAULT_LOG_FILTER: &str = "edgeflow=info,edgeflow_core=info,edgeflow_compiler=info,edgeflow_gate=info,edgeflow_rollout=info";

#[derive(Parser)]
#[command(
    name = "edgeflow",
    about = "Compile service intents into site bundles and roll them out behind an SLO gate",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to edgeflow.toml (default: ./edgeflow.toml if present, else built-in sites)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate an intent into per-site resource bundles.
    Compile(commands::compile::CompileArgs),
    /// Check a metrics endpoint against an SLO expression.
    ///
    /// Exits 0 when every constraint holds, 1 on a parse error, fetch
    /// error, missing metric or violation.
    Gate(commands::gate::GateArgs),
    /// Publish an intent to its target sites, gating each on the SLO and
    /// rolling back on failure.
    Rollout(commands::rollout::RolloutArgs),
    /// Compare rendered bundles against their checksum manifest.
    VerifyChecksums(commands::verify::VerifyArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Compile(args) => commands::compile::run(args, load_config(cli.config.as_deref())?),
        Commands::Gate(args) => commands::gate::run(args).await,
        Commands::Rollout(args) => commands::rollout::run(args, load_config(cli.config.as_deref())?).await,
        Commands::VerifyChecksums(args) => commands::verify::run(args),
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(DEFAULT_LOG_FILTER)?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<EdgeflowConfig> {
    let local = Path::new(DEFAULT_CONFIG_FILE);
    let path = explicit.or_else(|| local.is_file().then_some(local));
    match path {
        Some(path) => debug!(path = %path.display(), "loading configuration"),
        None => debug!("no configuration file, using built-in sites"),
    }
    Ok(EdgeflowConfig::load(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_rollout_targets_and_mode() {
        let cli = Cli::try_parse_from([
            "edgeflow",
            "rollout",
            "intent.json",
            "--targets",
            "edge1",
            "edge2",
            "--mode",
            "headless",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Rollout(args) => {
                assert_eq!(args.targets, vec!["edge1", "edge2"]);
                assert_eq!(args.mode, edgeflow_rollout::Mode::Headless);
                assert!(!args.dry_run);
            }
            _ => panic!("expected rollout"),
        }
    }

    #[test]
    fn gate_timeout_defaults_to_thirty_seconds() {
        let cli = Cli::try_parse_from(["edgeflow", "gate", "--slo", "latency_p95_ms<=15", "--url", "http://x/metrics"]).unwrap();
        match cli.command {
            Commands::Gate(args) => {
                assert_eq!(args.timeout, 30);
                assert!(!args.verbose);
            }
            _ => panic!("expected gate"),
        }
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(load_config(Some(missing.as_path())).is_err());
    }
}
