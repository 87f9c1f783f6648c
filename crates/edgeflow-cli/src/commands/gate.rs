use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use edgeflow_gate::{GateError, HttpMetricsSource, MetricsSource, SloGate};

#[derive(Args)]
pub struct GateArgs {
    /// Threshold expression, e.g. "latency_p95_ms<=15,success_rate>=0.995".
    #[arg(long)]
    pub slo: String,

    /// Metrics endpoint returning a flat JSON object of numbers.
    #[arg(long)]
    pub url: String,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Print the parsed constraints and fetched metrics.
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn run(args: GateArgs) -> anyhow::Result<ExitCode> {
    let gate = match SloGate::new(&args.slo) {
        Ok(gate) => gate,
        Err(e) => return Ok(fail(&e)),
    };
    let source = HttpMetricsSource::single(&args.url).with_timeout(Duration::from_secs(args.timeout));

    let metrics = match source.fetch(&args.url).await {
        Ok(metrics) => metrics,
        Err(e) => return Ok(fail(&e)),
    };
    if args.verbose {
        for constraint in gate.constraints().iter() {
            println!("  constraint: {constraint}");
        }
        println!("  metrics: {}", serde_json::to_string(&metrics)?);
    }

    match gate.check_snapshot(&args.url, &metrics) {
        Ok(_) => {
            println!("✓ SLO gate passed ({} constraints)", gate.constraints().len());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(fail(&e)),
    }
}

fn fail(error: &GateError) -> ExitCode {
    eprintln!("✗ SLO gate failed [{}]: {error}", error.kind());
    if let GateError::SloViolation { violations } = error {
        for violation in violations {
            eprintln!("  - {violation}");
        }
    }
    ExitCode::FAILURE
}
