use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use edgeflow_compiler::IntentCompiler;
use edgeflow_core::{EdgeflowConfig, Intent};

#[derive(Args)]
pub struct CompileArgs {
    /// Intent JSON file.
    pub intent: PathBuf,

    /// Output directory for the bundles and manifest.json.
    #[arg(short, long, default_value = "rendered")]
    pub output_dir: PathBuf,

    /// Compile for these sites instead of the intent's targetSite.
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub targets: Vec<String>,

    /// Print the rendered YAML instead of writing it.
    #[arg(long, conflicts_with = "checksums_only")]
    pub dry_run: bool,

    /// Print resource checksums as JSON without writing anything.
    #[arg(long)]
    pub checksums_only: bool,

    /// Rewrite every file even when its content is unchanged.
    #[arg(long)]
    pub no_cache: bool,
}

pub fn run(args: CompileArgs, config: EdgeflowConfig) -> anyhow::Result<ExitCode> {
    let intent = Intent::from_file(&args.intent)
        .with_context(|| format!("failed to load intent {}", args.intent.display()))?;
    let compiler = IntentCompiler::new(config);

    let compilation = if args.targets.is_empty() {
        compiler.translate(&intent)?
    } else {
        let mut sites = Vec::new();
        for target in &args.targets {
            for site in compiler.resolve_target(target)? {
                if !sites.contains(&site) {
                    sites.push(site);
                }
            }
        }
        compiler.translate_for(&intent, &sites)?
    };

    for warning in &compilation.warnings {
        eprintln!("warning: {warning}");
    }

    if args.checksums_only {
        println!("{}", serde_json::to_string_pretty(&compilation.checksums()?)?);
        return Ok(ExitCode::SUCCESS);
    }

    if args.dry_run {
        for (site, bundle) in &compilation.bundles {
            for file in bundle.render()? {
                println!("# {site}/{}", file.file_name);
                print!("{}", file.contents);
                println!("---");
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let saved = compilation.save(&args.output_dir, !args.no_cache)?;
    println!(
        "✓ Compiled intent {} for {} ({} resources)",
        compilation.intent_id,
        compilation.sites().join(", "),
        compilation.resource_count()
    );
    println!("  Written:   {}", saved.written.len());
    println!("  Unchanged: {}", saved.unchanged.len());
    println!("  Manifest:  {}", saved.manifest_path.display());
    Ok(ExitCode::SUCCESS)
}
