use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use edgeflow_compiler::{ChecksumManifest, MANIFEST_FILE};

#[derive(Args)]
pub struct VerifyArgs {
    /// Directory written by `edgeflow compile`.
    pub dir: PathBuf,

    /// Manifest to check against (default: <dir>/manifest.json).
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}

pub fn run(args: VerifyArgs) -> anyhow::Result<ExitCode> {
    let manifest_path = args.manifest.unwrap_or_else(|| args.dir.join(MANIFEST_FILE));
    let manifest = ChecksumManifest::load(&manifest_path)
        .with_context(|| format!("failed to read manifest {}", manifest_path.display()))?;

    let drift = manifest.verify(&args.dir)?;
    if drift.is_empty() {
        println!(
            "✓ {} files match {}",
            manifest.generated_files.len(),
            manifest_path.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!("✗ {} files drifted from {}", drift.len(), manifest_path.display());
    for entry in &drift {
        eprintln!("  {entry}");
    }
    Ok(ExitCode::FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeflow_compiler::IntentCompiler;
    use edgeflow_core::{EdgeflowConfig, Intent};

    fn compile_into(dir: &std::path::Path) {
        let intent = Intent::from_json_str(r#"{"intentId":"i1","targetSite":"edge1"}"#).unwrap();
        let compilation = IntentCompiler::new(EdgeflowConfig::default()).translate(&intent).unwrap();
        compilation.save(dir, false).unwrap();
    }

    #[test]
    fn clean_output_verifies() {
        let dir = tempfile::tempdir().unwrap();
        compile_into(dir.path());
        let code = run(VerifyArgs {
            dir: dir.path().to_path_buf(),
            manifest: None,
        })
        .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn edited_file_is_drift() {
        let dir = tempfile::tempdir().unwrap();
        compile_into(dir.path());
        std::fs::write(dir.path().join("edge1/kustomization.yaml"), "tampered\n").unwrap();
        let code = run(VerifyArgs {
            dir: dir.path().to_path_buf(),
            manifest: None,
        })
        .unwrap();
        assert_eq!(code, ExitCode::FAILURE);
    }
}
