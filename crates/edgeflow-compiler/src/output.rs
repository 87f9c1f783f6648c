//! Persisting bundles and the checksum manifest used for drift detection.
//!
//! Layout under the output directory:
//!
//! ```text
//! <out>/
//!   manifest.json
//!   <site>/
//!     <name>-provisioning-request.yaml
//!     <name>-configmap.yaml
//!     <name>-networkslice.yaml      (only with an SLA block)
//!     kustomization.yaml
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::compiler::Compilation;
use crate::error::{CompileError, CompileResult};
use crate::sha256_hex;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDigest {
    pub checksum: String,
    pub size_bytes: u64,
    pub resource_kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSummary {
    pub total_files: usize,
    pub total_sites: usize,
    pub total_resources: usize,
}

/// Digest of every generated artifact, keyed by `<site>/<file>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumManifest {
    pub timestamp: String,
    pub intent_id: String,
    pub checksum_algorithm: String,
    pub target_sites: Vec<String>,
    pub resource_counts: BTreeMap<String, usize>,
    pub generated_files: BTreeMap<String, ArtifactDigest>,
    pub summary: ManifestSummary,
}

/// What changed on disk relative to a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    Modified { path: String, expected: String, actual: String },
    Missing { path: String },
    Unlisted { path: String },
}

impl std::fmt::Display for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Drift::Modified { path, expected, actual } => {
                write!(f, "modified: {path} (expected {expected}, found {actual})")
            }
            Drift::Missing { path } => write!(f, "missing: {path}"),
            Drift::Unlisted { path } => write!(f, "unlisted: {path}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveReport {
    pub manifest_path: PathBuf,
    pub manifest: ChecksumManifest,
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
}

impl Compilation {
    /// Checksums keyed by `<site>/<Kind>/<name>`, without touching disk.
    pub fn checksums(&self) -> CompileResult<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for (site, bundle) in &self.bundles {
            for resource in &bundle.resources {
                let yaml = resource.to_yaml()?;
                out.insert(
                    format!("{site}/{}/{}", resource.kind.as_str(), resource.name),
                    sha256_hex(yaml.as_bytes()),
                );
            }
        }
        Ok(out)
    }

    pub fn manifest(&self) -> CompileResult<ChecksumManifest> {
        let mut generated_files = BTreeMap::new();
        let mut resource_counts = BTreeMap::new();
        for (site, bundle) in &self.bundles {
            resource_counts.insert(site.clone(), bundle.resources.len());
            for file in bundle.render()? {
                generated_files.insert(
                    format!("{site}/{}", file.file_name),
                    ArtifactDigest {
                        checksum: sha256_hex(file.contents.as_bytes()),
                        size_bytes: file.contents.len() as u64,
                        resource_kind: file.kind.as_str().to_string(),
                    },
                );
            }
        }

        Ok(ChecksumManifest {
            timestamp: self.timestamp.clone(),
            intent_id: self.intent_id.clone(),
            checksum_algorithm: "sha256".to_string(),
            target_sites: self.bundles.keys().cloned().collect(),
            summary: ManifestSummary {
                total_files: generated_files.len(),
                total_sites: self.bundles.len(),
                total_resources: self.resource_count(),
            },
            resource_counts,
            generated_files,
        })
    }

    /// Write every bundle under `out_dir` and a `manifest.json` beside them.
    ///
    /// With `skip_unchanged`, files whose current content already has the
    /// expected digest are left untouched.
    pub fn save(&self, out_dir: &Path, skip_unchanged: bool) -> CompileResult<SaveReport> {
        let mut written = Vec::new();
        let mut unchanged = Vec::new();

        for (site, bundle) in &self.bundles {
            let site_dir = out_dir.join(site);
            fs::create_dir_all(&site_dir).map_err(|e| CompileError::io(&site_dir, e))?;
            info!(%site, resources = bundle.resources.len(), "saving bundle");

            for file in bundle.render()? {
                let path = site_dir.join(&file.file_name);
                let relative = format!("{site}/{}", file.file_name);

                if skip_unchanged && digest_matches(&path, &file.contents) {
                    debug!(path = %path.display(), "skipping unchanged file");
                    unchanged.push(relative);
                    continue;
                }
                fs::write(&path, &file.contents).map_err(|e| CompileError::io(&path, e))?;
                debug!(path = %path.display(), "wrote resource");
                written.push(relative);
            }
        }

        let manifest = self.manifest()?;
        let manifest_path = out_dir.join(MANIFEST_FILE);
        manifest.write(&manifest_path)?;
        info!(path = %manifest_path.display(), files = manifest.summary.total_files, "wrote manifest");

        Ok(SaveReport {
            manifest_path,
            manifest,
            written,
            unchanged,
        })
    }
}

fn digest_matches(path: &Path, contents: &str) -> bool {
    match fs::read(path) {
        Ok(existing) => sha256_hex(&existing) == sha256_hex(contents.as_bytes()),
        Err(_) => false,
    }
}

impl ChecksumManifest {
    pub fn load(path: &Path) -> CompileResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write(&self, path: &Path) -> CompileResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| CompileError::io(path, e))
    }

    /// Compare the manifest against the files under `root`.
    ///
    /// Reports listed files whose digest differs or which are gone, and
    /// YAML files under `root` the manifest does not list.
    pub fn verify(&self, root: &Path) -> CompileResult<Vec<Drift>> {
        let mut drift = Vec::new();

        for (relative, digest) in &self.generated_files {
            let path = root.join(relative);
            match fs::read(&path) {
                Ok(bytes) => {
                    let actual = sha256_hex(&bytes);
                    if actual != digest.checksum {
                        drift.push(Drift::Modified {
                            path: relative.clone(),
                            expected: digest.checksum.clone(),
                            actual,
                        });
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    drift.push(Drift::Missing {
                        path: relative.clone(),
                    });
                }
                Err(e) => return Err(CompileError::io(path, e)),
            }
        }

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                CompileError::io(path, std::io::Error::other(e.to_string()))
            })?;
            let is_yaml = entry.path().extension().is_some_and(|ext| ext == "yaml");
            if !entry.file_type().is_file() || !is_yaml {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !self.generated_files.contains_key(&relative) {
                drift.push(Drift::Unlisted { path: relative });
            }
        }

        Ok(drift)
    }
}
