//! Version-controlled delivery tree.
//!
//! Each site owns `<root>/<site>/`, which a reconciliation agent watches.
//! Publishing writes a bundle into `<root>/<site>/<site_dir>/` and commits
//! only that path. Rollback hard-resets the whole tree to the snapshot, so
//! commits for every site published since then are discarded together, and
//! then removes untracked files left in any directory it wrote to.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use edgeflow_compiler::RenderedFile;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DeliveryError, DeliveryResult};

/// Opaque pointer to the pre-rollout state of the delivery tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotRef(String);

impl SnapshotRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where rendered bundles are delivered.
pub trait DeliveryTarget: Send + Sync {
    /// Capture the current head.
    fn snapshot(&self) -> DeliveryResult<SnapshotRef>;

    /// Write `files` for `site` and commit them. Returns the new revision,
    /// or `None` when the content was already identical.
    fn publish(&self, site: &str, files: &[RenderedFile], message: &str) -> DeliveryResult<Option<String>>;

    /// Discard everything after `snapshot`. Resetting twice to the same
    /// snapshot is the same as resetting once.
    fn reset(&self, snapshot: &SnapshotRef) -> DeliveryResult<()>;
}

/// A delivery tree backed by a local git checkout.
#[derive(Debug)]
pub struct GitDeliveryTarget {
    root: PathBuf,
    site_dir: String,
    identity: Option<(String, String)>,
    /// `<site>/<site_dir>` paths written since construction.
    touched: Mutex<BTreeSet<String>>,
}

impl GitDeliveryTarget {
    pub fn new(root: impl Into<PathBuf>, site_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            site_dir: site_dir.into(),
            identity: None,
            touched: Mutex::new(BTreeSet::new()),
        }
    }

    /// Commit as `name <email>` instead of the repository's configured user.
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory receiving `site`'s bundle.
    pub fn deploy_dir(&self, site: &str) -> PathBuf {
        self.root.join(site).join(&self.site_dir)
    }

    fn git(&self, args: &[&str]) -> DeliveryResult<String> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.root);
        if let Some((name, email)) = &self.identity {
            cmd.arg("-c").arg(format!("user.name={name}"));
            cmd.arg("-c").arg(format!("user.email={email}"));
        }
        cmd.args(args);

        let command = format!("git {}", args.join(" "));
        debug!(%command, root = %self.root.display(), "running git");
        let out = cmd.output().map_err(|source| DeliveryError::Spawn {
            command: command.clone(),
            source,
        })?;
        if !out.status.success() {
            return Err(DeliveryError::Command {
                command,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

impl DeliveryTarget for GitDeliveryTarget {
    fn snapshot(&self) -> DeliveryResult<SnapshotRef> {
        let head = self.git(&["rev-parse", "HEAD"])?;
        Ok(SnapshotRef::new(head))
    }

    fn publish(&self, site: &str, files: &[RenderedFile], message: &str) -> DeliveryResult<Option<String>> {
        let site_root = self.root.join(site);
        if !site_root.is_dir() {
            return Err(DeliveryError::MissingSiteDir(site_root));
        }

        let scope = format!("{site}/{}", self.site_dir);
        if let Ok(mut touched) = self.touched.lock() {
            touched.insert(scope.clone());
        }

        let deploy_dir = self.deploy_dir(site);
        fs::create_dir_all(&deploy_dir).map_err(|e| DeliveryError::io(&deploy_dir, e))?;
        for file in files {
            let path = deploy_dir.join(&file.file_name);
            fs::write(&path, &file.contents).map_err(|e| DeliveryError::io(&path, e))?;
        }

        self.git(&["add", "--", &scope])?;
        if self.git(&["status", "--porcelain", "--", &scope])?.is_empty() {
            info!(%site, "bundle unchanged, nothing to commit");
            return Ok(None);
        }
        self.git(&["commit", "-m", message, "--", &scope])?;
        let revision = self.git(&["rev-parse", "HEAD"])?;
        info!(%site, %revision, files = files.len(), "published bundle");
        Ok(Some(revision))
    }

    fn reset(&self, snapshot: &SnapshotRef) -> DeliveryResult<()> {
        self.git(&["reset", "--hard", snapshot.as_str()])?;
        let touched: Vec<String> = self
            .touched
            .lock()
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default();
        if !touched.is_empty() {
            let mut args = vec!["clean", "-fdq", "--"];
            args.extend(touched.iter().map(String::as_str));
            self.git(&args)?;
        }
        info!(snapshot = %snapshot, "delivery tree reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeflow_compiler::ResourceKind;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok_and(|o| o.status.success())
    }

    fn init_repo(sites: &[&str]) -> (tempfile::TempDir, GitDeliveryTarget) {
        let dir = tempfile::tempdir().unwrap();
        let target = GitDeliveryTarget::new(dir.path(), "deployments").with_identity("edgeflow", "edgeflow@example.invalid");
        target.git(&["init", "-q"]).unwrap();
        for site in sites {
            fs::create_dir_all(dir.path().join(site)).unwrap();
            fs::write(dir.path().join(site).join(".keep"), "").unwrap();
        }
        target.git(&["add", "-A"]).unwrap();
        target.git(&["commit", "-q", "-m", "init"]).unwrap();
        (dir, target)
    }

    fn file(name: &str, contents: &str) -> RenderedFile {
        RenderedFile {
            file_name: name.to_string(),
            kind: ResourceKind::ConfigMap,
            contents: contents.to_string(),
        }
    }

    #[test]
    fn publish_commits_and_reset_restores() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let (dir, target) = init_repo(&["edge1", "edge2"]);
        let snapshot = target.snapshot().unwrap();

        let rev = target
            .publish("edge1", &[file("a.yaml", "a: 1\n")], "deploy edge1")
            .unwrap()
            .unwrap();
        assert_ne!(rev, snapshot.as_str());
        target.publish("edge2", &[file("b.yaml", "b: 1\n")], "deploy edge2").unwrap();
        assert!(dir.path().join("edge2/deployments/b.yaml").is_file());

        target.reset(&snapshot).unwrap();
        assert_eq!(target.snapshot().unwrap(), snapshot);
        assert!(!dir.path().join("edge1/deployments/a.yaml").exists());
        assert!(!dir.path().join("edge2/deployments/b.yaml").exists());

        target.reset(&snapshot).unwrap();
        assert_eq!(target.snapshot().unwrap(), snapshot);
    }

    #[test]
    fn reset_removes_files_from_a_partial_write() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let (dir, target) = init_repo(&["edge1"]);
        let nested = dir.path().join("edge1/deployments/sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("keep"), "").unwrap();
        target.git(&["add", "-A"]).unwrap();
        target.git(&["commit", "-q", "-m", "nested"]).unwrap();
        let snapshot = target.snapshot().unwrap();

        // Writing over the committed directory fails after a.yaml is on disk.
        let err = target
            .publish("edge1", &[file("a.yaml", "a: 1\n"), file("sub", "x")], "deploy edge1")
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Io { .. }));
        assert!(dir.path().join("edge1/deployments/a.yaml").is_file());

        target.reset(&snapshot).unwrap();
        assert!(!dir.path().join("edge1/deployments/a.yaml").exists());
        assert!(nested.join("keep").is_file());
        assert_eq!(target.snapshot().unwrap(), snapshot);
    }

    #[test]
    fn unchanged_bundle_is_not_committed() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let (_dir, target) = init_repo(&["edge1"]);
        let files = [file("a.yaml", "a: 1\n")];
        assert!(target.publish("edge1", &files, "first").unwrap().is_some());
        assert!(target.publish("edge1", &files, "second").unwrap().is_none());
    }

    #[test]
    fn missing_site_directory_fails() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let (_dir, target) = init_repo(&["edge1"]);
        let err = target.publish("edge9", &[file("a.yaml", "")], "msg").unwrap_err();
        assert!(matches!(err, DeliveryError::MissingSiteDir(_)));
    }

    #[test]
    fn snapshot_outside_a_repository_fails() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let target = GitDeliveryTarget::new(dir.path(), "deployments");
        assert!(matches!(target.snapshot(), Err(DeliveryError::Command { .. })));
    }
}
