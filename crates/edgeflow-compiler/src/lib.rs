//! edgeflow-compiler: deterministic translation of intents into site-scoped
//! KRM resource bundles.
//!
//! Each target site gets a bundle of:
//! 1. an O2IMS `ProvisioningRequest` sized from the service profile,
//! 2. a `ConfigMap` embedding the original intent for audit and replay,
//! 3. a `NetworkSlice` with QoS parameters (only when the intent has an SLA),
//! 4. a `Kustomization` listing the above.
//!
//! Output depends only on the intent, the site table and an injected
//! timestamp. Bundles can be persisted with a SHA-256 manifest that later
//! detects drift.

use sha2::{Digest, Sha256};

pub mod compiler;
pub mod error;
pub mod output;
pub mod resources;
pub mod sla;

pub use compiler::{Compilation, IntentCompiler};
pub use error::{CompileError, CompileResult, CompileWarning};
pub use output::{ArtifactDigest, ChecksumManifest, Drift, MANIFEST_FILE, SaveReport};
pub use resources::{RenderedFile, Resource, ResourceBundle, ResourceKind};

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_64_lowercase_chars() {
        let digest = sha256_hex(b"edgeflow");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
