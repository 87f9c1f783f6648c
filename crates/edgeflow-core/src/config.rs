//! edgeflow.toml configuration parser.
//!
//! Every section has a default matching the reference two-site edge
//! deployment, so a missing file (or an empty one) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::intent::{Intent, ServiceType};
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid duration {0:?}")]
    Duration(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeflowConfig {
    /// Edge sites keyed by name; `targetSite` and `--targets` refer to these.
    pub sites: BTreeMap<String, SiteConfig>,
    /// Resource profiles keyed by [`ServiceType::key`].
    pub profiles: BTreeMap<String, ServiceProfile>,
    /// Latency breakpoints mapping an SLA to a 5QI class.
    pub qos: QosConfig,
    /// Targets for intents that omit `targetSite`.
    pub defaults: DefaultsConfig,
    /// Orchestrator settings: gate, verification, retry and paths.
    pub rollout: RolloutConfig,
}

/// Static per-site identity used by the compiler and the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Cluster name stamped into the provisioning request.
    pub cluster: String,
    /// Namespace every resource for this site is created in.
    pub namespace: String,
    /// MCC followed by a two- or three-digit MNC.
    pub plmn_id: String,
    /// gNodeB identifier serving the slice.
    pub gnb_id: String,
    /// Tracking area code.
    pub tac: String,
    /// Flat JSON metrics endpoint used by the SLO gate.
    pub metrics_url: Option<String>,
    /// Reconciliation status endpoint polled during verification.
    pub sync_status_url: Option<String>,
}

/// Sizing and network profile for one service type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProfile {
    /// CPU request, e.g. `"8"`.
    pub cpu: String,
    /// Memory request, e.g. `"16Gi"`.
    pub memory: String,
    /// Storage request, e.g. `"100Gi"`.
    pub storage: String,
    /// Network profile label on the provisioning request.
    pub network_profile: String,
    /// Slice type on the network slice (`eMBB`, `URLLC`, `mMTC`).
    pub slice_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosBreakpoint {
    /// Inclusive latency ceiling in milliseconds.
    pub max_latency_ms: f64,
    /// 5QI assigned at or below the ceiling.
    pub five_qi: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    /// Ascending by `max_latency_ms`.
    pub breakpoints: Vec<QosBreakpoint>,
    /// 5QI above the highest breakpoint.
    pub default_five_qi: u8,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            breakpoints: vec![
                QosBreakpoint { max_latency_ms: 1.0, five_qi: 1 },
                QosBreakpoint { max_latency_ms: 10.0, five_qi: 5 },
                QosBreakpoint { max_latency_ms: 50.0, five_qi: 7 },
            ],
            default_five_qi: 9,
        }
    }
}

impl QosConfig {
    /// Select the 5QI class for a latency requirement.
    pub fn classify(&self, latency_ms: f64) -> u8 {
        self.breakpoints
            .iter()
            .find(|bp| latency_ms <= bp.max_latency_ms)
            .map(|bp| bp.five_qi)
            .unwrap_or(self.default_five_qi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Target used when an intent omits `targetSite`.
    pub target_site: String,
    /// Per-service override of `target_site`, keyed by [`ServiceType::key`].
    pub target_site_by_service: BTreeMap<String, String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            target_site: crate::intent::ALL_SITES.to_string(),
            target_site_by_service: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Threshold expression evaluated against each target's metrics.
    pub slo: String,
    /// Root of the version-controlled delivery tree.
    pub delivery_root: PathBuf,
    /// Directory under `<delivery_root>/<site>/` receiving the bundle.
    pub site_dir: String,
    /// Parent of the per-attempt report directories.
    pub report_dir: PathBuf,
    /// Top-level intent fields checked during validation.
    pub required_fields: Vec<String>,
    /// Timeout for each metrics fetch.
    pub gate_timeout: String,
    pub verify: VerifyConfig,
    /// Backoff for metrics fetches and delivery commands.
    pub retry: RetryConfig,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            slo: "latency_p95_ms<=15,success_rate>=0.995".to_string(),
            delivery_root: PathBuf::from("."),
            site_dir: "deployments".to_string(),
            report_dir: PathBuf::from("reports"),
            required_fields: vec!["intentId".to_string()],
            gate_timeout: "30s".to_string(),
            verify: VerifyConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Fixed wait used for sites without a `sync_status_url`.
    pub grace_period: String,
    /// Delay between sync-status polls.
    pub poll_interval: String,
    /// How long to wait for reconciliation before failing the attempt.
    pub timeout: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            grace_period: "5s".to_string(),
            poll_interval: "2s".to_string(),
            timeout: "120s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries including the first; must be at least 1.
    pub max_attempts: u32,
    /// Delay before the second try, doubled after each failure.
    pub initial_backoff: String,
    /// Upper bound on the doubled delay.
    pub max_backoff: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: "1s".to_string(),
            max_backoff: "10s".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> ConfigResult<RetryPolicy> {
        Ok(RetryPolicy::new(
            self.max_attempts,
            parse_duration(&self.initial_backoff)?,
            parse_duration(&self.max_backoff)?,
        ))
    }
}

impl Default for EdgeflowConfig {
    fn default() -> Self {
        let mut sites = BTreeMap::new();
        sites.insert(
            "edge1".to_string(),
            SiteConfig {
                cluster: "edge-cluster-01".to_string(),
                namespace: "edge1".to_string(),
                plmn_id: "00101".to_string(),
                gnb_id: "00001".to_string(),
                tac: "0001".to_string(),
                metrics_url: Some("http://172.16.4.45:30090/metrics".to_string()),
                sync_status_url: None,
            },
        );
        sites.insert(
            "edge2".to_string(),
            SiteConfig {
                cluster: "edge-cluster-02".to_string(),
                namespace: "edge2".to_string(),
                plmn_id: "00102".to_string(),
                gnb_id: "00002".to_string(),
                tac: "0002".to_string(),
                metrics_url: Some("http://172.16.4.176:30090/metrics".to_string()),
                sync_status_url: None,
            },
        );

        let profile = |cpu: &str, memory: &str, storage: &str, net: &str, slice: &str| {
            ServiceProfile {
                cpu: cpu.to_string(),
                memory: memory.to_string(),
                storage: storage.to_string(),
                network_profile: net.to_string(),
                slice_type: slice.to_string(),
            }
        };
        let mut profiles = BTreeMap::new();
        profiles.insert("embb".to_string(), profile("8", "16Gi", "100Gi", "embb", "eMBB"));
        profiles.insert("mmtc".to_string(), profile("4", "8Gi", "50Gi", "mmtc", "mMTC"));
        profiles.insert("urllc".to_string(), profile("16", "32Gi", "200Gi", "urllc", "URLLC"));
        profiles.insert("generic".to_string(), profile("2", "4Gi", "20Gi", "generic", "eMBB"));

        Self {
            sites,
            profiles,
            qos: QosConfig::default(),
            defaults: DefaultsConfig::default(),
            rollout: RolloutConfig::default(),
        }
    }
}

impl EdgeflowConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: EdgeflowConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the built-in defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the compiler cannot use: no sites, reserved or
    /// malformed site fields, unsorted breakpoints, unknown default targets
    /// and unparsable durations.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sites.is_empty() {
            return Err(ConfigError::Invalid("at least one site is required".into()));
        }
        for (name, site) in &self.sites {
            if Intent::targets_all_sites(name) {
                return Err(ConfigError::Invalid(format!("site name {name:?} is reserved")));
            }
            if site.namespace.is_empty() || site.cluster.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "site {name} needs both cluster and namespace"
                )));
            }
            if !(5..=6).contains(&site.plmn_id.len()) || !site.plmn_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Invalid(format!(
                    "site {name} plmn_id must be 5 or 6 digits, got {:?}",
                    site.plmn_id
                )));
            }
        }

        if !self.profiles.contains_key(ServiceType::Embb.key()) {
            return Err(ConfigError::Invalid(
                "profiles.embb is required as the fallback profile".into(),
            ));
        }

        let ascending = self
            .qos
            .breakpoints
            .windows(2)
            .all(|w| w[0].max_latency_ms < w[1].max_latency_ms);
        if !ascending {
            return Err(ConfigError::Invalid(
                "qos.breakpoints must be strictly ascending by max_latency_ms".into(),
            ));
        }

        let defaults = std::iter::once(&self.defaults.target_site)
            .chain(self.defaults.target_site_by_service.values());
        for target in defaults {
            if !Intent::targets_all_sites(target) && !self.sites.contains_key(target) {
                return Err(ConfigError::Invalid(format!(
                    "default target site {target:?} is not a configured site"
                )));
            }
        }

        if self.rollout.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("rollout.retry.max_attempts must be >= 1".into()));
        }
        self.rollout.retry.policy()?;
        parse_duration(&self.rollout.gate_timeout)?;
        parse_duration(&self.rollout.verify.grace_period)?;
        parse_duration(&self.rollout.verify.poll_interval)?;
        parse_duration(&self.rollout.verify.timeout)?;
        Ok(())
    }

    /// Resource profile for a service type, falling back to eMBB.
    pub fn profile(&self, service: ServiceType) -> Option<&ServiceProfile> {
        self.profiles
            .get(service.key())
            .or_else(|| self.profiles.get(ServiceType::Embb.key()))
    }

    /// Target used when an intent does not name one.
    pub fn default_target(&self, service: ServiceType) -> &str {
        self.defaults
            .target_site_by_service
            .get(service.key())
            .unwrap_or(&self.defaults.target_site)
    }

    pub fn site_names(&self) -> Vec<String> {
        self.sites.keys().cloned().collect()
    }
}

/// Parse a duration string like "5s", "500ms", "2m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let trimmed = s.trim();
    let parsed = if let Some(ms) = trimmed.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = trimmed.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = trimmed.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        trimmed.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| ConfigError::Duration(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EdgeflowConfig::default();
        config.validate().unwrap();
        assert_eq!(config.site_names(), vec!["edge1", "edge2"]);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = EdgeflowConfig::from_toml_str("").unwrap();
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.rollout.slo, "latency_p95_ms<=15,success_rate>=0.995");
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let toml_str = EdgeflowConfig::default().to_toml_string().unwrap();
        assert!(toml_str.contains("edge-cluster-01"));
        let back = EdgeflowConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(back.sites, EdgeflowConfig::default().sites);
    }

    #[test]
    fn parse_custom_sites() {
        let toml_str = r#"
[sites.lab]
cluster = "lab-cluster"
namespace = "lab"
plmn_id = "99901"
gnb_id = "00042"
tac = "0042"
metrics_url = "http://127.0.0.1:9090/metrics"

[defaults]
target_site = "lab"

[rollout]
slo = "latency_p95_ms<=20"
"#;
        let config = EdgeflowConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.site_names(), vec!["lab"]);
        assert_eq!(config.default_target(ServiceType::Urllc), "lab");
        assert_eq!(config.rollout.slo, "latency_p95_ms<=20");
        // Untouched sections keep their defaults.
        assert_eq!(config.rollout.site_dir, "deployments");
    }

    #[test]
    fn unknown_default_site_is_rejected() {
        let err = EdgeflowConfig::from_toml_str("[defaults]\ntarget_site = \"mars\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn plmn_id_must_be_five_or_six_digits() {
        for (plmn, ok) in [("00101", true), ("310260", true), ("0010", false), ("3102601", false), ("31a26", false)] {
            let mut config = EdgeflowConfig::default();
            if let Some(site) = config.sites.values_mut().next() {
                site.plmn_id = plmn.to_string();
            }
            assert_eq!(config.validate().is_ok(), ok, "{plmn}");
        }
    }

    #[test]
    fn unsorted_breakpoints_are_rejected() {
        let toml_str = r#"
[qos]
default_five_qi = 9
breakpoints = [
  { max_latency_ms = 10.0, five_qi = 5 },
  { max_latency_ms = 1.0, five_qi = 1 },
]
"#;
        assert!(EdgeflowConfig::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn zero_retry_attempts_are_rejected() {
        let toml_str = "[rollout.retry]\nmax_attempts = 0\n";
        assert!(EdgeflowConfig::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn qos_breakpoints_are_inclusive() {
        let qos = QosConfig::default();
        assert_eq!(qos.classify(0.5), 1);
        assert_eq!(qos.classify(1.0), 1);
        assert_eq!(qos.classify(5.0), 5);
        assert_eq!(qos.classify(10.0), 5);
        assert_eq!(qos.classify(50.0), 7);
        assert_eq!(qos.classify(51.0), 9);
    }

    #[test]
    fn profile_falls_back_to_embb() {
        let mut config = EdgeflowConfig::default();
        config.profiles.remove("generic");
        let profile = config.profile(ServiceType::Generic).unwrap();
        assert_eq!(profile.slice_type, "eMBB");
        assert_eq!(profile.cpu, "8");
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edgeflow.toml");
        std::fs::write(&path, "[rollout]\nreport_dir = \"out/reports\"\n").unwrap();
        let config = EdgeflowConfig::load(Some(&path)).unwrap();
        assert_eq!(config.rollout.report_dir, PathBuf::from("out/reports"));

        let missing = EdgeflowConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(parse_duration("soon").is_err());
    }
}
