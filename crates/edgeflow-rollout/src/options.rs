//! Rollout options: operating mode and the timing knobs read from config.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use edgeflow_core::{ConfigResult, EdgeflowConfig, RetryPolicy, parse_duration};
use serde::{Deserialize, Serialize};

/// How checkpoints are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ask for confirmation before each checkpointed phase.
    #[default]
    Safe,
    /// Proceed without asking.
    Headless,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Headless => "headless",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "headless" => Ok(Self::Headless),
            other => Err(format!("unknown mode {other:?} (expected safe or headless)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifySettings {
    /// Fixed wait for targets without a sync-status endpoint.
    pub grace_period: Duration,
    pub poll_interval: Duration,
    /// Upper bound on polling before VERIFY fails.
    pub timeout: Duration,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RolloutOptions {
    pub mode: Mode,
    /// Render and checksum, but skip commits, resets and network calls.
    pub dry_run: bool,
    pub slo: String,
    pub required_fields: Vec<String>,
    /// Parent of the per-attempt report directories.
    pub report_dir: PathBuf,
    pub verify: VerifySettings,
    pub retry: RetryPolicy,
}

impl Default for RolloutOptions {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            dry_run: false,
            slo: "latency_p95_ms<=15,success_rate>=0.995".to_string(),
            required_fields: vec!["intentId".to_string()],
            report_dir: PathBuf::from("reports"),
            verify: VerifySettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RolloutOptions {
    pub fn from_config(config: &EdgeflowConfig) -> ConfigResult<Self> {
        let rollout = &config.rollout;
        Ok(Self {
            mode: Mode::default(),
            dry_run: false,
            slo: rollout.slo.clone(),
            required_fields: rollout.required_fields.clone(),
            report_dir: rollout.report_dir.clone(),
            verify: VerifySettings {
                grace_period: parse_duration(&rollout.verify.grace_period)?,
                poll_interval: parse_duration(&rollout.verify.poll_interval)?,
                timeout: parse_duration(&rollout.verify.timeout)?,
            },
            retry: rollout.retry.policy()?,
        })
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("SAFE".parse::<Mode>().unwrap(), Mode::Safe);
        assert_eq!("headless".parse::<Mode>().unwrap(), Mode::Headless);
        assert!("auto".parse::<Mode>().is_err());
    }

    #[test]
    fn options_follow_config() {
        let mut config = EdgeflowConfig::default();
        config.rollout.verify.grace_period = "250ms".into();
        config.rollout.slo = "latency<=3".into();
        let options = RolloutOptions::from_config(&config).unwrap();
        assert_eq!(options.verify.grace_period, Duration::from_millis(250));
        assert_eq!(options.slo, "latency<=3");
        assert_eq!(options.mode, Mode::Safe);
        assert_eq!(options.retry.max_attempts, 3);
    }

    #[test]
    fn bad_duration_is_rejected() {
        let mut config = EdgeflowConfig::default();
        config.rollout.verify.timeout = "soon".into();
        assert!(RolloutOptions::from_config(&config).is_err());
    }
}
