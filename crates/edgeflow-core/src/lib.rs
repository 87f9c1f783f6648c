pub mod config;
pub mod intent;
pub mod retry;

pub use config::{
    ConfigError, ConfigResult, EdgeflowConfig, QosBreakpoint, QosConfig, RolloutConfig,
    ServiceProfile, SiteConfig, parse_duration,
};
pub use intent::{ALL_SITES, Intent, IntentError, ServiceType, Sla};
pub use retry::RetryPolicy;
