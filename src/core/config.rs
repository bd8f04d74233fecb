use crate::core::model::OutputFormat;
use crate::plugins::registry::{DriverContext, SeparatorOptions};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Parent of every per-job workspace.
    pub work_root: PathBuf,
    pub output_format: OutputFormat,
    pub driver_ctx: DriverContext,
    pub separator: SeparatorOptions,
    pub delivery: DeliveryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("stem-runner"),
            output_format: OutputFormat::default(),
            driver_ctx: DriverContext::default(),
            separator: SeparatorOptions::default(),
            delivery: DeliveryPolicy::default(),
        }
    }
}

/// How notifications are delivered. There is no per-notification retry.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Bound on a single delivery call.
    pub timeout: Duration,
    /// How long a finished job waits for its queue to drain before the rest is dropped.
    pub drain_timeout: Duration,
    /// Failures past this count per job are logged at debug instead of warn.
    pub max_logged_failures: u32,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            max_logged_failures: 3,
        }
    }
}

/// Whole-job scheduling budget applied by the submission facade.
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    pub timeout: Duration,
    /// Extra whole-job attempts after a platform-level failure.
    pub retries: u32,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            retries: 2,
        }
    }
}
