//! Remote stem-separation job: download an audio file, split it with an
//! external separator, publish the stems and report status to a webhook.

pub mod core;
pub mod plugins;

pub use crate::core::config::{DeliveryPolicy, EngineConfig, SchedulePolicy};
pub use crate::core::engine::Engine;
pub use crate::core::model::{ErrorKind, JobOutcome, JobRequest, JobState, Stem, StemResult};
pub use crate::core::submit::JobSubmitter;
pub use crate::plugins::registry::PluginRegistry;
