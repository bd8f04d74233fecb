use crate::core::config::{EngineConfig, SchedulePolicy};
use crate::core::model::{OutputFormat, Stem};
use crate::core::notifier::NotifyPayload;
use anyhow::Context;
use async_trait::async_trait;
use clap::{ArgMatches, Command};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DriverContext {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for DriverContext {
    fn default() -> Self {
        Self {
            user_agent: "stem-runner/0.1".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeparatorOptions {
    pub python: String,
    pub device: Option<String>,
}

impl Default for SeparatorOptions {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            device: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeparationTask {
    pub job_id: String,
    pub preset: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    pub options: SeparatorOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeparatorExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl SeparatorExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A started separation: diagnostic lines arrive lazily, `finished` resolves
/// once the separator is done. Drain `diagnostics` before awaiting `finished`.
pub struct SeparationRun {
    pub diagnostics: BoxStream<'static, std::io::Result<String>>,
    pub finished: BoxFuture<'static, anyhow::Result<SeparatorExit>>,
}

#[async_trait]
pub trait SourceDriver: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports(&self, uri: &str) -> bool;

    /// Writes the resource body to `dest`, returning the byte count.
    async fn fetch(&self, uri: &str, dest: &Path, ctx: &DriverContext) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait Separator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn start(&self, task: &SeparationTask) -> anyhow::Result<SeparationRun>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Makes a produced stem durable and returns where it can be fetched.
    async fn publish(&self, local_path: &Path, stem: Stem, job_id: &str) -> anyhow::Result<String>;
}

#[async_trait]
pub trait NotifyTransport: Send + Sync {
    async fn deliver(&self, endpoint: &str, payload: &NotifyPayload, timeout: Duration) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct RunnerCliConfig {
    pub engine: EngineConfig,
    pub schedule: SchedulePolicy,
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_separate_command(&self, cmd: Command) -> Command;
    fn apply_separate_matches(&self, matches: &ArgMatches, cfg: &mut RunnerCliConfig) -> anyhow::Result<()>;
}

pub struct PluginRegistry {
    sources: Vec<Arc<dyn SourceDriver>>,
    separator: Arc<dyn Separator>,
    blob_store: Arc<dyn BlobStore>,
    notify_transport: Arc<dyn NotifyTransport>,
    cli_plugins: Vec<Box<dyn CliPlugin>>,
}

impl PluginRegistry {
    pub fn with_defaults() -> anyhow::Result<Self> {
        let mut reg = Self::new(
            Arc::new(crate::plugins::demucs::driver::DemucsSeparator::new()),
            Arc::new(crate::plugins::storage::local::LocalBlobStore::new("stems")),
            Arc::new(crate::plugins::http::webhook::WebhookTransport::new()?),
        );
        reg.sources.push(Arc::new(crate::plugins::http::driver::HttpDriver::new()?));

        reg.cli_plugins.push(Box::new(crate::plugins::http::cli::HttpCliPlugin::new()));
        reg.cli_plugins.push(Box::new(crate::plugins::demucs::cli::DemucsCliPlugin::new()));
        Ok(reg)
    }

    /// Registry without source drivers or CLI plugins; add them with the `with_*` builders.
    pub fn new(
        separator: Arc<dyn Separator>,
        blob_store: Arc<dyn BlobStore>,
        notify_transport: Arc<dyn NotifyTransport>,
    ) -> Self {
        Self {
            sources: vec![],
            separator,
            blob_store,
            notify_transport,
            cli_plugins: vec![],
        }
    }

    pub fn with_source(mut self, source: Arc<dyn SourceDriver>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_blob_store(mut self, blob_store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = blob_store;
        self
    }

    pub fn augment_separate_command(&self, cmd: Command) -> Command {
        self.cli_plugins
            .iter()
            .fold(cmd, |c, p| p.augment_separate_command(c))
    }

    pub fn apply_separate_matches(&self, matches: &ArgMatches, cfg: &mut RunnerCliConfig) -> anyhow::Result<()> {
        for p in &self.cli_plugins {
            p.apply_separate_matches(matches, cfg)
                .with_context(|| format!("invalid {} options", p.name()))?;
        }
        Ok(())
    }

    pub fn source_for(&self, uri: &str) -> Option<Arc<dyn SourceDriver>> {
        self.sources.iter().find(|d| d.supports(uri)).cloned()
    }

    pub fn separator(&self) -> Arc<dyn Separator> {
        self.separator.clone()
    }

    pub fn blob_store(&self) -> Arc<dyn BlobStore> {
        self.blob_store.clone()
    }

    pub fn notify_transport(&self) -> Arc<dyn NotifyTransport> {
        self.notify_transport.clone()
    }
}
