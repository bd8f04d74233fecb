use crate::core::config::EngineConfig;
use crate::core::events::EngineEvent;
use crate::core::model::*;
use crate::core::notifier::Notifier;
use crate::core::progress::{self, ProgressTracker, DOWNLOAD_BAND, PUBLISH_BAND, SEPARATION_BAND};
use crate::core::workspace::JobWorkspace;
use crate::plugins::registry::{PluginRegistry, SeparationTask};
use anyhow::{anyhow, Context};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Runs one separation job from download to terminal notification.
///
/// Every call to [`Engine::run`] owns its own workspace and notifier, so one
/// engine can serve concurrent jobs.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<PluginRegistry>,
    config: Arc<EngineConfig>,
    event_tx: broadcast::Sender<EngineEvent>,
}

/// Per-run bookkeeping: the current state plus the notifier it reports through.
struct JobRun<'a> {
    job_id: &'a str,
    state: JobState,
    notifier: &'a Notifier,
    event_tx: &'a broadcast::Sender<EngineEvent>,
}

impl JobRun<'_> {
    fn enter(&mut self, next: JobState) -> Result<(), JobError> {
        self.state.advance(next)?;
        debug!(job_id = %self.job_id, state = ?next, "job state");
        let _ = self.event_tx.send(EngineEvent::StateChanged { job_id: self.job_id.to_string(), state: next });
        Ok(())
    }

    fn progress(&self, event: ProgressEvent) {
        self.notifier.progress(&event);
        let _ = self.event_tx.send(EngineEvent::Progress {
            job_id: self.job_id.to_string(),
            stage: event.stage,
            percent: event.percent,
        });
    }
}

impl Engine {
    pub fn new(registry: PluginRegistry, config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn notifier_for(&self, request: &JobRequest) -> Notifier {
        Notifier::spawn(
            request.job_id.clone(),
            request.notify_url.clone(),
            self.registry.notify_transport(),
            self.config.delivery.clone(),
        )
    }

    /// Never fails: every error is folded into the returned outcome and
    /// reported as the job's single `failed` notification. Returns once the
    /// queued notifications have been delivered or the drain timeout passed.
    pub async fn run(&self, request: JobRequest) -> JobOutcome {
        let (outcome, notifier) = self.run_queued(request).await;
        notifier.finish().await;
        outcome
    }

    /// Runs the job up to the point where its terminal notification is queued.
    /// The caller owns delivery from there: `finish` the notifier to drain it,
    /// or drop it to discard whatever is still pending.
    #[instrument(skip_all, fields(job_id = %request.job_id, preset = %request.model_preset))]
    pub(crate) async fn run_queued(&self, request: JobRequest) -> (JobOutcome, Notifier) {
        let notifier = self.notifier_for(&request);
        let mut run = JobRun {
            job_id: &request.job_id,
            state: JobState::Downloading,
            notifier: &notifier,
            event_tx: &self.event_tx,
        };
        let _ = self.event_tx.send(EngineEvent::StateChanged {
            job_id: request.job_id.clone(),
            state: JobState::Downloading,
        });
        info!(source = %request.source_url, "job started");

        let result = match JobWorkspace::create(&self.config.work_root, &request.job_id, &request.source_url).await {
            Ok(ws) => {
                let r = self.execute(&request, &ws, &mut run).await;
                if let Err(e) = ws.cleanup().await {
                    warn!(error = %format!("{:#}", e), "workspace cleanup failed");
                }
                r
            }
            Err(e) => Err(JobError::Internal(e)),
        };

        let outcome = match result {
            Ok(files) => match run.enter(JobState::Completed) {
                Ok(()) => {
                    info!(stems = files.len(), "job completed");
                    notifier.completed(&files);
                    JobOutcome::completed(request.job_id.clone(), files)
                }
                Err(e) => self.fail(&mut run, e),
            },
            Err(e) => self.fail(&mut run, e),
        };

        (outcome, notifier)
    }

    fn fail(&self, run: &mut JobRun<'_>, err: JobError) -> JobOutcome {
        let kind = err.kind();
        let message = err.to_string();
        if let Err(e) = run.enter(JobState::Failed) {
            warn!(error = %e, "failure reported outside a live state");
        }

        warn!(code = kind.code(), error = %message, "job failed");
        run.notifier.failed(kind, &message);
        let _ = self.event_tx.send(EngineEvent::Error {
            scope: format!("job({})", run.job_id),
            kind,
            message: message.clone(),
        });
        JobOutcome::failed(run.job_id.to_string(), kind, message)
    }

    async fn execute(&self, request: &JobRequest, ws: &JobWorkspace, run: &mut JobRun<'_>) -> Result<StemResult, JobError> {
        self.download(request, ws, run).await?;

        run.enter(JobState::Separating)?;
        self.separate(request, ws, run).await?;

        run.enter(JobState::Publishing)?;
        self.publish(request, ws, run).await
    }

    async fn download(&self, request: &JobRequest, ws: &JobWorkspace, run: &JobRun<'_>) -> Result<(), JobError> {
        run.progress(ProgressEvent::new("downloading", *DOWNLOAD_BAND.start()));

        let source = self
            .registry
            .source_for(&request.source_url)
            .ok_or_else(|| JobError::Download(anyhow!("no source driver for {}", request.source_url)))?;

        let bytes = source
            .fetch(&request.source_url, ws.input_path(), &self.config.driver_ctx)
            .await
            .map_err(JobError::Download)?;

        info!(driver = source.name(), bytes, "input downloaded");
        run.progress(ProgressEvent::new("downloading", *DOWNLOAD_BAND.end()));
        let _ = self.event_tx.send(EngineEvent::Info {
            scope: format!("download({})", request.job_id),
            message: format!("{} bytes via {}", bytes, source.name()),
        });
        Ok(())
    }

    async fn separate(&self, request: &JobRequest, ws: &JobWorkspace, run: &JobRun<'_>) -> Result<(), JobError> {
        run.progress(ProgressEvent::new("processing", *SEPARATION_BAND.start()));

        let task = SeparationTask {
            job_id: request.job_id.clone(),
            preset: request.model_preset.clone(),
            input_path: ws.input_path().to_path_buf(),
            output_dir: ws.output_dir().to_path_buf(),
            format: self.config.output_format,
            options: self.config.separator.clone(),
        };

        let separator = self.registry.separator();
        let mut handle = separator
            .start(&task)
            .await
            .with_context(|| format!("start {}", separator.name()))
            .map_err(JobError::Separation)?;

        let mut tracker = ProgressTracker::new("separating");
        tracker.prime(*SEPARATION_BAND.start());
        let mut last_line = String::new();

        while let Some(line) = handle.diagnostics.next().await {
            let line = line
                .context("read separator diagnostics")
                .map_err(JobError::Separation)?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let _ = self.event_tx.send(EngineEvent::Diagnostic {
                job_id: request.job_id.clone(),
                line: trimmed.to_string(),
            });

            match progress::parse_progress(trimmed) {
                Some(p) => {
                    if let Some(event) = tracker.advance(p) {
                        run.progress(event);
                    }
                }
                None => last_line = trimmed.to_string(),
            }
        }

        let exit = handle.finished.await.map_err(JobError::Separation)?;
        if !exit.success() {
            let code = exit
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let detail = if last_line.is_empty() { String::new() } else { format!(": {}", last_line) };
            return Err(JobError::Separation(anyhow!("{} exited with status {}{}", separator.name(), code, detail)));
        }

        info!(separator = separator.name(), "separation finished");
        let _ = self.event_tx.send(EngineEvent::Info {
            scope: format!("separate({})", request.job_id),
            message: format!("{} finished", separator.name()),
        });
        Ok(())
    }

    async fn publish(&self, request: &JobRequest, ws: &JobWorkspace, run: &JobRun<'_>) -> Result<StemResult, JobError> {
        run.progress(ProgressEvent::new("uploading", *PUBLISH_BAND.start()));

        let store = self.registry.blob_store();
        let mut files = StemResult::new();
        for stem in Stem::ALL {
            let path = ws.stem_path(&request.model_preset, stem, self.config.output_format);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!(%stem, path = %path.display(), "stem not produced");
                continue;
            }

            let location = store
                .publish(&path, stem, &request.job_id)
                .await
                .with_context(|| format!("publish {} via {}", stem, store.name()))
                .map_err(JobError::Publish)?;
            files.insert(stem, location);
        }

        Ok(files)
    }
}
