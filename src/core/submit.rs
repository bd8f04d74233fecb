use crate::core::config::SchedulePolicy;
use crate::core::engine::Engine;
use crate::core::model::{ErrorKind, JobOutcome, JobRequest};
use tracing::{info, warn};

/// Accepts job requests and runs them under the scheduling policy: a time
/// budget per attempt and a bounded number of whole-job re-executions after
/// platform-level failures (budget exceeded, worker crashed).
///
/// An outcome produced by the engine is final even when it is a failure.
/// Webhook delivery for the winning attempt is drained after the budget
/// check, so a slow endpoint never costs the job its time budget.
#[derive(Clone)]
pub struct JobSubmitter {
    engine: Engine,
    policy: SchedulePolicy,
}

impl JobSubmitter {
    pub fn new(engine: Engine, policy: SchedulePolicy) -> Self {
        Self { engine, policy }
    }

    pub async fn separate_stems(
        &self,
        source_url: &str,
        job_id: &str,
        model_preset: Option<&str>,
        notify_url: Option<&str>,
    ) -> JobOutcome {
        let mut request = JobRequest::new(source_url, job_id).with_notify_url(notify_url.map(str::to_string));
        if let Some(preset) = model_preset {
            request = request.with_preset(preset);
        }
        self.submit(request).await
    }

    pub async fn submit(&self, request: JobRequest) -> JobOutcome {
        let attempts = self.policy.retries + 1;
        let mut last = None;

        for attempt in 1..=attempts {
            let engine = self.engine.clone();
            let req = request.clone();
            let mut handle = tokio::spawn(async move { engine.run_queued(req).await });

            match tokio::time::timeout(self.policy.timeout, &mut handle).await {
                Ok(Ok((outcome, notifier))) => {
                    notifier.finish().await;
                    return outcome;
                }
                Ok(Err(e)) => {
                    warn!(job_id = %request.job_id, attempt, error = %e, "job attempt crashed");
                    last = Some((ErrorKind::JobFailed, format!("job attempt crashed: {}", e)));
                }
                Err(_) => {
                    // Dropping the attempt kills the separator, removes its workspace
                    // and stops its pending notifications.
                    handle.abort();
                    let _ = handle.await;
                    warn!(job_id = %request.job_id, attempt, timeout = ?self.policy.timeout, "job attempt timed out");
                    last = Some((
                        ErrorKind::TimedOut,
                        format!("job exceeded its {}s budget", self.policy.timeout.as_secs_f64()),
                    ));
                }
            }

            if attempt < attempts {
                info!(job_id = %request.job_id, next_attempt = attempt + 1, "re-running job");
            }
        }

        // The aborted attempts never reached a terminal notification, so it is sent here.
        let (kind, message) = last.unwrap_or((ErrorKind::JobFailed, "job was never scheduled".to_string()));
        let notifier = self.engine.notifier_for(&request);
        notifier.failed(kind, &message);
        notifier.finish().await;

        JobOutcome::failed(request.job_id, kind, message)
    }
}
