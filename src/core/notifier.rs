//! Best-effort status delivery to the caller's endpoint.
//!
//! Payloads are queued and posted in order by one delivery task per job.
//! Delivery outcomes never flow back into the job; they are counted and logged.
//! Dropping a [`Notifier`] without [`Notifier::finish`] stops its delivery task,
//! so an abandoned attempt never posts anything after the fact.

use crate::core::config::DeliveryPolicy;
use crate::core::model::{ErrorKind, ProgressEvent, StemResult};
use crate::plugins::registry::NotifyTransport;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NotifyPayload {
    #[serde(rename_all = "camelCase")]
    Processing { job_id: String, stage: String, progress: u8 },

    #[serde(rename_all = "camelCase")]
    Completed { job_id: String, progress: u8, files: StemResult },

    #[serde(rename_all = "camelCase")]
    Failed { job_id: String, error: ErrorPayload },
}

impl NotifyPayload {
    pub fn status(&self) -> &'static str {
        match self {
            NotifyPayload::Processing { .. } => "processing",
            NotifyPayload::Completed { .. } => "completed",
            NotifyPayload::Failed { .. } => "failed",
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            NotifyPayload::Processing { job_id, .. }
            | NotifyPayload::Completed { job_id, .. }
            | NotifyPayload::Failed { job_id, .. } => job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, NotifyPayload::Processing { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: u32,
    pub delivered: u32,
    pub failed: u32,
}

pub struct Notifier {
    job_id: String,
    tx: Option<mpsc::UnboundedSender<NotifyPayload>>,
    worker: Option<JoinHandle<DeliveryReport>>,
    drain_timeout: Duration,
}

impl Notifier {
    /// Starts the delivery task. Without an endpoint every call is a no-op.
    pub fn spawn(
        job_id: impl Into<String>,
        endpoint: Option<String>,
        transport: Arc<dyn NotifyTransport>,
        policy: DeliveryPolicy,
    ) -> Self {
        let job_id = job_id.into();
        let Some(endpoint) = endpoint else {
            return Self::disabled(job_id);
        };

        let drain_timeout = policy.drain_timeout;
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(deliver_in_order(job_id.clone(), endpoint, transport, policy, rx));
        Self {
            job_id,
            tx: Some(tx),
            worker: Some(worker),
            drain_timeout,
        }
    }

    pub fn disabled(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            tx: None,
            worker: None,
            drain_timeout: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queues one payload; returns immediately whatever the endpoint does.
    pub fn notify(&self, payload: NotifyPayload) {
        let Some(tx) = &self.tx else { return };
        if tx.send(payload).is_err() {
            debug!(job_id = %self.job_id, "delivery task gone, notification dropped");
        }
    }

    pub fn progress(&self, event: &ProgressEvent) {
        self.notify(NotifyPayload::Processing {
            job_id: self.job_id.clone(),
            stage: event.stage.clone(),
            progress: event.percent.min(100),
        });
    }

    pub fn completed(&self, files: &StemResult) {
        self.notify(NotifyPayload::Completed {
            job_id: self.job_id.clone(),
            progress: 100,
            files: files.clone(),
        });
    }

    pub fn failed(&self, kind: ErrorKind, message: &str) {
        self.notify(NotifyPayload::Failed {
            job_id: self.job_id.clone(),
            error: ErrorPayload {
                code: kind.code().to_string(),
                message: message.to_string(),
                retryable: kind.retryable(),
            },
        });
    }

    /// Closes the queue and waits, at most the policy's drain timeout, until
    /// everything queued has been attempted. Whatever is still queued after
    /// that is dropped.
    pub async fn finish(mut self) -> DeliveryReport {
        self.tx.take();
        let Some(mut worker) = self.worker.take() else {
            return DeliveryReport::default();
        };
        match tokio::time::timeout(self.drain_timeout, &mut worker).await {
            Ok(Ok(report)) => {
                debug!(
                    job_id = %self.job_id,
                    attempted = report.attempted,
                    delivered = report.delivered,
                    failed = report.failed,
                    "notifications settled"
                );
                report
            }
            Ok(Err(e)) => {
                warn!(job_id = %self.job_id, error = %e, "notification task ended abnormally");
                DeliveryReport::default()
            }
            Err(_) => {
                worker.abort();
                warn!(job_id = %self.job_id, drain = ?self.drain_timeout, "notification queue not drained, dropping the rest");
                DeliveryReport::default()
            }
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

async fn deliver_in_order(
    job_id: String,
    endpoint: String,
    transport: Arc<dyn NotifyTransport>,
    policy: DeliveryPolicy,
    mut rx: mpsc::UnboundedReceiver<NotifyPayload>,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    while let Some(payload) = rx.recv().await {
        report.attempted += 1;
        let result = match tokio::time::timeout(
            policy.timeout,
            transport.deliver(&endpoint, &payload, policy.timeout),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(anyhow::anyhow!("no response within {:?}", policy.timeout)),
        };

        match result {
            Ok(()) => {
                report.delivered += 1;
                debug!(job_id = %job_id, status = payload.status(), "notification delivered");
            }
            Err(e) => {
                report.failed += 1;
                if report.failed <= policy.max_logged_failures {
                    warn!(job_id = %job_id, status = payload.status(), error = %format!("{:#}", e), "notification not delivered");
                } else {
                    debug!(job_id = %job_id, status = payload.status(), error = %format!("{:#}", e), "notification not delivered");
                }
            }
        }
    }

    report
}
