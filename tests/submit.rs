mod support;

use std::sync::Arc;
use std::time::Duration;
use stem_runner::core::model::{ErrorKind, Stem};
use stem_runner::core::notifier::NotifyPayload;
use stem_runner::{JobSubmitter, PluginRegistry, SchedulePolicy};
use support::*;

const HOOK: &str = "https://hooks.test/modal";
const LINES: &[&str] = &[" 50%|#####     | 5/10", "100%|##########| 10/10"];

fn policy(timeout_ms: u64, retries: u32) -> SchedulePolicy {
    SchedulePolicy { timeout: Duration::from_millis(timeout_ms), retries }
}

#[tokio::test]
async fn defaults_to_htdemucs_preset() {
    let h = Harness::new(FakeSource::ok(), ScriptedSeparator::new(LINES, &Stem::ALL, 0));
    let submitter = JobSubmitter::new(h.engine.clone(), SchedulePolicy::default());

    let outcome = submitter
        .separate_stems("https://cdn.test/a.mp3", "job-default", None, Some(HOOK))
        .await;

    assert!(outcome.success);
    assert_eq!(h.separator.presets.lock().unwrap().as_slice(), ["htdemucs"]);
}

#[tokio::test]
async fn explicit_preset_is_passed_through() {
    let h = Harness::new(FakeSource::ok(), ScriptedSeparator::new(LINES, &Stem::ALL, 0));
    let submitter = JobSubmitter::new(h.engine.clone(), SchedulePolicy::default());

    submitter
        .separate_stems("https://cdn.test/a.mp3", "job-ft", Some("htdemucs_ft"), None)
        .await;

    assert_eq!(h.separator.presets.lock().unwrap().as_slice(), ["htdemucs_ft"]);
}

#[tokio::test]
async fn job_failures_are_not_rerun() {
    let h = Harness::new(FakeSource::ok(), ScriptedSeparator::new(LINES, &[], 1));
    let submitter = JobSubmitter::new(h.engine.clone(), policy(5_000, 2));

    let outcome = submitter
        .separate_stems("https://cdn.test/a.mp3", "job-once", None, Some(HOOK))
        .await;

    assert_eq!(outcome.error_kind, Some(ErrorKind::SeparationFailed));
    assert_eq!(h.separator.starts(), 1);
    assert_eq!(h.transport.terminal_for("job-once").len(), 1);
}

#[tokio::test]
async fn timed_out_attempt_is_rerun_from_the_start() {
    let h = Harness::new(
        FakeSource::ok(),
        ScriptedSeparator::new(LINES, &[Stem::Vocals], 0).hanging(1),
    );
    let submitter = JobSubmitter::new(h.engine.clone(), policy(300, 2));

    let outcome = submitter
        .separate_stems("https://cdn.test/a.mp3", "job-slow", None, Some(HOOK))
        .await;

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(h.separator.starts(), 2);

    let sent = h.transport.for_job("job-slow");
    let entries = stages(&sent).iter().filter(|s| *s == "processing").count();
    assert_eq!(entries, 2);

    let terminal = h.transport.terminal_for("job-slow");
    assert!(matches!(terminal.as_slice(), [NotifyPayload::Completed { .. }]));
    assert_eq!(h.leftover_workspaces(), 0);
}

#[tokio::test]
async fn exhausted_budget_reports_a_single_timeout() {
    let h = Harness::new(
        FakeSource::ok(),
        ScriptedSeparator::new(LINES, &Stem::ALL, 0).hanging(u32::MAX),
    );
    let submitter = JobSubmitter::new(h.engine.clone(), policy(100, 1));

    let outcome = submitter
        .separate_stems("https://cdn.test/a.mp3", "job-stuck", None, Some(HOOK))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.files, None);
    assert_eq!(outcome.error_kind, Some(ErrorKind::TimedOut));
    assert_eq!(h.separator.starts(), 2);

    let terminal = h.transport.terminal_for("job-stuck");
    assert_eq!(terminal.len(), 1);
    match &terminal[0] {
        NotifyPayload::Failed { error, .. } => {
            assert_eq!(error.code, "timed_out");
            assert!(error.retryable);
        }
        other => panic!("expected failed, got {other:?}"),
    }
    assert_eq!(h.leftover_workspaces(), 0);
}

#[tokio::test]
async fn slow_webhook_does_not_eat_the_job_budget() {
    let separator = Arc::new(ScriptedSeparator::new(LINES, &Stem::ALL, 0));
    let store = Arc::new(RecordingStore::default());
    let transport = Arc::new(RecordingTransport::slow(Duration::from_millis(200)));
    let registry = PluginRegistry::new(separator.clone(), store.clone(), transport.clone())
        .with_source(Arc::new(FakeSource::ok()));
    let h = Harness::with_registry(registry, separator, store, transport);
    let submitter = JobSubmitter::new(h.engine.clone(), policy(700, 1));

    let outcome = submitter
        .separate_stems("https://cdn.test/a.mp3", "job-slow-hook", None, Some(HOOK))
        .await;

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.files.unwrap().len(), 4);
    assert_eq!(h.separator.starts(), 1);

    let sent = h.transport.for_job("job-slow-hook");
    assert_eq!(progress_values(&sent), [0, 10, 30, 60, 90, 90, 100]);
    let terminal = h.transport.terminal_for("job-slow-hook");
    assert!(matches!(terminal.as_slice(), [NotifyPayload::Completed { .. }]));
}

#[tokio::test]
async fn crashed_attempts_end_in_a_single_job_failed() {
    let h = Harness::new(
        FakeSource::ok(),
        ScriptedSeparator::new(LINES, &Stem::ALL, 0).crashing(),
    );
    let submitter = JobSubmitter::new(h.engine.clone(), policy(5_000, 2));

    let outcome = submitter
        .separate_stems("https://cdn.test/a.mp3", "job-crash", None, Some(HOOK))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::JobFailed));
    assert_eq!(h.separator.starts(), 3);

    let terminal = h.transport.terminal_for("job-crash");
    assert_eq!(terminal.len(), 1);
    match &terminal[0] {
        NotifyPayload::Failed { error, .. } => {
            assert_eq!(error.code, "job_failed");
            assert!(!error.retryable);
        }
        other => panic!("expected failed, got {other:?}"),
    }
    assert_eq!(h.leftover_workspaces(), 0);
}
