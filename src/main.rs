use clap::{Arg, Command};
use indicatif::{ProgressBar, ProgressStyle};
use stem_runner::core::events::EngineEvent;
use stem_runner::core::model::{JobRequest, JobState, DEFAULT_PRESET};
use stem_runner::plugins::registry::{PluginRegistry, RunnerCliConfig};
use stem_runner::plugins::storage::local::LocalBlobStore;
use stem_runner::{Engine, JobSubmitter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

fn build_cli(registry: &PluginRegistry) -> Command {
    let separate = Command::new("separate")
        .about("Download an audio file and split it into stems")
        .arg(
            Arg::new("source_url")
                .help("URL of the audio file")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("job_id")
                .long("job-id")
                .help("Caller-supplied job id (random when omitted)")
                .num_args(1),
        )
        .arg(
            Arg::new("preset")
                .long("preset")
                .help("Separator model preset, e.g. htdemucs, htdemucs_ft, mdx_extra")
                .default_value(DEFAULT_PRESET)
                .num_args(1),
        )
        .arg(
            Arg::new("notify_url")
                .long("notify-url")
                .help("Endpoint that receives status notifications")
                .num_args(1),
        )
        .arg(
            Arg::new("work_dir")
                .long("work-dir")
                .help("Parent directory for per-job scratch space")
                .num_args(1),
        )
        .arg(
            Arg::new("publish_dir")
                .long("publish-dir")
                .help("Directory that published stems are copied to")
                .default_value("./stems")
                .num_args(1),
        )
        .arg(
            Arg::new("timeout_secs")
                .long("timeout-secs")
                .help("Time budget for one attempt of the whole job")
                .default_value("600")
                .num_args(1),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .help("Whole-job re-runs after a timed out or crashed attempt")
                .default_value("2")
                .num_args(1),
        );

    let separate = registry.augment_separate_command(separate);

    Command::new("stem-runner")
        .about("Stem separation job runner")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(separate)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let registry = PluginRegistry::with_defaults()?;
    let matches = build_cli(&registry).get_matches();

    let Some(("separate", m)) = matches.subcommand() else {
        return Ok(());
    };

    let mut cfg = RunnerCliConfig::default();
    if let Some(dir) = m.get_one::<String>("work_dir") {
        cfg.engine.work_root = PathBuf::from(dir);
    }
    if let Some(s) = m.get_one::<String>("timeout_secs") {
        cfg.schedule.timeout = Duration::from_secs(s.parse()?);
    }
    if let Some(s) = m.get_one::<String>("retries") {
        cfg.schedule.retries = s.parse()?;
    }
    registry.apply_separate_matches(m, &mut cfg)?;

    let registry = match m.get_one::<String>("publish_dir") {
        Some(dir) => registry.with_blob_store(Arc::new(LocalBlobStore::new(dir))),
        None => registry,
    };

    let source_url = m
        .get_one::<String>("source_url")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing source url"))?;
    let job_id = m
        .get_one::<String>("job_id")
        .cloned()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let preset = m
        .get_one::<String>("preset")
        .cloned()
        .unwrap_or_else(|| DEFAULT_PRESET.to_string());

    let request = JobRequest::new(source_url, job_id)
        .with_preset(preset)
        .with_notify_url(m.get_one::<String>("notify_url").cloned());

    let engine = Engine::new(registry, cfg.engine);
    let submitter = JobSubmitter::new(engine.clone(), cfg.schedule);

    let mut rx = engine.subscribe();
    let ui_task = tokio::spawn(async move {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));

        loop {
            let evt = match rx.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match evt {
                EngineEvent::StateChanged { state, .. } => {
                    pb.set_message(format!("{:?}", state).to_lowercase());
                    if state.is_terminal() {
                        if state == JobState::Completed {
                            pb.finish_with_message("completed");
                        } else {
                            pb.abandon_with_message("failed");
                        }
                    }
                }
                EngineEvent::Progress { stage, percent, .. } => {
                    pb.set_position(percent as u64);
                    pb.set_message(stage);
                }
                EngineEvent::Diagnostic { .. } => {}
                EngineEvent::Error { scope, kind, message } => {
                    pb.println(format!("[ERR] {} {}: {}", scope, kind.code(), message));
                }
                EngineEvent::Info { scope, message } => {
                    pb.println(format!("[INFO] {}: {}", scope, message));
                }
            }
        }
        if !pb.is_finished() {
            pb.finish_and_clear();
        }
    });

    let outcome = submitter.submit(request).await;

    drop(submitter);
    drop(engine);
    let _ = ui_task.await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
