#![allow(dead_code)]

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stem_runner::core::model::Stem;
use stem_runner::core::notifier::NotifyPayload;
use stem_runner::plugins::registry::{
    BlobStore, DriverContext, NotifyTransport, PluginRegistry, SeparationRun, SeparationTask, Separator,
    SeparatorExit, SourceDriver,
};
use stem_runner::{EngineConfig, Engine};

pub enum SourceBehavior {
    Body(Vec<u8>),
    Fail(String),
    /// Something already occupies the input path, so writing it fails.
    Blocked,
}

pub struct FakeSource {
    behavior: SourceBehavior,
}

impl FakeSource {
    pub fn ok() -> Self {
        Self { behavior: SourceBehavior::Body(b"ID3 fake audio".to_vec()) }
    }

    pub fn failing(msg: &str) -> Self {
        Self { behavior: SourceBehavior::Fail(msg.to_string()) }
    }

    pub fn blocked() -> Self {
        Self { behavior: SourceBehavior::Blocked }
    }
}

#[async_trait]
impl SourceDriver for FakeSource {
    fn name(&self) -> &'static str {
        "fake-source"
    }

    fn supports(&self, uri: &str) -> bool {
        uri.starts_with("https://")
    }

    async fn fetch(&self, _uri: &str, dest: &Path, _ctx: &DriverContext) -> anyhow::Result<u64> {
        match &self.behavior {
            SourceBehavior::Body(b) => {
                tokio::fs::write(dest, b).await?;
                Ok(b.len() as u64)
            }
            SourceBehavior::Fail(msg) => anyhow::bail!("{}", msg),
            SourceBehavior::Blocked => {
                tokio::fs::create_dir_all(dest).await?;
                tokio::fs::write(dest, b"ID3").await?;
                Ok(3)
            }
        }
    }
}

/// Writes the configured stems where demucs would, replays diagnostic lines,
/// then exits with `exit_code`. The first `hang_attempts` runs never exit;
/// a crashing separator panics on every start.
pub struct ScriptedSeparator {
    pub lines: Vec<String>,
    pub stems: Vec<Stem>,
    pub exit_code: i32,
    pub hang_attempts: u32,
    pub crash: bool,
    pub starts: AtomicU32,
    pub presets: Mutex<Vec<String>>,
}

impl ScriptedSeparator {
    pub fn new(lines: &[&str], stems: &[Stem], exit_code: i32) -> Self {
        Self {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            stems: stems.to_vec(),
            exit_code,
            hang_attempts: 0,
            crash: false,
            starts: AtomicU32::new(0),
            presets: Mutex::new(vec![]),
        }
    }

    pub fn hanging(mut self, attempts: u32) -> Self {
        self.hang_attempts = attempts;
        self
    }

    pub fn crashing(mut self) -> Self {
        self.crash = true;
        self
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Separator for ScriptedSeparator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn start(&self, task: &SeparationTask) -> anyhow::Result<SeparationRun> {
        let attempt = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        self.presets.lock().unwrap().push(task.preset.clone());
        if self.crash {
            panic!("separator worker crashed on attempt {attempt}");
        }

        let base = task.input_path.file_stem().unwrap().to_string_lossy().into_owned();
        let dir: PathBuf = task.output_dir.join(&task.preset).join(base);
        tokio::fs::create_dir_all(&dir).await?;
        for stem in &self.stems {
            tokio::fs::write(dir.join(format!("{}.{}", stem, task.format.extension())), b"stem").await?;
        }

        let lines: Vec<std::io::Result<String>> = self.lines.iter().cloned().map(Ok).collect();
        let hang = attempt <= self.hang_attempts;
        let code = self.exit_code;

        Ok(SeparationRun {
            diagnostics: futures::stream::iter(lines).boxed(),
            finished: async move {
                if hang {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok(SeparatorExit { code: Some(code) })
            }
            .boxed(),
        })
    }
}

#[derive(Default)]
pub struct RecordingStore {
    pub published: Mutex<Vec<(String, Stem)>>,
}

#[async_trait]
impl BlobStore for RecordingStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn publish(&self, local_path: &Path, stem: Stem, job_id: &str) -> anyhow::Result<String> {
        anyhow::ensure!(local_path.exists(), "stem file vanished: {}", local_path.display());
        self.published.lock().unwrap().push((job_id.to_string(), stem));
        Ok(format!("https://blobs.test/{}/{}", job_id, stem))
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    pub seen: Mutex<Vec<NotifyPayload>>,
    pub delay: Duration,
}

impl RecordingTransport {
    /// Takes `delay` to answer every delivery.
    pub fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    pub fn payloads(&self) -> Vec<NotifyPayload> {
        self.seen.lock().unwrap().clone()
    }

    pub fn for_job(&self, job_id: &str) -> Vec<NotifyPayload> {
        self.payloads().into_iter().filter(|p| p.job_id() == job_id).collect()
    }

    pub fn terminal_for(&self, job_id: &str) -> Vec<NotifyPayload> {
        self.for_job(job_id).into_iter().filter(|p| p.is_terminal()).collect()
    }
}

#[async_trait]
impl NotifyTransport for RecordingTransport {
    async fn deliver(&self, _endpoint: &str, payload: &NotifyPayload, _timeout: Duration) -> anyhow::Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

pub struct RefusingTransport;

#[async_trait]
impl NotifyTransport for RefusingTransport {
    async fn deliver(&self, _endpoint: &str, _payload: &NotifyPayload, _timeout: Duration) -> anyhow::Result<()> {
        anyhow::bail!("503 from webhook")
    }
}

pub struct Harness {
    pub engine: Engine,
    pub separator: Arc<ScriptedSeparator>,
    pub store: Arc<RecordingStore>,
    pub transport: Arc<RecordingTransport>,
    pub work_root: tempfile::TempDir,
}

impl Harness {
    pub fn new(source: FakeSource, separator: ScriptedSeparator) -> Self {
        let separator = Arc::new(separator);
        let store = Arc::new(RecordingStore::default());
        let transport = Arc::new(RecordingTransport::default());
        let registry = PluginRegistry::new(separator.clone(), store.clone(), transport.clone())
            .with_source(Arc::new(source));
        Self::with_registry(registry, separator, store, transport)
    }

    pub fn with_registry(
        registry: PluginRegistry,
        separator: Arc<ScriptedSeparator>,
        store: Arc<RecordingStore>,
        transport: Arc<RecordingTransport>,
    ) -> Self {
        let work_root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            work_root: work_root.path().to_path_buf(),
            ..EngineConfig::default()
        };
        Self {
            engine: Engine::new(registry, config),
            separator,
            store,
            transport,
            work_root,
        }
    }

    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(self.work_root.path()).unwrap().count()
    }
}

/// Answers every connection with `status_line` and `body`, then closes it.
pub async fn serve_status(status_line: &'static str, body: &'static str) -> std::net::SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            let resp = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = sock.write_all(resp.as_bytes()).await;
            let _ = sock.shutdown().await;
        }
    });
    addr
}

pub fn progress_values(payloads: &[NotifyPayload]) -> Vec<u8> {
    payloads
        .iter()
        .filter_map(|p| match p {
            NotifyPayload::Processing { progress, .. } | NotifyPayload::Completed { progress, .. } => Some(*progress),
            NotifyPayload::Failed { .. } => None,
        })
        .collect()
}

pub fn stages(payloads: &[NotifyPayload]) -> Vec<String> {
    payloads
        .iter()
        .filter_map(|p| match p {
            NotifyPayload::Processing { stage, .. } => Some(stage.clone()),
            _ => None,
        })
        .collect()
}
