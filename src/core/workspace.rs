use crate::core::model::{OutputFormat, Stem};
use anyhow::Context;
use sanitize_filename::sanitize;
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

/// Per-attempt scratch directory holding the downloaded input and the
/// separator output. Removed by [`JobWorkspace::cleanup`], or on drop if the
/// attempt is torn down early.
#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
    input_path: PathBuf,
    output_dir: PathBuf,
    removed: bool,
}

impl JobWorkspace {
    pub async fn create(work_root: &Path, job_id: &str, source_url: &str) -> anyhow::Result<Self> {
        let scope = scoped_name(job_id);
        let root = work_root.join(format!("{}-{}", scope, Uuid::new_v4().simple()));
        let output_dir = root.join("output");

        tokio::fs::create_dir_all(&output_dir)
            .await
            .with_context(|| format!("create workspace {}", root.display()))?;

        let input_path = root.join(format!("input_{}.{}", scope, input_extension(source_url)));
        Ok(Self {
            root,
            input_path,
            output_dir,
            removed: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<preset>/<input basename>/<stem>.<ext>`
    pub fn stem_path(&self, preset: &str, stem: Stem, format: OutputFormat) -> PathBuf {
        let base = self
            .input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_dir
            .join(preset)
            .join(base)
            .join(format!("{}.{}", stem.as_str(), format.extension()))
    }

    pub async fn cleanup(mut self) -> anyhow::Result<()> {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove workspace {}", self.root.display())),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}

fn scoped_name(job_id: &str) -> String {
    let s = sanitize(job_id).replace(' ', "_");
    if s.is_empty() {
        "job".to_string()
    } else {
        s
    }
}

/// Extension of the source URL's last path segment, falling back to `mp3`.
fn input_extension(source_url: &str) -> String {
    Url::parse(source_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|s| s.last().map(str::to_string))
        })
        .and_then(|name| {
            Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
        })
        .filter(|e| (1..=5).contains(&e.len()) && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "mp3".to_string())
}
