use crate::core::model::Stem;
use crate::plugins::registry::BlobStore;
use anyhow::Context;
use async_trait::async_trait;
use sanitize_filename::sanitize;
use std::path::{Path, PathBuf};
use url::Url;

/// Copies each stem to `<root>/<job_id>/<file name>` so it outlives the job
/// workspace, and returns the copy's `file://` URL.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn publish(&self, local_path: &Path, stem: Stem, job_id: &str) -> anyhow::Result<String> {
        let dir = self.root.join(sanitize(job_id));
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create {}", dir.display()))?;

        let file_name = local_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| stem.as_str().into());
        let dest = dir.join(file_name);
        tokio::fs::copy(local_path, &dest)
            .await
            .with_context(|| format!("copy {} stem to {}", stem, dest.display()))?;

        let abs = tokio::fs::canonicalize(&dest).await?;
        let url = Url::from_file_path(&abs)
            .map_err(|_| anyhow::anyhow!("not a file path: {}", abs.display()))?;
        Ok(url.to_string())
    }
}
