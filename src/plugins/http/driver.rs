use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::plugins::registry::{DriverContext, SourceDriver};

#[derive(thiserror::Error, Debug)]
pub enum HttpDriverError {
    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    #[error("http status error: {0}")]
    Status(StatusCode),
}

pub struct HttpDriver {
    client: reqwest::Client,
}

impl HttpDriver {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }

    fn build_headers(ctx: &DriverContext) -> anyhow::Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_str(&ctx.user_agent)?);
        Ok(h)
    }

    pub(crate) fn is_http_url(uri: &str) -> bool {
        Url::parse(uri)
            .map(|u| u.scheme() == "http" || u.scheme() == "https")
            .unwrap_or(false)
    }
}

#[async_trait]
impl SourceDriver for HttpDriver {
    fn name(&self) -> &'static str { "http-driver" }

    fn supports(&self, uri: &str) -> bool {
        Self::is_http_url(uri)
    }

    /// One GET, body streamed to `dest`. A failed fetch is not retried here;
    /// re-running is the scheduler's call.
    async fn fetch(&self, uri: &str, dest: &Path, ctx: &DriverContext) -> anyhow::Result<u64> {
        if !Self::is_http_url(uri) {
            return Err(HttpDriverError::UnsupportedUrl(uri.to_string()).into());
        }

        let resp = self.client
            .get(uri)
            .headers(Self::build_headers(ctx)?)
            .timeout(Duration::from_secs(ctx.timeout_secs))
            .send()
            .await
            .with_context(|| format!("GET {}", uri))?;

        if !resp.status().is_success() {
            return Err(HttpDriverError::Status(resp.status()).into());
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("create {}", dest.display()))?;

        let mut written = 0u64;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.with_context(|| format!("read body of {}", uri))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("write {}", dest.display()))?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}
