use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type JobId = String;

pub const DEFAULT_PRESET: &str = "htdemucs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source_url: String,
    pub job_id: JobId,
    pub model_preset: String,
    pub notify_url: Option<String>,
}

impl JobRequest {
    pub fn new(source_url: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            job_id: job_id.into(),
            model_preset: DEFAULT_PRESET.to_string(),
            notify_url: None,
        }
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.model_preset = preset.into();
        self
    }

    pub fn with_notify_url(mut self, url: Option<String>) -> Self {
        self.notify_url = url.filter(|u| !u.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Downloading,
    Separating,
    Publishing,
    Completed,
    Failed,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("illegal job transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Forward-only: `Failed` is reachable from any live state, everything else
    /// must move strictly later in the pipeline.
    pub fn advance(&mut self, to: JobState) -> Result<(), TransitionError> {
        let legal = !self.is_terminal()
            && match to {
                JobState::Failed => true,
                JobState::Completed => *self == JobState::Publishing,
                _ => to > *self && to != JobState::Completed,
            };
        if !legal {
            return Err(TransitionError { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}

/// One job-level progress report, in the 0..=100 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: String,
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(stage: impl Into<String>, percent: u8) -> Self {
        Self { stage: stage.into(), percent: percent.min(100) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl Stem {
    /// Publish order.
    pub const ALL: [Stem; 4] = [Stem::Vocals, Stem::Drums, Stem::Bass, Stem::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
        }
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only stems whose file was actually produced appear here.
pub type StemResult = BTreeMap<Stem, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DownloadFailed,
    SeparationFailed,
    PublishFailed,
    JobFailed,
    TimedOut,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::DownloadFailed => "download_failed",
            ErrorKind::SeparationFailed => "separation_failed",
            ErrorKind::PublishFailed => "publish_failed",
            ErrorKind::JobFailed => "job_failed",
            ErrorKind::TimedOut => "timed_out",
        }
    }

    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::SeparationFailed | ErrorKind::PublishFailed | ErrorKind::TimedOut
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("{0:#}")]
    Download(anyhow::Error),

    #[error("{0:#}")]
    Separation(anyhow::Error),

    #[error("{0:#}")]
    Publish(anyhow::Error),

    #[error("{0:#}")]
    Internal(anyhow::Error),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Download(_) => ErrorKind::DownloadFailed,
            JobError::Separation(_) => ErrorKind::SeparationFailed,
            JobError::Publish(_) => ErrorKind::PublishFailed,
            JobError::Internal(_) => ErrorKind::JobFailed,
        }
    }
}

impl From<TransitionError> for JobError {
    fn from(e: TransitionError) -> Self {
        JobError::Internal(e.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub success: bool,
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<StemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub error_kind: Option<ErrorKind>,
}

impl JobOutcome {
    pub fn completed(job_id: impl Into<String>, files: StemResult) -> Self {
        Self {
            success: true,
            job_id: job_id.into(),
            files: Some(files),
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(job_id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            job_id: job_id.into(),
            files: None,
            error: Some(message.into()),
            error_kind: Some(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            other => anyhow::bail!("unsupported output format: {}", other),
        }
    }
}
