use crate::core::model::{ErrorKind, JobId, JobState};

#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged { job_id: JobId, state: JobState },
    Progress { job_id: JobId, stage: String, percent: u8 },
    Diagnostic { job_id: JobId, line: String },
    Error { scope: String, kind: ErrorKind, message: String },
    Info { scope: String, message: String },
}
