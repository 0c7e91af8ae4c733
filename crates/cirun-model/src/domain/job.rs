use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A job currently executing on this runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningJob {
    pub id: String,
    pub pipeline_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
}

/// Kind of a parsed runner log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    JobStarted,
    JobEnded,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::JobStarted => "job_started",
            JobStatus::JobEnded => "job_ended",
        }
    }
}

/// Structured event extracted from runner output by the platform client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

impl JobEvent {
    pub fn started(job_id: impl Into<String>, pipeline_id: impl Into<String>, date: OffsetDateTime) -> Self {
        Self {
            status: JobStatus::JobStarted,
            job_id: Some(job_id.into()),
            pipeline_id: Some(pipeline_id.into()),
            date,
        }
    }

    pub fn ended(date: OffsetDateTime) -> Self {
        Self {
            status: JobStatus::JobEnded,
            job_id: None,
            pipeline_id: None,
            date,
        }
    }
}
