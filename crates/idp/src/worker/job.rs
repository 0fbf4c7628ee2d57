use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses only move forward. `pending → failed` covers a failed
    /// enqueue; terminal states never change.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// One unit of asynchronous extraction work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub document_name: String,
    pub processing_mode: String,
    pub object_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<u64>,
    pub fields_extracted: Option<u32>,
    pub document_ref: Option<String>,
    pub extraction_ref: Option<String>,
    pub error_message: Option<String>,
}

impl Job {
    pub fn pending(
        id: impl Into<String>,
        document_name: impl Into<String>,
        processing_mode: impl Into<String>,
        object_path: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            document_name: document_name.into(),
            processing_mode: processing_mode.into(),
            object_path,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            processing_time_ms: None,
            fields_extracted: None,
            document_ref: None,
            extraction_ref: None,
            error_message: None,
        }
    }
}

/// Partial update applied read-modify-write by the job store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<u64>,
    pub fields_extracted: Option<u32>,
    pub document_ref: Option<String>,
    pub extraction_ref: Option<String>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn completed(
        at: DateTime<Utc>,
        processing_time_ms: u64,
        fields_extracted: u32,
        document_ref: impl Into<String>,
        extraction_ref: impl Into<String>,
    ) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            completed_at: Some(at),
            processing_time_ms: Some(processing_time_ms),
            fields_extracted: Some(fields_extracted),
            document_ref: Some(document_ref.into()),
            extraction_ref: Some(extraction_ref.into()),
            ..Self::default()
        }
    }

    /// Completion without timing, used when reconciling a job whose records
    /// exist but whose final write was lost.
    pub fn reconciled(at: DateTime<Utc>, document_ref: String, extraction_ref: String) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            completed_at: Some(at),
            document_ref: Some(document_ref),
            extraction_ref: Some(extraction_ref),
            ..Self::default()
        }
    }

    pub fn failed(at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            failed_at: Some(at),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn apply(self, job: &mut Job, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if self.completed_at.is_some() {
            job.completed_at = self.completed_at;
        }
        if self.failed_at.is_some() {
            job.failed_at = self.failed_at;
        }
        if self.processing_time_ms.is_some() {
            job.processing_time_ms = self.processing_time_ms;
        }
        if self.fields_extracted.is_some() {
            job.fields_extracted = self.fields_extracted;
        }
        if self.document_ref.is_some() {
            job.document_ref = self.document_ref;
        }
        if self.extraction_ref.is_some() {
            job.extraction_ref = self.extraction_ref;
        }
        if self.error_message.is_some() {
            job.error_message = self.error_message;
        }
        job.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_and_serde() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_apply_failed_update() {
        let now = Utc::now();
        let mut job = Job::pending("j1", "a.pdf", "single_backend", None, now);
        job.status = JobStatus::Processing;

        JobUpdate::failed(now, "boom").apply(&mut job, now);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert_eq!(job.failed_at, Some(now));
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_apply_completed_update_keeps_unset_fields() {
        let now = Utc::now();
        let mut job = Job::pending("j1", "a.pdf", "single_backend", Some("j1/a.pdf".into()), now);

        JobUpdate::completed(now, 1200, 3, "doc-1", "ext-1").apply(&mut job, now);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processing_time_ms, Some(1200));
        assert_eq!(job.fields_extracted, Some(3));
        assert_eq!(job.object_path.as_deref(), Some("j1/a.pdf"));
        assert!(job.error_message.is_none());
    }
}
