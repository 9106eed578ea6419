use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::ErrorBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid job transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One asynchronous execution request. `owner` is the submitting key's
/// fingerprint; `result` is set iff completed, `error` iff failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub queue_id: String,
    pub owner: String,
    pub endpoint: String,
    pub data: Value,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(owner: String, endpoint: impl Into<String>, data: Value) -> Self {
        let now = Utc::now();
        Self {
            queue_id: Uuid::new_v4().to_string(),
            owner,
            endpoint: endpoint.into(),
            data,
            status: JobStatus::Queued,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Only queued→processing and processing→{completed, failed} are legal.
    fn transition(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        let legal = matches!(
            (self.status, to),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        );
        if !legal {
            return Err(TransitionError { from: self.status, to });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)
    }

    pub fn complete(&mut self, result: Value) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: ErrorBody) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Restart recovery: an interrupted job goes back to queued. This is the
    /// only backwards move and is never used on a live queue.
    pub(crate) fn reset_for_resume(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Queued;
        self.result = None;
        self.error = None;
        self.updated_at = Utc::now();
        true
    }

    /// Wire form for resource reads: status, id, timestamps and the outcome.
    pub fn summary(&self) -> Value {
        let mut v = json!({
            "queue_id": self.queue_id,
            "endpoint": self.endpoint,
            "status": self.status,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        });
        if let Some(result) = &self.result {
            v["result"] = result.clone();
        }
        if let Some(error) = &self.error {
            v["error"] = json!(error);
        }
        v
    }
}

/// Result of a status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Pending { queue_id: String, status: JobStatus },
    Completed(Value),
    Failed(ErrorBody),
}

impl JobOutcome {
    pub fn from_job(job: &Job) -> Self {
        match (job.status, &job.result, &job.error) {
            (JobStatus::Completed, Some(result), _) => JobOutcome::Completed(result.clone()),
            (JobStatus::Failed, _, Some(error)) => JobOutcome::Failed(error.clone()),
            (status, _, _) => JobOutcome::Pending {
                queue_id: job.queue_id.clone(),
                status,
            },
        }
    }

    /// Body returned by the status route: `{"queue_id"}` while pending, the
    /// result when completed, `{"error": ...}` when failed.
    pub fn into_body(self) -> Value {
        match self {
            JobOutcome::Pending { queue_id, .. } => json!({ "queue_id": queue_id }),
            JobOutcome::Completed(result) => result,
            JobOutcome::Failed(error) => error.to_envelope(),
        }
    }
}
