//! In-process job registry for one-shot background work (a manual poll, a
//! reconcile pass) triggered from the HTTP API.
//!
//! Grounded on the original resolver's `job_runner` module, adapted from its
//! thread-per-job model to tokio tasks: jobs live in a map guarded by a
//! single async mutex, and a watchdog check on `get` force-fails anything
//! that's been running past its declared timeout, since a crashed task can't
//! otherwise update its own status.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

const WATCHDOG_GRACE_SEC: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub kind: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub timeout_sec: u64,
    pub result: Option<String>,
    pub error: Option<String>,
}

struct JobEntry {
    record: JobRecord,
    handle: Option<JoinHandle<()>>,
}

#[derive(Clone, Default)]
pub struct JobRunner {
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
}

impl JobRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits `fut` as a new job named `kind`, returning its id immediately.
    /// `fut` resolves to `Ok(summary)` or `Err(message)`; both are recorded
    /// as plain strings since job results only ever surface through the API.
    pub async fn submit<F>(&self, kind: &str, timeout_sec: u64, fut: F) -> String
    where
        F: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let record = JobRecord {
            id: id.clone(),
            kind: kind.to_string(),
            status: JobStatus::Queued,
            created_at: now,
            started_at: None,
            finished_at: None,
            timeout_sec,
            result: None,
            error: None,
        };

        let jobs = Arc::clone(&self.jobs);
        let job_id = id.clone();
        {
            let mut guard = jobs.lock().await;
            guard.insert(
                id.clone(),
                JobEntry {
                    record,
                    handle: None,
                },
            );
        }

        let jobs_for_task = Arc::clone(&self.jobs);
        let handle = tokio::spawn(async move {
            {
                let mut guard = jobs_for_task.lock().await;
                if let Some(entry) = guard.get_mut(&job_id) {
                    if entry.record.status == JobStatus::Cancelled {
                        return;
                    }
                    entry.record.status = JobStatus::Running;
                    entry.record.started_at = Some(Utc::now());
                }
            }

            let outcome = tokio::time::timeout(
                std::time::Duration::from_secs(timeout_sec.max(1)),
                fut,
            )
            .await;

            let mut guard = jobs_for_task.lock().await;
            let Some(entry) = guard.get_mut(&job_id) else {
                return;
            };
            if entry.record.status == JobStatus::Cancelled {
                return;
            }
            entry.record.finished_at = Some(Utc::now());
            match outcome {
                Ok(Ok(summary)) => {
                    entry.record.status = JobStatus::Done;
                    entry.record.result = Some(summary);
                }
                Ok(Err(message)) => {
                    error!(job_id = %job_id, error = %message, "job failed");
                    entry.record.status = JobStatus::Failed;
                    entry.record.error = Some(message);
                }
                Err(_) => {
                    warn!(job_id = %job_id, timeout_sec, "job timed out");
                    entry.record.status = JobStatus::Failed;
                    entry.record.error = Some(format!("job timed out after {timeout_sec}s"));
                }
            }
        });

        let mut guard = jobs.lock().await;
        if let Some(entry) = guard.get_mut(&id) {
            entry.handle = Some(handle);
        }
        drop(guard);

        id
    }

    /// Returns the job's current record, applying the watchdog: a job still
    /// marked running more than `timeout_sec + 5s` after it started is force
    /// marked failed, covering a task that panicked without updating its own
    /// status.
    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        let mut guard = self.jobs.lock().await;
        let entry = guard.get_mut(id)?;

        if entry.record.status == JobStatus::Running
            && let Some(started) = entry.record.started_at
        {
            let deadline = started
                + chrono::Duration::seconds(
                    i64::try_from(entry.record.timeout_sec).unwrap_or(i64::MAX) + WATCHDOG_GRACE_SEC,
                );
            if Utc::now() > deadline {
                entry.record.status = JobStatus::Failed;
                entry.record.finished_at = Some(Utc::now());
                entry.record.error = Some(format!(
                    "job watchdog timeout after {}s",
                    entry.record.timeout_sec
                ));
            }
        }

        Some(entry.record.clone())
    }

    /// Cancels a queued job outright; a running job is only flagged (by
    /// aborting its task) since cooperative cancellation isn't threaded
    /// through the futures run by `submit`.
    pub async fn cancel(&self, id: &str) -> bool {
        let mut guard = self.jobs.lock().await;
        let Some(entry) = guard.get_mut(id) else {
            return false;
        };
        match entry.record.status {
            JobStatus::Queued | JobStatus::Running => {
                if let Some(handle) = entry.handle.take() {
                    handle.abort();
                }
                entry.record.status = JobStatus::Cancelled;
                entry.record.finished_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submitted_job_completes() {
        let runner = JobRunner::new();
        let id = runner
            .submit("test", 5, async { Ok("done".to_string()) })
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let record = runner.get(&id).await.expect("job exists");
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn failed_job_records_error() {
        let runner = JobRunner::new();
        let id = runner
            .submit("test", 5, async { Err("boom".to_string()) })
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let record = runner.get(&id).await.expect("job exists");
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn cancel_queued_job() {
        let runner = JobRunner::new();
        let id = runner
            .submit("test", 5, async {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                Ok("never".to_string())
            })
            .await;
        let cancelled = runner.cancel(&id).await;
        assert!(cancelled);
        let record = runner.get(&id).await.expect("job exists");
        assert_eq!(record.status, JobStatus::Cancelled);
    }
}
