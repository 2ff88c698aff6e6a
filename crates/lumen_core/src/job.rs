//! Background Job Queue
//!
//! Jobs move through a fixed lifecycle: `Pending -> Processing` on claim,
//! then `Completed` or `Failed`. Terminal states never transition again.
//! Claiming marks the job processing under the store lock, so two workers
//! polling the same store can never both pick up one job.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// What kind of work a job requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Split a source into stems; runs before any analysis of the stems
    StemSeparation,
    /// Feature extraction and event detection for one stem
    AudioAnalysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One queued unit of analysis work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub user_id: String,
    pub source_id: String,
    pub stem_role: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Failure message, set only when status is `Failed`
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        source_id: impl Into<String>,
        stem_role: impl Into<String>,
        kind: JobKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            source_id: source_id.into(),
            stem_role: stem_role.into(),
            kind,
            status: JobStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage backend for the job queue.
///
/// `claim_next` must be atomic with respect to concurrent claimers.
pub trait JobStore: Send + Sync {
    /// Enqueue a new pending job; duplicate ids are rejected
    fn insert(&self, job: AnalysisJob) -> CoreResult<()>;

    /// Atomically claim the oldest pending job of the given kind, marking
    /// it processing. `None` when nothing is pending.
    fn claim_next(&self, kind: JobKind) -> CoreResult<Option<AnalysisJob>>;

    /// Mark a processing job completed
    fn complete(&self, id: &str) -> CoreResult<()>;

    /// Mark a processing job failed with a message
    fn fail(&self, id: &str, error: &str) -> CoreResult<()>;

    fn get(&self, id: &str) -> CoreResult<Option<AnalysisJob>>;

    fn list(&self) -> CoreResult<Vec<AnalysisJob>>;
}

/// In-memory job store backed by a single mutex
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<AnalysisJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(
        &self,
        id: &str,
        to: JobStatus,
        error: Option<&str>,
    ) -> CoreResult<()> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("job '{id}'")))?;
        if job.status != JobStatus::Processing {
            return Err(CoreError::InvalidJobTransition {
                id: id.to_string(),
                from: job.status.to_string(),
            });
        }
        job.status = to;
        job.error = error.map(String::from);
        job.updated_at = Utc::now();
        Ok(())
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: AnalysisJob) -> CoreResult<()> {
        let mut jobs = self.jobs.lock();
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(CoreError::Validation(format!(
                "job '{}' already queued",
                job.id
            )));
        }
        jobs.push(job);
        Ok(())
    }

    fn claim_next(&self, kind: JobKind) -> CoreResult<Option<AnalysisJob>> {
        let mut jobs = self.jobs.lock();
        let next = jobs
            .iter_mut()
            .filter(|j| j.kind == kind && j.status == JobStatus::Pending)
            .min_by_key(|j| j.created_at);
        match next {
            Some(job) => {
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now();
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    fn complete(&self, id: &str) -> CoreResult<()> {
        self.transition(id, JobStatus::Completed, None)
    }

    fn fail(&self, id: &str, error: &str) -> CoreResult<()> {
        self.transition(id, JobStatus::Failed, Some(error))
    }

    fn get(&self, id: &str) -> CoreResult<Option<AnalysisJob>> {
        Ok(self.jobs.lock().iter().find(|j| j.id == id).cloned())
    }

    fn list(&self) -> CoreResult<Vec<AnalysisJob>> {
        Ok(self.jobs.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis_job(id: &str) -> AnalysisJob {
        AnalysisJob::new(id, "user-1", "song-1", "master", JobKind::AudioAnalysis)
    }

    #[test]
    fn test_lifecycle() {
        let store = MemoryJobStore::new();
        store.insert(analysis_job("j1")).unwrap();

        let claimed = store.claim_next(JobKind::AudioAnalysis).unwrap().unwrap();
        assert_eq!(claimed.id, "j1");
        assert_eq!(claimed.status, JobStatus::Processing);

        store.complete("j1").unwrap();
        let job = store.get("j1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_failure_records_message() {
        let store = MemoryJobStore::new();
        store.insert(analysis_job("j1")).unwrap();
        store.claim_next(JobKind::AudioAnalysis).unwrap();
        store.fail("j1", "decode error").unwrap();

        let job = store.get("j1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("decode error"));
    }

    #[test]
    fn test_claim_oldest_first() {
        let store = MemoryJobStore::new();
        let mut first = analysis_job("j1");
        let mut second = analysis_job("j2");
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        second.created_at = Utc::now();
        // Insert newest first to make sure ordering comes from created_at
        store.insert(second).unwrap();
        store.insert(first).unwrap();

        let claimed = store.claim_next(JobKind::AudioAnalysis).unwrap().unwrap();
        assert_eq!(claimed.id, "j1");
    }

    #[test]
    fn test_claim_filters_by_kind() {
        let store = MemoryJobStore::new();
        store.insert(analysis_job("j1")).unwrap();

        assert!(store.claim_next(JobKind::StemSeparation).unwrap().is_none());
        assert!(store.claim_next(JobKind::AudioAnalysis).unwrap().is_some());
    }

    #[test]
    fn test_claim_empty_is_none() {
        let store = MemoryJobStore::new();
        assert!(store.claim_next(JobKind::AudioAnalysis).unwrap().is_none());
    }

    #[test]
    fn test_no_transition_from_terminal() {
        let store = MemoryJobStore::new();
        store.insert(analysis_job("j1")).unwrap();
        store.claim_next(JobKind::AudioAnalysis).unwrap();
        store.complete("j1").unwrap();

        let err = store.fail("j1", "late failure").unwrap_err();
        assert!(matches!(err, CoreError::InvalidJobTransition { .. }));

        let err = store.complete("j1").unwrap_err();
        assert!(matches!(err, CoreError::InvalidJobTransition { .. }));
    }

    #[test]
    fn test_no_completion_without_claim() {
        let store = MemoryJobStore::new();
        store.insert(analysis_job("j1")).unwrap();
        let err = store.complete("j1").unwrap_err();
        assert!(matches!(err, CoreError::InvalidJobTransition { .. }));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = MemoryJobStore::new();
        store.insert(analysis_job("j1")).unwrap();
        let err = store.insert(analysis_job("j1")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_claimed_job_not_claimable_again() {
        let store = MemoryJobStore::new();
        store.insert(analysis_job("j1")).unwrap();
        assert!(store.claim_next(JobKind::AudioAnalysis).unwrap().is_some());
        assert!(store.claim_next(JobKind::AudioAnalysis).unwrap().is_none());
    }
}
