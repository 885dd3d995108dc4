//! In-memory job registry
//!
//! The ingress surface the HTTP/WebSocket façade drives: submit, observe,
//! subscribe, cancel, delete. Jobs live in memory for the process lifetime;
//! nothing is persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::events::{JobEvent, MultiJobEvent};
use super::job::Job;
use super::multi::{MultiScopeJob, ScopeStartInfo};
use super::types::{CrawlResult, JobSnapshot, MultiCrawlResult, MultiJobSnapshot};
use crate::config::{JobSpec, Limits, MultiJobSpec};
use crate::{Result, SeineError};

enum ManagedJob {
    Single(Arc<Job>),
    Multi(Arc<MultiScopeJob>),
}

/// Snapshot of either job shape
#[derive(Debug, Clone)]
pub enum JobOverview {
    Single(JobSnapshot),
    Multi(MultiJobSnapshot),
}

/// Terminal output of either job shape
#[derive(Debug, Clone)]
pub enum JobOutput {
    Single(CrawlResult),
    Multi(MultiCrawlResult),
}

/// Event stream of either job shape
pub enum JobEvents {
    Single(tokio::sync::mpsc::Receiver<JobEvent>),
    Multi(tokio::sync::mpsc::Receiver<MultiJobEvent>),
}

/// Submission response for a multi-scope job
#[derive(Debug, Clone)]
pub struct MultiJobStartInfo {
    pub job_id: String,
    pub scopes: Vec<ScopeStartInfo>,
    pub warnings: Vec<String>,
}

/// Registry of running and finished jobs
pub struct JobRegistry {
    limits: Arc<Limits>,
    jobs: Mutex<HashMap<String, ManagedJob>>,
}

impl JobRegistry {
    pub fn new(limits: Arc<Limits>) -> Self {
        Self {
            limits,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with limits from environment overrides
    pub fn from_env() -> Self {
        Self::new(Arc::new(Limits::from_env()))
    }

    /// Validates, registers, and starts a single-scope job
    pub fn start_job(&self, spec: JobSpec) -> Result<String> {
        let job = Arc::new(Job::new(spec, self.limits.clone())?);
        let job_id = job.id().to_string();
        job.start();
        self.lock().insert(job_id.clone(), ManagedJob::Single(job));
        tracing::info!("Registered job {}", job_id);
        Ok(job_id)
    }

    /// Validates, registers, and starts a multi-scope job
    pub fn start_multi_job(&self, spec: MultiJobSpec) -> Result<MultiJobStartInfo> {
        let job = Arc::new(MultiScopeJob::new(spec, self.limits.clone())?);
        let info = MultiJobStartInfo {
            job_id: job.id().to_string(),
            scopes: job.scope_infos().to_vec(),
            warnings: job.warnings().to_vec(),
        };
        job.start();
        self.lock()
            .insert(info.job_id.clone(), ManagedJob::Multi(job));
        tracing::info!("Registered multi-scope job {}", info.job_id);
        Ok(info)
    }

    /// Current snapshot of a job
    pub fn get_snapshot(&self, job_id: &str) -> Result<JobOverview> {
        match self.get(job_id)? {
            ManagedJobRef::Single(job) => Ok(JobOverview::Single(job.snapshot())),
            ManagedJobRef::Multi(job) => Ok(JobOverview::Multi(job.snapshot())),
        }
    }

    /// Full results; errors until the job is terminal
    pub fn get_result(&self, job_id: &str) -> Result<JobOutput> {
        match self.get(job_id)? {
            ManagedJobRef::Single(job) => job
                .result()
                .map(JobOutput::Single)
                .ok_or_else(|| SeineError::JobNotFinished(job_id.to_string())),
            ManagedJobRef::Multi(job) => job
                .result()
                .map(JobOutput::Multi)
                .ok_or_else(|| SeineError::JobNotFinished(job_id.to_string())),
        }
    }

    /// Subscribes to a job's event stream
    pub fn subscribe(&self, job_id: &str) -> Result<JobEvents> {
        match self.get(job_id)? {
            ManagedJobRef::Single(job) => Ok(JobEvents::Single(job.subscribe())),
            ManagedJobRef::Multi(job) => Ok(JobEvents::Multi(job.subscribe())),
        }
    }

    /// Requests cancellation of a job
    pub fn cancel(&self, job_id: &str) -> Result<()> {
        match self.get(job_id)? {
            ManagedJobRef::Single(job) => job.cancel(),
            ManagedJobRef::Multi(job) => job.cancel(),
        }
        Ok(())
    }

    /// Waits until a job reaches a terminal state
    pub async fn wait(&self, job_id: &str) -> Result<()> {
        match self.get(job_id)? {
            ManagedJobRef::Single(job) => job.wait().await,
            ManagedJobRef::Multi(job) => job.wait().await,
        }
        Ok(())
    }

    /// Cancels and removes a job
    pub fn delete(&self, job_id: &str) -> Result<()> {
        let removed = self.lock().remove(job_id);
        match removed {
            Some(ManagedJob::Single(job)) => {
                job.cancel();
                Ok(())
            }
            Some(ManagedJob::Multi(job)) => {
                job.cancel();
                Ok(())
            }
            None => Err(SeineError::JobNotFound(job_id.to_string())),
        }
    }

    /// Snapshots of every registered job
    pub fn list(&self) -> Vec<JobOverview> {
        self.lock()
            .values()
            .map(|job| match job {
                ManagedJob::Single(job) => JobOverview::Single(job.snapshot()),
                ManagedJob::Multi(job) => JobOverview::Multi(job.snapshot()),
            })
            .collect()
    }

    fn get(&self, job_id: &str) -> Result<ManagedJobRef> {
        let jobs = self.lock();
        match jobs.get(job_id) {
            Some(ManagedJob::Single(job)) => Ok(ManagedJobRef::Single(job.clone())),
            Some(ManagedJob::Multi(job)) => Ok(ManagedJobRef::Multi(job.clone())),
            None => Err(SeineError::JobNotFound(job_id.to_string())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ManagedJob>> {
        self.jobs.lock().expect("registry lock poisoned")
    }
}

enum ManagedJobRef {
    Single(Arc<Job>),
    Multi(Arc<MultiScopeJob>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_job_id() {
        let registry = JobRegistry::new(Arc::new(Limits::default()));
        assert!(matches!(
            registry.get_snapshot("deadbeef"),
            Err(SeineError::JobNotFound(_))
        ));
        assert!(matches!(
            registry.cancel("deadbeef"),
            Err(SeineError::JobNotFound(_))
        ));
        assert!(matches!(
            registry.delete("deadbeef"),
            Err(SeineError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_start_job_rejects_invalid_seeds() {
        let registry = JobRegistry::new(Arc::new(Limits::default()));
        let spec = JobSpec {
            seed_urls: vec!["mailto:no@where".to_string()],
            mode: crate::config::CrawlMode::CrawlScrape,
            max_depth: 2,
            worker_count: 2,
            allow_subdomains: false,
            allowed_domains: Vec::new(),
            include_child_pages: true,
        };
        assert!(registry.start_job(spec).is_err());
    }
}
