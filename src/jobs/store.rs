use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::record::{JobId, JobRecord, JobStatus, JobType};

/// Predicate over the filterable job fields. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub owner_id: Option<String>,
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
}

impl JobFilter {
    pub fn matches(&self, record: &JobRecord) -> bool {
        self.owner_id.as_deref().map_or(true, |owner| record.owner_id == owner)
            && self.status.map_or(true, |status| record.status == status)
            && self.job_type.map_or(true, |job_type| record.job_type == job_type)
    }
}

/// How long terminal jobs are kept around
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetentionPolicy {
    /// Evict terminal jobs this long after they finished
    pub ttl: Option<Duration>,
    /// Upper bound on stored jobs; only terminal jobs are evicted to meet it
    pub max_retained: Option<usize>,
}

impl RetentionPolicy {
    pub fn is_enabled(&self) -> bool {
        self.ttl.is_some() || self.max_retained.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStats {
    pub total: usize,
    pub active: usize,
    pub by_status: BTreeMap<JobStatus, usize>,
    pub by_type: BTreeMap<JobType, usize>,
}

/// In-memory job table. One lock guards the whole map; it is never held
/// across an await point other than acquiring it.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a job
    pub async fn put(&self, record: JobRecord) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(record.id.clone(), record);
    }

    /// Snapshot of a single job
    pub async fn get(&self, id: &JobId) -> Option<JobRecord> {
        let jobs = self.jobs.read().await;
        jobs.get(id).cloned()
    }

    /// All jobs matching `filter`, oldest first. Ties on `created_at` are
    /// broken by id so paging over an unchanged store is stable.
    pub async fn list(&self, filter: &JobFilter) -> Vec<JobRecord> {
        let mut matched: Vec<JobRecord> = {
            let jobs = self.jobs.read().await;
            jobs.values().filter(|r| filter.matches(r)).cloned().collect()
        };
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        matched
    }

    /// Apply `mutator` to a job under the write lock. Returns `None` for an
    /// unknown id.
    pub async fn update<F, R>(&self, id: &JobId, mutator: F) -> Option<R>
    where
        F: FnOnce(&mut JobRecord) -> R,
    {
        let mut jobs = self.jobs.write().await;
        jobs.get_mut(id).map(mutator)
    }

    pub async fn remove(&self, id: &JobId) -> Option<JobRecord> {
        let mut jobs = self.jobs.write().await;
        jobs.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    pub async fn stats(&self) -> JobStats {
        let jobs = self.jobs.read().await;
        let mut stats = JobStats {
            total: jobs.len(),
            ..JobStats::default()
        };
        for status in JobStatus::ALL {
            stats.by_status.insert(status, 0);
        }
        for job_type in JobType::ALL {
            stats.by_type.insert(job_type, 0);
        }
        for record in jobs.values() {
            *stats.by_status.entry(record.status).or_default() += 1;
            *stats.by_type.entry(record.job_type).or_default() += 1;
            if record.status.is_active() {
                stats.active += 1;
            }
        }
        stats
    }

    /// Evict terminal jobs per `policy`. Returns how many were removed.
    pub async fn sweep(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();

        if let Some(ttl) = policy.ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()) {
            let cutoff = now - ttl;
            jobs.retain(|_, r| {
                !(r.status.is_terminal() && r.completed_at.map_or(false, |done| done <= cutoff))
            });
        }

        if let Some(max) = policy.max_retained {
            if jobs.len() > max {
                let mut terminal: Vec<(DateTime<Utc>, JobId)> = jobs
                    .values()
                    .filter(|r| r.status.is_terminal())
                    .map(|r| (r.completed_at.unwrap_or(r.updated_at), r.id.clone()))
                    .collect();
                terminal.sort();

                let excess = jobs.len() - max;
                for (_, id) in terminal.into_iter().take(excess) {
                    jobs.remove(&id);
                }
            }
        }

        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!(evicted, remaining = jobs.len(), "Swept expired jobs");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(owner: &str, job_type: JobType) -> JobRecord {
        JobRecord::new(owner, job_type, json!({}), 3)
    }

    fn finished(owner: &str, completed_at: DateTime<Utc>) -> JobRecord {
        let mut rec = job(owner, JobType::ReportGeneration);
        rec.start().unwrap();
        rec.complete(json!({})).unwrap();
        rec.completed_at = Some(completed_at);
        rec
    }

    #[tokio::test]
    async fn get_unknown_id_is_none() {
        let store = JobStore::new();
        store.put(job("biz-1", JobType::ReportGeneration)).await;
        assert!(store.get(&JobId::from("missing")).await.is_none());
        assert!(store.update(&JobId::from("missing"), |r| r.start()).await.is_none());
    }

    #[tokio::test]
    async fn put_replaces_by_id() {
        let store = JobStore::new();
        let mut rec = job("biz-1", JobType::ReportGeneration);
        store.put(rec.clone()).await;
        rec.owner_id = "biz-2".to_string();
        store.put(rec.clone()).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&rec.id).await.unwrap().owner_id, "biz-2");
    }

    #[tokio::test]
    async fn update_mutates_under_lock_and_returns_closure_result() {
        let store = JobStore::new();
        let rec = job("biz-1", JobType::CatalogCreation);
        let id = rec.id.clone();
        store.put(rec).await;

        let outcome = store.update(&id, |r| r.start()).await;
        assert_eq!(outcome, Some(Ok(())));
        assert_eq!(store.get(&id).await.unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn list_filters_on_owner_status_and_type() {
        let store = JobStore::new();
        store.put(job("biz-1", JobType::ReportGeneration)).await;
        store.put(job("biz-1", JobType::CatalogCreation)).await;
        store.put(job("biz-2", JobType::ReportGeneration)).await;

        let by_owner = store
            .list(&JobFilter {
                owner_id: Some("biz-1".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_owner.len(), 2);
        assert!(by_owner.iter().all(|r| r.owner_id == "biz-1"));

        let reports_for_one = store
            .list(&JobFilter {
                owner_id: Some("biz-1".into()),
                job_type: Some(JobType::ReportGeneration),
                status: Some(JobStatus::Pending),
            })
            .await;
        assert_eq!(reports_for_one.len(), 1);

        let processing = store
            .list(&JobFilter {
                status: Some(JobStatus::Processing),
                ..Default::default()
            })
            .await;
        assert!(processing.is_empty());
    }

    #[tokio::test]
    async fn list_order_is_stable_across_calls() {
        let store = JobStore::new();
        for _ in 0..20 {
            store.put(job("biz-1", JobType::DataTransformation)).await;
        }
        let first: Vec<JobId> = store.list(&JobFilter::default()).await.into_iter().map(|r| r.id).collect();
        let second: Vec<JobId> = store.list(&JobFilter::default()).await.into_iter().map(|r| r.id).collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn stats_count_every_status_and_type() {
        let store = JobStore::new();
        store.put(job("biz-1", JobType::ReportGeneration)).await;
        store.put(finished("biz-1", Utc::now())).await;

        let stats = store.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.by_status[&JobStatus::Pending], 1);
        assert_eq!(stats.by_status[&JobStatus::Completed], 1);
        assert_eq!(stats.by_status[&JobStatus::Failed], 0);
        assert_eq!(stats.by_type[&JobType::ReportGeneration], 2);
    }

    #[tokio::test]
    async fn sweep_evicts_expired_terminal_jobs_only() {
        let store = JobStore::new();
        let now = Utc::now();
        let old = finished("biz-1", now - chrono::Duration::hours(2));
        let fresh = finished("biz-1", now - chrono::Duration::minutes(5));
        let mut stale_active = job("biz-1", JobType::ReportGeneration);
        stale_active.created_at = now - chrono::Duration::days(3);

        let (old_id, fresh_id, active_id) = (old.id.clone(), fresh.id.clone(), stale_active.id.clone());
        store.put(old).await;
        store.put(fresh).await;
        store.put(stale_active).await;

        let policy = RetentionPolicy {
            ttl: Some(Duration::from_secs(3600)),
            max_retained: None,
        };
        assert_eq!(store.sweep(&policy, now).await, 1);
        assert!(store.get(&old_id).await.is_none());
        assert!(store.get(&fresh_id).await.is_some());
        assert!(store.get(&active_id).await.is_some());
    }

    #[tokio::test]
    async fn sweep_caps_size_by_evicting_oldest_terminal() {
        let store = JobStore::new();
        let now = Utc::now();
        let oldest = finished("biz-1", now - chrono::Duration::minutes(30));
        let newer = finished("biz-1", now - chrono::Duration::minutes(1));
        let oldest_id = oldest.id.clone();
        store.put(oldest).await;
        store.put(newer).await;
        store.put(job("biz-1", JobType::ReportGeneration)).await;
        store.put(job("biz-1", JobType::ReportGeneration)).await;

        let policy = RetentionPolicy {
            ttl: None,
            max_retained: Some(3),
        };
        assert_eq!(store.sweep(&policy, now).await, 1);
        assert!(store.get(&oldest_id).await.is_none());

        // Cap below the active count: terminal jobs go, active ones stay
        let tight = RetentionPolicy {
            ttl: None,
            max_retained: Some(1),
        };
        assert_eq!(store.sweep(&tight, now).await, 1);
        assert_eq!(store.len().await, 2);
    }
}
