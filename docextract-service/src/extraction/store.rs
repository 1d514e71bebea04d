//! Transient in-memory job store.
//!
//! Records hold previously extracted personal data, so nothing here is ever
//! written to disk. A sweep task evicts records older than the TTL; it is the
//! only thing that bounds memory growth. Reads also treat expired records as
//! absent, so visibility does not depend on when the sweep last ran.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::ExtractionJob;

/// Lower bound for the sweep period so tiny TTLs don't spin the sweeper
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

struct StoredJob {
    job: ExtractionJob,
    expires_at: Instant,
}

type JobMap = HashMap<String, StoredJob>;

/// Concurrency-safe, TTL-evicting map from job id to job record.
///
/// Constructing the store starts its sweep task, so it must be created inside
/// a tokio runtime. Call [`JobStore::shutdown`] (or drop the store) to stop it.
pub struct JobStore {
    jobs: Arc<RwLock<JobMap>>,
    ttl: Duration,
    shutdown: CancellationToken,
}

impl JobStore {
    /// Create a store and start its background sweep (every `ttl / 2`).
    pub fn new(ttl: Duration) -> Self {
        let jobs = Arc::new(RwLock::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        // The first deadline is fixed here, not when the task is first polled
        let period = (ttl / 2).max(MIN_SWEEP_INTERVAL);
        let interval = tokio::time::interval_at(Instant::now() + period, period);
        tokio::spawn(sweep_loop(jobs.clone(), interval, shutdown.clone()));
        info!(ttl_secs = ttl.as_secs_f64(), "Job store started");

        Self {
            jobs,
            ttl,
            shutdown,
        }
    }

    /// Generate a job id: 16 random bytes from the OS CSPRNG as 32 lowercase hex chars.
    pub fn generate_id() -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Insert or overwrite a record keyed by its job id.
    pub fn put(&self, job: ExtractionJob) {
        let expires_at = self.expiry_for(&job);
        write_jobs(&self.jobs).insert(job.job_id.clone(), StoredJob { job, expires_at });
    }

    /// Snapshot of a record. Unknown and expired ids are both `None`.
    pub fn get(&self, job_id: &str) -> Option<ExtractionJob> {
        let now = Instant::now();
        read_jobs(&self.jobs)
            .get(job_id)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.job.clone())
    }

    /// Apply `update` to a live record in place. Returns false if there was none.
    pub fn update<F>(&self, job_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut ExtractionJob),
    {
        let now = Instant::now();
        let mut jobs = write_jobs(&self.jobs);
        match jobs.get_mut(job_id) {
            Some(stored) if stored.expires_at > now => {
                update(&mut stored.job);
                true
            }
            _ => false,
        }
    }

    /// Remove a record. Returns whether one was present.
    #[allow(dead_code)] // Part of the store contract; eviction normally goes through the sweep
    pub fn delete(&self, job_id: &str) -> bool {
        write_jobs(&self.jobs).remove(job_id).is_some()
    }

    /// Number of live (unexpired) records
    pub fn len(&self) -> usize {
        let now = Instant::now();
        read_jobs(&self.jobs)
            .values()
            .filter(|stored| stored.expires_at > now)
            .count()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the sweep task. Records already stored stay readable until they expire.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            info!("Job store sweeper stopped");
        }
    }

    /// Expiry instant derived from the job's creation time, not the insert time.
    fn expiry_for(&self, job: &ExtractionJob) -> Instant {
        let age = (Utc::now() - job.created_at).to_std().unwrap_or_default();
        Instant::now() + self.ttl.saturating_sub(age)
    }

    #[cfg(test)]
    fn stored_len(&self) -> usize {
        read_jobs(&self.jobs).len()
    }
}

impl Drop for JobStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn sweep_loop(
    jobs: Arc<RwLock<JobMap>>,
    mut interval: tokio::time::Interval,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let removed = sweep_expired(&jobs);
                if removed > 0 {
                    debug!(removed, "Evicted expired extraction jobs");
                }
            }
        }
    }
}

fn sweep_expired(jobs: &RwLock<JobMap>) -> usize {
    let now = Instant::now();
    let mut jobs = write_jobs(jobs);
    let before = jobs.len();
    jobs.retain(|_, stored| stored.expires_at > now);
    before - jobs.len()
}

// A panic while holding the lock can't leave a record half-written: every
// mutation is a single insert/remove or a closure over one record.
fn read_jobs(jobs: &RwLock<JobMap>) -> RwLockReadGuard<'_, JobMap> {
    jobs.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_jobs(jobs: &RwLock<JobMap>) -> RwLockWriteGuard<'_, JobMap> {
    jobs.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::{DocumentType, ExtractionResult, ExtractionStatus};
    use std::collections::HashSet;

    /// Let spawned tasks and due timers run under a paused clock.
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_generate_id_format() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = JobStore::generate_id();
            assert_eq!(id.len(), 32);
            assert!(
                id.chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
            );
            assert!(seen.insert(id));
        }
    }

    #[tokio::test]
    async fn test_put_get_update_delete() {
        let store = JobStore::new(Duration::from_secs(60));
        let job = ExtractionJob::processing(JobStore::generate_id());
        let id = job.job_id.clone();

        assert!(store.get(&id).is_none());
        store.put(job.clone());
        assert_eq!(store.get(&id), Some(job));
        assert_eq!(store.len(), 1);

        let updated = store.update(&id, |j| {
            j.complete(ExtractionResult::empty(DocumentType::Resume, "stub"));
        });
        assert!(updated);
        assert_eq!(
            store.get(&id).map(|j| j.status),
            Some(ExtractionStatus::Completed)
        );

        // Unknown ids are a silent no-op
        assert!(!store.update("missing", |j| {
            j.fail("never applied");
        }));

        assert!(store.delete(&id));
        assert!(!store.delete(&id));
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_until_ttl_elapses() {
        let ttl = Duration::from_secs(10);
        let store = JobStore::new(ttl);
        let job = ExtractionJob::processing(JobStore::generate_id());
        let id = job.job_id.clone();
        store.put(job);

        tokio::time::advance(Duration::from_millis(9_990)).await;
        assert!(store.get(&id).is_some());

        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(store.get(&id).is_none());
        assert!(!store.update(&id, |j| {
            j.fail("too late");
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_expired_records() {
        let store = JobStore::new(Duration::from_secs(10));
        store.put(ExtractionJob::processing(JobStore::generate_id()));
        assert_eq!(store.stored_len(), 1);

        // Sweeps fire at 5s, 10s, 15s
        tokio::time::advance(Duration::from_secs(16)).await;
        settle().await;

        assert_eq!(store.stored_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sweep_is_anchored_at_construction() {
        let store = JobStore::new(Duration::from_secs(10));
        store.put(ExtractionJob::processing(JobStore::generate_id()));

        // The sweeper has not been polled yet; its 5s and 10s ticks are both due
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;

        assert_eq!(store.stored_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweeper() {
        let store = JobStore::new(Duration::from_secs(10));
        let id = JobStore::generate_id();
        store.put(ExtractionJob::processing(id.clone()));

        store.shutdown();
        settle().await;

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;

        // Nothing swept the record, but it is still reported absent
        assert_eq!(store.stored_len(), 1);
        assert!(store.get(&id).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_on_distinct_ids() {
        let store = Arc::new(JobStore::new(Duration::from_secs(60)));
        let ids: Vec<String> = (0..64).map(|_| JobStore::generate_id()).collect();
        for id in &ids {
            store.put(ExtractionJob::processing(id.clone()));
        }

        let mut handles = Vec::new();
        for id in ids.clone() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update(&id, |job| {
                    job.fail(format!("failed {}", job.job_id));
                });
                // Readers never see a half-applied transition
                let snapshot = store.get(&id).unwrap();
                assert_eq!(snapshot.status, ExtractionStatus::Failed);
                assert_eq!(snapshot.error, Some(format!("failed {}", id)));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for id in &ids {
            let job = store.get(id).unwrap();
            assert_eq!(job.error, Some(format!("failed {}", id)));
            assert!(job.results.is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_id_reads_are_consistent() {
        let store = Arc::new(JobStore::new(Duration::from_secs(60)));
        let id = JobStore::generate_id();
        store.put(ExtractionJob::processing(id.clone()));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    for _ in 0..10_000 {
                        let job = store.get(&id).unwrap();
                        match job.status {
                            ExtractionStatus::Processing => {
                                assert!(job.results.is_empty());
                                assert!(job.error.is_none());
                            }
                            ExtractionStatus::Completed => {
                                assert_eq!(job.results.len(), 1);
                                assert!(job.error.is_none());
                            }
                            other => panic!("unexpected status {:?}", other),
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let writer = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                store.update(&id, |job| {
                    job.complete(ExtractionResult::empty(DocumentType::Resume, "stub"));
                })
            })
        };

        assert!(writer.await.unwrap());
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(
            store.get(&id).map(|j| j.status),
            Some(ExtractionStatus::Completed)
        );
    }
}
