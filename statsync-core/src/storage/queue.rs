use std::collections::VecDeque;
use std::sync::Arc;

use super::{queue_key, KeyValueStore};
use crate::error::StorageError;
use crate::models::MutationJob;

/// Durable FIFO of jobs waiting to be pushed.
///
/// Every mutation rewrites the whole record, so after any successful call
/// the persisted queue matches the in-memory one.
pub struct PendingQueue {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    jobs: VecDeque<MutationJob>,
}

impl PendingQueue {
    /// Reloads the queue for `user_id` from durable storage.
    ///
    /// An unreadable record is an error rather than an empty queue.
    pub fn hydrate(kv: Arc<dyn KeyValueStore>, user_id: &str) -> Result<Self, StorageError> {
        let key = queue_key(user_id);
        let jobs = match kv.get(&key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| StorageError::Decode(key.clone(), e))?,
            None => VecDeque::new(),
        };

        if !jobs.is_empty() {
            tracing::info!("Recovered {} pending job(s) for '{}'", jobs.len(), key);
        }

        Ok(Self { kv, key, jobs })
    }

    /// Appends `job` and persists the queue.
    pub fn enqueue(&mut self, job: MutationJob) -> Result<(), StorageError> {
        self.jobs.push_back(job);
        self.persist()
    }

    /// Supersedes the newest job with `job`, or appends it if the queue is
    /// empty. Positions of older jobs are unchanged.
    pub fn replace_back(&mut self, job: MutationJob) -> Result<(), StorageError> {
        match self.jobs.back_mut() {
            Some(back) => *back = job,
            None => self.jobs.push_back(job),
        }
        self.persist()
    }

    /// The oldest job, if any.
    pub fn peek_front(&self) -> Option<&MutationJob> {
        self.jobs.front()
    }

    /// The newest job, if any.
    pub fn peek_back(&self) -> Option<&MutationJob> {
        self.jobs.back()
    }

    /// Removes and returns the oldest job, persisting the shorter queue.
    pub fn pop_front(&mut self) -> Result<Option<MutationJob>, StorageError> {
        let job = self.jobs.pop_front();
        if job.is_some() {
            self.persist()?;
        }
        Ok(job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutationJob> {
        self.jobs.iter()
    }

    fn persist(&self) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&self.jobs)
            .map_err(|e| StorageError::Encode(self.key.clone(), e))?;
        self.kv.set(&self.key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserStatsSnapshot;
    use crate::storage::{FileStore, MemoryStore};
    use chrono::Utc;
    use tempfile::TempDir;

    fn job(xp: u64) -> MutationJob {
        MutationJob::new(
            UserStatsSnapshot {
                xp,
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_empty_storage_hydrates_empty_queue() {
        let queue = PendingQueue::hydrate(Arc::new(MemoryStore::new()), "u1").unwrap();
        assert!(queue.is_empty());
        assert!(queue.peek_front().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PendingQueue::hydrate(Arc::new(MemoryStore::new()), "u1").unwrap();
        for xp in 1..=3 {
            queue.enqueue(job(xp)).unwrap();
        }

        let drained: Vec<u64> = std::iter::from_fn(|| queue.pop_front().unwrap())
            .map(|j| j.snapshot.xp)
            .collect();
        assert_eq!(drained, vec![1, 2, 3]);
    }

    #[test]
    fn test_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));

        let mut queue = PendingQueue::hydrate(kv.clone(), "u1").unwrap();
        for xp in 1..=5 {
            queue.enqueue(job(xp)).unwrap();
        }
        queue.pop_front().unwrap();
        drop(queue);

        let reloaded = PendingQueue::hydrate(kv, "u1").unwrap();
        assert_eq!(reloaded.len(), 4);
        let order: Vec<u64> = reloaded.iter().map(|j| j.snapshot.xp).collect();
        assert_eq!(order, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_replace_back_keeps_older_jobs() {
        let kv = MemoryStore::new();
        let mut queue = PendingQueue::hydrate(Arc::new(kv.clone()), "u1").unwrap();
        queue.enqueue(job(1)).unwrap();
        queue.enqueue(job(2)).unwrap();
        queue.replace_back(job(3)).unwrap();

        let order: Vec<u64> = queue.iter().map(|j| j.snapshot.xp).collect();
        assert_eq!(order, vec![1, 3]);

        let reloaded = PendingQueue::hydrate(Arc::new(kv), "u1").unwrap();
        assert_eq!(reloaded.peek_back().unwrap().snapshot.xp, 3);
    }

    #[test]
    fn test_replace_back_on_empty_appends() {
        let mut queue = PendingQueue::hydrate(Arc::new(MemoryStore::new()), "u1").unwrap();
        queue.replace_back(job(9)).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let kv = MemoryStore::new();
        kv.set("stats:u1:queue", "[{").unwrap();

        let result = PendingQueue::hydrate(Arc::new(kv), "u1");
        assert!(matches!(result, Err(StorageError::Decode(_, _))));
    }
}
