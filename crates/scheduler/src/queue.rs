use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

/// What travels through the queue: a host to ingest, or the close sentinel
/// that tells one worker to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Host(String),
    Close,
}

/// Bounded FIFO between the coordinator and the worker pool.
pub struct JobQueue {
    inner: Mutex<VecDeque<Job>>,
    available: Notify,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push unless full. Returns false when the queue is at capacity.
    pub async fn try_push(&self, job: Job) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.len() >= self.capacity {
            return false;
        }
        inner.push_back(job);
        drop(inner);
        self.available.notify_one();
        true
    }

    /// Pop, waiting up to `wait` for something to arrive.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<Job> {
        if let Some(job) = self.inner.lock().await.pop_front() {
            return Some(job);
        }
        if tokio::time::timeout(wait, self.available.notified())
            .await
            .is_err()
        {
            return None;
        }
        self.inner.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Tracks when each host was last enqueued so the coordinator doesn't feed
/// the same host to two workers back to back. Entries expire after the
/// suppression window; `prune` keeps the map bounded.
pub struct RequeueGuard {
    last_queued: HashMap<String, Instant>,
    window: Duration,
}

impl RequeueGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            last_queued: HashMap::new(),
            window,
        }
    }

    /// True when the host may be enqueued now; marks it as queued.
    pub fn should_enqueue(&mut self, host: &str) -> bool {
        let now = Instant::now();
        if let Some(queued_at) = self.last_queued.get(host) {
            if now.duration_since(*queued_at) < self.window {
                return false;
            }
        }
        self.last_queued.insert(host.to_string(), now);
        true
    }

    pub fn prune(&mut self) {
        let window = self.window;
        let now = Instant::now();
        self.last_queued
            .retain(|_, queued_at| now.duration_since(*queued_at) < window);
    }

    pub fn len(&self) -> usize {
        self.last_queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_queued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_is_fifo_and_bounded() {
        let queue = JobQueue::new(2);
        assert!(queue.try_push(Job::Host("a".into())).await);
        assert!(queue.try_push(Job::Host("b".into())).await);
        assert!(!queue.try_push(Job::Host("c".into())).await);

        assert_eq!(
            queue.pop_timeout(Duration::from_millis(10)).await,
            Some(Job::Host("a".into()))
        );
        assert_eq!(
            queue.pop_timeout(Duration::from_millis(10)).await,
            Some(Job::Host("b".into()))
        );
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, None);
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = std::sync::Arc::new(JobQueue::new(4));
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.try_push(Job::Close).await;
        assert_eq!(popper.await.unwrap(), Some(Job::Close));
    }

    #[test]
    fn requeue_guard_suppresses_within_window() {
        let mut guard = RequeueGuard::new(Duration::from_secs(300));
        assert!(guard.should_enqueue("mastodon.social"));
        assert!(!guard.should_enqueue("mastodon.social"));
        assert!(guard.should_enqueue("other.example"));
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn requeue_guard_expires() {
        let mut guard = RequeueGuard::new(Duration::from_millis(0));
        assert!(guard.should_enqueue("mastodon.social"));
        assert!(guard.should_enqueue("mastodon.social"));
        guard.prune();
        assert!(guard.is_empty());
    }
}
