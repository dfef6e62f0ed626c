use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fedimapper_core::config::QueueConfig;
use fedimapper_core::{HostProcessor, HostSource};

use crate::queue::{Job, JobQueue, RequeueGuard};

/// How a populate pass went; decides how long the coordinator naps.
enum Populate {
    /// Work was enqueued, or the queue is already comfortably full.
    Busy,
    /// Nothing to enqueue right now.
    Idle,
    /// The source is finished for good.
    Drained,
}

/// Coordinator plus worker pool. The coordinator keeps `num_processes`
/// workers alive, feeds the bounded queue from the host source and handles
/// signal-driven shutdown. Workers recycle themselves after
/// `max_jobs_per_process` jobs and are relaunched, which keeps any slow
/// memory growth inside a bounded lifetime.
pub struct QueueRunner<P: HostProcessor + Clone> {
    settings: QueueConfig,
    processor: P,
}

impl<P: HostProcessor + Clone> QueueRunner<P> {
    pub fn new(settings: QueueConfig, processor: P) -> Self {
        Self {
            settings,
            processor,
        }
    }

    pub async fn run(self, mut source: impl HostSource) -> Result<()> {
        let queue = Arc::new(JobQueue::new(self.settings.max_queue_size));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut guard = RequeueGuard::new(Duration::from_secs_f64(
            self.settings.prevent_requeuing_time,
        ));

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut worker_launches = 0usize;

        info!(
            workers = self.settings.num_processes,
            queue = self.settings.max_queue_size,
            "queue runner starting"
        );

        loop {
            // Reap exited or panicked workers, then bring the pool back up
            // to size.
            workers.retain(|handle| !handle.is_finished());
            while workers.len() < self.settings.num_processes {
                workers.push(self.launch_worker(
                    worker_launches,
                    Arc::clone(&queue),
                    Arc::clone(&shutdown),
                ));
                worker_launches += 1;
            }

            let outcome = self.populate(&queue, &mut guard, &mut source).await?;

            if matches!(outcome, Populate::Drained) {
                info!("host source drained, closing workers");
                for _ in 0..workers.len() {
                    // The queue may still hold real jobs; wait for room so
                    // every worker is guaranteed a sentinel.
                    while !queue.try_push(Job::Close).await {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
                for handle in workers.drain(..) {
                    let _ = handle.await;
                }
                break;
            }

            let nap = match outcome {
                Populate::Busy => Duration::from_millis(50),
                _ => Duration::from_secs_f64(self.settings.full_queue_sleep_time),
            };

            tokio::select! {
                _ = sigint.recv() => {
                    info!("SIGINT received, terminating workers");
                    shutdown.store(true, Ordering::SeqCst);
                    for handle in workers.drain(..) {
                        handle.abort();
                    }
                    break;
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received, shutting down gracefully");
                    shutdown.store(true, Ordering::SeqCst);
                    self.graceful_shutdown(&queue, &mut workers).await;
                    break;
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }

        info!("queue runner stopped");
        Ok(())
    }

    /// Ask the writer for more hosts unless the queue is already well fed.
    /// The queue length is a snapshot that other tasks move under us, so
    /// population targets 80% of capacity rather than the brim.
    async fn populate(
        &self,
        queue: &JobQueue,
        guard: &mut RequeueGuard,
        source: &mut impl HostSource,
    ) -> Result<Populate> {
        guard.prune();

        let queue_size = queue.len().await;
        if queue_size * 10 >= queue.capacity() * 3 {
            return Ok(Populate::Busy);
        }

        let headroom = queue.capacity() * 8 / 10;
        if headroom <= queue_size {
            debug!("skipping queue population due to max queue size");
            return Ok(Populate::Idle);
        }
        let count = (headroom - queue_size).min(50);
        let blocksize = self.settings.lookup_block_size.min(count);

        let Some(hosts) = source.next_hosts(blocksize).await? else {
            return Ok(Populate::Drained);
        };

        let mut added = 0usize;
        for host in hosts {
            if !guard.should_enqueue(&host) {
                debug!(host, "skipping: queued too recently");
                continue;
            }
            if !queue.try_push(Job::Host(host.clone())).await {
                debug!("queue has reached max size");
                break;
            }
            debug!(host, "queued for ingest");
            added += 1;
        }

        if added > 0 {
            Ok(Populate::Busy)
        } else {
            Ok(Populate::Idle)
        }
    }

    fn launch_worker(
        &self,
        worker_id: usize,
        queue: Arc<JobQueue>,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let processor = self.processor.clone();
        let pop_wait = Duration::from_secs_f64(self.settings.queue_interaction_timeout);
        let empty_sleep = Duration::from_secs_f64(self.settings.empty_queue_sleep_time);
        let max_jobs = self.settings.max_jobs_per_process;

        tokio::spawn(async move {
            debug!(worker = worker_id, "worker started");
            let mut jobs_run = 0usize;

            while !shutdown.load(Ordering::SeqCst) {
                let Some(job) = queue.pop_timeout(pop_wait).await else {
                    debug!(worker = worker_id, "no jobs to process, sleeping");
                    tokio::time::sleep(empty_sleep).await;
                    continue;
                };

                let host = match job {
                    Job::Close => {
                        debug!(worker = worker_id, "close sentinel received");
                        break;
                    }
                    Job::Host(host) => host,
                };

                if let Err(e) = processor.process(&host).await {
                    warn!(worker = worker_id, host, error = %e, "host processing failed");
                }

                jobs_run += 1;
                if jobs_run >= max_jobs {
                    info!(
                        worker = worker_id,
                        jobs_run, "reached max jobs per worker, recycling"
                    );
                    break;
                }
            }
            debug!(worker = worker_id, "worker exiting");
        })
    }

    /// Give in-flight ingests a bounded window to finish, then terminate
    /// whatever is left.
    async fn graceful_shutdown(&self, queue: &JobQueue, workers: &mut Vec<JoinHandle<()>>) {
        for _ in 0..workers.len() {
            queue.try_push(Job::Close).await;
        }

        let deadline =
            Instant::now() + Duration::from_secs_f64(self.settings.graceful_shutdown_timeout);
        while Instant::now() < deadline {
            workers.retain(|handle| !handle.is_finished());
            if workers.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        warn!(remaining = workers.len(), "terminating remaining workers");
        for handle in workers.drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingProcessor {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl HostProcessor for RecordingProcessor {
        async fn process(&self, host: &str) -> Result<()> {
            self.seen.lock().unwrap().push(host.to_string());
            Ok(())
        }
    }

    struct FiniteSource {
        hosts: Vec<String>,
    }

    #[async_trait]
    impl HostSource for FiniteSource {
        async fn next_hosts(&mut self, desired: usize) -> Result<Option<Vec<String>>> {
            if self.hosts.is_empty() {
                return Ok(None);
            }
            let take = desired.min(self.hosts.len());
            Ok(Some(self.hosts.drain(..take).collect()))
        }
    }

    #[tokio::test]
    async fn runner_processes_all_hosts_then_drains() {
        let processor = RecordingProcessor::default();
        let seen = Arc::clone(&processor.seen);

        let settings = QueueConfig {
            num_processes: 2,
            max_queue_size: 10,
            prevent_requeuing_time: 300.0,
            empty_queue_sleep_time: 0.01,
            full_queue_sleep_time: 0.01,
            queue_interaction_timeout: 0.01,
            graceful_shutdown_timeout: 1.0,
            lookup_block_size: 3,
            max_jobs_per_process: 100,
        };

        let source = FiniteSource {
            hosts: (0..7).map(|i| format!("host{i}.example")).collect(),
        };

        QueueRunner::new(settings, processor)
            .run(source)
            .await
            .unwrap();

        let mut processed = seen.lock().unwrap().clone();
        processed.sort();
        assert_eq!(processed.len(), 7);
        assert_eq!(processed[0], "host0.example");
        assert_eq!(processed[6], "host6.example");
    }

    #[tokio::test]
    async fn requeue_suppression_skips_repeats() {
        let processor = RecordingProcessor::default();
        let seen = Arc::clone(&processor.seen);

        let settings = QueueConfig {
            num_processes: 1,
            max_queue_size: 10,
            prevent_requeuing_time: 300.0,
            empty_queue_sleep_time: 0.01,
            full_queue_sleep_time: 0.01,
            queue_interaction_timeout: 0.01,
            graceful_shutdown_timeout: 1.0,
            lookup_block_size: 4,
            max_jobs_per_process: 100,
        };

        // The same host twice in quick succession: only one pass survives.
        let source = FiniteSource {
            hosts: vec![
                "repeat.example".to_string(),
                "repeat.example".to_string(),
                "other.example".to_string(),
            ],
        };

        QueueRunner::new(settings, processor)
            .run(source)
            .await
            .unwrap();

        let processed = seen.lock().unwrap().clone();
        assert_eq!(
            processed
                .iter()
                .filter(|host| host.as_str() == "repeat.example")
                .count(),
            1
        );
        assert!(processed.contains(&"other.example".to_string()));
    }
}
