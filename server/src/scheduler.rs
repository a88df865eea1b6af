//! The work scheduler: prioritized queue, worker pool, job lifecycle.
//!
//! Three mutexes guard the three job collections. Lock order is always
//! queued → active → completed, and no lock is ever held across a search:
//! a worker pops under the queued lock, releases it, then solves against
//! its acquired device lock-free.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::oneshot;

use cinder_types::{U128, U256};
use cinder_work::{to_multiplier, CancelToken, Driver, SolveOutcome};

use crate::config::Config;
use crate::device::DeviceRegistry;
use crate::error::ServerError;
use crate::job::{Job, JobRequest, JobResult};

/// Fixed result reported when mock generation is configured.
const MOCK_WORK: u64 = 0x2feaeaa000000000;
const MOCK_DIFFICULTY: u128 = 0x02ffee0000000000;
const MOCK_MULTIPLIER: f64 = 1.3847;

/// What a worker hands back through the submitter's response channel.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// The 64-bit nonce (unverified when the search exhausted its cap).
    pub work: u64,
    pub difficulty: U128,
    pub multiplier: f64,
    /// True when the result came from mock generation.
    pub mock: bool,
}

/// Receiving half of a submit's response channel.
pub type OutcomeReceiver = oneshot::Receiver<Result<JobOutcome, ServerError>>;

/// An immutable copy of the scheduler's three collections.
///
/// `queued` is in dequeue order; `active` is ordered by id; `completed`
/// is oldest first.
pub struct SchedulerSnapshot {
    pub queued: Vec<Job>,
    pub active: Vec<Job>,
    pub completed: Vec<Job>,
}

/// One posted unit of work. The task carries only the response channel:
/// the worker that picks it up pops whatever job ranks highest at that
/// moment, which is not necessarily the job submitted alongside it.
struct WorkerTask {
    respond: oneshot::Sender<Result<JobOutcome, ServerError>>,
}

struct Inner {
    queued: Mutex<BinaryHeap<Job>>,
    active: Mutex<HashMap<u32, Job>>,
    completed: Mutex<VecDeque<Job>>,
    devices: DeviceRegistry,
    base_difficulty: U128,
    request_limit: usize,
    completed_limit: usize,
    mock_delay: u64,
    allow_control: bool,
    next_job_id: AtomicU32,
}

/// The scheduler. Owns the job collections and a pool of worker threads
/// sized to the configured device count.
pub struct WorkScheduler {
    inner: Arc<Inner>,
    task_tx: Option<Sender<WorkerTask>>,
    // Held so submits still succeed when no workers exist (no devices);
    // posted tasks then simply wait forever, which only test setups do.
    _task_rx: Receiver<WorkerTask>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkScheduler {
    pub fn new(config: &Config) -> Self {
        let inner = Arc::new(Inner {
            queued: Mutex::new(BinaryHeap::new()),
            active: Mutex::new(HashMap::new()),
            completed: Mutex::new(VecDeque::new()),
            devices: DeviceRegistry::from_config(&config.devices),
            base_difficulty: config.work.base_difficulty,
            request_limit: config.server.request_limit,
            completed_limit: config.server.completed_limit,
            mock_delay: config.work.mock_work_generation_delay,
            allow_control: config.server.allow_control,
            next_job_id: AtomicU32::new(1),
        });

        let (task_tx, task_rx) = crossbeam_channel::unbounded::<WorkerTask>();

        let workers = (0..inner.devices.len())
            .map(|slot| {
                let inner = Arc::clone(&inner);
                let task_rx = task_rx.clone();
                thread::Builder::new()
                    .name(format!("work-{slot}"))
                    .spawn(move || {
                        while let Ok(task) = task_rx.recv() {
                            run_worker(&inner, task);
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            inner,
            task_tx: Some(task_tx),
            _task_rx: task_rx,
            workers,
        }
    }

    pub fn device_count(&self) -> usize {
        self.inner.devices.len()
    }

    /// Queue a request and post one worker task for it.
    ///
    /// Returns the assigned job id and the channel on which the posted
    /// task will answer. Fails with [`ServerError::QueueFull`] when the
    /// queue is at its configured limit.
    pub fn submit(
        &self,
        request: JobRequest,
        priority: u32,
    ) -> Result<(u32, OutcomeReceiver), ServerError> {
        let id = self.inner.next_job_id.fetch_add(1, Ordering::Relaxed);
        let job = Job::new(id, priority, request);

        {
            let mut queued = self.inner.queued.lock().unwrap();
            if queued.len() >= self.inner.request_limit {
                return Err(ServerError::QueueFull);
            }
            queued.push(job);
        }

        let (respond, rx) = oneshot::channel();
        if let Some(tx) = &self.task_tx {
            let _ = tx.send(WorkerTask { respond });
        }
        Ok((id, rx))
    }

    /// Remove the first queued job (in dequeue order) whose root hash
    /// matches. Active jobs are unaffected; they finish naturally.
    pub fn cancel(&self, root_hash: &U256) -> bool {
        let mut queued = self.inner.queued.lock().unwrap();
        let mut kept = Vec::with_capacity(queued.len());
        let mut found = false;
        while let Some(job) = queued.pop() {
            if job.request.root_hash == *root_hash {
                found = true;
                break;
            }
            kept.push(job);
        }
        for job in kept {
            queued.push(job);
        }
        found
    }

    /// Drop every queued job. Refused (returns false, no side effect)
    /// unless control requests are enabled in the configuration.
    pub fn purge(&self) -> bool {
        if !self.inner.allow_control {
            return false;
        }
        self.inner.queued.lock().unwrap().clear();
        tracing::warn!("work queue purged via control request");
        true
    }

    /// Copy the three collections under their locks, queued → active →
    /// completed.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let queued_guard = self.inner.queued.lock().unwrap();
        let active_guard = self.inner.active.lock().unwrap();
        let completed_guard = self.inner.completed.lock().unwrap();

        let mut queued = queued_guard.clone().into_sorted_vec();
        queued.reverse(); // ascending → dequeue order

        let mut active: Vec<Job> = active_guard.values().cloned().collect();
        active.sort_by_key(Job::id);

        let completed = completed_guard.iter().cloned().collect();

        SchedulerSnapshot {
            queued,
            active,
            completed,
        }
    }
}

impl Drop for WorkScheduler {
    fn drop(&mut self) {
        // Closing the channel ends the worker loops once the backlog
        // drains; a search in progress finishes first.
        self.task_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Body of one posted task: pop → acquire device → solve → retire.
fn run_worker(inner: &Inner, task: WorkerTask) {
    let popped = inner.queued.lock().unwrap().pop();
    let Some(mut job) = popped else {
        // The job this task was posted for was cancelled or purged.
        let _ = task.respond.send(Err(ServerError::NoJobsAvailable));
        return;
    };

    let lease = match inner.devices.acquire_any() {
        Ok(lease) => lease,
        Err(e) => {
            let _ = task.respond.send(Err(e));
            return;
        }
    };

    tracing::info!(
        device = %lease.device().kind(),
        root = %job.request.root_hash,
        job_id = job.id(),
        "generating work"
    );

    job.start();
    inner.active.lock().unwrap().insert(job.id(), job.clone());

    let outcome = if inner.mock_delay > 0 {
        thread::sleep(Duration::from_secs(inner.mock_delay));
        job.result = JobResult {
            work: U128::from_u64(MOCK_WORK),
            difficulty: U128::new(MOCK_DIFFICULTY),
            multiplier: MOCK_MULTIPLIER,
        };
        Ok(JobOutcome {
            work: MOCK_WORK,
            difficulty: U128::new(MOCK_DIFFICULTY),
            multiplier: MOCK_MULTIPLIER,
            mock: true,
        })
    } else {
        let cancel = CancelToken::new();
        let driver: &dyn Driver = lease.device().driver();
        match driver.solve(&job.request.root_hash, job.request.difficulty, &cancel) {
            Ok(SolveOutcome::Found { nonce, difficulty }) => {
                let multiplier = to_multiplier(difficulty, inner.base_difficulty);
                job.result = JobResult {
                    work: U128::from_u64(nonce),
                    difficulty,
                    multiplier,
                };
                Ok(JobOutcome {
                    work: nonce,
                    difficulty,
                    multiplier,
                    mock: false,
                })
            }
            Ok(SolveOutcome::Exhausted { nonce }) => {
                // Non-error: the requested difficulty echoed with a 1.0
                // multiplier tells the caller no valid nonce was found.
                job.result = JobResult {
                    work: U128::from_u64(nonce),
                    difficulty: job.request.difficulty,
                    multiplier: 1.0,
                };
                Ok(JobOutcome {
                    work: nonce,
                    difficulty: job.request.difficulty,
                    multiplier: 1.0,
                    mock: false,
                })
            }
            Err(e) => Err(ServerError::Work(e)),
        }
    };

    job.stop();

    {
        let mut active = inner.active.lock().unwrap();
        let mut completed = inner.completed.lock().unwrap();
        active.remove(&job.id());
        if inner.completed_limit > 0 {
            while completed.len() >= inner.completed_limit {
                completed.pop_front();
            }
            completed.push_back(job.clone());
        }
    }

    match &outcome {
        Ok(_) => tracing::info!(
            job_id = job.id(),
            duration_ms = job.duration_ms(),
            root = %job.request.root_hash,
            "work completed"
        ),
        Err(e) => tracing::info!(
            job_id = job.id(),
            root = %job.request.root_hash,
            error = %e,
            "work failed"
        ),
    }

    let _ = task.respond.send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::device::DeviceKind;
    use cinder_work::validate_work;

    fn queue_only_config() -> Config {
        // No devices: nothing consumes the queue, so ordering and
        // capacity behavior can be observed deterministically.
        Config::default()
    }

    fn one_cpu_config() -> Config {
        let mut config = Config::default();
        config.devices = vec![DeviceConfig {
            kind: DeviceKind::Cpu,
            index: 0,
        }];
        config
    }

    fn request(hash_byte: u8) -> JobRequest {
        JobRequest {
            root_hash: U256::new([hash_byte; 32]),
            difficulty: U128::new(1),
            multiplier: 1.0,
        }
    }

    #[test]
    fn ids_are_assigned_from_one() {
        let scheduler = WorkScheduler::new(&queue_only_config());
        let (first, _rx1) = scheduler.submit(request(1), 0).unwrap();
        let (second, _rx2) = scheduler.submit(request(2), 0).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn snapshot_lists_queued_in_dequeue_order() {
        let scheduler = WorkScheduler::new(&queue_only_config());
        let (a, _rx_a) = scheduler.submit(request(1), 0).unwrap();
        let (b, _rx_b) = scheduler.submit(request(2), 5).unwrap();
        let (c, _rx_c) = scheduler.submit(request(3), 0).unwrap();

        let ids: Vec<u32> = scheduler
            .snapshot()
            .queued
            .iter()
            .map(|j| j.id())
            .collect();
        assert_eq!(ids, vec![b, a, c]);
    }

    #[test]
    fn equal_priorities_dequeue_in_submission_order() {
        let scheduler = WorkScheduler::new(&queue_only_config());
        let mut submitted = Vec::new();
        for byte in 1..=4u8 {
            let (id, _rx) = scheduler.submit(request(byte), 0).unwrap();
            submitted.push(id);
        }
        let ids: Vec<u32> = scheduler
            .snapshot()
            .queued
            .iter()
            .map(|j| j.id())
            .collect();
        assert_eq!(ids, submitted);
    }

    #[test]
    fn submit_beyond_limit_is_rejected() {
        let mut config = queue_only_config();
        config.server.request_limit = 2;
        let scheduler = WorkScheduler::new(&config);

        let (_, _rx1) = scheduler.submit(request(1), 0).unwrap();
        let (_, _rx2) = scheduler.submit(request(2), 0).unwrap();
        assert!(matches!(
            scheduler.submit(request(3), 0),
            Err(ServerError::QueueFull)
        ));
        assert_eq!(scheduler.snapshot().queued.len(), 2);
    }

    #[test]
    fn rejected_submits_still_consume_ids() {
        let mut config = queue_only_config();
        config.server.request_limit = 1;
        let scheduler = WorkScheduler::new(&config);

        let (first, _rx1) = scheduler.submit(request(1), 0).unwrap();
        assert!(scheduler.submit(request(2), 0).is_err());
        scheduler.cancel(&U256::new([1; 32]));
        let (third, _rx3) = scheduler.submit(request(3), 0).unwrap();
        assert_eq!(first, 1);
        assert_eq!(third, 3);
    }

    #[test]
    fn cancel_removes_queued_job() {
        let scheduler = WorkScheduler::new(&queue_only_config());
        let hash = U256::new([9; 32]);
        let (_, _rx) = scheduler
            .submit(
                JobRequest {
                    root_hash: hash,
                    difficulty: U128::new(1),
                    multiplier: 1.0,
                },
                0,
            )
            .unwrap();

        assert!(scheduler.cancel(&hash));
        let snapshot = scheduler.snapshot();
        assert!(snapshot.queued.is_empty());
        assert!(snapshot.active.is_empty());
        assert!(!scheduler.cancel(&hash));
    }

    #[test]
    fn cancel_removes_only_one_of_duplicate_hashes() {
        let scheduler = WorkScheduler::new(&queue_only_config());
        let hash = U256::new([9; 32]);
        for _ in 0..2 {
            let (_, _rx) = scheduler
                .submit(
                    JobRequest {
                        root_hash: hash,
                        difficulty: U128::new(1),
                        multiplier: 1.0,
                    },
                    0,
                )
                .unwrap();
        }

        assert!(scheduler.cancel(&hash));
        assert_eq!(scheduler.snapshot().queued.len(), 1);
    }

    #[test]
    fn cancel_preserves_other_jobs() {
        let scheduler = WorkScheduler::new(&queue_only_config());
        let (keep_id, _rx1) = scheduler.submit(request(1), 4).unwrap();
        let (_, _rx2) = scheduler.submit(request(2), 0).unwrap();

        assert!(scheduler.cancel(&U256::new([2; 32])));
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.queued.len(), 1);
        assert_eq!(snapshot.queued[0].id(), keep_id);
    }

    #[test]
    fn purge_refused_without_control() {
        let scheduler = WorkScheduler::new(&queue_only_config());
        let (_, _rx) = scheduler.submit(request(1), 0).unwrap();

        assert!(!scheduler.purge());
        assert_eq!(scheduler.snapshot().queued.len(), 1);
    }

    #[test]
    fn purge_clears_queue_with_control() {
        let mut config = queue_only_config();
        config.server.allow_control = true;
        let scheduler = WorkScheduler::new(&config);
        let (_, _rx1) = scheduler.submit(request(1), 0).unwrap();
        let (_, _rx2) = scheduler.submit(request(2), 0).unwrap();

        assert!(scheduler.purge());
        assert!(scheduler.snapshot().queued.is_empty());
    }

    #[tokio::test]
    async fn easy_job_completes_end_to_end() {
        let scheduler = WorkScheduler::new(&one_cpu_config());
        let hash = U256::new([0x42; 32]);
        let (_, rx) = scheduler
            .submit(
                JobRequest {
                    root_hash: hash,
                    difficulty: U128::new(1),
                    multiplier: 1.0,
                },
                0,
            )
            .unwrap();

        let outcome = rx.await.unwrap().unwrap();
        assert!(!outcome.mock);
        assert!(validate_work(&hash, outcome.work, U128::new(1)));
        assert!(outcome.difficulty.raw() >= 1);

        let snapshot = scheduler.snapshot();
        assert!(snapshot.queued.is_empty());
        assert!(snapshot.active.is_empty());
        assert_eq!(snapshot.completed.len(), 1);
        let done = &snapshot.completed[0];
        assert_eq!(done.result.work.low_u64(), outcome.work);
        assert!(done.start_ms() > 0);
        assert!(done.end_ms() >= done.start_ms());
    }

    #[tokio::test]
    async fn completed_ring_evicts_oldest() {
        let mut config = one_cpu_config();
        config.server.completed_limit = 2;
        let scheduler = WorkScheduler::new(&config);

        let mut receivers = Vec::new();
        for byte in 1..=3u8 {
            let (_, rx) = scheduler.submit(request(byte), 0).unwrap();
            receivers.push(rx);
        }
        for rx in receivers {
            rx.await.unwrap().unwrap();
        }

        let completed = scheduler.snapshot().completed;
        assert_eq!(completed.len(), 2);
        // Oldest (job 1) evicted; order is oldest first.
        assert_eq!(completed[0].id(), 2);
        assert_eq!(completed[1].id(), 3);
    }

    #[tokio::test]
    async fn mock_mode_reports_fixed_result() {
        let mut config = one_cpu_config();
        config.work.mock_work_generation_delay = 1;
        let scheduler = WorkScheduler::new(&config);

        let started = std::time::Instant::now();
        let (_, rx) = scheduler.submit(request(0), 0).unwrap();
        let outcome = rx.await.unwrap().unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(outcome.mock);
        assert_eq!(outcome.work, 0x2feaeaa000000000);
        assert_eq!(outcome.difficulty.raw(), 0x02ffee0000000000);
        assert!((outcome.multiplier - 1.3847).abs() < f64::EPSILON);
    }
}
