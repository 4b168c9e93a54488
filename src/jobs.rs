//! Generic prioritized worker job scheduler.
//!
//! Each [`JobScheduler`] owns exactly one worker thread and a FIFO queue of
//! typed jobs. On top of plain FIFO it supports:
//!
//! - **Overwritable job types**: at most one pending instance per type; a
//!   resubmission replaces the pending payload while keeping the original
//!   [`JobId`], so handles held by earlier submitters stay valid.
//! - **Priority promotion**: a still-pending job can be moved into a
//!   high-priority region at the front of the queue without disturbing the
//!   relative order of jobs promoted earlier.
//! - **Lightweight completion waits**: [`JobScheduler::sync`] shares one
//!   completion condvar across all waiters and re-checks queue membership on
//!   every wake instead of allocating a per-job event.
//! - **Cancellation** of not-yet-started jobs and **stall detection** on the
//!   currently running one.
//!
//! The renderer uses one instance per background concern (resource creation
//! being the main one) rather than a shared pool, so job functions may block
//! without starving unrelated work.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

/// Monotonic id of one scheduled job.
pub type JobId = u64;

/// Id of a registered job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobTypeId(usize);

/// Lifecycle of the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Queue empty, worker parked.
    Idle,
    /// A submission arrived; the worker has been notified but not yet
    /// picked up work.
    Waking,
    /// Processing one job.
    Running,
    /// Shutdown requested, worker draining out.
    Terminating,
    /// Worker thread exited.
    Terminated,
}

type JobFn = Arc<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

struct JobType {
    func: JobFn,
    overwritable: bool,
}

struct PendingJob {
    id: JobId,
    type_index: usize,
    payload: Box<dyn Any + Send>,
}

struct QueueState {
    pending: VecDeque<PendingJob>,
    /// Length of the high-priority region at the front of `pending`.
    high_priority_len: usize,
    /// Currently running job and when it started.
    running: Option<(JobId, Instant)>,
    started_count: u64,
    completed_count: u64,
    next_job_id: JobId,
    shutdown: bool,
    state: WorkerState,
}

struct Shared {
    types: RwLock<Vec<JobType>>,
    queue: Mutex<QueueState>,
    /// Wakes the worker on submission or shutdown.
    work: Condvar,
    /// Wakes `sync` callers on every completion.
    done: Condvar,
}

/// A single-worker job queue with priority promotion and overwrite collapse.
pub struct JobScheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    worker_thread: ThreadId,
}

impl JobScheduler {
    /// Spawn the worker thread. `name` becomes the OS thread name.
    pub fn new(name: &str) -> Self {
        let shared = Arc::new(Shared {
            types: RwLock::new(Vec::new()),
            queue: Mutex::new(QueueState {
                pending: VecDeque::new(),
                high_priority_len: 0,
                running: None,
                started_count: 0,
                completed_count: 0,
                next_job_id: 1,
                shutdown: false,
                state: WorkerState::Idle,
            }),
            work: Condvar::new(),
            done: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || worker_loop(worker_shared))
            .expect("failed to spawn job worker thread");
        let worker_thread = worker.thread().id();

        Self {
            shared,
            worker: Some(worker),
            worker_thread,
        }
    }

    /// Register a job kind. Jobs of an overwritable kind collapse: at most
    /// one not-yet-started instance exists at a time.
    pub fn add_job_type(
        &self,
        func: impl Fn(Box<dyn Any + Send>) + Send + Sync + 'static,
        overwritable: bool,
    ) -> JobTypeId {
        let mut types = self.shared.types.write();
        types.push(JobType {
            func: Arc::new(func),
            overwritable,
        });
        JobTypeId(types.len() - 1)
    }

    /// Enqueue a job. Ownership of `payload` transfers to the scheduler.
    ///
    /// For an overwritable type with an instance already pending, the new
    /// payload replaces the old one in place and the *original* [`JobId`] is
    /// returned, preventing continuation races for holders of that id.
    ///
    /// Scheduling against an unregistered type logs an error and drops the
    /// job.
    pub fn schedule_job(
        &self,
        type_id: JobTypeId,
        payload: Box<dyn Any + Send>,
    ) -> Option<JobId> {
        let overwritable = match self.shared.types.read().get(type_id.0) {
            Some(job_type) => job_type.overwritable,
            None => {
                log::error!("schedule_job: unregistered job type {:?}", type_id);
                return None;
            }
        };

        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            log::warn!("schedule_job: scheduler is shutting down, job dropped");
            return None;
        }

        if overwritable {
            if let Some(job) = queue
                .pending
                .iter_mut()
                .find(|job| job.type_index == type_id.0)
            {
                job.payload = payload;
                return Some(job.id);
            }
        }

        let id = queue.next_job_id;
        queue.next_job_id += 1;
        queue.pending.push_back(PendingJob {
            id,
            type_index: type_id.0,
            payload,
        });
        if queue.state == WorkerState::Idle {
            queue.state = WorkerState::Waking;
        }
        self.shared.work.notify_one();
        Some(id)
    }

    /// Move a still-pending job into the high-priority region.
    ///
    /// The job is appended to the region, so jobs promoted earlier keep
    /// their relative order. Running or finished jobs are unaffected.
    pub fn prioritize_job(&self, id: JobId) {
        let mut queue = self.shared.queue.lock();
        let Some(pos) = queue.pending.iter().position(|job| job.id == id) else {
            return;
        };
        if pos < queue.high_priority_len {
            return;
        }
        let Some(job) = queue.pending.remove(pos) else {
            return;
        };
        let insert_at = queue.high_priority_len;
        queue.pending.insert(insert_at, job);
        queue.high_priority_len += 1;
    }

    /// Whether the job has run to completion.
    ///
    /// A never-issued id reports unfinished. Issued ids start at 1.
    pub fn is_finished(&self, id: JobId) -> bool {
        let queue = self.shared.queue.lock();
        id != 0
            && id < queue.next_job_id
            && queue.running.map_or(true, |(running, _)| running != id)
            && !queue.pending.iter().any(|job| job.id == id)
    }

    /// Block until the job has completed or been cancelled.
    ///
    /// Wakes on every completion and cancellation and re-checks whether the
    /// job is still pending or running, so prioritization and cancellation
    /// cannot strand the waiter. No per-job event is allocated.
    pub fn sync(&self, id: JobId) {
        let mut queue = self.shared.queue.lock();
        loop {
            let running = queue.running.is_some_and(|(running, _)| running == id);
            let pending = queue.pending.iter().any(|job| job.id == id);
            if !running && !pending {
                return;
            }
            if queue.shutdown {
                return;
            }
            self.shared.done.wait(&mut queue);
        }
    }

    /// Block until every pending and running job has completed.
    pub fn sync_all(&self) {
        let mut queue = self.shared.queue.lock();
        while !(queue.pending.is_empty() && queue.running.is_none()) {
            if queue.shutdown {
                return;
            }
            self.shared.done.wait(&mut queue);
        }
    }

    /// Remove a not-yet-started job, dropping its payload.
    ///
    /// Returns whether a pending job was removed. A running job cannot be
    /// cancelled; it runs to completion. Threads blocked in [`sync`] are
    /// woken so they can re-check the queue.
    ///
    /// [`sync`]: JobScheduler::sync
    pub fn cancel(&self, id: JobId) -> bool {
        let mut queue = self.shared.queue.lock();
        let Some(pos) = queue.pending.iter().position(|job| job.id == id) else {
            return false;
        };
        queue.pending.remove(pos);
        if pos < queue.high_priority_len {
            queue.high_priority_len -= 1;
        }
        drop(queue);
        self.shared.done.notify_all();
        true
    }

    /// Remove every not-yet-started job. Returns how many were removed.
    pub fn cancel_all(&self) -> usize {
        let mut queue = self.shared.queue.lock();
        let removed = queue.pending.len();
        queue.pending.clear();
        queue.high_priority_len = 0;
        drop(queue);
        if removed > 0 {
            self.shared.done.notify_all();
        }
        removed
    }

    /// Report whether the currently running job has exceeded `threshold`.
    ///
    /// Not an error by itself; callers use it to decide whether to force a
    /// synchronous catch-up instead of waiting indefinitely.
    pub fn is_stalling(&self, threshold: Duration) -> Option<JobId> {
        let queue = self.shared.queue.lock();
        queue
            .running
            .filter(|(_, started)| started.elapsed() > threshold)
            .map(|(id, _)| id)
    }

    /// Whether the calling thread is this scheduler's worker thread.
    pub fn is_worker_thread(&self) -> bool {
        std::thread::current().id() == self.worker_thread
    }

    /// Current lifecycle state of the worker.
    pub fn worker_state(&self) -> WorkerState {
        self.shared.queue.lock().state
    }

    /// Number of not-yet-started jobs.
    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }

    /// Monotonic (started, completed) job counters.
    pub fn counters(&self) -> (u64, u64) {
        let queue = self.shared.queue.lock();
        (queue.started_count, queue.completed_count)
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.state = WorkerState::Terminating;
        }
        self.shared.work.notify_one();
        self.shared.done.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("job worker thread panicked");
            }
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let mut queue = shared.queue.lock();
    loop {
        if queue.shutdown {
            break;
        }
        if let Some(job) = queue.pending.pop_front() {
            queue.high_priority_len = queue.high_priority_len.saturating_sub(1);
            queue.running = Some((job.id, Instant::now()));
            queue.started_count += 1;
            queue.state = WorkerState::Running;

            let func = shared
                .types
                .read()
                .get(job.type_index)
                .map(|job_type| job_type.func.clone());

            MutexGuard::unlocked(&mut queue, || match func {
                Some(func) => func(job.payload),
                // Registration cannot be undone, so this only happens on an
                // internal index error.
                None => log::error!("job {} references unknown type, dropped", job.id),
            });

            queue.running = None;
            queue.completed_count += 1;
            shared.done.notify_all();
        } else {
            queue.state = WorkerState::Idle;
            shared.work.wait(&mut queue);
        }
    }
    queue.state = WorkerState::Terminated;
}
