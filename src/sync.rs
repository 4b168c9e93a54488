//! CPU/GPU synchronization: fence timelines and the submission queue wrapper.
//!
//! [`Fence`] is a monotonically increasing 64-bit timeline. The CPU observes
//! it by polling or by a condvar-backed blocking wait; the device advances it
//! through [`QueueBackend::signal`]. "Value reached" is a safe proxy for "all
//! batches submitted up to and including that signal have completed", because
//! values are only ever signaled in submission order.
//!
//! [`SyncQueue`] wraps one submission queue: it owns the queue's fence,
//! hands out command lists that are provably no longer referenced by
//! in-flight device work, and batches submissions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::backend::{CommandList, QueueBackend};
use crate::error::FrameError;

#[derive(Debug, Default)]
struct FenceShared {
    completed: Mutex<u64>,
    wake: Condvar,
}

/// Observer of one queue's fence timeline.
///
/// Cheaply cloneable; all clones observe the same timeline. Backends signal
/// it when device work completes, everyone else polls or waits.
#[derive(Debug, Clone, Default)]
pub struct Fence {
    shared: Arc<FenceShared>,
}

impl Fence {
    /// Create a timeline at value 0 (nothing completed yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value the device has confirmed complete.
    pub fn completed_value(&self) -> u64 {
        *self.shared.completed.lock()
    }

    /// Non-blocking poll: has `value` been reached?
    pub fn is_reached(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    /// Block the calling thread until `value` is reached.
    ///
    /// `timeout` of `None` waits forever. Returns whether the value was
    /// reached (always `true` for an unbounded wait). Uses a wake event, not
    /// spin-polling.
    pub fn wait(&self, value: u64, timeout: Option<Duration>) -> bool {
        let mut completed = self.shared.completed.lock();
        match timeout {
            None => {
                while *completed < value {
                    self.shared.wake.wait(&mut completed);
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while *completed < value {
                    if self
                        .shared
                        .wake
                        .wait_until(&mut completed, deadline)
                        .timed_out()
                    {
                        return *completed >= value;
                    }
                }
                true
            }
        }
    }

    /// Advance the timeline to `value` and wake all waiters.
    ///
    /// Called by backends when the device reaches a signal. Values never
    /// regress; signaling an older value is ignored.
    pub fn signal(&self, value: u64) {
        let mut completed = self.shared.completed.lock();
        if value > *completed {
            *completed = value;
            self.shared.wake.notify_all();
        }
    }
}

struct RecycledList {
    list: Box<dyn CommandList>,
    /// Fence value after which the list may be reused.
    fence_value: u64,
}

/// Wrapper around one device submission queue.
///
/// Not internally reentrant across threads: each owning context (graphics
/// path, copy path) uses its own instance, and cross-queue ordering is
/// expressed explicitly via [`SyncQueue::gpu_wait_for_fence_value`].
pub struct SyncQueue {
    name: String,
    id: u64,
    backend: Arc<dyn QueueBackend>,
    fence: Fence,
    last_signaled: AtomicU64,
    free_lists: Mutex<Vec<RecycledList>>,
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("name", &self.name)
            .field("last_signaled", &self.last_signaled.load(Ordering::Relaxed))
            .field("completed", &self.fence.completed_value())
            .finish()
    }
}

impl SyncQueue {
    /// Wrap a backend queue.
    pub fn new(name: impl Into<String>, backend: Arc<dyn QueueBackend>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            name: name.into(),
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            fence: Fence::new(),
            last_signaled: AtomicU64::new(0),
            free_lists: Mutex::new(Vec::new()),
        }
    }

    /// Debug name of the queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process-unique id of this queue instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Clone an observer of this queue's fence timeline.
    pub fn fence(&self) -> Fence {
        self.fence.clone()
    }

    /// Highest fence value signaled so far.
    pub fn last_signaled_value(&self) -> u64 {
        self.last_signaled.load(Ordering::Acquire)
    }

    /// Increment the fence timeline and instruct the device to signal it
    /// once all previously submitted work completes.
    ///
    /// Returns the new value as a completion token. Values are strictly
    /// increasing by exactly 1 per call.
    pub fn signal_fence(&self) -> u64 {
        let value = self.last_signaled.fetch_add(1, Ordering::AcqRel) + 1;
        self.backend.signal(&self.fence, value);
        value
    }

    /// Non-blocking poll of a completion token.
    pub fn is_fence_reached(&self, value: u64) -> bool {
        self.fence.is_reached(value)
    }

    /// Block the calling thread until `value` is reached.
    ///
    /// Returns whether the value was reached within `timeout`
    /// (`None` = forever).
    pub fn cpu_wait_for_fence_value(&self, value: u64, timeout: Option<Duration>) -> bool {
        self.fence.wait(value, timeout)
    }

    /// Drain the queue: signal a fresh fence value and block until it is
    /// reached. The universal "make sure nothing is in flight" operation,
    /// used e.g. before a destructive resize.
    pub fn cpu_wait_until_idle(&self) {
        let value = self.signal_fence();
        self.fence.wait(value, None);
    }

    /// Device-side wait: stall this queue until a (typically foreign) fence
    /// reaches `value`. Non-blocking for the CPU.
    pub fn gpu_wait_for_fence_value(&self, fence: &Fence, value: u64) {
        self.backend.wait_on_device(fence, value);
    }

    /// Hand out a command list / allocator pair that is not referenced by any
    /// in-flight device work.
    ///
    /// Recycles a free pair whose fence value has been reached, or creates a
    /// new pair if none is free.
    pub fn get_command_list(&self) -> Box<dyn CommandList> {
        let mut free = self.free_lists.lock();
        if let Some(pos) = free
            .iter()
            .position(|entry| self.fence.is_reached(entry.fence_value))
        {
            let mut entry = free.swap_remove(pos);
            entry.list.reset();
            return entry.list;
        }
        drop(free);

        log::trace!("queue '{}': creating new command list", self.name);
        self.backend.create_command_list()
    }

    /// Close and submit `lists` as one batch, then signal a new fence value.
    ///
    /// The lists return to the recycling pool tagged with that value; they
    /// become eligible for reuse only once it is reached. Returns the value
    /// as a completion token.
    pub fn execute_command_lists(
        &self,
        mut lists: Vec<Box<dyn CommandList>>,
    ) -> Result<u64, FrameError> {
        for list in lists.iter_mut() {
            list.close();
        }
        self.backend.submit(&mut lists)?;

        let value = self.signal_fence();
        let mut free = self.free_lists.lock();
        free.extend(lists.into_iter().map(|list| RecycledList {
            list,
            fence_value: value,
        }));
        Ok(value)
    }

    /// Number of lists currently parked in the recycling pool.
    pub fn pooled_list_count(&self) -> usize {
        self.free_lists.lock().len()
    }
}
