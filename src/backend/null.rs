//! Null backend for testing and development.
//!
//! Implements the backend traits without GPU hardware. Submissions and
//! barrier batches are recorded so tests can assert on them, and fence
//! completion is either immediate (smoke tests) or driven manually
//! (recycling / retirement tests that need to hold a fence open).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{BarrierDesc, CommandList, DeviceResource, QueueBackend, ResourceFactory};
use crate::error::FrameError;
use crate::sync::Fence;
use crate::types::{Extent2d, TextureFormat, TextureUsage};

/// How the null queue completes signaled fence values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Fence values complete the moment they are signaled.
    Immediate,
    /// Fence values complete only when [`NullQueue::complete_to`] is called.
    Manual,
}

#[derive(Default)]
struct NullQueueRecords {
    /// Signals not yet completed (manual mode only).
    pending_signals: Vec<(Fence, u64)>,
    /// Size of every barrier batch recorded on any list of this queue.
    barrier_batches: Vec<Vec<BarrierDesc>>,
    /// Number of lists per submitted batch.
    submissions: Vec<usize>,
}

/// Null submission queue.
pub struct NullQueue {
    mode: CompletionMode,
    records: Arc<Mutex<NullQueueRecords>>,
    lists_created: AtomicUsize,
}

impl NullQueue {
    /// Queue that completes every signal immediately.
    pub fn immediate() -> Self {
        Self::new(CompletionMode::Immediate)
    }

    /// Queue whose completion is driven by [`NullQueue::complete_to`].
    pub fn manual() -> Self {
        Self::new(CompletionMode::Manual)
    }

    fn new(mode: CompletionMode) -> Self {
        Self {
            mode,
            records: Arc::new(Mutex::new(NullQueueRecords::default())),
            lists_created: AtomicUsize::new(0),
        }
    }

    /// Complete every pending signal up to and including `value`.
    pub fn complete_to(&self, value: u64) {
        let mut records = self.records.lock();
        let mut remaining = Vec::new();
        for (fence, signaled) in records.pending_signals.drain(..) {
            if signaled <= value {
                fence.signal(signaled);
            } else {
                remaining.push((fence, signaled));
            }
        }
        records.pending_signals = remaining;
    }

    /// Barrier batches recorded so far, in recording order.
    pub fn barrier_batches(&self) -> Vec<Vec<BarrierDesc>> {
        self.records.lock().barrier_batches.clone()
    }

    /// List counts of every submitted batch.
    pub fn submissions(&self) -> Vec<usize> {
        self.records.lock().submissions.clone()
    }

    /// Total command lists created (not recycled) on this queue.
    pub fn lists_created(&self) -> usize {
        self.lists_created.load(Ordering::Relaxed)
    }
}

impl QueueBackend for NullQueue {
    fn create_command_list(&self) -> Box<dyn CommandList> {
        let index = self.lists_created.fetch_add(1, Ordering::Relaxed);
        log::trace!("null queue: creating command list #{index}");
        Box::new(NullCommandList {
            index,
            closed: false,
            records: self.records.clone(),
        })
    }

    fn submit(&self, lists: &mut [Box<dyn CommandList>]) -> Result<(), FrameError> {
        log::trace!("null queue: submitting {} list(s)", lists.len());
        self.records.lock().submissions.push(lists.len());
        Ok(())
    }

    fn signal(&self, fence: &Fence, value: u64) {
        match self.mode {
            CompletionMode::Immediate => fence.signal(value),
            CompletionMode::Manual => {
                self.records
                    .lock()
                    .pending_signals
                    .push((fence.clone(), value));
            }
        }
    }

    fn wait_on_device(&self, fence: &Fence, value: u64) {
        // No device timeline to stall; just record the intent.
        log::trace!(
            "null queue: device wait for fence value {value} (completed {})",
            fence.completed_value()
        );
    }
}

/// Null command list; records barrier batches for assertions.
pub struct NullCommandList {
    index: usize,
    closed: bool,
    records: Arc<Mutex<NullQueueRecords>>,
}

impl CommandList for NullCommandList {
    fn record_barriers(&mut self, barriers: &[BarrierDesc]) {
        debug_assert!(!self.closed, "recording into a closed command list");
        log::trace!(
            "null list #{}: recording {} barrier(s)",
            self.index,
            barriers.len()
        );
        self.records.lock().barrier_batches.push(barriers.to_vec());
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn reset(&mut self) {
        self.closed = false;
    }
}

/// Null texture object.
#[derive(Debug)]
pub struct NullTexture {
    /// Pixel format the texture was created with.
    pub format: TextureFormat,
    /// Extent the texture was created with.
    pub extent: Extent2d,
    /// Usage flags the texture was created with.
    pub usage: TextureUsage,
}

impl NullTexture {
    /// A 1x1 placeholder for unit tests.
    pub fn for_tests() -> Self {
        Self {
            format: TextureFormat::Rgba8Unorm,
            extent: Extent2d::new(1, 1),
            usage: TextureUsage::empty(),
        }
    }
}

impl DeviceResource for NullTexture {}

/// Null resource factory.
///
/// Counts creations and can simulate slow device allocation, which the
/// asynchronous-creation tests rely on.
#[derive(Default)]
pub struct NullFactory {
    created: AtomicUsize,
    creation_delay: Option<Duration>,
    fail_creation: bool,
}

impl NullFactory {
    /// Factory that creates textures instantly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory that sleeps `delay` per creation, simulating device latency.
    pub fn with_creation_delay(delay: Duration) -> Self {
        Self {
            creation_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Factory whose creations always fail.
    pub fn failing() -> Self {
        Self {
            fail_creation: true,
            ..Self::default()
        }
    }

    /// Number of textures created so far.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl ResourceFactory for NullFactory {
    fn create_texture(
        &self,
        name: &str,
        format: TextureFormat,
        extent: Extent2d,
        usage: TextureUsage,
    ) -> Result<Box<dyn DeviceResource>, FrameError> {
        if self.fail_creation {
            return Err(FrameError::ResourceCreationFailed(format!(
                "null factory configured to fail ('{name}')"
            )));
        }
        if let Some(delay) = self.creation_delay {
            std::thread::sleep(delay);
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "null factory: created texture '{name}' ({}x{}, {format:?})",
            extent.width,
            extent.height
        );
        Ok(Box::new(NullTexture {
            format,
            extent,
            usage,
        }))
    }
}
