//! Device backend abstraction layer.
//!
//! The frame core never talks to a graphics API directly. It drives three
//! small trait seams that a concrete backend (Vulkan, D3D12, wgpu, ...) must
//! satisfy:
//!
//! - [`QueueBackend`] - one device submission queue with a fence timeline
//! - [`CommandList`] - a recordable, closeable, resubmittable command list
//! - [`ResourceFactory`] - physical texture creation
//!
//! The in-tree [`null`] backend implements all three without GPU hardware and
//! is what the test suite runs against.

pub mod null;

use std::sync::Arc;
use std::time::Duration;

use crate::barrier::ResourceState;
use crate::error::FrameError;
use crate::resource::GpuResource;
use crate::sync::Fence;
use crate::types::{Extent2d, TextureFormat, TextureUsage};

/// A device-visible synchronization instruction recorded into a command list.
#[derive(Debug, Clone)]
pub enum BarrierDesc {
    /// State transition of a tracked resource.
    Transition {
        /// Resource being transitioned.
        resource: Arc<GpuResource>,
        /// State the device last saw the resource in.
        before: ResourceState,
        /// State the resource must be in for upcoming work.
        after: ResourceState,
    },
    /// Unordered-access hazard boundary on one resource.
    UnorderedAccess {
        /// Resource written through random-write access on both sides.
        resource: Arc<GpuResource>,
    },
    /// Aliasing boundary between two physical allocations.
    Aliasing {
        /// Resource whose contents become undefined, if known.
        before: Option<Arc<GpuResource>>,
        /// Resource that takes over the backing memory.
        after: Arc<GpuResource>,
    },
}

/// Opaque device object backing a [`GpuResource`].
pub trait DeviceResource: Send + Sync + std::fmt::Debug {}

/// A recordable command list paired with its allocator.
///
/// Lists are created and recycled by [`SyncQueue`](crate::sync::SyncQueue);
/// a list handed out by `get_command_list` is guaranteed not to be referenced
/// by in-flight device work.
pub trait CommandList: Send {
    /// Record a batch of barriers in a single device call.
    fn record_barriers(&mut self, barriers: &[BarrierDesc]);

    /// Close the list for submission. Recording after close is invalid.
    fn close(&mut self);

    /// Reset the list and its allocator for re-recording.
    fn reset(&mut self);
}

/// One device submission queue plus its fence timeline.
pub trait QueueBackend: Send + Sync {
    /// Create a fresh command list / allocator pair.
    fn create_command_list(&self) -> Box<dyn CommandList>;

    /// Submit closed lists as one batch.
    fn submit(&self, lists: &mut [Box<dyn CommandList>]) -> Result<(), FrameError>;

    /// Instruct the device to signal `fence` with `value` once all previously
    /// submitted work on this queue completes.
    fn signal(&self, fence: &Fence, value: u64);

    /// Queue-side wait: the device stalls this queue until `fence` reaches
    /// `value`. Non-blocking for the CPU.
    fn wait_on_device(&self, fence: &Fence, value: u64);
}

/// Physical resource creation, invoked by the context's allocate phase and by
/// asynchronous creation jobs.
pub trait ResourceFactory: Send + Sync {
    /// Create a 2D texture.
    fn create_texture(
        &self,
        name: &str,
        format: TextureFormat,
        extent: Extent2d,
        usage: TextureUsage,
    ) -> Result<Box<dyn DeviceResource>, FrameError>;
}

/// Default timeout used by blocking fence waits: wait forever.
pub const WAIT_FOREVER: Option<Duration> = None;
