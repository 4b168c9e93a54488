//! Resource state tracking and barrier batching.
//!
//! A resource's state is authoritative client-side state, never queried from
//! the device. The tracker records the state every tracked resource is
//! believed to be in, batches the transitions a frame needs, and flushes the
//! whole batch to a command list in a single call - per-barrier submission
//! has material per-call overhead on real hardware.
//!
//! The client-side state is updated optimistically when a transition is
//! queued: it must equal the true device-side state at the moment the owning
//! command list executes the batched barrier call, which holds only if every
//! state mutation goes through this tracker.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{BarrierDesc, CommandList};
use crate::resource::GpuResource;

/// Device-visible states a tracked resource can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Initial / generic state.
    #[default]
    Common,
    /// Bound as a color render target.
    RenderTarget,
    /// Bound as a writable depth/stencil target.
    DepthWrite,
    /// Sampled from a shader.
    ShaderResource,
    /// Random shader writes (UAV / storage).
    UnorderedAccess,
    /// Source of a copy operation.
    CopySrc,
    /// Destination of a copy operation.
    CopyDst,
    /// Presented to a swapchain.
    Present,
}

/// Batches state-transition, UAV and alias barriers for one command list.
#[derive(Default)]
pub struct ResourceStateTracker {
    pending: Mutex<Vec<BarrierDesc>>,
}

impl ResourceStateTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transition of `resource` to `to`.
    ///
    /// No-op if the resource is already believed to be in `to`. Otherwise
    /// the client-side state is updated immediately and a transition barrier
    /// joins the pending batch.
    pub fn transition_resource(&self, resource: &Arc<GpuResource>, to: ResourceState) {
        let before = resource.state();
        if before == to {
            return;
        }
        resource.set_state(to);
        self.pending.lock().push(BarrierDesc::Transition {
            resource: resource.clone(),
            before,
            after: to,
        });
    }

    /// Queue an unordered-access hazard barrier. Never deduplicated.
    pub fn insert_uav_barrier(&self, resource: &Arc<GpuResource>) {
        self.pending.lock().push(BarrierDesc::UnorderedAccess {
            resource: resource.clone(),
        });
    }

    /// Queue an aliasing barrier between two physical allocations.
    /// Never deduplicated.
    pub fn insert_alias_barrier(
        &self,
        before: Option<&Arc<GpuResource>>,
        after: &Arc<GpuResource>,
    ) {
        self.pending.lock().push(BarrierDesc::Aliasing {
            before: before.cloned(),
            after: after.clone(),
        });
    }

    /// Submit the entire pending batch to `list` in one call and clear it.
    pub fn flush_pending_transitions(&self, list: &mut dyn CommandList) {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return;
        }
        log::trace!("flushing {} pending barrier(s)", batch.len());
        list.record_barriers(&batch);
    }

    /// Number of barriers waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
