//! # Vermilion Frame
//!
//! Frame-scheduling and GPU-resource-lifetime core for a real-time renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderGraphBuilder`] / [`RenderGraph`] - Dependency-ordered render
//!   pass plans, built once and re-executed every frame
//! - [`RenderGraphContext`] - Transient resource scheduling and cross-graph
//!   aliasing
//! - [`ResourceStateTracker`] - Batched state-transition, UAV and alias
//!   barriers
//! - [`SyncQueue`] / [`Fence`] - CPU/GPU timeline synchronization and
//!   command list recycling
//! - [`ResourceLifetimeManager`] - Asynchronous resource creation and
//!   fence-gated retirement
//! - [`JobScheduler`] - Single-worker prioritized job queue with
//!   overwritable-collapse semantics
//! - [`backend`] - Traits a graphics backend must satisfy, plus a null
//!   backend for testing
//!
//! ## Example
//!
//! ```ignore
//! use vermilion_frame::{RenderGraphBuilder, RenderGraphContext};
//!
//! let mut context = RenderGraphContext::new(factory);
//! let mut graph = builder.build(&mut context, 0)?;
//! context.create_graph_resources()?;
//! // Per frame: submit entries, then graph.run(&context, &swapchain);
//! ```

pub mod backend;
pub mod barrier;
pub mod context;
pub mod error;
pub mod graph;
pub mod jobs;
pub mod lifetime;
pub mod resource;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use barrier::{ResourceState, ResourceStateTracker};
pub use context::{GraphId, RenderGraphContext, ResourceId, MAX_GRAPHS};
pub use error::FrameError;
pub use graph::{
    FlowNode, GraphBuildError, PassConfiguration, PassContext, PassKind, RenderGraph,
    RenderGraphBuilder, RenderPass,
};
pub use jobs::{JobId, JobScheduler, JobTypeId, WorkerState};
pub use lifetime::ResourceLifetimeManager;
pub use resource::GpuResource;
pub use sync::{Fence, SyncQueue};
pub use types::{
    Extent2d, GraphSize, RenderTextureDescription, SizePolicy, TextureFormat, TextureUsage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the frame core.
///
/// This should be called once before using any frame functionality.
pub fn init() {
    log::info!("Vermilion Frame v{VERSION} initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_tracker_starts_empty() {
        let tracker = ResourceStateTracker::new();
        assert_eq!(tracker.pending_count(), 0);
    }
}
