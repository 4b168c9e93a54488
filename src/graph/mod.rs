//! Ordered render-pass execution plans.
//!
//! # Architecture
//!
//! A [`RenderGraph`] is built once by [`RenderGraphBuilder`] from a
//! dependency specification and re-executed every frame until invalidated
//! (for example by a settings change requiring new resources). The flow
//! list is stored leaf-first, so iterating it in order replays passes in
//! valid dependency order.
//!
//! Per frame, callers submit one opaque entry per pass they want to run
//! ([`RenderGraph::submit_entry`]), then call [`RenderGraph::run`]. A pass
//! without an entry is skipped entirely and its outputs keep whatever the
//! previous frame wrote; downstream passes see the producing slot bound to
//! stale contents and must tolerate that (last-known-good policy).

pub mod builder;
pub mod pass;

use std::any::Any;
use std::sync::Arc;

pub use builder::{GraphBuildError, RenderGraphBuilder};
pub use pass::{
    PassConfiguration, PassContext, PassKind, RenderPass, MAX_PASS_KINDS, MAX_PASS_SLOTS,
    MAX_WORKING_SLOTS,
};

use crate::context::{GraphId, RenderGraphContext, ResourceId};
use crate::resource::GpuResource;

/// One scheduled pass instance in the flow list. Immutable after build.
#[derive(Debug, Clone)]
pub struct FlowNode {
    /// The pass this node executes.
    pub kind: PassKind,
    /// Parameter slots, fed by upstream outputs. `None` marks an unused
    /// slot.
    pub params: [Option<ResourceId>; MAX_PASS_SLOTS],
    /// Pass-private scratch slots.
    pub working: [Option<ResourceId>; MAX_WORKING_SLOTS],
    /// Output slots. The final pass's reserved slot stays `None` and binds
    /// to the caller's target at execution time.
    pub outputs: [Option<ResourceId>; MAX_PASS_SLOTS],
    /// Which output slot binds the caller's final target, on the final
    /// pass only.
    pub final_output_slot: Option<usize>,
}

/// An ordered sequence of flow nodes plus the passes they reference.
pub struct RenderGraph {
    graph_id: GraphId,
    nodes: Vec<FlowNode>,
    passes: Vec<Box<dyn RenderPass>>,
    entries: Vec<Option<Box<dyn Any + Send>>>,
}

impl RenderGraph {
    pub(crate) fn new(
        graph_id: GraphId,
        nodes: Vec<FlowNode>,
        passes: Vec<Box<dyn RenderPass>>,
    ) -> Self {
        let entries = nodes.iter().map(|_| None).collect();
        Self {
            graph_id,
            nodes,
            passes,
            entries,
        }
    }

    /// Id of the context graph this plan schedules resources under.
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    /// The flow list, leaf-first.
    pub fn nodes(&self) -> &[FlowNode] {
        &self.nodes
    }

    /// Submit this frame's entry for `kind`. Returns false (logged) when
    /// the pass is not part of this graph; a previous entry is replaced.
    pub fn submit_entry(&mut self, kind: PassKind, entry: Box<dyn Any + Send>) -> bool {
        let Some(index) = self.nodes.iter().position(|node| node.kind == kind) else {
            log::warn!(
                "submit_entry: pass kind {} is not part of graph {}",
                kind.0,
                self.graph_id
            );
            return false;
        };
        if self.entries[index].is_some() {
            log::warn!("submit_entry: replacing entry for pass kind {}", kind.0);
        }
        self.entries[index] = Some(entry);
        true
    }

    /// Execute one frame: iterate the flow list in order, invoke each pass
    /// that has an entry, and release every entry.
    ///
    /// `final_target` is bound into the final pass's reserved output slot.
    /// Resource ids resolve through `context`; an id whose physical backing
    /// is gone resolves to an unbound slot (logged by the context).
    pub fn run(&mut self, context: &RenderGraphContext, final_target: &Arc<GpuResource>) {
        for (index, node) in self.nodes.iter().enumerate() {
            let Some(entry) = self.entries[index].take() else {
                log::trace!(
                    "graph {}: pass kind {} has no entry, skipped",
                    self.graph_id,
                    node.kind.0
                );
                continue;
            };

            let resolve =
                |id: Option<ResourceId>| id.and_then(|id| context.texture(id));
            let params: Vec<_> = node.params.iter().map(|id| resolve(*id)).collect();
            let working: Vec<_> = node.working.iter().map(|id| resolve(*id)).collect();
            let mut outputs: Vec<_> = node.outputs.iter().map(|id| resolve(*id)).collect();
            if let Some(slot) = node.final_output_slot {
                outputs[slot] = Some(final_target.clone());
            }

            let mut ctx = PassContext::new(entry.as_ref(), &params, &working, &outputs);
            self.passes[index].render(&mut ctx);
        }
    }
}
