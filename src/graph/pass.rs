//! Render pass abstraction consumed by the graph builder and executor.

use std::any::Any;
use std::sync::Arc;

use static_assertions::const_assert;

use crate::resource::GpuResource;
use crate::types::RenderTextureDescription;

/// Maximum parameter/output slots per pass.
pub const MAX_PASS_SLOTS: usize = 8;
/// Maximum pass-private working (scratch) slots per pass.
pub const MAX_WORKING_SLOTS: usize = 4;
/// Maximum distinct pass kinds per builder.
///
/// Build-time reachability lives in a 64-bit bitmask, one bit per kind.
pub const MAX_PASS_KINDS: usize = 64;
const_assert!(MAX_PASS_KINDS <= 64);

/// Identity of a pass kind within one builder. Doubles as the registry
/// index, so values must stay below [`MAX_PASS_KINDS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassKind(pub u32);

impl PassKind {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn bit(self) -> u64 {
        1u64 << self.0
    }
}

/// What a pass needs from the graph, resolved against the build settings.
///
/// Working resources are pass-private scratch and are never shared across
/// passes; outputs are produced for downstream consumers or the final
/// target.
#[derive(Default)]
pub struct PassConfiguration {
    /// Upstream pass kinds that must execute before this pass.
    pub dependencies: Vec<PassKind>,
    /// Scratch resources private to this pass.
    pub working: Vec<RenderTextureDescription>,
    /// Resources this pass produces.
    pub outputs: Vec<RenderTextureDescription>,
    /// Whether the pass could run on an async compute queue.
    pub async_compute: bool,
}

/// Resolved resource bindings handed to [`RenderPass::render`].
///
/// Lookups return `Option`: a parameter slot can be unbound when its
/// producer was skipped this frame, and the final pass's reserved output
/// slot is bound late to the caller's target. Passes must tolerate `None`.
pub struct PassContext<'a> {
    entry: &'a dyn Any,
    params: &'a [Option<Arc<GpuResource>>],
    working: &'a [Option<Arc<GpuResource>>],
    outputs: &'a [Option<Arc<GpuResource>>],
}

impl<'a> PassContext<'a> {
    pub(crate) fn new(
        entry: &'a dyn Any,
        params: &'a [Option<Arc<GpuResource>>],
        working: &'a [Option<Arc<GpuResource>>],
        outputs: &'a [Option<Arc<GpuResource>>],
    ) -> Self {
        Self {
            entry,
            params,
            working,
            outputs,
        }
    }

    /// The per-frame submission payload, downcast by the pass itself.
    pub fn entry(&self) -> &dyn Any {
        self.entry
    }

    /// Parameter resource at `slot`, if bound.
    pub fn param(&self, slot: usize) -> Option<&Arc<GpuResource>> {
        self.params.get(slot).and_then(Option::as_ref)
    }

    /// Working (scratch) resource at `slot`, if bound.
    pub fn working(&self, slot: usize) -> Option<&Arc<GpuResource>> {
        self.working.get(slot).and_then(Option::as_ref)
    }

    /// Output resource at `slot`, if bound.
    pub fn output(&self, slot: usize) -> Option<&Arc<GpuResource>> {
        self.outputs.get(slot).and_then(Option::as_ref)
    }
}

/// One render pass implementation.
///
/// Passes are a closed, curated set: the builder resolves their
/// configuration once per build, and the executor invokes `render` once per
/// frame for each pass with a submitted entry.
pub trait RenderPass: Send {
    /// Debug name.
    fn name(&self) -> &str;

    /// Resolve the pass's resource needs against the build settings.
    fn configuration(&self, settings: &dyn Any) -> PassConfiguration;

    /// Record this pass's work for the current frame.
    fn render(&mut self, ctx: &mut PassContext<'_>);
}
