//! Transient resource lifetime and aliasing across render graphs.
//!
//! [`RenderGraphContext`] decouples "what resources does each graph need, at
//! what size" from "what physical resources actually exist". Each settings
//! epoch has two phases:
//!
//! 1. **Schedule** (during graph builds): descriptions and requested graph
//!    sizes accumulate, pure bookkeeping, nothing touches the device.
//! 2. **Allocate** ([`RenderGraphContext::create_graph_resources`]): every
//!    description is folded into an [aliased group] by a greedy first-fit
//!    scan, then one physical resource is created per group. This is the
//!    single cutover point allowed to touch the device.
//!
//! The allocator is deliberately greedy, not an optimal interval-graph
//! coloring: it trades some aliasing opportunities for O(n·k) simplicity.
//!
//! [aliased group]: AliasedGroupInfo

use std::collections::HashMap;
use std::sync::Arc;

use static_assertions::const_assert;

use crate::backend::ResourceFactory;
use crate::error::FrameError;
use crate::resource::GpuResource;
use crate::types::{Extent2d, GraphSize, RenderTextureDescription, TextureFormat, TextureUsage};

/// Identifier of one graph tracked by a context.
pub type GraphId = usize;

/// Maximum number of concurrently tracked graphs.
///
/// Graph identity lives in a 64-bit membership mask per aliased group; this
/// is a hard cap, requests beyond it fail loudly instead of truncating.
pub const MAX_GRAPHS: usize = 64;
const_assert!(MAX_GRAPHS <= 64);

/// Opaque identifier of one logical resource request.
///
/// Unique within an allocation epoch of the owning context; meaningless
/// across rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);

struct ScheduledResource {
    id: ResourceId,
    desc: RenderTextureDescription,
}

struct AliasedGroup {
    format: TextureFormat,
    extent: Extent2d,
    /// Union of every member's usage flags.
    usage: TextureUsage,
    /// One bit per graph that already aliases onto this group.
    graph_mask: u64,
    members: Vec<ResourceId>,
    resource: Option<Arc<GpuResource>>,
}

/// Read-only view of one aliased physical allocation, for diagnostics and
/// tests.
#[derive(Debug, Clone)]
pub struct AliasedGroupInfo {
    /// Combined usage flags (union over members).
    pub usage: TextureUsage,
    /// Resolved extent of the backing allocation.
    pub extent: Extent2d,
    /// Member resource ids across all graphs.
    pub members: Vec<ResourceId>,
}

/// Decides which logical resource requests share physical backing memory.
pub struct RenderGraphContext {
    factory: Arc<dyn ResourceFactory>,
    scheduled: [Vec<ScheduledResource>; MAX_GRAPHS],
    sizes: [Vec<GraphSize>; MAX_GRAPHS],
    groups: Vec<AliasedGroup>,
    /// ResourceId -> group index, valid between allocate and delete.
    lookup: HashMap<ResourceId, usize>,
    next_id: u32,
}

impl RenderGraphContext {
    /// Create a context that allocates through `factory`.
    pub fn new(factory: Arc<dyn ResourceFactory>) -> Self {
        Self {
            factory,
            scheduled: std::array::from_fn(|_| Vec::new()),
            sizes: std::array::from_fn(|_| Vec::new()),
            groups: Vec::new(),
            lookup: HashMap::new(),
            next_id: 0,
        }
    }

    /// Append `desc` to `graph`'s request list and hand back a fresh id.
    ///
    /// Pure bookkeeping; no physical allocation happens here. Returns `None`
    /// (logged) for an out-of-range graph id.
    pub fn schedule_new_resource(
        &mut self,
        graph: GraphId,
        desc: RenderTextureDescription,
    ) -> Option<ResourceId> {
        if graph >= MAX_GRAPHS {
            log::error!("schedule_new_resource: graph id {graph} exceeds cap {MAX_GRAPHS}");
            return None;
        }
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.scheduled[graph].push(ScheduledResource { id, desc });
        Some(id)
    }

    /// Record one of possibly several requested sizes for `graph` (e.g.
    /// different camera viewports sharing a topology). The allocate phase
    /// resolves policy-derived extents against the component-wise maximum.
    pub fn add_graph_size(&mut self, graph: GraphId, size: GraphSize) {
        if graph >= MAX_GRAPHS {
            log::error!("add_graph_size: graph id {graph} exceeds cap {MAX_GRAPHS}");
            return;
        }
        self.sizes[graph].push(size);
    }

    /// Smallest common superset of the sizes requested for `graph`.
    pub fn common_size(&self, graph: GraphId) -> GraphSize {
        self.sizes
            .get(graph)
            .map(|sizes| {
                sizes
                    .iter()
                    .fold(GraphSize::default(), |acc, size| acc.max(*size))
            })
            .unwrap_or_default()
    }

    /// Allocate phase: fold every scheduled description into a group, then
    /// instantiate one physical resource per group.
    ///
    /// Greedy first-fit: a description joins the first existing group that is
    /// compatible (format and resolved extent match) and not yet used by the
    /// same graph; otherwise it starts a new group. Joining a group unions
    /// the usage flags.
    ///
    /// May be called more than once per epoch (schedule one graph, allocate,
    /// schedule another, allocate again): descriptions folded by an earlier
    /// call keep their group and id mapping untouched.
    ///
    /// Creation failures are device failures: the error propagates and the
    /// caller is expected to treat it as fatal.
    pub fn create_graph_resources(&mut self) -> Result<(), FrameError> {
        for graph in 0..MAX_GRAPHS {
            let size = self.common_size(graph);
            let graph_bit = 1u64 << graph;

            for scheduled in &self.scheduled[graph] {
                // Already folded by an earlier allocate call in this epoch;
                // an allocated id keeps its group until the epoch ends.
                if self.lookup.contains_key(&scheduled.id) {
                    continue;
                }
                let extent = scheduled.desc.resolve_extent(&size);
                let found = self.groups.iter_mut().enumerate().find(|(_, group)| {
                    group.graph_mask & graph_bit == 0
                        && scheduled.desc.compatible_with(group.format, group.extent, &size)
                });

                let group_index = match found {
                    Some((index, group)) => {
                        group.usage |= scheduled.desc.usage;
                        group.graph_mask |= graph_bit;
                        group.members.push(scheduled.id);
                        index
                    }
                    None => {
                        self.groups.push(AliasedGroup {
                            format: scheduled.desc.format,
                            extent,
                            usage: scheduled.desc.usage,
                            graph_mask: graph_bit,
                            members: vec![scheduled.id],
                            resource: None,
                        });
                        self.groups.len() - 1
                    }
                };
                self.lookup.insert(scheduled.id, group_index);
            }
        }

        for (index, group) in self.groups.iter_mut().enumerate() {
            if group.resource.is_some() {
                continue;
            }
            let name = format!("transient_group_{index}");
            let object =
                self.factory
                    .create_texture(&name, group.format, group.extent, group.usage)?;
            group.resource = Some(Arc::new(GpuResource::new_with_object(name, object)));
        }

        log::debug!(
            "allocated {} physical group(s) for {} scheduled request(s)",
            self.groups.len(),
            self.lookup.len()
        );
        Ok(())
    }

    /// Resolve a logical id to its physical resource.
    ///
    /// Returns `None` (logged) for an id that was never scheduled or whose
    /// epoch has been deleted; the frame continues degraded rather than
    /// crashing.
    pub fn texture(&self, id: ResourceId) -> Option<Arc<GpuResource>> {
        let Some(&group_index) = self.lookup.get(&id) else {
            log::warn!("texture lookup for unknown resource id {id:?}");
            return None;
        };
        self.groups
            .get(group_index)
            .and_then(|group| group.resource.clone())
    }

    /// Clear `graph`'s scheduling bookkeeping without touching physical
    /// resources. Used when rebuilding topology before reallocating.
    pub fn delete_graph_resource_descriptions(&mut self, graph: GraphId) {
        if graph >= MAX_GRAPHS {
            log::error!("delete_graph_resource_descriptions: graph id {graph} out of range");
            return;
        }
        for scheduled in self.scheduled[graph].drain(..) {
            self.lookup.remove(&scheduled.id);
        }
        self.sizes[graph].clear();
    }

    /// Release every physical resource and invalidate all lookup tables.
    /// Ends the allocation epoch.
    pub fn delete_graph_resources(&mut self) {
        let released = self.groups.len();
        self.groups.clear();
        self.lookup.clear();
        for graph in 0..MAX_GRAPHS {
            self.scheduled[graph].clear();
            self.sizes[graph].clear();
        }
        if released > 0 {
            log::debug!("released {released} physical group(s)");
        }
    }

    /// Read-only views of the current groups.
    pub fn groups(&self) -> Vec<AliasedGroupInfo> {
        self.groups
            .iter()
            .map(|group| AliasedGroupInfo {
                usage: group.usage,
                extent: group.extent,
                members: group.members.clone(),
            })
            .collect()
    }

    /// Number of physical allocations in the current epoch.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::NullFactory;
    use crate::types::SizePolicy;

    fn color_desc(name: &str) -> RenderTextureDescription {
        RenderTextureDescription::new(
            name,
            TextureFormat::Rgba16Float,
            SizePolicy::Render { shift: 0 },
            TextureUsage::RENDER_TARGET,
        )
    }

    fn context_with_factory() -> (RenderGraphContext, Arc<NullFactory>) {
        let factory = Arc::new(NullFactory::new());
        (RenderGraphContext::new(factory.clone()), factory)
    }

    #[test]
    fn test_schedule_is_pure_bookkeeping() {
        let (mut context, factory) = context_with_factory();
        context.add_graph_size(0, GraphSize::uniform(Extent2d::new(1920, 1080)));
        context.schedule_new_resource(0, color_desc("a")).unwrap();
        assert_eq!(factory.created_count(), 0);
        assert_eq!(context.group_count(), 0);
    }

    #[test]
    fn test_same_graph_never_aliases_onto_one_group() {
        let (mut context, factory) = context_with_factory();
        context.add_graph_size(0, GraphSize::uniform(Extent2d::new(1920, 1080)));
        let a = context.schedule_new_resource(0, color_desc("a")).unwrap();
        let b = context.schedule_new_resource(0, color_desc("b")).unwrap();

        context.create_graph_resources().unwrap();
        assert_eq!(context.group_count(), 2);
        assert_eq!(factory.created_count(), 2);

        let ta = context.texture(a).unwrap();
        let tb = context.texture(b).unwrap();
        assert_ne!(ta.id(), tb.id());
    }

    #[test]
    fn test_cross_graph_requests_alias() {
        let (mut context, factory) = context_with_factory();
        let size = GraphSize::uniform(Extent2d::new(1920, 1080));
        context.add_graph_size(0, size);
        context.add_graph_size(1, size);
        let a = context.schedule_new_resource(0, color_desc("a")).unwrap();
        let b = context.schedule_new_resource(1, color_desc("b")).unwrap();

        context.create_graph_resources().unwrap();
        assert_eq!(context.group_count(), 1);
        assert_eq!(factory.created_count(), 1);

        let ta = context.texture(a).unwrap();
        let tb = context.texture(b).unwrap();
        assert_eq!(ta.id(), tb.id(), "both ids resolve to the shared backing");
    }

    #[test]
    fn test_group_usage_is_union_of_members() {
        let (mut context, _) = context_with_factory();
        let size = GraphSize::uniform(Extent2d::new(1024, 1024));
        context.add_graph_size(0, size);
        context.add_graph_size(1, size);
        context
            .schedule_new_resource(
                0,
                RenderTextureDescription::new(
                    "rt",
                    TextureFormat::Rgba16Float,
                    SizePolicy::Render { shift: 0 },
                    TextureUsage::RENDER_TARGET,
                ),
            )
            .unwrap();
        context
            .schedule_new_resource(
                1,
                RenderTextureDescription::new(
                    "uav",
                    TextureFormat::Rgba16Float,
                    SizePolicy::Render { shift: 0 },
                    TextureUsage::RANDOM_WRITE,
                ),
            )
            .unwrap();

        context.create_graph_resources().unwrap();
        let groups = context.groups();
        assert_eq!(groups.len(), 1);
        assert!(groups[0]
            .usage
            .contains(TextureUsage::RENDER_TARGET | TextureUsage::RANDOM_WRITE));
    }

    #[test]
    fn test_incremental_allocation_keeps_existing_mappings() {
        let (mut context, factory) = context_with_factory();
        let size = GraphSize::uniform(Extent2d::new(512, 512));
        context.add_graph_size(0, size);
        let a = context.schedule_new_resource(0, color_desc("a")).unwrap();
        context.create_graph_resources().unwrap();
        let backing = context.texture(a).unwrap().id();

        // Schedule a second graph and allocate again within the same epoch.
        context.add_graph_size(1, size);
        let b = context.schedule_new_resource(1, color_desc("b")).unwrap();
        context.create_graph_resources().unwrap();

        // The already-allocated id keeps its physical backing, and the new
        // request aliases onto it instead of forcing a duplicate group.
        assert_eq!(context.texture(a).unwrap().id(), backing);
        assert_eq!(context.texture(b).unwrap().id(), backing);
        assert_eq!(context.group_count(), 1);
        assert_eq!(factory.created_count(), 1);
    }

    #[test]
    fn test_common_size_is_component_wise_maximum() {
        let (mut context, _) = context_with_factory();
        context.add_graph_size(0, GraphSize::uniform(Extent2d::new(1920, 540)));
        context.add_graph_size(0, GraphSize::uniform(Extent2d::new(1280, 1080)));
        let common = context.common_size(0);
        assert_eq!(common.render, Extent2d::new(1920, 1080));
    }

    #[test]
    fn test_lookup_fails_safely() {
        let (context, _) = context_with_factory();
        assert!(context.texture(ResourceId(99)).is_none());
    }

    #[test]
    fn test_delete_descriptions_keeps_physical_resources() {
        let (mut context, _) = context_with_factory();
        context.add_graph_size(0, GraphSize::uniform(Extent2d::new(256, 256)));
        let a = context.schedule_new_resource(0, color_desc("a")).unwrap();
        context.create_graph_resources().unwrap();

        context.delete_graph_resource_descriptions(0);
        assert_eq!(context.group_count(), 1);
        // The id belonged to the deleted bookkeeping; lookups are gone.
        assert!(context.texture(a).is_none());
    }

    #[test]
    fn test_delete_resources_ends_the_epoch() {
        let (mut context, _) = context_with_factory();
        context.add_graph_size(0, GraphSize::uniform(Extent2d::new(256, 256)));
        let a = context.schedule_new_resource(0, color_desc("a")).unwrap();
        context.create_graph_resources().unwrap();

        context.delete_graph_resources();
        assert_eq!(context.group_count(), 0);
        assert!(context.texture(a).is_none());
    }

    #[test]
    fn test_out_of_range_graph_is_rejected() {
        let (mut context, _) = context_with_factory();
        assert!(context
            .schedule_new_resource(MAX_GRAPHS, color_desc("x"))
            .is_none());
    }
}
