//! Dependency-driven construction of render graphs.
//!
//! The builder walks pass dependencies depth-first starting at the
//! designated final pass and appends each pass to the flow list only after
//! all of its upstream passes. Leaves therefore always precede the passes
//! that consume them, and the resulting list replays in valid dependency
//! order with no separate topological sort.

use std::any::Any;
use std::fmt;

use crate::context::{GraphId, RenderGraphContext, ResourceId, MAX_GRAPHS};
use crate::graph::pass::{
    PassKind, RenderPass, MAX_PASS_KINDS, MAX_PASS_SLOTS, MAX_WORKING_SLOTS,
};
use crate::graph::{FlowNode, RenderGraph};

/// Why a build was rejected. Build failures are fatal to the requested
/// graph, never to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphBuildError {
    /// No final pass was designated before building.
    FinalPassNotSet,
    /// A pass kind index is at or above [`MAX_PASS_KINDS`].
    PassKindOutOfRange(PassKind),
    /// A referenced pass kind was never registered.
    UnknownPassKind(PassKind),
    /// The dependency walk revisited a pass already on the current path.
    CyclicDependency(PassKind),
    /// A pass requested more parameter, working or output slots than the
    /// fixed per-pass maximum.
    TooManySlots(PassKind),
    /// A link references a slot that does not exist, or a producer that is
    /// not an upstream dependency of its consumer.
    InvalidLink {
        /// Producing pass.
        from: PassKind,
        /// Consuming pass.
        to: PassKind,
    },
    /// The designated final output slot is outside the final pass's
    /// declared outputs.
    FinalSlotOutOfRange,
    /// The target graph id is at or above [`MAX_GRAPHS`].
    GraphIdOutOfRange(GraphId),
}

impl fmt::Display for GraphBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FinalPassNotSet => write!(f, "final pass not set"),
            Self::PassKindOutOfRange(kind) => {
                write!(f, "pass kind {} out of range (max {MAX_PASS_KINDS})", kind.0)
            }
            Self::UnknownPassKind(kind) => write!(f, "pass kind {} not registered", kind.0),
            Self::CyclicDependency(kind) => {
                write!(f, "cyclic dependency through pass kind {}", kind.0)
            }
            Self::TooManySlots(kind) => write!(
                f,
                "pass kind {} exceeds slot limits ({MAX_PASS_SLOTS} params/outputs, \
                 {MAX_WORKING_SLOTS} working)",
                kind.0
            ),
            Self::InvalidLink { from, to } => {
                write!(f, "invalid link from pass kind {} to {}", from.0, to.0)
            }
            Self::FinalSlotOutOfRange => write!(f, "final output slot out of range"),
            Self::GraphIdOutOfRange(graph) => {
                write!(f, "graph id {graph} out of range (max {MAX_GRAPHS})")
            }
        }
    }
}

impl std::error::Error for GraphBuildError {}

/// One directed data edge: `from`'s output feeds `to`'s parameter.
#[derive(Debug, Clone, Copy)]
struct Link {
    from: PassKind,
    from_output: usize,
    to: PassKind,
    to_input: usize,
}

struct BuildState {
    processed: u64,
    in_progress: u64,
    output_ids: Vec<[Option<ResourceId>; MAX_PASS_SLOTS]>,
    nodes: Vec<FlowNode>,
}

/// Collects passes, links and the final-pass designation, then produces an
/// ordered [`RenderGraph`].
pub struct RenderGraphBuilder {
    passes: Vec<Option<Box<dyn RenderPass>>>,
    settings: Box<dyn Any + Send>,
    links: Vec<Link>,
    final_pass: Option<(PassKind, usize)>,
}

impl RenderGraphBuilder {
    /// Create a builder; `settings` is handed to every pass's
    /// configuration resolution.
    pub fn new(settings: Box<dyn Any + Send>) -> Self {
        Self {
            passes: (0..MAX_PASS_KINDS).map(|_| None).collect(),
            settings,
            links: Vec::new(),
            final_pass: None,
        }
    }

    /// Register `pass` under `kind`, replacing any previous registration.
    pub fn add_pass(&mut self, kind: PassKind, pass: Box<dyn RenderPass>) -> &mut Self {
        if kind.index() >= MAX_PASS_KINDS {
            log::error!("add_pass: pass kind {} out of range, ignored", kind.0);
            return self;
        }
        if self.passes[kind.index()].is_some() {
            log::warn!("add_pass: replacing pass kind {}", kind.0);
        }
        self.passes[kind.index()] = Some(pass);
        self
    }

    /// Wire output `from_output` of `from` into parameter `to_input` of
    /// `to`.
    pub fn add_link(
        &mut self,
        from: PassKind,
        from_output: usize,
        to: PassKind,
        to_input: usize,
    ) -> &mut Self {
        self.links.push(Link {
            from,
            from_output,
            to,
            to_input,
        });
        self
    }

    /// Designate the pass and output slot the caller's final target binds
    /// to at execution time.
    pub fn set_final_pass(&mut self, kind: PassKind, output_slot: usize) -> &mut Self {
        self.final_pass = Some((kind, output_slot));
        self
    }

    /// Consume the builder and produce an ordered graph, scheduling every
    /// transient resource on `context` under `graph`.
    ///
    /// Registered passes not reachable from the final pass are dropped
    /// (logged). All resource scheduling here is bookkeeping; the context's
    /// allocate phase creates the physical resources later.
    pub fn build(
        mut self,
        context: &mut RenderGraphContext,
        graph: GraphId,
    ) -> Result<RenderGraph, GraphBuildError> {
        let (final_kind, final_slot) = self.final_pass.ok_or(GraphBuildError::FinalPassNotSet)?;
        if graph >= MAX_GRAPHS {
            return Err(GraphBuildError::GraphIdOutOfRange(graph));
        }

        let mut state = BuildState {
            processed: 0,
            in_progress: 0,
            output_ids: vec![[None; MAX_PASS_SLOTS]; MAX_PASS_KINDS],
            nodes: Vec::new(),
        };
        self.visit(final_kind, &mut state, context, graph)?;

        let mut passes = Vec::with_capacity(state.nodes.len());
        for node in &state.nodes {
            let pass = self.passes[node.kind.index()]
                .take()
                .ok_or(GraphBuildError::UnknownPassKind(node.kind))?;
            passes.push(pass);
        }

        for (index, pass) in self.passes.iter().enumerate() {
            if let Some(pass) = pass {
                log::debug!(
                    "pass '{}' (kind {index}) unreachable from the final pass, dropped",
                    pass.name()
                );
            }
        }

        log::debug!(
            "built graph {graph} with {} pass(es), final pass kind {} slot {final_slot}",
            state.nodes.len(),
            final_kind.0
        );
        Ok(RenderGraph::new(graph, state.nodes, passes))
    }

    fn visit(
        &self,
        kind: PassKind,
        state: &mut BuildState,
        context: &mut RenderGraphContext,
        graph: GraphId,
    ) -> Result<(), GraphBuildError> {
        if kind.index() >= MAX_PASS_KINDS {
            return Err(GraphBuildError::PassKindOutOfRange(kind));
        }
        if state.processed & kind.bit() != 0 {
            return Ok(());
        }
        if state.in_progress & kind.bit() != 0 {
            return Err(GraphBuildError::CyclicDependency(kind));
        }

        let pass = self.passes[kind.index()]
            .as_ref()
            .ok_or(GraphBuildError::UnknownPassKind(kind))?;
        let config = pass.configuration(&*self.settings);
        if config.dependencies.len() > MAX_PASS_SLOTS
            || config.outputs.len() > MAX_PASS_SLOTS
            || config.working.len() > MAX_WORKING_SLOTS
        {
            return Err(GraphBuildError::TooManySlots(kind));
        }

        state.in_progress |= kind.bit();
        for dep in &config.dependencies {
            self.visit(*dep, state, context, graph)?;
        }
        state.in_progress &= !kind.bit();

        let final_output_slot = match self.final_pass {
            Some((final_kind, slot)) if final_kind == kind => {
                if slot >= config.outputs.len() {
                    return Err(GraphBuildError::FinalSlotOutOfRange);
                }
                Some(slot)
            }
            _ => None,
        };

        // Outputs: fresh ids, except the slot reserved for the caller's
        // final target.
        let mut outputs = [None; MAX_PASS_SLOTS];
        for (slot, desc) in config.outputs.iter().enumerate() {
            if final_output_slot == Some(slot) {
                continue;
            }
            outputs[slot] = Some(
                context
                    .schedule_new_resource(graph, desc.clone())
                    .ok_or(GraphBuildError::GraphIdOutOfRange(graph))?,
            );
        }

        // Working resources are pass-private scratch, never linked.
        let mut working = [None; MAX_WORKING_SLOTS];
        for (slot, desc) in config.working.iter().enumerate() {
            working[slot] = Some(
                context
                    .schedule_new_resource(graph, desc.clone())
                    .ok_or(GraphBuildError::GraphIdOutOfRange(graph))?,
            );
        }

        // Parameters come from upstream outputs via the declared links.
        let mut params = [None; MAX_PASS_SLOTS];
        for link in self.links.iter().filter(|link| link.to == kind) {
            let invalid = GraphBuildError::InvalidLink {
                from: link.from,
                to: kind,
            };
            if link.to_input >= MAX_PASS_SLOTS
                || link.from_output >= MAX_PASS_SLOTS
                || link.from.index() >= MAX_PASS_KINDS
                || state.processed & link.from.bit() == 0
            {
                return Err(invalid);
            }
            params[link.to_input] =
                Some(state.output_ids[link.from.index()][link.from_output].ok_or(invalid)?);
        }

        state.output_ids[kind.index()] = outputs;
        state.processed |= kind.bit();
        state.nodes.push(FlowNode {
            kind,
            params,
            working,
            outputs,
            final_output_slot,
        });
        Ok(())
    }
}
