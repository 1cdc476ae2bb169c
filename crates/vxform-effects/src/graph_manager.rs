//! Lazily built native filter graphs with in-place parameter patching.
//!
//! A managed graph is built against the shapes of its inputs. While those
//! stay the same, value changes go through the graph's command channel; a
//! shape change tears the graph down and the next use builds a new one.

use smallvec::SmallVec;
use tracing::debug;
use vxform_core::{Result, VxError};
use vxform_media::{graph_build, graph_runtime};
use vxform_native::{FilterGraph, FrameShape, NativeFrame, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Absent,
    Built,
    /// Built, with runtime commands not yet applied
    BuiltDirty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    pub state: GraphState,
    pub build_count: u64,
    /// Process-unique id of the live graph
    pub graph_id: Option<u64>,
}

/// A value of a live graph that can be patched with `send_command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphParam {
    pub target: &'static str,
    pub command: &'static str,
    pub value: String,
}

impl GraphParam {
    pub fn new(target: &'static str, command: &'static str, value: impl ToString) -> Self {
        Self {
            target,
            command,
            value: value.to_string(),
        }
    }
}

struct LiveGraph {
    graph: FilterGraph,
    sources: SmallVec<[NodeId; 2]>,
    sink: NodeId,
    params: Vec<GraphParam>,
}

/// One managed graph. Sources are named `in0`, `in1`, ... and the sink
/// `out` in the graph description.
pub struct ManagedGraph {
    label: &'static str,
    inputs: SmallVec<[FrameShape; 2]>,
    live: Option<LiveGraph>,
    dirty: bool,
    build_count: u64,
}

impl ManagedGraph {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            inputs: SmallVec::new(),
            live: None,
            dirty: false,
            build_count: 0,
        }
    }

    pub fn state(&self) -> GraphState {
        match (&self.live, self.dirty) {
            (None, _) => GraphState::Absent,
            (Some(_), false) => GraphState::Built,
            (Some(_), true) => GraphState::BuiltDirty,
        }
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            state: self.state(),
            build_count: self.build_count,
            graph_id: self.live.as_ref().map(|l| l.graph.id()),
        }
    }

    /// Drop the live graph; the next `prepare` rebuilds it.
    pub fn teardown(&mut self) {
        if let Some(live) = self.live.take() {
            debug!(graph = live.graph.id(), "Tearing down {} graph", self.label);
        }
        self.dirty = false;
    }

    /// Make the graph ready for `inputs` with `params` applied.
    ///
    /// `describe` produces the graph description and is only called when a
    /// build is needed. On build failure the graph stays absent.
    pub fn prepare(
        &mut self,
        inputs: &[FrameShape],
        params: &[GraphParam],
        describe: impl FnOnce() -> String,
    ) -> Result<()> {
        if self.live.is_some() && self.inputs.as_slice() != inputs {
            debug!("{} graph input changed", self.label);
            self.teardown();
        }
        let Some(live) = self.live.as_mut() else {
            return self.build(inputs, params, describe());
        };

        for param in params {
            let current = live
                .params
                .iter_mut()
                .find(|p| p.target == param.target && p.command == param.command);
            match current {
                Some(current) if current.value == param.value => continue,
                Some(current) => {
                    self.dirty = true;
                    live.graph
                        .send_command(param.target, param.command, &param.value)
                        .map_err(graph_runtime)?;
                    current.value.clone_from(&param.value);
                }
                None => {
                    return Err(VxError::GraphRuntime(format!(
                        "{} graph has no runtime parameter {}.{}",
                        self.label, param.target, param.command
                    )))
                }
            }
        }
        self.dirty = false;
        Ok(())
    }

    fn build(&mut self, inputs: &[FrameShape], params: &[GraphParam], description: String) -> Result<()> {
        let graph = FilterGraph::parse(&description).map_err(graph_build)?;
        let sources = (0..inputs.len())
            .map(|i| graph.source(&format!("in{i}")))
            .collect::<std::result::Result<SmallVec<[NodeId; 2]>, _>>()
            .map_err(graph_build)?;
        let sink = graph.sink("out").map_err(graph_build)?;
        self.build_count += 1;
        debug!(
            graph = graph.id(),
            builds = self.build_count,
            "Built {} graph: {description}",
            self.label
        );
        self.inputs = inputs.iter().copied().collect();
        self.dirty = false;
        self.live = Some(LiveGraph {
            graph,
            sources,
            sink,
            params: params.to_vec(),
        });
        Ok(())
    }

    /// Push one frame per input and pull the result. A failure tears the
    /// graph down so no stale frames stay queued.
    pub fn run(&mut self, frames: Vec<NativeFrame>) -> Result<NativeFrame> {
        let label = self.label;
        let live = self
            .live
            .as_mut()
            .ok_or_else(|| VxError::GraphRuntime(format!("{label} graph is not built")))?;
        if frames.len() != live.sources.len() {
            return Err(VxError::InvalidParameter(format!(
                "{label} graph takes {} frames, got {}",
                live.sources.len(),
                frames.len()
            )));
        }
        let result = (|| {
            for (&source, frame) in live.sources.iter().zip(frames) {
                live.graph.push_frame(source, frame)?;
            }
            live.graph.pull_frame(live.sink)
        })();
        result.map_err(|e| {
            self.teardown();
            graph_runtime(e)
        })
    }
}

impl std::fmt::Debug for ManagedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedGraph")
            .field("label", &self.label)
            .field("stats", &self.stats())
            .finish()
    }
}
