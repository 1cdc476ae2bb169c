//! Filter graphs built from a textual description.
//!
//! Nodes are connected by links that carry a negotiated [`LinkFormat`] and a
//! frame queue. Frames enter through `buffer` sources and leave through
//! `buffersink` sinks. Configuration runs nodes in topological order so every
//! node sees its input formats before it chooses its output format.

pub mod filter;
pub mod parser;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{NativeError, Result};
use crate::frame::NativeFrame;

pub use filter::{registry, Filter, FilterArgs, FilterDefinition, FilterRegistry, LinkFormat};
pub use parser::{FilterArg, FilterSpec};

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Index of a node inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

struct Node {
    instance: String,
    filter: Box<dyn Filter>,
    inputs: Vec<Option<usize>>,
    outputs: Vec<Option<usize>>,
}

struct Link {
    src: usize,
    dst: usize,
    format: Option<LinkFormat>,
    queue: VecDeque<NativeFrame>,
}

/// A configured graph of filters.
pub struct FilterGraph {
    id: u64,
    nodes: Vec<Node>,
    links: Vec<Link>,
    order: Vec<usize>,
}

impl FilterGraph {
    /// Parse `description`, instantiate its filters from the global registry
    /// and configure the graph.
    pub fn parse(description: &str) -> Result<Self> {
        Self::parse_with(crate::graph::registry(), description)
    }

    /// Like [`FilterGraph::parse`] with an explicit registry.
    pub fn parse_with(registry: &FilterRegistry, description: &str) -> Result<Self> {
        let chains = parser::parse(description)?;
        let mut graph = Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            links: Vec::new(),
            order: Vec::new(),
        };
        let mut open_outputs: HashMap<String, (usize, usize)> = HashMap::new();
        let mut open_inputs: HashMap<String, (usize, usize)> = HashMap::new();

        for chain in &chains {
            let mut previous: Option<(usize, usize)> = None;
            for parsed in chain {
                let filter = registry.create(&parsed.name, &parsed.args)?;
                let index = graph.nodes.len();
                let instance = parsed
                    .instance
                    .clone()
                    .unwrap_or_else(|| format!("Parsed_{}_{index}", parsed.name));
                if graph.nodes.iter().any(|n| n.instance == instance) {
                    return Err(NativeError::InvalidArgument(format!(
                        "duplicate filter instance '{instance}'"
                    )));
                }
                graph.nodes.push(Node {
                    instance,
                    inputs: vec![None; filter.nb_inputs()],
                    outputs: vec![None; filter.nb_outputs()],
                    filter,
                });

                if parsed.inputs.len() > graph.nodes[index].inputs.len() {
                    return Err(NativeError::InvalidArgument(format!(
                        "{} has {} inputs, {} labels given",
                        parsed.name,
                        graph.nodes[index].inputs.len(),
                        parsed.inputs.len()
                    )));
                }
                for (pad, label) in parsed.inputs.iter().enumerate() {
                    match open_outputs.remove(label) {
                        Some((src, src_pad)) => graph.connect(src, src_pad, index, pad),
                        None => {
                            if open_inputs.insert(label.clone(), (index, pad)).is_some() {
                                return Err(NativeError::InvalidArgument(format!(
                                    "label '{label}' used by two inputs"
                                )));
                            }
                        }
                    }
                }
                if let Some((prev, first_free)) = previous {
                    let src_pad = (first_free..graph.nodes[prev].outputs.len())
                        .find(|&p| graph.nodes[prev].outputs[p].is_none());
                    let dst_pad = (parsed.inputs.len()..graph.nodes[index].inputs.len())
                        .find(|&p| graph.nodes[index].inputs[p].is_none());
                    match (src_pad, dst_pad) {
                        (Some(sp), Some(dp)) => graph.connect(prev, sp, index, dp),
                        _ => {
                            return Err(NativeError::InvalidArgument(format!(
                                "cannot chain {} into {}",
                                graph.nodes[prev].instance, graph.nodes[index].instance
                            )))
                        }
                    }
                }
                previous = None;
                if parsed.outputs.len() > graph.nodes[index].outputs.len() {
                    return Err(NativeError::InvalidArgument(format!(
                        "{} has {} outputs, {} labels given",
                        parsed.name,
                        graph.nodes[index].outputs.len(),
                        parsed.outputs.len()
                    )));
                }
                for (pad, label) in parsed.outputs.iter().enumerate() {
                    match open_inputs.remove(label) {
                        Some((dst, dst_pad)) => graph.connect(index, pad, dst, dst_pad),
                        None => {
                            if open_outputs.insert(label.clone(), (index, pad)).is_some() {
                                return Err(NativeError::InvalidArgument(format!(
                                    "label '{label}' used by two outputs"
                                )));
                            }
                        }
                    }
                }
                if parsed.outputs.len() < graph.nodes[index].outputs.len() {
                    previous = Some((index, parsed.outputs.len()));
                }
            }
            if let Some((last, _)) = previous {
                return Err(NativeError::GraphConfig(format!(
                    "output of {} is not connected",
                    graph.nodes[last].instance
                )));
            }
        }
        if let Some(label) = open_inputs.keys().chain(open_outputs.keys()).next() {
            return Err(NativeError::GraphConfig(format!("label '{label}' is not connected")));
        }
        graph.config()?;
        tracing::debug!(
            graph = graph.id,
            nodes = graph.nodes.len(),
            "Configured filter graph: {description}"
        );
        Ok(graph)
    }

    fn connect(&mut self, src: usize, src_pad: usize, dst: usize, dst_pad: usize) {
        let link = self.links.len();
        self.links.push(Link {
            src,
            dst,
            format: None,
            queue: VecDeque::new(),
        });
        self.nodes[src].outputs[src_pad] = Some(link);
        self.nodes[dst].inputs[dst_pad] = Some(link);
    }

    /// Check connectivity, order nodes and negotiate link formats.
    pub fn config(&mut self) -> Result<()> {
        for node in &self.nodes {
            if node.inputs.iter().chain(node.outputs.iter()).any(Option::is_none) {
                return Err(NativeError::GraphConfig(format!(
                    "{} has unconnected pads",
                    node.instance
                )));
            }
        }
        self.order = self.topological_sort().ok_or_else(|| {
            NativeError::GraphConfig("filter graph contains a cycle".into())
        })?;
        self.negotiate()
    }

    /// Kahn's algorithm; `None` if the graph has a cycle.
    fn topological_sort(&self) -> Option<Vec<usize>> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.inputs.len()).collect();
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            result.push(id);
            for link in self.nodes[id].outputs.iter().flatten() {
                let dst = self.links[*link].dst;
                in_degree[dst] -= 1;
                if in_degree[dst] == 0 {
                    queue.push_back(dst);
                }
            }
        }
        (result.len() == self.nodes.len()).then_some(result)
    }

    fn negotiate(&mut self) -> Result<()> {
        for &id in &self.order {
            let inputs: Vec<LinkFormat> = self.nodes[id]
                .inputs
                .iter()
                .flatten()
                .map(|&l| {
                    self.links[l].format.ok_or_else(|| {
                        NativeError::GraphConfig(format!("link {l} has no format"))
                    })
                })
                .collect::<Result<_>>()?;
            let node = &mut self.nodes[id];
            let out = node.filter.configure(&inputs).map_err(|e| match e {
                NativeError::GraphConfig(m) => NativeError::GraphConfig(m),
                other => NativeError::GraphConfig(format!("{}: {other}", node.instance)),
            })?;
            for &l in node.outputs.iter().flatten() {
                self.links[l].format = Some(out);
            }
        }
        Ok(())
    }

    // ── Introspection ──────────────────────────────────────────────

    /// Process-unique identity of this graph.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn find(&self, instance: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.instance == instance)
            .map(NodeId)
    }

    /// Handle of a source node by instance name.
    pub fn source(&self, instance: &str) -> Result<NodeId> {
        match self.find(instance) {
            Some(id) if self.nodes[id.0].inputs.is_empty() => Ok(id),
            Some(_) => Err(NativeError::InvalidArgument(format!("'{instance}' is not a source"))),
            None => Err(NativeError::FilterNotFound(instance.to_string())),
        }
    }

    /// Handle of a sink node by instance name.
    pub fn sink(&self, instance: &str) -> Result<NodeId> {
        match self.find(instance) {
            Some(id) if self.nodes[id.0].outputs.is_empty() => Ok(id),
            Some(_) => Err(NativeError::InvalidArgument(format!("'{instance}' is not a sink"))),
            None => Err(NativeError::FilterNotFound(instance.to_string())),
        }
    }

    /// Format produced by a node (for sinks, the format they receive).
    pub fn output_format(&self, node: NodeId) -> Option<LinkFormat> {
        let n = self.nodes.get(node.0)?;
        let link = n.outputs.first().or_else(|| n.inputs.first())?.as_ref()?;
        self.links[*link].format
    }

    // ── Frame I/O ──────────────────────────────────────────────────

    /// Feed a frame into a source node.
    pub fn push_frame(&mut self, source: NodeId, frame: NativeFrame) -> Result<()> {
        let node = self
            .nodes
            .get_mut(source.0)
            .filter(|n| n.inputs.is_empty())
            .ok_or_else(|| NativeError::InvalidArgument(format!("node {} is not a source", source.0)))?;
        let frame = node.filter.filter_frame(vec![frame])?;
        if let Some(&Some(link)) = node.outputs.first() {
            self.links[link].queue.push_back(frame);
        }
        Ok(())
    }

    /// Take the next frame available at a sink, running the graph as far as
    /// the queued input allows. Returns [`NativeError::Again`] when no frame
    /// is ready yet.
    pub fn pull_frame(&mut self, sink: NodeId) -> Result<NativeFrame> {
        let link = match self.nodes.get(sink.0) {
            Some(n) if n.outputs.is_empty() => n.inputs.first().copied().flatten(),
            _ => {
                return Err(NativeError::InvalidArgument(format!(
                    "node {} is not a sink",
                    sink.0
                )))
            }
        };
        self.run()?;
        let link = link.ok_or_else(|| NativeError::GraphConfig("sink has no input".into()))?;
        self.links[link].queue.pop_front().ok_or(NativeError::Again)
    }

    fn run(&mut self) -> Result<()> {
        for i in 0..self.order.len() {
            let id = self.order[i];
            let node = &self.nodes[id];
            if node.inputs.is_empty() || node.outputs.is_empty() {
                continue;
            }
            loop {
                let node = &self.nodes[id];
                let ready = node
                    .inputs
                    .iter()
                    .flatten()
                    .all(|&l| !self.links[l].queue.is_empty());
                if !ready {
                    break;
                }
                let input_links: Vec<usize> = node.inputs.iter().flatten().copied().collect();
                let frames: Vec<NativeFrame> = input_links
                    .iter()
                    .filter_map(|&l| self.links[l].queue.pop_front())
                    .collect();
                let node = &mut self.nodes[id];
                let out = node.filter.filter_frame(frames)?;
                if let Some(&Some(link)) = node.outputs.first() {
                    self.links[link].queue.push_back(out);
                }
            }
        }
        Ok(())
    }

    // ── Runtime commands ───────────────────────────────────────────

    /// Send a command to every node matching `target` (an instance name, a
    /// filter name or `all`) and renegotiate link formats.
    ///
    /// Returns the number of nodes that accepted the command.
    pub fn send_command(&mut self, target: &str, cmd: &str, arg: &str) -> Result<usize> {
        let mut matched = 0;
        let mut accepted = 0;
        let mut last_error = None;
        for node in self.nodes.iter_mut() {
            if target != "all" && node.instance != target && node.filter.name() != target {
                continue;
            }
            matched += 1;
            match node.filter.process_command(cmd, arg) {
                Ok(()) => accepted += 1,
                Err(NativeError::NotSupported(m)) => last_error = Some(NativeError::NotSupported(m)),
                Err(e) => return Err(e),
            }
        }
        if matched == 0 {
            return Err(NativeError::FilterNotFound(target.to_string()));
        }
        if accepted == 0 {
            return Err(last_error.unwrap_or_else(|| {
                NativeError::NotSupported(format!("command '{cmd}' for '{target}'"))
            }));
        }
        self.negotiate()?;
        tracing::debug!(graph = self.id, "Command {target} {cmd}={arg} applied to {accepted} node(s)");
        Ok(accepted)
    }
}

impl std::fmt::Debug for FilterGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterGraph")
            .field("id", &self.id)
            .field(
                "nodes",
                &self.nodes.iter().map(|n| n.instance.as_str()).collect::<Vec<_>>(),
            )
            .field(
                "links",
                &self.links.iter().map(|l| (l.src, l.dst)).collect::<Vec<_>>(),
            )
            .finish()
    }
}
