//! # Local Flow Graph Builder
//!
//! Converts a [`MethodBody`] into a Local Flow Graph (LFG): arena-allocated
//! nodes for every definition, use, and sink, with directed edges from each
//! defining node to its consumers. The graph is a pure value structure built
//! once per method, propagated, classified, and discarded.
//!
//! ## Algorithm
//!
//! 1. Validate the control-flow skeleton (dangling edges, unreachable blocks).
//! 2. Allocate one node per parameter and per flow-relevant instruction.
//! 3. Compute reaching definitions per block with iterative gen/kill dataflow.
//! 4. Compute control dependence from postdominators, so branch conditions
//!    feed the definitions they guard (implicit flow: a tainted loop bound
//!    taints loop-carried accumulation).
//! 5. Walk each block wiring def-to-use edges from the reaching-definition
//!    sets, updating them instruction by instruction so an in-block
//!    redefinition kills earlier versions.

use crate::analysis::policy::{CallPolicy, Policy};
use crate::analysis::taint::Taint;
use crate::ir::{BlockId, Instr, MethodBody, Operand, Place, StructureError};
use log::debug;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Index of a node in the graph arena.
pub type NodeId = usize;

/// What a flow node represents at its program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The caller-visible value of a parameter (or the receiver) at method
    /// entry. Never retroactively altered by reassignments inside the body.
    ParamDef,

    /// A new value version of a variable created by an assignment.
    AssignDef,

    /// The bound result of a call, resolved per the call policy.
    CallResult,

    /// A bare use of one or more values, with no definition attached.
    Use,

    /// A branch condition; feeds every node it control-depends.
    BranchCond,

    /// The always-tainted feeder for a local the front-end marked as an
    /// explicit source; joined into every definition of that local.
    MarkedSource,

    /// Data leaving through the return path.
    ReturnSink,

    /// Data leaving through the throw path.
    ThrowSink,

    /// A write to a static field or the receiver, observable outside the
    /// method. Both a definition of the shared identity and a sink.
    SharedWriteSink,

    /// A write to a local the front-end marked as an explicit sink. Both a
    /// definition of the local and a sink.
    MarkedSink,
}

impl NodeKind {
    pub fn is_sink(self) -> bool {
        matches!(
            self,
            NodeKind::ReturnSink
                | NodeKind::ThrowSink
                | NodeKind::SharedWriteSink
                | NodeKind::MarkedSink
        )
    }
}

/// One definition or use of a variable value at one program point.
#[derive(Debug, Clone)]
pub struct FlowNode {
    pub kind: NodeKind,

    /// Variable identity, when the node defines one.
    pub var: Option<String>,

    /// True for definitions whose right-hand side is constant-only. Pinned
    /// Clean during propagation regardless of incoming edges.
    pub constant: bool,

    /// True for nodes whose state is fixed for the whole run: entry
    /// definitions of parameters and the receiver, and the feeders of locals
    /// marked as explicit sources.
    pub pinned: bool,

    /// Current lattice state. Starts at bottom except for sources.
    pub state: Taint,

    /// Source variables known to contribute to this node's value. Nonempty
    /// only when the state is Tainted.
    pub sources: BTreeSet<String>,
}

impl FlowNode {
    fn bottom(kind: NodeKind, var: Option<String>) -> Self {
        Self {
            kind,
            var,
            constant: false,
            pinned: false,
            state: Taint::bottom(),
            sources: BTreeSet::new(),
        }
    }

    fn pin_tainted(&mut self, source: &str) {
        self.pinned = true;
        self.state = Taint::Tainted;
        self.sources.insert(source.to_string());
    }
}

/// The per-method Local Flow Graph.
#[derive(Debug)]
pub struct FlowGraph {
    pub method: String,
    pub call_policy: CallPolicy,
    nodes: Vec<FlowNode>,
    preds: Vec<Vec<NodeId>>,
    succs: Vec<Vec<NodeId>>,
    param_defs: HashMap<String, NodeId>,
}

impl FlowGraph {
    fn new(method: String, call_policy: CallPolicy) -> Self {
        Self {
            method,
            call_policy,
            nodes: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            param_defs: HashMap::new(),
        }
    }

    fn add_node(&mut self, node: FlowNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.preds.push(Vec::new());
        self.succs.push(Vec::new());
        id
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if from == to || self.preds[to].contains(&from) {
            return;
        }
        self.preds[to].push(from);
        self.succs[from].push(to);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &FlowNode {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut FlowNode {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &FlowNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn preds(&self, id: NodeId) -> &[NodeId] {
        &self.preds[id]
    }

    pub fn succs(&self, id: NodeId) -> &[NodeId] {
        &self.succs[id]
    }

    /// The caller-visible definition node of a parameter.
    pub fn param_def(&self, name: &str) -> Option<NodeId> {
        self.param_defs.get(name).copied()
    }

    /// Sink nodes in arena (first-encountered) order.
    pub fn sinks(&self) -> impl Iterator<Item = (NodeId, &FlowNode)> {
        self.nodes().filter(|(_, n)| n.kind.is_sink())
    }
}

/// Reaching-definition sets, one per variable identity.
type DefMap = HashMap<String, BTreeSet<NodeId>>;

/// Builds the LFG for one method under the given policy.
pub fn build(body: &MethodBody, policy: &Policy) -> Result<FlowGraph, StructureError> {
    body.validate()?;

    let nblocks = body.blocks.len();
    let mut bsuccs: Vec<Vec<BlockId>> = vec![Vec::new(); nblocks];
    let mut bpreds: Vec<Vec<BlockId>> = vec![Vec::new(); nblocks];
    for edge in &body.edges {
        bsuccs[edge.from].push(edge.to);
        bpreds[edge.to].push(edge.from);
    }

    let mut graph = FlowGraph::new(body.name.clone(), policy.call_policy);

    for (index, param) in body.params.iter().enumerate() {
        let mut node = FlowNode::bottom(NodeKind::ParamDef, Some(param.name.clone()));
        node.pinned = true;
        if policy.is_source(index, param) {
            node.pin_tainted(&param.name);
        }
        let id = graph.add_node(node);
        graph.param_defs.insert(param.name.clone(), id);
    }

    // Methods that touch the receiver get an entry definition for it, so
    // reads before any in-body write see the caller-provided object.
    if mentions_receiver(body) {
        let key = Place::This.var_key();
        let mut node = FlowNode::bottom(NodeKind::ParamDef, Some(key.clone()));
        node.pinned = true;
        if policy.this_is_source {
            node.pin_tainted(&key);
        }
        let id = graph.add_node(node);
        graph.param_defs.insert(key, id);
    }

    // One pinned feeder per explicitly annotated source local. Every
    // definition of the local joins it in, so the annotation taints all
    // readers without erasing what else flows into the local.
    let mut source_feeds: HashMap<String, NodeId> = HashMap::new();
    for name in &body.marked_sources {
        let mut node = FlowNode::bottom(NodeKind::MarkedSource, Some(name.clone()));
        node.pin_tainted(name);
        let id = graph.add_node(node);
        source_feeds.insert(name.clone(), id);
        graph.param_defs.entry(name.clone()).or_insert(id);
    }

    // One node per flow-relevant instruction, allocated up front so control
    // edges can reference branch conditions in any block. Calls whose result
    // lands in a shared or marked-sink place get a second node: the call
    // result keeps the call-policy transfer, the sink node carries the
    // classification and the destination identity.
    let mut instr_nodes: HashMap<(BlockId, usize), NodeId> = HashMap::new();
    let mut call_sinks: HashMap<(BlockId, usize), NodeId> = HashMap::new();
    let mut branch_conds: HashMap<BlockId, NodeId> = HashMap::new();

    for (b, block) in body.blocks.iter().enumerate() {
        for (i, instr) in block.instrs.iter().enumerate() {
            let node = match instr {
                Instr::Assign { dest, rhs } => {
                    let kind = write_sink_kind(dest, body).unwrap_or(NodeKind::AssignDef);
                    let mut node = FlowNode::bottom(kind, Some(dest.var_key()));
                    // A marked-source destination is never a kill; the feeder
                    // taints it even with a constant right-hand side.
                    node.constant = rhs.iter().all(|op| op.place().is_none())
                        && !is_marked_source(dest, body);
                    Some(node)
                }
                Instr::Call { dest: Some(dest), .. } => {
                    let var = if write_sink_kind(dest, body).is_some() {
                        None
                    } else {
                        Some(dest.var_key())
                    };
                    Some(FlowNode::bottom(NodeKind::CallResult, var))
                }
                Instr::Call { dest: None, .. } => None,
                Instr::Use { operands } if operands.iter().any(|op| op.place().is_some()) => {
                    Some(FlowNode::bottom(NodeKind::Use, None))
                }
                Instr::Use { .. } => None,
                Instr::Branch { cond } if cond.iter().any(|op| op.place().is_some()) => {
                    Some(FlowNode::bottom(NodeKind::BranchCond, None))
                }
                Instr::Branch { .. } => None,
                Instr::Return { value: Some(op) } if op.place().is_some() => {
                    Some(FlowNode::bottom(NodeKind::ReturnSink, None))
                }
                Instr::Return { .. } => None,
                Instr::Throw { value } if value.place().is_some() => {
                    Some(FlowNode::bottom(NodeKind::ThrowSink, None))
                }
                Instr::Throw { .. } => None,
            };

            if let Some(node) = node {
                let is_cond = node.kind == NodeKind::BranchCond;
                let id = graph.add_node(node);
                instr_nodes.insert((b, i), id);
                if is_cond {
                    branch_conds.insert(b, id);
                }

                if let Instr::Call { dest: Some(dest), .. } = instr {
                    if let Some(kind) = write_sink_kind(dest, body) {
                        let sink =
                            graph.add_node(FlowNode::bottom(kind, Some(dest.var_key())));
                        graph.add_edge(id, sink);
                        call_sinks.insert((b, i), sink);
                    }
                }
            }
        }
    }

    let (r_in, _) =
        reaching_definitions(body, &graph, &instr_nodes, &call_sinks, &bpreds, &bsuccs);
    let controllers = control_dependence(nblocks, &bsuccs, &branch_conds);

    // Second walk: wire operand edges against the running definition map so
    // in-block redefinitions kill earlier versions.
    for (b, block) in body.blocks.iter().enumerate() {
        let mut defs = r_in[b].clone();

        for (i, instr) in block.instrs.iter().enumerate() {
            let id = match instr_nodes.get(&(b, i)) {
                Some(&id) => id,
                None => continue,
            };

            match instr {
                Instr::Assign { dest, rhs } => {
                    if !graph.node(id).constant {
                        for op in rhs {
                            wire_operand(&mut graph, &defs, op, id);
                        }
                        wire_control(&mut graph, &controllers[b], id);
                    }
                    if let Some(&feed) = source_feeds.get(&dest.var_key()) {
                        graph.add_edge(feed, id);
                    }
                    defs.insert(dest.var_key(), BTreeSet::from([id]));
                }
                Instr::Call { dest, args, callee } => {
                    for op in args {
                        wire_operand(&mut graph, &defs, op, id);
                    }
                    wire_control(&mut graph, &controllers[b], id);
                    debug!(
                        "{}: call to `{}` resolved by {:?} policy",
                        body.name, callee, policy.call_policy
                    );
                    if let Some(dest) = dest {
                        if let Some(&feed) = source_feeds.get(&dest.var_key()) {
                            graph.add_edge(feed, id);
                        }
                        // A shared or marked-sink destination defines through
                        // the sink node, not the bare call result.
                        let def = call_sinks.get(&(b, i)).copied().unwrap_or(id);
                        if def != id {
                            wire_control(&mut graph, &controllers[b], def);
                        }
                        defs.insert(dest.var_key(), BTreeSet::from([def]));
                    }
                }
                Instr::Use { operands } => {
                    for op in operands {
                        wire_operand(&mut graph, &defs, op, id);
                    }
                    wire_control(&mut graph, &controllers[b], id);
                }
                Instr::Branch { cond } => {
                    for op in cond {
                        wire_operand(&mut graph, &defs, op, id);
                    }
                    wire_control(&mut graph, &controllers[b], id);
                }
                Instr::Return { value: Some(op) } => {
                    wire_operand(&mut graph, &defs, op, id);
                    wire_control(&mut graph, &controllers[b], id);
                }
                Instr::Throw { value } => {
                    wire_operand(&mut graph, &defs, value, id);
                    wire_control(&mut graph, &controllers[b], id);
                }
                Instr::Return { value: None } => {}
            }
        }
    }

    debug!(
        "{}: built LFG with {} nodes over {} blocks",
        body.name,
        graph.len(),
        nblocks
    );

    Ok(graph)
}

/// The sink kind a write to `dest` produces, if any.
fn write_sink_kind(dest: &Place, body: &MethodBody) -> Option<NodeKind> {
    if dest.is_shared() {
        Some(NodeKind::SharedWriteSink)
    } else if matches!(dest, Place::Local(name) if body.marked_sinks.contains(name)) {
        Some(NodeKind::MarkedSink)
    } else {
        None
    }
}

/// Whether `dest` is a local the front-end marked as an explicit source.
fn is_marked_source(dest: &Place, body: &MethodBody) -> bool {
    matches!(dest, Place::Local(name) if body.marked_sources.contains(name))
}

fn mentions_receiver(body: &MethodBody) -> bool {
    let reads_this = |ops: &[Operand]| ops.iter().any(|op| matches!(op.place(), Some(Place::This)));
    body.blocks.iter().flat_map(|b| &b.instrs).any(|instr| match instr {
        Instr::Assign { dest, rhs } => matches!(dest, Place::This) || reads_this(rhs),
        Instr::Call { dest, args, .. } => {
            matches!(dest, Some(Place::This)) || reads_this(args)
        }
        Instr::Use { operands } => reads_this(operands),
        Instr::Branch { cond } => reads_this(cond),
        Instr::Return { value } => {
            matches!(value, Some(Operand::Place(Place::This)))
        }
        Instr::Throw { value } => matches!(value, Operand::Place(Place::This)),
    })
}

fn wire_operand(graph: &mut FlowGraph, defs: &DefMap, op: &Operand, consumer: NodeId) {
    let place = match op.place() {
        Some(p) => p,
        None => return,
    };
    match defs.get(&place.var_key()) {
        Some(reaching) => {
            for &def in reaching {
                graph.add_edge(def, consumer);
            }
        }
        None => {
            // Read with no reaching definition: statics written elsewhere
            // and front-end oddities land here. Contributes bottom.
            debug!(
                "{}: `{}` read with no reaching definition",
                graph.method,
                place.var_key()
            );
        }
    }
}

fn wire_control(graph: &mut FlowGraph, controllers: &[NodeId], consumer: NodeId) {
    for &cond in controllers {
        graph.add_edge(cond, consumer);
    }
}

/// Iterative gen/kill reaching-definitions over the block graph.
///
/// Returns block-entry and block-exit definition maps. Parameters reach the
/// entry block; a definition kills every earlier version of its variable.
fn reaching_definitions(
    body: &MethodBody,
    graph: &FlowGraph,
    instr_nodes: &HashMap<(BlockId, usize), NodeId>,
    call_sinks: &HashMap<(BlockId, usize), NodeId>,
    bpreds: &[Vec<BlockId>],
    bsuccs: &[Vec<BlockId>],
) -> (Vec<DefMap>, Vec<DefMap>) {
    let nblocks = body.blocks.len();

    // Last definition of each variable per block, and the kill set. A call
    // writing through a sink node defines via the sink.
    let mut gen: Vec<HashMap<String, NodeId>> = vec![HashMap::new(); nblocks];
    for (b, block) in body.blocks.iter().enumerate() {
        for (i, instr) in block.instrs.iter().enumerate() {
            let dest = match instr {
                Instr::Assign { dest, .. } => Some(dest),
                Instr::Call {
                    dest: Some(dest), ..
                } => Some(dest),
                _ => None,
            };
            let def = call_sinks
                .get(&(b, i))
                .or_else(|| instr_nodes.get(&(b, i)));
            if let (Some(dest), Some(&id)) = (dest, def) {
                gen[b].insert(dest.var_key(), id);
            }
        }
    }

    let mut entry: DefMap = HashMap::new();
    for (name, &id) in &graph.param_defs {
        entry.insert(name.clone(), BTreeSet::from([id]));
    }

    let mut r_in: Vec<DefMap> = vec![HashMap::new(); nblocks];
    let mut r_out: Vec<DefMap> = vec![HashMap::new(); nblocks];

    let mut work: VecDeque<BlockId> = (0..nblocks).collect();
    while let Some(b) = work.pop_front() {
        let mut inb: DefMap = if b == 0 { entry.clone() } else { HashMap::new() };
        for &p in &bpreds[b] {
            for (var, defs) in &r_out[p] {
                inb.entry(var.clone()).or_default().extend(defs.iter().copied());
            }
        }

        let mut outb = inb.clone();
        for (var, &id) in &gen[b] {
            outb.insert(var.clone(), BTreeSet::from([id]));
        }

        r_in[b] = inb;
        if outb != r_out[b] {
            r_out[b] = outb;
            for &s in &bsuccs[b] {
                if !work.contains(&s) {
                    work.push_back(s);
                }
            }
        }
    }

    (r_in, r_out)
}

/// Control dependence per block: the branch-condition nodes whose outcome
/// decides whether the block executes.
///
/// Classic postdominator formulation: block X is control-dependent on a
/// branch block B when X postdominates some successor of B but does not
/// postdominate B itself (a loop header may control itself).
fn control_dependence(
    nblocks: usize,
    bsuccs: &[Vec<BlockId>],
    branch_conds: &HashMap<BlockId, NodeId>,
) -> Vec<Vec<NodeId>> {
    let postdom = postdominators(nblocks, bsuccs);

    let mut controllers: Vec<Vec<NodeId>> = vec![Vec::new(); nblocks];
    for (b, succs) in bsuccs.iter().enumerate() {
        let cond = match branch_conds.get(&b) {
            Some(&cond) if succs.len() >= 2 => cond,
            _ => continue,
        };
        for &s in succs {
            for &x in &postdom[s] {
                if x >= nblocks {
                    continue;
                }
                if (x == b || !postdom[b].contains(&x)) && !controllers[x].contains(&cond) {
                    controllers[x].push(cond);
                }
            }
        }
    }
    controllers
}

/// Postdominator sets over the block graph, with a virtual exit adjoined to
/// every block that has no successors.
fn postdominators(nblocks: usize, bsuccs: &[Vec<BlockId>]) -> Vec<BTreeSet<BlockId>> {
    let exit = nblocks;
    let all: BTreeSet<BlockId> = (0..=nblocks).collect();

    let mut pd: Vec<BTreeSet<BlockId>> = vec![all; nblocks + 1];
    pd[exit] = BTreeSet::from([exit]);

    let mut changed = true;
    while changed {
        changed = false;
        for b in 0..nblocks {
            let succs: Vec<BlockId> = if bsuccs[b].is_empty() {
                vec![exit]
            } else {
                bsuccs[b].clone()
            };

            let mut next: Option<BTreeSet<BlockId>> = None;
            for s in succs {
                next = Some(match next {
                    None => pd[s].clone(),
                    Some(acc) => acc.intersection(&pd[s]).copied().collect(),
                });
            }
            let mut next = next.unwrap_or_default();
            next.insert(b);

            if next != pd[b] {
                pd[b] = next;
                changed = true;
            }
        }
    }

    pd
}
