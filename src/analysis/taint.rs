//! # Taint Lattice & Propagation Engine
//!
//! Assigns every LFG node a taint state and propagates along edges until a
//! fixed point.
//!
//! ## Lattice
//!
//! Three points with Unknown at the bottom:
//!
//! ```text
//! Unknown ⊑ Clean ⊑ Tainted
//! ```
//!
//! `join(Tainted, _) = Tainted`, `join(Clean, Clean) = Clean`, and Unknown
//! joins upward on first real information. Alongside the state each node
//! carries the set of source parameters that contributed taint, unioned at
//! joins, so the classifier can attribute findings.
//!
//! ## Algorithm
//!
//! Worklist seeded with every node. Popping a node recomputes it as the join
//! of its operand nodes (constant definitions stay Clean, call results apply
//! the call policy); a change re-enqueues the successors. The lattice is
//! finite and every transfer is monotone, so the iteration terminates without
//! special-casing loop back-edges — the worklist simply revisits a loop body
//! until carried values converge. A step cap guards against builder defects.

use super::lfg::{FlowGraph, NodeKind};
use super::policy::CallPolicy;
use super::AnalysisError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// The taint state of one flow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Taint {
    /// Bottom: no information yet.
    Unknown = 0,

    /// Definitely derived from constants and trusted values only.
    Clean = 1,

    /// Top: may derive from a sensitive source.
    Tainted = 2,
}

impl Taint {
    /// Lattice join (least upper bound).
    pub fn join(self, other: Self) -> Self {
        self.max(other)
    }

    /// The bottom element.
    pub fn bottom() -> Self {
        Taint::Unknown
    }
}

/// Outcome of a propagation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationStats {
    /// Worklist pops performed before reaching the fixed point.
    pub steps: usize,

    /// Node recomputations that actually changed a state.
    pub changes: usize,
}

/// Propagates taint over `graph` until no node changes.
///
/// `step_cap` bounds worklist pops; exceeding it aborts the method with a
/// diagnostic instead of looping forever on a defective graph.
pub fn propagate(graph: &mut FlowGraph, step_cap: usize) -> Result<PropagationStats, AnalysisError> {
    let mut work: VecDeque<usize> = (0..graph.len()).collect();
    let mut queued = vec![true; graph.len()];
    let mut stats = PropagationStats { steps: 0, changes: 0 };

    while let Some(id) = work.pop_front() {
        queued[id] = false;
        stats.steps += 1;
        if stats.steps > step_cap {
            return Err(AnalysisError::IterationCap {
                method: graph.method.clone(),
                cap: step_cap,
            });
        }

        let (state, sources) = transfer(graph, id);
        let node = graph.node(id);
        if state == node.state && sources == node.sources {
            continue;
        }

        let node = graph.node_mut(id);
        node.state = state;
        node.sources = sources;
        stats.changes += 1;

        for s in 0..graph.succs(id).len() {
            let succ = graph.succs(id)[s];
            if !queued[succ] {
                queued[succ] = true;
                work.push_back(succ);
            }
        }
    }

    debug!(
        "{}: fixed point after {} steps ({} changes)",
        graph.method, stats.steps, stats.changes
    );

    Ok(stats)
}

/// Recomputes one node from its operands. Pure with respect to the graph.
fn transfer(graph: &FlowGraph, id: usize) -> (Taint, BTreeSet<String>) {
    let node = graph.node(id);

    // Pinned nodes (entry definitions, explicit-source feeders) hold their
    // builder-assigned state for the whole run; redefinitions under the same
    // identity are separate nodes.
    if node.pinned {
        return (node.state, node.sources.clone());
    }

    // Constant-only definitions overwrite prior taint outright.
    if node.constant {
        return (Taint::Clean, BTreeSet::new());
    }

    let mut state = Taint::bottom();
    let mut sources = BTreeSet::new();
    for &pred in graph.preds(id) {
        let p = graph.node(pred);
        state = state.join(p.state);
        sources.extend(p.sources.iter().cloned());
    }

    if node.kind == NodeKind::CallResult && graph.call_policy == CallPolicy::Conservative {
        // Without a summary the callee could do anything with clean inputs;
        // only a tainted argument forces a tainted result.
        if state != Taint::Tainted {
            state = Taint::bottom();
            sources.clear();
        }
    }

    (state, sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::lfg;
    use crate::analysis::policy::Policy;
    use crate::ir::{BasicBlock, Instr, MethodBody, Operand, Param, Place};

    #[test]
    fn join_is_monotone_upward() {
        assert_eq!(Taint::Unknown.join(Taint::Unknown), Taint::Unknown);
        assert_eq!(Taint::Unknown.join(Taint::Clean), Taint::Clean);
        assert_eq!(Taint::Clean.join(Taint::Clean), Taint::Clean);
        assert_eq!(Taint::Tainted.join(Taint::Clean), Taint::Tainted);
        assert_eq!(Taint::Unknown.join(Taint::Tainted), Taint::Tainted);
    }

    fn pass_through() -> MethodBody {
        MethodBody {
            name: "passThrough".to_string(),
            params: vec![Param {
                name: "x".to_string(),
                ty: "int".to_string(),
            }],
            blocks: vec![BasicBlock {
                instrs: vec![Instr::Return {
                    value: Some(Operand::Place(Place::Param("x".to_string()))),
                }],
            }],
            edges: vec![],
            marked_sources: vec![],
            marked_sinks: vec![],
        }
    }

    #[test]
    fn taint_reaches_return_sink() {
        let mut graph = lfg::build(&pass_through(), &Policy::default()).unwrap();
        propagate(&mut graph, 1000).unwrap();

        let (_, sink) = graph.sinks().next().unwrap();
        assert_eq!(sink.state, Taint::Tainted);
        assert!(sink.sources.contains("x"));
    }

    #[test]
    fn fixed_point_is_idempotent() {
        let mut graph = lfg::build(&pass_through(), &Policy::default()).unwrap();
        propagate(&mut graph, 1000).unwrap();

        let before: Vec<_> = graph
            .nodes()
            .map(|(_, n)| (n.state, n.sources.clone()))
            .collect();

        let stats = propagate(&mut graph, 1000).unwrap();
        let after: Vec<_> = graph
            .nodes()
            .map(|(_, n)| (n.state, n.sources.clone()))
            .collect();

        assert_eq!(before, after);
        assert_eq!(stats.changes, 0);
        // The re-run drains the seed queue exactly once per node.
        assert_eq!(stats.steps, graph.len());
    }

    #[test]
    fn step_cap_aborts_instead_of_diverging() {
        let mut graph = lfg::build(&pass_through(), &Policy::default()).unwrap();
        let err = propagate(&mut graph, 1).unwrap_err();
        assert!(matches!(err, AnalysisError::IterationCap { cap: 1, .. }));
    }
}
