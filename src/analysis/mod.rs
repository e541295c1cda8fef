//! # Analysis Module
//!
//! The per-method information-flow pipeline: build the Local Flow Graph,
//! propagate taint to a fixed point, classify tainted sinks into findings.
//!
//! ## Components
//!
//! - **Flow Graph Builder** ([`lfg`]): method body -> LFG with data and
//!   control-dependence edges
//! - **Propagation Engine** ([`taint`]): worklist fixed point over the
//!   Unknown/Clean/Tainted lattice
//! - **Policy** ([`policy`]): source/sink/call-site configuration
//!
//! Per-method analysis is pure and shares no state, so batches run in
//! parallel; each worker returns its local finding list and a single writer
//! aggregates them in input order.

pub mod lfg;
pub mod policy;
pub mod taint;

pub use lfg::{FlowGraph, FlowNode, NodeId, NodeKind};
pub use policy::{CallPolicy, Policy, SourceSpec};
pub use taint::{PropagationStats, Taint};

use crate::ir::{MethodBody, StructureError};
use crate::report::{Finding, Report, SinkCategory};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use thiserror::Error;

/// Why a single method's analysis was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("method `{method}`: propagation exceeded {cap} worklist steps without reaching a fixed point")]
    IterationCap { method: String, cap: usize },
}

/// Enumerates tainted sinks of a fixed-point graph as findings.
///
/// One finding per (source variable, sink) pair, deduplicated by key, so
/// multiple paths between the same pair collapse here and not just at the
/// report boundary. Sink categories the policy filters out are skipped
/// entirely.
pub fn classify(graph: &FlowGraph, policy: &Policy) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut seen = HashSet::new();

    for (_, node) in graph.sinks() {
        if node.state != Taint::Tainted {
            continue;
        }

        let (category, sink) = match node.kind {
            NodeKind::ReturnSink => (SinkCategory::ExternalOutput, "<return>".to_string()),
            NodeKind::ThrowSink => (SinkCategory::ExternalOutput, "<throw>".to_string()),
            NodeKind::SharedWriteSink => {
                (SinkCategory::SharedState, node.var.clone().unwrap_or_default())
            }
            NodeKind::MarkedSink => {
                (SinkCategory::Annotated, node.var.clone().unwrap_or_default())
            }
            _ => continue,
        };

        let reportable = match category {
            SinkCategory::ExternalOutput => policy.report_external_output,
            SinkCategory::SharedState => policy.report_shared_state,
            SinkCategory::Annotated => policy.report_annotated,
        };
        if !reportable {
            continue;
        }

        for source in &node.sources {
            let finding = Finding::leak(&graph.method, source, &sink, category);
            if seen.insert(finding.key()) {
                findings.push(finding);
            }
        }
    }

    findings
}

/// Runs the full pipeline on one method.
pub fn analyze_method(body: &MethodBody, policy: &Policy) -> Result<Vec<Finding>, AnalysisError> {
    let mut graph = lfg::build(body, policy)?;
    let cap = policy.step_cap(graph.len());
    let stats = taint::propagate(&mut graph, cap)?;
    debug!(
        "{}: {} nodes, fixed point in {} steps",
        body.name,
        graph.len(),
        stats.steps
    );
    Ok(classify(&graph, policy))
}

/// Analyzes a batch of methods in parallel.
///
/// Workers carry no shared analyzer state; their finding lists are appended
/// into the report sequentially in input order, so output is deterministic.
/// A malformed method becomes a structural-error finding and the rest of the
/// batch continues.
pub fn analyze_batch(methods: &[MethodBody], policy: &Policy) -> Report {
    let results: Vec<(String, Result<Vec<Finding>, AnalysisError>)> = methods
        .par_iter()
        .map(|m| (m.name.clone(), analyze_method(m, policy)))
        .collect();

    let mut report = Report::new();
    for (method, result) in results {
        match result {
            Ok(findings) => {
                for finding in findings {
                    report.append(finding);
                }
            }
            Err(err) => {
                warn!("skipping `{}`: {}", method, err);
                report.append(Finding::structural(&method, &err.to_string()));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, CfgEdge, Instr, Operand, Param, Place};
    use crate::report::FindingKind;

    fn param(name: &str) -> Param {
        Param {
            name: name.to_string(),
            ty: "int".to_string(),
        }
    }

    fn return_param(name: &str, p: &str) -> MethodBody {
        MethodBody {
            name: name.to_string(),
            params: vec![param(p)],
            blocks: vec![BasicBlock {
                instrs: vec![Instr::Return {
                    value: Some(Operand::Place(Place::Param(p.to_string()))),
                }],
            }],
            edges: vec![],
            marked_sources: vec![],
            marked_sinks: vec![],
        }
    }

    #[test]
    fn distinct_sources_produce_distinct_findings() {
        // return x + y
        let body = MethodBody {
            name: "sum".to_string(),
            params: vec![param("x"), param("y")],
            blocks: vec![BasicBlock {
                instrs: vec![
                    Instr::Assign {
                        dest: Place::Local("s".to_string()),
                        rhs: vec![
                            Operand::Place(Place::Param("x".to_string())),
                            Operand::Place(Place::Param("y".to_string())),
                        ],
                    },
                    Instr::Return {
                        value: Some(Operand::Place(Place::Local("s".to_string()))),
                    },
                ],
            }],
            edges: vec![],
            marked_sources: vec![],
            marked_sinks: vec![],
        };

        let findings = analyze_method(&body, &Policy::default()).unwrap();
        let sources: Vec<_> = findings
            .iter()
            .filter_map(|f| match &f.kind {
                FindingKind::Leak { source, .. } => Some(source.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sources, vec!["x", "y"]);
    }

    #[test]
    fn sink_category_filter_suppresses_findings() {
        let policy = Policy {
            report_external_output: false,
            ..Policy::default()
        };
        let findings = analyze_method(&return_param("m", "x"), &policy).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn malformed_method_does_not_poison_the_batch() {
        let broken = MethodBody {
            name: "broken".to_string(),
            params: vec![],
            blocks: vec![],
            edges: vec![],
            marked_sources: vec![],
            marked_sinks: vec![],
        };
        let batch = vec![broken, return_param("fine", "x")];

        let mut report = analyze_batch(&batch, &Policy::default());
        let findings = report.drain();

        assert_eq!(findings.len(), 2);
        assert!(matches!(
            findings[0].kind,
            FindingKind::StructuralError { .. }
        ));
        assert!(matches!(findings[1].kind, FindingKind::Leak { .. }));
        assert_eq!(findings[1].method, "fine");
    }
}
