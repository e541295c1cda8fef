//! # Leakscope Library
//!
//! The analysis core of an information-flow checker: detects potential
//! leakage of sensitive data (values entering a method through source
//! parameters) to observable sinks — return values, thrown exceptions, and
//! static/shared-state writes — through a method's control and data flow.
//!
//! The library does not parse source code. An external front-end hands it
//! already-lowered method bodies (basic blocks, tagged instructions, a
//! control-flow edge list); the analyzer builds a per-method Local Flow
//! Graph, propagates taint to a fixed point, and reports source-to-sink
//! findings.
//!
//! ## Modules
//!
//! - [`ir`] - The method-body input contract
//! - [`analysis`] - Flow graph builder, taint lattice, propagation engine
//! - [`report`] - Finding accumulation and presentation
//! - [`cli`] - Command-line interface definitions
//!
//! ## Example
//!
//! ```rust
//! use leakscope::{analyze_batch, Policy};
//! use leakscope::ir::{BasicBlock, Instr, MethodBody, Operand, Param, Place};
//!
//! let body = MethodBody {
//!     name: "paramToReturn".to_string(),
//!     params: vec![Param { name: "x".to_string(), ty: "int".to_string() }],
//!     blocks: vec![BasicBlock {
//!         instrs: vec![Instr::Return {
//!             value: Some(Operand::Place(Place::Param("x".to_string()))),
//!         }],
//!     }],
//!     edges: vec![],
//!     marked_sources: vec![],
//!     marked_sinks: vec![],
//! };
//!
//! let report = analyze_batch(&[body], &Policy::default());
//! assert_eq!(report.len(), 1);
//! ```

pub mod analysis;
pub mod cli;
pub mod ir;
pub mod report;

pub use analysis::{
    analyze_batch, analyze_method, AnalysisError, CallPolicy, Policy, SourceSpec, Taint,
};
pub use cli::Cli;
pub use ir::{Batch, MethodBody};
pub use report::{Finding, FindingKind, Report, SinkCategory};
