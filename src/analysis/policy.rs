//! # Source/Sink Policy
//!
//! Externally supplied configuration deciding which parameters count as
//! sources, which sink categories are reportable, and how much precision a
//! call site passes through. Resolved once during graph construction; the
//! propagation engine never consults the policy again.

use crate::ir::Param;
use serde::{Deserialize, Serialize};

/// Which parameters of a method are sensitive sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSpec {
    /// Every parameter is caller-provided and potentially sensitive.
    AllParams,

    /// Only the parameters at these zero-based positions.
    Positions(Vec<usize>),

    /// Only parameters whose front-end type name appears in this list.
    Types(Vec<String>),
}

impl Default for SourceSpec {
    fn default() -> Self {
        SourceSpec::AllParams
    }
}

/// Precision of taint pass-through at call sites.
///
/// Without interprocedural summaries the analyzer cannot see inside a
/// callee, so the result of a call is an over-approximation chosen here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPolicy {
    /// The result is Tainted if any argument is Tainted, otherwise Unknown.
    Conservative,

    /// The result is the plain lattice join of the argument states. Clean
    /// arguments yield a Clean result.
    Transparent,
}

impl CallPolicy {
    /// Parses a call policy name, defaulting to `Conservative` for unknown
    /// values.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "transparent" => CallPolicy::Transparent,
            _ => CallPolicy::Conservative,
        }
    }
}

/// Complete analysis policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Which parameters are sources.
    pub sources: SourceSpec,

    /// Report return/throw sinks (data leaving through the caller).
    pub report_external_output: bool,

    /// Report static/shared-field write sinks.
    pub report_shared_state: bool,

    /// Report sinks on locals the front-end marked as explicit sinks.
    pub report_annotated: bool,

    /// Treat the receiver object as a sensitive source, so data read from
    /// `this` taints whatever it reaches.
    pub this_is_source: bool,

    /// Call-site pass-through precision.
    pub call_policy: CallPolicy,

    /// Worklist step cap guarding against non-termination from builder
    /// defects. Zero derives a cap from the graph size.
    pub max_iterations: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            sources: SourceSpec::AllParams,
            report_external_output: true,
            report_shared_state: true,
            report_annotated: true,
            this_is_source: false,
            call_policy: CallPolicy::Conservative,
            max_iterations: 0,
        }
    }
}

impl Policy {
    /// Whether the parameter at `index` is a source under this policy.
    pub fn is_source(&self, index: usize, param: &Param) -> bool {
        match &self.sources {
            SourceSpec::AllParams => true,
            SourceSpec::Positions(positions) => positions.contains(&index),
            SourceSpec::Types(types) => types.iter().any(|t| t == &param.ty),
        }
    }

    /// The effective worklist step cap for a graph with `nodes` nodes.
    ///
    /// Monotone propagation over the three-point lattice touches each node a
    /// small constant number of times; the derived cap leaves generous slack
    /// before declaring divergence.
    pub fn step_cap(&self, nodes: usize) -> usize {
        if self.max_iterations > 0 {
            self.max_iterations
        } else {
            64 + nodes * 16
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, ty: &str) -> Param {
        Param {
            name: name.to_string(),
            ty: ty.to_string(),
        }
    }

    #[test]
    fn all_params_marks_everything() {
        let policy = Policy::default();
        assert!(policy.is_source(0, &param("x", "int")));
        assert!(policy.is_source(5, &param("y", "Secret")));
    }

    #[test]
    fn positional_sources_select_by_index() {
        let policy = Policy {
            sources: SourceSpec::Positions(vec![1]),
            ..Policy::default()
        };
        assert!(!policy.is_source(0, &param("a", "int")));
        assert!(policy.is_source(1, &param("b", "int")));
    }

    #[test]
    fn type_sources_select_by_type_name() {
        let policy = Policy {
            sources: SourceSpec::Types(vec!["Secret".to_string()]),
            ..Policy::default()
        };
        assert!(policy.is_source(0, &param("k", "Secret")));
        assert!(!policy.is_source(1, &param("n", "int")));
    }

    #[test]
    fn call_policy_parses_with_conservative_fallback() {
        assert_eq!(CallPolicy::from_str("transparent"), CallPolicy::Transparent);
        assert_eq!(CallPolicy::from_str("TRANSPARENT"), CallPolicy::Transparent);
        assert_eq!(CallPolicy::from_str("bogus"), CallPolicy::Conservative);
    }

    #[test]
    fn explicit_step_cap_overrides_derived() {
        let policy = Policy {
            max_iterations: 10,
            ..Policy::default()
        };
        assert_eq!(policy.step_cap(1000), 10);
        assert!(Policy::default().step_cap(10) > 64);
    }
}
