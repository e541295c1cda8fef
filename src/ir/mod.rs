//! # Method Body Input Model
//!
//! The structural contract between an external front-end and the analyzer:
//! a method arrives as a sequence of basic blocks, each a sequence of tagged
//! instructions, plus a control-flow edge list with back-edges marked for
//! loops. No parsing happens here; the front-end is expected to have already
//! lowered source or bytecode into this shape.
//!
//! ## Key Types
//!
//! - [`MethodBody`] - One method ready for analysis
//! - [`BasicBlock`] / [`Instr`] - Straight-line instruction sequences
//! - [`Place`] / [`Operand`] - Storage locations and instruction inputs
//! - [`Batch`] - A collection of methods analyzed together

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Index of a basic block within its method. Block 0 is the entry block.
pub type BlockId = usize;

/// A named storage location.
///
/// Identity is stable across reassignment: writing a place twice creates two
/// value versions of the same variable. Locals and parameters are scoped to
/// the enclosing method; static fields carry a qualified name with
/// cross-method identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Place {
    /// A method-local variable.
    Local(String),

    /// A formal parameter. Reassignable inside the body like any local.
    Param(String),

    /// A static or otherwise shared field, by qualified name.
    Static(String),

    /// The receiver object. Writes are caller-observable like static writes;
    /// reads see the caller-provided receiver until the body overwrites it.
    This,
}

impl Place {
    /// The analyzer-internal identity key for this place.
    ///
    /// Statics and the receiver get bracketed keys so a local of the same
    /// name never collides.
    pub fn var_key(&self) -> String {
        match self {
            Place::Local(name) | Place::Param(name) => name.clone(),
            Place::Static(name) => format!("<static {}>", name),
            Place::This => "<this>".to_string(),
        }
    }

    /// Whether a write to this place is observable outside the method:
    /// static fields and the receiver object.
    pub fn is_shared(&self) -> bool {
        matches!(self, Place::Static(_) | Place::This)
    }
}

/// One input to an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// The current value of a storage location.
    Place(Place),

    /// A literal constant. The actual value is irrelevant to flow analysis;
    /// what matters is that no variable contributes to it.
    Const,
}

impl Operand {
    pub fn place(&self) -> Option<&Place> {
        match self {
            Operand::Place(p) => Some(p),
            Operand::Const => None,
        }
    }
}

/// A single instruction inside a basic block.
///
/// Assignments and calls define values; branches, returns, and throws
/// consume them. A right-hand side is modeled as the flat list of operands
/// the computed value depends on — the operator itself does not affect flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Instr {
    /// `dest = f(rhs...)`. An all-constant right-hand side overwrites any
    /// prior value of `dest` outright (a kill, not a use).
    Assign { dest: Place, rhs: Vec<Operand> },

    /// A call whose result (if bound) depends on the arguments per the
    /// configured call policy.
    Call {
        dest: Option<Place>,
        callee: String,
        args: Vec<Operand>,
    },

    /// A bare observation of values with no definition and no sink, e.g. an
    /// expression statement the front-end could not attribute elsewhere.
    Use { operands: Vec<Operand> },

    /// Block terminator choosing between successors. An empty condition list
    /// is an unconditional jump.
    Branch { cond: Vec<Operand> },

    /// Data to the caller through the return path.
    Return { value: Option<Operand> },

    /// Data to the caller through the throw path.
    Throw { value: Operand },
}

/// A straight-line sequence of instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub instrs: Vec<Instr>,
}

/// A directed control-flow edge between blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgEdge {
    pub from: BlockId,
    pub to: BlockId,

    /// Marked by the front-end for loop back-edges. The analyzer does not
    /// require the mark (the worklist converges either way) but preserves it
    /// for diagnostics.
    #[serde(default)]
    pub back_edge: bool,
}

/// A formal parameter of a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,

    /// Front-end type name, consulted by type-based source policies.
    #[serde(default)]
    pub ty: String,
}

/// One method body ready for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    pub name: String,

    #[serde(default)]
    pub params: Vec<Param>,

    pub blocks: Vec<BasicBlock>,

    #[serde(default)]
    pub edges: Vec<CfgEdge>,

    /// Locals the front-end annotated as explicit sources; their definitions
    /// are sensitive regardless of what flows into them.
    #[serde(default)]
    pub marked_sources: Vec<String>,

    /// Locals the front-end annotated as explicit sinks; data flowing into
    /// them is reported.
    #[serde(default)]
    pub marked_sinks: Vec<String>,
}

/// A batch of methods analyzed in one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    pub methods: Vec<MethodBody>,
}

/// Structural defects in an input graph.
///
/// A malformed method is skipped and reported; the rest of the batch
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("method `{method}` has no basic blocks")]
    EmptyBody { method: String },

    #[error("method `{method}`: control edge {from} -> {to} references a missing block")]
    DanglingEdge {
        method: String,
        from: BlockId,
        to: BlockId,
    },

    #[error("method `{method}`: block {block} is unreachable from the entry block")]
    UnreachableBlock { method: String, block: BlockId },
}

impl MethodBody {
    /// Checks the control-flow skeleton: every edge must reference existing
    /// blocks and every block must be reachable from the entry.
    pub fn validate(&self) -> Result<(), StructureError> {
        if self.blocks.is_empty() {
            return Err(StructureError::EmptyBody {
                method: self.name.clone(),
            });
        }

        for edge in &self.edges {
            if edge.from >= self.blocks.len() || edge.to >= self.blocks.len() {
                return Err(StructureError::DanglingEdge {
                    method: self.name.clone(),
                    from: edge.from,
                    to: edge.to,
                });
            }
        }

        let mut reached: HashSet<BlockId> = HashSet::new();
        let mut stack = vec![0];
        while let Some(b) = stack.pop() {
            if !reached.insert(b) {
                continue;
            }
            for edge in &self.edges {
                if edge.from == b && !reached.contains(&edge.to) {
                    stack.push(edge.to);
                }
            }
        }

        for block in 0..self.blocks.len() {
            if !reached.contains(&block) {
                return Err(StructureError::UnreachableBlock {
                    method: self.name.clone(),
                    block,
                });
            }
        }

        Ok(())
    }

    /// Successor block ids of `block`, in edge-list order.
    pub fn successors(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.from == block)
            .map(|e| e.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_line() -> MethodBody {
        MethodBody {
            name: "m".to_string(),
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
    fn valid_body_passes_validation() {
        assert!(straight_line().validate().is_ok());
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let mut body = straight_line();
        body.edges.push(CfgEdge {
            from: 0,
            to: 7,
            back_edge: false,
        });
        assert!(matches!(
            body.validate(),
            Err(StructureError::DanglingEdge { to: 7, .. })
        ));
    }

    #[test]
    fn unreachable_block_is_rejected() {
        let mut body = straight_line();
        body.blocks.push(BasicBlock { instrs: vec![] });
        assert!(matches!(
            body.validate(),
            Err(StructureError::UnreachableBlock { block: 1, .. })
        ));
    }

    #[test]
    fn static_key_does_not_collide_with_local() {
        let local = Place::Local("a".to_string());
        let field = Place::Static("a".to_string());
        assert_ne!(local.var_key(), field.var_key());
        assert_eq!(field.var_key(), "<static a>");
    }

    #[test]
    fn receiver_key_does_not_collide_with_local() {
        let local = Place::Local("this".to_string());
        assert_ne!(local.var_key(), Place::This.var_key());
        assert_eq!(Place::This.var_key(), "<this>");
        assert!(Place::This.is_shared());
        assert!(!local.is_shared());
    }

    #[test]
    fn method_body_deserializes_from_front_end_json() {
        let json = r#"{
            "name": "paramToReturn",
            "params": [{"name": "x", "ty": "int"}],
            "blocks": [{"instrs": [
                {"op": "assign", "dest": {"local": "y"}, "rhs": [{"place": {"param": "x"}}]},
                {"op": "return", "value": {"place": {"local": "y"}}}
            ]}],
            "edges": []
        }"#;

        let body: MethodBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.name, "paramToReturn");
        assert_eq!(body.blocks[0].instrs.len(), 2);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn receiver_and_marked_locals_deserialize() {
        let json = r#"{
            "name": "storeInThis",
            "params": [],
            "blocks": [{"instrs": [
                {"op": "assign", "dest": "this", "rhs": [{"place": {"local": "s"}}]}
            ]}],
            "edges": [],
            "marked_sources": ["s"],
            "marked_sinks": ["out"]
        }"#;

        let body: MethodBody = serde_json::from_str(json).unwrap();
        assert!(matches!(
            body.blocks[0].instrs[0],
            Instr::Assign { dest: Place::This, .. }
        ));
        assert_eq!(body.marked_sources, vec!["s"]);
        assert_eq!(body.marked_sinks, vec!["out"]);
    }
}
