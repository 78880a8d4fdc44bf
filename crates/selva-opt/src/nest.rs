//! Structured loop representation
//!
//! The raised form the pipeline rewrites loops into, used only transiently:
//! counted loop nests with integral bounds, parallel regions, and flat
//! basic-block fragments produced by the lowering passes.

use selva_ir::{BasicBlock, IrType, Value};

/// Ordered operations forming the body of a function or loop
pub type Region = Vec<StructuredOp>;

/// One operation in the structured representation
#[derive(Debug)]
pub enum StructuredOp {
    /// Structured counted loop
    For(LoopNest),
    /// Parallel region; its contents execute under the parallel runtime
    Parallel { body: Region },
    /// Flat basic-block fragment; the first block is the fragment entry and
    /// the last block is left open as the continuation point
    Flat(Vec<BasicBlock>),
}

/// The raised form of one registered loop: integral bounds, unit step, and
/// a body region
#[derive(Debug)]
pub struct LoopNest {
    /// Inclusive lower bound
    pub lower: i64,
    /// Exclusive upper bound
    pub upper: i64,
    pub step: i64,
    /// Counter variable name
    pub counter: String,
    pub body: Region,
}

/// Function in the structured representation
#[derive(Debug)]
pub struct StructuredFunction {
    pub name: String,
    pub return_type: IrType,
    pub body: Region,
}

/// Module in the structured representation
#[derive(Debug)]
pub struct StructuredModule {
    pub name: String,
    pub functions: Vec<StructuredFunction>,
}

impl StructuredModule {
    /// Raises a flat module into signature-only stubs
    ///
    /// Only loop skeletons are optimized; general control flow is not
    /// lifted. Loop bodies are synthesized by the classify step.
    pub fn raise(module: &selva_ir::Module) -> Self {
        Self {
            name: module.name.clone(),
            functions: module
                .functions
                .iter()
                .map(|f| StructuredFunction {
                    name: f.name.clone(),
                    return_type: f.return_type,
                    body: Vec::new(),
                })
                .collect(),
        }
    }
}

/// Outcome of resolving a loop's bounds to compile-time integers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsResolution {
    /// Both bounds are constants; numeric constants are truncated
    Known { lo: i64, hi: i64 },
    /// At least one bound is computed at runtime
    Unknown,
}

/// Resolves a registered loop's bound values
///
/// On `Unknown` the caller must either fail the rewrite or fall back to
/// the flat lowering; a range is never guessed.
pub fn resolve_bounds(lower: &Value, upper: &Value) -> BoundsResolution {
    match (const_bound(lower), const_bound(upper)) {
        (Some(lo), Some(hi)) => BoundsResolution::Known { lo, hi },
        _ => BoundsResolution::Unknown,
    }
}

fn const_bound(value: &Value) -> Option<i64> {
    match value {
        Value::ConstInt(v) => Some(*v),
        Value::ConstNum(_) => value.as_num().map(|v| v as i64),
        _ => None,
    }
}
