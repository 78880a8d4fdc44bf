//! selva-ir - Intermediate representation of the Selva backend
//!
//! The Selva IR is a flat control-flow representation that:
//! - Is built incrementally from the front end's semantic-action stream
//! - Keeps every basic block under exactly one terminator
//! - Records counted loops for the loop-nest optimization pipeline
//! - Serializes to a deterministic textual dump
//!
//! # Architecture
//!
//! ```text
//! Semantic actions (front end)
//!         ↓
//!   [BuilderContext]
//!         ↓
//!    IR Module
//!    ├── Functions
//!    │   └── Basic Blocks
//!    │       └── Instructions
//!    ├── Loop registry
//!    └── String table
//!         ↓
//!  [Loop optimization] (selva-opt, only if loops were registered)
//!         ↓
//!  [finalize + Display]
//!         ↓
//!    Textual IR dump
//! ```

pub mod builder;
pub mod instruction;
pub mod module;
pub mod types;

/// Runtime symbols the emitted IR calls into
pub mod runtime {
    /// Prints a string-table entry followed by a newline
    pub const PRINT_STR: &str = "print_str";
    /// Prints a numeric value followed by a newline
    pub const PRINT_NUM: &str = "print_num";
    /// Opens a parallel region
    pub const PARALLEL_BEGIN: &str = "parallel_begin";
    /// Closes a parallel region
    pub const PARALLEL_END: &str = "parallel_end";
}

pub use builder::{BuildResult, BuilderContext, FunctionId, LoopKind, LoopRecord};
pub use instruction::{BinaryOp, CompareOp, Instruction, Value};
pub use module::{BasicBlock, Function, Module};
pub use types::IrType;
