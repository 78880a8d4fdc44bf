//! selva-error - Error reporting for the Selva backend
//!
//! Every error in the backend is non-fatal: the reporting site substitutes a
//! safe fallback value and construction continues. This crate provides the
//! error kinds and the `Diagnostics` accumulator they are collected into.
//!
//! # Example
//!
//! ```rust
//! use selva_error::{BuildError, Diagnostics};
//!
//! let mut diags = Diagnostics::new();
//! diags.push(BuildError::UndefinedFunction { name: "f".to_string() });
//! assert!(diags.has_errors());
//! ```

use thiserror::Error;

/// An error raised while building or optimizing the IR.
///
/// None of these abort the build; each reporting site substitutes the
/// fallback value documented on the variant and continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Missing operand to an arithmetic or comparison operation.
    /// Fallback: zero constant (arithmetic) or false constant (comparison).
    #[error("missing operand in {context} operation")]
    Operand { context: &'static str },

    /// Operator tag outside the supported set.
    /// Fallback: zero constant (arithmetic) or false constant (comparison).
    #[error("unsupported {context} operator '{op}'")]
    UnsupportedOperator { context: &'static str, op: char },

    /// A counted loop was opened without an init or end value.
    /// Fallback: a loop over [0, 0) that runs zero iterations.
    #[error("missing bound in for loop over '{counter}'")]
    LoopBounds { counter: String },

    /// A loop close arrived with no matching open.
    #[error("loop close without a matching open")]
    DanglingLoop,

    /// A call to a function name that was never defined.
    /// Fallback: zero constant.
    #[error("function '{name}' not defined")]
    UndefinedFunction { name: String },

    /// A stage of the loop optimization pipeline failed. The rewrite is
    /// discarded and the original flat IR is kept.
    #[error("loop optimization failed in {stage}: {message}")]
    OptimizationLowering { stage: &'static str, message: String },
}

/// Default Result type for operations that may fail with a build error
pub type Result<T> = std::result::Result<T, BuildError>;

/// Collection of errors accumulated during a build
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<BuildError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: BuildError) {
        self.items.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildError> {
        self.items.iter()
    }

    /// Renders all accumulated errors, one message per line
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|e| format!("error: {}", e))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl IntoIterator for Diagnostics {
    type Item = BuildError;
    type IntoIter = std::vec::IntoIter<BuildError>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
