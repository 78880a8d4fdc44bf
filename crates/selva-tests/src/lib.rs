//! Integration tests for the Selva backend
//!
//! This crate drives the complete pipeline end to end:
//! Semantic actions → IR construction → Loop optimization → Emission

use selva_error::Diagnostics;
use selva_ir::{BuildResult, BuilderContext};

/// Result of driving a full build
#[derive(Debug)]
pub struct BuildOutcome {
    /// Final textual IR dump
    pub ir: String,
    /// Diagnostics accumulated across construction and optimization
    pub diagnostics: Diagnostics,
}

/// Drives the builder with `actions` through the full pipeline
///
/// The loop optimization runs only when loops were registered; on pipeline
/// failure the original flat IR is kept and the error lands in the
/// diagnostics.
pub fn build(actions: impl FnOnce(&mut BuilderContext)) -> BuildOutcome {
    let mut ctx = BuilderContext::new("selva_program");
    actions(&mut ctx);
    finish_build(ctx)
}

/// Replays an action trace through the same pipeline
pub fn build_trace(source: &str) -> BuildOutcome {
    let mut ctx = BuilderContext::new("selva_program");
    if let Err(err) = selva_cli::trace::replay(source, &mut ctx) {
        panic!("trace replay failed: {}", err);
    }
    finish_build(ctx)
}

fn finish_build(ctx: BuilderContext) -> BuildOutcome {
    let BuildResult { mut module, loop_records, mut diagnostics } = ctx.finish();

    if !loop_records.is_empty() {
        match selva_opt::optimize_module(&module, &loop_records) {
            Ok(rewritten) => module = rewritten,
            Err(err) => diagnostics.push(err),
        }
    }

    module.finalize();
    BuildOutcome {
        ir: module.to_string(),
        diagnostics,
    }
}

/// Asserts that the final IR contains a specific string
pub fn assert_ir_contains(outcome: &BuildOutcome, expected: &str) {
    if !outcome.ir.contains(expected) {
        panic!(
            "Expected IR to contain '{}', but it didn't.\n\nGenerated IR:\n{}",
            expected, outcome.ir
        );
    }
}

/// Asserts that the build produced no diagnostics
pub fn assert_no_diagnostics(outcome: &BuildOutcome) {
    if outcome.diagnostics.has_errors() {
        panic!(
            "Expected a clean build, but got diagnostics:\n{}",
            outcome.diagnostics.render()
        );
    }
}
