//! selva-opt - Loop-nest optimization pipeline
//!
//! Counted loops with statically-known bounds are profitable to express in
//! a structured, analyzable form; the rest of the action stream is easiest
//! to emit directly as flat control flow. This crate round-trips only the
//! loop skeletons: it raises the flat module into signature stubs, rewrites
//! every registered loop as a structured nest (wrapped in a parallel region
//! when so tagged), lowers the structured form back down, and hands the
//! caller a complete replacement module.
//!
//! The rewrite is all-or-nothing at module level: the replacement is built
//! in isolation and any stage failure leaves the original flat IR
//! untouched.

pub mod nest;
pub mod passes;

pub use nest::{resolve_bounds, BoundsResolution, LoopNest, StructuredModule, StructuredOp};
pub use passes::{flatten, Pass, PassPipeline};

use selva_error::BuildError;
use selva_ir::{LoopKind, LoopRecord, Module};
use tracing::info;

/// Runs the full pipeline over a finished module
///
/// Returns the rewritten module on success; on any stage failure returns
/// [`BuildError::OptimizationLowering`] and the caller keeps the original.
/// Call only when loops were registered: with an empty registry the
/// pipeline must not run at all (the no-op is the caller's gate, not a
/// rewrite).
pub fn optimize_module(module: &Module, records: &[LoopRecord]) -> Result<Module, BuildError> {
    info!(loops = records.len(), "loop optimization started");

    let mut structured = StructuredModule::raise(module);

    // Classify and rewrite each registered loop, in registration order,
    // into the entry stub. Bounds must resolve to constants: the rewrite
    // fails rather than guessing a range for runtime bounds.
    let mut rewritten = Vec::new();
    for record in records {
        let nest = match resolve_bounds(&record.lower, &record.upper) {
            BoundsResolution::Known { lo, hi } => LoopNest {
                lower: lo,
                upper: hi,
                step: 1,
                counter: record.counter.clone(),
                body: Vec::new(),
            },
            BoundsResolution::Unknown => {
                return Err(BuildError::OptimizationLowering {
                    stage: "classify",
                    message: format!("non-constant bounds for loop over '{}'", record.counter),
                });
            }
        };
        rewritten.push(match record.kind {
            LoopKind::Parallel => StructuredOp::Parallel {
                body: vec![StructuredOp::For(nest)],
            },
            LoopKind::Sequential => StructuredOp::For(nest),
        });
    }
    match structured.functions.first_mut() {
        Some(entry) => entry.body = rewritten,
        None => {
            return Err(BuildError::OptimizationLowering {
                stage: "raise",
                message: "module has no entry function".to_string(),
            });
        }
    }

    PassPipeline::standard().run(&mut structured)?;
    let mut flat = flatten(structured).map_err(|message| BuildError::OptimizationLowering {
        stage: "flatten",
        message,
    })?;
    flat.string_table = module.string_table.clone();

    info!("loop optimization committed");
    Ok(flat)
}
