//! Lowering passes over the structured representation
//!
//! The pipeline runs, in fixed order: canonicalization, structured loops to
//! flat control flow, parallel regions to flat control flow, then a final
//! flattening into complete functions over the base instruction set. A
//! failure at any stage aborts the whole rewrite.

use crate::nest::{LoopNest, Region, StructuredModule, StructuredOp};
use selva_error::BuildError;
use selva_ir::{runtime, BasicBlock, BinaryOp, CompareOp, Instruction, IrType, Module, Value};
use tracing::debug;

/// A named rewrite over the structured module
pub trait Pass {
    /// Unique name for this pass; used as the stage name in error reports
    fn name(&self) -> &'static str;

    /// Description of what this pass does
    fn description(&self) -> &'static str;

    fn run(&self, module: &mut StructuredModule) -> Result<(), String>;
}

/// Runs passes in a fixed order, stopping at the first failure
pub struct PassPipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl PassPipeline {
    /// The standard lowering order
    pub fn standard() -> Self {
        Self {
            passes: vec![
                Box::new(Canonicalize),
                Box::new(LowerLoops),
                Box::new(LowerParallel),
            ],
        }
    }

    pub fn run(&self, module: &mut StructuredModule) -> Result<(), BuildError> {
        for pass in &self.passes {
            debug!(pass = pass.name(), "running pass");
            pass.run(module).map_err(|message| BuildError::OptimizationLowering {
                stage: pass.name(),
                message,
            })?;
        }
        Ok(())
    }
}

/// Normalizes loop nests to a unit step and prunes empty parallel regions
struct Canonicalize;

impl Pass for Canonicalize {
    fn name(&self) -> &'static str {
        "canonicalize"
    }

    fn description(&self) -> &'static str {
        "Normalizes loop steps and prunes empty parallel regions"
    }

    fn run(&self, module: &mut StructuredModule) -> Result<(), String> {
        for func in &mut module.functions {
            canonicalize_region(&mut func.body);
        }
        Ok(())
    }
}

fn canonicalize_region(region: &mut Region) {
    region.retain(|op| !matches!(op, StructuredOp::Parallel { body } if body.is_empty()));
    for op in region.iter_mut() {
        match op {
            StructuredOp::For(nest) => {
                nest.step = 1;
                canonicalize_region(&mut nest.body);
            }
            StructuredOp::Parallel { body } => canonicalize_region(body),
            StructuredOp::Flat(_) => {}
        }
    }
}

/// Rewrites structured counted loops into flat header/body/end fragments
struct LowerLoops;

impl Pass for LowerLoops {
    fn name(&self) -> &'static str {
        "lower-loops"
    }

    fn description(&self) -> &'static str {
        "Lowers structured counted loops to flat control flow"
    }

    fn run(&self, module: &mut StructuredModule) -> Result<(), String> {
        for func in &mut module.functions {
            let mut ctx = LowerCtx::default();
            lower_region_loops(&mut func.body, &mut ctx)?;
        }
        Ok(())
    }
}

/// Per-function label and temporary allocator for the lowering passes
#[derive(Default)]
struct LowerCtx {
    next_label: u32,
    next_temp: u32,
}

impl LowerCtx {
    fn label(&mut self, prefix: &str) -> String {
        let label = format!("{}_{}", prefix, self.next_label);
        self.next_label += 1;
        label
    }

    fn temp(&mut self) -> u32 {
        let id = self.next_temp;
        self.next_temp += 1;
        id
    }
}

fn lower_region_loops(region: &mut Region, ctx: &mut LowerCtx) -> Result<(), String> {
    for op in region.iter_mut() {
        match op {
            StructuredOp::For(nest) => {
                // Inner loops first, so the nest body holds only fragments.
                lower_region_loops(&mut nest.body, ctx)?;
                let blocks = lower_nest(nest, ctx)?;
                *op = StructuredOp::Flat(blocks);
            }
            StructuredOp::Parallel { body } => lower_region_loops(body, ctx)?,
            StructuredOp::Flat(_) => {}
        }
    }
    Ok(())
}

/// Lowers one loop nest to the flat skeleton: counter slot and init, a
/// header with the strict `<` bound test, the body with the unit increment
/// and back edge, and an open end block as the continuation
fn lower_nest(nest: &mut LoopNest, ctx: &mut LowerCtx) -> Result<Vec<BasicBlock>, String> {
    if nest.step != 1 {
        return Err(format!(
            "non-unit step {} in loop over '{}'",
            nest.step, nest.counter
        ));
    }

    let pre_label = ctx.label("loop_pre");
    let header_label = ctx.label("loop_header");
    let body_label = ctx.label("loop_body");
    let end_label = ctx.label("loop_end");
    let slot = Value::slot(&nest.counter);

    let mut pre = BasicBlock::new(pre_label);
    pre.push(Instruction::Alloca { dest: nest.counter.clone(), ty: IrType::Num });
    pre.push(Instruction::Store {
        value: Value::const_num(nest.lower as f64),
        ptr: slot.clone(),
    });
    pre.push(Instruction::Branch { target: header_label.clone() });

    let mut header = BasicBlock::new(header_label.clone());
    let t_cur = ctx.temp();
    header.push(Instruction::Load { dest: t_cur, ptr: slot.clone(), ty: IrType::Num });
    let t_cond = ctx.temp();
    header.push(Instruction::Compare {
        dest: t_cond,
        op: CompareOp::Lt,
        left: Value::Temp(t_cur),
        right: Value::const_num(nest.upper as f64),
    });
    header.push(Instruction::CondBranch {
        cond: Value::Temp(t_cond),
        then_label: body_label.clone(),
        else_label: end_label.clone(),
    });

    let mut blocks = vec![pre, header];
    let mut current = BasicBlock::new(body_label);
    for inner in nest.body.drain(..) {
        let fragment = match inner {
            StructuredOp::Flat(fragment) => fragment,
            _ => return Err(format!("unlowered op inside loop over '{}'", nest.counter)),
        };
        current = splice(&mut blocks, current, fragment);
    }

    let t_cur = ctx.temp();
    current.push(Instruction::Load { dest: t_cur, ptr: slot.clone(), ty: IrType::Num });
    let t_next = ctx.temp();
    current.push(Instruction::Binary {
        dest: t_next,
        op: BinaryOp::Add,
        left: Value::Temp(t_cur),
        right: Value::const_num(1.0),
    });
    current.push(Instruction::Store { value: Value::Temp(t_next), ptr: slot });
    current.push(Instruction::Branch { target: header_label });
    blocks.push(current);
    blocks.push(BasicBlock::new(end_label));
    Ok(blocks)
}

/// Terminates `current` into the fragment and returns the fragment's
/// trailing open block as the new continuation
fn splice(
    blocks: &mut Vec<BasicBlock>,
    mut current: BasicBlock,
    mut fragment: Vec<BasicBlock>,
) -> BasicBlock {
    if fragment.is_empty() {
        return current;
    }
    current.push(Instruction::Branch { target: fragment[0].label.clone() });
    blocks.push(current);
    let tail = fragment.pop().unwrap();
    blocks.extend(fragment);
    tail
}

/// Rewrites parallel regions into runtime bracket calls around their
/// already-lowered contents
struct LowerParallel;

impl Pass for LowerParallel {
    fn name(&self) -> &'static str {
        "lower-parallel"
    }

    fn description(&self) -> &'static str {
        "Lowers parallel regions to runtime bracket calls"
    }

    fn run(&self, module: &mut StructuredModule) -> Result<(), String> {
        for func in &mut module.functions {
            let mut ctx = LowerCtx::default();
            lower_region_parallel(&mut func.body, &mut ctx)?;
        }
        Ok(())
    }
}

fn lower_region_parallel(region: &mut Region, ctx: &mut LowerCtx) -> Result<(), String> {
    for op in region.iter_mut() {
        if let StructuredOp::Parallel { body } = op {
            let mut blocks = Vec::new();
            let mut current = BasicBlock::new(ctx.label("parallel"));
            current.push(Instruction::Call {
                dest: None,
                func: runtime::PARALLEL_BEGIN.to_string(),
                args: vec![],
            });
            for inner in body.drain(..) {
                let fragment = match inner {
                    StructuredOp::Flat(fragment) => fragment,
                    _ => return Err("structured op left inside parallel region".to_string()),
                };
                current = splice(&mut blocks, current, fragment);
            }
            current.push(Instruction::Call {
                dest: None,
                func: runtime::PARALLEL_END.to_string(),
                args: vec![],
            });
            blocks.push(current);
            *op = StructuredOp::Flat(blocks);
        }
    }
    Ok(())
}

/// Final stage: splices every function's fragments into a complete flat
/// function
///
/// Any op still structured at this point is a stage failure.
pub fn flatten(module: StructuredModule) -> Result<Module, String> {
    let mut flat = Module::new(module.name);
    for func in module.functions {
        let mut lowered = selva_ir::Function::new(func.name.clone(), func.return_type);
        for op in func.body {
            let fragment = match op {
                StructuredOp::Flat(fragment) => fragment,
                StructuredOp::For(nest) => {
                    return Err(format!(
                        "structured loop over '{}' survived lowering in '{}'",
                        nest.counter, func.name
                    ));
                }
                StructuredOp::Parallel { .. } => {
                    return Err(format!("parallel region survived lowering in '{}'", func.name));
                }
            };
            if fragment.is_empty() {
                continue;
            }
            lowered.emit(Instruction::Branch { target: fragment[0].label.clone() });
            for block in fragment {
                lowered.blocks.push(block);
            }
        }
        if !lowered.current_block().is_terminated() {
            lowered.emit(Instruction::Return(func.return_type.zero()));
        }
        flat.add_function(lowered);
    }
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nest::StructuredFunction;

    fn module_with(body: Region) -> StructuredModule {
        StructuredModule {
            name: "test".to_string(),
            functions: vec![StructuredFunction {
                name: "main".to_string(),
                return_type: IrType::Int,
                body,
            }],
        }
    }

    #[test]
    fn test_canonicalize_prunes_empty_parallel() {
        let mut module = module_with(vec![StructuredOp::Parallel { body: vec![] }]);
        Canonicalize.run(&mut module).unwrap();
        assert!(module.functions[0].body.is_empty());
    }

    #[test]
    fn test_lower_nest_block_shape() {
        let mut nest = LoopNest {
            lower: 0,
            upper: 5,
            step: 1,
            counter: "i".to_string(),
            body: vec![],
        };
        let mut ctx = LowerCtx::default();
        let blocks = lower_nest(&mut nest, &mut ctx).unwrap();

        let labels: Vec<&str> = blocks.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["loop_pre_0", "loop_header_1", "loop_body_2", "loop_end_3"]);

        // Header tests the strict upper bound; body carries the unit
        // increment and the back edge; end stays open.
        assert!(blocks[1]
            .instructions
            .iter()
            .any(|i| i.to_string() == "%t1 = cmp olt %t0, 5"));
        assert!(blocks[2]
            .instructions
            .iter()
            .any(|i| i.to_string() == "%t3 = add %t2, 1"));
        assert!(blocks[2].is_terminated());
        assert!(!blocks[3].is_terminated());
    }

    #[test]
    fn test_lower_parallel_brackets_contents() {
        let mut module = module_with(vec![StructuredOp::Parallel {
            body: vec![StructuredOp::Flat(vec![BasicBlock::new("loop_pre_0")])],
        }]);
        LowerParallel.run(&mut module).unwrap();

        let StructuredOp::Flat(blocks) = &module.functions[0].body[0] else {
            panic!("parallel region was not lowered");
        };
        assert_eq!(blocks[0].label, "parallel_0");
        assert_eq!(blocks[0].instructions[0].to_string(), "call @parallel_begin()");
        let last = blocks.last().unwrap();
        assert_eq!(
            last.instructions.last().unwrap().to_string(),
            "call @parallel_end()"
        );
    }

    #[test]
    fn test_flatten_rejects_structured_leftovers() {
        let module = module_with(vec![StructuredOp::For(LoopNest {
            lower: 0,
            upper: 1,
            step: 1,
            counter: "i".to_string(),
            body: vec![],
        })]);
        let err = flatten(module).unwrap_err();
        assert!(err.contains("survived lowering"));
    }

    #[test]
    fn test_flatten_completes_functions() {
        let module = module_with(vec![]);
        let flat = flatten(module).unwrap();
        let main = &flat.functions[0];
        assert!(main.current_block().is_terminated());
        assert_eq!(main.blocks[0].instructions.last().unwrap().to_string(), "ret 0");
    }
}
