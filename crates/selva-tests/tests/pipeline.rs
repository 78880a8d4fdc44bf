//! End-to-end pipeline scenarios
//!
//! Each test drives the builder the way the front end would, runs the loop
//! optimization when loops are involved, and asserts over the final dump.

use selva_error::BuildError;
use selva_ir::{BuildResult, BuilderContext, LoopKind, Value};
use selva_tests::{assert_ir_contains, assert_no_diagnostics, build, build_trace};

#[test]
fn assignment_and_print() {
    let outcome = build(|ctx| {
        ctx.assign("x", Value::const_num(3.0));
        let x = ctx.load("x");
        ctx.print_num(x);
        ctx.print_str("\"hello\"");
    });

    assert_no_diagnostics(&outcome);
    assert_ir_contains(&outcome, "; Module: selva_program");
    assert_ir_contains(&outcome, "@str0 = \"hello\"");
    assert_ir_contains(&outcome, "%x = alloca num");
    // Zero-init on first resolution, then the assignment itself.
    assert_ir_contains(&outcome, "store 0, %x");
    assert_ir_contains(&outcome, "store 3, %x");
    assert_ir_contains(&outcome, "call @print_num(%t0)");
    assert_ir_contains(&outcome, "call @print_str(str#0)");
    assert_ir_contains(&outcome, "ret 0");
}

#[test]
fn if_else_blocks_are_complete() {
    let outcome = build(|ctx| {
        let x = ctx.load("x");
        let cond = ctx.compare(Some(x), Some(Value::const_num(1.0)), '>');
        ctx.if_else_open(cond);
        ctx.assign("y", Value::const_num(1.0));
        ctx.then_close();
        ctx.assign("y", Value::const_num(2.0));
        ctx.if_close();
    });

    assert_no_diagnostics(&outcome);
    assert_ir_contains(&outcome, "%t1 = cmp ogt %t0, 1");
    assert_ir_contains(&outcome, "br %t1, then_0, else_1");
    assert_ir_contains(&outcome, "then_0:");
    assert_ir_contains(&outcome, "else_1:");
    assert_ir_contains(&outcome, "ifcont_2:");
    // Both arms branch to the merge block.
    assert_eq!(outcome.ir.matches("br ifcont_2").count(), 2);
}

#[test]
fn sequential_loop_bounds_in_rewrite() {
    let outcome = build(|ctx| {
        ctx.for_open(
            Some(Value::const_num(0.0)),
            "i",
            Some(Value::const_num(10.0)),
            LoopKind::Sequential,
        );
        ctx.for_close();
    });

    assert_no_diagnostics(&outcome);
    // The rewritten skeleton: init store, strict bound test, unit
    // increment, back edge.
    assert_ir_contains(&outcome, "store 0, %i");
    assert_ir_contains(&outcome, "cmp olt %t0, 10");
    assert_ir_contains(&outcome, "add %t2, 1");
    assert_ir_contains(&outcome, "br loop_header_1");
}

#[test]
fn zero_iteration_loop_keeps_skeleton() {
    // init >= end: the body never runs, but the full header/body/end
    // skeleton is still emitted.
    let outcome = build(|ctx| {
        ctx.for_open(
            Some(Value::const_num(5.0)),
            "i",
            Some(Value::const_num(5.0)),
            LoopKind::Sequential,
        );
        ctx.for_close();
    });

    assert_no_diagnostics(&outcome);
    assert_ir_contains(&outcome, "store 5, %i");
    assert_ir_contains(&outcome, "cmp olt %t0, 5");
    assert_ir_contains(&outcome, "loop_body_2:");
    assert_ir_contains(&outcome, "loop_end_3:");
}

#[test]
fn pipeline_is_noop_without_loops() {
    let actions = |ctx: &mut BuilderContext| {
        let x = ctx.load("x");
        let cond = ctx.compare(Some(x), Some(Value::const_num(1.0)), '<');
        ctx.if_open(cond);
        ctx.print_str("\"small\"");
        ctx.if_close();
    };

    let outcome = build(actions);

    // The same build without any optimization step produces the identical
    // dump: with an empty loop registry the pipeline must not run.
    let mut ctx = BuilderContext::new("selva_program");
    actions(&mut ctx);
    let BuildResult { mut module, loop_records, .. } = ctx.finish();
    assert!(loop_records.is_empty());
    module.finalize();

    assert_eq!(outcome.ir, module.to_string());
}

#[test]
fn parallel_and_sequential_loops_round_trip() {
    let outcome = build(|ctx| {
        ctx.for_open(
            Some(Value::const_num(0.0)),
            "i",
            Some(Value::const_num(10.0)),
            LoopKind::Parallel,
        );
        ctx.for_close();
        ctx.for_open(
            Some(Value::const_num(0.0)),
            "j",
            Some(Value::const_num(5.0)),
            LoopKind::Sequential,
        );
        ctx.for_close();
    });

    assert_no_diagnostics(&outcome);
    // One parallel region wrapping the 10-iteration loop.
    assert_eq!(outcome.ir.matches("call @parallel_begin()").count(), 1);
    assert_eq!(outcome.ir.matches("call @parallel_end()").count(), 1);
    assert_ir_contains(&outcome, "cmp olt %t0, 10");
    // One plain 5-iteration loop.
    assert_ir_contains(&outcome, "cmp olt %t4, 5");
    // The original flat loop blocks are replaced by the rewritten ones.
    assert_ir_contains(&outcome, "loop_pre_0:");
    assert!(!outcome.ir.contains("loop_header_0:"));
}

#[test]
fn runtime_loop_bounds_keep_flat_ir() {
    let outcome = build(|ctx| {
        let n = ctx.load("n");
        ctx.for_open(Some(Value::const_num(0.0)), "i", Some(n), LoopKind::Sequential);
        ctx.for_close();
    });

    // The rewrite aborts rather than guessing a range; the flat loop
    // survives untouched.
    assert!(outcome
        .diagnostics
        .iter()
        .any(|e| matches!(e, BuildError::OptimizationLowering { stage: "classify", .. })));
    assert_ir_contains(&outcome, "loop_header_0:");
    assert!(!outcome.ir.contains("loop_pre_"));
    assert!(!outcome.ir.contains("parallel_begin"));
}

#[test]
fn function_redefinition_keeps_last() {
    let outcome = build(|ctx| {
        ctx.define_function("f");
        ctx.end_function(Some(Value::const_num(1.0)));
        ctx.define_function("f");
        ctx.end_function(Some(Value::const_num(2.0)));
        let result = ctx.call("f", vec![]);
        ctx.print_num(result);
    });

    // Last definition wins silently; both bodies remain in the module and
    // the call resolves without a diagnostic.
    assert_no_diagnostics(&outcome);
    assert_eq!(outcome.ir.matches("define num @f() {").count(), 2);
    assert_ir_contains(&outcome, "ret 1");
    assert_ir_contains(&outcome, "ret 2");
    assert_ir_contains(&outcome, "call @f()");
}

#[test]
fn undefined_call_reports_and_continues() {
    let outcome = build(|ctx| {
        let result = ctx.call("undefined_fn", vec![]);
        let sum = ctx.binary(Some(result), Some(Value::const_num(1.0)), '+');
        ctx.print_num(sum);
    });

    assert!(outcome
        .diagnostics
        .iter()
        .any(|e| matches!(e, BuildError::UndefinedFunction { name } if name == "undefined_fn")));
    // The substituted zero flows into later instructions and the build
    // still emits a complete module.
    assert_ir_contains(&outcome, "add 0, 1");
    assert_ir_contains(&outcome, "ret 0");
}

#[test]
fn missing_return_gets_default() {
    let outcome = build(|ctx| {
        ctx.define_function("f");
        let cond = ctx.compare(Some(Value::const_num(1.0)), Some(Value::const_num(2.0)), '<');
        ctx.if_open(cond);
        ctx.assign("y", Value::const_num(1.0));
        ctx.if_close();
        // The definition is never closed: emission must complete both the
        // function body and the entry function.
    });

    assert_no_diagnostics(&outcome);
    assert_eq!(outcome.ir.matches("ret 0").count(), 2);
}

#[test]
fn nested_control_flow_stays_well_formed() {
    let outcome = build(|ctx| {
        ctx.for_open(
            Some(Value::const_num(0.0)),
            "i",
            Some(Value::const_num(3.0)),
            LoopKind::Sequential,
        );
        let i = ctx.load("i");
        let cond = ctx.compare(Some(i), Some(Value::const_num(1.0)), '>');
        ctx.if_open(cond);
        ctx.print_str("\"big\"");
        ctx.if_close();
        ctx.for_close();
    });

    assert_no_diagnostics(&outcome);
    // Every labeled block in the dump carries instructions ending in a
    // terminator (ret or br).
    let mut last_line = "";
    for line in outcome.ir.lines() {
        if line.ends_with(':') && !last_line.ends_with('{') {
            assert!(
                last_line.trim_start().starts_with("br") || last_line.trim_start().starts_with("ret"),
                "block before '{}' is unterminated: '{}'",
                line,
                last_line
            );
        }
        last_line = line;
    }
}

#[test]
fn trace_replay_matches_direct_calls() {
    let trace = "\
num 0
num 4
pfor i
endfor
prints \"done\"
";
    let traced = build_trace(trace);

    let direct = build(|ctx| {
        ctx.for_open(
            Some(Value::const_num(0.0)),
            "i",
            Some(Value::const_num(4.0)),
            LoopKind::Parallel,
        );
        ctx.for_close();
        ctx.print_str("\"done\"");
    });

    assert_eq!(traced.ir, direct.ir);
    assert_ir_contains(&traced, "call @parallel_begin()");
}
