//! Action-trace replay
//!
//! A line-oriented serialization of the semantic-action interface, used to
//! drive a build without a language front end. One action per line, `#`
//! comments and blank lines skipped; operand values travel on a stack:
//!
//! ```text
//! num 3.5          push a numeric constant
//! load x           push the current value of a variable
//! set x            pop a value and store it into a variable
//! bin +            pop rhs and lhs, push the arithmetic result
//! cmp <            pop rhs and lhs, push the comparison result
//! if / ifelse      pop the condition and open the statement
//! else             close the then arm of an if/else
//! endif            close an if or if/else
//! for i / pfor i   pop end and init bounds, open a (parallel) counted loop
//! endfor           close the innermost loop
//! def f            open a function definition
//! enddef [ret]     close it; "enddef ret" pops the return value
//! call f 2         pop two arguments, push the call result
//! prints "text"    print a string literal
//! printn           pop a value and print it
//! ```
//!
//! Malformed lines abort the replay; everything the builder itself can
//! recover from (unknown operators, undefined functions) flows through to
//! its diagnostics instead.

use selva_ir::{BuilderContext, LoopKind, Value};
use thiserror::Error;

/// A malformed trace line
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct TraceError {
    pub line: usize,
    pub message: String,
}

/// Replays a trace through the builder
pub fn replay(source: &str, ctx: &mut BuilderContext) -> Result<(), TraceError> {
    let mut stack: Vec<Value> = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let (action, rest) = match text.split_once(char::is_whitespace) {
            Some((action, rest)) => (action, rest.trim()),
            None => (text, ""),
        };

        match action {
            "num" => {
                let value: f64 = rest
                    .parse()
                    .map_err(|_| err(line, format!("invalid number '{}'", rest)))?;
                stack.push(Value::const_num(value));
            }
            "load" => {
                let name = require_name(line, action, rest)?;
                let value = ctx.load(name);
                stack.push(value);
            }
            "set" => {
                let name = require_name(line, action, rest)?;
                let value = pop(&mut stack, line, action)?;
                ctx.assign(name, value);
            }
            "bin" | "cmp" => {
                let op = rest
                    .chars()
                    .next()
                    .ok_or_else(|| err(line, format!("missing operator in '{}'", action)))?;
                let rhs = pop(&mut stack, line, action)?;
                let lhs = pop(&mut stack, line, action)?;
                let value = if action == "bin" {
                    ctx.binary(Some(lhs), Some(rhs), op)
                } else {
                    ctx.compare(Some(lhs), Some(rhs), op)
                };
                stack.push(value);
            }
            "if" => {
                let cond = pop(&mut stack, line, action)?;
                ctx.if_open(cond);
            }
            "ifelse" => {
                let cond = pop(&mut stack, line, action)?;
                ctx.if_else_open(cond);
            }
            "else" => ctx.then_close(),
            "endif" => ctx.if_close(),
            "for" | "pfor" => {
                let name = require_name(line, action, rest)?;
                let end = pop(&mut stack, line, action)?;
                let init = pop(&mut stack, line, action)?;
                let kind = if action == "pfor" { LoopKind::Parallel } else { LoopKind::Sequential };
                ctx.for_open(Some(init), name, Some(end), kind);
            }
            "endfor" => ctx.for_close(),
            "def" => {
                let name = require_name(line, action, rest)?;
                ctx.define_function(name);
            }
            "enddef" => {
                let ret = match rest {
                    "ret" => Some(pop(&mut stack, line, action)?),
                    "" => None,
                    other => return Err(err(line, format!("unexpected '{}' after enddef", other))),
                };
                ctx.end_function(ret);
            }
            "call" => {
                let mut parts = rest.split_whitespace();
                let name = parts
                    .next()
                    .ok_or_else(|| err(line, "missing function name in 'call'".to_string()))?;
                let argc: usize = match parts.next() {
                    Some(count) => count
                        .parse()
                        .map_err(|_| err(line, format!("invalid argument count '{}'", count)))?,
                    None => 0,
                };
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(pop(&mut stack, line, action)?);
                }
                args.reverse();
                let value = ctx.call(name, args);
                stack.push(value);
            }
            "prints" => ctx.print_str(rest),
            "printn" => {
                let value = pop(&mut stack, line, action)?;
                ctx.print_num(value);
            }
            other => return Err(err(line, format!("unknown action '{}'", other))),
        }
    }

    Ok(())
}

fn err(line: usize, message: String) -> TraceError {
    TraceError { line, message }
}

fn require_name<'a>(line: usize, action: &str, rest: &'a str) -> Result<&'a str, TraceError> {
    if rest.is_empty() {
        return Err(err(line, format!("missing name in '{}'", action)));
    }
    Ok(rest)
}

fn pop(stack: &mut Vec<Value>, line: usize, action: &str) -> Result<Value, TraceError> {
    stack
        .pop()
        .ok_or_else(|| err(line, format!("value stack empty in '{}'", action)))
}
