//! Semantic-action builder
//!
//! The front-end parser drives IR construction through an ordered sequence
//! of calls on [`BuilderContext`]: variable assignment, arithmetic and
//! comparison, if/if-else statements, counted for-loops (sequential or
//! parallel), function definition and call, and print statements.
//!
//! Every action is best-effort: errors are reported into the context's
//! [`Diagnostics`] and a safe fallback value is substituted so that
//! construction always continues. The insertion point is the last block of
//! the current function; blocks are appended exactly when the insertion
//! point moves, so creation order equals emission order.

use crate::instruction::{BinaryOp, CompareOp, Instruction, Value};
use crate::module::{Function, Module};
use crate::runtime;
use crate::types::IrType;
use selva_error::{BuildError, Diagnostics};
use std::collections::HashMap;
use tracing::{debug, error};

/// Index of the implicit entry function; it always exists
const ENTRY: usize = 0;

/// Handle to a registered function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionId(usize);

impl FunctionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Lowering strategy chosen for a counted loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Sequential,
    Parallel,
}

/// Captured when a counted loop is opened; consumed, in registration
/// order, by the loop optimization pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct LoopRecord {
    /// Initial counter value
    pub lower: Value,
    /// Exclusive upper bound
    pub upper: Value,
    /// Counter variable name
    pub counter: String,
    pub kind: LoopKind,
}

/// Per-nesting-level state of an open if/if-else statement
struct IfFrame {
    /// Present until the then-arm is closed; only for if/else
    else_label: Option<String>,
    merge_label: String,
}

/// Per-nesting-level state of an open counted loop
struct LoopFrame {
    header_label: String,
    end_label: String,
    counter_ptr: Value,
}

/// Everything a finished build hands back to the driver
#[derive(Debug)]
pub struct BuildResult {
    pub module: Module,
    /// Registered loops, in insertion order, for the optimization pipeline
    pub loop_records: Vec<LoopRecord>,
    pub diagnostics: Diagnostics,
}

/// Owns all state of one IR build
///
/// Multiple contexts can coexist in one process; nothing is shared between
/// builds.
pub struct BuilderContext {
    module: Module,
    diagnostics: Diagnostics,
    /// Function name to its latest definition; last writer wins
    registry: HashMap<String, FunctionId>,
    /// Storage scopes keyed by function index; index 0 is the module-global
    /// scope owned by the entry function
    scopes: HashMap<usize, HashMap<String, Value>>,
    /// Function owning the insertion point
    current: usize,
    label_counter: u32,
    if_stack: Vec<IfFrame>,
    loop_stack: Vec<LoopFrame>,
    loop_records: Vec<LoopRecord>,
}

impl BuilderContext {
    pub fn new(module_name: impl Into<String>) -> Self {
        let mut module = Module::new(module_name);
        module.add_function(Function::new("main", IrType::Int));
        let mut scopes = HashMap::new();
        scopes.insert(ENTRY, HashMap::new());
        Self {
            module,
            diagnostics: Diagnostics::new(),
            registry: HashMap::new(),
            scopes,
            current: ENTRY,
            label_counter: 0,
            if_stack: Vec::new(),
            loop_stack: Vec::new(),
            loop_records: Vec::new(),
        }
    }

    /// Errors reported so far
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Consumes the context and returns the built module, the loop
    /// registry and the accumulated diagnostics
    ///
    /// Control-flow frames left open by a malformed action stream get their
    /// pending blocks materialized, so every branch target exists in the
    /// dump.
    pub fn finish(mut self) -> BuildResult {
        while let Some(frame) = self.if_stack.pop() {
            if let Some(else_label) = frame.else_label {
                self.func_mut().new_block(else_label);
            }
            self.func_mut().new_block(frame.merge_label);
        }
        while let Some(frame) = self.loop_stack.pop() {
            self.func_mut().new_block(frame.end_label);
        }
        BuildResult {
            module: self.module,
            loop_records: self.loop_records,
            diagnostics: self.diagnostics,
        }
    }

    fn func_mut(&mut self) -> &mut Function {
        &mut self.module.functions[self.current]
    }

    fn current_terminated(&self) -> bool {
        self.module.functions[self.current].current_block().is_terminated()
    }

    /// Generates a unique label
    fn new_label(&mut self, prefix: &str) -> String {
        let label = format!("{}_{}", prefix, self.label_counter);
        self.label_counter += 1;
        label
    }

    fn report(&mut self, err: BuildError) {
        error!("{}", err);
        self.diagnostics.push(err);
    }

    // ---- storage manager ----

    /// Resolves a variable name to its storage slot, allocating and
    /// zero-initializing on first use
    ///
    /// Inside a user-defined function the function's private scope is
    /// consulted first, then the module-global scope. A miss allocates in
    /// the scope owning the insertion point: the alloca goes to the start
    /// of the owning function's entry block, the zero store to the current
    /// insertion point. Resolution always succeeds.
    pub fn resolve(&mut self, name: &str) -> Value {
        if self.current != ENTRY {
            if let Some(v) = self.scopes.get(&self.current).and_then(|s| s.get(name)) {
                return v.clone();
            }
        }
        if let Some(v) = self.scopes.get(&ENTRY).and_then(|s| s.get(name)) {
            return v.clone();
        }

        let owner = self.current;
        let slot = Value::slot(name);
        self.module.functions[owner].insert_entry_alloca(name, IrType::Num);
        self.func_mut().emit(Instruction::Store {
            value: Value::const_num(0.0),
            ptr: slot.clone(),
        });
        self.scopes.entry(owner).or_default().insert(name.to_string(), slot.clone());
        debug!(slot = name, "allocated storage");
        slot
    }

    /// Stores a value into the named variable
    pub fn assign(&mut self, name: &str, value: Value) {
        let ptr = self.resolve(name);
        self.func_mut().emit(Instruction::Store { value, ptr });
    }

    /// Loads the current value of the named variable
    pub fn load(&mut self, name: &str) -> Value {
        let ptr = self.resolve(name);
        let dest = self.func_mut().new_temp();
        self.func_mut().emit_with_dest(Instruction::Load { dest, ptr, ty: IrType::Num })
    }

    // ---- expression & comparison evaluator ----

    /// Builds an arithmetic instruction for `{+, -, *, /}` from two
    /// already-materialized operands
    ///
    /// A missing operand or unknown operator tag is reported and a zero
    /// constant substituted.
    pub fn binary(&mut self, lhs: Option<Value>, rhs: Option<Value>, op: char) -> Value {
        let (Some(left), Some(right)) = (lhs, rhs) else {
            self.report(BuildError::Operand { context: "binary" });
            return Value::const_num(0.0);
        };
        let op = match op {
            '+' => BinaryOp::Add,
            '-' => BinaryOp::Sub,
            '*' => BinaryOp::Mul,
            '/' => BinaryOp::Div,
            other => {
                self.report(BuildError::UnsupportedOperator { context: "binary", op: other });
                return Value::const_num(0.0);
            }
        };
        let dest = self.func_mut().new_temp();
        self.func_mut().emit_with_dest(Instruction::Binary { dest, op, left, right })
    }

    /// Builds a comparison instruction for `{>, <, =}`; ordered float
    /// semantics
    ///
    /// A missing operand or unknown operator tag is reported and a false
    /// constant substituted.
    pub fn compare(&mut self, lhs: Option<Value>, rhs: Option<Value>, op: char) -> Value {
        let (Some(left), Some(right)) = (lhs, rhs) else {
            self.report(BuildError::Operand { context: "comparison" });
            return Value::ConstBool(false);
        };
        let op = match op {
            '>' => CompareOp::Gt,
            '<' => CompareOp::Lt,
            '=' => CompareOp::Eq,
            other => {
                self.report(BuildError::UnsupportedOperator { context: "comparison", op: other });
                return Value::ConstBool(false);
            }
        };
        let dest = self.func_mut().new_temp();
        self.func_mut().emit_with_dest(Instruction::Compare { dest, op, left, right })
    }

    // ---- control-flow block builder ----

    /// Opens an if statement without an else arm
    pub fn if_open(&mut self, cond: Value) {
        let then_label = self.new_label("then");
        let merge_label = self.new_label("ifcont");
        self.func_mut().emit(Instruction::CondBranch {
            cond,
            then_label: then_label.clone(),
            else_label: merge_label.clone(),
        });
        self.func_mut().new_block(then_label);
        self.if_stack.push(IfFrame { else_label: None, merge_label });
    }

    /// Opens an if/else statement; insertion moves into the then arm
    pub fn if_else_open(&mut self, cond: Value) {
        let then_label = self.new_label("then");
        let else_label = self.new_label("else");
        let merge_label = self.new_label("ifcont");
        self.func_mut().emit(Instruction::CondBranch {
            cond,
            then_label: then_label.clone(),
            else_label: else_label.clone(),
        });
        self.func_mut().new_block(then_label);
        self.if_stack.push(IfFrame { else_label: Some(else_label), merge_label });
    }

    /// Closes the then arm of an if/else and moves insertion into the else
    /// arm
    pub fn then_close(&mut self) {
        let (else_label, merge_label) = match self.if_stack.last_mut() {
            Some(frame) => match frame.else_label.take() {
                Some(else_label) => (else_label, frame.merge_label.clone()),
                None => return,
            },
            None => return,
        };
        if !self.current_terminated() {
            self.func_mut().emit(Instruction::Branch { target: merge_label });
        }
        self.func_mut().new_block(else_label);
    }

    /// Closes an if statement (or the else arm of an if/else); insertion
    /// moves to the merge block
    ///
    /// The branch to the merge block is skipped when the current block
    /// already ends in a terminator, e.g. because of a nested structure.
    pub fn if_close(&mut self) {
        let Some(frame) = self.if_stack.pop() else { return };
        if !self.current_terminated() {
            self.func_mut().emit(Instruction::Branch {
                target: frame.merge_label.clone(),
            });
        }
        self.func_mut().new_block(frame.merge_label);
    }

    /// Opens a counted for-loop: stores the initial counter value, builds
    /// the header/body/end skeleton with a strict `<` bound test, and
    /// registers a [`LoopRecord`] for the optimization pipeline
    ///
    /// A missing bound is reported and a loop over `[0, 0)` substituted, so
    /// the body runs zero times and the matching close stays balanced.
    pub fn for_open(
        &mut self,
        init: Option<Value>,
        counter: &str,
        end: Option<Value>,
        kind: LoopKind,
    ) {
        let (init, end) = match (init, end) {
            (Some(init), Some(end)) => (init, end),
            _ => {
                self.report(BuildError::LoopBounds { counter: counter.to_string() });
                (Value::const_num(0.0), Value::const_num(0.0))
            }
        };

        let counter_ptr = self.resolve(counter);
        self.func_mut().emit(Instruction::Store {
            value: init.clone(),
            ptr: counter_ptr.clone(),
        });

        let header_label = self.new_label("loop_header");
        let body_label = self.new_label("loop_body");
        let end_label = self.new_label("loop_end");

        self.func_mut().emit(Instruction::Branch { target: header_label.clone() });
        self.func_mut().new_block(header_label.clone());

        let dest = self.func_mut().new_temp();
        let current = self.func_mut().emit_with_dest(Instruction::Load {
            dest,
            ptr: counter_ptr.clone(),
            ty: IrType::Num,
        });
        let dest = self.func_mut().new_temp();
        let cond = self.func_mut().emit_with_dest(Instruction::Compare {
            dest,
            op: CompareOp::Lt,
            left: current,
            right: end.clone(),
        });
        self.func_mut().emit(Instruction::CondBranch {
            cond,
            then_label: body_label.clone(),
            else_label: end_label.clone(),
        });
        self.func_mut().new_block(body_label);

        debug!(counter, ?kind, "for loop opened");
        self.loop_records.push(LoopRecord {
            lower: init,
            upper: end,
            counter: counter.to_string(),
            kind,
        });
        self.loop_stack.push(LoopFrame { header_label, end_label, counter_ptr });
    }

    /// Closes the innermost open loop: increments the counter by one,
    /// branches back to the header, and moves insertion to the end block
    pub fn for_close(&mut self) {
        let Some(frame) = self.loop_stack.pop() else {
            self.report(BuildError::DanglingLoop);
            return;
        };
        let dest = self.func_mut().new_temp();
        let current = self.func_mut().emit_with_dest(Instruction::Load {
            dest,
            ptr: frame.counter_ptr.clone(),
            ty: IrType::Num,
        });
        let dest = self.func_mut().new_temp();
        let next = self.func_mut().emit_with_dest(Instruction::Binary {
            dest,
            op: BinaryOp::Add,
            left: current,
            right: Value::const_num(1.0),
        });
        self.func_mut().emit(Instruction::Store { value: next, ptr: frame.counter_ptr });
        self.func_mut().emit(Instruction::Branch { target: frame.header_label });
        self.func_mut().new_block(frame.end_label);
    }

    // ---- function registry ----

    /// Defines a new function with a numeric return type and a fresh
    /// private scope; insertion moves into its entry block
    ///
    /// Re-using an existing name silently shadows the previous definition
    /// in the registry: last writer wins, and both bodies remain in the
    /// module.
    pub fn define_function(&mut self, name: &str) -> FunctionId {
        let idx = self.module.add_function(Function::new(name, IrType::Num));
        let id = FunctionId(idx);
        self.registry.insert(name.to_string(), id);
        self.scopes.insert(idx, HashMap::new());
        self.current = idx;
        debug!(name, "function definition opened");
        id
    }

    /// Ends the current function definition with the given return value
    /// (zero if omitted) and restores insertion to the entry function
    ///
    /// A no-op when the insertion point is not inside a user function.
    pub fn end_function(&mut self, ret: Option<Value>) {
        if self.current == ENTRY {
            return;
        }
        let value = ret.unwrap_or_else(|| Value::const_num(0.0));
        self.func_mut().emit(Instruction::Return(value));
        self.current = ENTRY;
    }

    /// Emits a call to a registered function and returns its result
    ///
    /// An unregistered name is reported and a zero constant substituted.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Value {
        if !self.registry.contains_key(name) {
            self.report(BuildError::UndefinedFunction { name: name.to_string() });
            return Value::const_num(0.0);
        }
        let dest = self.func_mut().new_temp();
        self.func_mut().emit_with_dest(Instruction::Call {
            dest: Some(dest),
            func: name.to_string(),
            args,
        })
    }

    /// Looks up the latest definition registered under a name
    pub fn lookup_function(&self, name: &str) -> Option<FunctionId> {
        self.registry.get(name).copied()
    }

    // ---- print statements ----

    /// Prints a string literal; one pair of surrounding double quotes is
    /// stripped
    pub fn print_str(&mut self, literal: &str) {
        let text = literal
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(literal);
        let idx = self.module.add_string(text.to_string());
        self.func_mut().emit(Instruction::Call {
            dest: None,
            func: runtime::PRINT_STR.to_string(),
            args: vec![Value::ConstStr(idx)],
        });
    }

    /// Prints a numeric value
    pub fn print_num(&mut self, value: Value) {
        self.func_mut().emit(Instruction::Call {
            dest: None,
            func: runtime::PRINT_NUM.to_string(),
            args: vec![value],
        });
    }
}
