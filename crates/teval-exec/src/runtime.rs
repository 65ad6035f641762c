//! Stack-machine interpreter.
//!
//! Behavior:
//! - `InterpretedFunction` owns the optimized IR and the compiled `Program`;
//!   both are immutable and shared freely across threads.
//! - A `Context` owns the mutable per-worker `State` (value stack, stash,
//!   instruction pointer, branch counter). Each `eval` resets it in place.
//! - Stack entries are slots, never values: parameters are read where the
//!   caller keeps them, constants where the program keeps them, and only
//!   computed values live in the stash.
//! - A map flagged in-place overwrites its input when that input is a stash
//!   value; anything else gets a new value.

use std::sync::Arc;

use thiserror::Error;

use teval_core::config::EvalConfig;
use teval_core::expr::{Function, NodeTypes};
use teval_core::types::ValueType;
use teval_core::value::Value;
use teval_ops::TensorEngine;
use teval_planner::{
    lower, make_ir, optimize, CellFn1, CellFn2, InstrOp, Instruction, IrRef, LambdaTree, Program,
};

use crate::cost::BenchmarkTimer;
use crate::issues::{detect_issues, Issues};
use crate::params::{Binding, LazyParams, ValueParams};
use crate::single::LambdaWalker;
use crate::stash::{Stash, StashHandle};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid configuration: {0}")]
    Config(#[source] teval_core::Error),
    #[error("malformed program: {0}")]
    Program(#[source] teval_core::Error),
}

/// Where a stack entry's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Caller binding, by parameter index.
    Param(usize),
    /// Stash value produced during this call.
    Temp(StashHandle),
    /// Constant held by the instruction at this program offset.
    Const(usize),
}

/// Mutable execution state, reused across calls.
pub struct State {
    pub(crate) engine: Arc<dyn TensorEngine>,
    pub(crate) stash: Stash,
    pub(crate) stack: Vec<Slot>,
    pub(crate) program_offset: usize,
    pub(crate) if_cnt: usize,
    walkers: Vec<(Arc<LambdaTree>, LambdaWalker)>,
}

impl State {
    pub fn new(engine: Arc<dyn TensorEngine>) -> Self {
        Self {
            engine,
            stash: Stash::new(),
            stack: Vec::new(),
            program_offset: 0,
            if_cnt: 0,
            walkers: Vec::new(),
        }
    }

    /// Reset for a new call. Clears, never reallocates.
    pub(crate) fn init(&mut self) {
        self.stack.clear();
        self.stash.clear();
        self.program_offset = 0;
        self.if_cnt = 0;
    }

    pub fn stash(&self) -> &Stash {
        &self.stash
    }

    /// Conditionals evaluated during the last call.
    pub fn if_count(&self) -> usize {
        self.if_cnt
    }
}

/// Per-worker evaluation context for one `InterpretedFunction`.
pub struct Context {
    state: State,
}

impl Context {
    pub fn new(function: &InterpretedFunction) -> Self {
        Self {
            state: State::new(function.engine.clone()),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }
}

pub struct InterpretedFunction {
    engine: Arc<dyn TensorEngine>,
    ir: IrRef,
    program: Program,
    num_params: usize,
}

impl InterpretedFunction {
    /// Optimize (when enabled) and compile `ir`. Panics if lowering produced
    /// a malformed program; see `try_new` for the checked variant.
    pub fn new(engine: Arc<dyn TensorEngine>, ir: IrRef, cfg: &EvalConfig) -> Self {
        match Self::try_new(engine, ir, cfg) {
            Ok(f) => f,
            Err(e) => panic!("cannot build interpreted function: {e}"),
        }
    }

    pub fn try_new(
        engine: Arc<dyn TensorEngine>,
        ir: IrRef,
        cfg: &EvalConfig,
    ) -> Result<Self, ExecError> {
        cfg.validate().map_err(ExecError::Config)?;
        let ir = if cfg.optimize { optimize(ir) } else { ir };
        let program = lower(&ir, cfg);
        program.verify().map_err(ExecError::Program)?;
        let num_params = max_param(program.instructions()).map_or(0, |p| p + 1);
        Ok(Self {
            engine,
            ir,
            program,
            num_params,
        })
    }

    /// Build, optimize and compile a typed expression tree.
    pub fn from_function(
        engine: Arc<dyn TensorEngine>,
        function: &Function,
        types: &NodeTypes,
        cfg: &EvalConfig,
    ) -> Self {
        Self::new(engine, make_ir(function, types), cfg)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The IR the program was compiled from, after optimization.
    pub fn ir(&self) -> &IrRef {
        &self.ir
    }

    pub fn result_type(&self) -> &ValueType {
        self.program.result_type()
    }

    pub fn engine(&self) -> &Arc<dyn TensorEngine> {
        &self.engine
    }

    /// Evaluate once. The result lives in `ctx` (or in `params`, or in this
    /// function) and stays valid until the next call on `ctx`.
    pub fn eval<'a>(&'a self, ctx: &'a mut Context, params: &'a dyn LazyParams) -> &'a Value {
        let program = self.program.instructions();
        let state = &mut ctx.state;
        state.init();
        while state.program_offset < program.len() {
            let pc = state.program_offset;
            state.program_offset += 1;
            step(state, program, pc, params);
        }
        assert_eq!(
            state.stack.len(),
            1,
            "program must leave exactly one value on the stack"
        );
        read(state.stack[0], &state.stash, params, program)
    }

    /// Average wall-clock cost of one `eval` in microseconds. Parameter `i`
    /// is bound to a value of the type the program reads it as, with every
    /// cell set to `params[i]` (missing ones get 0.5).
    pub fn estimate_cost_us(&self, params: &[f64], budget_secs: f64) -> f64 {
        let mut types = vec![ValueType::double(); self.num_params];
        for instr in self.program.instructions() {
            if let InstrOp::Param(idx) = &instr.op {
                types[*idx] = instr.result_type.clone();
            }
        }
        let mut bindings = ValueParams::new();
        for (i, ty) in types.into_iter().enumerate() {
            bindings.push(Value::filled(ty, params.get(i).copied().unwrap_or(0.5)));
        }
        self.estimate_cost_us_with(&bindings, budget_secs)
    }

    /// Like `estimate_cost_us`, for arbitrary bindings. Fresh bindings are
    /// consumed by the first call, so pass shared ones here.
    pub fn estimate_cost_us_with(&self, params: &dyn LazyParams, budget_secs: f64) -> f64 {
        let mut ctx = Context::new(self);
        let mut timer = BenchmarkTimer::new(budget_secs);
        let per_call = timer.run(|| {
            self.eval(&mut ctx, params);
        });
        let us = per_call * 1_000_000.0;
        crate::metrics::emit_span(
            "estimate_cost",
            &[
                ("us", format!("{us:.3}")),
                ("instructions", self.program.len().to_string()),
                ("rounds", timer.rounds().to_string()),
            ],
        );
        us
    }

    /// Embedded lambdas in `function` that the lambda compiler rejects.
    pub fn detect_issues(function: &Function) -> Issues {
        detect_issues(function)
    }
}

fn max_param(program: &[Instruction]) -> Option<usize> {
    program
        .iter()
        .filter_map(|i| match i.op {
            InstrOp::Param(p) => Some(p),
            _ => None,
        })
        .max()
}

/// Resolve a slot to its value.
pub(crate) fn read<'a>(
    slot: Slot,
    stash: &'a Stash,
    params: &'a dyn LazyParams,
    program: &'a [Instruction],
) -> &'a Value {
    match slot {
        Slot::Temp(h) => stash.get(h),
        Slot::Param(idx) => params
            .external(idx)
            .unwrap_or_else(|| panic!("parameter {idx} has no external binding")),
        Slot::Const(pc) => match &program[pc].op {
            InstrOp::Const(v) => v,
            other => panic!("slot points at non-constant instruction {pc}: {other:?}"),
        },
    }
}

fn pop(stack: &mut Vec<Slot>, pc: usize) -> Slot {
    stack
        .pop()
        .unwrap_or_else(|| panic!("stack underflow at instruction {pc}"))
}

type Walkers = Vec<(Arc<LambdaTree>, LambdaWalker)>;

fn walker<'w>(
    walkers: &'w mut Walkers,
    engine: &Arc<dyn TensorEngine>,
    tree: &Arc<LambdaTree>,
) -> &'w mut LambdaWalker {
    let pos = match walkers.iter().position(|(t, _)| Arc::ptr_eq(t, tree)) {
        Some(p) => p,
        None => {
            walkers.push((tree.clone(), LambdaWalker::new(engine.clone(), tree.clone())));
            walkers.len() - 1
        }
    };
    &mut walkers[pos].1
}

fn unary<'w>(
    function: &'w CellFn1,
    engine: &Arc<dyn TensorEngine>,
    walkers: &'w mut Walkers,
) -> Box<dyn FnMut(f64) -> f64 + 'w> {
    match function {
        CellFn1::Op(op) => {
            let op = *op;
            Box::new(move |x| op.apply(x))
        }
        CellFn1::Compiled(c) => {
            let mut scratch = Vec::with_capacity(c.max_depth());
            Box::new(move |x| c.eval(&[x], &mut scratch))
        }
        CellFn1::Walk(tree) => {
            let w = walker(walkers, engine, tree);
            Box::new(move |x| w.call(&[x]))
        }
    }
}

fn binary<'w>(
    function: &'w CellFn2,
    engine: &Arc<dyn TensorEngine>,
    walkers: &'w mut Walkers,
) -> Box<dyn FnMut(f64, f64) -> f64 + 'w> {
    match function {
        CellFn2::Op(op) => {
            let op = *op;
            Box::new(move |a, b| op.apply(a, b))
        }
        CellFn2::Compiled(c) => {
            let mut scratch = Vec::with_capacity(c.max_depth());
            Box::new(move |a, b| c.eval(&[a, b], &mut scratch))
        }
        CellFn2::Walk(tree) => {
            let w = walker(walkers, engine, tree);
            Box::new(move |a, b| w.call(&[a, b]))
        }
    }
}

/// Execute the instruction at `pc`.
pub(crate) fn step(state: &mut State, program: &[Instruction], pc: usize, params: &dyn LazyParams) {
    let instr = &program[pc];
    let State {
        engine,
        stash,
        stack,
        program_offset,
        if_cnt,
        walkers,
    } = state;

    match &instr.op {
        InstrOp::Const(_) => stack.push(Slot::Const(pc)),
        InstrOp::Param(idx) => {
            let slot = match params.resolve(*idx, stash) {
                Binding::External => Slot::Param(*idx),
                Binding::Stashed(h) => Slot::Temp(h),
            };
            stack.push(slot);
        }
        InstrOp::Map { function, inplace } => {
            let src = pop(stack, pc);
            let mut f = unary(function, engine, walkers);
            match src {
                Slot::Temp(h) if *inplace => {
                    engine.map_in_place(stash.get_mut(h), &mut *f);
                    stack.push(Slot::Temp(h));
                }
                _ => {
                    let out = engine.map(read(src, stash, params, program), &mut *f);
                    stack.push(Slot::Temp(stash.alloc(out)));
                }
            }
        }
        InstrOp::Join { function } => {
            let rhs = pop(stack, pc);
            let lhs = pop(stack, pc);
            let mut f = binary(function, engine, walkers);
            let out = engine.join(
                read(lhs, stash, params, program),
                read(rhs, stash, params, program),
                &mut *f,
                &instr.result_type,
            );
            stack.push(Slot::Temp(stash.alloc(out)));
        }
        InstrOp::Merge { function } => {
            let rhs = pop(stack, pc);
            let lhs = pop(stack, pc);
            let mut f = binary(function, engine, walkers);
            let out = engine.merge(
                read(lhs, stash, params, program),
                read(rhs, stash, params, program),
                &mut *f,
                &instr.result_type,
            );
            stack.push(Slot::Temp(stash.alloc(out)));
        }
        InstrOp::Reduce { aggr, dims } => {
            let src = pop(stack, pc);
            let out = engine.reduce(
                read(src, stash, params, program),
                *aggr,
                dims,
                &instr.result_type,
            );
            stack.push(Slot::Temp(stash.alloc(out)));
        }
        InstrOp::Rename { from, to } => {
            let src = pop(stack, pc);
            let out = engine.rename(
                read(src, stash, params, program),
                from,
                to,
                &instr.result_type,
            );
            stack.push(Slot::Temp(stash.alloc(out)));
        }
        InstrOp::Concat { dim } => {
            let rhs = pop(stack, pc);
            let lhs = pop(stack, pc);
            let out = engine.concat(
                read(lhs, stash, params, program),
                read(rhs, stash, params, program),
                dim,
                &instr.result_type,
            );
            stack.push(Slot::Temp(stash.alloc(out)));
        }
        InstrOp::SkipIfFalse { offset } => {
            let cond = pop(stack, pc);
            *if_cnt += 1;
            if read(cond, stash, params, program).as_double() == 0.0 {
                *program_offset += offset;
            }
        }
        InstrOp::Skip { offset } => *program_offset += offset,
    }
}
