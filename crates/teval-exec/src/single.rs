//! One-instruction evaluation, and the tree-walk path for lambdas that do not
//! compile.

use std::sync::Arc;

use teval_core::value::Value;
use teval_ops::TensorEngine;
use teval_planner::{InstrOp, Instruction, LambdaTree};

use crate::params::RefParams;
use crate::runtime::{step, Slot, State};

/// Runs exactly one precompiled instruction against caller-provided values.
///
/// Keeps its own `State`, so repeated calls reuse the same stack and stash.
pub struct EvalSingle {
    state: State,
    instr: Instruction,
}

impl EvalSingle {
    pub fn new(engine: Arc<dyn TensorEngine>, instr: Instruction) -> Self {
        assert_eq!(
            instr.pushes(),
            1,
            "{} does not produce a value and cannot run on its own",
            instr.name()
        );
        assert!(
            !matches!(instr.op, InstrOp::Param(_)),
            "param reads a call binding and cannot run on its own"
        );
        Self {
            state: State::new(engine),
            instr,
        }
    }

    pub fn instruction(&self) -> &Instruction {
        &self.instr
    }

    /// The result stays valid until the next call.
    pub fn eval(&mut self, inputs: &[&Value]) -> &Value {
        assert_eq!(
            inputs.len(),
            self.instr.arity(),
            "{} takes {} inputs",
            self.instr.name(),
            self.instr.arity()
        );
        let program = std::slice::from_ref(&self.instr);
        let params = RefParams(inputs);

        self.state.init();
        self.state.stack.extend((0..inputs.len()).map(Slot::Param));
        step(&mut self.state, program, 0, &params);
        assert_eq!(
            self.state.stack.len(),
            1,
            "instruction must leave exactly one value on the stack"
        );

        let top = self.state.stack[0];
        match top {
            Slot::Temp(h) => self.state.stash.get(h),
            Slot::Const(_) => match &self.instr.op {
                InstrOp::Const(v) => v,
                other => panic!("constant slot for {other:?}"),
            },
            Slot::Param(idx) => panic!("instruction left input {idx} on the stack"),
        }
    }
}

/// Evaluates a `LambdaTree` cell by cell with one `EvalSingle` per node.
pub struct LambdaWalker {
    tree: Arc<LambdaTree>,
    singles: Vec<EvalSingle>,
}

impl LambdaWalker {
    pub fn new(engine: Arc<dyn TensorEngine>, tree: Arc<LambdaTree>) -> Self {
        let singles = tree
            .instructions()
            .into_iter()
            .map(|(_, instr)| EvalSingle::new(engine.clone(), instr.clone()))
            .collect();
        Self { tree, singles }
    }

    /// Apply the lambda to one tuple of cells.
    pub fn call(&mut self, args: &[f64]) -> f64 {
        walk(&self.tree, &mut self.singles, args).as_double()
    }
}

fn walk(tree: &LambdaTree, singles: &mut [EvalSingle], args: &[f64]) -> Value {
    match tree {
        LambdaTree::Arg(i) => Value::double(args.get(*i).copied().unwrap_or(f64::NAN)),
        LambdaTree::Node { slot, children, .. } => {
            let values: Vec<Value> = children.iter().map(|c| walk(c, singles, args)).collect();
            let refs: Vec<&Value> = values.iter().collect();
            singles[*slot].eval(&refs).clone()
        }
        LambdaTree::If {
            cond,
            true_branch,
            false_branch,
        } => {
            if walk(cond, singles, args).as_double() != 0.0 {
                walk(true_branch, singles, args)
            } else {
                walk(false_branch, singles, args)
            }
        }
    }
}
