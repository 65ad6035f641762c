//! Physical program: a flat list of stack-machine instructions.
//!
//! Each instruction pops `arity()` values and pushes `pushes()` values. Only
//! the two skip instructions push nothing; they implement conditionals by
//! jumping forward, so every program is a DAG of straight-line blocks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use teval_core::expr::Aggr;
use teval_core::types::ValueType;
use teval_core::value::Value;
use teval_core::{Error, Result};
use teval_ops::{CompiledLambda, Op1, Op2};

/// How a map instruction computes one cell.
#[derive(Debug, Clone)]
pub enum CellFn1 {
    Op(Op1),
    Compiled(Arc<CompiledLambda>),
    Walk(Arc<LambdaTree>),
}

/// How a join or merge instruction combines two cells.
#[derive(Debug, Clone)]
pub enum CellFn2 {
    Op(Op2),
    Compiled(Arc<CompiledLambda>),
    Walk(Arc<LambdaTree>),
}

/// Plan for lambdas that do not compile: the lambda body as a tree of single
/// instructions, run one at a time by the tree-walk fallback.
#[derive(Debug, Clone)]
pub enum LambdaTree {
    /// Lambda argument.
    Arg(usize),
    /// One instruction over the values of `children`. `slot` numbers the
    /// instruction within its tree, densely from 0.
    Node {
        slot: usize,
        instr: Instruction,
        children: Vec<LambdaTree>,
    },
    If {
        cond: Box<LambdaTree>,
        true_branch: Box<LambdaTree>,
        false_branch: Box<LambdaTree>,
    },
}

impl LambdaTree {
    /// Every `(slot, instruction)` in the tree.
    pub fn instructions(&self) -> Vec<(usize, &Instruction)> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out.sort_by_key(|(slot, _)| *slot);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<(usize, &'a Instruction)>) {
        match self {
            LambdaTree::Arg(_) => {}
            LambdaTree::Node {
                slot,
                instr,
                children,
            } => {
                out.push((*slot, instr));
                for c in children {
                    c.collect(out);
                }
            }
            LambdaTree::If {
                cond,
                true_branch,
                false_branch,
            } => {
                cond.collect(out);
                true_branch.collect(out);
                false_branch.collect(out);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum InstrOp {
    Const(Value),
    Param(usize),
    Map { function: CellFn1, inplace: bool },
    Join { function: CellFn2 },
    Merge { function: CellFn2 },
    Reduce { aggr: Aggr, dims: Vec<String> },
    Rename { from: Vec<String>, to: Vec<String> },
    Concat { dim: String },
    /// Pop the condition; when it is false skip the next `offset` instructions.
    SkipIfFalse { offset: usize },
    /// Skip the next `offset` instructions.
    Skip { offset: usize },
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: InstrOp,
    pub result_type: ValueType,
}

impl Instruction {
    pub fn new(op: InstrOp, result_type: ValueType) -> Self {
        Self { op, result_type }
    }

    /// Values popped from the stack.
    pub fn arity(&self) -> usize {
        match self.op {
            InstrOp::Const(_) | InstrOp::Param(_) | InstrOp::Skip { .. } => 0,
            InstrOp::Map { .. }
            | InstrOp::Reduce { .. }
            | InstrOp::Rename { .. }
            | InstrOp::SkipIfFalse { .. } => 1,
            InstrOp::Join { .. } | InstrOp::Merge { .. } | InstrOp::Concat { .. } => 2,
        }
    }

    /// Values pushed onto the stack.
    pub fn pushes(&self) -> usize {
        match self.op {
            InstrOp::SkipIfFalse { .. } | InstrOp::Skip { .. } => 0,
            _ => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.op {
            InstrOp::Const(_) => "const",
            InstrOp::Param(_) => "param",
            InstrOp::Map { .. } => "map",
            InstrOp::Join { .. } => "join",
            InstrOp::Merge { .. } => "merge",
            InstrOp::Reduce { .. } => "reduce",
            InstrOp::Rename { .. } => "rename",
            InstrOp::Concat { .. } => "concat",
            InstrOp::SkipIfFalse { .. } => "skip_if_false",
            InstrOp::Skip { .. } => "skip",
        }
    }
}

/// Instruction counts by kind, for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStats {
    pub instructions: usize,
    pub maps: usize,
    pub inplace_maps: usize,
    pub joins: usize,
    pub merges: usize,
    pub compiled_lambdas: usize,
    pub walked_lambdas: usize,
    pub branches: usize,
}

/// Immutable compiled program. Shareable across threads.
#[derive(Debug, Clone)]
pub struct Program {
    instructions: Vec<Instruction>,
    result_type: ValueType,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>, result_type: ValueType) -> Self {
        Self {
            instructions,
            result_type,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn result_type(&self) -> &ValueType {
        &self.result_type
    }

    pub fn stats(&self) -> ProgramStats {
        let mut s = ProgramStats {
            instructions: self.instructions.len(),
            ..ProgramStats::default()
        };
        for instr in &self.instructions {
            match &instr.op {
                InstrOp::Map { function, inplace } => {
                    s.maps += 1;
                    s.inplace_maps += usize::from(*inplace);
                    match function {
                        CellFn1::Op(_) => {}
                        CellFn1::Compiled(_) => s.compiled_lambdas += 1,
                        CellFn1::Walk(_) => s.walked_lambdas += 1,
                    }
                }
                InstrOp::Join { function } | InstrOp::Merge { function } => {
                    if matches!(instr.op, InstrOp::Join { .. }) {
                        s.joins += 1;
                    } else {
                        s.merges += 1;
                    }
                    match function {
                        CellFn2::Op(_) => {}
                        CellFn2::Compiled(_) => s.compiled_lambdas += 1,
                        CellFn2::Walk(_) => s.walked_lambdas += 1,
                    }
                }
                InstrOp::SkipIfFalse { .. } => s.branches += 1,
                _ => {}
            }
        }
        s
    }

    /// Check stack discipline along every path: no instruction pops more than
    /// is there, paths that meet agree on depth, jumps stay in bounds, and
    /// exactly one value remains at the end.
    pub fn verify(&self) -> Result<()> {
        let n = self.instructions.len();
        let mut depth: Vec<Option<usize>> = vec![None; n + 1];
        depth[0] = Some(0);

        for (pc, instr) in self.instructions.iter().enumerate() {
            let Some(d) = depth[pc] else {
                continue;
            };
            if d < instr.arity() {
                return Err(Error::Invariant(format!(
                    "{} at {pc} pops {} values, stack holds {d}",
                    instr.name(),
                    instr.arity()
                )));
            }
            let after = d - instr.arity() + instr.pushes();
            let mut targets = Vec::with_capacity(2);
            match instr.op {
                InstrOp::SkipIfFalse { offset } => {
                    targets.push(pc + 1);
                    targets.push(pc + 1 + offset);
                }
                InstrOp::Skip { offset } => targets.push(pc + 1 + offset),
                _ => targets.push(pc + 1),
            }
            for t in targets {
                if t > n {
                    return Err(Error::Invariant(format!(
                        "{} at {pc} jumps to {t}, past the end ({n})",
                        instr.name()
                    )));
                }
                match depth[t] {
                    Some(existing) if existing != after => {
                        return Err(Error::Invariant(format!(
                            "paths reach {t} with stack depths {existing} and {after}"
                        )))
                    }
                    _ => depth[t] = Some(after),
                }
            }
        }

        match depth[n] {
            Some(1) => Ok(()),
            Some(d) => Err(Error::Invariant(format!(
                "program ends with {d} values on the stack"
            ))),
            None => Err(Error::Invariant("program end is unreachable".to_string())),
        }
    }
}
