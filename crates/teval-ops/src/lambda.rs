//! Compiling embedded lambdas into postfix cell programs.
//!
//! A lambda compiles when its body is a pure scalar expression over its own
//! arguments: numbers, argument symbols, negation, `!`, infix operators and
//! calls with the right number of arguments. Conditionals and nested tensor
//! operations do not compile; the planner routes those through the tree-walk
//! path instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use teval_core::expr::{Lambda, Node};

use crate::ops::{Op1, Op2};

#[derive(Debug, Error)]
pub enum LambdaError {
    #[error("lambda cannot be compiled: {}", .0.join("; "))]
    Unsupported(Vec<String>),

    #[error("lambda cache key: {0}")]
    Key(#[from] teval_core::Error),
}

/// One postfix instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Step {
    Num(f64),
    Arg(usize),
    Op1(Op1),
    Op2(Op2),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledLambda {
    arity: usize,
    steps: Vec<Step>,
    max_depth: usize,
}

impl CompiledLambda {
    pub fn compile(lambda: &Lambda) -> Result<Self, LambdaError> {
        let issues = Self::detect_issues(lambda);
        if !issues.is_empty() {
            return Err(LambdaError::Unsupported(issues));
        }
        let mut steps = Vec::new();
        emit(&lambda.body, &mut steps)?;

        let (mut depth, mut max_depth) = (0usize, 0usize);
        for step in &steps {
            match step {
                Step::Num(_) | Step::Arg(_) => depth += 1,
                Step::Op1(_) => {}
                Step::Op2(_) => depth -= 1,
            }
            max_depth = max_depth.max(depth);
        }

        Ok(Self {
            arity: lambda.arity,
            steps,
            max_depth,
        })
    }

    /// Everything in `lambda` that keeps it from compiling, one line each.
    pub fn detect_issues(lambda: &Lambda) -> Vec<String> {
        let mut issues = Vec::new();
        lambda.body.walk(&mut |node| match node {
            Node::Symbol(i) if *i >= lambda.arity => issues.push(format!(
                "symbol {i} out of range for a lambda of arity {}",
                lambda.arity
            )),
            Node::Call { func, args } if args.len() != func.arity() => issues.push(format!(
                "{func:?} called with {} arguments, expects {}",
                args.len(),
                func.arity()
            )),
            Node::If { .. }
            | Node::TensorMap { .. }
            | Node::TensorJoin { .. }
            | Node::TensorMerge { .. }
            | Node::TensorReduce { .. }
            | Node::TensorRename { .. }
            | Node::TensorConcat { .. } => {
                issues.push(format!("{} is not a scalar cell operation", node.kind_name()))
            }
            _ => {}
        });
        issues
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Stack capacity `eval` needs.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Run the program. `stack` is scratch space reused across calls.
    pub fn eval(&self, args: &[f64], stack: &mut Vec<f64>) -> f64 {
        stack.clear();
        for step in &self.steps {
            match *step {
                Step::Num(v) => stack.push(v),
                Step::Arg(i) => stack.push(args[i]),
                Step::Op1(op) => {
                    let x = stack.pop().unwrap_or(f64::NAN);
                    stack.push(op.apply(x));
                }
                Step::Op2(op) => {
                    let b = stack.pop().unwrap_or(f64::NAN);
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(op.apply(a, b));
                }
            }
        }
        stack.pop().unwrap_or(f64::NAN)
    }
}

fn emit(node: &Node, out: &mut Vec<Step>) -> Result<(), LambdaError> {
    match node {
        Node::Number(v) => out.push(Step::Num(*v)),
        Node::Symbol(i) => out.push(Step::Arg(*i)),
        Node::Neg(c) => {
            emit(c, out)?;
            out.push(Step::Op1(Op1::Neg));
        }
        Node::Not(c) => {
            emit(c, out)?;
            out.push(Step::Op1(Op1::Not));
        }
        Node::Operator { op, lhs, rhs } => {
            emit(lhs, out)?;
            emit(rhs, out)?;
            out.push(Step::Op2(Op2::from_binop(*op)));
        }
        Node::Call { func, args } => {
            for arg in args {
                emit(arg, out)?;
            }
            let step = match args.len() {
                1 => Op1::from_func(*func).map(Step::Op1),
                2 => Op2::from_func(*func).map(Step::Op2),
                _ => None,
            };
            out.push(step.ok_or_else(|| {
                LambdaError::Unsupported(vec![format!("{func:?} with {} arguments", args.len())])
            })?);
        }
        other => {
            return Err(LambdaError::Unsupported(vec![format!(
                "{} is not a scalar cell operation",
                other.kind_name()
            )]))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teval_core::expr::{BinOp, Func};

    #[test]
    fn compiles_nested_arithmetic() {
        // f(x,y)(max(x*2, y) - 1)
        let body = Node::op(
            BinOp::Sub,
            Node::call(
                Func::Max,
                vec![Node::op(BinOp::Mul, Node::sym(0), Node::num(2.0)), Node::sym(1)],
            ),
            Node::num(1.0),
        );
        let c = CompiledLambda::compile(&Lambda::new(2, body)).unwrap();
        let mut stack = Vec::new();
        assert_eq!(c.eval(&[3.0, 5.0], &mut stack), 5.0);
        assert_eq!(c.eval(&[1.0, 5.0], &mut stack), 4.0);
        assert_eq!(c.max_depth(), 2);
    }

    #[test]
    fn conditionals_are_reported() {
        let body = Node::if_(Node::sym(0), Node::num(1.0), Node::num(2.0));
        let lambda = Lambda::new(1, body);
        let issues = CompiledLambda::detect_issues(&lambda);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("If"));
        assert!(matches!(
            CompiledLambda::compile(&lambda),
            Err(LambdaError::Unsupported(_))
        ));
    }
}
