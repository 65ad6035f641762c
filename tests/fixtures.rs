//! Shared fixtures: values, compilation helpers, and a direct tree-walking
//! reference evaluator the compiled programs are checked against.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use teval_core::prelude::*;
use teval_exec::InterpretedFunction;
use teval_ops::{Op1, Op2, SimpleEngine, TensorEngine};

pub const TOL: f64 = 1e-12;

pub fn engine() -> Arc<dyn TensorEngine> {
    Arc::new(SimpleEngine)
}

pub fn dense_type(dims: &[(&str, u32)]) -> ValueType {
    ValueType::tensor(
        CellType::Double,
        dims.iter().map(|(n, s)| Dimension::indexed(*n, *s)).collect(),
    )
    .expect("valid dense type")
}

/// Dense tensor whose cells are `f(i)` in row-major order.
pub fn dense(dims: &[(&str, u32)], f: impl Fn(usize) -> f64) -> Value {
    let ty = dense_type(dims);
    let n = ty.dense_subspace_size();
    Value::from_dense(ty, (0..n).map(f).collect()).expect("valid dense value")
}

/// `x5y3` with distinct non-integral cells.
pub fn matrix_5x3() -> Value {
    dense(&[("x", 5), ("y", 3)], |i| 1.0 + i as f64 * 0.25)
}

/// `tensor(x{})` with labels `a` and `b`.
pub fn sparse_x() -> Value {
    let ty = ValueType::tensor(CellType::Double, vec![Dimension::mapped("x")]).unwrap();
    Value::from_cells(
        ty,
        vec![(vec![Label::from("a")], 1.5), (vec![Label::from("b")], -2.0)],
    )
    .unwrap()
}

/// `tensor(x{},y[5])` with subspace `a`.
pub fn mixed_xy() -> Value {
    let ty = ValueType::tensor(
        CellType::Double,
        vec![Dimension::mapped("x"), Dimension::indexed("y", 5)],
    )
    .unwrap();
    Value::from_cells(
        ty,
        (0..5u32).map(|i| (vec![Label::from("a"), Label::from(i)], 0.5 + i as f64)),
    )
    .unwrap()
}

pub fn types_for(function: &Function, params: &[&Value]) -> NodeTypes {
    let tys: Vec<ValueType> = params.iter().map(|v| v.value_type().clone()).collect();
    NodeTypes::resolve(function, &tys).expect("well-typed test function")
}

pub fn compile(function: &Function, params: &[&Value], cfg: &EvalConfig) -> InterpretedFunction {
    InterpretedFunction::from_function(engine(), function, &types_for(function, params), cfg)
}

pub fn no_optimize() -> EvalConfig {
    EvalConfig {
        optimize: false,
        ..EvalConfig::default()
    }
}

/// Evaluate `function` straight off the expression tree.
pub fn reference_eval(function: &Function, params: &[&Value]) -> Value {
    let types = types_for(function, params);
    let mut pos = 0;
    eval_node(function.root(), &types, params, &mut pos)
}

fn eval_node(node: &Node, types: &NodeTypes, params: &[&Value], pos: &mut usize) -> Value {
    let ty = types.get(*pos).expect("type for every node").clone();
    *pos += 1;
    let eng = SimpleEngine;
    match node {
        Node::Number(v) => Value::double(*v),
        Node::Symbol(i) => params[*i].clone(),
        Node::Neg(c) => {
            let v = eval_node(c, types, params, pos);
            eng.map(&v, &mut |x| -x)
        }
        Node::Not(c) => {
            let v = eval_node(c, types, params, pos);
            eng.map(&v, &mut |x| if x == 0.0 { 1.0 } else { 0.0 })
        }
        Node::Operator { op, lhs, rhs } => {
            let a = eval_node(lhs, types, params, pos);
            let b = eval_node(rhs, types, params, pos);
            let op = Op2::from_binop(*op);
            eng.join(&a, &b, &mut |x, y| op.apply(x, y), &ty)
        }
        Node::Call { func, args } => {
            let vals: Vec<Value> = args
                .iter()
                .map(|a| eval_node(a, types, params, pos))
                .collect();
            match vals.as_slice() {
                [a] => {
                    let op = Op1::from_func(*func).unwrap();
                    eng.map(a, &mut |x| op.apply(x))
                }
                [a, b] => {
                    let op = Op2::from_func(*func).unwrap();
                    eng.join(a, b, &mut |x, y| op.apply(x, y), &ty)
                }
                _ => panic!("reference evaluator needs well-formed calls"),
            }
        }
        Node::If {
            cond,
            true_expr,
            false_expr,
        } => {
            let c = eval_node(cond, types, params, pos);
            // Positions of the untaken branch still have to be skipped.
            let t = eval_node(true_expr, types, params, pos);
            let f = eval_node(false_expr, types, params, pos);
            if c.as_double() != 0.0 {
                t
            } else {
                f
            }
        }
        Node::TensorMap { child, lambda } => {
            let v = eval_node(child, types, params, pos);
            eng.map(&v, &mut |x| scalar(&lambda.body, &[x]))
        }
        Node::TensorJoin { lhs, rhs, lambda } => {
            let a = eval_node(lhs, types, params, pos);
            let b = eval_node(rhs, types, params, pos);
            eng.join(&a, &b, &mut |x, y| scalar(&lambda.body, &[x, y]), &ty)
        }
        Node::TensorMerge { lhs, rhs, lambda } => {
            let a = eval_node(lhs, types, params, pos);
            let b = eval_node(rhs, types, params, pos);
            let mut cells: BTreeMap<Vec<Label>, f64> = a.iter().collect();
            for (addr, y) in b.iter() {
                let merged = match cells.get(&addr) {
                    Some(&x) => scalar(&lambda.body, &[x, y]),
                    None => y,
                };
                cells.insert(addr, merged);
            }
            Value::from_cells(ty, cells).expect("merge cells fit the merged type")
        }
        Node::TensorReduce { child, aggr, dims } => {
            let v = eval_node(child, types, params, pos);
            eng.reduce(&v, *aggr, dims, &ty)
        }
        Node::TensorRename { child, from, to } => {
            let v = eval_node(child, types, params, pos);
            eng.rename(&v, from, to, &ty)
        }
        Node::TensorConcat { lhs, rhs, dim } => {
            let a = eval_node(lhs, types, params, pos);
            let b = eval_node(rhs, types, params, pos);
            eng.concat(&a, &b, dim, &ty)
        }
    }
}

/// Scalar lambda body evaluation.
pub fn scalar(node: &Node, args: &[f64]) -> f64 {
    match node {
        Node::Number(v) => *v,
        Node::Symbol(i) => args[*i],
        Node::Neg(c) => -scalar(c, args),
        Node::Not(c) => {
            if scalar(c, args) == 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Node::Operator { op, lhs, rhs } => {
            Op2::from_binop(*op).apply(scalar(lhs, args), scalar(rhs, args))
        }
        Node::Call { func, args: a } => match a.as_slice() {
            [x] => Op1::from_func(*func).unwrap().apply(scalar(x, args)),
            [x, y] => Op2::from_func(*func)
                .unwrap()
                .apply(scalar(x, args), scalar(y, args)),
            _ => f64::NAN,
        },
        Node::If {
            cond,
            true_expr,
            false_expr,
        } => {
            if scalar(cond, args) != 0.0 {
                scalar(true_expr, args)
            } else {
                scalar(false_expr, args)
            }
        }
        _ => f64::NAN,
    }
}
