//! Sizing the process-wide lambda cache from the evaluator config.
//!
//! Kept in its own test binary: resizing the shared cache would race with
//! hit/miss assertions in other suites.

mod fixtures;

use fixtures::*;
use teval_core::prelude::*;
use teval_exec::{ExecError, InterpretedFunction};
use teval_ops::{global_capacity, global_stats};
use teval_planner::make_ir;

fn add_const(c: f64) -> Function {
    let lambda = Lambda::new(1, Node::op(BinOp::Add, Node::sym(0), Node::num(c)));
    Function::new(Node::map(Node::sym(0), lambda), vec![ParamDecl::named("x")])
}

fn with_capacity(n: usize) -> EvalConfig {
    EvalConfig {
        lambda_cache_capacity: n,
        ..EvalConfig::default()
    }
}

#[test]
fn config_capacity_sizes_the_global_cache() {
    let x = dense(&[("x", 2)], |i| i as f64);
    let before = global_stats();
    for c in [1.5, 2.5, 3.5, 4.5] {
        let f = compile(&add_const(c), &[&x], &with_capacity(2));
        assert_eq!(f.program().stats().compiled_lambdas, 1);
    }
    assert_eq!(global_capacity(), 2);
    assert!(global_stats().evictions >= before.evictions + 2);

    let f = compile(&add_const(1.5), &[&x], &with_capacity(64));
    assert_eq!(global_capacity(), 64);
    assert_eq!(f.program().stats().compiled_lambdas, 1);

    // A zero capacity is rejected before anything touches the cache.
    let function = add_const(9.5);
    let ir = make_ir(&function, &types_for(&function, &[&x]));
    let err = InterpretedFunction::try_new(engine(), ir, &with_capacity(0));
    assert!(matches!(err, Err(ExecError::Config(_))));
    assert_eq!(global_capacity(), 64);
}
