//! IR building and rewrite passes.

mod fixtures;

use std::sync::{Arc, Mutex};

use fixtures::*;
use teval_core::prelude::*;
use teval_exec::{Context, SimpleParams, ValueParams};
use teval_ops::Op1;
use teval_planner::{
    make_ir, optimize, optimize_with, DoubleNegation, IrKind, IrRef, MapFn, PowAsMap, RewritePass,
};

fn ir_for(function: &Function, params: &[&Value]) -> IrRef {
    make_ir(function, &types_for(function, params))
}

#[test]
fn no_match_returns_the_same_tree() {
    let root = Node::op(BinOp::Add, Node::sym(0), Node::num(1.0));
    let function = Function::new(root, vec![ParamDecl::named("a")]);
    let ir = ir_for(&function, &[&Value::double(1.0)]);
    let out = optimize(ir.clone());
    assert!(Arc::ptr_eq(&ir, &out));
}

#[test]
fn rewriting_leaves_the_input_tree_untouched() {
    let root = Node::op(BinOp::Pow, Node::sym(0), Node::num(2.0));
    let function = Function::new(root, vec![ParamDecl::named("x")]);
    let ir = ir_for(&function, &[&matrix_5x3()]);
    let out = optimize(ir.clone());

    assert!(matches!(ir.kind(), IrKind::Join { .. }));
    assert!(matches!(
        out.kind(),
        IrKind::Map {
            function: MapFn::Op(Op1::Square),
            ..
        }
    ));
}

#[test]
fn passes_are_idempotent() {
    let root = Node::neg(Node::neg(Node::op(BinOp::Pow, Node::sym(0), Node::num(3.0))));
    let function = Function::new(root, vec![ParamDecl::named("x")]);
    let ir = ir_for(&function, &[&matrix_5x3()]);
    let once = optimize(ir);
    let twice = optimize(once.clone());
    assert!(Arc::ptr_eq(&once, &twice));
    assert_eq!(once.tree_size(), 2);
}

#[test]
fn double_negation_disappears() {
    let root = Node::neg(Node::neg(Node::sym(0)));
    let function = Function::new(root, vec![ParamDecl::named("x")]);
    let x = matrix_5x3();
    let f = compile(&function, &[&x], &EvalConfig::default());
    assert_eq!(f.program().len(), 1);
    assert!(matches!(f.ir().kind(), IrKind::Inject { param: 0, .. }));

    let params = ValueParams::new().with(x.clone());
    let mut ctx = Context::new(&f);
    assert_eq!(f.eval(&mut ctx, &params), &x);
}

#[test]
fn triple_negation_keeps_one() {
    let root = Node::neg(Node::neg(Node::neg(Node::sym(0))));
    let function = Function::new(root, vec![ParamDecl::named("a")]);
    let f = compile(&function, &[&Value::double(0.0)], &EvalConfig::default());
    assert_eq!(f.program().len(), 2);

    let mut ctx = Context::new(&f);
    assert_eq!(f.eval(&mut ctx, &SimpleParams::new(vec![4.0])).as_double(), -4.0);
}

#[test]
fn custom_pass_list_runs_in_order() {
    struct Recorder(Arc<Mutex<Vec<&'static str>>>, &'static str);
    impl RewritePass for Recorder {
        fn name(&self) -> &'static str {
            self.1
        }
        fn rewrite(&self, node: &IrRef) -> IrRef {
            self.0.lock().unwrap().push(self.1);
            node.clone()
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let passes: Vec<Box<dyn RewritePass>> = vec![
        Box::new(Recorder(seen.clone(), "first")),
        Box::new(Recorder(seen.clone(), "second")),
    ];
    let root = Node::op(BinOp::Mul, Node::sym(0), Node::sym(0));
    let function = Function::new(root, vec![ParamDecl::named("a")]);
    let ir = ir_for(&function, &[&Value::double(1.0)]);
    let out = optimize_with(ir.clone(), &passes);

    assert!(Arc::ptr_eq(&ir, &out));
    // Three nodes, visited once per pass.
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["first", "first", "first", "second", "second", "second"]
    );
}

#[test]
fn pow_as_map_alone_does_not_touch_negations() {
    let root = Node::neg(Node::neg(Node::sym(0)));
    let function = Function::new(root, vec![ParamDecl::named("x")]);
    let ir = ir_for(&function, &[&matrix_5x3()]);
    let passes: Vec<Box<dyn RewritePass>> = vec![Box::new(PowAsMap)];
    assert!(Arc::ptr_eq(&ir, &optimize_with(ir.clone(), &passes)));

    let passes: Vec<Box<dyn RewritePass>> = vec![Box::new(DoubleNegation)];
    let out = optimize_with(ir, &passes);
    assert!(matches!(out.kind(), IrKind::Inject { .. }));
}

#[test]
fn simple_lambdas_become_builtin_kernels() {
    let neg = Node::map(Node::sym(0), Lambda::new(1, Node::neg(Node::sym(0))));
    let function = Function::new(neg, vec![ParamDecl::named("x")]);
    let ir = ir_for(&function, &[&matrix_5x3()]);
    assert!(matches!(
        ir.kind(),
        IrKind::Map {
            function: MapFn::Op(Op1::Neg),
            ..
        }
    ));

    let sq = Node::map(
        Node::sym(0),
        Lambda::new(1, Node::op(BinOp::Mul, Node::sym(0), Node::sym(0))),
    );
    let function = Function::new(sq, vec![ParamDecl::named("x")]);
    let ir = ir_for(&function, &[&matrix_5x3()]);
    assert!(matches!(
        ir.kind(),
        IrKind::Map {
            function: MapFn::Op(Op1::Square),
            ..
        }
    ));
}

#[test]
fn mutable_flag_follows_fresh_single_use_parameters() {
    let x = matrix_5x3();

    let fresh = Function::new(Node::neg(Node::sym(0)), vec![ParamDecl::fresh("x")]);
    let ir = ir_for(&fresh, &[&x]);
    assert!(ir.is_mutable());
    assert!(ir.inplace());

    let named = Function::new(Node::neg(Node::sym(0)), vec![ParamDecl::named("x")]);
    let ir = ir_for(&named, &[&x]);
    assert!(!ir.is_mutable());
    assert!(!ir.inplace());

    let twice = Function::new(
        Node::op(BinOp::Add, Node::sym(0), Node::sym(0)),
        vec![ParamDecl::fresh("x")],
    );
    let ir = ir_for(&twice, &[&x]);
    assert!(!ir.is_mutable());
    for child in ir.children() {
        assert!(!child.is_mutable());
    }

    // Reductions change cardinality.
    let reduce = Function::new(
        Node::reduce(Node::sym(0), Aggr::Sum, &["y"]),
        vec![ParamDecl::fresh("x")],
    );
    assert!(!ir_for(&reduce, &[&x]).is_mutable());
}

#[test]
fn join_of_two_fresh_same_type_operands_is_mutable() {
    let x = matrix_5x3();
    let root = Node::op(BinOp::Mul, Node::sym(0), Node::sym(1));
    let function = Function::new(root, vec![ParamDecl::fresh("a"), ParamDecl::fresh("b")]);
    assert!(ir_for(&function, &[&x, &x]).is_mutable());

    let y = dense(&[("x", 5)], |i| i as f64);
    assert!(!ir_for(&function, &[&x, &y]).is_mutable());
}

#[test]
fn call_arity_mismatch_falls_back_to_nan() {
    let root = Node::call(Func::Sqrt, vec![Node::sym(0), Node::sym(0)]);
    let function = Function::new(root, vec![ParamDecl::named("a")]);
    let types = NodeTypes::new(vec![
        ValueType::double(),
        ValueType::double(),
        ValueType::double(),
    ]);
    let ir = make_ir(&function, &types);
    assert!(matches!(ir.kind(), IrKind::Fallback { .. }));

    let f = teval_exec::InterpretedFunction::from_function(
        engine(),
        &function,
        &types,
        &EvalConfig::default(),
    );
    let mut ctx = Context::new(&f);
    assert!(f.eval(&mut ctx, &SimpleParams::new(vec![4.0])).as_double().is_nan());
}

#[test]
fn lambda_arity_mismatch_falls_back_to_declared_type() {
    let x = matrix_5x3();
    let root = Node::map(Node::sym(0), Lambda::new(2, Node::sym(0)));
    let function = Function::new(root, vec![ParamDecl::named("x")]);
    let ir = ir_for(&function, &[&x]);
    assert!(matches!(ir.kind(), IrKind::Fallback { .. }));
    assert_eq!(ir.result_type(), x.value_type());

    let f = compile(&function, &[&x], &EvalConfig::default());
    let params = ValueParams::new().with(x);
    let mut ctx = Context::new(&f);
    let out = f.eval(&mut ctx, &params);
    assert_eq!(out.len(), 15);
    assert!(out.cells().iter().all(|c| c.is_nan()));
}

#[test]
fn missing_types_fall_back() {
    let function = Function::new(
        Node::op(BinOp::Add, Node::sym(0), Node::num(1.0)),
        vec![ParamDecl::named("a")],
    );
    let ir = make_ir(&function, &NodeTypes::default());
    assert!(matches!(ir.kind(), IrKind::Fallback { .. }));
    assert!(ir.result_type().is_double());
}
