//! Property tests: compiled programs agree with direct tree evaluation.
//!
//! Random scalar expressions, random lambdas and random dense powers are run
//! through the full build/optimize/lower/interpret pipeline and compared with
//! the reference evaluator in `fixtures`.

mod fixtures;

use fixtures::*;
use proptest::prelude::*;
use teval_core::prelude::*;
use teval_exec::{Context, SimpleParams, ValueParams};

// ============================================================================
// Generators
// ============================================================================

fn arb_binop() -> impl Strategy<Value = BinOp> {
    prop::sample::select(vec![
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Mod,
        BinOp::Pow,
        BinOp::Less,
        BinOp::Greater,
        BinOp::Equal,
        BinOp::And,
        BinOp::Or,
    ])
}

fn arb_unary() -> impl Strategy<Value = Func> {
    prop::sample::select(vec![
        Func::Sqrt,
        Func::Exp,
        Func::Log,
        Func::Abs,
        Func::Floor,
        Func::Ceil,
        Func::Tanh,
        Func::Relu,
        Func::Sigmoid,
    ])
}

fn arb_binary() -> impl Strategy<Value = Func> {
    prop::sample::select(vec![Func::Pow, Func::Min, Func::Max, Func::Fmod])
}

fn arb_leaf(symbols: usize) -> impl Strategy<Value = Node> {
    prop_oneof![
        (0..symbols).prop_map(Node::sym),
        (-4.0f64..4.0).prop_map(Node::num),
        prop::sample::select(vec![0.0, 1.0, 2.0, 3.0]).prop_map(Node::num),
    ]
}

/// Scalar expressions over `symbols` parameters. `with_if` allows conditionals.
fn arb_scalar_expr(symbols: usize, with_if: bool) -> impl Strategy<Value = Node> {
    arb_leaf(symbols).prop_recursive(4, 32, 3, move |inner| {
        let base = prop_oneof![
            inner.clone().prop_map(Node::neg),
            inner.clone().prop_map(|c| Node::Not(Box::new(c))),
            (arb_binop(), inner.clone(), inner.clone()).prop_map(|(op, a, b)| Node::op(op, a, b)),
            (arb_unary(), inner.clone()).prop_map(|(f, a)| Node::call(f, vec![a])),
            (arb_binary(), inner.clone(), inner.clone())
                .prop_map(|(f, a, b)| Node::call(f, vec![a, b])),
        ];
        if with_if {
            prop_oneof![
                4 => base,
                1 => (inner.clone(), inner.clone(), inner)
                    .prop_map(|(c, t, f)| Node::if_(c, t, f)),
            ]
            .boxed()
        } else {
            base.boxed()
        }
    })
}

fn arb_dense_matrix() -> impl Strategy<Value = Value> {
    (1u32..5, 1u32..4).prop_flat_map(|(nx, ny)| {
        let n = (nx * ny) as usize;
        proptest::collection::vec(-3.0f64..3.0, n).prop_map(move |cells| {
            dense(&[("x", nx), ("y", ny)], |i| cells[i])
        })
    })
}

fn same_cell(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b || (a - b).abs() <= 1e-9 * a.abs().max(1.0)
}

// ============================================================================
// Scalar expressions
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The interpreter computes what the expression tree says.
    #[test]
    fn scalar_program_matches_tree(
        root in arb_scalar_expr(2, true),
        a in -5.0f64..5.0,
        b in -5.0f64..5.0,
    ) {
        let function = Function::new(root, vec![ParamDecl::named("a"), ParamDecl::named("b")]);
        let (va, vb) = (Value::double(a), Value::double(b));
        let expect = reference_eval(&function, &[&va, &vb]).as_double();

        let f = compile(&function, &[&va, &vb], &EvalConfig::default());
        prop_assert!(f.program().verify().is_ok());
        let mut ctx = Context::new(&f);
        let got = f.eval(&mut ctx, &SimpleParams::new(vec![a, b])).as_double();
        prop_assert!(same_cell(got, expect), "got {} expected {}", got, expect);
    }

    /// Optimization never changes results.
    #[test]
    fn optimizer_preserves_scalar_results(
        root in arb_scalar_expr(2, true),
        a in -5.0f64..5.0,
        b in -5.0f64..5.0,
    ) {
        let function = Function::new(root, vec![ParamDecl::named("a"), ParamDecl::named("b")]);
        let (va, vb) = (Value::double(a), Value::double(b));
        let fast = compile(&function, &[&va, &vb], &EvalConfig::default());
        let slow = compile(&function, &[&va, &vb], &no_optimize());
        prop_assert!(fast.program().len() <= slow.program().len());

        let params = SimpleParams::new(vec![a, b]);
        let mut c1 = Context::new(&fast);
        let mut c2 = Context::new(&slow);
        let x = fast.eval(&mut c1, &params).as_double();
        let y = slow.eval(&mut c2, &params).as_double();
        prop_assert!(same_cell(x, y), "optimized {} unoptimized {}", x, y);
    }

    /// One context serves any number of calls.
    #[test]
    fn context_reuse_is_stateless(
        root in arb_scalar_expr(2, true),
        calls in proptest::collection::vec((-5.0f64..5.0, -5.0f64..5.0), 1..6),
    ) {
        let function = Function::new(root, vec![ParamDecl::named("a"), ParamDecl::named("b")]);
        let zero = Value::double(0.0);
        let f = compile(&function, &[&zero, &zero], &EvalConfig::default());
        let mut shared = Context::new(&f);
        for (a, b) in calls {
            let params = SimpleParams::new(vec![a, b]);
            let reused = f.eval(&mut shared, &params).as_double();
            let mut fresh_ctx = Context::new(&f);
            let fresh = f.eval(&mut fresh_ctx, &params).as_double();
            prop_assert!(same_cell(reused, fresh));
        }
    }
}

// ============================================================================
// Lambdas and dense tensors
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Compiled and tree-walked lambdas agree with each other and the tree.
    #[test]
    fn join_lambda_paths_agree(
        body in arb_scalar_expr(2, false),
        x in arb_dense_matrix(),
        z in proptest::collection::vec(-3.0f64..3.0, 3),
    ) {
        // Disjoint dimensions, so every x cell meets every z cell.
        let y = dense(&[("z", 3)], |i| z[i]);
        let root = Node::join(Node::sym(0), Node::sym(1), Lambda::new(2, body));
        let function = Function::new(root, vec![ParamDecl::named("x"), ParamDecl::named("y")]);
        let expect = reference_eval(&function, &[&x, &y]);

        let walked_cfg = EvalConfig { compile_lambdas: false, ..EvalConfig::default() };
        let compiled = compile(&function, &[&x, &y], &EvalConfig::default());
        let walked = compile(&function, &[&x, &y], &walked_cfg);
        prop_assert_eq!(walked.program().stats().compiled_lambdas, 0);

        let params = ValueParams::new().with(x).with(y);
        let mut c1 = Context::new(&compiled);
        let mut c2 = Context::new(&walked);
        prop_assert!(compiled.eval(&mut c1, &params).approx_eq(&expect, 1e-9));
        prop_assert!(walked.eval(&mut c2, &params).approx_eq(&expect, 1e-9));
    }

    /// Map lambdas with conditionals go through the tree walker and still agree.
    #[test]
    fn conditional_map_lambda_matches_tree(
        body in arb_scalar_expr(1, true),
        x in arb_dense_matrix(),
    ) {
        let root = Node::map(Node::sym(0), Lambda::new(1, body));
        let function = Function::new(root, vec![ParamDecl::named("x")]);
        let expect = reference_eval(&function, &[&x]);
        let f = compile(&function, &[&x], &EvalConfig::default());

        let params = ValueParams::new().with(x);
        let mut ctx = Context::new(&f);
        prop_assert!(f.eval(&mut ctx, &params).approx_eq(&expect, 1e-9));
    }

    /// Dense powers agree with the generic join, fresh or not.
    #[test]
    fn dense_power_matches_tree(
        x in arb_dense_matrix(),
        exponent in prop::sample::select(vec![2.0, 3.0, 4.0]),
        fresh in any::<bool>(),
    ) {
        let decl = if fresh { ParamDecl::fresh("x") } else { ParamDecl::named("x") };
        let root = Node::op(BinOp::Pow, Node::sym(0), Node::num(exponent));
        let function = Function::new(root, vec![decl]);
        let expect = reference_eval(&function, &[&x]);
        let f = compile(&function, &[&x], &EvalConfig::default());
        let specialized = f.program().stats().joins == 0;
        prop_assert_eq!(specialized, exponent != 4.0);

        let params = if fresh {
            ValueParams::new().with_fresh(x)
        } else {
            ValueParams::new().with(x)
        };
        let mut ctx = Context::new(&f);
        prop_assert!(f.eval(&mut ctx, &params).approx_eq(&expect, 1e-12));
    }
}
