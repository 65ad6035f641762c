//! Lowering: optimized IR → flat `Program`.
//!
//! Post-order, one instruction per node. Conditionals become
//! `cond; skip_if_false(|t|+1); t..; skip(|f|); f..`. A subtree reachable
//! along several paths is emitted once per path.

use std::sync::Arc;

use teval_core::config::EvalConfig;
use teval_core::expr::{Function, Lambda, NodeTypes, ParamDecl};
use teval_core::types::ValueType;
use teval_core::value::Value;
use teval_ops::compile_cached;

use crate::build::make_ir;
use crate::ir::{IrKind, IrNode, IrRef, JoinFn, MapFn};
use crate::physical::{CellFn1, CellFn2, InstrOp, Instruction, LambdaTree, Program};
use crate::rules::optimize;

pub fn lower(root: &IrRef, cfg: &EvalConfig) -> Program {
    let mut out = Vec::new();
    emit(root, cfg, &mut out);
    let program = Program::new(out, root.result_type().clone());

    #[cfg(feature = "tracing")]
    {
        let stats = program.stats();
        tracing::debug!(
            instructions = stats.instructions,
            inplace_maps = stats.inplace_maps,
            compiled_lambdas = stats.compiled_lambdas,
            walked_lambdas = stats.walked_lambdas,
            result = %program.result_type(),
            "lowered program"
        );
    }
    program
}

fn emit(node: &IrRef, cfg: &EvalConfig, out: &mut Vec<Instruction>) {
    if let IrKind::If {
        cond,
        true_branch,
        false_branch,
    } = node.kind()
    {
        emit(cond, cfg, out);
        let mut t = Vec::new();
        emit(true_branch, cfg, &mut t);
        let mut f = Vec::new();
        emit(false_branch, cfg, &mut f);

        out.push(Instruction::new(
            InstrOp::SkipIfFalse { offset: t.len() + 1 },
            ValueType::double(),
        ));
        out.extend(t);
        out.push(Instruction::new(
            InstrOp::Skip { offset: f.len() },
            ValueType::double(),
        ));
        out.extend(f);
        return;
    }

    for child in node.children() {
        emit(child, cfg, out);
    }
    out.extend(instruction_for(node, cfg));
}

/// The single instruction computing `node` from its children's values.
/// `None` for conditionals, which lower to several instructions.
pub fn instruction_for(node: &IrNode, cfg: &EvalConfig) -> Option<Instruction> {
    let op = match node.kind() {
        IrKind::Const(v) => InstrOp::Const(v.clone()),
        IrKind::Inject { param, .. } => InstrOp::Param(*param),
        IrKind::Map { function, .. } => InstrOp::Map {
            function: match function {
                MapFn::Op(op) => CellFn1::Op(*op),
                MapFn::Lambda(l) => match lower_lambda(l, cfg) {
                    Lowered::Compiled(c) => CellFn1::Compiled(c),
                    Lowered::Walk(t) => CellFn1::Walk(t),
                },
            },
            inplace: node.inplace(),
        },
        IrKind::Join { function, .. } => InstrOp::Join {
            function: cell_fn2(function, cfg),
        },
        IrKind::Merge { function, .. } => InstrOp::Merge {
            function: cell_fn2(function, cfg),
        },
        IrKind::Reduce { aggr, dims, .. } => InstrOp::Reduce {
            aggr: *aggr,
            dims: dims.clone(),
        },
        IrKind::Rename { from, to, .. } => InstrOp::Rename {
            from: from.clone(),
            to: to.clone(),
        },
        IrKind::Concat { dim, .. } => InstrOp::Concat { dim: dim.clone() },
        IrKind::Fallback { .. } => {
            InstrOp::Const(Value::filled(node.result_type().clone(), f64::NAN))
        }
        IrKind::If { .. } => return None,
    };
    Some(Instruction::new(op, node.result_type().clone()))
}

fn cell_fn2(function: &JoinFn, cfg: &EvalConfig) -> CellFn2 {
    match function {
        JoinFn::Op(op) => CellFn2::Op(*op),
        JoinFn::Lambda(l) => match lower_lambda(l, cfg) {
            Lowered::Compiled(c) => CellFn2::Compiled(c),
            Lowered::Walk(t) => CellFn2::Walk(t),
        },
    }
}

enum Lowered {
    Compiled(Arc<teval_ops::CompiledLambda>),
    Walk(Arc<LambdaTree>),
}

fn lower_lambda(lambda: &Lambda, cfg: &EvalConfig) -> Lowered {
    if cfg.compile_lambdas {
        match compile_cached(lambda, cfg) {
            Ok(c) => return Lowered::Compiled(c),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_e, "lambda falls back to tree-walk");
            }
        }
    }
    Lowered::Walk(Arc::new(lambda_tree(lambda, cfg)))
}

/// Plan `lambda` for the tree-walk fallback. Arguments are scalars; a body
/// that does not type-check as such evaluates to NaN.
pub fn lambda_tree(lambda: &Lambda, cfg: &EvalConfig) -> LambdaTree {
    let params = (0..lambda.arity)
        .map(|i| ParamDecl::named(format!("arg{i}")))
        .collect();
    let function = Function::new(lambda.body.clone(), params);
    let types = NodeTypes::resolve(&function, &vec![ValueType::double(); lambda.arity])
        .unwrap_or_default();
    let mut ir = make_ir(&function, &types);
    if cfg.optimize {
        ir = optimize(ir);
    }
    let mut next_slot = 0;
    walk_plan(&ir, cfg, &mut next_slot)
}

fn walk_plan(node: &IrRef, cfg: &EvalConfig, next_slot: &mut usize) -> LambdaTree {
    match node.kind() {
        IrKind::Inject { param, .. } => LambdaTree::Arg(*param),
        IrKind::If {
            cond,
            true_branch,
            false_branch,
        } => LambdaTree::If {
            cond: Box::new(walk_plan(cond, cfg, next_slot)),
            true_branch: Box::new(walk_plan(true_branch, cfg, next_slot)),
            false_branch: Box::new(walk_plan(false_branch, cfg, next_slot)),
        },
        _ => {
            let children = node
                .children()
                .into_iter()
                .map(|c| walk_plan(c, cfg, next_slot))
                .collect();
            let slot = *next_slot;
            *next_slot += 1;
            match instruction_for(node, cfg) {
                Some(instr) => LambdaTree::Node {
                    slot,
                    instr,
                    children,
                },
                None => unreachable!("conditionals are planned above"),
            }
        }
    }
}
