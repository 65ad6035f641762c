//! Typed expression tree → planned IR.
//!
//! Total: every input produces a tree. Shapes that cannot be planned (call
//! arity mismatch, lambda arity mismatch, missing type entries, unknown
//! parameters) become `Fallback` nodes of the declared type.

use std::sync::Arc;

use teval_core::expr::{Function, Node, NodeTypes};
use teval_core::types::ValueType;
use teval_core::value::Value;
use teval_ops::{Op1, Op2};

use crate::ir::{IrKind, IrNode, IrRef, JoinFn, MapFn};

/// Build the IR for `function`, reading result types from `types` in
/// pre-order.
pub fn make_ir(function: &Function, types: &NodeTypes) -> IrRef {
    let uses = (0..function.num_params())
        .map(|i| function.symbol_uses(i))
        .collect();
    let mut builder = Builder {
        function,
        types,
        uses,
        pos: 0,
    };
    builder.build(function.root())
}

struct Builder<'a> {
    function: &'a Function,
    types: &'a NodeTypes,
    uses: Vec<usize>,
    pos: usize,
}

impl Builder<'_> {
    fn build(&mut self, node: &Node) -> IrRef {
        let pos = self.pos;
        self.pos += 1;
        // Children first, so positions stay aligned even when this node falls back.
        let mut kids: Vec<IrRef> = node.children().into_iter().map(|c| self.build(c)).collect();

        let Some(ty) = self.types.get(pos).cloned() else {
            return IrNode::fallback(
                format!("no result type for {} at position {pos}", node.kind_name()),
                ValueType::double(),
            );
        };

        let kind = match node {
            Node::Number(v) => return IrNode::constant(Value::double(*v)),
            Node::Symbol(idx) => {
                let Some(decl) = self.function.params().get(*idx) else {
                    return IrNode::fallback(format!("unknown parameter {idx}"), ty);
                };
                IrKind::Inject {
                    param: *idx,
                    owned: decl.fresh && self.uses[*idx] == 1,
                }
            }
            Node::Neg(_) => IrKind::Map {
                child: kids.remove(0),
                function: MapFn::Op(Op1::Neg),
            },
            Node::Not(_) => IrKind::Map {
                child: kids.remove(0),
                function: MapFn::Op(Op1::Not),
            },
            Node::Operator { op, .. } => {
                let rhs = kids.remove(1);
                let lhs = kids.remove(0);
                IrKind::Join {
                    lhs,
                    rhs,
                    function: JoinFn::Op(Op2::from_binop(*op)),
                }
            }
            Node::Call { func, args } => {
                if args.len() != func.arity() {
                    return IrNode::fallback(
                        format!(
                            "{func:?} called with {} arguments, expects {}",
                            args.len(),
                            func.arity()
                        ),
                        ty,
                    );
                }
                match (Op1::from_func(*func), Op2::from_func(*func), kids.len()) {
                    (Some(op), _, 1) => IrKind::Map {
                        child: kids.remove(0),
                        function: MapFn::Op(op),
                    },
                    (_, Some(op), 2) => {
                        let rhs = kids.remove(1);
                        let lhs = kids.remove(0);
                        IrKind::Join {
                            lhs,
                            rhs,
                            function: JoinFn::Op(op),
                        }
                    }
                    _ => return IrNode::fallback(format!("no kernel for {func:?}"), ty),
                }
            }
            Node::If { .. } => {
                let false_branch = kids.remove(2);
                let true_branch = kids.remove(1);
                let cond = kids.remove(0);
                IrKind::If {
                    cond,
                    true_branch,
                    false_branch,
                }
            }
            Node::TensorMap { lambda, .. } => {
                if lambda.arity != 1 {
                    return IrNode::fallback(
                        format!("map lambda takes {} arguments", lambda.arity),
                        ty,
                    );
                }
                let function = match Op1::from_lambda(lambda) {
                    Some(op) => MapFn::Op(op),
                    None => MapFn::Lambda(Arc::new((**lambda).clone())),
                };
                IrKind::Map {
                    child: kids.remove(0),
                    function,
                }
            }
            Node::TensorJoin { lambda, .. } => {
                if lambda.arity != 2 {
                    return IrNode::fallback(
                        format!("join lambda takes {} arguments", lambda.arity),
                        ty,
                    );
                }
                let function = match Op2::from_lambda(lambda) {
                    Some(op) => JoinFn::Op(op),
                    None => JoinFn::Lambda(Arc::new((**lambda).clone())),
                };
                let rhs = kids.remove(1);
                let lhs = kids.remove(0);
                IrKind::Join { lhs, rhs, function }
            }
            Node::TensorMerge { lambda, .. } => {
                if lambda.arity != 2 {
                    return IrNode::fallback(
                        format!("merge lambda takes {} arguments", lambda.arity),
                        ty,
                    );
                }
                let function = match Op2::from_lambda(lambda) {
                    Some(op) => JoinFn::Op(op),
                    None => JoinFn::Lambda(Arc::new((**lambda).clone())),
                };
                let rhs = kids.remove(1);
                let lhs = kids.remove(0);
                IrKind::Merge { lhs, rhs, function }
            }
            Node::TensorReduce { aggr, dims, .. } => IrKind::Reduce {
                child: kids.remove(0),
                aggr: *aggr,
                dims: dims.clone(),
            },
            Node::TensorRename { from, to, .. } => IrKind::Rename {
                child: kids.remove(0),
                from: from.clone(),
                to: to.clone(),
            },
            Node::TensorConcat { dim, .. } => {
                let rhs = kids.remove(1);
                let lhs = kids.remove(0);
                IrKind::Concat {
                    lhs,
                    rhs,
                    dim: dim.clone(),
                }
            }
        };
        IrNode::new(kind, ty)
    }
}
