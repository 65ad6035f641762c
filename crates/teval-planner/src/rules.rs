//! Rewrite passes over the planned IR.
//!
//! Each pass sees one node at a time, children already rewritten, and returns
//! either a replacement or the very same `Arc` when nothing matches. The
//! driver re-traverses the whole tree once per pass, bottom-up, and only
//! rebuilds ancestors of nodes that actually changed.

use std::sync::Arc;

use teval_core::types::Layout;
use teval_ops::Op1;

use crate::ir::{IrKind, IrNode, IrRef, MapFn};

pub trait RewritePass: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrite one node. Must return `node` itself (same `Arc`) on no match.
    fn rewrite(&self, node: &IrRef) -> IrRef;
}

/// `pow(x, 2.0)` → `map(square, x)`, `pow(x, 3.0)` → `map(cube, x)` when `x`
/// is fully dense and the exponent is a scalar constant.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowAsMap;

impl RewritePass for PowAsMap {
    fn name(&self) -> &'static str {
        "pow_as_map"
    }

    fn rewrite(&self, node: &IrRef) -> IrRef {
        let IrKind::Join { lhs, rhs, function } = node.kind() else {
            return node.clone();
        };
        if !function.is_pow() || lhs.result_type().layout() != Layout::Dense {
            return node.clone();
        }
        let IrKind::Const(exponent) = rhs.kind() else {
            return node.clone();
        };
        if !exponent.value_type().is_double() {
            return node.clone();
        }
        let e = exponent.as_double();
        let op = if e == 2.0 {
            Op1::Square
        } else if e == 3.0 {
            Op1::Cube
        } else {
            return node.clone();
        };
        IrNode::new(
            IrKind::Map {
                child: lhs.clone(),
                function: MapFn::Op(op),
            },
            node.result_type().clone(),
        )
    }
}

/// `-(-x)` → `x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleNegation;

impl RewritePass for DoubleNegation {
    fn name(&self) -> &'static str {
        "double_negation"
    }

    fn rewrite(&self, node: &IrRef) -> IrRef {
        if let IrKind::Map {
            child,
            function: MapFn::Op(Op1::Neg),
        } = node.kind()
        {
            if let IrKind::Map {
                child: inner,
                function: MapFn::Op(Op1::Neg),
            } = child.kind()
            {
                return inner.clone();
            }
        }
        node.clone()
    }
}

/// The standard pipeline, in order.
pub fn default_passes() -> Vec<Box<dyn RewritePass>> {
    vec![Box::new(PowAsMap), Box::new(DoubleNegation)]
}

/// Apply the standard pipeline.
pub fn optimize(root: IrRef) -> IrRef {
    optimize_with(root, &default_passes())
}

/// Apply `passes` in order, each over the full tree.
pub fn optimize_with(root: IrRef, passes: &[Box<dyn RewritePass>]) -> IrRef {
    passes
        .iter()
        .fold(root, |tree, pass| apply(pass.as_ref(), &tree))
}

fn apply(pass: &dyn RewritePass, node: &IrRef) -> IrRef {
    let children = node.children();
    let rewritten: Vec<IrRef> = children.iter().map(|c| apply(pass, c)).collect();
    let changed = children
        .iter()
        .zip(&rewritten)
        .any(|(old, new)| !Arc::ptr_eq(old, new));
    let current = if changed {
        node.with_children(rewritten)
    } else {
        node.clone()
    };

    let out = pass.rewrite(&current);
    #[cfg(feature = "tracing")]
    {
        if !Arc::ptr_eq(&out, &current) {
            tracing::debug!(
                pass = pass.name(),
                from = current.kind_name(),
                to = out.kind_name(),
                ty = %out.result_type(),
                "rewrite applied"
            );
        }
    }
    out
}
