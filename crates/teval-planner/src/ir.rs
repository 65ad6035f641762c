//! Planned IR: a tree of tensor algebra nodes.
//!
//! Nodes are immutable and shared through `Arc`; rewrite passes build new
//! nodes instead of editing old ones. Every node knows its result type and
//! whether its result may be overwritten by a consumer (`is_mutable`).

use std::sync::Arc;

use teval_core::expr::{Aggr, Lambda};
use teval_core::types::ValueType;
use teval_core::value::Value;
use teval_ops::{Op1, Op2};

pub type IrRef = Arc<IrNode>;

/// Cell function of a map node.
#[derive(Debug, Clone, PartialEq)]
pub enum MapFn {
    Op(Op1),
    Lambda(Arc<Lambda>),
}

/// Cell function of a join or merge node.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinFn {
    Op(Op2),
    Lambda(Arc<Lambda>),
}

impl JoinFn {
    /// True when the combiner computes `pow(x,y)`, written either way.
    pub fn is_pow(&self) -> bool {
        match self {
            JoinFn::Op(op) => *op == Op2::Pow,
            JoinFn::Lambda(l) => Op2::from_lambda(l) == Some(Op2::Pow),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrKind {
    Const(Value),
    /// Parameter reference. `owned` is set when the caller hands the binding
    /// over as a temporary and nothing else in the tree reads it.
    Inject {
        param: usize,
        owned: bool,
    },
    Map {
        child: IrRef,
        function: MapFn,
    },
    Join {
        lhs: IrRef,
        rhs: IrRef,
        function: JoinFn,
    },
    /// Union of addresses; `function` combines cells present on both sides.
    Merge {
        lhs: IrRef,
        rhs: IrRef,
        function: JoinFn,
    },
    Reduce {
        child: IrRef,
        aggr: Aggr,
        dims: Vec<String>,
    },
    Rename {
        child: IrRef,
        from: Vec<String>,
        to: Vec<String>,
    },
    Concat {
        lhs: IrRef,
        rhs: IrRef,
        dim: String,
    },
    If {
        cond: IrRef,
        true_branch: IrRef,
        false_branch: IrRef,
    },
    /// Stand-in for shapes the builder cannot plan; evaluates to NaN cells.
    Fallback {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrNode {
    kind: IrKind,
    result_type: ValueType,
    mutable: bool,
}

impl IrNode {
    pub fn new(kind: IrKind, result_type: ValueType) -> IrRef {
        let mutable = match &kind {
            IrKind::Inject { owned, .. } => *owned,
            IrKind::Map { child, .. } | IrKind::Rename { child, .. } => child.mutable,
            IrKind::Join { lhs, rhs, .. } => {
                lhs.mutable
                    && rhs.mutable
                    && lhs.result_type == result_type
                    && rhs.result_type == result_type
            }
            IrKind::If {
                true_branch,
                false_branch,
                ..
            } => true_branch.mutable && false_branch.mutable,
            IrKind::Const(_)
            | IrKind::Merge { .. }
            | IrKind::Reduce { .. }
            | IrKind::Concat { .. }
            | IrKind::Fallback { .. } => false,
        };
        Arc::new(Self {
            kind,
            result_type,
            mutable,
        })
    }

    pub fn constant(value: Value) -> IrRef {
        let ty = value.value_type().clone();
        Self::new(IrKind::Const(value), ty)
    }

    pub fn inject(param: usize, owned: bool, result_type: ValueType) -> IrRef {
        Self::new(IrKind::Inject { param, owned }, result_type)
    }

    /// Maps never change the type of their input.
    pub fn map(child: IrRef, function: MapFn) -> IrRef {
        let ty = child.result_type.map();
        Self::new(IrKind::Map { child, function }, ty)
    }

    pub fn fallback(reason: impl Into<String>, result_type: ValueType) -> IrRef {
        Self::new(
            IrKind::Fallback {
                reason: reason.into(),
            },
            result_type,
        )
    }

    pub fn kind(&self) -> &IrKind {
        &self.kind
    }

    pub fn result_type(&self) -> &ValueType {
        &self.result_type
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// A map whose input may be overwritten runs in place.
    pub fn inplace(&self) -> bool {
        matches!(&self.kind, IrKind::Map { child, .. } if child.mutable)
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            IrKind::Const(_) => "const",
            IrKind::Inject { .. } => "inject",
            IrKind::Map { .. } => "map",
            IrKind::Join { .. } => "join",
            IrKind::Merge { .. } => "merge",
            IrKind::Reduce { .. } => "reduce",
            IrKind::Rename { .. } => "rename",
            IrKind::Concat { .. } => "concat",
            IrKind::If { .. } => "if",
            IrKind::Fallback { .. } => "fallback",
        }
    }

    /// Children in evaluation order.
    pub fn children(&self) -> Vec<&IrRef> {
        match &self.kind {
            IrKind::Const(_) | IrKind::Inject { .. } | IrKind::Fallback { .. } => vec![],
            IrKind::Map { child, .. }
            | IrKind::Reduce { child, .. }
            | IrKind::Rename { child, .. } => vec![child],
            IrKind::Join { lhs, rhs, .. }
            | IrKind::Merge { lhs, rhs, .. }
            | IrKind::Concat { lhs, rhs, .. } => vec![lhs, rhs],
            IrKind::If {
                cond,
                true_branch,
                false_branch,
            } => vec![cond, true_branch, false_branch],
        }
    }

    /// Same node over new children; the mutable flag is recomputed.
    pub fn with_children(&self, children: Vec<IrRef>) -> IrRef {
        assert_eq!(
            children.len(),
            self.children().len(),
            "{} node rebuilt with the wrong number of children",
            self.kind_name()
        );
        let mut it = children.into_iter();
        let mut next = || it.next().expect("child count checked above");
        let kind = match &self.kind {
            IrKind::Const(_) | IrKind::Inject { .. } | IrKind::Fallback { .. } => {
                self.kind.clone()
            }
            IrKind::Map { function, .. } => IrKind::Map {
                child: next(),
                function: function.clone(),
            },
            IrKind::Join { function, .. } => IrKind::Join {
                lhs: next(),
                rhs: next(),
                function: function.clone(),
            },
            IrKind::Merge { function, .. } => IrKind::Merge {
                lhs: next(),
                rhs: next(),
                function: function.clone(),
            },
            IrKind::Reduce { aggr, dims, .. } => IrKind::Reduce {
                child: next(),
                aggr: *aggr,
                dims: dims.clone(),
            },
            IrKind::Rename { from, to, .. } => IrKind::Rename {
                child: next(),
                from: from.clone(),
                to: to.clone(),
            },
            IrKind::Concat { dim, .. } => IrKind::Concat {
                lhs: next(),
                rhs: next(),
                dim: dim.clone(),
            },
            IrKind::If { .. } => IrKind::If {
                cond: next(),
                true_branch: next(),
                false_branch: next(),
            },
        };
        Self::new(kind, self.result_type.clone())
    }

    /// Number of nodes in this tree, counting shared subtrees once per use.
    pub fn tree_size(&self) -> usize {
        1 + self.children().iter().map(|c| c.tree_size()).sum::<usize>()
    }
}
