//! The typed input expression tree.
//!
//! The host's parser/type-checker owns these trees; we only define the shape
//! we consume. Per-node result types travel separately in `NodeTypes`, indexed
//! by pre-order position over the outer tree (lambda bodies are not part of
//! the outer tree and have no entries).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ValueType;

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Less,
    Greater,
    Equal,
    And,
    Or,
}

/// Named function calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Func {
    Sqrt,
    Exp,
    Log,
    Abs,
    Floor,
    Ceil,
    Tanh,
    Relu,
    Sigmoid,
    Pow,
    Min,
    Max,
    Fmod,
}

impl Func {
    pub fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Min | Func::Max | Func::Fmod => 2,
            _ => 1,
        }
    }
}

/// Reduction aggregators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggr {
    Sum,
    Avg,
    Prod,
    Count,
    Min,
    Max,
}

/// A scalar function supplied as data to tensor map/join. Symbols `0..arity`
/// inside `body` refer to the lambda's own arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub arity: usize,
    pub body: Node,
}

impl Lambda {
    pub fn new(arity: usize, body: Node) -> Self {
        Self { arity, body }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Number(#[serde(with = "number_bits")] f64),
    /// Parameter reference by index.
    Symbol(usize),
    Neg(Box<Node>),
    Not(Box<Node>),
    Operator {
        op: BinOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Call {
        func: Func,
        args: Vec<Node>,
    },
    If {
        cond: Box<Node>,
        true_expr: Box<Node>,
        false_expr: Box<Node>,
    },
    TensorMap {
        child: Box<Node>,
        lambda: Box<Lambda>,
    },
    TensorJoin {
        lhs: Box<Node>,
        rhs: Box<Node>,
        lambda: Box<Lambda>,
    },
    /// Union of both operands' cells; `lambda` combines cells present in both.
    TensorMerge {
        lhs: Box<Node>,
        rhs: Box<Node>,
        lambda: Box<Lambda>,
    },
    TensorReduce {
        child: Box<Node>,
        aggr: Aggr,
        dims: Vec<String>,
    },
    TensorRename {
        child: Box<Node>,
        from: Vec<String>,
        to: Vec<String>,
    },
    TensorConcat {
        lhs: Box<Node>,
        rhs: Box<Node>,
        dim: String,
    },
}

/// Constants serialize as their IEEE bit pattern. JSON has no NaN or
/// infinities, and fingerprints must tell those constants apart.
mod number_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(v.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        u64::deserialize(d).map(f64::from_bits)
    }
}

impl Node {
    pub fn num(v: f64) -> Node {
        Node::Number(v)
    }

    pub fn sym(idx: usize) -> Node {
        Node::Symbol(idx)
    }

    pub fn neg(child: Node) -> Node {
        Node::Neg(Box::new(child))
    }

    pub fn op(op: BinOp, lhs: Node, rhs: Node) -> Node {
        Node::Operator {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(func: Func, args: Vec<Node>) -> Node {
        Node::Call { func, args }
    }

    pub fn if_(cond: Node, true_expr: Node, false_expr: Node) -> Node {
        Node::If {
            cond: Box::new(cond),
            true_expr: Box::new(true_expr),
            false_expr: Box::new(false_expr),
        }
    }

    pub fn map(child: Node, lambda: Lambda) -> Node {
        Node::TensorMap {
            child: Box::new(child),
            lambda: Box::new(lambda),
        }
    }

    pub fn join(lhs: Node, rhs: Node, lambda: Lambda) -> Node {
        Node::TensorJoin {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            lambda: Box::new(lambda),
        }
    }

    pub fn merge(lhs: Node, rhs: Node, lambda: Lambda) -> Node {
        Node::TensorMerge {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            lambda: Box::new(lambda),
        }
    }

    pub fn reduce(child: Node, aggr: Aggr, dims: &[&str]) -> Node {
        Node::TensorReduce {
            child: Box::new(child),
            aggr,
            dims: dims.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn rename(child: Node, from: &[&str], to: &[&str]) -> Node {
        Node::TensorRename {
            child: Box::new(child),
            from: from.iter().map(|d| d.to_string()).collect(),
            to: to.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn concat(lhs: Node, rhs: Node, dim: &str) -> Node {
        Node::TensorConcat {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            dim: dim.to_string(),
        }
    }

    /// Stable node kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Number(_) => "Number",
            Node::Symbol(_) => "Symbol",
            Node::Neg(_) => "Neg",
            Node::Not(_) => "Not",
            Node::Operator { .. } => "Operator",
            Node::Call { .. } => "Call",
            Node::If { .. } => "If",
            Node::TensorMap { .. } => "TensorMap",
            Node::TensorJoin { .. } => "TensorJoin",
            Node::TensorMerge { .. } => "TensorMerge",
            Node::TensorReduce { .. } => "TensorReduce",
            Node::TensorRename { .. } => "TensorRename",
            Node::TensorConcat { .. } => "TensorConcat",
        }
    }

    /// Children in the outer tree, in evaluation order. Lambda bodies are not
    /// children.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Number(_) | Node::Symbol(_) => vec![],
            Node::Neg(c) | Node::Not(c) => vec![&**c],
            Node::Operator { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            Node::Call { args, .. } => args.iter().collect(),
            Node::If {
                cond,
                true_expr,
                false_expr,
            } => vec![&**cond, &**true_expr, &**false_expr],
            Node::TensorMap { child, .. }
            | Node::TensorReduce { child, .. }
            | Node::TensorRename { child, .. } => vec![&**child],
            Node::TensorJoin { lhs, rhs, .. }
            | Node::TensorMerge { lhs, rhs, .. }
            | Node::TensorConcat { lhs, rhs, .. } => vec![&**lhs, &**rhs],
        }
    }

    /// Embedded lambda, if this node carries one.
    pub fn lambda(&self) -> Option<&Lambda> {
        match self {
            Node::TensorMap { lambda, .. }
            | Node::TensorJoin { lambda, .. }
            | Node::TensorMerge { lambda, .. } => Some(&**lambda),
            _ => None,
        }
    }

    /// Visit this node and its outer-tree descendants in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    /// The caller hands this binding over as a fresh temporary it will not
    /// look at again, so its storage may be overwritten.
    pub fresh: bool,
}

impl ParamDecl {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fresh: false,
        }
    }

    pub fn fresh(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fresh: true,
        }
    }
}

/// An expression together with its parameter declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    root: Node,
    params: Vec<ParamDecl>,
}

impl Function {
    pub fn new(root: Node, params: Vec<ParamDecl>) -> Self {
        Self { root, params }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// How many times the outer tree references parameter `idx`.
    pub fn symbol_uses(&self, idx: usize) -> usize {
        let mut n = 0;
        self.root.walk(&mut |node| {
            if matches!(node, Node::Symbol(i) if *i == idx) {
                n += 1;
            }
        });
        n
    }
}

/// Result type of every outer-tree node, in pre-order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeTypes {
    types: Vec<ValueType>,
}

impl NodeTypes {
    pub fn new(types: Vec<ValueType>) -> Self {
        Self { types }
    }

    pub fn get(&self, pos: usize) -> Option<&ValueType> {
        self.types.get(pos)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Fill the side-table for an already well-typed tree given its parameter
    /// types. Only dimension conflicts are reported; this is not a checker.
    pub fn resolve(function: &Function, params: &[ValueType]) -> Result<Self> {
        let mut types = Vec::new();
        resolve_node(function.root(), params, &mut types)?;
        Ok(Self { types })
    }
}

fn resolve_node(node: &Node, params: &[ValueType], out: &mut Vec<ValueType>) -> Result<ValueType> {
    let slot = out.len();
    out.push(ValueType::double());
    let mut kids = Vec::new();
    for child in node.children() {
        kids.push(resolve_node(child, params, out)?);
    }
    let ty = match node {
        Node::Number(_) => ValueType::double(),
        Node::Symbol(i) => params
            .get(*i)
            .cloned()
            .ok_or_else(|| Error::Type(format!("no type for parameter {i}")))?,
        Node::Neg(_) | Node::Not(_) | Node::TensorMap { .. } => kids[0].map(),
        Node::Operator { .. } | Node::TensorJoin { .. } => ValueType::join(&kids[0], &kids[1])?,
        Node::TensorMerge { .. } => ValueType::merge(&kids[0], &kids[1])?,
        Node::Call { func, .. } => match (func.arity(), kids.as_slice()) {
            (1, [a]) => a.map(),
            (2, [a, b]) => ValueType::join(a, b)?,
            _ => ValueType::double(),
        },
        Node::If { .. } => kids[1].clone(),
        Node::TensorReduce { dims, .. } => kids[0].reduce(dims)?,
        Node::TensorRename { from, to, .. } => kids[0].rename(from, to)?,
        Node::TensorConcat { dim, .. } => ValueType::concat(&kids[0], &kids[1], dim)?,
    };
    out[slot] = ty.clone();
    Ok(ty)
}
