//! Scalar cell kernels and reduction aggregators.

use serde::{Deserialize, Serialize};

use teval_core::expr::{Aggr, BinOp, Func, Lambda, Node};

/// Unary cell functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op1 {
    Neg,
    Not,
    Sqrt,
    Exp,
    Log,
    Abs,
    Floor,
    Ceil,
    Tanh,
    Relu,
    Sigmoid,
    Square,
    Cube,
}

impl Op1 {
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Op1::Neg => -x,
            Op1::Not => bool_cell(x == 0.0),
            Op1::Sqrt => x.sqrt(),
            Op1::Exp => x.exp(),
            Op1::Log => x.ln(),
            Op1::Abs => x.abs(),
            Op1::Floor => x.floor(),
            Op1::Ceil => x.ceil(),
            Op1::Tanh => x.tanh(),
            Op1::Relu => x.max(0.0),
            Op1::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Op1::Square => x * x,
            Op1::Cube => x * x * x,
        }
    }

    pub fn from_func(func: Func) -> Option<Op1> {
        Some(match func {
            Func::Sqrt => Op1::Sqrt,
            Func::Exp => Op1::Exp,
            Func::Log => Op1::Log,
            Func::Abs => Op1::Abs,
            Func::Floor => Op1::Floor,
            Func::Ceil => Op1::Ceil,
            Func::Tanh => Op1::Tanh,
            Func::Relu => Op1::Relu,
            Func::Sigmoid => Op1::Sigmoid,
            Func::Pow | Func::Min | Func::Max | Func::Fmod => return None,
        })
    }

    /// Recognize a one-argument lambda whose body is exactly a builtin.
    pub fn from_lambda(lambda: &Lambda) -> Option<Op1> {
        if lambda.arity != 1 {
            return None;
        }
        let x = |n: &Node| matches!(n, Node::Symbol(0));
        match &lambda.body {
            Node::Neg(c) if x(c.as_ref()) => Some(Op1::Neg),
            Node::Not(c) if x(c.as_ref()) => Some(Op1::Not),
            Node::Operator {
                op: BinOp::Mul,
                lhs,
                rhs,
            } if x(lhs.as_ref()) && x(rhs.as_ref()) => Some(Op1::Square),
            Node::Call { func, args } if args.len() == 1 && x(&args[0]) => Op1::from_func(*func),
            _ => None,
        }
    }
}

/// Binary cell functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op2 {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Min,
    Max,
    Less,
    Greater,
    Equal,
    And,
    Or,
}

impl Op2 {
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op2::Add => a + b,
            Op2::Sub => a - b,
            Op2::Mul => a * b,
            Op2::Div => a / b,
            Op2::Mod => a % b,
            Op2::Pow => a.powf(b),
            Op2::Min => nan_or(a, b, f64::min),
            Op2::Max => nan_or(a, b, f64::max),
            Op2::Less => bool_cell(a < b),
            Op2::Greater => bool_cell(a > b),
            Op2::Equal => bool_cell(a == b),
            Op2::And => bool_cell(a != 0.0 && b != 0.0),
            Op2::Or => bool_cell(a != 0.0 || b != 0.0),
        }
    }

    pub fn from_binop(op: BinOp) -> Op2 {
        match op {
            BinOp::Add => Op2::Add,
            BinOp::Sub => Op2::Sub,
            BinOp::Mul => Op2::Mul,
            BinOp::Div => Op2::Div,
            BinOp::Mod => Op2::Mod,
            BinOp::Pow => Op2::Pow,
            BinOp::Less => Op2::Less,
            BinOp::Greater => Op2::Greater,
            BinOp::Equal => Op2::Equal,
            BinOp::And => Op2::And,
            BinOp::Or => Op2::Or,
        }
    }

    pub fn from_func(func: Func) -> Option<Op2> {
        match func {
            Func::Pow => Some(Op2::Pow),
            Func::Min => Some(Op2::Min),
            Func::Max => Some(Op2::Max),
            Func::Fmod => Some(Op2::Mod),
            _ => None,
        }
    }

    /// Recognize `f(x,y)(x op y)` and `f(x,y)(call(x,y))`.
    pub fn from_lambda(lambda: &Lambda) -> Option<Op2> {
        if lambda.arity != 2 {
            return None;
        }
        let args_are_xy = |a: &Node, b: &Node| {
            matches!(a, Node::Symbol(0)) && matches!(b, Node::Symbol(1))
        };
        match &lambda.body {
            Node::Operator { op, lhs, rhs } if args_are_xy(lhs.as_ref(), rhs.as_ref()) => {
                Some(Op2::from_binop(*op))
            }
            Node::Call { func, args } if args.len() == 2 && args_are_xy(&args[0], &args[1]) => {
                Op2::from_func(*func)
            }
            _ => None,
        }
    }
}

#[inline]
fn bool_cell(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[inline]
fn nan_or(a: f64, b: f64, f: fn(f64, f64) -> f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        f(a, b)
    }
}

/// Running state of one reduction group.
#[derive(Debug, Clone)]
pub struct Aggregator {
    aggr: Aggr,
    acc: f64,
    count: usize,
}

impl Aggregator {
    pub fn new(aggr: Aggr) -> Self {
        let acc = match aggr {
            Aggr::Prod => 1.0,
            _ => 0.0,
        };
        Self { aggr, acc, count: 0 }
    }

    pub fn add(&mut self, x: f64) {
        self.acc = match (self.aggr, self.count) {
            (Aggr::Sum | Aggr::Avg, _) => self.acc + x,
            (Aggr::Prod, _) => self.acc * x,
            (Aggr::Count, _) => self.acc,
            (Aggr::Min | Aggr::Max, 0) => x,
            (Aggr::Min, _) => nan_or(self.acc, x, f64::min),
            (Aggr::Max, _) => nan_or(self.acc, x, f64::max),
        };
        self.count += 1;
    }

    /// Empty groups produce 0.0 (1.0 for product).
    pub fn result(&self) -> f64 {
        match self.aggr {
            Aggr::Count => self.count as f64,
            Aggr::Avg if self.count == 0 => 0.0,
            Aggr::Avg => self.acc / self.count as f64,
            _ => self.acc,
        }
    }
}
