//! Convenient re-exports for downstream crates.

pub use crate::config::EvalConfig;
pub use crate::error::{Error, Result};
pub use crate::expr::{Aggr, BinOp, Func, Function, Lambda, Node, NodeTypes, ParamDecl};
pub use crate::hash::Fingerprint;
pub use crate::types::{CellType, Dimension, Layout, ValueType};
pub use crate::value::{Label, Value};
