#![forbid(unsafe_code)]
//! teval-planner: typed expression tree → planned IR → optimized IR →
//! flat stack-machine program.
//!
//! Design:
//! - `build::make_ir` is total; unplannable shapes become `Fallback` nodes.
//! - IR nodes are immutable and `Arc`-shared. Passes in `rules` return new
//!   trees and leave their input untouched.
//! - `lower` walks the optimized tree once, post-order, and resolves each
//!   embedded lambda to either a compiled artifact (through the process-wide
//!   cache in `teval-ops`) or a tree-walk plan.
//! - `Program::verify` checks stack discipline statically.
//!
//! No interpreter state and no engine here; that is `teval-exec`.

pub mod build;
pub mod ir;
pub mod lower;
pub mod physical;
pub mod rules;

pub use build::make_ir;
pub use ir::{IrKind, IrNode, IrRef, JoinFn, MapFn};
pub use lower::{instruction_for, lambda_tree, lower};
pub use physical::{CellFn1, CellFn2, InstrOp, Instruction, LambdaTree, Program, ProgramStats};
pub use rules::{default_passes, optimize, optimize_with, DoubleNegation, PowAsMap, RewritePass};
