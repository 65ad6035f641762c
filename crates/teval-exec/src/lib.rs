#![forbid(unsafe_code)]
//! teval-exec: the stack-machine interpreter and the tools built on it.
//!
//! - `runtime`: `InterpretedFunction` (immutable, shareable) and the per-worker
//!   `Context`/`State` it evaluates in.
//! - `stash`: generation-checked arena for values computed during one call.
//! - `params`: lazy parameter bindings (`SimpleParams`, `ValueParams`).
//! - `single`: `EvalSingle` and the tree-walk path for lambdas that do not
//!   compile.
//! - `cost` / `issues`: cost estimation and static lambda diagnostics.
//! - `metrics`: tracing hooks.

pub mod cost;
pub mod issues;
pub mod metrics;
pub mod params;
pub mod runtime;
pub mod single;
pub mod stash;

pub use cost::BenchmarkTimer;
pub use issues::{detect_issues, Issues};
pub use params::{Binding, LazyParams, SimpleParams, ValueParams};
pub use runtime::{Context, ExecError, InterpretedFunction, Slot, State};
pub use single::{EvalSingle, LambdaWalker};
pub use stash::{Stash, StashHandle};
