#![forbid(unsafe_code)]
//! teval-ops: cell kernels and the pluggable tensor engine.
//!
//! Design intent:
//! - Keep this crate pure and synchronous (no interpreter state here).
//! - The interpreter never touches cell storage directly; every tensor
//!   operation goes through a `TensorEngine`, so the physical representation
//!   can be swapped without touching the planner or the runtime.
//! - Embedded lambdas compile to small postfix programs that are shared
//!   process-wide through `cache::LambdaCache`.

pub mod cache;
pub mod engine;
pub mod lambda;
pub mod ops;
pub mod simple;

pub use cache::{
    compile_cached, global_capacity, global_stats, structural_key, CacheStats, LambdaCache,
};
pub use engine::TensorEngine;
pub use lambda::{CompiledLambda, LambdaError, Step};
pub use ops::{Aggregator, Op1, Op2};
pub use simple::SimpleEngine;
