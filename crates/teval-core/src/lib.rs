#![forbid(unsafe_code)]
//! teval-core: the data shapes shared by every stage of the evaluator.
//!
//! - `types`: value types (cell type, dimensions, layout class).
//! - `value`: the tensor/scalar `Value` and its canonical cell layout.
//! - `expr`: the typed input expression tree handed over by the host.
//! - `config`: `EvalConfig`, loadable from the environment.
//! - `hash`: blake3 fingerprints of serializable shapes.
//!
//! No kernels, no interpreter state here. Those live in `teval-ops` and
//! `teval-exec`.

pub mod config;
pub mod error;
pub mod expr;
pub mod hash;
pub mod prelude;
pub mod types;
pub mod value;

pub use config::EvalConfig;
pub use error::{Error, Result};
pub use hash::Fingerprint;
pub use types::{CellType, Dimension, Layout, ValueType};
pub use value::{Label, Value};
