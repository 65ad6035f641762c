//! The tensor engine capability.
//!
//! The interpreter is parameterized over this trait and never assumes one
//! physical representation. Engines receive the already computed result type
//! so they never re-derive types.

use teval_core::expr::Aggr;
use teval_core::types::ValueType;
use teval_core::value::Value;

/// Trait that all tensor engines must implement.
///
/// Invariants:
/// - Results are freshly allocated values; inputs are never modified, except
///   by `map_in_place`, which writes into the storage it was handed.
/// - Cell functions follow IEEE semantics (NaN/Inf are values, never errors).
/// - Implementations may panic on inputs that contradict `result_type`; such
///   inputs only arise from a defect upstream.
pub trait TensorEngine: Send + Sync + 'static {
    /// Human-readable engine name (stable).
    fn name(&self) -> &'static str;

    fn map(&self, a: &Value, f: &mut dyn FnMut(f64) -> f64) -> Value;

    /// Overwrite every cell of `a` with `f(cell)`, keeping its storage.
    fn map_in_place(&self, a: &mut Value, f: &mut dyn FnMut(f64) -> f64);

    fn join(
        &self,
        a: &Value,
        b: &Value,
        f: &mut dyn FnMut(f64, f64) -> f64,
        result_type: &ValueType,
    ) -> Value;

    /// Every address of `a` or `b`; cells present in both are combined with
    /// `f(a_cell, b_cell)`, the rest are copied.
    fn merge(
        &self,
        a: &Value,
        b: &Value,
        f: &mut dyn FnMut(f64, f64) -> f64,
        result_type: &ValueType,
    ) -> Value;

    fn reduce(&self, a: &Value, aggr: Aggr, dims: &[String], result_type: &ValueType) -> Value;

    fn rename(&self, a: &Value, from: &[String], to: &[String], result_type: &ValueType) -> Value;

    fn concat(&self, a: &Value, b: &Value, dim: &str, result_type: &ValueType) -> Value;
}
