//! Parameter bindings for one evaluation call.
//!
//! A binding is either read straight from the caller (`Binding::External`) or
//! materialized into the stash (`Binding::Stashed`). Fresh tensor bindings
//! move into the stash on first use, which is what lets a plan overwrite
//! their storage in place.

use std::cell::RefCell;

use teval_core::value::Value;

use crate::stash::{Stash, StashHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    External,
    Stashed(StashHandle),
}

pub trait LazyParams {
    /// Produce parameter `idx`. Called once per reference per call.
    fn resolve(&self, idx: usize, stash: &mut Stash) -> Binding;

    /// Borrow parameter `idx` when it resolves to `Binding::External`.
    fn external(&self, idx: usize) -> Option<&Value>;
}

/// Scalar parameters, materialized on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleParams(pub Vec<f64>);

impl SimpleParams {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl LazyParams for SimpleParams {
    fn resolve(&self, idx: usize, stash: &mut Stash) -> Binding {
        let v = self
            .0
            .get(idx)
            .unwrap_or_else(|| panic!("no binding for parameter {idx} ({} given)", self.0.len()));
        Binding::Stashed(stash.alloc(Value::double(*v)))
    }

    fn external(&self, _idx: usize) -> Option<&Value> {
        None
    }
}

#[derive(Debug)]
struct Fresh {
    value: Option<Value>,
    handle: Option<StashHandle>,
}

#[derive(Debug)]
enum Slot {
    Shared(Value),
    Fresh(RefCell<Fresh>),
}

/// Tensor parameters. Shared bindings are only ever read; fresh bindings are
/// handed over for this one call and may come back overwritten as the result.
#[derive(Debug, Default)]
pub struct ValueParams {
    slots: Vec<Slot>,
}

impl ValueParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, value: Value) -> Self {
        self.push(value);
        self
    }

    pub fn with_fresh(mut self, value: Value) -> Self {
        self.push_fresh(value);
        self
    }

    pub fn push(&mut self, value: Value) {
        self.slots.push(Slot::Shared(value));
    }

    pub fn push_fresh(&mut self, value: Value) {
        self.slots.push(Slot::Fresh(RefCell::new(Fresh {
            value: Some(value),
            handle: None,
        })));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl LazyParams for ValueParams {
    fn resolve(&self, idx: usize, stash: &mut Stash) -> Binding {
        match self.slots.get(idx) {
            Some(Slot::Shared(_)) => Binding::External,
            Some(Slot::Fresh(cell)) => {
                let mut fresh = cell.borrow_mut();
                if let Some(v) = fresh.value.take() {
                    let h = stash.alloc(v);
                    fresh.handle = Some(h);
                    return Binding::Stashed(h);
                }
                match fresh.handle {
                    Some(h) if stash.is_live(h) => Binding::Stashed(h),
                    _ => panic!("fresh parameter {idx} was consumed by an earlier call"),
                }
            }
            None => panic!("no binding for parameter {idx} ({} given)", self.slots.len()),
        }
    }

    fn external(&self, idx: usize) -> Option<&Value> {
        match self.slots.get(idx) {
            Some(Slot::Shared(v)) => Some(v),
            _ => None,
        }
    }
}

/// Caller-provided references, read in place.
pub(crate) struct RefParams<'a>(pub(crate) &'a [&'a Value]);

impl LazyParams for RefParams<'_> {
    fn resolve(&self, idx: usize, _stash: &mut Stash) -> Binding {
        assert!(idx < self.0.len(), "no input {idx} ({} given)", self.0.len());
        Binding::External
    }

    fn external(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx).copied()
    }
}
