//! Straightforward address-based tensor engine.
//!
//! Every operation works on full cell addresses, with fast paths for the
//! shapes the interpreter hits most: same-type dense joins and joins where
//! one side is a scalar. Correctness first; it doubles as the reference the
//! tests compare optimized plans against.

use std::collections::{BTreeMap, BTreeSet};

use teval_core::expr::Aggr;
use teval_core::types::{Layout, ValueType};
use teval_core::value::{Label, Value};

use crate::engine::TensorEngine;
use crate::ops::Aggregator;

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleEngine;

impl SimpleEngine {
    pub fn new() -> Self {
        SimpleEngine
    }
}

/// For each dimension of `target`, where that dimension sits in `source`.
fn positions(target: &ValueType, source: &ValueType) -> Vec<Option<usize>> {
    target
        .dims()
        .iter()
        .map(|d| source.dimension_index(&d.name))
        .collect()
}

fn build(result_type: &ValueType, cells: Vec<(Vec<Label>, f64)>) -> Value {
    Value::from_cells(result_type.clone(), cells)
        .unwrap_or_else(|e| panic!("engine produced cells that do not fit {result_type}: {e}"))
}

fn overwrite(out: &mut Value, f: &mut dyn FnMut(f64) -> f64) {
    let ct = out.value_type().cell_type();
    for c in out.cells_mut() {
        *c = ct.narrow(f(*c));
    }
}

impl TensorEngine for SimpleEngine {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn map(&self, a: &Value, f: &mut dyn FnMut(f64) -> f64) -> Value {
        let mut out = a.clone();
        overwrite(&mut out, f);
        out
    }

    fn map_in_place(&self, a: &mut Value, f: &mut dyn FnMut(f64) -> f64) {
        overwrite(a, f);
    }

    fn join(
        &self,
        a: &Value,
        b: &Value,
        f: &mut dyn FnMut(f64, f64) -> f64,
        result_type: &ValueType,
    ) -> Value {
        let (ta, tb) = (a.value_type(), b.value_type());

        if tb.is_double() && ta == result_type {
            let s = b.as_double();
            return self.map(a, &mut |x| f(x, s));
        }
        if ta.is_double() && tb == result_type {
            let s = a.as_double();
            return self.map(b, &mut |y| f(s, y));
        }
        if ta == tb && ta == result_type && ta.layout() == Layout::Dense {
            let mut out = a.clone();
            let ct = result_type.cell_type();
            for (c, &y) in out.cells_mut().iter_mut().zip(b.cells()) {
                *c = ct.narrow(f(*c, y));
            }
            return out;
        }

        let pos_a = positions(result_type, ta);
        let pos_b = positions(result_type, tb);
        let mut cells = Vec::new();
        for (addr_a, x) in a.iter() {
            for (addr_b, y) in b.iter() {
                let mut addr = Vec::with_capacity(result_type.dims().len());
                let mut matched = true;
                for (pa, pb) in pos_a.iter().zip(&pos_b) {
                    match (pa, pb) {
                        (Some(i), Some(j)) if addr_a[*i] != addr_b[*j] => {
                            matched = false;
                            break;
                        }
                        (Some(i), _) => addr.push(addr_a[*i].clone()),
                        (None, Some(j)) => addr.push(addr_b[*j].clone()),
                        (None, None) => unreachable!("result dimension missing from both inputs"),
                    }
                }
                if matched {
                    cells.push((addr, f(x, y)));
                }
            }
        }
        build(result_type, cells)
    }

    fn merge(
        &self,
        a: &Value,
        b: &Value,
        f: &mut dyn FnMut(f64, f64) -> f64,
        result_type: &ValueType,
    ) -> Value {
        if a.value_type().mapped_dims().next().is_none() {
            // Dense and scalar operands share every address.
            let ct = result_type.cell_type();
            let cells = a
                .cells()
                .iter()
                .zip(b.cells())
                .map(|(&x, &y)| ct.narrow(f(x, y)))
                .collect();
            return Value::from_dense(result_type.clone(), cells)
                .unwrap_or_else(|e| panic!("merge of {result_type} has the wrong shape: {e}"));
        }

        let mut cells: BTreeMap<Vec<Label>, f64> = a.iter().collect();
        for (addr, y) in b.iter() {
            cells
                .entry(addr)
                .and_modify(|x| *x = f(*x, y))
                .or_insert(y);
        }
        build(result_type, cells.into_iter().collect())
    }

    fn reduce(&self, a: &Value, aggr: Aggr, _dims: &[String], result_type: &ValueType) -> Value {
        let pos = positions(result_type, a.value_type());
        let mut groups: BTreeMap<Vec<Label>, Aggregator> = BTreeMap::new();

        // Dense results have every cell even when nothing folds into it.
        if result_type.mapped_dims().next().is_none() {
            for (addr, _) in Value::filled(result_type.clone(), 0.0).iter() {
                groups.insert(addr, Aggregator::new(aggr));
            }
        }

        for (addr, x) in a.iter() {
            let key: Vec<Label> = pos
                .iter()
                .map(|p| addr[p.expect("kept dimension exists in input")].clone())
                .collect();
            groups
                .entry(key)
                .or_insert_with(|| Aggregator::new(aggr))
                .add(x);
        }

        build(
            result_type,
            groups.into_iter().map(|(k, g)| (k, g.result())).collect(),
        )
    }

    fn rename(&self, a: &Value, from: &[String], to: &[String], result_type: &ValueType) -> Value {
        let src = a.value_type();
        let pos: Vec<usize> = result_type
            .dims()
            .iter()
            .map(|d| {
                let old = match to.iter().position(|n| *n == d.name) {
                    Some(k) => &from[k],
                    None => &d.name,
                };
                src.dimension_index(old)
                    .unwrap_or_else(|| panic!("renamed dimension '{old}' missing from {src}"))
            })
            .collect();

        let cells = a
            .iter()
            .map(|(addr, x)| (pos.iter().map(|&p| addr[p].clone()).collect(), x))
            .collect();
        build(result_type, cells)
    }

    fn concat(&self, a: &Value, b: &Value, dim: &str, result_type: &ValueType) -> Value {
        let ta = a.value_type();
        let extent_a = ta
            .dimension_index(dim)
            .and_then(|i| ta.dims()[i].size)
            .unwrap_or(1);

        // Labels a side lacking a dimension gets broadcast over.
        let universe: Vec<Vec<Label>> = result_type
            .dims()
            .iter()
            .map(|d| match d.size {
                Some(n) => (0..n).map(Label::Index).collect(),
                None => {
                    let mut seen = BTreeSet::new();
                    for v in [a, b] {
                        if let Some(i) = v.value_type().dimension_index(&d.name) {
                            seen.extend(v.iter().map(|(addr, _)| addr[i].clone()));
                        }
                    }
                    seen.into_iter().collect()
                }
            })
            .collect();

        let mut cells = Vec::new();
        for (side, offset) in [(a, 0u32), (b, extent_a)] {
            let pos = positions(result_type, side.value_type());
            for (addr, x) in side.iter() {
                let mut partial: Vec<Vec<Label>> = vec![Vec::new()];
                for (k, d) in result_type.dims().iter().enumerate() {
                    let choices: Vec<Label> = if d.name == dim {
                        let i = match pos[k].map(|p| &addr[p]) {
                            Some(Label::Index(i)) => *i,
                            _ => 0,
                        };
                        vec![Label::Index(i + offset)]
                    } else if let Some(p) = pos[k] {
                        vec![addr[p].clone()]
                    } else {
                        universe[k].clone()
                    };
                    partial = partial
                        .into_iter()
                        .flat_map(|prefix| {
                            choices.iter().map(move |l| {
                                let mut next = prefix.clone();
                                next.push(l.clone());
                                next
                            })
                        })
                        .collect();
                }
                cells.extend(partial.into_iter().map(|addr| (addr, x)));
            }
        }
        build(result_type, cells)
    }
}
