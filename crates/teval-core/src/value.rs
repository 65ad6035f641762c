//! Tensor/scalar values.
//!
//! Canonical layout: one entry in `index` per sparse subspace (the labels of
//! the mapped dimensions, in dimension order, sorted), and for each subspace a
//! contiguous run of `dense_subspace_size` cells in row-major order over the
//! indexed dimensions. Scalars and dense tensors have exactly one subspace
//! with an empty label list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Layout, ValueType};

/// One coordinate of a cell address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    Index(u32),
    Name(String),
}

impl From<u32> for Label {
    fn from(i: u32) -> Self {
        Label::Index(i)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::Name(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    ty: ValueType,
    index: Vec<Vec<String>>,
    cells: Vec<f64>,
}

impl Value {
    pub fn double(v: f64) -> Self {
        Self {
            ty: ValueType::double(),
            index: vec![vec![]],
            cells: vec![v],
        }
    }

    /// A value of type `ty` with every dense cell set to `v`. Types with
    /// mapped dimensions get no subspaces at all.
    pub fn filled(ty: ValueType, v: f64) -> Self {
        if ty.mapped_dims().next().is_some() {
            return Self {
                ty,
                index: vec![],
                cells: vec![],
            };
        }
        let n = ty.dense_subspace_size();
        let v = ty.cell_type().narrow(v);
        Self {
            ty,
            index: vec![vec![]],
            cells: vec![v; n],
        }
    }

    /// Build a dense (or scalar) value from row-major cells.
    pub fn from_dense(ty: ValueType, cells: Vec<f64>) -> Result<Self> {
        if matches!(ty.layout(), Layout::Sparse | Layout::Mixed) {
            return Err(Error::Value(format!("{ty} is not dense")));
        }
        if cells.len() != ty.dense_subspace_size() {
            return Err(Error::Value(format!(
                "{ty} needs {} cells, got {}",
                ty.dense_subspace_size(),
                cells.len()
            )));
        }
        let ct = ty.cell_type();
        Ok(Self {
            ty,
            index: vec![vec![]],
            cells: cells.into_iter().map(|c| ct.narrow(c)).collect(),
        })
    }

    /// Build a value from `(address, cell)` pairs. Addresses list one label per
    /// dimension in the type's (sorted) dimension order. Dense cells not
    /// mentioned default to 0.0; duplicate addresses keep the last cell.
    pub fn from_cells<I>(ty: ValueType, cells: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Vec<Label>, f64)>,
    {
        let dense_size = ty.dense_subspace_size();
        let strides = dense_strides(&ty);
        let mut spaces: BTreeMap<Vec<String>, Vec<f64>> = BTreeMap::new();

        for (addr, v) in cells {
            if addr.len() != ty.dims().len() {
                return Err(Error::Value(format!(
                    "address has {} labels, {ty} has {} dimensions",
                    addr.len(),
                    ty.dims().len()
                )));
            }
            let mut sparse = Vec::new();
            let mut offset = 0usize;
            let mut k = 0usize;
            for (dim, label) in ty.dims().iter().zip(addr) {
                match (dim.size, label) {
                    (Some(size), Label::Index(i)) if i < size => {
                        offset += i as usize * strides[k];
                        k += 1;
                    }
                    (None, Label::Name(name)) => sparse.push(name),
                    (_, label) => {
                        return Err(Error::Value(format!(
                            "label {label:?} does not fit dimension '{}'",
                            dim.name
                        )))
                    }
                }
            }
            let space = spaces
                .entry(sparse)
                .or_insert_with(|| vec![0.0; dense_size]);
            space[offset] = ty.cell_type().narrow(v);
        }

        if spaces.is_empty() && ty.mapped_dims().next().is_none() {
            spaces.insert(vec![], vec![0.0; dense_size]);
        }

        let mut index = Vec::with_capacity(spaces.len());
        let mut out = Vec::with_capacity(spaces.len() * dense_size);
        for (labels, cells) in spaces {
            index.push(labels);
            out.extend(cells);
        }
        Ok(Self {
            ty,
            index,
            cells: out,
        })
    }

    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }

    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    /// Mutable cell access. Only reachable through an exclusive borrow, so the
    /// caller is the sole owner of the storage.
    pub fn cells_mut(&mut self) -> &mut [f64] {
        &mut self.cells
    }

    /// Sparse labels of each subspace.
    pub fn subspaces(&self) -> &[Vec<String>] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Scalar view: the cell of a scalar, the sum of cells for a tensor.
    pub fn as_double(&self) -> f64 {
        if self.ty.is_double() {
            self.cells.first().copied().unwrap_or(0.0)
        } else {
            self.cells.iter().sum()
        }
    }

    /// Iterate `(full address, cell)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Vec<Label>, f64)> + '_ {
        let dense_size = self.ty.dense_subspace_size();
        let strides = dense_strides(&self.ty);
        self.cells.iter().enumerate().map(move |(pos, &v)| {
            let labels = &self.index[pos / dense_size];
            let mut rest = pos % dense_size;
            let mut addr = Vec::with_capacity(self.ty.dims().len());
            let (mut m, mut k) = (0usize, 0usize);
            for dim in self.ty.dims() {
                if dim.is_mapped() {
                    addr.push(Label::Name(labels[m].clone()));
                    m += 1;
                } else {
                    addr.push(Label::Index((rest / strides[k]) as u32));
                    rest %= strides[k];
                    k += 1;
                }
            }
            (addr, v)
        })
    }

    /// Cell lookup by full address.
    pub fn get(&self, addr: &[Label]) -> Option<f64> {
        self.iter().find(|(a, _)| a == addr).map(|(_, v)| v)
    }

    /// Same type, same addresses, and cells within `tol` (NaN matches NaN).
    pub fn approx_eq(&self, other: &Value, tol: f64) -> bool {
        self.ty == other.ty
            && self.index == other.index
            && self.cells.len() == other.cells.len()
            && self.cells.iter().zip(&other.cells).all(|(a, b)| {
                (a.is_nan() && b.is_nan()) || a == b || (a - b).abs() <= tol * a.abs().max(1.0)
            })
    }
}

/// Row-major strides over the indexed dimensions, in dimension order.
fn dense_strides(ty: &ValueType) -> Vec<usize> {
    let sizes: Vec<usize> = ty
        .indexed_dims()
        .map(|d| d.size.unwrap_or(1) as usize)
        .collect();
    let mut strides = vec![1usize; sizes.len()];
    for i in (0..sizes.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * sizes[i + 1];
    }
    strides
}
