//! Value types: cell type, dimensions, and layout class. Pure data.
//!
//! Dimensions are kept sorted by name so that two types with the same
//! dimensions compare equal regardless of declaration order, and so that cell
//! addresses have one canonical order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    Double,
    Float,
}

impl CellType {
    /// Round `x` to what a cell of this type can hold.
    #[inline]
    pub fn narrow(self, x: f64) -> f64 {
        match self {
            CellType::Double => x,
            CellType::Float => x as f32 as f64,
        }
    }

    fn unify(a: CellType, b: CellType) -> CellType {
        if a == CellType::Double || b == CellType::Double {
            CellType::Double
        } else {
            CellType::Float
        }
    }
}

/// One tensor dimension. `size == None` means mapped (sparse, string labels).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub size: Option<u32>,
}

impl Dimension {
    pub fn indexed(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
        }
    }

    pub fn mapped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.size.is_some()
    }

    pub fn is_mapped(&self) -> bool {
        self.size.is_none()
    }
}

/// Layout class of a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    /// No dimensions at all.
    Scalar,
    /// Only indexed dimensions.
    Dense,
    /// Only mapped dimensions.
    Sparse,
    /// Both mapped and indexed dimensions.
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueType {
    cell_type: CellType,
    dims: Vec<Dimension>,
}

impl ValueType {
    /// The scalar type. Scalars always hold double cells.
    pub fn double() -> Self {
        Self {
            cell_type: CellType::Double,
            dims: vec![],
        }
    }

    /// Build a tensor type; dimensions are sorted by name.
    pub fn tensor(cell_type: CellType, mut dims: Vec<Dimension>) -> Result<Self> {
        dims.sort_by(|a, b| a.name.cmp(&b.name));
        for pair in dims.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(Error::Type(format!("duplicate dimension '{}'", pair[0].name)));
            }
        }
        if let Some(d) = dims.iter().find(|d| d.size == Some(0)) {
            return Err(Error::Type(format!("indexed dimension '{}' has size 0", d.name)));
        }
        Ok(Self::normalized(cell_type, dims))
    }

    fn normalized(cell_type: CellType, dims: Vec<Dimension>) -> Self {
        let cell_type = if dims.is_empty() {
            CellType::Double
        } else {
            cell_type
        };
        Self { cell_type, dims }
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn is_double(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn layout(&self) -> Layout {
        let mapped = self.dims.iter().filter(|d| d.is_mapped()).count();
        match (self.dims.len(), mapped) {
            (0, _) => Layout::Scalar,
            (_, 0) => Layout::Dense,
            (n, m) if n == m => Layout::Sparse,
            _ => Layout::Mixed,
        }
    }

    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d.name == name)
    }

    pub fn mapped_dims(&self) -> impl Iterator<Item = &Dimension> {
        self.dims.iter().filter(|d| d.is_mapped())
    }

    pub fn indexed_dims(&self) -> impl Iterator<Item = &Dimension> {
        self.dims.iter().filter(|d| d.is_indexed())
    }

    /// Number of cells in each dense subspace (1 for scalars and sparse types).
    pub fn dense_subspace_size(&self) -> usize {
        self.indexed_dims()
            .map(|d| d.size.unwrap_or(1) as usize)
            .product()
    }

    /// Result type of an elementwise map.
    pub fn map(&self) -> ValueType {
        self.clone()
    }

    /// Result type of joining `a` and `b`: the union of their dimensions.
    pub fn join(a: &ValueType, b: &ValueType) -> Result<ValueType> {
        let dims = union_dims(&a.dims, &b.dims)?;
        let cell_type = unify_cells(a, b);
        Ok(Self::normalized(cell_type, dims))
    }

    /// Result type of merging `a` and `b`, which must have the same dimensions.
    pub fn merge(a: &ValueType, b: &ValueType) -> Result<ValueType> {
        if a.dims != b.dims {
            return Err(Error::Type(format!(
                "cannot merge {a} with {b}: dimensions differ"
            )));
        }
        Ok(Self::normalized(
            CellType::unify(a.cell_type, b.cell_type),
            a.dims.clone(),
        ))
    }

    /// Result type of reducing over `dims`; an empty list reduces everything.
    pub fn reduce(&self, dims: &[String]) -> Result<ValueType> {
        if dims.is_empty() {
            return Ok(Self::double());
        }
        for name in dims {
            if self.dimension_index(name).is_none() {
                return Err(Error::Type(format!("cannot reduce unknown dimension '{name}'")));
            }
        }
        let kept = self
            .dims
            .iter()
            .filter(|d| !dims.contains(&d.name))
            .cloned()
            .collect();
        Ok(Self::normalized(self.cell_type, kept))
    }

    pub fn rename(&self, from: &[String], to: &[String]) -> Result<ValueType> {
        if from.len() != to.len() || from.is_empty() {
            return Err(Error::Type("rename needs matching, non-empty name lists".into()));
        }
        let mut dims = self.dims.clone();
        for (old, new) in from.iter().zip(to) {
            let idx = self
                .dimension_index(old)
                .ok_or_else(|| Error::Type(format!("cannot rename unknown dimension '{old}'")))?;
            dims[idx].name = new.clone();
        }
        Self::tensor(self.cell_type, dims)
    }

    /// Result type of concatenating `a` and `b` along the indexed dimension `dim`.
    /// A side without `dim` counts as size 1 along it.
    pub fn concat(a: &ValueType, b: &ValueType, dim: &str) -> Result<ValueType> {
        let size_a = concat_extent(a, dim)?;
        let size_b = concat_extent(b, dim)?;
        let strip = |t: &ValueType| -> Vec<Dimension> {
            t.dims.iter().filter(|d| d.name != dim).cloned().collect()
        };
        let mut dims = union_dims(&strip(a), &strip(b))?;
        dims.push(Dimension::indexed(dim, size_a + size_b));
        Self::tensor(unify_cells(a, b), dims)
    }
}

fn concat_extent(t: &ValueType, dim: &str) -> Result<u32> {
    match t.dimension_index(dim) {
        None => Ok(1),
        Some(i) => t.dims[i]
            .size
            .ok_or_else(|| Error::Type(format!("cannot concat along mapped dimension '{dim}'"))),
    }
}

fn unify_cells(a: &ValueType, b: &ValueType) -> CellType {
    match (a.is_double(), b.is_double()) {
        (true, _) => b.cell_type,
        (_, true) => a.cell_type,
        _ => CellType::unify(a.cell_type, b.cell_type),
    }
}

fn union_dims(a: &[Dimension], b: &[Dimension]) -> Result<Vec<Dimension>> {
    let mut out: Vec<Dimension> = a.to_vec();
    for d in b {
        match out.iter().find(|x| x.name == d.name) {
            Some(existing) if existing.size != d.size => {
                return Err(Error::Type(format!(
                    "dimension '{}' has conflicting shapes",
                    d.name
                )));
            }
            Some(_) => {}
            None => out.push(d.clone()),
        }
    }
    out.sort_by(|x, y| x.name.cmp(&y.name));
    Ok(out)
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_double() {
            return write!(f, "double");
        }
        let cells = match self.cell_type {
            CellType::Double => "",
            CellType::Float => "<float>",
        };
        write!(f, "tensor{cells}(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match d.size {
                Some(n) => write!(f, "{}[{}]", d.name, n)?,
                None => write!(f, "{}{{}}", d.name)?,
            }
        }
        write!(f, ")")
    }
}
