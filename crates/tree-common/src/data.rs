//! In-memory payloads produced by adapter reads and by the slice engine.

use std::ops::Range;

use bytes::Bytes;

use crate::dtype::{ColumnType, DType, Scalar};
use crate::error::{DataError, DataResult};
use crate::structure::StructureKind;

/// Element strides of a C-order array with the given shape.
pub fn c_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Dense array contents in C order, encoded in the dtype's byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub bytes: Bytes,
}

impl ArrayData {
    pub fn new(dtype: DType, shape: Vec<usize>, bytes: impl Into<Bytes>) -> DataResult<Self> {
        let bytes = bytes.into();
        let expected = shape.iter().product::<usize>() * dtype.itemsize();
        if bytes.len() != expected {
            return Err(DataError::Internal(format!(
                "array buffer holds {} bytes, shape {:?} of {} needs {}",
                bytes.len(),
                shape,
                dtype,
                expected
            )));
        }
        Ok(Self {
            dtype,
            shape,
            bytes,
        })
    }

    /// Build from scalar values, encoding each with `dtype`.
    pub fn from_scalars(dtype: DType, shape: Vec<usize>, values: &[Scalar]) -> DataResult<Self> {
        let mut buf = Vec::with_capacity(values.len() * dtype.itemsize());
        for value in values {
            dtype
                .encode(*value, &mut buf)
                .map_err(|e| DataError::Validation(e.to_string()))?;
        }
        Self::new(dtype, shape, buf)
    }

    pub fn from_f64(shape: Vec<usize>, values: &[f64]) -> DataResult<Self> {
        let scalars: Vec<Scalar> = values.iter().map(|v| Scalar::Float(*v)).collect();
        Self::from_scalars(DType::f64(), shape, &scalars)
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes of the element at flat (C-order) position `index`.
    pub fn element_bytes(&self, index: usize) -> &[u8] {
        let size = self.dtype.itemsize();
        &self.bytes[index * size..(index + 1) * size]
    }

    pub fn element(&self, index: usize) -> Scalar {
        self.dtype.decode(self.element_bytes(index))
    }

    pub fn scalars(&self) -> Vec<Scalar> {
        (0..self.len()).map(|i| self.element(i)).collect()
    }
}

/// Values of a single table column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Bool(Vec<bool>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Utf8(Vec<String>),
}

impl ColumnValues {
    pub fn empty(dtype: ColumnType) -> Self {
        match dtype {
            ColumnType::Bool => ColumnValues::Bool(Vec::new()),
            ColumnType::Int64 => ColumnValues::Int64(Vec::new()),
            ColumnType::Float64 => ColumnValues::Float64(Vec::new()),
            ColumnType::Utf8 => ColumnValues::Utf8(Vec::new()),
        }
    }

    pub fn dtype(&self) -> ColumnType {
        match self {
            ColumnValues::Bool(_) => ColumnType::Bool,
            ColumnValues::Int64(_) => ColumnType::Int64,
            ColumnValues::Float64(_) => ColumnType::Float64,
            ColumnValues::Utf8(_) => ColumnType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Bool(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather rows by position. Positions must be in bounds.
    pub fn take(&self, rows: &[usize]) -> ColumnValues {
        match self {
            ColumnValues::Bool(v) => ColumnValues::Bool(rows.iter().map(|&r| v[r]).collect()),
            ColumnValues::Int64(v) => ColumnValues::Int64(rows.iter().map(|&r| v[r]).collect()),
            ColumnValues::Float64(v) => {
                ColumnValues::Float64(rows.iter().map(|&r| v[r]).collect())
            }
            ColumnValues::Utf8(v) => {
                ColumnValues::Utf8(rows.iter().map(|&r| v[r].clone()).collect())
            }
        }
    }

    /// Copy a contiguous run of rows. The range must be in bounds.
    pub fn range(&self, rows: Range<usize>) -> ColumnValues {
        match self {
            ColumnValues::Bool(v) => ColumnValues::Bool(v[rows].to_vec()),
            ColumnValues::Int64(v) => ColumnValues::Int64(v[rows].to_vec()),
            ColumnValues::Float64(v) => ColumnValues::Float64(v[rows].to_vec()),
            ColumnValues::Utf8(v) => ColumnValues::Utf8(v[rows].to_vec()),
        }
    }

    /// Append another column of the same type.
    pub fn extend(&mut self, other: ColumnValues) -> DataResult<()> {
        match (self, other) {
            (ColumnValues::Bool(a), ColumnValues::Bool(b)) => a.extend(b),
            (ColumnValues::Int64(a), ColumnValues::Int64(b)) => a.extend(b),
            (ColumnValues::Float64(a), ColumnValues::Float64(b)) => a.extend(b),
            (ColumnValues::Utf8(a), ColumnValues::Utf8(b)) => a.extend(b),
            (a, b) => {
                return Err(DataError::Internal(format!(
                    "cannot append {} values to {} column",
                    b.dtype().as_str(),
                    a.dtype().as_str()
                )))
            }
        }
        Ok(())
    }

    pub fn value_json(&self, row: usize) -> serde_json::Value {
        match self {
            ColumnValues::Bool(v) => serde_json::Value::Bool(v[row]),
            ColumnValues::Int64(v) => serde_json::Value::from(v[row]),
            ColumnValues::Float64(v) => serde_json::Number::from_f64(v[row])
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ColumnValues::Utf8(v) => serde_json::Value::String(v[row].clone()),
        }
    }

    pub fn value_text(&self, row: usize) -> String {
        match self {
            ColumnValues::Bool(v) => v[row].to_string(),
            ColumnValues::Int64(v) => v[row].to_string(),
            ColumnValues::Float64(v) => v[row].to_string(),
            ColumnValues::Utf8(v) => v[row].clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Column-ordered table contents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableData {
    pub columns: Vec<Column>,
}

impl TableData {
    pub fn new(columns: Vec<Column>) -> DataResult<Self> {
        if let Some(first) = columns.first() {
            let rows = first.values.len();
            if let Some(bad) = columns.iter().find(|c| c.values.len() != rows) {
                return Err(DataError::Internal(format!(
                    "column '{}' has {} rows, expected {}",
                    bad.name,
                    bad.values.len(),
                    rows
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn take_rows(&self, rows: &[usize]) -> TableData {
        TableData {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.values.take(rows)))
                .collect(),
        }
    }

    /// Rows `rows` of the named columns, in the order given. No names means
    /// every column. Only the requested cells are copied.
    pub fn row_range(&self, rows: Range<usize>, names: &[String]) -> DataResult<TableData> {
        if rows.end > self.row_count() || rows.start > rows.end {
            return Err(DataError::Validation(format!(
                "rows {}..{} out of range ({} rows)",
                rows.start,
                rows.end,
                self.row_count()
            )));
        }
        let columns = if names.is_empty() {
            self.columns.iter().collect::<Vec<_>>()
        } else {
            names
                .iter()
                .map(|name| {
                    self.column(name)
                        .ok_or_else(|| DataError::Validation(format!("unknown column '{}'", name)))
                })
                .collect::<DataResult<Vec<_>>>()?
        };
        Ok(TableData {
            columns: columns
                .into_iter()
                .map(|c| Column::new(c.name.clone(), c.values.range(rows.clone())))
                .collect(),
        })
    }

    /// Append the rows of `other`, which must carry the same columns.
    pub fn append(&mut self, other: TableData) -> DataResult<()> {
        if self.columns.is_empty() {
            self.columns = other.columns;
            return Ok(());
        }
        if self.columns.len() != other.columns.len() {
            return Err(DataError::Internal("column count mismatch on append".into()));
        }
        for (mine, theirs) in self.columns.iter_mut().zip(other.columns) {
            if mine.name != theirs.name {
                return Err(DataError::Internal(format!(
                    "column '{}' does not match '{}' on append",
                    theirs.name, mine.name
                )));
            }
            mine.values.extend(theirs.values)?;
        }
        Ok(())
    }
}

/// Coordinate-list sparse array contents.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseData {
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// One coordinate tuple per stored value.
    pub coords: Vec<Vec<usize>>,
    /// Stored values, packed in the dtype's byte order.
    pub values: Bytes,
}

impl SparseData {
    pub fn new(
        shape: Vec<usize>,
        dtype: DType,
        coords: Vec<Vec<usize>>,
        values: impl Into<Bytes>,
    ) -> DataResult<Self> {
        let values = values.into();
        if values.len() != coords.len() * dtype.itemsize() {
            return Err(DataError::Internal(format!(
                "sparse buffer holds {} bytes for {} coordinates",
                values.len(),
                coords.len()
            )));
        }
        if let Some(c) = coords
            .iter()
            .find(|c| c.len() != shape.len() || c.iter().zip(&shape).any(|(i, s)| i >= s))
        {
            return Err(DataError::Internal(format!(
                "coordinate {:?} does not fit shape {:?}",
                c, shape
            )));
        }
        Ok(Self {
            shape,
            dtype,
            coords,
            values,
        })
    }

    pub fn nnz(&self) -> usize {
        self.coords.len()
    }

    pub fn value_bytes(&self, index: usize) -> &[u8] {
        let size = self.dtype.itemsize();
        &self.values[index * size..(index + 1) * size]
    }

    pub fn value(&self, index: usize) -> Scalar {
        self.dtype.decode(self.value_bytes(index))
    }
}

/// Assembled result of a read, by structure kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Array(ArrayData),
    Table(TableData),
    Sparse(SparseData),
}

impl Payload {
    pub fn kind(&self) -> StructureKind {
        match self {
            Payload::Array(_) => StructureKind::Array,
            Payload::Table(_) => StructureKind::Table,
            Payload::Sparse(_) => StructureKind::Sparse,
        }
    }

    /// Shape of the result: dimensions for arrays, `[rows, columns]` for tables.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Payload::Array(a) => a.shape.clone(),
            Payload::Table(t) => vec![t.row_count(), t.columns.len()],
            Payload::Sparse(s) => s.shape.clone(),
        }
    }
}
