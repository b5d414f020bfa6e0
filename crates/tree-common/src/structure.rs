//! Structure descriptors for each supported data kind.
//!
//! A structure is immutable for a given content version: adapters that
//! change their underlying data must also report a new version.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dtype::{ColumnType, DType};

/// Errors raised when a structure descriptor is internally inconsistent.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StructureError {
    #[error("shape has {shape} dimensions but chunk grid has {chunks}")]
    DimensionMismatch { shape: usize, chunks: usize },

    #[error("chunk size along dimension {0} must be positive")]
    ZeroChunk(usize),

    #[error("invalid partition boundaries: {0}")]
    InvalidPartitions(String),

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
}

/// Closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    Container,
    Array,
    Table,
    Sparse,
}

impl StructureKind {
    pub const ALL: [StructureKind; 4] = [
        StructureKind::Container,
        StructureKind::Array,
        StructureKind::Table,
        StructureKind::Sparse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StructureKind::Container => "container",
            StructureKind::Array => "array",
            StructureKind::Table => "table",
            StructureKind::Sparse => "sparse",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// N-dimensional array: shape, element type and chunk grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayStructure {
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: DType,
}

impl ArrayStructure {
    pub fn new(shape: Vec<usize>, chunks: Vec<usize>, dtype: DType) -> Result<Self, StructureError> {
        if shape.len() != chunks.len() {
            return Err(StructureError::DimensionMismatch {
                shape: shape.len(),
                chunks: chunks.len(),
            });
        }
        if let Some(dim) = chunks.iter().position(|&c| c == 0) {
            return Err(StructureError::ZeroChunk(dim));
        }
        Ok(Self {
            shape,
            chunks,
            dtype,
        })
    }

    /// A single chunk covering the whole array.
    pub fn unchunked(shape: Vec<usize>, dtype: DType) -> Self {
        let chunks = shape.iter().map(|&s| s.max(1)).collect();
        Self {
            shape,
            chunks,
            dtype,
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nbytes(&self) -> usize {
        self.len() * self.dtype.itemsize()
    }

    /// Number of blocks along a dimension.
    pub fn block_count(&self, dim: usize) -> usize {
        (self.shape[dim] + self.chunks[dim] - 1) / self.chunks[dim]
    }

    pub fn block_counts(&self) -> Vec<usize> {
        (0..self.ndim()).map(|d| self.block_count(d)).collect()
    }

    /// Index range covered by `block` along `dim`. Edge blocks may be short.
    pub fn block_range(&self, dim: usize, block: usize) -> Range<usize> {
        let start = block * self.chunks[dim];
        let end = (start + self.chunks[dim]).min(self.shape[dim]);
        start..end
    }

    /// Shape of the block at the given block coordinates.
    pub fn block_shape(&self, block: &[usize]) -> Vec<usize> {
        block
            .iter()
            .enumerate()
            .map(|(dim, &b)| self.block_range(dim, b).len())
            .collect()
    }
}

/// Name and type of one table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub dtype: ColumnType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Table / dataframe schema with optional row partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStructure {
    pub columns: Vec<ColumnDescriptor>,
    pub row_count: usize,
    /// Row offsets at which partitions start. Empty means a single partition.
    #[serde(default)]
    pub partitions: Vec<usize>,
}

impl TableStructure {
    pub fn new(
        columns: Vec<ColumnDescriptor>,
        row_count: usize,
        partitions: Vec<usize>,
    ) -> Result<Self, StructureError> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(StructureError::DuplicateColumn(column.name.clone()));
            }
        }
        if !partitions.is_empty() {
            if partitions[0] != 0 {
                return Err(StructureError::InvalidPartitions(
                    "first partition must start at row 0".into(),
                ));
            }
            if partitions.windows(2).any(|w| w[0] >= w[1]) {
                return Err(StructureError::InvalidPartitions(
                    "partition offsets must be strictly increasing".into(),
                ));
            }
            if row_count > 0 && partitions[partitions.len() - 1] >= row_count {
                return Err(StructureError::InvalidPartitions(format!(
                    "partition offset {} is beyond row count {}",
                    partitions[partitions.len() - 1],
                    row_count
                )));
            }
        }
        Ok(Self {
            columns,
            row_count,
            partitions,
        })
    }

    pub fn partition_count(&self) -> usize {
        if self.row_count == 0 {
            1
        } else {
            self.partitions.len().max(1)
        }
    }

    /// Rows covered by a partition.
    pub fn partition_range(&self, partition: usize) -> Range<usize> {
        if self.partitions.is_empty() || self.row_count == 0 {
            return 0..self.row_count;
        }
        let start = self.partitions[partition];
        let end = self
            .partitions
            .get(partition + 1)
            .copied()
            .unwrap_or(self.row_count);
        start..end
    }

    /// Partition containing `row`.
    pub fn partition_of(&self, row: usize) -> usize {
        if self.partitions.is_empty() {
            return 0;
        }
        match self.partitions.binary_search(&row) {
            Ok(i) => i,
            Err(i) => i - 1,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Storage layout of a sparse array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparseLayout {
    /// Coordinate list: one coordinate tuple per stored value.
    Coo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseStructure {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub layout: SparseLayout,
}

impl SparseStructure {
    pub fn coo(shape: Vec<usize>, dtype: DType) -> Self {
        Self {
            shape,
            dtype,
            layout: SparseLayout::Coo,
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
}

/// Kind-specific structure of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Structure {
    Container { count: usize },
    Array(ArrayStructure),
    Table(TableStructure),
    Sparse(SparseStructure),
}

impl Structure {
    pub fn kind(&self) -> StructureKind {
        match self {
            Structure::Container { .. } => StructureKind::Container,
            Structure::Array(_) => StructureKind::Array,
            Structure::Table(_) => StructureKind::Table,
            Structure::Sparse(_) => StructureKind::Sparse,
        }
    }

    /// Shape for the array-like kinds, row count for tables.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Structure::Container { count } => vec![*count],
            Structure::Array(a) => a.shape.clone(),
            Structure::Table(t) => vec![t.row_count, t.columns.len()],
            Structure::Sparse(s) => s.shape.clone(),
        }
    }
}

/// Semantic tag attached to a node, with optional version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Spec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}
