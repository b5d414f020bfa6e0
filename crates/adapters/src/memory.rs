//! In-memory adapters.
//!
//! These back the built-in families and the test fixtures. Every `set_*`
//! call bumps the content version so cached results computed from the old
//! contents are never served again.

use async_trait::async_trait;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::RwLock;

use tree_common::{
    c_strides, ArrayData, ArrayStructure, ColumnDescriptor, ContentVersion, DataError,
    DataResult, Metadata, SparseData, SparseStructure, Spec, Structure, StructureKind,
    TableData, TableStructure,
};

use crate::adapter::{Adapter, AdapterError, AdapterResult, ChildEntry, Chunk, ReadRequest};

fn version_token(digest: u32, generation: u64) -> ContentVersion {
    ContentVersion::new(format!("{:08x}-{}", digest, generation))
}

fn unsupported(kind: StructureKind, request: &ReadRequest) -> AdapterError {
    AdapterError::permanent(format!("{} adapter cannot serve {:?}", kind, request))
}

/// Copy the sub-block covered by `ranges` out of a C-order array.
pub(crate) fn extract_block(data: &ArrayData, ranges: &[Range<usize>]) -> Vec<u8> {
    let item = data.dtype.itemsize();
    let ndim = data.shape.len();
    let out_len: usize = ranges.iter().map(|r| r.len()).product();
    let mut out = Vec::with_capacity(out_len * item);
    if out_len == 0 {
        return out;
    }
    if ndim == 0 {
        out.extend_from_slice(&data.bytes[..item]);
        return out;
    }

    let strides = c_strides(&data.shape);
    let last = ndim - 1;
    let run = ranges[last].len() * item;
    let mut idx: Vec<usize> = ranges[..last].iter().map(|r| r.start).collect();

    loop {
        let mut offset = ranges[last].start * strides[last];
        for d in 0..last {
            offset += idx[d] * strides[d];
        }
        let start = offset * item;
        out.extend_from_slice(&data.bytes[start..start + run]);

        // Odometer over the leading dimensions.
        let mut d = last;
        loop {
            if d == 0 {
                return out;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < ranges[d].end {
                break;
            }
            idx[d] = ranges[d].start;
        }
    }
}

// === Containers ===

struct MapState {
    entries: Vec<(String, Arc<dyn Adapter>)>,
    metadata: Metadata,
    specs: Vec<Spec>,
    generation: u64,
}

/// Container holding an ordered list of named children.
pub struct MapAdapter {
    state: RwLock<MapState>,
}

impl MapAdapter {
    pub fn new(entries: Vec<(String, Arc<dyn Adapter>)>) -> Self {
        Self {
            state: RwLock::new(MapState {
                entries,
                metadata: Metadata::new(),
                specs: Vec::new(),
                generation: 1,
            }),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.state.get_mut().metadata = metadata;
        self
    }

    pub fn with_specs(mut self, specs: Vec<Spec>) -> Self {
        self.state.get_mut().specs = specs;
        self
    }

    /// Add a child, replacing any existing child of the same name in place.
    pub async fn insert(&self, name: impl Into<String>, adapter: Arc<dyn Adapter>) {
        let name = name.into();
        let mut state = self.state.write().await;
        match state.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = adapter,
            None => state.entries.push((name, adapter)),
        }
        state.generation += 1;
    }

    pub async fn remove(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        let mut state = self.state.write().await;
        let pos = state.entries.iter().position(|(n, _)| n == name)?;
        state.generation += 1;
        Some(state.entries.remove(pos).1)
    }

    pub async fn set_metadata(&self, metadata: Metadata) {
        let mut state = self.state.write().await;
        state.metadata = metadata;
        state.generation += 1;
    }
}

#[async_trait]
impl Adapter for MapAdapter {
    fn kind(&self) -> StructureKind {
        StructureKind::Container
    }

    async fn enumerate_children(&self) -> AdapterResult<Vec<ChildEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .map(|(name, adapter)| ChildEntry {
                name: name.clone(),
                kind: adapter.kind(),
            })
            .collect())
    }

    async fn child(&self, name: &str) -> AdapterResult<Option<Arc<dyn Adapter>>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| Arc::clone(a)))
    }

    async fn structure(&self) -> AdapterResult<Structure> {
        let state = self.state.read().await;
        Ok(Structure::Container {
            count: state.entries.len(),
        })
    }

    async fn metadata(&self) -> AdapterResult<Metadata> {
        Ok(self.state.read().await.metadata.clone())
    }

    async fn specs(&self) -> AdapterResult<Vec<Spec>> {
        Ok(self.state.read().await.specs.clone())
    }

    async fn content_version(&self) -> AdapterResult<ContentVersion> {
        let state = self.state.read().await;
        let mut hasher = crc32fast::Hasher::new();
        for (name, _) in &state.entries {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
        }
        Ok(version_token(hasher.finalize(), state.generation))
    }

    async fn read(&self, request: &ReadRequest) -> AdapterResult<Chunk> {
        Err(unsupported(StructureKind::Container, request))
    }
}

// === Arrays ===

struct ArrayState {
    structure: ArrayStructure,
    data: ArrayData,
    metadata: Metadata,
    specs: Vec<Spec>,
    version: ContentVersion,
    generation: u64,
}

/// Dense array held in memory and served block by block.
pub struct ArrayAdapter {
    state: RwLock<ArrayState>,
}

impl ArrayAdapter {
    /// Wrap `data`, chunked by `chunks` (or as a single block when `None`).
    pub fn new(data: ArrayData, chunks: Option<Vec<usize>>) -> DataResult<Self> {
        let structure = Self::structure_for(&data, chunks)?;
        let version = version_token(crc32fast::hash(&data.bytes), 1);
        Ok(Self {
            state: RwLock::new(ArrayState {
                structure,
                data,
                metadata: Metadata::new(),
                specs: Vec::new(),
                version,
                generation: 1,
            }),
        })
    }

    fn structure_for(data: &ArrayData, chunks: Option<Vec<usize>>) -> DataResult<ArrayStructure> {
        match chunks {
            Some(chunks) => ArrayStructure::new(data.shape.clone(), chunks, data.dtype)
                .map_err(|e| DataError::Validation(e.to_string())),
            None => Ok(ArrayStructure::unchunked(data.shape.clone(), data.dtype)),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.state.get_mut().metadata = metadata;
        self
    }

    pub fn with_specs(mut self, specs: Vec<Spec>) -> Self {
        self.state.get_mut().specs = specs;
        self
    }

    /// Replace the contents. The chunk grid is kept when the rank is unchanged.
    pub async fn set_data(&self, data: ArrayData) -> DataResult<()> {
        let mut state = self.state.write().await;
        let chunks = (state.structure.ndim() == data.shape.len())
            .then(|| state.structure.chunks.clone());
        let chunks = chunks.map(|c| {
            c.iter()
                .zip(&data.shape)
                .map(|(&c, &s)| c.min(s.max(1)))
                .collect()
        });
        state.structure = Self::structure_for(&data, chunks)?;
        state.generation += 1;
        state.version = version_token(crc32fast::hash(&data.bytes), state.generation);
        state.data = data;
        Ok(())
    }

    pub async fn set_metadata(&self, metadata: Metadata) {
        let mut state = self.state.write().await;
        state.metadata = metadata;
        state.generation += 1;
        state.version = version_token(crc32fast::hash(&state.data.bytes), state.generation);
    }
}

#[async_trait]
impl Adapter for ArrayAdapter {
    fn kind(&self) -> StructureKind {
        StructureKind::Array
    }

    async fn structure(&self) -> AdapterResult<Structure> {
        Ok(Structure::Array(self.state.read().await.structure.clone()))
    }

    async fn metadata(&self) -> AdapterResult<Metadata> {
        Ok(self.state.read().await.metadata.clone())
    }

    async fn specs(&self) -> AdapterResult<Vec<Spec>> {
        Ok(self.state.read().await.specs.clone())
    }

    async fn content_version(&self) -> AdapterResult<ContentVersion> {
        Ok(self.state.read().await.version.clone())
    }

    async fn read(&self, request: &ReadRequest) -> AdapterResult<Chunk> {
        let ReadRequest::ArrayBlock { block } = request else {
            return Err(unsupported(StructureKind::Array, request));
        };
        let state = self.state.read().await;
        let structure = &state.structure;
        if block.len() != structure.ndim() {
            return Err(AdapterError::permanent(format!(
                "block {:?} has wrong rank for {}-d array",
                block,
                structure.ndim()
            )));
        }
        if let Some(dim) = (0..block.len()).find(|&d| block[d] >= structure.block_count(d)) {
            return Err(AdapterError::permanent(format!(
                "block {:?} is outside the chunk grid along dimension {}",
                block, dim
            )));
        }

        let ranges: Vec<Range<usize>> = block
            .iter()
            .enumerate()
            .map(|(d, &b)| structure.block_range(d, b))
            .collect();
        let shape = ranges.iter().map(|r| r.len()).collect();
        let bytes = extract_block(&state.data, &ranges);
        let data = ArrayData::new(state.data.dtype, shape, bytes)
            .map_err(|e| AdapterError::permanent(e.to_string()))?;
        Ok(Chunk::Array(data))
    }
}

// === Tables ===

struct TableState {
    structure: TableStructure,
    data: TableData,
    metadata: Metadata,
    specs: Vec<Spec>,
    version: ContentVersion,
    generation: u64,
}

fn table_digest(data: &TableData) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for column in &data.columns {
        hasher.update(column.name.as_bytes());
        hasher.update(column.values.dtype().as_str().as_bytes());
        for row in 0..column.values.len() {
            hasher.update(column.values.value_text(row).as_bytes());
            hasher.update(&[0]);
        }
    }
    hasher.finalize()
}

/// Table held in memory and served partition by partition.
pub struct TableAdapter {
    state: RwLock<TableState>,
}

impl TableAdapter {
    pub fn new(data: TableData, partitions: Vec<usize>) -> DataResult<Self> {
        let structure = Self::structure_for(&data, partitions)?;
        let version = version_token(table_digest(&data), 1);
        Ok(Self {
            state: RwLock::new(TableState {
                structure,
                data,
                metadata: Metadata::new(),
                specs: Vec::new(),
                version,
                generation: 1,
            }),
        })
    }

    fn structure_for(data: &TableData, partitions: Vec<usize>) -> DataResult<TableStructure> {
        let columns = data
            .columns
            .iter()
            .map(|c| ColumnDescriptor::new(c.name.clone(), c.values.dtype()))
            .collect();
        TableStructure::new(columns, data.row_count(), partitions)
            .map_err(|e| DataError::Validation(e.to_string()))
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.state.get_mut().metadata = metadata;
        self
    }

    pub fn with_specs(mut self, specs: Vec<Spec>) -> Self {
        self.state.get_mut().specs = specs;
        self
    }

    pub async fn set_data(&self, data: TableData, partitions: Vec<usize>) -> DataResult<()> {
        let structure = Self::structure_for(&data, partitions)?;
        let mut state = self.state.write().await;
        state.generation += 1;
        state.version = version_token(table_digest(&data), state.generation);
        state.structure = structure;
        state.data = data;
        Ok(())
    }
}

#[async_trait]
impl Adapter for TableAdapter {
    fn kind(&self) -> StructureKind {
        StructureKind::Table
    }

    async fn structure(&self) -> AdapterResult<Structure> {
        Ok(Structure::Table(self.state.read().await.structure.clone()))
    }

    async fn metadata(&self) -> AdapterResult<Metadata> {
        Ok(self.state.read().await.metadata.clone())
    }

    async fn specs(&self) -> AdapterResult<Vec<Spec>> {
        Ok(self.state.read().await.specs.clone())
    }

    async fn content_version(&self) -> AdapterResult<ContentVersion> {
        Ok(self.state.read().await.version.clone())
    }

    async fn read(&self, request: &ReadRequest) -> AdapterResult<Chunk> {
        let ReadRequest::TablePartition { partition, columns } = request else {
            return Err(unsupported(StructureKind::Table, request));
        };
        let state = self.state.read().await;
        if *partition >= state.structure.partition_count() {
            return Err(AdapterError::permanent(format!(
                "partition {} out of range ({} partitions)",
                partition,
                state.structure.partition_count()
            )));
        }

        let rows = state.structure.partition_range(*partition);
        state
            .data
            .row_range(rows, columns)
            .map(Chunk::Table)
            .map_err(|e| AdapterError::permanent(e.to_string()))
    }
}

// === Sparse arrays ===

struct SparseState {
    data: SparseData,
    metadata: Metadata,
    specs: Vec<Spec>,
    version: ContentVersion,
    generation: u64,
}

fn sparse_digest(data: &SparseData) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for coord in &data.coords {
        for c in coord {
            hasher.update(&(*c as u64).to_le_bytes());
        }
    }
    hasher.update(&data.values);
    hasher.finalize()
}

/// COO sparse array held in memory. A read returns every stored value.
pub struct SparseAdapter {
    state: RwLock<SparseState>,
}

impl SparseAdapter {
    pub fn new(data: SparseData) -> Self {
        let version = version_token(sparse_digest(&data), 1);
        Self {
            state: RwLock::new(SparseState {
                data,
                metadata: Metadata::new(),
                specs: Vec::new(),
                version,
                generation: 1,
            }),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.state.get_mut().metadata = metadata;
        self
    }

    pub fn with_specs(mut self, specs: Vec<Spec>) -> Self {
        self.state.get_mut().specs = specs;
        self
    }

    pub async fn set_data(&self, data: SparseData) {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.version = version_token(sparse_digest(&data), state.generation);
        state.data = data;
    }
}

#[async_trait]
impl Adapter for SparseAdapter {
    fn kind(&self) -> StructureKind {
        StructureKind::Sparse
    }

    async fn structure(&self) -> AdapterResult<Structure> {
        let state = self.state.read().await;
        Ok(Structure::Sparse(SparseStructure::coo(
            state.data.shape.clone(),
            state.data.dtype,
        )))
    }

    async fn metadata(&self) -> AdapterResult<Metadata> {
        Ok(self.state.read().await.metadata.clone())
    }

    async fn specs(&self) -> AdapterResult<Vec<Spec>> {
        Ok(self.state.read().await.specs.clone())
    }

    async fn content_version(&self) -> AdapterResult<ContentVersion> {
        Ok(self.state.read().await.version.clone())
    }

    async fn read(&self, request: &ReadRequest) -> AdapterResult<Chunk> {
        match request {
            ReadRequest::Sparse => Ok(Chunk::Sparse(self.state.read().await.data.clone())),
            other => Err(unsupported(StructureKind::Sparse, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_common::{Column, ColumnValues, DType};

    fn ramp(shape: Vec<usize>) -> ArrayData {
        let n: usize = shape.iter().product();
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        ArrayData::from_f64(shape, &values).unwrap()
    }

    #[test]
    fn test_extract_block_2d() {
        let data = ramp(vec![4, 5]);
        let bytes = extract_block(&data, &[1..3, 2..4]);
        let block = ArrayData::new(DType::f64(), vec![2, 2], bytes).unwrap();
        let values: Vec<f64> = block.scalars().iter().map(|s| s.as_f64()).collect();
        assert_eq!(values, vec![7.0, 8.0, 12.0, 13.0]);
    }

    #[test]
    fn test_extract_block_3d() {
        let data = ramp(vec![2, 3, 4]);
        let bytes = extract_block(&data, &[1..2, 0..3, 3..4]);
        let block = ArrayData::new(DType::f64(), vec![1, 3, 1], bytes).unwrap();
        let values: Vec<f64> = block.scalars().iter().map(|s| s.as_f64()).collect();
        assert_eq!(values, vec![15.0, 19.0, 23.0]);
    }

    #[tokio::test]
    async fn test_array_block_read() {
        let adapter = ArrayAdapter::new(ramp(vec![10, 3]), Some(vec![4, 3])).unwrap();
        let chunk = adapter
            .read(&ReadRequest::ArrayBlock { block: vec![2, 0] })
            .await
            .unwrap();
        let Chunk::Array(block) = chunk else {
            panic!("expected array chunk");
        };
        assert_eq!(block.shape, vec![2, 3]);
        assert_eq!(block.element(0).as_f64(), 24.0);

        let err = adapter
            .read(&ReadRequest::ArrayBlock { block: vec![3, 0] })
            .await
            .unwrap_err();
        assert!(!err.transient);
    }

    #[tokio::test]
    async fn test_set_data_bumps_version() {
        let adapter = ArrayAdapter::new(ramp(vec![4]), None).unwrap();
        let before = adapter.content_version().await.unwrap();
        adapter.set_data(ramp(vec![4])).await.unwrap();
        let after = adapter.content_version().await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_table_partition_read() {
        let data = TableData::new(vec![
            Column::new("a", ColumnValues::Int64((0..6).collect())),
            Column::new("b", ColumnValues::Bool(vec![true; 6])),
        ])
        .unwrap();
        let adapter = TableAdapter::new(data, vec![0, 4]).unwrap();
        let chunk = adapter
            .read(&ReadRequest::TablePartition {
                partition: 1,
                columns: vec!["a".into()],
            })
            .await
            .unwrap();
        let Chunk::Table(table) = chunk else {
            panic!("expected table chunk");
        };
        assert_eq!(table.column_names(), vec!["a"]);
        assert_eq!(table.column("a").unwrap().values, ColumnValues::Int64(vec![4, 5]));

        let chunk = adapter
            .read(&ReadRequest::TablePartition {
                partition: 0,
                columns: Vec::new(),
            })
            .await
            .unwrap();
        let Chunk::Table(table) = chunk else {
            panic!("expected table chunk");
        };
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.row_count(), 4);

        let err = adapter
            .read(&ReadRequest::TablePartition {
                partition: 0,
                columns: vec!["nope".into()],
            })
            .await
            .unwrap_err();
        assert!(!err.transient);
    }

    #[tokio::test]
    async fn test_map_children_in_order() {
        let leaf: Arc<dyn Adapter> = Arc::new(ArrayAdapter::new(ramp(vec![2]), None).unwrap());
        let map = MapAdapter::new(vec![
            ("zeta".into(), Arc::clone(&leaf)),
            ("alpha".into(), Arc::new(MapAdapter::new(vec![]))),
        ]);
        let children = map.enumerate_children().await.unwrap();
        assert_eq!(children[0].name, "zeta");
        assert_eq!(children[0].kind, StructureKind::Array);
        assert_eq!(children[1].kind, StructureKind::Container);
        assert!(map.read(&ReadRequest::Sparse).await.is_err());

        let before = map.content_version().await.unwrap();
        map.insert("beta", leaf).await;
        assert_ne!(before, map.content_version().await.unwrap());
        assert_eq!(map.enumerate_children().await.unwrap().len(), 3);
    }
}
