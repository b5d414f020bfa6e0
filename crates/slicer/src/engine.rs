//! Slice engine: plan backend reads for a resolved slice and assemble the result.
//!
//! ```text
//! read_slice(node, "200:300, :")
//!      │
//!      ├─► resolve against structure (bounds, negatives, steps)
//!      │
//!      ├─► group selected positions by block, per dimension
//!      │
//!      ├─► one ReadRequest per intersecting block (cartesian product)
//!      │         │
//!      │         └─► BackendPool: semaphore + timeout + retry
//!      │
//!      └─► scatter each block into the output, in block order
//! ```
//!
//! Any failed block aborts the whole request. Outstanding reads are dropped.

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use adapters::{Chunk, Node, ReadRequest};
use tree_common::{
    c_strides, ArrayData, ArrayStructure, BackendError, Column, ColumnValues, DataError,
    DataResult, Payload, SparseData, SparseStructure, Structure, TableData, TableStructure,
};

use crate::pool::BackendPool;
use crate::selector::{Resolved, ResolvedSlice, SliceSpec};

/// (output position, position inside the block) pairs for one block.
type Group = (usize, Vec<(usize, usize)>);

/// Call `f` with every index tuple of a grid with the given extents, in C order.
fn for_each_index(lens: &[usize], mut f: impl FnMut(&[usize])) {
    if lens.iter().any(|&l| l == 0) {
        return;
    }
    let mut idx = vec![0; lens.len()];
    loop {
        f(&idx);
        let mut d = lens.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < lens[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}

fn group_by_block(positions: &[usize], chunk: usize) -> Vec<Group> {
    let mut groups: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
    for (out, &pos) in positions.iter().enumerate() {
        groups.entry(pos / chunk).or_default().push((out, pos % chunk));
    }
    groups.into_iter().collect()
}

/// Output positions along one dimension that select absolute index `abs`.
fn output_positions(dim: &Resolved, abs: usize) -> Vec<usize> {
    match dim {
        Resolved::Index(i) => {
            if *i == abs {
                vec![0]
            } else {
                Vec::new()
            }
        }
        Resolved::Range { start, stop, step } => {
            if abs >= *start && abs < *stop && (abs - start) % step == 0 {
                vec![(abs - start) / step]
            } else {
                Vec::new()
            }
        }
        Resolved::List(items) => items
            .iter()
            .enumerate()
            .filter(|(_, i)| **i == abs)
            .map(|(k, _)| k)
            .collect(),
    }
}

/// Block coordinates a slice touches, in the order they are read.
pub fn plan_blocks(structure: &ArrayStructure, slice: &ResolvedSlice) -> Vec<Vec<usize>> {
    let groups: Vec<Vec<Group>> = slice
        .dims
        .iter()
        .enumerate()
        .map(|(d, r)| group_by_block(&r.positions(), structure.chunks[d]))
        .collect();
    let lens: Vec<usize> = groups.iter().map(Vec::len).collect();
    let mut blocks = Vec::new();
    for_each_index(&lens, |combo| {
        blocks.push(combo.iter().enumerate().map(|(d, &g)| groups[d][g].0).collect());
    });
    blocks
}

#[derive(Clone)]
pub struct SliceEngine {
    pool: BackendPool,
    max_parallel_chunks: usize,
}

impl SliceEngine {
    pub fn new(pool: BackendPool, max_parallel_chunks: usize) -> Self {
        Self {
            pool,
            max_parallel_chunks: max_parallel_chunks.max(1),
        }
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    /// Resolve `spec` against the node's structure and read it.
    #[instrument(skip(self, node, spec), fields(path = %node.path))]
    pub async fn read_slice(&self, node: &Node, spec: &SliceSpec) -> DataResult<Payload> {
        let resolved = spec.resolve(&node.structure)?;
        self.read_resolved(node, &resolved).await
    }

    /// Read an already resolved slice. The result's shape always equals
    /// `slice.output_shape()`.
    pub async fn read_resolved(&self, node: &Node, slice: &ResolvedSlice) -> DataResult<Payload> {
        match &node.structure {
            Structure::Array(a) => self.read_array(node, a, slice).await.map(Payload::Array),
            Structure::Table(t) => self.read_table(node, t, slice).await.map(Payload::Table),
            Structure::Sparse(s) => self.read_sparse(node, s, slice).await.map(Payload::Sparse),
            Structure::Container { .. } => Err(DataError::Validation(
                "containers have no data to slice".to_string(),
            )),
        }
    }

    fn mismatch(node: &Node, message: String) -> DataError {
        DataError::Backend(BackendError::permanent(node.path.clone(), message))
    }

    async fn read_array(
        &self,
        node: &Node,
        structure: &ArrayStructure,
        slice: &ResolvedSlice,
    ) -> DataResult<ArrayData> {
        let item = structure.dtype.itemsize();
        let groups: Vec<Vec<Group>> = slice
            .dims
            .iter()
            .enumerate()
            .map(|(d, r)| group_by_block(&r.positions(), structure.chunks[d]))
            .collect();

        // Index-selected dimensions keep extent 1 here; dropping them later
        // does not change the flat layout.
        let full_shape: Vec<usize> = slice.dims.iter().map(Resolved::len).collect();
        let out_strides = c_strides(&full_shape);
        let total: usize = full_shape.iter().product();
        let mut out = vec![0u8; total * item];

        let mut combos: Vec<Vec<usize>> = Vec::new();
        let lens: Vec<usize> = groups.iter().map(Vec::len).collect();
        for_each_index(&lens, |combo| combos.push(combo.to_vec()));

        debug!(path = %node.path, chunks = combos.len(), "Reading array blocks");
        metrics::counter!("chunk_reads_total").increment(combos.len() as u64);

        let pool = &self.pool;
        let reads = combos.into_iter().map(|combo| {
            let block: Vec<usize> = combo
                .iter()
                .enumerate()
                .map(|(d, &g)| groups[d][g].0)
                .collect();
            async move {
                let request = ReadRequest::ArrayBlock {
                    block: block.clone(),
                };
                let result = pool.read(&node.path, &node.adapter, &request).await;
                (combo, block, result)
            }
        });
        let mut results = stream::iter(reads).buffered(self.max_parallel_chunks);

        while let Some((combo, block, result)) = results.next().await {
            let Chunk::Array(data) = result? else {
                return Err(Self::mismatch(node, format!("block {:?} is not array data", block)));
            };
            let expected = structure.block_shape(&block);
            if data.shape != expected || data.dtype != structure.dtype {
                return Err(Self::mismatch(
                    node,
                    format!(
                        "block {:?} returned {:?} {}, expected {:?} {}",
                        block, data.shape, data.dtype, expected, structure.dtype
                    ),
                ));
            }

            let in_strides = c_strides(&data.shape);
            let entries: Vec<&Vec<(usize, usize)>> = combo
                .iter()
                .enumerate()
                .map(|(d, &g)| &groups[d][g].1)
                .collect();
            let entry_lens: Vec<usize> = entries.iter().map(|e| e.len()).collect();
            for_each_index(&entry_lens, |sel| {
                let mut o = 0;
                let mut i = 0;
                for d in 0..sel.len() {
                    let (out_pos, local) = entries[d][sel[d]];
                    o += out_pos * out_strides[d];
                    i += local * in_strides[d];
                }
                out[o * item..(o + 1) * item].copy_from_slice(&data.bytes[i * item..(i + 1) * item]);
            });
        }

        ArrayData::new(structure.dtype, slice.output_shape(), out)
    }

    async fn read_table(
        &self,
        node: &Node,
        structure: &TableStructure,
        slice: &ResolvedSlice,
    ) -> DataResult<TableData> {
        let rows = slice.dims[0].positions();
        let columns = slice.columns.clone();

        let mut by_partition: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
        for (out, &row) in rows.iter().enumerate() {
            let partition = structure.partition_of(row);
            let local = row - structure.partition_range(partition).start;
            by_partition.entry(partition).or_default().push((out, local));
        }

        if by_partition.is_empty() {
            let empty = columns
                .iter()
                .map(|name| -> DataResult<Column> {
                    let dtype = structure
                        .column(name)
                        .map(|c| c.dtype)
                        .ok_or_else(|| DataError::Validation(format!("unknown column '{}'", name)))?;
                    Ok(Column::new(name.clone(), ColumnValues::empty(dtype)))
                })
                .collect::<DataResult<Vec<_>>>()?;
            return Ok(TableData { columns: empty });
        }

        debug!(path = %node.path, partitions = by_partition.len(), "Reading table partitions");
        metrics::counter!("chunk_reads_total").increment(by_partition.len() as u64);

        let pool = &self.pool;
        let reads = by_partition.into_iter().map(|(partition, entries)| {
            let request = ReadRequest::TablePartition {
                partition,
                columns: columns.clone(),
            };
            async move {
                let result = pool.read(&node.path, &node.adapter, &request).await;
                (partition, entries, result)
            }
        });
        let mut results = stream::iter(reads).buffered(self.max_parallel_chunks);

        let mut combined = TableData::default();
        let mut index = vec![0usize; rows.len()];
        while let Some((partition, entries, result)) = results.next().await {
            let Chunk::Table(data) = result? else {
                return Err(Self::mismatch(
                    node,
                    format!("partition {} is not table data", partition),
                ));
            };
            let expected = structure.partition_range(partition).len();
            if data.row_count() != expected || data.column_names() != columns {
                return Err(Self::mismatch(
                    node,
                    format!(
                        "partition {} returned {} rows of {:?}, expected {} rows of {:?}",
                        partition,
                        data.row_count(),
                        data.column_names(),
                        expected,
                        columns
                    ),
                ));
            }
            let offset = combined.row_count();
            for (out, local) in entries {
                index[out] = offset + local;
            }
            combined.append(data)?;
        }

        Ok(combined.take_rows(&index))
    }

    async fn read_sparse(
        &self,
        node: &Node,
        structure: &SparseStructure,
        slice: &ResolvedSlice,
    ) -> DataResult<SparseData> {
        metrics::counter!("chunk_reads_total").increment(1);
        let chunk = self
            .pool
            .read(&node.path, &node.adapter, &ReadRequest::Sparse)
            .await?;
        let Chunk::Sparse(data) = chunk else {
            return Err(Self::mismatch(node, "read did not return sparse data".into()));
        };
        if data.shape != structure.shape || data.dtype != structure.dtype {
            return Err(Self::mismatch(
                node,
                format!(
                    "sparse read returned {:?} {}, expected {:?} {}",
                    data.shape, data.dtype, structure.shape, structure.dtype
                ),
            ));
        }

        let mut selected: Vec<(Vec<usize>, usize)> = Vec::new();
        for (k, coord) in data.coords.iter().enumerate() {
            let per_dim: Vec<Vec<usize>> = slice
                .dims
                .iter()
                .zip(coord)
                .map(|(dim, &abs)| output_positions(dim, abs))
                .collect();
            let lens: Vec<usize> = per_dim.iter().map(Vec::len).collect();
            for_each_index(&lens, |sel| {
                let out: Vec<usize> = slice
                    .dims
                    .iter()
                    .enumerate()
                    .filter(|(_, dim)| dim.keeps_dim())
                    .map(|(d, _)| per_dim[d][sel[d]])
                    .collect();
                selected.push((out, k));
            });
        }
        selected.sort();

        let mut values = Vec::with_capacity(selected.len() * data.dtype.itemsize());
        let mut coords = Vec::with_capacity(selected.len());
        for (coord, k) in selected {
            values.extend_from_slice(data.value_bytes(k));
            coords.push(coord);
        }
        SparseData::new(slice.output_shape(), data.dtype, coords, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_common::DType;

    #[test]
    fn test_for_each_index_order() {
        let mut seen = Vec::new();
        for_each_index(&[2, 3], |i| seen.push(i.to_vec()));
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], vec![0, 0]);
        assert_eq!(seen[1], vec![0, 1]);
        assert_eq!(seen[5], vec![1, 2]);

        let mut count = 0;
        for_each_index(&[], |_| count += 1);
        assert_eq!(count, 1);
        for_each_index(&[3, 0], |_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_group_by_block() {
        let groups = group_by_block(&[9, 1, 5, 2], 4);
        assert_eq!(
            groups,
            vec![(0, vec![(1, 1), (3, 2)]), (1, vec![(2, 1)]), (2, vec![(0, 1)])]
        );
    }

    #[test]
    fn test_plan_single_block() {
        let structure = ArrayStructure::new(vec![1000, 50], vec![100, 50], DType::f64()).unwrap();
        let slice = SliceSpec::parse("200:300, :")
            .unwrap()
            .resolve(&Structure::Array(structure.clone()))
            .unwrap();
        assert_eq!(plan_blocks(&structure, &slice), vec![vec![2, 0]]);
    }

    #[test]
    fn test_plan_straddling_blocks() {
        let structure = ArrayStructure::new(vec![10, 10], vec![4, 4], DType::f64()).unwrap();
        let slice = SliceSpec::parse("3:5, 7")
            .unwrap()
            .resolve(&Structure::Array(structure.clone()))
            .unwrap();
        assert_eq!(plan_blocks(&structure, &slice), vec![vec![0, 1], vec![1, 1]]);
    }

    #[test]
    fn test_output_positions() {
        let range = Resolved::Range { start: 2, stop: 9, step: 3 };
        assert_eq!(output_positions(&range, 5), vec![1]);
        assert!(output_positions(&range, 6).is_empty());
        let list = Resolved::List(vec![4, 1, 4]);
        assert_eq!(output_positions(&list, 4), vec![0, 2]);
    }
}
