//! Generators for synthetic, verifiable test data.
//!
//! Values follow simple patterns so a test can recompute the expected value
//! of any element from its index.

use tree_common::{ArrayData, Column, ColumnValues, DType, SparseData, TableData};

/// Row-major grid where each cell holds `row * 1000 + col`.
///
/// # Example
///
/// ```
/// use test_utils::coded_grid;
///
/// let grid = coded_grid(5, 10);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1.0);      // row 0, col 1
/// assert_eq!(grid[10], 1000.0);  // row 1, col 0
/// ```
pub fn coded_grid(rows: usize, cols: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            data.push((row * 1000 + col) as f64);
        }
    }
    data
}

/// Array whose element `i` (C order) equals `i`.
pub fn ramp_array(shape: Vec<usize>) -> ArrayData {
    let n: usize = shape.iter().product();
    let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
    ArrayData::from_f64(shape, &values).expect("ramp shape and values agree")
}

/// 2-D array built from [`coded_grid`].
pub fn coded_array(rows: usize, cols: usize) -> ArrayData {
    ArrayData::from_f64(vec![rows, cols], &coded_grid(rows, cols))
        .expect("grid shape and values agree")
}

/// Same ramp, stored big-endian 32-bit integers.
pub fn big_endian_ramp(shape: Vec<usize>) -> ArrayData {
    let n: usize = shape.iter().product();
    let mut bytes = Vec::with_capacity(n * 4);
    for i in 0..n {
        bytes.extend_from_slice(&(i as i32).to_be_bytes());
    }
    let dtype: DType = ">i4".parse().expect("valid dtype literal");
    ArrayData::new(dtype, shape, bytes).expect("ramp shape and buffer agree")
}

/// Temperature in K for row `i` of [`weather_table`].
pub fn temperature_at(i: usize) -> f64 {
    280.0 + i as f64 * 0.5
}

/// Pressure in hPa for row `i` of [`weather_table`].
pub fn pressure_at(i: usize) -> f64 {
    1000.0 + i as f64
}

/// Table with `temperature` and `pressure` columns.
pub fn weather_table(rows: usize) -> TableData {
    TableData::new(vec![
        Column::new(
            "temperature",
            ColumnValues::Float64((0..rows).map(temperature_at).collect()),
        ),
        Column::new(
            "pressure",
            ColumnValues::Float64((0..rows).map(pressure_at).collect()),
        ),
    ])
    .expect("columns have equal length")
}

/// Table with one column of each supported type.
pub fn mixed_table(rows: usize) -> TableData {
    TableData::new(vec![
        Column::new("id", ColumnValues::Int64((0..rows as i64).collect())),
        Column::new(
            "label",
            ColumnValues::Utf8((0..rows).map(|i| format!("item-{}", i)).collect()),
        ),
        Column::new("flag", ColumnValues::Bool((0..rows).map(|i| i % 2 == 0).collect())),
        Column::new(
            "score",
            ColumnValues::Float64((0..rows).map(|i| i as f64 / 4.0).collect()),
        ),
    ])
    .expect("columns have equal length")
}

/// Diagonal sparse matrix of size `n x n` with value `i + 1` at `(i, i)`.
pub fn diagonal_sparse(n: usize) -> SparseData {
    let coords = (0..n).map(|i| vec![i, i]).collect();
    let mut values = Vec::with_capacity(n * 8);
    for i in 0..n {
        values.extend_from_slice(&((i + 1) as i64).to_le_bytes());
    }
    SparseData::new(vec![n, n], DType::i64(), coords, values).expect("diagonal fits its shape")
}
