//! End-to-end slicing against in-memory and instrumented adapters.

use std::sync::Arc;
use std::time::Duration;

use adapters::{Adapter, ArrayAdapter, Node, ReadRequest, SparseAdapter, TableAdapter};
use slicer::{BackendPool, PoolConfig, SliceEngine, SliceSpec};
use test_utils::{
    assert_array_values, big_endian_ramp, coded_array, diagonal_sparse, pressure_at, ramp_array,
    weather_table, CountingAdapter, FlakyAdapter, WEATHER_PARTITIONS,
};
use tree_common::{ColumnValues, DataError, NodePath, Payload, Scalar};

fn engine() -> SliceEngine {
    SliceEngine::new(BackendPool::default(), 8)
}

fn engine_with(config: PoolConfig) -> SliceEngine {
    SliceEngine::new(BackendPool::new(config), 8)
}

fn run42() -> Arc<dyn Adapter> {
    Arc::new(ArrayAdapter::new(ramp_array(vec![1000, 50]), Some(vec![100, 50])).unwrap())
}

fn run43() -> Arc<dyn Adapter> {
    Arc::new(ArrayAdapter::new(coded_array(20, 10), Some(vec![5, 5])).unwrap())
}

fn weather() -> Arc<dyn Adapter> {
    Arc::new(TableAdapter::new(weather_table(10), WEATHER_PARTITIONS.to_vec()).unwrap())
}

async fn load_node(path: &str, adapter: Arc<dyn Adapter>) -> Node {
    Node::load(NodePath::parse(path), adapter).await.unwrap()
}

fn array(payload: Payload) -> tree_common::ArrayData {
    match payload {
        Payload::Array(a) => a,
        other => panic!("expected array payload, got {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_single_chunk_slice() {
    let counting = Arc::new(CountingAdapter::new(run42()));
    let node = load_node("samples/run42", counting.clone()).await;

    let result = engine()
        .read_slice(&node, &SliceSpec::parse("200:300, :").unwrap())
        .await
        .unwrap();
    let data = array(result);

    assert_eq!(data.shape, vec![100, 50]);
    assert_eq!(counting.reads(), 1);
    assert_eq!(data.element(0), Scalar::Float(10000.0));
    assert_eq!(data.element(100 * 50 - 1), Scalar::Float(299.0 * 50.0 + 49.0));
}

#[tokio::test]
async fn test_strided_list_slice_across_blocks() {
    let counting = Arc::new(CountingAdapter::new(run43()));
    let node = load_node("samples/run43", counting.clone()).await;

    let data = array(
        engine()
            .read_slice(&node, &SliceSpec::parse("3:17:4, [9,0,4]").unwrap())
            .await
            .unwrap(),
    );

    assert_eq!(data.shape, vec![4, 3]);
    let mut expected = Vec::new();
    for row in [3, 7, 11, 15] {
        for col in [9, 0, 4] {
            expected.push((row * 1000 + col) as f64);
        }
    }
    assert_array_values!(data, expected);
    // Rows touch blocks 0..=3, columns touch blocks 0 and 1.
    assert_eq!(counting.reads(), 8);
}

#[tokio::test]
async fn test_index_drops_dimension() {
    let node = load_node("samples/run43", run43()).await;
    let data = array(
        engine()
            .read_slice(&node, &SliceSpec::parse("7, 2:5").unwrap())
            .await
            .unwrap(),
    );
    assert_eq!(data.shape, vec![3]);
    assert_array_values!(data, vec![7002.0, 7003.0, 7004.0]);

    let scalar = array(
        engine()
            .read_slice(&node, &SliceSpec::parse("-1, -1").unwrap())
            .await
            .unwrap(),
    );
    assert!(scalar.shape.is_empty());
    assert_array_values!(scalar, vec![19009.0]);
}

#[tokio::test]
async fn test_out_of_bounds_reads_nothing() {
    let counting = Arc::new(CountingAdapter::new(run42()));
    let node = load_node("samples/run42", counting.clone()).await;

    for expr in ["990:1001", "1000", ":, 50", "[0, 1000]"] {
        let err = engine()
            .read_slice(&node, &SliceSpec::parse(expr).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Validation(_)), "{}", expr);
    }
    assert_eq!(counting.reads(), 0);
}

#[tokio::test]
async fn test_empty_selection() {
    let counting = Arc::new(CountingAdapter::new(run43()));
    let node = load_node("samples/run43", counting.clone()).await;
    let data = array(
        engine()
            .read_slice(&node, &SliceSpec::parse("4:4").unwrap())
            .await
            .unwrap(),
    );
    assert_eq!(data.shape, vec![0, 10]);
    assert!(data.bytes.is_empty());
    assert_eq!(counting.reads(), 0);
}

#[tokio::test]
async fn test_byte_order_preserved() {
    let adapter: Arc<dyn Adapter> =
        Arc::new(ArrayAdapter::new(big_endian_ramp(vec![12]), Some(vec![5])).unwrap());
    let node = load_node("be", adapter).await;
    let data = array(
        engine()
            .read_slice(&node, &SliceSpec::parse("4:7").unwrap())
            .await
            .unwrap(),
    );
    assert_eq!(data.dtype.to_string(), ">i4");
    assert_eq!(&data.bytes[..], &[0, 0, 0, 4, 0, 0, 0, 5, 0, 0, 0, 6]);
}

#[tokio::test]
async fn test_table_rows_and_column_subset() {
    let counting = Arc::new(CountingAdapter::new(weather()));
    let node = load_node("weather", counting.clone()).await;

    let spec = SliceSpec::parse("3:6")
        .unwrap()
        .with_columns(vec!["pressure".to_string()]);
    let Payload::Table(table) = engine().read_slice(&node, &spec).await.unwrap() else {
        panic!("expected table payload");
    };

    assert_eq!(table.row_count(), 3);
    assert_eq!(table.column_names(), vec!["pressure"]);
    assert_eq!(
        table.column("pressure").unwrap().values,
        ColumnValues::Float64((3..6).map(pressure_at).collect())
    );
    // Rows 3..6 straddle the partitions starting at 0 and 4.
    assert_eq!(counting.reads(), 2);
}

#[tokio::test]
async fn test_table_row_list_keeps_order() {
    let node = load_node("weather", weather()).await;
    let Payload::Table(table) = engine()
        .read_slice(&node, &SliceSpec::parse("[9, 0, 9]").unwrap())
        .await
        .unwrap()
    else {
        panic!("expected table payload");
    };
    assert_eq!(
        table.column("pressure").unwrap().values,
        ColumnValues::Float64(vec![1009.0, 1000.0, 1009.0])
    );
    assert_eq!(table.columns.len(), 2);
}

#[tokio::test]
async fn test_sparse_slice_remaps_coordinates() {
    let adapter: Arc<dyn Adapter> = Arc::new(SparseAdapter::new(diagonal_sparse(5)));
    let node = load_node("hits", adapter).await;

    let Payload::Sparse(sparse) = engine()
        .read_slice(&node, &SliceSpec::parse("1:4, :").unwrap())
        .await
        .unwrap()
    else {
        panic!("expected sparse payload");
    };
    assert_eq!(sparse.shape, vec![3, 5]);
    assert_eq!(sparse.coords, vec![vec![0, 1], vec![1, 2], vec![2, 3]]);
    let values: Vec<f64> = (0..sparse.nnz()).map(|i| sparse.value(i).as_f64()).collect();
    assert_eq!(values, vec![2.0, 3.0, 4.0]);

    let Payload::Sparse(row) = engine()
        .read_slice(&node, &SliceSpec::parse("2").unwrap())
        .await
        .unwrap()
    else {
        panic!("expected sparse payload");
    };
    assert_eq!(row.shape, vec![5]);
    assert_eq!(row.coords, vec![vec![2]]);
}

#[tokio::test]
async fn test_failed_block_fails_whole_request() {
    let flaky = Arc::new(FlakyAdapter::failing_on(
        run43(),
        ReadRequest::ArrayBlock { block: vec![1, 0] },
    ));
    let node = load_node("samples/run43", flaky).await;

    let err = engine()
        .read_slice(&node, &SliceSpec::all())
        .await
        .unwrap_err();
    let DataError::Backend(backend) = err else {
        panic!("expected backend error, got {:?}", err);
    };
    assert_eq!(backend.path, NodePath::parse("samples/run43"));
    assert!(!backend.transient);

    // Blocks that avoid the failing one still succeed.
    assert!(engine()
        .read_slice(&node, &SliceSpec::parse("0:5").unwrap())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let config = PoolConfig {
        max_retries: 2,
        retry_delay: Duration::from_millis(1),
        ..PoolConfig::default()
    };

    let flaky = Arc::new(FlakyAdapter::new(run42(), 2, true));
    let node = load_node("samples/run42", flaky.clone()).await;
    let result = engine_with(config.clone())
        .read_slice(&node, &SliceSpec::parse("0:10").unwrap())
        .await;
    assert!(result.is_ok());
    assert_eq!(flaky.attempts(), 3);

    let flaky = Arc::new(FlakyAdapter::new(run42(), 3, true));
    let node = load_node("samples/run42", flaky.clone()).await;
    let err = engine_with(config)
        .read_slice(&node, &SliceSpec::parse("0:10").unwrap())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(flaky.attempts(), 3);
}

#[tokio::test]
async fn test_permanent_failures_are_not_retried() {
    let flaky = Arc::new(FlakyAdapter::new(run42(), 1, false));
    let node = load_node("samples/run42", flaky.clone()).await;
    let err = engine()
        .read_slice(&node, &SliceSpec::parse("0:10").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Backend(_)));
    assert_eq!(flaky.attempts(), 1);
}

#[tokio::test]
async fn test_slow_read_times_out() {
    let slow = Arc::new(CountingAdapter::new(run42()).with_delay(Duration::from_millis(500)));
    let node = load_node("samples/run42", slow).await;
    let engine = engine_with(PoolConfig {
        read_timeout: Duration::from_millis(20),
        max_retries: 0,
        ..PoolConfig::default()
    });

    let err = engine
        .read_slice(&node, &SliceSpec::parse("0:10").unwrap())
        .await
        .unwrap_err();
    let DataError::Backend(backend) = err else {
        panic!("expected backend error");
    };
    assert!(backend.transient);
    assert!(backend.message.contains("timed out"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_concurrent_reads() {
    let counting = Arc::new(CountingAdapter::new(run43()).with_delay(Duration::from_millis(10)));
    let node = load_node("samples/run43", counting.clone()).await;
    let engine = engine_with(PoolConfig {
        max_concurrent_reads: 2,
        ..PoolConfig::default()
    });

    let data = array(engine.read_slice(&node, &SliceSpec::all()).await.unwrap());
    assert_eq!(data.shape, vec![20, 10]);
    assert_eq!(counting.reads(), 8);
    assert!(counting.peak_in_flight() <= 2);
    assert_eq!(engine.pool().available(), 2);
}
