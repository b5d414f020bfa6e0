//! Path resolution over trees built from declarative entries.

use serde_json::json;
use std::sync::Arc;

use adapters::{resolve, resolve_adapter, Adapter, AdapterRegistry, ReadRequest, TreeEntry};
use tree_common::{DataError, NodePath, Structure, StructureKind};

fn tree() -> Arc<dyn Adapter> {
    let entry: TreeEntry = serde_json::from_value(json!({
        "family": "container",
        "metadata": {"facility": "demo"},
        "children": [
            {
                "name": "samples",
                "family": "container",
                "children": [
                    {
                        "name": "run42",
                        "family": "array",
                        "metadata": {"sample": "quartz"},
                        "specs": [{"name": "xdi", "version": "1.0"}],
                        "args": {"dtype": "<f8", "shape": [1000, 50], "chunks": [100, 50], "generator": "ramp"}
                    }
                ]
            },
            {
                "name": "weather",
                "family": "table",
                "args": {
                    "columns": [
                        {"name": "temperature", "dtype": "float64", "values": [1.0, 2.0, 3.0]},
                        {"name": "pressure", "dtype": "float64", "values": [10.0, 20.0, 30.0]}
                    ],
                    "partitions": [0, 2]
                }
            },
            {
                "name": "hits",
                "family": "sparse",
                "args": {"dtype": "<i8", "shape": [3, 3], "coords": [[0, 0], [2, 1]], "values": [5, 7]}
            }
        ]
    }))
    .unwrap();
    AdapterRegistry::with_builtins().build_root(&entry).unwrap()
}

#[tokio::test]
async fn test_resolve_nested_array() {
    let root = tree();
    let node = resolve(&root, &NodePath::parse("samples/run42")).await.unwrap();

    assert_eq!(node.kind, StructureKind::Array);
    assert_eq!(node.metadata.get("sample").and_then(|v| v.as_str()), Some("quartz"));
    assert_eq!(node.specs[0].name, "xdi");
    let Structure::Array(array) = &node.structure else {
        panic!("expected array structure");
    };
    assert_eq!(array.shape, vec![1000, 50]);
    assert_eq!(array.chunks, vec![100, 50]);
}

#[tokio::test]
async fn test_resolve_root() {
    let root = tree();
    let node = resolve(&root, &NodePath::root()).await.unwrap();
    assert_eq!(node.kind, StructureKind::Container);
    assert_eq!(node.structure, Structure::Container { count: 3 });
}

#[tokio::test]
async fn test_missing_segment_is_not_found() {
    let root = tree();
    let err = resolve(&root, &NodePath::parse("samples/run43")).await.unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)));
}

#[tokio::test]
async fn test_descending_through_leaf_is_not_found() {
    let root = tree();
    let err = resolve_adapter(&root, &NodePath::parse("samples/run42/x"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DataError::NotFound(_)));
}

#[tokio::test]
async fn test_read_through_resolved_adapter() {
    let root = tree();
    let run = resolve_adapter(&root, &NodePath::parse("samples/run42")).await.unwrap();
    let chunk = run
        .read(&ReadRequest::ArrayBlock { block: vec![2, 0] })
        .await
        .unwrap();
    assert_eq!(chunk.shape(), vec![100, 50]);

    let hits = resolve(&root, &NodePath::parse("hits")).await.unwrap();
    assert_eq!(hits.kind, StructureKind::Sparse);
}

#[tokio::test]
async fn test_children_enumerated_in_declaration_order() {
    let root = tree();
    let names: Vec<String> = root
        .enumerate_children()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["samples", "weather", "hits"]);
}
