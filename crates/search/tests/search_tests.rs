//! Search over the reference tree.

use std::sync::Arc;

use futures::StreamExt;
use search::{search, walk, Query, SearchRequest, SearchView, MAX_LIMIT};
use serde_json::json;
use test_utils::{paths, sample_tree};
use tree_common::{NodePath, StructureKind};

fn names(page: &search::SearchPage) -> Vec<String> {
    page.data.iter().map(|s| s.path.to_string()).collect()
}

fn query(value: serde_json::Value) -> Query {
    Query::from_json(&value.to_string()).unwrap()
}

#[tokio::test]
async fn test_breadth_first_enumeration_order() {
    let tree = sample_tree();
    let page = search(
        &tree.root,
        SearchRequest::new(NodePath::root(), Query::all()),
        SearchView::unrestricted(),
    )
    .await
    .unwrap();

    assert_eq!(
        names(&page),
        vec![
            "/samples",
            "/weather",
            "/hits",
            "/restricted",
            "/samples/run42",
            "/samples/run43",
            "/restricted/notes",
        ]
    );
    assert_eq!(page.offset, 0);
    assert_eq!(page.limit, 100);
}

#[tokio::test]
async fn test_metadata_predicates() {
    let tree = sample_tree();
    let run = |q: Query| {
        let root = tree.root.clone();
        async move {
            let page = search(&root, SearchRequest::new(NodePath::root(), q), SearchView::unrestricted())
                .await
                .unwrap();
            names(&page)
        }
    };

    assert_eq!(run(Query::eq("operator", "alice")).await, vec!["/samples/run42"]);
    assert_eq!(run(Query::full_text("NORTH")).await, vec!["/weather"]);
    assert_eq!(
        run(query(json!({"type": "comparison", "key": "sample.temperature", "op": "lt", "value": 100}))).await,
        vec!["/samples/run43"]
    );
    assert_eq!(
        run(query(json!({"type": "structure_family", "family": "array"}))).await,
        vec!["/samples/run42", "/samples/run43", "/restricted/notes"]
    );
    assert_eq!(
        run(query(json!({"type": "specs", "include": ["timeseries"]}))).await,
        vec!["/weather"]
    );
}

#[tokio::test]
async fn test_pagination_window() {
    let tree = sample_tree();
    let request = SearchRequest::new(NodePath::root(), Query::all()).page(2, 3);
    let page = search(&tree.root, request, SearchView::unrestricted()).await.unwrap();
    assert_eq!(names(&page), vec!["/hits", "/restricted", "/samples/run42"]);

    let capped = SearchRequest::new(NodePath::root(), Query::all()).page(0, 50_000);
    assert_eq!(capped.limit, MAX_LIMIT);

    let past_end = SearchRequest::new(NodePath::root(), Query::all()).page(50, 10);
    let page = search(&tree.root, past_end, SearchView::unrestricted()).await.unwrap();
    assert!(page.data.is_empty());
}

#[tokio::test]
async fn test_path_scoped_pruning() {
    let tree = sample_tree();
    let carol = Query::eq("operator", "carol");

    let unscoped = search(
        &tree.root,
        SearchRequest::new(NodePath::root(), carol.clone()),
        SearchView::unrestricted(),
    )
    .await
    .unwrap();
    assert_eq!(names(&unscoped), vec!["/restricted/notes"]);

    // "restricted" itself fails the query, so its subtree is never visited.
    let scoped = search(
        &tree.root,
        SearchRequest::new(NodePath::root(), carol).path_scoped(true),
        SearchView::unrestricted(),
    )
    .await
    .unwrap();
    assert!(scoped.data.is_empty());

    let samples_or_alice = query(json!({"type": "or", "queries": [
        {"type": "eq", "key": "group", "value": "samples"},
        {"type": "eq", "key": "operator", "value": "alice"}
    ]}));
    let scoped = search(
        &tree.root,
        SearchRequest::new(NodePath::root(), samples_or_alice).path_scoped(true),
        SearchView::unrestricted(),
    )
    .await
    .unwrap();
    assert_eq!(names(&scoped), vec!["/samples", "/samples/run42"]);
}

#[tokio::test]
async fn test_subtree_search_excludes_root() {
    let tree = sample_tree();
    let page = search(
        &tree.root,
        SearchRequest::new(NodePath::parse(paths::SAMPLES), Query::all()),
        SearchView::unrestricted(),
    )
    .await
    .unwrap();
    assert_eq!(names(&page), vec!["/samples/run42", "/samples/run43"]);
    assert!(page.data.iter().all(|s| s.kind == StructureKind::Array));

    let leaf = search(
        &tree.root,
        SearchRequest::new(NodePath::parse(paths::WEATHER), Query::all()),
        SearchView::unrestricted(),
    )
    .await
    .unwrap();
    assert!(leaf.data.is_empty());
}

#[tokio::test]
async fn test_hidden_subtrees_are_skipped() {
    let tree = sample_tree();
    let restricted = NodePath::parse(paths::RESTRICTED);
    let visible: search::Visibility = Arc::new(move |p: &NodePath| !p.starts_with(&restricted));

    let view = SearchView::unrestricted().with_visibility(visible);
    let page = search(&tree.root, SearchRequest::new(NodePath::root(), Query::all()), view)
        .await
        .unwrap();
    assert_eq!(page.data.len(), 5);
    assert!(names(&page).iter().all(|n| !n.starts_with("/restricted")));
}

#[tokio::test]
async fn test_queries_see_redacted_metadata() {
    let tree = sample_tree();
    let redact: search::Redactor = Arc::new(|summary: &mut search::NodeSummary| {
        summary.metadata.remove_path("operator");
    });
    let view = SearchView::new(Arc::new(|_: &NodePath| true), redact);

    let page = search(
        &tree.root,
        SearchRequest::new(NodePath::root(), Query::eq("operator", "alice")),
        view.clone(),
    )
    .await
    .unwrap();
    assert!(page.data.is_empty());

    let page = search(
        &tree.root,
        SearchRequest::new(NodePath::parse(paths::SAMPLES), Query::all()),
        view,
    )
    .await
    .unwrap();
    assert_eq!(page.data.len(), 2);
    assert!(page.data.iter().all(|s| s.metadata.get_path("operator").is_none()));
}

#[tokio::test]
async fn test_errors_before_walking() {
    let tree = sample_tree();
    let missing = search(
        &tree.root,
        SearchRequest::new(NodePath::parse("nope"), Query::all()),
        SearchView::unrestricted(),
    )
    .await
    .unwrap_err();
    assert_eq!(missing.status_code(), 404);

    let bad = Query::Eq {
        key: "a..b".into(),
        value: 1i64.into(),
    };
    let invalid = search(
        &tree.root,
        SearchRequest::new(NodePath::root(), bad),
        SearchView::unrestricted(),
    )
    .await
    .unwrap_err();
    assert_eq!(invalid.status_code(), 400);
}

#[tokio::test]
async fn test_walk_is_lazy() {
    let tree = sample_tree();
    let mut stream = Box::pin(walk(
        tree.root.clone(),
        NodePath::root(),
        Query::all(),
        false,
        SearchView::unrestricted(),
    ));
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.path, NodePath::parse(paths::SAMPLES));
    assert_eq!(first.metadata.to_json(), json!({"group": "samples"}));

    let summary = serde_json::to_value(&first).unwrap();
    assert_eq!(summary["path"], json!("/samples"));
    assert_eq!(summary["kind"], json!("container"));
}
