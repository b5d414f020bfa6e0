//! Breadth-first search over the node tree.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use metrics::counter;
use serde::{Serialize, Serializer};
use tracing::{debug, instrument};

use adapters::{resolve_adapter, Adapter, AdapterError, Node};
use tree_common::{
    ContentVersion, DataError, DataResult, Metadata, NodePath, Spec, Structure, StructureKind,
};

use crate::query::{Candidate, Query};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Decides whether a path may appear in results. Hidden containers are not
/// descended into.
pub type Visibility = Arc<dyn Fn(&NodePath) -> bool + Send + Sync>;

/// Strips what the caller may not see from a node before it is matched.
pub type Redactor = Arc<dyn Fn(&mut NodeSummary) + Send + Sync>;

/// The part of the tree a caller may search, and how much of each node.
#[derive(Clone)]
pub struct SearchView {
    pub visible: Visibility,
    pub redact: Redactor,
}

impl SearchView {
    pub fn new(visible: Visibility, redact: Redactor) -> Self {
        Self { visible, redact }
    }

    /// Every node, unredacted.
    pub fn unrestricted() -> Self {
        Self::new(Arc::new(|_| true), Arc::new(|_| {}))
    }

    pub fn with_visibility(mut self, visible: Visibility) -> Self {
        self.visible = visible;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub root: NodePath,
    pub query: Query,
    /// Skip the subtree of any container that fails the query.
    pub path_scoped: bool,
    pub offset: usize,
    pub limit: usize,
}

impl SearchRequest {
    pub fn new(root: NodePath, query: Query) -> Self {
        Self {
            root,
            query,
            path_scoped: false,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn path_scoped(mut self, scoped: bool) -> Self {
        self.path_scoped = scoped;
        self
    }

    /// Set the page window. `limit` is capped at [`MAX_LIMIT`].
    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit.min(MAX_LIMIT);
        self
    }
}

fn path_string<S: Serializer>(path: &NodePath, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(path)
}

/// A search hit: everything about a node except its data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    #[serde(serialize_with = "path_string")]
    pub path: NodePath,
    pub kind: StructureKind,
    pub metadata: Metadata,
    pub specs: Vec<Spec>,
    pub structure: Structure,
    pub content_version: ContentVersion,
}

impl From<Node> for NodeSummary {
    fn from(node: Node) -> Self {
        Self {
            path: node.path,
            kind: node.kind,
            metadata: node.metadata,
            specs: node.specs,
            structure: node.structure,
            content_version: node.content_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub data: Vec<NodeSummary>,
    pub offset: usize,
    pub limit: usize,
}

struct Pending {
    path: NodePath,
    adapter: Arc<dyn Adapter>,
    depth: usize,
}

struct Walk {
    queue: VecDeque<Pending>,
    query: Query,
    path_scoped: bool,
    view: SearchView,
    failed: bool,
}

impl Walk {
    /// Visit queued nodes until one matches or the queue is empty.
    async fn next_match(&mut self) -> DataResult<Option<NodeSummary>> {
        while let Some(pending) = self.queue.pop_front() {
            let depth = pending.depth;
            let node = Node::load(pending.path, pending.adapter).await?;
            counter!("search_nodes_visited_total").increment(1);

            let adapter = Arc::clone(&node.adapter);
            let mut summary = NodeSummary::from(node);
            (self.view.redact)(&mut summary);

            let is_root = depth == 0;
            let matched = !is_root
                && self.query.matches(&Candidate {
                    name: summary.path.name().unwrap_or_default(),
                    kind: summary.kind,
                    metadata: &summary.metadata,
                    specs: &summary.specs,
                });

            let descend = is_root || matched || !self.path_scoped;
            if summary.kind == StructureKind::Container && descend {
                self.expand(&summary.path, adapter.as_ref(), depth).await?;
            }
            if matched {
                return Ok(Some(summary));
            }
        }
        Ok(None)
    }

    async fn expand(&mut self, parent: &NodePath, adapter: &dyn Adapter, depth: usize) -> DataResult<()> {
        let wrap = |e: AdapterError| DataError::Backend(e.at(parent));
        for entry in adapter.enumerate_children().await.map_err(wrap)? {
            let path = parent.join(entry.name.clone());
            if !(self.view.visible)(&path) {
                debug!(path = %path, "Skipping hidden subtree");
                continue;
            }
            match adapter.child(&entry.name).await.map_err(wrap)? {
                Some(adapter) => self.queue.push_back(Pending {
                    path,
                    adapter,
                    depth: depth + 1,
                }),
                None => debug!(path = %path, "Child vanished during enumeration"),
            }
        }
        Ok(())
    }
}

/// Lazily yield every node below `root_path` that matches `query`, in
/// breadth-first enumeration order. The root itself is never yielded.
/// Nodes are redacted through `view` before the query sees them.
///
/// The stream ends after the first error.
pub fn walk(
    root: Arc<dyn Adapter>,
    root_path: NodePath,
    query: Query,
    path_scoped: bool,
    view: SearchView,
) -> impl Stream<Item = DataResult<NodeSummary>> + Send {
    let state = Walk {
        queue: VecDeque::from([Pending {
            path: root_path,
            adapter: root,
            depth: 0,
        }]),
        query,
        path_scoped,
        view,
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        match state.next_match().await {
            Ok(Some(summary)) => Some((Ok(summary), state)),
            Ok(None) => None,
            Err(e) => {
                state.failed = true;
                Some((Err(e), state))
            }
        }
    })
}

/// Run a search request from the tree root and collect one page.
#[instrument(skip(tree, request, view), fields(root = %request.root))]
pub async fn search(
    tree: &Arc<dyn Adapter>,
    request: SearchRequest,
    view: SearchView,
) -> DataResult<SearchPage> {
    request.query.validate()?;
    let start = resolve_adapter(tree, &request.root).await?;

    let data: Vec<NodeSummary> = walk(
        start,
        request.root.clone(),
        request.query,
        request.path_scoped,
        view,
    )
    .skip(request.offset)
    .take(request.limit)
    .try_collect()
    .await?;

    debug!(results = data.len(), "Search complete");
    Ok(SearchPage {
        data,
        offset: request.offset,
        limit: request.limit,
    })
}
