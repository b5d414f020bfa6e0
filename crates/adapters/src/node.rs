//! Path resolution and resolved node views.

use std::sync::Arc;
use tracing::debug;

use tree_common::{
    ContentVersion, DataError, DataResult, Metadata, NodePath, Spec, Structure, StructureKind,
};

use crate::adapter::{Adapter, AdapterError};

/// A resolved node: a path plus a snapshot of what its adapter reported.
///
/// Nodes are built per request and dropped afterwards. Only the adapter
/// outlives them.
#[derive(Clone)]
pub struct Node {
    pub path: NodePath,
    pub adapter: Arc<dyn Adapter>,
    pub kind: StructureKind,
    pub metadata: Metadata,
    pub specs: Vec<Spec>,
    pub structure: Structure,
    pub content_version: ContentVersion,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("content_version", &self.content_version)
            .finish()
    }
}

impl Node {
    /// Snapshot an adapter already known to sit at `path`.
    pub async fn load(path: NodePath, adapter: Arc<dyn Adapter>) -> DataResult<Node> {
        let wrap = |e: AdapterError| DataError::Backend(e.at(&path));

        let structure = adapter.structure().await.map_err(wrap)?;
        let metadata = adapter.metadata().await.map_err(wrap)?;
        let specs = adapter.specs().await.map_err(wrap)?;
        let content_version = adapter.content_version().await.map_err(wrap)?;

        Ok(Node {
            kind: adapter.kind(),
            path,
            adapter,
            metadata,
            specs,
            structure,
            content_version,
        })
    }
}

/// Walk from `root` to `path` one segment at a time.
///
/// Fails with `NotFound` when a segment is absent or when an intermediate
/// node is not a container.
pub async fn resolve_adapter(
    root: &Arc<dyn Adapter>,
    path: &NodePath,
) -> DataResult<Arc<dyn Adapter>> {
    let mut current = Arc::clone(root);
    let mut walked = NodePath::root();

    for segment in path.segments() {
        if current.kind() != StructureKind::Container {
            debug!(path = %path, at = %walked, "Intermediate node is not a container");
            return Err(DataError::not_found(path));
        }
        let next = current
            .child(segment)
            .await
            .map_err(|e| DataError::Backend(e.at(&walked)))?;
        walked = walked.join(segment.clone());
        current = match next {
            Some(child) => child,
            None => return Err(DataError::not_found(path)),
        };
    }

    Ok(current)
}

/// Resolve `path` and snapshot the node found there.
pub async fn resolve(root: &Arc<dyn Adapter>, path: &NodePath) -> DataResult<Node> {
    let adapter = resolve_adapter(root, path).await?;
    Node::load(path.clone(), adapter).await
}
