//! The adapter trait implemented by every backend.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use tree_common::{
    BackendError, ContentVersion, Metadata, NodePath, Payload, Spec, Structure, StructureKind,
};

/// Failure reported by an adapter call.
///
/// Adapters do not know where they sit in the tree, so the node path is
/// attached by the caller via [`AdapterError::at`].
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct AdapterError {
    pub message: String,
    pub transient: bool,
}

impl AdapterError {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn at(self, path: &NodePath) -> BackendError {
        BackendError {
            path: path.clone(),
            message: self.message,
            transient: self.transient,
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// One entry returned by [`Adapter::enumerate_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub kind: StructureKind,
}

/// A single backend read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReadRequest {
    /// One block of an array's chunk grid, by block coordinates.
    ArrayBlock { block: Vec<usize> },
    /// One row partition of a table. An empty column list means all columns.
    TablePartition { partition: usize, columns: Vec<String> },
    /// All stored coordinates of a sparse array.
    Sparse,
}

/// Raw data returned by [`Adapter::read`].
pub type Chunk = Payload;

/// Backend-specific implementation of a tree node.
///
/// Implementations must be cheap to call repeatedly: nodes are resolved per
/// request and thrown away afterwards. The structure returned must not
/// change without the content version changing too.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Kind of this node. Fixed for the adapter's lifetime.
    fn kind(&self) -> StructureKind;

    /// Children in stable enumeration order. Empty for non-containers.
    async fn enumerate_children(&self) -> AdapterResult<Vec<ChildEntry>> {
        Ok(Vec::new())
    }

    /// Look up one child by name. `None` for non-containers.
    async fn child(&self, _name: &str) -> AdapterResult<Option<Arc<dyn Adapter>>> {
        Ok(None)
    }

    async fn structure(&self) -> AdapterResult<Structure>;

    async fn metadata(&self) -> AdapterResult<Metadata>;

    async fn specs(&self) -> AdapterResult<Vec<Spec>> {
        Ok(Vec::new())
    }

    async fn content_version(&self) -> AdapterResult<ContentVersion>;

    /// Read one chunk. Containers reject every read.
    async fn read(&self, request: &ReadRequest) -> AdapterResult<Chunk>;
}
