//! Node/Adapter abstraction
//!
//! Every dataset, whatever its backend, is exposed as a node in one
//! hierarchical namespace. A node is a thin view over an [`Adapter`]:
//!
//! ```text
//! resolve("/samples/run42")
//!      │
//!      ├─► root.child("samples")        (must be a container)
//!      │
//!      ├─► samples.child("run42")
//!      │
//!      └─► Node { structure, metadata, specs, content_version }
//!               │
//!               ▼
//!          adapter.read(ReadRequest::ArrayBlock { .. })
//! ```
//!
//! Backends are plugged in through the [`AdapterRegistry`], which maps a
//! family name from static configuration to a factory.

pub mod adapter;
pub mod memory;
pub mod node;
pub mod registry;

pub use adapter::{Adapter, AdapterError, AdapterResult, ChildEntry, Chunk, ReadRequest};
pub use memory::{ArrayAdapter, MapAdapter, SparseAdapter, TableAdapter};
pub use node::{resolve, resolve_adapter, Node};
pub use registry::{
    AdapterFactory, AdapterRegistry, AdapterSource, RegistryError, RegistryResult, TreeEntry,
};
