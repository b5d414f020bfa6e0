//! Common types shared by every crate in the structured data service.
//!
//! - [`structure`]: canonical descriptors for each data kind (array, table,
//!   sparse) plus the closed [`StructureKind`] set.
//! - [`dtype`]: element types with explicit byte order.
//! - [`value`]: the tagged [`MetaValue`] used for node metadata.
//! - [`path`]: [`NodePath`], an ordered sequence of segments.
//! - [`data`]: in-memory payloads produced by reads and slices.
//! - [`error`]: the external error taxonomy.

pub mod data;
pub mod dtype;
pub mod error;
pub mod path;
pub mod structure;
pub mod value;
pub mod version;

pub use data::{c_strides, ArrayData, Column, ColumnValues, Payload, SparseData, TableData};
pub use dtype::{ColumnType, DType, DTypeError, DTypeKind, Endianness, Scalar};
pub use error::{BackendError, DataError, DataResult, ErrorKind};
pub use path::NodePath;
pub use structure::{
    ArrayStructure, ColumnDescriptor, SparseLayout, SparseStructure, Spec, Structure,
    StructureKind, TableStructure,
};
pub use value::{MetaValue, Metadata};
pub use version::ContentVersion;
