//! Startup-time registry mapping family names to adapter factories.
//!
//! The tree is described declaratively (see [`TreeEntry`]) and built once at
//! service startup. Adding a backend format means registering one more
//! family; nothing is discovered at runtime.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use tree_common::{
    ArrayData, Column, ColumnType, ColumnValues, DType, DataError, Metadata, Scalar, SparseData,
    Spec, StructureKind, TableData,
};

use crate::adapter::Adapter;
use crate::memory::{ArrayAdapter, MapAdapter, SparseAdapter, TableAdapter};

/// Errors raised while building the tree from configuration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown adapter family '{0}'")]
    UnknownFamily(String),

    #[error("Invalid arguments for family '{family}': {message}")]
    InvalidArgs { family: String, message: String },

    #[error("Family '{0}' does not accept children")]
    UnexpectedChildren(String),

    #[error("Duplicate child name '{0}'")]
    DuplicateChild(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Declarative description of one node in the tree.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    /// Name under the parent. Ignored for the root.
    #[serde(default)]
    pub name: String,
    pub family: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub specs: Vec<Spec>,
    #[serde(default)]
    pub children: Vec<TreeEntry>,
}

/// Everything a factory gets to build one adapter.
pub struct AdapterSource {
    pub family: String,
    pub args: serde_json::Value,
    pub metadata: Metadata,
    pub specs: Vec<Spec>,
    /// Already-built children, in declaration order.
    pub children: Vec<(String, Arc<dyn Adapter>)>,
}

impl AdapterSource {
    /// Deserialize the family-specific arguments.
    pub fn parse_args<T: serde::de::DeserializeOwned>(&self) -> RegistryResult<T> {
        let args = if self.args.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.args.clone()
        };
        serde_json::from_value(args).map_err(|e| self.invalid(e.to_string()))
    }

    pub fn invalid(&self, message: impl Into<String>) -> RegistryError {
        RegistryError::InvalidArgs {
            family: self.family.clone(),
            message: message.into(),
        }
    }

    fn reject_children(&self) -> RegistryResult<()> {
        if self.children.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::UnexpectedChildren(self.family.clone()))
        }
    }
}

/// Builds an adapter for one family.
pub trait AdapterFactory: Send + Sync {
    fn build(&self, source: AdapterSource) -> RegistryResult<Arc<dyn Adapter>>;
}

impl<F> AdapterFactory for F
where
    F: Fn(AdapterSource) -> RegistryResult<Arc<dyn Adapter>> + Send + Sync,
{
    fn build(&self, source: AdapterSource) -> RegistryResult<Arc<dyn Adapter>> {
        self(source)
    }
}

/// Family name to factory map, populated at startup.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    factories: HashMap<String, Arc<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the in-memory families: `container`, `array`, `table`, `sparse`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("container", build_container);
        registry.register("array", build_array);
        registry.register("table", build_table);
        registry.register("sparse", build_sparse);
        registry
    }

    pub fn register(&mut self, family: impl Into<String>, factory: impl AdapterFactory + 'static) {
        self.factories.insert(family.into(), Arc::new(factory));
    }

    pub fn contains(&self, family: &str) -> bool {
        self.factories.contains_key(family)
    }

    pub fn families(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the adapter tree described by `entry`, children first.
    pub fn build(&self, entry: &TreeEntry) -> RegistryResult<Arc<dyn Adapter>> {
        let factory = self
            .factories
            .get(&entry.family)
            .ok_or_else(|| RegistryError::UnknownFamily(entry.family.clone()))?;

        let mut children: Vec<(String, Arc<dyn Adapter>)> = Vec::with_capacity(entry.children.len());
        for child in &entry.children {
            if children.iter().any(|(name, _)| *name == child.name) {
                return Err(RegistryError::DuplicateChild(child.name.clone()));
            }
            children.push((child.name.clone(), self.build(child)?));
        }

        debug!(family = %entry.family, name = %entry.name, children = children.len(), "Building adapter");
        factory.build(AdapterSource {
            family: entry.family.clone(),
            args: entry.args.clone(),
            metadata: entry.metadata.clone(),
            specs: entry.specs.clone(),
            children,
        })
    }

    /// Build the root and log a summary.
    pub fn build_root(&self, entry: &TreeEntry) -> RegistryResult<Arc<dyn Adapter>> {
        let root = self.build(entry)?;
        if root.kind() != StructureKind::Container {
            info!(family = %entry.family, "Tree root is a single {} node", root.kind());
        }
        Ok(root)
    }
}

// === Built-in families ===

fn build_container(source: AdapterSource) -> RegistryResult<Arc<dyn Adapter>> {
    Ok(Arc::new(
        MapAdapter::new(source.children)
            .with_metadata(source.metadata)
            .with_specs(source.specs),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum Generator {
    /// Element `i` (C order) holds the value `i`.
    Ramp,
    Zeros,
}

#[derive(Deserialize)]
struct ArrayArgs {
    dtype: DType,
    shape: Vec<usize>,
    #[serde(default)]
    chunks: Option<Vec<usize>>,
    /// Flat values in C order.
    #[serde(default)]
    values: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    generator: Option<Generator>,
}

fn build_array(source: AdapterSource) -> RegistryResult<Arc<dyn Adapter>> {
    source.reject_children()?;
    let args: ArrayArgs = source.parse_args()?;
    let len: usize = args.shape.iter().product();

    let scalars: Vec<Scalar> = match (&args.values, &args.generator) {
        (Some(values), None) => {
            if values.len() != len {
                return Err(source.invalid(format!(
                    "{} values given for shape {:?}",
                    values.len(),
                    args.shape
                )));
            }
            values
                .iter()
                .map(|v| {
                    args.dtype
                        .scalar_from_json(v)
                        .ok_or_else(|| source.invalid(format!("{} is not a valid {}", v, args.dtype)))
                })
                .collect::<RegistryResult<_>>()?
        }
        (None, Some(Generator::Ramp)) => (0..len).map(|i| Scalar::Int(i as i64)).collect(),
        (None, Some(Generator::Zeros)) | (None, None) => vec![Scalar::Int(0); len],
        (Some(_), Some(_)) => {
            return Err(source.invalid("give either 'values' or 'generator', not both"))
        }
    };
    let scalars = if args.dtype.kind() == tree_common::DTypeKind::Float {
        scalars.into_iter().map(|s| Scalar::Float(s.as_f64())).collect()
    } else {
        scalars
    };

    let data = ArrayData::from_scalars(args.dtype, args.shape, &scalars)?;
    let adapter = ArrayAdapter::new(data, args.chunks)?
        .with_metadata(source.metadata)
        .with_specs(source.specs);
    Ok(Arc::new(adapter))
}

#[derive(Deserialize)]
struct ColumnArgs {
    name: String,
    dtype: ColumnType,
    values: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct TableArgs {
    columns: Vec<ColumnArgs>,
    #[serde(default)]
    partitions: Vec<usize>,
}

fn column_values(source: &AdapterSource, column: &ColumnArgs) -> RegistryResult<ColumnValues> {
    let bad = |v: &serde_json::Value| {
        source.invalid(format!(
            "column '{}': {} is not a valid {}",
            column.name,
            v,
            column.dtype.as_str()
        ))
    };
    let values = &column.values;
    Ok(match column.dtype {
        ColumnType::Bool => ColumnValues::Bool(
            values
                .iter()
                .map(|v| v.as_bool().ok_or_else(|| bad(v)))
                .collect::<RegistryResult<_>>()?,
        ),
        ColumnType::Int64 => ColumnValues::Int64(
            values
                .iter()
                .map(|v| v.as_i64().ok_or_else(|| bad(v)))
                .collect::<RegistryResult<_>>()?,
        ),
        ColumnType::Float64 => ColumnValues::Float64(
            values
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| bad(v)))
                .collect::<RegistryResult<_>>()?,
        ),
        ColumnType::Utf8 => ColumnValues::Utf8(
            values
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(|| bad(v)))
                .collect::<RegistryResult<_>>()?,
        ),
    })
}

fn build_table(source: AdapterSource) -> RegistryResult<Arc<dyn Adapter>> {
    source.reject_children()?;
    let args: TableArgs = source.parse_args()?;
    let columns = args
        .columns
        .iter()
        .map(|c| -> RegistryResult<Column> {
            Ok(Column::new(c.name.clone(), column_values(&source, c)?))
        })
        .collect::<RegistryResult<Vec<_>>>()?;
    let data = TableData::new(columns)?;
    let adapter = TableAdapter::new(data, args.partitions)?
        .with_metadata(source.metadata)
        .with_specs(source.specs);
    Ok(Arc::new(adapter))
}

#[derive(Deserialize)]
struct SparseArgs {
    dtype: DType,
    shape: Vec<usize>,
    coords: Vec<Vec<usize>>,
    values: Vec<serde_json::Value>,
}

fn build_sparse(source: AdapterSource) -> RegistryResult<Arc<dyn Adapter>> {
    source.reject_children()?;
    let args: SparseArgs = source.parse_args()?;
    if args.coords.len() != args.values.len() {
        return Err(source.invalid("coords and values differ in length"));
    }
    let mut buf = Vec::with_capacity(args.values.len() * args.dtype.itemsize());
    for v in &args.values {
        let scalar = args
            .dtype
            .scalar_from_json(v)
            .ok_or_else(|| source.invalid(format!("{} is not a valid {}", v, args.dtype)))?;
        args.dtype
            .encode(scalar, &mut buf)
            .map_err(|e| source.invalid(e.to_string()))?;
    }
    let data = SparseData::new(args.shape, args.dtype, args.coords, buf)?;
    let adapter = SparseAdapter::new(data)
        .with_metadata(source.metadata)
        .with_specs(source.specs);
    Ok(Arc::new(adapter))
}
