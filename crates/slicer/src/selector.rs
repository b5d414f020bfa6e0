//! Slice expressions and their resolution against a structure.
//!
//! Grammar (one selector per dimension, comma separated):
//!
//! | selector     | meaning                                   |
//! |--------------|-------------------------------------------|
//! | `` or `:`    | the whole dimension                       |
//! | `i`          | a single index; the dimension is dropped  |
//! | `a:b[:s]`    | half-open range with optional step `s>=1` |
//! | `a:`, `:b`   | open-ended ranges                         |
//! | `[i,j,k]`    | explicit index list, in the order given   |
//!
//! Negative indices count from the end. Bounds are never clamped.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use tree_common::{DataError, Structure, StructureKind, TableStructure};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SliceParseError {
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("invalid index '{0}'")]
    InvalidIndex(String),

    #[error("step must be at least 1, got {0}")]
    InvalidStep(i64),

    #[error("unbalanced brackets in '{0}'")]
    UnbalancedBrackets(String),
}

impl From<SliceParseError> for DataError {
    fn from(e: SliceParseError) -> Self {
        DataError::Validation(e.to_string())
    }
}

/// One dimension of a parsed slice expression, before bounds are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimSelector {
    All,
    Index(i64),
    Range {
        start: Option<i64>,
        stop: Option<i64>,
        step: usize,
    },
    List(Vec<i64>),
}

fn parse_index(text: &str) -> Result<i64, SliceParseError> {
    text.trim()
        .parse()
        .map_err(|_| SliceParseError::InvalidIndex(text.trim().to_string()))
}

fn parse_bound(text: &str) -> Result<Option<i64>, SliceParseError> {
    if text.trim().is_empty() {
        Ok(None)
    } else {
        parse_index(text).map(Some)
    }
}

impl FromStr for DimSelector {
    type Err = SliceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == ":" {
            return Ok(DimSelector::All);
        }

        if let Some(inner) = s.strip_prefix('[') {
            let inner = inner
                .strip_suffix(']')
                .ok_or_else(|| SliceParseError::UnbalancedBrackets(s.to_string()))?;
            if inner.trim().is_empty() {
                return Ok(DimSelector::List(Vec::new()));
            }
            let indices = inner
                .split(',')
                .map(parse_index)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(DimSelector::List(indices));
        }

        if s.contains(':') {
            let parts: Vec<&str> = s.split(':').collect();
            if parts.len() > 3 {
                return Err(SliceParseError::InvalidSelector(s.to_string()));
            }
            let start = parse_bound(parts[0])?;
            let stop = parse_bound(parts[1])?;
            let step = match parts.get(2).map(|p| parse_bound(p)).transpose()?.flatten() {
                None => 1,
                Some(step) if step >= 1 => step as usize,
                Some(step) => return Err(SliceParseError::InvalidStep(step)),
            };
            if start.is_none() && stop.is_none() && step == 1 {
                return Ok(DimSelector::All);
            }
            return Ok(DimSelector::Range { start, stop, step });
        }

        parse_index(s).map(DimSelector::Index)
    }
}

impl fmt::Display for DimSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: &Option<i64>| b.map(|v| v.to_string()).unwrap_or_default();
        match self {
            DimSelector::All => f.write_str(":"),
            DimSelector::Index(i) => write!(f, "{}", i),
            DimSelector::Range { start, stop, step } if *step == 1 => {
                write!(f, "{}:{}", bound(start), bound(stop))
            }
            DimSelector::Range { start, stop, step } => {
                write!(f, "{}:{}:{}", bound(start), bound(stop), step)
            }
            DimSelector::List(items) => {
                let items: Vec<String> = items.iter().map(i64::to_string).collect();
                write!(f, "[{}]", items.join(","))
            }
        }
    }
}

/// Split on commas that are not inside brackets.
fn split_selectors(expr: &str) -> Result<Vec<&str>, SliceParseError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SliceParseError::UnbalancedBrackets(expr.to_string()))?
            }
            ',' if depth == 0 => {
                parts.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SliceParseError::UnbalancedBrackets(expr.to_string()));
    }
    parts.push(&expr[start..]);
    Ok(parts)
}

/// A parsed slice request: per-dimension selectors plus, for tables, a
/// column subset (empty means all columns).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceSpec {
    pub selectors: Vec<DimSelector>,
    pub columns: Vec<String>,
}

impl SliceSpec {
    /// The whole node.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn parse(expr: &str) -> Result<Self, SliceParseError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(Self::all());
        }
        let selectors = split_selectors(expr)?
            .into_iter()
            .map(DimSelector::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            selectors,
            columns: Vec::new(),
        })
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Check bounds against `structure` and normalise every selector.
    pub fn resolve(&self, structure: &Structure) -> Result<ResolvedSlice, DataError> {
        match structure {
            Structure::Container { .. } => Err(DataError::Validation(
                "containers have no data to slice".to_string(),
            )),
            Structure::Array(a) => self.resolve_dims(StructureKind::Array, &a.shape),
            Structure::Sparse(s) => self.resolve_dims(StructureKind::Sparse, &s.shape),
            Structure::Table(t) => self.resolve_table(t),
        }
    }

    fn resolve_dims(&self, kind: StructureKind, shape: &[usize]) -> Result<ResolvedSlice, DataError> {
        if !self.columns.is_empty() {
            return Err(DataError::Validation(format!(
                "column selection does not apply to {} nodes",
                kind
            )));
        }
        if self.selectors.len() > shape.len() {
            return Err(DataError::Validation(format!(
                "{} selectors given for {}-dimensional data",
                self.selectors.len(),
                shape.len()
            )));
        }
        let dims = shape
            .iter()
            .enumerate()
            .map(|(d, &size)| {
                let selector = self.selectors.get(d).unwrap_or(&DimSelector::All);
                Resolved::new(selector, size, d)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResolvedSlice {
            kind,
            dims,
            columns: Vec::new(),
            all_columns: true,
        })
    }

    fn resolve_table(&self, table: &TableStructure) -> Result<ResolvedSlice, DataError> {
        if self.selectors.len() > 1 {
            return Err(DataError::Validation(format!(
                "tables take a single row selector, {} given",
                self.selectors.len()
            )));
        }
        let selector = self.selectors.first().unwrap_or(&DimSelector::All);
        let rows = match Resolved::new(selector, table.row_count, 0)? {
            // A single row still yields a table.
            Resolved::Index(i) => Resolved::List(vec![i]),
            other => other,
        };

        let columns = if self.columns.is_empty() {
            table.column_names()
        } else {
            for name in &self.columns {
                if table.column(name).is_none() {
                    return Err(DataError::Validation(format!("unknown column '{}'", name)));
                }
            }
            self.columns.clone()
        };
        let all_columns = columns == table.column_names();

        Ok(ResolvedSlice {
            kind: StructureKind::Table,
            dims: vec![rows],
            columns,
            all_columns,
        })
    }
}

impl FromStr for SliceSpec {
    type Err = SliceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SliceSpec::parse(s)
    }
}

/// One dimension after normalisation against its size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Single position; the dimension does not appear in the output.
    Index(usize),
    Range { start: usize, stop: usize, step: usize },
    List(Vec<usize>),
}

fn normalise(index: i64, size: usize) -> i64 {
    if index < 0 {
        index + size as i64
    } else {
        index
    }
}

impl Resolved {
    fn new(selector: &DimSelector, size: usize, dim: usize) -> Result<Self, DataError> {
        let out_of_bounds = |value: i64| {
            DataError::Validation(format!(
                "index {} out of bounds for dimension {} of size {}",
                value, dim, size
            ))
        };
        let element = |i: i64| -> Result<usize, DataError> {
            let n = normalise(i, size);
            if n < 0 || n >= size as i64 {
                Err(out_of_bounds(i))
            } else {
                Ok(n as usize)
            }
        };

        match selector {
            DimSelector::All => Ok(Resolved::Range {
                start: 0,
                stop: size,
                step: 1,
            }),
            DimSelector::Index(i) => element(*i).map(Resolved::Index),
            DimSelector::List(items) => items
                .iter()
                .map(|&i| element(i))
                .collect::<Result<Vec<_>, _>>()
                .map(Resolved::List),
            DimSelector::Range { start, stop, step } => {
                let bound = |b: Option<i64>, default: usize| -> Result<usize, DataError> {
                    match b {
                        None => Ok(default),
                        Some(v) => {
                            let n = normalise(v, size);
                            if n < 0 || n > size as i64 {
                                Err(out_of_bounds(v))
                            } else {
                                Ok(n as usize)
                            }
                        }
                    }
                };
                let start_n = bound(*start, 0)?;
                let stop_n = bound(*stop, size)?;
                if start_n > stop_n {
                    return Err(DataError::Validation(format!(
                        "range start {} is after stop {} in dimension {}",
                        start_n, stop_n, dim
                    )));
                }
                Ok(Resolved::Range {
                    start: start_n,
                    stop: stop_n,
                    step: *step,
                })
            }
        }
    }

    /// Number of positions selected.
    pub fn len(&self) -> usize {
        match self {
            Resolved::Index(_) => 1,
            Resolved::Range { start, stop, step } => (stop - start + step - 1) / step,
            Resolved::List(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keeps_dim(&self) -> bool {
        !matches!(self, Resolved::Index(_))
    }

    /// Absolute positions in output order.
    pub fn positions(&self) -> Vec<usize> {
        match self {
            Resolved::Index(i) => vec![*i],
            Resolved::Range { start, stop, step } => (*start..*stop).step_by(*step).collect(),
            Resolved::List(items) => items.clone(),
        }
    }

    fn canonical(&self, size: usize) -> String {
        match self {
            Resolved::Index(i) => i.to_string(),
            Resolved::Range { start, stop, step } => {
                if *start == 0 && *stop == size && *step == 1 {
                    ":".to_string()
                } else if *step == 1 {
                    format!("{}:{}", start, stop)
                } else {
                    format!("{}:{}:{}", start, stop, step)
                }
            }
            Resolved::List(items) => {
                let items: Vec<String> = items.iter().map(usize::to_string).collect();
                format!("[{}]", items.join(","))
            }
        }
    }
}

/// A slice checked against a concrete structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSlice {
    pub kind: StructureKind,
    /// One entry per dimension (a single row dimension for tables).
    pub dims: Vec<Resolved>,
    /// Table columns in output order. Empty for arrays.
    pub columns: Vec<String>,
    all_columns: bool,
}

impl ResolvedSlice {
    /// Shape of the result. Index-selected dimensions are dropped; tables
    /// report `[rows, columns]`.
    pub fn output_shape(&self) -> Vec<usize> {
        match self.kind {
            StructureKind::Table => vec![self.dims[0].len(), self.columns.len()],
            _ => self
                .dims
                .iter()
                .filter(|d| d.keeps_dim())
                .map(Resolved::len)
                .collect(),
        }
    }

    /// Normalised text form. Equivalent requests produce the same string.
    pub fn canonical(&self, shape: &[usize]) -> String {
        let dims: Vec<String> = self
            .dims
            .iter()
            .enumerate()
            .map(|(d, r)| r.canonical(shape.get(d).copied().unwrap_or(0)))
            .collect();
        let mut out = dims.join(",");
        if self.kind == StructureKind::Table && !self.all_columns {
            out.push_str(";columns=");
            out.push_str(&self.columns.join(","));
        }
        out
    }
}
