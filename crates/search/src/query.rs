//! Query predicates over node metadata, specs and kind.
//!
//! Queries arrive as JSON (the `filter` parameter) and are validated once,
//! before any node is visited:
//!
//! ```json
//! {"type": "and", "queries": [
//!     {"type": "eq", "key": "sample.name", "value": "quartz"},
//!     {"type": "comparison", "key": "scan_id", "op": "ge", "value": 40}
//! ]}
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tree_common::{DataError, MetaValue, Metadata, Spec, StructureKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("malformed filter: {0}")]
    Malformed(String),

    #[error("invalid metadata key '{0}'")]
    InvalidKey(String),

    #[error("'{op}' cannot be applied to a {found} value")]
    InvalidOperand { op: &'static str, found: &'static str },

    #[error("'{0}' needs a non-empty argument")]
    Empty(&'static str),
}

impl From<QueryError> for DataError {
    fn from(e: QueryError) -> Self {
        DataError::Validation(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// A search predicate. Keys are dotted paths into node metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    Eq { key: String, value: MetaValue },
    /// Also true when the key is absent.
    NotEq { key: String, value: MetaValue },
    Comparison { key: String, op: CompareOp, value: MetaValue },
    /// Sequence membership, or substring for strings.
    Contains { key: String, value: MetaValue },
    In { key: String, values: Vec<MetaValue> },
    /// Also true when the key is absent.
    NotIn { key: String, values: Vec<MetaValue> },
    /// Case-insensitive substring over every string in the metadata.
    FullText { text: String },
    /// The node's own name equals `key`.
    KeyLookup { key: String },
    #[serde(rename = "specs")]
    SpecsQuery {
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
    StructureFamily { family: StructureKind },
    And { queries: Vec<Query> },
    Or { queries: Vec<Query> },
    Not { query: Box<Query> },
}

/// What a query is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub name: &'a str,
    pub kind: StructureKind,
    pub metadata: &'a Metadata,
    pub specs: &'a [Spec],
}

fn check_key(key: &str) -> Result<(), QueryError> {
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return Err(QueryError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn check_scalar(op: &'static str, value: &MetaValue) -> Result<(), QueryError> {
    if value.is_scalar() {
        Ok(())
    } else {
        Err(QueryError::InvalidOperand {
            op,
            found: value.type_name(),
        })
    }
}

fn scalar_eq(a: &MetaValue, b: &MetaValue) -> bool {
    match (a, b) {
        (MetaValue::Number(_), MetaValue::Number(_)) => a.as_f64() == b.as_f64(),
        _ => a == b,
    }
}

fn scalar_cmp(a: &MetaValue, b: &MetaValue) -> Option<Ordering> {
    match (a, b) {
        (MetaValue::Number(_), MetaValue::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (MetaValue::String(x), MetaValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl Query {
    /// Matches every node.
    pub fn all() -> Self {
        Query::And {
            queries: Vec::new(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        Query::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn full_text(text: impl Into<String>) -> Self {
        Query::FullText { text: text.into() }
    }

    pub fn from_json(text: &str) -> Result<Self, QueryError> {
        let query: Query =
            serde_json::from_str(text).map_err(|e| QueryError::Malformed(e.to_string()))?;
        query.validate()?;
        Ok(query)
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        match self {
            Query::Eq { key, value } | Query::NotEq { key, value } => {
                check_key(key)?;
                check_scalar("eq", value)
            }
            Query::Comparison { key, value, .. } => {
                check_key(key)?;
                match value {
                    MetaValue::Number(_) | MetaValue::String(_) => Ok(()),
                    other => Err(QueryError::InvalidOperand {
                        op: "comparison",
                        found: other.type_name(),
                    }),
                }
            }
            Query::Contains { key, value } => {
                check_key(key)?;
                check_scalar("contains", value)
            }
            Query::In { key, values } | Query::NotIn { key, values } => {
                check_key(key)?;
                values.iter().try_for_each(|v| check_scalar("in", v))
            }
            Query::FullText { text } if text.trim().is_empty() => Err(QueryError::Empty("full_text")),
            Query::KeyLookup { key } if key.is_empty() => Err(QueryError::Empty("key_lookup")),
            Query::FullText { .. } | Query::KeyLookup { .. } | Query::StructureFamily { .. } => Ok(()),
            Query::SpecsQuery { include, exclude } => {
                if include.iter().chain(exclude).any(String::is_empty) {
                    Err(QueryError::Empty("specs"))
                } else {
                    Ok(())
                }
            }
            Query::And { queries } | Query::Or { queries } => {
                queries.iter().try_for_each(Query::validate)
            }
            Query::Not { query } => query.validate(),
        }
    }

    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        let lookup = |key: &str| candidate.metadata.get_path(key);

        match self {
            Query::Eq { key, value } => lookup(key).is_some_and(|v| scalar_eq(v, value)),
            Query::NotEq { key, value } => !lookup(key).is_some_and(|v| scalar_eq(v, value)),
            Query::Comparison { key, op, value } => lookup(key)
                .and_then(|v| scalar_cmp(v, value))
                .is_some_and(|ordering| op.holds(ordering)),
            Query::Contains { key, value } => match (lookup(key), value) {
                (Some(MetaValue::Sequence(items)), _) => items.iter().any(|i| scalar_eq(i, value)),
                (Some(MetaValue::String(haystack)), MetaValue::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                _ => false,
            },
            Query::In { key, values } => {
                lookup(key).is_some_and(|v| values.iter().any(|c| scalar_eq(v, c)))
            }
            Query::NotIn { key, values } => {
                !lookup(key).is_some_and(|v| values.iter().any(|c| scalar_eq(v, c)))
            }
            Query::FullText { text } => {
                let needle = text.to_lowercase();
                let mut found = false;
                candidate.metadata.for_each_string(&mut |s| {
                    if !found && s.to_lowercase().contains(&needle) {
                        found = true;
                    }
                });
                found
            }
            Query::KeyLookup { key } => candidate.name == key,
            Query::SpecsQuery { include, exclude } => {
                let has = |name: &String| candidate.specs.iter().any(|s| &s.name == name);
                include.iter().all(|n| has(n)) && !exclude.iter().any(|n| has(n))
            }
            Query::StructureFamily { family } => candidate.kind == *family,
            Query::And { queries } => queries.iter().all(|q| q.matches(candidate)),
            Query::Or { queries } => queries.iter().any(|q| q.matches(candidate)),
            Query::Not { query } => !query.matches(candidate),
        }
    }
}
