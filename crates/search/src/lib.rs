//! Search/Query engine.
//!
//! A [`Query`] is a predicate over node metadata, specs, names and kinds.
//! [`walk`] evaluates it lazily over a subtree, breadth first, touching only
//! metadata and structure; [`search`] wraps the walk with validation and
//! offset/limit pagination.

pub mod query;
pub mod walk;

pub use query::{Candidate, CompareOp, Query, QueryError};
pub use walk::{
    search, walk, NodeSummary, Redactor, SearchPage, SearchRequest, SearchView, Visibility,
    DEFAULT_LIMIT, MAX_LIMIT,
};
