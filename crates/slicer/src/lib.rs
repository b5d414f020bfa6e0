//! Slice engine.
//!
//! Turns a client index expression into reads against an [`adapters::Adapter`]
//! and assembles a result whose shape equals exactly what the expression
//! selects.
//!
//! - [`selector`]: expression grammar, bounds checking, canonical form
//! - [`engine`]: block planning, parallel reads, assembly
//! - [`pool`]: process-wide bound on backend reads, with timeout and retry

pub mod engine;
pub mod pool;
pub mod selector;

pub use engine::{plan_blocks, SliceEngine};
pub use pool::{BackendPool, PoolConfig};
pub use selector::{DimSelector, Resolved, ResolvedSlice, SliceParseError, SliceSpec};
