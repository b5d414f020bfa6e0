//! Result cache for serialized slice responses.
//!
//! [`ResultCache::get_or_compute`] is the only way in: callers pass the
//! [`CacheKey`] observed for the request (including the node's current
//! content version) and a closure producing the bytes. Version changes
//! invalidate implicitly; there is no explicit invalidation call.

pub mod cache;
pub mod key;

pub use cache::{CacheConfig, CacheLookup, CacheStats, CacheStatus, ResultCache};
pub use key::CacheKey;
