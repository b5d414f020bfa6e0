//! Transport-agnostic request pipeline.
//!
//! [`DataService`] ties the tree, the access policy, the codec registry, the
//! slice engine and the result cache together behind three operations:
//! [`metadata`](DataService::metadata), [`data`](DataService::data) and
//! [`search`](DataService::search). The HTTP service is a thin binding over
//! it.

pub mod config;
pub mod service;

pub use config::BackendConfig;
pub use service::{DataResponse, DataService, ServiceBuilder};
