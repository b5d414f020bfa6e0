//! Wire codecs for slice results and format negotiation.
//!
//! | Media type                       | Array | Table | Sparse |
//! |----------------------------------|-------|-------|--------|
//! | `application/octet-stream`       | yes   |       | yes    |
//! | `application/vnd.tree.columnar`  |       | yes   |        |
//! | `application/json`               | yes   | yes   | yes    |
//! | `text/csv`                       | <=2-D | yes   |        |
//! | `application/x-gzip` (`gzip`)    | yes   | yes   | yes    |
//!
//! The first codec listed for a kind is its default.

pub mod binary;
pub mod codec;
pub mod delimited;
pub mod error;
#[cfg(feature = "gzip")]
pub mod gzip;
pub mod json;
pub mod media;
pub mod registry;

pub use binary::{ColumnarCodec, OctetStreamCodec};
pub use codec::{describe, Codec};
pub use delimited::CsvCodec;
pub use error::{CodecError, CodecResult};
#[cfg(feature = "gzip")]
pub use gzip::GzipCodec;
pub use json::JsonCodec;
pub use media::{accepted_formats, parse_accept, resolve_format, MediaRange};
pub use registry::{CodecConfig, CodecRegistry};
