//! `application/x-gzip`: gzip over the kind's binary encoding.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use tree_common::{Payload, Structure, StructureKind};

use crate::binary::{ColumnarCodec, OctetStreamCodec};
use crate::codec::Codec;
use crate::error::{CodecError, CodecResult};
use crate::media::GZIP;

/// Compresses the octet-stream form of arrays and sparse arrays and the
/// columnar form of tables.
#[derive(Debug)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    fn inner(kind: StructureKind) -> &'static dyn Codec {
        match kind {
            StructureKind::Table => &ColumnarCodec,
            _ => &OctetStreamCodec,
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for GzipCodec {
    fn media_type(&self) -> &'static str {
        GZIP
    }

    fn kinds(&self) -> &'static [StructureKind] {
        &[StructureKind::Array, StructureKind::Table, StructureKind::Sparse]
    }

    fn encode(&self, payload: &Payload) -> CodecResult<Bytes> {
        let raw = Self::inner(payload.kind()).encode(payload)?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder
            .write_all(&raw)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        encoder
            .finish()
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8], structure: &Structure) -> CodecResult<Payload> {
        let mut raw = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut raw)
            .map_err(|e| CodecError::decode(GZIP, e.to_string()))?;
        Self::inner(structure.kind()).decode(&raw, structure)
    }
}
