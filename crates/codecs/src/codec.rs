use bytes::Bytes;

use tree_common::{
    ArrayStructure, ColumnDescriptor, Payload, SparseStructure, Structure, StructureKind,
    TableStructure,
};

use crate::error::CodecResult;

/// A wire encoding for one or more structure kinds.
///
/// Encoding must be deterministic: the same payload always yields the same
/// bytes, since encoded results are cached by media type.
pub trait Codec: Send + Sync {
    /// Media type written to `Content-Type`.
    fn media_type(&self) -> &'static str;

    /// Structure kinds this codec can encode.
    fn kinds(&self) -> &'static [StructureKind];

    fn supports(&self, kind: StructureKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Whether a payload of this kind and shape can be encoded. Negotiation
    /// passes over codecs that would refuse it.
    fn can_encode(&self, kind: StructureKind, _shape: &[usize]) -> bool {
        self.supports(kind)
    }

    /// Whether the codec can currently be used. Unavailable codecs are
    /// skipped by negotiation.
    fn available(&self) -> bool {
        true
    }

    fn encode(&self, payload: &Payload) -> CodecResult<Bytes>;

    /// Inverse of [`Codec::encode`]. `structure` describes the encoded payload
    /// (see [`describe`]), not the node it was sliced from.
    fn decode(&self, bytes: &[u8], structure: &Structure) -> CodecResult<Payload>;
}

/// Structure of a payload, as a decoder needs it.
pub fn describe(payload: &Payload) -> Structure {
    match payload {
        Payload::Array(a) => Structure::Array(ArrayStructure::unchunked(a.shape.clone(), a.dtype)),
        Payload::Table(t) => Structure::Table(TableStructure {
            columns: t
                .columns
                .iter()
                .map(|c| ColumnDescriptor::new(c.name.clone(), c.values.dtype()))
                .collect(),
            row_count: t.row_count(),
            partitions: Vec::new(),
        }),
        Payload::Sparse(s) => Structure::Sparse(SparseStructure::coo(s.shape.clone(), s.dtype)),
    }
}
