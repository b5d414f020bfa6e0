//! Codec registry and format negotiation.
//!
//! Codecs are registered once at startup. For each structure kind the
//! candidates are the registered codecs supporting it, in registration
//! order; the first candidate is the kind's default and answers wildcards.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use tree_common::{Payload, StructureKind};

use crate::binary::{ColumnarCodec, OctetStreamCodec};
use crate::codec::Codec;
use crate::delimited::CsvCodec;
use crate::error::{CodecError, CodecResult};
use crate::json::JsonCodec;
use crate::media::{by_preference, resolve_format, MediaRange};

/// `codecs` section of the service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Media types or aliases to switch off.
    pub disabled: Vec<String>,
    /// Compression level for the gzip codec, 0-9.
    pub gzip_level: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            gzip_level: 6,
        }
    }
}

#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn Codec>>,
    disabled: Vec<String>,
}

impl CodecRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in codec compiled into this build.
    pub fn with_builtins() -> Self {
        Self::from_config(&CodecConfig::default())
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OctetStreamCodec));
        registry.register(Arc::new(ColumnarCodec));
        registry.register(Arc::new(JsonCodec));
        registry.register(Arc::new(CsvCodec));
        #[cfg(feature = "gzip")]
        registry.register(Arc::new(crate::gzip::GzipCodec::new(config.gzip_level)));

        for name in &config.disabled {
            // Unknown names cannot match a codec; keep them verbatim.
            let media_type = resolve_format(name).unwrap_or_else(|_| name.to_ascii_lowercase());
            registry.disabled.push(media_type);
        }
        registry
    }

    /// Add a codec. A codec with the same media type replaces the old one
    /// in place.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        match self
            .codecs
            .iter_mut()
            .find(|c| c.media_type() == codec.media_type())
        {
            Some(slot) => *slot = codec,
            None => self.codecs.push(codec),
        }
    }

    pub fn disable(&mut self, media_type: &str) {
        self.disabled.push(media_type.to_ascii_lowercase());
    }

    fn usable(&self, codec: &Arc<dyn Codec>) -> bool {
        codec.available() && !self.disabled.iter().any(|d| d == codec.media_type())
    }

    /// Usable codecs for a kind, default first.
    pub fn candidates(&self, kind: StructureKind) -> Vec<Arc<dyn Codec>> {
        self.codecs
            .iter()
            .filter(|c| c.supports(kind) && self.usable(c))
            .cloned()
            .collect()
    }

    /// Media types offered for a kind, default first.
    pub fn media_types(&self, kind: StructureKind) -> Vec<&'static str> {
        self.candidates(kind).iter().map(|c| c.media_type()).collect()
    }

    pub fn get(&self, media_type: &str) -> Option<Arc<dyn Codec>> {
        self.codecs
            .iter()
            .find(|c| c.media_type() == media_type && self.usable(c))
            .cloned()
    }

    /// Pick the codec for `kind` that best matches the client's preferences.
    ///
    /// Ranges are tried in descending quality, client order breaking ties.
    /// An exact range selects that codec; a wildcard selects the first
    /// candidate it covers. Ranges with `q=0` are skipped, and a media type
    /// explicitly given `q=0` is never chosen through a wildcard. An empty
    /// list means `*/*`.
    pub fn negotiate(&self, kind: StructureKind, accepted: &[MediaRange]) -> CodecResult<Arc<dyn Codec>> {
        self.select(kind, None, accepted)
    }

    /// Like [`CodecRegistry::negotiate`], for a payload of known output
    /// shape. Codecs that cannot encode that shape are passed over, so the
    /// next acceptable range gets its turn.
    pub fn negotiate_for_shape(
        &self,
        kind: StructureKind,
        shape: &[usize],
        accepted: &[MediaRange],
    ) -> CodecResult<Arc<dyn Codec>> {
        self.select(kind, Some(shape), accepted)
    }

    fn select(
        &self,
        kind: StructureKind,
        shape: Option<&[usize]>,
        accepted: &[MediaRange],
    ) -> CodecResult<Arc<dyn Codec>> {
        let candidates: Vec<Arc<dyn Codec>> = self
            .candidates(kind)
            .into_iter()
            .filter(|c| shape.map_or(true, |s| c.can_encode(kind, s)))
            .collect();
        let not_acceptable = || CodecError::NotAcceptable {
            kind,
            requested: accepted
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            available: candidates
                .iter()
                .map(|c| c.media_type())
                .collect::<Vec<_>>()
                .join(", "),
        };

        if accepted.is_empty() {
            return candidates.first().cloned().ok_or_else(not_acceptable);
        }

        let refused: Vec<&str> = accepted
            .iter()
            .filter(|r| r.quality <= 0.0 && !r.is_wildcard())
            .map(|r| r.media_type.as_str())
            .collect();

        for range in by_preference(accepted) {
            if range.quality <= 0.0 {
                break;
            }
            let found = candidates
                .iter()
                .find(|c| range.matches(c.media_type()) && !refused.contains(&c.media_type()));
            if let Some(codec) = found {
                debug!(kind = %kind, range = %range, media_type = codec.media_type(), "Negotiated codec");
                return Ok(codec.clone());
            }
        }

        Err(not_acceptable())
    }

    /// Encode `payload` with `codec`.
    pub fn serialize(&self, payload: &Payload, codec: &dyn Codec) -> CodecResult<Bytes> {
        if !codec.supports(payload.kind()) {
            return Err(CodecError::unencodable(
                codec.media_type(),
                format!("{} data is not supported", payload.kind()),
            ));
        }
        let started = Instant::now();
        let bytes = codec.encode(payload)?;
        metrics::histogram!("codec_encode_seconds", "media_type" => codec.media_type())
            .record(started.elapsed().as_secs_f64());
        metrics::counter!("codec_encoded_bytes_total", "media_type" => codec.media_type())
            .increment(bytes.len() as u64);
        Ok(bytes)
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field(
                "codecs",
                &self.codecs.iter().map(|c| c.media_type()).collect::<Vec<_>>(),
            )
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{parse_accept, COLUMNAR, CSV, JSON, OCTET_STREAM};
    use tree_common::Structure;

    struct Named(&'static str);

    impl Codec for Named {
        fn media_type(&self) -> &'static str {
            self.0
        }

        fn kinds(&self) -> &'static [StructureKind] {
            &[StructureKind::Sparse]
        }

        fn encode(&self, _payload: &Payload) -> CodecResult<Bytes> {
            Ok(Bytes::from_static(self.0.as_bytes()))
        }

        fn decode(&self, _bytes: &[u8], _structure: &Structure) -> CodecResult<Payload> {
            Err(CodecError::decode(self.0, "write-only"))
        }
    }

    fn fixture() -> CodecRegistry {
        let mut registry = CodecRegistry::new();
        registry.register(Arc::new(Named("application/x-fmta")));
        registry.register(Arc::new(Named("application/x-fmtc")));
        registry
    }

    #[test]
    fn test_highest_mutual_quality_wins() {
        let accepted = vec![
            MediaRange::new("application/x-fmta", 0.5),
            MediaRange::new("application/x-fmtb", 0.9),
        ];
        let codec = fixture().negotiate(StructureKind::Sparse, &accepted).unwrap();
        assert_eq!(codec.media_type(), "application/x-fmta");
    }

    #[test]
    fn test_no_overlap_is_not_acceptable() {
        let accepted = vec![MediaRange::new("application/x-fmtb", 0.9)];
        assert!(matches!(
            fixture().negotiate(StructureKind::Sparse, &accepted),
            Err(CodecError::NotAcceptable { .. })
        ));
    }

    #[test]
    fn test_defaults_per_kind() {
        let registry = CodecRegistry::with_builtins();
        let any = parse_accept("*/*");
        assert_eq!(
            registry.negotiate(StructureKind::Array, &any).unwrap().media_type(),
            OCTET_STREAM
        );
        assert_eq!(
            registry.negotiate(StructureKind::Table, &[]).unwrap().media_type(),
            COLUMNAR
        );
        assert!(registry.negotiate(StructureKind::Container, &any).is_err());
    }

    #[test]
    fn test_type_wildcard() {
        let registry = CodecRegistry::with_builtins();
        let codec = registry
            .negotiate(StructureKind::Table, &parse_accept("text/*"))
            .unwrap();
        assert_eq!(codec.media_type(), CSV);
        assert!(registry
            .negotiate(StructureKind::Sparse, &parse_accept("text/*"))
            .is_err());
    }

    #[test]
    fn test_zero_quality_refuses() {
        let registry = CodecRegistry::with_builtins();
        let codec = registry
            .negotiate(
                StructureKind::Array,
                &parse_accept("application/octet-stream;q=0, */*;q=0.1"),
            )
            .unwrap();
        assert_eq!(codec.media_type(), JSON);

        assert!(registry
            .negotiate(StructureKind::Array, &parse_accept("application/json;q=0"))
            .is_err());
    }

    #[test]
    fn test_ties_keep_client_order() {
        let registry = CodecRegistry::with_builtins();
        let codec = registry
            .negotiate(StructureKind::Array, &parse_accept("text/csv, application/json"))
            .unwrap();
        assert_eq!(codec.media_type(), CSV);
    }

    #[test]
    fn test_shape_the_codec_refuses_falls_through() {
        let registry = CodecRegistry::with_builtins();
        let accepted = parse_accept("text/csv, application/json;q=0.5");

        let codec = registry
            .negotiate_for_shape(StructureKind::Array, &[2, 2, 2], &accepted)
            .unwrap();
        assert_eq!(codec.media_type(), JSON);

        let codec = registry
            .negotiate_for_shape(StructureKind::Array, &[2, 2], &accepted)
            .unwrap();
        assert_eq!(codec.media_type(), CSV);

        assert!(matches!(
            registry.negotiate_for_shape(StructureKind::Array, &[2, 2, 2], &parse_accept("text/csv")),
            Err(CodecError::NotAcceptable { .. })
        ));
    }

    #[test]
    fn test_disabled_codecs_are_skipped() {
        let registry = CodecRegistry::from_config(&CodecConfig {
            disabled: vec!["csv".into()],
            ..CodecConfig::default()
        });
        assert!(!registry.media_types(StructureKind::Table).contains(&CSV));
        assert!(registry
            .negotiate(StructureKind::Table, &parse_accept("text/csv"))
            .is_err());
        assert!(registry.get(CSV).is_none());
    }

    #[test]
    fn test_register_replaces_same_media_type() {
        let mut registry = fixture();
        registry.register(Arc::new(Named("application/x-fmta")));
        assert_eq!(registry.media_types(StructureKind::Sparse).len(), 2);
    }

    #[test]
    fn test_serialize_checks_kind() {
        let registry = CodecRegistry::with_builtins();
        let table = tree_common::TableData::default();
        let codec = registry.get(OCTET_STREAM).unwrap();
        assert!(registry
            .serialize(&Payload::Table(table), codec.as_ref())
            .is_err());
    }
}
