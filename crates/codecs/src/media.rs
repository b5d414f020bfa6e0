//! Accept header parsing and format aliases.
//!
//! Follows RFC 7231 closely enough for the formats served here: a comma
//! separated list of `type/subtype` ranges, each with an optional `q`
//! weight. Parameters other than `q` are ignored.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{CodecError, CodecResult};

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const JSON: &str = "application/json";
pub const CSV: &str = "text/csv";
pub const COLUMNAR: &str = "application/vnd.tree.columnar";
pub const GZIP: &str = "application/x-gzip";

/// One entry of an Accept list.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    /// Lowercased `type/subtype`; either part may be `*`.
    pub media_type: String,
    /// Preference weight in `[0, 1]`. Zero means "not acceptable".
    pub quality: f32,
}

impl MediaRange {
    pub fn new(media_type: impl Into<String>, quality: f32) -> Self {
        Self {
            media_type: media_type.into().trim().to_ascii_lowercase(),
            quality: quality.clamp(0.0, 1.0),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.media_type == "*/*" || self.media_type.ends_with("/*")
    }

    /// Whether this range covers `media_type`.
    pub fn matches(&self, media_type: &str) -> bool {
        if self.media_type == "*/*" {
            return true;
        }
        match self.media_type.strip_suffix('*') {
            Some(prefix) => media_type.starts_with(prefix),
            None => self.media_type == media_type,
        }
    }
}

impl fmt::Display for MediaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quality < 1.0 {
            write!(f, "{};q={}", self.media_type, self.quality)
        } else {
            write!(f, "{}", self.media_type)
        }
    }
}

/// Parse an Accept header value.
///
/// Malformed entries are skipped, and an unparseable `q` counts as 1.0.
/// A missing or empty header yields an empty list, which negotiation
/// treats as `*/*`.
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let media_type = parts.next()?.trim();
            if media_type.is_empty() || !media_type.contains('/') {
                return None;
            }

            let quality = parts
                .find_map(|p| {
                    let p = p.trim();
                    p.strip_prefix("q=")
                        .or_else(|| p.strip_prefix("Q="))
                        .and_then(|q| q.trim().parse::<f32>().ok())
                })
                .unwrap_or(1.0);

            Some(MediaRange::new(media_type, quality))
        })
        .collect()
}

/// Order ranges by descending quality, keeping client order among equals.
pub fn by_preference(ranges: &[MediaRange]) -> Vec<&MediaRange> {
    let mut sorted: Vec<&MediaRange> = ranges.iter().collect();
    sorted.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));
    sorted
}

/// Media type for a `format` query value: a full media type or a short alias.
pub fn resolve_format(format: &str) -> CodecResult<String> {
    let lowered = format.trim().to_ascii_lowercase();
    let media_type = match lowered.as_str() {
        "json" => JSON,
        "csv" => CSV,
        "octet-stream" | "bin" | "binary" => OCTET_STREAM,
        "gzip" | "gz" => GZIP,
        "columnar" => COLUMNAR,
        other if other.contains('/') && !other.starts_with('/') && !other.ends_with('/') => {
            return Ok(other.to_string())
        }
        _ => return Err(CodecError::UnknownFormat(format.to_string())),
    };
    Ok(media_type.to_string())
}

/// Accept list for a request: an explicit `format` wins over the header.
pub fn accepted_formats(format: Option<&str>, accept: Option<&str>) -> CodecResult<Vec<MediaRange>> {
    match format.map(str::trim).filter(|f| !f.is_empty()) {
        Some(format) => Ok(vec![MediaRange::new(resolve_format(format)?, 1.0)]),
        None => Ok(accept.map(parse_accept).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quality_values() {
        let ranges = parse_accept("text/csv;q=0.5, application/json , */*;q=0.1");
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], MediaRange::new("text/csv", 0.5));
        assert_eq!(ranges[1].quality, 1.0);
        assert!(ranges[2].is_wildcard());
    }

    #[test]
    fn test_parse_skips_garbage() {
        let ranges = parse_accept("garbage, , application/json;q=abc;charset=utf-8");
        assert_eq!(ranges, vec![MediaRange::new("application/json", 1.0)]);
        assert!(parse_accept("").is_empty());
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(parse_accept("text/csv;q=7")[0].quality, 1.0);
        assert_eq!(parse_accept("text/csv;q=-1")[0].quality, 0.0);
    }

    #[test]
    fn test_preference_is_stable() {
        let ranges = parse_accept("a/x;q=0.5, b/y;q=0.9, c/z;q=0.5");
        let order: Vec<&str> = by_preference(&ranges)
            .iter()
            .map(|r| r.media_type.as_str())
            .collect();
        assert_eq!(order, vec!["b/y", "a/x", "c/z"]);
    }

    #[test]
    fn test_wildcard_matching() {
        assert!(MediaRange::new("*/*", 1.0).matches(JSON));
        assert!(MediaRange::new("application/*", 1.0).matches(OCTET_STREAM));
        assert!(!MediaRange::new("text/*", 1.0).matches(JSON));
        assert!(MediaRange::new("Application/JSON", 1.0).matches(JSON));
    }

    #[test]
    fn test_format_aliases() {
        assert_eq!(resolve_format("json").unwrap(), JSON);
        assert_eq!(resolve_format("BIN").unwrap(), OCTET_STREAM);
        assert_eq!(resolve_format("text/csv").unwrap(), CSV);
        assert!(matches!(resolve_format("xml"), Err(CodecError::UnknownFormat(_))));
    }

    #[test]
    fn test_format_param_overrides_accept() {
        let ranges = accepted_formats(Some("csv"), Some("application/json")).unwrap();
        assert_eq!(ranges, vec![MediaRange::new(CSV, 1.0)]);

        let ranges = accepted_formats(Some(""), Some("application/json")).unwrap();
        assert_eq!(ranges, vec![MediaRange::new(JSON, 1.0)]);

        assert!(accepted_formats(None, None).unwrap().is_empty());
    }
}
