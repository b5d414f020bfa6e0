use std::fmt;

use tree_common::{ContentVersion, NodePath};

/// Identity of one serialized result.
///
/// `slice` must already be canonical so that equivalent expressions share
/// an entry; `format` is the negotiated media type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: NodePath,
    pub version: ContentVersion,
    pub slice: String,
    pub format: String,
}

/// The part of a key that selects an index slot. The version is checked
/// against the slot, not used to find it, so a new version displaces the
/// old entry instead of sitting beside it.
pub(crate) type SlotKey = (NodePath, String, String);

impl CacheKey {
    pub fn new(
        path: NodePath,
        version: ContentVersion,
        slice: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            path,
            version,
            slice: slice.into(),
            format: format.into(),
        }
    }

    pub(crate) fn slot(&self) -> SlotKey {
        (self.path.clone(), self.slice.clone(), self.format.clone())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}[{}] as {}",
            self.path, self.version, self.slice, self.format
        )
    }
}
