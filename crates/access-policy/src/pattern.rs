//! Path prefix patterns for policy rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tree_common::NodePath;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid path pattern '{pattern}': {reason}")]
pub struct PatternError {
    pub pattern: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one segment.
    Any,
    /// `**`: any remainder, including none. Only valid last.
    Rest,
}

/// A prefix pattern over node paths.
///
/// `samples/*/raw` matches `samples/run42/raw` and everything below it.
/// The empty pattern (`/`) matches every path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "*" => Segment::Any,
                "**" if i + 1 == parts.len() => Segment::Rest,
                "**" => {
                    return Err(PatternError {
                        pattern: pattern.to_string(),
                        reason: "'**' may only appear last".into(),
                    })
                }
                literal if literal.contains('*') => {
                    return Err(PatternError {
                        pattern: pattern.to_string(),
                        reason: format!("segment '{}' mixes '*' with text", literal),
                    })
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    /// The pattern matching every path.
    pub fn everything() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn matches(&self, path: &NodePath) -> bool {
        let segments = path.segments();
        for (i, pattern) in self.segments.iter().enumerate() {
            match pattern {
                Segment::Rest => return true,
                Segment::Any => {
                    if i >= segments.len() {
                        return false;
                    }
                }
                Segment::Literal(literal) => {
                    if segments.get(i) != Some(literal) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Ordering key: literal segments first, then total pattern length.
    pub fn specificity(&self) -> (usize, usize) {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        (literals, self.segments.len())
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            let text = match segment {
                Segment::Literal(s) => s.as_str(),
                Segment::Any => "*",
                Segment::Rest => "**",
            };
            write!(f, "/{}", text)?;
        }
        Ok(())
    }
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathPattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PathPattern> for String {
    fn from(value: PathPattern) -> Self {
        value.to_string()
    }
}
