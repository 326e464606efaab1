//! Dot-separated key paths, held as parsed segments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("empty segment at position {position} in '{path}'")]
    EmptySegment { position: usize, path: String },
    #[error("cannot descend into a non-container value at '{0}'")]
    NotAContainer(String),
    #[error("array index {index} out of bounds at '{path}'")]
    IndexOutOfBounds { index: usize, path: String },
}

/// A parsed key path such as `scale.entity.Alice.currentScale`.
///
/// Segments are never empty. Numeric segments index into arrays when the
/// tree walker meets one; otherwise every segment is an object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parse a dotted path. Surrounding whitespace on each segment is ignored.
    pub fn parse(input: &str) -> Result<KeyPath, PathError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        for (position, raw) in trimmed.split('.').enumerate() {
            let segment = raw.trim();
            if segment.is_empty() {
                return Err(PathError::EmptySegment {
                    position,
                    path: trimmed.to_string(),
                });
            }
            segments.push(segment.to_string());
        }

        Ok(KeyPath { segments })
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<KeyPath, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        if let Some(position) = segments.iter().position(|s| s.trim().is_empty()) {
            return Err(PathError::EmptySegment {
                position,
                path: segments.join("."),
            });
        }
        Ok(KeyPath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> &str {
        // Non-empty by construction.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Returns a new path with `segment` appended.
    pub fn join(&self, segment: &str) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        KeyPath { segments }
    }

    /// Returns the path without its last segment, if any remain.
    pub fn parent(&self) -> Option<KeyPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(KeyPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True when `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &KeyPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// The segments after `prefix`, or `None` if `prefix` does not match.
    pub fn strip_prefix(&self, prefix: &KeyPath) -> Option<&[String]> {
        if self.starts_with(prefix) {
            Some(&self.segments[prefix.segments.len()..])
        } else {
            None
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for KeyPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyPath::parse(s)
    }
}

impl TryFrom<String> for KeyPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        KeyPath::parse(&value)
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> String {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_path() {
        let path = KeyPath::parse("scale.entity.Alice.currentScale").unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.segments()[2], "Alice");
        assert_eq!(path.last(), "currentScale");
        assert_eq!(path.to_string(), "scale.entity.Alice.currentScale");
    }

    #[test]
    fn parse_trims_segments() {
        let path = KeyPath::parse("  scale . entity ").unwrap();
        assert_eq!(path.segments(), &["scale".to_string(), "entity".to_string()]);
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert_eq!(KeyPath::parse("   "), Err(PathError::Empty));
    }

    #[test]
    fn parse_rejects_empty_segment() {
        assert!(matches!(
            KeyPath::parse("scale..entity"),
            Err(PathError::EmptySegment { position: 1, .. })
        ));
        assert!(KeyPath::parse("scale.").is_err());
    }

    #[test]
    fn prefix_helpers() {
        let root = KeyPath::parse("scale").unwrap();
        let path = KeyPath::parse("scale.scenario.density").unwrap();
        assert!(path.starts_with(&root));
        assert!(!root.starts_with(&path));
        assert_eq!(
            path.strip_prefix(&root).unwrap(),
            &["scenario".to_string(), "density".to_string()]
        );
        assert_eq!(path.parent().unwrap().to_string(), "scale.scenario");
        assert_eq!(root.join("meta").to_string(), "scale.meta");
        assert!(root.parent().is_none());
    }

    #[test]
    fn serde_as_string() {
        let path = KeyPath::parse("a.b").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"a.b\"");
        let back: KeyPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<KeyPath>("\"a..b\"").is_err());
    }
}
