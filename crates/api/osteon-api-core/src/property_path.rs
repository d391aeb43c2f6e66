//! PropertyPath parsing and formatting.
//!
//! Grammar: `segment(.segment)*`
//! - every segment is non-empty and free of whitespace
//! - the final segment is the mutable leaf, the ones before it walk nested
//!   objects on the target
//!
//! Examples:
//!   "position.x" -> parents=["position"], leaf="x"
//!   "Spine.matrix" -> parents=["Spine"], leaf="matrix"
//!   "visibility" -> parents=[], leaf="visibility"
//!
//! Paths are parsed once when an animation is bound to a target; targets turn
//! them into opaque handles so nothing is re-parsed per frame.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::ValueError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<String>,
}

impl PropertyPath {
    /// Parse a dotted path string.
    pub fn parse(s: &str) -> Result<Self, ValueError> {
        let invalid = |reason: &str| ValueError::InvalidPath {
            path: s.to_string(),
            reason: reason.to_string(),
        };
        if s.is_empty() {
            return Err(invalid("empty path"));
        }
        let segments: Vec<String> = s.split('.').map(str::to_string).collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(invalid("empty segment"));
        }
        if segments
            .iter()
            .any(|seg| seg.chars().any(char::is_whitespace))
        {
            return Err(invalid("segment contains whitespace"));
        }
        Ok(Self { segments })
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, ValueError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let joined: Vec<String> = segments.into_iter().map(Into::into).collect();
        Self::parse(&joined.join("."))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segments walked before reaching the leaf.
    pub fn parents(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// Final (mutable) property name.
    pub fn leaf(&self) -> &str {
        // Non-empty by construction.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn first(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path without its first segment, if anything remains.
    pub fn tail(&self) -> Option<PropertyPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[1..].to_vec(),
        })
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for PropertyPath {
    type Err = ValueError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyPath::parse(s)
    }
}

impl Serialize for PropertyPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D>(deserializer: D) -> Result<PropertyPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PropertyPath::parse(&s).map_err(de::Error::custom)
    }
}
