//! Paths into canonical values
//!
//! This module defines:
//! - PathSegment: a single key or index step
//! - JsonPath: a location inside a property value (e.g. `devices.mouse`
//!   or `purchases[0].at`)
//! - PathPattern: a path with `*` wildcards, used by schema hints
//!
//! Change sets, hydration errors and document-store path updates all
//! address locations with [`JsonPath`]. The first segment of an
//! entity-level path is always the property name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::limits::LimitError;

/// Error type for path parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathParseError {
    /// Empty key in path
    #[error("empty key in path at position {0}")]
    EmptyKey(usize),
    /// Unclosed bracket
    #[error("unclosed bracket starting at position {0}")]
    UnclosedBracket(usize),
    /// Invalid array index
    #[error("invalid array index at position {0}: {1}")]
    InvalidIndex(usize, String),
    /// Unexpected character
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
}

/// A segment in a path
///
/// # Examples
///
/// ```
/// use strata_core::PathSegment;
///
/// let key = PathSegment::Key("mouse".to_string());
/// let idx = PathSegment::Index(0);
/// assert_ne!(key, idx);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object key: `.foo`
    Key(String),
    /// Array index: `[0]`
    Index(usize),
}

impl PathSegment {
    /// Get the key if this is a key segment
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(k) => Some(k),
            PathSegment::Index(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, ".{}", k),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A path into a canonical value
///
/// | Syntax | Meaning | Example |
/// |--------|---------|---------|
/// | `key` | Object property | `devices` |
/// | `[n]` | Array index | `[0]` |
/// | `a.b` | Nested property | `devices.mouse` |
/// | `a[n].b` | Property, index, property | `purchases[0].at` |
/// | (empty) | Root | `` |
///
/// # Examples
///
/// ```
/// use strata_core::JsonPath;
///
/// let mouse = JsonPath::root().key("devices").key("mouse");
/// let parsed: JsonPath = "devices.mouse".parse().unwrap();
/// assert_eq!(parsed, mouse);
///
/// let devices = JsonPath::root().key("devices");
/// assert!(devices.is_ancestor_of(&mouse));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    /// Create the root path (empty path)
    pub fn root() -> Self {
        JsonPath {
            segments: Vec::new(),
        }
    }

    /// Create a path from a vector of segments
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        JsonPath { segments }
    }

    /// Path consisting of a single property name
    pub fn property(name: impl Into<String>) -> Self {
        JsonPath::root().key(name)
    }

    /// Get the path segments
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Get the number of segments in the path
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if this is the root path (empty)
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check if this is the root path
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a key segment (builder pattern)
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Key(key.into()));
        self
    }

    /// Append an index segment (builder pattern)
    pub fn index(mut self, idx: usize) -> Self {
        self.segments.push(PathSegment::Index(idx));
        self
    }

    /// Push a key segment (mutating)
    pub fn push_key(&mut self, key: impl Into<String>) {
        self.segments.push(PathSegment::Key(key.into()));
    }

    /// Push an index segment (mutating)
    pub fn push_index(&mut self, idx: usize) {
        self.segments.push(PathSegment::Index(idx));
    }

    /// Remove and return the last segment
    pub fn pop(&mut self) -> Option<PathSegment> {
        self.segments.pop()
    }

    /// Get the parent path (None if root)
    pub fn parent(&self) -> Option<JsonPath> {
        if self.segments.is_empty() {
            None
        } else {
            let mut parent = self.clone();
            parent.segments.pop();
            Some(parent)
        }
    }

    /// Get the first segment (None if root)
    pub fn first_segment(&self) -> Option<&PathSegment> {
        self.segments.first()
    }

    /// Get the last segment (None if root)
    pub fn last_segment(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// The property an entity-level path starts at
    pub fn property_name(&self) -> Option<&str> {
        self.first_segment().and_then(PathSegment::as_key)
    }

    /// Segments after the first `n`
    pub fn suffix(&self, n: usize) -> &[PathSegment] {
        self.segments.get(n..).unwrap_or(&[])
    }

    /// Check if this path is an ancestor of another (or equal)
    pub fn is_ancestor_of(&self, other: &JsonPath) -> bool {
        if self.segments.len() > other.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a == b)
    }

    /// Check if this path is a descendant of another (or equal)
    pub fn is_descendant_of(&self, other: &JsonPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// Check if two paths overlap (one is ancestor/descendant of the other)
    pub fn overlaps(&self, other: &JsonPath) -> bool {
        self.is_ancestor_of(other) || self.is_descendant_of(other)
    }

    /// Validate path length against `max_len` segments
    pub fn validate(&self, max_len: usize) -> Result<(), LimitError> {
        let length = self.segments.len();
        if length > max_len {
            Err(LimitError::PathTooLong {
                length,
                max: max_len,
            })
        } else {
            Ok(())
        }
    }

    /// Convert to a string representation
    pub fn to_path_string(&self) -> String {
        let mut result = String::new();
        for seg in &self.segments {
            match seg {
                PathSegment::Key(k) => {
                    if !result.is_empty() {
                        result.push('.');
                    }
                    result.push_str(k);
                }
                PathSegment::Index(i) => {
                    result.push('[');
                    result.push_str(&i.to_string());
                    result.push(']');
                }
            }
        }
        result
    }
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '$'
}

impl FromStr for JsonPath {
    type Err = PathParseError;

    /// Parse a path from a string
    ///
    /// Supported syntax:
    /// - `foo` or `.foo` - object key
    /// - `[0]` - array index
    /// - `foo.bar` - nested keys
    /// - `foo[0].bar` - mixed
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = parse_segments(s, false)?
            .into_iter()
            .map(|seg| match seg {
                PatternSegment::Key(k) => PathSegment::Key(k),
                PatternSegment::Index(i) => PathSegment::Index(i),
                // wildcards are rejected when `allow_wildcard` is false
                PatternSegment::Any => PathSegment::Key("*".to_string()),
            })
            .collect();
        Ok(JsonPath { segments })
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            write!(f, "$")
        } else {
            write!(f, "{}", self.to_path_string())
        }
    }
}

impl From<PathSegment> for JsonPath {
    fn from(segment: PathSegment) -> Self {
        JsonPath::from_segments(vec![segment])
    }
}

// =============================================================================
// PathPattern
// =============================================================================

/// A segment of a [`PathPattern`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternSegment {
    /// Exact object key
    Key(String),
    /// Exact array index
    Index(usize),
    /// Any key or index (`*` or `[*]`)
    Any,
}

/// A path with wildcards, matched against concrete [`JsonPath`] suffixes
///
/// ```
/// use strata_core::{JsonPath, PathPattern};
///
/// let pattern: PathPattern = "purchases[*].at".parse().unwrap();
/// let path: JsonPath = "purchases[3].at".parse().unwrap();
/// assert!(pattern.matches(path.segments()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    segments: Vec<PatternSegment>,
}

impl PathPattern {
    /// Pattern segments
    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    /// Check whether the pattern matches the given segments exactly
    pub fn matches(&self, path: &[PathSegment]) -> bool {
        self.segments.len() == path.len()
            && self
                .segments
                .iter()
                .zip(path.iter())
                .all(|(pattern, segment)| match (pattern, segment) {
                    (PatternSegment::Any, _) => true,
                    (PatternSegment::Key(a), PathSegment::Key(b)) => a == b,
                    (PatternSegment::Index(a), PathSegment::Index(b)) => a == b,
                    _ => false,
                })
    }
}

impl FromStr for PathPattern {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PathPattern {
            segments: parse_segments(s, true)?,
        })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                PatternSegment::Key(k) if i == 0 => write!(f, "{}", k)?,
                PatternSegment::Key(k) => write!(f, ".{}", k)?,
                PatternSegment::Index(idx) => write!(f, "[{}]", idx)?,
                PatternSegment::Any => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

fn parse_segments(s: &str, allow_wildcard: bool) -> Result<Vec<PatternSegment>, PathParseError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;

    // Skip leading dot if present
    if chars[i] == '.' {
        i += 1;
    }

    while i < chars.len() {
        if chars[i] == '.' {
            i += 1;
            if i >= chars.len() {
                return Err(PathParseError::EmptyKey(i));
            }
        }

        if chars[i] == '[' {
            let start = i;
            i += 1;
            let idx_start = i;
            while i < chars.len() && chars[i] != ']' {
                i += 1;
            }
            if i >= chars.len() {
                return Err(PathParseError::UnclosedBracket(start));
            }

            let idx_str: String = chars[idx_start..i].iter().collect();
            if allow_wildcard && idx_str == "*" {
                segments.push(PatternSegment::Any);
            } else {
                let idx = idx_str
                    .parse::<usize>()
                    .map_err(|_| PathParseError::InvalidIndex(idx_start, idx_str))?;
                segments.push(PatternSegment::Index(idx));
            }
            i += 1; // Skip closing bracket
        } else if allow_wildcard && chars[i] == '*' {
            segments.push(PatternSegment::Any);
            i += 1;
        } else if is_key_char(chars[i]) {
            let key_start = i;
            while i < chars.len() && is_key_char(chars[i]) {
                i += 1;
            }
            let key: String = chars[key_start..i].iter().collect();
            segments.push(PatternSegment::Key(key));
        } else {
            return Err(PathParseError::UnexpectedChar(chars[i], i));
        }
    }

    Ok(segments)
}
