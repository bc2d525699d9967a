//! Path addressing for the state tree.
//!
//! A [`PathAddress`] is an immutable, ordered list of segments naming a
//! location in the tree. The textual form separates segments with a dot;
//! segments that themselves contain a dot can only be built with
//! [`PathAddress::child`], which never re-splits its argument.
//!
//! ```ignore
//! let p1 = PathAddress::parse("pools.pool1")?;
//! let p2 = p1.child("space.free"); // three segments, the last contains a dot
//!
//! assert!(p1.is_parent_of(&p2));
//! assert_eq!(p2.to_text("/", 1), "pool1/space.free");
//! ```

use crate::error::{NamespaceError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Separator used by [`PathAddress::parse`] and the `Display` form.
pub const SEPARATOR: char = '.';

/// Location of a node in the state tree.
///
/// Cloning is cheap: the segment list is shared. Equality and ordering are
/// segment-by-segment; the hash is order-sensitive and cached after first use.
#[derive(Clone)]
pub struct PathAddress {
    segments: Arc<[String]>,
    hash: OnceLock<u64>,
}

impl PathAddress {
    /// Single-segment path. The segment is taken verbatim (no splitting)
    /// and must not be empty; use [`PathAddress::from_segments`] for
    /// untrusted input.
    pub fn new(segment: impl Into<String>) -> Self {
        let segment = segment.into();
        debug_assert!(!segment.is_empty(), "path segments must not be empty");
        Self::from_vec(vec![segment])
    }

    /// Parse dot-separated text. Empty text or empty segments are rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let segments: Vec<String> = text.split(SEPARATOR).map(str::to_string).collect();
        if text.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(NamespaceError::InvalidPath(text.to_string()));
        }
        Ok(Self::from_vec(segments))
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(NamespaceError::InvalidPath(format!("{:?}", segments)));
        }
        Ok(Self::from_vec(segments))
    }

    /// Parse a batch of path texts into a set.
    pub fn path_set<'a, I>(texts: I) -> Result<HashSet<PathAddress>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        texts.into_iter().map(PathAddress::parse).collect()
    }

    fn from_vec(segments: Vec<String>) -> Self {
        Self {
            segments: Arc::from(segments),
            hash: OnceLock::new(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false for paths built through the public constructors.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first_segment(&self) -> &str {
        &self.segments[0]
    }

    pub fn last_segment(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// A new path with one more trailing segment, taken verbatim.
    /// The segment must not be empty.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        debug_assert!(!segment.is_empty(), "path segments must not be empty");
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(segment);
        Self::from_vec(segments)
    }

    /// Concatenate another path onto this one.
    pub fn child_path(&self, sub_path: &PathAddress) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + sub_path.len());
        segments.extend(self.segments.iter().cloned());
        segments.extend(sub_path.segments.iter().cloned());
        Self::from_vec(segments)
    }

    /// The enclosing path, or `None` for a single-segment path.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self::from_vec(
            self.segments[..self.segments.len() - 1].to_vec(),
        ))
    }

    /// The same location seen from the first child: `a.b.c` becomes `b.c`.
    pub fn descend_into_child(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self::from_vec(self.segments[1..].to_vec()))
    }

    /// True if `other` is this path or lies anywhere beneath it.
    pub fn equals_or_has_child(&self, other: &PathAddress) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments[..] == other.segments[..self.segments.len()]
    }

    /// True if `other` is exactly one level beneath this path.
    pub fn is_parent_of(&self, other: &PathAddress) -> bool {
        other.segments.len() == self.segments.len() + 1 && self.equals_or_has_child(other)
    }

    /// True if the path has exactly one segment.
    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }

    /// Join segments from `skip` onward with `separator`.
    pub fn to_text(&self, separator: &str, skip: usize) -> String {
        self.segments
            .iter()
            .skip(skip)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Render relative to `prefix`, dropping as many leading segments as it has.
    pub fn to_text_relative(&self, prefix: &PathAddress) -> String {
        self.to_text(".", prefix.len())
    }

    fn identity_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.segments.hash(&mut hasher);
            hasher.finish()
        })
    }
}

impl PartialEq for PathAddress {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.segments, &other.segments) || self.segments == other.segments
    }
}

impl Eq for PathAddress {}

impl Hash for PathAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.identity_hash());
    }
}

impl PartialOrd for PathAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments.cmp(&other.segments)
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(".", 0))
    }
}

impl fmt::Debug for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathAddress({:?})", &self.segments[..])
    }
}

impl FromStr for PathAddress {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self> {
        PathAddress::parse(s)
    }
}

// Serialized as a segment list so dots inside segments survive.
impl Serialize for PathAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.segments.iter())
    }
}

impl<'de> Deserialize<'de> for PathAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let segments = Vec::<String>::deserialize(deserializer)?;
        PathAddress::from_segments(segments).map_err(D::Error::custom)
    }
}
