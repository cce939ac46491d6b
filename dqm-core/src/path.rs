//! Canonical, hierarchical paths used to address directories and monitor
//! elements in a [`crate::storage::Storage`].
//!
//! Unlike `std::path::Path`, these paths are always `/`-separated regardless
//! of platform, always relative-or-absolute by an explicit flag rather than
//! by sniffing a drive prefix, and normalize eagerly: `.` is dropped, and
//! `..` pops the previous segment rather than ever being allowed to encode
//! an escape above the root.

use std::fmt::{self, Display};

/// A single non-empty path segment.
///
/// Segments must not be empty, must not contain `/`, and must not contain a
/// NUL byte. `.` and `..` never appear in a normalized segment list — they
/// are consumed during [`Path::parse`].
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PathSegment(String);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("path segment is empty")]
    Empty,
    #[error("path segment {0:?} contains a NUL byte")]
    ContainsNul(String),
    #[error("path segment {0:?} contains a slash")]
    ContainsSlash(String),
}

impl PathSegment {
    pub fn new(s: impl Into<String>) -> Result<Self, SegmentError> {
        let s = s.into();
        if s.is_empty() {
            return Err(SegmentError::Empty);
        }
        if s.contains('\0') {
            return Err(SegmentError::ContainsNul(s));
        }
        if s.contains('/') {
            return Err(SegmentError::ContainsSlash(s));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl AsRef<str> for PathSegment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A canonicalized, normalized sequence of [`PathSegment`]s plus a flag
/// recording whether the path is relative (to some cursor) or absolute
/// (from the storage root).
///
/// Two paths are equal iff their normalized segment sequences and
/// relativity both match.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct Path {
    segments: Vec<PathSegment>,
    relative: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("invalid path segment: {0}")]
    Segment(#[from] SegmentError),
    #[error("'..' has no parent to pop at the root")]
    EscapesRoot,
}

impl Path {
    /// The empty, absolute root path.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
            relative: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty() && !self.relative
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Parses and normalizes a path string.
    ///
    /// Splits on `/`, drops empty components (so repeated slashes collapse)
    /// and `.` components, and pops the previous segment on `..`. A `..`
    /// that would pop past the start of the (already-normalized) sequence
    /// fails construction rather than silently escaping above the root —
    /// this applies uniformly to relative and absolute paths, since a
    /// relative path is always resolved against some existing cursor and
    /// must never underflow it either.
    ///
    /// An entirely empty string is rejected; use [`Path::root`] to construct
    /// the root explicitly.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }

        let relative = !s.starts_with('/');
        let mut segments: Vec<PathSegment> = Vec::new();

        for raw in s.split('/') {
            match raw {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(PathError::EscapesRoot);
                    }
                }
                name => segments.push(PathSegment::new(name)?),
            }
        }

        Ok(Self { segments, relative })
    }

    /// Returns the path with its final segment removed, or `None` at the
    /// root.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            return None;
        }
        let mut p = self.clone();
        p.segments.pop();
        Some(p)
    }

    /// Returns the final segment, if any.
    pub fn file_name(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Returns a new path with `segment` appended.
    pub fn join(&self, segment: &PathSegment) -> Path {
        let mut p = self.clone();
        p.segments.push(segment.clone());
        p
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.relative {
            write!(f, "/")?;
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/a/b/c", "/a/b/c", false)]
    #[case("a/b", "a/b", true)]
    #[case("/a//b", "/a/b", false)]
    #[case("/a/./b", "/a/b", false)]
    #[case("/a/b/..", "/a", false)]
    #[case("/a/b/../c", "/a/c", false)]
    fn parse_and_display(#[case] input: &str, #[case] expected: &str, #[case] relative: bool) {
        let p = Path::parse(input).expect("must parse");
        assert_eq!(p.is_relative(), relative);
        assert_eq!(p.to_string(), expected);
    }

    #[test]
    fn empty_is_rejected() {
        assert_eq!(Path::parse(""), Err(PathError::Empty));
    }

    #[test]
    fn dotdot_beyond_root_fails_construction() {
        assert_eq!(Path::parse("/.."), Err(PathError::EscapesRoot));
        assert_eq!(Path::parse(".."), Err(PathError::EscapesRoot));
        assert_eq!(Path::parse("a/../.."), Err(PathError::EscapesRoot));
    }

    #[test]
    fn equality_is_normalized() {
        assert_eq!(
            Path::parse("/a/b/../c").unwrap(),
            Path::parse("/a/c").unwrap()
        );
        // Same segments, different relativity: not equal.
        assert_ne!(Path::parse("a/c").unwrap(), Path::parse("/a/c").unwrap());
    }

    #[test]
    fn root_has_no_parent() {
        assert_eq!(Path::root().parent(), None);
    }

    #[test]
    fn parent_and_file_name() {
        let p = Path::parse("/a/b/c").unwrap();
        assert_eq!(p.parent().unwrap().to_string(), "/a/b");
        assert_eq!(p.file_name().unwrap().as_str(), "c");
    }
}
