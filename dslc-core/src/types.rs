//! Domain types shared by the reconciliation engine and the CLI.
//!
//! Relative paths always use `/` as separator, whatever the host platform.
//! They are converted to native paths only at the filesystem boundary via
//! [`RelativePath::to_native`].

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PathError;

const SEPARATOR: char = '/';

// ---------------------------------------------------------------------------
// RelativePath
// ---------------------------------------------------------------------------

/// A cleaned path relative to an output root.
///
/// Construction strips leading separators, collapses repeated separators,
/// drops `.` segments and rejects `..`. Ordering is lexicographic over the
/// canonical string, which is the tie-break order used when pairing moves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Clean and validate a raw generated file name.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        for segment in raw.split(SEPARATOR) {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(PathError::EscapesRoot {
                        path: raw.to_string(),
                    })
                }
                s if s.contains('\\') || s.contains('\0') => {
                    return Err(PathError::InvalidSegment {
                        path: raw.to_string(),
                        segment: s.to_string(),
                    })
                }
                s => segments.push(s),
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    /// Build from a native path already known to live under a root
    /// (e.g. a `strip_prefix` result while walking the output tree).
    ///
    /// Each native component becomes one segment verbatim, so an on-disk name
    /// that [`parse`](Self::parse) would refuse (a `\` on unix) is still
    /// addressable. Names that are not valid UTF-8 are rejected.
    pub fn from_native(path: &Path) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(s) => match s.to_str() {
                    Some(s) => segments.push(s),
                    None => {
                        return Err(PathError::NotUtf8 {
                            path: path.display().to_string(),
                        })
                    }
                },
                Component::CurDir => {}
                _ => {
                    return Err(PathError::EscapesRoot {
                        path: path.display().to_string(),
                    })
                }
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Last segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or(&self.0)
    }

    /// Parent directory, or `None` for a top-level entry.
    pub fn parent(&self) -> Option<RelativePath> {
        self.0
            .rfind(SEPARATOR)
            .map(|idx| RelativePath(self.0[..idx].to_string()))
    }

    /// Every parent directory, nearest first.
    pub fn ancestors(&self) -> Vec<RelativePath> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(dir) = current {
            current = dir.parent();
            out.push(dir);
        }
        out
    }

    /// `true` when `self` is `other` or lies underneath it.
    pub fn is_within(&self, other: &RelativePath) -> bool {
        self.0 == other.0
            || (self.0.len() > other.0.len()
                && self.0.starts_with(&other.0)
                && self.0.as_bytes()[other.0.len()] == b'/')
    }

    /// Same path with `suffix` appended to the final segment.
    pub fn with_suffix(&self, suffix: &str) -> RelativePath {
        RelativePath(format!("{}{suffix}", self.0))
    }

    /// Number of segments; used to order directory pruning deepest first.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Native path under `root`.
    pub fn to_native(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.segments() {
            path.push(segment);
        }
        path
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for RelativePath {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<RelativePath> for String {
    fn from(p: RelativePath) -> Self {
        p.0
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// FileEntry
// ---------------------------------------------------------------------------

/// One file of a tree: where it lives and its raw bytes.
///
/// Content is opaque; nothing downstream normalizes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: RelativePath,
    pub content: Vec<u8>,
}

impl FileEntry {
    pub fn new(path: RelativePath, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rp(s: &str) -> RelativePath {
        RelativePath::parse(s).unwrap()
    }

    #[test]
    fn strips_leading_and_double_slashes() {
        assert_eq!(rp("/src//model/User.java").as_str(), "src/model/User.java");
        assert_eq!(rp("//a").as_str(), "a");
        assert_eq!(rp("./a/./b/").as_str(), "a/b");
    }

    #[test]
    fn rejects_parent_segments() {
        let err = RelativePath::parse("a/../../etc/passwd").unwrap_err();
        assert!(matches!(err, PathError::EscapesRoot { .. }));
        assert!(RelativePath::parse("..").is_err());
    }

    #[test]
    fn rejects_empty_and_backslash() {
        assert_eq!(RelativePath::parse("//").unwrap_err(), PathError::Empty);
        assert!(matches!(
            RelativePath::parse("a\\..\\b").unwrap_err(),
            PathError::InvalidSegment { .. }
        ));
    }

    #[test]
    fn parent_and_ancestors() {
        let p = rp("sub/dir/file.txt");
        assert_eq!(p.parent(), Some(rp("sub/dir")));
        assert_eq!(p.ancestors(), vec![rp("sub/dir"), rp("sub")]);
        assert_eq!(rp("top.txt").parent(), None);
        assert_eq!(p.file_name(), "file.txt");
        assert_eq!(p.depth(), 3);
    }

    #[test]
    fn is_within_respects_segment_boundaries() {
        assert!(rp("a/b").is_within(&rp("a")));
        assert!(rp("a").is_within(&rp("a")));
        assert!(!rp("ab/c").is_within(&rp("a")));
        assert!(!rp("a").is_within(&rp("a/b")));
    }

    #[test]
    fn from_native_rejects_absolute() {
        assert!(RelativePath::from_native(Path::new("/etc/passwd")).is_err());
        let p = RelativePath::from_native(&Path::new("a").join("b.txt")).unwrap();
        assert_eq!(p.as_str(), "a/b.txt");
    }

    #[cfg(unix)]
    #[test]
    fn from_native_keeps_backslash_names_verbatim() {
        let p = RelativePath::from_native(&Path::new("dir").join("a\\b.txt")).unwrap();
        assert_eq!(p.as_str(), "dir/a\\b.txt");
        assert_eq!(p.file_name(), "a\\b.txt");
        assert_eq!(p.to_native(Path::new("/out")), Path::new("/out/dir/a\\b.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn from_native_rejects_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let name = Path::new("dir").join(OsStr::from_bytes(b"stale\xff.txt"));
        let err = RelativePath::from_native(&name).unwrap_err();
        assert!(matches!(err, PathError::NotUtf8 { .. }), "{err}");
    }

    #[test]
    fn serde_goes_through_parse() {
        let p: RelativePath = serde_yaml::from_str("\"/x//y\"").unwrap();
        assert_eq!(p.as_str(), "x/y");
        assert!(serde_yaml::from_str::<RelativePath>("\"../x\"").is_err());
    }
}
