// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Hierarchical locations in the remote tree.
//!
//! A [`Path`] is a key plus a link to its parent. Paths are immutable and cheap to clone: every
//! clone shares the same chain of parents through an [`Arc`], and there are no back-pointers from
//! parents to children, so a chain can never form a cycle.
//!
//! A path is *rooted* if following its parent links ends at the root sentinel returned by
//! [`Path::root`]. Only rooted paths can be written through a
//! [`Transaction`](crate::transaction::Transaction). Paths built from [`Path::detached`] are
//! handy for describing relative locations before they are attached to the tree.
//!
//! Two paths are equal if their string forms are equal; object identity never matters. This
//! means paths can be used freely as map keys.
//!
//! ```
//! use treesync::Path;
//!
//! let name = Path::root().child("users").child("1").child("name");
//! assert_eq!(name.to_string(), "/users/1/name");
//! assert_eq!(name, Path::parse("/users/1/name"));
//! assert_eq!(name.ancestor(2), Some(Path::parse("/users")));
//! assert!(name.has_ancestor(&Path::root()));
//! assert_eq!(name.path_from(&Path::parse("/users")), "1/name");
//! ```

use smallvec::SmallVec;
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Path separator used by string forms of a [`Path`].
pub const SEPARATOR: char = '/';

/// Segments of a path, from the topmost key down to the path itself.
///
/// Most paths in practice are shallow, so the segments usually stay on the stack.
pub type Segments<'a> = SmallVec<[&'a str; 8]>;

/// An immutable location in the tree: a key and an optional parent.
#[derive(Clone)]
pub struct Path(Arc<Link>);

struct Link {
    key: String,
    parent: Option<Path>,
    /// Number of parent links between this path and the topmost one.
    depth: usize,
    rooted: bool,
}

impl Path {
    /// The root sentinel. All rooted paths descend from it.
    pub fn root() -> Self {
        Self(Arc::new(Link {
            key: String::new(),
            parent: None,
            depth: 0,
            rooted: true,
        }))
    }

    /// Creates a parentless path that is not attached to the root.
    ///
    /// A `/`-separated key becomes a chain of segments, as with [`Path::parse`]. Writing through
    /// such a path (or any of its descendants) is a programmer error.
    pub fn detached(key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.contains(SEPARATOR) {
            return Self::head(key);
        }
        let mut segments = key.split(SEPARATOR).filter(|s| !s.is_empty());
        match segments.next() {
            Some(head) => segments.fold(Self::head(head.to_string()), |path, key| {
                path.link(key.to_string())
            }),
            None => Self::head(String::new()),
        }
    }

    fn head(key: String) -> Self {
        Self(Arc::new(Link {
            key,
            parent: None,
            depth: 0,
            rooted: false,
        }))
    }

    /// Parses a `/`-separated string.
    ///
    /// A leading separator produces a rooted path; otherwise the first segment becomes a detached
    /// head. Empty segments are skipped, so `"/"` and `""` both parse to the root.
    pub fn parse(s: &str) -> Self {
        let mut segments = s.split(SEPARATOR).filter(|s| !s.is_empty());
        if s.starts_with(SEPARATOR) {
            return segments.fold(Self::root(), |path, key| path.link(key.to_string()));
        }
        match segments.next() {
            Some(head) => segments.fold(Self::head(head.to_string()), |path, key| {
                path.link(key.to_string())
            }),
            None => Self::root(),
        }
    }

    /// Builds a new path with `self` as parent.
    ///
    /// A key containing `/` is split into segments and empty segments are skipped, exactly like
    /// [`Path::join`]. A path therefore always equals the parse of its string form.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let key = key.into();
        if key.is_empty() || key.contains(SEPARATOR) {
            return self.join(&key);
        }
        self.link(key)
    }

    fn link(&self, key: String) -> Self {
        Self(Arc::new(Link {
            key,
            parent: Some(self.clone()),
            depth: self.0.depth + 1,
            rooted: self.0.rooted,
        }))
    }

    /// Appends every non-empty segment of a `/`-separated string.
    pub fn join(&self, path: &str) -> Self {
        path.split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .fold(self.clone(), |path, key| path.link(key.to_string()))
    }

    /// Appends a freshly generated, lexicographically sortable unique key.
    #[cfg(feature = "ulid")]
    pub fn child_by_auto_id(&self) -> Self {
        self.child(ulid::Ulid::new().to_string())
    }

    /// The last segment of this path. Empty for the root.
    pub fn key(&self) -> &str {
        &self.0.key
    }

    pub fn parent(&self) -> Option<&Path> {
        self.0.parent.as_ref()
    }

    /// Returns `true` if this is the root sentinel itself.
    pub fn is_root(&self) -> bool {
        self.0.rooted && self.0.parent.is_none()
    }

    /// Returns `true` if the topmost ancestor of this path is the root sentinel.
    pub fn is_rooted(&self) -> bool {
        self.0.rooted
    }

    /// The number of parent links between this path and its topmost ancestor.
    ///
    /// For rooted paths this is the number of keys below the root.
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Walks `levels_up` parent links.
    ///
    /// Returns `None` if that walks past the topmost ancestor.
    pub fn ancestor(&self, levels_up: usize) -> Option<Path> {
        let mut current = self;
        for _ in 0..levels_up {
            current = current.parent()?;
        }
        Some(current.clone())
    }

    /// Returns `true` if `other` is a strict ancestor of `self`.
    pub fn has_ancestor(&self, other: &Path) -> bool {
        self.0.rooted == other.0.rooted
            && other.depth() < self.depth()
            && self
                .ancestor(self.depth() - other.depth())
                .is_some_and(|candidate| candidate == *other)
    }

    /// Iterates over `self` and all of its ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Path> {
        std::iter::successors(Some(self), |path| path.parent())
    }

    /// The keys from the topmost ancestor down to `self`.
    ///
    /// The root contributes no key, so the segments of a rooted path are exactly the keys below
    /// the root.
    pub fn segments(&self) -> Segments<'_> {
        let mut segments: Segments<'_> = self
            .ancestors()
            .filter(|path| !path.is_root())
            .map(Path::key)
            .collect();
        segments.reverse();
        segments
    }

    /// The `/`-joined keys between `ancestor` (exclusive) and `self` (inclusive).
    ///
    /// If `ancestor` is not an ancestor of `self`, the whole path from its topmost ancestor is
    /// returned. Passing `self` yields an empty string.
    pub fn path_from(&self, ancestor: &Path) -> String {
        let mut keys: Segments<'_> = SmallVec::new();
        for path in self.ancestors() {
            if path == ancestor || path.is_root() {
                break;
            }
            keys.push(path.key());
        }
        keys.reverse();
        keys.join("/")
    }

    /// The path relative to the root, without a leading separator.
    pub fn root_path(&self) -> String {
        self.segments().join("/")
    }

    /// Every path strictly below `ancestor`, down to and including `self`, shallowest first.
    ///
    /// Returns an empty list if `ancestor` is `self` or not an ancestor of `self`.
    pub fn lineage_from(&self, ancestor: &Path) -> Vec<Path> {
        if !self.has_ancestor(ancestor) {
            return Vec::new();
        }
        let mut lineage: Vec<Path> = self
            .ancestors()
            .take(self.depth() - ancestor.depth())
            .cloned()
            .collect();
        lineage.reverse();
        lineage
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        self.0.rooted == other.0.rooted
            && self.0.depth == other.0.depth
            && self
                .ancestors()
                .zip(other.ancestors())
                .all(|(a, b)| a.key() == b.key())
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.rooted.hash(state);
        for segment in self.segments() {
            segment.hash(state);
        }
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        // detached paths sort first
        self.0
            .rooted
            .cmp(&other.0.rooted)
            .then_with(|| self.segments().cmp(&other.segments()))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.rooted {
            write!(f, "{SEPARATOR}")?;
        }
        write!(f, "{}", self.segments().join("/"))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::root()
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Path {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Path {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}
