// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The update tree: pending writes arranged by location.
//!
//! An update tree is a small tagged tree with three kinds of nodes:
//!
//! - [`ValueNode`]: a pending write of a JSON-compatible value. A value of `None` deletes
//!   whatever is stored at the location.
//! - [`FileNode`]: a pending upload (or deletion) of a binary blob. Files travel through a
//!   separate channel and never appear in the flattened value map.
//! - [`ObjectNode`]: an interior node holding the pending writes of a subtree, in insertion order.
//!
//! Two invariants hold for every tree built through this module:
//!
//! - children of one [`ObjectNode`] have unique keys;
//! - a leaf and an [`ObjectNode`] never share a location. Writing a value where a subtree exists
//!   replaces the subtree explicitly, and writing below a leaf is an error.
//!
//! Trees are flattened into a [`ValueMap`] (relative path → value) for the single atomic update
//! sent to the database. Removals flatten to `null`, which is how the remote store spells a
//! deletion in a multi-path update.

pub mod object;
pub mod resolver;
pub mod snapshot;

pub use object::ObjectNode;
pub use resolver::{ConflictResolver, ExistingWins, IncomingWins, Overwrite};
pub use snapshot::Snapshot;

use crate::Path;
use bytes::Bytes;
use serde_json::Value;
use std::{collections::BTreeMap, fmt};

/// A flattened set of writes, keyed by `/`-separated paths relative to some ancestor.
///
/// Ordered, so that payloads are deterministic.
pub type ValueMap = BTreeMap<String, Value>;

/// Free-form metadata attached to a stored file (content type, cache control, and so on).
pub type Metadata = serde_json::Map<String, Value>;

/// The kind of a node, without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum NodeKind {
    Value,
    File,
    Object,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Value => "database value",
            NodeKind::File => "file",
            NodeKind::Object => "subtree",
        })
    }
}

/// A pending write of a single JSON-compatible value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueNode {
    pub(crate) location: Path,
    /// The value to write, or `None` to delete. A `null` value deletes too.
    pub value: Option<Value>,
}

impl ValueNode {
    /// A pending write of `value` at `location`. `Some(Value::Null)` is stored as a removal.
    pub fn new(location: Path, value: Option<Value>) -> Self {
        Self {
            location,
            value: value.filter(|value| !value.is_null()),
        }
    }

    /// Whether this write deletes the stored data.
    pub fn is_removal(&self) -> bool {
        self.value.as_ref().is_none_or(Value::is_null)
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

/// A pending upload or deletion of a binary blob.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub(crate) location: Path,
    /// The blob to upload, or `None` to delete.
    pub value: Option<Bytes>,
    pub metadata: Metadata,
}

impl FileNode {
    pub fn new(location: Path, value: Option<Bytes>) -> Self {
        Self {
            location,
            value,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }
}

/// A node of an update tree.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateNode {
    Value(ValueNode),
    File(FileNode),
    Object(ObjectNode),
}

impl UpdateNode {
    pub fn location(&self) -> &Path {
        match self {
            UpdateNode::Value(node) => &node.location,
            UpdateNode::File(node) => &node.location,
            UpdateNode::Object(node) => node.location(),
        }
    }

    pub fn key(&self) -> &str {
        self.location().key()
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            UpdateNode::Value(_) => NodeKind::Value,
            UpdateNode::File(_) => NodeKind::File,
            UpdateNode::Object(_) => NodeKind::Object,
        }
    }

    pub fn as_node_ref(&self) -> NodeRef<'_> {
        match self {
            UpdateNode::Value(node) => NodeRef::Value(node),
            UpdateNode::File(node) => NodeRef::File(node),
            UpdateNode::Object(node) => NodeRef::Object(node),
        }
    }

    /// Adds the values of this node to `container`, keyed relative to `ancestor`.
    ///
    /// Files contribute nothing.
    pub fn fill(&self, ancestor: &Path, container: &mut ValueMap) {
        match self {
            UpdateNode::Value(node) => {
                container.insert(
                    node.location.path_from(ancestor),
                    node.value.clone().unwrap_or(Value::Null),
                );
            }
            UpdateNode::File(_) => {}
            UpdateNode::Object(node) => node.fill(ancestor, container),
        }
    }
}

impl From<ValueNode> for UpdateNode {
    fn from(node: ValueNode) -> Self {
        UpdateNode::Value(node)
    }
}

impl From<FileNode> for UpdateNode {
    fn from(node: FileNode) -> Self {
        UpdateNode::File(node)
    }
}

impl From<ObjectNode> for UpdateNode {
    fn from(node: ObjectNode) -> Self {
        UpdateNode::Object(node)
    }
}

/// A borrowed node of an update tree.
///
/// Lookups return this rather than `&UpdateNode` since the node a lookup starts from is an
/// [`ObjectNode`] that is not necessarily wrapped in an [`UpdateNode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Value(&'a ValueNode),
    File(&'a FileNode),
    Object(&'a ObjectNode),
}

impl<'a> NodeRef<'a> {
    pub fn location(&self) -> &'a Path {
        match *self {
            NodeRef::Value(node) => &node.location,
            NodeRef::File(node) => &node.location,
            NodeRef::Object(node) => node.location(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::Value(_) => NodeKind::Value,
            NodeRef::File(_) => NodeKind::File,
            NodeRef::Object(_) => NodeKind::Object,
        }
    }

    pub fn to_node(&self) -> UpdateNode {
        match *self {
            NodeRef::Value(node) => UpdateNode::Value(node.clone()),
            NodeRef::File(node) => UpdateNode::File(node.clone()),
            NodeRef::Object(node) => UpdateNode::Object(node.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn removals_flatten_to_null() {
        let mut container = ValueMap::new();
        UpdateNode::from(ValueNode::new(Path::parse("/a/b"), None))
            .fill(&Path::root(), &mut container);
        assert_eq!(container.get("a/b"), Some(&Value::Null));
    }

    #[test]
    fn null_values_are_removals() {
        let node = ValueNode::new(Path::parse("/a"), Some(Value::Null));
        assert_eq!(node.value(), None);
        assert!(node.is_removal());

        let mut node = ValueNode::new(Path::parse("/a"), Some(json!(0)));
        assert!(!node.is_removal());
        node.value = Some(Value::Null);
        assert!(node.is_removal());
    }

    #[test]
    fn files_do_not_flatten() {
        let mut container = ValueMap::new();
        UpdateNode::from(FileNode::new(
            Path::parse("/avatar"),
            Some(Bytes::from_static(b"png")),
        ))
        .fill(&Path::root(), &mut container);
        assert!(container.is_empty());
    }

    #[test]
    fn values_flatten_relative_to_the_ancestor() {
        let mut container = ValueMap::new();
        UpdateNode::from(ValueNode::new(Path::parse("/a/b/c"), Some(json!(1))))
            .fill(&Path::parse("/a"), &mut container);
        assert_eq!(container, ValueMap::from([("b/c".to_string(), json!(1))]));
    }

    #[test]
    fn node_kinds_describe_themselves() {
        assert_eq!(NodeKind::Value.to_string(), "database value");
        assert_eq!(NodeKind::File.to_string(), "file");
        assert_eq!(NodeKind::Object.to_string(), "subtree");
    }
}
