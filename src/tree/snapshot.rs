// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{FileNode, Metadata, NodeRef, UpdateNode, ValueNode};
use crate::Path;
use bytes::Bytes;
use serde_json::Value;

/// A read-only view of the data at one location, detached from the tree it was read from.
///
/// A snapshot of a location with no data still has a [`path`](Snapshot::path) but does not
/// [`exist`](Snapshot::exists).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    node: UpdateNode,
}

impl Snapshot {
    pub fn new(node: UpdateNode) -> Self {
        Self { node }
    }

    /// A snapshot of a location that holds nothing.
    pub fn missing(location: Path) -> Self {
        Self::new(ValueNode::new(location, None).into())
    }

    pub fn path(&self) -> &Path {
        self.node.location()
    }

    pub fn key(&self) -> &str {
        self.node.key()
    }

    pub fn exists(&self) -> bool {
        match &self.node {
            UpdateNode::Value(node) => node.value.is_some(),
            UpdateNode::File(node) => node.value.is_some(),
            UpdateNode::Object(node) => !node.is_empty(),
        }
    }

    /// The value stored at this location, if it holds a single value.
    pub fn value(&self) -> Option<&Value> {
        match &self.node {
            UpdateNode::Value(node) => node.value(),
            _ => None,
        }
    }

    /// The blob stored at this location, if it holds a file.
    pub fn file(&self) -> Option<&Bytes> {
        match &self.node {
            UpdateNode::File(node) => node.value(),
            _ => None,
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match &self.node {
            UpdateNode::File(FileNode { metadata, .. }) => Some(metadata),
            _ => None,
        }
    }

    pub fn children_count(&self) -> usize {
        match &self.node {
            UpdateNode::Object(node) => node.len(),
            UpdateNode::Value(ValueNode {
                value: Some(Value::Object(map)),
                ..
            }) => map.len(),
            _ => 0,
        }
    }

    pub fn has_children(&self) -> bool {
        self.children_count() > 0
    }

    pub fn has_child(&self, key: &str) -> bool {
        self.child(key).exists()
    }

    /// The snapshot of a direct child. Reads into stored JSON objects.
    pub fn child(&self, key: &str) -> Snapshot {
        let location = self.path().child(key);
        match &self.node {
            UpdateNode::Object(node) => node
                .get(key)
                .map(|child| Snapshot::new(child.clone()))
                .unwrap_or_else(|| Snapshot::missing(location)),
            UpdateNode::Value(ValueNode {
                value: Some(Value::Object(map)),
                ..
            }) => Snapshot::new(ValueNode::new(location, map.get(key).cloned()).into()),
            _ => Snapshot::missing(location),
        }
    }

    /// Snapshots of all direct children, in storage order.
    pub fn children(&self) -> Vec<Snapshot> {
        match &self.node {
            UpdateNode::Object(node) => node
                .children()
                .iter()
                .cloned()
                .map(Snapshot::new)
                .collect(),
            UpdateNode::Value(ValueNode {
                value: Some(Value::Object(map)),
                location,
            }) => map
                .iter()
                .map(|(key, value)| {
                    Snapshot::new(ValueNode::new(location.child(key), Some(value.clone())).into())
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn node(&self) -> &UpdateNode {
        &self.node
    }

    pub fn into_node(self) -> UpdateNode {
        self.node
    }
}

/// Reads the data at `keys` below `from`.
///
/// Follows stored subtrees as far as they go, then continues inside a stored JSON object value.
pub(crate) fn locate<S: AsRef<str>>(from: NodeRef<'_>, keys: &[S]) -> Snapshot {
    let (nearest, left) = match from {
        NodeRef::Object(object) => object.nearest_child_by(keys),
        leaf => (leaf, keys),
    };
    let location = left
        .iter()
        .fold(nearest.location().clone(), |path, key| path.child(key.as_ref()));
    if left.is_empty() {
        return Snapshot::new(nearest.to_node());
    }

    let NodeRef::Value(ValueNode {
        value: Some(value), ..
    }) = nearest
    else {
        return Snapshot::missing(location);
    };
    let inner = left
        .iter()
        .try_fold(value, |value, key| value.as_object()?.get(key.as_ref()));
    Snapshot::new(ValueNode::new(location, inner.cloned()).into())
}
