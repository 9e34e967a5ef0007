// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{
    ConflictResolver, FileNode, NodeKind, NodeRef, UpdateNode, ValueMap, ValueNode,
};
use crate::{
    Path,
    error::{ConflictError, TreeError},
};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// An interior node of an update tree: the pending writes of one subtree.
///
/// Children are kept in insertion order and have unique keys. Every child's location is a direct
/// child of this node's location.
///
/// ## Writing
///
/// There are two ways to put a leaf into a tree, with different rules for what they may replace:
///
/// - [`ObjectNode::insert_value`] and [`ObjectNode::insert_file`] are used while a transaction
///   accumulates writes. Writing twice to one location keeps the last write, and a value written
///   over a subtree replaces that subtree. Writing *below* an existing leaf is refused, because it
///   means two writes in one transaction disagree on the shape of the data.
/// - [`ObjectNode::apply`] and [`ObjectNode::update`] are used to mirror writes that the remote
///   store has already accepted. They look up the nearest existing node and graft the rest of
///   the path beneath it, replacing leaves by subtrees where needed, since that is what the store
///   does.
///
/// ```
/// use serde_json::json;
/// use treesync::{Path, tree::{ObjectNode, ValueNode}};
///
/// let mut tree = ObjectNode::root();
/// tree.insert_value(ValueNode::new(Path::parse("/users/1/name"), Some(json!("Alice"))), 32)?;
/// tree.insert_value(ValueNode::new(Path::parse("/users/1/age"), Some(json!(30))), 32)?;
///
/// let values = tree.update_value();
/// assert_eq!(values["users/1/name"], json!("Alice"));
/// assert_eq!(values["users/1/age"], json!(30));
/// # Ok::<_, treesync::error::TreeError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    location: Path,
    children: Vec<UpdateNode>,
}

impl ObjectNode {
    pub fn new(location: Path) -> Self {
        Self {
            location,
            children: Vec::new(),
        }
    }

    /// An empty tree at the root.
    pub fn root() -> Self {
        Self::new(Path::root())
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn children(&self) -> &[UpdateNode] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.children.iter().position(|child| child.key() == key)
    }

    /// The direct child with the given key.
    pub fn get(&self, key: &str) -> Option<&UpdateNode> {
        self.children.iter().find(|child| child.key() == key)
    }

    /// Removes the direct child with the given key.
    pub fn remove(&mut self, key: &str) -> Option<UpdateNode> {
        let index = self.position(key)?;
        Some(self.children.remove(index))
    }

    /// Puts `node` in place of the direct child with the same key, keeping its position.
    ///
    /// Appends `node` if there is no such child. Returns the replaced child.
    pub fn replace_child(&mut self, node: UpdateNode) -> Option<UpdateNode> {
        debug_assert_eq!(node.location().parent(), Some(&self.location));
        match self.position(node.key()) {
            Some(index) => Some(std::mem::replace(&mut self.children[index], node)),
            None => {
                self.children.push(node);
                None
            }
        }
    }

    /// Removes the node at `path`, a strict descendant of this node.
    ///
    /// Subtrees left empty by the removal are dropped as well.
    pub fn remove_descendant(&mut self, path: &Path) -> Option<UpdateNode> {
        if !path.has_ancestor(&self.location) {
            return None;
        }
        let lineage = path.lineage_from(&self.location);
        self.remove_along(&lineage)
    }

    fn remove_along(&mut self, lineage: &[Path]) -> Option<UpdateNode> {
        let (next, rest) = lineage.split_first()?;
        if rest.is_empty() {
            return self.remove(next.key());
        }
        let index = self.position(next.key())?;
        let UpdateNode::Object(object) = &mut self.children[index] else {
            return None;
        };
        let removed = object.remove_along(rest)?;
        if object.is_empty() {
            self.children.remove(index);
        }
        Some(removed)
    }

    /// Drops removals and the subtrees left empty by them.
    ///
    /// A tree that mirrors stored data has no use for removals once they are applied.
    pub fn prune_removals(&mut self) {
        self.children.retain_mut(|child| match child {
            UpdateNode::Value(node) => !node.is_removal(),
            UpdateNode::File(node) => node.value.is_some(),
            UpdateNode::Object(object) => {
                object.prune_removals();
                !object.is_empty()
            }
        });
    }

    /// Looks up the node at `path`, which must be `self` or one of its descendants.
    pub fn child(&self, path: &Path) -> Option<NodeRef<'_>> {
        if *path == self.location {
            return Some(NodeRef::Object(self));
        }
        let lineage = path.lineage_from(&self.location);
        if lineage.is_empty() {
            return None;
        }
        let keys: Vec<&str> = lineage.iter().map(Path::key).collect();
        self.child_by(&keys)
    }

    /// Looks up a descendant by its keys relative to this node.
    pub fn child_by<S: AsRef<str>>(&self, keys: &[S]) -> Option<NodeRef<'_>> {
        let Some((first, rest)) = keys.split_first() else {
            return Some(NodeRef::Object(self));
        };
        match self.get(first.as_ref())? {
            UpdateNode::Object(object) => object.child_by(rest),
            leaf if rest.is_empty() => Some(leaf.as_node_ref()),
            _ => None,
        }
    }

    /// Finds the deepest existing node on the way to `path`.
    ///
    /// Returns that node together with the keys of `path` it does not cover yet. The suffix is
    /// empty if `path` itself exists. For a `path` that is not below this node, returns this node
    /// and all keys of `path`.
    pub fn nearest_child(&self, path: &Path) -> (NodeRef<'_>, Vec<String>) {
        let keys: Vec<String> = if path.has_ancestor(&self.location) {
            path.lineage_from(&self.location)
                .iter()
                .map(|path| path.key().to_string())
                .collect()
        } else if *path == self.location {
            Vec::new()
        } else {
            path.segments().iter().map(|key| key.to_string()).collect()
        };
        let (nearest, left) = self.nearest_child_by(&keys);
        let left = left.to_vec();
        (nearest, left)
    }

    /// Like [`ObjectNode::nearest_child`], with keys relative to this node.
    pub fn nearest_child_by<'k, S: AsRef<str>>(&self, keys: &'k [S]) -> (NodeRef<'_>, &'k [S]) {
        let Some((first, rest)) = keys.split_first() else {
            return (NodeRef::Object(self), keys);
        };
        match self.get(first.as_ref()) {
            None => (NodeRef::Object(self), keys),
            Some(UpdateNode::Object(object)) => object.nearest_child_by(rest),
            Some(leaf) => (leaf.as_node_ref(), rest),
        }
    }

    /// Records a pending database write.
    ///
    /// - Writing to a location that already holds a value overwrites it.
    /// - Writing to a location that holds a subtree replaces the subtree, in place.
    /// - Writing below an existing value, or to a location that holds a file, is an error.
    ///
    /// The tree is unchanged if an error is returned.
    pub fn insert_value(&mut self, node: ValueNode, max_depth: usize) -> Result<(), TreeError> {
        self.insert(node.into(), max_depth)
    }

    /// Records a pending file write.
    ///
    /// Like [`ObjectNode::insert_value`], except that a file never replaces a subtree.
    pub fn insert_file(&mut self, node: FileNode, max_depth: usize) -> Result<(), TreeError> {
        self.insert(node.into(), max_depth)
    }

    /// Records a pending write of either kind. See [`ObjectNode::insert_value`].
    ///
    /// Passing an [`UpdateNode::Object`] grafts a whole subtree, or replaces a pending one.
    pub fn insert(&mut self, leaf: UpdateNode, max_depth: usize) -> Result<(), TreeError> {
        self.check_target(leaf.location(), max_depth)?;
        let lineage = leaf.location().lineage_from(&self.location);
        self.insert_along(&lineage, leaf)
    }

    fn check_target(&self, target: &Path, max_depth: usize) -> Result<(), TreeError> {
        if target.is_root() {
            return Err(TreeError::Root);
        }
        if !target.has_ancestor(&self.location) {
            return Err(TreeError::Unrelated {
                location: target.clone(),
                ancestor: self.location.clone(),
            });
        }
        if target.depth() > max_depth {
            return Err(TreeError::TooDeep {
                location: target.clone(),
                max_depth,
            });
        }
        Ok(())
    }

    fn insert_along(&mut self, lineage: &[Path], leaf: UpdateNode) -> Result<(), TreeError> {
        let (next, rest) = lineage
            .split_first()
            .expect("lineage of a descendant is never empty");
        let Some(index) = self.position(next.key()) else {
            self.graft(lineage, leaf);
            return Ok(());
        };

        if !rest.is_empty() {
            return match &mut self.children[index] {
                UpdateNode::Object(object) => object.insert_along(rest, leaf),
                existing => Err(TreeError::BeneathLeaf {
                    leaf: existing.location().clone(),
                    target: leaf.location().clone(),
                }),
            };
        }

        if self.children[index].kind() == NodeKind::Object {
            return match leaf {
                UpdateNode::File(_) => Err(TreeError::OverwriteSubtree(next.clone())),
                leaf => {
                    debug!(location = %next, "replacing pending subtree with a single value");
                    self.children[index] = leaf;
                    Ok(())
                }
            };
        }
        overwrite(&mut self.children[index], leaf)
    }

    /// Appends `leaf` beneath a fresh chain of interior nodes for all but the last path in
    /// `lineage`.
    fn graft(&mut self, lineage: &[Path], leaf: UpdateNode) {
        match lineage {
            [] | [_] => self.children.push(leaf),
            [next, rest @ ..] => {
                let mut object = ObjectNode::new(next.clone());
                object.graft(rest, leaf);
                self.children.push(UpdateNode::Object(object));
            }
        }
    }

    /// Mirrors a write the store has accepted.
    ///
    /// Finds the nearest existing node on the way to the leaf's location and grafts the rest of
    /// the path beneath it. An existing value on the way is replaced by a subtree, and an existing
    /// subtree at the location is replaced by the leaf. Only a value/file mismatch at the exact
    /// location, or a write below a file, is an error.
    pub fn apply(&mut self, leaf: UpdateNode, max_depth: usize) -> Result<(), TreeError> {
        self.check_target(leaf.location(), max_depth)?;
        let lineage = leaf.location().lineage_from(&self.location);
        self.apply_along(&lineage, leaf)
    }

    fn apply_along(&mut self, lineage: &[Path], leaf: UpdateNode) -> Result<(), TreeError> {
        let (next, rest) = lineage
            .split_first()
            .expect("lineage of a descendant is never empty");
        let Some(index) = self.position(next.key()) else {
            self.graft(lineage, leaf);
            return Ok(());
        };

        if rest.is_empty() {
            return match self.children[index].kind() {
                NodeKind::Object => {
                    self.children[index] = leaf;
                    Ok(())
                }
                _ => overwrite(&mut self.children[index], leaf),
            };
        }

        match &mut self.children[index] {
            UpdateNode::Object(object) => object.apply_along(rest, leaf),
            UpdateNode::Value(_) => {
                let mut object = ObjectNode::new(next.clone());
                object.graft(rest, leaf);
                self.children[index] = UpdateNode::Object(object);
                Ok(())
            }
            UpdateNode::File(file) => Err(TreeError::BeneathLeaf {
                leaf: file.location.clone(),
                target: leaf.location().clone(),
            }),
        }
    }

    /// Applies a flat map of writes, keyed relative to `at`.
    ///
    /// `null` values delete. Entries are applied in key order with [`ObjectNode::apply`]; on error
    /// the entries before the failing one stay applied.
    pub fn update<I>(&mut self, at: &Path, values: I, max_depth: usize) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (key, value) in values {
            self.apply(ValueNode::new(at.join(&key), Some(value)).into(), max_depth)?;
        }
        Ok(())
    }

    /// Folds `other` into `self`.
    ///
    /// Children only `other` has are adopted wholesale. Where both trees hold subtrees the merge
    /// recurses, and where both hold leaves of the same kind `resolver` picks the survivor. Any
    /// other combination is a [`ConflictError`], unless the resolver
    /// [replaces subtrees](ConflictResolver::replaces_subtrees) and the conflict is between a
    /// subtree and a leaf.
    ///
    /// The whole merge is checked before anything is changed, so `self` is untouched on error.
    pub fn merge<R>(&mut self, other: ObjectNode, resolver: &mut R) -> Result<(), ConflictError>
    where
        R: ConflictResolver + ?Sized,
    {
        self.can_merge(&other, resolver)?;
        self.merge_unchecked(other, resolver);
        Ok(())
    }

    /// Checks whether [`ObjectNode::merge`] would succeed, without changing anything.
    pub fn can_merge<R>(&self, other: &ObjectNode, resolver: &R) -> Result<(), ConflictError>
    where
        R: ConflictResolver + ?Sized,
    {
        for incoming in &other.children {
            let Some(existing) = self.get(incoming.key()) else {
                continue;
            };
            match (existing, incoming) {
                (UpdateNode::Object(existing), UpdateNode::Object(incoming)) => {
                    existing.can_merge(incoming, resolver)?;
                }
                (UpdateNode::Value(_), UpdateNode::Value(_))
                | (UpdateNode::File(_), UpdateNode::File(_)) => {}
                (UpdateNode::Object(_), _) | (_, UpdateNode::Object(_))
                    if resolver.replaces_subtrees() => {}
                (existing, incoming) => {
                    return Err(ConflictError {
                        location: existing.location().clone(),
                        existing: existing.kind(),
                        incoming: incoming.kind(),
                    });
                }
            }
        }
        Ok(())
    }

    fn merge_unchecked<R>(&mut self, other: ObjectNode, resolver: &mut R)
    where
        R: ConflictResolver + ?Sized,
    {
        for incoming in other.children {
            let Some(index) = self.position(incoming.key()) else {
                self.children.push(incoming);
                continue;
            };
            match (&mut self.children[index], incoming) {
                (UpdateNode::Object(existing), UpdateNode::Object(incoming)) => {
                    existing.merge_unchecked(incoming, resolver);
                }
                (UpdateNode::Value(existing), UpdateNode::Value(incoming)) => {
                    let winner = resolver.resolve_value(existing, incoming);
                    existing.value = winner.value;
                }
                (UpdateNode::File(existing), UpdateNode::File(incoming)) => {
                    let winner = resolver.resolve_file(existing, incoming);
                    existing.value = winner.value;
                    existing.metadata = winner.metadata;
                }
                // shape change, already vetted by can_merge
                (slot, incoming) => *slot = incoming,
            }
        }
    }

    /// Adds the values of all leaves to `container`, keyed relative to `ancestor`.
    pub fn fill(&self, ancestor: &Path, container: &mut ValueMap) {
        for child in &self.children {
            child.fill(ancestor, container);
        }
    }

    /// Flattens the values of this subtree, keyed relative to this node.
    ///
    /// Removals are `null`; files are left out, see [`ObjectNode::files`].
    pub fn update_value(&self) -> ValueMap {
        let mut container = ValueMap::new();
        self.fill(&self.location, &mut container);
        container
    }

    /// All file leaves in this subtree, depth first.
    pub fn files(&self) -> Vec<&FileNode> {
        let mut files = Vec::new();
        self.collect_files(&mut files);
        files
    }

    fn collect_files<'a>(&'a self, files: &mut Vec<&'a FileNode>) {
        for child in &self.children {
            match child {
                UpdateNode::File(file) => files.push(file),
                UpdateNode::Object(object) => object.collect_files(files),
                UpdateNode::Value(_) => {}
            }
        }
    }

    /// All value leaves in this subtree, removals included, depth first.
    pub fn values(&self) -> Vec<&ValueNode> {
        let mut values = Vec::new();
        self.collect_values(&mut values);
        values
    }

    fn collect_values<'a>(&'a self, values: &mut Vec<&'a ValueNode>) {
        for child in &self.children {
            match child {
                UpdateNode::Value(value) => values.push(value),
                UpdateNode::Object(object) => object.collect_values(values),
                UpdateNode::File(_) => {}
            }
        }
    }

    /// The deepest node reached by following only-children that are subtrees.
    ///
    /// Flattening from this node instead of the root yields the same writes with shorter keys.
    pub fn nearest_common(&self) -> &ObjectNode {
        let mut nearest = self;
        while let [UpdateNode::Object(next)] = nearest.children.as_slice() {
            nearest = next;
        }
        nearest
    }

    /// A copy of this subtree without file leaves. Subtrees left empty are dropped.
    pub fn without_files(&self) -> ObjectNode {
        let children = self
            .children
            .iter()
            .filter_map(|child| match child {
                UpdateNode::Value(node) => Some(UpdateNode::Value(node.clone())),
                UpdateNode::File(_) => None,
                UpdateNode::Object(object) => {
                    let object = object.without_files();
                    (!object.is_empty()).then_some(UpdateNode::Object(object))
                }
            })
            .collect();
        ObjectNode {
            location: self.location.clone(),
            children,
        }
    }
}

impl Default for ObjectNode {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for ObjectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = serde_json::to_string(&self.update_value()).map_err(|_| fmt::Error)?;
        write!(f, "values: {values}, files: [")?;
        for (i, file) in self.files().into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", file.location)?;
        }
        write!(f, "]")
    }
}

/// Replaces the data of an existing leaf with the data of a leaf of the same kind.
fn overwrite(existing: &mut UpdateNode, incoming: UpdateNode) -> Result<(), TreeError> {
    match (existing, incoming) {
        (UpdateNode::Value(existing), UpdateNode::Value(incoming)) => {
            debug!(location = %existing.location, value = ?incoming.value, "replacing pending value");
            existing.value = incoming.value;
            Ok(())
        }
        (UpdateNode::File(existing), UpdateNode::File(incoming)) => {
            debug!(location = %existing.location, "replacing pending file");
            existing.value = incoming.value;
            existing.metadata = incoming.metadata;
            Ok(())
        }
        (existing, incoming) => Err(TreeError::KindMismatch {
            location: existing.location().clone(),
            existing: existing.kind(),
            incoming: incoming.kind(),
        }),
    }
}
