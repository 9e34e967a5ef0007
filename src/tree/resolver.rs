// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Decide what happens when two update trees write to the same location.
//!
//! [`ObjectNode::merge`](super::ObjectNode::merge) walks both trees in lockstep. Whenever both
//! hold a leaf of the same kind at one location, the [`ConflictResolver`] picks the leaf that
//! survives. Leaves of different kinds (a database value and a stored file) can never be
//! reconciled and always fail the merge.
//!
//! By default a merge also refuses to replace a subtree by a leaf, or a leaf by a subtree, since
//! within one client that means two pieces of code disagree about the shape of the data. Backends
//! that mirror the remote store opt into replacement through
//! [`ConflictResolver::replaces_subtrees`], as the store itself overwrites whatever was there.

use super::{FileNode, ValueNode};

/// Picks the surviving leaf when two trees write to the same location.
///
/// All methods have defaults: incoming writes win, and shape changes are conflicts.
#[expect(unused_variables)]
pub trait ConflictResolver {
    /// Resolve two pending database writes at the same location.
    ///
    /// The returned node's location is ignored; the existing location is kept.
    fn resolve_value(&mut self, existing: &ValueNode, incoming: ValueNode) -> ValueNode {
        incoming
    }

    /// Resolve two pending file writes at the same location.
    fn resolve_file(&mut self, existing: &FileNode, incoming: FileNode) -> FileNode {
        incoming
    }

    /// Whether an incoming leaf may replace an existing subtree and vice versa.
    fn replaces_subtrees(&self) -> bool {
        false
    }
}

/// The later write wins. This is the default for merging transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncomingWins;

impl ConflictResolver for IncomingWins {}

/// The earlier write wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistingWins;

impl ConflictResolver for ExistingWins {
    fn resolve_value(&mut self, existing: &ValueNode, _: ValueNode) -> ValueNode {
        existing.clone()
    }

    fn resolve_file(&mut self, existing: &FileNode, _: FileNode) -> FileNode {
        existing.clone()
    }
}

/// Incoming writes win and replace whatever shape was there before, subtrees included.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overwrite;

impl ConflictResolver for Overwrite {
    fn replaces_subtrees(&self) -> bool {
        true
    }
}
