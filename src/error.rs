// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Error types.
//!
//! Errors fall into three groups:
//!
//! - [`TreeError`] and [`ConflictError`] describe writes or merges that would break the shape of
//!   an update tree. They are returned eagerly, and the tree is left untouched.
//! - [`CommitError`] is returned when [`commit`](crate::transaction::Transaction::commit) is called
//!   on a transaction that cannot be committed at all.
//! - [`Error`] values are collected while a commit runs (rejected preconditions, failed backend
//!   updates) and handed to the caller in the
//!   [`CommitReport`](crate::transaction::CommitReport) rather than returned.

use crate::{Path, transaction::State, tree::NodeKind};
use thiserror::Error;

/// The error type backends use to report failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A write that does not fit into an update tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The root itself cannot hold a value.
    #[error("cannot write to the root node")]
    Root,

    /// A file was written where a subtree of pending writes exists.
    #[error("cannot write a file over the subtree at {0}")]
    OverwriteSubtree(Path),

    /// A write targets a location below one that already holds a single value.
    #[error("cannot write {target} beneath {leaf}, which already holds a single value")]
    BeneathLeaf {
        /// The existing leaf.
        leaf: Path,
        /// The requested location.
        target: Path,
    },

    /// A database value and a stored file were written to the same location.
    #[error("{location} already holds a {existing}, cannot write a {incoming}")]
    KindMismatch {
        location: Path,
        existing: NodeKind,
        incoming: NodeKind,
    },

    /// The write is nested deeper than the configured maximum.
    #[error("{location} exceeds the maximum depth of {max_depth}")]
    TooDeep { location: Path, max_depth: usize },

    /// The location is not below the node the write was applied to.
    #[error("{location} is not below {ancestor}")]
    Unrelated { location: Path, ancestor: Path },
}

/// Two trees cannot be merged because they disagree on the kind of node at a location.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot merge a {incoming} into the {existing} at {location}")]
pub struct ConflictError {
    pub location: Path,
    pub existing: NodeKind,
    pub incoming: NodeKind,
}

/// The transaction cannot be committed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// Nothing was written to the transaction.
    #[error("cannot commit an empty transaction")]
    Empty,

    /// The transaction already reached a terminal state or was reverted.
    #[error("transaction is {0} and cannot be committed again")]
    Invalidated(State),
}

/// A failure collected while committing a transaction.
#[derive(Error, Debug)]
pub enum Error {
    /// A precondition rejected its promise.
    #[error("precondition failed: {0}")]
    Precondition(#[source] BoxError),

    /// A precondition dropped its promise without resolving it.
    #[error("precondition was dropped without being resolved")]
    PreconditionAbandoned,

    /// A transaction merged while gated on preconditions conflicts with this one.
    #[error("scheduled merge failed: {0}")]
    Merge(#[from] ConflictError),

    /// Nothing was left to write once the scheduled merges were applied.
    #[error("nothing to commit after applying scheduled merges")]
    Empty,

    /// The atomic multi-path update was rejected.
    #[error("database update failed: {0}")]
    Database(#[source] BoxError),
}

