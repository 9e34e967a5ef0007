// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Transactions: accumulate writes locally, then apply them as one update.
//!
//! A [`Transaction`] collects scattered writes against the tree-shaped remote data into a single
//! [update tree](crate::tree). Nothing reaches the backend until [`Transaction::commit`] is called,
//! at which point
//!
//! 1. all [preconditions](Hooks::add_precondition) are resolved,
//! 2. all pending values are sent as **one atomic multi-path update** to the [`Database`], and
//! 3. all pending files are uploaded to (or deleted from) the [`Storage`], each independently.
//!
//! # Example
//!
//! ```
//! # futures::executor::block_on(async {
//! use serde_json::json;
//! use std::sync::Arc;
//! use treesync::{CacheBackend, Path, Transaction, backend::Database};
//!
//! let cache = Arc::new(CacheBackend::new());
//!
//! let mut tx = Transaction::for_backend(cache.clone());
//! tx.add_value(&Path::parse("/users/1/name"), "Alice")?;
//! tx.add_value(&Path::parse("/users/1/age"), 30)?;
//! tx.add_completion(|success| assert!(success));
//!
//! let report = tx.commit(false).await?;
//! assert!(report.is_success());
//!
//! let name = cache.load(&Path::parse("/users/1/name")).await.unwrap();
//! assert_eq!(name.value(), Some(&json!("Alice")));
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! # Lifecycle
//!
//! A transaction must be finished: committed, reverted or merged into another transaction. After
//! that it is *invalidated*, and writing to it or registering callbacks on it panics. Its final
//! [`State`] stays queryable.
//!
//! Dropping a transaction that still holds pending writes is a bug in the caller. It is logged,
//! and in debug builds it panics.
//!
//! # Reverting
//!
//! Writes to the update tree are cheap to undo (the tree is simply dropped), but the code that
//! builds a transaction often also changes local state, such as an in-memory model, right away.
//! [Reversions](Hooks::add_reversion) undo those changes. They run most recent first, so state
//! that depends on earlier changes is unwound before the state it depends on.

mod commit;
mod hooks;
mod merge;
mod state;

pub use commit::{CommitReport, FileCompletion};
pub use hooks::{Hooks, Promise};
pub use state::{CommitState, State, Substate};

use crate::{
    Config, Path,
    backend::{Database, Storage},
    error::TreeError,
    tree::{FileNode, Metadata, NodeRef, ObjectNode, UpdateNode, ValueNode},
};
use bytes::Bytes;
use hooks::run_reversions;
use merge::ScheduledMerge;
use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::{debug, error};

/// A set of pending writes and the callbacks that go with them.
pub struct Transaction {
    database: Arc<dyn Database>,
    storage: Arc<dyn Storage>,
    config: Config,
    update: ObjectNode,
    hooks: Hooks,
    scheduled: Vec<ScheduledMerge>,
    state: State,
    substate: Substate,
}

impl Transaction {
    pub fn new(database: Arc<dyn Database>, storage: Arc<dyn Storage>) -> Self {
        Self {
            database,
            storage,
            config: Config::default(),
            update: ObjectNode::root(),
            hooks: Hooks::default(),
            scheduled: Vec::new(),
            state: State::Waiting,
            substate: Substate::None,
        }
    }

    /// A transaction against a backend that stores both values and files.
    pub fn for_backend<B>(backend: Arc<B>) -> Self
    where
        B: Database + Storage + 'static,
    {
        Self::new(backend.clone(), backend)
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn substate(&self) -> Substate {
        self.substate
    }

    pub fn is_completed(&self) -> bool {
        self.state == State::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    pub fn is_performing(&self) -> bool {
        self.state == State::Performing
    }

    pub fn is_merged(&self) -> bool {
        self.state == State::Merged
    }

    pub fn is_reverted(&self) -> bool {
        self.substate == Substate::Reverted
    }

    /// Whether the transaction is finished and accepts no more writes or callbacks.
    pub fn is_invalidated(&self) -> bool {
        self.state.is_terminal() || self.is_reverted()
    }

    /// Whether there is nothing to commit.
    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.scheduled.is_empty()
    }

    /// The pending writes.
    ///
    /// Writes of transactions [merged](Transaction::merge) while gated on preconditions are not
    /// part of it until the commit.
    pub fn update_node(&self) -> &ObjectNode {
        &self.update
    }

    /// The callback registry, for registering from code that has no access to the transaction.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    fn assert_valid(&self, operation: &str) {
        assert!(
            !self.is_invalidated(),
            "cannot {operation}: transaction is {} and has been invalidated",
            match self.substate {
                Substate::Reverted => "reverted",
                Substate::None => "finished",
            }
        );
    }

    fn write(&mut self, node: UpdateNode) -> Result<(), TreeError> {
        self.assert_valid("write");
        assert!(
            node.location().is_rooted(),
            "cannot write to {}, which is not below the root",
            node.location()
        );
        self.update.insert(node, self.config.max_depth)
    }

    /// Writes `value` at `path`, replacing whatever is pending there. `null` deletes, like
    /// [`Transaction::remove_value`].
    ///
    /// # Errors
    ///
    /// If the write conflicts with another pending write, see [`ObjectNode::insert_value`]. The
    /// transaction is unchanged in that case.
    ///
    /// # Panics
    ///
    /// If `path` is not below the root, or the transaction has been invalidated.
    pub fn add_value(&mut self, path: &Path, value: impl Into<Value>) -> Result<(), TreeError> {
        self.write(ValueNode::new(path.clone(), Some(value.into())).into())
    }

    /// Deletes whatever is stored at `path`.
    ///
    /// Errors and panics like [`Transaction::add_value`].
    pub fn remove_value(&mut self, path: &Path) -> Result<(), TreeError> {
        self.write(ValueNode::new(path.clone(), None).into())
    }

    /// Uploads `data` to `path` on commit.
    ///
    /// Errors and panics like [`Transaction::add_value`]. In addition, a file cannot replace a
    /// pending subtree.
    pub fn add_file(&mut self, path: &Path, data: impl Into<Bytes>) -> Result<(), TreeError> {
        self.add_file_with_metadata(path, data, Metadata::new())
    }

    pub fn add_file_with_metadata(
        &mut self,
        path: &Path,
        data: impl Into<Bytes>,
        metadata: Metadata,
    ) -> Result<(), TreeError> {
        let node = FileNode::new(path.clone(), Some(data.into())).with_metadata(metadata);
        self.write(node.into())
    }

    /// Deletes the file at `path` on commit.
    pub fn remove_file(&mut self, path: &Path) -> Result<(), TreeError> {
        self.write(FileNode::new(path.clone(), None).into())
    }

    /// See [`Hooks::add_precondition`].
    pub fn add_precondition(&self, precondition: impl FnOnce(Promise) + Send + 'static) {
        self.assert_valid("add a precondition");
        self.hooks.add_precondition(precondition);
    }

    /// See [`Hooks::add_reversion`].
    pub fn add_reversion(&self, reversion: impl FnOnce() + Send + 'static) {
        self.assert_valid("add a reversion");
        self.hooks.add_reversion(reversion);
    }

    /// See [`Hooks::add_file_reversion`].
    pub fn add_file_reversion(&self, path: Path, reversion: impl FnOnce() + Send + 'static) {
        self.assert_valid("add a file reversion");
        self.hooks.add_file_reversion(path, reversion);
    }

    /// See [`Hooks::add_completion`].
    pub fn add_completion(&self, completion: impl FnOnce(bool) + Send + 'static) {
        self.assert_valid("add a completion");
        self.hooks.add_completion(completion);
    }

    /// Moves the reversions registered so far out of the transaction, as one undo action that
    /// runs them most recent first.
    ///
    /// Use it to hand the undo stack to another owner, such as an undo manager. Reverting the
    /// transaction afterwards only runs reversions registered after this call.
    ///
    /// # Panics
    ///
    /// If the transaction has been invalidated.
    pub fn take_reversion(&mut self) -> Box<dyn FnOnce() + Send> {
        self.assert_valid("take the reversions");
        let reversions = self.hooks.take_reversions();
        Box::new(move || run_reversions(reversions))
    }

    fn assert_revertible(&self) {
        assert!(
            matches!(self.state, State::Waiting | State::Failed),
            "cannot revert a transaction that is {}",
            self.state
        );
    }

    /// Undoes the transaction: runs all reversions, then all file reversions.
    ///
    /// A waiting transaction drops its pending writes and is invalidated. Completions registered on
    /// it never run.
    ///
    /// # Panics
    ///
    /// Unless the transaction is waiting or has failed.
    pub fn revert(&mut self) {
        self.revert_values();
        self.revert_files();
    }

    /// Runs all reversions, most recent first, and invalidates the transaction.
    ///
    /// File reversions stay registered, see [`Transaction::revert_files`].
    ///
    /// # Panics
    ///
    /// Unless the transaction is waiting or has failed.
    pub fn revert_values(&mut self) {
        self.assert_revertible();
        debug!(state = %self.state, "reverting transaction");
        run_reversions(self.hooks.take_reversions());
        self.update.clear();
        self.scheduled.clear();
        self.substate = Substate::Reverted;
        self.hooks.close(true);
    }

    /// Runs all file reversions, and drops pending file writes.
    ///
    /// # Panics
    ///
    /// Unless the transaction is waiting or has failed.
    pub fn revert_files(&mut self) {
        self.assert_revertible();
        for (path, reversion) in self.hooks.take_file_reversions() {
            debug!(%path, "reverting file");
            reversion();
        }
        self.update = self.update.without_files();
    }

    /// Runs the file reversion registered for `path`, if any, and drops the pending write of that
    /// file.
    ///
    /// # Panics
    ///
    /// Unless the transaction is waiting or has failed.
    pub fn revert_file(&mut self, path: &Path) {
        self.assert_revertible();
        if let Some(reversion) = self.hooks.take_file_reversion(path) {
            debug!(%path, "reverting file");
            reversion();
        }
        if let Some(NodeRef::File(_)) = self.update.child(path) {
            self.update.remove_descendant(path);
        }
    }

    /// Runs completions and drops everything that is not needed any more.
    fn invalidate(&mut self, success: bool) {
        for completion in self.hooks.take_completions() {
            completion(success);
        }
        self.update.clear();
        self.scheduled.clear();
        // a failed transaction may still be reverted
        self.hooks.close(!success && !self.is_reverted());
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.update, f)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("substate", &self.substate)
            .field("update", &self.update)
            .field("hooks", &self.hooks)
            .field("scheduled", &self.scheduled.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == State::Waiting
            && !self.is_reverted()
            && !self.is_empty()
            && !std::thread::panicking()
        {
            error!(update = %self.update, "transaction dropped without being committed, reverted or merged");
            debug_assert!(
                false,
                "transaction must be committed, reverted or merged before it is dropped"
            );
        }
    }
}
