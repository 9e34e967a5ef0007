// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # treesync: a write buffer for tree-shaped remote data
//!
//! This crate is the client-side half of a synchronization layer over a remote hierarchical
//! key-value store: a JSON tree database next to a binary blob store. Applications describe many
//! scattered writes against the remote tree, accumulate them locally in a [`Transaction`], gate
//! them on asynchronous preconditions, and finally apply them as **one atomic multi-path update**.
//!
//! ## Core Concepts
//!
//! - [`Path`]: an immutable location in the tree, a key plus a shared parent.
//! - [The update tree](tree): pending writes arranged by location. Leaves are either database
//!   values ([`ValueNode`](tree::ValueNode)) or files ([`FileNode`](tree::FileNode)); interior
//!   nodes are [`ObjectNode`](tree::ObjectNode)s. Writes to the same location collapse to the last
//!   one, and writes that disagree on the shape of the data are rejected with a [`TreeError`].
//! - [`Transaction`]: an update tree together with preconditions, reversions, completions and a
//!   small state machine. Transactions can be [merged](Transaction::merge) into one another.
//! - [Backends](backend): a transaction commits values to a [`Database`](backend::Database) and
//!   files to a [`Storage`](backend::Storage). [`CacheBackend`] implements both in memory.
//!
//! ## Atomicity
//!
//! Values and files travel through different channels. All values of a transaction are flattened
//! into a single map, keyed by paths relative to the deepest ancestor they share, and applied in
//! one atomic update. Files cannot be part of that update, so each file is uploaded or deleted on
//! its own. A failing file does not fail the transaction; it is reported separately, and its
//! [file reversion](transaction::Hooks::add_file_reversion) runs if requested.
//!
//! ## Getting Started
//!
//! ```rust
//! # futures::executor::block_on(async {
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//! use treesync::{CacheBackend, Path, Transaction, path};
//!
//! let cache = Arc::new(CacheBackend::new());
//! let model = Arc::new(Mutex::new(None));
//!
//! let mut tx = Transaction::for_backend(cache.clone());
//! tx.add_value(&path!("users", 1, "name"), "Alice")?;
//! tx.add_value(&path!("users", 1, "age"), 30)?;
//!
//! // update the local model right away, and undo it if the commit fails
//! *model.lock().unwrap() = Some("Alice");
//! tx.add_reversion({
//!     let model = model.clone();
//!     move || *model.lock().unwrap() = None
//! });
//!
//! // check something asynchronously before anything is written
//! tx.add_precondition(|promise| promise.fulfill());
//!
//! let report = tx.commit(true).await?;
//! assert!(report.is_success());
//! assert_eq!(cache.values()["users/1/name"], json!("Alice"));
//! assert_eq!(*model.lock().unwrap(), Some("Alice"));
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`](https://docs.rs/tracing) and never installs a subscriber.
//! Overwritten pending writes and commit progress are logged at `debug`, failures at `warn`, and a
//! transaction dropped with pending writes at `error`.
//!
//! ## Features
//!
//! - `json`: Renders update trees and snapshots as nested `serde_json::Value` documents. This
//!   feature is enabled by default.
//! - `serde`: Provides `serde` support for paths, configuration and state types.
//! - `ulid`: Generates sortable unique keys for new children. This feature is enabled by default.
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for [`Path`], useful for property-based
//!   testing.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

pub mod backend;
pub use backend::CacheBackend;
pub mod config;
pub use config::Config;
pub mod error;
pub use error::{CommitError, ConflictError, Error, TreeError};
#[cfg(feature = "json")]
mod json;
/// Macros usable for tests and initialization
pub mod macros;
pub mod path;
pub use path::Path;
pub mod transaction;
pub use transaction::{CommitReport, FileCompletion, State, Substate, Transaction};
pub mod tree;

#[cfg(any(test, feature = "arbitrary"))]
mod test_util;
