// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The stores a [`Transaction`](crate::Transaction) commits to.
//!
//! A transaction talks to two collaborators:
//!
//! - a [`Database`], which applies JSON values as one atomic multi-path update below a common
//!   ancestor, and
//! - a [`Storage`], which uploads and deletes binary blobs one at a time.
//!
//! Both are usually backed by a remote service. [`CacheBackend`] implements both in memory, for
//! tests and offline use.

pub mod cache;

pub use cache::CacheBackend;

use crate::{
    Path,
    error::BoxError,
    tree::{Metadata, ObjectNode, Snapshot, ValueMap},
};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// A store of JSON values arranged as a tree.
#[async_trait]
pub trait Database: Send + Sync {
    /// The data cached locally for `path`, if any.
    ///
    /// This never goes to the network.
    fn node(&self, path: &Path) -> Option<Snapshot> {
        let _ = path;
        None
    }

    /// Atomically applies `values`, keyed by paths relative to `at`. `null` values delete.
    async fn update(&self, at: &Path, values: ValueMap) -> Result<(), BoxError>;

    /// Applies all pending values of `tree` as one update.
    ///
    /// The default implementation issues a single [`Database::update`] at the deepest ancestor all
    /// writes share, and succeeds without calling it if there are no values to write.
    async fn commit(&self, tree: &ObjectNode) -> Result<(), BoxError> {
        let nearest = tree.nearest_common();
        let values = nearest.update_value();
        if values.is_empty() {
            return Ok(());
        }
        debug!(at = %nearest.location(), values = values.len(), "sending atomic update");
        self.update(nearest.location(), values).await
    }

    /// Reads the current data at `path`.
    async fn load(&self, path: &Path) -> Result<Snapshot, BoxError>;
}

/// A store of binary blobs addressed by path.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Uploads `data` and returns the metadata the store recorded for it.
    async fn put_file(
        &self,
        path: &Path,
        data: Bytes,
        metadata: Metadata,
    ) -> Result<Metadata, BoxError>;

    /// Deletes the blob at `path`.
    async fn delete_file(&self, path: &Path) -> Result<(), BoxError>;
}
