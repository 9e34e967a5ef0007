// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Database, Storage};
use crate::{
    Config, Path,
    error::BoxError,
    tree::{
        FileNode, Metadata, NodeRef, ObjectNode, Snapshot, UpdateNode, ValueMap, snapshot::locate,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

/// An in-memory [`Database`] and [`Storage`].
///
/// All data lives in a single tree of the same nodes transactions are built from. Every write is
/// applied to the whole tree at once, so readers never observe half of an update.
///
/// ```
/// # futures::executor::block_on(async {
/// use serde_json::json;
/// use std::sync::Arc;
/// use treesync::{CacheBackend, Path, Transaction};
///
/// let cache = Arc::new(CacheBackend::new());
/// let mut tx = Transaction::for_backend(cache.clone());
/// tx.add_value(&Path::parse("/users/1/name"), json!("Alice")).unwrap();
/// let report = tx.commit(false).await.unwrap();
///
/// assert!(report.state.is_completed());
/// assert_eq!(cache.values()["users/1/name"], json!("Alice"));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct CacheBackend {
    root: Mutex<ObjectNode>,
    config: Config,
}

impl CacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            root: Mutex::default(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drops all stored data.
    pub fn clear(&self) {
        self.root.lock().clear();
    }

    /// All stored values, keyed by their path below the root. Files are left out.
    pub fn values(&self) -> ValueMap {
        self.root.lock().update_value()
    }

    /// A snapshot of everything stored.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(UpdateNode::Object(self.root.lock().clone()))
    }

    /// Generates a new key that sorts after all keys generated before it.
    #[cfg(feature = "ulid")]
    pub fn generate_auto_id(&self) -> String {
        ulid::Ulid::new().to_string()
    }
}

#[async_trait]
impl Database for CacheBackend {
    fn node(&self, path: &Path) -> Option<Snapshot> {
        if !path.is_rooted() {
            return None;
        }
        let root = self.root.lock();
        Some(locate(NodeRef::Object(&root), path.segments().as_slice()))
    }

    async fn update(&self, at: &Path, values: ValueMap) -> Result<(), BoxError> {
        let mut root = self.root.lock();
        // apply to a copy, so a failing entry leaves the stored tree untouched
        let mut updated = root.clone();
        updated.update(at, values, self.config.max_depth)?;
        updated.prune_removals();
        *root = updated;
        Ok(())
    }

    /// Applies every value leaf of `tree` like [`Database::update`] would, in tree order.
    async fn commit(&self, tree: &ObjectNode) -> Result<(), BoxError> {
        debug!(%tree, "applying transaction to the cache");
        let mut root = self.root.lock();
        let mut updated = root.clone();
        for value in tree.values() {
            updated.apply(value.clone().into(), self.config.max_depth)?;
        }
        updated.prune_removals();
        *root = updated;
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Snapshot, BoxError> {
        self.node(path)
            .ok_or_else(|| format!("cannot load {path}, which is not below the root").into())
    }
}

#[async_trait]
impl Storage for CacheBackend {
    /// Stores the blob and returns its metadata with the blob's `size` added.
    async fn put_file(
        &self,
        path: &Path,
        data: Bytes,
        mut metadata: Metadata,
    ) -> Result<Metadata, BoxError> {
        metadata.insert("size".to_string(), data.len().into());
        let node = FileNode::new(path.clone(), Some(data)).with_metadata(metadata.clone());
        self.root.lock().apply(node.into(), self.config.max_depth)?;
        Ok(metadata)
    }

    /// Deleting a blob that does not exist succeeds.
    async fn delete_file(&self, path: &Path) -> Result<(), BoxError> {
        let mut root = self.root.lock();
        match root.child(path) {
            Some(NodeRef::File(_)) => {
                root.remove_descendant(path);
                Ok(())
            }
            None => Ok(()),
            Some(node) => Err(format!("{path} holds a {}, not a file", node.kind()).into()),
        }
    }
}
