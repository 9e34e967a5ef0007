//! Tests of the commit protocol against a scripted backend.
//!
//! Values and files travel separately: values as one atomic update, files one by one. These tests
//! check what reaches the backend, and what happens when parts of a commit fail.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use treesync::{
    Error, FileCompletion, Path, State, Substate, Transaction,
    backend::{Database, Storage},
    error::BoxError,
    tree::{Metadata, Snapshot, ValueMap},
};

#[derive(Default)]
struct ScriptedBackend {
    reject_updates: bool,
    failing_files: Vec<Path>,
    updates: Mutex<Vec<(Path, ValueMap)>>,
    files: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn rejecting_updates() -> Self {
        Self {
            reject_updates: true,
            ..Self::default()
        }
    }

    fn failing_files(paths: &[&str]) -> Self {
        Self {
            failing_files: paths.iter().map(|path| Path::parse(path)).collect(),
            ..Self::default()
        }
    }

    fn check_file(&self, path: &Path) -> Result<(), BoxError> {
        if self.failing_files.contains(path) {
            return Err(format!("storage rejected {path}").into());
        }
        Ok(())
    }
}

#[async_trait]
impl Database for ScriptedBackend {
    async fn update(&self, at: &Path, values: ValueMap) -> Result<(), BoxError> {
        if self.reject_updates {
            return Err("permission denied".into());
        }
        self.updates.lock().push((at.clone(), values));
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Snapshot, BoxError> {
        Ok(Snapshot::missing(path.clone()))
    }
}

#[async_trait]
impl Storage for ScriptedBackend {
    async fn put_file(
        &self,
        path: &Path,
        _data: Bytes,
        metadata: Metadata,
    ) -> Result<Metadata, BoxError> {
        self.check_file(path)?;
        self.files.lock().push(format!("put {path}"));
        Ok(metadata)
    }

    async fn delete_file(&self, path: &Path) -> Result<(), BoxError> {
        self.check_file(path)?;
        self.files.lock().push(format!("delete {path}"));
        Ok(())
    }
}

type Log = Arc<std::sync::Mutex<Vec<&'static str>>>;

fn record(log: &Log, name: &'static str) -> impl FnOnce() + Send + 'static {
    let log = log.clone();
    move || log.lock().unwrap().push(name)
}

#[tokio::test]
async fn values_are_sent_once_from_the_nearest_common_ancestor() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut tx = Transaction::for_backend(backend.clone());
    tx.add_value(&Path::parse("/users/1/name"), "Alice").unwrap();
    tx.add_value(&Path::parse("/users/1/age"), 30).unwrap();
    tx.remove_value(&Path::parse("/users/1/nickname")).unwrap();
    tx.commit(false).await.unwrap();

    let updates = backend.updates.lock();
    let [(at, payload)] = updates.as_slice() else {
        panic!("expected exactly one update, got {updates:?}");
    };
    assert_eq!(at, &Path::parse("/users/1"));
    insta::assert_snapshot!(serde_json::to_string_pretty(payload).unwrap(), @r#"
    {
      "age": 30,
      "name": "Alice",
      "nickname": null
    }
    "#);
}

#[tokio::test]
async fn unrelated_branches_are_sent_from_the_root() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut tx = Transaction::for_backend(backend.clone());
    tx.add_value(&Path::parse("/a/x"), 1).unwrap();
    tx.add_value(&Path::parse("/b/y"), 2).unwrap();
    tx.commit(false).await.unwrap();

    let updates = backend.updates.lock();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, Path::root());
    assert_eq!(
        updates[0].1,
        ValueMap::from([("a/x".to_string(), json!(1)), ("b/y".to_string(), json!(2))])
    );
}

#[tokio::test]
async fn file_failures_do_not_fail_the_commit() {
    let backend = Arc::new(ScriptedBackend::failing_files(&["/files/bad"]));
    let log = Log::default();
    let mut tx = Transaction::for_backend(backend.clone());
    tx.add_value(&Path::parse("/x"), 1).unwrap();
    for key in ["good", "bad"] {
        let path = Path::root().child("files").child(key);
        tx.add_file(&path, Bytes::from_static(b"data")).unwrap();
        tx.add_file_reversion(path, record(&log, key));
    }
    tx.add_reversion(record(&log, "values"));

    let report = tx.commit(true).await.unwrap();

    assert_eq!(report.state, State::Completed);
    assert_eq!(report.substate, Substate::None);
    assert!(report.errors.is_empty());
    assert_eq!(backend.updates.lock().len(), 1);
    assert_eq!(*backend.files.lock(), ["put /files/good"]);

    let failed: Vec<&Path> = report.failed_files().map(FileCompletion::path).collect();
    assert_eq!(failed, [&Path::parse("/files/bad")]);
    // only the failed file is rolled back
    assert_eq!(*log.lock().unwrap(), ["bad"]);
}

#[tokio::test]
async fn file_reversions_need_revert_on_error() {
    let backend = Arc::new(ScriptedBackend::failing_files(&["/f"]));
    let log = Log::default();
    let mut tx = Transaction::for_backend(backend.clone());
    tx.add_file(&Path::parse("/f"), Bytes::from_static(b"data"))
        .unwrap();
    tx.add_file_reversion(Path::parse("/f"), record(&log, "f"));

    let report = tx.commit(false).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.failed_files().count(), 1);
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn file_only_transactions_skip_the_database() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut tx = Transaction::for_backend(backend.clone());
    tx.add_file(&Path::parse("/f"), Bytes::from_static(b"data"))
        .unwrap();
    tx.remove_file(&Path::parse("/g")).unwrap();

    let report = tx.commit(false).await.unwrap();
    assert!(report.is_success());
    assert!(backend.updates.lock().is_empty());
    assert!(matches!(
        report.files.as_slice(),
        [
            FileCompletion::Uploaded { .. },
            FileCompletion::Deleted { path }
        ] if path == &Path::parse("/g")
    ));
    assert_eq!(*backend.files.lock(), ["put /f", "delete /g"]);
}

#[tokio::test]
async fn rejected_updates_fail_and_revert() {
    let backend = Arc::new(ScriptedBackend::rejecting_updates());
    let log = Log::default();
    let outcome = Arc::new(std::sync::Mutex::new(None));
    let mut tx = Transaction::for_backend(backend.clone());
    tx.add_value(&Path::parse("/x"), 1).unwrap();
    tx.add_reversion(record(&log, "A"));
    tx.add_reversion(record(&log, "B"));
    tx.add_completion({
        let outcome = outcome.clone();
        move |success| *outcome.lock().unwrap() = Some(success)
    });

    let report = tx.commit(true).await.unwrap();

    assert_eq!(report.state, State::Failed);
    assert_eq!(report.substate, Substate::Reverted);
    assert!(matches!(
        report.errors.as_slice(),
        [Error::Database(error)] if error.to_string() == "permission denied"
    ));
    assert_eq!(*log.lock().unwrap(), ["B", "A"]);
    assert_eq!(*outcome.lock().unwrap(), Some(false));
    assert!(tx.is_failed());
    assert!(tx.is_invalidated());
}

#[tokio::test]
async fn failed_transactions_can_be_reverted_later() {
    let backend = Arc::new(ScriptedBackend::rejecting_updates());
    let log = Log::default();
    let mut tx = Transaction::for_backend(backend.clone());
    tx.add_value(&Path::parse("/x"), 1).unwrap();
    tx.add_file(&Path::parse("/f"), Bytes::from_static(b"data"))
        .unwrap();
    tx.add_reversion(record(&log, "value"));
    tx.add_file_reversion(Path::parse("/f"), record(&log, "file"));

    let report = tx.commit(false).await.unwrap();
    assert_eq!(report.state, State::Failed);
    assert_eq!(report.substate, Substate::None);
    assert!(log.lock().unwrap().is_empty());

    tx.revert();
    assert!(tx.is_reverted());
    assert_eq!(*log.lock().unwrap(), ["value", "file"]);
}

#[tokio::test]
async fn aborted_commits_revert_values_and_files() {
    let backend = Arc::new(ScriptedBackend::default());
    let log = Log::default();
    let mut tx = Transaction::for_backend(backend.clone());
    tx.add_value(&Path::parse("/x"), 1).unwrap();
    tx.add_file(&Path::parse("/f"), Bytes::from_static(b"data"))
        .unwrap();
    tx.add_reversion(record(&log, "value"));
    tx.add_file_reversion(Path::parse("/f"), record(&log, "file"));
    tx.add_precondition(|promise| promise.reject("stale data"));

    let report = tx.commit(true).await.unwrap();
    assert_eq!(report.state, State::Failed);
    assert_eq!(report.substate, Substate::Reverted);
    assert_eq!(*log.lock().unwrap(), ["value", "file"]);
    assert!(backend.updates.lock().is_empty());
    assert!(backend.files.lock().is_empty());
}
