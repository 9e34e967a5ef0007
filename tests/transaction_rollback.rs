//! Tests for transaction rollback behavior.
//!
//! A transaction usually changes local state right away and registers reversions to undo those
//! changes. When the transaction is reverted, or fails to commit with `revert_on_error`, the local
//! state must end up where it started and the backend must be untouched.

use bytes::Bytes;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use treesync::{CacheBackend, Path, State, Substate, Transaction};

/// A local model kept in step with pending writes.
type Model = Arc<Mutex<BTreeMap<&'static str, i64>>>;

fn set(tx: &mut Transaction, model: &Model, key: &'static str, value: i64) {
    tx.add_value(&Path::root().child(key), value).unwrap();
    let previous = model.lock().unwrap().insert(key, value);
    let model = model.clone();
    tx.add_reversion(move || {
        let mut model = model.lock().unwrap();
        match previous {
            Some(previous) => model.insert(key, previous),
            None => model.remove(key),
        };
    });
}

fn log() -> Arc<Mutex<Vec<&'static str>>> {
    Arc::default()
}

#[test]
fn reverting_restores_the_local_model() {
    let cache = Arc::new(CacheBackend::new());
    let model = Model::default();
    model.lock().unwrap().insert("a", 1);

    let mut tx = Transaction::for_backend(cache.clone());
    set(&mut tx, &model, "a", 2);
    set(&mut tx, &model, "b", 3);
    set(&mut tx, &model, "a", 4);
    assert_eq!(*model.lock().unwrap(), BTreeMap::from([("a", 4), ("b", 3)]));

    tx.revert();
    assert_eq!(*model.lock().unwrap(), BTreeMap::from([("a", 1)]));
    assert!(tx.update_node().is_empty());
    assert!(cache.values().is_empty());
}

#[test]
fn reversions_run_in_reverse_registration_order() {
    let order = log();
    let mut tx = Transaction::for_backend(Arc::new(CacheBackend::new()));
    tx.add_value(&Path::parse("/x"), 1).unwrap();
    for name in ["A", "B", "C"] {
        let order = order.clone();
        tx.add_reversion(move || order.lock().unwrap().push(name));
    }

    tx.revert();
    assert_eq!(*order.lock().unwrap(), ["C", "B", "A"]);
    assert_eq!(tx.state(), State::Waiting);
    assert_eq!(tx.substate(), Substate::Reverted);
}

#[test]
fn taken_reversions_move_to_the_new_owner() {
    let order = log();
    let mut tx = Transaction::for_backend(Arc::new(CacheBackend::new()));
    tx.add_value(&Path::parse("/x"), 1).unwrap();
    for name in ["A", "B"] {
        let order = order.clone();
        tx.add_reversion(move || order.lock().unwrap().push(name));
    }

    let undo = tx.take_reversion();
    tx.add_reversion({
        let order = order.clone();
        move || order.lock().unwrap().push("C")
    });
    tx.revert();
    assert_eq!(*order.lock().unwrap(), ["C"]);

    undo();
    assert_eq!(*order.lock().unwrap(), ["C", "B", "A"]);
}

#[test]
fn merged_reversions_run_as_one_group() {
    let cache = Arc::new(CacheBackend::new());
    let order = log();
    let record = |name| {
        let order = order.clone();
        move || order.lock().unwrap().push(name)
    };

    let mut tx = Transaction::for_backend(cache.clone());
    tx.add_value(&Path::parse("/a"), 1).unwrap();
    tx.add_reversion(record("A"));

    let mut other = Transaction::for_backend(cache.clone());
    other.add_value(&Path::parse("/b"), 2).unwrap();
    other.add_reversion(record("B1"));
    other.add_reversion(record("B2"));
    tx.merge(&mut other).unwrap();

    tx.add_reversion(record("C"));
    tx.revert();
    assert_eq!(*order.lock().unwrap(), ["C", "B2", "B1", "A"]);
}

#[test]
fn merged_file_reversions_run_incoming_first() {
    let cache = Arc::new(CacheBackend::new());
    let order = log();
    let record = |name| {
        let order = order.clone();
        move || order.lock().unwrap().push(name)
    };
    let path = Path::parse("/files/avatar");

    let mut tx = Transaction::for_backend(cache.clone());
    tx.add_file(&path, Bytes::from_static(b"old")).unwrap();
    tx.add_file_reversion(path.clone(), record("existing"));

    let mut other = Transaction::for_backend(cache.clone());
    other.add_file(&path, Bytes::from_static(b"new")).unwrap();
    other.add_file_reversion(path.clone(), record("incoming"));
    tx.merge(&mut other).unwrap();

    tx.revert();
    assert_eq!(*order.lock().unwrap(), ["incoming", "existing"]);
}

#[test]
fn reverting_values_keeps_file_reversions() {
    let order = log();
    let mut tx = Transaction::for_backend(Arc::new(CacheBackend::new()));
    tx.add_value(&Path::parse("/x"), 1).unwrap();
    tx.add_file(&Path::parse("/f"), Bytes::from_static(b"data"))
        .unwrap();
    tx.add_reversion({
        let order = order.clone();
        move || order.lock().unwrap().push("value")
    });
    tx.add_file_reversion(Path::parse("/f"), {
        let order = order.clone();
        move || order.lock().unwrap().push("file")
    });

    tx.revert_values();
    assert_eq!(*order.lock().unwrap(), ["value"]);
    assert!(tx.is_reverted());

    tx.revert_files();
    assert_eq!(*order.lock().unwrap(), ["value", "file"]);
}

#[test]
fn reverting_a_waiting_transaction_skips_completions() {
    let order = log();
    let mut tx = Transaction::for_backend(Arc::new(CacheBackend::new()));
    tx.add_value(&Path::parse("/x"), 1).unwrap();
    tx.add_completion({
        let order = order.clone();
        move |_| order.lock().unwrap().push("completion")
    });

    tx.revert();
    assert!(order.lock().unwrap().is_empty());
    assert!(tx.hooks().is_sealed());
}

#[tokio::test]
async fn aborted_commits_restore_the_local_model() {
    let cache = Arc::new(CacheBackend::new());
    let model = Model::default();
    let mut tx = Transaction::for_backend(cache.clone());
    set(&mut tx, &model, "a", 1);
    set(&mut tx, &model, "b", 2);
    tx.add_precondition(|promise| promise.reject("conflicting edit"));

    let report = tx.commit(true).await.unwrap();
    assert_eq!(report.state, State::Failed);
    assert_eq!(report.substate, Substate::Reverted);
    assert!(model.lock().unwrap().is_empty());
    assert!(cache.values().is_empty());
}

#[tokio::test]
async fn aborted_commits_keep_the_model_without_revert_on_error() {
    let cache = Arc::new(CacheBackend::new());
    let model = Model::default();
    let mut tx = Transaction::for_backend(cache.clone());
    set(&mut tx, &model, "a", 1);
    tx.add_precondition(|promise| promise.reject("conflicting edit"));

    let report = tx.commit(false).await.unwrap();
    assert_eq!(report.state, State::Failed);
    assert_eq!(report.substate, Substate::None);
    assert_eq!(*model.lock().unwrap(), BTreeMap::from([("a", 1)]));

    // the caller decides to undo after all
    tx.revert();
    assert!(model.lock().unwrap().is_empty());
}

#[tokio::test]
#[should_panic = "cannot revert"]
async fn completed_transactions_cannot_be_reverted() {
    let mut tx = Transaction::for_backend(Arc::new(CacheBackend::new()));
    tx.add_value(&Path::parse("/x"), 1).unwrap();
    tx.commit(false).await.unwrap();
    tx.revert();
}

#[test]
#[should_panic = "cannot revert"]
fn merged_transactions_cannot_be_reverted() {
    let cache = Arc::new(CacheBackend::new());
    let mut tx = Transaction::for_backend(cache.clone());
    let mut other = Transaction::for_backend(cache);
    other.add_value(&Path::parse("/x"), 1).unwrap();
    tx.merge(&mut other).unwrap();
    other.revert();
}
