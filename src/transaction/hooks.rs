// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Callbacks attached to a transaction.
//!
//! A transaction carries four kinds of callbacks besides its writes:
//!
//! - **preconditions** gate the commit. Each receives a [`Promise`] and must eventually
//!   [fulfill](Promise::fulfill) or [reject](Promise::reject) it, typically after an asynchronous
//!   check such as reading the current data.
//! - **reversions** undo local side effects of the transaction. They run most recent first.
//! - **file reversions** undo the local side effects of a single file write, and only run when that
//!   file fails to upload.
//! - **completions** learn whether the commit succeeded. They run in registration order.
//!
//! All of them are kept in a [`Hooks`] registry shared between the transaction and every promise
//! it hands out, so that a precondition can register further callbacks while it runs.

use crate::{Path, error::BoxError};
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::{fmt, mem, sync::Arc};

pub(crate) type Precondition = Box<dyn FnOnce(Promise) + Send>;
pub(crate) type Reversion = Box<dyn FnOnce() + Send>;
pub(crate) type Completion = Box<dyn FnOnce(bool) + Send>;

/// The callbacks of one transaction.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) preconditions: Vec<Precondition>,
    pub(crate) reversions: Vec<Reversion>,
    pub(crate) completions: Vec<Completion>,
    pub(crate) file_reversions: ahash::HashMap<Path, Reversion>,
    sealed: bool,
}

impl Registry {
    /// Absorbs the callbacks of another transaction.
    ///
    /// Its reversions become a single reversion on top of ours, still running most recent first.
    /// If both transactions registered a file reversion for the same path, both run, theirs first.
    pub(crate) fn adopt(&mut self, other: Registry) {
        let Registry {
            preconditions,
            reversions,
            completions,
            file_reversions,
            sealed: _,
        } = other;

        self.preconditions.extend(preconditions);
        if !reversions.is_empty() {
            self.reversions.push(Box::new(move || run_reversions(reversions)));
        }
        self.completions.extend(completions);
        for (path, incoming) in file_reversions {
            let reversion = match self.file_reversions.remove(&path) {
                Some(existing) => chain(incoming, existing),
                None => incoming,
            };
            self.file_reversions.insert(path, reversion);
        }
    }
}

fn chain(first: Reversion, then: Reversion) -> Reversion {
    Box::new(move || {
        first();
        then();
    })
}

/// Runs reversions most recent first.
pub(crate) fn run_reversions(reversions: Vec<Reversion>) {
    for reversion in reversions.into_iter().rev() {
        reversion();
    }
}

/// A handle for registering callbacks on a transaction.
///
/// Cloning the handle does not clone the registry. Registering on the handle of a transaction that
/// has already finished panics, the same way registering on the transaction itself does.
#[derive(Clone, Default)]
pub struct Hooks(Arc<Mutex<Registry>>);

impl Hooks {
    /// Runs `f` on the registry, unless it is sealed.
    ///
    /// The lock is only held while `f` runs, and `f` never calls into user code.
    fn register(&self, what: &str, f: impl FnOnce(&mut Registry)) {
        let mut registry = self.0.lock();
        if registry.sealed {
            drop(registry);
            panic!("cannot register a {what} on a transaction that has already finished");
        }
        f(&mut registry);
    }

    /// Gates the commit on `precondition`.
    ///
    /// Preconditions run concurrently when the commit starts. A precondition registered while
    /// others run is started once they have all resolved.
    ///
    /// # Panics
    ///
    /// If the transaction has already finished.
    pub fn add_precondition(&self, precondition: impl FnOnce(Promise) + Send + 'static) {
        self.register("precondition", |registry| {
            registry.preconditions.push(Box::new(precondition))
        });
    }

    /// Registers an undo action. Undo actions run most recent first.
    ///
    /// # Panics
    ///
    /// If the transaction has already finished.
    pub fn add_reversion(&self, reversion: impl FnOnce() + Send + 'static) {
        self.register("reversion", |registry| {
            registry.reversions.push(Box::new(reversion))
        });
    }

    /// Registers an undo action for the file written at `path`.
    ///
    /// It runs only if that file fails to upload or delete while committing with
    /// `revert_on_error`, or when the transaction's files are reverted. Registering a second
    /// reversion for the same path runs both, the later one first.
    ///
    /// # Panics
    ///
    /// If the transaction has already finished.
    pub fn add_file_reversion(&self, path: Path, reversion: impl FnOnce() + Send + 'static) {
        self.register("file reversion", |registry| {
            let reversion: Reversion = Box::new(reversion);
            let reversion = match registry.file_reversions.remove(&path) {
                Some(existing) => chain(reversion, existing),
                None => reversion,
            };
            registry.file_reversions.insert(path, reversion);
        });
    }

    /// Registers a callback that learns whether the commit succeeded.
    ///
    /// # Panics
    ///
    /// If the transaction has already finished.
    pub fn add_completion(&self, completion: impl FnOnce(bool) + Send + 'static) {
        self.register("completion", |registry| {
            registry.completions.push(Box::new(completion))
        });
    }

    /// Whether the transaction has finished and accepts no more callbacks.
    pub fn is_sealed(&self) -> bool {
        self.0.lock().sealed
    }

    pub(crate) fn has_preconditions(&self) -> bool {
        !self.0.lock().preconditions.is_empty()
    }

    pub(crate) fn take_preconditions(&self) -> Vec<Precondition> {
        mem::take(&mut self.0.lock().preconditions)
    }

    pub(crate) fn take_reversions(&self) -> Vec<Reversion> {
        mem::take(&mut self.0.lock().reversions)
    }

    pub(crate) fn take_completions(&self) -> Vec<Completion> {
        mem::take(&mut self.0.lock().completions)
    }

    pub(crate) fn take_file_reversion(&self, path: &Path) -> Option<Reversion> {
        self.0.lock().file_reversions.remove(path)
    }

    pub(crate) fn take_file_reversions(&self) -> Vec<(Path, Reversion)> {
        self.0.lock().file_reversions.drain().collect()
    }

    pub(crate) fn adopt(&self, other: Registry) {
        self.0.lock().adopt(other);
    }

    /// Takes all callbacks and seals the registry.
    pub(crate) fn detach(&self) -> Registry {
        let mut registry = self.0.lock();
        let detached = mem::take(&mut *registry);
        registry.sealed = true;
        detached
    }

    /// Seals the registry and drops the callbacks that can no longer run.
    ///
    /// With `keep_reversions`, reversions and file reversions stay available to a later revert.
    pub(crate) fn close(&self, keep_reversions: bool) {
        let mut registry = self.0.lock();
        registry.sealed = true;
        let preconditions = mem::take(&mut registry.preconditions);
        let completions = mem::take(&mut registry.completions);
        let reversions = if keep_reversions {
            (Vec::new(), ahash::HashMap::default())
        } else {
            (
                mem::take(&mut registry.reversions),
                mem::take(&mut registry.file_reversions),
            )
        };
        drop(registry);
        // dropped outside the lock, callbacks may own other hooks
        drop((preconditions, completions, reversions));
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.0.lock();
        f.debug_struct("Hooks")
            .field("preconditions", &registry.preconditions.len())
            .field("reversions", &registry.reversions.len())
            .field("completions", &registry.completions.len())
            .field("file_reversions", &registry.file_reversions.len())
            .field("sealed", &registry.sealed)
            .finish()
    }
}

/// The outcome a precondition reports.
///
/// Dropping a promise without resolving it fails the commit.
#[must_use = "a precondition must fulfill or reject its promise"]
pub struct Promise {
    sender: oneshot::Sender<Result<(), BoxError>>,
    hooks: Hooks,
}

impl Promise {
    pub(crate) fn new(hooks: Hooks) -> (Self, oneshot::Receiver<Result<(), BoxError>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender, hooks }, receiver)
    }

    /// Lets the commit proceed.
    pub fn fulfill(self) {
        // the commit may have been abandoned, nobody is left to tell
        let _ = self.sender.send(Ok(()));
    }

    /// Fails the commit with `error`.
    pub fn reject(self, error: impl Into<BoxError>) {
        let _ = self.sender.send(Err(error.into()));
    }

    /// The callbacks of the transaction being committed.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (Arc<StdMutex<Vec<&'static str>>>, impl Fn(&'static str) -> Reversion) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |name: &'static str| -> Reversion {
                let log = log.clone();
                Box::new(move || log.lock().unwrap().push(name))
            }
        };
        (log, make)
    }

    #[test]
    fn adopted_reversions_run_as_one_group() {
        let (log, reversion) = recorder();
        let mut ours = Registry::default();
        ours.reversions.push(reversion("a"));
        let mut theirs = Registry::default();
        theirs.reversions.push(reversion("x"));
        theirs.reversions.push(reversion("y"));
        ours.adopt(theirs);
        ours.reversions.push(reversion("b"));

        run_reversions(mem::take(&mut ours.reversions));
        assert_eq!(*log.lock().unwrap(), ["b", "y", "x", "a"]);
    }

    #[test]
    fn colliding_file_reversions_are_chained() {
        let (log, reversion) = recorder();
        let path = Path::parse("/f");
        let mut ours = Registry::default();
        ours.file_reversions.insert(path.clone(), reversion("ours"));
        let mut theirs = Registry::default();
        theirs.file_reversions.insert(path.clone(), reversion("theirs"));
        ours.adopt(theirs);

        (ours.file_reversions.remove(&path).unwrap())();
        assert_eq!(*log.lock().unwrap(), ["theirs", "ours"]);
    }

    #[test]
    #[should_panic = "already finished"]
    fn sealed_registries_reject_callbacks() {
        let hooks = Hooks::default();
        hooks.close(false);
        hooks.add_completion(|_| {});
    }

    #[test]
    fn dropped_promises_close_their_channel() {
        let (promise, mut receiver) = Promise::new(Hooks::default());
        drop(promise);
        assert!(receiver.try_recv().is_err());
    }
}
