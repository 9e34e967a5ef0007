// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Promise, State, Substate, Transaction, run_reversions};
use crate::{
    Path,
    backend::{Database, Storage},
    error::{BoxError, CommitError, Error},
    tree::{FileNode, Metadata, ObjectNode},
};
use futures::future::join_all;
use std::{fmt, mem};
use tracing::{debug, warn};

/// The outcome of uploading or deleting one file.
#[derive(Debug)]
pub enum FileCompletion {
    Uploaded { path: Path, metadata: Metadata },
    Deleted { path: Path },
    Failed { path: Path, error: BoxError },
}

impl FileCompletion {
    pub fn path(&self) -> &Path {
        match self {
            FileCompletion::Uploaded { path, .. }
            | FileCompletion::Deleted { path }
            | FileCompletion::Failed { path, .. } => path,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FileCompletion::Failed { .. })
    }
}

/// What happened during a commit.
#[derive(Debug)]
pub struct CommitReport {
    pub state: State,
    pub substate: Substate,
    /// Why the commit failed, empty on success.
    pub errors: Vec<Error>,
    /// One entry per pending file, in tree order. Empty if the commit failed before uploading.
    pub files: Vec<FileCompletion>,
}

impl CommitReport {
    /// Whether the values were committed. Files may still have failed individually.
    pub fn is_success(&self) -> bool {
        self.state.is_completed()
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &FileCompletion> {
        self.files.iter().filter(|file| file.is_failed())
    }
}

impl fmt::Display for CommitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if self.substate == Substate::Reverted {
            write!(f, " (reverted)")?;
        }
        for error in &self.errors {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl Transaction {
    /// Applies the pending writes.
    ///
    /// Preconditions are resolved first; if any of them fails, nothing is written. Transactions
    /// [merged](Transaction::merge) while gated on preconditions are folded in next. Then all
    /// values go to the database as one atomic update while files are uploaded or deleted one by
    /// one, concurrently.
    ///
    /// A failing file does not fail the commit, it is reported in [`CommitReport::files`]. Failed
    /// preconditions, failed merges and a rejected update do fail it, and are reported in
    /// [`CommitReport::errors`]. With `revert_on_error`, a failed commit runs the
    /// [reversions](super::Hooks::add_reversion), and every failed file runs its
    /// [file reversion](super::Hooks::add_file_reversion).
    ///
    /// Completions run before this returns. The transaction is invalidated afterwards.
    ///
    /// # Errors
    ///
    /// If the transaction has already been committed or merged, or there is nothing to commit.
    /// A transaction whose only writes come from gated merges fails with [`Error::Empty`] instead
    /// if those merges turn out to write nothing.
    pub async fn commit(&mut self, revert_on_error: bool) -> Result<CommitReport, CommitError> {
        if self.state != State::Waiting {
            return Err(CommitError::Invalidated(self.state));
        }
        if self.is_empty() {
            return Err(CommitError::Empty);
        }

        let mut errors = self.run_preconditions().await;
        if errors.is_empty() {
            match self.settle_scheduled() {
                Err(error) => errors.push(error.into()),
                // merged transactions may have been gated without writing anything
                Ok(()) if self.update.is_empty() => errors.push(Error::Empty),
                Ok(()) => {}
            }
        }
        if !errors.is_empty() {
            warn!(errors = errors.len(), "transaction aborted before writing");
            if revert_on_error {
                run_reversions(self.hooks.take_reversions());
                for (_, reversion) in self.hooks.take_file_reversions() {
                    reversion();
                }
                self.substate = Substate::Reverted;
            }
            self.state = State::Failed;
            self.invalidate(false);
            return Ok(self.report(errors, Vec::new()));
        }

        self.state = State::Performing;
        let tree = mem::take(&mut self.update);
        let files: Vec<FileNode> = tree.files().into_iter().cloned().collect();
        debug!(
            at = %tree.nearest_common().location(),
            values = tree.update_value().len(),
            files = files.len(),
            "committing transaction"
        );

        let (values, files) = futures::join!(
            commit_values(&*self.database, &tree),
            commit_files(&*self.storage, files)
        );

        for file in &files {
            let FileCompletion::Failed { path, error } = file else {
                continue;
            };
            warn!(%path, %error, "file commit failed");
            if revert_on_error {
                if let Some(reversion) = self.hooks.take_file_reversion(path) {
                    reversion();
                }
            }
        }

        let mut errors = Vec::new();
        match values {
            Ok(()) => self.state = State::Completed,
            Err(error) => {
                warn!(%error, "atomic update failed");
                self.state = State::Failed;
                if revert_on_error {
                    run_reversions(self.hooks.take_reversions());
                    self.substate = Substate::Reverted;
                }
                errors.push(Error::Database(error));
            }
        }
        self.invalidate(self.state == State::Completed);
        Ok(self.report(errors, files))
    }

    /// Like [`Transaction::commit`], reporting through callbacks.
    ///
    /// `on_done` receives the final state and the errors, then `on_files_done` receives the
    /// outcome of every file.
    pub async fn commit_with(
        &mut self,
        revert_on_error: bool,
        on_done: impl FnOnce(super::CommitState, Vec<Error>),
        on_files_done: impl FnOnce(Vec<FileCompletion>),
    ) -> Result<(), CommitError> {
        let report = self.commit(revert_on_error).await?;
        on_done((report.state, report.substate), report.errors);
        on_files_done(report.files);
        Ok(())
    }

    fn report(&self, errors: Vec<Error>, files: Vec<FileCompletion>) -> CommitReport {
        CommitReport {
            state: self.state,
            substate: self.substate,
            errors,
            files,
        }
    }

    /// Resolves preconditions until none are left.
    ///
    /// Preconditions registered while a batch runs form the next batch. Stops after the first
    /// batch with a failure.
    async fn run_preconditions(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        loop {
            let batch = self.hooks.take_preconditions();
            if batch.is_empty() {
                break;
            }
            debug!(preconditions = batch.len(), "resolving preconditions");
            let pending: Vec<_> = batch
                .into_iter()
                .map(|precondition| {
                    let (promise, receiver) = Promise::new(self.hooks.clone());
                    precondition(promise);
                    receiver
                })
                .collect();
            for outcome in join_all(pending).await {
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        warn!(%error, "precondition rejected");
                        errors.push(Error::Precondition(error));
                    }
                    Err(_canceled) => {
                        warn!("precondition dropped its promise");
                        errors.push(Error::PreconditionAbandoned);
                    }
                }
            }
            if !errors.is_empty() {
                break;
            }
        }
        errors
    }
}

/// Values only; file-only transactions never reach the database.
async fn commit_values(database: &dyn Database, tree: &ObjectNode) -> Result<(), BoxError> {
    if tree.update_value().is_empty() {
        return Ok(());
    }
    database.commit(tree).await
}

async fn commit_files(storage: &dyn Storage, files: Vec<FileNode>) -> Vec<FileCompletion> {
    join_all(files.into_iter().map(|file| async move {
        let FileNode {
            location: path,
            value,
            metadata,
        } = file;
        match value {
            Some(data) => match storage.put_file(&path, data, metadata).await {
                Ok(metadata) => FileCompletion::Uploaded { path, metadata },
                Err(error) => FileCompletion::Failed { path, error },
            },
            None => match storage.delete_file(&path).await {
                Ok(()) => FileCompletion::Deleted { path },
                Err(error) => FileCompletion::Failed { path, error },
            },
        }
    }))
    .await
}
