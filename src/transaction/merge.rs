// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{State, Transaction};
use crate::{
    error::ConflictError,
    tree::{ConflictResolver, IncomingWins, ObjectNode},
};
use std::mem;
use tracing::debug;

type BoxedResolver = Box<dyn ConflictResolver + Send + Sync>;

/// The writes of a transaction that was merged while still gated on preconditions.
///
/// Its preconditions now gate the transaction it was merged into; its writes are folded in once
/// they have resolved.
pub(crate) struct ScheduledMerge {
    update: ObjectNode,
    /// Merges scheduled on the merged transaction itself, settled into `update` first.
    scheduled: Vec<ScheduledMerge>,
    resolver: BoxedResolver,
}

impl ScheduledMerge {
    /// Folds nested merges into this one's writes, depth first.
    fn settle(mut self) -> Result<(ObjectNode, BoxedResolver), ConflictError> {
        for nested in mem::take(&mut self.scheduled) {
            let (update, mut resolver) = nested.settle()?;
            self.update.merge(update, &mut *resolver)?;
        }
        Ok((self.update, self.resolver))
    }
}

impl Transaction {
    /// Folds `other` into this transaction, with incoming writes winning.
    ///
    /// See [`Transaction::merge_with`].
    pub fn merge(&mut self, other: &mut Transaction) -> Result<(), ConflictError> {
        self.merge_with(other, IncomingWins)
    }

    /// Folds `other` into this transaction.
    ///
    /// Afterwards this transaction carries `other`'s writes, completions, reversions and file
    /// reversions, and `other` is [merged](State::Merged) and unusable. `other`'s reversions run as
    /// one group when this transaction is reverted, at the point in the undo order where the merge
    /// happened.
    ///
    /// If `other` is gated on preconditions, its writes cannot be trusted yet: its preconditions
    /// are adopted by this transaction, and its writes are only merged once they have resolved,
    /// during [`commit`](Transaction::commit). A conflict at that point fails the commit.
    ///
    /// # Errors
    ///
    /// If the writes of the two transactions conflict, see [`ObjectNode::merge`]. Neither
    /// transaction is changed in that case.
    ///
    /// # Panics
    ///
    /// If either transaction has been invalidated.
    pub fn merge_with<R>(&mut self, other: &mut Transaction, resolver: R) -> Result<(), ConflictError>
    where
        R: ConflictResolver + Send + Sync + 'static,
    {
        self.assert_valid("merge into a transaction");
        other.assert_valid("merge a transaction");

        if other.hooks.has_preconditions() {
            debug!(update = %other.update, "scheduling merge until preconditions resolve");
            self.hooks.adopt(other.hooks.detach());
            self.scheduled.push(ScheduledMerge {
                update: mem::take(&mut other.update),
                scheduled: mem::take(&mut other.scheduled),
                resolver: Box::new(resolver),
            });
        } else {
            let mut resolver = resolver;
            self.update.can_merge(&other.update, &resolver)?;
            self.update.merge(mem::take(&mut other.update), &mut resolver)?;
            self.hooks.adopt(other.hooks.detach());
            self.scheduled.append(&mut other.scheduled);
        }
        other.state = State::Merged;
        Ok(())
    }

    /// Applies merges that were waiting for preconditions, in the order they were scheduled.
    pub(super) fn settle_scheduled(&mut self) -> Result<(), ConflictError> {
        for scheduled in mem::take(&mut self.scheduled) {
            let (update, mut resolver) = scheduled.settle()?;
            debug!(%update, "applying scheduled merge");
            self.update.merge(update, &mut *resolver)?;
        }
        Ok(())
    }
}
