// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use std::fmt;

/// Where a [`Transaction`](super::Transaction) is in its lifecycle.
///
/// ```text
/// waiting ──commit──▶ performing ──▶ completed
///    │                    └────────▶ failed
///    └──merged into another──▶ merged
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum State {
    /// Accepting writes and registrations.
    #[default]
    Waiting,
    /// Committing.
    Performing,
    /// The atomic update was accepted.
    Completed,
    /// A precondition, a scheduled merge or the atomic update failed.
    Failed,
    /// Absorbed into another transaction.
    Merged,
}

impl State {
    /// Whether the transaction has finished for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Failed | State::Merged)
    }

    pub fn is_completed(self) -> bool {
        self == State::Completed
    }

    pub fn is_failed(self) -> bool {
        self == State::Failed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Waiting => "waiting",
            State::Performing => "performing",
            State::Completed => "completed",
            State::Failed => "failed",
            State::Merged => "merged",
        })
    }
}

/// Whether the reversions of a transaction have run. Independent of [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Substate {
    #[default]
    None,
    Reverted,
}

impl fmt::Display for Substate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Substate::None => "none",
            Substate::Reverted => "reverted",
        })
    }
}

/// The state pair reported when a commit finishes.
pub type CommitState = (State, Substate);
