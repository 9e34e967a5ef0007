// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Tunables shared by transactions and the cache backend.

/// The nesting limit of the remote store. Writes below this depth are rejected.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Configuration for [`Transaction`](crate::transaction::Transaction)s and
/// [`CacheBackend`](crate::backend::CacheBackend)s.
///
/// With the `serde` feature this can be read from any serde format; missing fields fall back to
/// their defaults.
///
/// ```
/// use treesync::Config;
///
/// let config = Config::default().with_max_depth(8);
/// assert_eq!(config.max_depth, 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Deserialize, ::serde::Serialize),
    serde(default)
)]
pub struct Config {
    /// The maximum number of keys below the root a write may target.
    pub max_depth: usize,
}

impl Config {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
