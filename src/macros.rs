// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Macros usable for tests and initialization

/// Creates a rooted [`Path`](crate::Path) from a list of keys.
///
/// Each key can be any expression implementing [`ToString`], so numeric identifiers can be used
/// directly. A `/` inside a key starts a new segment, as with [`Path::child`](crate::Path::child).
///
/// ```
/// use treesync::{Path, path};
///
/// let id = 42;
/// assert_eq!(path!("users", id, "name"), Path::parse("/users/42/name"));
/// assert_eq!(path!(), Path::root());
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($key:expr),+ $(,)?) => {
        $crate::Path::root()$(.child(::std::string::ToString::to_string(&$key)))+
    };
}
