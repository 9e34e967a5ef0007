// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Implementation of the quickcheck::Arbitrary trait for paths and tree writes.

use crate::Path;
use quickcheck::{Arbitrary, Gen};
use serde_json::Value;

// A tiny alphabet makes paths collide often, which is where the interesting tree behavior is.
const KEYS: &[&str] = &["a", "b", "c", "users", "1", "2", "name"];

fn arbitrary_key(g: &mut Gen) -> String {
    (*g.choose(KEYS).expect("KEYS is not empty")).to_string()
}

impl Arbitrary for Path {
    fn arbitrary(g: &mut Gen) -> Self {
        let depth = usize::arbitrary(g) % 6;
        // Skew towards rooted paths, which are the only ones that can be written.
        let mut path = if u8::arbitrary(g) % 8 == 0 {
            Path::detached(arbitrary_key(g))
        } else {
            Path::root()
        };
        for _ in 0..depth {
            path = path.child(arbitrary_key(g));
        }
        path
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        // shrinking a path means dropping trailing keys
        let ancestors: Vec<Path> = self
            .ancestors()
            .skip(1)
            .filter(|path| !path.is_root())
            .cloned()
            .collect();
        Box::new(ancestors.into_iter())
    }
}

/// A single write against a rooted, non-root path.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "arbitrary", allow(dead_code))]
pub(crate) struct Write {
    pub(crate) path: Path,
    pub(crate) value: Option<Value>,
}

impl Arbitrary for Write {
    fn arbitrary(g: &mut Gen) -> Self {
        let depth = 1 + usize::arbitrary(g) % 4;
        let mut path = Path::root();
        for _ in 0..depth {
            path = path.child(arbitrary_key(g));
        }
        let value = match u8::arbitrary(g) % 4 {
            0 => None,
            1 => Some(Value::Bool(bool::arbitrary(g))),
            2 => Some(Value::String(arbitrary_key(g))),
            _ => Some(Value::from(u32::arbitrary(g))),
        };
        Self { path, value }
    }
}
