// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! JSON representation
//!
//! Trees and snapshots can be rendered as a single nested document, which is handy for
//! inspecting pending writes and for reading back what a [`CacheBackend`](crate::CacheBackend)
//! holds. Files are rendered as base64 strings, and pending removals are left out.
//!
//! # Examples
//!
//! The writes `/users/1/name = "Alice"`, `/users/1/age = 30` and a file at `/users/1/avatar` render
//! as
//!
//! ```json
//! {
//!   "users": {
//!     "1": {
//!       "age": 30,
//!       "avatar": "cG5n",
//!       "name": "Alice"
//!     }
//!   }
//! }
//! ```
use crate::tree::{ObjectNode, Snapshot, UpdateNode};
use base64::Engine;
use bytes::Bytes;
use serde_json::{Map, Value};

fn file_to_json(data: &Bytes) -> Value {
    base64::engine::general_purpose::STANDARD.encode(data).into()
}

/// Renders a node, or `None` if it holds nothing.
fn node_to_json(node: &UpdateNode) -> Option<Value> {
    match node {
        UpdateNode::Value(node) => node.value.clone(),
        UpdateNode::File(node) => node.value.as_ref().map(file_to_json),
        UpdateNode::Object(node) => Some(node.to_json()),
    }
}

impl ObjectNode {
    /// Renders this subtree as a nested JSON object.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .children()
            .iter()
            .filter_map(|child| Some((child.key().to_string(), node_to_json(child)?)))
            .collect();
        Value::Object(map)
    }
}

impl Snapshot {
    /// Renders the data at this location, `null` if there is none.
    pub fn to_json(&self) -> Value {
        node_to_json(self.node()).unwrap_or(Value::Null)
    }
}

impl From<&ObjectNode> for Value {
    fn from(node: &ObjectNode) -> Self {
        node.to_json()
    }
}

impl From<&Snapshot> for Value {
    fn from(snapshot: &Snapshot) -> Self {
        snapshot.to_json()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Path,
        tree::{FileNode, ObjectNode, Snapshot, ValueNode},
    };
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn trees_render_nested() {
        let mut tree = ObjectNode::root();
        for (path, value) in [
            ("/users/1/name", Some(json!("Alice"))),
            ("/users/1/age", Some(json!(30))),
            ("/users/2", None),
        ] {
            tree.insert_value(ValueNode::new(Path::parse(path), value), 32)
                .unwrap();
        }
        tree.insert_file(
            FileNode::new(Path::parse("/users/1/avatar"), Some(Bytes::from_static(b"png"))),
            32,
        )
        .unwrap();

        assert_eq!(
            tree.to_json(),
            json!({"users": {"1": {"name": "Alice", "age": 30, "avatar": "cG5n"}}})
        );
    }

    #[test]
    fn missing_snapshots_render_null() {
        assert_eq!(Snapshot::missing(Path::parse("/x")).to_json(), json!(null));
    }
}
