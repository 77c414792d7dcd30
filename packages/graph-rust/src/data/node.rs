//! Node data type: an attribute map with typed accessors.

use std::collections::BTreeMap;
use std::fmt;

use crate::data::{is_valid_name, Value};
use crate::error::{GraphError, GraphResult};

/// Reserved attribute holding the node key.
pub const ATTR_KEY: &str = "key";

/// Reserved attribute holding the node kind.
pub const ATTR_KIND: &str = "kind";

/// Conventional attribute holding a display name.
pub const ATTR_NAME: &str = "name";

/// A graph node: a mapping from attribute names to values.
///
/// Identity is the reserved `key` and `kind` attributes together with
/// the partition a node is stored in. Everything else is free-form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    attrs: BTreeMap<String, Value>,
}

impl Node {
    /// Creates an empty node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a node with its identity attributes set.
    #[must_use]
    pub fn with_key_kind(key: &str, kind: &str) -> Self {
        let mut node = Self::new();
        node.set_attr(ATTR_KEY, Some(Value::from(key)));
        node.set_attr(ATTR_KIND, Some(Value::from(kind)));
        node
    }

    /// Creates a node from a prepared attribute map.
    #[must_use]
    pub fn from_data(attrs: BTreeMap<String, Value>) -> Self {
        Self { attrs }
    }

    /// The node key, or `""` if unset or mistyped.
    #[must_use]
    pub fn key(&self) -> &str {
        self.attrs
            .get(ATTR_KEY)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// The node kind, or `""` if unset or mistyped.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.attrs
            .get(ATTR_KIND)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// The conventional display name attribute, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attrs.get(ATTR_NAME).and_then(Value::as_str)
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Sets an attribute; `None` removes it.
    pub fn set_attr(&mut self, name: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                self.attrs.insert(name.to_string(), value);
            }
            None => {
                self.attrs.remove(name);
            }
        }
    }

    /// All attributes, including the reserved ones.
    #[must_use]
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    /// Consumes the node, returning its attribute map.
    #[must_use]
    pub fn into_data(self) -> BTreeMap<String, Value> {
        self.attrs
    }

    /// Whether `name` is reserved on nodes.
    #[must_use]
    pub fn is_reserved_attr(name: &str) -> bool {
        name == ATTR_KEY || name == ATTR_KIND
    }

    /// String rendering of every non-reserved attribute, suitable for
    /// full-text indexing.
    ///
    /// Strings render as-is, nested maps recurse with a dot-joined
    /// prefix, byte values are skipped, and everything else is JSON
    /// encoded (with a printable fallback should that produce an empty
    /// object).
    #[must_use]
    pub fn index_map(&self) -> BTreeMap<String, String> {
        index_map_excluding(&self.attrs, Node::is_reserved_attr)
    }

    /// Checks the identity attributes and attribute names.
    pub fn validate(&self) -> GraphResult<()> {
        if self.key().is_empty() {
            return Err(GraphError::InvalidData(
                "Node is missing a key value".to_string(),
            ));
        }
        let kind = self.kind();
        if kind.is_empty() {
            return Err(GraphError::InvalidData(
                "Node is missing a kind value".to_string(),
            ));
        }
        if !is_valid_name(kind) {
            return Err(GraphError::InvalidData(format!(
                "Node kind {kind} is not alphanumeric - can only contain [a-zA-Z0-9_]"
            )));
        }
        for name in self.attrs.keys() {
            if name.is_empty() {
                return Err(GraphError::InvalidData(
                    "Node contains an empty string attribute name".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GraphNode:")?;
        for (name, value) in &self.attrs {
            writeln!(f, "    {name:>12} : {value}")?;
        }
        Ok(())
    }
}

/// Shared attribute flattening used by node and edge `index_map`.
pub(crate) fn index_map_excluding(
    attrs: &BTreeMap<String, Value>,
    reserved: fn(&str) -> bool,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in attrs {
        if !reserved(name) {
            flatten_into(&mut out, name, value);
        }
    }
    out
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: &str, value: &Value) {
    match value {
        Value::Str(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Map(entries) => {
            for (name, value) in entries {
                flatten_into(out, &format!("{prefix}.{name}"), value);
            }
        }
        Value::Bytes(_) => {}
        other => {
            let rendered = other.to_json().to_string();
            let rendered = if rendered == "{}" {
                format!("{other:?}")
            } else {
                rendered
            };
            out.insert(prefix.to_string(), rendered);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kind_and_name_accessors() {
        let mut node = Node::with_key_kind("123", "mykind");
        node.set_attr(ATTR_NAME, Some(Value::from("Some name")));

        assert_eq!(node.key(), "123");
        assert_eq!(node.kind(), "mykind");
        assert_eq!(node.name(), Some("Some name"));
    }

    #[test]
    fn missing_identity_reads_as_empty() {
        let node = Node::new();
        assert_eq!(node.key(), "");
        assert_eq!(node.kind(), "");
        assert_eq!(node.name(), None);
    }

    #[test]
    fn mistyped_identity_reads_as_empty() {
        let mut node = Node::new();
        node.set_attr(ATTR_KEY, Some(Value::Int(42)));
        assert_eq!(node.key(), "");
    }

    #[test]
    fn set_attr_none_removes() {
        let mut node = Node::with_key_kind("k", "kind");
        node.set_attr("extra", Some(Value::Int(1)));
        assert!(node.attr("extra").is_some());

        node.set_attr("extra", None);
        assert!(node.attr("extra").is_none());
    }

    #[test]
    fn validate_accepts_well_formed_nodes() {
        let mut node = Node::with_key_kind("123", "my_kind2");
        node.set_attr("anything goes here", Some(Value::Null));
        assert!(node.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_key() {
        let mut node = Node::new();
        node.set_attr(ATTR_KIND, Some(Value::from("kind")));
        let err = node.validate().expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "GraphError: Invalid data (Node is missing a key value)"
        );
    }

    #[test]
    fn validate_rejects_non_alphanumeric_kind() {
        let node = Node::with_key_kind("123", "a b");
        let err = node.validate().expect_err("must fail");
        assert!(err.to_string().contains("not alphanumeric"));
    }

    #[test]
    fn validate_rejects_empty_attribute_name() {
        let mut node = Node::with_key_kind("123", "kind");
        node.set_attr("", Some(Value::Int(1)));
        assert!(node.validate().is_err());
    }

    #[test]
    fn index_map_skips_reserved_and_bytes() {
        let mut node = Node::with_key_kind("123", "kind");
        node.set_attr("text", Some(Value::from("as is")));
        node.set_attr("blob", Some(Value::Bytes(vec![1, 2, 3])));
        node.set_attr("count", Some(Value::Int(9)));

        let map = node.index_map();
        assert_eq!(map.get("text").map(String::as_str), Some("as is"));
        assert_eq!(map.get("count").map(String::as_str), Some("9"));
        assert!(!map.contains_key("blob"));
        assert!(!map.contains_key(ATTR_KEY));
        assert!(!map.contains_key(ATTR_KIND));
    }

    #[test]
    fn index_map_flattens_nested_maps_with_dots() {
        let mut inner = BTreeMap::new();
        inner.insert("city".to_string(), Value::from("Berlin"));
        inner.insert("zip".to_string(), Value::Int(10115));

        let mut node = Node::with_key_kind("123", "kind");
        node.set_attr("address", Some(Value::Map(inner)));

        let map = node.index_map();
        assert_eq!(map.get("address.city").map(String::as_str), Some("Berlin"));
        assert_eq!(map.get("address.zip").map(String::as_str), Some("10115"));
    }

    #[test]
    fn display_lists_attributes() {
        let mut node = Node::with_key_kind("123", "mykind");
        node.set_attr(ATTR_NAME, Some(Value::from("Some name")));
        let rendered = node.to_string();
        assert!(rendered.contains("GraphNode:"));
        assert!(rendered.contains("key"));
        assert!(rendered.contains("Some name"));
    }
}
