//! Edge data type: a node with two described endpoints.

use std::collections::BTreeMap;
use std::fmt;

use crate::data::node::{index_map_excluding, Node};
use crate::data::{is_valid_name, Value};
use crate::error::{GraphError, GraphResult};

/// Reserved attribute: key of the first endpoint node.
pub const ATTR_END1_KEY: &str = "end1key";
/// Reserved attribute: kind of the first endpoint node.
pub const ATTR_END1_KIND: &str = "end1kind";
/// Reserved attribute: role of the first endpoint.
pub const ATTR_END1_ROLE: &str = "end1role";
/// Reserved attribute: cascading flag of the first endpoint.
pub const ATTR_END1_CASCADING: &str = "end1cascading";
/// Reserved attribute: key of the second endpoint node.
pub const ATTR_END2_KEY: &str = "end2key";
/// Reserved attribute: kind of the second endpoint node.
pub const ATTR_END2_KIND: &str = "end2kind";
/// Reserved attribute: role of the second endpoint.
pub const ATTR_END2_ROLE: &str = "end2role";
/// Reserved attribute: cascading flag of the second endpoint.
pub const ATTR_END2_CASCADING: &str = "end2cascading";

const ENDPOINT_STRING_ATTRS: [&str; 6] = [
    ATTR_END1_KEY,
    ATTR_END1_KIND,
    ATTR_END1_ROLE,
    ATTR_END2_KEY,
    ATTR_END2_KIND,
    ATTR_END2_ROLE,
];

/// A graph edge.
///
/// Structurally a [`Node`] whose reserved attributes additionally
/// describe two endpoints: `end{1,2}key`, `end{1,2}kind`,
/// `end{1,2}role` and the boolean `end{1,2}cascading` flags.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Edge {
    node: Node,
}

impl Edge {
    /// Creates an empty edge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a node carrying endpoint attributes.
    #[must_use]
    pub fn from_node(node: Node) -> Self {
        Self { node }
    }

    /// Creates an edge from a prepared attribute map.
    #[must_use]
    pub fn from_data(attrs: BTreeMap<String, Value>) -> Self {
        Self {
            node: Node::from_data(attrs),
        }
    }

    /// Borrows the underlying node.
    #[must_use]
    pub fn as_node(&self) -> &Node {
        &self.node
    }

    /// Consumes the edge, returning the underlying node.
    #[must_use]
    pub fn into_node(self) -> Node {
        self.node
    }

    /// The edge key, or `""` if unset.
    #[must_use]
    pub fn key(&self) -> &str {
        self.node.key()
    }

    /// The edge kind, or `""` if unset.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.node.kind()
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.node.attr(name)
    }

    /// Sets an attribute; `None` removes it.
    pub fn set_attr(&mut self, name: &str, value: Option<Value>) {
        self.node.set_attr(name, value);
    }

    /// All attributes, including the reserved ones.
    #[must_use]
    pub fn data(&self) -> &BTreeMap<String, Value> {
        self.node.data()
    }

    fn string_attr(&self, name: &str) -> &str {
        self.node.attr(name).and_then(Value::as_str).unwrap_or("")
    }

    /// Key of the first endpoint node.
    #[must_use]
    pub fn end1_key(&self) -> &str {
        self.string_attr(ATTR_END1_KEY)
    }

    /// Kind of the first endpoint node.
    #[must_use]
    pub fn end1_kind(&self) -> &str {
        self.string_attr(ATTR_END1_KIND)
    }

    /// Role of the first endpoint.
    #[must_use]
    pub fn end1_role(&self) -> &str {
        self.string_attr(ATTR_END1_ROLE)
    }

    /// Whether removing the first endpoint node removes the second.
    #[must_use]
    pub fn end1_is_cascading(&self) -> bool {
        self.node
            .attr(ATTR_END1_CASCADING)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Key of the second endpoint node.
    #[must_use]
    pub fn end2_key(&self) -> &str {
        self.string_attr(ATTR_END2_KEY)
    }

    /// Kind of the second endpoint node.
    #[must_use]
    pub fn end2_kind(&self) -> &str {
        self.string_attr(ATTR_END2_KIND)
    }

    /// Role of the second endpoint.
    #[must_use]
    pub fn end2_role(&self) -> &str {
        self.string_attr(ATTR_END2_ROLE)
    }

    /// Whether removing the second endpoint node removes the first.
    #[must_use]
    pub fn end2_is_cascading(&self) -> bool {
        self.node
            .attr(ATTR_END2_CASCADING)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The edge's incidence spec `role:kind:otherRole:otherKind` from
    /// the perspective of the given endpoint node, or `None` if the
    /// node is not an endpoint of this edge.
    #[must_use]
    pub fn spec(&self, self_key: &str, self_kind: &str) -> Option<String> {
        if self.end1_key() == self_key && self.end1_kind() == self_kind {
            Some(format!(
                "{}:{}:{}:{}",
                self.end1_role(),
                self.kind(),
                self.end2_role(),
                self.end2_kind()
            ))
        } else if self.end2_key() == self_key && self.end2_kind() == self_kind {
            Some(format!(
                "{}:{}:{}:{}",
                self.end2_role(),
                self.kind(),
                self.end1_role(),
                self.end1_kind()
            ))
        } else {
            None
        }
    }

    /// Whether `name` is reserved on edges.
    #[must_use]
    pub fn is_reserved_attr(name: &str) -> bool {
        Node::is_reserved_attr(name)
            || ENDPOINT_STRING_ATTRS.contains(&name)
            || name == ATTR_END1_CASCADING
            || name == ATTR_END2_CASCADING
    }

    /// String rendering of every non-reserved attribute for indexing.
    #[must_use]
    pub fn index_map(&self) -> BTreeMap<String, String> {
        index_map_excluding(self.node.data(), Edge::is_reserved_attr)
    }

    /// Checks identity, endpoint attributes, and their types.
    pub fn validate(&self) -> GraphResult<()> {
        self.node.validate()?;

        for attr in ENDPOINT_STRING_ATTRS {
            match self.node.attr(attr) {
                None => {
                    return Err(GraphError::InvalidData(format!(
                        "Edge is missing a {attr} value"
                    )));
                }
                Some(value) if value.as_str().is_none() => {
                    return Err(GraphError::InvalidData(format!(
                        "Edge {attr} value must be a string"
                    )));
                }
                Some(_) => {}
            }
        }

        for key_attr in [ATTR_END1_KEY, ATTR_END2_KEY] {
            if self.string_attr(key_attr).is_empty() {
                return Err(GraphError::InvalidData(format!(
                    "Edge {key_attr} value must not be empty"
                )));
            }
        }

        for kind in [self.end1_kind(), self.end2_kind()] {
            if !is_valid_name(kind) {
                return Err(GraphError::InvalidData(format!(
                    "Edge endpoint kind {kind} is not alphanumeric - can only contain [a-zA-Z0-9_]"
                )));
            }
        }

        for role in [self.end1_role(), self.end2_role()] {
            if !is_valid_name(role) {
                return Err(GraphError::InvalidData(format!(
                    "Edge role {role} is not alphanumeric - can only contain [a-zA-Z0-9_]"
                )));
            }
        }

        for attr in [ATTR_END1_CASCADING, ATTR_END2_CASCADING] {
            match self.node.attr(attr) {
                None => {
                    return Err(GraphError::InvalidData(format!(
                        "Edge is missing a {attr} value"
                    )));
                }
                Some(value) if value.as_bool().is_none() => {
                    return Err(GraphError::InvalidData(format!(
                        "Edge {attr} value must be a boolean"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GraphEdge:")?;
        for (name, value) in self.node.data() {
            writeln!(f, "    {name:>14} : {value}")?;
        }
        Ok(())
    }
}
