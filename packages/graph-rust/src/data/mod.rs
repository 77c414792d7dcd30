//! Graph data model: attribute values, nodes, and edges.
//!
//! Nodes and edges are capability sets over a plain attribute map; no
//! inheritance is involved. An [`Edge`] is a [`Node`] with additional
//! reserved attributes describing its two endpoints.

pub mod edge;
pub mod node;
pub mod value;

pub use edge::Edge;
pub use node::Node;
pub use value::Value;

/// Whether a partition, kind, or role name sticks to `[a-zA-Z0-9_]+`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Compares two nodes by all attributes, or by the given subset.
#[must_use]
pub fn nodes_compare(a: &Node, b: &Node, attrs: Option<&[&str]>) -> bool {
    match attrs {
        None => a.data() == b.data(),
        Some(attrs) => attrs.iter().all(|name| a.attr(name) == b.attr(name)),
    }
}

/// Returns `a`'s data overlaid with `b`'s entries.
#[must_use]
pub fn nodes_merge(a: &Node, b: &Node) -> Node {
    let mut merged = a.clone();
    for (name, value) in b.data() {
        merged.set_attr(name, Some(value.clone()));
    }
    merged
}
