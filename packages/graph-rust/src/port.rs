//! Portable JSON import and export.
//!
//! A dump is a JSON object `{"nodes": […], "edges": […]}` where every
//! element is a flat attribute map. Export walks all node kinds of a
//! partition, emits every node, and follows wildcard traversal to
//! collect each edge once; import stages every node and then every
//! edge with store semantics in a single transaction. Only public
//! manager and transaction APIs are used.

use std::collections::{BTreeMap, HashSet};

use serde_json::json;

use crate::data::{Edge, Node, Value};
use crate::error::{GraphError, GraphResult};
use crate::graph::GraphManager;
use crate::trans::Transaction;

/// Exports all nodes and edges of one partition.
pub fn export_partition(gm: &GraphManager, part: &str) -> GraphResult<serde_json::Value> {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut seen_edges: HashSet<(String, String)> = HashSet::new();

    for kind in gm.node_kinds() {
        let Some(mut iter) = gm.node_key_iterator(part, &kind)? else {
            continue;
        };
        let keys: Vec<String> = iter.by_ref().collect();
        if let Some(err) = iter.last_error() {
            return Err(GraphError::reading(err));
        }

        for key in keys {
            let Some(node) = gm.fetch_node(part, &key, &kind)? else {
                continue;
            };
            nodes.push(attrs_to_json(node.data()));

            let (_, node_edges) = gm.traverse(part, &key, &kind, ":::")?;
            for edge in node_edges {
                let id = (edge.kind().to_string(), edge.key().to_string());
                if seen_edges.insert(id) {
                    edges.push(attrs_to_json(edge.data()));
                }
            }
        }
    }

    Ok(json!({ "nodes": nodes, "edges": edges }))
}

/// Imports a dump into one partition within a single transaction.
pub fn import_partition(
    gm: &GraphManager,
    part: &str,
    dump: &serde_json::Value,
) -> GraphResult<()> {
    let mut trans = Transaction::new(gm);

    for element in json_list(dump, "nodes")? {
        trans.store_node(part, Node::from_data(attrs_from_json(element)?))?;
    }
    for element in json_list(dump, "edges")? {
        trans.store_edge(part, Edge::from_data(attrs_from_json(element)?))?;
    }
    trans.commit()
}

fn json_list<'a>(
    dump: &'a serde_json::Value,
    field: &str,
) -> GraphResult<&'a Vec<serde_json::Value>> {
    dump.get(field)
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| {
            GraphError::InvalidData(format!("Dump is missing a {field} list"))
        })
}

fn attrs_to_json(attrs: &BTreeMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        attrs
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

fn attrs_from_json(element: &serde_json::Value) -> GraphResult<BTreeMap<String, Value>> {
    let object = element.as_object().ok_or_else(|| {
        GraphError::InvalidData("Dump elements must be attribute maps".to_string())
    })?;
    Ok(object
        .iter()
        .map(|(name, value)| (name.clone(), Value::from_json(value)))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::edge::{
        ATTR_END1_CASCADING, ATTR_END1_KEY, ATTR_END1_KIND, ATTR_END1_ROLE, ATTR_END2_CASCADING,
        ATTR_END2_KEY, ATTR_END2_KIND, ATTR_END2_ROLE,
    };
    use crate::storage::{GraphStorage, MemoryGraphStorage};

    fn make_manager() -> GraphManager {
        let gs = Arc::new(MemoryGraphStorage::new("test").expect("storage"));
        GraphManager::new(gs as Arc<dyn GraphStorage>).expect("manager")
    }

    fn seed_partition(gm: &GraphManager, part: &str) {
        let mut alice = Node::with_key_kind("alice", "person");
        alice.set_attr("name", Some(Value::from("Alice")));
        alice.set_attr("age", Some(Value::Int(30)));
        gm.store_node(part, alice).expect("store");

        let mut bob = Node::with_key_kind("bob", "person");
        bob.set_attr("name", Some(Value::from("Bob")));
        gm.store_node(part, bob).expect("store");

        let mut edge = Edge::from_node(Node::with_key_kind("knows1", "knows"));
        edge.set_attr(ATTR_END1_KEY, Some(Value::from("alice")));
        edge.set_attr(ATTR_END1_KIND, Some(Value::from("person")));
        edge.set_attr(ATTR_END1_ROLE, Some(Value::from("friend")));
        edge.set_attr(ATTR_END1_CASCADING, Some(Value::from(false)));
        edge.set_attr(ATTR_END2_KEY, Some(Value::from("bob")));
        edge.set_attr(ATTR_END2_KIND, Some(Value::from("person")));
        edge.set_attr(ATTR_END2_ROLE, Some(Value::from("friend")));
        edge.set_attr(ATTR_END2_CASCADING, Some(Value::from(false)));
        edge.set_attr("since", Some(Value::Int(2019)));
        gm.store_edge(part, edge).expect("store");
    }

    #[test]
    fn export_contains_every_node_and_each_edge_once() {
        let gm = make_manager();
        seed_partition(&gm, "main");

        let dump = export_partition(&gm, "main").expect("export");
        assert_eq!(dump["nodes"].as_array().expect("nodes").len(), 2);
        // The edge is reachable from both endpoints but emitted once.
        assert_eq!(dump["edges"].as_array().expect("edges").len(), 1);
        assert_eq!(dump["edges"][0]["since"], json!(2019));
    }

    #[test]
    fn round_trip_into_a_fresh_manager_preserves_everything() {
        let gm = make_manager();
        seed_partition(&gm, "main");
        let dump = export_partition(&gm, "main").expect("export");

        let fresh = make_manager();
        import_partition(&fresh, "second", &dump).expect("import");

        for key in ["alice", "bob"] {
            let original = gm
                .fetch_node("main", key, "person")
                .expect("fetch")
                .expect("present");
            let imported = fresh
                .fetch_node("second", key, "person")
                .expect("fetch")
                .expect("present");
            assert_eq!(original.data(), imported.data());
        }

        let original = gm
            .fetch_edge("main", "knows1", "knows")
            .expect("fetch")
            .expect("present");
        let imported = fresh
            .fetch_edge("second", "knows1", "knows")
            .expect("fetch")
            .expect("present");
        assert_eq!(original.data(), imported.data());

        assert_eq!(fresh.node_count("person"), 2);
        assert_eq!(fresh.edge_count("knows"), 1);

        // Traversal works in the imported partition.
        let (nodes, edges) = fresh
            .traverse("second", "alice", "person", ":::")
            .expect("traverse");
        assert_eq!(nodes.len(), 1);
        assert_eq!(edges.len(), 1);
        assert_eq!(nodes[0].key(), "bob");
    }

    #[test]
    fn export_of_an_empty_partition_is_empty() {
        let gm = make_manager();
        let dump = export_partition(&gm, "main").expect("export");
        assert_eq!(dump["nodes"].as_array().expect("nodes").len(), 0);
        assert_eq!(dump["edges"].as_array().expect("edges").len(), 0);
    }

    #[test]
    fn import_rejects_malformed_dumps() {
        let gm = make_manager();
        assert!(import_partition(&gm, "main", &json!({})).is_err());
        assert!(import_partition(&gm, "main", &json!({ "nodes": 5, "edges": [] })).is_err());
    }
}
