//! Lattice Graph -- persistent labeled-property graph engine.
//!
//! This crate composes the storage layer of `lattice-core` into a graph
//! database:
//!
//! - **Data** ([`data`]): `Value`, `Node`, `Edge` with typed accessors
//! - **Storage** ([`storage`]): `GraphStorage` composition (memory and
//!   disk) plus the `MainDb` metadata namespace
//! - **Names** ([`names`]): 16/32-bit bidirectional name interning
//! - **Graph** ([`graph`]): `GraphManager` with CRUD, traversal,
//!   introspection, and index queries
//! - **Index** ([`index`]): word-position and value-hash indices
//! - **Transactions** ([`trans`]): batched all-or-nothing commits
//! - **Rules** ([`rules`]): write pipeline callbacks (cascade delete,
//!   kind statistics)
//! - **Port** ([`port`]): portable JSON import/export
//! - **Errors** ([`error`]): the `GraphError` taxonomy
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use lattice_graph::data::{Node, Value};
//! use lattice_graph::graph::GraphManager;
//! use lattice_graph::storage::MemoryGraphStorage;
//!
//! let storage = Arc::new(MemoryGraphStorage::new("example").unwrap());
//! let gm = GraphManager::new(storage).unwrap();
//!
//! let mut node = Node::with_key_kind("123", "mykind");
//! node.set_attr("name", Some(Value::from("Some name")));
//! gm.store_node("main", node).unwrap();
//!
//! let fetched = gm.fetch_node("main", "123", "mykind").unwrap().unwrap();
//! assert_eq!(fetched.name(), Some("Some name"));
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod index;
pub mod iterator;
pub mod keys;
pub mod names;
pub mod port;
pub mod rules;
pub mod storage;
pub mod trans;

// Config
pub use config::GraphConfig;

// Data
pub use data::{is_valid_name, nodes_compare, nodes_merge, Edge, Node, Value};

// Errors
pub use error::{GraphError, GraphResult};

// Graph
pub use graph::{GraphManager, IndexQuery, VERSION};

// Index
pub use index::IndexManager;

// Iterator
pub use iterator::NodeKeyIterator;

// Names
pub use names::NamesManager;

// Port
pub use port::{export_partition, import_partition};

// Rules
pub use rules::{DeleteNodeEdgesRule, EventKind, GraphEvent, GraphRule, UpdateNodeStatsRule};

// Storage
pub use storage::{DiskGraphStorage, GraphStorage, MainDb, MemoryGraphStorage};

// Transactions
pub use trans::Transaction;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }

    #[test]
    fn engine_over_disk_storage_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");

        {
            let gs = Arc::new(DiskGraphStorage::open(dir.path()).expect("open"));
            let gm = GraphManager::new(gs).expect("manager");
            let mut node = Node::with_key_kind("123", "mykind");
            node.set_attr("name", Some(Value::from("durable")));
            gm.store_node("main", node).expect("store");
            gm.close().expect("close");
        }

        let gs = Arc::new(DiskGraphStorage::open(dir.path()).expect("reopen"));
        let gm = GraphManager::new(gs).expect("manager");
        let fetched = gm
            .fetch_node("main", "123", "mykind")
            .expect("fetch")
            .expect("present");
        assert_eq!(fetched.name(), Some("durable"));
        assert_eq!(gm.node_count("mykind"), 1);

        // The index survives too.
        let query = gm
            .node_index_query("main", "mykind")
            .expect("query")
            .expect("index exists");
        assert_eq!(query.count("name", "durable").expect("count"), 1);
    }

    #[test]
    fn reexports_accessible() {
        assert!(is_valid_name("main"));
        let _ = GraphConfig::default();
        let merged = nodes_merge(&Node::new(), &Node::new());
        assert!(nodes_compare(&merged, &Node::new(), None));
        assert_eq!(VERSION, 1);
    }
}
