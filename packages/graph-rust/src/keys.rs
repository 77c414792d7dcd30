//! Storage key layout and record codecs.
//!
//! Inside the per-(partition, kind) trees, entry keys start with a
//! one-byte prefix followed by the node key:
//!
//! - `0x01 ‖ K` -> list of encoded attribute codes (attribute tree)
//! - `0x02 ‖ K ‖ attr-code` -> attribute value (value tree)
//! - `0x03 ‖ K` -> set of edge incidence specs (attribute tree)
//! - `0x04 ‖ K ‖ spec` -> per-spec edge map (value tree)
//!
//! The metadata map (`MainDb`) uses string keys with byte prefixes:
//! `\x01…` for the names manager and `\x02…` for kind lists, attribute
//! lists, spec lists, counters, and the version gate.

use std::collections::{BTreeMap, BTreeSet};

use serde_bytes::ByteBuf;

use crate::error::{GraphError, GraphResult};

/// Tree entry prefix: attribute-code list of an entity.
pub const PREFIX_ATTR_LIST: u8 = 0x01;
/// Tree entry prefix: single attribute value of an entity.
pub const PREFIX_ATTR_VALUE: u8 = 0x02;
/// Tree entry prefix: set of edge incidence specs of a node.
pub const PREFIX_EDGE_SPECS: u8 = 0x03;
/// Tree entry prefix: edges of a node for one incidence spec.
pub const PREFIX_SPEC_EDGES: u8 = 0x04;

/// MainDb key of the storage format version.
pub const MDB_VERSION: &str = "\u{2}ver";
/// MainDb key of the known node kinds set.
pub const MDB_NODE_KINDS: &str = "\u{2}nodekind";
/// MainDb key of the known edge kinds set.
pub const MDB_EDGE_KINDS: &str = "\u{2}edgekind";
/// MainDb key of the known partitions set.
pub const MDB_PARTITIONS: &str = "\u{2}part";

/// MainDb key of the attribute set observed for a node kind.
#[must_use]
pub fn mdb_node_attrs(kind: &str) -> String {
    format!("\u{2}natt{kind}")
}

/// MainDb key of the attribute set observed for an edge kind.
#[must_use]
pub fn mdb_edge_attrs(kind: &str) -> String {
    format!("\u{2}eatt{kind}")
}

/// MainDb key of the edge incidence specs observed on a node kind.
#[must_use]
pub fn mdb_node_edge_specs(kind: &str) -> String {
    format!("\u{2}nrel{kind}")
}

/// MainDb key of the node counter for a kind.
#[must_use]
pub fn mdb_node_count(kind: &str) -> String {
    format!("\u{2}ncnt{kind}")
}

/// MainDb key of the edge counter for a kind.
#[must_use]
pub fn mdb_edge_count(kind: &str) -> String {
    format!("\u{2}ecnt{kind}")
}

/// Storage manager name for the node store of a partition and kind.
#[must_use]
pub fn nodes_manager_name(part: &str, kind: &str) -> String {
    format!("{part}{kind}.nodes")
}

/// Storage manager name for the node index of a partition and kind.
#[must_use]
pub fn node_index_manager_name(part: &str, kind: &str) -> String {
    format!("{part}{kind}.nodeidx")
}

/// Storage manager name for the edge store of a partition and kind.
#[must_use]
pub fn edges_manager_name(part: &str, kind: &str) -> String {
    format!("{part}{kind}.edges")
}

/// Storage manager name for the edge index of a partition and kind.
#[must_use]
pub fn edge_index_manager_name(part: &str, kind: &str) -> String {
    format!("{part}{kind}.edgeidx")
}

fn prefixed_key(prefix: u8, key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(prefix);
    out.extend_from_slice(key.as_bytes());
    out
}

/// Key of an entity's attribute-code list.
#[must_use]
pub fn attr_list_key(key: &str) -> Vec<u8> {
    prefixed_key(PREFIX_ATTR_LIST, key)
}

/// Key of one attribute value of an entity.
#[must_use]
pub fn attr_value_key(key: &str, code: [u8; 4]) -> Vec<u8> {
    let mut out = prefixed_key(PREFIX_ATTR_VALUE, key);
    out.extend_from_slice(&code);
    out
}

/// Key of a node's edge incidence spec set.
#[must_use]
pub fn edge_specs_key(key: &str) -> Vec<u8> {
    prefixed_key(PREFIX_EDGE_SPECS, key)
}

/// Key of a node's edge map for one incidence spec.
#[must_use]
pub fn spec_edges_key(key: &str, spec: [u8; 8]) -> Vec<u8> {
    let mut out = prefixed_key(PREFIX_SPEC_EDGES, key);
    out.extend_from_slice(&spec);
    out
}

// ---------------------------------------------------------------------------
// Record codecs
// ---------------------------------------------------------------------------

/// List of 32-bit attribute codes (attribute-list tree entries).
pub type AttrCodeList = Vec<u32>;

/// Set of 8-byte edge incidence specs.
pub type EdgeSpecSet = BTreeSet<ByteBuf>;

/// Edge key -> (other endpoint key, other endpoint kind).
pub type SpecEdgeMap = BTreeMap<String, (String, String)>;

/// Encodes any persisted record, mapping failures to a write error.
pub fn encode_record<T: serde::Serialize>(record: &T) -> GraphResult<Vec<u8>> {
    rmp_serde::to_vec(record).map_err(GraphError::writing)
}

/// Decodes any persisted record, mapping failures to a read error.
pub fn decode_record<T: serde::de::DeserializeOwned>(data: &[u8]) -> GraphResult<T> {
    rmp_serde::from_slice(data).map_err(GraphError::reading)
}
