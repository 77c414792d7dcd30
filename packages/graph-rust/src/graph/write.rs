//! Mutation internals of the graph manager.
//!
//! These functions assume the caller holds the writer lock (directly or
//! through a committing transaction). They stage nothing themselves:
//! every tree write happens immediately, the transaction argument only
//! tracks touched managers, collects index errors, and receives the
//! follow-up mutations rules stage.

use serde_bytes::ByteBuf;
use tracing::debug;

use lattice_core::htree::HTree;

use crate::data::node::Node;
use crate::data::{nodes_merge, Edge};
use crate::error::{GraphError, GraphResult};
use crate::graph::GraphManager;
use crate::keys::{
    attr_list_key, attr_value_key, decode_record, edge_specs_key, encode_record, mdb_edge_count,
    mdb_node_count, spec_edges_key, AttrCodeList, EdgeSpecSet, SpecEdgeMap,
};
use crate::rules::GraphEvent;
use crate::trans::Transaction;

/// What a content write found in place.
pub(crate) enum WriteOutcome {
    /// No previous entity existed.
    Created,
    /// A previous entity was overwritten; its old state is returned.
    Updated(Node),
}

impl GraphManager {
    /// Writes a node: content, counter, index, and rules.
    ///
    /// With `merge` set, the given attributes are merged over the stored
    /// node (update semantics, never removing attributes); otherwise all
    /// non-reserved attributes are overwritten.
    pub(crate) fn store_node_tx(
        &self,
        part: &str,
        node: Node,
        merge: bool,
        trans: &mut Transaction<'_>,
    ) -> GraphResult<()> {
        Self::check_partition(part)?;
        node.validate()?;

        let node = if merge {
            match self.fetch_node_unlocked(part, node.key(), node.kind())? {
                Some(current) => nodes_merge(&current, &node),
                None => node,
            }
        } else {
            node
        };

        let kind = node.kind().to_string();
        let store = self
            .node_store(part, &kind, true)?
            .ok_or_else(|| storage_unavailable(part, &kind))?;
        trans.touch_node(part, &kind);

        let outcome =
            self.write_entity_attrs(&store.attrs, &store.values, node.key(), &kind, &node)?;
        let index = self
            .node_index_manager(part, &kind, true)?
            .ok_or_else(|| storage_unavailable(part, &kind))?;

        match outcome {
            WriteOutcome::Created => {
                self.main
                    .set_counter(&mdb_node_count(&kind), self.node_count(&kind) + 1);
                if let Err(err) = index.index(node.key(), &node.index_map()) {
                    trans.record_index_error(&err);
                }
                debug!(part, kind = kind.as_str(), key = node.key(), "node created");
                self.fire_event(trans, &GraphEvent::NodeCreated { part, node: &node })?;
            }
            WriteOutcome::Updated(old) => {
                if let Err(err) =
                    index.reindex(node.key(), &node.index_map(), &old.index_map())
                {
                    trans.record_index_error(&err);
                }
                debug!(part, kind = kind.as_str(), key = node.key(), "node updated");
                self.fire_event(
                    trans,
                    &GraphEvent::NodeUpdated {
                        part,
                        node: &node,
                        old: &old,
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Removes a node: content, counter, index, and rules. The node's
    /// edge bookkeeping entries stay until the delete rule removes the
    /// edges themselves.
    pub(crate) fn remove_node_tx(
        &self,
        part: &str,
        key: &str,
        kind: &str,
        trans: &mut Transaction<'_>,
    ) -> GraphResult<Option<Node>> {
        Self::check_part_and_kind(part, kind)?;
        let Some(store) = self.node_store(part, kind, false)? else {
            return Ok(None);
        };
        let Some(old) = self.remove_entity_attrs(&store.attrs, &store.values, key, kind)? else {
            return Ok(None);
        };
        trans.touch_node(part, kind);

        self.main
            .set_counter(&mdb_node_count(kind), self.node_count(kind).saturating_sub(1));
        if let Some(index) = self.node_index_manager(part, kind, false)? {
            if let Err(err) = index.deindex(key, &old.index_map()) {
                trans.record_index_error(&err);
            }
        }
        debug!(part, kind, key, "node removed");
        self.fire_event(trans, &GraphEvent::NodeDeleted { part, node: &old })?;
        Ok(Some(old))
    }

    /// Writes an edge: endpoint checks, endpoint bookkeeping, content,
    /// counter, index, and rules.
    pub(crate) fn store_edge_tx(
        &self,
        part: &str,
        edge: Edge,
        merge: bool,
        trans: &mut Transaction<'_>,
    ) -> GraphResult<()> {
        Self::check_partition(part)?;
        edge.validate()?;

        let edge = if merge {
            match self.fetch_edge_unlocked(part, edge.key(), edge.kind())? {
                Some(current) => {
                    let merged = Edge::from_node(nodes_merge(current.as_node(), edge.as_node()));
                    merged.validate()?;
                    merged
                }
                None => edge,
            }
        } else {
            edge
        };

        for (endpoint_key, endpoint_kind) in [
            (edge.end1_key(), edge.end1_kind()),
            (edge.end2_key(), edge.end2_kind()),
        ] {
            let exists = match self.node_store(part, endpoint_kind, false)? {
                Some(store) => store
                    .attrs
                    .exists(&attr_list_key(endpoint_key))
                    .map_err(GraphError::reading)?,
                None => false,
            };
            if !exists {
                return Err(GraphError::InvalidData(format!(
                    "Can't find edge endpoint: {endpoint_key} ({endpoint_kind})"
                )));
            }
        }

        let kind = edge.kind().to_string();
        let store = self
            .edge_store(part, &kind, true)?
            .ok_or_else(|| storage_unavailable(part, &kind))?;
        trans.touch_edge(part, &kind);

        // The previous edge state drives both the bookkeeping swap and
        // the reindex diff.
        let old_edge = self
            .read_entity(&store.tree, &store.tree, edge.key(), &kind)?
            .map(Edge::from_node);
        if let Some(old) = &old_edge {
            self.remove_endpoint_refs(part, old, trans)?;
        }
        self.add_endpoint_refs(part, &edge, trans)?;

        let _ = self.write_entity_attrs(
            &store.tree,
            &store.tree,
            edge.key(),
            &kind,
            edge.as_node(),
        )?;
        let index = self
            .edge_index_manager(part, &kind, true)?
            .ok_or_else(|| storage_unavailable(part, &kind))?;

        match old_edge {
            None => {
                self.main
                    .set_counter(&mdb_edge_count(&kind), self.edge_count(&kind) + 1);
                if let Err(err) = index.index(edge.key(), &edge.index_map()) {
                    trans.record_index_error(&err);
                }
                debug!(part, kind = kind.as_str(), key = edge.key(), "edge created");
                self.fire_event(trans, &GraphEvent::EdgeCreated { part, edge: &edge })?;
            }
            Some(old) => {
                if let Err(err) =
                    index.reindex(edge.key(), &edge.index_map(), &old.index_map())
                {
                    trans.record_index_error(&err);
                }
                debug!(part, kind = kind.as_str(), key = edge.key(), "edge updated");
                self.fire_event(
                    trans,
                    &GraphEvent::EdgeUpdated {
                        part,
                        edge: &edge,
                        old: &old,
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Removes an edge: content, endpoint bookkeeping, counter, index,
    /// and rules.
    pub(crate) fn remove_edge_tx(
        &self,
        part: &str,
        key: &str,
        kind: &str,
        trans: &mut Transaction<'_>,
    ) -> GraphResult<Option<Edge>> {
        Self::check_part_and_kind(part, kind)?;
        let Some(store) = self.edge_store(part, kind, false)? else {
            return Ok(None);
        };
        let Some(old_node) = self.remove_entity_attrs(&store.tree, &store.tree, key, kind)?
        else {
            return Ok(None);
        };
        let old = Edge::from_node(old_node);
        trans.touch_edge(part, kind);

        self.remove_endpoint_refs(part, &old, trans)?;
        self.main
            .set_counter(&mdb_edge_count(kind), self.edge_count(kind).saturating_sub(1));
        if let Some(index) = self.edge_index_manager(part, kind, false)? {
            if let Err(err) = index.deindex(key, &old.index_map()) {
                trans.record_index_error(&err);
            }
        }
        debug!(part, kind, key, "edge removed");
        self.fire_event(trans, &GraphEvent::EdgeDeleted { part, edge: &old })?;
        Ok(Some(old))
    }

    // -----------------------------------------------------------------------
    // Attribute plumbing
    // -----------------------------------------------------------------------

    /// Writes an entity's attribute list and values, capturing the
    /// previous state. Attributes present before but absent now are
    /// removed (overwrite semantics; merge is resolved by the caller).
    fn write_entity_attrs(
        &self,
        attrs_tree: &HTree,
        values_tree: &HTree,
        key: &str,
        kind: &str,
        entity: &Node,
    ) -> GraphResult<WriteOutcome> {
        let mut new_codes: AttrCodeList = Vec::new();
        let mut encoded: Vec<(&str, [u8; 4])> = Vec::new();
        for name in entity.data().keys() {
            if Node::is_reserved_attr(name) {
                continue;
            }
            let code = self.names.encode32(name, true).ok_or_else(|| {
                GraphError::Writing(format!("Could not intern attribute {name}"))
            })?;
            new_codes.push(u32::from_le_bytes(code));
            encoded.push((name.as_str(), code));
        }

        let old_list = attrs_tree
            .put(&attr_list_key(key), encode_record(&new_codes)?)
            .map_err(GraphError::writing)?;
        let old_codes: Option<AttrCodeList> = match old_list {
            Some(data) => Some(decode_record(&data)?),
            None => None,
        };

        let mut old_entity = Node::with_key_kind(key, kind);
        for (name, code) in encoded {
            let value = entity
                .attr(name)
                .ok_or_else(|| GraphError::Writing(format!("Missing attribute {name}")))?;
            let previous = values_tree
                .put(&attr_value_key(key, code), encode_record(value)?)
                .map_err(GraphError::writing)?;
            if let Some(data) = previous {
                old_entity.set_attr(name, Some(decode_record(&data)?));
            }
        }

        if let Some(old_codes) = &old_codes {
            for &code in old_codes {
                if new_codes.contains(&code) {
                    continue;
                }
                let code_bytes = code.to_le_bytes();
                if let Some(data) = values_tree
                    .remove(&attr_value_key(key, code_bytes))
                    .map_err(GraphError::writing)?
                {
                    let name = self.names.decode32(code_bytes).ok_or_else(|| {
                        GraphError::Reading(format!("Unknown attribute code {code}"))
                    })?;
                    old_entity.set_attr(&name, Some(decode_record(&data)?));
                }
            }
        }

        Ok(if old_codes.is_some() {
            WriteOutcome::Updated(old_entity)
        } else {
            WriteOutcome::Created
        })
    }

    /// Removes an entity's attribute list and values, returning its
    /// previous state.
    fn remove_entity_attrs(
        &self,
        attrs_tree: &HTree,
        values_tree: &HTree,
        key: &str,
        kind: &str,
    ) -> GraphResult<Option<Node>> {
        let Some(list_data) = attrs_tree
            .remove(&attr_list_key(key))
            .map_err(GraphError::writing)?
        else {
            return Ok(None);
        };
        let codes: AttrCodeList = decode_record(&list_data)?;

        let mut entity = Node::with_key_kind(key, kind);
        for code in codes {
            let code_bytes = code.to_le_bytes();
            if let Some(data) = values_tree
                .remove(&attr_value_key(key, code_bytes))
                .map_err(GraphError::writing)?
            {
                let name = self.names.decode32(code_bytes).ok_or_else(|| {
                    GraphError::Reading(format!("Unknown attribute code {code}"))
                })?;
                entity.set_attr(&name, Some(decode_record(&data)?));
            }
        }
        Ok(Some(entity))
    }

    // -----------------------------------------------------------------------
    // Endpoint bookkeeping
    // -----------------------------------------------------------------------

    /// Records an edge in both endpoints' spec sets and per-spec edge
    /// maps.
    fn add_endpoint_refs(
        &self,
        part: &str,
        edge: &Edge,
        trans: &mut Transaction<'_>,
    ) -> GraphResult<()> {
        for (this_key, this_kind, this_role, other_key, other_kind, other_role) in
            endpoint_views(edge)
        {
            let store = self.node_store(part, this_kind, false)?.ok_or_else(|| {
                GraphError::InvalidData(format!(
                    "Can't find edge endpoint: {this_key} ({this_kind})"
                ))
            })?;
            trans.touch_node(part, this_kind);
            let spec = self.encode_spec(this_role, edge.kind(), other_role, other_kind)?;

            let specs_key = edge_specs_key(this_key);
            let mut specs: EdgeSpecSet = match store
                .attrs
                .get(&specs_key)
                .map_err(GraphError::reading)?
            {
                Some(data) => decode_record(&data)?,
                None => EdgeSpecSet::new(),
            };
            if specs.insert(ByteBuf::from(spec.to_vec())) {
                store
                    .attrs
                    .put(&specs_key, encode_record(&specs)?)
                    .map_err(GraphError::writing)?;
            }

            let map_key = spec_edges_key(this_key, spec);
            let mut map: SpecEdgeMap = match store
                .values
                .get(&map_key)
                .map_err(GraphError::reading)?
            {
                Some(data) => decode_record(&data)?,
                None => SpecEdgeMap::new(),
            };
            map.insert(
                edge.key().to_string(),
                (other_key.to_string(), other_kind.to_string()),
            );
            store
                .values
                .put(&map_key, encode_record(&map)?)
                .map_err(GraphError::writing)?;
        }
        Ok(())
    }

    /// Removes an edge from both endpoints' bookkeeping, dropping map
    /// and spec entries that become empty.
    fn remove_endpoint_refs(
        &self,
        part: &str,
        edge: &Edge,
        trans: &mut Transaction<'_>,
    ) -> GraphResult<()> {
        for (this_key, this_kind, this_role, _, other_kind, other_role) in endpoint_views(edge) {
            let Some(store) = self.node_store(part, this_kind, false)? else {
                continue;
            };
            trans.touch_node(part, this_kind);
            let spec = self.encode_spec(this_role, edge.kind(), other_role, other_kind)?;

            let map_key = spec_edges_key(this_key, spec);
            let Some(map_data) = store
                .values
                .get(&map_key)
                .map_err(GraphError::reading)?
            else {
                continue;
            };
            let mut map: SpecEdgeMap = decode_record(&map_data)?;
            map.remove(edge.key());

            if map.is_empty() {
                store.values.remove(&map_key).map_err(GraphError::writing)?;

                let specs_key = edge_specs_key(this_key);
                if let Some(specs_data) = store
                    .attrs
                    .get(&specs_key)
                    .map_err(GraphError::reading)?
                {
                    let mut specs: EdgeSpecSet = decode_record(&specs_data)?;
                    specs.remove(&ByteBuf::from(spec.to_vec()));
                    if specs.is_empty() {
                        store
                            .attrs
                            .remove(&specs_key)
                            .map_err(GraphError::writing)?;
                    } else {
                        store
                            .attrs
                            .put(&specs_key, encode_record(&specs)?)
                            .map_err(GraphError::writing)?;
                    }
                }
            } else {
                store
                    .values
                    .put(&map_key, encode_record(&map)?)
                    .map_err(GraphError::writing)?;
            }
        }
        Ok(())
    }
}

/// The edge's endpoints as (key, kind, role, other key, other kind,
/// other role) tuples, once from each side.
fn endpoint_views(edge: &Edge) -> [(&str, &str, &str, &str, &str, &str); 2] {
    [
        (
            edge.end1_key(),
            edge.end1_kind(),
            edge.end1_role(),
            edge.end2_key(),
            edge.end2_kind(),
            edge.end2_role(),
        ),
        (
            edge.end2_key(),
            edge.end2_kind(),
            edge.end2_role(),
            edge.end1_key(),
            edge.end1_kind(),
            edge.end1_role(),
        ),
    ]
}

fn storage_unavailable(part: &str, kind: &str) -> GraphError {
    GraphError::AccessComponent(format!(
        "Could not create storage managers for {part} {kind}"
    ))
}
