//! The graph manager: CRUD, traversal, and introspection over composed
//! hash-trees.
//!
//! For every (partition, kind) the manager lazily materializes four
//! storage managers: `<part><kind>.nodes` (attribute-list tree at root
//! slot 2, attribute-value tree at slot 3), `.nodeidx`, `.edges`, and
//! `.edgeidx` (one tree each at slot 2). A single readers-writer lock
//! guards all mutating paths of one manager instance; rules get a clone
//! sharing storage and names but holding a fresh lock.
//!
//! Mutations run through [`Transaction`]s even for the single-operation
//! APIs, so rules fire identically on both paths, followed by the
//! deterministic flush order: MainDb, node indices, node stores, edge
//! indices, edge stores.

mod write;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use lattice_core::htree::HTree;
use lattice_core::storage::NIL_LOCATION;

use crate::config::GraphConfig;
use crate::data::{is_valid_name, Edge, Node, Value};
use crate::error::{GraphError, GraphResult};
use crate::index::IndexManager;
use crate::iterator::NodeKeyIterator;
use crate::keys::{
    attr_list_key, attr_value_key, decode_record, edge_index_manager_name, edge_specs_key,
    edges_manager_name, mdb_edge_attrs, mdb_edge_count, mdb_node_attrs, mdb_node_count,
    mdb_node_edge_specs, node_index_manager_name, nodes_manager_name, spec_edges_key,
    AttrCodeList, EdgeSpecSet, SpecEdgeMap, MDB_EDGE_KINDS, MDB_NODE_KINDS, MDB_PARTITIONS,
    MDB_VERSION,
};
use crate::names::NamesManager;
use crate::rules::{
    aggregate_rule_errors, DeleteNodeEdgesRule, GraphEvent, GraphRule, RulesRegistry,
    UpdateNodeStatsRule,
};
use crate::storage::{
    GraphStorage, MainDb, ROOT_SLOT_PRIMARY_TREE, ROOT_SLOT_SECONDARY_TREE,
};
use crate::trans::Transaction;

/// Storage format version written to (and checked against) the MainDb.
pub const VERSION: u64 = 1;

/// The graph engine's central object.
pub struct GraphManager {
    pub(crate) gs: Arc<dyn GraphStorage>,
    pub(crate) main: Arc<MainDb>,
    pub(crate) names: NamesManager,
    pub(crate) config: GraphConfig,
    pub(crate) rules: Arc<RwLock<RulesRegistry>>,
    pub(crate) lock: RwLock<()>,
}

/// The two trees of a `.nodes` manager.
pub(crate) struct NodeStore {
    pub(crate) attrs: HTree,
    pub(crate) values: HTree,
}

/// The single tree of an `.edges` or index manager.
pub(crate) struct TreeStore {
    pub(crate) tree: HTree,
}

/// One component of a traversal spec template.
enum SpecComponent {
    /// Empty component: matches anything.
    Any,
    /// Known name: matches its interned code.
    Code([u8; 2]),
    /// Name never interned: matches nothing.
    Unknown,
}

impl std::fmt::Debug for GraphManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphManager").finish_non_exhaustive()
    }
}

impl GraphManager {
    /// Opens a graph manager with default configuration.
    pub fn new(gs: Arc<dyn GraphStorage>) -> GraphResult<Self> {
        Self::with_config(gs, GraphConfig::default())
    }

    /// Opens a graph manager, checking and maintaining the version gate.
    pub fn with_config(gs: Arc<dyn GraphStorage>, config: GraphConfig) -> GraphResult<Self> {
        let main = gs.main_db();

        match main.get(MDB_VERSION) {
            None => {
                main.put(MDB_VERSION, VERSION.to_string().into_bytes());
                main.flush()?;
            }
            Some(data) => {
                let found: u64 = String::from_utf8_lossy(&data)
                    .parse()
                    .map_err(|err| GraphError::AccessComponent(format!(
                        "Unreadable storage version: {err}"
                    )))?;
                if found > VERSION {
                    return Err(GraphError::AccessComponent(format!(
                        "Storage is at version {found}; this engine only supports up to version {VERSION}"
                    )));
                }
                if found < VERSION {
                    main.put(MDB_VERSION, VERSION.to_string().into_bytes());
                    main.flush()?;
                }
            }
        }

        let names = NamesManager::new(Arc::clone(&main));
        let mut registry = RulesRegistry::default();
        registry.register(Arc::new(DeleteNodeEdgesRule));
        registry.register(Arc::new(UpdateNodeStatsRule));

        Ok(Self {
            gs,
            main,
            names,
            config,
            rules: Arc::new(RwLock::new(registry)),
            lock: RwLock::new(()),
        })
    }

    /// Name of the underlying storage.
    #[must_use]
    pub fn name(&self) -> String {
        self.gs.name().to_string()
    }

    /// Registers an additional rule.
    pub fn register_rule(&self, rule: Arc<dyn GraphRule>) {
        self.rules.write().register(rule);
    }

    /// Clone handed to rules: shared storage, names, and rules, but a
    /// fresh lock so rules can read while the writer lock is held.
    pub(crate) fn clone_for_rules(&self) -> GraphManager {
        GraphManager {
            gs: Arc::clone(&self.gs),
            main: Arc::clone(&self.main),
            names: self.names.clone(),
            config: self.config.clone(),
            rules: Arc::clone(&self.rules),
            lock: RwLock::new(()),
        }
    }

    /// Fans one event out to all subscribed rules, aggregating failures.
    pub(crate) fn fire_event(
        &self,
        trans: &mut Transaction<'_>,
        event: &GraphEvent<'_>,
    ) -> GraphResult<()> {
        let rules = self.rules.read().matching(event.kind());
        if rules.is_empty() {
            return Ok(());
        }
        let clone = self.clone_for_rules();
        let mut errors = Vec::new();
        for rule in rules {
            if let Err(err) = rule.handle(&clone, trans, event) {
                errors.push(err.to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(aggregate_rule_errors(errors))
        }
    }

    /// Flushes the MainDb and releases the storage.
    pub fn close(&self) -> GraphResult<()> {
        self.main.flush()?;
        self.gs.close()
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// All partitions that ever held data.
    #[must_use]
    pub fn partitions(&self) -> Vec<String> {
        self.main.get_string_set(MDB_PARTITIONS).into_iter().collect()
    }

    /// All node kinds that were ever stored.
    #[must_use]
    pub fn node_kinds(&self) -> Vec<String> {
        self.main.get_string_set(MDB_NODE_KINDS).into_iter().collect()
    }

    /// All edge kinds that were ever stored.
    #[must_use]
    pub fn edge_kinds(&self) -> Vec<String> {
        self.main.get_string_set(MDB_EDGE_KINDS).into_iter().collect()
    }

    /// Attribute names ever observed on nodes of a kind.
    #[must_use]
    pub fn node_attrs(&self, kind: &str) -> Vec<String> {
        self.main
            .get_string_set(&mdb_node_attrs(kind))
            .into_iter()
            .collect()
    }

    /// Attribute names ever observed on edges of a kind.
    #[must_use]
    pub fn edge_attrs(&self, kind: &str) -> Vec<String> {
        self.main
            .get_string_set(&mdb_edge_attrs(kind))
            .into_iter()
            .collect()
    }

    /// Edge incidence specs ever observed on nodes of a kind.
    #[must_use]
    pub fn node_edges(&self, kind: &str) -> Vec<String> {
        self.main
            .get_string_set(&mdb_node_edge_specs(kind))
            .into_iter()
            .collect()
    }

    /// Number of stored nodes of a kind, across all partitions.
    #[must_use]
    pub fn node_count(&self, kind: &str) -> u64 {
        self.main.get_counter(&mdb_node_count(kind))
    }

    /// Number of stored edges of a kind, across all partitions.
    #[must_use]
    pub fn edge_count(&self, kind: &str) -> u64 {
        self.main.get_counter(&mdb_edge_count(kind))
    }

    /// Whether a name is a reserved attribute or was ever interned.
    #[must_use]
    pub fn is_valid_attr(&self, name: &str) -> bool {
        Edge::is_reserved_attr(name) || self.names.encode32(name, false).is_some()
    }

    // -----------------------------------------------------------------------
    // Fetch and traversal
    // -----------------------------------------------------------------------

    /// Fetches a node by partition, key, and kind.
    pub fn fetch_node(&self, part: &str, key: &str, kind: &str) -> GraphResult<Option<Node>> {
        let _guard = self.lock.read();
        self.fetch_node_unlocked(part, key, kind)
    }

    /// Fetches only the listed attributes of a node.
    pub fn fetch_node_part(
        &self,
        part: &str,
        key: &str,
        kind: &str,
        attrs: &[&str],
    ) -> GraphResult<Option<Node>> {
        let _guard = self.lock.read();
        Self::check_part_and_kind(part, kind)?;
        let Some(store) = self.node_store(part, kind, false)? else {
            return Ok(None);
        };
        if !store
            .attrs
            .exists(&attr_list_key(key))
            .map_err(GraphError::reading)?
        {
            return Ok(None);
        }

        let mut node = Node::with_key_kind(key, kind);
        for name in attrs {
            if Node::is_reserved_attr(name) {
                continue;
            }
            let Some(code) = self.names.encode32(name, false) else {
                continue;
            };
            if let Some(data) = store
                .values
                .get(&attr_value_key(key, code))
                .map_err(GraphError::reading)?
            {
                let value: Value = decode_record(&data)?;
                node.set_attr(name, Some(value));
            }
        }
        Ok(Some(node))
    }

    /// Fetches an edge by partition, key, and kind.
    pub fn fetch_edge(&self, part: &str, key: &str, kind: &str) -> GraphResult<Option<Edge>> {
        let _guard = self.lock.read();
        self.fetch_edge_unlocked(part, key, kind)
    }

    /// Returns the nodes adjacent to a node and the edges traversed,
    /// for all stored incidence specs matching the template
    /// `role:edgeKind:otherRole:otherKind` (empty components match
    /// anything; `:::` matches every edge).
    pub fn traverse(
        &self,
        part: &str,
        key: &str,
        kind: &str,
        spec: &str,
    ) -> GraphResult<(Vec<Node>, Vec<Edge>)> {
        let _guard = self.lock.read();
        self.traverse_unlocked(part, key, kind, spec)
    }

    pub(crate) fn fetch_node_unlocked(
        &self,
        part: &str,
        key: &str,
        kind: &str,
    ) -> GraphResult<Option<Node>> {
        Self::check_part_and_kind(part, kind)?;
        let Some(store) = self.node_store(part, kind, false)? else {
            return Ok(None);
        };
        self.read_entity(&store.attrs, &store.values, key, kind)
    }

    pub(crate) fn fetch_edge_unlocked(
        &self,
        part: &str,
        key: &str,
        kind: &str,
    ) -> GraphResult<Option<Edge>> {
        Self::check_part_and_kind(part, kind)?;
        let Some(store) = self.edge_store(part, kind, false)? else {
            return Ok(None);
        };
        Ok(self
            .read_entity(&store.tree, &store.tree, key, kind)?
            .map(Edge::from_node))
    }

    pub(crate) fn traverse_unlocked(
        &self,
        part: &str,
        key: &str,
        kind: &str,
        spec: &str,
    ) -> GraphResult<(Vec<Node>, Vec<Edge>)> {
        Self::check_part_and_kind(part, kind)?;
        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        let Some(store) = self.node_store(part, kind, false)? else {
            return Ok((nodes, edges));
        };
        let Some(specs_data) = store
            .attrs
            .get(&edge_specs_key(key))
            .map_err(GraphError::reading)?
        else {
            return Ok((nodes, edges));
        };
        let specs: EdgeSpecSet = decode_record(&specs_data)?;
        let template = self.parse_spec_template(spec)?;

        for spec_bytes in &specs {
            let Ok(stored) = <[u8; 8]>::try_from(spec_bytes.as_slice()) else {
                continue;
            };
            if !Self::spec_matches(&template, stored) {
                continue;
            }

            let Some(map_data) = store
                .values
                .get(&spec_edges_key(key, stored))
                .map_err(GraphError::reading)?
            else {
                continue;
            };
            let map: SpecEdgeMap = decode_record(&map_data)?;
            let edge_kind = self
                .names
                .decode16([stored[2], stored[3]])
                .ok_or_else(|| GraphError::Reading("Unknown edge kind code".to_string()))?;

            for (edge_key, (other_key, other_kind)) in map {
                if let Some(edge) = self.fetch_edge_unlocked(part, &edge_key, &edge_kind)? {
                    edges.push(edge);
                }
                if let Some(node) = self.fetch_node_unlocked(part, &other_key, &other_kind)? {
                    nodes.push(node);
                }
            }
        }
        Ok((nodes, edges))
    }

    /// Reads a full entity from its attribute and value trees.
    pub(crate) fn read_entity(
        &self,
        attrs_tree: &HTree,
        values_tree: &HTree,
        key: &str,
        kind: &str,
    ) -> GraphResult<Option<Node>> {
        let Some(list_data) = attrs_tree
            .get(&attr_list_key(key))
            .map_err(GraphError::reading)?
        else {
            return Ok(None);
        };
        let codes: AttrCodeList = decode_record(&list_data)?;

        let mut node = Node::with_key_kind(key, kind);
        for code in codes {
            let code_bytes = code.to_le_bytes();
            let name = self.names.decode32(code_bytes).ok_or_else(|| {
                GraphError::Reading(format!("Unknown attribute code {code}"))
            })?;
            if let Some(data) = values_tree
                .get(&attr_value_key(key, code_bytes))
                .map_err(GraphError::reading)?
            {
                let value: Value = decode_record(&data)?;
                node.set_attr(&name, Some(value));
            }
        }
        Ok(Some(node))
    }

    // -----------------------------------------------------------------------
    // Index queries and key iteration
    // -----------------------------------------------------------------------

    /// Returns the index query handle for nodes of a kind, or `None` if
    /// nothing was ever indexed there.
    pub fn node_index_query(&self, part: &str, kind: &str) -> GraphResult<Option<IndexQuery<'_>>> {
        Self::check_part_and_kind(part, kind)?;
        let Some(store) = self.node_index_store(part, kind, false)? else {
            return Ok(None);
        };
        Ok(Some(IndexQuery {
            gm: self,
            index: IndexManager::new(store.tree, self.config.case_sensitive_word_index),
        }))
    }

    /// Returns the index query handle for edges of a kind.
    pub fn edge_index_query(&self, part: &str, kind: &str) -> GraphResult<Option<IndexQuery<'_>>> {
        Self::check_part_and_kind(part, kind)?;
        let Some(store) = self.edge_index_store(part, kind, false)? else {
            return Ok(None);
        };
        Ok(Some(IndexQuery {
            gm: self,
            index: IndexManager::new(store.tree, self.config.case_sensitive_word_index),
        }))
    }

    /// Iterates the keys of all nodes of a kind, in tree order.
    pub fn node_key_iterator(
        &self,
        part: &str,
        kind: &str,
    ) -> GraphResult<Option<NodeKeyIterator>> {
        Self::check_part_and_kind(part, kind)?;
        let Some(store) = self.node_store(part, kind, false)? else {
            return Ok(None);
        };
        Ok(Some(NodeKeyIterator::new(store.attrs.iter())))
    }

    // -----------------------------------------------------------------------
    // Single-operation mutations
    // -----------------------------------------------------------------------

    /// Stores a node, overwriting all non-reserved attributes.
    pub fn store_node(&self, part: &str, node: Node) -> GraphResult<()> {
        let _guard = self.lock.write();
        let mut trans = Transaction::new_sub(self);
        let result = self
            .store_node_tx(part, node, false, &mut trans)
            .and_then(|()| trans.drain());
        Self::finish_single_op(&mut trans, result)
    }

    /// Updates a node, merging the given attributes over the stored
    /// state. Never removes attributes.
    pub fn update_node(&self, part: &str, node: Node) -> GraphResult<()> {
        let _guard = self.lock.write();
        let mut trans = Transaction::new_sub(self);
        let result = self
            .store_node_tx(part, node, true, &mut trans)
            .and_then(|()| trans.drain());
        Self::finish_single_op(&mut trans, result)
    }

    /// Removes a node, returning it. Cascades over connected edges via
    /// the delete rule.
    pub fn remove_node(&self, part: &str, key: &str, kind: &str) -> GraphResult<Option<Node>> {
        let _guard = self.lock.write();
        let mut trans = Transaction::new_sub(self);
        let result = self
            .remove_node_tx(part, key, kind, &mut trans)
            .and_then(|removed| trans.drain().map(|()| removed));
        Self::finish_single_op(&mut trans, result)
    }

    /// Stores an edge, overwriting all non-reserved attributes. Both
    /// endpoints must exist.
    pub fn store_edge(&self, part: &str, edge: Edge) -> GraphResult<()> {
        let _guard = self.lock.write();
        let mut trans = Transaction::new_sub(self);
        let result = self
            .store_edge_tx(part, edge, false, &mut trans)
            .and_then(|()| trans.drain());
        Self::finish_single_op(&mut trans, result)
    }

    /// Updates an edge, merging the given attributes over the stored
    /// state.
    pub fn update_edge(&self, part: &str, edge: Edge) -> GraphResult<()> {
        let _guard = self.lock.write();
        let mut trans = Transaction::new_sub(self);
        let result = self
            .store_edge_tx(part, edge, true, &mut trans)
            .and_then(|()| trans.drain());
        Self::finish_single_op(&mut trans, result)
    }

    /// Removes an edge, returning it.
    pub fn remove_edge(&self, part: &str, key: &str, kind: &str) -> GraphResult<Option<Edge>> {
        let _guard = self.lock.write();
        let mut trans = Transaction::new_sub(self);
        let result = self
            .remove_edge_tx(part, key, kind, &mut trans)
            .and_then(|removed| trans.drain().map(|()| removed));
        Self::finish_single_op(&mut trans, result)
    }

    /// Completes a single-operation write: flush everything the
    /// operation touched, or roll all of it back.
    fn finish_single_op<T>(trans: &mut Transaction<'_>, result: GraphResult<T>) -> GraphResult<T> {
        match result {
            Ok(value) => {
                trans.flush_touched_or_panic();
                trans.take_index_error().map_or(Ok(value), Err)
            }
            Err(err) => {
                trans.rollback_touched_or_panic();
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Store resolution
    // -----------------------------------------------------------------------

    pub(crate) fn check_part_and_kind(part: &str, kind: &str) -> GraphResult<()> {
        Self::check_partition(part)?;
        if !is_valid_name(kind) {
            return Err(GraphError::InvalidData(format!(
                "Kind {kind} is not alphanumeric - can only contain [a-zA-Z0-9_]"
            )));
        }
        Ok(())
    }

    pub(crate) fn check_partition(part: &str) -> GraphResult<()> {
        if !is_valid_name(part) {
            return Err(GraphError::InvalidData(format!(
                "Partition name {part} is not alphanumeric - can only contain [a-zA-Z0-9_]"
            )));
        }
        Ok(())
    }

    /// Resolves the two trees of a `.nodes` manager.
    pub(crate) fn node_store(
        &self,
        part: &str,
        kind: &str,
        create: bool,
    ) -> GraphResult<Option<NodeStore>> {
        let name = nodes_manager_name(part, kind);
        let Some(sm) = self.gs.storage_manager(&name, create) else {
            return Ok(None);
        };
        let attrs_location = sm.root(ROOT_SLOT_PRIMARY_TREE);
        if attrs_location == NIL_LOCATION {
            if !create {
                return Ok(None);
            }
            let attrs = HTree::new(Arc::clone(&sm)).map_err(GraphError::access)?;
            let values = HTree::new(Arc::clone(&sm)).map_err(GraphError::access)?;
            sm.set_root(ROOT_SLOT_PRIMARY_TREE, attrs.location());
            sm.set_root(ROOT_SLOT_SECONDARY_TREE, values.location());
            return Ok(Some(NodeStore { attrs, values }));
        }
        let values_location = sm.root(ROOT_SLOT_SECONDARY_TREE);
        Ok(Some(NodeStore {
            attrs: HTree::load(Arc::clone(&sm), attrs_location),
            values: HTree::load(sm, values_location),
        }))
    }

    pub(crate) fn node_index_store(
        &self,
        part: &str,
        kind: &str,
        create: bool,
    ) -> GraphResult<Option<TreeStore>> {
        self.single_tree_store(&node_index_manager_name(part, kind), create)
    }

    pub(crate) fn edge_store(
        &self,
        part: &str,
        kind: &str,
        create: bool,
    ) -> GraphResult<Option<TreeStore>> {
        self.single_tree_store(&edges_manager_name(part, kind), create)
    }

    pub(crate) fn edge_index_store(
        &self,
        part: &str,
        kind: &str,
        create: bool,
    ) -> GraphResult<Option<TreeStore>> {
        self.single_tree_store(&edge_index_manager_name(part, kind), create)
    }

    fn single_tree_store(&self, name: &str, create: bool) -> GraphResult<Option<TreeStore>> {
        let Some(sm) = self.gs.storage_manager(name, create) else {
            return Ok(None);
        };
        let location = sm.root(ROOT_SLOT_PRIMARY_TREE);
        if location == NIL_LOCATION {
            if !create {
                return Ok(None);
            }
            let tree = HTree::new(Arc::clone(&sm)).map_err(GraphError::access)?;
            sm.set_root(ROOT_SLOT_PRIMARY_TREE, tree.location());
            return Ok(Some(TreeStore { tree }));
        }
        Ok(Some(TreeStore {
            tree: HTree::load(sm, location),
        }))
    }

    /// Index manager for the node index of a (partition, kind).
    pub(crate) fn node_index_manager(
        &self,
        part: &str,
        kind: &str,
        create: bool,
    ) -> GraphResult<Option<IndexManager>> {
        Ok(self
            .node_index_store(part, kind, create)?
            .map(|store| IndexManager::new(store.tree, self.config.case_sensitive_word_index)))
    }

    /// Index manager for the edge index of a (partition, kind).
    pub(crate) fn edge_index_manager(
        &self,
        part: &str,
        kind: &str,
        create: bool,
    ) -> GraphResult<Option<IndexManager>> {
        Ok(self
            .edge_index_store(part, kind, create)?
            .map(|store| IndexManager::new(store.tree, self.config.case_sensitive_word_index)))
    }

    // -----------------------------------------------------------------------
    // Spec encoding and matching
    // -----------------------------------------------------------------------

    /// Encodes an incidence spec as four interned 16-bit codes.
    pub(crate) fn encode_spec(
        &self,
        role: &str,
        edge_kind: &str,
        other_role: &str,
        other_kind: &str,
    ) -> GraphResult<[u8; 8]> {
        let mut out = [0_u8; 8];
        for (slot, name) in [role, edge_kind, other_role, other_kind].into_iter().enumerate() {
            let code = self.names.encode16(name, true).ok_or_else(|| {
                GraphError::Writing(format!("Could not intern name {name}"))
            })?;
            out[slot * 2..slot * 2 + 2].copy_from_slice(&code);
        }
        Ok(out)
    }

    fn parse_spec_template(&self, spec: &str) -> GraphResult<[SpecComponent; 4]> {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() != 4 {
            return Err(GraphError::InvalidData(format!(
                "Invalid edge spec {spec} - must have four : separated components"
            )));
        }
        let mut template = [
            SpecComponent::Any,
            SpecComponent::Any,
            SpecComponent::Any,
            SpecComponent::Any,
        ];
        for (slot, part) in parts.into_iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            template[slot] = match self.names.encode16(part, false) {
                Some(code) => SpecComponent::Code(code),
                None => SpecComponent::Unknown,
            };
        }
        Ok(template)
    }

    fn spec_matches(template: &[SpecComponent; 4], stored: [u8; 8]) -> bool {
        template.iter().enumerate().all(|(slot, component)| {
            match component {
                SpecComponent::Any => true,
                SpecComponent::Code(code) => stored[slot * 2..slot * 2 + 2] == code[..],
                SpecComponent::Unknown => false,
            }
        })
    }
}

/// Read handle for phrase, word, and value lookups on one index.
pub struct IndexQuery<'g> {
    gm: &'g GraphManager,
    index: IndexManager,
}

impl IndexQuery<'_> {
    /// Returns node key -> word positions for a word.
    pub fn lookup_word(&self, attr: &str, word: &str) -> GraphResult<BTreeMap<String, Vec<u64>>> {
        let _guard = self.gm.lock.read();
        self.index.lookup_word(attr, word)
    }

    /// Returns the node keys containing the phrase with strictly
    /// consecutive word positions, sorted lexicographically.
    pub fn lookup_phrase(&self, attr: &str, phrase: &str) -> GraphResult<Vec<String>> {
        let _guard = self.gm.lock.read();
        self.index.lookup_phrase(attr, phrase)
    }

    /// Returns the node keys whose attribute equals the value, sorted
    /// lexicographically.
    pub fn lookup_value(&self, attr: &str, value: &str) -> GraphResult<Vec<String>> {
        let _guard = self.gm.lock.read();
        self.index.lookup_value(attr, value)
    }

    /// Number of distinct node keys containing the word.
    pub fn count(&self, attr: &str, word: &str) -> GraphResult<usize> {
        let _guard = self.gm.lock.read();
        self.index.count(attr, word)
    }
}
