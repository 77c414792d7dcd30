//! Transactions: batched mutations with all-or-nothing commit.
//!
//! A transaction stages stores and removes in four maps keyed by
//! `part#kind#key`. Staging is cheap and lock-free; `commit` takes the
//! manager's writer lock, then drains the maps to a fixed point (rules
//! fired by one pass may stage work for the next), processing nodes
//! before edges in every pass.
//!
//! On the first non-index error, the MainDb and every touched storage
//! manager are rolled back and the staging maps are cleared: partial
//! progress is never visible. On success everything touched is flushed
//! in a deterministic order (MainDb, node indices, node stores, edge
//! indices, edge stores); a flush failure at that point is a
//! corruption-level condition and terminates the process. Index errors
//! are collected and surfaced after the flush; the content store stays
//! consistent.
//!
//! Sub-transactions run inside a rule's commit (or a single-operation
//! API) that already holds the writer lock; they skip locking and leave
//! flush or rollback to the outer operation.

use std::collections::{BTreeMap, BTreeSet};

use tracing::error;

use crate::data::{nodes_merge, Edge, Node};
use crate::error::{GraphError, GraphResult};
use crate::graph::GraphManager;
use crate::keys::{
    edge_index_manager_name, edges_manager_name, node_index_manager_name, nodes_manager_name,
};

/// A batch of staged graph mutations.
pub struct Transaction<'g> {
    gm: &'g GraphManager,
    sub: bool,
    /// Set while `drain` runs: the writer lock is held, so datastore
    /// reads must bypass the reader lock.
    draining: bool,
    store_nodes: BTreeMap<String, (String, Node)>,
    remove_nodes: BTreeMap<String, (String, String, String)>,
    store_edges: BTreeMap<String, (String, Edge)>,
    remove_edges: BTreeMap<String, (String, String, String)>,
    touched_nodes: BTreeSet<(String, String)>,
    touched_edges: BTreeSet<(String, String)>,
    index_errors: Vec<String>,
}

impl<'g> Transaction<'g> {
    /// Creates an empty transaction on a manager.
    #[must_use]
    pub fn new(gm: &'g GraphManager) -> Self {
        Self::build(gm, false)
    }

    /// Creates a sub-transaction: no locking, no flush, no rollback;
    /// the enclosing operation owns those.
    pub(crate) fn new_sub(gm: &'g GraphManager) -> Self {
        Self::build(gm, true)
    }

    fn build(gm: &'g GraphManager, sub: bool) -> Self {
        Self {
            gm,
            sub,
            draining: false,
            store_nodes: BTreeMap::new(),
            remove_nodes: BTreeMap::new(),
            store_edges: BTreeMap::new(),
            remove_edges: BTreeMap::new(),
            touched_nodes: BTreeSet::new(),
            touched_edges: BTreeSet::new(),
            index_errors: Vec::new(),
        }
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store_nodes.is_empty()
            && self.remove_nodes.is_empty()
            && self.store_edges.is_empty()
            && self.remove_edges.is_empty()
    }

    fn item_id(part: &str, kind: &str, key: &str) -> String {
        format!("{part}#{kind}#{key}")
    }

    // -----------------------------------------------------------------------
    // Staging
    // -----------------------------------------------------------------------

    /// Stages a node store (overwrite semantics). Cancels a pending
    /// remove of the same node.
    pub fn store_node(&mut self, part: &str, node: Node) -> GraphResult<()> {
        GraphManager::check_partition(part)?;
        node.validate()?;
        let id = Self::item_id(part, node.kind(), node.key());
        self.remove_nodes.remove(&id);
        self.store_nodes.insert(id, (part.to_string(), node));
        Ok(())
    }

    /// Stages a node update: merges with a pending store, or with the
    /// datastore node if one exists.
    pub fn update_node(&mut self, part: &str, node: Node) -> GraphResult<()> {
        GraphManager::check_partition(part)?;
        node.validate()?;
        let id = Self::item_id(part, node.kind(), node.key());

        if let Some((_, pending)) = self.store_nodes.get(&id) {
            let merged = nodes_merge(pending, &node);
            self.store_nodes.insert(id, (part.to_string(), merged));
            return Ok(());
        }

        let current = if self.sub || self.draining {
            self.gm.fetch_node_unlocked(part, node.key(), node.kind())?
        } else {
            self.gm.fetch_node(part, node.key(), node.kind())?
        };
        let staged = match current {
            Some(current) => nodes_merge(&current, &node),
            None => node,
        };
        self.remove_nodes.remove(&id);
        self.store_nodes.insert(id, (part.to_string(), staged));
        Ok(())
    }

    /// Stages a node remove. Cancels a pending store of the same node.
    pub fn remove_node(&mut self, part: &str, key: &str, kind: &str) -> GraphResult<()> {
        GraphManager::check_part_and_kind(part, kind)?;
        let id = Self::item_id(part, kind, key);
        self.store_nodes.remove(&id);
        self.remove_nodes
            .insert(id, (part.to_string(), kind.to_string(), key.to_string()));
        Ok(())
    }

    /// Stages an edge store (overwrite semantics). Cancels a pending
    /// remove of the same edge.
    pub fn store_edge(&mut self, part: &str, edge: Edge) -> GraphResult<()> {
        GraphManager::check_partition(part)?;
        edge.validate()?;
        let id = Self::item_id(part, edge.kind(), edge.key());
        self.remove_edges.remove(&id);
        self.store_edges.insert(id, (part.to_string(), edge));
        Ok(())
    }

    /// Stages an edge update: merges with a pending store, or with the
    /// datastore edge if one exists.
    pub fn update_edge(&mut self, part: &str, edge: Edge) -> GraphResult<()> {
        GraphManager::check_partition(part)?;
        edge.validate()?;
        let id = Self::item_id(part, edge.kind(), edge.key());

        if let Some((_, pending)) = self.store_edges.get(&id) {
            let merged = Edge::from_node(nodes_merge(pending.as_node(), edge.as_node()));
            self.store_edges.insert(id, (part.to_string(), merged));
            return Ok(());
        }

        let current = if self.sub || self.draining {
            self.gm.fetch_edge_unlocked(part, edge.key(), edge.kind())?
        } else {
            self.gm.fetch_edge(part, edge.key(), edge.kind())?
        };
        let staged = match current {
            Some(current) => Edge::from_node(nodes_merge(current.as_node(), edge.as_node())),
            None => edge,
        };
        self.remove_edges.remove(&id);
        self.store_edges.insert(id, (part.to_string(), staged));
        Ok(())
    }

    /// Stages an edge remove. Cancels a pending store of the same edge.
    pub fn remove_edge(&mut self, part: &str, key: &str, kind: &str) -> GraphResult<()> {
        GraphManager::check_part_and_kind(part, kind)?;
        let id = Self::item_id(part, kind, key);
        self.store_edges.remove(&id);
        self.remove_edges
            .insert(id, (part.to_string(), kind.to_string(), key.to_string()));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Applies all staged mutations with all-or-nothing semantics.
    ///
    /// Committing an empty transaction is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if flushing after a successful data phase fails, or if the
    /// rollback after a failed one does: both leave no safe way to
    /// continue.
    pub fn commit(&mut self) -> GraphResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        if self.sub {
            return self.drain();
        }

        let _guard = self.gm.lock.write();
        match self.drain() {
            Ok(()) => {
                self.flush_touched_or_panic();
                self.store_nodes.clear();
                self.remove_nodes.clear();
                self.store_edges.clear();
                self.remove_edges.clear();
                self.touched_nodes.clear();
                self.touched_edges.clear();
                self.take_index_error().map_or(Ok(()), Err)
            }
            Err(err) => {
                self.rollback_touched_or_panic();
                self.clear_all();
                Err(err)
            }
        }
    }

    /// Processes the staging maps to a fixed point: nodes then edges,
    /// stores then removes, re-running while rules stage further work.
    pub(crate) fn drain(&mut self) -> GraphResult<()> {
        self.draining = true;
        let result = self.drain_inner();
        self.draining = false;
        result
    }

    fn drain_inner(&mut self) -> GraphResult<()> {
        let gm = self.gm;
        while !self.is_empty() {
            for (_, (part, node)) in std::mem::take(&mut self.store_nodes) {
                gm.store_node_tx(&part, node, false, self)?;
            }
            for (_, (part, kind, key)) in std::mem::take(&mut self.remove_nodes) {
                gm.remove_node_tx(&part, &key, &kind, self)?;
            }
            for (_, (part, edge)) in std::mem::take(&mut self.store_edges) {
                gm.store_edge_tx(&part, edge, false, self)?;
            }
            for (_, (part, kind, key)) in std::mem::take(&mut self.remove_edges) {
                gm.remove_edge_tx(&part, &key, &kind, self)?;
            }
        }
        Ok(())
    }

    fn clear_all(&mut self) {
        self.store_nodes.clear();
        self.remove_nodes.clear();
        self.store_edges.clear();
        self.remove_edges.clear();
        self.touched_nodes.clear();
        self.touched_edges.clear();
        self.index_errors.clear();
    }

    // -----------------------------------------------------------------------
    // Touched manager tracking
    // -----------------------------------------------------------------------

    pub(crate) fn touch_node(&mut self, part: &str, kind: &str) {
        self.touched_nodes
            .insert((part.to_string(), kind.to_string()));
    }

    pub(crate) fn touch_edge(&mut self, part: &str, kind: &str) {
        self.touched_edges
            .insert((part.to_string(), kind.to_string()));
    }

    pub(crate) fn record_index_error(&mut self, err: &GraphError) {
        self.index_errors.push(err.to_string());
    }

    /// Drains collected index errors into one error, if any.
    pub(crate) fn take_index_error(&mut self) -> Option<GraphError> {
        if self.index_errors.is_empty() {
            return None;
        }
        Some(GraphError::Index(
            std::mem::take(&mut self.index_errors).join("; "),
        ))
    }

    /// Flushes the MainDb, then node indices, node stores, edge
    /// indices, and edge stores of everything this batch touched.
    fn flush_touched(&self) -> GraphResult<()> {
        self.gm.main.flush()?;
        for (part, kind) in &self.touched_nodes {
            self.flush_manager(&node_index_manager_name(part, kind))?;
        }
        for (part, kind) in &self.touched_nodes {
            self.flush_manager(&nodes_manager_name(part, kind))?;
        }
        for (part, kind) in &self.touched_edges {
            self.flush_manager(&edge_index_manager_name(part, kind))?;
        }
        for (part, kind) in &self.touched_edges {
            self.flush_manager(&edges_manager_name(part, kind))?;
        }
        Ok(())
    }

    fn flush_manager(&self, name: &str) -> GraphResult<()> {
        if let Some(sm) = self.gm.gs.storage_manager(name, false) {
            sm.flush()
                .map_err(|err| GraphError::Flushing(err.to_string()))?;
        }
        Ok(())
    }

    pub(crate) fn flush_touched_or_panic(&self) {
        if let Err(err) = self.flush_touched() {
            error!(error = %err, "flush failed after commit; terminating to avoid corruption");
            panic!("{err}");
        }
    }

    /// Rolls back the MainDb and every touched manager.
    fn rollback_touched(&self) -> GraphResult<()> {
        self.gm.main.rollback()?;
        for (part, kind) in &self.touched_nodes {
            self.rollback_manager(&nodes_manager_name(part, kind))?;
            self.rollback_manager(&node_index_manager_name(part, kind))?;
        }
        for (part, kind) in &self.touched_edges {
            self.rollback_manager(&edges_manager_name(part, kind))?;
            self.rollback_manager(&edge_index_manager_name(part, kind))?;
        }
        Ok(())
    }

    fn rollback_manager(&self, name: &str) -> GraphResult<()> {
        if let Some(sm) = self.gm.gs.storage_manager(name, false) {
            sm.rollback()
                .map_err(|err| GraphError::Rollback(err.to_string()))?;
        }
        Ok(())
    }

    pub(crate) fn rollback_touched_or_panic(&self) {
        if let Err(err) = self.rollback_touched() {
            error!(error = %err, "rollback failed; terminating to avoid corruption");
            panic!("{err}");
        }
    }
}
