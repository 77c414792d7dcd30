//! Graph events and the rule registry.
//!
//! Rules subscribe to event kinds and run inside the write pipeline:
//! they receive a rules-clone of the manager (same storage and names,
//! fresh lock) for reading, and the active transaction for staging
//! follow-up mutations. All rule failures for one event are aggregated
//! into a single [`GraphError::Rule`].
//!
//! Built-ins:
//!
//! - [`DeleteNodeEdgesRule`]: removes the edges of a deleted node and
//!   cascades over edge ends flagged as cascading
//! - [`UpdateNodeStatsRule`]: additively maintains the MainDb partition
//!   list, kind lists, attribute lists, and edge-spec lists

use std::sync::Arc;

use crate::data::{Edge, Node};
use crate::error::{GraphError, GraphResult};
use crate::graph::GraphManager;
use crate::keys::{
    mdb_edge_attrs, mdb_node_attrs, mdb_node_edge_specs, MDB_EDGE_KINDS, MDB_NODE_KINDS,
    MDB_PARTITIONS,
};
use crate::trans::Transaction;

/// Kinds of events the write pipeline emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A node was stored where none existed.
    NodeCreated,
    /// An existing node was overwritten or merged.
    NodeUpdated,
    /// A node was removed.
    NodeDeleted,
    /// An edge was stored where none existed.
    EdgeCreated,
    /// An existing edge was overwritten or merged.
    EdgeUpdated,
    /// An edge was removed.
    EdgeDeleted,
}

/// One write pipeline event with its payload.
#[derive(Debug)]
pub enum GraphEvent<'a> {
    /// A node was stored where none existed.
    NodeCreated {
        /// Partition written to.
        part: &'a str,
        /// The stored node.
        node: &'a Node,
    },
    /// An existing node was overwritten or merged.
    NodeUpdated {
        /// Partition written to.
        part: &'a str,
        /// The node as stored now.
        node: &'a Node,
        /// The node as it was before.
        old: &'a Node,
    },
    /// A node was removed.
    NodeDeleted {
        /// Partition written to.
        part: &'a str,
        /// The removed node.
        node: &'a Node,
    },
    /// An edge was stored where none existed.
    EdgeCreated {
        /// Partition written to.
        part: &'a str,
        /// The stored edge.
        edge: &'a Edge,
    },
    /// An existing edge was overwritten or merged.
    EdgeUpdated {
        /// Partition written to.
        part: &'a str,
        /// The edge as stored now.
        edge: &'a Edge,
        /// The edge as it was before.
        old: &'a Edge,
    },
    /// An edge was removed.
    EdgeDeleted {
        /// Partition written to.
        part: &'a str,
        /// The removed edge.
        edge: &'a Edge,
    },
}

impl GraphEvent<'_> {
    /// The kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            GraphEvent::NodeCreated { .. } => EventKind::NodeCreated,
            GraphEvent::NodeUpdated { .. } => EventKind::NodeUpdated,
            GraphEvent::NodeDeleted { .. } => EventKind::NodeDeleted,
            GraphEvent::EdgeCreated { .. } => EventKind::EdgeCreated,
            GraphEvent::EdgeUpdated { .. } => EventKind::EdgeUpdated,
            GraphEvent::EdgeDeleted { .. } => EventKind::EdgeDeleted,
        }
    }
}

/// A callback hooked into the write pipeline.
///
/// Used as `Arc<dyn GraphRule>`. The manager handle shares storage with
/// the writing manager but holds its own lock, so rules may read freely
/// while the writer lock is held.
pub trait GraphRule: Send + Sync {
    /// Rule name (diagnostics).
    fn name(&self) -> &str;

    /// Event kinds this rule wants to see.
    fn handles(&self) -> &[EventKind];

    /// Reacts to one event, optionally staging follow-up mutations on
    /// the transaction.
    fn handle(
        &self,
        gm: &GraphManager,
        trans: &mut Transaction<'_>,
        event: &GraphEvent<'_>,
    ) -> GraphResult<()>;
}

/// Registry fanning events out to subscribed rules.
#[derive(Default)]
pub(crate) struct RulesRegistry {
    rules: Vec<Arc<dyn GraphRule>>,
}

impl RulesRegistry {
    pub(crate) fn register(&mut self, rule: Arc<dyn GraphRule>) {
        self.rules.push(rule);
    }

    pub(crate) fn matching(&self, kind: EventKind) -> Vec<Arc<dyn GraphRule>> {
        self.rules
            .iter()
            .filter(|rule| rule.handles().contains(&kind))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// DeleteNodeEdgesRule
// ---------------------------------------------------------------------------

/// Removes a deleted node's edges and cascades node removal over edge
/// ends whose facing cascading flag is set.
pub struct DeleteNodeEdgesRule;

impl GraphRule for DeleteNodeEdgesRule {
    fn name(&self) -> &str {
        "system.deletenodeedges"
    }

    fn handles(&self) -> &[EventKind] {
        &[EventKind::NodeDeleted]
    }

    fn handle(
        &self,
        gm: &GraphManager,
        trans: &mut Transaction<'_>,
        event: &GraphEvent<'_>,
    ) -> GraphResult<()> {
        let GraphEvent::NodeDeleted { part, node } = event else {
            return Ok(());
        };

        let (_, edges) = gm.traverse(part, node.key(), node.kind(), ":::")?;
        for edge in edges {
            trans.remove_edge(part, edge.key(), edge.kind())?;

            // The deleted side's cascading flag decides whether the far
            // side node goes too.
            let (cascading, other_key, other_kind) =
                if edge.end1_key() == node.key() && edge.end1_kind() == node.kind() {
                    (edge.end1_is_cascading(), edge.end2_key(), edge.end2_kind())
                } else {
                    (edge.end2_is_cascading(), edge.end1_key(), edge.end1_kind())
                };
            if cascading {
                trans.remove_node(part, other_key, other_kind)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// UpdateNodeStatsRule
// ---------------------------------------------------------------------------

/// Keeps the MainDb partition list, kind lists, per-kind attribute
/// lists, and per-node-kind edge-spec lists covering everything stored.
/// The lists are additive; stale entries are tolerated.
pub struct UpdateNodeStatsRule;

impl GraphRule for UpdateNodeStatsRule {
    fn name(&self) -> &str {
        "system.updatenodestats"
    }

    fn handles(&self) -> &[EventKind] {
        &[
            EventKind::NodeCreated,
            EventKind::NodeUpdated,
            EventKind::EdgeCreated,
            EventKind::EdgeUpdated,
        ]
    }

    fn handle(
        &self,
        gm: &GraphManager,
        _trans: &mut Transaction<'_>,
        event: &GraphEvent<'_>,
    ) -> GraphResult<()> {
        let main = &gm.main;
        match event {
            GraphEvent::NodeCreated { part, node }
            | GraphEvent::NodeUpdated { part, node, .. } => {
                main.add_to_string_set(MDB_PARTITIONS, part)?;
                main.add_to_string_set(MDB_NODE_KINDS, node.kind())?;
                let attrs_key = mdb_node_attrs(node.kind());
                for attr in node.data().keys() {
                    main.add_to_string_set(&attrs_key, attr)?;
                }
            }
            GraphEvent::EdgeCreated { part, edge }
            | GraphEvent::EdgeUpdated { part, edge, .. } => {
                main.add_to_string_set(MDB_PARTITIONS, part)?;
                main.add_to_string_set(MDB_EDGE_KINDS, edge.kind())?;
                let attrs_key = mdb_edge_attrs(edge.kind());
                for attr in edge.data().keys() {
                    main.add_to_string_set(&attrs_key, attr)?;
                }

                let spec1 = format!(
                    "{}:{}:{}:{}",
                    edge.end1_role(),
                    edge.kind(),
                    edge.end2_role(),
                    edge.end2_kind()
                );
                let spec2 = format!(
                    "{}:{}:{}:{}",
                    edge.end2_role(),
                    edge.kind(),
                    edge.end1_role(),
                    edge.end1_kind()
                );
                main.add_to_string_set(&mdb_node_edge_specs(edge.end1_kind()), &spec1)?;
                main.add_to_string_set(&mdb_node_edge_specs(edge.end2_kind()), &spec2)?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Joins rule failures for one event into a single error.
pub(crate) fn aggregate_rule_errors(errors: Vec<String>) -> GraphError {
    GraphError::Rule(errors.join("; "))
}
