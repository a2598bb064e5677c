//! Topological index maintenance and O(1) relative-order queries.
//!
//! Every live node carries a signed 64-bit position within its block. Appends
//! advance a fixed stride past the previous node; inserts between neighbors
//! take the midpoint. When a gap collapses or the stride runs off the edge,
//! the whole block is re-spaced at stride intervals.

use snafu::ensure;

use crate::error::{AlreadyPlacedSnafu, NotPlacedSnafu, Result, SentinelInsertSnafu};
use crate::graph::{Graph, NodeKind};
use crate::{BlockId, NodeId};

pub(crate) const LOWER_BOUND: i64 = i64::MIN;
pub(crate) const UPPER_BOUND: i64 = i64::MAX;

/// Spacing between appended nodes: 2^40.
///
/// Leaves ~40 repeated midpoint insertions and ~2^23 appends before a
/// reindex, which walks the block once.
pub const APPEND_INTERVAL: i64 = 1 << 40;

impl Graph {
    // ---------------------------------------------------------------------
    // Placement
    // ---------------------------------------------------------------------

    /// Splice an unplaced node into the list right after `n`.
    pub fn insert_after(&mut self, node: NodeId, n: NodeId) -> Result<()> {
        ensure!(!self.is_placed(node), AlreadyPlacedSnafu { node });
        ensure!(self.is_placed(n), NotPlacedSnafu { node: n });
        ensure!(!matches!(self.kind(n), NodeKind::Return), SentinelInsertSnafu);

        let block = self.owning_block(n).expect("placed node has a block");
        let next = self.node(n).next.expect("non-return node has a successor");
        {
            let moved = self.node_mut(node);
            moved.owning_block = Some(block);
            moved.prev = Some(n);
            moved.next = Some(next);
        }
        self.node_mut(n).next = Some(node);
        self.node_mut(next).prev = Some(node);
        self.assign_topo_position(node);
        Ok(())
    }

    /// Splice an unplaced node into the list right before `n`.
    pub fn insert_before(&mut self, node: NodeId, n: NodeId) -> Result<()> {
        ensure!(self.is_placed(n), NotPlacedSnafu { node: n });
        ensure!(!matches!(self.kind(n), NodeKind::Param), SentinelInsertSnafu);
        let prev = self.node(n).prev.expect("non-param node has a predecessor");
        self.insert_after(node, prev)
    }

    /// Append to the end of a block.
    pub fn append(&mut self, node: NodeId, b: BlockId) -> Result<()> {
        let ret = self.block_return(b);
        self.insert_before(node, ret)
    }

    /// Prepend to the start of a block.
    pub fn prepend(&mut self, node: NodeId, b: BlockId) -> Result<()> {
        let param = self.block_param(b);
        self.insert_after(node, param)
    }

    /// Unlink a node from its block list, leaving it unplaced.
    pub fn remove_from_list(&mut self, node: NodeId) -> Result<()> {
        ensure!(self.is_placed(node), NotPlacedSnafu { node });
        let (prev, next) = {
            let n = self.node(node);
            (n.prev, n.next)
        };
        if let Some(p) = prev {
            self.node_mut(p).next = next;
        }
        if let Some(nx) = next {
            self.node_mut(nx).prev = prev;
        }
        let n = self.node_mut(node);
        n.owning_block = None;
        n.prev = None;
        n.next = None;
        Ok(())
    }

    /// Unchecked reorder: unlink and re-splice after `n`.
    pub fn move_after(&mut self, node: NodeId, n: NodeId) -> Result<()> {
        self.remove_from_list(node)?;
        self.insert_after(node, n)
    }

    /// Unchecked reorder: unlink and re-splice before `n`.
    pub fn move_before(&mut self, node: NodeId, n: NodeId) -> Result<()> {
        self.remove_from_list(node)?;
        self.insert_before(node, n)
    }

    // ---------------------------------------------------------------------
    // Position assignment
    // ---------------------------------------------------------------------

    /// Assign a topological position to a freshly spliced node.
    ///
    /// Appending past the last node advances the stride from its predecessor
    /// (the param sentinel at the lower bound for an empty block); prepending
    /// retreats the stride from its successor; inserting between two nodes
    /// takes the midpoint. When there is no room, the block is reindexed.
    fn assign_topo_position(&mut self, node: NodeId) {
        let block = self.owning_block(node).expect("assigning a position to an unplaced node");
        let prev = self.node(node).prev.expect("spliced node has a predecessor");
        let next = self.node(node).next.expect("spliced node has a successor");
        let prev_pos = self.topo_position(prev);
        let next_pos = self.topo_position(next);

        if next == self.block_return(block) {
            // Append: advance the stride past the predecessor. For an empty
            // block the predecessor is the param sentinel at the lower bound.
            if prev_pos >= UPPER_BOUND - APPEND_INTERVAL {
                // Running off the edge.
                self.reindex_block(block);
                return;
            }
            self.node_mut(node).topo_position = prev_pos + APPEND_INTERVAL;
        } else {
            // Insert between two neighbors: take the midpoint. Widened to
            // i128 so the difference cannot overflow near the bounds.
            let mid = (prev_pos as i128 + (next_pos as i128 - prev_pos as i128) / 2) as i64;
            if mid == prev_pos {
                // There was no room.
                self.reindex_block(block);
                return;
            }
            self.node_mut(node).topo_position = mid;
        }
    }

    /// Re-space every node of a block at stride intervals above the lower
    /// bound. The sentinels keep their pinned extreme positions.
    pub(crate) fn reindex_block(&mut self, b: BlockId) {
        let nodes: Vec<NodeId> = self.block_nodes(b).collect();
        tracing::debug!(block = %b, nodes = nodes.len(), "reindexing block topology");
        let mut pos = LOWER_BOUND;
        for n in nodes {
            debug_assert!(pos <= UPPER_BOUND - APPEND_INTERVAL);
            pos += APPEND_INTERVAL;
            self.node_mut(n).topo_position = pos;
        }
    }

    // ---------------------------------------------------------------------
    // Ordering queries
    // ---------------------------------------------------------------------

    /// Does `n` come strictly before `m`? Both nodes must be placed.
    pub fn is_before(&self, n: NodeId, m: NodeId) -> bool {
        n != m && !self.is_after(n, m)
    }

    /// Does `n` come strictly after `m`? Both nodes must be placed.
    ///
    /// Nodes in different blocks are compared in the closest block that
    /// encloses both; the graph root encloses everything, so two placed
    /// nodes always have an answer.
    pub fn is_after(&self, n: NodeId, m: NodeId) -> bool {
        if self.owning_block(n) == self.owning_block(m) {
            return self.topo_position(n) > self.topo_position(m);
        }

        let mut lhs = Some(n);
        while let Some(l) = lhs {
            let l_block = self.owning_block(l).expect("ordering query on an unplaced node");
            let mut rhs = Some(m);
            while let Some(r) = rhs {
                let r_block = self.owning_block(r).expect("ordering query on an unplaced node");
                if l_block == r_block {
                    return self.topo_position(l) > self.topo_position(r);
                }
                rhs = self.block_owner(r_block);
            }
            lhs = self.block_owner(l_block);
        }
        unreachable!("placed nodes always share the graph root block")
    }
}
