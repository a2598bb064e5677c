//! Topologically valid node movement.
//!
//! `try_move` relocates a node so it ends up immediately before or after a
//! move point, while preserving producer-consumer dependencies and the
//! mutation orderings recorded in the [`AliasDb`]. The approach: scan from
//! the mover toward the move point, growing a working set of nodes that must
//! travel together because the set transitively depends on them.

use std::collections::{HashMap, HashSet};

use skein_ir::{Graph, NodeId};
use snafu::{ResultExt, ensure};

use crate::db::AliasDb;
use crate::error::{MoveSnafu, NotInSameBlockSnafu, Result};
use crate::info::AliasInfo;

/// Which side of the move point the mover should land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveSide {
    Before,
    After,
}

impl MoveSide {
    fn reversed(self) -> Self {
        match self {
            MoveSide::Before => MoveSide::After,
            MoveSide::After => MoveSide::Before,
        }
    }
}

impl AliasDb {
    pub fn move_after_topologically_valid(&self, graph: &mut Graph, node: NodeId, after: NodeId) -> Result<bool> {
        self.try_move(graph, node, after, MoveSide::After)
    }

    /// The move side matters: with a dependency chain `this -> n -> o`,
    /// `move_before(o)` can succeed as `[this, o, n]` where `move_after(n)`
    /// cannot.
    pub fn move_before_topologically_valid(&self, graph: &mut Graph, node: NodeId, before: NodeId) -> Result<bool> {
        self.try_move(graph, node, before, MoveSide::Before)
    }

    /// Try to relocate `node` immediately before/after `move_point`.
    /// Returns `Ok(false)` iff no dependency-preserving move exists.
    pub fn try_move(&self, graph: &mut Graph, node: NodeId, move_point: NodeId, side: MoveSide) -> Result<bool> {
        ensure!(
            graph.is_placed(node)
                && graph.is_placed(move_point)
                && graph.owning_block(node) == graph.owning_block(move_point),
            NotInSameBlockSnafu { node, move_point }
        );
        if node == move_point {
            return Ok(true);
        }

        // 1. Walk from `node` toward the move point, collecting everything
        // the working set depends on along the way.
        let mut working_set = WorkingSet::new(self, graph, node);
        let scan_backward = graph.is_after(node, move_point);

        let advance = |graph: &Graph, n: NodeId| {
            if scan_backward { graph.prev_node(n) } else { graph.next_node(n) }
        };

        let mut cur = advance(graph, node).expect("scan stays between the sentinels");
        while cur != move_point {
            if working_set.depends_on(graph, cur) {
                working_set.add(graph, cur);
            }
            cur = advance(graph, cur).expect("scan stays between the sentinels");
        }

        // 2. When the mover travels away from its dependencies it must be
        // split off: `node` lands on the target side of the move point and
        // the rest of the working set on the opposite side.
        let split_mover = (side == MoveSide::Before && graph.is_before(node, move_point))
            || (side == MoveSide::After && graph.is_after(node, move_point));
        if split_mover {
            working_set.erase_mover(graph);
        }

        // 3. The move is only valid if nothing left in the working set
        // depends on the move point itself.
        if working_set.depends_on(graph, move_point) {
            return Ok(false);
        }

        // 4. Execute.
        if split_mover {
            move_to(graph, node, move_point, side)?;
            let mut cursor = move_point;
            for to_move in working_set.nodes() {
                move_to(graph, to_move, cursor, side.reversed())?;
                cursor = to_move;
            }
        } else {
            let mut cursor = move_point;
            for to_move in working_set.nodes() {
                move_to(graph, to_move, cursor, side)?;
                cursor = to_move;
            }
        }
        Ok(true)
    }
}

fn move_to(graph: &mut Graph, node: NodeId, point: NodeId, side: MoveSide) -> Result<()> {
    match side {
        MoveSide::Before => graph.move_before(node, point),
        MoveSide::After => graph.move_after(node, point),
    }
    .context(MoveSnafu)
}

/// The group of nodes that must travel with the mover, in block order of
/// discovery (mover first).
struct WorkingSet<'a> {
    db: &'a AliasDb,
    nodes: Vec<NodeId>,
    members: HashSet<NodeId>,
    /// Same-block users of any member's outputs, with multiplicity.
    users: HashMap<NodeId, usize>,
    /// Union of alias info touched by members.
    touched: AliasInfo,
    /// Union of alias info written by members.
    written: AliasInfo,
}

impl<'a> WorkingSet<'a> {
    fn new(db: &'a AliasDb, graph: &Graph, mover: NodeId) -> Self {
        let mut set = WorkingSet {
            db,
            nodes: Vec::new(),
            members: HashSet::new(),
            users: HashMap::new(),
            touched: AliasInfo::new(),
            written: AliasInfo::new(),
        };
        set.add(graph, mover);
        set
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.nodes.clone()
    }

    fn add(&mut self, graph: &Graph, n: NodeId) {
        self.nodes.push(n);
        self.members.insert(n);
        for user in users_same_block(graph, n) {
            *self.users.entry(user).or_insert(0) += 1;
        }
        self.touched.union_with(&self.db.touched_info(graph, n));
        self.written.union_with(&self.db.written_info(n));
    }

    /// Remove the mover (always the first member), rebuilding the summaries
    /// from the remaining nodes.
    fn erase_mover(&mut self, graph: &Graph) {
        let mover = self.nodes.remove(0);
        self.members.remove(&mover);
        for user in users_same_block(graph, mover) {
            if let Some(count) = self.users.get_mut(&user) {
                *count -= 1;
                if *count == 0 {
                    self.users.remove(&user);
                }
            }
        }
        self.touched = AliasInfo::new();
        self.written = AliasInfo::new();
        for &n in &self.nodes {
            self.touched.union_with(&self.db.touched_info(graph, n));
            self.written.union_with(&self.db.written_info(n));
        }
    }

    /// Does the working set depend on `n`, in either direction?
    ///
    /// Value dependencies follow the scan order: a node behind the set can
    /// only consume from it, a node ahead can only feed it. Mutation
    /// dependencies are symmetric: reordering past a writer is unsafe
    /// whenever either side writes an alias set the other touches.
    fn depends_on(&self, graph: &Graph, n: NodeId) -> bool {
        if self.nodes.is_empty() {
            return false;
        }

        let value_dep = if graph.is_after(n, self.nodes[0]) {
            self.produces_for(n)
        } else {
            self.consumes_from(graph, n)
        };
        value_dep || self.mutation_interferes(graph, n)
    }

    /// Does the working set produce a value `n` consumes?
    fn produces_for(&self, n: NodeId) -> bool {
        self.users.contains_key(&n)
    }

    /// Does the working set consume a value `n` produces?
    fn consumes_from(&self, graph: &Graph, n: NodeId) -> bool {
        users_same_block(graph, n).iter().any(|user| self.members.contains(user))
    }

    /// Would reordering past `n` cross a write-use dependency?
    fn mutation_interferes(&self, graph: &Graph, n: NodeId) -> bool {
        let n_touched = self.db.touched_info(graph, n);
        let n_written = self.db.written_info(n);
        n_written.may_overlap(&self.touched) || self.written.may_overlap(&n_touched)
    }
}

/// All users of `n`'s outputs, attributed to `n`'s block: a use inside a
/// sub-block counts as a use by the enclosing node in `n`'s block, so outer
/// scheduling decisions stay conservative.
fn users_same_block(graph: &Graph, n: NodeId) -> HashSet<NodeId> {
    let block = graph.owning_block(n);
    let mut users = HashSet::new();
    for &output in graph.outputs(n) {
        for use_ in graph.value_uses(output) {
            let mut user = use_.user;
            while graph.owning_block(user) != block {
                let owner_block = graph.owning_block(user).expect("users of placed nodes are placed");
                user = graph.block_owner(owner_block).expect("sub-block uses are enclosed by a node in an outer block");
            }
            users.insert(user);
        }
    }
    users
}
