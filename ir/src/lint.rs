//! Whole-graph invariant checking.
//!
//! Lint operates on the internal representation directly, to force every
//! change to the data layout to reconsider the invariants. It is the
//! executable definition of "well-formed".

use std::collections::{HashMap, HashSet};

use skein_types::Type;

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeKind, Use};
use crate::{BlockId, NodeId, ValueId};

impl Graph {
    /// Check every structural invariant; see module docs for the list.
    pub fn lint(&self) -> Result<()> {
        Linter {
            g: self,
            scopes: vec![HashSet::new()],
            seen_uniques: HashSet::new(),
            anticipated_uses: HashMap::new(),
            visited_nodes: HashSet::new(),
        }
        .check_graph()
    }
}

fn fail<T>(reason: impl Into<String>) -> Result<T> {
    Err(Error::InvariantViolation { reason: reason.into() })
}

struct Linter<'g> {
    g: &'g Graph,
    /// Stack of lexical scopes; a value is visible in its own scope and in
    /// every nested one.
    scopes: Vec<HashSet<ValueId>>,
    seen_uniques: HashSet<usize>,
    /// Per-node tally of uses registered while checking values; when the node
    /// itself is visited the tally must equal its input count.
    anticipated_uses: HashMap<NodeId, i64>,
    visited_nodes: HashSet<NodeId>,
}

impl Linter<'_> {
    fn check_graph(mut self) -> Result<()> {
        self.check_block(self.g.root_block(), None)?;

        for (node, count) in &self.anticipated_uses {
            if *count != -1 {
                return fail(format!("node {node} uses values but was never reached by the block walk"));
            }
        }

        // The name map must mirror the values exactly.
        for (name, &v) in &self.g.unique_names {
            if !self.g.is_live_value(v) {
                return fail(format!("name map entry '{name}' points at a dead value"));
            }
            if self.g.unique_name(v) != *name {
                return fail(format!("name map entry '{name}' disagrees with the value's own name"));
            }
        }
        Ok(())
    }

    fn in_scope(&self, v: ValueId) -> bool {
        self.scopes.iter().any(|s| s.contains(&v))
    }

    fn check_value(&mut self, v: ValueId) -> Result<()> {
        if !self.g.is_live_value(v) {
            return fail(format!("value {v} is not in the graph's value population"));
        }
        if self.in_scope(v) {
            return fail(format!("value %{} defined twice", self.g.unique_name(v)));
        }
        self.scopes.last_mut().expect("scope stack is never empty").insert(v);

        let unique = self.g.value_unique(v);
        if !self.seen_uniques.insert(unique) {
            return fail(format!("unique {unique} assigned to two values"));
        }
        if unique >= self.g.next_unique {
            return fail(format!("unique {unique} is not below the graph counter {}", self.g.next_unique));
        }

        for use_ in self.g.value_uses(v) {
            if !self.g.is_live_node(use_.user) {
                return fail(format!("use of %{} by a dead node", self.g.unique_name(v)));
            }
            if self.visited_nodes.contains(&use_.user) {
                return fail(format!("%{} is used before it is defined", self.g.unique_name(v)));
            }
            if self.g.inputs(use_.user).get(use_.offset) != Some(&v) {
                return fail(format!("use list of %{} disagrees with the user's inputs", self.g.unique_name(v)));
            }
            *self.anticipated_uses.entry(use_.user).or_insert(0) += 1;
        }
        Ok(())
    }

    fn check_inputs(&mut self, n: NodeId) -> Result<()> {
        for (i, &input) in self.g.inputs(n).iter().enumerate() {
            if !self.in_scope(input) {
                return fail(format!("%{} not in scope at node {n}", self.g.unique_name(input)));
            }
            // Exactly-once use record for (n, i).
            let matching =
                self.g.value_uses(input).iter().filter(|u| **u == Use { user: n, offset: i }).count();
            if matching != 1 {
                return fail(format!(
                    "input {i} of node {n} has {matching} use records on %{}",
                    self.g.unique_name(input)
                ));
            }
        }

        let anticipated = self.anticipated_uses.insert(n, -1).unwrap_or(0);
        if anticipated != self.g.inputs(n).len() as i64 {
            return fail(format!(
                "node {n} has {} inputs but {anticipated} registered uses",
                self.g.inputs(n).len()
            ));
        }
        Ok(())
    }

    fn check_node(&mut self, n: NodeId, b: BlockId) -> Result<()> {
        if !self.g.is_live_node(n) {
            return fail(format!("node {n} is not in the graph's node population"));
        }
        if self.g.owning_block(n) != Some(b) {
            return fail(format!("node {n} is listed in a block it does not claim as owner"));
        }

        self.check_inputs(n)?;
        self.visited_nodes.insert(n);

        for &block in self.g.node_blocks(n) {
            self.scopes.push(HashSet::new());
            self.check_block(block, Some(n))?;
            self.scopes.pop();
        }

        for (j, &o) in self.g.outputs(n).iter().enumerate() {
            if self.g.value_node(o) != n {
                return fail(format!("output %{} does not point back at its node", self.g.unique_name(o)));
            }
            if self.g.value_offset(o) != j {
                return fail(format!("output %{} carries offset {} at position {j}", self.g.unique_name(o), self.g.value_offset(o)));
            }
            self.check_value(o)?;
        }

        match self.g.kind(n) {
            NodeKind::Constant | NodeKind::NoneConst | NodeKind::Undefined => {
                if !self.g.inputs(n).is_empty() {
                    return fail(format!("{} node takes no inputs", self.g.kind(n).qual_string()));
                }
            }
            NodeKind::FusionGroup => self.check_same_device(n)?,
            _ => {}
        }
        Ok(())
    }

    /// Every complete tensor type flowing through a fusion group must live on
    /// one device.
    fn check_same_device(&self, n: NodeId) -> Result<()> {
        let mut device = None;
        let values = self.g.inputs(n).iter().chain(self.g.outputs(n));
        for &v in values {
            if let Type::Tensor(complete) = &**self.g.value_type(v) {
                match device {
                    None => device = Some(complete.device),
                    Some(d) if d != complete.device => {
                        return fail(format!("fusion group {n} mixes devices {d} and {}", complete.device));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn check_block(&mut self, b: BlockId, owner: Option<NodeId>) -> Result<()> {
        if self.g.block_owner(b) != owner {
            return fail(format!("block owner link is inconsistent for block {b}"));
        }

        let param = self.g.block_param(b);
        let ret = self.g.block_return(b);

        if !matches!(self.g.kind(param), NodeKind::Param) || !self.g.inputs(param).is_empty() {
            return fail("param sentinel is malformed");
        }
        if !matches!(self.g.kind(ret), NodeKind::Return) || !self.g.outputs(ret).is_empty() {
            return fail("return sentinel is malformed");
        }
        if self.g.topo_position(param) != i64::MIN || self.g.topo_position(ret) != i64::MAX {
            return fail("sentinel topological positions are not pinned to the bounds");
        }

        for &input in self.g.block_inputs(b) {
            if !matches!(self.g.kind(self.g.value_node(input)), NodeKind::Param) {
                return fail("block input not defined by the param sentinel");
            }
            self.check_value(input)?;
        }

        let mut last_pos = self.g.topo_position(param);
        for n in self.g.block_nodes(b) {
            if matches!(self.g.kind(n), NodeKind::Param | NodeKind::Return) {
                return fail("sentinel kind found in the middle of a block list");
            }
            let pos = self.g.topo_position(n);
            if pos <= last_pos {
                return fail(format!("topological positions are not strictly increasing at node {n}"));
            }
            last_pos = pos;
            self.check_node(n, b)?;
        }
        if last_pos >= self.g.topo_position(ret) {
            return fail("node position reached the return sentinel bound");
        }

        self.check_inputs(ret)?;
        self.visited_nodes.insert(ret);
        Ok(())
    }
}
