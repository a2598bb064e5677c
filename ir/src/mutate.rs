//! In-place mutation: use-list maintenance, erasure, destruction, cloning.

use std::collections::HashMap;

use snafu::ensure;

use crate::error::{ArityMismatchSnafu, OutputHasUsesSnafu, Result};
use crate::graph::{Graph, Use};
use crate::schema::SchemaCache;
use crate::{BlockId, NodeId, ValueId};

/// Fallible value translation used by cross-graph cloning. Returning `None`
/// means the value is not in scope for the clone.
pub type ValueMap<'a> = &'a mut dyn FnMut(ValueId) -> Option<ValueId>;

impl Graph {
    // ---------------------------------------------------------------------
    // Input list mutation
    // ---------------------------------------------------------------------

    /// Append `v` to the node's inputs, recording the use on `v`.
    pub fn add_input(&mut self, n: NodeId, v: ValueId) {
        self.node_mut(n).schema = SchemaCache::Unresolved;
        let offset = self.inputs(n).len();
        self.value_mut(v).uses.push(Use { user: n, offset });
        self.node_mut(n).inputs.push(v);
    }

    /// Insert `v` at input offset `i`, shifting the use offsets of every
    /// later input up by one.
    ///
    /// Offsets are bumped from the back: a use is identified by `(node,
    /// offset)`, so bumping front-to-back could collide with a not yet
    /// bumped use of the same value one slot later.
    pub fn insert_input(&mut self, n: NodeId, i: usize, v: ValueId) {
        self.node_mut(n).schema = SchemaCache::Unresolved;
        for offset in (i..self.inputs(n).len()).rev() {
            let use_idx = self.find_use_for_input(n, offset);
            let value = self.node(n).inputs[offset];
            self.value_mut(value).uses[use_idx].offset += 1;
        }
        self.node_mut(n).inputs.insert(i, v);
        self.value_mut(v).uses.push(Use { user: n, offset: i });
    }

    /// Remove the input at offset `i`, shifting later use offsets down.
    pub fn remove_input(&mut self, n: NodeId, i: usize) {
        self.node_mut(n).schema = SchemaCache::Unresolved;
        self.drop_input(n, i);
        for offset in i + 1..self.inputs(n).len() {
            let use_idx = self.find_use_for_input(n, offset);
            let value = self.node(n).inputs[offset];
            self.value_mut(value).uses[use_idx].offset -= 1;
        }
        self.node_mut(n).inputs.remove(i);
    }

    /// Drop every input, clearing the node's side of every use pair.
    pub fn remove_all_inputs(&mut self, n: NodeId) {
        self.node_mut(n).schema = SchemaCache::Unresolved;
        for i in 0..self.inputs(n).len() {
            self.drop_input(n, i);
        }
        self.node_mut(n).inputs.clear();
    }

    /// Replace the input at offset `i` with `new_value`, returning the old one.
    pub fn replace_input(&mut self, n: NodeId, i: usize, new_value: ValueId) -> ValueId {
        self.node_mut(n).schema = SchemaCache::Unresolved;
        let old = self.drop_input(n, i);
        self.node_mut(n).inputs[i] = new_value;
        self.value_mut(new_value).uses.push(Use { user: n, offset: i });
        old
    }

    /// Replace every occurrence of `from` among the node's inputs with `to`.
    pub fn replace_input_with(&mut self, n: NodeId, from: ValueId, to: ValueId) {
        for i in 0..self.inputs(n).len() {
            if self.node(n).inputs[i] == from {
                self.replace_input(n, i, to);
            }
        }
    }

    /// Index into `inputs[i]`'s use list of the `(n, i)` use record.
    ///
    /// Linear over the use list; a use is identified by the pair, not by the
    /// user alone, since a node may consume the same value twice.
    fn find_use_for_input(&self, n: NodeId, i: usize) -> usize {
        let v = self.node(n).inputs[i];
        self.value(v)
            .uses
            .iter()
            .position(|u| *u == Use { user: n, offset: i })
            .expect("use list is consistent with inputs")
    }

    /// Unhook `inputs[i]` from its use list without shrinking the input list.
    fn drop_input(&mut self, n: NodeId, i: usize) -> ValueId {
        let use_idx = self.find_use_for_input(n, i);
        let v = self.node(n).inputs[i];
        self.value_mut(v).uses.remove(use_idx);
        v
    }

    // ---------------------------------------------------------------------
    // Output mutation
    // ---------------------------------------------------------------------

    /// Erase output `i`. Fails while the output has any use; later output
    /// offsets shift down.
    pub fn erase_output(&mut self, n: NodeId, i: usize) -> Result<()> {
        let v = self.node(n).outputs[i];
        let uses = self.value_uses(v).len();
        ensure!(uses == 0, OutputHasUsesSnafu { node: n, offset: i, uses });
        self.node_mut(n).schema = SchemaCache::Unresolved;
        self.node_mut(n).outputs.remove(i);
        self.free_value(v);
        for j in i..self.outputs(n).len() {
            let o = self.node(n).outputs[j];
            self.value_mut(o).offset -= 1;
        }
        Ok(())
    }

    /// Redirect all uses of `v` to `new_value`.
    pub fn replace_all_uses(&mut self, v: ValueId, new_value: ValueId) {
        while !self.value_uses(v).is_empty() {
            self.replace_first_use(v, new_value);
        }
    }

    /// Redirect the first recorded use of `v` to `new_value`.
    pub fn replace_first_use(&mut self, v: ValueId, new_value: ValueId) {
        let u = self.value(v).uses[0];
        self.node_mut(u.user).inputs[u.offset] = new_value;
        self.value_mut(new_value).uses.push(u);
        self.value_mut(v).uses.remove(0);
    }

    /// Redirect every use of every output of `n` to the corresponding output
    /// of `replacement`. Requires equal output arity.
    pub fn replace_all_uses_with(&mut self, n: NodeId, replacement: NodeId) -> Result<()> {
        let expected = self.outputs(n).len();
        let actual = self.outputs(replacement).len();
        ensure!(expected == actual, ArityMismatchSnafu { expected, actual });
        for i in 0..expected {
            let from = self.outputs(n)[i];
            let to = self.outputs(replacement)[i];
            self.replace_all_uses(from, to);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Destruction
    // ---------------------------------------------------------------------

    /// Erase a node entirely: outputs (which must be unused), child blocks,
    /// inputs, list membership, and finally its arena slot.
    pub fn destroy(&mut self, n: NodeId) -> Result<()> {
        while !self.outputs(n).is_empty() {
            self.erase_output(n, self.outputs(n).len() - 1)?;
        }
        while !self.node_blocks(n).is_empty() {
            self.erase_block(n, self.node_blocks(n).len() - 1)?;
        }
        self.remove_all_inputs(n);
        if self.is_placed(n) {
            self.remove_from_list(n)?;
        }
        self.free_node(n);
        Ok(())
    }

    /// Detach and destroy child block `i` of node `n`.
    pub fn erase_block(&mut self, n: NodeId, i: usize) -> Result<()> {
        self.node_mut(n).schema = SchemaCache::Unresolved;
        let b = self.node_mut(n).blocks.remove(i);
        self.destroy_block(b)
    }

    /// Destroy a block: its nodes in reverse order, then its sentinels.
    pub(crate) fn destroy_block(&mut self, b: BlockId) -> Result<()> {
        let ret = self.block_return(b);
        self.remove_all_inputs(ret);
        let nodes: Vec<NodeId> = self.block_nodes(b).collect();
        for n in nodes.into_iter().rev() {
            self.destroy(n)?;
        }
        let param = self.block_param(b);
        self.destroy_sentinel(ret)?;
        self.destroy_sentinel(param)?;
        self.free_block(b);
        Ok(())
    }

    /// Sentinels are not list members in the usual sense; tear one down
    /// without touching neighbor links.
    fn destroy_sentinel(&mut self, n: NodeId) -> Result<()> {
        while !self.outputs(n).is_empty() {
            self.erase_output(n, self.outputs(n).len() - 1)?;
        }
        self.remove_all_inputs(n);
        self.free_node(n);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Cloning
    // ---------------------------------------------------------------------

    /// Shallow copy of attributes, scope and source location from `src` in
    /// another graph. Inputs are not copied.
    pub fn clone_from(&mut self, dst: NodeId, src_graph: &Graph, src: NodeId) {
        let src_node = src_graph.node(src);
        let attrs = src_node.attrs.clone();
        let scope = src_node.scope.clone();
        let source_range = src_node.source_range.clone();
        let node = self.node_mut(dst);
        node.attrs = attrs;
        node.source_range = source_range;
        if scope.is_some() {
            node.scope = scope;
        }
    }

    /// Same-graph variant of [`Graph::clone_from`].
    pub fn clone_node_from(&mut self, dst: NodeId, src: NodeId) {
        let src_node = self.node(src);
        let attrs = src_node.attrs.clone();
        let scope = src_node.scope.clone();
        let source_range = src_node.source_range.clone();
        let node = self.node_mut(dst);
        node.attrs = attrs;
        node.source_range = source_range;
        if scope.is_some() {
            node.scope = scope;
        }
    }

    /// Copy type and (when present) unique name from a value in `src_graph`.
    pub fn copy_metadata(&mut self, dst: ValueId, src_graph: &Graph, src: ValueId) -> Result<()> {
        self.set_value_type(dst, src_graph.value_type(src).clone());
        if src_graph.has_unique_name(src) {
            self.set_unique_name(dst, &src_graph.unique_name(src))?;
        }
        Ok(())
    }

    /// Produce a structurally identical unplaced node in this graph,
    /// translating each input through `value_map` and optionally cloning
    /// child blocks recursively.
    pub fn create_clone(
        &mut self,
        src_graph: &Graph,
        src: NodeId,
        value_map: ValueMap<'_>,
        copy_blocks: bool,
    ) -> Result<NodeId> {
        let n = self.create_node(src_graph.kind(src).clone(), 0);
        for &o in src_graph.outputs(src) {
            let no = self.add_output(n, src_graph.value_type(o).clone());
            self.copy_metadata(no, src_graph, o)?;
        }
        self.clone_from(n, src_graph, src);
        for &i in src_graph.inputs(src) {
            let mapped = value_map(i).ok_or(crate::Error::ValueNotInScope { value: i })?;
            self.add_input(n, mapped);
        }
        if copy_blocks {
            for &b in src_graph.node_blocks(src) {
                let nb = self.add_block(n);
                self.clone_block_from(nb, src_graph, b, value_map)?;
            }
        }
        Ok(n)
    }

    /// Clone the contents of `src_block` (from `src_graph`) into `dst`,
    /// resolving out-of-block values through `value_map`.
    pub fn clone_block_from(
        &mut self,
        dst: BlockId,
        src_graph: &Graph,
        src_block: BlockId,
        value_map: ValueMap<'_>,
    ) -> Result<()> {
        let mut local: HashMap<ValueId, ValueId> = HashMap::new();

        for &input in src_graph.block_inputs(src_block) {
            let ni = self.add_block_input(dst, src_graph.value_type(input).clone());
            self.copy_metadata(ni, src_graph, input)?;
            local.insert(input, ni);
        }

        let nodes: Vec<NodeId> = src_graph.block_nodes(src_block).collect();
        for src_node in nodes {
            let new_node = self.create_clone(
                src_graph,
                src_node,
                &mut |v| local.get(&v).copied().or_else(|| value_map(v)),
                true,
            )?;
            self.append(new_node, dst)?;
            let pairs: Vec<(ValueId, ValueId)> = src_graph
                .outputs(src_node)
                .iter()
                .copied()
                .zip(self.outputs(new_node).iter().copied())
                .collect();
            local.extend(pairs);
        }

        for &output in src_graph.block_outputs(src_block) {
            let mapped = local
                .get(&output)
                .copied()
                .or_else(|| value_map(output))
                .ok_or(crate::Error::ValueNotInScope { value: output })?;
            self.register_block_output(dst, mapped);
        }
        Ok(())
    }

    /// Deep copy of the whole graph. The copy of a lint-clean graph is
    /// lint-clean.
    pub fn copy(&self) -> Result<Graph> {
        let mut new_graph = Graph::new();
        let root = new_graph.root_block();
        new_graph.clone_block_from(root, self, self.root_block(), &mut |_| None)?;
        Ok(new_graph)
    }
}
