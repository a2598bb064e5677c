//! Construction of the alias database and its read queries.

use std::collections::{HashMap, HashSet};

use skein_ir::{BlockId, Graph, NodeId, NodeKind, ValueId};
use skein_types::{Type, TypeRef};
use snafu::ensure;

use crate::error::{
    AliasMapAritySnafu, Result, ReturnArityMismatchSnafu, UnboundFormalAliasSnafu, UnknownOperatorSnafu,
};
use crate::info::{AliasInfo, AliasSymbol};

/// Values that either are mutable or could contain mutable storage get alias
/// annotations; scalars do not.
fn should_annotate_type(ty: &TypeRef) -> bool {
    match &**ty {
        t if t.is_tensor() => true,
        Type::List(_) | Type::Tuple(_) => true,
        Type::Optional(elem) => should_annotate_type(elem),
        _ => false,
    }
}

/// Alias-set membership and write tracking for one graph snapshot.
///
/// Built once over an immutable graph; queries never mutate. If the graph is
/// mutated afterwards (other than by [`AliasDb::try_move`], which only
/// reorders), the database is stale and must be rebuilt.
#[derive(Debug, PartialEq)]
pub struct AliasDb {
    value_aliases: HashMap<ValueId, AliasInfo>,
    alias_writes: HashMap<AliasSymbol, HashSet<NodeId>>,
    /// Alias info each node may write through, per its schema.
    node_writes: HashMap<NodeId, AliasInfo>,
    next_symbol: u32,
}

impl AliasDb {
    /// Run the analysis over the whole graph.
    pub fn build(graph: &Graph) -> Result<Self> {
        let mut db = AliasDb {
            value_aliases: HashMap::new(),
            alias_writes: HashMap::new(),
            node_writes: HashMap::new(),
            next_symbol: 0,
        };
        db.seed_graph_inputs(graph);
        db.analyze_block(graph, graph.root_block())?;
        Ok(db)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Alias-set membership of a value, if it is annotatable.
    pub fn alias_info(&self, v: ValueId) -> Option<&AliasInfo> {
        self.value_aliases.get(&v)
    }

    /// Nodes that may write to the given alias set.
    pub fn writes_to(&self, symbol: AliasSymbol) -> Option<&HashSet<NodeId>> {
        self.alias_writes.get(&symbol)
    }

    /// Does any input or output of `n` carry the wildcard set?
    pub fn has_wildcard(&self, graph: &Graph, n: NodeId) -> bool {
        graph
            .inputs(n)
            .iter()
            .chain(graph.outputs(n))
            .any(|v| self.value_aliases.get(v).is_some_and(AliasInfo::is_wildcard))
    }

    /// Does `n` write to any alias set?
    pub fn has_writes(&self, n: NodeId) -> bool {
        self.node_writes.get(&n).is_some_and(|w| !w.is_empty())
    }

    /// Union of the writer sets of every alias set touched by `n`'s inputs
    /// or outputs. A touched wildcard pulls in every writer.
    pub fn writers_of(&self, graph: &Graph, n: NodeId) -> HashSet<NodeId> {
        let touched = self.touched_info(graph, n);
        let mut writers = HashSet::new();
        if touched.is_wildcard() {
            for nodes in self.alias_writes.values() {
                writers.extend(nodes.iter().copied());
            }
        } else {
            for set in touched.sets() {
                if let Some(nodes) = self.alias_writes.get(set) {
                    writers.extend(nodes.iter().copied());
                }
            }
        }
        // Wildcard writers may write through any set.
        for (&node, written) in &self.node_writes {
            if written.is_wildcard() && !touched.is_empty() {
                writers.insert(node);
            }
        }
        writers
    }

    pub fn has_writers(&self, graph: &Graph, n: NodeId) -> bool {
        !self.writers_of(graph, n).is_empty()
    }

    /// Union of the alias info over a node's inputs and outputs.
    pub(crate) fn touched_info(&self, graph: &Graph, n: NodeId) -> AliasInfo {
        let mut info = AliasInfo::new();
        for v in graph.inputs(n).iter().chain(graph.outputs(n)) {
            if let Some(i) = self.value_aliases.get(v) {
                info.union_with(i);
            }
        }
        info
    }

    /// Alias info the node may write through.
    pub(crate) fn written_info(&self, n: NodeId) -> AliasInfo {
        self.node_writes.get(&n).cloned().unwrap_or_default()
    }

    // ---------------------------------------------------------------------
    // Seeding
    // ---------------------------------------------------------------------

    fn fresh_symbol(&mut self) -> AliasSymbol {
        let symbol = AliasSymbol(self.next_symbol);
        self.next_symbol += 1;
        symbol
    }

    /// Graph inputs of one type may alias each other: all tensors share one
    /// set, lists share one set per (folded) element type, tuples one set per
    /// tuple type. Optionals are unwrapped first.
    fn seed_graph_inputs(&mut self, graph: &Graph) {
        let tensor_alias = self.fresh_symbol();
        let mut list_aliases: HashMap<TypeRef, AliasSymbol> = HashMap::new();
        let mut tuple_aliases: HashMap<TypeRef, AliasSymbol> = HashMap::new();

        for &input in graph.graph_inputs() {
            let mut ty = graph.value_type(input).clone();
            if let Type::Optional(elem) = &*ty {
                ty = elem.clone();
            }

            if ty.is_tensor() {
                self.add_alias_symbol(graph, input, tensor_alias);
            } else if let Type::List(elem) = &*ty {
                // All tensor subtypes may alias each other, so lists of any
                // of them fold into one set.
                let folded = if elem.is_tensor() { Type::dynamic() } else { elem.clone() };
                let symbol = *list_aliases.entry(folded).or_insert_with(|| {
                    let s = AliasSymbol(self.next_symbol);
                    self.next_symbol += 1;
                    s
                });
                self.add_alias_symbol(graph, input, symbol);
            } else if matches!(&*ty, Type::Tuple(_)) {
                let symbol = *tuple_aliases.entry(ty.clone()).or_insert_with(|| {
                    let s = AliasSymbol(self.next_symbol);
                    self.next_symbol += 1;
                    s
                });
                self.add_alias_symbol(graph, input, symbol);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Analysis walk
    // ---------------------------------------------------------------------

    fn analyze_block(&mut self, graph: &Graph, block: BlockId) -> Result<()> {
        for node in graph.block_nodes(block) {
            self.analyze_node(graph, node)?;
        }
        Ok(())
    }

    /// Retrieve alias info for every input, then propagate to the outputs
    /// either through a dedicated analyzer for the structural kinds or
    /// through the schema's alias annotations.
    fn analyze_node(&mut self, graph: &Graph, node: NodeId) -> Result<()> {
        match graph.kind(node) {
            NodeKind::If => self.analyze_if(graph, node),
            NodeKind::Loop => self.analyze_loop(graph, node),
            NodeKind::FusionGroup | NodeKind::DifferentiableGraph => self.analyze_subgraph(graph, node),
            NodeKind::Constant
            | NodeKind::NoneConst
            | NodeKind::Undefined
            | NodeKind::ListConstruct
            | NodeKind::TupleConstruct
            | NodeKind::FusedConcat => {
                self.analyze_creator(graph, node);
                Ok(())
            }
            NodeKind::TupleUnpack | NodeKind::TupleIndex | NodeKind::TupleSlice | NodeKind::ListUnpack => {
                self.analyze_extractor(graph, node);
                Ok(())
            }
            NodeKind::Chunk => self.analyze_chunk(graph, node),
            NodeKind::Op(name)
                if matches!(&**name, "aten::add" | "aten::sub" | "aten::mul" | "aten::div")
                    && graph.node_schema(node).is_none() =>
            {
                // Unschematized combinations of tensor/primitive arithmetic
                // produce fresh values.
                self.analyze_creator(graph, node);
                Ok(())
            }
            NodeKind::Op(_) => self.analyze_schematized(graph, node),
            NodeKind::Param | NodeKind::Return => Ok(()),
        }
    }

    fn analyze_schematized(&mut self, graph: &Graph, node: NodeId) -> Result<()> {
        let mutable_outputs = graph.outputs(node).iter().any(|&o| should_annotate_type(graph.value_type(o)));

        let Some(schema) = graph.node_schema(node) else {
            // The op must either be schematized or handled by a dedicated
            // analyzer above.
            ensure!(
                !mutable_outputs,
                UnknownOperatorSnafu {
                    node,
                    kind: graph.kind(node).qual_string().to_string(),
                    source_location: graph.source_range(node).map(str::to_string),
                }
            );
            return Ok(());
        };

        if schema.is_vararg || schema.is_varret {
            // No alias info for variadic signatures.
            ensure!(
                !mutable_outputs,
                UnknownOperatorSnafu {
                    node,
                    kind: graph.kind(node).qual_string().to_string(),
                    source_location: graph.source_range(node).map(str::to_string),
                }
            );
            return Ok(());
        }

        ensure!(
            schema.returns.len() == graph.outputs(node).len(),
            ReturnArityMismatchSnafu {
                schema: schema.name.to_string(),
                node,
                declared: schema.returns.len(),
                actual: graph.outputs(node).len(),
            }
        );

        // Bind formal alias symbols to the actual argument alias sets.
        let mut formal_to_actual: HashMap<&str, AliasInfo> = HashMap::new();
        formal_to_actual.insert("*", AliasInfo::wildcard());
        for (formal, &actual) in schema.arguments.iter().zip(graph.inputs(node)) {
            let Some(annotation) = &formal.alias_info else { continue };
            let symbol: &str = if annotation.is_wildcard { "*" } else { &annotation.symbol };

            // A symbol binds once; repeats reuse the first binding.
            if !formal_to_actual.contains_key(symbol) {
                let actual_info = self.value_aliases.get(&actual).cloned().unwrap_or_default();
                formal_to_actual.insert(symbol, actual_info);
            }

            if annotation.is_write {
                let written = formal_to_actual[symbol].clone();
                self.record_writes(node, &written);
            }
        }

        // Use the binding to give aliases to the outputs.
        for (formal, &actual) in schema.returns.iter().zip(graph.outputs(node)) {
            let Some(annotation) = &formal.alias_info else {
                // This is a fresh value.
                self.give_fresh_alias(graph, actual);
                continue;
            };
            let symbol: &str = if annotation.is_wildcard { "*" } else { &annotation.symbol };
            let output_info = formal_to_actual
                .get(symbol)
                .cloned()
                .ok_or_else(|| {
                    UnboundFormalAliasSnafu { symbol: symbol.to_string(), schema: schema.name.to_string() }.build()
                })?;

            if annotation.is_write {
                self.record_writes(node, &output_info);
            }
            self.add_alias_info(graph, actual, output_info);
        }
        Ok(())
    }

    /// An output's alias set is the union over both branches.
    fn analyze_if(&mut self, graph: &Graph, node: NodeId) -> Result<()> {
        let blocks = graph.node_blocks(node);
        let (true_block, false_block) = (blocks[0], blocks[1]);
        self.analyze_block(graph, true_block)?;
        self.analyze_block(graph, false_block)?;

        for (i, &output) in graph.outputs(node).iter().enumerate() {
            let true_out = graph.block_outputs(true_block)[i];
            let false_out = graph.block_outputs(false_block)[i];
            self.add_alias_from(graph, output, true_out);
            self.add_alias_from(graph, output, false_out);
        }
        Ok(())
    }

    /// Iterate the body until the loop-carried alias info stops changing.
    fn analyze_loop(&mut self, graph: &Graph, node: NodeId) -> Result<()> {
        let body = graph.node_blocks(node)[0];
        let carried_inputs = &graph.inputs(node)[2..]; // skip max trip count, cond
        let block_inputs = &graph.block_inputs(body)[1..]; // skip trip count
        let block_outputs = &graph.block_outputs(body)[1..]; // skip cond
        ensure!(
            carried_inputs.len() == block_inputs.len(),
            AliasMapAritySnafu { to: block_inputs.len(), from: carried_inputs.len() }
        );
        ensure!(
            block_outputs.len() == graph.outputs(node).len(),
            AliasMapAritySnafu { to: graph.outputs(node).len(), from: block_outputs.len() }
        );

        let mut rounds = 0usize;
        loop {
            rounds += 1;
            // Copy carried-input aliases onto the body's params.
            self.map_aliases(graph, block_inputs, carried_inputs)?;

            self.analyze_block(graph, body)?;

            // Copy body outputs onto the node outputs.
            self.map_aliases(graph, graph.outputs(node), block_outputs)?;

            // Merge body outputs back into the carried inputs; converged when
            // a whole round leaves every carried input's info unchanged.
            let mut changed = false;
            for (&input, &output) in carried_inputs.iter().zip(block_outputs) {
                let before = self.value_aliases.get(&input).cloned();
                self.add_alias_from(graph, input, output);
                if self.value_aliases.get(&input) != before.as_ref() {
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        tracing::trace!(node = %node, rounds, "loop alias analysis converged");
        Ok(())
    }

    /// Map aliases across the subgraph boundary in both directions.
    fn analyze_subgraph(&mut self, graph: &Graph, node: NodeId) -> Result<()> {
        let body = graph.node_blocks(node)[0];
        self.map_aliases(graph, graph.block_inputs(body), graph.inputs(node))?;
        self.analyze_block(graph, body)?;
        self.map_aliases(graph, graph.outputs(node), graph.block_outputs(body))
    }

    /// Nodes that produce fresh values from nothing.
    fn analyze_creator(&mut self, graph: &Graph, node: NodeId) {
        for &output in graph.outputs(node) {
            self.give_fresh_alias(graph, output);
        }
    }

    /// Extraction from a composite gives up and produces wildcards.
    fn analyze_extractor(&mut self, graph: &Graph, node: NodeId) {
        for &output in graph.outputs(node) {
            self.add_alias_info(graph, output, AliasInfo::wildcard());
        }
    }

    /// Every chunk output may alias the input.
    fn analyze_chunk(&mut self, graph: &Graph, node: NodeId) -> Result<()> {
        let input = graph.inputs(node)[0];
        let info = self.value_aliases.get(&input).cloned().unwrap_or_default();
        for &output in graph.outputs(node) {
            self.add_alias_info(graph, output, info.clone());
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Alias bookkeeping
    // ---------------------------------------------------------------------

    fn record_writes(&mut self, node: NodeId, written: &AliasInfo) {
        for &set in written.sets() {
            self.alias_writes.entry(set).or_default().insert(node);
        }
        if !written.is_empty() {
            self.node_writes.entry(node).or_default().union_with(written);
        }
    }

    fn add_alias_symbol(&mut self, graph: &Graph, value: ValueId, symbol: AliasSymbol) {
        if !should_annotate_type(graph.value_type(value)) {
            return;
        }
        self.value_aliases.entry(value).or_default().add_set(symbol);
    }

    fn add_alias_info(&mut self, graph: &Graph, value: ValueId, info: AliasInfo) {
        if !should_annotate_type(graph.value_type(value)) {
            return;
        }
        self.value_aliases.entry(value).or_default().union_with(&info);
    }

    /// Union `value`'s info with `from`'s.
    fn add_alias_from(&mut self, graph: &Graph, value: ValueId, from: ValueId) {
        let Some(info) = self.value_aliases.get(&from).cloned() else { return };
        self.add_alias_info(graph, value, info);
    }

    fn map_aliases(&mut self, graph: &Graph, to: &[ValueId], from: &[ValueId]) -> Result<()> {
        ensure!(to.len() == from.len(), AliasMapAritySnafu { to: to.len(), from: from.len() });
        for (&t, &f) in to.iter().zip(from) {
            self.add_alias_from(graph, t, f);
        }
        Ok(())
    }

    /// A fresh set for a value believed to share storage with nothing seen
    /// so far. Values that already have info (loop bodies re-analyzed to
    /// fixpoint) keep it.
    fn give_fresh_alias(&mut self, graph: &Graph, value: ValueId) {
        if !should_annotate_type(graph.value_type(value)) || self.value_aliases.contains_key(&value) {
            return;
        }
        let symbol = self.fresh_symbol();
        self.value_aliases.insert(value, AliasInfo::from_symbol(symbol));
    }
}
