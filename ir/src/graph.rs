//! Graph, Block, Node and Value entities and their arenas.

use std::collections::HashMap;
use std::sync::Arc;

use skein_types::{Type, TypeRef};
use smallvec::SmallVec;
use snafu::ensure;

use crate::error::{IntegerNameSnafu, Result, UnexpectedTypeSnafu};
use crate::schema::SchemaCache;
use crate::topo::{LOWER_BOUND, UPPER_BOUND};
use crate::{BlockId, NodeId, ValueId};

/// A single recorded use of a value: which node consumes it, at which input offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Use {
    pub user: NodeId,
    pub offset: usize,
}

/// Attribute bag entry.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f64),
    Floats(Vec<f64>),
    Str(Box<str>),
    Strs(Vec<Box<str>>),
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Ints(v) => write!(f, "{v:?}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Floats(v) => write!(f, "{v:?}"),
            AttrValue::Str(v) => write!(f, "{v:?}"),
            AttrValue::Strs(v) => write!(f, "{v:?}"),
        }
    }
}

/// Symbolic node kind.
///
/// The structural primitives are closed variants; everything schematized
/// (operators resolved through the registry) goes through [`NodeKind::Op`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Param,
    Return,
    If,
    Loop,
    FusionGroup,
    DifferentiableGraph,
    Constant,
    NoneConst,
    Undefined,
    ListConstruct,
    TupleConstruct,
    TupleUnpack,
    TupleIndex,
    TupleSlice,
    ListUnpack,
    FusedConcat,
    Chunk,
    Op(Arc<str>),
}

impl NodeKind {
    /// Qualified spelling used by the textual form.
    pub fn qual_string(&self) -> &str {
        match self {
            NodeKind::Param => "prim::Param",
            NodeKind::Return => "prim::Return",
            NodeKind::If => "prim::If",
            NodeKind::Loop => "prim::Loop",
            NodeKind::FusionGroup => "prim::FusionGroup",
            NodeKind::DifferentiableGraph => "prim::DifferentiableGraph",
            NodeKind::Constant => "prim::Constant",
            NodeKind::NoneConst => "prim::None",
            NodeKind::Undefined => "prim::Undefined",
            NodeKind::ListConstruct => "prim::ListConstruct",
            NodeKind::TupleConstruct => "prim::TupleConstruct",
            NodeKind::TupleUnpack => "prim::TupleUnpack",
            NodeKind::TupleIndex => "prim::TupleIndex",
            NodeKind::TupleSlice => "prim::TupleSlice",
            NodeKind::ListUnpack => "prim::ListUnpack",
            NodeKind::FusedConcat => "prim::FusedConcat",
            NodeKind::Chunk => "prim::Chunk",
            NodeKind::Op(name) => name,
        }
    }

    /// Subgraph-bearing kinds hoist their child block in the textual form.
    pub fn has_subgraph(&self) -> bool {
        matches!(self, NodeKind::FusionGroup | NodeKind::DifferentiableGraph)
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) owning_block: Option<BlockId>,
    pub(crate) inputs: SmallVec<[ValueId; 4]>,
    pub(crate) outputs: SmallVec<[ValueId; 4]>,
    pub(crate) blocks: SmallVec<[BlockId; 2]>,
    pub(crate) attrs: Vec<(Box<str>, AttrValue)>,
    pub(crate) schema: SchemaCache,
    pub(crate) topo_position: i64,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) scope: Option<Arc<str>>,
    pub(crate) source_range: Option<Arc<str>>,
}

#[derive(Debug)]
pub(crate) struct Value {
    pub(crate) node: NodeId,
    pub(crate) offset: usize,
    pub(crate) ty: TypeRef,
    pub(crate) unique: usize,
    pub(crate) name: Option<String>,
    pub(crate) uses: Vec<Use>,
}

#[derive(Debug)]
pub(crate) struct Block {
    pub(crate) param: NodeId,
    pub(crate) ret: NodeId,
    pub(crate) owning_node: Option<NodeId>,
}

/// A computation graph: the exclusive owner of its nodes, values and blocks.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    values: Vec<Option<Value>>,
    blocks: Vec<Option<Block>>,
    free_nodes: Vec<NodeId>,
    free_values: Vec<ValueId>,
    free_blocks: Vec<BlockId>,
    root: BlockId,
    pub(crate) next_unique: usize,
    pub(crate) unique_names: HashMap<String, ValueId>,
    current_scope: Option<Arc<str>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        let mut g = Graph {
            nodes: Vec::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            free_nodes: Vec::new(),
            free_values: Vec::new(),
            free_blocks: Vec::new(),
            root: BlockId(0),
            next_unique: 0,
            unique_names: HashMap::new(),
            current_scope: None,
        };
        g.root = g.alloc_block(None);
        g
    }

    // ---------------------------------------------------------------------
    // Arena plumbing
    // ---------------------------------------------------------------------

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.index()].as_ref().expect("stale node handle")
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.index()].as_mut().expect("stale node handle")
    }

    pub(crate) fn value(&self, id: ValueId) -> &Value {
        self.values[id.index()].as_ref().expect("stale value handle")
    }

    pub(crate) fn value_mut(&mut self, id: ValueId) -> &mut Value {
        self.values[id.index()].as_mut().expect("stale value handle")
    }

    pub(crate) fn block(&self, id: BlockId) -> &Block {
        self.blocks[id.index()].as_ref().expect("stale block handle")
    }

    pub(crate) fn is_live_node(&self, id: NodeId) -> bool {
        self.nodes.get(id.index()).is_some_and(Option::is_some)
    }

    pub(crate) fn is_live_value(&self, id: ValueId) -> bool {
        self.values.get(id.index()).is_some_and(Option::is_some)
    }

    fn alloc_node_slot(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free_nodes.pop() {
            self.nodes[id.index()] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            NodeId((self.nodes.len() - 1) as u32)
        }
    }

    fn alloc_value_slot(&mut self, value: Value) -> ValueId {
        if let Some(id) = self.free_values.pop() {
            self.values[id.index()] = Some(value);
            id
        } else {
            self.values.push(Some(value));
            ValueId((self.values.len() - 1) as u32)
        }
    }

    pub(crate) fn free_node(&mut self, id: NodeId) {
        self.nodes[id.index()] = None;
        self.free_nodes.push(id);
    }

    pub(crate) fn free_value(&mut self, id: ValueId) {
        if let Some(name) = self.value(id).name.clone() {
            self.unique_names.remove(&name);
        }
        self.values[id.index()] = None;
        self.free_values.push(id);
    }

    pub(crate) fn free_block(&mut self, id: BlockId) {
        self.blocks[id.index()] = None;
        self.free_blocks.push(id);
    }

    /// Allocate a fresh block with its two sentinels.
    pub(crate) fn alloc_block(&mut self, owner: Option<NodeId>) -> BlockId {
        let id = if let Some(id) = self.free_blocks.pop() {
            id
        } else {
            self.blocks.push(None);
            BlockId((self.blocks.len() - 1) as u32)
        };
        let param = self.raw_node(NodeKind::Param);
        let ret = self.raw_node(NodeKind::Return);
        {
            let p = self.node_mut(param);
            p.owning_block = Some(id);
            p.topo_position = LOWER_BOUND;
            p.next = Some(ret);
        }
        {
            let r = self.node_mut(ret);
            r.owning_block = Some(id);
            r.topo_position = UPPER_BOUND;
            r.prev = Some(param);
        }
        self.blocks[id.index()] = Some(Block { param, ret, owning_node: owner });
        id
    }

    fn raw_node(&mut self, kind: NodeKind) -> NodeId {
        self.alloc_node_slot(Node {
            kind,
            owning_block: None,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            blocks: SmallVec::new(),
            attrs: Vec::new(),
            schema: SchemaCache::Unresolved,
            topo_position: 0,
            prev: None,
            next: None,
            scope: self.current_scope.clone(),
            source_range: None,
        })
    }

    // ---------------------------------------------------------------------
    // Read API
    // ---------------------------------------------------------------------

    pub fn root_block(&self) -> BlockId {
        self.root
    }

    pub fn kind(&self, n: NodeId) -> &NodeKind {
        &self.node(n).kind
    }

    pub fn inputs(&self, n: NodeId) -> &[ValueId] {
        &self.node(n).inputs
    }

    pub fn outputs(&self, n: NodeId) -> &[ValueId] {
        &self.node(n).outputs
    }

    /// Single output of a one-output node.
    pub fn output(&self, n: NodeId) -> ValueId {
        let outputs = self.outputs(n);
        debug_assert_eq!(outputs.len(), 1);
        outputs[0]
    }

    pub fn node_blocks(&self, n: NodeId) -> &[BlockId] {
        &self.node(n).blocks
    }

    pub fn owning_block(&self, n: NodeId) -> Option<BlockId> {
        self.node(n).owning_block
    }

    /// Whether the node is live in some block's list.
    pub fn is_placed(&self, n: NodeId) -> bool {
        self.node(n).owning_block.is_some()
    }

    pub fn topo_position(&self, n: NodeId) -> i64 {
        self.node(n).topo_position
    }

    /// Successor in the block list (the return sentinel has none).
    pub fn next_node(&self, n: NodeId) -> Option<NodeId> {
        self.node(n).next
    }

    /// Predecessor in the block list (the param sentinel has none).
    pub fn prev_node(&self, n: NodeId) -> Option<NodeId> {
        self.node(n).prev
    }

    pub fn scope_of(&self, n: NodeId) -> Option<&str> {
        self.node(n).scope.as_deref()
    }

    pub fn source_range(&self, n: NodeId) -> Option<&str> {
        self.node(n).source_range.as_deref()
    }

    pub fn set_source_range(&mut self, n: NodeId, range: impl Into<Arc<str>>) {
        self.node_mut(n).source_range = Some(range.into());
    }

    pub fn set_current_scope(&mut self, scope: Option<Arc<str>>) {
        self.current_scope = scope;
    }

    pub fn attr(&self, n: NodeId, name: &str) -> Option<&AttrValue> {
        self.node(n).attrs.iter().find(|(k, _)| &**k == name).map(|(_, v)| v)
    }

    pub fn set_attr(&mut self, n: NodeId, name: impl Into<Box<str>>, value: AttrValue) {
        let name = name.into();
        let node = self.node_mut(n);
        if let Some(slot) = node.attrs.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            node.attrs.push((name, value));
        }
    }

    pub fn attrs(&self, n: NodeId) -> &[(Box<str>, AttrValue)] {
        &self.node(n).attrs
    }

    pub fn value_node(&self, v: ValueId) -> NodeId {
        self.value(v).node
    }

    pub fn value_offset(&self, v: ValueId) -> usize {
        self.value(v).offset
    }

    pub fn value_type(&self, v: ValueId) -> &TypeRef {
        &self.value(v).ty
    }

    pub fn set_value_type(&mut self, v: ValueId, ty: TypeRef) {
        self.value_mut(v).ty = ty;
    }

    pub fn value_unique(&self, v: ValueId) -> usize {
        self.value(v).unique
    }

    pub fn value_uses(&self, v: ValueId) -> &[Use] {
        &self.value(v).uses
    }

    pub fn block_param(&self, b: BlockId) -> NodeId {
        self.block(b).param
    }

    pub fn block_return(&self, b: BlockId) -> NodeId {
        self.block(b).ret
    }

    pub fn block_owner(&self, b: BlockId) -> Option<NodeId> {
        self.block(b).owning_node
    }

    /// Input values of a block (the param sentinel's outputs).
    pub fn block_inputs(&self, b: BlockId) -> &[ValueId] {
        self.outputs(self.block(b).param)
    }

    /// Output values of a block (the return sentinel's inputs).
    pub fn block_outputs(&self, b: BlockId) -> &[ValueId] {
        self.inputs(self.block(b).ret)
    }

    pub fn graph_inputs(&self) -> &[ValueId] {
        self.block_inputs(self.root)
    }

    pub fn graph_outputs(&self) -> &[ValueId] {
        self.block_outputs(self.root)
    }

    /// Iterate the real nodes of a block, in list order, sentinels excluded.
    pub fn block_nodes(&self, b: BlockId) -> impl Iterator<Item = NodeId> + '_ {
        let block = self.block(b);
        let ret = block.ret;
        let mut cur = self.node(block.param).next;
        std::iter::from_fn(move || {
            let id = cur?;
            if id == ret {
                return None;
            }
            cur = self.node(id).next;
            Some(id)
        })
    }

    /// Number of live nodes in all blocks, sentinels excluded.
    pub fn node_count(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| !matches!(n.kind, NodeKind::Param | NodeKind::Return))
            .count()
    }

    pub(crate) fn live_node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().enumerate().filter(|(_, slot)| slot.is_some()).map(|(i, _)| NodeId(i as u32))
    }

    pub(crate) fn live_value_ids(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.values.iter().enumerate().filter(|(_, slot)| slot.is_some()).map(|(i, _)| ValueId(i as u32))
    }

    // ---------------------------------------------------------------------
    // Node and value creation
    // ---------------------------------------------------------------------

    /// Allocate a fresh, unplaced node with `num_outputs` dynamic-typed outputs.
    pub fn create_node(&mut self, kind: NodeKind, num_outputs: usize) -> NodeId {
        let n = self.raw_node(kind);
        for _ in 0..num_outputs {
            self.add_output(n, Type::dynamic());
        }
        n
    }

    /// Allocate a node with the given inputs already attached.
    pub fn create_with_inputs(&mut self, kind: NodeKind, inputs: &[ValueId], num_outputs: usize) -> NodeId {
        let n = self.create_node(kind, num_outputs);
        for &i in inputs {
            self.add_input(n, i);
        }
        n
    }

    /// Append a fresh output value to a node.
    pub fn add_output(&mut self, n: NodeId, ty: TypeRef) -> ValueId {
        let offset = self.node(n).outputs.len();
        let unique = self.next_unique;
        self.next_unique += 1;
        let v = self.alloc_value_slot(Value { node: n, offset, ty, unique, name: None, uses: Vec::new() });
        let node = self.node_mut(n);
        node.outputs.push(v);
        node.schema = SchemaCache::Unresolved;
        v
    }

    /// Insert a fresh output value at offset `i`, shifting later offsets up.
    pub fn insert_output(&mut self, n: NodeId, i: usize, ty: TypeRef) -> ValueId {
        let unique = self.next_unique;
        self.next_unique += 1;
        let v = self.alloc_value_slot(Value { node: n, offset: i, ty, unique, name: None, uses: Vec::new() });
        let node = self.node_mut(n);
        node.outputs.insert(i, v);
        node.schema = SchemaCache::Unresolved;
        let later: Vec<ValueId> = node.outputs[i + 1..].to_vec();
        for o in later {
            self.value_mut(o).offset += 1;
        }
        v
    }

    /// Add an input value to a block's param sentinel.
    pub fn add_block_input(&mut self, b: BlockId, ty: TypeRef) -> ValueId {
        let param = self.block(b).param;
        self.add_output(param, ty)
    }

    /// Register a value as a block output (an input of the return sentinel).
    pub fn register_block_output(&mut self, b: BlockId, v: ValueId) {
        let ret = self.block(b).ret;
        self.add_input(ret, v);
    }

    /// Add an input value to the graph's root block.
    pub fn add_graph_input(&mut self, ty: TypeRef) -> ValueId {
        self.add_block_input(self.root, ty)
    }

    /// Register a graph output.
    pub fn register_output(&mut self, v: ValueId) {
        self.register_block_output(self.root, v);
    }

    /// Attach a fresh child block to a node.
    pub fn add_block(&mut self, n: NodeId) -> BlockId {
        let b = self.alloc_block(Some(n));
        let node = self.node_mut(n);
        node.blocks.push(b);
        node.schema = SchemaCache::Unresolved;
        b
    }

    // ---------------------------------------------------------------------
    // Factory constructors
    // ---------------------------------------------------------------------

    pub fn create_undefined(&mut self) -> NodeId {
        let n = self.create_node(NodeKind::Undefined, 1);
        self.set_value_type(self.output(n), Arc::new(Type::UndefinedTensor));
        n
    }

    pub fn create_none(&mut self, elem: TypeRef) -> NodeId {
        let n = self.create_node(NodeKind::NoneConst, 1);
        self.set_value_type(self.output(n), Type::optional(elem));
        n
    }

    pub fn create_tuple(&mut self, values: &[ValueId]) -> NodeId {
        let ty = Type::tuple(values.iter().map(|&v| self.value_type(v).clone()).collect());
        let n = self.create_with_inputs(NodeKind::TupleConstruct, values, 1);
        self.set_value_type(self.output(n), ty);
        n
    }

    pub fn create_tuple_unpack(&mut self, v: ValueId) -> Result<NodeId> {
        let elements = match &**self.value_type(v) {
            Type::Tuple(elements) => elements.clone(),
            _ => return UnexpectedTypeSnafu { expected: "tuple", actual: self.value_type(v).clone() }.fail(),
        };
        let n = self.create_with_inputs(NodeKind::TupleUnpack, &[v], 0);
        for elem in elements {
            self.add_output(n, elem);
        }
        Ok(n)
    }

    pub fn create_tuple_index(&mut self, tup: ValueId, index: i64) -> Result<NodeId> {
        let elements = match &**self.value_type(tup) {
            Type::Tuple(elements) => elements.clone(),
            _ => return UnexpectedTypeSnafu { expected: "tuple", actual: self.value_type(tup).clone() }.fail(),
        };
        ensure!(
            (0..elements.len() as i64).contains(&index),
            crate::error::InvariantViolationSnafu { reason: format!("tuple index {index} out of range") }
        );
        let n = self.create_with_inputs(NodeKind::TupleIndex, &[tup], 1);
        self.set_attr(n, "index", AttrValue::Int(index));
        self.set_value_type(self.output(n), elements[index as usize].clone());
        Ok(n)
    }

    pub fn create_tuple_slice(&mut self, tup: ValueId, beg: i64, end: i64) -> Result<NodeId> {
        let elements = match &**self.value_type(tup) {
            Type::Tuple(elements) => elements.clone(),
            _ => return UnexpectedTypeSnafu { expected: "tuple", actual: self.value_type(tup).clone() }.fail(),
        };
        ensure!(
            0 <= beg && beg <= end && end <= elements.len() as i64,
            crate::error::InvariantViolationSnafu { reason: format!("tuple slice [{beg}, {end}) out of range") }
        );
        let n = self.create_with_inputs(NodeKind::TupleSlice, &[tup], 1);
        self.set_attr(n, "beg", AttrValue::Int(beg));
        self.set_attr(n, "end", AttrValue::Int(end));
        let slice: Vec<TypeRef> = elements[beg as usize..end as usize].to_vec();
        self.set_value_type(self.output(n), Type::tuple(slice));
        Ok(n)
    }

    pub fn create_list(&mut self, elem: TypeRef, values: &[ValueId]) -> Result<NodeId> {
        for &v in values {
            ensure!(
                self.value_type(v).is_subtype_of(&elem),
                crate::error::InvariantViolationSnafu {
                    reason: format!("list element {} is not a {}", self.value_type(v), elem),
                }
            );
        }
        let n = self.create_with_inputs(NodeKind::ListConstruct, values, 1);
        self.set_value_type(self.output(n), Type::list(elem));
        Ok(n)
    }

    pub fn create_list_unpack(&mut self, v: ValueId, size: usize) -> Result<NodeId> {
        let elem = match &**self.value_type(v) {
            Type::List(elem) => elem.clone(),
            _ => return UnexpectedTypeSnafu { expected: "list", actual: self.value_type(v).clone() }.fail(),
        };
        let n = self.create_with_inputs(NodeKind::ListUnpack, &[v], 0);
        for _ in 0..size {
            self.add_output(n, elem.clone());
        }
        Ok(n)
    }

    /// All chunk outputs share the input's type (and, downstream, its aliases).
    pub fn create_chunk(&mut self, v: ValueId, chunks: usize) -> NodeId {
        let ty = self.value_type(v).clone();
        let n = self.create_with_inputs(NodeKind::Chunk, &[v], 0);
        self.set_attr(n, "chunks", AttrValue::Int(chunks as i64));
        for _ in 0..chunks {
            self.add_output(n, ty.clone());
        }
        n
    }

    /// Conditional with empty then/else blocks; the caller populates them and
    /// mirrors each block output onto a node output.
    pub fn create_if(&mut self, cond: ValueId, num_outputs: usize) -> NodeId {
        let n = self.create_with_inputs(NodeKind::If, &[cond], num_outputs);
        self.add_block(n);
        self.add_block(n);
        n
    }

    /// Loop over `carried` values.
    ///
    /// Inputs are `(max_trip_count, initial_condition, carried...)`; the body
    /// block starts with a trip-count param followed by one param per carried
    /// value; the caller registers `(condition, carried...)` block outputs.
    /// Node outputs mirror the carried values.
    pub fn create_loop(&mut self, max_trip_count: ValueId, cond: ValueId, carried: &[ValueId]) -> NodeId {
        let n = self.create_with_inputs(NodeKind::Loop, &[max_trip_count, cond], 0);
        for &c in carried {
            self.add_input(n, c);
            let ty = self.value_type(c).clone();
            self.add_output(n, ty);
        }
        let body = self.add_block(n);
        self.add_block_input(body, Type::int());
        let carried_types: Vec<TypeRef> = carried.iter().map(|&c| self.value_type(c).clone()).collect();
        for ty in carried_types {
            self.add_block_input(body, ty);
        }
        n
    }

    /// Fusion group: a subgraph-bearing node with no inputs or outputs yet.
    pub fn create_fusion_group(&mut self) -> NodeId {
        let n = self.create_node(NodeKind::FusionGroup, 0);
        self.add_block(n);
        n
    }

    // ---------------------------------------------------------------------
    // Unique names
    // ---------------------------------------------------------------------

    pub fn has_unique_name(&self, v: ValueId) -> bool {
        self.value(v).name.is_some()
    }

    /// Printable name: the assigned name, or the unique number when unnamed.
    pub fn unique_name(&self, v: ValueId) -> String {
        match &self.value(v).name {
            Some(name) => name.clone(),
            None => self.value(v).unique.to_string(),
        }
    }

    /// Assign a unique name. The empty string clears the name. If another
    /// value holds the name, that value is renamed with a fresh `.N` suffix.
    pub fn set_unique_name(&mut self, v: ValueId, name: &str) -> Result<()> {
        ensure!(
            name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()),
            IntegerNameSnafu { name: name.to_string() }
        );

        if let Some(old) = self.value_mut(v).name.take() {
            self.unique_names.remove(&old);
        }
        if name.is_empty() {
            return Ok(());
        }

        if let Some(&other) = self.unique_names.get(name) {
            let (base, mut suffix) = split_name_suffix(name);
            let base = base.to_string();
            let mut replacement;
            loop {
                suffix += 1;
                replacement = format!("{base}.{suffix}");
                if !self.unique_names.contains_key(&replacement) {
                    break;
                }
            }
            self.set_unique_name(other, &replacement)?;
        }

        self.unique_names.insert(name.to_string(), v);
        self.value_mut(v).name = Some(name.to_string());
        Ok(())
    }
}

/// Split a trailing `.N` numeric suffix off a name, returning `(base, N)`.
/// Names without the suffix return `(name, 0)`.
fn split_name_suffix(name: &str) -> (&str, u64) {
    if let Some(dot) = name.rfind('.')
        && dot + 1 < name.len()
        && name[dot + 1..].bytes().all(|b| b.is_ascii_digit())
        && let Ok(n) = name[dot + 1..].parse()
    {
        (&name[..dot], n)
    } else {
        (name, 0)
    }
}
