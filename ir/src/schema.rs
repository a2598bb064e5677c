//! Operator schemas and the lookup-by-signature registry contract.
//!
//! The IR never interprets operators itself; it consults an injected
//! [`OperatorRegistry`] to find the [`Schema`] for a node. The embedding
//! layer installs the registry once at initialization through
//! [`set_operator_registry`]; [`SchemaRegistry`] is a plain in-memory
//! implementation good enough for most embedders.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use skein_types::{TypeEnv, TypeRef, match_type_variables};

use crate::graph::{Graph, NodeKind};
use crate::NodeId;

/// Alias annotation of a schema argument or return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasAnnotation {
    /// Formal alias-set symbol, scoped to the schema (e.g. `a`).
    pub symbol: Box<str>,
    /// The operator may mutate storage reachable through this parameter.
    pub is_write: bool,
    /// The universal alias set; overlaps with everything.
    pub is_wildcard: bool,
}

impl AliasAnnotation {
    pub fn read(symbol: impl Into<Box<str>>) -> Self {
        Self { symbol: symbol.into(), is_write: false, is_wildcard: false }
    }

    pub fn write(symbol: impl Into<Box<str>>) -> Self {
        Self { symbol: symbol.into(), is_write: true, is_wildcard: false }
    }

    pub fn wildcard() -> Self {
        Self { symbol: "*".into(), is_write: false, is_wildcard: true }
    }
}

/// One declared argument or return of an operator.
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: Box<str>,
    pub ty: TypeRef,
    pub alias_info: Option<AliasAnnotation>,
}

impl Argument {
    pub fn new(name: impl Into<Box<str>>, ty: TypeRef) -> Self {
        Self { name: name.into(), ty, alias_info: None }
    }

    pub fn with_alias(mut self, alias: AliasAnnotation) -> Self {
        self.alias_info = Some(alias);
        self
    }
}

/// Declared signature of an operator kind.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: Arc<str>,
    pub arguments: Vec<Argument>,
    pub returns: Vec<Argument>,
    pub is_vararg: bool,
    pub is_varret: bool,
}

impl Schema {
    pub fn new(name: impl Into<Arc<str>>, arguments: Vec<Argument>, returns: Vec<Argument>) -> Self {
        Self { name: name.into(), arguments, returns, is_vararg: false, is_varret: false }
    }

    /// Structural match of a node against this overload: arity, then formal
    /// types (with free variables) against the actual input types.
    pub fn matches(&self, graph: &Graph, node: NodeId) -> bool {
        let inputs = graph.inputs(node);
        let arity_ok = if self.is_vararg { inputs.len() >= self.arguments.len() } else { inputs.len() == self.arguments.len() };
        if !arity_ok {
            return false;
        }
        let mut env = TypeEnv::new();
        self.arguments.iter().zip(inputs).all(|(formal, &actual)| {
            let actual_ty = graph.value_type(actual);
            if formal.ty.has_free_variables() {
                match_type_variables(&formal.ty, actual_ty, &mut env).is_ok()
            } else {
                actual_ty.is_subtype_of(&formal.ty)
            }
        })
    }
}

/// Resolution state of a node's cached schema pointer.
#[derive(Debug, Clone, Default)]
pub(crate) enum SchemaCache {
    /// Never looked up, or invalidated by a mutation.
    #[default]
    Unresolved,
    /// Looked up; the registry has no matching overload.
    Missing,
    Resolved(Arc<Schema>),
}

/// Lookup-by-signature contract the IR consumes.
pub trait OperatorRegistry: Send + Sync {
    fn lookup(&self, graph: &Graph, node: NodeId) -> Option<Arc<Schema>>;
}

/// In-memory registry: overloads grouped by qualified operator name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_name: HashMap<Arc<str>, Vec<Arc<Schema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Schema) {
        self.by_name.entry(schema.name.clone()).or_default().push(Arc::new(schema));
    }
}

impl OperatorRegistry for SchemaRegistry {
    fn lookup(&self, graph: &Graph, node: NodeId) -> Option<Arc<Schema>> {
        let NodeKind::Op(name) = graph.kind(node) else {
            return None;
        };
        let overloads = self.by_name.get(name)?;
        overloads.iter().find(|s| s.matches(graph, node)).cloned()
    }
}

/// Process-wide registry slot, injected by the embedding layer.
static OPERATOR_REGISTRY: Lazy<RwLock<Option<Arc<dyn OperatorRegistry>>>> = Lazy::new(|| RwLock::new(None));

/// Install the operator registry. Replaces any previous installation.
pub fn set_operator_registry(registry: Arc<dyn OperatorRegistry>) {
    *OPERATOR_REGISTRY.write() = Some(registry);
}

/// The currently installed registry, if any.
pub fn operator_registry() -> Option<Arc<dyn OperatorRegistry>> {
    OPERATOR_REGISTRY.read().clone()
}

impl Graph {
    /// Schema for a node, consulting the cache but never writing it.
    pub fn node_schema(&self, n: NodeId) -> Option<Arc<Schema>> {
        match &self.node(n).schema {
            SchemaCache::Resolved(schema) => Some(schema.clone()),
            SchemaCache::Missing => None,
            SchemaCache::Unresolved => operator_registry()?.lookup(self, n),
        }
    }

    /// Schema for a node, caching the resolution on the node.
    pub fn resolve_schema(&mut self, n: NodeId) -> Option<Arc<Schema>> {
        if let SchemaCache::Unresolved = self.node(n).schema {
            let resolved = operator_registry().and_then(|r| r.lookup(self, n));
            self.node_mut(n).schema = match &resolved {
                Some(schema) => SchemaCache::Resolved(schema.clone()),
                None => SchemaCache::Missing,
            };
        }
        match &self.node(n).schema {
            SchemaCache::Resolved(schema) => Some(schema.clone()),
            _ => None,
        }
    }

    /// Whether the operator is known to produce different results across
    /// runs. Dropout-style randomness; consulted by passes that must not
    /// merge or reorder such calls.
    pub fn is_nondeterministic(&self, n: NodeId) -> bool {
        const NONDETERMINISTIC_OPS: &[&str] = &[
            "aten::dropout",
            "aten::bernoulli",
            "aten::multinomial",
            "aten::normal",
            "aten::poisson",
            "aten::rand",
            "aten::rand_like",
            "aten::randint",
            "aten::randint_like",
            "aten::randn",
            "aten::randn_like",
            "aten::randperm",
        ];
        match self.kind(n) {
            NodeKind::Op(name) => NONDETERMINISTIC_OPS.contains(&&**name),
            _ => false,
        }
    }
}
