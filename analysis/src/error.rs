use snafu::Snafu;

use skein_ir::NodeId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A node with mutable outputs has no schema and no dedicated analyzer.
    #[snafu(display(
        "alias information not found for node {node} ({kind}){}",
        source_location.as_deref().map(|l| format!(" at {l}")).unwrap_or_default()
    ))]
    UnknownOperator { node: NodeId, kind: String, source_location: Option<String> },

    /// A schema return refers to an alias symbol no argument bound.
    #[snafu(display("unbound formal alias symbol '{symbol}' in returns of '{schema}'"))]
    UnboundFormalAlias { symbol: String, schema: String },

    /// Alias mapping across a block boundary with mismatched arity.
    #[snafu(display("cannot map aliases across a boundary of {to} values from {from}"))]
    AliasMapArity { to: usize, from: usize },

    /// Schema return arity disagrees with the node's outputs.
    #[snafu(display("schema '{schema}' declares {declared} returns but node {node} has {actual} outputs"))]
    ReturnArityMismatch { schema: String, node: NodeId, declared: usize, actual: usize },

    /// Movement requires both nodes to be live in the same block.
    #[snafu(display("cannot move node {node} relative to {move_point}: not in the same block"))]
    NotInSameBlock { node: NodeId, move_point: NodeId },

    /// Underlying graph mutation failed.
    #[snafu(display("graph mutation failed during move: {source}"))]
    Move { source: skein_ir::Error },
}
