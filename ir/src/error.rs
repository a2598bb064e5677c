use snafu::Snafu;

use crate::{NodeId, ValueId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A structural invariant of the graph does not hold.
    #[snafu(display("invariant violation: {reason}"))]
    InvariantViolation { reason: String },

    /// Pure-digit unique names collide with the unnamed fallback.
    #[snafu(display("names may not be integers: {name}"))]
    IntegerName { name: String },

    /// An output with live uses cannot be erased.
    #[snafu(display("output {offset} of node {node} still has {uses} uses"))]
    OutputHasUses { node: NodeId, offset: usize, uses: usize },

    /// Insertion requires an unplaced node.
    #[snafu(display("node {node} is already placed in a block"))]
    AlreadyPlaced { node: NodeId },

    /// The operation requires the node to be live in a block list.
    #[snafu(display("node {node} is not placed in a block"))]
    NotPlaced { node: NodeId },

    /// Nothing may be inserted before the param sentinel or after the return sentinel.
    #[snafu(display("cannot insert relative to a block sentinel"))]
    SentinelInsert,

    /// `replace_all_uses_with` requires equal output arity.
    #[snafu(display("arity mismatch: expected {expected} outputs, got {actual}"))]
    ArityMismatch { expected: usize, actual: usize },

    /// A factory was handed a value of the wrong type shape.
    #[snafu(display("expected a {expected} type, got {actual}"))]
    UnexpectedType { expected: &'static str, actual: skein_types::TypeRef },

    /// Cloning encountered a use of a value the supplied map cannot translate.
    #[snafu(display("value {value} is not in scope during clone"))]
    ValueNotInScope { value: ValueId },
}
