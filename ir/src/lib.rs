//! Typed, blocked, topologically ordered graph IR for tensor programs.
//!
//! A [`Graph`] owns three slotted arenas (nodes, values, blocks) and hands out
//! copyable integer handles into them. Nodes live on doubly linked lists
//! bracketed by a param and a return sentinel per [`Block`]; each live node
//! carries a sparse topological position so relative-order queries are O(1).
//!
//! All mutation goes through `&mut Graph`, which makes the single-threaded
//! ownership discipline structural. [`Graph::lint`] re-checks every invariant
//! and is the reference statement of what "well-formed" means.

use std::fmt;

pub mod error;
mod graph;
mod lint;
mod mutate;
mod print;
pub mod schema;
mod topo;

pub use error::{Error, Result};
pub use graph::{AttrValue, Graph, NodeKind, Use};
pub use mutate::ValueMap;
pub use schema::{
    AliasAnnotation, Argument, OperatorRegistry, Schema, SchemaRegistry, operator_registry, set_operator_registry,
};
pub use topo::APPEND_INTERVAL;

#[cfg(test)]
mod test;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id! {
    /// Handle into a graph's node arena.
    NodeId
}
arena_id! {
    /// Handle into a graph's value arena.
    ValueId
}
arena_id! {
    /// Handle into a graph's block arena.
    BlockId
}
