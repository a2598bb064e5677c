//! Flow-sensitive alias analysis over a skein graph, plus the movement
//! primitive that consults it.
//!
//! [`AliasDb::build`] is a pure function over an immutable graph snapshot: a
//! single bottom-up pass (iterated to fixpoint for loops) that assigns each
//! annotatable value a set of alias symbols and records which nodes may write
//! to each set. The resulting database is plain data and may be queried
//! concurrently for reads.
//!
//! [`AliasDb::try_move`] relocates a node while preserving both value
//! dependencies and the mutation orderings the database knows about.

pub mod error;

mod db;
mod info;
mod movement;

pub use db::AliasDb;
pub use error::{Error, Result};
pub use info::{AliasInfo, AliasSymbol};
pub use movement::MoveSide;

#[cfg(test)]
mod test;
