use snafu::Snafu;

use crate::TypeRef;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Two types have no common supertype.
    #[snafu(display("type mismatch: cannot unify {lhs} and {rhs}"))]
    TypeMismatch { lhs: TypeRef, rhs: TypeRef },

    /// A type variable matched two incompatible types.
    #[snafu(display("type variable '{name}' previously matched to type {previous} is matched to type {actual}"))]
    VariableRebound { name: String, previous: TypeRef, actual: TypeRef },

    /// A structured formal (list/tuple/future) was matched against a different shape.
    #[snafu(display("cannot match a {expected} to {actual}"))]
    ContainerMismatch { expected: &'static str, actual: TypeRef },

    /// Tuple formals only match tuples of the same arity.
    #[snafu(display("cannot match tuples of mismatched size: {formal} vs {actual}"))]
    TupleArityMismatch { formal: usize, actual: usize },

    /// `Optional[T]` cannot be matched against a bare `None`.
    #[snafu(display("cannot match an Optional[T] to None, because there is no way to determine T from None"))]
    OptionalFromNone,

    /// Substitution reached a variable with no binding in the environment.
    #[snafu(display("unbound type variable '{name}' in substitution"))]
    UnboundVariable { name: String },
}
