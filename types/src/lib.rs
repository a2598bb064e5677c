//! The closed type variant consumed by the skein IR.
//!
//! Every IR value carries a [`TypeRef`]; operator schemas describe formal
//! types that may contain named variables. This crate provides the three
//! operations the IR and the schema matcher need:
//!
//! - subtype checks ([`Type::is_subtype_of`])
//! - structural unification ([`unify_types`])
//! - type-variable matching and substitution ([`match_type_variables`],
//!   [`eval_type_variables`])

use std::fmt;
use std::sync::Arc;

pub mod error;
mod unify;

pub use error::{Error, Result};
pub use unify::{TypeEnv, eval_type_variables, match_type_variables, unify_types};

#[cfg(test)]
mod test;

/// Shared, immutable handle to a type.
pub type TypeRef = Arc<Type>;

/// Scalar element kind of a complete tensor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Float,
    Double,
    Half,
    Int,
    Long,
    Bool,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Float => "Float",
            ScalarKind::Double => "Double",
            ScalarKind::Half => "Half",
            ScalarKind::Int => "Int",
            ScalarKind::Long => "Long",
            ScalarKind::Bool => "Bool",
        }
    }
}

/// Shape- and stride-complete tensor type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompleteTensor {
    pub scalar: ScalarKind,
    pub sizes: Vec<i64>,
    pub strides: Vec<i64>,
    /// Device ordinal the tensor lives on.
    pub device: i64,
}

impl CompleteTensor {
    /// Contiguous tensor on the given device.
    pub fn contiguous(scalar: ScalarKind, sizes: Vec<i64>, device: i64) -> Self {
        let mut strides = vec![1i64; sizes.len()];
        for i in (0..sizes.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * sizes[i + 1];
        }
        Self { scalar, sizes, strides, device }
    }
}

/// The closed variant of value types.
///
/// `DynamicTensor` is the top of the tensor lattice: complete and undefined
/// tensors are subtypes of it. `Var` is a placeholder used only inside
/// operator schemas for matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    DynamicTensor,
    Tensor(CompleteTensor),
    UndefinedTensor,
    Number,
    Int,
    Float,
    Bool,
    NoneType,
    Str,
    Generator,
    Tuple(Vec<TypeRef>),
    List(TypeRef),
    Optional(TypeRef),
    Future(TypeRef),
    Var(Box<str>),
}

impl Type {
    pub fn dynamic() -> TypeRef {
        Arc::new(Type::DynamicTensor)
    }

    pub fn int() -> TypeRef {
        Arc::new(Type::Int)
    }

    pub fn float() -> TypeRef {
        Arc::new(Type::Float)
    }

    pub fn bool_() -> TypeRef {
        Arc::new(Type::Bool)
    }

    pub fn none() -> TypeRef {
        Arc::new(Type::NoneType)
    }

    pub fn tuple(elements: Vec<TypeRef>) -> TypeRef {
        Arc::new(Type::Tuple(elements))
    }

    pub fn list(element: TypeRef) -> TypeRef {
        Arc::new(Type::List(element))
    }

    pub fn optional(element: TypeRef) -> TypeRef {
        Arc::new(Type::Optional(element))
    }

    pub fn future(element: TypeRef) -> TypeRef {
        Arc::new(Type::Future(element))
    }

    pub fn var(name: impl Into<Box<str>>) -> TypeRef {
        Arc::new(Type::Var(name.into()))
    }

    /// Any tensor kind, complete or not.
    pub fn is_tensor(&self) -> bool {
        matches!(self, Type::DynamicTensor | Type::Tensor(_) | Type::UndefinedTensor)
    }

    /// Reflexive, structural subtype check.
    pub fn is_subtype_of(&self, sup: &Type) -> bool {
        if self == sup {
            return true;
        }
        match (self, sup) {
            (t, Type::DynamicTensor) if t.is_tensor() => true,
            (Type::Int | Type::Float, Type::Number) => true,
            (Type::NoneType, Type::Optional(_)) => true,
            (t, Type::Optional(elem)) => t.is_subtype_of(elem),
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_subtype_of(y))
            }
            _ => false,
        }
    }

    /// Immediate contained types, in declaration order.
    pub fn contained_types(&self) -> Vec<TypeRef> {
        match self {
            Type::Tuple(elems) => elems.clone(),
            Type::List(e) | Type::Optional(e) | Type::Future(e) => vec![e.clone()],
            _ => Vec::new(),
        }
    }

    /// Rebuild this type around new contained types.
    ///
    /// The replacement list should have the same length as
    /// [`Type::contained_types`] returns; missing elements keep the original.
    pub fn with_contained(&self, contained: Vec<TypeRef>) -> TypeRef {
        let mut contained = contained.into_iter();
        match self {
            Type::Tuple(_) => Arc::new(Type::Tuple(contained.collect())),
            Type::List(e) => Arc::new(Type::List(contained.next().unwrap_or_else(|| e.clone()))),
            Type::Optional(e) => Arc::new(Type::Optional(contained.next().unwrap_or_else(|| e.clone()))),
            Type::Future(e) => Arc::new(Type::Future(contained.next().unwrap_or_else(|| e.clone()))),
            other => Arc::new(other.clone()),
        }
    }

    /// True if the type contains a `Var` anywhere.
    pub fn has_free_variables(&self) -> bool {
        match self {
            Type::Var(_) => true,
            other => other.contained_types().iter().any(|t| t.has_free_variables()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::DynamicTensor => write!(f, "Dynamic"),
            Type::Tensor(t) => {
                write!(f, "{}(", t.scalar.name())?;
                for (i, size) in t.sizes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{size}")?;
                    let expected =
                        if i + 1 < t.sizes.len() { t.sizes[i + 1] * t.strides[i + 1] } else { 1 };
                    if t.strides[i] != expected {
                        // mark non-contiguous
                        write!(f, "!")?;
                    }
                }
                write!(f, ")")
            }
            Type::UndefinedTensor => write!(f, "Undefined"),
            Type::Number => write!(f, "Number"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::NoneType => write!(f, "None"),
            Type::Str => write!(f, "string"),
            Type::Generator => write!(f, "Generator"),
            Type::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            Type::List(e) => write!(f, "{e}[]"),
            Type::Optional(e) => write!(f, "{e}?"),
            Type::Future(e) => write!(f, "Future[{e}]"),
            Type::Var(name) => write!(f, "{name}"),
        }
    }
}
