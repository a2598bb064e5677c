//! Structural unification and type-variable matching.

use std::collections::HashMap;
use std::sync::Arc;

use snafu::OptionExt;

use crate::error::{
    ContainerMismatchSnafu, OptionalFromNoneSnafu, TupleArityMismatchSnafu, UnboundVariableSnafu,
    VariableReboundSnafu,
};
use crate::{Result, Type, TypeRef};

/// Substitution environment built up by [`match_type_variables`].
pub type TypeEnv = HashMap<String, TypeRef>;

/// Compute the least common supertype of two types, if one exists.
///
/// Lists unify element-wise, tuples unify when arities match, and `None`
/// unified with a concrete `T` yields `Optional[T]`. Distinct tensor
/// subtypes fold into the dynamic tensor kind.
pub fn unify_types(t1: &TypeRef, t2: &TypeRef) -> Option<TypeRef> {
    // Cases where one side already refines the other.
    if t1.is_subtype_of(t2) {
        return Some(t2.clone());
    }
    if t2.is_subtype_of(t1) {
        return Some(t1.clone());
    }

    if t1.is_tensor() && t2.is_tensor() {
        return Some(Type::dynamic());
    }

    // None beside a concrete type widens to an optional.
    if matches!(**t1, Type::NoneType) && !matches!(**t2, Type::NoneType) {
        return Some(Type::optional(t2.clone()));
    }
    if matches!(**t2, Type::NoneType) && !matches!(**t1, Type::NoneType) {
        return Some(Type::optional(t1.clone()));
    }

    match (&**t1, &**t2) {
        (Type::List(e1), Type::List(e2)) => unify_types(e1, e2).map(Type::list),
        (Type::Tuple(e1), Type::Tuple(e2)) if e1.len() == e2.len() => {
            let unified: Option<Vec<_>> = e1.iter().zip(e2).map(|(a, b)| unify_types(a, b)).collect();
            unified.map(Type::tuple)
        }
        _ => None,
    }
}

/// Match a formal type carrying free variables against an actual type,
/// extending `env` with the resulting bindings.
///
/// Returns the formal type with variables resolved as far as the match got.
pub fn match_type_variables(formal: &TypeRef, actual: &TypeRef, env: &mut TypeEnv) -> Result<TypeRef> {
    if !formal.has_free_variables() {
        return Ok(formal.clone());
    }

    match &**formal {
        Type::Var(name) => match env.get(name.as_ref()) {
            None => {
                env.insert(name.to_string(), actual.clone());
                Ok(actual.clone())
            }
            Some(bound) => {
                if let Some(unified) = unify_types(bound, actual) {
                    env.insert(name.to_string(), unified.clone());
                    Ok(unified)
                } else {
                    VariableReboundSnafu { name: name.to_string(), previous: bound.clone(), actual: actual.clone() }
                        .fail()
                }
            }
        },
        Type::List(formal_elem) => match &**actual {
            Type::List(actual_elem) => {
                let elem = match_type_variables(formal_elem, actual_elem, env)?;
                Ok(Type::list(elem))
            }
            _ => ContainerMismatchSnafu { expected: "list", actual: actual.clone() }.fail(),
        },
        Type::Tuple(formal_elems) => match &**actual {
            Type::Tuple(actual_elems) => {
                snafu::ensure!(
                    formal_elems.len() == actual_elems.len(),
                    TupleArityMismatchSnafu { formal: formal_elems.len(), actual: actual_elems.len() }
                );
                let elems = formal_elems
                    .iter()
                    .zip(actual_elems)
                    .map(|(f, a)| match_type_variables(f, a, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Type::tuple(elems))
            }
            _ => ContainerMismatchSnafu { expected: "tuple", actual: actual.clone() }.fail(),
        },
        Type::Future(formal_elem) => match &**actual {
            Type::Future(actual_elem) => {
                let elem = match_type_variables(formal_elem, actual_elem, env)?;
                Ok(Type::future(elem))
            }
            _ => ContainerMismatchSnafu { expected: "future", actual: actual.clone() }.fail(),
        },
        Type::Optional(formal_elem) => match &**actual {
            Type::Optional(actual_elem) => {
                let elem = match_type_variables(formal_elem, actual_elem, env)?;
                Ok(Type::optional(elem))
            }
            // A non-optional actual may match the element type directly. None
            // is excluded: there is no way to determine T from it.
            Type::NoneType => OptionalFromNoneSnafu.fail(),
            _ => match_type_variables(formal_elem, actual, env),
        },
        other => ContainerMismatchSnafu { expected: "free variable container", actual: Arc::new(other.clone()) }.fail(),
    }
}

/// Substitute bound variables, turning a formal type into a concrete one.
pub fn eval_type_variables(ty: &TypeRef, env: &TypeEnv) -> Result<TypeRef> {
    if !ty.has_free_variables() {
        return Ok(ty.clone());
    }

    if let Type::Var(name) = &**ty {
        return env.get(name.as_ref()).cloned().context(UnboundVariableSnafu { name: name.to_string() });
    }

    let contained = ty
        .contained_types()
        .iter()
        .map(|t| eval_type_variables(t, env))
        .collect::<Result<Vec<_>>>()?;
    Ok(ty.with_contained(contained))
}
