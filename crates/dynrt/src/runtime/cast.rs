//! Type tests and casts.
//!
//! `null` passes every cast and implicit check but is an instance only of the
//! top types and `Null`. A failed cast between two members of the same
//! container family (`Iterable`, `Future`, `Stream`), where the actual type's
//! arguments are all `dynamic`, is downgraded to a warning while the
//! [`BenignCastPolicy`] allows it.

use crate::config::{BenignCastPolicy, config};
use crate::error::{Error, Result};
use crate::runtime::core::core;
use crate::runtime::generic::{raw_class_of, raw_type, type_args_of};
use crate::runtime::subtype::is_subtype;
use crate::runtime::types::TypeRef;
use crate::runtime::value::{Value, canonicalize};

/// `value is ty`.
pub fn instance_of(value: &Value, ty: TypeRef) -> bool {
    if value.is_null() {
        return ty.is_top() || raw_class_of(ty).is_some_and(|class| class == core().null);
    }
    is_subtype(canonicalize(value), ty)
}

/// `value as ty`.
pub fn cast(value: &Value, ty: TypeRef) -> Result<Value> {
    if value.is_null() || instance_of(value, ty) {
        return Ok(value.clone());
    }

    let actual = canonicalize(value);
    if is_benign(actual, ty, config().benign_casts) {
        dynrt_log::warn!("ignoring cast failure from {actual} to {ty}");
        return Ok(value.clone());
    }
    Err(Error::CastFailure {
        actual,
        expected: ty,
    })
}

/// The implicit check applied where a dynamic value flows into a typed
/// location. `context` names the location in the error.
pub fn check_implicit(value: &Value, ty: TypeRef, context: &str) -> Result<()> {
    if value.is_null() || instance_of(value, ty) {
        return Ok(());
    }

    let actual = canonicalize(value);
    if is_benign(actual, ty, config().benign_casts) {
        dynrt_log::warn!("ignoring implicit check failure from {actual} to {ty} ({context})");
        return Ok(());
    }
    Err(Error::StrongModeViolation {
        actual,
        expected: ty,
        context: context.to_string(),
    })
}

pub(crate) fn is_benign(actual: TypeRef, expected: TypeRef, policy: BenignCastPolicy) -> bool {
    if policy == BenignCastPolicy::Off {
        return false;
    }

    let Some(family) = raw_class_of(expected) else {
        return false;
    };
    let core = core();
    if ![core.iterable, core.future, core.stream].contains(&family) {
        return false;
    }

    let args = type_args_of(actual);
    !args.is_empty()
        && args.iter().all(|arg| arg.is_dynamic())
        && is_subtype(actual, raw_type(&family))
}
