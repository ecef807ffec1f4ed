//! The subtyping engine.
//!
//! `is_subtype(a, b)` is decided by, in order: identity, the top and bottom
//! shortcuts, typedef resolution, class subtyping along super types, mixins
//! and interfaces, and function subtyping. Every answer is stored in a
//! process-wide memo keyed by the two node addresses. The type graph never
//! changes once a node exists, so entries are never invalidated.

use crate::runtime::types::{FunctionType, TypeKind, TypeRef};
use fxhash::FxHashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

fn memo() -> &'static RwLock<FxHashMap<(usize, usize), bool>> {
    static MEMO: OnceLock<RwLock<FxHashMap<(usize, usize), bool>>> = OnceLock::new();
    MEMO.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// Whether `a` is a subtype of `b`.
pub fn is_subtype(a: TypeRef, b: TypeRef) -> bool {
    if a == b {
        return true;
    }

    let key = (a.addr(), b.addr());
    if let Some(known) = memo()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return *known;
    }

    // The lock is not held while deciding; nested checks take it themselves.
    let result = decide(a, b);
    dynrt_log::trace!("is_subtype({a}, {b}) = {result}");

    memo()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, result);
    result
}

/// Number of memoized pairs.
pub fn subtype_memo_len() -> usize {
    memo().read().unwrap_or_else(PoisonError::into_inner).len()
}

fn decide(a: TypeRef, b: TypeRef) -> bool {
    if b.is_top() || a.is_bottom() {
        return true;
    }
    if a.is_top() || b.is_bottom() {
        return false;
    }

    if matches!(a.kind(), TypeKind::Typedef(_)) || matches!(b.kind(), TypeKind::Typedef(_)) {
        return is_subtype(a.resolve_typedef(), b.resolve_typedef());
    }

    if is_class_subtype(a, b) {
        return true;
    }

    match (a.as_function(), b.as_function()) {
        (Some(_), None) => b.is_function_marker(),
        (Some(actual), Some(target)) => is_function_subtype(actual, target),
        _ => false,
    }
}

fn is_class_subtype(a: TypeRef, b: TypeRef) -> bool {
    let (Some(actual), Some(target)) = (a.class_type(), b.class_type()) else {
        return false;
    };

    if actual.class() == target.class() {
        let (actual_args, target_args) = (actual.args(), target.args());
        // A raw type on either side matches any instantiation.
        if actual_args.is_empty() || target_args.is_empty() {
            return true;
        }
        if actual_args.len() != target_args.len() {
            return false;
        }
        return actual_args
            .iter()
            .zip(target_args)
            .all(|(x, y)| is_subtype(*x, *y));
    }

    let heritage = actual.heritage();
    heritage.super_type.is_some_and(|sup| is_subtype(sup, b))
        || heritage.mixins.iter().any(|m| is_subtype(*m, b))
        || heritage.interfaces.iter().any(|i| is_subtype(*i, b))
}

/// Parameters are contravariant and the return type is covariant, except
/// that a `void` target return accepts any actual return.
fn is_function_subtype(actual: &FunctionType, target: &FunctionType) -> bool {
    if !target.ret.is_void() && !is_subtype(actual.ret, target.ret) {
        return false;
    }

    if actual.required.len() > target.required.len() {
        return false;
    }

    let actual_positional: Vec<TypeRef> = actual
        .required
        .iter()
        .chain(&actual.optional)
        .copied()
        .collect();
    let target_positional = target.required.iter().chain(&target.optional);

    if actual_positional.len() < target.required.len() + target.optional.len() {
        return false;
    }

    let positional_ok = target_positional
        .zip(&actual_positional)
        .all(|(t, a)| is_subtype(*t, *a));
    if !positional_ok {
        return false;
    }

    target.named.iter().all(|(name, target_ty)| {
        actual
            .named_type(*name)
            .is_some_and(|actual_ty| is_subtype(*target_ty, actual_ty))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::ClassBuilder;
    use crate::runtime::core;
    use crate::runtime::generic::{instantiate, raw_type};

    #[test]
    fn test_reflexive_and_top_bottom() {
        let int = core().int.this_type();

        assert!(is_subtype(int, int));
        assert!(is_subtype(int, TypeRef::dynamic()));
        assert!(is_subtype(int, core().object.this_type()));
        assert!(is_subtype(TypeRef::bottom(), int));
        assert!(is_subtype(core().null.this_type(), int));
        assert!(!is_subtype(TypeRef::dynamic(), TypeRef::bottom()));
        assert!(!is_subtype(core().object.this_type(), int));
    }

    #[test]
    fn test_nominal_hierarchy() {
        assert!(is_subtype(core().int.this_type(), core().num.this_type()));
        assert!(!is_subtype(core().num.this_type(), core().int.this_type()));
        assert!(!is_subtype(core().int.this_type(), core().double.this_type()));
    }

    #[test]
    fn test_generic_arguments_by_position() {
        let int = core().int.this_type();
        let num = core().num.this_type();
        let list_int = instantiate(&core().list, &[int]);
        let list_num = instantiate(&core().list, &[num]);
        let iterable_num = instantiate(&core().iterable, &[num]);
        let iterable_int = instantiate(&core().iterable, &[int]);

        assert!(is_subtype(list_int, list_num));
        assert!(!is_subtype(list_num, list_int));
        assert!(is_subtype(list_int, iterable_num));
        assert!(!is_subtype(list_num, iterable_int));
        assert!(is_subtype(raw_type(&core().list), list_int));
        assert!(is_subtype(list_int, raw_type(&core().iterable)));
    }

    #[test]
    fn test_interfaces_and_mixins() {
        let walker = ClassBuilder::new("SubtypeTestWalker").register();
        let swimmer = ClassBuilder::new("SubtypeTestSwimmer").register();
        let duck = ClassBuilder::new("SubtypeTestDuck")
            .implements_class(&walker)
            .mixin_type(swimmer.this_type())
            .register();

        assert!(is_subtype(duck.this_type(), walker.this_type()));
        assert!(is_subtype(duck.this_type(), swimmer.this_type()));
        assert!(!is_subtype(walker.this_type(), duck.this_type()));
    }

    #[test]
    fn test_function_variance() {
        let int = core().int.this_type();
        let num = core().num.this_type();

        let takes_num = FunctionType::new(TypeRef::void(), [num]).intern();
        let takes_int = FunctionType::new(TypeRef::void(), [int]).intern();
        assert!(is_subtype(takes_num, takes_int));
        assert!(!is_subtype(takes_int, takes_num));

        let returns_int = FunctionType::new(int, []).intern();
        let returns_num = FunctionType::new(num, []).intern();
        let returns_void = FunctionType::new(TypeRef::void(), []).intern();
        assert!(is_subtype(returns_int, returns_num));
        assert!(!is_subtype(returns_num, returns_int));
        assert!(is_subtype(returns_int, returns_void));
    }

    #[test]
    fn test_function_optional_positionals() {
        let int = core().int.this_type();
        let two_required = FunctionType::new(TypeRef::void(), [int, int]).intern();
        let one_optional = FunctionType::new(TypeRef::void(), [int])
            .optional([int])
            .intern();

        assert!(is_subtype(one_optional, two_required));
        assert!(!is_subtype(two_required, one_optional));
    }

    #[test]
    fn test_function_named() {
        let int = core().int.this_type();
        let string = core().string.this_type();
        let target = FunctionType::new(TypeRef::void(), [])
            .named("width", int)
            .intern();
        let wider = FunctionType::new(TypeRef::void(), [])
            .named("width", int)
            .named("label", string)
            .intern();
        let wrong = FunctionType::new(TypeRef::void(), [])
            .named("width", string)
            .intern();

        assert!(is_subtype(wider, target));
        assert!(!is_subtype(target, wider));
        assert!(!is_subtype(wrong, target));
    }

    #[test]
    fn test_function_marker_and_typedef() {
        let int = core().int.this_type();
        let sig = FunctionType::new(int, [int]).intern();
        let alias = TypeRef::typedef("SubtypeTestUnary", move || FunctionType::new(int, [int]));

        assert!(is_subtype(sig, core().function.this_type()));
        assert!(is_subtype(sig, alias));
        assert!(is_subtype(alias, sig));
        assert!(!is_subtype(core().function.this_type(), sig));
        assert!(!is_subtype(int, sig));
    }

    #[test]
    fn test_memoized() {
        let a = ClassBuilder::new("SubtypeTestMemoA").register();
        let b = ClassBuilder::new("SubtypeTestMemoB").register();

        assert!(!is_subtype(a.this_type(), b.this_type()));
        let len = subtype_memo_len();
        assert!(!is_subtype(a.this_type(), b.this_type()));
        assert!(subtype_memo_len() >= len);
        assert_eq!(
            memo()
                .read()
                .unwrap()
                .get(&(a.this_type().addr(), b.this_type().addr())),
            Some(&false)
        );
    }
}
