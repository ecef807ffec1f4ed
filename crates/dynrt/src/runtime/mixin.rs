//! Mixin application.
//!
//! `compose_mixin(base, [M1, M2])` synthesizes the class `Base&M1&M2`: it
//! extends `base`, records the mixins in its heritage, owns a flattened copy
//! of the mixins' instance members and a single initializer that runs the
//! mixin initializers before the base one. Compositions are memoized, so
//! applying the same mixins to the same base twice yields one class.

use crate::runtime::class::{Class, ClassBuilder, Initializer};
use crate::runtime::signature::Signatures;
use crate::runtime::value::Value;
use fxhash::FxHashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

type Compositions = RwLock<FxHashMap<(Class, Vec<Class>), Class>>;

fn compositions() -> &'static Compositions {
    static COMPOSITIONS: OnceLock<Compositions> = OnceLock::new();
    COMPOSITIONS.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// Applies `mixins`, in order, to `base`.
///
/// Constructing the result with arguments `args` runs each mixin's own
/// initializer with no arguments, last mixin first, then the base
/// initializer with `args`. When two mixins declare a member of the same
/// name the later one wins. The method signatures are the union of the
/// mixins' own signatures.
pub fn compose_mixin(base: &Class, mixins: &[Class]) -> Class {
    let key = (*base, mixins.to_vec());
    if let Some(class) = compositions()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return *class;
    }

    let mut table = compositions()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(class) = table.get(&key) {
        return *class;
    }

    let class = synthesize(base, mixins);
    table.insert(key, class);
    class
}

fn synthesize(base: &Class, mixins: &[Class]) -> Class {
    let mut name = base.name().as_str().to_string();
    for mixin in mixins {
        name.push('&');
        name.push_str(mixin.name().as_str());
    }

    let mut builder = ClassBuilder::new(&name).extends(base);
    for mixin in mixins {
        builder = builder.mixin_type(mixin.this_type());
        for (member_name, member) in mixin.own_members() {
            builder = builder.member(member_name, member);
        }
    }

    let initializers: Vec<Initializer> = mixins
        .iter()
        .rev()
        .filter_map(|mixin| mixin.own_initializer().cloned())
        .collect();
    let base_class = *base;
    let class = builder
        .initializer_arc(Arc::new(move |this: &Value, args: &[Value]| {
            for init in &initializers {
                init(this, &[])?;
            }
            base_class.run_initializer(this, args)
        }))
        .register();

    let sources = mixins.to_vec();
    class.define_signatures(Signatures::new().methods(move || {
        sources
            .iter()
            .flat_map(|mixin| mixin.own_method_signatures())
            .map(|(name, ty)| (name.as_str(), ty))
            .collect()
    }));

    dynrt_log::debug!("composed mixin class {name}");
    class
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::core;
    use crate::runtime::name::Name;
    use crate::runtime::subtype::is_subtype;
    use crate::runtime::types::{FunctionType, TypeRef};

    #[test]
    fn test_memoized_and_named() {
        let base = ClassBuilder::new("MixinTestBase").register();
        let m = ClassBuilder::new("MixinTestM").register();

        let a = compose_mixin(&base, &[m]);
        let b = compose_mixin(&base, &[m]);

        assert_eq!(a, b);
        assert_eq!(a.name().as_str(), "MixinTestBase&MixinTestM");
        assert_eq!(a.super_class(), Some(base));
    }

    #[test]
    fn test_heritage() {
        let base = ClassBuilder::new("MixinTestHeritageBase").register();
        let m1 = ClassBuilder::new("MixinTestHeritageM1").register();
        let m2 = ClassBuilder::new("MixinTestHeritageM2").register();
        let composed = compose_mixin(&base, &[m1, m2]).this_type();

        assert!(is_subtype(composed, base.this_type()));
        assert!(is_subtype(composed, m1.this_type()));
        assert!(is_subtype(composed, m2.this_type()));
        assert!(!is_subtype(m1.this_type(), composed));
    }

    #[test]
    fn test_later_mixin_wins_and_signatures_merge() {
        let int = core().int.this_type();
        let base = ClassBuilder::new("MixinTestMergeBase").register();
        let m1 = ClassBuilder::new("MixinTestMergeM1")
            .method("who", |_, _| Ok(Value::Int(1)))
            .method("first", |_, _| Ok(Value::Int(10)))
            .register();
        m1.define_signatures(Signatures::new().methods(move || {
            vec![("first", FunctionType::new(int, []).intern())]
        }));
        let m2 = ClassBuilder::new("MixinTestMergeM2")
            .method("who", |_, _| Ok(Value::Int(2)))
            .register();
        m2.define_signatures(Signatures::new().methods(|| {
            vec![("who", FunctionType::new(TypeRef::dynamic(), []).intern())]
        }));

        let composed = compose_mixin(&base, &[m1, m2]);
        let this = composed.allocate();
        match composed.lookup_member(Name::intern("who")) {
            Some(crate::runtime::class::Member::Method(m)) => {
                assert_eq!(m(&this, &[]).unwrap(), Value::Int(2));
            }
            other => panic!("unexpected member {other:?}"),
        }
        assert!(composed.method_signature(Name::intern("first")).is_some());
        assert!(composed.method_signature(Name::intern("who")).is_some());
    }
}
