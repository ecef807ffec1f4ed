//! Generic instantiation cache.
//!
//! Each generic class owns a trie with one level per type argument. Walking
//! the trie with the argument addresses either finds the node created for that
//! argument sequence or creates it, so equal sequences always yield the same
//! [`TypeRef`]. The subtype memo keys on that identity.

use crate::error::{InternalError, fatal};
use crate::runtime::class::Class;
use crate::runtime::types::TypeRef;
use fxhash::FxHashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
struct TrieNode {
    children: FxHashMap<TypeRef, TrieNode>,
    leaf: Option<TypeRef>,
}

impl TrieNode {
    fn find(&self, args: &[TypeRef]) -> Option<TypeRef> {
        match args.split_first() {
            None => self.leaf,
            Some((head, rest)) => self.children.get(head)?.find(rest),
        }
    }

    fn slot(&mut self, args: &[TypeRef]) -> &mut Option<TypeRef> {
        match args.split_first() {
            None => &mut self.leaf,
            Some((head, rest)) => self.children.entry(*head).or_default().slot(rest),
        }
    }
}

/// Per-class instantiation trie.
#[derive(Default)]
pub(crate) struct InstanceTrie {
    root: RwLock<TrieNode>,
}

impl InstanceTrie {
    fn get_or_create(&self, class: Class, args: &[TypeRef]) -> TypeRef {
        if let Some(ty) = self
            .root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .find(args)
        {
            return ty;
        }

        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        *root.slot(args).get_or_insert_with(|| {
            let ty = TypeRef::class_node(class, args.to_vec());
            dynrt_log::trace!("instantiated {ty}");
            ty
        })
    }

    #[cfg(test)]
    fn leaf_count(&self) -> usize {
        fn count(node: &TrieNode) -> usize {
            usize::from(node.leaf.is_some()) + node.children.values().map(count).sum::<usize>()
        }
        count(&self.root.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Instantiates `class` with `args`.
///
/// An empty `args` defaults every type parameter to `dynamic`, so it yields
/// the same node as spelling the `dynamic` arguments out.
///
/// # Panics
///
/// A non-empty argument list whose length differs from the class's type
/// parameter count is an internal consistency error.
pub fn instantiate(class: &Class, args: &[TypeRef]) -> TypeRef {
    let arity = class.arity();

    if arity == 0 {
        if !args.is_empty() {
            fatal(InternalError::GenericArity {
                class: class.name(),
                expected: 0,
                got: args.len(),
            });
        }
        return class.this_type();
    }

    if args.is_empty() {
        let defaults = vec![TypeRef::dynamic(); arity];
        return class.inner().instances.get_or_create(*class, &defaults);
    }

    if args.len() != arity {
        fatal(InternalError::GenericArity {
            class: class.name(),
            expected: arity,
            got: args.len(),
        });
    }

    class.inner().instances.get_or_create(*class, args)
}

/// The uninstantiated class as a type, e.g. `List` as opposed to
/// `List<dynamic>`. It is a subtype and a supertype of every instantiation of
/// the class.
pub fn raw_type(class: &Class) -> TypeRef {
    if !class.is_generic() {
        return class.this_type();
    }
    *class
        .inner()
        .raw
        .get_or_init(|| TypeRef::class_node(*class, Vec::new()))
}

/// The class a nominal or generic type refers to.
pub fn raw_class_of(ty: TypeRef) -> Option<Class> {
    ty.class_type().map(|ct| ct.class())
}

/// The type arguments of a generic instantiation; empty for everything else.
pub fn type_args_of(ty: TypeRef) -> &'static [TypeRef] {
    match ty.class_type() {
        Some(ct) => ct.args(),
        None => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::ClassBuilder;
    use crate::runtime::core;

    #[test]
    fn test_identity() {
        let pair = ClassBuilder::new("GenericTestPair").type_params(2).register();
        let int = core().int.this_type();
        let string = core().string.this_type();

        let a = instantiate(&pair, &[int, string]);
        let b = instantiate(&pair, &[int, string]);
        let c = instantiate(&pair, &[string, int]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(type_args_of(a), &[int, string]);
        assert_eq!(raw_class_of(a), Some(pair));
    }

    #[test]
    fn test_shared_prefix() {
        let triple = ClassBuilder::new("GenericTestTriple").type_params(3).register();
        let int = core().int.this_type();
        let string = core().string.this_type();

        instantiate(&triple, &[int, int, int]);
        instantiate(&triple, &[int, int, string]);
        instantiate(&triple, &[int, int, int]);

        assert_eq!(triple.inner().instances.leaf_count(), 2);
    }

    #[test]
    fn test_empty_args_default_to_dynamic() {
        let boxed = ClassBuilder::new("GenericTestBox").type_params(1).register();

        let implicit = instantiate(&boxed, &[]);
        let explicit = instantiate(&boxed, &[TypeRef::dynamic()]);

        assert_eq!(implicit, explicit);
        assert_eq!(boxed.this_type(), explicit);
        assert_eq!(implicit.to_string(), "GenericTestBox<dynamic>");
    }

    #[test]
    fn test_raw_type() {
        let boxed = ClassBuilder::new("GenericTestRaw").type_params(1).register();

        let raw = raw_type(&boxed);
        assert_eq!(raw, raw_type(&boxed));
        assert_ne!(raw, boxed.this_type());
        assert!(type_args_of(raw).is_empty());
        assert_eq!(raw.to_string(), "GenericTestRaw");
    }

    #[test]
    fn test_non_generic_instantiation() {
        let plain = ClassBuilder::new("GenericTestPlain").register();
        assert_eq!(instantiate(&plain, &[]), plain.this_type());
        assert_eq!(raw_type(&plain), plain.this_type());
        assert!(type_args_of(plain.this_type()).is_empty());
        assert_eq!(raw_class_of(TypeRef::dynamic()), None);
    }

    #[test]
    #[should_panic(expected = "takes 2 type argument(s)")]
    fn test_wrong_arity_is_fatal() {
        let pair = ClassBuilder::new("GenericTestArity").type_params(2).register();
        instantiate(&pair, &[TypeRef::dynamic()]);
    }
}
