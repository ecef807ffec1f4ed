//! `dynrt`: a dynamic type-representation and dispatch runtime.
//!
//! The runtime sits behind call sites produced by a compiler for a
//! dynamically checked, nominally typed language. It provides:
//!
//! - **Type representation** with canonical, identity-compared type nodes
//! - **Generic instantiation** cached so equal instantiations are one node
//! - **Subtyping** for classes, generics and function types, memoized
//! - **Dynamic dispatch** of untyped member access, shape-checked against
//!   declared signatures, over both runtime classes and host-native values
//! - **Mixin application** with a flattened member table
//! - **Coroutine adapters** turning explicit state machines into promises
//!   and single-subscription streams
//!
//! # Example
//!
//! ```rust
//! use dynrt::{ClassBuilder, FunctionType, Signatures, Value, core, dynamic_send};
//!
//! let counter = ClassBuilder::new("DocCounter")
//!     .method("add", |_, args| {
//!         let sum = args.iter().filter_map(Value::as_int).sum::<i64>();
//!         Ok(Value::Int(sum))
//!     })
//!     .register();
//! counter.define_signatures(Signatures::new().methods(|| {
//!     let int = core().int.this_type();
//!     vec![("add", FunctionType::new(int, [int, int]).intern())]
//! }));
//!
//! let c = counter.construct(&[]).unwrap();
//! assert_eq!(dynamic_send(&c, "add", &[Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(3));
//! assert!(dynamic_send(&c, "add", &[Value::Int(1)]).is_err());
//! ```

pub mod config;
pub mod coro;
pub mod error;
pub mod runtime;

pub use config::{BenignCastPolicy, RuntimeConfig, config, configure};
pub use error::{Error, MemberKind, Result};
pub use runtime::{
    Array, Class, ClassBuilder, CoreClasses, Dispatchable, Function, FunctionType, Heritage,
    HostConstructor, HostObject, Member, Name, NamedArgs, Object, Signatures, TypeKind, TypeRef,
    Value, canonicalize, cast, check_apply, check_implicit, compose_mixin, core, dynamic_call,
    dynamic_index_get, dynamic_index_set, dynamic_load, dynamic_new, dynamic_send,
    dynamic_send_static, dynamic_store, instance_of, install_extension_members, instantiate,
    is_subtype, raw_class_of, raw_type, register_nominal_type, type_args_of,
};
