//! The type and dispatch runtime.
//!
//! - [`types`]: type nodes and function signatures
//! - [`generic`]: the generic instantiation cache
//! - [`subtype`]: the memoized subtyping engine
//! - [`class`] and [`signature`]: runtime classes and their declared signatures
//! - [`value`]: runtime values and canonicalization
//! - [`dispatch`] and [`extension`]: dynamic member access
//! - [`cast`]: type tests, casts and implicit checks
//! - [`mixin`]: mixin application
//! - [`host`]: host constructors and objects

pub mod cast;
pub mod class;
pub mod core;
pub mod dispatch;
pub mod extension;
pub mod function;
pub mod generic;
pub mod host;
pub mod mixin;
pub mod name;
pub mod object;
pub mod signature;
pub mod subtype;
pub mod types;
pub mod value;

pub use cast::{cast, check_implicit, instance_of};
pub use class::{Class, ClassBuilder, Initializer, Member, Method};
pub use self::core::{CoreClasses, core};
pub use dispatch::{
    Dispatchable, check_apply, dynamic_call, dynamic_index_get, dynamic_index_set,
    dynamic_load, dynamic_new, dynamic_send, dynamic_send_static, dynamic_store,
    resolve_member,
};
pub use extension::{
    canonical_member, extension_key, install_extension_members, is_extension_typed,
};
pub use function::Function;
pub use generic::{instantiate, raw_class_of, raw_type, type_args_of};
pub use host::{HostConstructor, HostObject, register_nominal_type};
pub use mixin::compose_mixin;
pub use name::Name;
pub use object::Object;
pub use signature::Signatures;
pub use subtype::{is_subtype, subtype_memo_len};
pub use types::{FunctionType, Heritage, TypeKind, TypeRef};
pub use value::{Array, NamedArgs, Value, canonicalize};
