//! Dynamic dispatch.
//!
//! Untyped call sites resolve a member name on a receiver at run time. The
//! name is first mapped to a dispatch key (see [`canonical_member`]), then
//! looked up on the receiver's class. A declared method with a signature is
//! shape-checked with [`check_apply`] before it runs; a host property is used
//! as is. Anything that does not resolve, or does not fit, fails with
//! [`Error::NoSuchMember`].

use crate::error::{Error, MemberKind, Result};
use crate::runtime::cast::check_implicit;
use crate::runtime::class::{Class, Member};
use crate::runtime::extension::{canonical_member, dispatch_class, extension_key};
use crate::runtime::function::Function;
use crate::runtime::name::Name;
use crate::runtime::types::{FunctionType, TypeRef};
use crate::runtime::value::Value;
use std::slice;

/// What a member name resolved to on a receiver.
#[derive(Debug, Clone)]
pub enum Dispatchable {
    /// A member declared on the receiver's class, with its signature when
    /// one was declared.
    Declared {
        name: Name,
        signature: Option<TypeRef>,
        member: Member,
    },
    /// A raw property of a host object.
    HostNative(Value),
}

/// Resolves `name` on `receiver`.
pub fn resolve_member(receiver: &Value, name: &str) -> Option<Dispatchable> {
    let key = canonical_member(receiver, name)?;
    resolve_key(receiver, key, name)
}

fn resolve_key(receiver: &Value, key: Name, name: &str) -> Option<Dispatchable> {
    // Unpublished names on host objects only reach native properties.
    let declared = match receiver {
        Value::Host(_) => extension_key(name) == Some(key),
        _ => true,
    };

    if declared
        && let Some(class) = dispatch_class(receiver)
        && let Some(member) = class.lookup_member(key)
    {
        let signature = match &member {
            Member::Method(_) => class.method_signature(key),
            Member::Getter(_) | Member::Setter(_) => None,
        };
        return Some(Dispatchable::Declared {
            name: key,
            signature,
            member,
        });
    }

    match receiver {
        Value::Host(host) => host.get(name).map(Dispatchable::HostNative),
        _ => None,
    }
}

/// Whether `args` fits the shape of `sig`.
///
/// Only counts and named-argument names are checked, never argument types.
/// A trailing [`Value::Named`] is the named-argument group and never counts
/// as a positional. All required positionals must be present and the rest
/// must fit the optional positionals by count. A named group is accepted
/// only when `sig` has no optional positionals, declares named parameters,
/// and declares every name in the group. An empty group is rejected.
pub fn check_apply(sig: &FunctionType, args: &[Value]) -> bool {
    let (positional, named) = match args.split_last() {
        Some((Value::Named(named), rest)) => (rest, Some(named)),
        _ => (args, None),
    };

    let required = sig.required.len();
    if positional.len() < required || positional.len() - required > sig.optional.len() {
        return false;
    }

    match named {
        None => true,
        Some(named) => {
            sig.optional.is_empty()
                && !sig.named.is_empty()
                && !named.is_empty()
                && named.names().all(|n| sig.named_type(n).is_some())
        }
    }
}

fn fits(signature: Option<TypeRef>, args: &[Value]) -> bool {
    match signature.and_then(TypeRef::as_function) {
        Some(sig) => check_apply(sig, args),
        None => true,
    }
}

/// `receiver.name(args)`.
pub fn dynamic_send(receiver: &Value, name: &str, args: &[Value]) -> Result<Value> {
    send(receiver, name, args, MemberKind::Method)
}

fn send(receiver: &Value, name: &str, args: &[Value], kind: MemberKind) -> Result<Value> {
    if matches!(receiver, Value::Function(_)) && name == "call" {
        return dynamic_call(receiver, args);
    }

    let fail = || Error::no_such_member(Name::intern(name), kind, receiver, args);
    let key = canonical_member(receiver, name).ok_or_else(fail)?;

    match resolve_key(receiver, key, name) {
        Some(Dispatchable::Declared {
            signature, member, ..
        }) => match member {
            Member::Method(method) => {
                if !fits(signature, args) {
                    dynrt_log::trace!("arguments do not fit {name} on {}", receiver.describe());
                    return Err(fail());
                }
                method(receiver, args)
            }
            Member::Getter(getter) => {
                let target = getter(receiver, &[])?;
                dynamic_call(&target, args)
            }
            Member::Setter(_) => Err(fail()),
        },
        Some(Dispatchable::HostNative(Value::Function(f))) => f.invoke(args),
        Some(Dispatchable::HostNative(_)) => Err(fail()),
        None => match receiver {
            Value::Object(obj) => match obj.field_by_name(key) {
                Some(field) => dynamic_call(&field, args),
                None => Err(fail()),
            },
            _ => Err(fail()),
        },
    }
}

/// `callee(args)`.
///
/// A function with a known type is shape-checked against it first. Objects
/// are called through their `call` member.
pub fn dynamic_call(callee: &Value, args: &[Value]) -> Result<Value> {
    match callee {
        Value::Function(f) => {
            if !fits(f.runtime_type(), args) {
                return Err(Error::no_such_member(
                    Name::intern("call"),
                    MemberKind::Call,
                    callee,
                    args,
                ));
            }
            f.invoke(args)
        }
        Value::Object(_) | Value::Host(_) => send(callee, "call", args, MemberKind::Call),
        _ => Err(Error::no_such_member(
            Name::intern("call"),
            MemberKind::Call,
            callee,
            args,
        )),
    }
}

/// `receiver.name`.
///
/// Reading a method yields a tear-off bound to `receiver` and tagged with
/// the method's signature.
pub fn dynamic_load(receiver: &Value, name: &str) -> Result<Value> {
    let fail = || Error::no_such_member(Name::intern(name), MemberKind::Getter, receiver, &[]);
    let key = canonical_member(receiver, name).ok_or_else(fail)?;

    match resolve_key(receiver, key, name) {
        Some(Dispatchable::Declared {
            signature, member, ..
        }) => match member {
            Member::Getter(getter) => getter(receiver, &[]),
            Member::Method(method) => Ok(Value::Function(Function::bound(
                receiver.clone(),
                method,
                signature,
            ))),
            Member::Setter(_) => Err(fail()),
        },
        Some(Dispatchable::HostNative(value)) => Ok(value),
        None => match receiver {
            Value::Object(obj) => obj.field_by_name(key).ok_or_else(fail),
            _ => Err(fail()),
        },
    }
}

/// `receiver.name = value`; evaluates to `value`.
///
/// A setter wins over a field. A field with a declared type only accepts
/// values of that type. Host objects accept any property.
pub fn dynamic_store(receiver: &Value, name: &str, value: Value) -> Result<Value> {
    let setter_name = format!("{name}=");
    if let Some(Dispatchable::Declared {
        member: Member::Setter(setter),
        ..
    }) = resolve_member(receiver, &setter_name)
    {
        setter(receiver, slice::from_ref(&value))?;
        return Ok(value);
    }

    match receiver {
        Value::Object(obj) => {
            let field = Name::member(name);
            if let Some(ty) = obj.class().field_type(field) {
                check_implicit(&value, ty, name)?;
            } else if !obj.has_field(field) {
                return Err(Error::no_such_member(
                    Name::intern(name),
                    MemberKind::Setter,
                    receiver,
                    slice::from_ref(&value),
                ));
            }
            obj.set_field_by_name(field, value.clone());
            Ok(value)
        }
        Value::Host(host) => {
            host.set(name, value.clone());
            Ok(value)
        }
        _ => Err(Error::no_such_member(
            Name::intern(name),
            MemberKind::Setter,
            receiver,
            slice::from_ref(&value),
        )),
    }
}

/// `receiver[index]`.
pub fn dynamic_index_get(receiver: &Value, index: Value) -> Result<Value> {
    send(receiver, "[]", &[index], MemberKind::Index)
}

/// `receiver[index] = value`; evaluates to `value`.
pub fn dynamic_index_set(receiver: &Value, index: Value, value: Value) -> Result<Value> {
    send(receiver, "[]=", &[index, value.clone()], MemberKind::Index)?;
    Ok(value)
}

/// `new Class.ctor(args)`. `new` and the empty name address the default
/// constructor, which falls back to the class initializer.
pub fn dynamic_new(class: &Class, ctor: &str, args: &[Value]) -> Result<Value> {
    let name = Name::member(if ctor.is_empty() { "new" } else { ctor });
    let fail = || Error::NoSuchMember {
        name,
        kind: MemberKind::Constructor,
        receiver: format!("class '{class}'"),
        args: args.to_vec(),
    };

    if !fits(class.constructor_signature(name), args) {
        return Err(fail());
    }

    match class.named_constructor(name) {
        Some(body) => body(&class.allocate(), args),
        None if name.as_str() == "new" => class.construct(args),
        None => Err(fail()),
    }
}

/// `Class.name(args)`.
pub fn dynamic_send_static(class: &Class, name: &str, args: &[Value]) -> Result<Value> {
    let key = Name::member(name);
    let fail = || Error::NoSuchMember {
        name: key,
        kind: MemberKind::Static,
        receiver: format!("class '{class}'"),
        args: args.to_vec(),
    };

    let method = class.static_method(key).ok_or_else(fail)?;
    if !fits(class.static_signature(key), args) {
        return Err(fail());
    }
    method(&Value::Null, args)
}
