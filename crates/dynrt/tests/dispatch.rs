//! Dynamic dispatch tests
//!
//! - Shape checks against declared signatures
//! - Getters, fields and tear-offs
//! - Stores, index operators and constructors
//! - Extension members on host-native receivers
//!
//! Run with: `cargo test --test dispatch`

mod common;

use common::{fn_type, int, num, string, unique};
use dynrt::{
    Array, Class, ClassBuilder, Dispatchable, Error, Function, FunctionType, HostConstructor,
    HostObject, MemberKind, NamedArgs, Signatures, TypeRef, Value, core, dynamic_call,
    dynamic_index_get, dynamic_index_set, dynamic_load, dynamic_new, dynamic_send,
    dynamic_send_static, dynamic_store, install_extension_members, instantiate,
    register_nominal_type, runtime::resolve_member,
};

fn sum_args(_: &Value, args: &[Value]) -> dynrt::Result<Value> {
    Ok(Value::Int(args.iter().filter_map(Value::as_int).sum()))
}

/// A class with `add(int, int)`, `scale(int, [int])`, `tag(int, {label})`
/// and an undeclared `any`.
fn calculator() -> Class {
    let class = ClassBuilder::new(&unique("Calculator"))
        .method("add", sum_args)
        .method("scale", sum_args)
        .method("tag", |_, args| Ok(Value::Int(args.len() as i64)))
        .method("any", sum_args)
        .register();
    class.define_signatures(Signatures::new().methods(|| {
        vec![
            ("add", fn_type(int(), [int(), int()])),
            (
                "scale",
                FunctionType::new(int(), [int()]).optional([int()]).intern(),
            ),
            (
                "tag",
                FunctionType::new(int(), [int()]).named("label", string()).intern(),
            ),
        ]
    }));
    class
}

// ============================================================================
// Shape checks
// ============================================================================

#[test]
fn test_missing_required_argument_is_rejected() {
    let calc = calculator().construct(&[]).unwrap();

    let err = dynamic_send(&calc, "add", &[Value::Int(1)]).unwrap_err();
    match err {
        Error::NoSuchMember {
            name, kind, args, ..
        } => {
            assert_eq!(name.as_str(), "add");
            assert_eq!(kind, MemberKind::Method);
            assert_eq!(args, vec![Value::Int(1)]);
        }
        other => panic!("expected NoSuchMember, got {other:?}"),
    }
    assert_eq!(
        dynamic_send(&calc, "add", &[Value::Int(1), Value::Int(2)]).unwrap(),
        Value::Int(3)
    );
}

#[test]
fn test_extra_argument_is_rejected() {
    let calc = calculator().construct(&[]).unwrap();
    let args = [Value::Int(1), Value::Int(2), Value::Int(3)];
    assert!(matches!(
        dynamic_send(&calc, "add", &args),
        Err(Error::NoSuchMember { .. })
    ));
}

#[test]
fn test_optional_and_named_arguments() {
    let calc = calculator().construct(&[]).unwrap();

    assert_eq!(dynamic_send(&calc, "scale", &[Value::Int(2)]).unwrap(), Value::Int(2));
    assert_eq!(
        dynamic_send(&calc, "scale", &[Value::Int(2), Value::Int(3)]).unwrap(),
        Value::Int(5)
    );

    let label = NamedArgs::new([("label", Value::str("x"))]);
    let color = NamedArgs::new([("color", Value::str("red"))]);
    assert_eq!(
        dynamic_send(&calc, "tag", &[Value::Int(1), label.into()]).unwrap(),
        Value::Int(2)
    );
    assert!(dynamic_send(&calc, "tag", &[Value::Int(1), color.into()]).is_err());
}

#[test]
fn test_named_group_does_not_fill_required_positional() {
    let calc = calculator().construct(&[]).unwrap();
    let label = NamedArgs::new([("label", Value::str("x"))]);

    let err = dynamic_send(&calc, "tag", &[label.clone().into()]).unwrap_err();
    assert!(matches!(err, Error::NoSuchMember { .. }), "{err}");
    assert!(dynamic_send(&calc, "add", &[Value::Int(1), label.into()]).is_err());

    let empty = NamedArgs::new(Vec::<(&str, Value)>::new());
    assert!(dynamic_send(&calc, "tag", &[Value::Int(1), empty.into()]).is_err());
}

#[test]
fn test_undeclared_signature_is_permissive() {
    let calc = calculator().construct(&[]).unwrap();
    assert_eq!(dynamic_send(&calc, "any", &[]).unwrap(), Value::Int(0));
    assert_eq!(
        dynamic_send(&calc, "any", &[Value::Int(4), Value::Int(5), Value::Int(6)]).unwrap(),
        Value::Int(15)
    );
}

#[test]
fn test_signatures_are_inherited() {
    let calc = calculator();
    let sub = ClassBuilder::new(&unique("SciCalculator"))
        .extends(&calc)
        .register();
    let value = sub.construct(&[]).unwrap();

    assert!(dynamic_send(&value, "add", &[Value::Int(1)]).is_err());
    assert_eq!(
        dynamic_send(&value, "add", &[Value::Int(1), Value::Int(1)]).unwrap(),
        Value::Int(2)
    );
}

#[test]
fn test_missing_member() {
    let calc = calculator().construct(&[]).unwrap();
    let err = dynamic_send(&calc, "subtract", &[]).unwrap_err();
    assert!(err.to_string().contains("subtract"), "{err}");
}

// ============================================================================
// Getters, fields and tear-offs
// ============================================================================

#[test]
fn test_getter_result_is_called() {
    let class = ClassBuilder::new(&unique("Holder"))
        .getter("twice", |_| {
            let ty = fn_type(int(), [int()]);
            Ok(Value::from(Function::typed(ty, |args| {
                Ok(Value::Int(args[0].as_int().unwrap_or_default() * 2))
            })))
        })
        .register();
    let holder = class.construct(&[]).unwrap();

    assert_eq!(
        dynamic_send(&holder, "twice", &[Value::Int(21)]).unwrap(),
        Value::Int(42)
    );
    assert!(dynamic_send(&holder, "twice", &[]).is_err());
}

#[test]
fn test_field_holding_closure_is_called() {
    let class = ClassBuilder::new(&unique("Callbacks"))
        .initializer(|this, args| {
            if let Some(obj) = this.as_object() {
                obj.set_field("onTap", args.first().cloned().unwrap_or_default());
            }
            Ok(())
        })
        .register();
    let handler = Function::new(|args| Ok(Value::Int(args.len() as i64)));
    let value = class.construct(&[handler.into()]).unwrap();

    assert_eq!(
        dynamic_send(&value, "onTap", &[Value::Null, Value::Null]).unwrap(),
        Value::Int(2)
    );
}

#[test]
fn test_tear_off_keeps_receiver_and_signature() {
    let class = ClassBuilder::new(&unique("Greeter"))
        .initializer(|this, args| {
            if let Some(obj) = this.as_object() {
                obj.set_field("name", args.first().cloned().unwrap_or_default());
            }
            Ok(())
        })
        .method("greet", |this, args| {
            let name = dynamic_load(this, "name")?;
            Ok(Value::from(format!("{}, {name}", args[0])))
        })
        .register();
    let sig = fn_type(string(), [string()]);
    class.define_signatures(Signatures::new().methods(move || vec![("greet", sig)]));

    let greeter = class.construct(&[Value::str("Ada")]).unwrap();
    let greet = dynamic_load(&greeter, "greet").unwrap();

    assert_eq!(greet.runtime_type(), sig);
    assert_eq!(
        dynamic_call(&greet, &[Value::str("Hello")]).unwrap(),
        Value::str("Hello, Ada")
    );
    assert!(dynamic_call(&greet, &[]).is_err());
}

#[test]
fn test_resolve_member_reports_declared_signature() {
    let calc = calculator().construct(&[]).unwrap();
    match resolve_member(&calc, "add") {
        Some(Dispatchable::Declared { signature, .. }) => {
            assert_eq!(signature, Some(fn_type(int(), [int(), int()])));
        }
        other => panic!("unexpected resolution {other:?}"),
    }
    assert!(resolve_member(&calc, "nothing").is_none());
}

// ============================================================================
// Stores
// ============================================================================

#[test]
fn test_setter_wins_over_field() {
    let class = ClassBuilder::new(&unique("Thermostat"))
        .setter("celsius", |this, value| {
            let c = value.as_double().unwrap_or_default();
            if let Some(obj) = this.as_object() {
                obj.set_field("kelvin", Value::Double(c + 273.0));
            }
            Ok(())
        })
        .register();
    let t = class.construct(&[]).unwrap();

    let stored = dynamic_store(&t, "celsius", Value::Double(20.0)).unwrap();
    assert_eq!(stored, Value::Double(20.0));
    assert_eq!(dynamic_load(&t, "kelvin").unwrap(), Value::Double(293.0));
}

#[test]
fn test_typed_field_store_is_checked() {
    let class = ClassBuilder::new(&unique("Counter")).register();
    class.define_signatures(Signatures::new().fields(|| vec![("count", int())]));
    let counter = class.construct(&[]).unwrap();

    dynamic_store(&counter, "count", Value::Int(3)).unwrap();
    assert_eq!(dynamic_load(&counter, "count").unwrap(), Value::Int(3));

    let err = dynamic_store(&counter, "count", Value::str("three")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "type 'String' is not a subtype of type 'int' of 'count'"
    );
}

#[test]
fn test_store_to_unknown_field_fails() {
    let class = ClassBuilder::new(&unique("Sealed")).register();
    let value = class.construct(&[]).unwrap();

    assert!(matches!(
        dynamic_store(&value, "extra", Value::Int(1)),
        Err(Error::NoSuchMember {
            kind: MemberKind::Setter,
            ..
        })
    ));
    assert!(dynamic_store(&Value::Int(1), "extra", Value::Int(1)).is_err());
}

// ============================================================================
// Index operators
// ============================================================================

#[test]
fn test_array_index_operators() {
    let items = Value::from(Array::new(int(), [Value::Int(10), Value::Int(20)]));

    assert_eq!(dynamic_index_get(&items, Value::Int(1)).unwrap(), Value::Int(20));
    assert_eq!(
        dynamic_index_set(&items, Value::Int(0), Value::Int(11)).unwrap(),
        Value::Int(11)
    );
    assert_eq!(dynamic_index_get(&items, Value::Int(0)).unwrap(), Value::Int(11));
    assert_eq!(dynamic_load(&items, "length").unwrap(), Value::Int(2));

    assert!(matches!(
        dynamic_index_get(&items, Value::Int(5)),
        Err(Error::IndexOutOfRange { index: 5, length: 2 })
    ));
    assert!(matches!(
        dynamic_index_set(&items, Value::Int(0), Value::str("x")),
        Err(Error::StrongModeViolation { .. })
    ));
    assert!(matches!(
        dynamic_index_get(&items, Value::str("0")),
        Err(Error::StrongModeViolation { .. })
    ));
}

#[test]
fn test_array_add_checks_element_type() {
    let numbers = Array::new(num(), []);
    let value = Value::from(numbers.clone());

    dynamic_send(&value, "add", &[Value::Int(1)]).unwrap();
    dynamic_send(&value, "add", &[Value::Double(2.5)]).unwrap();
    assert!(dynamic_send(&value, "add", &[Value::Bool(true)]).is_err());
    assert_eq!(numbers.len(), 2);
}

// ============================================================================
// Constructors and statics
// ============================================================================

#[test]
fn test_named_and_default_constructors() {
    let class = ClassBuilder::new(&unique("Point"))
        .initializer(|this, args| {
            if let Some(obj) = this.as_object() {
                obj.set_field("x", args.first().cloned().unwrap_or(Value::Int(0)));
            }
            Ok(())
        })
        .constructor("origin", |this, _| {
            if let Some(obj) = this.as_object() {
                obj.set_field("x", Value::Int(0));
            }
            Ok(())
        })
        .register();
    class.define_signatures(
        Signatures::new().constructors(|| vec![("origin", fn_type(TypeRef::void(), []))]),
    );

    let p = dynamic_new(&class, "", &[Value::Int(7)]).unwrap();
    assert_eq!(dynamic_load(&p, "x").unwrap(), Value::Int(7));

    let origin = dynamic_new(&class, "origin", &[]).unwrap();
    assert_eq!(dynamic_load(&origin, "x").unwrap(), Value::Int(0));

    let err = dynamic_new(&class, "origin", &[Value::Int(1)]).unwrap_err();
    assert!(matches!(
        err,
        Error::NoSuchMember {
            kind: MemberKind::Constructor,
            ..
        }
    ));
    assert!(dynamic_new(&class, "polar", &[]).is_err());
}

#[test]
fn test_static_methods() {
    let class = ClassBuilder::new(&unique("MathUtil"))
        .static_method("max", |args| {
            Ok(args.iter().filter_map(Value::as_int).max().map_or(Value::Null, Value::Int))
        })
        .register();
    class.define_signatures(
        Signatures::new().statics(|| vec![("max", fn_type(int(), [int(), int()]))]),
    );

    assert_eq!(
        dynamic_send_static(&class, "max", &[Value::Int(3), Value::Int(9)]).unwrap(),
        Value::Int(9)
    );
    assert!(dynamic_send_static(&class, "max", &[Value::Int(3)]).is_err());
    assert!(dynamic_send_static(&class, "min", &[]).is_err());
}

// ============================================================================
// Host-native receivers
// ============================================================================

#[test]
fn test_primitives_dispatch_through_core_classes() {
    assert_eq!(dynamic_send(&Value::Int(-3), "abs", &[]).unwrap(), Value::Int(3));
    assert_eq!(
        dynamic_send(&Value::Double(-1.5), "abs", &[]).unwrap(),
        Value::Double(1.5)
    );
    assert_eq!(
        dynamic_send(&Value::str("hi"), "toUpperCase", &[]).unwrap(),
        Value::str("HI")
    );
    assert_eq!(
        dynamic_send(&Value::Bool(true), "==", &[Value::Bool(true)]).unwrap(),
        Value::Bool(true)
    );
    assert!(dynamic_send(&Value::Int(1), "length", &[]).is_err());
}

#[test]
fn test_registered_host_uses_extension_members() {
    let class = ClassBuilder::new(&unique("Element"))
        .method("describe", |this, _| {
            let Value::Host(host) = this else {
                return Err(Error::thrown("not a host object"));
            };
            let tag = host.get("tagName").unwrap_or_default();
            Ok(Value::from(format!("<{tag}>")))
        })
        .register();
    install_extension_members(&class, &["describe"]);

    let ctor = HostConstructor::new(&unique("HTMLElement"));
    register_nominal_type(ctor, class.this_type());
    let element = Value::from(HostObject::new(ctor).with("tagName", "div"));

    assert_eq!(element.runtime_type(), class.this_type());
    assert_eq!(
        dynamic_send(&element, "describe", &[]).unwrap(),
        Value::str("<div>")
    );
    assert_eq!(dynamic_load(&element, "tagName").unwrap(), Value::str("div"));
    assert!(dynamic_send(&element, "describe", &[Value::Int(1)]).is_ok());
}

#[test]
fn test_registered_host_hides_unpublished_class_members() {
    let class = ClassBuilder::new(&unique("Node"))
        .method("shown", |_, _| Ok(Value::Int(1)))
        .method("hidden", |_, _| Ok(Value::Int(99)))
        .register();
    install_extension_members(&class, &["shown"]);

    let ctor = HostConstructor::new(&unique("HTMLNode"));
    register_nominal_type(ctor, class.this_type());
    let node = Value::from(HostObject::new(ctor).with("nodeName", "p"));

    assert_eq!(dynamic_send(&node, "shown", &[]).unwrap(), Value::Int(1));
    match dynamic_send(&node, "hidden", &[]) {
        Err(Error::NoSuchMember { name, .. }) => assert_eq!(name.as_str(), "hidden"),
        other => panic!("expected NoSuchMember, got {other:?}"),
    }
    assert!(dynamic_load(&node, "hidden").is_err());
    assert!(resolve_member(&node, "hidden").is_none());
    assert_eq!(dynamic_load(&node, "nodeName").unwrap(), Value::str("p"));
}

#[test]
fn test_unregistered_host_exposes_native_properties() {
    let ctor = HostConstructor::new(&unique("Blob"));
    let size = Function::new(|_| Ok(Value::Int(64)));
    let blob = Value::from(HostObject::new(ctor).with("size", size).with("kind", "binary"));

    assert_eq!(blob.runtime_type(), TypeRef::opaque());
    assert_eq!(dynamic_send(&blob, "size", &[]).unwrap(), Value::Int(64));
    assert_eq!(dynamic_load(&blob, "kind").unwrap(), Value::str("binary"));
    assert!(matches!(
        dynamic_send(&blob, "kind", &[]),
        Err(Error::NoSuchMember { .. })
    ));
    assert!(dynamic_load(&blob, "missing").is_err());

    dynamic_store(&blob, "kind", Value::str("text")).unwrap();
    assert_eq!(dynamic_load(&blob, "kind").unwrap(), Value::str("text"));
}

#[test]
fn test_array_canonical_type_after_dispatch() {
    let items = Value::from(Array::new(string(), []));
    dynamic_send(&items, "add", &[Value::str("a")]).unwrap();
    assert_eq!(items.runtime_type(), instantiate(&core().list, &[string()]));
}
