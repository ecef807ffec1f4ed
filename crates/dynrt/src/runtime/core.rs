//! The core classes.
//!
//! Bootstrapped once, on first use. The bootstrap registers every class with
//! an explicit super class so it never re-enters [`core`], and declares its
//! heritage and signatures through thunks that run only after it finished.

use crate::error::{Error, Result};
use crate::runtime::cast::check_implicit;
use crate::runtime::class::{Class, ClassBuilder, ClassRole};
use crate::runtime::extension::install_extension_members;
use crate::runtime::generic::instantiate;
use crate::runtime::signature::Signatures;
use crate::runtime::types::{FunctionType, TypeRef};
use crate::runtime::value::{Array, Value};
use std::sync::OnceLock;

/// Handles to the core classes.
#[derive(Debug)]
pub struct CoreClasses {
    pub object: Class,
    pub null: Class,
    pub bool: Class,
    pub num: Class,
    pub int: Class,
    pub double: Class,
    pub string: Class,
    /// The universal function marker.
    pub function: Class,
    pub iterable: Class,
    pub list: Class,
    pub future: Class,
    pub stream: Class,
}

pub fn core() -> &'static CoreClasses {
    static CORE: OnceLock<CoreClasses> = OnceLock::new();
    CORE.get_or_init(bootstrap)
}

fn bootstrap() -> CoreClasses {
    let object = ClassBuilder::new("Object")
        .root()
        .role(ClassRole::Object)
        .method("toString", |this, _| Ok(Value::from(this.to_string())))
        .method("==", |this, args| {
            Ok(Value::Bool(args.first().is_some_and(|other| this == other)))
        })
        .register();

    let null = ClassBuilder::new("Null")
        .extends(&object)
        .role(ClassRole::Null)
        .register();
    let bool = ClassBuilder::new("bool").extends(&object).register();

    let num = ClassBuilder::new("num")
        .extends(&object)
        .method("abs", |this, _| match this {
            Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
            Value::Double(d) => Ok(Value::Double(d.abs())),
            other => Err(Error::thrown(format!("{other} is not a number"))),
        })
        .register();
    let int = ClassBuilder::new("int").extends(&num).register();
    let double = ClassBuilder::new("double").extends(&num).register();

    let string = ClassBuilder::new("String")
        .extends(&object)
        .getter("length", |this| {
            let text = this.as_str().unwrap_or_default();
            Ok(Value::Int(count(text.chars().count())))
        })
        .method("toUpperCase", |this, _| {
            Ok(Value::from(this.as_str().unwrap_or_default().to_uppercase()))
        })
        .register();

    let function = ClassBuilder::new("Function")
        .extends(&object)
        .role(ClassRole::Function)
        .register();

    let iterable = ClassBuilder::new("Iterable")
        .extends(&object)
        .type_params(1)
        .register();

    let list = ClassBuilder::new("List")
        .extends(&object)
        .type_params(1)
        .implements(|args| instantiate(&core().iterable, &[args[0]]))
        .getter("length", |this| Ok(Value::Int(count(array(this)?.len()))))
        .method("[]", |this, args| {
            let index = index_arg(args)?;
            array(this)?.get(index)
        })
        .method("[]=", |this, args| {
            let index = index_arg(args)?;
            let items = array(this)?;
            let value = args.get(1).cloned().unwrap_or_default();
            check_implicit(&value, items.elem_type(), "value")?;
            items.set(index, value)?;
            Ok(Value::Null)
        })
        .method("add", |this, args| {
            let items = array(this)?;
            let value = args.first().cloned().unwrap_or_default();
            check_implicit(&value, items.elem_type(), "value")?;
            items.push(value);
            Ok(Value::Null)
        })
        .register();

    let future = ClassBuilder::new("Future")
        .extends(&object)
        .type_params(1)
        .register();
    let stream = ClassBuilder::new("Stream")
        .extends(&object)
        .type_params(1)
        .register();

    install_extension_members(&object, &["toString", "=="]);
    install_extension_members(&num, &["abs"]);
    install_extension_members(&string, &["length", "toUpperCase"]);
    install_extension_members(&list, &["length", "[]", "[]=", "add"]);

    object.define_signatures(Signatures::new().methods(|| {
        let core = core();
        vec![
            ("toString", FunctionType::new(core.string.this_type(), []).intern()),
            (
                "==",
                FunctionType::new(core.bool.this_type(), [TypeRef::dynamic()]).intern(),
            ),
        ]
    }));
    num.define_signatures(Signatures::new().methods(|| {
        vec![("abs", FunctionType::new(core().num.this_type(), []).intern())]
    }));
    string.define_signatures(Signatures::new().methods(|| {
        vec![(
            "toUpperCase",
            FunctionType::new(core().string.this_type(), []).intern(),
        )]
    }));
    list.define_signatures(Signatures::new().methods(|| {
        let int = core().int.this_type();
        let dynamic = TypeRef::dynamic();
        vec![
            ("[]", FunctionType::new(dynamic, [int]).intern()),
            ("[]=", FunctionType::new(TypeRef::void(), [int, dynamic]).intern()),
            ("add", FunctionType::new(TypeRef::void(), [dynamic]).intern()),
        ]
    }));

    dynrt_log::debug!("core classes bootstrapped");

    CoreClasses {
        object,
        null,
        bool,
        num,
        int,
        double,
        string,
        function,
        iterable,
        list,
        future,
        stream,
    }
}

fn count(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn array(this: &Value) -> Result<&Array> {
    this.as_array()
        .ok_or_else(|| Error::thrown(format!("{this} is not a list")))
}

fn index_arg(args: &[Value]) -> Result<i64> {
    let index = args.first().cloned().unwrap_or_default();
    check_implicit(&index, core().int.this_type(), "index")?;
    index
        .as_int()
        .ok_or_else(|| Error::thrown("index must not be null"))
}
