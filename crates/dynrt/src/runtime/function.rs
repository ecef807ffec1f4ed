//! Closures as runtime values.
//!
//! A function's type is attached once. It is either given up front, computed
//! from a thunk on first read and then kept, or absent, in which case the
//! function is typed as the universal `Function` marker.

use crate::error::Result;
use crate::runtime::class::Method;
use crate::runtime::types::TypeRef;
use crate::runtime::value::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

type Body = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;
type TypeThunk = Box<dyn Fn() -> TypeRef + Send + Sync>;

#[derive(Clone)]
pub struct Function(Arc<FunctionInner>);

struct FunctionInner {
    body: Body,
    tag: OnceLock<Option<TypeRef>>,
    thunk: Option<TypeThunk>,
}

impl Function {
    /// An untyped closure.
    pub fn new(body: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static) -> Self {
        Function(Arc::new(FunctionInner {
            body: Arc::new(body),
            tag: OnceLock::from(None),
            thunk: None,
        }))
    }

    /// A closure with a known function type.
    pub fn typed(
        ty: TypeRef,
        body: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Function(Arc::new(FunctionInner {
            body: Arc::new(body),
            tag: OnceLock::from(Some(ty)),
            thunk: None,
        }))
    }

    /// A closure whose type is computed on first read.
    pub fn lazy(
        ty: impl Fn() -> TypeRef + Send + Sync + 'static,
        body: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Function(Arc::new(FunctionInner {
            body: Arc::new(body),
            tag: OnceLock::new(),
            thunk: Some(Box::new(ty)),
        }))
    }

    /// A method torn off `receiver`.
    pub(crate) fn bound(receiver: Value, method: Method, ty: Option<TypeRef>) -> Self {
        Function(Arc::new(FunctionInner {
            body: Arc::new(move |args: &[Value]| method(&receiver, args)),
            tag: OnceLock::from(ty),
            thunk: None,
        }))
    }

    pub fn runtime_type(&self) -> Option<TypeRef> {
        *self
            .0
            .tag
            .get_or_init(|| self.0.thunk.as_ref().map(|thunk| thunk()))
    }

    /// Calls the closure without any shape check.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        (self.0.body)(args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.tag.get() {
            Some(Some(ty)) => write!(f, "Function({ty})"),
            Some(None) => f.write_str("Function(untyped)"),
            None => f.write_str("Function(pending)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::core;
    use crate::runtime::types::FunctionType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_tag_once_read_many() {
        static COMPUTED: AtomicUsize = AtomicUsize::new(0);

        let f = Function::lazy(
            || {
                COMPUTED.fetch_add(1, Ordering::SeqCst);
                FunctionType::new(core().int.this_type(), []).intern()
            },
            |_| Ok(Value::Int(1)),
        );

        assert_eq!(COMPUTED.load(Ordering::SeqCst), 0);
        let first = f.runtime_type();
        let second = f.clone().runtime_type();
        assert_eq!(first, second);
        assert!(first.is_some());
        assert_eq!(COMPUTED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invoke() {
        let add = Function::new(|args| {
            let sum = args.iter().filter_map(Value::as_int).sum::<i64>();
            Ok(Value::Int(sum))
        });

        assert_eq!(add.invoke(&[Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
        assert_eq!(add.runtime_type(), None);
    }
}
