//! Single-assignment promises.
//!
//! A [`Promise`] settles once, through its [`Completer`]. Callbacks never run
//! synchronously: registering on a settled promise, or settling a promise
//! with registered callbacks, queues them as microtasks.

use crate::coro::scheduler::schedule_microtask;
use crate::error::{Error, Result};
use crate::runtime::core::core;
use crate::runtime::generic::instantiate;
use crate::runtime::types::TypeRef;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Callback<T> = Box<dyn FnOnce(Result<T>)>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    Settled(Result<T>),
}

struct Inner<T> {
    state: State<T>,
    value_type: TypeRef,
}

/// The eventual result of an asynchronous computation.
pub struct Promise<T>(Rc<RefCell<Inner<T>>>);

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise(Rc::clone(&self.0))
    }
}

impl<T: Clone + 'static> Promise<T> {
    fn pending(value_type: TypeRef) -> Self {
        Promise(Rc::new(RefCell::new(Inner {
            state: State::Pending(Vec::new()),
            value_type,
        })))
    }

    /// A promise already resolved with `value`.
    pub fn resolved(value_type: TypeRef, value: T) -> Self {
        let promise = Self::pending(value_type);
        promise.settle(Ok(value));
        promise
    }

    /// A promise already rejected with `error`.
    pub fn rejected(value_type: TypeRef, error: Error) -> Self {
        let promise = Self::pending(value_type);
        promise.settle(Err(error));
        promise
    }

    /// `Future<T>`, where `T` is the declared value type.
    pub fn runtime_type(&self) -> TypeRef {
        instantiate(&core().future, &[self.value_type()])
    }

    pub fn value_type(&self) -> TypeRef {
        self.0.borrow().value_type
    }

    /// The outcome, if settled.
    pub fn peek(&self) -> Option<Result<T>> {
        match &self.0.borrow().state {
            State::Pending(_) => None,
            State::Settled(result) => Some(result.clone()),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.0.borrow().state, State::Settled(_))
    }

    /// Runs `callback` with the outcome, as a microtask.
    pub fn on_settle(&self, callback: impl FnOnce(Result<T>) + 'static) {
        let mut inner = self.0.borrow_mut();
        match &mut inner.state {
            State::Pending(callbacks) => callbacks.push(Box::new(callback)),
            State::Settled(result) => {
                let result = result.clone();
                schedule_microtask(move || callback(result));
            }
        }
    }

    /// Chains a computation on the outcome, success or failure.
    pub fn then_with<U: Clone + 'static>(
        &self,
        value_type: TypeRef,
        f: impl FnOnce(Result<T>) -> Result<U> + 'static,
    ) -> Promise<U> {
        let next = Promise::pending(value_type);
        let target = next.clone();
        self.on_settle(move |result| {
            target.settle(f(result));
        });
        next
    }

    /// Chains a computation on success. A rejection passes through.
    pub fn then<U: Clone + 'static>(
        &self,
        value_type: TypeRef,
        f: impl FnOnce(T) -> Result<U> + 'static,
    ) -> Promise<U> {
        self.then_with(value_type, move |result| result.and_then(f))
    }

    /// Settles the promise. Returns `false` when it was already settled.
    fn settle(&self, result: Result<T>) -> bool {
        let previous = {
            let mut inner = self.0.borrow_mut();
            if matches!(inner.state, State::Settled(_)) {
                return false;
            }
            std::mem::replace(&mut inner.state, State::Settled(result.clone()))
        };
        let State::Pending(callbacks) = previous else {
            return false;
        };

        for callback in callbacks {
            let result = result.clone();
            schedule_microtask(move || callback(result));
        }
        true
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        let state = match inner.state {
            State::Pending(_) => "pending",
            State::Settled(Ok(_)) => "resolved",
            State::Settled(Err(_)) => "rejected",
        };
        write!(f, "Promise<{}>({state})", inner.value_type)
    }
}

/// The producing side of a [`Promise`].
pub struct Completer<T> {
    promise: Promise<T>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Completer {
            promise: self.promise.clone(),
        }
    }
}

impl<T: Clone + 'static> Completer<T> {
    pub fn new(value_type: TypeRef) -> Self {
        Completer {
            promise: Promise::pending(value_type),
        }
    }

    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    /// Resolves the promise. Returns `false` when it was already settled.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the promise. Returns `false` when it was already settled.
    pub fn complete_error(&self, error: Error) -> bool {
        self.settle(Err(error))
    }

    pub fn settle(&self, result: Result<T>) -> bool {
        let settled = self.promise.settle(result);
        if !settled {
            dynrt_log::debug!("ignoring second completion of {:?}", self.promise);
        }
        settled
    }

    pub fn is_completed(&self) -> bool {
        self.promise.is_settled()
    }
}

/// An awaited operand: a promise, or a plain value that is awaited as an
/// already resolved promise.
///
/// Operands share the Rust type `T` of the body awaiting them, so bodies that
/// await values of different types use a common carrier such as `Value`. The
/// runtime type of an operand is its own: a promise keeps its declared value
/// type, and a plain value is wrapped with the type the caller passes to
/// [`Await::into_promise`].
pub enum Await<T> {
    Value(T),
    Future(Promise<T>),
}

impl<T: Clone + 'static> Await<T> {
    pub fn into_promise(self, value_type: TypeRef) -> Promise<T> {
        match self {
            Await::Value(value) => Promise::resolved(value_type, value),
            Await::Future(promise) => promise,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coro::scheduler::{pending_microtasks, run_microtasks};
    use crate::runtime::value::Value;
    use std::cell::Cell;

    fn int() -> TypeRef {
        core().int.this_type()
    }

    #[test]
    fn test_callbacks_are_deferred() {
        let promise = Promise::resolved(int(), 7);
        let seen = Rc::new(Cell::new(0));
        let slot = Rc::clone(&seen);
        promise.on_settle(move |result| slot.set(result.unwrap_or_default()));

        assert_eq!(seen.get(), 0);
        assert_eq!(pending_microtasks(), 1);
        run_microtasks();
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn test_single_assignment() {
        let completer = Completer::new(int());
        assert!(!completer.is_completed());
        assert!(completer.complete(1));
        assert!(!completer.complete(2));
        assert!(!completer.complete_error(Error::thrown("late")));
        assert_eq!(completer.promise().peek(), Some(Ok(1)));
    }

    #[test]
    fn test_then_chains_and_propagates_errors() {
        let doubled = Promise::resolved(int(), 21).then(int(), |v| Ok(v * 2));
        let failed: Promise<i64> = Promise::rejected(int(), Error::thrown("no"));
        let skipped = failed.then(int(), |v| Ok(v + 1));
        let recovered = failed.then_with(int(), |r| Ok(r.map_or(-1, |v| v)));

        run_microtasks();
        assert_eq!(doubled.peek(), Some(Ok(42)));
        assert_eq!(skipped.peek(), Some(Err(Error::thrown("no"))));
        assert_eq!(recovered.peek(), Some(Ok(-1)));
    }

    #[test]
    fn test_await_keeps_operand_type() {
        let string = core().string.this_type();
        let future: Promise<Value> = Promise::resolved(string, Value::str("x"));
        let operand = Await::Future(future).into_promise(TypeRef::dynamic());
        assert_eq!(operand.runtime_type().to_string(), "Future<String>");

        let plain = Await::Value(Value::Int(1)).into_promise(TypeRef::dynamic());
        assert_eq!(plain.runtime_type().to_string(), "Future<dynamic>");
        run_microtasks();
        assert_eq!(plain.peek(), Some(Ok(Value::Int(1))));
    }

    #[test]
    fn test_runtime_type() {
        let promise: Promise<Value> = Promise::resolved(int(), Value::Int(1));
        assert_eq!(promise.runtime_type().to_string(), "Future<int>");
        run_microtasks();
    }
}
