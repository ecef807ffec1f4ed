//! The single-shot coroutine adapter.
//!
//! An async function body is an explicit state machine. Each resumption
//! hands it the outcome of its previous await; it answers with the next
//! operand to await or with its result. The adapter chains the awaits
//! through promise callbacks, so at most one resumption is in flight.

use crate::coro::promise::{Await, Completer, Promise};
use crate::coro::scheduler::schedule_microtask;
use crate::error::{Error, Result};
use crate::runtime::types::TypeRef;
use std::cell::RefCell;
use std::rc::Rc;

/// What a body is resumed with.
#[derive(Debug)]
pub enum Resume<T> {
    /// The first resumption.
    Start,
    /// The awaited operand resolved.
    Value(T),
    /// The awaited operand rejected.
    Error(Error),
}

/// What a body yields.
pub enum AsyncStep<T> {
    /// Suspend until the operand settles.
    Await(Await<T>),
    /// Finish. A promise result is awaited and forwarded.
    Return(Await<T>),
}

/// A resumable async function body.
///
/// Returning `Err` is an exception escaping the body; the wrapping promise
/// rejects with it.
pub trait AsyncBody<T> {
    fn resume(&mut self, input: Resume<T>) -> Result<AsyncStep<T>>;
}

impl<T, F> AsyncBody<T> for F
where
    F: FnMut(Resume<T>) -> Result<AsyncStep<T>>,
{
    fn resume(&mut self, input: Resume<T>) -> Result<AsyncStep<T>> {
        self(input)
    }
}

struct Driver<T> {
    body: RefCell<Box<dyn AsyncBody<T>>>,
    completer: Completer<T>,
}

impl<T: Clone + 'static> Driver<T> {
    fn step(self: &Rc<Self>, input: Resume<T>) {
        let step = self.body.borrow_mut().resume(input);

        match step {
            Err(error) => {
                dynrt_log::trace!("async body threw: {error}");
                self.completer.complete_error(error);
            }
            Ok(AsyncStep::Return(Await::Value(value))) => {
                self.completer.complete(value);
            }
            Ok(AsyncStep::Return(Await::Future(promise))) => {
                let completer = self.completer.clone();
                promise.on_settle(move |result| {
                    completer.settle(result);
                });
            }
            Ok(AsyncStep::Await(operand)) => {
                let driver = Rc::clone(self);
                operand
                    .into_promise(TypeRef::dynamic())
                    .on_settle(move |result| {
                        driver.step(match result {
                            Ok(value) => Resume::Value(value),
                            Err(error) => Resume::Error(error),
                        });
                    });
            }
        }
    }
}

/// Starts `body` on a microtask and returns the promise of its result.
///
/// ```
/// use dynrt::coro::{Await, AsyncStep, Resume, run_until_settled, spawn_async};
/// use dynrt::{Value, core};
///
/// let promise = spawn_async(core().int.this_type(), |input| match input {
///     Resume::Start => Ok(AsyncStep::Await(Await::Value(Value::Int(42)))),
///     Resume::Value(v) => Ok(AsyncStep::Return(Await::Value(v))),
///     Resume::Error(e) => Err(e),
/// });
/// assert_eq!(run_until_settled(&promise), Some(Ok(Value::Int(42))));
/// ```
pub fn spawn_async<T: Clone + 'static>(
    value_type: TypeRef,
    body: impl FnMut(Resume<T>) -> Result<AsyncStep<T>> + 'static,
) -> Promise<T> {
    spawn_async_with(value_type, body)
}

/// Like [`spawn_async`], for bodies written as types implementing
/// [`AsyncBody`].
pub fn spawn_async_with<T: Clone + 'static>(
    value_type: TypeRef,
    body: impl AsyncBody<T> + 'static,
) -> Promise<T> {
    let completer = Completer::new(value_type);
    let promise = completer.promise();
    let driver = Rc::new(Driver {
        body: RefCell::new(Box::new(body)),
        completer,
    });

    schedule_microtask(move || driver.step(Resume::Start));
    promise
}
