//! The multi-value coroutine controller.
//!
//! An async* body is an explicit state machine producing a stream. It emits
//! values, delegates to whole sub-streams, awaits operands, and finally
//! finishes. The controller runs it one resumption at a time, only while the
//! stream has a listener that is not paused:
//!
//! - listening schedules the first resumption;
//! - an emitted value is delivered, after which the body is parked at the
//!   yield and resumed on a later microtask unless the listener paused;
//! - resuming the listener resumes a parked body;
//! - cancelling resumes the body once more with [`StarResume::Cancelled`],
//!   so it can run its cleanup, and the cancellation completes when it
//!   finishes;
//! - an error escaping the body completes a pending cancellation with that
//!   error, or else reaches the listener as a final error event.
//!
//! The stream owns the body until someone listens; from then on the body
//! keeps its stream alive until it closes. A stream dropped unlistened
//! releases the body without running it.

use crate::coro::promise::{Await, Completer, Promise};
use crate::coro::scheduler::schedule_microtask;
use crate::coro::stream::{Stream, StreamController, Subscription, WeakStreamController};
use crate::error::{Error, Result};
use crate::runtime::types::TypeRef;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// What an async* body is resumed with.
#[derive(Debug)]
pub enum StarResume<T> {
    /// The first resumption.
    Start,
    /// The awaited operand resolved.
    Value(T),
    /// The awaited operand, or a delegated stream, failed.
    Error(Error),
    /// The previous emission was consumed, or the delegated stream is done.
    Continue,
    /// The listener went away. The body should clean up and finish.
    Cancelled,
}

/// What an async* body yields.
pub enum StarStep<T> {
    /// `yield value`
    Emit(T),
    /// `yield* stream`
    EmitAll(Stream<T>),
    /// `await operand`
    Await(Await<T>),
    /// The body finished.
    Done,
}

/// A resumable async* body.
pub trait AsyncStarBody<T> {
    fn resume(&mut self, input: StarResume<T>) -> Result<StarStep<T>>;
}

impl<T, F> AsyncStarBody<T> for F
where
    F: FnMut(StarResume<T>) -> Result<StarStep<T>>,
{
    fn resume(&mut self, input: StarResume<T>) -> Result<StarStep<T>> {
        self(input)
    }
}

/// Where a controlled body currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    /// Nobody listened yet.
    Idle,
    /// A resumption is queued.
    Scheduled,
    /// A resumption is executing.
    Running,
    /// The body awaits an operand.
    WaitingOnAwait,
    /// The body emitted a value and waits to be resumed.
    SuspendedAtYield,
    /// The body delegated to a sub-stream that is still delivering.
    Adding,
    /// The body finished, failed or was cancelled.
    Closed,
}

struct Node<T> {
    controller: WeakStreamController<T>,
    /// Set while listened, so the stream outlives its consumer's handles.
    pinned: RefCell<Option<StreamController<T>>>,
    body: RefCell<Option<Box<dyn AsyncStarBody<T>>>>,
    started: Cell<bool>,
    is_scheduled: Cell<bool>,
    is_running: Cell<bool>,
    is_waiting: Cell<bool>,
    is_adding: Cell<bool>,
    is_suspended: Cell<bool>,
    cancel_delivered: Cell<bool>,
    closed: Cell<bool>,
    canceler: RefCell<Option<Completer<()>>>,
    delegate: RefCell<Option<Subscription<T>>>,
    /// A delegated stream's error, fed to the next resumption.
    pending_error: RefCell<Option<Error>>,
}

impl<T: Clone + 'static> Node<T> {
    fn state(&self) -> CoroutineState {
        if self.closed.get() {
            CoroutineState::Closed
        } else if self.is_running.get() {
            CoroutineState::Running
        } else if self.is_adding.get() {
            CoroutineState::Adding
        } else if self.is_waiting.get() {
            CoroutineState::WaitingOnAwait
        } else if self.is_scheduled.get() {
            CoroutineState::Scheduled
        } else if self.is_suspended.get() {
            CoroutineState::SuspendedAtYield
        } else {
            CoroutineState::Idle
        }
    }

    fn controller(&self) -> Option<StreamController<T>> {
        self.controller.upgrade()
    }

    fn has_listener(&self) -> bool {
        self.controller().is_some_and(|c| c.has_listener())
    }

    fn is_paused(&self) -> bool {
        self.controller().is_none_or(|c| c.is_paused())
    }

    fn install_hooks(self: &Rc<Self>, controller: &StreamController<T>) {
        let node = Rc::clone(self);
        controller.set_on_listen(move || {
            *node.pinned.borrow_mut() = node.controller();
            node.schedule();
        });

        let node = Rc::clone(self);
        controller.set_on_pause(move || {
            let delegate = node.delegate.borrow().clone();
            if let Some(sub) = delegate {
                sub.pause();
            }
        });

        let node = Rc::clone(self);
        controller.set_on_resume(move || {
            let delegate = node.delegate.borrow().clone();
            if let Some(sub) = delegate {
                sub.resume();
            }
            if node.is_suspended.get() {
                node.schedule();
            }
        });

        let node = Rc::clone(self);
        controller.set_on_cancel(move || node.on_cancel());
    }

    fn on_cancel(self: &Rc<Self>) -> Option<Promise<()>> {
        if self.closed.get() {
            return None;
        }

        let canceler = Completer::new(TypeRef::void());
        let cancelled = canceler.promise();
        *self.canceler.borrow_mut() = Some(canceler);
        dynrt_log::trace!("async* cancel requested in state {:?}", self.state());

        let delegate = self.delegate.borrow_mut().take();
        if let Some(sub) = delegate {
            self.is_adding.set(false);
            sub.cancel();
        }
        if !self.is_running.get() && !self.is_waiting.get() {
            self.schedule();
        }
        Some(cancelled)
    }

    fn schedule(self: &Rc<Self>) {
        if self.is_scheduled.get() || self.closed.get() {
            return;
        }
        self.is_scheduled.set(true);

        let node = Rc::clone(self);
        schedule_microtask(move || {
            if node.is_waiting.get() || node.is_adding.get() {
                node.is_scheduled.set(false);
                return;
            }
            let pending_error = node.pending_error.borrow_mut().take();
            let input = if !node.started.get() {
                StarResume::Start
            } else if let Some(error) = pending_error {
                StarResume::Error(error)
            } else if node.canceler.borrow().is_some() {
                StarResume::Cancelled
            } else {
                StarResume::Continue
            };
            node.run(input);
        });
    }

    fn run(self: &Rc<Self>, mut input: StarResume<T>) {
        self.is_scheduled.set(false);
        if self.closed.get() || self.is_running.get() {
            return;
        }
        let Some(mut body) = self.body.borrow_mut().take() else {
            return;
        };

        self.is_running.set(true);
        self.is_suspended.set(false);
        self.started.set(true);

        loop {
            if matches!(input, StarResume::Cancelled) {
                self.cancel_delivered.set(true);
            }

            let step = body.resume(input);
            match step {
                Err(error) => {
                    self.is_running.set(false);
                    drop(body);
                    self.fail(error);
                    return;
                }
                Ok(StarStep::Done) => {
                    self.is_running.set(false);
                    drop(body);
                    self.close();
                    return;
                }
                Ok(StarStep::Emit(_) | StarStep::EmitAll(_)) if !self.has_listener() => {
                    if self.cancel_delivered.get() {
                        // Still emitting after being told to stop.
                        self.is_running.set(false);
                        drop(body);
                        self.close();
                        return;
                    }
                    input = StarResume::Cancelled;
                }
                Ok(StarStep::Emit(value)) => {
                    // Delivery is synchronous; the listener may pause or
                    // cancel from inside it.
                    if let Some(controller) = self.controller()
                        && let Err(error) = controller.add(value)
                    {
                        dynrt_log::debug!("async* emit after close: {error}");
                    }
                    self.park(body);
                    self.is_suspended.set(true);
                    if !self.is_paused() || self.canceler.borrow().is_some() {
                        self.schedule();
                    }
                    return;
                }
                Ok(StarStep::EmitAll(stream)) => {
                    self.park(body);
                    self.delegate_to(stream);
                    return;
                }
                Ok(StarStep::Await(operand)) => {
                    self.park(body);
                    self.is_waiting.set(true);
                    let node = Rc::clone(self);
                    operand
                        .into_promise(TypeRef::dynamic())
                        .on_settle(move |result| {
                            node.is_waiting.set(false);
                            node.run(match result {
                                Ok(value) => StarResume::Value(value),
                                Err(error) => StarResume::Error(error),
                            });
                        });
                    return;
                }
            }
        }
    }

    fn park(&self, body: Box<dyn AsyncStarBody<T>>) {
        *self.body.borrow_mut() = Some(body);
        self.is_running.set(false);
    }

    fn delegate_to(self: &Rc<Self>, stream: Stream<T>) {
        self.is_adding.set(true);

        let on_data = {
            let node = Rc::clone(self);
            move |value: T| {
                if let Some(controller) = node.controller()
                    && let Err(error) = controller.add(value)
                {
                    dynrt_log::debug!("async* delegated emit after close: {error}");
                }
            }
        };
        let on_error = {
            let node = Rc::clone(self);
            move |error: Error| {
                node.is_adding.set(false);
                let delegate = node.delegate.borrow_mut().take();
                if let Some(sub) = delegate {
                    sub.cancel();
                }
                *node.pending_error.borrow_mut() = Some(error);
                node.schedule();
            }
        };
        let on_done = {
            let node = Rc::clone(self);
            move || {
                node.is_adding.set(false);
                node.delegate.borrow_mut().take();
                node.schedule();
            }
        };

        match stream.listen(on_data, on_error, on_done) {
            // The delegate may have finished while `listen` flushed its buffer.
            Ok(sub) if self.is_adding.get() => {
                if self.is_paused() {
                    sub.pause();
                }
                *self.delegate.borrow_mut() = Some(sub);
            }
            Ok(_) => {}
            Err(error) => {
                self.is_adding.set(false);
                *self.pending_error.borrow_mut() = Some(error);
                self.schedule();
            }
        }
    }

    fn fail(self: &Rc<Self>, error: Error) {
        let canceler = self.canceler.borrow_mut().take();
        match canceler {
            Some(canceler) => {
                canceler.complete_error(error);
            }
            None => match self.controller() {
                Some(controller) if controller.has_listener() => {
                    if let Err(error) = controller.add_error(error) {
                        dynrt_log::debug!("async* error after close: {error}");
                    }
                }
                _ => dynrt_log::debug!("async* body failed without a listener: {error}"),
            },
        }
        self.close();
    }

    fn close(self: &Rc<Self>) {
        if self.closed.get() {
            return;
        }
        self.closed.set(true);
        self.is_suspended.set(false);
        self.is_waiting.set(false);
        self.is_adding.set(false);

        let canceler = self.canceler.borrow_mut().take();
        if let Some(canceler) = canceler {
            canceler.complete(());
        }
        self.body.borrow_mut().take();
        let delegate = self.delegate.borrow_mut().take();
        if let Some(sub) = delegate {
            sub.cancel();
        }

        if let Some(controller) = self.controller() {
            controller.close();
            controller.clear_hooks();
        }
        self.pinned.borrow_mut().take();
        self.pending_error.borrow_mut().take();
        dynrt_log::trace!("async* body closed");
    }
}

/// Handle on a controlled async* body. Holding it keeps the stream alive.
pub struct AsyncStar<T> {
    node: Rc<Node<T>>,
    controller: StreamController<T>,
}

impl<T: Clone + 'static> AsyncStar<T> {
    /// Wraps `body`. Nothing runs until the stream is listened to.
    pub fn new(
        elem_type: TypeRef,
        body: impl FnMut(StarResume<T>) -> Result<StarStep<T>> + 'static,
    ) -> Self {
        Self::with_body(elem_type, body)
    }

    /// Like [`AsyncStar::new`], for bodies written as types implementing
    /// [`AsyncStarBody`].
    pub fn with_body(elem_type: TypeRef, body: impl AsyncStarBody<T> + 'static) -> Self {
        let controller = StreamController::new(elem_type);
        let node = Rc::new(Node {
            controller: controller.downgrade(),
            pinned: RefCell::new(None),
            body: RefCell::new(Some(Box::new(body))),
            started: Cell::new(false),
            is_scheduled: Cell::new(false),
            is_running: Cell::new(false),
            is_waiting: Cell::new(false),
            is_adding: Cell::new(false),
            is_suspended: Cell::new(false),
            cancel_delivered: Cell::new(false),
            closed: Cell::new(false),
            canceler: RefCell::new(None),
            delegate: RefCell::new(None),
            pending_error: RefCell::new(None),
        });
        node.install_hooks(&controller);
        AsyncStar { node, controller }
    }

    pub fn stream(&self) -> Stream<T> {
        self.controller.stream()
    }

    pub fn state(&self) -> CoroutineState {
        self.node.state()
    }
}

/// Wraps `body` and returns its stream.
///
/// ```
/// use dynrt::coro::{StarResume, StarStep, run_until_settled, spawn_async_star};
/// use dynrt::core;
///
/// let mut next = 0;
/// let numbers = spawn_async_star(core().int.this_type(), move |input| match input {
///     StarResume::Cancelled => Ok(StarStep::Done),
///     _ => {
///         next += 1;
///         Ok(StarStep::Emit(next))
///     }
/// });
///
/// let first = numbers.take(3);
/// assert_eq!(run_until_settled(&first), Some(Ok(vec![1, 2, 3])));
/// ```
pub fn spawn_async_star<T: Clone + 'static>(
    elem_type: TypeRef,
    body: impl FnMut(StarResume<T>) -> Result<StarStep<T>> + 'static,
) -> Stream<T> {
    AsyncStar::new(elem_type, body).stream()
}

/// A stream emitting the items of `items`, driven like any async* body.
pub fn from_iter<T, I>(elem_type: TypeRef, items: I) -> Stream<T>
where
    T: Clone + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: 'static,
{
    let mut items = items.into_iter();
    spawn_async_star(elem_type, move |input| match input {
        StarResume::Cancelled => Ok(StarStep::Done),
        StarResume::Error(error) => Err(error),
        _ => Ok(items.next().map_or(StarStep::Done, StarStep::Emit)),
    })
}
