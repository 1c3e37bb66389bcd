//! Stackful coroutines.
//!
//! A [`Coroutine`] runs a closure on its own machine stack. The closure can
//! block in a logically sequential way (await another coroutine, wait on a
//! lock, wait for an I/O completion) while the thread keeps running other
//! coroutines and reactor callbacks.
//!
//! # States
//!
//! ```text
//! Suspended -> Pending -> Running -> Ready (yielded) -> Suspended -> ...
//!                                 \-> Suspended (blocked)
//!                                 \-> Done
//! ```
//!
//! `Pending` means a dispatch has been posted on the scheduler. `Ready` means
//! the coroutine yielded a value that has not been consumed yet; the awaiter
//! resets it to `Suspended` when it reads the value.
//!
//! # Results
//!
//! The result cell holds nothing, the last produced value, or the captured
//! failure. A panic inside the body is captured and only observed by whoever
//! awaits the coroutine. With `cancel_throws` set, a canceled coroutine is
//! unwound and awaiting it reports [`Error::Canceled`].

use crate::error::Error;
use crate::runtime::context::{ExecutionContext, ForcedUnwind};
use crate::runtime::scheduler;

use log::debug;
use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// Creation-ordered coroutine identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct CoroId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Suspended,
    Pending,
    Running,
    Ready,
    Done,
}

/// Content of a coroutine's result cell.
pub(crate) enum Outcome<R> {
    Empty,
    Value(R),
    Failed(Error),
}

pub(crate) type ResultCell<R> = RefCell<Outcome<R>>;

/// Type-erased coroutine state shared by all handles and the runtime.
pub(crate) struct Core {
    id: CoroId,
    name: String,
    state: Cell<State>,
    canceled: Cell<bool>,
    cancel_throws: Cell<bool>,
    waiter: Cell<Option<CoroId>>,
    context: RefCell<Option<Rc<ExecutionContext>>>,
    result: Rc<dyn Any>,
    locals: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl Core {
    /// The coroutine running on this thread, if any.
    pub(crate) fn current() -> Option<Rc<Core>> {
        ExecutionContext::current()?.owner()
    }

    pub(crate) fn id(&self) -> CoroId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> State {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state.set(state);
    }

    pub(crate) fn canceled(&self) -> bool {
        self.canceled.get()
    }

    pub(crate) fn cancel_throws(&self) -> bool {
        self.cancel_throws.get()
    }

    pub(crate) fn set_cancel_throws(&self, cancel_throws: bool) {
        self.cancel_throws.set(cancel_throws);
    }

    pub(crate) fn context(&self) -> Option<Rc<ExecutionContext>> {
        self.context.borrow().clone()
    }

    pub(crate) fn take_context(&self) -> Option<Rc<ExecutionContext>> {
        self.context.borrow_mut().take()
    }

    pub(crate) fn result_cell(&self) -> Rc<dyn Any> {
        self.result.clone()
    }

    /// Parks the running coroutine until something resumes it.
    ///
    /// Callers must re-check their wake condition afterwards: being resumed
    /// only means someone scheduled this coroutine. Unwinds here if the
    /// coroutine was canceled with throwing semantics.
    pub(crate) fn suspend(&self) {
        self.park(State::Suspended);
    }

    fn park(&self, state: State) {
        let Some(context) = self.context() else {
            return;
        };

        self.state.set(state);
        context.suspend();
    }

    /// Schedules the coroutine waiting on this one, if any.
    fn wake_waiter(&self) {
        if let Some(waiter) = self.waiter.take().and_then(scheduler::lookup) {
            scheduler::resume(&waiter);
        }
    }

    fn finish(&self) {
        self.wake_waiter();
        self.state.set(State::Done);

        debug!("coroutine `{}` finished", self.name);
    }

    /// Unwinds now if a throwing cancellation is pending.
    fn unwind_point(&self) {
        if let Some(context) = self.context() {
            context.unwind_if_requested();
        }
    }

    /// Marks the coroutine canceled.
    ///
    /// With `cancel_throws`, the stack is also unwound: in place when this is
    /// the running coroutine, otherwise on its next resumption, which is
    /// scheduled here when the coroutine is idle.
    pub(crate) fn cancel(self: &Rc<Self>) {
        if self.state() == State::Done {
            return;
        }

        self.canceled.set(true);
        debug!("coroutine `{}` canceled", self.name);

        if !self.cancel_throws.get() {
            return;
        }

        let Some(context) = self.context() else {
            return;
        };

        context.cancel();

        match self.state() {
            State::Suspended => scheduler::resume(self),
            State::Ready => {
                self.state.set(State::Suspended);
                scheduler::resume(self);
            }
            State::Pending | State::Running | State::Done => {}
        }
    }

    /// Yields the processor and runs again after the work already posted.
    pub(crate) fn reschedule(self: &Rc<Self>) {
        self.state.set(State::Suspended);
        scheduler::resume(self);

        if let Some(context) = self.context() {
            context.suspend();
        }
    }

    /// Returns the value stored in this coroutine's local slot for `D`.
    pub(crate) fn data<D: Any>(&self) -> Option<Rc<D>> {
        let local = self.locals.borrow().get(&TypeId::of::<D>()).cloned()?;
        local.downcast::<D>().ok()
    }

    pub(crate) fn set_data<D: Any>(&self, value: Rc<D>) -> Option<Rc<D>> {
        let previous = self.locals.borrow_mut().insert(TypeId::of::<D>(), value);
        previous.and_then(|previous| previous.downcast::<D>().ok())
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        scheduler::unregister(self.id, self);
    }
}

struct Shared<R> {
    core: Rc<Core>,
    result: Rc<ResultCell<R>>,
}

/// Handle to a stackful coroutine producing values of type `R`.
///
/// Handles are cheap to clone; all clones refer to the same coroutine. A
/// default-constructed handle is empty and every operation on it fails with
/// [`Error::Uninitialized`]. Dropping every handle does not stop the
/// coroutine: it keeps running until its body returns or the scheduler shuts
/// down.
pub struct Coroutine<R = ()> {
    shared: Option<Shared<R>>,
}

impl<R> Clone for Coroutine<R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.as_ref().map(|shared| Shared {
                core: shared.core.clone(),
                result: shared.result.clone(),
            }),
        }
    }
}

impl<R> Default for Coroutine<R> {
    fn default() -> Self {
        Self { shared: None }
    }
}

impl<R> fmt::Debug for Coroutine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shared {
            Some(shared) => f
                .debug_struct("Coroutine")
                .field("name", &shared.core.name)
                .field("state", &shared.core.state())
                .field("canceled", &shared.core.canceled())
                .finish(),
            None => f.write_str("Coroutine(uninitialized)"),
        }
    }
}

impl<R: 'static> Coroutine<R> {
    /// Starts a coroutine with the default stack size and schedules it.
    ///
    /// The body receives a handle to its own coroutine. It starts running once
    /// the scheduler dispatches it, after the work already posted.
    ///
    /// # Panics
    /// Panics if the stack cannot be allocated; use [`CoroutineBuilder`] to
    /// handle that case.
    ///
    /// # Example
    /// ```ignore
    /// let worker = Coroutine::start("worker", |_| 6 * 7);
    /// ```
    pub fn start<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Coroutine<R>) -> R + 'static,
    {
        match CoroutineBuilder::new(name).spawn(body) {
            Ok(coroutine) => coroutine,
            Err(error) => panic!("failed to start coroutine: {error}"),
        }
    }

    /// Rebuilds a typed handle from type-erased state.
    pub(crate) fn from_core(core: Rc<Core>) -> Result<Self, Error> {
        let result = core
            .result_cell()
            .downcast::<ResultCell<R>>()
            .map_err(|_| Error::ResultType)?;

        Ok(Self {
            shared: Some(Shared { core, result }),
        })
    }

    fn shared(&self) -> Result<&Shared<R>, Error> {
        self.shared.as_ref().ok_or(Error::Uninitialized)
    }

    pub fn name(&self) -> Result<&str, Error> {
        Ok(self.shared()?.core.name())
    }

    /// Returns `true` until the body has returned or unwound.
    pub fn running(&self) -> Result<bool, Error> {
        Ok(self.shared()?.core.state() != State::Done)
    }

    pub fn canceled(&self) -> Result<bool, Error> {
        Ok(self.shared()?.core.canceled())
    }

    pub fn cancel_throws(&self) -> Result<bool, Error> {
        Ok(self.shared()?.core.cancel_throws())
    }

    /// Chooses whether [`cancel`](Self::cancel) unwinds the coroutine's stack.
    ///
    /// Without it, cancellation only raises the flag and the body is expected
    /// to poll [`canceled`](Self::canceled) and return on its own.
    pub fn set_cancel_throws(&self, cancel_throws: bool) -> Result<(), Error> {
        self.shared()?.core.set_cancel_throws(cancel_throws);
        Ok(())
    }

    /// Cancels the coroutine.
    ///
    /// A no-op once the coroutine is done. When called by the coroutine on
    /// itself with `cancel_throws` set, this unwinds the caller's stack and
    /// does not return.
    pub fn cancel(&self) -> Result<(), Error> {
        self.shared()?.core.cancel();
        Ok(())
    }

    /// Yields `value` to the awaiting coroutine and suspends until resumed.
    ///
    /// Must be called by the coroutine on itself.
    pub fn yield_value(&self, value: R) -> Result<(), Error> {
        let shared = self.shared()?;
        let core = self.ensure_current(shared)?;

        *shared.result.borrow_mut() = Outcome::Value(value);
        core.wake_waiter();
        core.park(State::Ready);

        Ok(())
    }

    /// Lets every piece of work posted so far run, then continues.
    ///
    /// Must be called by the coroutine on itself.
    pub fn reschedule(&self) -> Result<(), Error> {
        let shared = self.shared()?;
        let core = self.ensure_current(shared)?;

        core.reschedule();

        Ok(())
    }

    fn ensure_current<'a>(&self, shared: &'a Shared<R>) -> Result<&'a Rc<Core>, Error> {
        let current = Core::current().ok_or(Error::NoCoroutine)?;

        if !Rc::ptr_eq(&current, &shared.core) {
            return Err(Error::NotCurrent(shared.core.name.clone()));
        }

        Ok(&shared.core)
    }

    /// Returns the stored result without blocking, if one is available.
    ///
    /// `None` while the coroutine is still running and has no unconsumed
    /// yielded value. Unlike [`await_result`](Self::await_result) this does
    /// not consume a yielded value.
    pub fn try_result(&self) -> Option<Result<R, Error>>
    where
        R: Clone,
    {
        let shared = self.shared.as_ref()?;

        match shared.core.state() {
            State::Done | State::Ready => Some(Self::read(shared)),
            _ => None,
        }
    }

    fn read(shared: &Shared<R>) -> Result<R, Error>
    where
        R: Clone,
    {
        let core = &shared.core;
        let outcome: Ref<'_, Outcome<R>> = shared.result.borrow();

        match &*outcome {
            Outcome::Failed(error) => Err(error.clone()),
            _ if core.canceled() && core.cancel_throws() => Err(Error::Canceled),
            Outcome::Value(value) => Ok(value.clone()),
            Outcome::Empty => Err(Error::Canceled),
        }
    }
}

impl<R: Clone + 'static> Coroutine<R> {
    /// Blocks the calling coroutine until this one yields or finishes, and
    /// returns what it produced.
    ///
    /// Awaiting a finished coroutine returns the same result every time.
    /// Awaiting a coroutine that yielded a value nobody consumed yet returns
    /// that value immediately.
    ///
    /// # Errors
    /// - [`Error::Uninitialized`] on an empty handle.
    /// - [`Error::NoCoroutine`] when called outside of a coroutine.
    /// - [`Error::SelfAwait`] when a coroutine awaits itself.
    /// - [`Error::Panicked`] when the body panicked.
    /// - [`Error::Canceled`] when the coroutine was canceled with `cancel_throws`.
    pub fn await_result(&self) -> Result<R, Error> {
        let shared = self.shared()?;
        let target = &shared.core;
        let current = Core::current().ok_or(Error::NoCoroutine)?;

        if Rc::ptr_eq(&current, target) {
            return Err(Error::SelfAwait);
        }

        loop {
            match target.state() {
                State::Done => break,
                State::Ready => {
                    target.set_state(State::Suspended);
                    break;
                }
                State::Suspended | State::Pending | State::Running => {
                    target.waiter.set(Some(current.id));
                    scheduler::resume(target);
                    current.suspend();
                }
            }
        }

        Self::read(shared)
    }
}

/// Builder for coroutines that need a non-default stack size.
///
/// # Example
/// ```ignore
/// let big = CoroutineBuilder::new("parser")
///     .stack_size(1024 * 1024)
///     .spawn(|_| parse())?;
/// ```
#[derive(Debug, Clone)]
pub struct CoroutineBuilder {
    name: String,
    stack_size: Option<usize>,
}

impl CoroutineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_size: None,
        }
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Allocates the coroutine's stack and schedules it.
    pub fn spawn<R, F>(self, body: F) -> Result<Coroutine<R>, Error>
    where
        R: 'static,
        F: FnOnce(Coroutine<R>) -> R + 'static,
    {
        let stack_size = self.stack_size.unwrap_or(scheduler::config().stack_size);
        let result: Rc<ResultCell<R>> = Rc::new(RefCell::new(Outcome::Empty));

        let core = Rc::new(Core {
            id: scheduler::allocate_id(),
            name: self.name,
            state: Cell::new(State::Suspended),
            canceled: Cell::new(false),
            cancel_throws: Cell::new(false),
            waiter: Cell::new(None),
            context: RefCell::new(None),
            result: result.clone(),
            locals: RefCell::new(HashMap::new()),
        });

        let handle = Coroutine {
            shared: Some(Shared {
                core: core.clone(),
                result,
            }),
        };

        let inner = handle.clone();
        let context = ExecutionContext::new(
            Rc::downgrade(&core),
            stack_size,
            Box::new(move || run_body(inner, body)),
        )?;

        *core.context.borrow_mut() = Some(context);
        scheduler::register(&core);

        debug!("coroutine `{}` started", core.name);
        scheduler::resume(&core);

        Ok(handle)
    }
}

// Runs on the coroutine's own stack.
fn run_body<R, F>(handle: Coroutine<R>, body: F)
where
    R: 'static,
    F: FnOnce(Coroutine<R>) -> R,
{
    let Some(shared) = handle.shared.as_ref() else {
        return;
    };
    let core = shared.core.clone();
    let result = shared.result.clone();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        core.unwind_point();
        body(handle)
    }));

    *result.borrow_mut() = match outcome {
        Ok(value) => Outcome::Value(value),
        Err(payload) if payload.is::<ForcedUnwind>() => Outcome::Empty,
        Err(payload) => Outcome::Failed(Error::Panicked {
            coroutine: core.name.clone(),
            message: panic_message(payload.as_ref()),
        }),
    };

    core.finish();
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
