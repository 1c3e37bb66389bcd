//! Switchable execution contexts.
//!
//! An [`ExecutionContext`] owns one guarded machine stack and the two halves
//! of a stack switch: the suspended coroutine side and the caller side it
//! must hand control back to. Switching is done with the `context` crate.
//!
//! # Current context
//!
//! Exactly one context is current per thread at any instant. [`resume`]
//! installs the resumed context as current through an [`Activation`] guard
//! that restores the previous one (its parent) when control comes back,
//! whether the context suspended or finished. Code running on the main stack
//! sees no current context.
//!
//! # Cancellation
//!
//! A context is canceled by unwinding its stack with a private
//! [`ForcedUnwind`] payload. When the context is current, the unwind starts in
//! place. Otherwise it is deferred: the request is recorded and delivered as
//! soon as the context is resumed and returns from its suspension point,
//! before any user code runs again.
//!
//! [`resume`]: ExecutionContext::resume

use crate::coroutine::Core;
use crate::error::Error;

use context::stack::ProtectedFixedSizeStack;
use context::{Context, Transfer};
use log::{error, trace, warn};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::rc::{Rc, Weak};
use std::thread;

// Transfer codes passed across a switch.
const RESUME: usize = 0;
const SUSPENDED: usize = 1;
const FINISHED: usize = 2;

thread_local! {
    /// The context whose stack is executing on this thread, if any.
    static CURRENT: RefCell<Option<Rc<ExecutionContext>>> = const { RefCell::new(None) };
}

/// Panic payload used to unwind a canceled coroutine stack.
///
/// Raised with `resume_unwind`, so it bypasses the panic hook.
pub(crate) struct ForcedUnwind;

// Handed to the trampoline on the priming switch.
struct Launch {
    context: *const ExecutionContext,
    body: Box<dyn FnOnce()>,
}

pub(crate) struct ExecutionContext {
    owner: Weak<Core>,
    stack: RefCell<Option<ProtectedFixedSizeStack>>,
    coroutine: Cell<Option<Context>>,
    caller: Cell<Option<Context>>,
    unwind: Cell<bool>,
    finished: Cell<bool>,
}

impl ExecutionContext {
    /// Allocates a stack and primes it to run `body`.
    ///
    /// The new stack is entered once so the trampoline can take ownership of
    /// `body`; it suspends immediately and control returns here. The body
    /// itself starts on the first [`resume`](Self::resume).
    pub(crate) fn new(
        owner: Weak<Core>,
        stack_size: usize,
        body: Box<dyn FnOnce()>,
    ) -> Result<Rc<Self>, Error> {
        let stack = ProtectedFixedSizeStack::new(stack_size)
            .map_err(|error| Error::Stack(error.to_string()))?;

        let entry = unsafe { Context::new(&stack, trampoline) };

        let this = Rc::new(Self {
            owner,
            stack: RefCell::new(Some(stack)),
            coroutine: Cell::new(None),
            caller: Cell::new(None),
            unwind: Cell::new(false),
            finished: Cell::new(false),
        });

        let launch = Box::new(Launch {
            context: Rc::as_ptr(&this),
            body,
        });

        let transfer = unsafe { entry.resume(Box::into_raw(launch) as usize) };
        assert_eq!(transfer.data, SUSPENDED, "coroutine stack failed to prime");
        this.coroutine.set(Some(transfer.context));

        trace!("primed coroutine stack of {stack_size} bytes");

        Ok(this)
    }

    /// Returns the context executing on this thread, if any.
    pub(crate) fn current() -> Option<Rc<ExecutionContext>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub(crate) fn is_current(&self) -> bool {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .is_some_and(|current| std::ptr::eq(Rc::as_ptr(current), self))
        })
    }

    /// The coroutine that owns this context.
    pub(crate) fn owner(&self) -> Option<Rc<Core>> {
        self.owner.upgrade()
    }

    /// Switches into this context until it suspends or finishes.
    ///
    /// Does nothing if the context already finished or is executing.
    pub(crate) fn resume(self: &Rc<Self>) {
        let Some(target) = self.coroutine.take() else {
            trace!("resume of a running or finished context ignored");
            return;
        };

        let transfer = {
            let _activation = Activation::enter(self.clone());
            unsafe { target.resume(RESUME) }
        };

        match transfer.data {
            FINISHED => {
                self.finished.set(true);
                drop(transfer.context);
            }
            _ => self.coroutine.set(Some(transfer.context)),
        }
    }

    /// Switches from this context back to whoever resumed it.
    ///
    /// Must be called on this context's own stack. When control comes back, a
    /// pending cancellation unwinds the stack from here.
    pub(crate) fn suspend(&self) {
        let caller = self
            .caller
            .take()
            .expect("suspend called outside of the context's own stack");

        let transfer = unsafe { caller.resume(SUSPENDED) };
        self.caller.set(Some(transfer.context));

        self.unwind_if_requested();
    }

    /// Requests the stack to unwind.
    ///
    /// Unwinds immediately when this context is current, otherwise the unwind
    /// happens when the context is next resumed.
    pub(crate) fn cancel(&self) {
        self.unwind.set(true);

        if self.is_current() {
            self.unwind_if_requested();
        }
    }

    /// Starts the forced unwind if one was requested.
    ///
    /// Never unwinds while the thread is already panicking: a second unwind
    /// from a destructor would abort the process.
    pub(crate) fn unwind_if_requested(&self) {
        if self.unwind.get() && !thread::panicking() {
            panic::resume_unwind(Box::new(ForcedUnwind));
        }
    }

    /// Releases the stack of a finished context.
    pub(crate) fn destroy(&self) {
        debug_assert!(self.finished.get(), "destroying a live coroutine stack");

        let stack = self.stack.borrow_mut().take();
        drop(stack);
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if !self.finished.get() && self.stack.get_mut().is_some() {
            warn!("dropping a coroutine stack that never finished; its frames are leaked");
        }
    }
}

/// Scope during which a context is the current one.
///
/// Restores the previously current context when dropped.
struct Activation {
    parent: Option<Rc<ExecutionContext>>,
}

impl Activation {
    fn enter(context: Rc<ExecutionContext>) -> Self {
        let parent = CURRENT.with(|current| current.borrow_mut().replace(context));
        Self { parent }
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        let parent = self.parent.take();
        let _ = CURRENT.try_with(|current| *current.borrow_mut() = parent);
    }
}

extern "C" fn trampoline(transfer: Transfer) -> ! {
    let (context, body) = {
        let launch = unsafe { Box::from_raw(transfer.data as *mut Launch) };
        let launch = *launch;
        (launch.context, launch.body)
    };

    // Hand control back to the creator; the body starts on the first resume.
    let transfer = unsafe { transfer.context.resume(SUSPENDED) };

    let context = unsafe { &*context };
    context.caller.set(Some(transfer.context));

    if panic::catch_unwind(AssertUnwindSafe(body)).is_err() {
        error!("panic escaped a coroutine body; aborting");
        process::abort();
    }

    context.finished.set(true);

    let caller = match context.caller.take() {
        Some(caller) => caller,
        None => process::abort(),
    };

    unsafe { caller.resume(FINISHED) };

    unreachable!("finished coroutine stack was resumed");
}
