//! SIGINT/SIGHUP handling.
//!
//! The handler only raises a process-wide flag; the scheduler loop consumes it
//! at the top of every iteration and stops. Installing the handlers without
//! `SA_RESTART` makes a blocked poll return early with `EINTR`, so the stop is
//! observed immediately.

use crate::error::Error;

use libc::{SIGHUP, SIGINT, c_int, sigaction, sigemptyset};
use log::debug;
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signal: c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs handlers for SIGINT and SIGHUP that stop the running scheduler.
pub fn setup_signal_handlers() -> Result<(), Error> {
    for signal in [SIGINT, SIGHUP] {
        unsafe {
            let mut action: sigaction = mem::zeroed();
            action.sa_sigaction = on_signal as extern "C" fn(c_int) as usize;
            action.sa_flags = 0;
            sigemptyset(&mut action.sa_mask);

            if sigaction(signal, &action, ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error().into());
            }
        }
    }

    debug!("installed SIGINT/SIGHUP handlers");

    Ok(())
}

/// Returns whether a signal asked the scheduler to stop, clearing the request.
pub(crate) fn take_stop_request() -> bool {
    STOP_REQUESTED.swap(false, Ordering::SeqCst)
}
