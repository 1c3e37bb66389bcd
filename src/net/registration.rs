//! Socket registration with the thread's reactor.

use crate::error::Error;
use crate::pending::{PendingOperation, initiate};
use crate::reactor::core::{Direction, IoKey};
use crate::runtime::scheduler;

use mio::event::Source;
use std::io;

pub(crate) struct Registration {
    key: IoKey,
}

impl Registration {
    pub(crate) fn new<S: Source>(source: &mut S) -> Result<Self, Error> {
        let key = scheduler::handle().reactor.register(source)?;
        Ok(Self { key })
    }

    /// Operation completing once the socket is ready in `direction`.
    pub(crate) fn ready(&self, direction: Direction) -> PendingOperation {
        let key = self.key;

        initiate(
            |()| (),
            move |completion| {
                scheduler::handle().reactor.when_ready(
                    key,
                    direction,
                    Box::new(move || completion.complete(())),
                );
            },
        )
    }

    /// Retries `operation` until it stops reporting `WouldBlock`, parking the
    /// calling coroutine on readiness in between.
    pub(crate) fn io<T, F>(&self, direction: Direction, mut operation: F) -> Result<T, Error>
    where
        F: FnMut() -> io::Result<T>,
    {
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    self.wait(direction)?;
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error.into()),
            }
        }
    }

    pub(crate) fn wait(&self, direction: Direction) -> Result<(), Error> {
        if !self.ready(direction).wait()? {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket was closed while waiting for readiness",
            )
            .into());
        }

        Ok(())
    }

    pub(crate) fn deregister<S: Source>(&self, source: &mut S) {
        if let Some(scheduler) = scheduler::try_handle() {
            scheduler.reactor.deregister(self.key, source);
        }
    }
}
