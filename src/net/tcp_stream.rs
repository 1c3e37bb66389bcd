//! TCP stream with coroutine-blocking reads and writes.

use super::registration::Registration;
use super::resolve;
use crate::error::Error;
use crate::pending::PendingOperation;
use crate::reactor::core::Direction;

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};

/// A connected TCP socket.
pub struct TcpStream {
    inner: mio::net::TcpStream,
    registration: Registration,
}

impl TcpStream {
    /// Connects to `address`, suspending the calling coroutine until the
    /// connection is established or fails.
    pub fn connect(address: impl ToSocketAddrs) -> Result<Self, Error> {
        let address = resolve(address)?;
        let stream = Self::from_mio(mio::net::TcpStream::connect(address)?)?;

        loop {
            stream.registration.wait(Direction::Write)?;

            if let Some(error) = stream.inner.take_error()? {
                return Err(error.into());
            }

            match stream.inner.peer_addr() {
                Ok(_) => return Ok(stream),
                Err(error) if error.kind() == io::ErrorKind::NotConnected => {}
                Err(error) => return Err(error.into()),
            }
        }
    }

    pub(crate) fn from_mio(mut inner: mio::net::TcpStream) -> Result<Self, Error> {
        let registration = Registration::new(&mut inner)?;

        Ok(Self {
            inner,
            registration,
        })
    }

    /// Reads into `buf`, waiting for data if none is available.
    ///
    /// # Returns
    /// The number of bytes read; zero once the peer closed its side.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        self.registration
            .io(Direction::Read, || (&self.inner).read(buf))
    }

    /// Writes part of `buf`, waiting for buffer space if needed.
    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        self.registration
            .io(Direction::Write, || (&self.inner).write(buf))
    }

    /// Writes all of `buf`.
    pub fn write_all(&self, mut buf: &[u8]) -> Result<(), Error> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned zero bytes",
                )
                .into());
            }
            buf = &buf[n..];
        }

        Ok(())
    }

    /// Operation completing when the socket becomes readable.
    pub fn readable(&self) -> PendingOperation {
        self.registration.ready(Direction::Read)
    }

    /// Operation completing when the socket becomes writable.
    pub fn writable(&self) -> PendingOperation {
        self.registration.ready(Direction::Write)
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.inner.shutdown(how)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        self.registration.deregister(&mut self.inner);
    }
}
