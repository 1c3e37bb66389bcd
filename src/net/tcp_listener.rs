//! TCP listener accepting connections without blocking the thread.

use super::registration::Registration;
use super::{TcpStream, resolve};
use crate::error::Error;
use crate::reactor::core::Direction;

use log::debug;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// A listening TCP socket.
///
/// [`accept`](Self::accept) suspends the calling coroutine until a
/// connection arrives.
///
/// # Example
///
/// ```ignore
/// let listener = TcpListener::bind("127.0.0.1:0")?;
/// println!("listening on {}", listener.local_addr()?);
/// let (stream, peer) = listener.accept()?;
/// ```
pub struct TcpListener {
    inner: mio::net::TcpListener,
    registration: Registration,
}

impl TcpListener {
    /// Binds a listener to `address` and registers it with the reactor.
    ///
    /// # Arguments
    /// * `address` - Address to bind to, e.g. `"127.0.0.1:8080"`.
    pub fn bind(address: impl ToSocketAddrs) -> Result<Self, Error> {
        let address = resolve(address)?;
        let mut inner = mio::net::TcpListener::bind(address)?;
        let registration = Registration::new(&mut inner)?;

        debug!("listening on {address}");

        Ok(Self {
            inner,
            registration,
        })
    }

    /// Waits for the next incoming connection.
    ///
    /// # Returns
    /// The connected stream and the peer's address.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr), Error> {
        let (stream, peer) = self
            .registration
            .io(Direction::Read, || self.inner.accept())?;

        Ok((TcpStream::from_mio(stream)?, peer))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.registration.deregister(&mut self.inner);
    }
}
