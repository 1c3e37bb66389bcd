//! Non-blocking TCP sockets for coroutines.
//!
//! Calls look blocking: when the socket is not ready, the calling coroutine is
//! parked on a readiness [`PendingOperation`](crate::PendingOperation) and the
//! rest of the thread keeps running. Readiness waits are also exposed
//! directly ([`TcpStream::readable`], [`TcpStream::writable`]) so they can be
//! grouped with other operations.
//!
//! # Example
//!
//! ```ignore
//! use coreactor::net::TcpListener;
//!
//! Coroutine::start("server", |_| {
//!     let listener = TcpListener::bind("127.0.0.1:8080")?;
//!     loop {
//!         let (stream, peer) = listener.accept()?;
//!         Coroutine::start(format!("client {peer}"), move |_| echo(stream));
//!     }
//! });
//! ```

mod registration;
mod tcp_listener;
mod tcp_stream;

pub use tcp_listener::TcpListener;
pub use tcp_stream::TcpStream;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

// Resolves the first address `address` stands for.
fn resolve(address: impl ToSocketAddrs) -> io::Result<SocketAddr> {
    address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "address did not resolve to anything",
        )
    })
}
