//! The message transport capability.
//!
//! The client does not speak to sockets directly; it is generic over a
//! [TransportContext] that can open role-typed sockets, mirroring how a
//! ZeroMQ context hands out REQ/PUSH/PUB/DEALER sockets. Implement these
//! two traits to bind the client to a concrete transport (a ZeroMQ
//! binding, an in-process pair for tests, ...).
//!
//! Ownership follows plain Rust rules: a [crate::Connection] owns its
//! context value and drops the socket before the context. To share one
//! context between connections, implement [TransportContext] on a
//! cloneable handle, which is how thread-safe transport contexts behave
//! anyway.

use crate::enums::SocketRole;
use crate::error::YakDbError;

/// Factory for role-typed sockets
pub trait TransportContext {
    type Socket: TransportSocket;

    /// Open a fresh socket of the given role
    fn socket(&mut self, role: SocketRole) -> Result<Self::Socket, YakDbError>;
}

/// A connected, message-oriented socket carrying multipart messages.
///
/// `send` with `more = true` queues a frame of the current message;
/// the message goes out when the final frame is sent with `more = false`.
/// `send_multipart` does the same for a prebuilt frame sequence, and is
/// what the client uses so that no message is ever left half-sent.
pub trait TransportSocket {
    fn connect(&mut self, endpoint: &str) -> Result<(), YakDbError>;

    fn send(&mut self, frame: &[u8], more: bool) -> Result<(), YakDbError>;

    fn send_multipart(&mut self, frames: Vec<Vec<u8>>) -> Result<(), YakDbError>;

    fn recv_multipart(&mut self) -> Result<Vec<Vec<u8>>, YakDbError>;

    /// Set the socket identity before connecting. Only meaningful for
    /// the dealer role; the default implementation ignores it.
    fn set_identity(&mut self, _identity: &[u8]) -> Result<(), YakDbError> {
        Ok(())
    }
}
