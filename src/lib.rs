//! Client for YakDB, a remote key-value store speaking a framed
//! request/response protocol over a ZeroMQ-style message transport.
//!
//! The crate is generic over the transport (see [transport]); bind it
//! to a concrete socket implementation and talk to a server through
//! [Connection] (blocking request/reply, push or publish) or
//! [DealerConnection] (request-id correlated, multiple requests in
//! flight). On top of the raw verbs sit chunked [iterators], the
//! auto-flushing [batch] writer, [dump] for the YDF snapshot format,
//! and the [index] and [graph] overlays.

#[cfg(test)]
#[macro_use(defer)]
extern crate scopeguard;

pub mod batch;
pub mod connection;
pub mod conversion;
pub mod dealer;
pub mod dump;
pub mod enums;
pub mod error;
pub mod frames;
/// The inverted-index subsystem and its entity-fetching decorator
pub mod index;
/// Nodes, mirrored edges and attribute storage over plain tables
pub mod graph;
pub mod iterators;
pub mod jobs;
pub mod transport;
pub mod utils;
#[cfg(test)]
mod tests;

/// Magic byte opening every request and response header frame
pub const PROTOCOL_MAGIC: u8 = 0x31;
/// Protocol version carried in byte 1 of every header frame
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Conventional endpoint for request/reply connections
pub const DEFAULT_ENDPOINT: &str = "tcp://localhost:7100";
/// Conventional endpoint for push (fire-and-forget write) connections
pub const DEFAULT_PUSH_ENDPOINT: &str = "tcp://localhost:7101";

pub use batch::AutoWriteBatch;
pub use connection::{Connection, ScanOptions, TableOpenOptions};
pub use conversion::BinaryValue;
pub use dealer::{AsyncReply, DealerConnection, ReplyHandle};
pub use enums::{CompressionMode, MergeOperator, RequestType, SocketRole};
pub use error::YakDbError;
pub use graph::Graph;
pub use index::InvertedIndex;
pub use index::entity::EntityInvertedIndex;
pub use iterators::{JobIterator, KeyIterator, KeyValueIterator};
pub use jobs::PassiveDataJob;
pub use transport::{TransportContext, TransportSocket};
