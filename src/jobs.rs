//! Client-side passive jobs.
//!
//! A passive job is a server-side scan over a point-in-time snapshot
//! that does not push anything on its own; arbitrary clients pull data
//! chunks by APID instead. The job ends implicitly with the first empty
//! chunk the server hands out.

use crate::connection::Connection;
use crate::error::YakDbError;
use crate::iterators::JobIterator;
use crate::transport::TransportContext;

/// Handle to a passive job created by
/// [Connection::initialize_passive_job]
pub struct PassiveDataJob<'a, C: TransportContext> {
    conn: &'a mut Connection<C>,
    apid: i64,
}

impl<'a, C: TransportContext> PassiveDataJob<'a, C> {
    pub(crate) fn new(conn: &'a mut Connection<C>, apid: i64) -> Self {
        PassiveDataJob { conn, apid }
    }

    /// The Asynchronous Process ID identifying this job on the server.
    /// APIDs must not be reused across connections.
    pub fn apid(&self) -> i64 {
        self.apid
    }

    /// Request a single data chunk. The chunk size was fixed at job
    /// initialization. An empty chunk means the job is exhausted; all
    /// further chunks would be empty as well, so the caller must stop.
    pub fn request_chunk(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, YakDbError> {
        self.conn.request_job_chunk(self.apid)
    }
}

impl<'a, C: TransportContext> IntoIterator for PassiveDataJob<'a, C> {
    type Item = Result<(Vec<u8>, Vec<u8>), YakDbError>;
    type IntoIter = JobIterator<'a, C>;

    /// Iterate over the job's key/value pairs, pulling chunks on demand
    fn into_iter(self) -> JobIterator<'a, C> {
        JobIterator::new(self)
    }
}
