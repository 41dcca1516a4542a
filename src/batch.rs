//! Auto-batching writer.
//!
//! Accumulates key/value pairs and issues one put per `batch_size`
//! entries. Dropping the batch flushes whatever is left, so a scope exit
//! on any path gets the data out; use the explicit [AutoWriteBatch::flush]
//! where the result needs to be checked.

use std::collections::HashMap;

use log::error;

use crate::connection::Connection;
use crate::conversion::BinaryValue;
use crate::error::YakDbError;
use crate::transport::TransportContext;

/// Default number of accumulated entries that triggers a flush
pub const DEFAULT_BATCH_SIZE: usize = 2500;

/// A write batch bound to one table of one connection
pub struct AutoWriteBatch<'a, C: TransportContext> {
    conn: &'a mut Connection<C>,
    table_no: u32,
    batch_size: usize,
    partsync: bool,
    fullsync: bool,
    batch_data: HashMap<Vec<u8>, Vec<u8>>,
}

impl<'a, C: TransportContext> AutoWriteBatch<'a, C> {
    pub fn new(conn: &'a mut Connection<C>, table_no: u32) -> Self {
        Self::with_options(conn, table_no, DEFAULT_BATCH_SIZE, false, false)
    }

    pub fn with_options(
        conn: &'a mut Connection<C>,
        table_no: u32,
        batch_size: usize,
        partsync: bool,
        fullsync: bool,
    ) -> Self {
        AutoWriteBatch {
            conn,
            table_no,
            batch_size,
            partsync,
            fullsync,
            batch_data: HashMap::new(),
        }
    }

    /// Number of entries currently buffered
    pub fn len(&self) -> usize {
        self.batch_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch_data.is_empty()
    }

    /// Merge a set of key/value pairs into the batch. Re-put keys
    /// overwrite their buffered value in place.
    pub fn put(
        &mut self,
        pairs: impl IntoIterator<Item = (BinaryValue, BinaryValue)>,
    ) -> Result<(), YakDbError> {
        for (key, value) in pairs {
            self.batch_data.insert(key.to_key_bytes()?, value.to_bytes());
        }
        self.check_flush()
    }

    /// Add a single key/value pair to the batch. Conversion happens
    /// here, so an unsupported type is reported to the caller that added
    /// it rather than at some later flush.
    pub fn put_single(
        &mut self,
        key: impl Into<BinaryValue>,
        value: impl Into<BinaryValue>,
    ) -> Result<(), YakDbError> {
        let conv_key = key.into().to_key_bytes()?;
        let conv_value = value.into().to_bytes();
        self.batch_data.insert(conv_key, conv_value);
        self.check_flush()
    }

    fn check_flush(&mut self) -> Result<(), YakDbError> {
        if self.batch_data.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Immediately issue the backend write and clear the buffer. Not
    /// required before the batch goes out of scope, but the only way to
    /// observe a write error.
    pub fn flush(&mut self) -> Result<(), YakDbError> {
        if self.batch_data.is_empty() {
            return Ok(());
        }
        let pairs: Vec<(BinaryValue, BinaryValue)> = self
            .batch_data
            .drain()
            .map(|(key, value)| (BinaryValue::Bytes(key), BinaryValue::Bytes(value)))
            .collect();
        self.conn
            .put(self.table_no, &pairs, self.partsync, self.fullsync)
    }
}

impl<C: TransportContext> Drop for AutoWriteBatch<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            error!(
                "Failed to flush write batch for table {} on drop: {err}",
                self.table_no
            );
        }
    }
}
