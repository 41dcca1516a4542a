//! Buffered lazy iteration over scans, lists and passive jobs.
//!
//! Each iterator holds one chunk in memory and fetches the next one on
//! demand. Continuation works by restarting the scan at the
//! lexicographic successor of the last returned key (or, for inverted
//! scans, by pulling the exclusive end of the range down to the last
//! returned key). A chunk with zero records drains the iterator for
//! good; none of these are restartable.

use std::collections::VecDeque;

use crate::connection::{Connection, ScanOptions};
use crate::conversion::BinaryValue;
use crate::error::YakDbError;
use crate::jobs::PassiveDataJob;
use crate::transport::TransportContext;
use crate::utils::increment_key;

/// Default number of records fetched per chunk
pub const DEFAULT_CHUNK_SIZE: u64 = 1000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum IterState {
    Initial,
    ChunkReady,
    Drained,
}

/// Move the continuation cursor past the last key of a finished chunk.
/// Forward scans restart at the lex-successor of the last key; inverted
/// scans instead pull the exclusive range end down to the last key.
fn advance_cursor(options: &mut ScanOptions, last_key: &[u8]) {
    if options.invert {
        options.end_key = Some(BinaryValue::Bytes(last_key.to_vec()));
    } else {
        options.start_key = Some(BinaryValue::Bytes(increment_key(last_key)));
    }
    // skip consumed records only once, on the first chunk
    options.skip = 0;
}

fn chunk_limit(remaining: Option<u64>, chunk_size: u64) -> u64 {
    match remaining {
        Some(rem) => rem.min(chunk_size),
        None => chunk_size,
    }
}

/// Lazy key/value iteration over a table range using chunked scans
pub struct KeyValueIterator<'a, C: TransportContext> {
    conn: &'a mut Connection<C>,
    table_no: u32,
    options: ScanOptions,
    chunk_size: u64,
    remaining: Option<u64>,
    buf: VecDeque<(Vec<u8>, Vec<u8>)>,
    state: IterState,
}

impl<'a, C: TransportContext> KeyValueIterator<'a, C> {
    pub fn new(
        conn: &'a mut Connection<C>,
        table_no: u32,
        options: ScanOptions,
        chunk_size: u64,
    ) -> Self {
        let remaining = options.limit;
        KeyValueIterator {
            conn,
            table_no,
            options,
            chunk_size,
            remaining,
            buf: VecDeque::new(),
            state: IterState::Initial,
        }
    }

    fn load_next_chunk(&mut self) -> Result<bool, YakDbError> {
        let limit = chunk_limit(self.remaining, self.chunk_size);
        if limit == 0 {
            return Ok(false);
        }
        let chunk_options = ScanOptions {
            limit: Some(limit),
            ..self.options.clone()
        };
        let records = self.conn.scan(self.table_no, &chunk_options)?;
        let Some((last_key, _)) = records.last() else {
            return Ok(false);
        };
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(records.len() as u64);
        }
        advance_cursor(&mut self.options, &last_key.clone());
        self.buf.extend(records);
        Ok(true)
    }
}

impl<C: TransportContext> Iterator for KeyValueIterator<'_, C> {
    type Item = Result<(Vec<u8>, Vec<u8>), YakDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.buf.pop_front() {
            return Some(Ok(item));
        }
        if self.state == IterState::Drained {
            return None;
        }
        match self.load_next_chunk() {
            Ok(true) => {
                self.state = IterState::ChunkReady;
                self.buf.pop_front().map(Ok)
            }
            Ok(false) => {
                self.state = IterState::Drained;
                None
            }
            Err(error) => {
                self.state = IterState::Drained;
                Some(Err(error))
            }
        }
    }
}

/// Lazy key-only iteration, backed by the list verb
pub struct KeyIterator<'a, C: TransportContext> {
    conn: &'a mut Connection<C>,
    table_no: u32,
    options: ScanOptions,
    chunk_size: u64,
    remaining: Option<u64>,
    buf: VecDeque<Vec<u8>>,
    state: IterState,
}

impl<'a, C: TransportContext> KeyIterator<'a, C> {
    pub fn new(
        conn: &'a mut Connection<C>,
        table_no: u32,
        options: ScanOptions,
        chunk_size: u64,
    ) -> Self {
        let remaining = options.limit;
        KeyIterator {
            conn,
            table_no,
            options,
            chunk_size,
            remaining,
            buf: VecDeque::new(),
            state: IterState::Initial,
        }
    }

    fn load_next_chunk(&mut self) -> Result<bool, YakDbError> {
        let limit = chunk_limit(self.remaining, self.chunk_size);
        if limit == 0 {
            return Ok(false);
        }
        let chunk_options = ScanOptions {
            limit: Some(limit),
            ..self.options.clone()
        };
        let keys = self.conn.list(self.table_no, &chunk_options)?;
        let Some(last_key) = keys.last() else {
            return Ok(false);
        };
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(keys.len() as u64);
        }
        advance_cursor(&mut self.options, &last_key.clone());
        self.buf.extend(keys);
        Ok(true)
    }
}

impl<C: TransportContext> Iterator for KeyIterator<'_, C> {
    type Item = Result<Vec<u8>, YakDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.buf.pop_front() {
            return Some(Ok(item));
        }
        if self.state == IterState::Drained {
            return None;
        }
        match self.load_next_chunk() {
            Ok(true) => {
                self.state = IterState::ChunkReady;
                self.buf.pop_front().map(Ok)
            }
            Ok(false) => {
                self.state = IterState::Drained;
                None
            }
            Err(error) => {
                self.state = IterState::Drained;
                Some(Err(error))
            }
        }
    }
}

/// Iteration over the key/value pairs delivered by a passive job
pub struct JobIterator<'a, C: TransportContext> {
    job: PassiveDataJob<'a, C>,
    buf: VecDeque<(Vec<u8>, Vec<u8>)>,
    state: IterState,
}

impl<'a, C: TransportContext> JobIterator<'a, C> {
    pub fn new(job: PassiveDataJob<'a, C>) -> Self {
        JobIterator {
            job,
            buf: VecDeque::new(),
            state: IterState::Initial,
        }
    }
}

impl<C: TransportContext> Iterator for JobIterator<'_, C> {
    type Item = Result<(Vec<u8>, Vec<u8>), YakDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.buf.pop_front() {
            return Some(Ok(item));
        }
        if self.state == IterState::Drained {
            return None;
        }
        match self.job.request_chunk() {
            Ok(chunk) if chunk.is_empty() => {
                self.state = IterState::Drained;
                None
            }
            Ok(chunk) => {
                self.state = IterState::ChunkReady;
                self.buf = chunk.into();
                self.buf.pop_front().map(Ok)
            }
            Err(error) => {
                self.state = IterState::Drained;
                Some(Err(error))
            }
        }
    }
}
