//! An in-memory YakDB server for end-to-end tests.
//!
//! Implements the verb semantics over ordered tables: range scans with
//! filters, skip and limit, passive jobs with snapshot isolation, and
//! the write verbs. Requests sent through the loopback socket are
//! processed immediately; the reply waits in the socket until the
//! client receives it.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use crate::conversion::{read_u32_le, read_u64_le};
use crate::enums::{RequestType, SocketRole};
use crate::error::YakDbError;
use crate::transport::{TransportContext, TransportSocket};
use crate::{PROTOCOL_MAGIC, PROTOCOL_VERSION};

const DEFAULT_JOB_CHUNK_SIZE: usize = 1000;

struct PassiveJob {
    rows: VecDeque<(Vec<u8>, Vec<u8>)>,
    chunk_size: usize,
}

#[derive(Default)]
pub struct MemoryServerState {
    tables: HashMap<u32, BTreeMap<Vec<u8>, Vec<u8>>>,
    jobs: HashMap<i64, PassiveJob>,
    next_apid: i64,
    /// Number of put requests processed, for batching assertions
    pub put_requests: usize,
}

impl MemoryServerState {
    /// Direct access for seeding and asserting table contents
    pub fn table(&mut self, table_no: u32) -> &mut BTreeMap<Vec<u8>, Vec<u8>> {
        self.tables.entry(table_no).or_default()
    }

    fn rows_in_range(
        &mut self,
        table_no: u32,
        start: &[u8],
        end: &[u8],
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.table(table_no)
            .iter()
            .filter(|(key, _)| start.is_empty() || key.as_slice() >= start)
            .filter(|(key, _)| end.is_empty() || key.as_slice() < end)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty()
        || haystack
            .windows(needle.len())
            .any(|window| window == needle)
}

/// Direction first, then filters, then skip, then limit
fn apply_scan_semantics(
    mut rows: Vec<(Vec<u8>, Vec<u8>)>,
    invert: bool,
    key_filter: &[u8],
    value_filter: &[u8],
    skip: u64,
    limit: Option<u64>,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    if invert {
        rows.reverse();
    }
    let mut filtered: Vec<(Vec<u8>, Vec<u8>)> = rows
        .into_iter()
        .filter(|(key, value)| {
            contains_subslice(key, key_filter) && contains_subslice(value, value_filter)
        })
        .skip(skip as usize)
        .collect();
    if let Some(limit) = limit {
        filtered.truncate(limit as usize);
    }
    filtered
}

/// A loopback transport context backed by [MemoryServerState]
#[derive(Clone, Default)]
pub struct MemoryServerContext {
    pub state: Rc<RefCell<MemoryServerState>>,
}

pub struct MemoryServerSocket {
    state: Rc<RefCell<MemoryServerState>>,
    role: SocketRole,
    replies: VecDeque<Vec<Vec<u8>>>,
    partial: Vec<Vec<u8>>,
}

impl TransportContext for MemoryServerContext {
    type Socket = MemoryServerSocket;

    fn socket(&mut self, role: SocketRole) -> Result<MemoryServerSocket, YakDbError> {
        Ok(MemoryServerSocket {
            state: Rc::clone(&self.state),
            role,
            replies: VecDeque::new(),
            partial: Vec::new(),
        })
    }
}

impl TransportSocket for MemoryServerSocket {
    fn connect(&mut self, _endpoint: &str) -> Result<(), YakDbError> {
        Ok(())
    }

    fn send(&mut self, frame: &[u8], more: bool) -> Result<(), YakDbError> {
        self.partial.push(frame.to_vec());
        if !more {
            let message = std::mem::take(&mut self.partial);
            self.send_multipart(message)?;
        }
        Ok(())
    }

    fn send_multipart(&mut self, frames: Vec<Vec<u8>>) -> Result<(), YakDbError> {
        let reply = self.state.borrow_mut().process(&frames)?;
        if self.role.supports_request_reply() {
            self.replies.push_back(reply);
        }
        Ok(())
    }

    fn recv_multipart(&mut self) -> Result<Vec<Vec<u8>>, YakDbError> {
        self.replies
            .pop_front()
            .ok_or_else(|| YakDbError::Transport("no reply pending".to_string()))
    }
}

impl MemoryServerState {
    fn process(&mut self, frames: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, YakDbError> {
        let header = frames
            .first()
            .ok_or_else(|| YakDbError::Transport("empty request".to_string()))?;
        let op = header[2];
        let flags = header[3];
        let request_id = header[4..].to_vec();
        let mut reply_header = vec![PROTOCOL_MAGIC, PROTOCOL_VERSION, op, 0x00];
        reply_header.extend_from_slice(&request_id);
        let mut reply = vec![reply_header];

        match op {
            op if op == u8::from(RequestType::ServerInfo) => {
                reply.push(b"YakDB memory server".to_vec());
            }
            op if op == u8::from(RequestType::OpenTable)
                || op == u8::from(RequestType::CloseTable)
                || op == u8::from(RequestType::CompactRange)
                || op == u8::from(RequestType::StopServer)
                || op == u8::from(RequestType::TableInfo) => {}
            op if op == u8::from(RequestType::TruncateTable) => {
                let table_no = read_u32_le(&frames[1])?;
                self.table(table_no).clear();
            }
            op if op == u8::from(RequestType::Read) => {
                let table_no = read_u32_le(&frames[1])?;
                for key in &frames[2..] {
                    let value = self.table(table_no).get(key).cloned().unwrap_or_default();
                    reply.push(value);
                }
            }
            op if op == u8::from(RequestType::Count) => {
                let table_no = read_u32_le(&frames[1])?;
                let count = self.rows_in_range(table_no, &frames[2], &frames[3]).len() as u64;
                reply.push(count.to_le_bytes().to_vec());
            }
            op if op == u8::from(RequestType::Exists) => {
                let table_no = read_u32_le(&frames[1])?;
                for key in &frames[2..] {
                    let found = self.table(table_no).contains_key(key);
                    reply.push(vec![u8::from(found)]);
                }
            }
            op if op == u8::from(RequestType::Scan)
                || op == u8::from(RequestType::List) =>
            {
                let table_no = read_u32_le(&frames[1])?;
                let limit = match frames[2].is_empty() {
                    true => None,
                    false => Some(read_u64_le(&frames[2])?),
                };
                let rows = self.rows_in_range(table_no, &frames[3], &frames[4]);
                let skip = read_u64_le(&frames[7])?;
                let rows = apply_scan_semantics(
                    rows,
                    flags & 0x01 != 0,
                    &frames[5],
                    &frames[6],
                    skip,
                    limit,
                );
                for (key, value) in rows {
                    reply.push(key);
                    if op == u8::from(RequestType::Scan) {
                        reply.push(value);
                    }
                }
            }
            op if op == u8::from(RequestType::Put) => {
                let table_no = read_u32_le(&frames[1])?;
                self.put_requests += 1;
                for pair in frames[2..].chunks_exact(2) {
                    self.table(table_no).insert(pair[0].clone(), pair[1].clone());
                }
            }
            op if op == u8::from(RequestType::Delete) => {
                let table_no = read_u32_le(&frames[1])?;
                for key in &frames[2..] {
                    self.table(table_no).remove(key);
                }
            }
            op if op == u8::from(RequestType::DeleteRange) => {
                let table_no = read_u32_le(&frames[1])?;
                let limit = match frames[4].is_empty() {
                    true => None,
                    false => Some(read_u64_le(&frames[4])?),
                };
                let mut doomed: Vec<Vec<u8>> = self
                    .rows_in_range(table_no, &frames[2], &frames[3])
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect();
                if let Some(limit) = limit {
                    doomed.truncate(limit as usize);
                }
                for key in doomed {
                    self.table(table_no).remove(&key);
                }
            }
            op if op == u8::from(RequestType::InitializePassiveJob) => {
                let table_no = read_u32_le(&frames[1])?;
                let chunk_size = match frames[2].is_empty() {
                    true => DEFAULT_JOB_CHUNK_SIZE,
                    false => read_u32_le(&frames[2])? as usize,
                };
                let scan_limit = match frames[3].is_empty() {
                    true => None,
                    false => Some(read_u64_le(&frames[3])?),
                };
                // snapshot: later writes don't affect the job
                let mut rows = self.rows_in_range(table_no, &frames[4], &frames[5]);
                if let Some(limit) = scan_limit {
                    rows.truncate(limit as usize);
                }
                self.next_apid += 1;
                let apid = self.next_apid;
                self.jobs.insert(
                    apid,
                    PassiveJob {
                        rows: rows.into(),
                        chunk_size,
                    },
                );
                reply.push(apid.to_le_bytes().to_vec());
            }
            op if op == u8::from(RequestType::RequestJobChunk) => {
                let apid = read_u64_le(&frames[1])? as i64;
                let job = self.jobs.get_mut(&apid).ok_or_else(|| {
                    YakDbError::Transport(format!("no job with APID {apid}"))
                })?;
                if job.rows.is_empty() {
                    reply[0][3] = 0x02;
                } else {
                    for _ in 0..job.chunk_size {
                        let Some((key, value)) = job.rows.pop_front() else {
                            break;
                        };
                        reply.push(key);
                        reply.push(value);
                    }
                    if !job.rows.is_empty() {
                        reply[0][3] = 0x01;
                    }
                }
            }
            _ => {
                reply[0][2] = 0xFF;
            }
        }
        Ok(reply)
    }
}
