//! Connection state machine and the synchronous verb catalogue.
//!
//! A [Connection] owns a transport context, an optional role-typed
//! socket and the count of connected endpoints. Request/reply verbs
//! require exactly one endpoint (a deterministic peer for the reply);
//! put and delete also work on push and publish sockets, where no reply
//! is consumed.
//!
//! Every verb validates its arguments and the connection shape before
//! the first frame is handed to the transport, so a rejected call never
//! leaves a message half-sent. The request builders are shared with the
//! dealer connection, which adds request-id correlation on top.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::conversion::{BinaryValue, read_i64_le, read_u64_le, to_key_frames};
use crate::enums::{CompressionMode, MergeOperator, RequestType, SocketRole};
use crate::error::YakDbError;
use crate::frames::{
    check_chunk_header_frame, check_header_frame, map_scan_to_tuples, optional_u32_frame,
    optional_u64_frame, range_to_frames, table_no_frame, u64_frame, write_header,
    write_scan_header, write_sync_header,
};
use crate::jobs::PassiveDataJob;
use crate::transport::{TransportContext, TransportSocket};

/// Options for a scan or list request. The scan stops at the table end,
/// `end_key` (exclusive) or after `limit` records, whichever fires
/// first. Filters are byte-substring matches applied on the server;
/// filtered-out records count toward neither `limit` nor `skip`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// First key to scan, inclusive; absent means start of table
    pub start_key: Option<BinaryValue>,
    /// End of the scan, exclusive; absent means end of table
    pub end_key: Option<BinaryValue>,
    /// Maximum number of records to return
    pub limit: Option<u64>,
    /// Server-side substring filter on keys
    pub key_filter: Option<Vec<u8>>,
    /// Server-side substring filter on values
    pub value_filter: Option<Vec<u8>>,
    /// Number of filter-surviving records to skip at the start
    pub skip: u64,
    /// Reverse the scan direction
    pub invert: bool,
}

impl ScanOptions {
    /// Scan a key range with otherwise default options
    pub fn range(start_key: Option<BinaryValue>, end_key: Option<BinaryValue>) -> Self {
        ScanOptions {
            start_key,
            end_key,
            ..Default::default()
        }
    }
}

/// Named parameters for an explicit table open. Tables are opened
/// on-demand with defaults; opening explicitly is only needed to supply
/// any of these.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOpenOptions {
    /// LRU block cache size in bytes
    pub lru_cache_size: Option<u64>,
    /// Table block size in bytes
    pub table_blocksize: Option<u64>,
    /// Write buffer size in bytes
    pub write_buffer_size: Option<u64>,
    /// Bloom filter bits per key; absent disables the bloom filter
    pub bloom_filter_bits_per_key: Option<u64>,
    pub merge_operator: MergeOperator,
    pub compression: CompressionMode,
}

/// A connection to a YakDB server over a pluggable transport
pub struct Connection<C: TransportContext> {
    // field order matters: the socket must drop before the context that
    // created it
    socket: Option<C::Socket>,
    context: C,
    role: Option<SocketRole>,
    endpoint_count: usize,
}

impl<C: TransportContext> Connection<C> {
    pub fn new(context: C) -> Self {
        Connection {
            context,
            socket: None,
            role: None,
            endpoint_count: 0,
        }
    }

    /// Put the connection into request/reply mode (the default that is
    /// materialized on first connect if no role was chosen)
    pub fn use_request_reply_mode(&mut self) -> Result<(), YakDbError> {
        self.set_role(SocketRole::RequestReply)
    }

    /// Put the connection into fire-and-forget push mode. Only put and
    /// delete are legal; no replies are consumed.
    pub fn use_push_mode(&mut self) -> Result<(), YakDbError> {
        self.set_role(SocketRole::Push)
    }

    /// Put the connection into publish mode. Like push, but the
    /// transport may fan the writes out to multiple subscribers.
    pub fn use_pub_mode(&mut self) -> Result<(), YakDbError> {
        self.set_role(SocketRole::Publish)
    }

    fn set_role(&mut self, role: SocketRole) -> Result<(), YakDbError> {
        self.socket = Some(self.context.socket(role)?);
        self.role = Some(role);
        // A fresh socket has no peers, whatever the old one had
        self.endpoint_count = 0;
        Ok(())
    }

    /// Connect to a server endpoint, e.g. `tcp://localhost:7100`
    pub fn connect(&mut self, endpoint: &str) -> Result<(), YakDbError> {
        if self.socket.is_none() {
            self.use_request_reply_mode()?;
        }
        debug!("connecting to {endpoint}");
        self.socket_mut()?.connect(endpoint)?;
        self.endpoint_count += 1;
        Ok(())
    }

    /// Connect to several endpoints at once
    pub fn connect_all(&mut self, endpoints: &[&str]) -> Result<(), YakDbError> {
        for endpoint in endpoints {
            self.connect(endpoint)?;
        }
        Ok(())
    }

    pub fn role(&self) -> Option<SocketRole> {
        self.role
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoint_count
    }

    fn socket_mut(&mut self) -> Result<&mut C::Socket, YakDbError> {
        self.socket.as_mut().ok_or_else(|| {
            YakDbError::ConnectionState(
                "Please connect to a server before sending requests (use connect())".to_string(),
            )
        })
    }

    pub(crate) fn check_connection(&self) -> Result<(), YakDbError> {
        if self.socket.is_none() {
            return Err(YakDbError::ConnectionState(
                "Please connect to a server before sending requests (use connect())".to_string(),
            ));
        }
        if self.endpoint_count == 0 {
            return Err(YakDbError::ConnectionState(
                "Connection is set up, but not connected. Please connect before sending requests"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn check_single_connection(&self) -> Result<(), YakDbError> {
        if self.endpoint_count > 1 {
            return Err(YakDbError::ConnectionState(format!(
                "This operation can only be executed with exactly one connection, but currently {} connections are active",
                self.endpoint_count
            )));
        }
        Ok(())
    }

    pub(crate) fn check_request_reply(&self) -> Result<(), YakDbError> {
        self.check_connection()?;
        match self.role {
            Some(role) if role.supports_request_reply() => Ok(()),
            _ => Err(YakDbError::ConnectionState(
                "Only request/reply connections support this message type".to_string(),
            )),
        }
    }

    /// Run a full request/reply cycle and validate the reply header
    fn request_reply(
        &mut self,
        request: Vec<Vec<u8>>,
        expected: RequestType,
    ) -> Result<Vec<Vec<u8>>, YakDbError> {
        let socket = self.socket_mut()?;
        socket.send_multipart(request)?;
        let reply = socket.recv_multipart()?;
        check_header_frame(&reply, Some(expected))?;
        Ok(reply)
    }

    /// Ask the server for its version string
    pub fn server_info(&mut self) -> Result<Vec<u8>, YakDbError> {
        self.check_request_reply()?;
        self.check_single_connection()?;
        let request = vec![write_header(RequestType::ServerInfo, 0x00, b"")];
        let reply = self.request_reply(request, RequestType::ServerInfo)?;
        reply
            .get(1)
            .cloned()
            .ok_or_else(|| YakDbError::Protocol("Server info reply has no version frame".to_string()))
    }

    /// Get the info key/value set for a single table
    pub fn table_info(
        &mut self,
        table_no: u32,
    ) -> Result<HashMap<Vec<u8>, Vec<u8>>, YakDbError> {
        self.check_request_reply()?;
        self.check_single_connection()?;
        let request = vec![
            write_header(RequestType::TableInfo, 0x00, b""),
            table_no_frame(table_no),
        ];
        let reply = self.request_reply(request, RequestType::TableInfo)?;
        Ok(reply[1..]
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect())
    }

    /// Open a table with explicit parameters. Opening is otherwise
    /// on-demand with server defaults; this is how non-default merge
    /// operators and compression modes are selected.
    pub fn open_table(
        &mut self,
        table_no: u32,
        options: &TableOpenOptions,
    ) -> Result<(), YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let request = build_open_table_request(table_no, options, b"");
        self.request_reply(request, RequestType::OpenTable)?;
        Ok(())
    }

    /// Close a table to free server memory. The reply is an ACK header
    /// only; any body is a protocol violation.
    pub fn close_table(&mut self, table_no: u32) -> Result<(), YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let request = vec![
            write_header(RequestType::CloseTable, 0x00, b""),
            table_no_frame(table_no),
        ];
        let reply = self.request_reply(request, RequestType::CloseTable)?;
        if reply.len() > 1 {
            return Err(YakDbError::Protocol(format!(
                "Close table reply carried {} unexpected body frames",
                reply.len() - 1
            )));
        }
        Ok(())
    }

    /// Compact a key range in a table. Potentially slow.
    pub fn compact_range(
        &mut self,
        table_no: u32,
        start_key: Option<&BinaryValue>,
        end_key: Option<&BinaryValue>,
    ) -> Result<(), YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let (start, end) = range_to_frames(start_key, end_key);
        let request = vec![
            write_header(RequestType::CompactRange, 0x00, b""),
            table_no_frame(table_no),
            start,
            end,
        ];
        self.request_reply(request, RequestType::CompactRange)?;
        Ok(())
    }

    /// Close and truncate a table, dropping all of its records
    pub fn truncate(&mut self, table_no: u32) -> Result<(), YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let request = vec![
            write_header(RequestType::TruncateTable, 0x00, b""),
            table_no_frame(table_no),
        ];
        self.request_reply(request, RequestType::TruncateTable)?;
        Ok(())
    }

    /// Ask the server process to stop. Use with caution.
    pub fn stop_server(&mut self) -> Result<(), YakDbError> {
        self.check_connection()?;
        let request = vec![write_header(RequestType::StopServer, 0x00, b"")];
        if self.role == Some(SocketRole::RequestReply) {
            self.request_reply(request, RequestType::StopServer)?;
        } else {
            self.socket_mut()?.send_multipart(request)?;
        }
        Ok(())
    }

    /// Read one value per key from a table. Absent keys yield an empty
    /// value, in the same position as their key.
    pub fn read(
        &mut self,
        table_no: u32,
        keys: &[BinaryValue],
    ) -> Result<Vec<Vec<u8>>, YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let request = build_read_request(table_no, keys, b"")?;
        let reply = self.request_reply(request, RequestType::Read)?;
        Ok(reply[1..].to_vec())
    }

    /// Like [Self::read], but returns a map from the converted key bytes
    /// back to the values
    pub fn read_map(
        &mut self,
        table_no: u32,
        keys: &[BinaryValue],
    ) -> Result<HashMap<Vec<u8>, Vec<u8>>, YakDbError> {
        let values = self.read(table_no, keys)?;
        Ok(keys
            .iter()
            .map(BinaryValue::to_bytes)
            .zip(values)
            .collect())
    }

    /// Count the records in a key range
    pub fn count(
        &mut self,
        table_no: u32,
        start_key: Option<&BinaryValue>,
        end_key: Option<&BinaryValue>,
    ) -> Result<u64, YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let (start, end) = range_to_frames(start_key, end_key);
        let request = vec![
            write_header(RequestType::Count, 0x00, b""),
            table_no_frame(table_no),
            start,
            end,
        ];
        let reply = self.request_reply(request, RequestType::Count)?;
        let count_frame = reply
            .get(1)
            .ok_or_else(|| YakDbError::Protocol("Count reply has no count frame".to_string()))?;
        read_u64_le(count_frame)
    }

    /// Check keys for existence. One bool per key, in key order.
    pub fn exists(
        &mut self,
        table_no: u32,
        keys: &[BinaryValue],
    ) -> Result<Vec<bool>, YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let request = build_exists_request(table_no, keys, b"")?;
        let reply = self.request_reply(request, RequestType::Exists)?;
        Ok(reply[1..]
            .iter()
            .map(|frame| frame.as_slice() != [0x00])
            .collect())
    }

    /// Scan a key range, returning key/value tuples in server order
    pub fn scan(
        &mut self,
        table_no: u32,
        options: &ScanOptions,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let request = build_scan_request(table_no, options, b"")?;
        let reply = self.request_reply(request, RequestType::Scan)?;
        Ok(map_scan_to_tuples(&reply[1..]))
    }

    /// Like [Self::scan], but collects the records into a map
    pub fn scan_map(
        &mut self,
        table_no: u32,
        options: &ScanOptions,
    ) -> Result<HashMap<Vec<u8>, Vec<u8>>, YakDbError> {
        Ok(self.scan(table_no, options)?.into_iter().collect())
    }

    /// Scan a key range, returning keys only
    pub fn list(
        &mut self,
        table_no: u32,
        options: &ScanOptions,
    ) -> Result<Vec<Vec<u8>>, YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let request = build_list_request(table_no, options, b"")?;
        let reply = self.request_reply(request, RequestType::List)?;
        Ok(reply[1..].to_vec())
    }

    /// Write key/value pairs to a table. An empty input is a no-op. In
    /// request/reply mode the ACK is awaited; on push and publish
    /// sockets the write is fire-and-forget.
    pub fn put(
        &mut self,
        table_no: u32,
        pairs: &[(BinaryValue, BinaryValue)],
        partsync: bool,
        fullsync: bool,
    ) -> Result<(), YakDbError> {
        self.check_connection()?;
        if pairs.is_empty() {
            return Ok(());
        }
        let request = build_put_request(table_no, pairs, partsync, fullsync, b"")?;
        if self.role == Some(SocketRole::RequestReply) {
            self.request_reply(request, RequestType::Put)?;
        } else {
            self.socket_mut()?.send_multipart(request)?;
        }
        Ok(())
    }

    /// Delete records by key. An empty key list is a no-op.
    pub fn delete(
        &mut self,
        table_no: u32,
        keys: &[BinaryValue],
        partsync: bool,
        fullsync: bool,
    ) -> Result<(), YakDbError> {
        self.check_single_connection()?;
        self.check_connection()?;
        if keys.is_empty() {
            return Ok(());
        }
        let request = build_delete_request(table_no, keys, partsync, fullsync, b"")?;
        if self.role == Some(SocketRole::RequestReply) {
            self.request_reply(request, RequestType::Delete)?;
        } else {
            self.socket_mut()?.send_multipart(request)?;
        }
        Ok(())
    }

    /// Delete a key range. Stops at the table end, `end_key` (exclusive)
    /// or after `limit` records, whichever fires first.
    pub fn delete_range(
        &mut self,
        table_no: u32,
        start_key: Option<&BinaryValue>,
        end_key: Option<&BinaryValue>,
        limit: Option<u64>,
    ) -> Result<(), YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let (start, end) = range_to_frames(start_key, end_key);
        let request = vec![
            write_header(RequestType::DeleteRange, 0x00, b""),
            table_no_frame(table_no),
            start,
            end,
            optional_u64_frame(limit),
        ];
        self.request_reply(request, RequestType::DeleteRange)?;
        Ok(())
    }

    /// Initialize a server-side passive job scanning the given range
    /// from a point-in-time snapshot. The returned job pulls data in
    /// chunks of `chunk_size` records.
    pub fn initialize_passive_job(
        &mut self,
        table_no: u32,
        chunk_size: Option<u32>,
        scan_limit: Option<u64>,
        start_key: Option<&BinaryValue>,
        end_key: Option<&BinaryValue>,
    ) -> Result<PassiveDataJob<'_, C>, YakDbError> {
        self.check_single_connection()?;
        self.check_request_reply()?;
        let (start, end) = range_to_frames(start_key, end_key);
        let request = vec![
            write_header(RequestType::InitializePassiveJob, 0x00, b""),
            table_no_frame(table_no),
            optional_u32_frame(chunk_size),
            optional_u64_frame(scan_limit),
            start,
            end,
        ];
        let reply = self.request_reply(request, RequestType::InitializePassiveJob)?;
        let apid_frame = reply.get(1).ok_or_else(|| {
            YakDbError::Protocol("Passive job response does not contain an APID frame".to_string())
        })?;
        let apid = read_i64_le(apid_frame)?;
        debug!("initialized passive job, APID {apid}");
        Ok(PassiveDataJob::new(self, apid))
    }

    /// Pull one data chunk from a passive job. An empty chunk means the
    /// job is exhausted and must not be polled again. Normally called
    /// through [PassiveDataJob::request_chunk].
    pub fn request_job_chunk(
        &mut self,
        apid: i64,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, YakDbError> {
        self.check_request_reply()?;
        let request = vec![
            write_header(RequestType::RequestJobChunk, 0x00, b""),
            u64_frame(apid as u64),
        ];
        let socket = self.socket_mut()?;
        socket.send_multipart(request)?;
        let reply = socket.recv_multipart()?;
        // Partial-data and no-data statuses also indicate success; the
        // data frames tell the caller whether to keep pulling
        check_chunk_header_frame(&reply)?;
        Ok(map_scan_to_tuples(&reply[1..]))
    }
}

pub(crate) fn build_open_table_request(
    table_no: u32,
    options: &TableOpenOptions,
    request_id: &[u8],
) -> Vec<Vec<u8>> {
    let mut request = vec![
        write_header(RequestType::OpenTable, 0x00, request_id),
        table_no_frame(table_no),
    ];
    let mut push_decimal = |name: &[u8], value: Option<u64>| {
        if let Some(value) = value {
            request.push(name.to_vec());
            request.push(value.to_string().into_bytes());
        }
    };
    push_decimal(b"LRUCacheSize", options.lru_cache_size);
    push_decimal(b"Blocksize", options.table_blocksize);
    push_decimal(b"WriteBufferSize", options.write_buffer_size);
    push_decimal(b"BloomFilterBitsPerKey", options.bloom_filter_bits_per_key);
    request.push(b"MergeOperator".to_vec());
    request.push(options.merge_operator.as_str().as_bytes().to_vec());
    request.push(b"CompressionMode".to_vec());
    request.push(options.compression.as_str().as_bytes().to_vec());
    request
}

pub(crate) fn build_read_request(
    table_no: u32,
    keys: &[BinaryValue],
    request_id: &[u8],
) -> Result<Vec<Vec<u8>>, YakDbError> {
    let key_frames = to_key_frames(keys)?;
    let mut request = vec![
        write_header(RequestType::Read, 0x00, request_id),
        table_no_frame(table_no),
    ];
    request.extend(key_frames);
    Ok(request)
}

pub(crate) fn build_exists_request(
    table_no: u32,
    keys: &[BinaryValue],
    request_id: &[u8],
) -> Result<Vec<Vec<u8>>, YakDbError> {
    let key_frames = to_key_frames(keys)?;
    let mut request = vec![
        write_header(RequestType::Exists, 0x00, request_id),
        table_no_frame(table_no),
    ];
    request.extend(key_frames);
    Ok(request)
}

fn build_scan_body(table_no: u32, options: &ScanOptions) -> Vec<Vec<u8>> {
    let (start, end) = range_to_frames(options.start_key.as_ref(), options.end_key.as_ref());
    vec![
        table_no_frame(table_no),
        optional_u64_frame(options.limit),
        start,
        end,
        options.key_filter.clone().unwrap_or_default(),
        options.value_filter.clone().unwrap_or_default(),
        u64_frame(options.skip),
    ]
}

pub(crate) fn build_scan_request(
    table_no: u32,
    options: &ScanOptions,
    request_id: &[u8],
) -> Result<Vec<Vec<u8>>, YakDbError> {
    let mut request = vec![write_scan_header(RequestType::Scan, options.invert, request_id)?];
    request.extend(build_scan_body(table_no, options));
    Ok(request)
}

pub(crate) fn build_list_request(
    table_no: u32,
    options: &ScanOptions,
    request_id: &[u8],
) -> Result<Vec<Vec<u8>>, YakDbError> {
    let mut request = vec![write_scan_header(RequestType::List, options.invert, request_id)?];
    request.extend(build_scan_body(table_no, options));
    Ok(request)
}

pub(crate) fn build_put_request(
    table_no: u32,
    pairs: &[(BinaryValue, BinaryValue)],
    partsync: bool,
    fullsync: bool,
    request_id: &[u8],
) -> Result<Vec<Vec<u8>>, YakDbError> {
    let mut request = vec![
        write_sync_header(RequestType::Put, partsync, fullsync, request_id)?,
        table_no_frame(table_no),
    ];
    for (key, value) in pairs {
        request.push(key.to_key_bytes()?);
        request.push(value.to_bytes());
    }
    Ok(request)
}

pub(crate) fn build_delete_request(
    table_no: u32,
    keys: &[BinaryValue],
    partsync: bool,
    fullsync: bool,
    request_id: &[u8],
) -> Result<Vec<Vec<u8>>, YakDbError> {
    let key_frames = to_key_frames(keys)?;
    let mut request = vec![
        write_sync_header(RequestType::Delete, partsync, fullsync, request_id)?,
        table_no_frame(table_no),
    ];
    request.extend(key_frames);
    Ok(request)
}
