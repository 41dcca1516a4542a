//! The asynchronous, dealer-role connection.
//!
//! Unlike the request/reply connection, the dealer socket does not pair
//! each send with a blocking receive. Every outgoing request carries a
//! 4-byte little-endian request id appended to the header; the server
//! echoes it back verbatim, and replies may arrive in any order. The
//! event loop that owns the socket reads multipart messages and feeds
//! them into [DealerConnection::dispatch], which correlates them with
//! the pending request and completes the [ReplyHandle] returned at send
//! time.
//!
//! The whole arrangement is single-threaded cooperative: one loop drives
//! sends and dispatch, and multiple requests may be in flight at once.
//! Dropping a [ReplyHandle] (or calling [DealerConnection::forget])
//! cancels a request; the eventual reply is then silently discarded.

use std::collections::HashMap;

use log::debug;
use tokio::sync::oneshot;

use crate::connection::{
    ScanOptions, TableOpenOptions, build_delete_request, build_exists_request,
    build_list_request, build_open_table_request, build_put_request, build_read_request,
    build_scan_request,
};
use crate::conversion::{BinaryValue, read_i64_le, read_u32_le, read_u64_le};
use crate::enums::{RequestType, SocketRole};
use crate::error::YakDbError;
use crate::frames::{
    check_chunk_header_frame, check_header_frame, map_scan_to_tuples, optional_u32_frame,
    optional_u64_frame, range_to_frames, table_no_frame, u64_frame, write_header,
};
use crate::transport::{TransportContext, TransportSocket};

/// A reply payload, shaped according to the verb that produced it
#[derive(Debug, PartialEq)]
pub enum AsyncReply {
    /// Header-only acknowledgement (writes, admin verbs)
    Ack,
    /// Server version string
    ServerInfo(Vec<u8>),
    /// Table info key/value set
    TableInfo(HashMap<Vec<u8>, Vec<u8>>),
    /// One value frame per requested key (read)
    Values(Vec<Vec<u8>>),
    /// Requested keys mapped to their values (read with key mapping)
    ValueMap(HashMap<Vec<u8>, Vec<u8>>),
    /// One existence flag per requested key
    Bools(Vec<bool>),
    /// Record count in a range
    Count(u64),
    /// Scanned key/value tuples in server order
    Records(Vec<(Vec<u8>, Vec<u8>)>),
    /// Scanned records collected into a map
    RecordMap(HashMap<Vec<u8>, Vec<u8>>),
    /// Listed keys
    Keys(Vec<Vec<u8>>),
    /// APID of a freshly initialized passive job
    Apid(i64),
    /// One passive-job data chunk; empty means the job is exhausted
    Chunk(Vec<(Vec<u8>, Vec<u8>)>),
}

enum ReplyShape {
    Ack,
    ServerInfo,
    TableInfo,
    Values,
    ValueMap(Vec<Vec<u8>>),
    Bools,
    Count,
    Records,
    RecordMap,
    Keys,
    Apid,
    Chunk,
}

struct PendingRequest {
    verb: RequestType,
    shape: ReplyShape,
    tx: oneshot::Sender<Result<AsyncReply, YakDbError>>,
}

/// Awaitable handle for one in-flight request. Dropping it cancels the
/// request from the caller's point of view.
pub struct ReplyHandle {
    request_id: u32,
    rx: oneshot::Receiver<Result<AsyncReply, YakDbError>>,
}

impl ReplyHandle {
    /// The request id correlating this handle with its reply
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Wait for the reply. Resolves when the event loop dispatches the
    /// matching message.
    pub async fn recv(self) -> Result<AsyncReply, YakDbError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(YakDbError::ConnectionState(
                "Request was dropped before a reply arrived".to_string(),
            )),
        }
    }

    /// Non-blocking poll for callback-style event loops without an
    /// async runtime. Returns `None` while the reply is outstanding.
    pub fn try_recv(&mut self) -> Option<Result<AsyncReply, YakDbError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(YakDbError::ConnectionState(
                "Request was dropped before a reply arrived".to_string(),
            ))),
        }
    }
}

/// A dealer-mode connection supporting multiple in-flight requests
pub struct DealerConnection<C: TransportContext> {
    // field order matters: the socket must drop before the context that
    // created it
    socket: Option<C::Socket>,
    #[allow(dead_code)]
    context: C,
    endpoint_count: usize,
    pending: HashMap<u32, PendingRequest>,
    next_request_id: u32,
}

impl<C: TransportContext> DealerConnection<C> {
    /// Create a dealer connection. A random 8-byte socket identity is
    /// set so the server can route replies back.
    pub fn new(context: C) -> Result<Self, YakDbError> {
        let mut context = context;
        let mut socket = context.socket(SocketRole::Dealer)?;
        let identity: u64 = rand::random();
        socket.set_identity(&identity.to_le_bytes())?;
        Ok(DealerConnection {
            context,
            socket: Some(socket),
            endpoint_count: 0,
            pending: HashMap::new(),
            next_request_id: 0,
        })
    }

    /// Connect to a server endpoint, e.g. `tcp://localhost:7100`
    pub fn connect(&mut self, endpoint: &str) -> Result<(), YakDbError> {
        debug!("connecting dealer to {endpoint}");
        self.socket_mut()?.connect(endpoint)?;
        self.endpoint_count += 1;
        Ok(())
    }

    /// Number of requests awaiting a reply
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Drop a pending request by id. The eventual reply will be
    /// silently discarded. Returns whether the id was known.
    pub fn forget(&mut self, request_id: u32) -> bool {
        self.pending.remove(&request_id).is_some()
    }

    fn socket_mut(&mut self) -> Result<&mut C::Socket, YakDbError> {
        self.socket.as_mut().ok_or_else(|| {
            YakDbError::ConnectionState(
                "Please connect to a server before sending requests (use connect())".to_string(),
            )
        })
    }

    fn check_connection(&self) -> Result<(), YakDbError> {
        if self.socket.is_none() || self.endpoint_count == 0 {
            return Err(YakDbError::ConnectionState(
                "Connection is set up, but not connected. Please connect before sending requests"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn take_request_id(&mut self) -> u32 {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.next_request_id
    }

    /// Register a pending entry and push the frames out, with the empty
    /// delimiter frame the dealer role requires
    fn submit(
        &mut self,
        verb: RequestType,
        shape: ReplyShape,
        request_id: u32,
        request: Vec<Vec<u8>>,
    ) -> Result<ReplyHandle, YakDbError> {
        let mut frames = Vec::with_capacity(request.len() + 1);
        frames.push(Vec::new());
        frames.extend(request);
        self.socket_mut()?.send_multipart(frames)?;
        let (tx, rx) = oneshot::channel();
        self.pending
            .insert(request_id, PendingRequest { verb, shape, tx });
        Ok(ReplyHandle { request_id, rx })
    }

    /// Feed one received multipart message into the connection. Called
    /// by the event loop that owns the socket's receive side.
    ///
    /// Errors that can be correlated to an in-flight request complete
    /// that request's handle; only messages too malformed to carry a
    /// request id are returned as errors here.
    pub fn dispatch(&mut self, frames: Vec<Vec<u8>>) -> Result<(), YakDbError> {
        let Some(delimiter) = frames.first() else {
            return Err(YakDbError::Protocol(
                "Received empty reply message".to_string(),
            ));
        };
        if !delimiter.is_empty() {
            return Err(YakDbError::Protocol(
                "Dealer reply is missing the empty delimiter frame".to_string(),
            ));
        }
        let msg = &frames[1..];
        let header = msg.first().ok_or_else(|| {
            YakDbError::Protocol("Dealer reply contains no header frame".to_string())
        })?;
        if header.len() < 4 {
            return Err(YakDbError::Protocol(format!(
                "Response header frame has size of {}, but expected size-4 frame",
                header.len()
            )));
        }
        let request_id = read_u32_le(&header[4..])?;
        let Some(pending) = self.pending.remove(&request_id) else {
            debug!("discarding reply for unknown request id {request_id}");
            return Ok(());
        };
        let checked = if pending.verb == RequestType::RequestJobChunk {
            check_chunk_header_frame(msg)
        } else {
            check_header_frame(msg, Some(pending.verb))
        };
        let result = checked.and_then(|_| shape_reply(&pending.shape, &msg[1..]));
        // A dropped handle means the caller lost interest; the reply is
        // discarded without further notice
        let _ = pending.tx.send(result);
        Ok(())
    }

    pub fn server_info(&mut self) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = vec![write_header(RequestType::ServerInfo, 0x00, &id.to_le_bytes())];
        self.submit(RequestType::ServerInfo, ReplyShape::ServerInfo, id, request)
    }

    pub fn table_info(&mut self, table_no: u32) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = vec![
            write_header(RequestType::TableInfo, 0x00, &id.to_le_bytes()),
            table_no_frame(table_no),
        ];
        self.submit(RequestType::TableInfo, ReplyShape::TableInfo, id, request)
    }

    pub fn open_table(
        &mut self,
        table_no: u32,
        options: &TableOpenOptions,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = build_open_table_request(table_no, options, &id.to_le_bytes());
        self.submit(RequestType::OpenTable, ReplyShape::Ack, id, request)
    }

    pub fn close_table(&mut self, table_no: u32) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = vec![
            write_header(RequestType::CloseTable, 0x00, &id.to_le_bytes()),
            table_no_frame(table_no),
        ];
        self.submit(RequestType::CloseTable, ReplyShape::Ack, id, request)
    }

    pub fn compact_range(
        &mut self,
        table_no: u32,
        start_key: Option<&BinaryValue>,
        end_key: Option<&BinaryValue>,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let (start, end) = range_to_frames(start_key, end_key);
        let request = vec![
            write_header(RequestType::CompactRange, 0x00, &id.to_le_bytes()),
            table_no_frame(table_no),
            start,
            end,
        ];
        self.submit(RequestType::CompactRange, ReplyShape::Ack, id, request)
    }

    pub fn truncate(&mut self, table_no: u32) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = vec![
            write_header(RequestType::TruncateTable, 0x00, &id.to_le_bytes()),
            table_no_frame(table_no),
        ];
        self.submit(RequestType::TruncateTable, ReplyShape::Ack, id, request)
    }

    pub fn stop_server(&mut self) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = vec![write_header(RequestType::StopServer, 0x00, &id.to_le_bytes())];
        self.submit(RequestType::StopServer, ReplyShape::Ack, id, request)
    }

    pub fn read(
        &mut self,
        table_no: u32,
        keys: &[BinaryValue],
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = build_read_request(table_no, keys, &id.to_le_bytes())?;
        self.submit(RequestType::Read, ReplyShape::Values, id, request)
    }

    /// Like [Self::read], but the reply maps the converted key bytes
    /// back to their values
    pub fn read_map(
        &mut self,
        table_no: u32,
        keys: &[BinaryValue],
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = build_read_request(table_no, keys, &id.to_le_bytes())?;
        let converted = keys.iter().map(BinaryValue::to_bytes).collect();
        self.submit(RequestType::Read, ReplyShape::ValueMap(converted), id, request)
    }

    pub fn count(
        &mut self,
        table_no: u32,
        start_key: Option<&BinaryValue>,
        end_key: Option<&BinaryValue>,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let (start, end) = range_to_frames(start_key, end_key);
        let request = vec![
            write_header(RequestType::Count, 0x00, &id.to_le_bytes()),
            table_no_frame(table_no),
            start,
            end,
        ];
        self.submit(RequestType::Count, ReplyShape::Count, id, request)
    }

    pub fn exists(
        &mut self,
        table_no: u32,
        keys: &[BinaryValue],
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = build_exists_request(table_no, keys, &id.to_le_bytes())?;
        self.submit(RequestType::Exists, ReplyShape::Bools, id, request)
    }

    pub fn scan(
        &mut self,
        table_no: u32,
        options: &ScanOptions,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = build_scan_request(table_no, options, &id.to_le_bytes())?;
        self.submit(RequestType::Scan, ReplyShape::Records, id, request)
    }

    /// Like [Self::scan], but the reply collects the records into a map
    pub fn scan_map(
        &mut self,
        table_no: u32,
        options: &ScanOptions,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = build_scan_request(table_no, options, &id.to_le_bytes())?;
        self.submit(RequestType::Scan, ReplyShape::RecordMap, id, request)
    }

    pub fn list(
        &mut self,
        table_no: u32,
        options: &ScanOptions,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = build_list_request(table_no, options, &id.to_le_bytes())?;
        self.submit(RequestType::List, ReplyShape::Keys, id, request)
    }

    /// Write key/value pairs. An empty input resolves to an immediate
    /// ACK without touching the transport.
    pub fn put(
        &mut self,
        table_no: u32,
        pairs: &[(BinaryValue, BinaryValue)],
        partsync: bool,
        fullsync: bool,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        if pairs.is_empty() {
            return Ok(resolved_handle(0, Ok(AsyncReply::Ack)));
        }
        let id = self.take_request_id();
        let request = build_put_request(table_no, pairs, partsync, fullsync, &id.to_le_bytes())?;
        self.submit(RequestType::Put, ReplyShape::Ack, id, request)
    }

    pub fn delete(
        &mut self,
        table_no: u32,
        keys: &[BinaryValue],
        partsync: bool,
        fullsync: bool,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        if keys.is_empty() {
            return Ok(resolved_handle(0, Ok(AsyncReply::Ack)));
        }
        let id = self.take_request_id();
        let request = build_delete_request(table_no, keys, partsync, fullsync, &id.to_le_bytes())?;
        self.submit(RequestType::Delete, ReplyShape::Ack, id, request)
    }

    pub fn delete_range(
        &mut self,
        table_no: u32,
        start_key: Option<&BinaryValue>,
        end_key: Option<&BinaryValue>,
        limit: Option<u64>,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let (start, end) = range_to_frames(start_key, end_key);
        let request = vec![
            write_header(RequestType::DeleteRange, 0x00, &id.to_le_bytes()),
            table_no_frame(table_no),
            start,
            end,
            optional_u64_frame(limit),
        ];
        self.submit(RequestType::DeleteRange, ReplyShape::Ack, id, request)
    }

    pub fn initialize_passive_job(
        &mut self,
        table_no: u32,
        chunk_size: Option<u32>,
        scan_limit: Option<u64>,
        start_key: Option<&BinaryValue>,
        end_key: Option<&BinaryValue>,
    ) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let (start, end) = range_to_frames(start_key, end_key);
        let request = vec![
            write_header(RequestType::InitializePassiveJob, 0x00, &id.to_le_bytes()),
            table_no_frame(table_no),
            optional_u32_frame(chunk_size),
            optional_u64_frame(scan_limit),
            start,
            end,
        ];
        self.submit(RequestType::InitializePassiveJob, ReplyShape::Apid, id, request)
    }

    pub fn request_job_chunk(&mut self, apid: i64) -> Result<ReplyHandle, YakDbError> {
        self.check_connection()?;
        let id = self.take_request_id();
        let request = vec![
            write_header(RequestType::RequestJobChunk, 0x00, &id.to_le_bytes()),
            u64_frame(apid as u64),
        ];
        self.submit(RequestType::RequestJobChunk, ReplyShape::Chunk, id, request)
    }
}

fn resolved_handle(request_id: u32, result: Result<AsyncReply, YakDbError>) -> ReplyHandle {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(result);
    ReplyHandle { request_id, rx }
}

fn shape_reply(shape: &ReplyShape, data: &[Vec<u8>]) -> Result<AsyncReply, YakDbError> {
    Ok(match shape {
        ReplyShape::Ack => AsyncReply::Ack,
        ReplyShape::ServerInfo => AsyncReply::ServerInfo(
            data.first()
                .cloned()
                .ok_or_else(|| {
                    YakDbError::Protocol("Server info reply has no version frame".to_string())
                })?,
        ),
        ReplyShape::TableInfo => AsyncReply::TableInfo(
            data.chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect(),
        ),
        ReplyShape::Values => AsyncReply::Values(data.to_vec()),
        ReplyShape::ValueMap(keys) => AsyncReply::ValueMap(
            keys.iter().cloned().zip(data.iter().cloned()).collect(),
        ),
        ReplyShape::Bools => AsyncReply::Bools(
            data.iter().map(|frame| frame.as_slice() != [0x00]).collect(),
        ),
        ReplyShape::Count => AsyncReply::Count(read_u64_le(data.first().ok_or_else(|| {
            YakDbError::Protocol("Count reply has no count frame".to_string())
        })?)?),
        ReplyShape::Records => AsyncReply::Records(map_scan_to_tuples(data)),
        ReplyShape::RecordMap => {
            AsyncReply::RecordMap(map_scan_to_tuples(data).into_iter().collect())
        }
        ReplyShape::Keys => AsyncReply::Keys(data.to_vec()),
        ReplyShape::Apid => AsyncReply::Apid(read_i64_le(data.first().ok_or_else(|| {
            YakDbError::Protocol("Passive job response does not contain an APID frame".to_string())
        })?)?),
        ReplyShape::Chunk => AsyncReply::Chunk(map_scan_to_tuples(data)),
    })
}
