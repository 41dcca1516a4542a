use enum_iterator::Sequence;
use packed_struct::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The request/response discriminant carried in byte 2 of every header
/// frame. Requests and responses echo the same value; `0xFF` (a
/// response-only server protocol error) is deliberately not part of this
/// enum and is checked on the raw byte.
#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, Eq, PartialEq, Sequence)]
pub enum RequestType {
    ServerInfo = 0x00,
    OpenTable = 0x01,
    CloseTable = 0x02,
    CompactRange = 0x03,
    TruncateTable = 0x04,
    StopServer = 0x05,
    TableInfo = 0x06,
    Read = 0x10,
    Count = 0x11,
    Exists = 0x12,
    Scan = 0x13,
    List = 0x14,
    Put = 0x20,
    Delete = 0x21,
    DeleteRange = 0x22,
    InitializePassiveJob = 0x42,
    RequestJobChunk = 0x50,
}

impl From<RequestType> for u8 {
    #[inline]
    fn from(rt: RequestType) -> Self {
        rt as u8
    }
}

/// Socket roles a connection can take. The role decides which verbs are
/// legal: only `RequestReply` and `Dealer` can consume replies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketRole {
    RequestReply,
    Push,
    Publish,
    Dealer,
}

impl SocketRole {
    /// True for the two roles that can run a request/reply cycle
    pub fn supports_request_reply(self) -> bool {
        matches!(self, SocketRole::RequestReply | SocketRole::Dealer)
    }
}

impl Display for SocketRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SocketRole::RequestReply => "request/reply",
            SocketRole::Push => "push",
            SocketRole::Publish => "publish",
            SocketRole::Dealer => "dealer",
        })
    }
}

/// Block-level compression mode passed in the open-table parameter stream
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum CompressionMode {
    None,
    #[default]
    Snappy,
    Zlib,
    Bzip2,
    Lz4,
    Lz4hc,
}

impl CompressionMode {
    /// The wire spelling used in the `CompressionMode` open-table option
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionMode::None => "NONE",
            CompressionMode::Snappy => "SNAPPY",
            CompressionMode::Zlib => "ZLIB",
            CompressionMode::Bzip2 => "BZIP2",
            CompressionMode::Lz4 => "LZ4",
            CompressionMode::Lz4hc => "LZ4HC",
        }
    }
}

impl Display for CompressionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CompressionMode {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "NONE" => Ok(CompressionMode::None),
            "SNAPPY" => Ok(CompressionMode::Snappy),
            "ZLIB" => Ok(CompressionMode::Zlib),
            "BZIP2" => Ok(CompressionMode::Bzip2),
            "LZ4" => Ok(CompressionMode::Lz4),
            "LZ4HC" => Ok(CompressionMode::Lz4hc),
            _ => Err(format!("Unknown compression mode '{value}'")),
        }
    }
}

/// Server-side merge operator for a table. `NulAppend` is the one the
/// inverted index relies on for additive posting writes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum MergeOperator {
    #[default]
    Replace,
    Int64Add,
    DMul,
    Append,
    NulAppend,
}

impl MergeOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeOperator::Replace => "REPLACE",
            MergeOperator::Int64Add => "INT64ADD",
            MergeOperator::DMul => "DMUL",
            MergeOperator::Append => "APPEND",
            MergeOperator::NulAppend => "NULAPPEND",
        }
    }
}

impl Display for MergeOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MergeOperator {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "REPLACE" => Ok(MergeOperator::Replace),
            "INT64ADD" => Ok(MergeOperator::Int64Add),
            "DMUL" => Ok(MergeOperator::DMul),
            "APPEND" => Ok(MergeOperator::Append),
            "NULAPPEND" => Ok(MergeOperator::NulAppend),
            _ => Err(format!("Unknown merge operator '{value}'")),
        }
    }
}
