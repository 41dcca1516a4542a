//! Header and frame building blocks shared by every verb.
//!
//! A request or response header frame is at least 4 bytes: magic `0x31`,
//! protocol version `0x01`, the request type byte, and a status/flags
//! byte. Anything beyond offset 4 is an opaque request id that the
//! server echoes back verbatim.

use crate::conversion::BinaryValue;
use crate::enums::RequestType;
use crate::error::YakDbError;
use crate::{PROTOCOL_MAGIC, PROTOCOL_VERSION};
use packed_struct::prelude::*;

/// Byte 3 of a put/delete request header: bit 0 = partsync (subsequent
/// reads see the write), bit 1 = fullsync (synced to disk).
#[derive(Clone, Copy, Debug, Default, Eq, PackedStruct, PartialEq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct WriteFlags {
    #[packed_field(bits = "0")]
    pub partsync: bool,
    #[packed_field(bits = "1")]
    pub fullsync: bool,
}

/// Byte 3 of a scan/list request header: bit 0 inverts the direction
#[derive(Clone, Copy, Debug, Default, Eq, PackedStruct, PartialEq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct ScanFlags {
    #[packed_field(bits = "0")]
    pub invert: bool,
}

/// Build a header frame with an arbitrary flags byte
pub fn write_header(request_type: RequestType, flags: u8, request_id: &[u8]) -> Vec<u8> {
    let mut frame = vec![PROTOCOL_MAGIC, PROTOCOL_VERSION, request_type.into(), flags];
    frame.extend_from_slice(request_id);
    frame
}

/// Build a put/delete header frame carrying the write flags
pub fn write_sync_header(
    request_type: RequestType,
    partsync: bool,
    fullsync: bool,
    request_id: &[u8],
) -> Result<Vec<u8>, YakDbError> {
    let flags = WriteFlags { partsync, fullsync }.pack()?;
    Ok(write_header(request_type, flags[0], request_id))
}

/// Build a scan/list header frame carrying the direction flag
pub fn write_scan_header(
    request_type: RequestType,
    invert: bool,
    request_id: &[u8],
) -> Result<Vec<u8>, YakDbError> {
    let flags = ScanFlags { invert }.pack()?;
    Ok(write_header(request_type, flags[0], request_id))
}

/// Map a range endpoint pair to its two frames. An absent endpoint
/// becomes an empty frame, meaning start respectively end of table.
pub fn range_to_frames(
    start_key: Option<&BinaryValue>,
    end_key: Option<&BinaryValue>,
) -> (Vec<u8>, Vec<u8>) {
    let start = start_key.map(BinaryValue::to_bytes).unwrap_or_default();
    let end = end_key.map(BinaryValue::to_bytes).unwrap_or_default();
    (start, end)
}

/// 4-byte little-endian table number frame
pub fn table_no_frame(table_no: u32) -> Vec<u8> {
    table_no.to_le_bytes().to_vec()
}

/// 8-byte little-endian integer frame
pub fn u64_frame(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// 8-byte little-endian integer frame, or an empty frame for "no value"
pub fn optional_u64_frame(value: Option<u64>) -> Vec<u8> {
    value.map(|v| v.to_le_bytes().to_vec()).unwrap_or_default()
}

/// 4-byte little-endian integer frame, or an empty frame for "no value"
pub fn optional_u32_frame(value: Option<u32>) -> Vec<u8> {
    value.map(|v| v.to_le_bytes().to_vec()).unwrap_or_default()
}

/// Validate the header frame of a received reply.
///
/// Checks, in order: a reply was received at all, the header frame is at
/// least 4 bytes (with a diagnostic hint on whether the runt even looks
/// like a header), magic and version bytes, the `0xFF` server protocol
/// error marker, the expected request type, and the ACK status byte
/// (reporting the server's error string from the following frame when
/// present). Returns the opaque request id found beyond offset 4, if
/// any.
pub fn check_header_frame(
    frames: &[Vec<u8>],
    expected: Option<RequestType>,
) -> Result<Option<Vec<u8>>, YakDbError> {
    if frames.is_empty() {
        return Err(YakDbError::Protocol(
            "Received empty reply message".to_string(),
        ));
    }
    let header = &frames[0];
    if header.len() < 4 {
        let mut looks_like_a_header_frame = !header.is_empty();
        if (!header.is_empty() && header[0] != PROTOCOL_MAGIC)
            || (header.len() >= 2 && header[1] != PROTOCOL_VERSION)
        {
            looks_like_a_header_frame = false;
        }
        return Err(YakDbError::Protocol(format!(
            "Response header frame has size of {}, but expected size-4 frame, {}",
            header.len(),
            if looks_like_a_header_frame {
                "but it looks like some kind of header frame"
            } else {
                "it doesn't even look like a header frame"
            }
        )));
    }
    if header[0] != PROTOCOL_MAGIC {
        return Err(YakDbError::Protocol(format!(
            "Response header magic byte is 0x{:02X} instead of 0x{PROTOCOL_MAGIC:02X}",
            header[0]
        )));
    }
    if header[1] != PROTOCOL_VERSION {
        return Err(YakDbError::Protocol(format!(
            "Response header version byte is 0x{:02X} instead of 0x{PROTOCOL_VERSION:02X}",
            header[1]
        )));
    }
    if header[2] == 0xFF {
        return Err(YakDbError::Protocol(
            "Server responded with protocol error".to_string(),
        ));
    }
    if let Some(expected) = expected {
        if header[2] != u8::from(expected) {
            return Err(YakDbError::Protocol(format!(
                "Response code received from server is 0x{:02X} instead of 0x{:02X}",
                header[2],
                u8::from(expected)
            )));
        }
    }
    if header[3] != 0x00 {
        let error_msg = frames
            .get(1)
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .unwrap_or_else(|| "<Unknown>".to_string());
        return Err(YakDbError::Protocol(format!(
            "Response status code is 0x{:02X} instead of 0x00 (ACK), error message: {error_msg}",
            header[3]
        )));
    }
    if header.len() > 4 {
        return Ok(Some(header[4..].to_vec()));
    }
    Ok(None)
}

/// Header check for job chunk replies, where status `0x01` (partial) and
/// `0x02` (no data) also indicate success. The caller inspects the data
/// frames to decide whether more chunks remain.
pub fn check_chunk_header_frame(frames: &[Vec<u8>]) -> Result<Option<Vec<u8>>, YakDbError> {
    if let Some(header) = frames.first() {
        if header.len() >= 4 && (header[3] == 0x01 || header[3] == 0x02) {
            let mut normalized = header.clone();
            normalized[3] = 0x00;
            let mut patched: Vec<Vec<u8>> = Vec::with_capacity(frames.len());
            patched.push(normalized);
            patched.extend(frames.iter().skip(1).cloned());
            return check_header_frame(&patched, Some(RequestType::RequestJobChunk));
        }
    }
    check_header_frame(frames, Some(RequestType::RequestJobChunk))
}

/// Map reply data frames (header stripped) to key/value tuples in server
/// order
pub fn map_scan_to_tuples(data_frames: &[Vec<u8>]) -> Vec<(Vec<u8>, Vec<u8>)> {
    data_frames
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}
