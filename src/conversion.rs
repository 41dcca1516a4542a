//! Canonical scalar-to-binary conversion.
//!
//! Every key or value handed to a verb goes through [BinaryValue] first,
//! so the mapping to wire bytes is decided in exactly one place:
//! unsigned 32-bit integers become 4 little-endian bytes, signed 64-bit
//! integers and doubles become 8, text becomes UTF-8 and byte strings
//! pass through untouched.

use crate::error::YakDbError;
use serde::{Deserialize, Serialize};

/// A scalar the client knows how to map to wire bytes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BinaryValue {
    /// Packed to 4 bytes little-endian (table numbers, request ids)
    U32(u32),
    /// Packed to 8 bytes little-endian
    I64(i64),
    /// IEEE 754 double, 8 bytes little-endian
    F64(f64),
    /// UTF-8 bytes
    Text(String),
    /// Passed through unchanged
    Bytes(Vec<u8>),
}

impl BinaryValue {
    /// The canonical wire representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            BinaryValue::U32(value) => value.to_le_bytes().to_vec(),
            BinaryValue::I64(value) => value.to_le_bytes().to_vec(),
            BinaryValue::F64(value) => value.to_le_bytes().to_vec(),
            BinaryValue::Text(value) => value.as_bytes().to_vec(),
            BinaryValue::Bytes(value) => value.clone(),
        }
    }

    /// Like [Self::to_bytes] but rejects values that would produce an
    /// empty frame. Keys must be non-empty byte strings; an empty frame
    /// already means "start/end of table" in range positions.
    pub fn to_key_bytes(&self) -> Result<Vec<u8>, YakDbError> {
        let bytes = self.to_bytes();
        if bytes.is_empty() {
            return Err(YakDbError::Parameter(
                "Empty value can't be used as key material".to_string(),
            ));
        }
        Ok(bytes)
    }
}

impl From<u32> for BinaryValue {
    fn from(value: u32) -> Self {
        BinaryValue::U32(value)
    }
}

impl From<i64> for BinaryValue {
    fn from(value: i64) -> Self {
        BinaryValue::I64(value)
    }
}

impl From<f64> for BinaryValue {
    fn from(value: f64) -> Self {
        BinaryValue::F64(value)
    }
}

impl From<&str> for BinaryValue {
    fn from(value: &str) -> Self {
        BinaryValue::Text(value.to_string())
    }
}

impl From<String> for BinaryValue {
    fn from(value: String) -> Self {
        BinaryValue::Text(value)
    }
}

impl From<Vec<u8>> for BinaryValue {
    fn from(value: Vec<u8>) -> Self {
        BinaryValue::Bytes(value)
    }
}

impl From<&[u8]> for BinaryValue {
    fn from(value: &[u8]) -> Self {
        BinaryValue::Bytes(value.to_vec())
    }
}

/// Convert a sequence of scalars into one frame per element. This is the
/// "one level of iterable input" rule: the elements themselves must be
/// scalars, nesting deeper is not representable.
pub fn to_key_frames(values: &[BinaryValue]) -> Result<Vec<Vec<u8>>, YakDbError> {
    values.iter().map(BinaryValue::to_key_bytes).collect()
}

/// Read back an 8-byte little-endian unsigned integer from a reply frame
pub fn read_u64_le(frame: &[u8]) -> Result<u64, YakDbError> {
    let bytes: [u8; 8] = frame.try_into().map_err(|_| {
        YakDbError::Protocol(format!(
            "Expected 8-byte integer frame but got {} bytes",
            frame.len()
        ))
    })?;
    Ok(u64::from_le_bytes(bytes))
}

/// Read back an 8-byte little-endian signed integer (APIDs)
pub fn read_i64_le(frame: &[u8]) -> Result<i64, YakDbError> {
    let bytes: [u8; 8] = frame.try_into().map_err(|_| {
        YakDbError::Protocol(format!(
            "Expected 8-byte integer frame but got {} bytes",
            frame.len()
        ))
    })?;
    Ok(i64::from_le_bytes(bytes))
}

/// Read back a 4-byte little-endian unsigned integer (request ids)
pub fn read_u32_le(frame: &[u8]) -> Result<u32, YakDbError> {
    let bytes: [u8; 4] = frame.try_into().map_err(|_| {
        YakDbError::Protocol(format!(
            "Expected 4-byte integer frame but got {} bytes",
            frame.len()
        ))
    })?;
    Ok(u32::from_le_bytes(bytes))
}

/// Read back an 8-byte little-endian IEEE 754 double
pub fn read_f64_le(frame: &[u8]) -> Result<f64, YakDbError> {
    let bytes: [u8; 8] = frame.try_into().map_err(|_| {
        YakDbError::Protocol(format!(
            "Expected 8-byte float frame but got {} bytes",
            frame.len()
        ))
    })?;
    Ok(f64::from_le_bytes(bytes))
}
