use crate::error::YakDbError;

/// Check whether a byte string is a valid graph identifier.
///
/// Identifiers (node ids, edge types, attribute keys) must consist of
/// bytes in `[0x20, 0xFE]`: everything below `0x20` is reserved for
/// structural separators and `0xFF` for lexicographic successor
/// computation. The empty identifier is valid.
pub fn is_identifier(id: &[u8]) -> bool {
    id.iter().all(|&byte| (0x20..=0xFE).contains(&byte))
}

/// Reject byte strings that are not valid identifiers
pub fn check_identifier(id: &[u8]) -> Result<(), YakDbError> {
    if !is_identifier(id) {
        return Err(YakDbError::Parameter(format!(
            "0x{} is not a valid identifier; its binary representation may only contain bytes in [0x20, 0xFE]",
            hex::encode(id)
        )));
    }
    Ok(())
}
