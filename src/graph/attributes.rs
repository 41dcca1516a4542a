//! Attribute storage for graph entities.
//!
//! Basic attributes are serialized inline into the entity's own record
//! as a sequence of `key 0x1F value 0x1E` units. Extended attributes
//! live in their own table under `entityId 0x1D attributeKey`, so that
//! one contiguous range scan yields all extended attributes of an
//! entity without touching its (potentially large) values on normal
//! loads.

use std::collections::BTreeMap;

use crate::error::YakDbError;
use crate::graph::identifier::check_identifier;

/// Separates an attribute key from its value in a serialized set
pub const ATTR_KEY_SEPARATOR: u8 = 0x1F;
/// Terminates one key/value unit in a serialized set
pub const ATTR_RECORD_SEPARATOR: u8 = 0x1E;
/// Separates the entity id from the attribute key in an extended
/// attribute database key
pub const EXTENDED_ATTRIBUTE_SEPARATOR: u8 = 0x1D;

/// The inline attribute set of a node or edge
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BasicAttributes {
    attrs: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl BasicAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>) -> Self {
        BasicAttributes {
            attrs: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.attrs.get(key).map(Vec::as_slice)
    }

    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.attrs.remove(key)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<u8>)> {
        self.attrs.iter()
    }

    /// Serialize to the inline `key 0x1F value 0x1E` representation
    pub fn serialize(&self) -> Vec<u8> {
        let mut serialized = Vec::new();
        for (key, value) in &self.attrs {
            serialized.extend_from_slice(key);
            serialized.push(ATTR_KEY_SEPARATOR);
            serialized.extend_from_slice(value);
            serialized.push(ATTR_RECORD_SEPARATOR);
        }
        serialized
    }

    /// Parse a serialized attribute set. An empty input yields an empty
    /// set; anything not conforming to the `key 0x1F value 0x1E`
    /// pattern is rejected.
    pub fn parse(raw: &[u8]) -> Result<Self, YakDbError> {
        let mut attrs = BTreeMap::new();
        let mut rest = raw;
        while !rest.is_empty() {
            let key_end = rest
                .iter()
                .position(|&b| b == ATTR_KEY_SEPARATOR)
                .ok_or_else(|| {
                    YakDbError::PackingError(
                        "Attribute set is missing the key/value separator".to_string(),
                    )
                })?;
            let value_end = rest
                .iter()
                .position(|&b| b == ATTR_RECORD_SEPARATOR)
                .ok_or_else(|| {
                    YakDbError::PackingError(
                        "Attribute set is missing the record separator".to_string(),
                    )
                })?;
            if value_end < key_end {
                return Err(YakDbError::PackingError(
                    "Attribute record separator precedes the key/value separator".to_string(),
                ));
            }
            attrs.insert(
                rest[..key_end].to_vec(),
                rest[key_end + 1..value_end].to_vec(),
            );
            rest = &rest[value_end + 1..];
        }
        Ok(BasicAttributes { attrs })
    }
}

impl<const N: usize> From<[(&[u8], &[u8]); N]> for BasicAttributes {
    fn from(pairs: [(&[u8], &[u8]); N]) -> Self {
        BasicAttributes {
            attrs: pairs
                .into_iter()
                .map(|(key, value)| (key.to_vec(), value.to_vec()))
                .collect(),
        }
    }
}

/// Has an inline attribute set stored with the entity record itself
pub trait BasicAttributed {
    fn basic_attributes(&self) -> &BasicAttributes;
    fn basic_attributes_mut(&mut self) -> &mut BasicAttributes;
}

/// Has extended attributes stored in the extended attribute table under
/// the id this trait exposes
pub trait ExtendedAttributed {
    /// The database key prefix extended attributes of this entity are
    /// stored under (the node id, or the active key of an edge)
    fn attribute_owner_id(&self) -> Vec<u8>;
}

/// Database key of one extended attribute
pub fn extended_attribute_key(entity_id: &[u8], key: &[u8]) -> Result<Vec<u8>, YakDbError> {
    check_identifier(key)?;
    let mut db_key = Vec::with_capacity(entity_id.len() + 1 + key.len());
    db_key.extend_from_slice(entity_id);
    db_key.push(EXTENDED_ATTRIBUTE_SEPARATOR);
    db_key.extend_from_slice(key);
    Ok(db_key)
}

/// Extract the attribute key back out of an extended attribute database
/// key
pub fn attribute_key_from_db_key(db_key: &[u8]) -> Vec<u8> {
    match db_key
        .iter()
        .position(|&b| b == EXTENDED_ATTRIBUTE_SEPARATOR)
    {
        Some(idx) => db_key[idx + 1..].to_vec(),
        None => db_key.to_vec(),
    }
}

/// The scan range `[id 0x1D, id 0x1E)` covering every extended
/// attribute of an entity
pub fn entity_scan_keys(entity_id: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut start = entity_id.to_vec();
    start.push(EXTENDED_ATTRIBUTE_SEPARATOR);
    let mut end = entity_id.to_vec();
    end.push(EXTENDED_ATTRIBUTE_SEPARATOR + 1);
    (start, end)
}
