//! Directed edges and their mirror-key encoding.
//!
//! Every edge is written twice into the edge table with the same value:
//! the active key `type 0x1F source 0x0E target` and the passive key
//! `type 0x1F target 0x0F source`. Because `0x0E < 0x0F < 0x10` and
//! identifier bytes are all `>= 0x20`, the outgoing, incoming and
//! combined adjacency of a node are each one contiguous key range.

use crate::error::YakDbError;
use crate::graph::attributes::{BasicAttributed, BasicAttributes, ExtendedAttributed};
use crate::graph::identifier::check_identifier;

/// Separates the edge type from the node pair in an edge key
pub const EDGE_TYPE_SEPARATOR: u8 = 0x1F;
/// Marks the source→target direction in an active edge key
pub const EDGE_OUT_MARKER: u8 = 0x0E;
/// Marks the target→source direction in a passive edge key
pub const EDGE_IN_MARKER: u8 = 0x0F;
/// Exclusive upper bound byte for scanning a node's full adjacency
pub const EDGE_RANGE_TERMINATOR: u8 = 0x10;

/// A directed edge between two nodes
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Edge {
    pub source: Vec<u8>,
    pub target: Vec<u8>,
    pub edge_type: Vec<u8>,
    pub basic_attributes: BasicAttributes,
}

impl Edge {
    /// Create an edge value without writing it; use
    /// [crate::graph::Graph::create_edge] to create and save in one
    /// step
    pub fn new(
        source: impl Into<Vec<u8>>,
        target: impl Into<Vec<u8>>,
        edge_type: impl Into<Vec<u8>>,
        basic_attributes: BasicAttributes,
    ) -> Result<Self, YakDbError> {
        let source = source.into();
        let target = target.into();
        let edge_type = edge_type.into();
        check_identifier(&source)?;
        check_identifier(&target)?;
        check_identifier(&edge_type)?;
        Ok(Edge {
            source,
            target,
            edge_type,
            basic_attributes,
        })
    }

    /// The source-side database key, `type 0x1F source 0x0E target`.
    /// Extended attributes of an edge are keyed off this one.
    pub fn active_key(&self) -> Vec<u8> {
        let mut key = self.edge_type.clone();
        key.push(EDGE_TYPE_SEPARATOR);
        key.extend_from_slice(&self.source);
        key.push(EDGE_OUT_MARKER);
        key.extend_from_slice(&self.target);
        key
    }

    /// The target-side mirror key, `type 0x1F target 0x0F source`
    pub fn passive_key(&self) -> Vec<u8> {
        let mut key = self.edge_type.clone();
        key.push(EDGE_TYPE_SEPARATOR);
        key.extend_from_slice(&self.target);
        key.push(EDGE_IN_MARKER);
        key.extend_from_slice(&self.source);
        key
    }

    fn scan_key(node_id: &[u8], edge_type: &[u8], marker: u8) -> Vec<u8> {
        let mut key = edge_type.to_vec();
        key.push(EDGE_TYPE_SEPARATOR);
        key.extend_from_slice(node_id);
        key.push(marker);
        key
    }

    /// Scan range covering ALL edges of a node, active and passive
    pub fn all_edges_scan_keys(node_id: &[u8], edge_type: &[u8]) -> (Vec<u8>, Vec<u8>) {
        (
            Self::scan_key(node_id, edge_type, EDGE_OUT_MARKER),
            Self::scan_key(node_id, edge_type, EDGE_RANGE_TERMINATOR),
        )
    }

    /// Scan range covering the outgoing edges of a node
    pub fn outgoing_edges_scan_keys(node_id: &[u8], edge_type: &[u8]) -> (Vec<u8>, Vec<u8>) {
        (
            Self::scan_key(node_id, edge_type, EDGE_OUT_MARKER),
            Self::scan_key(node_id, edge_type, EDGE_IN_MARKER),
        )
    }

    /// Scan range covering the incoming edges of a node
    pub fn incoming_edges_scan_keys(node_id: &[u8], edge_type: &[u8]) -> (Vec<u8>, Vec<u8>) {
        (
            Self::scan_key(node_id, edge_type, EDGE_IN_MARKER),
            Self::scan_key(node_id, edge_type, EDGE_RANGE_TERMINATOR),
        )
    }

    /// Deserialize an edge database key (either mirror) back into
    /// `(source, target, type)`
    pub fn deserialize_edge(key: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), YakDbError> {
        let type_end = key
            .iter()
            .position(|&b| b == EDGE_TYPE_SEPARATOR)
            .ok_or_else(|| {
                YakDbError::PackingError(
                    "Could not find the type separator in an edge key".to_string(),
                )
            })?;
        let edge_type = key[..type_end].to_vec();
        let nodes = &key[type_end + 1..];
        let out_idx = nodes.iter().position(|&b| b == EDGE_OUT_MARKER);
        let in_idx = nodes.iter().position(|&b| b == EDGE_IN_MARKER);
        let (split, is_incoming) = match (out_idx, in_idx) {
            (Some(idx), _) => (idx, false),
            (None, Some(idx)) => (idx, true),
            (None, None) => {
                return Err(YakDbError::PackingError(
                    "Could not find the OUT or IN separator in an edge key".to_string(),
                ));
            }
        };
        let first = nodes[..split].to_vec();
        let second = nodes[split + 1..].to_vec();
        if is_incoming {
            Ok((second, first, edge_type))
        } else {
            Ok((first, second, edge_type))
        }
    }
}

impl BasicAttributed for Edge {
    fn basic_attributes(&self) -> &BasicAttributes {
        &self.basic_attributes
    }

    fn basic_attributes_mut(&mut self) -> &mut BasicAttributes {
        &mut self.basic_attributes
    }
}

impl ExtendedAttributed for Edge {
    fn attribute_owner_id(&self) -> Vec<u8> {
        self.active_key()
    }
}
