//! Directed graph overlay over three YakDB tables.
//!
//! Nodes live in the node table keyed by id with their basic attribute
//! set as value. Edges are mirrored into the edge table as an active
//! and a passive record (see [edge]) sharing one value, which is what
//! makes every adjacency question a single contiguous range scan.
//! Extended attributes of both kinds of entity live in a third table
//! under `entityId 0x1D attributeKey`.
//!
//! Node ids never contain `0x1F` (identifier bytes are `>= 0x20`), so a
//! graph may share its node table with the edge table; node scans
//! filter out the `0x1F`-bearing edge keys.

pub mod attributes;
pub mod edge;
pub mod identifier;
pub mod iterators;
pub mod node;

use std::collections::HashMap;

use crate::connection::{Connection, ScanOptions};
use crate::conversion::BinaryValue;
use crate::error::YakDbError;
use crate::graph::attributes::{
    BasicAttributes, attribute_key_from_db_key, entity_scan_keys, extended_attribute_key,
};
use crate::graph::edge::{EDGE_TYPE_SEPARATOR, Edge};
use crate::graph::identifier::check_identifier;
use crate::graph::iterators::NodeIterator;
use crate::graph::node::Node;
use crate::iterators::KeyValueIterator;
use crate::transport::TransportContext;

pub const DEFAULT_NODE_TABLE: u32 = 2;
pub const DEFAULT_EDGE_TABLE: u32 = 3;
pub const DEFAULT_EXTENDED_ATTRIBUTE_TABLE: u32 = 4;

/// A directed graph stored as adjacency records in YakDB tables
pub struct Graph<'a, C: TransportContext> {
    conn: &'a mut Connection<C>,
    node_table_no: u32,
    edge_table_no: u32,
    ext_attr_table_no: u32,
    /// Whether writes carry the partsync flag, guaranteeing that reads
    /// directly following them see the written value. On by default;
    /// clearing it trades that guarantee for write latency.
    pub partsync: bool,
}

impl<'a, C: TransportContext> Graph<'a, C> {
    pub fn new(conn: &'a mut Connection<C>) -> Self {
        Self::with_tables(
            conn,
            DEFAULT_NODE_TABLE,
            DEFAULT_EDGE_TABLE,
            DEFAULT_EXTENDED_ATTRIBUTE_TABLE,
        )
    }

    pub fn with_tables(
        conn: &'a mut Connection<C>,
        node_table_no: u32,
        edge_table_no: u32,
        ext_attr_table_no: u32,
    ) -> Self {
        Graph {
            conn,
            node_table_no,
            edge_table_no,
            ext_attr_table_no,
            partsync: true,
        }
    }

    /// Create a node and write it (and its basic attributes) to the
    /// database. An existing node with the same id has its basic
    /// attributes overwritten; extended attributes are untouched.
    pub fn create_node(
        &mut self,
        node_id: impl Into<Vec<u8>>,
        basic_attrs: Option<BasicAttributes>,
    ) -> Result<Node, YakDbError> {
        let node = Node::new(node_id, basic_attrs.unwrap_or_default())?;
        self.save_node(&node)?;
        Ok(node)
    }

    /// Create a directed edge and write both of its mirror records
    pub fn create_edge(
        &mut self,
        source: impl Into<Vec<u8>>,
        target: impl Into<Vec<u8>>,
        edge_type: impl Into<Vec<u8>>,
        basic_attrs: Option<BasicAttributes>,
    ) -> Result<Edge, YakDbError> {
        let edge = Edge::new(source, target, edge_type, basic_attrs.unwrap_or_default())?;
        self.save_edge(&edge)?;
        Ok(edge)
    }

    /// Write a node and its basic attribute set
    pub fn save_node(&mut self, node: &Node) -> Result<(), YakDbError> {
        let pair = (
            BinaryValue::Bytes(node.id.clone()),
            BinaryValue::Bytes(node.basic_attributes.serialize()),
        );
        self.conn
            .put(self.node_table_no, &[pair], self.partsync, false)
    }

    /// Write both mirror records of an edge, sharing one serialized
    /// attribute value
    pub fn save_edge(&mut self, edge: &Edge) -> Result<(), YakDbError> {
        let serialized = edge.basic_attributes.serialize();
        let pairs = [
            (
                BinaryValue::Bytes(edge.active_key()),
                BinaryValue::Bytes(serialized.clone()),
            ),
            (
                BinaryValue::Bytes(edge.passive_key()),
                BinaryValue::Bytes(serialized),
            ),
        ];
        self.conn
            .put(self.edge_table_no, &pairs, self.partsync, false)
    }

    /// Read a node by id. A node that was never written comes back with
    /// an empty attribute set, exactly like one saved without
    /// attributes; use [Self::node_exists] to tell them apart.
    pub fn get_node(&mut self, node_id: &[u8]) -> Result<Node, YakDbError> {
        check_identifier(node_id)?;
        let values = self
            .conn
            .read(self.node_table_no, &[BinaryValue::Bytes(node_id.to_vec())])?;
        let raw = values.first().map(Vec::as_slice).unwrap_or_default();
        Ok(Node {
            id: node_id.to_vec(),
            basic_attributes: BasicAttributes::parse(raw)?,
        })
    }

    /// Check whether a node record exists
    pub fn node_exists(&mut self, node_id: &[u8]) -> Result<bool, YakDbError> {
        check_identifier(node_id)?;
        let flags = self
            .conn
            .exists(self.node_table_no, &[BinaryValue::Bytes(node_id.to_vec())])?;
        Ok(flags.first().copied().unwrap_or(false))
    }

    /// Delete a node record. With `delete_ext_attrs`, its extended
    /// attributes go too; otherwise a later node with the same id
    /// inherits whatever is left in the attribute table. Edges are not
    /// cascaded.
    pub fn delete_node(
        &mut self,
        node_id: &[u8],
        delete_ext_attrs: bool,
    ) -> Result<(), YakDbError> {
        check_identifier(node_id)?;
        self.conn.delete(
            self.node_table_no,
            &[BinaryValue::Bytes(node_id.to_vec())],
            self.partsync,
            false,
        )?;
        if delete_ext_attrs {
            self.delete_extended_attribute_range(node_id, None, None, None)?;
        }
        Ok(())
    }

    /// Delete both mirror records of an edge, and optionally its
    /// extended attributes
    pub fn delete_edge(&mut self, edge: &Edge, delete_ext_attrs: bool) -> Result<(), YakDbError> {
        let keys = [
            BinaryValue::Bytes(edge.active_key()),
            BinaryValue::Bytes(edge.passive_key()),
        ];
        self.conn
            .delete(self.edge_table_no, &keys, self.partsync, false)?;
        if delete_ext_attrs {
            self.delete_extended_attribute_range(&edge.active_key(), None, None, None)?;
        }
        Ok(())
    }

    /// Scan the node table, skipping edge records in case the tables
    /// are shared
    pub fn scan_nodes(
        &mut self,
        start_key: Option<&BinaryValue>,
        end_key: Option<&BinaryValue>,
        limit: Option<u64>,
    ) -> Result<Vec<Node>, YakDbError> {
        let options = ScanOptions {
            start_key: start_key.cloned(),
            end_key: end_key.cloned(),
            limit,
            ..Default::default()
        };
        let records = self.conn.scan(self.node_table_no, &options)?;
        let mut nodes = Vec::new();
        for (key, value) in records {
            // Edge keys always contain the type separator, node ids
            // never do
            if key.contains(&EDGE_TYPE_SEPARATOR) {
                continue;
            }
            nodes.push(Node {
                id: key,
                basic_attributes: BasicAttributes::parse(&value)?,
            });
        }
        Ok(nodes)
    }

    /// Lazily iterate over all nodes, loading `chunk_size` records at a
    /// time
    pub fn iter_nodes(&mut self, options: ScanOptions, chunk_size: u64) -> NodeIterator<'_, C> {
        NodeIterator::new(KeyValueIterator::new(
            self.conn,
            self.node_table_no,
            options,
            chunk_size,
        ))
    }

    fn scan_edges(
        &mut self,
        start_key: Vec<u8>,
        end_key: Vec<u8>,
        limit: Option<u64>,
    ) -> Result<Vec<Edge>, YakDbError> {
        let options = ScanOptions {
            start_key: Some(BinaryValue::Bytes(start_key)),
            end_key: Some(BinaryValue::Bytes(end_key)),
            limit,
            ..Default::default()
        };
        let records = self.conn.scan(self.edge_table_no, &options)?;
        let mut edges = Vec::new();
        for (key, value) in records {
            let (source, target, edge_type) = Edge::deserialize_edge(&key)?;
            edges.push(Edge {
                source,
                target,
                edge_type,
                basic_attributes: BasicAttributes::parse(&value)?,
            });
        }
        Ok(edges)
    }

    /// All edges touching a node (incoming and outgoing), in one range
    /// scan
    pub fn all_edges(
        &mut self,
        node_id: &[u8],
        edge_type: &[u8],
        limit: Option<u64>,
    ) -> Result<Vec<Edge>, YakDbError> {
        check_identifier(node_id)?;
        let (start, end) = Edge::all_edges_scan_keys(node_id, edge_type);
        self.scan_edges(start, end, limit)
    }

    /// Outgoing edges of a node, in one range scan
    pub fn outgoing_edges(
        &mut self,
        node_id: &[u8],
        edge_type: &[u8],
        limit: Option<u64>,
    ) -> Result<Vec<Edge>, YakDbError> {
        check_identifier(node_id)?;
        let (start, end) = Edge::outgoing_edges_scan_keys(node_id, edge_type);
        self.scan_edges(start, end, limit)
    }

    /// Incoming edges of a node, in one range scan
    pub fn incoming_edges(
        &mut self,
        node_id: &[u8],
        edge_type: &[u8],
        limit: Option<u64>,
    ) -> Result<Vec<Edge>, YakDbError> {
        check_identifier(node_id)?;
        let (start, end) = Edge::incoming_edges_scan_keys(node_id, edge_type);
        self.scan_edges(start, end, limit)
    }

    /// Read extended attributes by key, in key order. Unset attributes
    /// come back as empty values.
    pub fn read_extended_attributes(
        &mut self,
        entity_id: &[u8],
        keys: &[&[u8]],
    ) -> Result<Vec<Vec<u8>>, YakDbError> {
        let db_keys: Result<Vec<BinaryValue>, YakDbError> = keys
            .iter()
            .map(|key| Ok(BinaryValue::Bytes(extended_attribute_key(entity_id, key)?)))
            .collect();
        self.conn.read(self.ext_attr_table_no, &db_keys?)
    }

    /// Scan extended attributes of an entity, optionally narrowed to an
    /// attribute range, returning them keyed by the bare attribute key
    pub fn scan_extended_attributes(
        &mut self,
        entity_id: &[u8],
        start_attribute: Option<&[u8]>,
        end_attribute: Option<&[u8]>,
        limit: Option<u64>,
    ) -> Result<HashMap<Vec<u8>, Vec<u8>>, YakDbError> {
        let (mut start, mut end) = entity_scan_keys(entity_id);
        if let Some(attribute) = start_attribute {
            start = extended_attribute_key(entity_id, attribute)?;
        }
        if let Some(attribute) = end_attribute {
            end = extended_attribute_key(entity_id, attribute)?;
        }
        let options = ScanOptions {
            start_key: Some(BinaryValue::Bytes(start)),
            end_key: Some(BinaryValue::Bytes(end)),
            limit,
            ..Default::default()
        };
        let records = self.conn.scan(self.ext_attr_table_no, &options)?;
        Ok(records
            .into_iter()
            .map(|(key, value)| (attribute_key_from_db_key(&key), value))
            .collect())
    }

    /// Write one or more extended attributes of an entity
    pub fn save_extended_attributes(
        &mut self,
        entity_id: &[u8],
        attributes: &[(&[u8], &[u8])],
    ) -> Result<(), YakDbError> {
        let pairs: Result<Vec<(BinaryValue, BinaryValue)>, YakDbError> = attributes
            .iter()
            .map(|(key, value)| {
                Ok((
                    BinaryValue::Bytes(extended_attribute_key(entity_id, key)?),
                    BinaryValue::Bytes(value.to_vec()),
                ))
            })
            .collect();
        self.conn
            .put(self.ext_attr_table_no, &pairs?, self.partsync, false)
    }

    /// Delete extended attributes by key. Attributes that don't exist
    /// are ignored silently.
    pub fn delete_extended_attributes(
        &mut self,
        entity_id: &[u8],
        keys: &[&[u8]],
    ) -> Result<(), YakDbError> {
        let db_keys: Result<Vec<BinaryValue>, YakDbError> = keys
            .iter()
            .map(|key| Ok(BinaryValue::Bytes(extended_attribute_key(entity_id, key)?)))
            .collect();
        self.conn
            .delete(self.ext_attr_table_no, &db_keys?, self.partsync, false)
    }

    /// Delete a range of extended attributes; the default range covers
    /// all of the entity's attributes
    pub fn delete_extended_attribute_range(
        &mut self,
        entity_id: &[u8],
        start_attribute: Option<&[u8]>,
        end_attribute: Option<&[u8]>,
        limit: Option<u64>,
    ) -> Result<(), YakDbError> {
        let (mut start, mut end) = entity_scan_keys(entity_id);
        if let Some(attribute) = start_attribute {
            start = extended_attribute_key(entity_id, attribute)?;
        }
        if let Some(attribute) = end_attribute {
            end = extended_attribute_key(entity_id, attribute)?;
        }
        self.conn.delete_range(
            self.ext_attr_table_no,
            Some(&BinaryValue::Bytes(start)),
            Some(&BinaryValue::Bytes(end)),
            limit,
        )
    }
}
