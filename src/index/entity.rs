//! Inverted index plus entity storage.
//!
//! Decorates [InvertedIndex] with an entity table: searches resolve
//! posting ids to unpacked entity objects. Each consecutive level of
//! the priority list is searched only while the previous ones did not
//! yield `min_entities` results, and the overall result is clamped to
//! `max_entities`.
//!
//! The value packer is pluggable; the default packs entities as JSON
//! and keys them by the first 16 bytes of the base64-encoded SHA-1 of
//! the packed form.

use std::collections::{HashMap, HashSet};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::connection::{Connection, ScanOptions};
use crate::conversion::BinaryValue;
use crate::error::YakDbError;
use crate::index::{
    InvertedIndex, LEVEL_TOKEN_SEPARATOR, select_results, split_entity_part,
};
use crate::iterators::KeyValueIterator;
use crate::transport::TransportContext;
use crate::utils::make_unique;

/// Reserved key under which the hit location is injected into returned
/// entity objects
pub const HITLOC_KEY: &str = "hitloc";

pub const DEFAULT_MIN_ENTITIES: usize = 50;
pub const DEFAULT_MAX_ENTITIES: usize = 250;

/// Serializes entities to their stored representation and back
pub trait EntityPacker {
    fn pack(&self, entity: &Value) -> Result<Vec<u8>, YakDbError>;
    fn unpack(&self, packed: &[u8]) -> Result<Value, YakDbError>;
}

/// The default packer: JSON, which round-trips maps, lists, integers,
/// floats and strings without schema knowledge
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonPacker;

impl EntityPacker for JsonPacker {
    fn pack(&self, entity: &Value) -> Result<Vec<u8>, YakDbError> {
        Ok(serde_json::to_vec(entity)?)
    }

    fn unpack(&self, packed: &[u8]) -> Result<Value, YakDbError> {
        Ok(serde_json::from_slice(packed)?)
    }
}

/// Default entity key extractor: the first 16 bytes of
/// base64(SHA-1(packed entity))
pub fn hash_entity(packed: &[u8]) -> Vec<u8> {
    let digest = Sha1::digest(packed);
    let mut encoded = BASE64.encode(digest).into_bytes();
    encoded.truncate(16);
    encoded
}

/// An inverted index that also stores and fetches the indexed entities
pub struct EntityInvertedIndex<'a, C: TransportContext, P: EntityPacker = JsonPacker> {
    conn: &'a mut Connection<C>,
    entity_table_no: u32,
    index_table_no: u32,
    packer: P,
    key_extractor: fn(&[u8]) -> Vec<u8>,
    /// Stop searching further levels once this many ids accumulated
    pub min_entities: usize,
    /// Hard cap on the number of returned entities
    pub max_entities: usize,
}

impl<'a, C: TransportContext> EntityInvertedIndex<'a, C, JsonPacker> {
    pub fn new(conn: &'a mut Connection<C>, entity_table_no: u32, index_table_no: u32) -> Self {
        Self::with_packer(conn, entity_table_no, index_table_no, JsonPacker, hash_entity)
    }
}

impl<'a, C: TransportContext, P: EntityPacker> EntityInvertedIndex<'a, C, P> {
    pub fn with_packer(
        conn: &'a mut Connection<C>,
        entity_table_no: u32,
        index_table_no: u32,
        packer: P,
        key_extractor: fn(&[u8]) -> Vec<u8>,
    ) -> Self {
        EntityInvertedIndex {
            conn,
            entity_table_no,
            index_table_no,
            packer,
            key_extractor,
            min_entities: DEFAULT_MIN_ENTITIES,
            max_entities: DEFAULT_MAX_ENTITIES,
        }
    }

    fn index(&mut self) -> InvertedIndex<'_, C> {
        InvertedIndex::new(self.conn, self.index_table_no)
    }

    /// Pack an entity and write it under its extracted key, which is
    /// returned
    pub fn write_entity(&mut self, entity: &Value) -> Result<Vec<u8>, YakDbError> {
        let packed = self.packer.pack(entity)?;
        let key = (self.key_extractor)(&packed);
        let pair = (BinaryValue::Bytes(key.clone()), BinaryValue::Bytes(packed));
        self.conn.put(self.entity_table_no, &[pair], false, false)?;
        Ok(key)
    }

    /// Write a batch of entities at once, returning their keys in input
    /// order
    pub fn write_entities(&mut self, entities: &[Value]) -> Result<Vec<Vec<u8>>, YakDbError> {
        let mut keys = Vec::with_capacity(entities.len());
        let mut pairs = Vec::with_capacity(entities.len());
        for entity in entities {
            let packed = self.packer.pack(entity)?;
            let key = (self.key_extractor)(&packed);
            keys.push(key.clone());
            pairs.push((BinaryValue::Bytes(key), BinaryValue::Bytes(packed)));
        }
        self.conn.put(self.entity_table_no, &pairs, false, false)?;
        Ok(keys)
    }

    /// Write the entity list relating to `(token, level)` into the
    /// index table. Entity part identifiers must already be included in
    /// the id strings.
    pub fn write_index(
        &mut self,
        token: &[u8],
        entity_list: &[Vec<u8>],
        level: &[u8],
    ) -> Result<(), YakDbError> {
        self.index().write_index(token, entity_list, level)
    }

    /// Relate many tokens to one entity in the index table
    pub fn index_tokens(
        &mut self,
        tokens: &[&[u8]],
        entity: &[u8],
        level: &[u8],
    ) -> Result<(), YakDbError> {
        self.index().index_tokens(tokens, entity, level)
    }

    /// Read entities by key and unpack them. Rows that come back empty
    /// (stale index entries) are dropped silently rather than failing
    /// the whole search.
    pub fn get_entities(&mut self, keys: &[Vec<u8>]) -> Result<Vec<Value>, YakDbError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let read_keys: Vec<BinaryValue> = keys
            .iter()
            .map(|key| BinaryValue::Bytes(key.clone()))
            .collect();
        let rows = self.conn.read(self.entity_table_no, &read_keys)?;
        rows.iter()
            .filter(|row| !row.is_empty())
            .map(|row| self.packer.unpack(row))
            .collect()
    }

    /// Shared tail of every search: prioritized level selection, dedup,
    /// clamping, suffix stripping, entity fetch
    fn fetch_selected(
        &mut self,
        results_by_level: HashMap<Vec<u8>, Vec<Vec<u8>>>,
        levels: &[&[u8]],
    ) -> Result<Vec<Value>, YakDbError> {
        let selected =
            select_results(&results_by_level, levels, self.min_entities, self.max_entities);
        // failsafe: selection already dedups and clamps, but the bounds
        // are load-bearing for the entity read below
        let mut selected = make_unique(selected);
        selected.truncate(self.max_entities);
        let keys: Vec<Vec<u8>> = selected
            .iter()
            .map(|id| split_entity_part(id).0)
            .collect();
        self.get_entities(&keys)
    }

    /// Prefix-search a single token across the level priority list and
    /// return the matching entities
    pub fn search_single_token_prefix(
        &mut self,
        token: &[u8],
        levels: &[&[u8]],
        scan_limit: Option<u64>,
    ) -> Result<Vec<Value>, YakDbError> {
        let results = self
            .index()
            .search_single_token_prefix(token, levels, scan_limit)?;
        self.fetch_selected(results, levels)
    }

    /// Exact-search multiple tokens (intersected per level) and return
    /// the matching entities
    pub fn search_multi_token_exact(
        &mut self,
        tokens: &[&[u8]],
        levels: &[&[u8]],
        strict: bool,
    ) -> Result<Vec<Value>, YakDbError> {
        let results = self.index().search_multi_token_exact(tokens, levels, strict)?;
        self.fetch_selected(results, levels)
    }

    /// Prefix-search multiple tokens (intersected per level) and return
    /// the matching entities
    pub fn search_multi_token_prefix(
        &mut self,
        tokens: &[&[u8]],
        levels: &[&[u8]],
        scan_limit: Option<u64>,
        strict: bool,
    ) -> Result<Vec<Value>, YakDbError> {
        let results = self
            .index()
            .search_multi_token_prefix(tokens, levels, scan_limit, strict)?;
        self.fetch_selected(results, levels)
    }

    /// Exact-search several tokens on one level, keeping the per-token
    /// association. Every returned entity is a copy carrying its full
    /// original posting id (including any part suffix) under the
    /// reserved `hitloc` key, so the same entity found under different
    /// tokens reports different hit locations.
    pub fn search_single_token_multi_exact(
        &mut self,
        tokens: &[&[u8]],
        level: &[u8],
    ) -> Result<HashMap<Vec<u8>, Vec<Value>>, YakDbError> {
        let postings = self.index().search_single_token_multi_exact(tokens, level)?;
        let mut unique_keys: Vec<Vec<u8>> = Vec::new();
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        for entries in postings.values() {
            for (id, _part) in entries {
                if seen.insert(id.clone()) {
                    unique_keys.push(id.clone());
                }
            }
        }
        let read_keys: Vec<BinaryValue> = unique_keys
            .iter()
            .map(|key| BinaryValue::Bytes(key.clone()))
            .collect();
        let rows = if read_keys.is_empty() {
            Vec::new()
        } else {
            self.conn.read(self.entity_table_no, &read_keys)?
        };
        let mut entities_by_key: HashMap<Vec<u8>, Value> = HashMap::new();
        for (key, row) in unique_keys.iter().zip(rows) {
            if !row.is_empty() {
                entities_by_key.insert(key.clone(), self.packer.unpack(&row)?);
            }
        }
        let mut result = HashMap::new();
        for token in tokens {
            let mut hits = Vec::new();
            for (id, part) in postings.get(*token).map(Vec::as_slice).unwrap_or_default() {
                let Some(entity) = entities_by_key.get(id) else {
                    continue;
                };
                let mut entity = entity.clone();
                let mut hitloc = id.clone();
                if !part.is_empty() {
                    hitloc.push(LEVEL_TOKEN_SEPARATOR);
                    hitloc.extend_from_slice(part);
                }
                if let Value::Object(map) = &mut entity {
                    map.insert(
                        HITLOC_KEY.to_string(),
                        Value::String(String::from_utf8_lossy(&hitloc).into_owned()),
                    );
                }
                hits.push(entity);
            }
            result.insert(token.to_vec(), hits);
        }
        Ok(result)
    }

    /// Iterate lazily over the entity table, unpacking values as they
    /// stream in
    pub fn iterate_entities(
        self,
        options: ScanOptions,
        chunk_size: u64,
    ) -> EntityIterator<'a, C, P> {
        EntityIterator {
            inner: KeyValueIterator::new(self.conn, self.entity_table_no, options, chunk_size),
            packer: self.packer,
        }
    }
}

/// Lazy iterator over stored entities, yielding `(key, entity)`
pub struct EntityIterator<'a, C: TransportContext, P: EntityPacker = JsonPacker> {
    inner: KeyValueIterator<'a, C>,
    packer: P,
}

impl<C: TransportContext, P: EntityPacker> Iterator for EntityIterator<'_, C, P> {
    type Item = Result<(Vec<u8>, Value), YakDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok((key, value)) => Some(self.packer.unpack(&value).map(|entity| (key, entity))),
            Err(error) => Some(Err(error)),
        }
    }
}
