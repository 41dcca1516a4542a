//! Inverted index over a YakDB table.
//!
//! An index record maps `level 0x1E token` to a posting: entity ids
//! joined by `0x00`. An entity id may carry its own `0x1E`-separated
//! suffix naming the document part where the hit occurred; no suffix
//! means the whole entity. Levels namespace the index, and searches
//! walk them in caller-given priority order.
//!
//! This module manages only the index itself, not the entities it
//! points to; see [crate::index::entity] for the combined decorator.

pub mod entity;

use std::collections::{HashMap, HashSet};

use crate::connection::{Connection, ScanOptions};
use crate::conversion::BinaryValue;
use crate::error::YakDbError;
use crate::iterators::KeyValueIterator;
use crate::transport::TransportContext;
use crate::utils::increment_key;

/// Separates the level prefix from the token in an index key, and the
/// entity id from its optional part suffix in a posting
pub const LEVEL_TOKEN_SEPARATOR: u8 = 0x1E;
/// Separates entity ids within a posting value
pub const POSTING_SEPARATOR: u8 = 0x00;

/// Build the index database key for a token and level
pub fn index_key(token: &[u8], level: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(level.len() + 1 + token.len());
    key.extend_from_slice(level);
    key.push(LEVEL_TOKEN_SEPARATOR);
    key.extend_from_slice(token);
    key
}

/// Extract the level from an index database key (everything before the
/// last separator)
pub fn extract_level(db_key: &[u8]) -> Vec<u8> {
    match db_key.iter().rposition(|&b| b == LEVEL_TOKEN_SEPARATOR) {
        Some(idx) => db_key[..idx].to_vec(),
        None => Vec::new(),
    }
}

/// Split a posting value into its entity ids. Order of first occurrence
/// is kept, duplicates and empty segments are dropped; an empty value
/// yields an empty list.
pub fn split_posting(db_value: &[u8]) -> Vec<Vec<u8>> {
    if db_value.is_empty() {
        return Vec::new();
    }
    let mut seen: HashSet<&[u8]> = HashSet::new();
    db_value
        .split(|&b| b == POSTING_SEPARATOR)
        .filter(|segment| !segment.is_empty() && seen.insert(segment))
        .map(|segment| segment.to_vec())
        .collect()
}

/// Split an entity id into `(id, part)` at the first part separator.
/// The part is empty when the id refers to the whole entity.
pub fn split_entity_part(entity: &[u8]) -> (Vec<u8>, Vec<u8>) {
    match entity.iter().position(|&b| b == LEVEL_TOKEN_SEPARATOR) {
        Some(idx) => (entity[..idx].to_vec(), entity[idx + 1..].to_vec()),
        None => (entity.to_vec(), Vec::new()),
    }
}

/// Walk level results in priority order, concatenating ids while
/// removing duplicates (first occurrence wins). As soon as the
/// accumulator holds `min_hits` ids, no further level contributes; the
/// result is clamped to `max_hits`.
pub fn select_results(
    results_by_level: &HashMap<Vec<u8>, Vec<Vec<u8>>>,
    levels: &[&[u8]],
    min_hits: usize,
    max_hits: usize,
) -> Vec<Vec<u8>> {
    let mut selected: Vec<Vec<u8>> = Vec::new();
    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    for level in levels {
        if let Some(hits) = results_by_level.get(*level) {
            for id in hits {
                if seen.insert(id.clone()) {
                    selected.push(id.clone());
                }
            }
        }
        if selected.len() >= min_hits {
            break;
        }
    }
    selected.truncate(max_hits);
    selected
}

/// Intersect `hits` into an accumulated per-level result, or initialize
/// the level with them
fn merge_level_hits(
    accumulator: &mut HashMap<Vec<u8>, Vec<Vec<u8>>>,
    level: &[u8],
    hits: Vec<Vec<u8>>,
) {
    match accumulator.get_mut(level) {
        Some(existing) => {
            let incoming: HashSet<Vec<u8>> = hits.into_iter().collect();
            existing.retain(|id| incoming.contains(id));
        }
        None => {
            accumulator.insert(level.to_vec(), hits);
        }
    }
}

/// An inverted index stored in a single table of a connection.
///
/// Searches issue as few requests as possible: exact matches of any
/// token/level combination batch into one read, prefix matches need one
/// scan per level.
pub struct InvertedIndex<'a, C: TransportContext> {
    conn: &'a mut Connection<C>,
    table_no: u32,
}

impl<'a, C: TransportContext> InvertedIndex<'a, C> {
    pub fn new(conn: &'a mut Connection<C>, table_no: u32) -> Self {
        InvertedIndex { conn, table_no }
    }

    /// Write the entity list relating to `(token, level)`.
    ///
    /// Precondition (not checked): either replacing the previous posting
    /// is acceptable, or the table was opened with the `NULAPPEND` merge
    /// operator, which makes these writes additive.
    pub fn write_index(
        &mut self,
        token: &[u8],
        entity_list: &[Vec<u8>],
        level: &[u8],
    ) -> Result<(), YakDbError> {
        let value = entity_list.join(&[POSTING_SEPARATOR][..]);
        let pair = (
            BinaryValue::Bytes(index_key(token, level)),
            BinaryValue::Bytes(value),
        );
        self.conn.put(self.table_no, &[pair], false, false)
    }

    /// The transpose of [Self::write_index]: relate many tokens to one
    /// entity, writing one record per token. Same merge-operator
    /// precondition.
    pub fn index_tokens(
        &mut self,
        tokens: &[&[u8]],
        entity: &[u8],
        level: &[u8],
    ) -> Result<(), YakDbError> {
        let pairs: Vec<(BinaryValue, BinaryValue)> = tokens
            .iter()
            .map(|token| {
                (
                    BinaryValue::Bytes(index_key(token, level)),
                    BinaryValue::Bytes(entity.to_vec()),
                )
            })
            .collect();
        self.conn.put(self.table_no, &pairs, false, false)
    }

    /// Exact-match a single token on the given levels with one batched
    /// read. Returns the per-level hit lists (possibly empty).
    pub fn search_single_token_exact(
        &mut self,
        token: &[u8],
        levels: &[&[u8]],
    ) -> Result<HashMap<Vec<u8>, Vec<Vec<u8>>>, YakDbError> {
        let keys: Vec<BinaryValue> = levels
            .iter()
            .map(|level| BinaryValue::Bytes(index_key(token, level)))
            .collect();
        let values = self.conn.read(self.table_no, &keys)?;
        Ok(levels
            .iter()
            .zip(values)
            .map(|(level, value)| (level.to_vec(), split_posting(&value)))
            .collect())
    }

    /// Prefix-match a single token: one scan per level over
    /// `[level 0x1E token, lex-successor)`, unioning the postings of all
    /// matching records
    pub fn search_single_token_prefix(
        &mut self,
        token: &[u8],
        levels: &[&[u8]],
        limit: Option<u64>,
    ) -> Result<HashMap<Vec<u8>, Vec<Vec<u8>>>, YakDbError> {
        let mut results = HashMap::new();
        for level in levels {
            let start_key = index_key(token, level);
            let end_key = increment_key(&start_key);
            let options = ScanOptions {
                start_key: Some(BinaryValue::Bytes(start_key)),
                end_key: Some(BinaryValue::Bytes(end_key)),
                limit,
                ..Default::default()
            };
            let records = self.conn.scan(self.table_no, &options)?;
            let mut hits: Vec<Vec<u8>> = Vec::new();
            let mut seen: HashSet<Vec<u8>> = HashSet::new();
            for (_, value) in records {
                for id in split_posting(&value) {
                    if seen.insert(id.clone()) {
                        hits.push(id);
                    }
                }
            }
            results.insert(level.to_vec(), hits);
        }
        Ok(results)
    }

    /// Exact-match several tokens at once: one read over the cartesian
    /// product of levels and tokens, intersecting the hits per level.
    ///
    /// With `strict` unset, a token/level combination without results is
    /// silently ignored; with it set, it forces the empty intersection
    /// for that level.
    pub fn search_multi_token_exact(
        &mut self,
        tokens: &[&[u8]],
        levels: &[&[u8]],
        strict: bool,
    ) -> Result<HashMap<Vec<u8>, Vec<Vec<u8>>>, YakDbError> {
        let mut pairs: Vec<(&[u8], &[u8])> = Vec::with_capacity(levels.len() * tokens.len());
        for level in levels {
            for token in tokens {
                pairs.push((*level, *token));
            }
        }
        let keys: Vec<BinaryValue> = pairs
            .iter()
            .map(|(level, token)| BinaryValue::Bytes(index_key(token, level)))
            .collect();
        let values = self.conn.read(self.table_no, &keys)?;
        let mut results: HashMap<Vec<u8>, Vec<Vec<u8>>> = HashMap::new();
        for ((level, _token), value) in pairs.into_iter().zip(values) {
            let hits = split_posting(&value);
            if hits.is_empty() && !strict {
                continue;
            }
            merge_level_hits(&mut results, level, hits);
        }
        Ok(results)
    }

    /// Prefix-match several tokens: one single-token prefix search per
    /// token, intersected per level. Same `strict` semantics as
    /// [Self::search_multi_token_exact].
    pub fn search_multi_token_prefix(
        &mut self,
        tokens: &[&[u8]],
        levels: &[&[u8]],
        limit: Option<u64>,
        strict: bool,
    ) -> Result<HashMap<Vec<u8>, Vec<Vec<u8>>>, YakDbError> {
        let mut results: HashMap<Vec<u8>, Vec<Vec<u8>>> = HashMap::new();
        for token in tokens {
            let token_result = self.search_single_token_prefix(token, levels, limit)?;
            for level in levels {
                let hits = token_result.get(*level).cloned().unwrap_or_default();
                if hits.is_empty() && !strict {
                    continue;
                }
                merge_level_hits(&mut results, level, hits);
            }
        }
        Ok(results)
    }

    /// Exact-match several tokens on a single level, keeping the per
    /// token association: one read of N keys, returning each token's
    /// `(entity, part)` postings
    pub fn search_single_token_multi_exact(
        &mut self,
        tokens: &[&[u8]],
        level: &[u8],
    ) -> Result<HashMap<Vec<u8>, Vec<(Vec<u8>, Vec<u8>)>>, YakDbError> {
        let keys: Vec<BinaryValue> = tokens
            .iter()
            .map(|token| BinaryValue::Bytes(index_key(token, level)))
            .collect();
        let values = self.conn.read(self.table_no, &keys)?;
        Ok(tokens
            .iter()
            .zip(values)
            .map(|(token, value)| {
                let postings = split_posting(&value)
                    .iter()
                    .map(|id| split_entity_part(id))
                    .collect();
                (token.to_vec(), postings)
            })
            .collect())
    }

    /// Iterate lazily over the raw index table, splitting keys and
    /// postings as it goes
    pub fn iterate(self, options: ScanOptions, chunk_size: u64) -> IndexIterator<'a, C> {
        IndexIterator {
            inner: KeyValueIterator::new(self.conn, self.table_no, options, chunk_size),
        }
    }
}

/// Lazy iterator over an index table, yielding
/// `(level, token, [(entity, part)])` per record
pub struct IndexIterator<'a, C: TransportContext> {
    inner: KeyValueIterator<'a, C>,
}

impl<C: TransportContext> Iterator for IndexIterator<'_, C> {
    type Item = Result<(Vec<u8>, Vec<u8>, Vec<(Vec<u8>, Vec<u8>)>), YakDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match self.inner.next()? {
            Ok(record) => record,
            Err(error) => return Some(Err(error)),
        };
        let (level, token) = match key.iter().position(|&b| b == LEVEL_TOKEN_SEPARATOR) {
            Some(idx) => (key[..idx].to_vec(), key[idx + 1..].to_vec()),
            None => (Vec::new(), key),
        };
        let entities = split_posting(&value)
            .iter()
            .map(|id| split_entity_part(id))
            .collect();
        Some(Ok((level, token, entities)))
    }
}
