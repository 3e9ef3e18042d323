//! Mapping Warehouse: append-only identifier-mapping store
//!
//! Holds (srcDb, srcId) → (dstDb, dstId) rows grouped by destination
//! identifier space, with normalization heuristics applied on the way in
//! and at lookup. Bulk loads build a new table off to the side and swap
//! it in atomically, so concurrent readers see either the fully-old or
//! fully-new table — never a partially-cleared one.

mod normalize;

pub use normalize::{normalize, normalize_for_destination, normalize_namespace};

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// One identifier-mapping row.
///
/// The constructor canonicalizes the source namespace name and normalizes
/// the source identifier, so equal mappings from different providers hash
/// to the same content key (idempotent upsert).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingEntry {
    src_db: String,
    src_id: String,
    dst_db: String,
    dst_id: String,
}

impl MappingEntry {
    pub fn new(
        src_db: impl Into<String>,
        src_id: impl Into<String>,
        dst_db: impl Into<String>,
        dst_id: impl Into<String>,
    ) -> Result<Self, MappingError> {
        let src_db = normalize_namespace(&src_db.into());
        let src_id = src_id.into().trim().to_string();
        let dst_db = dst_db.into().trim().to_ascii_uppercase();
        let dst_id = dst_id.into().trim().to_string();
        if src_db.is_empty() || src_id.is_empty() || dst_db.is_empty() || dst_id.is_empty() {
            return Err(MappingError::EmptyField);
        }
        let src_id = normalize(&src_db, &src_id);
        Ok(Self {
            src_db,
            src_id,
            dst_db,
            dst_id,
        })
    }

    pub fn src_db(&self) -> &str {
        &self.src_db
    }

    pub fn src_id(&self) -> &str {
        &self.src_id
    }

    pub fn dst_db(&self) -> &str {
        &self.dst_db
    }

    pub fn dst_id(&self) -> &str {
        &self.dst_id
    }

    /// Content hash of all four fields
    fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Errors constructing or loading mapping entries
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("mapping entry has an empty field")]
    EmptyField,
    #[error("mapping file has no header line")]
    MissingHeader,
    #[error("mapping file header must name source and target namespaces")]
    BadHeader,
}

/// The immutable lookup table a snapshot points at
#[derive(Debug, Default, Clone)]
struct MappingTable {
    /// dst space → (normalized src id, case-sensitive) → accessions
    by_dst: HashMap<String, HashMap<String, BTreeSet<String>>>,
    /// content hashes of inserted entries, for idempotent upsert
    seen: HashSet<u64>,
    len: usize,
}

impl MappingTable {
    /// Insert one entry; false when an identical tuple was already present
    fn insert(&mut self, entry: MappingEntry) -> bool {
        if !self.seen.insert(entry.content_hash()) {
            return false;
        }
        self.by_dst
            .entry(entry.dst_db)
            .or_default()
            .entry(entry.src_id)
            .or_default()
            .insert(entry.dst_id);
        self.len += 1;
        true
    }

    fn lookup(&self, dst_db: &str, src_id: &str) -> BTreeSet<String> {
        self.by_dst
            .get(dst_db)
            .and_then(|rows| rows.get(src_id))
            .cloned()
            .unwrap_or_default()
    }
}

/// The identifier-mapping warehouse.
///
/// `map()` takes a lock only long enough to clone the current table's
/// Arc; `reload()`/`append()` build a replacement table and swap it in.
#[derive(Debug, Default)]
pub struct MappingWarehouse {
    table: RwLock<Arc<MappingTable>>,
}

impl MappingWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<MappingTable> {
        self.table
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap(&self, table: MappingTable) {
        let mut guard = self
            .table
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(table);
    }

    /// Map a raw identifier into the destination identifier space.
    ///
    /// Never fails: unknown ids return the empty set; multiple accessions
    /// mean the id is ambiguous and disambiguation is the caller's call.
    /// Lookup is exact and case-sensitive after normalization.
    pub fn map(
        &self,
        raw_id: &str,
        src_hint: Option<&str>,
        dst_space: &str,
    ) -> BTreeSet<String> {
        let dst = dst_space.trim().to_ascii_uppercase();
        let id = match src_hint {
            Some(ns) => normalize(ns, raw_id),
            None => normalize_for_destination(&dst, raw_id),
        };
        if id.is_empty() {
            return BTreeSet::new();
        }
        self.snapshot().lookup(&dst, &id)
    }

    /// Replace the whole table with the given entries, atomically with
    /// respect to concurrent `map()` calls. Returns the number of distinct
    /// rows loaded.
    pub fn reload(&self, entries: impl IntoIterator<Item = MappingEntry>) -> usize {
        let mut table = MappingTable::default();
        for entry in entries {
            table.insert(entry);
        }
        let len = table.len;
        self.swap(table);
        len
    }

    /// Add entries on top of the current table (copy, extend, swap).
    /// Duplicate tuples upsert harmlessly. Returns rows actually added.
    pub fn append(&self, entries: impl IntoIterator<Item = MappingEntry>) -> usize {
        let mut table = (*self.snapshot()).clone();
        let before = table.len;
        for entry in entries {
            table.insert(entry);
        }
        let added = table.len - before;
        self.swap(table);
        added
    }

    /// Number of distinct mapping rows
    pub fn len(&self) -> usize {
        self.snapshot().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse mapping rows from a simple tab-separated file: the first line
    /// names the source and target namespaces, each following line holds a
    /// source and a target id. Malformed lines are skipped with a warning.
    pub fn parse_tsv(bytes: &[u8]) -> Result<Vec<MappingEntry>, MappingError> {
        let text = String::from_utf8_lossy(bytes);
        let mut lines = text.lines();
        let header = lines.next().ok_or(MappingError::MissingHeader)?;
        let mut head = header.split('\t');
        let (src_db, dst_db) = match (head.next(), head.next()) {
            (Some(s), Some(d)) if !s.trim().is_empty() && !d.trim().is_empty() => (s, d),
            _ => return Err(MappingError::BadHeader),
        };

        let mut entries = Vec::new();
        for (lineno, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut cols = line.split('\t');
            match (cols.next(), cols.next()) {
                (Some(src_id), Some(dst_id)) => {
                    match MappingEntry::new(src_db, src_id, dst_db, dst_id) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => {
                            tracing::warn!(line = lineno + 2, error = %e, "skipping mapping row")
                        }
                    }
                }
                _ => tracing::warn!(line = lineno + 2, "skipping mapping row: missing column"),
            }
        }
        Ok(entries)
    }
}
