//! Symbol index loading and querying
//!
//! Indices are produced offline, one JSON file per (class, hash kind):
//!
//! ```json
//! {"class": "card", "kind": "difference", "bits": 64,
//!  "entries": [{"id": 101, "hash": "f0e1d2c3b4a59687"}]}
//! ```

use super::{FeatureVector, HashKind};
use crate::traits::SymbolIndex;
use crate::Result;
use anyhow::Context;
use cardsight_core::{SymbolClass, SymbolId};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("entry {id} has an invalid hash {hash:?} for {bits} bits")]
    InvalidHash { id: SymbolId, hash: String, bits: usize },
    #[error("index for {class}/{kind} expects {expected} bits, extractor produces {actual}")]
    DimensionMismatch {
        class: SymbolClass,
        kind: HashKind,
        expected: usize,
        actual: usize,
    },
    #[error("no index loaded for {class}/{kind}")]
    Missing { class: SymbolClass, kind: HashKind },
    #[error("index for {class}/{kind} is empty")]
    Empty { class: SymbolClass, kind: HashKind },
}

/// One query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Neighbor {
    pub id: SymbolId,
    pub distance: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    id: SymbolId,
    hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    class: SymbolClass,
    kind: HashKind,
    bits: usize,
    entries: Vec<IndexEntry>,
}

/// Exhaustive Hamming-distance index.
///
/// Results are ordered by (distance, id), so queries are deterministic and
/// every returned list is a prefix of the full ranking.
#[derive(Debug, Clone)]
pub struct LinearIndex {
    bits: usize,
    entries: Vec<(SymbolId, FeatureVector)>,
}

impl LinearIndex {
    pub fn new(bits: usize) -> Self {
        Self {
            bits,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(bits: usize, entries: impl IntoIterator<Item = (SymbolId, FeatureVector)>) -> Self {
        let mut index = Self::new(bits);
        for (id, vector) in entries {
            index.insert(id, vector);
        }
        index
    }

    pub fn insert(&mut self, id: SymbolId, vector: FeatureVector) {
        debug_assert_eq!(vector.len(), self.bits);
        self.entries.push((id, vector));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(feature = "parallel")]
    fn ranked(&self, vector: &FeatureVector) -> Vec<Neighbor> {
        use rayon::prelude::*;
        self.entries
            .par_iter()
            .map(|(id, v)| Neighbor { id: *id, distance: v.distance(vector) })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn ranked(&self, vector: &FeatureVector) -> Vec<Neighbor> {
        self.entries
            .iter()
            .map(|(id, v)| Neighbor { id: *id, distance: v.distance(vector) })
            .collect()
    }
}

impl SymbolIndex for LinearIndex {
    fn bits(&self) -> usize {
        self.bits
    }

    fn query(&self, vector: &FeatureVector, k: usize) -> Vec<Neighbor> {
        let mut ranked = self.ranked(vector);
        ranked.sort_by_key(|n| (n.distance, n.id));
        ranked.truncate(k);
        ranked
    }
}

/// All indices, keyed by symbol class and hash kind.
#[derive(Default)]
pub struct IndexSet {
    indices: HashMap<(SymbolClass, HashKind), Arc<LinearIndex>>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: SymbolClass, kind: HashKind, index: LinearIndex) {
        self.indices.insert((class, kind), Arc::new(index));
    }

    pub fn get(&self, class: SymbolClass, kind: HashKind) -> std::result::Result<Arc<LinearIndex>, IndexError> {
        let index = self
            .indices
            .get(&(class, kind))
            .ok_or(IndexError::Missing { class, kind })?;
        if index.is_empty() {
            return Err(IndexError::Empty { class, kind });
        }
        Ok(Arc::clone(index))
    }

    /// Fetch an index and check it against the extractor's vector length.
    pub fn get_checked(
        &self,
        class: SymbolClass,
        kind: HashKind,
        bits: usize,
    ) -> std::result::Result<Arc<LinearIndex>, IndexError> {
        let index = self.get(class, kind)?;
        if index.bits != bits {
            return Err(IndexError::DimensionMismatch {
                class,
                kind,
                expected: index.bits,
                actual: bits,
            });
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Load every `*.json` index file in `dir`.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut set = Self::new();

        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read index directory: {:?}", dir))?;

        for entry in entries {
            let path = entry?.path();
            let is_json = path
                .extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("json"));
            if !is_json {
                continue;
            }

            let (class, kind, index) = Self::load_file(&path)?;
            debug!("Loaded {}/{} index with {} entries from {:?}", class, kind, index.len(), path);
            set.insert(class, kind, index);
        }

        info!("Loaded {} symbol indices from {:?}", set.len(), dir);
        Ok(set)
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<(SymbolClass, HashKind, LinearIndex)> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read index: {:?}", path))?;
        Self::parse(&text).with_context(|| format!("Failed to parse index: {:?}", path))
    }

    pub fn parse(text: &str) -> Result<(SymbolClass, HashKind, LinearIndex)> {
        let file: IndexFile = serde_json::from_str(text)?;
        let mut index = LinearIndex::new(file.bits);
        for entry in file.entries {
            let vector = FeatureVector::from_hex(&entry.hash, file.bits).ok_or_else(|| {
                IndexError::InvalidHash {
                    id: entry.id,
                    hash: entry.hash.clone(),
                    bits: file.bits,
                }
            })?;
            index.insert(entry.id, vector);
        }
        Ok((file.class, file.kind, index))
    }
}
