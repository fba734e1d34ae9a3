use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::events::CardRef;
use crate::symbols::id::{SymbolClass, SymbolId};

const FALLBACK_LOCALE: &str = "en";

/// Metadata for one symbol, as produced by the offline asset build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMeta {
    pub id: SymbolId,
    #[serde(default = "default_class")]
    pub class: SymbolClass,
    #[serde(default)]
    pub cost: Option<i32>,
    #[serde(default)]
    pub names: HashMap<String, String>,
    /// Visually identical variant of another symbol.
    #[serde(default)]
    pub alias_of: Option<SymbolId>,
}

fn default_class() -> SymbolClass {
    SymbolClass::Card
}

#[derive(Debug, Deserialize)]
struct SymbolFile {
    symbols: Vec<SymbolMeta>,
}

/// Read-only symbol metadata: names per locale, costs and alias mapping.
#[derive(Debug, Clone, Default)]
pub struct SymbolData {
    symbols: HashMap<SymbolId, SymbolMeta>,
}

impl SymbolData {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read symbol metadata: {:?}", path))?;
        let data = Self::from_json(&text)
            .with_context(|| format!("Failed to parse symbol metadata: {:?}", path))?;

        info!("Loaded {} symbols from {:?}", data.len(), path);
        Ok(data)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let file: SymbolFile = serde_json::from_str(text)?;
        Ok(Self::from_entries(file.symbols))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = SymbolMeta>) -> Self {
        let mut symbols = HashMap::new();
        for meta in entries {
            if meta.alias_of == Some(meta.id) {
                warn!("Symbol {} is declared as an alias of itself, ignoring alias", meta.id);
            }
            if let Some(previous) = symbols.insert(meta.id, meta) {
                warn!("Duplicate symbol {}, keeping the last definition", previous.id);
            }
        }
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Localised name, falling back to English and then to the raw id.
    pub fn name(&self, id: SymbolId, locale: &str) -> String {
        self.symbols
            .get(&id)
            .and_then(|meta| {
                meta.names
                    .get(locale)
                    .or_else(|| meta.names.get(FALLBACK_LOCALE))
                    .or_else(|| meta.names.values().next())
            })
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    pub fn cost(&self, id: SymbolId) -> Option<i32> {
        self.symbols.get(&id).and_then(|meta| meta.cost)
    }

    /// Follows the alias chain to the canonical id. Cycles stop at the
    /// first repeated id.
    pub fn canonical(&self, id: SymbolId) -> SymbolId {
        let mut current = id;
        let mut hops = 0;
        while let Some(next) = self.symbols.get(&current).and_then(|meta| meta.alias_of) {
            if next == current || hops > self.symbols.len() {
                break;
            }
            current = next;
            hops += 1;
        }
        current
    }

    pub fn is_alias(&self, id: SymbolId) -> bool {
        self.canonical(id) != id
    }

    /// Alias id -> canonical id, for every alias.
    pub fn alias_table(&self) -> HashMap<SymbolId, SymbolId> {
        self.symbols
            .keys()
            .filter_map(|&id| {
                let canonical = self.canonical(id);
                (canonical != id).then_some((id, canonical))
            })
            .collect()
    }

    pub fn card_ref(&self, id: Option<SymbolId>, locale: &str) -> CardRef {
        match id {
            Some(id) => CardRef {
                id: Some(id),
                name: self.name(id, locale),
                cost: self.cost(id),
            },
            None => CardRef::unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "symbols": [
            {"id": 1, "cost": 3, "names": {"en": "Fireball", "fr": "Boule de feu"}},
            {"id": 2, "cost": 3, "names": {"en": "Fireball"}, "alias_of": 1},
            {"id": 3, "cost": 3, "alias_of": 2},
            {"id": 40, "class": "control", "names": {"en": "Victory"}}
        ]
    }"#;

    #[test]
    fn test_names_fall_back_to_english() -> Result<()> {
        let data = SymbolData::from_json(SAMPLE)?;
        assert_eq!(data.name(SymbolId(1), "fr"), "Boule de feu");
        assert_eq!(data.name(SymbolId(2), "fr"), "Fireball");
        assert_eq!(data.name(SymbolId(99), "en"), "#99");
        Ok(())
    }

    #[test]
    fn test_alias_chain_resolves_to_canonical() -> Result<()> {
        let data = SymbolData::from_json(SAMPLE)?;
        assert_eq!(data.canonical(SymbolId(3)), SymbolId(1));
        assert!(data.is_alias(SymbolId(2)));
        assert!(!data.is_alias(SymbolId(1)));

        let table = data.alias_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table[&SymbolId(3)], SymbolId(1));
        Ok(())
    }

    #[test]
    fn test_card_ref_for_unknown_slot() -> Result<()> {
        let data = SymbolData::from_json(SAMPLE)?;
        let card = data.card_ref(None, "en");
        assert_eq!(card.id, None);
        assert_eq!(card.name, "unknown");

        let card = data.card_ref(Some(SymbolId(1)), "en");
        assert_eq!(card.cost, Some(3));
        Ok(())
    }
}
