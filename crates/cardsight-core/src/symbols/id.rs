use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a known symbol (card, control banner or digit glyph).
///
/// "No detection" is expressed as `Option<SymbolId>`, never as a reserved
/// value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for SymbolId {
    fn from(value: u32) -> Self {
        SymbolId(value)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Visual class of a symbol. Every class has its own indices and hash sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolClass {
    Card,
    Control,
    Digit,
}

impl SymbolClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolClass::Card => "card",
            SymbolClass::Control => "control",
            SymbolClass::Digit => "digit",
        }
    }
}

impl fmt::Display for SymbolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
