pub mod data;
pub mod id;

pub use data::{SymbolData, SymbolMeta};
pub use id::{SymbolClass, SymbolId};
