//! Domain types shared by the cardsight vision pipeline and its front end.

pub mod control;
pub mod events;
pub mod multiset;
pub mod symbols;

pub use control::ControlMessage;
pub use events::{CardRef, Event, EventRecord, Outcome, Side};
pub use multiset::Multiset;
pub use symbols::{SymbolClass, SymbolData, SymbolId};
