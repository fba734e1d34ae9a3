//! Externally visible game events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::symbols::SymbolId;

/// Which player a detection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Player,
    Opponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Victory,
    Defeat,
    Unknown,
}

/// A card as reported to the outside world. Unresolved slots carry no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRef {
    pub id: Option<SymbolId>,
    pub name: String,
    pub cost: Option<i32>,
}

impl CardRef {
    pub fn unknown() -> Self {
        Self {
            id: None,
            name: "unknown".to_string(),
            cost: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MatchStarted,
    MatchEnded {
        outcome: Outcome,
    },
    RoundAdvanced {
        round: u32,
    },
    CardPlayed {
        side: Side,
        card: CardRef,
    },
    StartingHand {
        cards: Vec<CardRef>,
    },
    CardsDrawn {
        source: Option<CardRef>,
        drawn: Vec<CardRef>,
        created: Vec<CardRef>,
    },
    PhaseChanged {
        from: String,
        to: String,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::MatchStarted => "match_started",
            Event::MatchEnded { .. } => "match_ended",
            Event::RoundAdvanced { .. } => "round_advanced",
            Event::CardPlayed { .. } => "card_played",
            Event::StartingHand { .. } => "starting_hand",
            Event::CardsDrawn { .. } => "cards_drawn",
            Event::PhaseChanged { .. } => "phase_changed",
        }
    }
}

/// An event stamped with the tick that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub frame: u64,
    #[serde(flatten)]
    pub event: Event,
}

impl EventRecord {
    pub fn new(frame: u64, event: Event) -> Self {
        Self {
            timestamp: Utc::now(),
            frame,
            event,
        }
    }

    /// One JSON object, no trailing newline.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_flat_with_type_tag() -> anyhow::Result<()> {
        let record = EventRecord::new(
            42,
            Event::CardPlayed {
                side: Side::Opponent,
                card: CardRef {
                    id: Some(SymbolId(7)),
                    name: "Ambush".to_string(),
                    cost: Some(2),
                },
            },
        );
        let value: serde_json::Value = serde_json::from_str(&record.to_json_line()?)?;
        assert_eq!(value["type"], "card_played");
        assert_eq!(value["frame"], 42);
        assert_eq!(value["side"], "opponent");
        assert_eq!(value["card"]["id"], 7);
        assert!(value["timestamp"].is_string());
        Ok(())
    }

    #[test]
    fn test_unknown_card_serializes_null_id() -> anyhow::Result<()> {
        let json = serde_json::to_value(CardRef::unknown())?;
        assert!(json["id"].is_null());
        assert_eq!(json["name"], "unknown");
        Ok(())
    }
}
