//! Inbound control messages (one JSON object per line, tagged by `input_type`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "input_type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Switch the locale used for names in outgoing events.
    SetLocale { locale: String },
    /// Drop all session state and return to the initial phase.
    Reset,
    /// Log the current phase and task state.
    DumpState,
    /// Change how often diagnostics are logged; 0 disables them.
    SetDiagnostics { interval: u64 },
}

/// Result of parsing one control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlParse {
    Message(ControlMessage),
    /// Valid JSON object whose `input_type` is not recognised.
    Unrecognized(String),
    Malformed(String),
}

impl ControlMessage {
    /// `input_type` tags, one per variant.
    pub const INPUT_TYPES: [&'static str; 4] = ["set_locale", "reset", "dump_state", "set_diagnostics"];

    pub fn parse(line: &str) -> ControlParse {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => return ControlParse::Malformed(e.to_string()),
        };

        let Some(input_type) = value.get("input_type").and_then(|v| v.as_str()) else {
            return ControlParse::Malformed("missing input_type".to_string());
        };
        if !Self::INPUT_TYPES.iter().any(|known| *known == input_type) {
            return ControlParse::Unrecognized(input_type.to_string());
        }

        match serde_json::from_value::<ControlMessage>(value) {
            Ok(message) => ControlParse::Message(message),
            Err(e) => ControlParse::Malformed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(
            ControlMessage::parse(r#"{"input_type":"set_locale","locale":"de"}"#),
            ControlParse::Message(ControlMessage::SetLocale {
                locale: "de".to_string()
            })
        );
        assert_eq!(
            ControlMessage::parse(r#"{"input_type":"reset"}"#),
            ControlParse::Message(ControlMessage::Reset)
        );
    }

    #[test]
    fn test_every_input_type_is_a_variant() {
        let samples = [
            ControlMessage::SetLocale { locale: "en".to_string() },
            ControlMessage::Reset,
            ControlMessage::DumpState,
            ControlMessage::SetDiagnostics { interval: 30 },
        ];
        for (message, tag) in samples.iter().zip(ControlMessage::INPUT_TYPES) {
            let value = serde_json::to_value(message).expect("serializable");
            assert_eq!(value["input_type"], tag);
            let line = value.to_string();
            assert_eq!(ControlMessage::parse(&line), ControlParse::Message(message.clone()));
        }
    }

    #[test]
    fn test_parse_unknown_and_malformed() {
        assert_eq!(
            ControlMessage::parse(r#"{"input_type":"launch_rockets"}"#),
            ControlParse::Unrecognized("launch_rockets".to_string())
        );
        assert!(matches!(
            ControlMessage::parse("not json"),
            ControlParse::Malformed(_)
        ));
        assert!(matches!(
            ControlMessage::parse(r#"{"input_type":"set_locale"}"#),
            ControlParse::Malformed(_)
        ));
    }
}
