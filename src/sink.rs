//! Outbound event stream

use anyhow::{Context, Result};
use cardsight_core::EventRecord;
use std::io::Write;

pub trait EventSink {
    fn emit(&mut self, record: &EventRecord) -> Result<()>;
}

/// One JSON object per line, flushed after every event.
pub struct JsonLineSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> EventSink for JsonLineSink<W> {
    fn emit(&mut self, record: &EventRecord) -> Result<()> {
        let line = record.to_json_line().context("Failed to serialize event")?;
        writeln!(self.writer, "{}", line).context("Failed to write event")?;
        self.writer.flush().context("Failed to flush event sink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardsight_core::{Event, Outcome};

    #[test]
    fn test_one_line_per_event() -> Result<()> {
        let mut buffer = Vec::new();
        let mut sink = JsonLineSink::new(&mut buffer);
        sink.emit(&EventRecord::new(3, Event::MatchStarted))?;
        sink.emit(&EventRecord::new(9, Event::MatchEnded { outcome: Outcome::Defeat }))?;

        let text = String::from_utf8(buffer)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1])?;
        assert_eq!(second["type"], "match_ended");
        assert_eq!(second["outcome"], "defeat");
        assert_eq!(second["frame"], 9);
        Ok(())
    }
}
