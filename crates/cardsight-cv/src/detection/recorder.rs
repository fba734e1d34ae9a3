//! Accumulates variable-count detections until the count is stable

use cardsight_core::SymbolId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Consecutive frames with the same count before it is trusted.
    pub stable_frames: usize,
    /// Votes a slot value needs before the slot counts as resolved.
    pub min_votes: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            stable_frames: 8,
            min_votes: 3,
        }
    }
}

type SlotVotes = BTreeMap<SymbolId, usize>;

/// Detected count -> per-slot frequency tables.
#[derive(Debug, Clone)]
pub struct TaskRecorder {
    config: RecorderConfig,
    tables: BTreeMap<usize, Vec<SlotVotes>>,
    last_count: Option<usize>,
    streak: usize,
    frames: usize,
}

impl TaskRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            tables: BTreeMap::new(),
            last_count: None,
            streak: 0,
            frames: 0,
        }
    }

    /// Record one frame's slots, left to right. `None` slots were located but
    /// not identified.
    pub fn record(&mut self, slots: &[Option<SymbolId>]) {
        let count = slots.len();
        self.frames += 1;

        if self.last_count == Some(count) {
            self.streak += 1;
        } else {
            self.last_count = Some(count);
            self.streak = 1;
        }

        if count == 0 {
            return;
        }

        let table = self
            .tables
            .entry(count)
            .or_insert_with(|| vec![SlotVotes::new(); count]);
        for (votes, slot) in table.iter_mut().zip(slots) {
            if let Some(id) = slot {
                *votes.entry(*id).or_insert(0) += 1;
            }
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn last_count(&self) -> Option<usize> {
        self.last_count
    }

    /// Consecutive frames the current count has been observed.
    pub fn streak(&self) -> usize {
        self.streak
    }

    /// The current count once it has held for `stable_frames` frames.
    pub fn stable_count(&self) -> Option<usize> {
        match self.last_count {
            Some(count) if count > 0 && self.streak >= self.config.stable_frames => Some(count),
            _ => None,
        }
    }

    /// Winning value per slot for `count`; `None` for slots without enough
    /// votes.
    pub fn slots_for(&self, count: usize) -> Vec<Option<SymbolId>> {
        let Some(table) = self.tables.get(&count) else {
            return vec![None; count];
        };
        table
            .iter()
            .map(|votes| {
                let mut best: Option<(SymbolId, usize)> = None;
                for (&id, &n) in votes {
                    if best.is_none_or(|(_, m)| n > m) {
                        best = Some((id, n));
                    }
                }
                best.filter(|&(_, n)| n >= self.config.min_votes).map(|(id, _)| id)
            })
            .collect()
    }

    /// Slots for the stable count, if there is one.
    pub fn resolve(&self) -> Option<Vec<Option<SymbolId>>> {
        self.stable_count().map(|count| self.slots_for(count))
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.resolve()
            .is_some_and(|slots| slots.iter().all(Option::is_some))
    }

    /// Resolve and clear.
    pub fn take(&mut self) -> Option<Vec<Option<SymbolId>>> {
        let resolved = self.resolve();
        self.clear();
        resolved
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.last_count = None;
        self.streak = 0;
        self.frames = 0;
    }

    /// Human-readable dump of every table, for error reports.
    pub fn dump(&self) -> String {
        let mut out = format!(
            "frames={} last_count={:?} streak={}",
            self.frames, self.last_count, self.streak
        );
        for (count, table) in &self.tables {
            let _ = write!(out, " | count {}:", count);
            for (slot, votes) in table.iter().enumerate() {
                let _ = write!(out, " [{}] {:?}", slot, votes);
            }
        }
        out
    }
}
