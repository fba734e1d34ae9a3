//! Temporal debouncing of per-frame classifications

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Sliding window length in frames.
    pub window: usize,
    /// Occurrences in the window needed to become the majority.
    pub min_count: usize,
    /// Distances at or below this mark an occurrence as strict; a value with
    /// a strict occurrence only needs half of `min_count`.
    pub strict_distance: u32,
    /// Consecutive majority frames before the value is signaled.
    pub valid_count: usize,
    /// Frames after a signal during which nothing is emitted.
    pub cooldown: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            window: 6,
            min_count: 4,
            strict_distance: 2,
            valid_count: 3,
            cooldown: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    count: usize,
    strict: usize,
}

/// Converts a noisy per-frame signal into one rising-edge event per real
/// occurrence.
#[derive(Debug, Clone)]
pub struct StreamFilter<T: Ord + Copy> {
    config: FilterConfig,
    window: VecDeque<Option<(T, bool)>>,
    tallies: BTreeMap<T, Tally>,
    tracked: Option<T>,
    consecutive: usize,
    signaled: bool,
    signaled_value: Option<T>,
    cooldown: usize,
}

impl<T: Ord + Copy> StreamFilter<T> {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            window: VecDeque::with_capacity(config.window),
            tallies: BTreeMap::new(),
            tracked: None,
            consecutive: 0,
            signaled: false,
            signaled_value: None,
            cooldown: 0,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn tracked(&self) -> Option<T> {
        self.tracked
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown > 0
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.tallies.clear();
        self.tracked = None;
        self.consecutive = 0;
        self.signaled = false;
        self.signaled_value = None;
        self.cooldown = 0;
    }

    /// Feed one frame's raw value (with its match distance). Returns the
    /// value exactly on the frame it becomes signaled.
    pub fn push(&mut self, raw: Option<T>, distance: u32) -> Option<T> {
        if self.cooldown > 0 {
            self.cooldown -= 1;
            if raw.is_some() && raw == self.signaled_value {
                self.cooldown = self.config.cooldown;
            }
            return None;
        }

        self.slide(raw.map(|value| (value, distance <= self.config.strict_distance)));

        let majority = self.majority();
        if majority != self.tracked {
            self.tracked = majority;
            self.consecutive = 0;
            self.signaled = false;
            return None;
        }

        let tracked = self.tracked?;
        if self.consecutive < self.config.valid_count {
            self.consecutive += 1;
        }
        if self.consecutive >= self.config.valid_count && !self.signaled {
            self.signaled = true;
            self.signaled_value = Some(tracked);
            self.cooldown = self.config.cooldown;
            return Some(tracked);
        }
        None
    }

    fn slide(&mut self, entry: Option<(T, bool)>) {
        if self.window.len() >= self.config.window.max(1) {
            if let Some(Some((old, strict))) = self.window.pop_front() {
                if let Some(tally) = self.tallies.get_mut(&old) {
                    tally.count -= 1;
                    if strict {
                        tally.strict -= 1;
                    }
                    if tally.count == 0 {
                        self.tallies.remove(&old);
                    }
                }
            }
        }

        if let Some((value, strict)) = entry {
            let tally = self.tallies.entry(value).or_default();
            tally.count += 1;
            if strict {
                tally.strict += 1;
            }
        }
        self.window.push_back(entry);
    }

    /// Most frequent value that clears the count bar; ties keep the tracked
    /// value, otherwise the smallest value wins.
    fn majority(&self) -> Option<T> {
        let full_bar = self.config.min_count;
        let strict_bar = full_bar.div_ceil(2);

        let mut best: Option<(T, usize)> = None;
        for (&value, tally) in &self.tallies {
            let bar = if tally.strict > 0 { strict_bar } else { full_bar };
            if tally.count < bar {
                continue;
            }
            best = match best {
                Some((_, count)) if tally.count > count => Some((value, tally.count)),
                Some((_, count)) if tally.count == count && Some(value) == self.tracked => {
                    Some((value, tally.count))
                }
                None => Some((value, tally.count)),
                keep => keep,
            };
        }
        best.map(|(value, _)| value)
    }
}
