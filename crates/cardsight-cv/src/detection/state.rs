//! Session phase machine
//!
//! Owns the current phase, picks which tasks tick each frame and turns the
//! tasks' filtered signals into game events. A new session start overrides
//! every other transition.

use super::config::{ControlSymbols, DrawPhaseConfig};
use super::tasks::{FlowObservation, TaskKind, TaskOutput, TaskSet};
use cardsight_core::{CardRef, Event, Multiset, Outcome, Side, SymbolData, SymbolId};
use log::{debug, error, info, warn};
use std::fmt;

/// Stages of the draw sub-phase, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStage {
    /// Waiting for the drawn symbol, then for it to leave.
    Draw,
    /// Waiting for the offered row to stabilize and resolve.
    Count,
    /// Tracking the row until it disappears.
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    StartingHand,
    Action,
    Draw(DrawStage),
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NotStarted => "not_started",
            Phase::StartingHand => "starting_hand",
            Phase::Action => "action",
            Phase::Draw(_) => "draw",
        }
    }

    /// Tasks ticked while in this phase, in tick order.
    pub fn active_tasks(&self) -> &'static [TaskKind] {
        match self {
            Phase::NotStarted => &[TaskKind::MatchStart],
            Phase::StartingHand => &[
                TaskKind::MatchStart,
                TaskKind::MatchEnd,
                TaskKind::Round,
                TaskKind::HandFlow,
            ],
            Phase::Action => &[
                TaskKind::MatchStart,
                TaskKind::MatchEnd,
                TaskKind::Round,
                TaskKind::PlayerPlayed,
                TaskKind::OpponentPlayed,
                TaskKind::DrawPrompt,
            ],
            Phase::Draw(_) => &[
                TaskKind::MatchStart,
                TaskKind::MatchEnd,
                TaskKind::Round,
                TaskKind::DrawnCard,
                TaskKind::OfferFlow,
            ],
        }
    }

    fn same_phase(&self, other: &Phase) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Draw(stage) => write!(f, "draw/{:?}", stage),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Filtered task outputs of one frame.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub session_start: bool,
    pub session_end: Option<Outcome>,
    pub round: Option<u32>,
    pub played: Vec<(Side, SymbolId)>,
    pub draw_prompt: bool,
    pub drawn_card: Option<SymbolId>,
    /// Raw per-frame presence of the drawn symbol.
    pub drawn_present: Option<SymbolId>,
    pub hand: Option<FlowObservation>,
    pub offer: Option<FlowObservation>,
}

impl Signals {
    pub fn collect(outputs: Vec<(TaskKind, TaskOutput)>, controls: &ControlSymbols) -> Self {
        let mut signals = Signals::default();
        for (kind, output) in outputs {
            match (kind, output) {
                (TaskKind::MatchStart, TaskOutput::Symbol(s)) => {
                    signals.session_start = s.event.is_some();
                }
                (TaskKind::MatchEnd, TaskOutput::Symbol(s)) => {
                    signals.session_end = s.event.map(|id| {
                        if id == controls.victory {
                            Outcome::Victory
                        } else if id == controls.defeat {
                            Outcome::Defeat
                        } else {
                            Outcome::Unknown
                        }
                    });
                }
                (TaskKind::DrawPrompt, TaskOutput::Symbol(s)) => {
                    signals.draw_prompt = s.event.is_some();
                }
                (TaskKind::PlayerPlayed, TaskOutput::Symbol(s)) => {
                    signals.played.extend(s.event.map(|id| (Side::Player, id)));
                }
                (TaskKind::OpponentPlayed, TaskOutput::Symbol(s)) => {
                    signals.played.extend(s.event.map(|id| (Side::Opponent, id)));
                }
                (TaskKind::DrawnCard, TaskOutput::Symbol(s)) => {
                    signals.drawn_card = s.event;
                    signals.drawn_present = s.present;
                }
                (TaskKind::Round, TaskOutput::Round(round)) => signals.round = round,
                (TaskKind::HandFlow, TaskOutput::Flow(obs)) => signals.hand = Some(obs),
                (TaskKind::OfferFlow, TaskOutput::Flow(obs)) => signals.offer = Some(obs),
                (kind, output) => debug!("Ignoring {:?} from {}", output, kind),
            }
        }
        signals
    }
}

/// Symbol naming for emitted events.
pub struct Namer<'a> {
    pub symbols: &'a SymbolData,
    pub locale: &'a str,
}

impl Namer<'_> {
    pub fn card(&self, id: Option<SymbolId>) -> CardRef {
        self.symbols.card_ref(id, self.locale)
    }

    pub fn cards(&self, ids: &[Option<SymbolId>]) -> Vec<CardRef> {
        ids.iter().map(|&id| self.card(id)).collect()
    }
}

#[derive(Debug, Clone, Default)]
struct DrawProgress {
    source: Option<SymbolId>,
    absent_frames: usize,
    unresolved_frames: usize,
    offered: Vec<Option<SymbolId>>,
    /// Last non-empty row seen in the Select stage.
    row: Vec<Option<SymbolId>>,
    selected: Option<Vec<Option<SymbolId>>>,
    empty_frames: usize,
}

/// True when `next` holds a different count or a different identified symbol
/// in any slot. Slots unidentified on either side do not count as a change.
fn row_changed(prev: &[Option<SymbolId>], next: &[Option<SymbolId>]) -> bool {
    prev.len() != next.len()
        || prev
            .iter()
            .zip(next)
            .any(|pair| matches!(pair, (Some(a), Some(b)) if a != b))
}

pub struct SessionMachine {
    phase: Phase,
    round: Option<u32>,
    draw: DrawProgress,
    config: DrawPhaseConfig,
}

impl SessionMachine {
    pub fn new(config: DrawPhaseConfig) -> Self {
        Self {
            phase: Phase::NotStarted,
            round: None,
            draw: DrawProgress::default(),
            config,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> Option<u32> {
        self.round
    }

    pub fn active_tasks(&self) -> &'static [TaskKind] {
        self.phase.active_tasks()
    }

    /// Back to the initial phase with every task cleared.
    pub fn reset(&mut self, tasks: &mut TaskSet) {
        info!("Session reset from {}", self.phase);
        self.phase = Phase::NotStarted;
        self.round = None;
        self.draw = DrawProgress::default();
        tasks.reset_all();
    }

    /// One-line state summary.
    pub fn describe(&self) -> String {
        format!(
            "phase={} round={:?} draw_source={:?} offered={:?}",
            self.phase, self.round, self.draw.source, self.draw.offered
        )
    }

    /// Advance one frame and return the events it produced.
    pub fn step(&mut self, signals: &Signals, tasks: &mut TaskSet, names: &Namer<'_>) -> Vec<Event> {
        let mut events = Vec::new();

        if signals.session_start {
            events.push(Event::MatchStarted);
            self.transition(Phase::StartingHand, tasks, names, &mut events);
            return events;
        }

        let mut pending = Vec::new();
        let next = self.next_phase(signals, tasks, names, &mut pending);
        if next.same_phase(&self.phase) {
            if next != self.phase {
                debug!("Stage {} -> {}", self.phase, next);
                self.phase = next;
            }
        } else {
            self.transition(next, tasks, names, &mut events);
        }
        events.extend(pending);
        events
    }

    fn round_advance(&mut self, signals: &Signals, pending: &mut Vec<Event>) -> bool {
        let Some(round) = signals.round else {
            return false;
        };
        if !self.round.is_none_or(|current| round > current) {
            return false;
        }
        self.round = Some(round);
        pending.push(Event::RoundAdvanced { round });
        true
    }

    fn next_phase(
        &mut self,
        signals: &Signals,
        tasks: &mut TaskSet,
        names: &Namer<'_>,
        pending: &mut Vec<Event>,
    ) -> Phase {
        if self.phase != Phase::NotStarted {
            if let Some(outcome) = signals.session_end {
                pending.push(Event::MatchEnded { outcome });
                return Phase::NotStarted;
            }
        }

        match self.phase {
            Phase::NotStarted => Phase::NotStarted,
            Phase::StartingHand => {
                if self.round_advance(signals, pending) {
                    Phase::Action
                } else {
                    Phase::StartingHand
                }
            }
            Phase::Action => {
                for &(side, id) in &signals.played {
                    pending.push(Event::CardPlayed {
                        side,
                        card: names.card(Some(id)),
                    });
                }
                self.round_advance(signals, pending);
                if signals.draw_prompt {
                    Phase::Draw(DrawStage::Draw)
                } else {
                    Phase::Action
                }
            }
            Phase::Draw(stage) => {
                if self.round_advance(signals, pending) {
                    return Phase::Action;
                }
                self.draw_stage(stage, signals, tasks)
            }
        }
    }

    fn draw_stage(&mut self, stage: DrawStage, signals: &Signals, tasks: &mut TaskSet) -> Phase {
        let Some(recorder) = tasks.recorder_mut(TaskKind::OfferFlow) else {
            return Phase::Action;
        };

        match stage {
            DrawStage::Draw => {
                if let Some(id) = signals.drawn_card {
                    self.draw.source = Some(id);
                }
                if self.draw.source.is_some() {
                    if signals.drawn_present.is_some() {
                        self.draw.absent_frames = 0;
                    } else {
                        self.draw.absent_frames += 1;
                    }
                    if self.draw.absent_frames >= self.config.vacate_frames {
                        return Phase::Draw(DrawStage::Count);
                    }
                } else if recorder.stable_count().is_some() {
                    // Offer without a recognized drawn symbol.
                    return Phase::Draw(DrawStage::Count);
                }
                Phase::Draw(DrawStage::Draw)
            }
            DrawStage::Count => {
                let Some(slots) = recorder.resolve() else {
                    return Phase::Draw(DrawStage::Count);
                };
                if slots.iter().any(Option::is_none) {
                    self.draw.unresolved_frames += 1;
                    if self.draw.unresolved_frames < self.config.boundary_frames {
                        return Phase::Draw(DrawStage::Count);
                    }
                    error!(
                        "Offered row did not resolve, continuing with unknowns: {}",
                        recorder.dump()
                    );
                }
                self.draw.offered = slots;
                recorder.clear();
                Phase::Draw(DrawStage::Select)
            }
            DrawStage::Select => {
                let row = signals.offer.as_ref().map_or(&[][..], |obs| obs.slots.as_slice());
                if !row.is_empty() {
                    // Only the current arrangement votes.
                    if row_changed(&self.draw.row, row) {
                        debug!("Selection row changed: {:?} -> {:?}", self.draw.row, row);
                        recorder.clear();
                        recorder.record(row);
                    }
                    self.draw.row = row.to_vec();
                }
                if let Some(slots) = recorder.resolve() {
                    self.draw.selected = Some(slots);
                }
                if row.is_empty() {
                    self.draw.empty_frames += 1;
                } else {
                    self.draw.empty_frames = 0;
                }
                if self.draw.empty_frames >= self.config.boundary_frames {
                    Phase::Action
                } else {
                    Phase::Draw(DrawStage::Select)
                }
            }
        }
    }

    fn transition(&mut self, next: Phase, tasks: &mut TaskSet, names: &Namer<'_>, events: &mut Vec<Event>) {
        let prev = self.phase;
        self.on_exit(prev, next, tasks, names, events);
        if !prev.same_phase(&next) {
            info!("Phase {} -> {}", prev, next);
            events.push(Event::PhaseChanged {
                from: prev.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.phase = next;
        self.on_enter(prev, next, tasks);
    }

    fn on_exit(&mut self, prev: Phase, next: Phase, tasks: &mut TaskSet, names: &Namer<'_>, events: &mut Vec<Event>) {
        match (prev, next) {
            (Phase::StartingHand, Phase::Action) => {
                if let Some(recorder) = tasks.recorder_mut(TaskKind::HandFlow) {
                    let slots = recorder
                        .resolve()
                        .or_else(|| {
                            recorder
                                .last_count()
                                .filter(|&count| count > 0)
                                .map(|count| recorder.slots_for(count))
                        })
                        .unwrap_or_default();
                    if slots.is_empty() {
                        warn!("Starting hand was never located");
                    } else if slots.iter().any(Option::is_none) {
                        error!("Starting hand has unresolved slots: {}", recorder.dump());
                    }
                    recorder.clear();
                    events.push(Event::StartingHand {
                        cards: names.cards(&slots),
                    });
                }
            }
            (Phase::Draw(_), Phase::Action) => {
                let draw = std::mem::take(&mut self.draw);
                let offered: Multiset<Option<SymbolId>> = draw.offered.iter().copied().collect();
                let finals: Multiset<Option<SymbolId>> = draw
                    .selected
                    .as_ref()
                    .unwrap_or(&draw.offered)
                    .iter()
                    .copied()
                    .collect();
                if draw.source.is_none() && finals.is_empty() {
                    debug!("Draw phase ended without anything drawn");
                    return;
                }
                if finals.count(&None) > 0 {
                    if let Some(recorder) = tasks.recorder(TaskKind::OfferFlow) {
                        error!("Drawn cards have unresolved slots: {}", recorder.dump());
                    }
                }
                events.push(Event::CardsDrawn {
                    source: draw.source.map(|id| names.card(Some(id))),
                    drawn: names.cards(&finals.intersection(&offered).to_vec()),
                    created: names.cards(&finals.difference(&offered).to_vec()),
                });
            }
            _ => {}
        }
    }

    fn on_enter(&mut self, prev: Phase, next: Phase, tasks: &mut TaskSet) {
        // Tasks that were idle hold stale windows.
        for &kind in next.active_tasks() {
            if !prev.active_tasks().contains(&kind) {
                tasks.reset(kind);
            }
        }

        match next {
            Phase::NotStarted => {
                self.round = None;
            }
            Phase::StartingHand => {
                self.round = None;
                self.draw = DrawProgress::default();
                tasks.reset(TaskKind::Round);
                tasks.reset(TaskKind::HandFlow);
            }
            Phase::Action => {}
            Phase::Draw(_) => {
                self.draw = DrawProgress::default();
                tasks.reset(TaskKind::DrawnCard);
                tasks.reset(TaskKind::OfferFlow);
            }
        }
    }
}
