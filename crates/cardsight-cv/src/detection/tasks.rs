//! Per-region detector tasks
//!
//! Every task owns its geometry, its temporal filter (or recorder) and the
//! last raw match, and is driven one frame at a time by the tracker.

use super::config::{ControlSymbols, FlowConfig, RoundConfig, TrackerConfig};
use super::filter::{FilterConfig, StreamFilter};
use super::flow::{find_glyphs, read_digit, FlowLocator};
use super::recorder::{RecorderConfig, TaskRecorder};
use crate::bbox::{CropBox, FracBox};
use crate::hash::{DualHashMatcher, HashExtractor, HashKind, IndexSet, MatchOutcome, SingleHashMatcher};
use crate::traits::{Detector, SymbolIndex};
use crate::utils::ImageUtils;
use crate::Result;
use cardsight_core::{Side, SymbolClass, SymbolData, SymbolId};
use image::GrayImage;
use log::{debug, trace};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Classifiers shared by every task.
pub struct Classifiers {
    pub cards: DualHashMatcher,
    pub controls: SingleHashMatcher,
    pub digits: SingleHashMatcher,
}

impl Classifiers {
    /// Build the matchers from loaded indices; every index must exist and
    /// match its extractor's vector length.
    pub fn load(config: &TrackerConfig, indices: &IndexSet, symbols: &SymbolData) -> Result<Self> {
        let hash = &config.hash;
        let aliases = symbols.alias_table();

        let card_extractor = HashExtractor::new(hash.card_size);
        let card_bits = card_extractor.bits();
        let dhash: Arc<dyn SymbolIndex> =
            indices.get_checked(SymbolClass::Card, HashKind::Difference, card_bits)?;
        let ahash: Arc<dyn SymbolIndex> =
            indices.get_checked(SymbolClass::Card, HashKind::Average, card_bits)?;

        let control_extractor = HashExtractor::new(hash.control_size);
        let controls: Arc<dyn SymbolIndex> = indices.get_checked(
            SymbolClass::Control,
            hash.control_kind,
            control_extractor.bits(),
        )?;

        let digit_extractor = HashExtractor::new(hash.digit_size);
        let digits: Arc<dyn SymbolIndex> =
            indices.get_checked(SymbolClass::Digit, hash.digit_kind, digit_extractor.bits())?;

        Ok(Self {
            cards: DualHashMatcher::new(card_extractor, dhash, ahash, config.card_matching)
                .with_aliases(aliases.clone()),
            controls: SingleHashMatcher::new(
                control_extractor,
                hash.control_kind,
                controls,
                config.control_matching,
            )
            .with_aliases(aliases),
            digits: SingleHashMatcher::new(
                digit_extractor,
                hash.digit_kind,
                digits,
                config.digit_matching,
            ),
        })
    }
}

/// Everything a task sees of one frame.
pub struct FrameContext<'a> {
    pub gray: &'a GrayImage,
    pub frame_index: u64,
    pub classifiers: &'a Classifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    MatchStart,
    MatchEnd,
    DrawPrompt,
    Round,
    PlayerPlayed,
    OpponentPlayed,
    DrawnCard,
    HandFlow,
    OfferFlow,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::MatchStart => "match_start",
            TaskKind::MatchEnd => "match_end",
            TaskKind::DrawPrompt => "draw_prompt",
            TaskKind::Round => "round",
            TaskKind::PlayerPlayed => "player_played",
            TaskKind::OpponentPlayed => "opponent_played",
            TaskKind::DrawnCard => "drawn_card",
            TaskKind::HandFlow => "hand_flow",
            TaskKind::OfferFlow => "offer_flow",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filtered symbol signal: `event` only on the rising edge, `present` is the
/// raw per-frame classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolSignal {
    pub event: Option<SymbolId>,
    pub present: Option<SymbolId>,
}

/// One frame of a row detector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowObservation {
    pub slots: Vec<Option<SymbolId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    Symbol(SymbolSignal),
    Round(Option<u32>),
    Flow(FlowObservation),
}

/// Control symbol in a fixed region, restricted to an accepted set.
pub struct ControlTask {
    kind: TaskKind,
    frac: FracBox,
    region: CropBox,
    accepted: Vec<SymbolId>,
    filter: StreamFilter<SymbolId>,
    last: Option<MatchOutcome>,
}

impl ControlTask {
    pub fn new(kind: TaskKind, frac: FracBox, accepted: Vec<SymbolId>, filter: FilterConfig) -> Self {
        Self {
            kind,
            frac,
            region: CropBox::default(),
            accepted,
            filter: StreamFilter::new(filter),
            last: None,
        }
    }
}

impl Detector for ControlTask {
    type Output = SymbolSignal;

    fn on_resize(&mut self, width: u32, height: u32) {
        self.region = self.frac.resolve(width, height);
    }

    fn tick(&mut self, frame: &FrameContext<'_>) -> SymbolSignal {
        let Some(crop) = ImageUtils::crop_gray(frame.gray, &self.region) else {
            self.filter.push(None, u32::MAX);
            return SymbolSignal::default();
        };
        let outcome = frame.classifiers.controls.match_region(&crop);
        let present = outcome.id.filter(|id| self.accepted.contains(id));
        let event = self.filter.push(present, outcome.distance);
        if let Some(id) = event {
            debug!("Frame {}: {} signalled {}", frame.frame_index, self.kind, id);
        }
        self.last = Some(outcome);
        SymbolSignal { event, present }
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.last = None;
    }

    fn regions(&self) -> Vec<CropBox> {
        vec![self.region]
    }
}

/// Card symbol in a fixed region.
pub struct CardTask {
    kind: TaskKind,
    side: Option<Side>,
    frac: FracBox,
    region: CropBox,
    filter: StreamFilter<SymbolId>,
    last: Option<MatchOutcome>,
}

impl CardTask {
    pub fn new(kind: TaskKind, side: Option<Side>, frac: FracBox, filter: FilterConfig) -> Self {
        Self {
            kind,
            side,
            frac,
            region: CropBox::default(),
            filter: StreamFilter::new(filter),
            last: None,
        }
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }
}

impl Detector for CardTask {
    type Output = SymbolSignal;

    fn on_resize(&mut self, width: u32, height: u32) {
        self.region = self.frac.resolve(width, height);
    }

    fn tick(&mut self, frame: &FrameContext<'_>) -> SymbolSignal {
        let Some(crop) = ImageUtils::crop_gray(frame.gray, &self.region) else {
            self.filter.push(None, u32::MAX);
            return SymbolSignal::default();
        };
        let outcome = frame.classifiers.cards.match_region(&crop);
        let present = outcome.id;
        let event = self.filter.push(present, outcome.distance);
        if let Some(id) = event {
            debug!("Frame {}: {} signalled {}", frame.frame_index, self.kind, id);
        }
        self.last = Some(outcome);
        SymbolSignal { event, present }
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.last = None;
    }

    fn regions(&self) -> Vec<CropBox> {
        vec![self.region]
    }
}

/// Multi-digit round number, read left to right.
pub struct RoundTask {
    config: RoundConfig,
    region: CropBox,
    filter: StreamFilter<u32>,
    last: Option<u32>,
}

impl RoundTask {
    /// Digits beyond this are treated as noise.
    const MAX_DIGITS: usize = 3;

    pub fn new(config: RoundConfig, filter: FilterConfig) -> Self {
        Self {
            config,
            region: CropBox::default(),
            filter: StreamFilter::new(filter),
            last: None,
        }
    }

    /// Round value and the worst digit distance.
    fn read(&self, frame: &FrameContext<'_>) -> Option<(u32, u32)> {
        let gray = frame.gray;
        let glyphs = find_glyphs(gray, &self.region, &self.config.glyphs);
        if glyphs.is_empty() || glyphs.len() > Self::MAX_DIGITS {
            return None;
        }
        let mut value = 0u32;
        let mut worst = 0u32;
        for glyph in &glyphs {
            let (digit, distance) = read_digit(gray, glyph, &frame.classifiers.digits)?;
            value = value * 10 + digit as u32;
            worst = worst.max(distance);
        }
        Some((value, worst))
    }
}

impl Detector for RoundTask {
    type Output = Option<u32>;

    fn on_resize(&mut self, width: u32, height: u32) {
        self.region = self.config.region.resolve(width, height);
    }

    fn tick(&mut self, frame: &FrameContext<'_>) -> Option<u32> {
        let read = self.read(frame);
        self.last = read.map(|(value, _)| value);
        match read {
            Some((value, distance)) => self.filter.push(Some(value), distance),
            None => self.filter.push(None, u32::MAX),
        }
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.last = None;
    }

    fn regions(&self) -> Vec<CropBox> {
        vec![self.region]
    }
}

/// Row of an unknown number of cards, accumulated in a recorder.
pub struct FlowTask {
    kind: TaskKind,
    locator: FlowLocator,
    recorder: TaskRecorder,
    last_boxes: Vec<CropBox>,
}

impl FlowTask {
    pub fn new(kind: TaskKind, config: FlowConfig, recorder: RecorderConfig) -> Self {
        Self {
            kind,
            locator: FlowLocator::new(config),
            recorder: TaskRecorder::new(recorder),
            last_boxes: Vec::new(),
        }
    }

    pub fn recorder(&self) -> &TaskRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut TaskRecorder {
        &mut self.recorder
    }

    pub fn locator(&self) -> &FlowLocator {
        &self.locator
    }
}

fn identify_one(gray: &GrayImage, region: &CropBox, cards: &DualHashMatcher) -> Option<SymbolId> {
    ImageUtils::crop_gray(gray, region).and_then(|crop| cards.match_region(&crop).id)
}

/// Identify every slot
#[cfg(feature = "parallel")]
fn identify_slots(gray: &GrayImage, boxes: &[CropBox], cards: &DualHashMatcher) -> Vec<Option<SymbolId>> {
    boxes.par_iter().map(|b| identify_one(gray, b, cards)).collect()
}

/// Identify every slot
#[cfg(not(feature = "parallel"))]
fn identify_slots(gray: &GrayImage, boxes: &[CropBox], cards: &DualHashMatcher) -> Vec<Option<SymbolId>> {
    boxes.iter().map(|b| identify_one(gray, b, cards)).collect()
}

impl Detector for FlowTask {
    type Output = FlowObservation;

    fn on_resize(&mut self, width: u32, height: u32) {
        self.locator.on_resize(width, height);
    }

    fn tick(&mut self, frame: &FrameContext<'_>) -> FlowObservation {
        let boxes: Vec<CropBox> = self
            .locator
            .locate(frame.gray, &frame.classifiers.digits)
            .into_iter()
            .map(|slot| slot.symbol)
            .collect();
        let slots = identify_slots(frame.gray, &boxes, &frame.classifiers.cards);
        trace!("Frame {}: {} slots {:?}", frame.frame_index, self.kind, slots);
        self.recorder.record(&slots);
        self.last_boxes = boxes;
        FlowObservation { slots }
    }

    fn reset(&mut self) {
        self.recorder.clear();
        self.last_boxes.clear();
    }

    fn regions(&self) -> Vec<CropBox> {
        let mut regions = vec![self.locator.search()];
        regions.extend(self.last_boxes.iter().copied());
        regions
    }
}

/// Closed set of detector tasks.
pub enum Task {
    Control(ControlTask),
    Card(CardTask),
    Round(RoundTask),
    Flow(FlowTask),
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Control(t) => t.kind,
            Task::Card(t) => t.kind,
            Task::Round(_) => TaskKind::Round,
            Task::Flow(t) => t.kind,
        }
    }

    /// Last raw match of a symbol task, for diagnostics.
    pub fn last_outcome(&self) -> Option<&MatchOutcome> {
        match self {
            Task::Control(t) => t.last.as_ref(),
            Task::Card(t) => t.last.as_ref(),
            _ => None,
        }
    }

    /// One-line state summary, for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Task::Control(_) | Task::Card(_) => match self.last_outcome() {
                Some(o) => format!("{:?} d={} {:?} tops={:?}", o.id, o.distance, o.verdict, o.tops),
                None => "idle".to_string(),
            },
            Task::Round(t) => format!("read={:?} tracked={:?}", t.last, t.filter.tracked()),
            Task::Flow(t) => t.recorder.dump(),
        }
    }
}

impl Detector for Task {
    type Output = TaskOutput;

    fn on_resize(&mut self, width: u32, height: u32) {
        match self {
            Task::Control(t) => t.on_resize(width, height),
            Task::Card(t) => t.on_resize(width, height),
            Task::Round(t) => t.on_resize(width, height),
            Task::Flow(t) => t.on_resize(width, height),
        }
    }

    fn tick(&mut self, frame: &FrameContext<'_>) -> TaskOutput {
        match self {
            Task::Control(t) => TaskOutput::Symbol(t.tick(frame)),
            Task::Card(t) => TaskOutput::Symbol(t.tick(frame)),
            Task::Round(t) => TaskOutput::Round(t.tick(frame)),
            Task::Flow(t) => TaskOutput::Flow(t.tick(frame)),
        }
    }

    fn reset(&mut self) {
        match self {
            Task::Control(t) => t.reset(),
            Task::Card(t) => t.reset(),
            Task::Round(t) => t.reset(),
            Task::Flow(t) => t.reset(),
        }
    }

    fn regions(&self) -> Vec<CropBox> {
        match self {
            Task::Control(t) => t.regions(),
            Task::Card(t) => t.regions(),
            Task::Round(t) => t.regions(),
            Task::Flow(t) => t.regions(),
        }
    }
}

/// Every task of a tracker, keyed by kind.
pub struct TaskSet {
    tasks: Vec<Task>,
}

impl TaskSet {
    pub fn new(config: &TrackerConfig) -> Self {
        let regions = &config.regions;
        let ControlSymbols { match_start, victory, defeat, draw_prompt } = config.controls;
        let tasks = vec![
            Task::Control(ControlTask::new(
                TaskKind::MatchStart,
                regions.match_banner,
                vec![match_start],
                config.control_filter,
            )),
            Task::Control(ControlTask::new(
                TaskKind::MatchEnd,
                regions.result_banner,
                vec![victory, defeat],
                config.control_filter,
            )),
            Task::Control(ControlTask::new(
                TaskKind::DrawPrompt,
                regions.draw_prompt,
                vec![draw_prompt],
                config.control_filter,
            )),
            Task::Round(RoundTask::new(regions.round.clone(), config.card_filter)),
            Task::Card(CardTask::new(
                TaskKind::PlayerPlayed,
                Some(Side::Player),
                regions.player_played,
                config.card_filter,
            )),
            Task::Card(CardTask::new(
                TaskKind::OpponentPlayed,
                Some(Side::Opponent),
                regions.opponent_played,
                config.card_filter,
            )),
            Task::Card(CardTask::new(
                TaskKind::DrawnCard,
                None,
                regions.drawn_card,
                config.card_filter,
            )),
            Task::Flow(FlowTask::new(
                TaskKind::HandFlow,
                regions.hand_flow.clone(),
                config.recorder,
            )),
            Task::Flow(FlowTask::new(
                TaskKind::OfferFlow,
                regions.offer_flow.clone(),
                config.recorder,
            )),
        ];
        Self { tasks }
    }

    pub fn get(&self, kind: TaskKind) -> Option<&Task> {
        self.tasks.iter().find(|t| t.kind() == kind)
    }

    pub fn get_mut(&mut self, kind: TaskKind) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn recorder(&self, kind: TaskKind) -> Option<&TaskRecorder> {
        match self.get(kind)? {
            Task::Flow(t) => Some(t.recorder()),
            _ => None,
        }
    }

    pub fn recorder_mut(&mut self, kind: TaskKind) -> Option<&mut TaskRecorder> {
        match self.get_mut(kind)? {
            Task::Flow(t) => Some(t.recorder_mut()),
            _ => None,
        }
    }

    pub fn reset(&mut self, kind: TaskKind) {
        if let Some(task) = self.get_mut(kind) {
            task.reset();
        }
    }

    pub fn reset_all(&mut self) {
        self.tasks.iter_mut().for_each(Detector::reset);
    }

    pub fn on_resize(&mut self, width: u32, height: u32) {
        for task in &mut self.tasks {
            task.on_resize(width, height);
        }
    }

    /// Tick the given tasks in order.
    pub fn tick(&mut self, active: &[TaskKind], frame: &FrameContext<'_>) -> Vec<(TaskKind, TaskOutput)> {
        active
            .iter()
            .filter_map(|&kind| self.get_mut(kind).map(|task| (kind, task.tick(frame))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{FeatureVector, LinearIndex};
    use image::Luma;

    fn gradient(width: u32, height: u32, rising: bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            let v = (x * 255 / width.max(1)) as u8;
            Luma([if rising { v } else { 255 - v }])
        })
    }

    /// Classifiers over a single card (id 7, rising gradient) and a single
    /// control (id 1, falling gradient).
    fn classifiers() -> Result<Classifiers> {
        let config = TrackerConfig::default();
        let extractor = HashExtractor::new(8);
        let card = gradient(40, 40, true);
        let control = gradient(40, 40, false);

        let mut indices = IndexSet::new();
        for kind in [HashKind::Difference, HashKind::Average] {
            indices.insert(
                SymbolClass::Card,
                kind,
                LinearIndex::from_entries(64, [(SymbolId(7), extractor.extract(kind, &card))]),
            );
        }
        indices.insert(
            SymbolClass::Control,
            HashKind::Perceptual,
            LinearIndex::from_entries(64, [(SymbolId(1), extractor.perceptual(&control))]),
        );
        indices.insert(
            SymbolClass::Digit,
            HashKind::Average,
            LinearIndex::from_entries(64, [(SymbolId(0), FeatureVector::zeros(64))]),
        );
        Classifiers::load(&config, &indices, &SymbolData::default())
    }

    #[test]
    fn test_missing_index_is_an_error() {
        let result = Classifiers::load(&TrackerConfig::default(), &IndexSet::new(), &SymbolData::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_card_task_signals_once() -> Result<()> {
        let classifiers = classifiers()?;
        let mut task = CardTask::new(
            TaskKind::PlayerPlayed,
            Some(Side::Player),
            FracBox::new(0.0, 0.0, 0.5, 1.0),
            FilterConfig::default(),
        );
        task.on_resize(80, 40);
        assert_eq!(task.regions(), vec![CropBox::new(0, 0, 40, 40)]);

        let mut frame = GrayImage::new(80, 40);
        image::imageops::replace(&mut frame, &gradient(40, 40, true), 0, 0);

        let mut events = Vec::new();
        for i in 0..30 {
            let ctx = FrameContext { gray: &frame, frame_index: i, classifiers: &classifiers };
            let signal = task.tick(&ctx);
            assert_eq!(signal.present, Some(SymbolId(7)));
            events.extend(signal.event);
        }
        assert_eq!(events, vec![SymbolId(7)]);
        Ok(())
    }

    #[test]
    fn test_control_task_ignores_unaccepted_symbols() -> Result<()> {
        let classifiers = classifiers()?;
        let mut task = ControlTask::new(
            TaskKind::DrawPrompt,
            FracBox::new(0.0, 0.0, 1.0, 1.0),
            vec![SymbolId(4)],
            FilterConfig::default(),
        );
        task.on_resize(40, 40);
        let frame = gradient(40, 40, false);
        for i in 0..30 {
            let ctx = FrameContext { gray: &frame, frame_index: i, classifiers: &classifiers };
            assert_eq!(task.tick(&ctx), SymbolSignal::default());
        }
        Ok(())
    }

    #[test]
    fn test_task_set_ticks_only_active_kinds() -> Result<()> {
        let classifiers = classifiers()?;
        let mut tasks = TaskSet::new(&TrackerConfig::default());
        tasks.on_resize(160, 90);
        let frame = GrayImage::new(160, 90);
        let ctx = FrameContext { gray: &frame, frame_index: 0, classifiers: &classifiers };

        let outputs = tasks.tick(&[TaskKind::MatchStart, TaskKind::HandFlow], &ctx);
        let kinds: Vec<TaskKind> = outputs.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![TaskKind::MatchStart, TaskKind::HandFlow]);
        assert_eq!(outputs[1].1, TaskOutput::Flow(FlowObservation::default()));
        assert_eq!(tasks.recorder(TaskKind::HandFlow).map(|r| r.frames()), Some(1));
        assert!(tasks.recorder(TaskKind::MatchStart).is_none());
        Ok(())
    }
}
