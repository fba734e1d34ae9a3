// tests/core_tests.rs
use anyhow::Result;
use cardsight_core::{Event, SymbolClass, SymbolData, SymbolId};
use cardsight_cv::{
    detection::{
        config::FlowConfig,
        filter::{FilterConfig, StreamFilter},
        state::Namer,
        Classifiers, FrameContext, Phase, SessionMachine, Signals, TaskKind, TaskSet,
    },
    hash::{matcher::MatchConfig, IndexSet, LinearIndex, Neighbor},
    traits::SymbolIndex,
    utils::ImageUtils,
    CropBox, DualHashMatcher, FeatureVector, FracBox, FracOffset, HashExtractor, HashKind,
    Tracker, TrackerConfig,
};
use image::{DynamicImage, GrayImage, Luma};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

const WIDTH: u32 = 400;
const HEIGHT: u32 = 300;
const BACKGROUND: u8 = 30;
const GLYPH_LEFTS: [u32; 3] = [114, 194, 274];
const CARD_IDS: [u32; 3] = [101, 102, 103];

fn card_boxes() -> Vec<CropBox> {
    GLYPH_LEFTS
        .iter()
        .map(|&x| CropBox::from_size(x as i32 - 24, 95, 60, 120))
        .collect()
}

fn glyph_box() -> CropBox {
    CropBox::new(GLYPH_LEFTS[0] as i32, 245, GLYPH_LEFTS[0] as i32 + 12, 265)
}

/// Three cards, each with a digit "3" glyph beneath it, on a dark table.
fn table_frame() -> GrayImage {
    let mut img = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([BACKGROUND]));

    for &x in &GLYPH_LEFTS {
        for dy in 0..20 {
            for dx in 0..12 {
                let hole = (4..8).contains(&dx) && (6..14).contains(&dy);
                img.put_pixel(x + dx, 245 + dy, Luma([if hole { BACKGROUND } else { 250 }]));
            }
        }
    }

    for (slot, card) in card_boxes().iter().enumerate() {
        for dy in 0..card.height() as u32 {
            for dx in 0..card.width() as u32 {
                let value = match slot {
                    0 => 40 + dx * 3,
                    1 => 217 - dx * 3,
                    _ => 40 + 6 * dx.min(59 - dx),
                };
                img.put_pixel(card.left as u32 + dx, card.top as u32 + dy, Luma([value as u8]));
            }
        }
    }
    img
}

/// Checkerboard marking the start of a match, top-left corner.
fn draw_banner(img: &mut GrayImage) {
    for y in 0..60 {
        for x in 0..80 {
            let on = (x / 10 + y / 10) % 2 == 0;
            img.put_pixel(x, y, Luma([if on { 220 } else { 20 }]));
        }
    }
}

fn test_config() -> TrackerConfig {
    let mut config = TrackerConfig::default();
    config.regions.hand_flow = FlowConfig {
        search: FracBox::new(0.0, 0.8, 1.0, 0.9),
        digit_offsets: [(3, FracOffset { dx: -0.075, dy: -0.5, width: 0.15, height: 0.4 })]
            .into_iter()
            .collect(),
        ..FlowConfig::default()
    };
    config.regions.match_banner = FracBox::new(0.0, 0.0, 0.2, 0.2);
    config
}

/// Indices built from the synthetic frame itself.
fn indices(config: &TrackerConfig) -> Result<IndexSet> {
    let frame = table_frame();
    let mut banner = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([BACKGROUND]));
    draw_banner(&mut banner);

    let card = HashExtractor::new(config.hash.card_size);
    let mut indices = IndexSet::new();
    for kind in [HashKind::Difference, HashKind::Average] {
        let mut index = LinearIndex::new(card.bits());
        for (id, b) in CARD_IDS.iter().zip(card_boxes()) {
            let crop = ImageUtils::crop_gray(&frame, &b).ok_or_else(|| anyhow::anyhow!("card crop"))?;
            index.insert(SymbolId(*id), card.extract(kind, &crop));
        }
        indices.insert(SymbolClass::Card, kind, index);
    }

    let control = HashExtractor::new(config.hash.control_size);
    let crop = ImageUtils::crop_gray(&banner, &CropBox::new(0, 0, 80, 60))
        .ok_or_else(|| anyhow::anyhow!("banner crop"))?;
    indices.insert(
        SymbolClass::Control,
        config.hash.control_kind,
        LinearIndex::from_entries(
            control.bits(),
            [(config.controls.match_start, control.extract(config.hash.control_kind, &crop))],
        ),
    );

    let digit = HashExtractor::new(config.hash.digit_size);
    let crop = ImageUtils::crop_gray(&frame, &glyph_box()).ok_or_else(|| anyhow::anyhow!("glyph crop"))?;
    indices.insert(
        SymbolClass::Digit,
        config.hash.digit_kind,
        LinearIndex::from_entries(digit.bits(), [(SymbolId(3), digit.extract(config.hash.digit_kind, &crop))]),
    );
    Ok(indices)
}

fn classifiers(config: &TrackerConfig) -> Result<Classifiers> {
    Classifiers::load(config, &indices(config)?, &SymbolData::default())
}

#[test]
fn test_hamming_distance_properties() {
    let mut rng = StdRng::seed_from_u64(7);
    for len in [64usize, 81, 256] {
        for _ in 0..20 {
            let a = FeatureVector::from_bits((0..len).map(|_| rng.gen::<bool>()));
            let b = FeatureVector::from_bits((0..len).map(|_| rng.gen::<bool>()));
            assert_eq!(a.distance(&a), 0);
            assert_eq!(a.distance(&b), b.distance(&a));
            assert!(a.distance(&b) as usize <= len);
        }
    }
}

#[test]
fn test_played_card_signals_once_over_forty_frames() {
    let config = FilterConfig::default();
    let mut filter = StreamFilter::new(config);
    let mut events = Vec::new();
    for frame in 0..40u32 {
        let raw = (10..=35).contains(&frame).then_some(SymbolId(42));
        if let Some(id) = filter.push(raw, 2) {
            events.push((frame, id));
        }
    }

    assert_eq!(events.len(), 1);
    let (frame, id) = events[0];
    assert_eq!(id, SymbolId(42));
    let expected = 10 + config.min_count.div_ceil(2) as u32 - 1 + config.valid_count as u32;
    assert_eq!(frame, expected);
}

struct FixedIndex(Vec<Neighbor>);

impl SymbolIndex for FixedIndex {
    fn bits(&self) -> usize {
        64
    }

    fn query(&self, _vector: &FeatureVector, k: usize) -> Vec<Neighbor> {
        self.0.iter().copied().take(k).collect()
    }
}

fn fixed(nearest: u32) -> Arc<dyn SymbolIndex> {
    Arc::new(FixedIndex(
        [(nearest, 5), (200, 14), (201, 15), (202, 16)]
            .iter()
            .map(|&(id, distance)| Neighbor { id: SymbolId(id), distance })
            .collect(),
    ))
}

#[test]
fn test_disagreeing_spaces_never_signal() {
    let matcher = DualHashMatcher::new(HashExtractor::new(8), fixed(5), fixed(7), MatchConfig::default());
    let mut filter = StreamFilter::new(FilterConfig::default());
    let vector = FeatureVector::zeros(64);

    for _ in 0..60 {
        let outcome = matcher.match_vectors(&vector, &vector);
        assert_eq!(outcome.id, None);
        assert_eq!(filter.push(outcome.id, outcome.distance), None);
    }
}

#[test]
fn test_session_start_overrides_action_phase() {
    let config = TrackerConfig::default();
    let mut tasks = TaskSet::new(&config);
    let mut machine = SessionMachine::new(config.draw);
    let symbols = SymbolData::default();
    let names = Namer { symbols: &symbols, locale: "en" };

    machine.step(&Signals { session_start: true, ..Signals::default() }, &mut tasks, &names);
    machine.step(&Signals { round: Some(1), ..Signals::default() }, &mut tasks, &names);
    assert_eq!(machine.phase(), Phase::Action);

    let events = machine.step(&Signals { session_start: true, ..Signals::default() }, &mut tasks, &names);
    assert_eq!(events.first(), Some(&Event::MatchStarted));
    assert_eq!(machine.phase(), Phase::StartingHand);
}

#[test]
fn test_resize_re_derives_every_region() -> Result<()> {
    let config = test_config();
    let mut tracker = Tracker::new(config.clone(), classifiers(&config)?, SymbolData::default());

    tracker.on_resize(1920, 1080);
    let played = tracker.task_regions(TaskKind::OpponentPlayed);
    tracker.on_resize(2560, 1440);

    assert_eq!(played, vec![config.regions.opponent_played.resolve(1920, 1080)]);
    assert_eq!(
        tracker.task_regions(TaskKind::OpponentPlayed),
        vec![config.regions.opponent_played.resolve(2560, 1440)]
    );
    assert_eq!(
        tracker.task_regions(TaskKind::HandFlow)[0],
        config.regions.hand_flow.search.resolve(2560, 1440)
    );
    Ok(())
}

#[test]
fn test_flow_row_resolves_three_slots() -> Result<()> {
    let config = test_config();
    let classifiers = classifiers(&config)?;
    let mut tasks = TaskSet::new(&config);
    tasks.on_resize(WIDTH, HEIGHT);

    let frame = table_frame();
    for i in 0..60 {
        let ctx = FrameContext { gray: &frame, frame_index: i, classifiers: &classifiers };
        tasks.tick(&[TaskKind::HandFlow], &ctx);
    }

    let recorder = tasks.recorder(TaskKind::HandFlow).ok_or_else(|| anyhow::anyhow!("recorder"))?;
    assert_eq!(recorder.stable_count(), Some(3));
    assert!(recorder.is_fully_resolved());
    assert_eq!(
        recorder.resolve(),
        Some(CARD_IDS.iter().map(|&id| Some(SymbolId(id))).collect())
    );
    Ok(())
}

#[test]
fn test_tracker_detects_match_start_and_records_hand() -> Result<()> {
    let config = test_config();
    let mut tracker = Tracker::new(config.clone(), classifiers(&config)?, SymbolData::default());

    let mut gray = table_frame();
    draw_banner(&mut gray);
    let frame = DynamicImage::ImageLuma8(gray);

    let mut records = Vec::new();
    for _ in 0..30 {
        records.extend(tracker.on_frame(&frame));
    }

    let kinds: Vec<&str> = records.iter().map(|r| r.event.kind()).collect();
    assert_eq!(kinds, vec!["match_started", "phase_changed"]);
    assert_eq!(tracker.phase(), Phase::StartingHand);

    let line = records[0].to_json_line()?;
    assert!(line.contains(r#""type":"match_started""#));

    let hand = tracker
        .tasks()
        .recorder(TaskKind::HandFlow)
        .and_then(|r| r.resolve())
        .unwrap_or_default();
    assert_eq!(hand, CARD_IDS.iter().map(|&id| Some(SymbolId(id))).collect::<Vec<_>>());
    Ok(())
}
