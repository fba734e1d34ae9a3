//! Tracker configuration

use super::filter::FilterConfig;
use super::recorder::RecorderConfig;
use crate::bbox::{FracBox, FracOffset};
use crate::hash::matcher::{MatchConfig, SingleMatchConfig};
use crate::hash::HashKind;
use crate::Result;
use anyhow::Context;
use cardsight_core::SymbolId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub symbols_file: PathBuf,
    pub index_dir: PathBuf,
    pub locale: String,
    pub hash: HashConfig,
    pub card_matching: MatchConfig,
    pub control_matching: SingleMatchConfig,
    pub digit_matching: SingleMatchConfig,
    pub card_filter: FilterConfig,
    pub control_filter: FilterConfig,
    pub recorder: RecorderConfig,
    pub regions: RegionConfig,
    pub controls: ControlSymbols,
    pub content: ContentConfig,
    pub draw: DrawPhaseConfig,
    /// Ticks between diagnostic log lines; 0 disables them.
    pub diagnostics_interval: u64,
}

/// Hash grid sizes and families per symbol class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    pub card_size: u32,
    pub control_size: u32,
    pub control_kind: HashKind,
    pub digit_size: u32,
    pub digit_kind: HashKind,
}

/// Size priors used to pick digit glyphs out of a binarized region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlyphConfig {
    /// Pixels brighter than this are glyph foreground.
    pub binarize_threshold: u8,
    /// Minimum glyph height as a fraction of the search height.
    pub min_height_frac: f64,
    /// Maximum glyph width as a fraction of the search width.
    pub max_width_frac: f64,
    /// Components smaller than this many pixels are noise.
    pub min_pixels: u32,
}

/// Variable-count row detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub search: FracBox,
    pub glyphs: GlyphConfig,
    /// Allowed offset of the row's center from the search center, as a
    /// fraction of the search width.
    pub center_tolerance: f64,
    /// Allowed relative deviation of each gap from the reference gap.
    pub spacing_tolerance: f64,
    /// Digit value -> symbol placement relative to the glyph.
    pub digit_offsets: BTreeMap<u8, FracOffset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    pub region: FracBox,
    pub glyphs: GlyphConfig,
}

/// Fractional regions of every detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub player_played: FracBox,
    pub opponent_played: FracBox,
    pub drawn_card: FracBox,
    pub match_banner: FracBox,
    pub result_banner: FracBox,
    pub draw_prompt: FracBox,
    pub round: RoundConfig,
    pub hand_flow: FlowConfig,
    pub offer_flow: FlowConfig,
}

/// Control-class symbol ids with a fixed meaning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSymbols {
    pub match_start: SymbolId,
    pub victory: SymbolId,
    pub defeat: SymbolId,
    pub draw_prompt: SymbolId,
}

/// Letterbox removal before geometry is applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub enabled: bool,
    pub threshold: u8,
    pub min_fraction: f64,
}

/// Dwell times of the draw sub-phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawPhaseConfig {
    /// Frames the drawn symbol must stay absent before counting starts.
    pub vacate_frames: usize,
    /// Frames without offered symbols that end the sub-phase.
    pub boundary_frames: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            symbols_file: "assets/symbols.json".into(),
            index_dir: "assets/index".into(),
            locale: "en".to_string(),
            hash: HashConfig::default(),
            card_matching: MatchConfig::default(),
            control_matching: SingleMatchConfig::default(),
            digit_matching: SingleMatchConfig {
                accept_distance: 8,
                min_margin: 2,
                top_k: 4,
            },
            card_filter: FilterConfig::default(),
            control_filter: FilterConfig {
                window: 8,
                min_count: 5,
                strict_distance: 4,
                valid_count: 3,
                cooldown: 30,
            },
            recorder: RecorderConfig::default(),
            regions: RegionConfig::default(),
            controls: ControlSymbols::default(),
            content: ContentConfig::default(),
            draw: DrawPhaseConfig::default(),
            diagnostics_interval: 300,
        }
    }
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            card_size: 8,
            control_size: 8,
            control_kind: HashKind::Perceptual,
            digit_size: 8,
            digit_kind: HashKind::Average,
        }
    }
}

impl Default for GlyphConfig {
    fn default() -> Self {
        Self {
            binarize_threshold: 200,
            min_height_frac: 0.4,
            max_width_frac: 0.2,
            min_pixels: 6,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            search: FracBox::new(0.15, 0.62, 0.85, 0.68),
            glyphs: GlyphConfig::default(),
            center_tolerance: 0.05,
            spacing_tolerance: 0.10,
            digit_offsets: (0..=9)
                .map(|d| {
                    (
                        d,
                        FracOffset {
                            dx: -0.045,
                            dy: -0.30,
                            width: 0.09,
                            height: 0.28,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            region: FracBox::new(0.90, 0.46, 0.97, 0.54),
            glyphs: GlyphConfig::default(),
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            player_played: FracBox::new(0.40, 0.52, 0.50, 0.74),
            opponent_played: FracBox::new(0.50, 0.26, 0.60, 0.48),
            drawn_card: FracBox::new(0.44, 0.30, 0.56, 0.58),
            match_banner: FracBox::new(0.35, 0.40, 0.65, 0.60),
            result_banner: FracBox::new(0.30, 0.20, 0.70, 0.45),
            draw_prompt: FracBox::new(0.38, 0.08, 0.62, 0.16),
            round: RoundConfig::default(),
            hand_flow: FlowConfig::default(),
            offer_flow: FlowConfig {
                search: FracBox::new(0.10, 0.72, 0.90, 0.78),
                ..FlowConfig::default()
            },
        }
    }
}

impl Default for ControlSymbols {
    fn default() -> Self {
        Self {
            match_start: SymbolId(1),
            victory: SymbolId(2),
            defeat: SymbolId(3),
            draw_prompt: SymbolId(4),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 16,
            min_fraction: 0.5,
        }
    }
}

impl Default for DrawPhaseConfig {
    fn default() -> Self {
        Self {
            vacate_frames: 15,
            boundary_frames: 20,
        }
    }
}

impl TrackerConfig {
    /// Load from a JSON file; missing fields keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse config: {:?}", path))
    }
}
