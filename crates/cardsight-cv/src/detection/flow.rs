//! Variable-count row detection
//!
//! Symbols laid out in a row are found through the digit glyph printed under
//! each of them: binarize the search strip, label connected components, keep
//! glyph-sized ones, read each digit and place the symbol box with the
//! per-digit offset table. The row is then validated as a whole.

use super::config::{FlowConfig, GlyphConfig};
use crate::bbox::CropBox;
use crate::hash::SingleHashMatcher;
use crate::utils::ImageUtils;
use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::region_labelling::{connected_components, Connectivity};
use log::trace;
use std::collections::HashMap;

/// One located symbol slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSlot {
    pub digit: u8,
    pub glyph: CropBox,
    pub symbol: CropBox,
}

/// Bounding boxes (frame coordinates) of glyph-sized bright components
/// inside `search`, left to right.
pub fn find_glyphs(gray: &GrayImage, search: &CropBox, config: &GlyphConfig) -> Vec<CropBox> {
    let Some(strip) = ImageUtils::crop_gray(gray, search) else {
        return Vec::new();
    };
    let binary = threshold(&strip, config.binarize_threshold, ThresholdType::Binary);
    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    // label -> (min_x, min_y, max_x, max_y, pixels)
    let mut extents: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        let e = extents.entry(label).or_insert((x, y, x, y, 0));
        e.0 = e.0.min(x);
        e.1 = e.1.min(y);
        e.2 = e.2.max(x);
        e.3 = e.3.max(y);
        e.4 += 1;
    }

    let min_height = strip.height() as f64 * config.min_height_frac;
    let max_width = strip.width() as f64 * config.max_width_frac;
    let origin_x = search.left.max(0);
    let origin_y = search.top.max(0);

    let mut glyphs: Vec<CropBox> = extents
        .into_values()
        .filter(|&(_, _, _, _, pixels)| pixels >= config.min_pixels)
        .map(|(x0, y0, x1, y1, _)| {
            CropBox::new(x0 as i32, y0 as i32, x1 as i32 + 1, y1 as i32 + 1)
                .translate(origin_x, origin_y)
        })
        .filter(|b| b.height() as f64 >= min_height && b.width() as f64 <= max_width)
        .collect();
    glyphs.sort_by_key(|b| (b.left, b.top));
    glyphs
}

/// Read the digit value of a glyph, with its match distance. Digit symbols
/// use their value as id.
pub fn read_digit(gray: &GrayImage, glyph: &CropBox, digits: &SingleHashMatcher) -> Option<(u8, u32)> {
    let crop = ImageUtils::crop_gray(gray, glyph)?;
    let outcome = digits.match_region(&crop);
    let digit = u8::try_from(outcome.id?.get()).ok().filter(|d| *d <= 9)?;
    Some((digit, outcome.distance))
}

/// Whether a row of symbol boxes (sorted left to right) is centered on the
/// search strip and evenly spaced.
pub fn validate_row(boxes: &[CropBox], search: &CropBox, config: &FlowConfig) -> bool {
    let (Some(first), Some(last)) = (boxes.first(), boxes.last()) else {
        return false;
    };

    let row_center = (first.left + last.right) as f64 / 2.0;
    if (row_center - search.center_x()).abs() > config.center_tolerance * search.width() as f64 {
        return false;
    }

    let gaps: Vec<f64> = boxes
        .windows(2)
        .map(|pair| pair[1].center_x() - pair[0].center_x())
        .collect();
    if gaps.is_empty() {
        return true;
    }

    let mut sorted = gaps.clone();
    sorted.sort_by(f64::total_cmp);
    let reference = sorted[sorted.len() / 2];
    if reference <= 0.0 {
        return false;
    }

    gaps.iter()
        .all(|gap| (gap - reference).abs() <= config.spacing_tolerance * reference)
}

/// Locates a row of an a-priori unknown number of symbols.
#[derive(Debug, Clone)]
pub struct FlowLocator {
    config: FlowConfig,
    client: (u32, u32),
    search: CropBox,
}

impl FlowLocator {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            client: (0, 0),
            search: CropBox::default(),
        }
    }

    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.client = (width, height);
        self.search = self.config.search.resolve(width, height);
    }

    pub fn search(&self) -> CropBox {
        self.search
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Slots of the current frame, or an empty list when the row does not
    /// validate.
    pub fn locate(&self, gray: &GrayImage, digits: &SingleHashMatcher) -> Vec<FlowSlot> {
        let (width, height) = self.client;
        if self.search.is_empty() {
            return Vec::new();
        }

        let slots: Vec<FlowSlot> = find_glyphs(gray, &self.search, &self.config.glyphs)
            .into_iter()
            .filter_map(|glyph| {
                let (digit, _) = read_digit(gray, &glyph, digits)?;
                let offset = self.config.digit_offsets.get(&digit)?;
                Some(FlowSlot {
                    digit,
                    glyph,
                    symbol: offset.apply(&glyph, width, height),
                })
            })
            .collect();

        let boxes: Vec<CropBox> = slots.iter().map(|s| s.symbol).collect();
        if !validate_row(&boxes, &self.search, &self.config) {
            if !boxes.is_empty() {
                trace!("Rejected row of {} candidates: {:?}", boxes.len(), boxes);
            }
            return Vec::new();
        }

        // Clipped slots are dropped on their own; the row itself is valid.
        slots
            .into_iter()
            .filter(|s| s.symbol.fits_within(gray.width(), gray.height()))
            .collect()
    }
}
