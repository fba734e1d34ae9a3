//! Cardsight Computer Vision Library
//!
//! Turns a stream of screen frames into debounced game events: perceptual
//! hashing, dual-hash matching, row detection, temporal filtering and the
//! session phase machine.

pub mod bbox;
pub mod detection;
pub mod hash;
pub mod utils;

// Re-export commonly used types
pub use bbox::{CropBox, FracBox, FracOffset};
pub use detection::{Classifiers, Phase, Tracker, TrackerConfig};
pub use hash::{DualHashMatcher, FeatureVector, HashExtractor, HashKind, SingleHashMatcher};

// Error handling
pub type Result<T> = anyhow::Result<T>;

/// Core traits for the CV system
pub mod traits {
    use crate::bbox::CropBox;
    use crate::hash::{FeatureVector, Neighbor};

    /// Nearest-neighbour lookup over feature vectors of one class and kind.
    ///
    /// Implementations must be deterministic, return results nearest first and
    /// return at least `min(k, len)` neighbours.
    pub trait SymbolIndex: Send + Sync {
        fn bits(&self) -> usize;
        fn query(&self, vector: &FeatureVector, k: usize) -> Vec<Neighbor>;
    }

    /// Contract shared by every detector task.
    pub trait Detector {
        type Output;

        /// Re-resolve all fractional geometry for a new client size.
        fn on_resize(&mut self, width: u32, height: u32);
        fn tick(&mut self, frame: &crate::detection::tasks::FrameContext<'_>) -> Self::Output;
        fn reset(&mut self);
        /// Pixel regions the detector currently reads.
        fn regions(&self) -> Vec<CropBox>;
    }
}
