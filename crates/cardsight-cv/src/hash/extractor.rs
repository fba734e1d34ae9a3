//! Feature hash extraction on top of `image_hasher`

use super::{FeatureVector, HashKind};
use image::imageops::FilterType;
use image::GrayImage;
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};

/// Extracts fixed-length hashes from grayscale regions.
///
/// `size` is the side N of the hash grid; every hash kind produces N*N bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashExtractor {
    size: u32,
}

impl HashExtractor {
    pub fn new(size: u32) -> Self {
        Self { size: size.max(2) }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn bits(&self) -> usize {
        (self.size * self.size) as usize
    }

    fn hasher(&self, kind: HashKind) -> Hasher {
        let config = HasherConfig::new()
            .hash_size(self.size, self.size)
            .resize_filter(FilterType::Triangle);
        match kind {
            HashKind::Average => config.hash_alg(HashAlg::Mean),
            HashKind::Difference => config.hash_alg(HashAlg::Gradient),
            HashKind::DifferenceVertical => config.hash_alg(HashAlg::VertGradient),
            HashKind::Perceptual => config.hash_alg(HashAlg::Median).preproc_dct(),
        }
        .to_hasher()
    }

    /// Unpack the hash bytes, least significant bit first.
    fn to_vector(&self, hash: &ImageHash) -> FeatureVector {
        let bytes = hash.as_bytes();
        FeatureVector::from_bits((0..self.bits()).map(|i| {
            bytes
                .get(i / 8)
                .is_some_and(|byte| (byte >> (i % 8)) & 1 == 1)
        }))
    }

    pub fn extract(&self, kind: HashKind, region: &GrayImage) -> FeatureVector {
        if region.width() == 0 || region.height() == 0 {
            return FeatureVector::zeros(self.bits());
        }
        let hash = self.hasher(kind).hash_image(region);
        self.to_vector(&hash)
    }

    pub fn average(&self, region: &GrayImage) -> FeatureVector {
        self.extract(HashKind::Average, region)
    }

    pub fn difference(&self, region: &GrayImage) -> FeatureVector {
        self.extract(HashKind::Difference, region)
    }

    pub fn difference_vertical(&self, region: &GrayImage) -> FeatureVector {
        self.extract(HashKind::DifferenceVertical, region)
    }

    pub fn perceptual(&self, region: &GrayImage) -> FeatureVector {
        self.extract(HashKind::Perceptual, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(width: u32, height: u32, increasing: bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            let v = (x * 255 / (width - 1)) as u8;
            Luma([if increasing { v } else { 255 - v }])
        })
    }

    fn uniform(hash: &FeatureVector) -> bool {
        let first = hash.get(0);
        hash.bits().all(|b| b == first)
    }

    #[test]
    fn test_difference_hash_of_gradients() {
        let extractor = HashExtractor::new(8);
        let up = extractor.difference(&gradient(64, 64, true));
        let down = extractor.difference(&gradient(64, 64, false));

        assert_eq!(up.len(), 64);
        assert!(uniform(&up));
        assert!(uniform(&down));
        assert_eq!(up.distance(&down), 64);
    }

    #[test]
    fn test_vertical_difference_follows_vertical_gradient() {
        let extractor = HashExtractor::new(8);
        let down = GrayImage::from_fn(64, 64, |_, y| Luma([(y * 255 / 63) as u8]));
        let up = GrayImage::from_fn(64, 64, |_, y| Luma([255 - (y * 255 / 63) as u8]));

        let v = extractor.difference_vertical(&down);
        assert!(uniform(&v));
        assert_eq!(v.distance(&extractor.difference_vertical(&up)), 64);
        // Horizontal comparisons see no change across a vertical gradient.
        assert!(uniform(&extractor.difference(&down)));
    }

    #[test]
    fn test_average_hash_splits_halves() {
        let left_dark = GrayImage::from_fn(32, 32, |x, _| Luma([if x < 16 { 10 } else { 240 }]));
        let right_dark = GrayImage::from_fn(32, 32, |x, _| Luma([if x < 16 { 240 } else { 10 }]));
        let extractor = HashExtractor::new(8);

        let a = extractor.average(&left_dark);
        assert_eq!(a.bits().filter(|&b| b).count(), 32);
        assert_eq!(a.distance(&extractor.average(&right_dark)), 64);
    }

    #[test]
    fn test_hashes_are_deterministic() {
        let img = GrayImage::from_fn(40, 30, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        let extractor = HashExtractor::new(8);
        for kind in [
            HashKind::Average,
            HashKind::Difference,
            HashKind::DifferenceVertical,
            HashKind::Perceptual,
        ] {
            let a = extractor.extract(kind, &img);
            let b = extractor.extract(kind, &img);
            assert_eq!(a, b);
            assert_eq!(a.len(), 64);
        }
    }

    #[test]
    fn test_distance_matches_image_hash_dist() {
        let extractor = HashExtractor::new(8);
        let a = gradient(48, 40, true);
        let b = GrayImage::from_fn(48, 40, |x, y| Luma([((x * 5 + y * 11) % 256) as u8]));
        for kind in [HashKind::Difference, HashKind::Perceptual] {
            let hasher = extractor.hasher(kind);
            let expected = hasher.hash_image(&a).dist(&hasher.hash_image(&b));
            assert_eq!(extractor.extract(kind, &a).distance(&extractor.extract(kind, &b)), expected);
        }
    }

    #[test]
    fn test_empty_region_yields_zero_vector() {
        let extractor = HashExtractor::new(8);
        let hash = extractor.extract(HashKind::Perceptual, &GrayImage::new(0, 0));
        assert_eq!(hash, FeatureVector::zeros(64));
    }
}
