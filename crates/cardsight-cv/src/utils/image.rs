//! Image processing utilities over the `image` crate

use crate::bbox::CropBox;
use crate::Result;
use anyhow::Context;
use image::{imageops, DynamicImage, GrayImage};
use std::path::Path;

/// Image utility functions
pub struct ImageUtils;

impl ImageUtils {
    /// Load a frame from disk
    pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        image::open(&path).with_context(|| format!("Failed to open image: {:?}", path.as_ref()))
    }

    /// Luma conversion of a colour frame
    pub fn to_gray(frame: &DynamicImage) -> GrayImage {
        frame.to_luma8()
    }

    /// Copy out the part of `image` covered by `region`, clipped to the image.
    /// Returns `None` when nothing of the region is visible.
    pub fn crop_gray(image: &GrayImage, region: &CropBox) -> Option<GrayImage> {
        let clipped = region.clamp_to(image.width(), image.height());
        if clipped.is_empty() {
            return None;
        }
        Some(
            imageops::crop_imm(
                image,
                clipped.left as u32,
                clipped.top as u32,
                clipped.width() as u32,
                clipped.height() as u32,
            )
            .to_image(),
        )
    }

    /// Bounding box of everything brighter than `threshold`, i.e. the game
    /// content inside letterbox/pillarbox bars.
    ///
    /// Returns `None` if no such pixels exist or the content covers less than
    /// `min_fraction` of the frame in either dimension.
    pub fn content_box(image: &GrayImage, threshold: u8, min_fraction: f64) -> Option<CropBox> {
        let (width, height) = image.dimensions();
        let row_lit = |y: u32| (0..width).any(|x| image.get_pixel(x, y)[0] > threshold);
        let col_lit = |x: u32| (0..height).any(|y| image.get_pixel(x, y)[0] > threshold);

        let top = (0..height).find(|&y| row_lit(y))?;
        let bottom = (0..height).rev().find(|&y| row_lit(y))? + 1;
        let left = (0..width).find(|&x| col_lit(x))?;
        let right = (0..width).rev().find(|&x| col_lit(x))? + 1;

        let content = CropBox::new(left as i32, top as i32, right as i32, bottom as i32);
        let wide_enough = content.width() as f64 >= width as f64 * min_fraction;
        let tall_enough = content.height() as f64 >= height as f64 * min_fraction;
        (wide_enough && tall_enough).then_some(content)
    }
}
